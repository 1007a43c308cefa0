//! Keyring CLI binary.

use std::io;

use clap::Parser;
use keyring_cli::{Cli, run};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let filter = cli.log_filter();

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    if let Err(err) = run(cli, &mut io::stdout().lock()) {
        tracing::error!(code = err.code(), "{err}");
        return Err(err.into());
    }
    Ok(())
}
