//! Seeded environment shared by the integration tests.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use keyring_core::Environment;
use parking_lot::Mutex;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// ChaCha20-seeded randomness and a fixed clock.
#[derive(Clone)]
pub struct TestEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
}

impl TestEnv {
    pub fn new(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))) }
    }
}

impl Environment for TestEnv {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().fill_bytes(buffer);
    }
}
