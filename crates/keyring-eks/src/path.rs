//! Slash-separated path normalisation.

/// Lexically normalise `path`: collapse repeated slashes, drop `.`
/// segments, resolve `..` against the preceding segment and strip any
/// trailing slash. An empty result is `"."`.
pub fn clean(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {},
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                },
                // `..` at the root stays at the root
                _ if rooted => {},
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Join `base` and `path` with a slash and clean the result. Empty
/// elements are ignored.
pub fn join(base: &str, path: &str) -> String {
    match (base.is_empty(), path.is_empty()) {
        (true, true) => String::new(),
        (true, false) => clean(path),
        (false, true) => clean(base),
        (false, false) => clean(&format!("{base}/{path}")),
    }
}
