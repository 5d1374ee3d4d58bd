//! Private key discovery.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Searched in order when no key location is configured.
pub const DEFAULT_KEY_LOCATIONS: &[&str] = &[
    "~/.ssh/id_ed25519",
    "~/.ssh/id_rsa",
    "~/.ssh/id_ecdsa",
    "~/.ssh/id_dsa",
    "/.ssh/id_rsa",
    "/.ssh/id_dsa",
];

/// A key read from disk.
#[derive(Debug, Clone)]
pub struct FoundKey {
    pub path: PathBuf,
    pub contents: String,
}

/// Expands a leading `~/` against `home`. Relative paths are taken
/// from `cwd`.
pub fn expand_location(location: &str, home: Option<&Path>, cwd: &Path) -> PathBuf {
    if let (Some(rest), Some(home)) = (location.strip_prefix("~/"), home) {
        return home.join(rest);
    }
    let path = PathBuf::from(location);
    if path.is_absolute() { path } else { cwd.join(path) }
}

/// Returns the first readable key among `locations`.
pub fn find_key(locations: &[String], home: Option<&Path>, cwd: &Path) -> Option<FoundKey> {
    locations.iter().find_map(|location| {
        let path = expand_location(location, home, cwd);
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                debug!(path = %path.display(), "using private key");
                Some(FoundKey { path, contents })
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no key here");
                None
            }
        }
    })
}

pub fn default_locations() -> Vec<String> {
    DEFAULT_KEY_LOCATIONS.iter().map(|s| s.to_string()).collect()
}
