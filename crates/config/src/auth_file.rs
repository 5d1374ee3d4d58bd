//! `.ftppass` credential file.
//!
//! A JSON object keyed by auth key. Each entry is either a
//! `"user:pass"` string or an object whose fields override the options.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;
use crate::options::{KeySpec, UploadOptions};

pub const DEFAULT_AUTH_FILE: &str = ".ftppass";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AuthEntry {
    #[serde(alias = "user")]
    username: Option<String>,
    #[serde(alias = "pass")]
    password: Option<String>,
    passphrase: Option<String>,
    #[serde(alias = "key")]
    key_location: Option<KeySpec>,
    key_contents: Option<String>,
    agent: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AuthValue {
    Pair(String),
    Entry(AuthEntry),
}

/// Applies the entry for `options.auth_key` from the auth file.
///
/// Does nothing when no auth key is set or the file does not exist.
pub fn apply_auth_file(options: &mut UploadOptions, cwd: &Path) -> Result<(), ConfigError> {
    let Some(auth_key) = options.auth_key.clone() else {
        return Ok(());
    };

    let file = options
        .auth_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_AUTH_FILE));
    let path = cwd.join(file);
    if !path.exists() {
        debug!(path = %path.display(), "auth file not found, skipping");
        return Ok(());
    }

    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let mut entries: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.clone(),
            source,
        })?;

    let value = entries
        .remove(&auth_key)
        .filter(|v| !v.is_null())
        .ok_or_else(|| ConfigError::AuthKeyNotFound(auth_key.clone()))?;
    let value: AuthValue = serde_json::from_value(value)
        .map_err(|_| ConfigError::InvalidAuthEntry(auth_key.clone()))?;

    let entry = match value {
        AuthValue::Pair(pair) => {
            let (user, pass) = pair
                .split_once(':')
                .ok_or_else(|| ConfigError::InvalidAuthEntry(auth_key.clone()))?;
            AuthEntry {
                username: Some(user.to_string()),
                password: Some(pass.to_string()),
                ..Default::default()
            }
        }
        AuthValue::Entry(entry) => entry,
    };

    debug!(auth_key = %auth_key, path = %path.display(), "applying credentials from auth file");
    options.overlay(UploadOptions {
        username: entry.username,
        password: entry.password,
        passphrase: entry.passphrase,
        key: entry.key_location,
        key_contents: entry.key_contents,
        agent: entry.agent,
        ..Default::default()
    });
    Ok(())
}
