//! Loose upload options.
//!
//! Accepts every historical spelling of each option. Files are TOML or
//! JSON; keys are camelCase in both.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One path or a list of paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        }
    }
}

/// Private key selection: either just location(s) or a detailed table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySpec {
    Location(OneOrMany),
    Detailed {
        #[serde(default)]
        location: Option<OneOrMany>,
        #[serde(default)]
        contents: Option<String>,
        #[serde(default)]
        passphrase: Option<String>,
    },
}

/// Upload options as written by the user. Every field is optional;
/// [`resolve_options`](crate::resolve_options) applies the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    #[serde(alias = "user")]
    pub username: Option<String>,
    #[serde(alias = "pass")]
    pub password: Option<String>,
    #[serde(
        alias = "keyLocation",
        alias = "privateKeyLocation",
        alias = "privateKeyLocations"
    )]
    pub key: Option<KeySpec>,
    pub key_contents: Option<String>,
    pub passphrase: Option<String>,
    /// SSH agent socket path.
    pub agent: Option<PathBuf>,
    pub agent_forward: Option<bool>,
    pub remote_path: Option<String>,
    #[serde(alias = "platform")]
    pub remote_platform: Option<String>,
    /// Connection timeout in milliseconds.
    pub timeout: Option<u64>,
    pub log_files: Option<bool>,
    pub auth_file: Option<PathBuf>,
    #[serde(alias = "auth")]
    pub auth_key: Option<String>,
    pub max_in_flight: Option<usize>,
    pub strict_directories: Option<bool>,
    /// Verify the server against `~/.ssh/known_hosts`.
    pub known_hosts: Option<bool>,
}

impl UploadOptions {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Loads options from `path`. `.json` files are read as JSON,
    /// anything else as TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })
        } else {
            Self::from_toml_str(&content).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    /// Fields set in `other` replace the ones in `self`.
    pub fn overlay(&mut self, other: UploadOptions) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            host,
            port,
            username,
            password,
            key,
            key_contents,
            passphrase,
            agent,
            agent_forward,
            remote_path,
            remote_platform,
            timeout,
            log_files,
            auth_file,
            auth_key,
            max_in_flight,
            strict_directories,
            known_hosts,
        );
    }
}
