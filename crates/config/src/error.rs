use std::path::PathBuf;

/// Errors raised while turning options into a pipeline configuration.
///
/// All of them happen before any connection is attempted.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("`host` required")]
    MissingHost,

    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not find auth key `{0}` in auth file")]
    AuthKeyNotFound(String),

    #[error("auth entry `{0}` must be \"user:pass\" or an object")]
    InvalidAuthEntry(String),

    #[error("cannot find private key, searched: {}", searched.join(", "))]
    KeyNotFound { searched: Vec<String> },
}
