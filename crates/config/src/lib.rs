//! Option loading and credential resolution for sftpdeploy.
//!
//! Turns a loose [`UploadOptions`] bag (file, CLI flags, `.ftppass`) into
//! the immutable [`PipelineConfig`] the upload pipeline runs with.

mod auth_file;
mod error;
mod keys;
mod options;

use std::path::Path;
use std::time::Duration;

use sftpdeploy_upload::config::{DEFAULT_MAX_IN_FLIGHT, DEFAULT_PORT, DEFAULT_TIMEOUT};
use sftpdeploy_upload::{AuthMethod, HostKeyPolicy, PipelineConfig, RemotePlatform};
use tracing::debug;

pub use auth_file::{DEFAULT_AUTH_FILE, apply_auth_file};
pub use error::ConfigError;
pub use keys::{DEFAULT_KEY_LOCATIONS, FoundKey, expand_location, find_key};
pub use options::{KeySpec, OneOrMany, UploadOptions};

/// Resolves `options` into a pipeline configuration.
///
/// Relative paths (auth file, key locations) are taken from `cwd`; `~/`
/// expands to the user's home directory.
pub fn resolve_options(options: UploadOptions, cwd: &Path) -> Result<PipelineConfig, ConfigError> {
    resolve_with_home(options, cwd, dirs::home_dir().as_deref())
}

fn resolve_with_home(
    mut options: UploadOptions,
    cwd: &Path,
    home: Option<&Path>,
) -> Result<PipelineConfig, ConfigError> {
    let host = options
        .host
        .clone()
        .filter(|h| !h.trim().is_empty())
        .ok_or(ConfigError::MissingHost)?;

    apply_auth_file(&mut options, cwd)?;

    let auth = select_auth(&options, cwd, home)?;
    debug!(method = auth.label(), "authentication selected");

    let platform = options
        .remote_platform
        .as_deref()
        .map(RemotePlatform::from_hint)
        .unwrap_or_default();

    let mut config = PipelineConfig::new(host, auth)
        .with_username(
            options
                .username
                .clone()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| "anonymous".into()),
        )
        .with_remote_path(options.remote_path.as_deref().unwrap_or("/"))
        .with_platform(platform);

    config.port = options.port.unwrap_or(DEFAULT_PORT);
    config.timeout = options
        .timeout
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_TIMEOUT);
    config.log_files = options.log_files.unwrap_or(true);
    config.max_in_flight = options.max_in_flight.unwrap_or(DEFAULT_MAX_IN_FLIGHT).max(1);
    config.strict_directories = options.strict_directories.unwrap_or(false);
    if options.known_hosts.unwrap_or(false) {
        config.host_key_policy = HostKeyPolicy::KnownHosts;
    }

    Ok(config)
}

/// Password, then agent, then private key.
fn select_auth(
    options: &UploadOptions,
    cwd: &Path,
    home: Option<&Path>,
) -> Result<AuthMethod, ConfigError> {
    if let Some(password) = options.password.clone().filter(|p| !p.is_empty()) {
        return Ok(AuthMethod::Password(password));
    }

    if let Some(socket) = options.agent.clone() {
        return Ok(AuthMethod::Agent {
            socket,
            forward: options.agent_forward.unwrap_or(false),
        });
    }

    let (locations, contents, passphrase) = match options.key.clone() {
        Some(KeySpec::Location(location)) => (Some(location), None, None),
        Some(KeySpec::Detailed {
            location,
            contents,
            passphrase,
        }) => (location, contents, passphrase),
        None => (None, None, None),
    };
    let passphrase = passphrase.or_else(|| options.passphrase.clone());

    if let Some(key) = contents.or_else(|| options.key_contents.clone()) {
        return Ok(AuthMethod::PrivateKey { key, passphrase });
    }

    let searched = locations
        .map(OneOrMany::into_vec)
        .unwrap_or_else(keys::default_locations);
    match find_key(&searched, home, cwd) {
        Some(found) => Ok(AuthMethod::PrivateKey {
            key: found.contents,
            passphrase,
        }),
        None => Err(ConfigError::KeyNotFound { searched }),
    }
}
