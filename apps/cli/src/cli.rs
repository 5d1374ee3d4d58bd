//! Command line arguments.

use std::path::{Path, PathBuf};

use clap::Parser;
use sftpdeploy_config::{ConfigError, KeySpec, OneOrMany, UploadOptions};

/// Default options file, read from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "sftpdeploy.toml";

/// Upload a local directory tree to a remote host over SFTP.
#[derive(Debug, Parser)]
#[command(name = "sftpdeploy", version, about)]
pub struct Cli {
    /// Local directory to upload.
    pub local_dir: PathBuf,

    /// Options file (TOML, or JSON with a `.json` extension).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(short, long)]
    pub port: Option<u16>,

    #[arg(short, long)]
    pub user: Option<String>,

    #[arg(long, env = "SFTPDEPLOY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Private key file. May be given several times; the first readable one is used.
    #[arg(short = 'i', long = "key")]
    pub keys: Vec<String>,

    #[arg(long, env = "SFTPDEPLOY_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// SSH agent socket.
    #[arg(long)]
    pub agent: Option<PathBuf>,

    #[arg(long)]
    pub agent_forward: bool,

    /// Remote base directory.
    #[arg(short, long)]
    pub remote_path: Option<String>,

    /// Remote platform hint (`unix`, `windows`).
    #[arg(long)]
    pub platform: Option<String>,

    /// Connection timeout in milliseconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Entry to read from the auth file.
    #[arg(long)]
    pub auth_key: Option<String>,

    /// Credentials file (default `.ftppass`).
    #[arg(long)]
    pub auth_file: Option<PathBuf>,

    /// Transfers in flight over the session.
    #[arg(long)]
    pub max_in_flight: Option<usize>,

    /// Fail a file when one of its directories cannot be created.
    #[arg(long)]
    pub strict_directories: bool,

    /// Verify the server against ~/.ssh/known_hosts.
    #[arg(long)]
    pub known_hosts: bool,

    /// Do not log each uploaded file.
    #[arg(long)]
    pub no_log_files: bool,

    /// Log per-file progress.
    #[arg(long)]
    pub progress: bool,

    /// Only log warnings and errors.
    #[arg(short, long)]
    pub quiet: bool,

    /// Run against an in-memory remote instead of connecting.
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Options given on the command line. Unset flags stay `None` so
    /// they do not override the options file.
    pub fn options(&self) -> UploadOptions {
        UploadOptions {
            host: self.host.clone(),
            port: self.port,
            username: self.user.clone(),
            password: self.password.clone(),
            key: match self.keys.as_slice() {
                [] => None,
                [one] => Some(KeySpec::Location(OneOrMany::One(one.clone()))),
                many => Some(KeySpec::Location(OneOrMany::Many(many.to_vec()))),
            },
            passphrase: self.passphrase.clone(),
            agent: self.agent.clone(),
            agent_forward: self.agent_forward.then_some(true),
            remote_path: self.remote_path.clone(),
            remote_platform: self.platform.clone(),
            timeout: self.timeout,
            log_files: self.no_log_files.then_some(false),
            auth_file: self.auth_file.clone(),
            auth_key: self.auth_key.clone(),
            max_in_flight: self.max_in_flight,
            strict_directories: self.strict_directories.then_some(true),
            known_hosts: self.known_hosts.then_some(true),
            ..Default::default()
        }
    }

    /// Options file overlaid with command line flags.
    ///
    /// An explicit `--config` must exist; the default file is optional.
    pub fn load_options(&self, cwd: &Path) -> Result<UploadOptions, ConfigError> {
        let mut options = match &self.config {
            Some(path) => UploadOptions::load(&cwd.join(path))?,
            None => {
                let default = cwd.join(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    UploadOptions::load(&default)?
                } else {
                    UploadOptions::default()
                }
            }
        };
        options.overlay(self.options());
        Ok(options)
    }
}
