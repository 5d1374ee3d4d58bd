use russh::client;
use russh::keys::ssh_key;
use sftpdeploy_upload::HostKeyPolicy;
use tracing::{debug, error, warn};

/// SSH client callbacks. Only host key verification is customized.
pub(crate) struct ClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl ClientHandler {
    pub(crate) fn new(host: &str, port: u16, policy: HostKeyPolicy) -> Self {
        Self {
            host: host.to_string(),
            port,
            policy,
        }
    }
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        match self.policy {
            HostKeyPolicy::AcceptAny => {
                debug!(host = %self.host, "accepting server host key without verification");
                Ok(true)
            }
            HostKeyPolicy::KnownHosts => {
                match russh::keys::known_hosts::check_known_hosts(
                    &self.host,
                    self.port,
                    server_public_key,
                ) {
                    Ok(true) => Ok(true),
                    Ok(false) => {
                        warn!(host = %self.host, port = self.port, "host not in known_hosts");
                        Ok(false)
                    }
                    Err(e) => {
                        error!(host = %self.host, port = self.port, "host key verification failed: {e}");
                        Err(e.into())
                    }
                }
            }
        }
    }
}
