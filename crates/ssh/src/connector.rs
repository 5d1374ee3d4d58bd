//! SSH connection setup: TCP, handshake, authentication, SFTP subsystem.

use std::path::Path;
use std::sync::Arc;

use russh::client::{self, Handle};
use russh::keys::PrivateKeyWithHashAlg;
use russh_sftp::client::SftpSession;
use sftpdeploy_upload::{AuthMethod, PipelineConfig, RemoteSession, SessionConnector, SessionError, SessionFuture};
use tracing::{debug, info};

use crate::error::{map_ssh, map_sftp};
use crate::handler::ClientHandler;
use crate::remote::SftpRemote;

/// Opens real SSH/SFTP sessions.
#[derive(Debug, Default, Clone)]
pub struct SftpConnector;

impl SftpConnector {
    pub fn new() -> Self {
        Self
    }
}

impl SessionConnector for SftpConnector {
    fn connect<'a>(
        &'a self,
        config: &'a PipelineConfig,
    ) -> SessionFuture<'a, Arc<dyn RemoteSession>> {
        Box::pin(async move {
            let remote = tokio::time::timeout(config.timeout, open_session(config))
                .await
                .map_err(|_| SessionError::Timeout(config.timeout))??;
            let remote: Arc<dyn RemoteSession> = Arc::new(remote);
            Ok(remote)
        })
    }
}

async fn open_session(config: &PipelineConfig) -> Result<SftpRemote, SessionError> {
    let ssh_config = Arc::new(client::Config::default());
    let handler = ClientHandler::new(&config.host, config.port, config.host_key_policy);

    debug!(host = %config.address(), "connecting");
    let mut handle = client::connect(ssh_config, (config.host.as_str(), config.port), handler)
        .await
        .map_err(map_ssh)?;

    authenticate(&mut handle, config).await?;
    info!(host = %config.address(), user = %config.username, "authenticated");

    let channel = handle.channel_open_session().await.map_err(map_ssh)?;
    if let AuthMethod::Agent { forward: true, .. } = config.auth {
        channel.agent_forward(false).await.map_err(map_ssh)?;
    }
    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(map_ssh)?;
    let sftp = SftpSession::new(channel.into_stream())
        .await
        .map_err(|e| map_sftp("sftp", e))?;

    Ok(SftpRemote::new(sftp, handle))
}

async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    config: &PipelineConfig,
) -> Result<(), SessionError> {
    let user = config.username.as_str();

    let success = match &config.auth {
        AuthMethod::Password(password) => handle
            .authenticate_password(user, password)
            .await
            .map_err(map_ssh)?
            .success(),
        AuthMethod::PrivateKey { key, passphrase } => {
            let key = russh::keys::decode_secret_key(key, passphrase.as_deref())
                .map_err(|e| SessionError::Auth(format!("unusable private key: {e}")))?;
            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .map_err(map_ssh)?
                .flatten();
            handle
                .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
                .await
                .map_err(map_ssh)?
                .success()
        }
        AuthMethod::Agent { socket, .. } => authenticate_with_agent(handle, user, socket).await?,
    };

    if success {
        Ok(())
    } else {
        Err(SessionError::Auth(format!(
            "{} authentication rejected for user '{}' on {}",
            config.auth.label(),
            user,
            config.address()
        )))
    }
}

/// Tries every identity the agent offers, in order.
#[cfg(unix)]
async fn authenticate_with_agent(
    handle: &mut Handle<ClientHandler>,
    user: &str,
    socket: &Path,
) -> Result<bool, SessionError> {
    use russh::keys::agent::client::AgentClient;

    let mut agent = AgentClient::connect_uds(socket)
        .await
        .map_err(|e| SessionError::Auth(format!("agent {}: {e}", socket.display())))?;
    let identities = agent
        .request_identities()
        .await
        .map_err(|e| SessionError::Auth(format!("agent identities: {e}")))?;
    let hash_alg = handle
        .best_supported_rsa_hash()
        .await
        .map_err(map_ssh)?
        .flatten();

    for identity in identities {
        debug!(key = %identity.algorithm(), "trying agent identity");
        let result = handle
            .authenticate_publickey_with(user, identity, hash_alg, &mut agent)
            .await
            .map_err(|e| SessionError::Auth(format!("agent signing: {e}")))?;
        if result.success() {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(not(unix))]
async fn authenticate_with_agent(
    _handle: &mut Handle<ClientHandler>,
    _user: &str,
    socket: &Path,
) -> Result<bool, SessionError> {
    Err(SessionError::Auth(format!(
        "agent sockets are not supported on this platform: {}",
        socket.display()
    )))
}
