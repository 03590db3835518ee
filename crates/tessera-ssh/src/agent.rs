// ABOUTME: Signing-agent abstraction and an OpenSSH agent client over a Unix socket.
// ABOUTME: Used when the private key is not resident in this process.

use crate::config::AgentConfig;
use crate::error::{Result, SshError};
use async_trait::async_trait;
use ssh_key::{PublicKey, Signature};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Agent flag requesting an `rsa-sha2-512` signature.
pub const SSH_AGENT_RSA_SHA2_512: u32 = 0x04;

/// A request for the agent to sign `data` with `public_key`.
#[derive(Debug, Clone)]
pub struct AgentSignRequest {
    pub public_key: PublicKey,
    pub key_id: String,
    /// Where the key was imported from, for agents that locate keys by file.
    pub source_path: PathBuf,
    pub data: Vec<u8>,
    pub flags: u32,
}

/// An out-of-process holder of private keys.
#[async_trait]
pub trait SigningAgent: Send + Sync {
    /// Public keys the agent can sign with.
    async fn identities(&self, cancel: &CancellationToken) -> Result<Vec<PublicKey>>;

    /// Sign the request's data with its key.
    async fn sign(&self, request: AgentSignRequest, cancel: &CancellationToken) -> Result<Signature>;
}

#[cfg(unix)]
pub use socket::SocketAgent;

#[cfg(unix)]
mod socket {
    use super::*;
    use ssh_agent_lib::agent::Session;
    use ssh_agent_lib::client::Client;
    use ssh_agent_lib::proto::SignRequest;
    use std::future::Future;
    use tokio::net::UnixStream;
    use tracing::debug;

    /// OpenSSH agent reached through its Unix socket.
    #[derive(Debug, Clone)]
    pub struct SocketAgent {
        socket: PathBuf,
    }

    impl SocketAgent {
        pub fn new(socket: impl Into<PathBuf>) -> Self {
            Self {
                socket: socket.into(),
            }
        }

        /// Use the socket named in the agent configuration.
        ///
        /// # Errors
        /// Returns `SshError::AgentUnavailable` when no socket is configured.
        pub fn from_config(config: &AgentConfig) -> Result<Self> {
            config
                .socket
                .as_ref()
                .map(|socket| Self::new(socket.clone()))
                .ok_or_else(|| {
                    SshError::AgentUnavailable(format!(
                        "{} is not set",
                        crate::config::ENV_AUTH_SOCK
                    ))
                })
        }

        async fn connect(&self) -> Result<Client<UnixStream>> {
            let stream = UnixStream::connect(&self.socket).await.map_err(|e| {
                SshError::AgentUnavailable(format!(
                    "cannot connect to {}: {e}",
                    self.socket.display()
                ))
            })?;
            debug!(socket = %self.socket.display(), "Connected to SSH agent");
            Ok(Client::new(stream))
        }
    }

    async fn cancellable<T>(
        cancel: &CancellationToken,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SshError::Cancelled),
            res = fut => res,
        }
    }

    #[async_trait]
    impl SigningAgent for SocketAgent {
        async fn identities(&self, cancel: &CancellationToken) -> Result<Vec<PublicKey>> {
            cancellable(cancel, async {
                let mut client = self.connect().await?;
                let identities = client.request_identities().await.map_err(|e| {
                    SshError::AgentUnavailable(format!("listing identities failed: {e}"))
                })?;
                Ok(identities
                    .into_iter()
                    .map(|identity| PublicKey::new(identity.pubkey, identity.comment))
                    .collect())
            })
            .await
        }

        async fn sign(
            &self,
            request: AgentSignRequest,
            cancel: &CancellationToken,
        ) -> Result<Signature> {
            cancellable(cancel, async {
                let mut client = self.connect().await?;

                let identities = client.request_identities().await.map_err(|e| {
                    SshError::AgentUnavailable(format!("listing identities failed: {e}"))
                })?;
                let key_data = request.public_key.key_data();
                if !identities.iter().any(|identity| &identity.pubkey == key_data) {
                    return Err(SshError::AgentSigning {
                        key_id: request.key_id.clone(),
                        reason: format!(
                            "key is not loaded in the agent (add it with `ssh-add {}`)",
                            request.source_path.display()
                        ),
                    });
                }

                debug!(
                    key_id = %request.key_id,
                    data_len = request.data.len(),
                    flags = request.flags,
                    "Requesting agent signature"
                );

                client
                    .sign(SignRequest {
                        pubkey: key_data.clone(),
                        data: request.data.clone(),
                        flags: request.flags,
                    })
                    .await
                    .map_err(|e| SshError::AgentSigning {
                        key_id: request.key_id.clone(),
                        reason: e.to_string(),
                    })
            })
            .await
        }
    }

}
