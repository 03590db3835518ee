// ABOUTME: Produces detached SSHSIG signatures for imported keys.
// ABOUTME: Signs in-process, re-unlocks encrypted keys, or delegates to an SSH agent.

use crate::agent::{AgentSignRequest, SigningAgent, SSH_AGENT_RSA_SHA2_512};
use crate::config::{SshConfig, DEFAULT_NAMESPACE};
use crate::error::{Result, SshError};
use crate::key::{unlock_private_key, KeyAlgorithm, KeyMaterial, KeyOrigin};
use crate::passphrase::PassphraseChannel;
use crate::raw_sign::raw_signature;
use crate::signature::Signature;
use ssh_key::{Algorithm, HashAlg, PrivateKey, SshSig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Message hash bound into every signature, as `ssh-keygen -Y sign` does.
const SIGNATURE_HASH: HashAlg = HashAlg::Sha512;

/// A key together with the file it was imported from.
///
/// Encrypted and agent-held keys re-derive the private operation from the
/// source, so it travels with the key.
#[derive(Debug, Clone)]
pub struct SignerHandle {
    pub key: Arc<KeyMaterial>,
    pub source_path: PathBuf,
}

impl SignerHandle {
    pub fn new(key: impl Into<Arc<KeyMaterial>>, source_path: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            source_path: source_path.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Route<'a> {
    InProcess(&'a PrivateKey),
    Unlock,
    Agent,
}

impl Route<'_> {
    fn as_str(self) -> &'static str {
        match self {
            Route::InProcess(_) => "in-process",
            Route::Unlock => "unlock",
            Route::Agent => "agent",
        }
    }
}

/// Signs payloads with one key.
#[derive(Clone)]
pub struct Signer {
    handle: SignerHandle,
    namespace: String,
    channel: PassphraseChannel,
    agent: Option<Arc<dyn SigningAgent>>,
    force_agent: bool,
}

impl Signer {
    pub fn new(handle: SignerHandle) -> Self {
        Self {
            handle,
            namespace: DEFAULT_NAMESPACE.to_string(),
            channel: PassphraseChannel::disabled(),
            agent: None,
            force_agent: false,
        }
    }

    /// Wire the signer from configuration: askpass channel, socket agent
    /// (when a socket is configured), namespace and agent preference.
    pub fn from_config(handle: SignerHandle, config: &SshConfig) -> Self {
        let mut signer = Self::new(handle)
            .with_namespace(config.namespace.clone())
            .with_passphrase_channel(PassphraseChannel::from_config(&config.askpass))
            .use_agent(config.use_agent);

        #[cfg(unix)]
        if let Ok(agent) = crate::agent::SocketAgent::from_config(&config.agent) {
            signer = signer.with_agent(Arc::new(agent));
        }

        signer
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_passphrase_channel(mut self, channel: PassphraseChannel) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_agent(mut self, agent: Arc<dyn SigningAgent>) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Route every signature through the agent.
    pub fn use_agent(mut self, force: bool) -> Self {
        self.force_agent = force;
        self
    }

    pub fn key(&self) -> &KeyMaterial {
        &self.handle.key
    }

    fn route(&self) -> Route<'_> {
        let key = &self.handle.key;
        if self.force_agent {
            return Route::Agent;
        }
        if let Some(private_key) = key.private_key() {
            Route::InProcess(private_key)
        } else if key.origin() == KeyOrigin::EncryptedPrivateKey && self.channel.is_active() {
            Route::Unlock
        } else {
            Route::Agent
        }
    }

    /// Sign `payload`, producing a detached signature.
    ///
    /// # Errors
    /// `Cancelled` if `cancel` fires first; agent, passphrase or signing
    /// errors depending on the route taken.
    pub async fn sign(&self, cancel: &CancellationToken, payload: &[u8]) -> Result<Signature> {
        if cancel.is_cancelled() {
            return Err(SshError::Cancelled);
        }

        let route = self.route();
        debug!(
            key_id = %self.key().key_id(),
            path = %self.handle.source_path.display(),
            route = route.as_str(),
            "Signing payload"
        );

        let sshsig = match route {
            Route::InProcess(private_key) => self.sign_in_process(private_key, payload)?,
            Route::Unlock => self.sign_unlocked(cancel, payload).await?,
            Route::Agent => self.sign_with_agent(cancel, payload).await?,
        };

        Ok(Signature::new(sshsig))
    }

    fn sign_in_process(&self, private_key: &PrivateKey, payload: &[u8]) -> Result<SshSig> {
        let internal = |source| SshError::InternalSigning {
            key_id: self.key().key_id().to_string(),
            source,
        };

        let data = SshSig::signed_data(&self.namespace, SIGNATURE_HASH, payload).map_err(internal)?;
        let signature = raw_signature(private_key, &data).map_err(internal)?;
        SshSig::new(
            private_key.public_key().key_data().clone(),
            self.namespace.clone(),
            SIGNATURE_HASH,
            signature,
        )
        .map_err(internal)
    }

    async fn sign_unlocked(&self, cancel: &CancellationToken, payload: &[u8]) -> Result<SshSig> {
        let path = &self.handle.source_path;
        let label = path.display().to_string();

        let encrypted = read_private_key(path).await?;
        if encrypted.public_key().key_data() != self.key().public_key().key_data() {
            return Err(SshError::MalformedKey {
                source_label: label,
                reason: format!("file no longer holds key {}", self.key().key_id()),
            });
        }

        let unlocked = unlock_private_key(&encrypted, &label, &self.channel, cancel).await?;
        let result = self.sign_in_process(&unlocked, payload);
        drop(unlocked);
        result
    }

    async fn sign_with_agent(&self, cancel: &CancellationToken, payload: &[u8]) -> Result<SshSig> {
        let key = self.key();
        let agent = self.agent.as_ref().ok_or_else(|| {
            SshError::AgentUnavailable(format!(
                "key {} has no in-process private key and no agent is configured",
                key.key_id()
            ))
        })?;

        let signing_error = |reason: String| SshError::AgentSigning {
            key_id: key.key_id().to_string(),
            reason,
        };

        let data = SshSig::signed_data(&self.namespace, SIGNATURE_HASH, payload)
            .map_err(|e| signing_error(format!("cannot encode signed data: {e}")))?;

        let expected = expected_agent_algorithm(key);
        let flags = match key.algorithm() {
            KeyAlgorithm::Rsa => SSH_AGENT_RSA_SHA2_512,
            _ => 0,
        };

        let request = AgentSignRequest {
            public_key: key.public_key().clone(),
            key_id: key.key_id().to_string(),
            source_path: self.handle.source_path.clone(),
            data,
            flags,
        };

        let signature = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SshError::Cancelled),
            res = agent.sign(request, cancel) => res?,
        };

        if signature.algorithm() != expected {
            warn!(
                key_id = %key.key_id(),
                expected = %expected,
                received = %signature.algorithm(),
                "Rejecting agent signature"
            );
            return Err(signing_error(format!(
                "agent answered with {} instead of {}",
                signature.algorithm(),
                expected
            )));
        }

        let sshsig = SshSig::new(
            key.public_key().key_data().clone(),
            self.namespace.clone(),
            SIGNATURE_HASH,
            signature,
        )
        .map_err(|e| signing_error(format!("cannot build signature envelope: {e}")))?;

        if key.public_key().verify(&self.namespace, payload, &sshsig).is_err() {
            warn!(key_id = %key.key_id(), "Agent signature does not verify");
            return Err(signing_error("agent signature does not verify".to_string()));
        }

        Ok(sshsig)
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("key_id", &self.key().key_id())
            .field("source_path", &self.handle.source_path)
            .field("namespace", &self.namespace)
            .field("channel", &self.channel)
            .field("has_agent", &self.agent.is_some())
            .field("force_agent", &self.force_agent)
            .finish()
    }
}

/// Signature algorithm an agent must answer with for `key`.
fn expected_agent_algorithm(key: &KeyMaterial) -> Algorithm {
    match key.algorithm() {
        KeyAlgorithm::Rsa => Algorithm::Rsa {
            hash: Some(HashAlg::Sha512),
        },
        _ => key.public_key().algorithm(),
    }
}

async fn read_private_key(path: &Path) -> Result<PrivateKey> {
    let data = tokio::fs::read(path).await.map_err(|e| SshError::ReadKey {
        path: path.to_path_buf(),
        source: e,
    })?;
    PrivateKey::from_openssh(&data).map_err(|e| SshError::MalformedKey {
        source_label: path.display().to_string(),
        reason: format!("invalid OpenSSH private key: {e}"),
    })
}
