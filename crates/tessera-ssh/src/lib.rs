// ABOUTME: SSH-key identity, detached signing and verification for tessera.
// ABOUTME: Imports keys, derives key ids, signs via key/askpass/agent, verifies signatures.

//! # tessera-ssh
//!
//! Cryptographic identity and signing built on SSH key material.
//!
//! ## Features
//!
//! - **Import**: OpenSSH private keys (plain or passphrase-protected),
//!   OpenSSH public keys and RFC 4716 "SSH2" public key blocks
//! - **Key ids**: `SHA256:<base64>` fingerprints identical to `ssh-keygen -l`
//! - **Signing**: SSHSIG detached signatures, made in-process, by unlocking
//!   an encrypted key through an askpass helper, or by an SSH agent
//! - **Verification**: algorithm-checked verification against any imported
//!   key, interoperable with `ssh-keygen -Y verify`
//!
//! ## Example
//!
//! ```no_run
//! use tessera_ssh::{KeyImporter, PassphraseChannel, Signer, SignerHandle, SshConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> tessera_ssh::Result<()> {
//! let config = SshConfig::from_env();
//! let cancel = CancellationToken::new();
//!
//! let importer = KeyImporter::new(PassphraseChannel::from_config(&config.askpass));
//! let key = importer.import("/home/me/.ssh/id_ed25519", &cancel).await?;
//! println!("key id: {}", key.key_id());
//!
//! let signer = Signer::from_config(
//!     SignerHandle::new(key.clone(), "/home/me/.ssh/id_ed25519"),
//!     &config,
//! );
//! let signature = signer.sign(&cancel, b"DATA").await?;
//! key.verify(&cancel, b"DATA", &signature)?;
//! # Ok(())
//! # }
//! ```

mod agent;
mod config;
mod error;
mod fingerprint;
mod key;
mod passphrase;
mod raw_sign;
mod signature;
mod signer;
mod ssh2;
mod verify;

pub use agent::{AgentSignRequest, SigningAgent, SSH_AGENT_RSA_SHA2_512};
#[cfg(unix)]
pub use agent::SocketAgent;
pub use config::{
    AgentConfig, AskpassConfig, AskpassRequire, SshConfig, DEFAULT_ASKPASS_TIMEOUT_SECS,
    DEFAULT_NAMESPACE, ENV_ASKPASS, ENV_ASKPASS_REQUIRE, ENV_AUTH_SOCK, ENV_NAMESPACE,
    ENV_USE_AGENT,
};
pub use error::{Result, SshError};
pub use fingerprint::{compute_fingerprint, fingerprint, FINGERPRINT_PREFIX};
pub use key::{KeyAlgorithm, KeyImporter, KeyMaterial, KeyOrigin};
pub use passphrase::{AskpassProvider, PassphraseChannel, Secret, SecretProvider};
pub use raw_sign::raw_signature;
pub use signature::Signature;
pub use signer::{Signer, SignerHandle};
pub use ssh2::{parse_ssh2_public_key, SSH2_BEGIN, SSH2_END};

// Re-export ssh_key types for convenience
pub use ssh_key::{PrivateKey, PublicKey};
