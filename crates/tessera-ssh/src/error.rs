// ABOUTME: Error types for SSH key import, signing and verification using thiserror.
// ABOUTME: Separates "not a key" from "a key we can't use yet" so callers can react.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during SSH key operations.
#[derive(Error, Debug)]
pub enum SshError {
    /// Failed to read key material from disk.
    #[error("failed to read SSH key from {path}: {source}")]
    ReadKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bytes match none of the supported key encodings.
    #[error("{source_label} is not a usable SSH key: {reason}")]
    MalformedKey { source_label: String, reason: String },

    /// The key decoded but its algorithm is not RSA, ECDSA or Ed25519.
    #[error("unsupported key algorithm {algorithm} in {source_label} (expected RSA, ECDSA or Ed25519)")]
    UnsupportedAlgorithm {
        source_label: String,
        algorithm: String,
    },

    /// An encrypted private key could not be decrypted.
    #[error("failed to decrypt SSH key {source_label}: {reason}")]
    Decryption { source_label: String, reason: String },

    /// A passphrase was needed but no helper is configured to supply one.
    #[error("no passphrase helper configured: {0}")]
    HelperNotConfigured(String),

    /// The passphrase helper could not be run or exited unsuccessfully.
    #[error("passphrase helper {program} failed: {reason}")]
    HelperExecution { program: PathBuf, reason: String },

    /// The passphrase helper printed nothing.
    #[error("passphrase helper {program} returned an empty secret")]
    EmptySecret { program: PathBuf },

    /// No signing agent could be reached.
    #[error("SSH agent unavailable: {0}")]
    AgentUnavailable(String),

    /// The agent was reachable but did not produce an acceptable signature.
    #[error("SSH agent failed to sign with {key_id}: {reason}")]
    AgentSigning { key_id: String, reason: String },

    /// Signing with an in-process private key failed.
    #[error("failed to sign with {key_id}: {source}")]
    InternalSigning {
        key_id: String,
        #[source]
        source: ssh_key::Error,
    },

    /// The operation was cancelled through its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// The signature algorithm cannot have been produced by the key.
    #[error("signature algorithm {signature} does not match key algorithm {key}")]
    AlgorithmMismatch { key: String, signature: String },

    /// The signature does not verify over the payload with this key.
    #[error("signature verification failed for {key_id}")]
    VerificationFailed { key_id: String },

    /// A detached signature could not be decoded or encoded.
    #[error("invalid SSH signature encoding: {0}")]
    SignatureEncoding(#[source] ssh_key::Error),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SshError {
    /// True when the source is not an SSH key at all.
    pub fn is_malformed(&self) -> bool {
        matches!(self, SshError::MalformedKey { .. })
    }

    /// True when the source is a key that cannot be used yet: it is
    /// encrypted and no correct passphrase could be obtained.
    pub fn is_locked(&self) -> bool {
        matches!(
            self,
            SshError::Decryption { .. }
                | SshError::HelperNotConfigured(_)
                | SshError::HelperExecution { .. }
                | SshError::EmptySecret { .. }
        )
    }
}

/// Result type alias using SshError.
pub type Result<T> = std::result::Result<T, SshError>;
