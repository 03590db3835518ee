// ABOUTME: Detached signature verification against imported public keys.
// ABOUTME: Rejects algorithm mismatches before any cryptographic check.

use crate::error::{Result, SshError};
use crate::key::{KeyAlgorithm, KeyMaterial};
use crate::signature::Signature;
use ssh_key::Algorithm;
use tokio_util::sync::CancellationToken;
use tracing::debug;

impl KeyMaterial {
    /// Verify a detached signature over `payload` under `namespace`.
    ///
    /// Pure: no I/O, safe to call concurrently.
    ///
    /// # Errors
    /// - `AlgorithmMismatch` when the signature algorithm cannot belong to
    ///   this key, including legacy SHA-1 `ssh-rsa` signatures.
    /// - `VerificationFailed` for a different signing key, a different
    ///   namespace, or any cryptographic mismatch.
    pub fn verify_in_namespace(
        &self,
        cancel: &CancellationToken,
        namespace: &str,
        payload: &[u8],
        signature: &Signature,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(SshError::Cancelled);
        }

        let sig_algorithm = signature.algorithm();
        if !accepts(self.algorithm(), &sig_algorithm) {
            return Err(SshError::AlgorithmMismatch {
                key: self.public_key().algorithm().to_string(),
                signature: sig_algorithm.to_string(),
            });
        }

        let failed = || SshError::VerificationFailed {
            key_id: self.key_id().to_string(),
        };

        if signature.namespace() != namespace {
            debug!(
                key_id = %self.key_id(),
                expected = namespace,
                found = signature.namespace(),
                "Signature namespace mismatch"
            );
            return Err(failed());
        }

        self.public_key()
            .verify(namespace, payload, signature.as_sshsig())
            .map_err(|e| {
                debug!(key_id = %self.key_id(), error = %e, "Signature rejected");
                failed()
            })
    }

    /// Verify a detached signature created under the default namespace.
    pub fn verify(&self, cancel: &CancellationToken, payload: &[u8], signature: &Signature) -> Result<()> {
        self.verify_in_namespace(cancel, crate::config::DEFAULT_NAMESPACE, payload, signature)
    }
}

/// Whether a key of family `key` can have produced a signature of `signature`.
fn accepts(key: KeyAlgorithm, signature: &Algorithm) -> bool {
    match (key, signature) {
        // Legacy SHA-1 RSA signatures are never accepted.
        (KeyAlgorithm::Rsa, Algorithm::Rsa { hash }) => hash.is_some(),
        (KeyAlgorithm::Ecdsa, Algorithm::Ecdsa { .. }) => true,
        (KeyAlgorithm::Ed25519, Algorithm::Ed25519) => true,
        _ => false,
    }
}
