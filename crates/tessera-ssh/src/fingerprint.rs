// ABOUTME: SSH public key fingerprint computation.
// ABOUTME: Renders SHA256 fingerprints exactly as `ssh-keygen -l` prints them.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use ssh_key::PublicKey;

use crate::error::{Result, SshError};

/// Prefix of every key identifier.
pub const FINGERPRINT_PREFIX: &str = "SHA256:";

/// Compute the key identifier of a public key given its wire encoding.
///
/// The wire encoding is the binary form used inside `authorized_keys` lines
/// (algorithm name as SSH string followed by the algorithm's public
/// parameters). The result is `SHA256:` followed by the unpadded standard
/// base64 of the SHA-256 digest, matching OpenSSH's fingerprint output.
pub fn fingerprint(public_bytes: &[u8]) -> String {
    let hash = Sha256::digest(public_bytes);
    format!("{FINGERPRINT_PREFIX}{}", STANDARD_NO_PAD.encode(hash))
}

/// Compute the key identifier of a parsed public key.
///
/// The key comment does not take part in the fingerprint.
///
/// # Errors
/// Returns `SshError::MalformedKey` if the key cannot be re-encoded.
pub fn compute_fingerprint(public_key: &PublicKey) -> Result<String> {
    let wire = public_key.to_bytes().map_err(|e| SshError::MalformedKey {
        source_label: "public key".to_string(),
        reason: e.to_string(),
    })?;
    Ok(fingerprint(&wire))
}
