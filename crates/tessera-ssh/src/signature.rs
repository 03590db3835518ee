// ABOUTME: Detached signature envelope in OpenSSH's SSHSIG format.
// ABOUTME: Interoperates with `ssh-keygen -Y sign` and `ssh-keygen -Y verify`.

use crate::error::{Result, SshError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ssh_key::{Algorithm, LineEnding, SshSig};
use std::str::FromStr;

/// A detached signature over a payload.
///
/// Wraps the SSHSIG envelope: the signing public key, the namespace, the
/// message hash algorithm and the algorithm-specific signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    inner: SshSig,
}

impl Signature {
    pub(crate) fn new(inner: SshSig) -> Self {
        Self { inner }
    }

    /// Signature algorithm as named on the wire, e.g. `rsa-sha2-512`.
    pub fn format(&self) -> String {
        self.inner.algorithm().to_string()
    }

    pub(crate) fn algorithm(&self) -> Algorithm {
        self.inner.algorithm()
    }

    /// Raw algorithm-specific signature bytes.
    pub fn blob(&self) -> &[u8] {
        self.inner.signature().as_bytes()
    }

    pub fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    pub fn as_sshsig(&self) -> &SshSig {
        &self.inner
    }

    /// Armored `-----BEGIN SSH SIGNATURE-----` form.
    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_pem(LineEnding::LF)
            .map_err(SshError::SignatureEncoding)
    }

    pub fn from_pem(pem: impl AsRef<[u8]>) -> Result<Self> {
        SshSig::from_pem(pem)
            .map(Self::new)
            .map_err(SshError::SignatureEncoding)
    }
}

impl FromStr for Signature {
    type Err = SshError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_pem(s.trim())
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let pem = self.to_pem().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&pem)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let pem = String::deserialize(deserializer)?;
        pem.parse().map_err(serde::de::Error::custom)
    }
}
