// ABOUTME: Shared helpers for tessera-ssh integration tests.
// ABOUTME: Fixture paths, askpass scripts written at test time, and an in-memory agent.

#![allow(dead_code)]

use async_trait::async_trait;
use ssh_key::{PrivateKey, PublicKey, Signature};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tessera_ssh::{raw_signature, AgentSignRequest, Result, SigningAgent, SshError};
use tokio_util::sync::CancellationToken;

pub const PASSPHRASE: &str = "correct horse battery staple";

pub const KEYID_RSA: &str = "SHA256:Qv5ubw1Vnmu75Kb284iNNHrGc8gEi7WnLbY0YZK5vZU";
pub const KEYID_ECDSA: &str = "SHA256:0Iz1DtZXuyirVwH0/4ljiOJwXRMqjDeIgwL7HGSHMNg";
pub const KEYID_ED25519: &str = "SHA256:xXalMmTrbS6a8vlzxnbV9eKqRJug3IzjqlayzVxwXWE";

pub fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

pub fn key_path(name: &str) -> PathBuf {
    fixtures_dir().join("keys").join(name)
}

pub fn signature_path(name: &str) -> PathBuf {
    fixtures_dir().join("signatures").join(name)
}

pub fn load_private(name: &str) -> PrivateKey {
    let data = std::fs::read_to_string(key_path(name)).expect("should read fixture");
    PrivateKey::from_openssh(data).expect("should parse fixture")
}

/// Write an executable shell script into a fresh temp directory.
#[cfg(unix)]
pub fn write_script(body: &str) -> (TempDir, PathBuf) {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().expect("should create temp dir");
    let path = dir.path().join("askpass.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("should write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("should chmod script");
    (dir, path)
}

/// Askpass script printing the fixture passphrase.
#[cfg(unix)]
pub fn askpass_script() -> (TempDir, PathBuf) {
    write_script(&format!("echo '{PASSPHRASE}'"))
}

/// Agent holding unencrypted private keys in memory.
pub struct InMemoryAgent {
    keys: Vec<PrivateKey>,
}

impl InMemoryAgent {
    pub fn new(keys: Vec<PrivateKey>) -> Self {
        Self { keys }
    }

    pub fn with_fixtures() -> Self {
        Self::new(vec![
            load_private("rsa"),
            load_private("ecdsa"),
            load_private("ed25519"),
        ])
    }
}

#[async_trait]
impl SigningAgent for InMemoryAgent {
    async fn identities(&self, _cancel: &CancellationToken) -> Result<Vec<PublicKey>> {
        Ok(self.keys.iter().map(|k| k.public_key().clone()).collect())
    }

    async fn sign(&self, request: AgentSignRequest, _cancel: &CancellationToken) -> Result<Signature> {
        let key = self
            .keys
            .iter()
            .find(|k| k.public_key().key_data() == request.public_key.key_data())
            .ok_or_else(|| SshError::AgentSigning {
                key_id: request.key_id.clone(),
                reason: "key not loaded".to_string(),
            })?;
        raw_signature(key, &request.data).map_err(|e| SshError::AgentSigning {
            key_id: request.key_id.clone(),
            reason: e.to_string(),
        })
    }
}

/// Agent answering every request with a fixed signature.
pub struct CannedAgent {
    pub signature: Signature,
}

#[async_trait]
impl SigningAgent for CannedAgent {
    async fn identities(&self, _cancel: &CancellationToken) -> Result<Vec<PublicKey>> {
        Ok(Vec::new())
    }

    async fn sign(&self, _request: AgentSignRequest, _cancel: &CancellationToken) -> Result<Signature> {
        Ok(self.signature.clone())
    }
}
