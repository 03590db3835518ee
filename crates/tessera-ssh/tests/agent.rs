// ABOUTME: Integration tests for agent-backed signing.
// ABOUTME: Rejects bad agent replies and exercises a real ssh-agent when installed.

#![cfg(unix)]

mod common;

use common::*;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tessera_ssh::{
    AgentConfig, KeyImporter, SigningAgent, Signer, SignerHandle, SocketAgent, SshConfig,
    SshError,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

async fn import(name: &str) -> tessera_ssh::KeyMaterial {
    KeyImporter::default()
        .import(key_path(name), &CancellationToken::new())
        .await
        .unwrap_or_else(|e| panic!("{name}: {e}"))
}

#[tokio::test]
async fn test_public_key_without_agent_is_unavailable() {
    let key = import("ed25519.pub").await;
    let err = Signer::new(SignerHandle::new(key, key_path("ed25519.pub")))
        .sign(&CancellationToken::new(), b"DATA")
        .await
        .unwrap_err();
    assert!(matches!(err, SshError::AgentUnavailable(_)), "{err}");
}

#[tokio::test]
async fn test_forced_agent_without_key_fails() {
    let key = import("ed25519").await;
    let agent = InMemoryAgent::new(vec![load_private("rsa")]);
    let err = Signer::new(SignerHandle::new(key, key_path("ed25519")))
        .with_agent(Arc::new(agent))
        .use_agent(true)
        .sign(&CancellationToken::new(), b"DATA")
        .await
        .unwrap_err();
    assert!(matches!(err, SshError::AgentSigning { .. }), "{err}");
}

#[tokio::test]
async fn test_forced_agent_signs_in_process_key() {
    let cancel = CancellationToken::new();
    let key = import("ecdsa").await;
    let sig = Signer::new(SignerHandle::new(key.clone(), key_path("ecdsa")))
        .with_agent(Arc::new(InMemoryAgent::with_fixtures()))
        .use_agent(true)
        .sign(&cancel, b"DATA")
        .await
        .expect("agent should sign");
    key.verify(&cancel, b"DATA", &sig).expect("should verify");
}

#[tokio::test]
async fn test_agent_reply_with_wrong_algorithm_is_rejected() {
    let ed25519 = load_private("ed25519");
    let bogus = tessera_ssh::raw_signature(&ed25519, b"DATA").expect("should sign");

    let key = import("rsa.pub").await;
    let err = Signer::new(SignerHandle::new(key, key_path("rsa.pub")))
        .with_agent(Arc::new(CannedAgent { signature: bogus }))
        .sign(&CancellationToken::new(), b"DATA")
        .await
        .unwrap_err();
    assert!(
        matches!(&err, SshError::AgentSigning { reason, .. } if reason.contains("instead of")),
        "{err}"
    );
}

#[tokio::test]
async fn test_agent_reply_that_does_not_verify_is_rejected() {
    let garbage = ssh_key::Signature::new(ssh_key::Algorithm::Ed25519, vec![7u8; 64])
        .expect("should build signature");

    let key = import("ed25519.pub").await;
    let err = Signer::new(SignerHandle::new(key, key_path("ed25519.pub")))
        .with_agent(Arc::new(CannedAgent { signature: garbage }))
        .sign(&CancellationToken::new(), b"DATA")
        .await
        .unwrap_err();
    assert!(
        matches!(&err, SshError::AgentSigning { reason, .. } if reason.contains("does not verify")),
        "{err}"
    );
}

#[tokio::test]
async fn test_signer_from_config_without_socket() {
    let key = import("rsa.pub").await;
    let config = SshConfig {
        agent: AgentConfig { socket: None },
        ..SshConfig::default()
    };
    let err = Signer::from_config(SignerHandle::new(key, key_path("rsa.pub")), &config)
        .sign(&CancellationToken::new(), b"DATA")
        .await
        .unwrap_err();
    assert!(matches!(err, SshError::AgentUnavailable(_)), "{err}");
}

/// A throwaway `ssh-agent` bound to a socket in a temp directory.
struct RunningAgent {
    child: Child,
    socket: PathBuf,
    dir: TempDir,
}

impl RunningAgent {
    fn start() -> Option<Self> {
        let dir = TempDir::new().expect("should create temp dir");
        let socket = dir.path().join("agent.sock");
        let child = Command::new("ssh-agent")
            .arg("-D")
            .arg("-a")
            .arg(&socket)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .ok()?;

        let mut agent = Self { child, socket, dir };
        for _ in 0..100 {
            if agent.socket.exists() {
                return Some(agent);
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        let _ = agent.child.kill();
        None
    }

    /// `ssh-add` a fixture key, copied with owner-only permissions first.
    fn add(&self, name: &str) -> bool {
        use std::os::unix::fs::PermissionsExt;

        let copy = self.dir.path().join(name);
        std::fs::copy(key_path(name), &copy).expect("should copy key");
        std::fs::set_permissions(&copy, std::fs::Permissions::from_mode(0o600))
            .expect("should chmod key");

        Command::new("ssh-add")
            .arg(&copy)
            .env("SSH_AUTH_SOCK", &self.socket)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn socket(&self) -> &Path {
        &self.socket
    }
}

impl Drop for RunningAgent {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[tokio::test]
async fn test_real_agent_signs_public_keys() {
    let Some(agent) = RunningAgent::start() else {
        eprintln!("ssh-agent not available, skipping");
        return;
    };
    for name in ["rsa", "ecdsa", "ed25519"] {
        if !agent.add(name) {
            eprintln!("ssh-add failed for {name}, skipping");
            return;
        }
    }

    let cancel = CancellationToken::new();
    let socket_agent = SocketAgent::new(agent.socket());
    let identities = socket_agent
        .identities(&cancel)
        .await
        .expect("should list identities");
    assert_eq!(identities.len(), 3);

    for name in ["rsa.pub", "ecdsa.pub", "ed25519_ssh2.pub"] {
        let key = import(name).await;
        let sig = Signer::new(SignerHandle::new(key.clone(), key_path(name)))
            .with_agent(Arc::new(socket_agent.clone()))
            .sign(&cancel, b"DATA")
            .await
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        key.verify(&cancel, b"DATA", &sig)
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        if name == "rsa.pub" {
            assert_eq!(sig.format(), "rsa-sha2-512");
        }
    }
}

#[tokio::test]
async fn test_real_agent_missing_key_names_ssh_add() {
    let Some(agent) = RunningAgent::start() else {
        eprintln!("ssh-agent not available, skipping");
        return;
    };

    let key = import("ed25519.pub").await;
    let err = Signer::new(SignerHandle::new(key, key_path("ed25519")))
        .with_agent(Arc::new(SocketAgent::new(agent.socket())))
        .sign(&CancellationToken::new(), b"DATA")
        .await
        .unwrap_err();
    assert!(
        matches!(&err, SshError::AgentSigning { reason, .. } if reason.contains("ssh-add")),
        "{err}"
    );
}
