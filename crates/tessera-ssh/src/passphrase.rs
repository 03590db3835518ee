// ABOUTME: Passphrase channel for unlocking encrypted private keys.
// ABOUTME: Runs an askpass helper subprocess, honoring cancellation and a timeout.

use crate::config::{AskpassConfig, AskpassRequire};
use crate::error::{Result, SshError};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// A decrypted passphrase. Wiped from memory on drop.
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub(crate) fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

/// Source of passphrases for encrypted keys.
///
/// Each call must produce a fresh secret; implementations must not cache.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Obtain a secret. `prompt` describes which key is being unlocked.
    async fn request_secret(&self, prompt: &str, cancel: &CancellationToken) -> Result<Secret>;
}

/// Obtains secrets from an external askpass program.
///
/// The program receives the prompt as its only argument and prints the
/// secret on stdout.
#[derive(Debug, Clone)]
pub struct AskpassProvider {
    program: PathBuf,
    timeout: Duration,
}

impl AskpassProvider {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: Duration::from_secs(crate::config::DEFAULT_ASKPASS_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn execution_error(&self, reason: impl Into<String>) -> SshError {
        SshError::HelperExecution {
            program: self.program.clone(),
            reason: reason.into(),
        }
    }
}

enum HelperOutcome {
    Finished(std::io::Result<(ExitStatus, Zeroizing<Vec<u8>>)>),
    TimedOut,
    Cancelled,
}

#[async_trait]
impl SecretProvider for AskpassProvider {
    async fn request_secret(&self, prompt: &str, cancel: &CancellationToken) -> Result<Secret> {
        if cancel.is_cancelled() {
            return Err(SshError::Cancelled);
        }

        let mut child = Command::new(&self.program)
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.execution_error(format!("failed to spawn: {e}")))?;

        debug!(program = %self.program.display(), pid = ?child.id(), "Spawned askpass helper");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => HelperOutcome::Cancelled,
            res = tokio::time::timeout(self.timeout, read_helper_output(&mut child)) => match res {
                Ok(finished) => HelperOutcome::Finished(finished),
                Err(_) => HelperOutcome::TimedOut,
            },
        };

        let (status, stdout) = match outcome {
            HelperOutcome::Cancelled => {
                kill_helper(&mut child, &self.program).await;
                return Err(SshError::Cancelled);
            }
            HelperOutcome::TimedOut => {
                kill_helper(&mut child, &self.program).await;
                return Err(self.execution_error(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
            HelperOutcome::Finished(Err(e)) => {
                return Err(self.execution_error(format!("failed to read output: {e}")));
            }
            HelperOutcome::Finished(Ok(done)) => done,
        };

        if !status.success() {
            return Err(self.execution_error(format!("exited with {status}")));
        }

        let text = std::str::from_utf8(&stdout)
            .map_err(|_| self.execution_error("output is not valid UTF-8"))?;
        let secret = strip_line_ending(text);
        if secret.is_empty() {
            return Err(SshError::EmptySecret {
                program: self.program.clone(),
            });
        }

        Ok(Secret::new(secret))
    }
}

async fn read_helper_output(
    child: &mut Child,
) -> std::io::Result<(ExitStatus, Zeroizing<Vec<u8>>)> {
    let mut buf = Zeroizing::new(Vec::new());
    if let Some(mut stdout) = child.stdout.take() {
        stdout.read_to_end(&mut buf).await?;
    }
    let status = child.wait().await?;
    Ok((status, buf))
}

async fn kill_helper(child: &mut Child, program: &Path) {
    warn!(program = %program.display(), "Killing askpass helper");
    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill askpass helper");
    }
}

/// Strip one trailing `\n` or `\r\n`.
fn strip_line_ending(text: &str) -> &str {
    let text = text.strip_suffix('\n').unwrap_or(text);
    text.strip_suffix('\r').unwrap_or(text)
}

/// Gatekeeper in front of a [`SecretProvider`].
///
/// The channel only hands out secrets when it was activated, either by an
/// askpass configuration that demands it or by injecting a provider
/// directly. An inactive channel answers every request with
/// `SshError::HelperNotConfigured`.
#[derive(Clone)]
pub struct PassphraseChannel {
    provider: Option<Arc<dyn SecretProvider>>,
    inactive_reason: String,
}

impl PassphraseChannel {
    /// A channel that never supplies secrets.
    pub fn disabled() -> Self {
        Self {
            provider: None,
            inactive_reason: "no passphrase source was provided".to_string(),
        }
    }

    /// A channel backed by an injected provider.
    pub fn with_provider(provider: Arc<dyn SecretProvider>) -> Self {
        Self {
            provider: Some(provider),
            inactive_reason: String::new(),
        }
    }

    /// Build a channel from askpass configuration.
    ///
    /// Only `Force` activates the channel, and it requires a program.
    /// `Prefer` and `Never` leave it inactive.
    pub fn from_config(config: &AskpassConfig) -> Self {
        let inactive = |reason: &str| Self {
            provider: None,
            inactive_reason: reason.to_string(),
        };

        match (config.require, &config.program) {
            (AskpassRequire::Force, Some(program)) => Self::with_provider(Arc::new(
                AskpassProvider::new(program.clone())
                    .with_timeout(Duration::from_secs(config.timeout_secs)),
            )),
            (AskpassRequire::Force, None) => {
                inactive("askpass use is forced but no askpass program is set")
            }
            (AskpassRequire::Prefer | AskpassRequire::Never, _) => inactive(&format!(
                "askpass use is not forced (set {}=force)",
                crate::config::ENV_ASKPASS_REQUIRE
            )),
        }
    }

    /// Whether a request could reach a provider.
    pub fn is_active(&self) -> bool {
        self.provider.is_some()
    }

    /// Request a secret through the active provider.
    pub async fn request_secret(&self, prompt: &str, cancel: &CancellationToken) -> Result<Secret> {
        match &self.provider {
            Some(provider) => provider.request_secret(prompt, cancel).await,
            None => Err(SshError::HelperNotConfigured(self.inactive_reason.clone())),
        }
    }
}

impl Default for PassphraseChannel {
    fn default() -> Self {
        Self::disabled()
    }
}

impl fmt::Debug for PassphraseChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassphraseChannel")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}
