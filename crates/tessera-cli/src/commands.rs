// ABOUTME: Implementations of the keyid, sign and verify subcommands.
// ABOUTME: Thin wrappers over tessera-ssh with anyhow context for reporting.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tessera_ssh::{
    KeyAlgorithm, KeyImporter, KeyMaterial, KeyOrigin, PassphraseChannel, Signature, Signer,
    SignerHandle, SshConfig,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Build the effective configuration.
///
/// The config file (explicit, or the default path when it exists) is layered
/// over the environment: keys it sets win, keys it omits keep their
/// environment value. Command-line flags win over both.
pub fn resolve_config(
    path: Option<&Path>,
    namespace: Option<String>,
    use_agent: bool,
) -> Result<SshConfig> {
    let file = match path {
        Some(path) => Some(path.to_path_buf()),
        None => SshConfig::default_path().filter(|p| p.exists()),
    };
    let base = layer_file(file.as_deref(), SshConfig::from_env())?;
    Ok(apply_flags(base, namespace, use_agent))
}

fn layer_file(file: Option<&Path>, env: SshConfig) -> Result<SshConfig> {
    let Some(path) = file else {
        return Ok(env);
    };
    debug!(path = %path.display(), "Loading config file");
    SshConfig::load_over(path, &env)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

fn apply_flags(mut config: SshConfig, namespace: Option<String>, use_agent: bool) -> SshConfig {
    if let Some(namespace) = namespace {
        config.namespace = namespace;
    }
    config.use_agent |= use_agent;
    config
}

#[derive(Debug, Serialize)]
struct KeyInfo<'a> {
    algorithm: KeyAlgorithm,
    key_id: &'a str,
    origin: KeyOrigin,
    comment: &'a str,
}

impl<'a> From<&'a KeyMaterial> for KeyInfo<'a> {
    fn from(key: &'a KeyMaterial) -> Self {
        Self {
            algorithm: key.algorithm(),
            key_id: key.key_id(),
            origin: key.origin(),
            comment: key.comment(),
        }
    }
}

async fn import_key(
    config: &SshConfig,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<KeyMaterial> {
    KeyImporter::new(PassphraseChannel::from_config(&config.askpass))
        .import(path, cancel)
        .await
        .with_context(|| format!("Failed to import key {}", path.display()))
}

async fn read_input(input: Option<&Path>) -> Result<Vec<u8>> {
    match input {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut data = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut data)
                .await
                .context("Failed to read stdin")?;
            Ok(data)
        }
    }
}

/// Print the key id, or a JSON description with `json`.
pub async fn keyid(
    config: &SshConfig,
    key_path: &Path,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let key = import_key(config, key_path, cancel).await?;
    if json {
        let rendered = serde_json::to_string_pretty(&KeyInfo::from(&key))
            .context("Failed to encode key info")?;
        println!("{rendered}");
    } else {
        println!("{}", key.key_id());
    }
    Ok(())
}

/// Sign the input and write the armored signature.
pub async fn sign(
    config: &SshConfig,
    key_path: &Path,
    input: Option<&Path>,
    output: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<()> {
    let key = import_key(config, key_path, cancel).await?;
    let payload = read_input(input).await?;

    let signer = Signer::from_config(SignerHandle::new(key, key_path), config);
    let signature = signer
        .sign(cancel, &payload)
        .await
        .with_context(|| format!("Failed to sign with {}", key_path.display()))?;
    let armored = signature.to_pem().context("Failed to encode signature")?;

    match output {
        Some(path) => tokio::fs::write(path, armored.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(armored.as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    info!(
        key_id = %signer.key().key_id(),
        algorithm = %signature.format(),
        namespace = %signature.namespace(),
        "Signed"
    );
    Ok(())
}

/// Verify a detached signature; any failure is returned as an error.
pub async fn verify(
    config: &SshConfig,
    key_path: &Path,
    signature_path: &Path,
    input: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<()> {
    let key = import_key(config, key_path, cancel).await?;

    let armored = tokio::fs::read_to_string(signature_path)
        .await
        .with_context(|| format!("Failed to read {}", signature_path.display()))?;
    let signature: Signature = armored
        .parse()
        .with_context(|| format!("Invalid signature in {}", signature_path.display()))?;
    let payload = read_input(input).await?;

    key.verify_in_namespace(cancel, &config.namespace, &payload, &signature)
        .with_context(|| format!("Signature does not verify for {}", key.key_id()))?;

    println!("Good \"{}\" signature from {}", config.namespace, key.key_id());
    Ok(())
}
