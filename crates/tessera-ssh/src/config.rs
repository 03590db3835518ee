// ABOUTME: Configuration values for the passphrase channel, agent and signer.
// ABOUTME: Built explicitly, from a TOML file, or once from the process environment.

use crate::error::{Result, SshError};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Path of the passphrase helper executable.
pub const ENV_ASKPASS: &str = "SSH_ASKPASS";
/// When to use the passphrase helper: `force`, `prefer` or `never`.
pub const ENV_ASKPASS_REQUIRE: &str = "SSH_ASKPASS_REQUIRE";
/// Unix socket of the running SSH agent.
pub const ENV_AUTH_SOCK: &str = "SSH_AUTH_SOCK";
/// Route all signing through the SSH agent when truthy.
pub const ENV_USE_AGENT: &str = "TESSERA_SSH_USE_AGENT";
/// Overrides the signature namespace.
pub const ENV_NAMESPACE: &str = "TESSERA_SSH_NAMESPACE";

/// Namespace bound into every detached signature.
pub const DEFAULT_NAMESPACE: &str = "tessera";

/// Seconds a passphrase helper may run before it is killed.
pub const DEFAULT_ASKPASS_TIMEOUT_SECS: u64 = 60;

/// Top-level configuration for tessera-ssh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// SSHSIG namespace signatures are created and verified under.
    pub namespace: String,
    /// Always sign through the SSH agent, even with an in-process key.
    pub use_agent: bool,
    pub askpass: AskpassConfig,
    pub agent: AgentConfig,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            use_agent: false,
            askpass: AskpassConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

/// Passphrase helper configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AskpassConfig {
    /// Executable that prints the passphrase on stdout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<PathBuf>,
    /// Whether the helper may be used.
    pub require: AskpassRequire,
    /// Seconds before the helper is killed.
    pub timeout_secs: u64,
}

impl Default for AskpassConfig {
    fn default() -> Self {
        Self {
            program: None,
            require: AskpassRequire::default(),
            timeout_secs: DEFAULT_ASKPASS_TIMEOUT_SECS,
        }
    }
}

/// Gate on the passphrase helper, mirroring OpenSSH's `SSH_ASKPASS_REQUIRE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AskpassRequire {
    /// Always use the helper; it must be configured.
    Force,
    /// Accepted but does not activate the helper; only `Force` does.
    Prefer,
    /// Never use the helper.
    #[default]
    Never,
}

impl AskpassRequire {
    /// Parse an `SSH_ASKPASS_REQUIRE` value. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "force" => Some(Self::Force),
            "prefer" => Some(Self::Prefer),
            "never" => Some(Self::Never),
            _ => None,
        }
    }
}

/// SSH agent configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Unix socket of the agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket: Option<PathBuf>,
}

impl SshConfig {
    /// Build a configuration from the process environment.
    ///
    /// This is the only place the environment is read; components receive
    /// the resulting value.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var_os(name))
    }

    /// Build a configuration from an arbitrary variable lookup.
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let require = match get(ENV_ASKPASS_REQUIRE) {
            Some(value) => {
                let value = value.to_string_lossy();
                AskpassRequire::parse(&value).unwrap_or_else(|| {
                    warn!(variable = ENV_ASKPASS_REQUIRE, value = %value, "Unrecognized value, treating as never");
                    AskpassRequire::Never
                })
            }
            None => AskpassRequire::default(),
        };

        let use_agent = get(ENV_USE_AGENT)
            .map(|v| is_truthy(&v.to_string_lossy()))
            .unwrap_or(false);

        let namespace = get(ENV_NAMESPACE)
            .map(|v| v.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        Self {
            namespace,
            use_agent,
            askpass: AskpassConfig {
                program: get(ENV_ASKPASS).map(PathBuf::from),
                require,
                timeout_secs: DEFAULT_ASKPASS_TIMEOUT_SECS,
            },
            agent: AgentConfig {
                socket: get(ENV_AUTH_SOCK).map(PathBuf::from),
            },
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// Missing tables and fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_over(path, &Self::default())
    }

    /// Load a TOML file on top of `base`.
    ///
    /// Keys present in the file win; every key the file leaves out keeps its
    /// value from `base`.
    pub fn load_over(path: &Path, base: &SshConfig) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SshError::Config(format!("Failed to read config from {:?}: {}", path, e))
        })?;

        let file: toml::Table = toml::from_str(&contents)
            .map_err(|e| SshError::Config(format!("Failed to parse config: {}", e)))?;

        let base = toml::Value::try_from(base)
            .map_err(|e| SshError::Config(format!("Failed to encode base config: {}", e)))?;
        let mut merged = match base {
            toml::Value::Table(table) => table,
            _ => toml::Table::new(),
        };
        merge_tables(&mut merged, file);

        let config: SshConfig = toml::Value::Table(merged)
            .try_into()
            .map_err(|e| SshError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Default config file location: `~/.config/tessera/ssh.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tessera").join("ssh.toml"))
    }

    fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(SshError::Config("namespace must not be empty".into()));
        }
        if self.askpass.timeout_secs == 0 {
            return Err(SshError::Config(
                "askpass.timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(table) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, table);
                continue;
            }
            base.insert(key, toml::Value::Table(table));
        } else {
            base.insert(key, value);
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let map: HashMap<String, OsString> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = SshConfig::default();
        assert_eq!(config.namespace, "tessera");
        assert!(!config.use_agent);
        assert_eq!(config.askpass.require, AskpassRequire::Never);
        assert_eq!(config.askpass.timeout_secs, 60);
        assert!(config.agent.socket.is_none());
    }

    #[test]
    fn test_from_lookup_reads_askpass_and_agent() {
        let config = SshConfig::from_lookup(lookup_from(&[
            ("SSH_ASKPASS", "/usr/lib/ssh/askpass"),
            ("SSH_ASKPASS_REQUIRE", "force"),
            ("SSH_AUTH_SOCK", "/run/user/1000/agent.sock"),
            ("TESSERA_SSH_USE_AGENT", "yes"),
        ]));

        assert_eq!(
            config.askpass.program,
            Some(PathBuf::from("/usr/lib/ssh/askpass"))
        );
        assert_eq!(config.askpass.require, AskpassRequire::Force);
        assert_eq!(
            config.agent.socket,
            Some(PathBuf::from("/run/user/1000/agent.sock"))
        );
        assert!(config.use_agent);
    }

    #[test]
    fn test_from_lookup_empty_values_are_unset() {
        let config = SshConfig::from_lookup(lookup_from(&[
            ("SSH_ASKPASS", ""),
            ("SSH_AUTH_SOCK", ""),
            ("TESSERA_SSH_NAMESPACE", ""),
        ]));
        assert!(config.askpass.program.is_none());
        assert!(config.agent.socket.is_none());
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_from_lookup_unknown_require_is_never() {
        let config = SshConfig::from_lookup(lookup_from(&[("SSH_ASKPASS_REQUIRE", "always")]));
        assert_eq!(config.askpass.require, AskpassRequire::Never);
    }

    #[test]
    fn test_askpass_require_parse() {
        assert_eq!(AskpassRequire::parse("force"), Some(AskpassRequire::Force));
        assert_eq!(AskpassRequire::parse(" Prefer "), Some(AskpassRequire::Prefer));
        assert_eq!(AskpassRequire::parse("never"), Some(AskpassRequire::Never));
        assert_eq!(AskpassRequire::parse(""), None);
    }

    #[test]
    fn test_use_agent_falsy_values() {
        for value in ["0", "false", "no", "off"] {
            let config = SshConfig::from_lookup(lookup_from(&[("TESSERA_SSH_USE_AGENT", value)]));
            assert!(!config.use_agent, "{value} should not enable the agent");
        }
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::NamedTempFile::new().expect("should create temp file");
        writeln!(
            file,
            r#"
namespace = "git"
use_agent = true

[askpass]
program = "/opt/askpass"
require = "prefer"
timeout_secs = 5
"#
        )
        .unwrap();

        let config = SshConfig::load(file.path()).expect("should load config");
        assert_eq!(config.namespace, "git");
        assert!(config.use_agent);
        assert_eq!(config.askpass.program, Some(PathBuf::from("/opt/askpass")));
        assert_eq!(config.askpass.require, AskpassRequire::Prefer);
        assert_eq!(config.askpass.timeout_secs, 5);
        assert!(config.agent.socket.is_none());
    }

    #[test]
    fn test_load_rejects_empty_namespace() {
        let mut file = tempfile::NamedTempFile::new().expect("should create temp file");
        writeln!(file, "namespace = \"\"").unwrap();

        let err = SshConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, SshError::Config(msg) if msg.contains("namespace")));
    }

    #[test]
    fn test_load_over_keeps_unset_keys_from_base() {
        let env = SshConfig::from_lookup(lookup_from(&[
            ("SSH_ASKPASS", "/env/askpass"),
            ("SSH_ASKPASS_REQUIRE", "force"),
            ("SSH_AUTH_SOCK", "/env/agent.sock"),
            ("TESSERA_SSH_USE_AGENT", "1"),
        ]));
        let mut file = tempfile::NamedTempFile::new().expect("should create temp file");
        writeln!(file, "namespace = \"git\"\n\n[askpass]\ntimeout_secs = 5").unwrap();

        let config = SshConfig::load_over(file.path(), &env).expect("should load config");
        assert_eq!(config.namespace, "git");
        assert!(config.use_agent);
        assert_eq!(config.askpass.program, Some(PathBuf::from("/env/askpass")));
        assert_eq!(config.askpass.require, AskpassRequire::Force);
        assert_eq!(config.askpass.timeout_secs, 5);
        assert_eq!(config.agent.socket, Some(PathBuf::from("/env/agent.sock")));
    }

    #[test]
    fn test_load_over_file_values_win() {
        let env = SshConfig::from_lookup(lookup_from(&[
            ("SSH_ASKPASS", "/env/askpass"),
            ("SSH_ASKPASS_REQUIRE", "force"),
            ("TESSERA_SSH_USE_AGENT", "1"),
        ]));
        let mut file = tempfile::NamedTempFile::new().expect("should create temp file");
        writeln!(
            file,
            "use_agent = false\n\n[askpass]\nprogram = \"/file/askpass\"\nrequire = \"never\""
        )
        .unwrap();

        let config = SshConfig::load_over(file.path(), &env).expect("should load config");
        assert!(!config.use_agent);
        assert_eq!(config.askpass.program, Some(PathBuf::from("/file/askpass")));
        assert_eq!(config.askpass.require, AskpassRequire::Never);
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_load_missing_file() {
        let err = SshConfig::load(Path::new("/nonexistent/tessera.toml")).unwrap_err();
        assert!(matches!(err, SshError::Config(_)));
    }
}
