//! Node configuration.
//!
//! Read from a TOML file. Secrets can be supplied through the environment
//! instead so they stay out of the file:
//!
//! | Variable | Overrides |
//! |---|---|
//! | `CERTCHAIN_WEBHOOK_SECRET` | `secrets.webhook_secret` |
//! | `CERTCHAIN_MASTER_KEY` | `secrets.master_key` |

use certchain_confirmation::SweepConfig;
use certchain_issuance::IssuanceConfig;
use certchain_resolver::ResolverConfig;
use certchain_revocation::RevocationConfig;
use certchain_tenancy::RegistryConfig;
use certchain_types::{Student, TenantProfile};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const WEBHOOK_SECRET_ENV: &str = "CERTCHAIN_WEBHOOK_SECRET";
pub const MASTER_KEY_ENV: &str = "CERTCHAIN_MASTER_KEY";

/// Errors loading node configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Durations written as humantime strings ("10s", "1m 30s").
mod duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Sections
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Default tracing filter; `RUST_LOG` wins when set.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecretsConfig {
    /// HMAC key shared with the ledger webhook sender.
    pub webhook_secret: Option<String>,
    /// Hex AES-256 key for `enc:v1:` connection descriptors.
    pub master_key: Option<String>,
}

impl fmt::Debug for SecretsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("SecretsConfig")
            .field("webhook_secret", &mask(&self.webhook_secret))
            .field("master_key", &mask(&self.master_key))
            .finish()
    }
}

/// Remote ledger and indexer. Without this section the node runs against
/// an in-process simulated ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerEndpoints {
    pub ledger_url: String,
    /// DAS JSON-RPC endpoint.
    pub indexer_url: String,
    #[serde(with = "duration", default = "default_request_timeout")]
    pub request_timeout: Duration,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrySection {
    #[serde(with = "duration")]
    pub connect_timeout: Duration,
    #[serde(with = "duration")]
    pub health_timeout: Duration,
}

impl Default for RegistrySection {
    fn default() -> Self {
        let defaults = RegistryConfig::default();
        Self {
            connect_timeout: defaults.connect_timeout,
            health_timeout: defaults.health_timeout,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IssuanceSection {
    #[serde(with = "duration")]
    pub submit_timeout: Duration,
    pub metadata_base_uri: String,
}

impl Default for IssuanceSection {
    fn default() -> Self {
        let defaults = IssuanceConfig::default();
        Self {
            submit_timeout: defaults.submit_timeout,
            metadata_base_uri: defaults.metadata_base_uri,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RevocationSection {
    #[serde(with = "duration")]
    pub burn_timeout: Duration,
}

impl Default for RevocationSection {
    fn default() -> Self {
        Self {
            burn_timeout: RevocationConfig::default().burn_timeout,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverSection {
    pub max_attempts: u32,
    #[serde(with = "duration")]
    pub retry_delay: Duration,
    #[serde(with = "duration")]
    pub query_timeout: Duration,
}

impl Default for ResolverSection {
    fn default() -> Self {
        let defaults = ResolverConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            retry_delay: defaults.retry_delay,
            query_timeout: defaults.query_timeout,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepSection {
    /// Run the periodic sweep while serving.
    pub enabled: bool,
    #[serde(with = "duration")]
    pub interval: Duration,
    pub max_concurrency: usize,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            max_concurrency: SweepConfig::default().max_concurrency,
        }
    }
}

/// A tenant seeded into the node's in-memory stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantFixture {
    #[serde(flatten)]
    pub profile: TenantProfile,
    #[serde(default)]
    pub students: Vec<Student>,
}

// ═══════════════════════════════════════════════════════════════════════════
// NodeConfig
// ═══════════════════════════════════════════════════════════════════════════

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    pub server: ServerConfig,
    pub secrets: SecretsConfig,
    pub ledger: Option<LedgerEndpoints>,
    pub registry: RegistrySection,
    pub issuance: IssuanceSection,
    pub revocation: RevocationSection,
    pub resolver: ResolverSection,
    pub sweep: SweepSection,
    pub tenants: Vec<TenantFixture>,
}

impl NodeConfig {
    /// Read, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Replace secrets with values from `lookup` when present and non-empty.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(secret) = lookup(WEBHOOK_SECRET_ENV) {
            self.secrets.webhook_secret = Some(secret);
        }
        if let Some(key) = lookup(MASTER_KEY_ENV) {
            self.secrets.master_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolver.max_attempts == 0 {
            return Err(ConfigError::Invalid("resolver.max_attempts must be at least 1".into()));
        }
        if self.sweep.max_concurrency == 0 {
            return Err(ConfigError::Invalid("sweep.max_concurrency must be at least 1".into()));
        }
        if self.sweep.interval.is_zero() {
            return Err(ConfigError::Invalid("sweep.interval must be positive".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for tenant in &self.tenants {
            if !seen.insert(&tenant.profile.tenant_id) {
                return Err(ConfigError::Invalid(format!(
                    "{} is configured twice",
                    tenant.profile.tenant_id
                )));
            }
        }
        Ok(())
    }

    pub fn webhook_secret(&self) -> Result<&str, ConfigError> {
        self.secrets
            .webhook_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "webhook secret is not set (secrets.webhook_secret or {WEBHOOK_SECRET_ENV})"
                ))
            })
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig::default()
            .with_connect_timeout(self.registry.connect_timeout)
            .with_health_timeout(self.registry.health_timeout)
    }

    pub fn issuance_config(&self) -> IssuanceConfig {
        IssuanceConfig::default()
            .with_submit_timeout(self.issuance.submit_timeout)
            .with_metadata_base_uri(self.issuance.metadata_base_uri.clone())
    }

    pub fn revocation_config(&self) -> RevocationConfig {
        RevocationConfig::default().with_burn_timeout(self.revocation.burn_timeout)
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig::default()
            .with_max_attempts(self.resolver.max_attempts)
            .with_retry_delay(self.resolver.retry_delay)
            .with_query_timeout(self.resolver.query_timeout)
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig::with_max_concurrency(self.sweep.max_concurrency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const SAMPLE: &str = r#"
[server]
bind = "127.0.0.1:9100"

[secrets]
webhook_secret = "from-file"

[resolver]
max_attempts = 3
retry_delay = "500ms"

[sweep]
interval = "5m"

[[tenants]]
tenant_id = "mit"
routing_code = "MIT"
descriptor = "memory://mit"
tree_id = "tree-mit"
authority = "auth-mit"

[[tenants.students]]
id = "s1"
full_name = "Ada Lovelace"
department = "Computer Science"
wallet_address = "w1"
"#;

    #[test]
    fn test_parse_sample() {
        let config = NodeConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.server.bind, "127.0.0.1:9100".parse().unwrap());
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.resolver.max_attempts, 3);
        assert_eq!(config.resolver.retry_delay, Duration::from_millis(500));
        assert_eq!(config.resolver.query_timeout, Duration::from_secs(10));
        assert_eq!(config.sweep.interval, Duration::from_secs(300));
        assert!(config.ledger.is_none());

        let tenant = &config.tenants[0];
        assert!(tenant.profile.active);
        assert_eq!(tenant.profile.routing_code, "MIT");
        assert_eq!(tenant.students[0].wallet_address.as_ref().unwrap().as_str(), "w1");
        assert_eq!(config.resolver_config().max_attempts, 3);
    }

    #[test]
    fn test_unknown_keys_and_bad_values_are_rejected() {
        assert!(matches!(
            NodeConfig::from_toml_str("[server]\nport = 1\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            NodeConfig::from_toml_str("[resolver]\nretry_delay = \"soon\"\n"),
            Err(ConfigError::Parse(_))
        ));

        let zero = NodeConfig::from_toml_str("[sweep]\nmax_concurrency = 0\n").unwrap();
        assert!(matches!(zero.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_env_overrides_secrets() {
        let mut config = NodeConfig::from_toml_str(SAMPLE).unwrap();
        config.apply_env_overrides(|key| match key {
            WEBHOOK_SECRET_ENV => Some("from-env".into()),
            MASTER_KEY_ENV => Some(String::new()),
            _ => None,
        });

        assert_eq!(config.webhook_secret().unwrap(), "from-env");
        assert!(config.secrets.master_key.is_none());
    }

    #[test]
    fn test_secrets_are_masked_in_debug() {
        let config = NodeConfig::from_toml_str(SAMPLE).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("from-file"));
        assert!(debug.contains("***"));
    }

    #[test]
    #[serial]
    fn test_load_reads_file_and_process_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        std::env::set_var(WEBHOOK_SECRET_ENV, "process-env");
        let loaded = NodeConfig::load(file.path());
        std::env::remove_var(WEBHOOK_SECRET_ENV);

        assert_eq!(loaded.unwrap().webhook_secret().unwrap(), "process-env");
    }

    #[test]
    #[serial]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = NodeConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
