use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// TLS material read once at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub key: PathBuf,
    pub cert: PathBuf,
    /// Intermediate certificates appended after `cert`.
    pub chain: Vec<PathBuf>,
}

/// Push server configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the listener binds to.
    pub port: u16,
    /// Serve over TLS when set, plain otherwise.
    pub tls: Option<TlsConfig>,
    /// Fallback `EnvFilter` directive when `RUST_LOG` is unset.
    pub log_level: String,
    /// Account site used to verify sessions.
    pub account_api_host: String,
    pub account_api_port: u16,
    /// Upper bound on a single account lookup.
    pub verify_timeout: Duration,
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: Option<String>,
    /// Database holding the push pub/sub channels.
    pub redis_collab_db: i64,
    /// Database mapping session tokens to user ids.
    pub redis_session_db: i64,
    /// Channel prefix, e.g. `komob-push`.
    pub channel_prefix: String,
    /// Protocol versions clients may announce in `komob_auth`.
    pub supported_versions: HashSet<String>,
    /// Connections not authenticated within this window are dropped.
    pub handshake_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let tls = match (var("TLS_KEY"), var("TLS_CERT")) {
            (Some(key), Some(cert)) => Some(TlsConfig {
                key: key.into(),
                cert: cert.into(),
                chain: var("TLS_CA")
                    .map(|v| split_list(&v).map(PathBuf::from).collect())
                    .unwrap_or_default(),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };

        let supported_versions: HashSet<String> = var("SUPPORTED_KOMOB_VERSIONS")
            .as_deref()
            .map(|v| split_list(v).map(str::to_string).collect())
            .unwrap_or_else(|| HashSet::from(["3".to_string()]));
        if supported_versions.is_empty() {
            return Err(ConfigError::NoSupportedVersions);
        }

        let heartbeat_interval: u64 = parse_or(&var, "HEARTBEAT_INTERVAL_SECS", 7)?;
        if heartbeat_interval == 0 {
            return Err(ConfigError::Invalid {
                name: "HEARTBEAT_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            port: parse_or(&var, "PORT", 8003)?,
            tls,
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "warn".to_string()),
            account_api_host: var("ACCOUNT_API_HOST")
                .unwrap_or_else(|| "account.activestate.com".to_string()),
            account_api_port: parse_or(&var, "ACCOUNT_API_PORT", 80)?,
            verify_timeout: Duration::from_secs(parse_or(&var, "VERIFY_TIMEOUT_SECS", 10)?),
            redis_host: var("REDIS_HOST").unwrap_or_else(|| "localhost".to_string()),
            redis_port: parse_or(&var, "REDIS_PORT", 6379)?,
            redis_password: var("REDIS_PASSWORD"),
            redis_collab_db: parse_or(&var, "REDIS_COLLAB_DB", 0)?,
            redis_session_db: parse_or(&var, "REDIS_SESSION_DB", 1)?,
            channel_prefix: var("PUSH_CHANNEL_PREFIX").unwrap_or_else(|| "komob-push".to_string()),
            supported_versions,
            handshake_timeout: Duration::from_secs(parse_or(&var, "HANDSHAKE_TIMEOUT_SECS", 30)?),
            heartbeat_interval: Duration::from_secs(heartbeat_interval),
            heartbeat_timeout: Duration::from_secs(parse_or(&var, "HEARTBEAT_TIMEOUT_SECS", 10)?),
        })
    }

    /// Base URL of the account API, without a trailing slash.
    pub fn account_api_url(&self) -> String {
        format!("http://{}:{}", self.account_api_host, self.account_api_port)
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_or<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_match_production_layout() {
        let config = load(&[]).unwrap();
        assert_eq!(config.port, 8003);
        assert!(config.tls.is_none());
        assert_eq!(config.redis_collab_db, 0);
        assert_eq!(config.redis_session_db, 1);
        assert_eq!(config.channel_prefix, "komob-push");
        assert!(config.supported_versions.contains("3"));
        assert_eq!(config.supported_versions.len(), 1);
        assert_eq!(config.account_api_url(), "http://account.activestate.com:80");
    }

    #[test]
    fn tls_with_chain() {
        let config = load(&[
            ("TLS_KEY", "/etc/tls/server.key"),
            ("TLS_CERT", "/etc/tls/server.crt"),
            ("TLS_CA", "/etc/tls/ca1.crt, /etc/tls/ca2.crt"),
        ])
        .unwrap();
        let tls = config.tls.unwrap();
        assert_eq!(tls.key, PathBuf::from("/etc/tls/server.key"));
        assert_eq!(tls.chain.len(), 2);
        assert_eq!(tls.chain[1], PathBuf::from("/etc/tls/ca2.crt"));
    }

    #[test]
    fn tls_key_without_cert_is_rejected() {
        let err = load(&[("TLS_KEY", "/etc/tls/server.key")]).unwrap_err();
        assert!(matches!(err, ConfigError::IncompleteTls));
    }

    #[test]
    fn version_list_is_split_and_trimmed() {
        let config = load(&[("SUPPORTED_KOMOB_VERSIONS", "3, 4,,")]).unwrap();
        assert!(config.supported_versions.contains("3"));
        assert!(config.supported_versions.contains("4"));
        assert_eq!(config.supported_versions.len(), 2);
    }

    #[test]
    fn bad_number_names_the_variable() {
        let err = load(&[("PORT", "eighty")]).unwrap_err();
        match err {
            ConfigError::Invalid { name, value } => {
                assert_eq!(name, "PORT");
                assert_eq!(value, "eighty");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn zero_heartbeat_interval_is_rejected() {
        let err = load(&[("HEARTBEAT_INTERVAL_SECS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "HEARTBEAT_INTERVAL_SECS", .. }));
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let config = load(&[("REDIS_PASSWORD", ""), ("PORT", " ")]).unwrap();
        assert!(config.redis_password.is_none());
        assert_eq!(config.port, 8003);
    }
}
