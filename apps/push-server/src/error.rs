use std::path::PathBuf;

use thiserror::Error;

/// Rejected configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has invalid value `{value}`")]
    Invalid { name: &'static str, value: String },
    #[error("TLS_KEY and TLS_CERT must be set together")]
    IncompleteTls,
    #[error("SUPPORTED_KOMOB_VERSIONS lists no versions")]
    NoSupportedVersions,
}

/// Failure talking to the session lookup store.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("session store error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Errors that stop the server from starting or keep it from running.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no private key found in {0}")]
    MissingKey(PathBuf),
    #[error("invalid TLS configuration: {0}")]
    Tls(#[from] rustls::Error),
    #[error("invalid redis configuration: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("invalid account API URL: {0}")]
    AccountUrl(String),
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
