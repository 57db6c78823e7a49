//! Error types for parsing, probing and configuration

use thiserror::Error;

/// Why a candidate line was dropped before reaching the scheduler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty line")]
    Empty,

    #[error("comment line")]
    Comment,

    #[error("masked or truncated entry")]
    Masked,

    #[error("missing trailing two-letter country code")]
    MissingCountry,

    #[error("malformed address: {0}")]
    MalformedAddress(String),

    #[error("port {found} filtered out (required {required})")]
    PortFiltered { found: u16, required: u16 },
}

/// Failure of a single call to the probe service.
///
/// Never escapes the probe client; it is downgraded to an invalid result.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("probe service answered with status {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed probe response: {0}")]
    Malformed(String),

    #[error("probe timed out")]
    Timeout,
}

/// Invalid validator settings, reported before any probing starts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("quota per country must be positive")]
    ZeroQuota,

    #[error("concurrency width must be positive")]
    ZeroConcurrency,

    #[error("probe timeout must be positive")]
    ZeroTimeout,

    #[error("country parallelism must be positive")]
    ZeroCountryParallelism,

    #[error("invalid country code in quota override: {0:?}")]
    InvalidCountryCode(String),

    #[error("output format must contain {{address}} or {{line}}: {0:?}")]
    InvalidOutputFormat(String),
}
