//! ProxyIP Quota - Country-Quota Proxy Validator
//!
//! Validates large `host:port#CC` candidate lists against a remote check
//! service, keeping up to N reachable entries per country while issuing as
//! few probes as possible.

pub mod error;
pub mod proxy;
pub mod tui;

pub use error::{ConfigError, ParseError, ProbeError};
pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
