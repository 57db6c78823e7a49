//! Candidate, probe and per-country data models

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default rendering of an accepted entry
pub const DEFAULT_OUTPUT_FORMAT: &str = "{address}#{country}#延迟:{latency}ms";

/// Returns true for a two-letter uppercase ASCII country code
pub fn is_country_code(code: &str) -> bool {
    code.len() == 2 && code.bytes().all(|b| b.is_ascii_uppercase())
}

/// A parsed `host:port#CC` line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub address: String,
    pub country: String,
    pub raw_line: String,
}

impl Candidate {
    pub fn new(address: String, country: String, raw_line: String) -> Self {
        Self {
            address,
            country,
            raw_line,
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.address, self.country)
    }
}

/// Outcome of probing one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub address: String,
    pub valid: bool,
    pub latency_ms: Option<u64>,
}

impl ProbeResult {
    pub fn valid(address: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            address: address.into(),
            valid: true,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn invalid(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            valid: false,
            latency_ms: None,
        }
    }

    /// Latency of a valid result
    pub fn accepted_latency(&self) -> Option<u64> {
        if self.valid {
            self.latency_ms
        } else {
            None
        }
    }
}

/// A candidate admitted under its country's quota
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedEntry {
    pub candidate: Candidate,
    pub latency_ms: u64,
}

/// Work and results for a single country
#[derive(Debug, Clone, Default)]
pub struct CountryBucket {
    pub country: String,
    pub candidates: Vec<Candidate>,
    pub accepted: Vec<AcceptedEntry>,
    pub quota_met: bool,
}

impl CountryBucket {
    pub fn new(country: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            ..Default::default()
        }
    }
}

/// Per-country statistics of a scheduler run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountrySummary {
    pub country: String,
    pub candidates: usize,
    pub accepted: usize,
    pub probes: usize,
    pub cache_hits: usize,
    pub quota: usize,
    pub quota_met: bool,
}

/// Template used to render accepted entries.
///
/// Placeholders: `{address}`, `{country}`, `{latency}` and `{line}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFormat {
    template: String,
}

impl OutputFormat {
    pub fn new(template: impl Into<String>) -> Result<Self, ConfigError> {
        let template = template.into();
        if !template.contains("{address}") && !template.contains("{line}") {
            return Err(ConfigError::InvalidOutputFormat(template));
        }
        Ok(Self { template })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn render(&self, entry: &AcceptedEntry) -> String {
        self.template
            .replace("{address}", &entry.candidate.address)
            .replace("{country}", &entry.candidate.country)
            .replace("{latency}", &entry.latency_ms.to_string())
            .replace("{line}", &entry.candidate.to_string())
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self {
            template: DEFAULT_OUTPUT_FORMAT.to_string(),
        }
    }
}
