//! Probe client for checking candidate reachability and latency

use crate::error::ProbeError;
use crate::proxy::models::ProbeResult;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default timeout for a single probe in seconds
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

/// Default check API; `{}` is replaced by the `ip:port` being probed
pub const DEFAULT_CHECK_API: &str = "https://check.proxyip.cmliussss.net/check?proxyip={}";

/// Default delay before the first retry of a failed request
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Shortest request timeout handed to a single attempt
const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(500);

/// Request timeout for one of `attempts` sharing a probe's `total` budget
pub fn attempt_timeout(total: Duration, attempts: u32) -> Duration {
    (total / attempts.max(1)).max(MIN_ATTEMPT_TIMEOUT)
}

/// Answer of the probe service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, rename = "responseTime")]
    pub response_time: Option<Value>,
}

impl ProbeResponse {
    pub fn success(latency_ms: u64) -> Self {
        Self {
            success: true,
            response_time: Some(Value::from(latency_ms)),
        }
    }

    pub fn failure() -> Self {
        Self::default()
    }

    /// Reported latency in milliseconds.
    ///
    /// The service sends either a number or a numeric string.
    pub fn latency_ms(&self) -> Result<Option<u64>, ProbeError> {
        let Some(value) = &self.response_time else {
            return Ok(None);
        };
        let millis = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Null => return Ok(None),
            _ => None,
        };
        match millis {
            Some(ms) if ms.is_finite() && ms >= 0.0 => Ok(Some(ms.round() as u64)),
            _ => Err(ProbeError::Malformed(format!("responseTime: {}", value))),
        }
    }

    /// Normalize into a probe result; unsuccessful or latency-less answers are invalid
    pub fn into_result(self, address: &str) -> Result<ProbeResult, ProbeError> {
        if !self.success {
            return Ok(ProbeResult::invalid(address));
        }
        Ok(match self.latency_ms()? {
            Some(latency) => ProbeResult::valid(address, latency),
            None => ProbeResult::invalid(address),
        })
    }
}

/// Remote reachability and latency oracle
#[async_trait]
pub trait ProbeService: Send + Sync {
    /// Check one `ip:port` address
    async fn check(&self, address: &str) -> Result<ProbeResponse, ProbeError>;
}

/// Probe service backed by the HTTP check API
#[derive(Debug, Clone)]
pub struct HttpProbeService {
    client: Client,
    api_template: String,
}

impl HttpProbeService {
    /// Create a service for the given API template (`{}` marks the address)
    pub fn new(api_template: impl Into<String>, timeout: Duration) -> crate::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_template: api_template.into(),
        })
    }

    pub fn request_url(&self, address: &str) -> String {
        if self.api_template.contains("{}") {
            self.api_template.replace("{}", address)
        } else {
            format!("{}{}", self.api_template, address)
        }
    }
}

#[async_trait]
impl ProbeService for HttpProbeService {
    async fn check(&self, address: &str) -> Result<ProbeResponse, ProbeError> {
        let response = self.client.get(self.request_url(address)).send().await?;
        if !response.status().is_success() {
            return Err(ProbeError::Status(response.status()));
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ProbeError::Malformed(e.to_string()))
    }
}

/// Retries transport failures of an inner service with exponential backoff.
///
/// Unsuccessful answers and malformed bodies are returned as-is.
pub struct RetryingProbeService<S> {
    inner: S,
    attempts: u32,
    initial_delay: Duration,
}

impl<S: ProbeService> RetryingProbeService<S> {
    pub fn new(inner: S, attempts: u32) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            initial_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }
}

#[async_trait]
impl<S: ProbeService> ProbeService for RetryingProbeService<S> {
    async fn check(&self, address: &str) -> Result<ProbeResponse, ProbeError> {
        let mut delay = self.initial_delay;
        let mut attempt = 1;
        loop {
            match self.inner.check(address).await {
                Err(e @ (ProbeError::Http(_) | ProbeError::Status(_))) if attempt < self.attempts => {
                    debug!(address, attempt, error = %e, "probe attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Bounded single-shot probe of one address.
///
/// Every failure resolves to an invalid [`ProbeResult`].
#[derive(Clone)]
pub struct ProbeClient {
    service: Arc<dyn ProbeService>,
    timeout: Duration,
}

impl ProbeClient {
    pub fn new(service: Arc<dyn ProbeService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe a single address
    pub async fn probe(&self, address: &str) -> ProbeResult {
        let outcome = match tokio::time::timeout(self.timeout, self.service.check(address)).await {
            Ok(Ok(response)) => response.into_result(address),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ProbeError::Timeout),
        };

        match outcome {
            Ok(result) => {
                debug!(address, valid = result.valid, latency_ms = ?result.latency_ms, "probed");
                result
            }
            Err(e) => {
                debug!(address, error = %e, "probe failed");
                ProbeResult::invalid(address)
            }
        }
    }
}
