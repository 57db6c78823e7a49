//! Validator wiring worklist, scheduler and aggregator into one run

use crate::error::ConfigError;
use crate::proxy::aggregator::Aggregator;
use crate::proxy::cache::ProbeCache;
use crate::proxy::models::{is_country_code, Candidate, CountrySummary, OutputFormat};
use crate::proxy::probe::{ProbeClient, ProbeService, DEFAULT_PROBE_TIMEOUT_SECS};
use crate::proxy::scheduler::{ProbeEvent, QuotaScheduler, DEFAULT_CONCURRENCY};
use crate::proxy::worklist::CountryWorklist;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;
use uuid::Uuid;

/// Default number of accepted entries per country
pub const DEFAULT_QUOTA_PER_COUNTRY: usize = 3;

/// Configuration for a validation run
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Accepted entries kept per country
    pub quota_per_country: usize,
    /// Probes in flight per batch
    pub concurrency_width: usize,
    /// Ceiling for a single probe
    pub probe_timeout: Duration,
    /// Per-country quota overrides; 0 excludes a country
    pub country_quotas: HashMap<String, usize>,
    /// Countries processed at the same time
    pub country_parallelism: usize,
    /// Rendering of accepted entries
    pub output_format: OutputFormat,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            quota_per_country: DEFAULT_QUOTA_PER_COUNTRY,
            concurrency_width: DEFAULT_CONCURRENCY,
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            country_quotas: HashMap::new(),
            country_parallelism: 1,
            output_format: OutputFormat::default(),
        }
    }
}

impl ValidatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(mut self, quota: usize) -> Self {
        self.quota_per_country = quota;
        self
    }

    pub fn with_concurrency(mut self, width: usize) -> Self {
        self.concurrency_width = width;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_country_quota(mut self, country: impl Into<String>, quota: usize) -> Self {
        self.country_quotas.insert(country.into(), quota);
        self
    }

    pub fn with_country_parallelism(mut self, parallelism: usize) -> Self {
        self.country_parallelism = parallelism;
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Quota applying to `country`
    pub fn quota_for(&self, country: &str) -> usize {
        self.country_quotas
            .get(country)
            .copied()
            .unwrap_or(self.quota_per_country)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quota_per_country == 0 {
            return Err(ConfigError::ZeroQuota);
        }
        if self.concurrency_width == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.probe_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.country_parallelism == 0 {
            return Err(ConfigError::ZeroCountryParallelism);
        }
        if let Some(code) = self.country_quotas.keys().find(|c| !is_country_code(c)) {
            return Err(ConfigError::InvalidCountryCode(code.clone()));
        }
        Ok(())
    }
}

/// Outcome of a validation run
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Per-country statistics, countries ascending
    pub countries: Vec<CountrySummary>,
    /// Rendered output lines, grouped by ascending country
    pub lines: Vec<String>,
}

impl ValidationReport {
    pub fn total_probes(&self) -> usize {
        self.countries.iter().map(|c| c.probes).sum()
    }

    pub fn total_accepted(&self) -> usize {
        self.countries.iter().map(|c| c.accepted).sum()
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Country-quota proxy validator
pub struct Validator {
    config: ValidatorConfig,
    scheduler: QuotaScheduler,
}

impl Validator {
    /// Create a validator; settings are checked before anything is probed
    pub fn new(config: ValidatorConfig, service: Arc<dyn ProbeService>) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = ProbeClient::new(service, config.probe_timeout);
        let scheduler = QuotaScheduler::new(client, ProbeCache::new(), config.concurrency_width);
        Ok(Self { config, scheduler })
    }

    /// Use a (possibly warm) shared cache
    pub fn with_cache(mut self, cache: ProbeCache) -> Self {
        self.scheduler = self.scheduler.with_cache(cache);
        self
    }

    /// Send progress events to `tx`
    pub fn with_events(mut self, tx: UnboundedSender<ProbeEvent>) -> Self {
        self.scheduler = self.scheduler.with_events(tx);
        self
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn cache(&self) -> &ProbeCache {
        self.scheduler.cache()
    }

    /// Validate candidates and render the accepted entries
    pub async fn validate(&self, candidates: Vec<Candidate>) -> ValidationReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let worklist = CountryWorklist::from_candidates(candidates);
        info!(
            %run_id,
            countries = worklist.len(),
            candidates = worklist.candidate_count(),
            "validation started"
        );

        let results: Vec<_> = stream::iter(worklist.into_buckets())
            .map(|bucket| {
                let quota = self.config.quota_for(&bucket.country);
                self.scheduler.run(bucket, quota)
            })
            .buffer_unordered(self.config.country_parallelism)
            .collect()
            .await;

        let (buckets, mut countries): (Vec<_>, Vec<_>) = results.into_iter().unzip();
        countries.sort_by(|a: &CountrySummary, b| a.country.cmp(&b.country));
        let lines = Aggregator::aggregate(buckets, &self.config.output_format);

        let report = ValidationReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            countries,
            lines,
        };
        info!(
            %run_id,
            accepted = report.total_accepted(),
            probes = report.total_probes(),
            elapsed_ms = report.elapsed().num_milliseconds(),
            "validation finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::testing::{candidate, MockProbeService};

    fn validator(mock: &Arc<MockProbeService>, config: ValidatorConfig) -> Validator {
        let service: Arc<dyn ProbeService> = mock.clone();
        Validator::new(config, service).unwrap()
    }

    fn candidates(lines: &[&str]) -> Vec<Candidate> {
        lines.iter().map(|line| candidate(line)).collect()
    }

    fn sorted(mut lines: Vec<String>) -> Vec<String> {
        lines.sort();
        lines
    }

    #[test]
    fn test_config_default() {
        let config = ValidatorConfig::default();
        assert_eq!(config.quota_per_country, DEFAULT_QUOTA_PER_COUNTRY);
        assert_eq!(config.concurrency_width, DEFAULT_CONCURRENCY);
        assert_eq!(config.probe_timeout, Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS));
        assert_eq!(config.country_parallelism, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ValidatorConfig::new()
            .with_quota(5)
            .with_concurrency(20)
            .with_timeout(Duration::from_secs(6))
            .with_country_quota("US", 1)
            .with_country_parallelism(4);

        assert_eq!(config.quota_for("US"), 1);
        assert_eq!(config.quota_for("NL"), 5);
        assert_eq!(config.concurrency_width, 20);
        assert_eq!(config.probe_timeout, Duration::from_secs(6));
        assert_eq!(config.country_parallelism, 4);
    }

    #[test]
    fn test_config_rejects_invalid_values() {
        assert_eq!(
            ValidatorConfig::new().with_quota(0).validate(),
            Err(ConfigError::ZeroQuota)
        );
        assert_eq!(
            ValidatorConfig::new().with_concurrency(0).validate(),
            Err(ConfigError::ZeroConcurrency)
        );
        assert_eq!(
            ValidatorConfig::new().with_timeout(Duration::ZERO).validate(),
            Err(ConfigError::ZeroTimeout)
        );
        assert_eq!(
            ValidatorConfig::new().with_country_parallelism(0).validate(),
            Err(ConfigError::ZeroCountryParallelism)
        );
        assert_eq!(
            ValidatorConfig::new().with_country_quota("usa", 1).validate(),
            Err(ConfigError::InvalidCountryCode("usa".to_string()))
        );
    }

    #[test]
    fn test_validator_rejects_config_before_probing() {
        let mock = Arc::new(MockProbeService::new());
        let service: Arc<dyn ProbeService> = mock.clone();
        let result = Validator::new(ValidatorConfig::new().with_quota(0), service);
        assert!(matches!(result, Err(ConfigError::ZeroQuota)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_end_to_end_example() {
        let mock = Arc::new(
            MockProbeService::new()
                .with_valid("1.1.1.1:443", 50)
                .with_valid("3.3.3.3:443", 80)
                .with_delay("1.1.1.1:443", Duration::from_millis(20))
                .with_delay("3.3.3.3:443", Duration::from_millis(20)),
        );
        let validator = validator(&mock, ValidatorConfig::new().with_quota(2).with_concurrency(3));

        let report = validator
            .validate(candidates(&["1.1.1.1:443#US", "2.2.2.2:443#US", "3.3.3.3:443#US"]))
            .await;

        assert_eq!(
            sorted(report.lines.clone()),
            vec!["1.1.1.1:443#US#延迟:50ms", "3.3.3.3:443#US#延迟:80ms"]
        );
        assert_eq!(mock.calls_for("2.2.2.2:443"), 1);
        assert_eq!(report.countries.len(), 1);
        assert_eq!(report.countries[0].accepted, 2);
    }

    #[tokio::test]
    async fn test_output_grouped_by_country() {
        let mock = Arc::new(
            MockProbeService::new()
                .with_valid("1.1.1.1:443", 10)
                .with_valid("2.2.2.2:443", 20)
                .with_valid("3.3.3.3:443", 30),
        );
        let validator = validator(&mock, ValidatorConfig::new());

        let report = validator
            .validate(candidates(&["1.1.1.1:443#US", "2.2.2.2:443#NL", "3.3.3.3:443#IN"]))
            .await;

        let countries: Vec<_> = report
            .lines
            .iter()
            .map(|line| line.split('#').nth(1).unwrap())
            .collect();
        assert_eq!(countries, vec!["IN", "NL", "US"]);
        let summary_countries: Vec<_> = report.countries.iter().map(|c| c.country.as_str()).collect();
        assert_eq!(summary_countries, vec!["IN", "NL", "US"]);
    }

    #[tokio::test]
    async fn test_parallel_countries_keep_order_and_quota() {
        let mut mock = MockProbeService::new();
        let mut lines = Vec::new();
        for (n, country) in ["US", "NL", "IN", "JP", "DE"].iter().enumerate() {
            for i in 0..6 {
                let address = format!("10.{}.0.{}:443", n, i);
                mock = mock.with_valid(&address, 10);
                lines.push(format!("{}#{}", address, country));
            }
        }
        let mock = Arc::new(mock);
        let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
        let validator = validator(
            &mock,
            ValidatorConfig::new()
                .with_quota(2)
                .with_concurrency(3)
                .with_country_parallelism(3),
        );

        let report = validator.validate(candidates(&lines)).await;

        assert_eq!(report.lines.len(), 10);
        let countries: Vec<_> = report.countries.iter().map(|c| c.country.as_str()).collect();
        assert_eq!(countries, vec!["DE", "IN", "JP", "NL", "US"]);
        assert!(report.countries.iter().all(|c| c.accepted == 2));
        let mut groups: Vec<&str> = report
            .lines
            .iter()
            .map(|line| line.split('#').nth(1).unwrap())
            .collect();
        groups.dedup();
        assert_eq!(groups, vec!["DE", "IN", "JP", "NL", "US"]);
    }

    #[tokio::test]
    async fn test_zero_country_quota_omits_country() {
        let mock = Arc::new(
            MockProbeService::new()
                .with_valid("1.1.1.1:443", 10)
                .with_valid("2.2.2.2:443", 20),
        );
        let validator = validator(&mock, ValidatorConfig::new().with_country_quota("US", 0));

        let report = validator
            .validate(candidates(&["1.1.1.1:443#US", "2.2.2.2:443#NL"]))
            .await;

        assert_eq!(report.lines, vec!["2.2.2.2:443#NL#延迟:20ms"]);
        assert_eq!(mock.calls_for("1.1.1.1:443"), 0);
    }

    #[tokio::test]
    async fn test_address_shared_across_countries_probed_once() {
        let mock = Arc::new(MockProbeService::new().with_valid("1.1.1.1:443", 10));
        let validator = validator(&mock, ValidatorConfig::new());

        let report = validator
            .validate(candidates(&["1.1.1.1:443#US", "1.1.1.1:443#NL"]))
            .await;

        assert_eq!(report.lines.len(), 2);
        assert_eq!(mock.calls_for("1.1.1.1:443"), 1);
    }

    #[tokio::test]
    async fn test_warm_cache_rerun_is_idempotent() {
        let mock = Arc::new(
            MockProbeService::new()
                .with_valid("1.1.1.1:443", 10)
                .with_valid("4.4.4.4:443", 40)
                .with_valid("5.5.5.5:443", 50),
        );
        let input = [
            "1.1.1.1:443#US",
            "2.2.2.2:443#US",
            "3.3.3.3:443#NL",
            "4.4.4.4:443#NL",
            "5.5.5.5:443#NL",
        ];
        let validator = validator(&mock, ValidatorConfig::new().with_quota(2));

        let first = validator.validate(candidates(&input)).await;
        let calls_after_first = mock.call_count();
        let second = validator.validate(candidates(&input)).await;

        assert_eq!(mock.call_count(), calls_after_first);
        assert_eq!(second.total_probes(), 0);
        assert_eq!(sorted(first.lines), sorted(second.lines));
    }

    #[tokio::test]
    async fn test_with_cache_uses_given_results() {
        let mock = Arc::new(MockProbeService::new());
        let cache = ProbeCache::from_results(vec![crate::proxy::models::ProbeResult::valid(
            "7.7.7.7:443",
            70,
        )]);
        let validator = validator(&mock, ValidatorConfig::new()).with_cache(cache);

        let report = validator.validate(candidates(&["7.7.7.7:443#JP"])).await;

        assert_eq!(report.lines, vec!["7.7.7.7:443#JP#延迟:70ms"]);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let mock = Arc::new(MockProbeService::new());
        let validator = validator(&mock, ValidatorConfig::new());

        let report = validator.validate(Vec::new()).await;

        assert!(report.lines.is_empty());
        assert!(report.countries.is_empty());
        assert_eq!(mock.call_count(), 0);
    }
}
