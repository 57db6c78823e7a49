//! Call-counting probe service used by the scheduler and validator tests

use crate::error::ProbeError;
use crate::proxy::models::Candidate;
use crate::proxy::probe::{ProbeResponse, ProbeService};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub(crate) struct MockProbeService {
    latencies: HashMap<String, u64>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
}

impl MockProbeService {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Mark an address valid; unknown addresses answer unsuccessfully
    pub(crate) fn with_valid(mut self, address: &str, latency_ms: u64) -> Self {
        self.latencies.insert(address.to_string(), latency_ms);
        self
    }

    pub(crate) fn with_delay(mut self, address: &str, delay: Duration) -> Self {
        self.delays.insert(address.to_string(), delay);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn calls_for(&self, address: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.as_str() == address)
            .count()
    }
}

#[async_trait]
impl ProbeService for MockProbeService {
    async fn check(&self, address: &str) -> Result<ProbeResponse, ProbeError> {
        self.calls.lock().unwrap().push(address.to_string());
        if let Some(delay) = self.delays.get(address) {
            tokio::time::sleep(*delay).await;
        }
        Ok(match self.latencies.get(address) {
            Some(latency) => ProbeResponse::success(*latency),
            None => ProbeResponse::failure(),
        })
    }
}

/// Build a candidate from an `address#CC` line
pub(crate) fn candidate(line: &str) -> Candidate {
    let (address, country) = line.split_once('#').expect("line must contain #");
    Candidate::new(address.to_string(), country.to_string(), line.to_string())
}
