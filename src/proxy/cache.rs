//! Probe cache memoizing outcomes by address

use crate::proxy::models::ProbeResult;
use crate::Result;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<ProbeResult>>;

/// Append-only cache of probe outcomes shared by all workers of a run.
///
/// Each address owns a once-cell, so concurrent requests for the same
/// address wait on a single in-flight probe instead of issuing their own.
#[derive(Clone, Default)]
pub struct ProbeCache {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl ProbeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a warm cache from earlier results
    pub fn from_results<I: IntoIterator<Item = ProbeResult>>(results: I) -> Self {
        let cache = Self::new();
        for result in results {
            cache.store(result);
        }
        cache
    }

    fn slot(&self, address: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(address.to_string()).or_default())
    }

    /// Completed outcome for an address, if any
    pub fn lookup(&self, address: &str) -> Option<ProbeResult> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(address).and_then(|slot| slot.get().cloned())
    }

    /// Record an outcome; the first stored outcome for an address wins
    pub fn store(&self, result: ProbeResult) {
        let slot = self.slot(&result.address);
        let _ = slot.set(result);
    }

    /// Return the cached outcome or run `probe` to produce it.
    ///
    /// The second value is true when this call ran the probe itself.
    pub async fn get_or_probe<F, Fut>(&self, address: &str, probe: F) -> (ProbeResult, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProbeResult>,
    {
        let slot = self.slot(address);
        let mut probed = false;
        let flag = &mut probed;
        let result = slot
            .get_or_init(move || async move {
                *flag = true;
                probe().await
            })
            .await
            .clone();
        (result, probed)
    }

    /// Number of completed outcomes
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Completed outcomes ordered by address
    pub fn snapshot(&self) -> BTreeMap<String, ProbeResult> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .iter()
            .filter_map(|(address, slot)| slot.get().map(|r| (address.clone(), r.clone())))
            .collect()
    }

    /// Load a cache saved by [`ProbeCache::save`]; a missing file yields an empty cache
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await? {
            return Ok(Self::new());
        }
        let content = tokio::fs::read_to_string(path).await?;
        let results: Vec<ProbeResult> = serde_json::from_str(&content)?;
        Ok(Self::from_results(results))
    }

    /// Persist completed outcomes as JSON
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let results: Vec<ProbeResult> = self.snapshot().into_values().collect();
        let content = serde_json::to_string_pretty(&results)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
