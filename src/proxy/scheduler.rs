//! Quota scheduler probing one country's candidates in bounded batches

use crate::proxy::cache::ProbeCache;
use crate::proxy::models::{AcceptedEntry, Candidate, CountryBucket, CountrySummary, ProbeResult};
use crate::proxy::probe::ProbeClient;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Default number of probes in flight per batch
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Progress notifications emitted while a run is in progress
#[derive(Debug, Clone)]
pub enum ProbeEvent {
    CountryStarted {
        country: String,
        candidates: usize,
        quota: usize,
    },
    Probed {
        country: String,
        result: ProbeResult,
        cached: bool,
    },
    Accepted {
        country: String,
        address: String,
        latency_ms: u64,
    },
    CountryFinished(CountrySummary),
}

#[derive(Clone, Default)]
struct EventSender(Option<UnboundedSender<ProbeEvent>>);

impl EventSender {
    fn send(&self, event: ProbeEvent) {
        if let Some(tx) = &self.0 {
            // A dropped receiver only means nobody is watching
            let _ = tx.send(event);
        }
    }
}

/// Serialized admission for one country.
///
/// The stop flag is raised under the same lock that admits the last slot,
/// so no two workers can both take it.
struct QuotaGate {
    quota: usize,
    accepted: Mutex<Vec<AcceptedEntry>>,
    stopped: AtomicBool,
    probes: AtomicUsize,
    cache_hits: AtomicUsize,
}

impl QuotaGate {
    fn new(quota: usize) -> Self {
        Self {
            quota,
            accepted: Mutex::new(Vec::with_capacity(quota)),
            stopped: AtomicBool::new(quota == 0),
            probes: AtomicUsize::new(0),
            cache_hits: AtomicUsize::new(0),
        }
    }

    fn is_met(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn try_admit(&self, candidate: &Candidate, latency_ms: u64) -> bool {
        let mut accepted = self.accepted.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_met() || accepted.len() >= self.quota {
            return false;
        }
        accepted.push(AcceptedEntry {
            candidate: candidate.clone(),
            latency_ms,
        });
        if accepted.len() >= self.quota {
            self.stopped.store(true, Ordering::Release);
        }
        true
    }

    fn take_accepted(&self) -> Vec<AcceptedEntry> {
        std::mem::take(&mut *self.accepted.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Drives concurrent probing of a country's candidates until its quota is met
#[derive(Clone)]
pub struct QuotaScheduler {
    client: ProbeClient,
    cache: ProbeCache,
    width: usize,
    events: EventSender,
}

impl QuotaScheduler {
    pub fn new(client: ProbeClient, cache: ProbeCache, width: usize) -> Self {
        Self {
            client,
            cache,
            width: width.max(1),
            events: EventSender::default(),
        }
    }

    pub fn with_cache(mut self, cache: ProbeCache) -> Self {
        self.cache = cache;
        self
    }

    /// Send progress events to `tx`
    pub fn with_events(mut self, tx: UnboundedSender<ProbeEvent>) -> Self {
        self.events = EventSender(Some(tx));
        self
    }

    pub fn cache(&self) -> &ProbeCache {
        &self.cache
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Probe `bucket`'s candidates batch by batch, admitting at most `quota`.
    ///
    /// Cached valid results are admitted without a network call. Once the
    /// quota is met, in-flight probes are left to finish in the background
    /// (their outcomes still land in the cache) but are never admitted, and
    /// no further batch is started.
    pub async fn run(&self, mut bucket: CountryBucket, quota: usize) -> (CountryBucket, CountrySummary) {
        let country = bucket.country.clone();
        let candidates = std::mem::take(&mut bucket.candidates);
        let total = candidates.len();
        let gate = Arc::new(QuotaGate::new(quota));

        self.events.send(ProbeEvent::CountryStarted {
            country: country.clone(),
            candidates: total,
            quota,
        });

        'batches: for (index, batch) in candidates.chunks(self.width).enumerate() {
            if gate.is_met() {
                break;
            }
            debug!(country = %country, batch = index, size = batch.len(), "starting batch");

            let mut workers = JoinSet::new();
            for candidate in batch {
                if gate.is_met() {
                    break;
                }
                if let Some(cached) = self.cache.lookup(&candidate.address) {
                    gate.cache_hits.fetch_add(1, Ordering::Relaxed);
                    admit(&gate, &self.events, candidate, &cached, true);
                    continue;
                }
                workers.spawn(probe_candidate(
                    self.client.clone(),
                    self.cache.clone(),
                    Arc::clone(&gate),
                    self.events.clone(),
                    candidate.clone(),
                ));
            }

            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    warn!(country = %country, error = %e, "probe worker failed");
                }
                if gate.is_met() {
                    debug!(country = %country, abandoned = workers.len(), "quota met");
                    workers.detach_all();
                    break 'batches;
                }
            }
        }

        bucket.accepted = gate.take_accepted();
        bucket.quota_met = bucket.accepted.len() >= quota;

        let summary = CountrySummary {
            country: country.clone(),
            candidates: total,
            accepted: bucket.accepted.len(),
            probes: gate.probes.load(Ordering::Relaxed),
            cache_hits: gate.cache_hits.load(Ordering::Relaxed),
            quota,
            quota_met: bucket.quota_met,
        };
        info!(
            country = %country,
            accepted = summary.accepted,
            quota,
            probes = summary.probes,
            cache_hits = summary.cache_hits,
            "country done"
        );
        self.events.send(ProbeEvent::CountryFinished(summary.clone()));

        (bucket, summary)
    }
}

async fn probe_candidate(
    client: ProbeClient,
    cache: ProbeCache,
    gate: Arc<QuotaGate>,
    events: EventSender,
    candidate: Candidate,
) {
    if gate.is_met() {
        return;
    }

    let (result, probed) = cache
        .get_or_probe(&candidate.address, || client.probe(&candidate.address))
        .await;
    if probed {
        gate.probes.fetch_add(1, Ordering::Relaxed);
    } else {
        gate.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    // Results arriving after the quota closed are discarded
    if gate.is_met() {
        return;
    }
    admit(&gate, &events, &candidate, &result, !probed);
}

fn admit(gate: &QuotaGate, events: &EventSender, candidate: &Candidate, result: &ProbeResult, cached: bool) {
    events.send(ProbeEvent::Probed {
        country: candidate.country.clone(),
        result: result.clone(),
        cached,
    });

    let Some(latency_ms) = result.accepted_latency() else {
        return;
    };
    if gate.try_admit(candidate, latency_ms) {
        debug!(address = %candidate.address, country = %candidate.country, latency_ms, "accepted");
        events.send(ProbeEvent::Accepted {
            country: candidate.country.clone(),
            address: candidate.address.clone(),
            latency_ms,
        });
    }
}
