//! Grouping of candidates into per-country buckets

use crate::proxy::models::{is_country_code, Candidate, CountryBucket};
use std::collections::{BTreeMap, HashSet};
use tracing::trace;

/// Candidates grouped by country code, countries in ascending order
#[derive(Debug, Clone, Default)]
pub struct CountryWorklist {
    buckets: BTreeMap<String, CountryBucket>,
}

impl CountryWorklist {
    /// Group candidates, keeping input order inside each country.
    ///
    /// Repeated addresses within a country keep only their first occurrence.
    pub fn from_candidates<I: IntoIterator<Item = Candidate>>(candidates: I) -> Self {
        let mut buckets: BTreeMap<String, CountryBucket> = BTreeMap::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for candidate in candidates {
            if !is_country_code(&candidate.country) {
                trace!(line = %candidate.raw_line, "dropping candidate with bad country code");
                continue;
            }
            if !seen.insert((candidate.country.clone(), candidate.address.clone())) {
                continue;
            }
            buckets
                .entry(candidate.country.clone())
                .or_insert_with(|| CountryBucket::new(candidate.country.clone()))
                .candidates
                .push(candidate);
        }

        Self { buckets }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total number of candidates across all countries
    pub fn candidate_count(&self) -> usize {
        self.buckets.values().map(|b| b.candidates.len()).sum()
    }

    pub fn countries(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    pub fn get(&self, country: &str) -> Option<&CountryBucket> {
        self.buckets.get(country)
    }

    pub fn into_buckets(self) -> impl Iterator<Item = CountryBucket> {
        self.buckets.into_values()
    }
}
