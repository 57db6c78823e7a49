//! Aggregation of per-country results into the final ordered list

use crate::proxy::models::{CountryBucket, OutputFormat};
use std::collections::BTreeMap;

pub struct Aggregator;

impl Aggregator {
    /// Render accepted entries grouped by ascending country code.
    ///
    /// Within a country, entries keep their acceptance order. Countries
    /// without accepted entries contribute nothing.
    pub fn aggregate<I>(buckets: I, format: &OutputFormat) -> Vec<String>
    where
        I: IntoIterator<Item = CountryBucket>,
    {
        let ordered: BTreeMap<String, CountryBucket> = buckets
            .into_iter()
            .map(|bucket| (bucket.country.clone(), bucket))
            .collect();

        ordered
            .into_values()
            .flat_map(|bucket| bucket.accepted)
            .map(|entry| format.render(&entry))
            .collect()
    }

    /// First `limit` lines of every tag in raw list text, without probing.
    ///
    /// Only `ADDRESS#TAG` lines with exactly one `#` are kept. Tags are
    /// grouped verbatim, so `us` and `US` are separate groups, and groups
    /// are emitted in ascending tag order.
    pub fn first_per_country(content: &str, required_port: Option<u16>, limit: usize) -> Vec<String> {
        let port_marker = required_port.map(|port| format!(":{}#", port));
        let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for line in content.lines().map(str::trim).filter(|line| !line.is_empty()) {
            if let Some(marker) = &port_marker {
                if !line.contains(marker.as_str()) {
                    continue;
                }
            }
            let Some((_, tag)) = line.split_once('#') else {
                continue;
            };
            if tag.contains('#') {
                continue;
            }
            let group = groups.entry(tag).or_default();
            if group.len() < limit {
                group.push(line);
            }
        }

        groups
            .into_values()
            .flatten()
            .map(str::to_string)
            .collect()
    }
}
