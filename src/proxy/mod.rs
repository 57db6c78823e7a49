//! Proxy module for validating country-tagged proxy candidates
//!
//! This module provides functionality for:
//! - Parsing `host:port#CC` candidate lists from files or remote URLs
//! - Probing candidates concurrently against a check service
//! - Keeping at most N valid candidates per country, stopping early
//! - Writing the country-sorted result list

pub mod aggregator;
pub mod cache;
pub mod models;
pub mod parser;
pub mod probe;
pub mod scheduler;
pub mod sink;
pub mod source;
pub mod validator;
pub mod worklist;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::Aggregator;
pub use cache::ProbeCache;
pub use models::{AcceptedEntry, Candidate, CountryBucket, CountrySummary, OutputFormat, ProbeResult};
pub use parser::CandidateParser;
pub use probe::{HttpProbeService, ProbeClient, ProbeResponse, ProbeService, RetryingProbeService};
pub use scheduler::{ProbeEvent, QuotaScheduler};
pub use sink::{FileSink, ResultSink, StdoutSink};
pub use source::{CandidateSource, FileSource, HttpSource, TextSource};
pub use validator::{ValidationReport, Validator, ValidatorConfig};
pub use worklist::CountryWorklist;
