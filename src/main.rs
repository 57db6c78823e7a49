use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use proxyip_quota::{
    models::DEFAULT_OUTPUT_FORMAT,
    parser::DEFAULT_REQUIRED_PORT,
    probe::{attempt_timeout, DEFAULT_CHECK_API, DEFAULT_PROBE_TIMEOUT_SECS},
    scheduler::DEFAULT_CONCURRENCY,
    source::DEFAULT_LIST_URL,
    tui::ValidatorApp,
    validator::DEFAULT_QUOTA_PER_COUNTRY,
    Aggregator, Candidate, CandidateParser, CandidateSource, CountryWorklist, FileSink, FileSource,
    HttpProbeService, HttpSource, OutputFormat, ProbeCache, ProbeService, ResultSink,
    RetryingProbeService, StdoutSink, ValidationReport, Validator, ValidatorConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default number of lines per country kept by `filter`
const DEFAULT_FILTER_PER_COUNTRY: usize = 10;

/// A country-quota proxy validator with concurrent probing
#[derive(Parser)]
#[command(name = "proxyip-quota")]
#[command(about = "Keep up to N reachable proxies per country from a tagged candidate list")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Local candidate list (one `ip:port#CC` per line)
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Remote candidate list, used when no input file is given
    #[arg(short, long, default_value = DEFAULT_LIST_URL)]
    url: String,
    /// Keep a local copy of the remote list and reuse it when present
    #[arg(long)]
    local_copy: Option<PathBuf>,
    /// Only keep candidates on this port
    #[arg(long, default_value_t = DEFAULT_REQUIRED_PORT)]
    port: u16,
    /// Accept candidates on any port
    #[arg(long)]
    any_port: bool,
    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe candidates and keep up to N valid entries per country
    Validate {
        #[command(flatten)]
        source: SourceArgs,
        /// Maximum accepted entries per country
        #[arg(short, long, env = "MAX_PER_COUNTRY", default_value_t = DEFAULT_QUOTA_PER_COUNTRY)]
        quota: usize,
        /// Number of concurrent probes per batch
        #[arg(short = 'n', long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,
        /// Timeout per probe in seconds
        #[arg(long, default_value_t = DEFAULT_PROBE_TIMEOUT_SECS)]
        timeout: u64,
        /// Check API URL, `{}` is replaced by ip:port
        #[arg(long, default_value = DEFAULT_CHECK_API)]
        check_api: String,
        /// Per-country quota override, e.g. US=5 (0 skips the country)
        #[arg(long = "country-quota", value_parser = parse_country_quota)]
        country_quotas: Vec<(String, usize)>,
        /// Number of countries validated at the same time
        #[arg(long, default_value_t = 1)]
        country_parallelism: usize,
        /// Extra attempts per probe when the check API fails or stalls; the
        /// attempts share the probe timeout
        #[arg(long, default_value_t = 0)]
        retries: u32,
        /// Output line template ({address}, {country}, {latency}, {line})
        #[arg(long, default_value = DEFAULT_OUTPUT_FORMAT)]
        format: String,
        /// Probe cache file reused across runs
        #[arg(long)]
        cache: Option<PathBuf>,
        /// Show the interactive progress TUI
        #[arg(long)]
        tui: bool,
    },
    /// Keep the first N candidates per country without probing
    Filter {
        #[command(flatten)]
        source: SourceArgs,
        /// Maximum entries per country
        #[arg(short, long, env = "MAX_PER_COUNTRY", default_value_t = DEFAULT_FILTER_PER_COUNTRY)]
        quota: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let tui = matches!(cli.command, Commands::Validate { tui: true, .. });
    init_tracing(tui);

    match cli.command {
        Commands::Validate {
            source,
            quota,
            concurrency,
            timeout,
            check_api,
            country_quotas,
            country_parallelism,
            retries,
            format,
            cache,
            tui,
        } => {
            let timeout = Duration::from_secs(timeout);
            let mut config = ValidatorConfig::new()
                .with_quota(quota)
                .with_concurrency(concurrency)
                .with_timeout(timeout)
                .with_country_parallelism(country_parallelism)
                .with_output_format(OutputFormat::new(format)?);
            for (country, country_quota) in country_quotas {
                config = config.with_country_quota(country, country_quota);
            }
            config.validate()?;

            let http = HttpProbeService::new(check_api, attempt_timeout(timeout, retries + 1))?;
            let service: Arc<dyn ProbeService> = if retries > 0 {
                Arc::new(RetryingProbeService::new(http, retries + 1))
            } else {
                Arc::new(http)
            };

            let probe_cache = match &cache {
                Some(path) => ProbeCache::load(path)
                    .await
                    .with_context(|| format!("failed to load probe cache {:?}", path))?,
                None => ProbeCache::new(),
            };

            let candidates = load_candidates(&source).await?;
            let validator = Validator::new(config, service)?.with_cache(probe_cache.clone());

            eprintln!(
                "Validating with quota {} per country, {} concurrent probes, timeout {}s",
                quota,
                concurrency,
                timeout.as_secs()
            );

            let report = if tui {
                run_with_tui(validator, candidates).await?
            } else {
                validator.validate(candidates).await
            };

            deliver(&source.output, &report.lines).await?;

            if let Some(path) = &cache {
                probe_cache
                    .save(path)
                    .await
                    .with_context(|| format!("failed to save probe cache {:?}", path))?;
            }

            print_summary(&report);
        }
        Commands::Filter { source, quota } => {
            let content = fetch_list(&source).await?;
            let port = (!source.any_port).then_some(source.port);
            let lines = Aggregator::first_per_country(&content, port, quota);

            deliver(&source.output, &lines).await?;
            eprintln!(
                "Filtered {} entries (at most {} per country, sorted by country)",
                lines.len(),
                quota
            );
        }
    }

    Ok(())
}

fn init_tracing(tui: bool) {
    // Log lines would corrupt the TUI unless explicitly requested
    let default_filter = if tui { "off" } else { "proxyip_quota=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn fetch_list(args: &SourceArgs) -> Result<String> {
    let source: Box<dyn CandidateSource> = match &args.input {
        Some(path) => Box::new(FileSource::new(path)),
        None => {
            let mut http = HttpSource::new(&args.url)?;
            if let Some(path) = &args.local_copy {
                http = http.with_local_copy(path);
            }
            Box::new(http)
        }
    };

    let content = source
        .fetch()
        .await
        .with_context(|| format!("failed to read candidates from {}", source.describe()))?;
    eprintln!("Read {} lines from {}", content.lines().count(), source.describe());
    Ok(content)
}

async fn load_candidates(args: &SourceArgs) -> Result<Vec<Candidate>> {
    let content = fetch_list(args).await?;
    let parser = if args.any_port {
        CandidateParser::any_port()
    } else {
        CandidateParser::new().with_required_port(Some(args.port))
    };
    let candidates = parser.parse_string(&content);

    eprintln!("Loaded {} candidates", candidates.len());
    Ok(candidates)
}

async fn run_with_tui(validator: Validator, candidates: Vec<Candidate>) -> Result<ValidationReport> {
    let worklist = CountryWorklist::from_candidates(candidates.clone());
    let (tx, rx) = mpsc::unbounded_channel();
    let validator = validator.with_events(tx);

    // The task owns the only event sender, so the channel closes when it ends
    let handle = tokio::spawn(async move { validator.validate(candidates).await });

    let mut app = ValidatorApp::new(worklist.len(), worklist.candidate_count());
    app.run(rx).await?;

    if !app.is_complete() {
        handle.abort();
        bail!("validation cancelled");
    }
    Ok(handle.await?)
}

async fn deliver(output: &Option<PathBuf>, lines: &[String]) -> Result<()> {
    let sink: Box<dyn ResultSink> = match output {
        Some(path) => Box::new(FileSink::new(path)),
        None => Box::new(StdoutSink),
    };
    sink.deliver(lines).await
}

fn print_summary(report: &ValidationReport) {
    eprintln!();
    eprintln!("{:<8} {:>10} {:>9} {:>7} {:>7}", "COUNTRY", "CANDIDATES", "ACCEPTED", "PROBES", "CACHED");
    eprintln!("{}", "-".repeat(46));
    for country in &report.countries {
        eprintln!(
            "{:<8} {:>10} {:>6}/{:<2} {:>7} {:>7}",
            country.country,
            country.candidates,
            country.accepted,
            country.quota,
            country.probes,
            country.cache_hits
        );
    }
    eprintln!("{}", "-".repeat(46));
    eprintln!(
        "Run {}: {} accepted, {} probes in {:.1}s",
        report.run_id,
        report.total_accepted(),
        report.total_probes(),
        report.elapsed().num_milliseconds() as f64 / 1000.0
    );
    if report.lines.is_empty() {
        eprintln!("No valid entries found.");
    }
}

fn parse_country_quota(s: &str) -> std::result::Result<(String, usize), String> {
    let (country, quota) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CC=N, got {:?}", s))?;
    let quota = quota
        .trim()
        .parse()
        .map_err(|e| format!("invalid quota in {:?}: {}", s, e))?;
    Ok((country.trim().to_uppercase(), quota))
}
