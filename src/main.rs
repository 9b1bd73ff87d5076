use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

use metadata_harvester::file_types;
use metadata_harvester::harvest::{DispatchPolicy, HarvestConfig, Harvester};

/// Harvest users, emails and hosts from the metadata of public documents.
#[derive(Parser, Debug)]
#[command(name = "metaharvest", version, about)]
struct Cli {
    /// Target domain (remote mode)
    #[arg(short, long)]
    domain: Option<String>,

    /// Comma-separated file types, e.g. "pdf,jpg"
    #[arg(short = 't', long, value_delimiter = ',')]
    file_types: Vec<String>,

    /// Directory to analyze (local mode) or to keep downloads in
    #[arg(short, long)]
    out_directory: Option<PathBuf>,

    /// Number of workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Only list discovered files, never download or parse them
    #[arg(long)]
    stealth: bool,

    /// Analyze files from the output directory instead of searching online
    #[arg(long)]
    local: bool,

    /// Max search results per file type
    #[arg(long)]
    search_max: Option<usize>,

    /// Max files downloaded per file type
    #[arg(long)]
    download_limit: Option<usize>,

    /// Download timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Pause between search result pages in seconds
    #[arg(long)]
    delay: Option<u64>,

    /// File with one user agent per line
    #[arg(long)]
    user_agents: Option<PathBuf>,

    /// Merge results of every extractor that applies instead of taking the first
    #[arg(long)]
    merge_results: bool,

    /// JSON config file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Result<HarvestConfig, metadata_harvester::ConfigError> {
        let mut config = match &self.config {
            Some(path) => HarvestConfig::from_json_file(path)?,
            None => HarvestConfig::default(),
        };

        if self.domain.is_some() {
            config.domain = self.domain;
        }
        if !self.file_types.is_empty() {
            config.file_types = self
                .file_types
                .iter()
                .map(|t| file_types::normalize(t))
                .filter(|t| !t.is_empty())
                .collect();
        }
        if self.out_directory.is_some() {
            config.out_directory = self.out_directory;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(search_max) = self.search_max {
            config.search_max = search_max;
        }
        if let Some(limit) = self.download_limit {
            config.download_file_limit = limit;
        }
        if let Some(timeout) = self.timeout {
            config.url_timeout_secs = timeout;
        }
        if let Some(delay) = self.delay {
            config.search_delay_secs = delay;
        }
        if self.user_agents.is_some() {
            config.user_agents_file = self.user_agents;
        }
        config.stealth |= self.stealth;
        config.local |= self.local;
        if self.merge_results {
            config = config.with_dispatch_policy(DispatchPolicy::Merge);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let json = cli.json;
    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(2);
        }
    };

    let harvester = match Harvester::with_defaults(config) {
        Ok(harvester) => harvester,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(2);
        }
    };

    let summary = match harvester.run().await {
        Ok(summary) => summary,
        Err(e) => {
            error!("{e}. Abort!");
            return ExitCode::from(2);
        }
    };

    if json {
        match summary.to_json() {
            Ok(out) => println!("{out}"),
            Err(e) => {
                error!("Failed to serialize report: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print!("{}", summary.render());
    }
    ExitCode::SUCCESS
}
