use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use specmatch::submission;
use specmatch::{load_dataset, Resolver, ResolverConfig, RunControl, SubmissionFormat};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Pairs,
    Clusters,
}

impl From<FormatArg> for SubmissionFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Pairs => SubmissionFormat::Pairs,
            FormatArg::Clusters => SubmissionFormat::Clusters,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "specmatch",
    about = "Resolve duplicate product specifications into clusters",
    long_about = "Block, score and cluster the product specifications of a dataset directory \
                  (one sub-directory per source, one JSON file per specification) and write \
                  the resulting matches as a CSV submission."
)]
struct Cli {
    #[arg(long, default_value = "./dataset", help = "Dataset directory")]
    dataset: PathBuf,
    #[arg(long, help = "TOML resolver configuration (defaults to the title-token baseline)")]
    config: Option<PathBuf>,
    #[arg(long, default_value = "./output/submission.csv", help = "Submission file to write")]
    output: PathBuf,
    #[arg(long, value_enum, default_value_t = FormatArg::Pairs, help = "Submission layout")]
    format: FormatArg,
    #[arg(long, help = "Worker threads (overrides the configuration)")]
    threads: Option<usize>,
    #[arg(long, help = "Stop generating candidates after this many seconds")]
    timeout_secs: Option<u64>,
}

fn run(cli: Cli) -> specmatch::Result<()> {
    let mut config = match &cli.config {
        Some(path) => ResolverConfig::from_path(path)?,
        None => ResolverConfig::default(),
    };
    if cli.threads.is_some() {
        config.threads = cli.threads;
    }
    // Fail on bad configuration before touching the dataset
    let resolver = Resolver::new(config)?;

    let store = load_dataset(&cli.dataset)?;

    let control = RunControl {
        deadline: cli
            .timeout_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs)),
        ..RunControl::default()
    };
    let resolution = resolver.resolve_with(&store, &control)?;
    for warning in &resolution.warnings {
        warn!("degraded: {warning}");
    }
    if !resolution.complete {
        warn!("deadline reached; submission covers the candidates scored so far");
    }

    if let Some(parent) = cli.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| specmatch::ResolveError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let rows = submission::write(&cli.output, cli.format.into(), &store, &resolution.assignment)?;
    let stats = &resolution.stats;
    info!(path = %cli.output.display(), rows, "submission written");
    println!(
        "{} records, {} candidates, {} matches, {} clusters -> {}",
        stats.records,
        stats.candidates,
        stats.matches,
        stats.clusters,
        cli.output.display()
    );
    Ok(())
}

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
