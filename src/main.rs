//! Command-line entry point.
//!
//! Thin trigger over the engine: parses parameters, installs the ctrl-c
//! cancellation hook, prints the terminal report as JSON and maps its
//! status to the exit code (0 for success/warning, 1 for error).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;

use listascrape::config::HarvestConfig;
use listascrape::record::RunReport;
use listascrape::sink::OutputTarget;
use listascrape::engine;

#[derive(Parser)]
#[command(name = "listascrape")]
#[command(about = "Extract business listings from a paginated directory site")]
#[command(version)]
struct Cli {
    /// Where extracted records go
    #[arg(long, value_enum, default_value_t = OutputKind::File, global = true)]
    output: OutputKind,

    /// CSV output path (for --output file/both)
    #[arg(long, default_value = "data/listings.csv", global = true)]
    csv_path: PathBuf,

    /// Database URL (for --output database/both)
    #[arg(long, default_value = "sqlite://data/listings.db", global = true)]
    db_url: String,

    /// Work items per chunk
    #[arg(long, default_value_t = 100, global = true)]
    chunk_size: usize,

    /// Concurrent extraction workers (one browser each)
    #[arg(long, default_value_t = 4, global = true)]
    workers: usize,

    /// Re-attempt identifiers already present in the output
    #[arg(long, global = true)]
    force: bool,

    /// Run the browser with a visible window
    #[arg(long, global = true)]
    headed: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputKind {
    File,
    Database,
    Both,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep a contiguous identifier range
    Bulk {
        #[arg(long)]
        start_id: u64,
        #[arg(long)]
        end_id: u64,
    },
    /// Crawl the growing result list per (category, locality) combination
    Sequential {
        /// Category filters, comma separated
        #[arg(long, value_delimiter = ',')]
        rubros: Vec<String>,
        /// Locality filters, comma separated
        #[arg(long, value_delimiter = ',')]
        localidades: Vec<String>,
    },
    /// Extract a single listing from a URL or a saved page
    Manual {
        #[arg(long, conflicts_with = "file")]
        url: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

impl Cli {
    fn output_target(&self) -> OutputTarget {
        match self.output {
            OutputKind::File => OutputTarget::File(self.csv_path.clone()),
            OutputKind::Database => OutputTarget::Database(self.db_url.clone()),
            OutputKind::Both => OutputTarget::Both {
                csv: self.csv_path.clone(),
                database: self.db_url.clone(),
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = match HarvestConfig::builder()
        .output(cli.output_target())
        .chunk_size(cli.chunk_size)
        .worker_count(cli.workers)
        .force_rescrape(cli.force)
        .headless(!cli.headed)
        .build()
    {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("invalid configuration: {e:#}");
            return ExitCode::from(1);
        }
    };

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received; finishing in-flight work before exiting");
            let _ = cancel_tx.send(true);
        }
    });

    let report = match &cli.command {
        Commands::Bulk { start_id, end_id } => {
            engine::run_bulk(&cfg, *start_id, *end_id, cancel_rx).await
        }
        Commands::Sequential {
            rubros,
            localidades,
        } => engine::run_sequential(&cfg, rubros, localidades, cancel_rx).await,
        Commands::Manual { url, file } => match (url, file) {
            (Some(url), None) => engine::run_manual_url(&cfg, url).await,
            (None, Some(path)) => engine::run_manual_file(&cfg, path).await,
            _ => RunReport::error("manual requires exactly one of --url or --file"),
        },
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(_) => println!("{}", report.message),
    }
    ExitCode::from(report.exit_code())
}
