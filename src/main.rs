use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use taxi_etl::app::ports::CollectionInspectPort;
use taxi_etl::app::{FetchReport, StatusUseCase};
use taxi_etl::catalog::Catalog;
use taxi_etl::checkpoint::JsonFileStore;
use taxi_etl::config::EtlConfig;
use taxi_etl::constants;
use taxi_etl::infra::SqliteDocumentStore;
use taxi_etl::logging;
use taxi_etl::pipeline::{BatchReport, FileOutcome, PipelineDriver};

#[derive(Parser)]
#[command(name = "taxi_etl")]
#[command(about = "Incremental ETL for NYC yellow taxi trip records")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = constants::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Year range to cover, e.g. 2023-2024 or 2023
    #[arg(long, global = true)]
    years: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download catalog files that are not yet downloaded
    Fetch,
    /// Transform and load downloaded files that are not yet processed
    Process,
    /// Fetch then process
    Run,
    /// Print collection storage statistics
    Stats,
    /// Print the document count and a few sample documents
    Count {
        /// Number of sample documents to print
        #[arg(long, default_value_t = constants::DEFAULT_SAMPLE_SIZE)]
        limit: usize,
    },
    /// Record files already in the raw directory as downloaded
    Reconcile,
    /// Show the state of every catalog file
    Status,
}

fn parse_years(value: &str) -> anyhow::Result<(i32, i32)> {
    let (start, end) = match value.split_once('-') {
        Some((start, end)) => (start.trim(), end.trim()),
        None => (value.trim(), value.trim()),
    };
    let start: i32 = start.parse().with_context(|| format!("invalid start year '{start}'"))?;
    let end: i32 = end.parse().with_context(|| format!("invalid end year '{end}'"))?;
    if start > end {
        bail!("year range {start}-{end} is inverted");
    }
    Ok((start, end))
}

fn print_fetch(report: &FetchReport) {
    println!("\n📥 Fetch Results:");
    println!("   Downloaded: {} ({} bytes)", report.downloaded.len(), report.bytes);
    println!("   Skipped: {}", report.skipped.len());
    println!("   Failed: {}", report.failed.len());
    if !report.failed.is_empty() {
        println!("\n⚠️  Download failures:");
        for (key, reason) in &report.failed {
            println!("   - {}: {}", key, reason);
        }
    }
}

fn print_batch(report: &BatchReport) {
    if report.outcomes.is_empty() {
        println!("\n✅ No new files to process.");
        return;
    }
    println!("\n📊 Process Results:");
    for outcome in &report.outcomes {
        match outcome {
            FileOutcome::Processed { key, documents, read_secs, transform_secs, load_secs, .. } => println!(
                "   ✅ {}: {} documents (read {:.2}s, transform {:.2}s, load {:.2}s)",
                key, documents, read_secs, transform_secs, load_secs
            ),
            FileOutcome::Failed { key, phase, error } => {
                println!("   ❌ {}: {} failed: {}", key, phase, error)
            }
        }
    }
    println!("   Rows read: {}", report.totals.rows_read);
    println!("   Rows kept: {}", report.totals.rows_kept);
    println!(
        "   Rows dropped: {} (amounts {}, timing {})",
        report.totals.rows_dropped(),
        report.totals.dropped_amounts,
        report.totals.dropped_timing
    );
    println!("   Documents loaded: {}", report.documents_loaded());
}

fn open_store(config: &EtlConfig) -> anyhow::Result<SqliteDocumentStore> {
    SqliteDocumentStore::open(&config.sink.database_path, &config.sink.collection, config.sink.batch_size)
        .context("Failed to open document store")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = EtlConfig::load(&cli.config).context("Failed to load configuration")?;
    if let Some(years) = cli.years.as_deref() {
        let (start, end) = parse_years(years)?;
        config.source.start_year = start;
        config.source.end_year = end;
    }

    let _guard = logging::init_logging(&config.paths.log_dir);
    taxi_etl::metrics::init_metrics(config.metrics.listen_addr.as_deref());

    let catalog = Catalog::from_config(&config.source);
    info!(
        "Catalog covers {}-{}: {} files",
        config.source.start_year,
        config.source.end_year,
        catalog.len()
    );

    match cli.command {
        Commands::Fetch => {
            println!("📥 Fetching missing files...");
            let driver = PipelineDriver::from_config(&config)?;
            let report = driver.fetch(&catalog).await?;
            print_fetch(&report);
        }
        Commands::Process => {
            println!("🔨 Processing downloaded files...");
            let driver = PipelineDriver::from_config(&config)?;
            let report = driver.process_pending(&catalog).await?;
            print_batch(&report);
        }
        Commands::Run => {
            println!("🚀 Running full pipeline (fetch + process)...");
            let driver = PipelineDriver::from_config(&config)?;
            match driver.run(&catalog).await {
                Ok(report) => {
                    print_fetch(&report.fetch);
                    print_batch(&report.process);
                    let failed = report.fetch.failed.len() + report.process.failed().count();
                    if failed > 0 {
                        warn!("{} file(s) failed and will be retried on the next run", failed);
                    }
                    println!("\n✅ Run completed");
                }
                Err(e) => {
                    error!("Run aborted: {}", e);
                    println!("❌ Run aborted: {}", e);
                    return Err(e.into());
                }
            }
        }
        Commands::Stats => {
            let store = open_store(&config)?;
            let stats = store.stats().await?;
            let gb = |bytes: u64| bytes as f64 / (1024.0 * 1024.0 * 1024.0);
            println!("📦 Collection '{}':", stats.collection);
            println!("   Documents: {}", stats.documents);
            println!("   Data size: {:.2} GB", gb(stats.data_bytes));
            println!("   Storage size: {:.2} GB", gb(stats.storage_bytes));
        }
        Commands::Count { limit } => {
            let store = open_store(&config)?;
            let total = store.count_documents().await?;
            println!("🔢 Total records in '{}': {}", store.collection(), total);
            let sample = store.sample(limit).await?;
            if !sample.is_empty() {
                println!("\n🔍 Sample documents:");
                for doc in sample {
                    println!("{}", serde_json::to_string_pretty(&doc)?);
                }
            }
        }
        Commands::Reconcile => {
            let status = status_use_case(&config);
            let adopted = status.reconcile(&catalog)?;
            println!("🔄 Adopted {} file(s)", adopted.len());
            for key in adopted {
                println!("   + {}", key);
            }
        }
        Commands::Status => {
            let status = status_use_case(&config);
            for file in status.status(&catalog)? {
                let disk = if file.on_disk { "on disk" } else { "-" };
                println!("   {:<36} {:<18} {}", file.key, file.state.to_string(), disk);
            }
        }
    }

    Ok(())
}

fn status_use_case(config: &EtlConfig) -> StatusUseCase {
    StatusUseCase::new(
        Arc::new(JsonFileStore::new(config.paths.downloaded_checkpoint())),
        Arc::new(JsonFileStore::new(config.paths.processed_checkpoint())),
        &config.paths.raw_dir,
    )
}
