mod audit;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use jobfill_client::{
    BrowserSessionFactory, HtmdCleaner, HttpAnalysisTransport, SessionConfig, VirtualDisplay,
};
use jobfill_core::analysis::AnalysisClient;
use jobfill_core::backfill::Backfiller;
use jobfill_core::config::BackfillConfig;
use jobfill_core::enrich;
use jobfill_core::region::Region;
use jobfill_core::stats::{RunStatistics, StatsSnapshot};
use jobfill_db::{Database, DatabaseConfig, JobRepository};

use crate::audit::CsvAuditLog;

const DEFAULT_MODEL: &str = "deepseek-chat";
const VIRTUAL_DISPLAY_NUM: u32 = 99;

#[derive(Parser)]
#[command(
    name = "jobfill",
    version,
    about = "Backfills missing job descriptions and enriches them via a text-analysis API"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape and store missing job descriptions
    Backfill {
        /// Maximum number of jobs to process
        #[arg(short, long)]
        limit: Option<i64>,

        /// Base delay between jobs per worker, in seconds
        #[arg(short, long, default_value_t = 5.0)]
        delay: f64,

        /// Number of concurrent browser sessions (1 = serial)
        #[arg(short, long, default_value_t = 3, env = "JOBFILL_WORKERS")]
        workers: usize,

        /// Run browsers headless
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        headless: bool,

        /// Start an Xvfb server and run headful browsers against it
        #[arg(long, default_value_t = false)]
        virtual_display: bool,

        /// Only process jobs from this region
        #[arg(short, long, env = "JOBFILL_REGION")]
        region: Option<Region>,

        /// Include inactive jobs
        #[arg(long, default_value_t = false)]
        include_inactive: bool,

        /// Restart each session after this many jobs (serial mode)
        #[arg(long, default_value_t = 30)]
        restart_interval: u32,

        /// Disable in-run enrichment of freshly scraped descriptions
        #[arg(long, default_value_t = false)]
        no_async_enrichment: bool,

        /// Skip the post-run enrichment sweep
        #[arg(long, default_value_t = false)]
        skip_post_pass: bool,

        /// CSV audit file (defaults to a timestamped name)
        #[arg(long)]
        audit_file: Option<PathBuf>,
    },

    /// Run only the enrichment sweep over already-stored jobs
    Enrich {
        /// Maximum number of jobs per sweep
        #[arg(short, long)]
        limit: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("jobfill=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Backfill {
            limit,
            delay,
            workers,
            headless,
            virtual_display,
            region,
            include_inactive,
            restart_interval,
            no_async_enrichment,
            skip_post_pass,
            audit_file,
        } => {
            let config = BackfillConfig {
                delay: Duration::from_secs_f64(delay),
                workers,
                limit,
                headless: headless && !virtual_display,
                use_virtual_display: virtual_display,
                region_filter: region,
                include_inactive,
                restart_interval,
                enable_async_enrichment: !no_async_enrichment,
                skip_enrichment_post_pass: skip_post_pass,
                ..BackfillConfig::default()
            };
            config.validate().map_err(|e| anyhow::anyhow!(e))?;
            cmd_backfill(config, audit_file).await?;
        }
        Commands::Enrich { limit } => {
            cmd_enrich(limit).await?;
        }
    }

    Ok(())
}

/// Connect, migrate, and vend the job repository.
async fn connect_store() -> Result<JobRepository> {
    let db_config = DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let database = Database::connect(&db_config)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    database.migrate().await.map_err(|e| anyhow::anyhow!(e))?;
    Ok(database.job_repo())
}

/// Comma-separated API keys from `JOBFILL_API_KEYS`.
fn api_keys_from_env() -> Vec<String> {
    std::env::var("JOBFILL_API_KEYS")
        .ok()
        .map(|raw| {
            raw.split(',')
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn build_transport() -> Result<HttpAnalysisTransport> {
    let model = std::env::var("JOBFILL_AI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
    let transport = match std::env::var("JOBFILL_AI_URL") {
        Ok(url) => HttpAnalysisTransport::with_url(&model, &url),
        Err(_) => HttpAnalysisTransport::new(&model),
    };
    transport.map_err(|e| anyhow::anyhow!(e))
}

async fn cmd_backfill(config: BackfillConfig, audit_file: Option<PathBuf>) -> Result<()> {
    let store = connect_store().await?;

    let display = if config.use_virtual_display {
        Some(VirtualDisplay::start(VIRTUAL_DISPLAY_NUM).map_err(|e| anyhow::anyhow!(e))?)
    } else {
        None
    };

    let session_config = SessionConfig {
        headless: config.headless,
        display: display.as_ref().map(|d| d.name().to_string()),
        ..SessionConfig::default()
    };
    let factory = BrowserSessionFactory::new(session_config);

    let audit_path = audit_file.unwrap_or_else(|| {
        PathBuf::from(format!(
            "backfill_audit_{}.csv",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        ))
    });
    let audit = CsvAuditLog::create(&audit_path).map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!(path = %audit_path.display(), "Writing audit log");

    let keys = api_keys_from_env();
    let engine = Backfiller::new(
        factory,
        HtmdCleaner::new(),
        store.clone(),
        audit,
        config.clone(),
    );

    let mut enrichment_worker = None;
    let sender = if config.enable_async_enrichment && !keys.is_empty() {
        let enricher = AnalysisClient::new(build_transport()?, keys.clone());
        let (sender, worker) = enrich::spawn(
            enricher,
            store.clone(),
            engine.stats(),
            config.enrichment_queue_capacity,
        );
        enrichment_worker = Some(worker);
        Some(sender)
    } else {
        if config.enable_async_enrichment {
            tracing::warn!("JOBFILL_API_KEYS not set, skipping in-run enrichment");
        }
        None
    };

    let result = engine.run(sender).await;
    if let Some(worker) = enrichment_worker {
        worker.shutdown().await;
    }
    let snapshot = result.map_err(|e| anyhow::anyhow!(e))?;

    if !config.skip_enrichment_post_pass && snapshot.success > 0 && !keys.is_empty() {
        let mut enricher = AnalysisClient::new(build_transport()?, keys);
        let stats = engine.stats();
        if let Err(e) = enrich::run_post_pass(&mut enricher, &store, &stats, config.limit).await {
            tracing::error!("Enrichment post pass aborted: {e}");
        }
        let status = enricher.pool_status();
        tracing::info!(
            total_keys = status.total,
            available = status.available,
            exhausted = status.exhausted.len(),
            "API key pool after post pass"
        );
    }

    report(&engine.stats().snapshot());
    drop(display);
    Ok(())
}

async fn cmd_enrich(limit: Option<i64>) -> Result<()> {
    let store = connect_store().await?;

    let keys = api_keys_from_env();
    if keys.is_empty() {
        bail!("JOBFILL_API_KEYS not set. Required for the enrich command.");
    }

    let mut enricher = AnalysisClient::new(build_transport()?, keys);
    let stats = Arc::new(RunStatistics::new());
    enrich::run_post_pass(&mut enricher, &store, &stats, limit)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    report(&stats.snapshot());
    Ok(())
}

fn report(snapshot: &StatsSnapshot) {
    tracing::info!(
        total = snapshot.total,
        success = snapshot.success,
        failed = snapshot.failed,
        success_rate = format!("{:.1}%", snapshot.success_rate()),
        cloudflare_blocked = snapshot.cloudflare_blocked,
        session_restarts = snapshot.session_restarts,
        enrichment_succeeded = snapshot.enrichment_succeeded,
        enrichment_failed = snapshot.enrichment_failed,
        salary_normalized = snapshot.salary_normalized,
        salary_skipped = snapshot.salary_skipped,
        salary_failed = snapshot.salary_failed,
        "Run complete"
    );
}
