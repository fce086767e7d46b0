use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use walkdir::WalkDir;

use koekarte_server::analysis::AnalysisPipeline;
use koekarte_server::audio;
use koekarte_server::blob_store::{BlobStore, FsBlobStore};
use koekarte_server::config::{AppConfig, CliConfig, FileConfig};
use koekarte_server::job_queue::{AnalysisWorker, JobStore, SqliteJobStore};
use koekarte_server::score_store::{ScoreStore, SqliteScoreStore};
use koekarte_server::server::{run_server, RequestsLoggingLevel, ServerConfig};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the databases; blobs and scratch space default to
    /// subdirectories of it.
    #[clap(value_parser = parse_path)]
    pub data_dir: PathBuf,

    /// Path to a TOML config file. Values there override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory for stored recordings (raw and normalized).
    #[clap(long, value_parser = parse_path)]
    pub blob_dir: Option<PathBuf>,

    /// Scratch directory for staged uploads and transcoding.
    #[clap(long, value_parser = parse_path)]
    pub work_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// The maximum accepted upload size in megabytes.
    #[clap(long, default_value_t = 25)]
    pub max_upload_size_mb: usize,

    /// Fixed UTC offset, in hours, of the user-facing calendar day.
    #[clap(long, default_value_t = 9, allow_hyphen_values = true)]
    pub timezone_offset_hours: i32,

    /// Number of days to retain stored recordings. Set to 0 to disable pruning.
    #[clap(long, default_value_t = 30)]
    pub retention_days: u64,

    /// Interval in hours between pruning runs. Only used if retention_days > 0.
    #[clap(long, default_value_t = 24)]
    pub prune_interval_hours: u64,
}

/// Delete recordings older than the retention window. Returns the number of
/// files removed.
fn prune_old_recordings(blob_root: &Path, retention_days: u64) -> usize {
    let cutoff = SystemTime::now() - Duration::from_secs(retention_days * 24 * 60 * 60);
    let mut deleted = 0;

    for entry in WalkDir::new(blob_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let modified = match entry
            .metadata()
            .map_err(std::io::Error::from)
            .and_then(|m| m.modified())
        {
            Ok(modified) => modified,
            Err(e) => {
                warn!("Could not stat {:?}: {}", entry.path(), e);
                continue;
            }
        };
        if modified < cutoff {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => deleted += 1,
                Err(e) => warn!("Could not delete {:?}: {}", entry.path(), e),
            }
        }
    }

    deleted
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = cli_args
        .config
        .as_ref()
        .map(|path| FileConfig::load(path))
        .transpose()?;

    let cli_config = CliConfig {
        data_dir: Some(cli_args.data_dir),
        blob_dir: cli_args.blob_dir,
        work_dir: cli_args.work_dir,
        port: cli_args.port,
        metrics_port: cli_args.metrics_port,
        logging_level: cli_args.logging_level,
        max_upload_size_mb: cli_args.max_upload_size_mb,
        timezone_offset_hours: cli_args.timezone_offset_hours,
        retention_days: cli_args.retention_days,
        prune_interval_hours: cli_args.prune_interval_hours,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    std::fs::create_dir_all(&config.blob_dir)
        .with_context(|| format!("Failed to create blob dir {:?}", config.blob_dir))?;
    std::fs::create_dir_all(&config.work_dir)
        .with_context(|| format!("Failed to create work dir {:?}", config.work_dir))?;

    if let Err(e) = audio::check_ffmpeg_available().await {
        warn!("ffmpeg not available ({}); only WAV uploads will be accepted", e);
    }

    info!("Opening scores database at {:?}...", config.scores_db_path());
    let score_store: Arc<dyn ScoreStore> = Arc::new(SqliteScoreStore::open(&config.scores_db_path())?);

    info!("Opening jobs database at {:?}...", config.jobs_db_path());
    let job_store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::open(&config.jobs_db_path())?);

    let blob_store: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(
        config.blob_dir.clone(),
        config.signed_url_base.clone(),
        config.blob_signing_secret.clone(),
    ));

    let pipeline = Arc::new(AnalysisPipeline::new(
        score_store.clone(),
        job_store.clone(),
        blob_store.clone(),
        config.work_dir.clone(),
        config.analysis.clone(),
        config.timezone_offset_hours,
    ));

    let shutdown = CancellationToken::new();
    let worker = AnalysisWorker::new(
        job_store.clone(),
        pipeline.clone(),
        config.worker.poll_interval_secs,
        config.worker.stale_running_threshold_secs as i64,
    );
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { worker.run(shutdown).await });
    }

    if config.retention_days > 0 {
        let retention_days = config.retention_days;
        let interval_hours = config.prune_interval_hours;
        let blob_root = config.blob_dir.clone();

        info!(
            "Recording pruning enabled: retaining {} days, pruning every {} hours",
            retention_days, interval_hours
        );

        tokio::spawn(async move {
            let interval = Duration::from_secs(interval_hours * 60 * 60);
            let mut ticker = tokio::time::interval(interval);

            // Skip the first immediate tick, wait for the first interval
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let root = blob_root.clone();
                let result =
                    tokio::task::spawn_blocking(move || prune_old_recordings(&root, retention_days))
                        .await;
                match result {
                    Ok(count) => {
                        if count > 0 {
                            info!("Pruned {} old recordings", count);
                        }
                    }
                    Err(e) => error!("Pruning task failed: {}", e),
                }
            }
        });
    }

    info!("Ready to serve at port {}!", config.port);
    info!("Metrics available at port {}!", config.metrics_port);
    let server_config = ServerConfig {
        requests_logging_level: config.logging_level.clone(),
        port: config.port,
        metrics_port: config.metrics_port,
        max_upload_size_mb: config.max_upload_size_mb,
    };
    let result = run_server(
        server_config,
        score_store,
        job_store,
        blob_store,
        pipeline,
        config.analysis.clone(),
        config.work_dir.clone(),
    )
    .await;

    shutdown.cancel();
    result
}
