//! ccfsd: ccfs negotiation broker
//!
//! Usage:
//!   ccfsd [--config /etc/ccfs/config.toml] [--listen 0.0.0.0:5000] [--storage s3|memory]
//!
//! Storage backends:
//!   s3      - presign against an S3 bucket (credentials from AWS_ACCESS_KEY_ID /
//!             AWS_SECRET_ACCESS_KEY)
//!   memory  - keep objects in process and serve them under /blob (development)

use anyhow::{Context, Result};
use ccfs_broker::{build_app, serve, NegotiationConfig, NegotiationService};
use ccfs_core::config::{CcfsConfig, StorageBackend};
use ccfs_storage::{BlobStore, MemoryBlobStore, S3BlobStore};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ccfsd", version, about = "ccfs upload/download negotiation broker")]
struct Cli {
    /// Path to ccfs.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "CCFS_CONFIG",
        default_value = "/etc/ccfs/config.toml"
    )]
    config: PathBuf,

    /// Listen address (overrides broker.listen)
    #[arg(long, env = "CCFS_LISTEN")]
    listen: Option<String>,

    /// Storage backend (overrides storage.backend)
    #[arg(long, env = "CCFS_STORAGE")]
    storage: Option<Backend>,

    /// Bucket name (overrides storage.bucket)
    #[arg(long, env = "S3_BUCKET")]
    bucket: Option<String>,

    /// Bucket region (overrides storage.region)
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Log level (trace, debug, info, warn, error; overrides broker.log_level)
    #[arg(long, env = "CCFS_LOG")]
    log: Option<String>,

    /// Log format (overrides broker.log_format)
    #[arg(long, env = "CCFS_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    S3,
    Memory,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CcfsConfig::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    apply_overrides(&mut config, &cli);
    config.validate().context("validating config")?;

    let log_format = match cli.log_format {
        Some(f) => f,
        None if config.broker.log_format == "json" => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(&config.broker.log_level, log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        backend = ?config.storage.backend,
        bucket = %config.storage.bucket,
        region = %config.storage.region,
        "ccfsd starting"
    );

    let listener = tokio::net::TcpListener::bind(&config.broker.listen)
        .await
        .with_context(|| format!("binding {}", config.broker.listen))?;

    let mut memory = None;
    let store: Arc<dyn BlobStore> = match config.storage.backend {
        StorageBackend::S3 => Arc::new(build_s3_store(&config)?),
        StorageBackend::Memory => {
            let max_bytes = config.storage.max_object_mb.saturating_mul(1024 * 1024);
            let max_bytes = usize::try_from(max_bytes).unwrap_or(usize::MAX);
            let store = MemoryBlobStore::new(config.broker.public_url.clone(), max_bytes)?;
            tracing::warn!(
                public_url = %config.broker.public_url,
                "memory storage backend: objects are lost on restart"
            );
            memory = Some(store.clone());
            Arc::new(store)
        }
    };

    match store.check_health().await {
        Ok(()) => info!(store = store.name(), "blob store: reachable"),
        Err(e) => tracing::warn!(store = store.name(), "blob store: {e} (serving anyway)"),
    }

    let service = Arc::new(NegotiationService::new(
        NegotiationConfig::from_storage(&config.storage),
        store,
    ));
    let app = build_app(service, memory.as_ref());

    serve(listener, app, shutdown_signal()).await?;
    info!("ccfsd stopped");
    Ok(())
}

fn apply_overrides(config: &mut CcfsConfig, cli: &Cli) {
    if let Some(listen) = &cli.listen {
        config.broker.listen = listen.clone();
    }
    if let Some(backend) = cli.storage {
        config.storage.backend = match backend {
            Backend::S3 => StorageBackend::S3,
            Backend::Memory => StorageBackend::Memory,
        };
    }
    if let Some(bucket) = &cli.bucket {
        config.storage.bucket = bucket.clone();
    }
    if let Some(region) = &cli.region {
        config.storage.region = region.clone();
    }
    if let Some(level) = &cli.log {
        config.broker.log_level = level.clone();
    }
}

/// Build the S3 store using credentials from environment variables.
fn build_s3_store(config: &CcfsConfig) -> Result<S3BlobStore> {
    let access_key = std::env::var("AWS_ACCESS_KEY_ID").context(
        "S3 credentials not set\n\
         Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables,\n\
         or run with --storage memory for local development.",
    )?;
    let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
        .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;

    S3BlobStore::from_config(&config.storage, &access_key, &secret_key)
        .context("building S3 blob store")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("installing Ctrl-C handler failed: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
