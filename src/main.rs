//! moOde audio monitor
//!
//! Watches which backend owns the audio device and publishes the current
//! source and details to MQTT.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use moode_audio_monitor::config::LogWatcher;
use moode_audio_monitor::publisher::{LogPublisher, MqttPublisher, Publisher, Topics};
use moode_audio_monitor::{AppConfig, Monitor, ReadCache, StateResolver, SystemEvidence};

/// moOde audio monitor - publish the active playback source to MQTT
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "MOODE_MONITOR_CONFIG", default_value = "moode_config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log state changes instead of publishing them to MQTT
    #[arg(long)]
    dry_run: bool,

    /// Resolve the current state once, print it and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Starting moOde audio monitor v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = AppConfig::load_or_default(&args.config).await?;

    let evidence = Arc::new(SystemEvidence::new(config.evidence.clone()));
    let cache = ReadCache::new(config.cache.ttl());
    let resolver = StateResolver::new(evidence, cache);

    if args.once {
        let state = resolver.resolve().await?;
        println!("{}", state);
        return Ok(());
    }

    let publisher: Arc<dyn Publisher> = if args.dry_run {
        info!("Dry run: state changes are logged, not published");
        Arc::new(LogPublisher::new())
    } else {
        Arc::new(MqttPublisher::connect(&config.mqtt))
    };

    let (mut watcher, invalidations) = LogWatcher::spawn(&config.evidence.watched_logs())?;

    let monitor = Monitor::new(
        resolver,
        Arc::clone(&publisher),
        Topics::from_config(&config.mqtt),
        config.monitor.clone(),
    );

    let last_state = monitor.run(invalidations, shutdown_signal()).await;

    // Cleanup
    info!("Shutting down...");
    watcher.stop();
    if let Err(e) = publisher.shutdown().await {
        warn!("Publisher shutdown failed: {}", e);
    }
    info!("Monitoring stopped (last state: {})", last_state);

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install CTRL+C signal handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}
