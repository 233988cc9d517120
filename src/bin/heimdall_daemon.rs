use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use heimdall::alerting::{AlertDispatcher, AlertQueue};
use heimdall::config::Config;
use heimdall::engine::SecurityLogger;
use heimdall::input::{JsonlTailer, UdpListener};
use heimdall::persistence::{EventStore, SqliteEventStore};

const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

/// Main daemon entry point for the security event logging engine
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting heimdall daemon...");

    // Load configuration
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        log::warn!("Config file not found, using defaults");
        Config::default()
    };

    // Setup graceful shutdown signal handling
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal, gracefully stopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    // Shared durable store
    let store: Arc<dyn EventStore> =
        Arc::new(SqliteEventStore::new(&config.persistence.db_path)?);
    log::info!("Durable store opened at {:?}", config.persistence.db_path);

    // Out-of-band alert dispatcher
    let alert_config = config.alerting.clone().with_env_webhook();
    let alerts = if alert_config.enabled {
        let (tx, rx) = AlertDispatcher::create_channel();
        let dispatcher = AlertDispatcher::new(alert_config);
        tokio::spawn(dispatcher.run(rx));
        Some(AlertQueue::new(tx))
    } else {
        None
    };

    let engine = SecurityLogger::new(&config, store.clone(), alerts);
    log::info!("Engine initialized as instance {}", engine.instance_id());

    // Initialize input source
    let mut jsonl_tailer: Option<JsonlTailer> = None;
    let mut udp_listener: Option<UdpListener> = None;

    match config.input.source_type.as_str() {
        "jsonl" => {
            if let Some(ref path) = config.input.file_path {
                let mut tailer = JsonlTailer::new(path.clone());
                tailer.initialize()?;
                jsonl_tailer = Some(tailer);
                log::info!("Tailing submission file: {:?}", path);
            }
        }
        "udp" => {
            if let Some(ref address) = config.input.udp_address {
                udp_listener = Some(UdpListener::new(address)?);
                log::info!("Listening for submissions on {}", address);
            }
        }
        _ => {
            log::warn!("Unknown input source type: {}", config.input.source_type);
        }
    }

    log::info!("Daemon running. Press Ctrl+C to stop.");

    let mut last_prune = Instant::now();

    // Main ingestion loop
    while running.load(Ordering::SeqCst) {
        let mut submissions = Vec::new();

        if let Some(ref mut tailer) = jsonl_tailer {
            if tailer.is_valid() {
                match tailer.read_submissions() {
                    Ok(new_submissions) => submissions.extend(new_submissions),
                    Err(e) => log::error!("Error reading submission file: {}", e),
                }
            }
        } else if let Some(ref mut listener) = udp_listener {
            loop {
                match listener.read_submission() {
                    Ok(Some(submission)) => submissions.push(submission),
                    Ok(None) => break, // No more datagrams
                    Err(e) => {
                        log::error!("Error reading submissions: {}", e);
                        break;
                    }
                }
            }
        }

        for submission in submissions {
            if let Err(e) = engine.log(submission) {
                log::warn!("Rejected submission: {}", e);
            }
        }

        // Periodic retention pruning
        if last_prune.elapsed() >= PRUNE_INTERVAL {
            let cutoff =
                chrono::Utc::now() - chrono::Duration::days(config.persistence.retention_days);
            match store.prune_before(cutoff) {
                Ok(deleted) if deleted > 0 => {
                    log::info!("Pruned {} events past retention", deleted)
                }
                Ok(_) => {}
                Err(e) => log::warn!("Retention prune failed: {}", e),
            }
            last_prune = Instant::now();
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    engine.shutdown().await;
    log::info!("heimdall daemon stopped");
    Ok(())
}
