//! disciplined - The discipline background service
//!
//! This is the main entry point for the disciplined service.
//! It wires together all the components:
//! - Configuration loading
//! - Allowance and protector state stores
//! - Rule engine
//! - Interval timer driving the synchronization ticks

mod timer;

use anyhow::{Context, Result};
use clap::Parser;
use discipline_config::{Policy, StorageBackend, load_config};
use discipline_core::{
    AccessDecision, AllowanceTracker, BlockReason, CoreEvent, DisciplineEngine, ProtectorStates,
};
use discipline_store::{Codec, FileStore, SqliteStore, ValueStore};
use discipline_util::{DISCIPLINE_DATA_DIR_ENV, DateTime, Duration, default_config_path};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::timer::{IntervalScheduler, TokioScheduler};

const ALLOWANCE_FILE: &str = "allowance.json";
const PROTECTORS_FILE: &str = "protectors.json";
const DATABASE_FILE: &str = "disciplined.db";
const ALLOWANCE_KEY: &str = "allowance";
const PROTECTORS_KEY: &str = "protectors";

/// disciplined - Time- and usage-based access control service
#[derive(Parser, Debug)]
#[command(name = "disciplined")]
#[command(about = "Time- and usage-based access control service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/discipline/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set DISCIPLINE_DATA_DIR env var)
    #[arg(short, long, env = DISCIPLINE_DATA_DIR_ENV)]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

type AllowanceStore = Arc<dyn ValueStore<AllowanceTracker>>;
type ProtectorStore = Arc<dyn ValueStore<ProtectorStates>>;

/// Main service state
struct Service {
    engine: DisciplineEngine,
    allowance_store: Option<AllowanceStore>,
    protector_store: ProtectorStore,
    tick_interval: Duration,
    last_decision: Option<AccessDecision>,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let policy = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            rule_count = policy.rules.len(),
            "Configuration loaded"
        );

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| policy.daemon.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let (allowance_store, protector_store) = open_stores(&policy, &data_dir)?;
        let persisted = match &allowance_store {
            Some(store) => read_persisted_allowance(store.as_ref()).await,
            None => None,
        };

        let mut engine = DisciplineEngine::from_policy(&policy, persisted, discipline_util::now())
            .context("Failed to build rule engine")?;

        match protector_store.read().await {
            Ok(states) => {
                engine.restore_protector_states(&states);
            }
            Err(e) => warn!(error = %e, "Stored protector states unreadable, using configured state"),
        }

        Ok(Self::from_parts(
            engine,
            allowance_store,
            protector_store,
            policy.daemon.tick_interval,
        ))
    }

    fn from_parts(
        engine: DisciplineEngine,
        allowance_store: Option<AllowanceStore>,
        protector_store: ProtectorStore,
        tick_interval: Duration,
    ) -> Self {
        Self {
            engine,
            allowance_store,
            protector_store,
            tick_interval,
            last_decision: None,
        }
    }

    async fn run(mut self) -> Result<()> {
        // Ticks are coalesced if the loop falls behind
        let (tick_tx, mut tick_rx) = mpsc::channel::<()>(1);
        let mut scheduler = TokioScheduler::new();
        let timer = scheduler.register(
            self.tick_interval,
            Box::new(move || {
                let _ = tick_tx.try_send(());
            }),
        );

        let mut sigterm = signal(SignalKind::terminate())
            .context("Failed to create SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt())
            .context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup())
            .context("Failed to create SIGHUP handler")?;

        info!(tick_interval = %self.tick_interval, "Service running");
        self.tick().await;

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }
                Some(()) = tick_rx.recv() => {
                    self.tick().await;
                }
            }
        }

        info!("Shutting down disciplined");
        scheduler.clear(timer);

        self.engine.synchronize(discipline_util::now());
        self.persist().await;

        info!("Shutdown complete");
        Ok(())
    }

    async fn tick(&mut self) {
        self.tick_at(discipline_util::now()).await;
    }

    async fn tick_at(&mut self, now: DateTime) {
        for event in self.engine.synchronize(now) {
            Self::handle_core_event(&event);
        }

        let decision = self.engine.access_decision_at(now);
        if self.last_decision.as_ref() != Some(&decision) {
            log_decision(&decision);
            self.last_decision = Some(decision);
        }

        self.persist().await;
    }

    fn handle_core_event(event: &CoreEvent) {
        match event {
            CoreEvent::ProtectionLifted { rule_id } => {
                info!(rule_id = %rule_id, "Rule no longer protecting");
            }
            CoreEvent::AllowanceExhausted { allowance } => {
                info!(allowance = %allowance, "Allowance used up for today");
            }
            CoreEvent::AllowanceReset { allowance } => {
                info!(allowance = %allowance, "Allowance refilled for a new day");
            }
        }
    }

    /// Write the current state. Failures are logged and the next tick
    /// writes the full state again.
    async fn persist(&self) {
        if let (Some(store), Some(tracker)) = (&self.allowance_store, self.engine.allowance()) {
            match store.write(tracker).await {
                Ok(()) => debug!(
                    remaining_ms = tracker.remaining_duration().milliseconds(),
                    "Allowance persisted"
                ),
                Err(e) => warn!(error = %e, "Failed to persist allowance, retrying next tick"),
            }
        }

        let states = self.engine.protector_states();
        match self.protector_store.write(&states).await {
            Ok(()) => debug!(rules = states.len(), "Protector states persisted"),
            Err(e) => warn!(error = %e, "Failed to persist protector states, retrying next tick"),
        }
    }
}

fn log_decision(decision: &AccessDecision) {
    if !decision.blocked {
        info!("Access allowed");
        return;
    }

    let reasons: Vec<String> = decision
        .reasons
        .iter()
        .map(|reason| match reason {
            BlockReason::RuleEffective { rule_id } => format!("rule {}", rule_id),
            BlockReason::AllowanceUp { allowance } => format!("allowance of {} used up", allowance),
        })
        .collect();
    info!(reasons = ?reasons, "Access blocked");
}

fn allowance_codec(daily: Duration) -> Codec<AllowanceTracker> {
    Codec::new(
        AllowanceTracker::to_json_string,
        AllowanceTracker::from_json_str,
        move || AllowanceTracker::new(daily, discipline_util::now()),
    )
}

fn protector_codec() -> Codec<ProtectorStates> {
    Codec::new(
        ProtectorStates::to_json_string,
        ProtectorStates::from_json_str,
        ProtectorStates::new,
    )
}

fn open_stores(
    policy: &Policy,
    data_dir: &Path,
) -> Result<(Option<AllowanceStore>, ProtectorStore)> {
    let allowance_codec = policy
        .allowance
        .map(|allowance| allowance_codec(allowance.daily));
    if allowance_codec.is_none() {
        info!("No allowance configured");
    }

    let (allowance_store, protector_store): (Option<AllowanceStore>, ProtectorStore) =
        match policy.daemon.storage {
            StorageBackend::File => {
                info!(data_dir = %data_dir.display(), "Using file stores");
                let allowance_store = allowance_codec.map(|codec| {
                    Arc::new(FileStore::new(data_dir.join(ALLOWANCE_FILE), codec)) as AllowanceStore
                });
                let protector_store =
                    Arc::new(FileStore::new(data_dir.join(PROTECTORS_FILE), protector_codec()));
                (allowance_store, protector_store as ProtectorStore)
            }
            StorageBackend::Sqlite => {
                let path = data_dir.join(DATABASE_FILE);
                let allowance_store = match allowance_codec {
                    Some(codec) => {
                        let store = SqliteStore::open(&path, ALLOWANCE_KEY, codec)
                            .with_context(|| format!("Failed to open database {:?}", path))?;
                        Some(Arc::new(store) as AllowanceStore)
                    }
                    None => None,
                };
                let protector_store = SqliteStore::open(&path, PROTECTORS_KEY, protector_codec())
                    .with_context(|| format!("Failed to open database {:?}", path))?;
                info!(db_path = %path.display(), "Using SQLite stores");
                (allowance_store, Arc::new(protector_store) as ProtectorStore)
            }
        };

    if allowance_store.as_ref().is_some_and(|store| !store.is_healthy())
        || !protector_store.is_healthy()
    {
        warn!("A state store reports unhealthy");
    }

    Ok((allowance_store, protector_store))
}

async fn read_persisted_allowance(store: &dyn ValueStore<AllowanceTracker>) -> Option<AllowanceTracker> {
    match store.read().await {
        Ok(tracker) => {
            info!(
                remaining = %tracker.remaining_duration(),
                "Allowance loaded"
            );
            Some(tracker)
        }
        Err(e) => {
            warn!(error = %e, "Stored allowance unreadable, starting fresh");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mock_time = discipline_util::is_mock_time_active(),
        "disciplined starting"
    );

    let service = Service::new(&args).await?;
    service.run().await
}
