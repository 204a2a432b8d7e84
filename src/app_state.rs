// =============================================================================
// Central Application State — Alpha Engine
// =============================================================================
//
// Shared by the HTTP surface and the scheduled runner via `Arc<AppState>`.
// Holds the engine configuration, the store handle and the outcome of the
// most recent pipeline run.
//
// Thread safety:
//   - Atomic counter for lock-free run version tracking.
//   - parking_lot::RwLock for configuration and last-run metadata.
//   - tokio Mutex serialises pipeline runs so two triggers never overlap.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use tracing::info;

use crate::pipeline::{PipelineCoordinator, RunMetadata, RunReport};
use crate::runtime_config::EngineConfig;
use crate::store::{get_json, keys, KvStore};

pub struct AppState {
    /// Incremented after every completed run.
    pub run_version: AtomicU64,

    pub config: Arc<RwLock<EngineConfig>>,
    pub store: Arc<dyn KvStore>,

    pub last_run: RwLock<Option<RunMetadata>>,
    run_lock: tokio::sync::Mutex<()>,

    /// Bearer token for authenticated endpoints. `None` rejects them all.
    pub admin_token: Option<String>,

    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: EngineConfig, store: Arc<dyn KvStore>, admin_token: Option<String>) -> Self {
        Self {
            run_version: AtomicU64::new(0),
            config: Arc::new(RwLock::new(config)),
            store,
            last_run: RwLock::new(None),
            run_lock: tokio::sync::Mutex::new(()),
            admin_token: admin_token.filter(|t| !t.is_empty()),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn increment_version(&self) -> u64 {
        self.run_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_run_version(&self) -> u64 {
        self.run_version.load(Ordering::SeqCst)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Run the full pipeline against the shared store.
    ///
    /// Concurrent callers queue behind the one in progress.
    pub async fn run_pipeline(&self) -> Result<RunReport> {
        let _guard = self.run_lock.lock().await;

        // Snapshot config so the lock is not held across the run.
        let config = self.config.read().clone();
        let coordinator = PipelineCoordinator::new(config);
        let report = coordinator.run(self.store.as_ref()).await?;

        *self.last_run.write() = Some(report.metadata.clone());
        let version = self.increment_version();
        info!(run_id = %report.metadata.run_id, version, "run recorded");
        Ok(report)
    }

    /// Metadata of the latest run: this process's, else whatever the store holds.
    pub fn latest_run(&self) -> Result<Option<RunMetadata>> {
        if let Some(meta) = self.last_run.read().clone() {
            return Ok(Some(meta));
        }
        get_json(self.store.as_ref(), keys::SIMULATION_METADATA)
    }
}
