//! Application state.

use std::sync::Arc;

use vcast_queue::{JobRunner, ProgressHub, Scheduler, SchedulerConfig};
use vcast_store::JobStore;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<JobStore>,
    pub scheduler: Arc<Scheduler>,
    pub progress: Arc<ProgressHub>,
}

impl AppState {
    /// Open the job store and wire up the scheduler around `runner`.
    ///
    /// The caller still has to refill capacity (`fill_capacity`) and
    /// start the retention sweeper; the binary does both on startup.
    pub fn new(config: ApiConfig, runner: Arc<dyn JobRunner>) -> Self {
        let store = Arc::new(JobStore::open(config.data_file.clone()));
        let progress = Arc::new(ProgressHub::new());
        let scheduler = Scheduler::new(
            SchedulerConfig::from_env(),
            Arc::clone(&store),
            Arc::clone(&progress),
            runner,
        );

        Self {
            config,
            store,
            scheduler,
            progress,
        }
    }
}
