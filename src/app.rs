//! Wiring of the engine components around one store.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::assignment::Assigner;
use crate::autopilot::AutoPilot;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::evaluation::Evaluator;
use crate::feedback::FeedbackTrigger;
use crate::services::{AlertService, FeatureFlagService, StoreFlagService, TracingAlertService};
use crate::storage::{ExperimentStore, SqliteStore};
use crate::tracking::EventTracker;

pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn ExperimentStore>,
    pub clock: Arc<dyn Clock>,
    pub assigner: Assigner,
    pub tracker: EventTracker,
    pub evaluator: Evaluator,
    pub autopilot: Arc<AutoPilot>,
    pub feedback: FeedbackTrigger,
    /// Emit JSON instead of human layouts.
    pub machine: bool,
}

impl AppContext {
    /// Load config and open the SQLite store it points at.
    pub fn from_cwd(config_path: Option<&Path>, db_override: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let mut config = Config::load(config_path, &cwd)?;
        if let Some(path) = db_override {
            config.storage.database_path = Some(path.to_path_buf());
        }
        Self::open(config)
    }

    pub fn open(config: Config) -> Result<Self> {
        let path = config.storage.resolved_database_path();
        debug!(path = %path.display(), "opening experiment store");
        let store: Arc<dyn ExperimentStore> = Arc::new(SqliteStore::open(&path)?);
        let flags: Arc<dyn FeatureFlagService> =
            Arc::new(StoreFlagService::new(Arc::clone(&store)));
        Ok(Self::with_parts(
            config,
            store,
            flags,
            Arc::new(TracingAlertService),
            Arc::new(SystemClock),
        ))
    }

    pub fn with_parts(
        config: Config,
        store: Arc<dyn ExperimentStore>,
        flags: Arc<dyn FeatureFlagService>,
        alerts: Arc<dyn AlertService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let evaluator = Evaluator::new(Arc::clone(&store), Arc::clone(&clock))
            .with_significance_level(config.statistics.significance_level);
        let autopilot = Arc::new(AutoPilot::new(
            Arc::clone(&store),
            evaluator.clone(),
            flags,
            alerts,
            Arc::clone(&clock),
        ));
        let feedback = FeedbackTrigger::new(
            Arc::clone(&store),
            Arc::clone(&autopilot),
            Arc::clone(&clock),
            config.feedback.clone(),
        );

        Self {
            assigner: Assigner::new(Arc::clone(&store), Arc::clone(&clock)),
            tracker: EventTracker::new(Arc::clone(&store), Arc::clone(&clock)),
            evaluator,
            autopilot,
            feedback,
            config,
            store,
            clock,
            machine: false,
        }
    }

    #[must_use]
    pub fn with_machine_mode(mut self, machine: bool) -> Self {
        self.machine = machine;
        self
    }
}
