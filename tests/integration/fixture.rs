use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tempfile::TempDir;

use xpilot::app::AppContext;
use xpilot::clock::FixedClock;
use xpilot::config::Config;
use xpilot::core::UserAssignment;
use xpilot::services::StoreFlagService;
use xpilot::storage::{ExperimentStore, SqliteStore};
use xpilot::test_utils::fixtures::{RecordingAlertService, fixed_clock, fixed_now};

/// Assert command succeeded
#[macro_export]
macro_rules! assert_command_success {
    ($output:expr) => {
        assert!(
            $output.success,
            "Command failed with exit code {}\nstdout: {}\nstderr: {}",
            $output.exit_code, $output.stdout, $output.stderr
        );
    };
}

/// Engine wired over a SQLite file in a temp directory.
pub struct SqliteEngine {
    _temp_dir: TempDir,
    pub db_path: PathBuf,
    pub store: Arc<SqliteStore>,
    pub clock: Arc<FixedClock>,
    pub alerts: Arc<RecordingAlertService>,
    pub app: AppContext,
}

impl SqliteEngine {
    pub fn new(test_name: &str) -> Self {
        Self::with_config(test_name, Config::default())
    }

    pub fn with_config(test_name: &str, config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("xpilot.db");
        println!("\n{}", "=".repeat(70));
        println!("[FIXTURE] Test: {test_name}");
        println!("[FIXTURE] Database: {db_path:?}");
        println!("{}", "=".repeat(70));

        let store = Arc::new(SqliteStore::open(&db_path).expect("open sqlite store"));
        let clock = Arc::new(fixed_clock());
        let alerts = Arc::new(RecordingAlertService::default());
        let app = AppContext::with_parts(
            config,
            store.clone(),
            Arc::new(StoreFlagService::new(store.clone())),
            alerts.clone(),
            clock.clone(),
        );
        Self {
            _temp_dir: temp_dir,
            db_path,
            store,
            clock,
            alerts,
            app,
        }
    }

    /// Second handle on the same database file.
    pub fn reopen(&self) -> SqliteStore {
        SqliteStore::open(&self.db_path).expect("reopen sqlite store")
    }

    pub fn force_assignment(&self, experiment_id: &str, user_id: &str, variant_id: &str) {
        self.store
            .set_assignment(&UserAssignment {
                experiment_id: experiment_id.to_string(),
                user_id: user_id.to_string(),
                variant_id: variant_id.to_string(),
                assigned_at: fixed_now(),
            })
            .expect("store assignment");
    }
}

/// Isolated home and working directory for driving the binary.
pub struct CliFixture {
    _temp_dir: TempDir,
    pub root: PathBuf,
    pub db_path: PathBuf,
}

impl CliFixture {
    pub fn new(test_name: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        let db_path = root.join("data").join("xpilot.db");
        println!("\n{}", "=".repeat(70));
        println!("[FIXTURE] Test: {test_name}");
        println!("[FIXTURE] Root: {root:?}");
        println!("{}", "=".repeat(70));
        Self {
            _temp_dir: temp_dir,
            root,
            db_path,
        }
    }

    pub fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.root.join(name);
        std::fs::write(&path, contents).expect("write fixture file");
        path
    }

    /// Run `xpilot --db <fixture db> <args>`.
    pub fn run(&self, args: &[&str]) -> CommandOutput {
        self.run_with_db(Some(&self.db_path), args)
    }

    pub fn run_with_db(&self, db: Option<&Path>, args: &[&str]) -> CommandOutput {
        println!("\n[CMD] xpilot {}", args.join(" "));
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_xpilot"));
        if let Some(db) = db {
            cmd.arg("--db").arg(db);
        }
        cmd.args(args)
            .env("HOME", &self.root)
            .env("XDG_CONFIG_HOME", self.root.join(".config"))
            .env("XDG_DATA_HOME", self.root.join(".local/share"))
            .env_remove("XPILOT_CONFIG")
            .env_remove("XPILOT_DB_PATH")
            .env_remove("XPILOT_SIGNIFICANCE_LEVEL")
            .env_remove("XPILOT_APPLICATION_ID")
            .env_remove("RUST_LOG")
            .current_dir(&self.root);

        let output = cmd.output().expect("Failed to execute xpilot");
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        println!("[CMD] Exit code: {}", output.status.code().unwrap_or(-1));
        if !stdout.is_empty() {
            println!("[STDOUT]\n{stdout}");
        }
        if !stderr.is_empty() {
            println!("[STDERR]\n{stderr}");
        }

        CommandOutput {
            success: output.status.success(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout,
            stderr,
        }
    }
}

/// Command output structure
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Parse stdout as JSON
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.stdout).expect("stdout should be valid JSON")
    }
}

/// Two-arm checkout experiment definition as accepted by `xpilot create`.
pub const CHECKOUT_DEFINITION: &str = r#"{
    "id": "checkout-v2",
    "name": "Checkout v2",
    "hypothesis": "One-page checkout converts better",
    "application_id": "shop",
    "variants": [
        {"id": "control", "name": "control", "weight": 50, "is_control": true,
         "feature_flags": {"one_page_checkout": false}},
        {"id": "treatment", "name": "treatment", "weight": 50,
         "feature_flags": {"one_page_checkout": true}}
    ],
    "metrics": [
        {"id": "conversion", "name": "Conversion", "type": "conversion",
         "aggregation": "rate", "direction": "increase"},
        {"id": "error_rate", "name": "Error rate", "type": "count",
         "aggregation": "avg", "direction": "decrease"}
    ],
    "guardrails": [
        {"metric_id": "error_rate", "threshold": 0.05, "comparison": "gt",
         "description": "Errors stay under 5%", "action": "rollback"}
    ],
    "success_criteria": [
        {"metric_id": "conversion", "min_lift": 0.05, "confidence": 0.95}
    ],
    "min_sample_size": 100,
    "min_duration_hours": 24
}"#;
