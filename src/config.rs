use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, XpError};
use crate::stats::{DEFAULT_POWER, DEFAULT_SIGNIFICANCE_LEVEL};

/// Project-level config file name, looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = "xpilot.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub statistics: StatisticsConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub autopilot: AutoPilotConfig,
}

impl Config {
    /// Defaults, then the global and project files (or one explicit file),
    /// then environment overrides.
    pub fn load(explicit_path: Option<&Path>, project_root: &Path) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("XPILOT_CONFIG").ok().map(PathBuf::from));

        if let Some(path) = explicit {
            let patch = Self::load_patch(&path)?.ok_or_else(|| {
                XpError::Config(format!("config file not found: {}", path.display()))
            })?;
            config.merge_patch(patch);
        } else {
            if let Some(global) = Self::load_global()? {
                config.merge_patch(global);
            }
            if let Some(project) = Self::load_patch(&project_root.join(PROJECT_CONFIG_FILE))? {
                config.merge_patch(project);
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    pub fn global_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("xpilot/config.toml"))
    }

    fn load_global() -> Result<Option<ConfigPatch>> {
        match Self::global_path() {
            Some(path) => Self::load_patch(&path),
            None => Ok(None),
        }
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| XpError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| XpError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.storage {
            self.storage.merge(patch);
        }
        if let Some(patch) = patch.statistics {
            self.statistics.merge(patch);
        }
        if let Some(patch) = patch.feedback {
            self.feedback.merge(patch);
        }
        if let Some(patch) = patch.autopilot {
            self.autopilot.merge(patch);
        }
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = lookup("XPILOT_DB_PATH") {
            self.storage.database_path = Some(PathBuf::from(path));
        }
        if let Some(value) = parse_var::<f64>(&lookup, "XPILOT_SIGNIFICANCE_LEVEL")? {
            self.statistics.significance_level = value;
        }
        if let Some(value) = parse_var::<u64>(&lookup, "XPILOT_FEEDBACK_WINDOW_MINUTES")? {
            self.feedback.window_minutes = value;
        }
        if let Some(value) = parse_var::<usize>(&lookup, "XPILOT_FEEDBACK_MIN_SIGNALS")? {
            self.feedback.min_signals = value;
        }
        if let Some(value) = parse_var::<f64>(&lookup, "XPILOT_FEEDBACK_NEGATIVE_RATIO")? {
            self.feedback.negative_ratio = value;
        }
        if let Some(app) = lookup("XPILOT_APPLICATION_ID") {
            self.autopilot.application_id = Some(app).filter(|app| !app.is_empty());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let level = self.statistics.significance_level;
        if !(level > 0.0 && level < 1.0) {
            return Err(XpError::Config(format!(
                "statistics.significance_level must be in (0, 1), got {level}"
            )));
        }
        let power = self.statistics.default_power;
        if !(power > 0.0 && power < 1.0) {
            return Err(XpError::Config(format!(
                "statistics.default_power must be in (0, 1), got {power}"
            )));
        }
        let ratio = self.feedback.negative_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(XpError::Config(format!(
                "feedback.negative_ratio must be in [0, 1], got {ratio}"
            )));
        }
        if self.feedback.window_minutes == 0 {
            return Err(XpError::Config(
                "feedback.window_minutes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file. Defaults to the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|dir| dir.join("xpilot"))
                .unwrap_or_else(|| PathBuf::from(".xpilot"))
                .join("xpilot.db")
        })
    }

    fn merge(&mut self, patch: StoragePatch) {
        if let Some(value) = patch.database_path {
            self.database_path = Some(value);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsConfig {
    #[serde(default = "default_significance_level")]
    pub significance_level: f64,
    #[serde(default = "default_power")]
    pub default_power: f64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            significance_level: DEFAULT_SIGNIFICANCE_LEVEL,
            default_power: DEFAULT_POWER,
        }
    }
}

impl StatisticsConfig {
    fn merge(&mut self, patch: StatisticsPatch) {
        if let Some(value) = patch.significance_level {
            self.significance_level = value;
        }
        if let Some(value) = patch.default_power {
            self.default_power = value;
        }
    }
}

/// Negative-feedback spike detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackConfig {
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u64,
    #[serde(default = "default_min_signals")]
    pub min_signals: usize,
    /// Trigger when the negative share is strictly above this.
    #[serde(default = "default_negative_ratio")]
    pub negative_ratio: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
            min_signals: default_min_signals(),
            negative_ratio: default_negative_ratio(),
        }
    }
}

impl FeedbackConfig {
    fn merge(&mut self, patch: FeedbackPatch) {
        if let Some(value) = patch.window_minutes {
            self.window_minutes = value;
        }
        if let Some(value) = patch.min_signals {
            self.min_signals = value;
        }
        if let Some(value) = patch.negative_ratio {
            self.negative_ratio = value;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoPilotConfig {
    /// Limit `autopilot --all` sweeps to one application.
    #[serde(default)]
    pub application_id: Option<String>,
}

impl AutoPilotConfig {
    fn merge(&mut self, patch: AutoPilotPatch) {
        if let Some(value) = patch.application_id {
            self.application_id = Some(value);
        }
    }
}

const fn default_significance_level() -> f64 {
    DEFAULT_SIGNIFICANCE_LEVEL
}

const fn default_power() -> f64 {
    DEFAULT_POWER
}

const fn default_window_minutes() -> u64 {
    60
}

const fn default_min_signals() -> usize {
    5
}

const fn default_negative_ratio() -> f64 {
    0.7
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub storage: Option<StoragePatch>,
    pub statistics: Option<StatisticsPatch>,
    pub feedback: Option<FeedbackPatch>,
    pub autopilot: Option<AutoPilotPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StoragePatch {
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StatisticsPatch {
    pub significance_level: Option<f64>,
    pub default_power: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FeedbackPatch {
    pub window_minutes: Option<u64>,
    pub min_signals: Option<usize>,
    pub negative_ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AutoPilotPatch {
    pub application_id: Option<String>,
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| XpError::Config(format!("invalid {key} value {value}: {err}"))),
        None => Ok(None),
    }
}
