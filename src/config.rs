use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "FLOATINGEST_CONFIG";

/// Environment variable overriding `storage.db_path`
pub const DB_PATH_ENV: &str = "FLOATINGEST_DB_PATH";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Storage target
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
    /// How long a write waits on a locked database before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// On-disk layout of the corpus
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Files waiting to be ingested
    pub intake_dir: PathBuf,
    /// Files moved here after a successful commit
    pub processed_dir: PathBuf,
    /// One CSV snapshot per ingested file
    pub snapshot_dir: PathBuf,
}

/// Pipeline tuning
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_surface_depth")]
    pub surface_depth: f64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_write_snapshots")]
    pub write_snapshots: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            surface_depth: default_surface_depth(),
            workers: default_workers(),
            write_snapshots: default_write_snapshots(),
            log_level: default_log_level(),
        }
    }
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_batch_size() -> usize {
    5000
}

fn default_surface_depth() -> f64 {
    10.0
}

fn default_workers() -> usize {
    1
}

fn default_write_snapshots() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in FLOATINGEST_CONFIG environment variable
    /// 2. ./config.toml in current directory
    ///
    /// `FLOATINGEST_DB_PATH` replaces `storage.db_path` when set.
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config = Self::from_toml(&config_str)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        if let Ok(db_path) = std::env::var(DB_PATH_ENV) {
            if !db_path.trim().is_empty() {
                config.storage.db_path = PathBuf::from(db_path);
            }
        }

        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.pipeline.batch_size == 0 {
            anyhow::bail!("pipeline.batch_size must be greater than 0");
        }

        if self.pipeline.workers == 0 {
            anyhow::bail!("pipeline.workers must be greater than 0");
        }

        if !self.pipeline.surface_depth.is_finite() || self.pipeline.surface_depth < 0.0 {
            anyhow::bail!(
                "pipeline.surface_depth must be a non-negative number, got {}",
                self.pipeline.surface_depth
            );
        }

        if self.paths.intake_dir == self.paths.processed_dir {
            anyhow::bail!(
                "paths.processed_dir must differ from paths.intake_dir ({})",
                self.paths.intake_dir.display()
            );
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.storage.db_path
    }

    /// Get the intake directory
    pub fn intake_dir(&self) -> &Path {
        &self.paths.intake_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    const MINIMAL: &str = r#"
[storage]
db_path = "./floats.db"

[paths]
intake_dir = "data"
processed_dir = "data/processed"
snapshot_dir = "data/snapshots"
"#;

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.pipeline.batch_size, 5000);
        assert_eq!(config.pipeline.surface_depth, 10.0);
        assert_eq!(config.pipeline.workers, 1);
        assert!(config.pipeline.write_snapshots);
        assert_eq!(config.storage.migrations_dir, PathBuf::from("migrations"));
        assert_eq!(config.storage.busy_timeout_ms, 5000);
    }

    #[test]
    fn test_pipeline_overrides() {
        let content = format!(
            "{}\n[pipeline]\nbatch_size = 100\nworkers = 4\nwrite_snapshots = false\nlog_level = \"debug\"\n",
            MINIMAL
        );
        let config = Config::from_toml(&content).unwrap();
        assert_eq!(config.pipeline.batch_size, 100);
        assert_eq!(config.pipeline.workers, 4);
        assert!(!config.pipeline.write_snapshots);
        assert_eq!(config.pipeline.log_level, "debug");
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let content = format!("{}\n[pipeline]\nbatch_size = 0\n", MINIMAL);
        let err = Config::from_toml(&content).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_rejects_negative_surface_depth() {
        let content = format!("{}\n[pipeline]\nsurface_depth = -1.0\n", MINIMAL);
        assert!(Config::from_toml(&content).is_err());
    }

    #[test]
    fn test_rejects_processed_dir_equal_to_intake() {
        let content = r#"
[storage]
db_path = "./floats.db"

[paths]
intake_dir = "data"
processed_dir = "data"
snapshot_dir = "snapshots"
"#;
        let err = Config::from_toml(content).unwrap_err();
        assert!(err.to_string().contains("processed_dir"));
    }

    #[test]
    fn test_load_from_file_with_db_override() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, MINIMAL).unwrap();

        let original = std::env::var(DB_PATH_ENV).ok();
        std::env::set_var(DB_PATH_ENV, "/tmp/override.db");
        let config = Config::load_from(&config_path);
        std::env::remove_var(DB_PATH_ENV);
        if let Some(v) = original {
            std::env::set_var(DB_PATH_ENV, v);
        }

        let config = config.unwrap();
        assert_eq!(config.db_path(), Path::new("/tmp/override.db"));
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let original = std::env::var(CONFIG_ENV).ok();
        std::env::set_var(CONFIG_ENV, "nonexistent.toml");
        let config = Config::load();
        assert!(config.is_err());
        std::env::remove_var(CONFIG_ENV);
        if let Some(v) = original {
            std::env::set_var(CONFIG_ENV, v);
        }
    }
}
