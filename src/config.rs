use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for the coordination bridge
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Coordination database settings
    pub database: DatabaseConfig,
    /// Bridge runtime tuning
    pub bridge: BridgeSettings,
    /// Beads issue tracker adapter
    pub tracker: TrackerConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite database URL or file path
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeSettings {
    /// Per-subscriber event queue capacity
    pub event_buffer_capacity: usize,
    /// Number of recent events kept for history queries
    pub event_history_limit: usize,
    /// How long the entity-id job waits on the engine before reporting the mapping as pending
    pub entity_wait_timeout_seconds: u64,
    /// Number of best-effort failures retained for inspection
    pub best_effort_log_capacity: usize,
    /// Duration samples kept per metrics series; older samples are evicted
    pub metrics_sample_capacity: usize,
}

impl BridgeSettings {
    pub fn entity_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.entity_wait_timeout_seconds)
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            event_buffer_capacity: 100,
            event_history_limit: 1000,
            entity_wait_timeout_seconds: 30,
            best_effort_log_capacity: 256,
            metrics_sample_capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerConfig {
    /// Path to the beads `bd` binary
    pub bd_path: String,
    /// Actor name recorded on tracker changes
    pub actor: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is unset
    pub log_level: String,
    /// Emit JSON structured logs instead of human-readable lines
    pub json_logs: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://data/coordination.db".to_string(),
                max_connections: 5,
                auto_migrate: true,
            },
            bridge: BridgeSettings::default(),
            tracker: TrackerConfig {
                bd_path: "bd".to_string(),
                actor: "workflow-system".to_string(),
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: true,
            },
        }
    }
}

impl BridgeConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (beads-workflow.toml, .beads-workflow-rc)
    /// 3. Environment variables (prefixed with BEADS_WORKFLOW__)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if Path::new("beads-workflow.toml").exists() {
            builder = builder.add_source(File::with_name("beads-workflow"));
        }

        if Path::new(".beads-workflow-rc").exists() {
            builder = builder.add_source(
                File::with_name(".beads-workflow-rc").format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("BEADS_WORKFLOW")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load configuration from an explicit file, still honouring defaults and env overrides
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("BEADS_WORKFLOW")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<BridgeConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = BridgeConfig::load_env_file();
        BridgeConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static BridgeConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.bridge.event_buffer_capacity, 100);
        assert_eq!(config.bridge.entity_wait_timeout(), Duration::from_secs(30));
        assert_eq!(config.bridge.metrics_sample_capacity, 10_000);
        assert_eq!(config.tracker.bd_path, "bd");
        assert!(config.database.auto_migrate);
    }

    #[test]
    fn test_save_and_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.toml");

        let mut config = BridgeConfig::default();
        config.bridge.event_buffer_capacity = 8;
        config.tracker.actor = "ci-bot".to_string();
        config.save_to_file(&path).unwrap();

        let loaded = BridgeConfig::load_from(&path).unwrap();
        assert_eq!(loaded.bridge.event_buffer_capacity, 8);
        assert_eq!(loaded.tracker.actor, "ci-bot");
        assert_eq!(loaded.database.max_connections, 5);
    }
}
