use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Reload periodic task definitions from the store every 5 minutes.
///
/// Shrinking this far below a minute makes every reload a full table scan
/// competing with task firings; growing it delays pickup of new tasks.
pub const DEFAULT_RELOAD_CRON: &str = "*/5 * * * *";
pub const DEFAULT_LOG_FILTER: &str = "cadence=info";

/// Top-level config (cadence.toml + CADENCE_<SECTION>__<KEY> env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CadenceConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Cron expression driving the self-reload of periodic tasks.
    #[serde(default = "default_reload_cron")]
    pub reload_cron: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reload_cron: default_reload_cron(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive. `RUST_LOG` wins when set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_reload_cron() -> String {
    DEFAULT_RELOAD_CRON.to_string()
}
fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cadence/cadence.db", home)
}

impl CadenceConfig {
    /// Load config from a TOML file with CADENCE_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. `CADENCE_CONFIG` env var
    ///   3. ~/.cadence/cadence.toml
    ///
    /// A missing file is not an error: every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("CADENCE_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::CadenceError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(CadenceConfig::default()))
            .merge(Toml::file(path))
            // `CADENCE_CONFIG` names the file itself, so keep it out of the tree.
            // Double underscore separates sections: CADENCE_SCHEDULER__RELOAD_CRON.
            .merge(Env::prefixed("CADENCE_").ignore(&["CONFIG"]).split("__"))
    }

    /// Create the directory holding the SQLite file if it does not exist yet.
    pub fn ensure_database_dir(&self) -> crate::error::Result<()> {
        if let Some(parent) = Path::new(&self.database.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cadence/cadence.toml", home)
}
