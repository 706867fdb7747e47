use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which strategy the Gold stage uses to compute KPIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Memory,
    Relational,
}

impl FromStr for EngineKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(EngineKind::Memory),
            "relational" => Ok(EngineKind::Relational),
            other => Err(PipelineError::Config(format!(
                "unknown engine '{other}' (expected 'memory' or 'relational')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root directory for bronze/silver/gold artifacts.
    pub data_directory: PathBuf,
    pub engine: EngineKind,
    /// Degrade to the in-memory engine when the relational one is unreachable.
    pub fallback_to_memory: bool,
    /// Fixed `as_of` timestamp for deterministic top-customers runs.
    pub as_of_override: Option<DateTime<Utc>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from("data"),
            engine: EngineKind::Memory,
            fallback_to_memory: true,
            as_of_override: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file backing the relational KPI engine. Defaults to
    /// `<data_directory>/gold/kpi.db` when unset.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub database: DatabaseConfig,
}

impl Config {
    /// Loads configuration from a TOML file, then applies environment
    /// overrides (PIPELINE_DATA_DIR, PIPELINE_ENGINE, DATABASE_PATH).
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(p) => {
                let content = fs::read_to_string(p).map_err(|e| {
                    PipelineError::Config(format!(
                        "failed to read config file '{}': {e}",
                        p.display()
                    ))
                })?;
                toml::from_str(&content)?
            }
            None => match fs::read_to_string("config.toml") {
                Ok(content) => toml::from_str(&content)?,
                Err(_) => Config::default(),
            },
        };

        if let Ok(dir) = std::env::var("PIPELINE_DATA_DIR") {
            config.pipeline.data_directory = PathBuf::from(dir);
        }
        if let Ok(engine) = std::env::var("PIPELINE_ENGINE") {
            config.pipeline.engine = engine.parse()?;
        }
        if let Ok(db) = std::env::var("DATABASE_PATH") {
            config.database.path = Some(PathBuf::from(db));
        }

        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        match &self.database.path {
            Some(p) => p.clone(),
            None => self.pipeline.data_directory.join("gold").join("kpi.db"),
        }
    }
}
