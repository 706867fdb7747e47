use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("ingestion failed: {0}")]
    Ingestion(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("SQL execution failed: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("KPI engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("engines disagree on {kpi}: {detail}")]
    ComputationMismatch { kpi: String, detail: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
