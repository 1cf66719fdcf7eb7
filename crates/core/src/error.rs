use thiserror::Error;

pub type MmmResult<T> = Result<T, MmmError>;

#[derive(Error, Debug)]
pub enum MmmError {
    #[error("Invalid date range: {0}")]
    InvalidDate(String),

    #[error("Unknown attribution model: {0}")]
    UnknownModel(String),

    #[error("Invalid budget: {0}")]
    InvalidBudget(String),

    #[error("No scenarios provided")]
    EmptyScenarios,

    #[error("No data available: {0}")]
    DataAbsent(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
