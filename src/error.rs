use thiserror::Error;

use crate::{Stage, UInt};

pub type Result<T> = std::result::Result<T, QallocError>;

#[derive(Error, Debug)]
pub enum QallocError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Wealth {0} is not on the wealth grid")]
    OffGridWealth(UInt),

    #[error("Action {action} is not a candidate investment at wealth {wealth}")]
    InvalidAction { wealth: UInt, action: UInt },

    #[error("Stage {stage} is outside the horizon of {horizon} stages")]
    StageOutOfRange { stage: Stage, horizon: Stage },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QallocError {
    pub fn config(msg: impl Into<String>) -> Self {
        QallocError::Config(msg.into())
    }
}
