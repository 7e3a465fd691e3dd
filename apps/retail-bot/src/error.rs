//! # Bot Error Type
//!
//! Failures that escape a conversation step.
//!
//! ```text
//! ValidationError / CoreError  → never reach here, answered in-flow
//! DbError                      → BotError::Db → "please try again",
//!                                session left as it was
//! ConfigError / io::Error      → startup and console only
//! serde_json::Error            → console --json output
//! ```

use thiserror::Error;

use crate::config::ConfigError;
use retail_db::DbError;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type BotResult<T> = Result<T, BotError>;
