//! Parser error types.

use thiserror::Error;

/// Raised when a payload cannot be read as JSON at all.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
