//! Core shared errors (renderer-agnostic).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown texgen mode: {0}")]
    UnknownTexGenMode(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
