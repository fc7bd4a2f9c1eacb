//! Error types for the control registry.

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("target not registered: {0}")]
    NotFound(String),

    #[error("control channel closed for target {0}")]
    ChannelClosed(String),
}
