//! Error types for the ambient node stack

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Router(#[from] arbor_router::RouterError),
}

pub type NodeResult<T> = Result<T, NodeError>;
