use thiserror::Error;
use voxcast_store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("blocking task failed: {0}")]
    Join(String),
}
