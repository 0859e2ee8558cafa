use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Directory path cannot be empty")]
    EmptyDirectory,

    #[error("Failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
