use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("comment with txn_id {0} already exists")]
    Duplicate(String),
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
}
