use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed envelope: {0}")]
    Malformed(String),
    #[error("encoding failure: {0}")]
    Encoding(String),
}

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("article check unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("commit failed: {0}")]
    Commit(String),
}
