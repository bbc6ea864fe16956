use async_trait::async_trait;
use domain::protocol::CommandEnvelope;
use domain::{ArticleId, Comment};
use std::sync::Arc;
use std::time::Duration;
use storage::StoreError;

use crate::dispatcher::Reply;
use crate::error::{CheckError, TransportError};

/// A message as handed out by the bus. `offset` is what gets committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub topic: String,
    pub offset: u64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait Consumer: Send {
    /// Waits at most `wait` for the next message. `Ok(None)` means the poll
    /// interval elapsed with nothing to deliver.
    async fn fetch_next(&mut self, wait: Duration) -> Result<Option<RawMessage>, TransportError>;
    async fn commit(&mut self, msg: &RawMessage) -> Result<(), TransportError>;
    async fn close(&mut self);
}

/// Shared by every relay loop, so implementations must be safe for
/// concurrent callers.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<(), TransportError>;
    async fn close(&self);
}

pub trait Bus: Send + Sync {
    fn consumer(&self, group: &str, topic: &str) -> Box<dyn Consumer>;
    fn publisher(&self) -> Arc<dyn Publisher>;
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn create(&self, news_id: ArticleId, content: &str, txn_id: Option<&str>) -> Result<Comment, StoreError>;
    async fn list(&self, news_id: ArticleId, limit: i64, offset: i64) -> Result<Vec<Comment>, StoreError>;
    async fn exists_by_txn(&self, txn_id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ArticleChecker: Send + Sync {
    async fn exists(&self, news_id: ArticleId) -> Result<bool, CheckError>;
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, cmd: &CommandEnvelope) -> Reply;
}
