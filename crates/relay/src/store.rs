use async_trait::async_trait;
use domain::{ArticleId, Comment};
use storage::{Db, StoreError};

use crate::traits::CommentStore;

#[async_trait]
impl CommentStore for Db {
    async fn create(&self, news_id: ArticleId, content: &str, txn_id: Option<&str>) -> Result<Comment, StoreError> {
        self.create_comment(news_id, content, txn_id).await
    }

    async fn list(&self, news_id: ArticleId, limit: i64, offset: i64) -> Result<Vec<Comment>, StoreError> {
        self.list_comments(news_id, limit, offset).await
    }

    async fn exists_by_txn(&self, txn_id: &str) -> Result<bool, StoreError> {
        self.txn_exists(txn_id).await
    }
}
