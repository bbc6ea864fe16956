use async_trait::async_trait;
use domain::ArticleId;
use std::time::Duration;
use storage::Db;

use crate::error::CheckError;
use crate::traits::ArticleChecker;

/// Reads the news service's database directly.
pub struct SqlArticleChecker {
    db: Db,
    timeout: Duration,
}

impl SqlArticleChecker {
    pub fn new(db: Db, timeout: Duration) -> Self {
        Self { db, timeout }
    }
}

#[async_trait]
impl ArticleChecker for SqlArticleChecker {
    async fn exists(&self, news_id: ArticleId) -> Result<bool, CheckError> {
        match tokio::time::timeout(self.timeout, self.db.article_exists(news_id)).await {
            Ok(Ok(found)) => Ok(found),
            Ok(Err(e)) => Err(CheckError::Unavailable(e.to_string())),
            Err(_) => Err(CheckError::Unavailable(format!(
                "news lookup timed out after {:?}",
                self.timeout
            ))),
        }
    }
}
