use crate::{models::SqlComment, Db, StoreError};
use domain::{ArticleId, Comment};
use tracing::{debug, error};

const SELECT_COLUMNS: &str = "SELECT id, news_id, content, created_at, txn_id FROM comments";

fn new_comment_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

impl Db {
    // 写入评论；txn_id 存在时先查重，并依赖唯一约束兜底并发重放
    pub async fn create_comment(
        &self,
        news_id: ArticleId,
        content: &str,
        txn_id: Option<&str>,
    ) -> Result<Comment, StoreError> {
        if news_id.get() <= 0 {
            return Err(StoreError::InvalidArgument(format!("invalid news ID: {}", news_id)));
        }
        if content.trim().is_empty() {
            return Err(StoreError::InvalidArgument("comment content is empty".to_string()));
        }
        if let Some(txn) = txn_id {
            if self.txn_exists(txn).await? {
                return Err(StoreError::Duplicate(txn.to_string()));
            }
        }

        let comment = Comment {
            id: new_comment_id(),
            news_id,
            content: content.to_string(),
            created_at: self.next_timestamp(),
            txn_id: txn_id.map(str::to_string),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO comments (id, news_id, content, created_at, txn_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&comment.id)
        .bind(comment.news_id.get())
        .bind(&comment.content)
        .bind(comment.created_at)
        .bind(&comment.txn_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("Comment {} saved for news {}", comment.id, news_id);
                Ok(comment)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                let txn = comment.txn_id.unwrap_or_default();
                Err(StoreError::Duplicate(txn))
            }
            Err(e) => {
                error!("Failed to save comment for news {}: {:?}", news_id, e);
                Err(e.into())
            }
        }
    }

    pub async fn list_comments(
        &self,
        news_id: ArticleId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Comment>, StoreError> {
        if news_id.get() <= 0 {
            return Err(StoreError::InvalidArgument(format!("invalid news ID: {}", news_id)));
        }
        if limit < 0 || offset < 0 {
            return Err(StoreError::InvalidArgument(format!(
                "invalid paging: limit={} offset={}",
                limit, offset
            )));
        }

        let rows = sqlx::query_as::<_, SqlComment>(&format!(
            "{} WHERE news_id = ? ORDER BY created_at ASC, rowid ASC LIMIT ? OFFSET ?",
            SELECT_COLUMNS
        ))
        .bind(news_id.get())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to list comments for news {}: {:?}", news_id, e);
            e
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn txn_exists(&self, txn_id: &str) -> Result<bool, StoreError> {
        let found: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM comments WHERE txn_id = ?)")
            .bind(txn_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(found != 0)
    }
}
