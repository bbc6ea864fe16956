use crate::{Db, StoreError};
use domain::ArticleId;

impl Db {
    // 新闻库由新闻服务维护，这里只读
    pub async fn article_exists(&self, news_id: ArticleId) -> Result<bool, StoreError> {
        let found: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM news WHERE id = ?)")
            .bind(news_id.get())
            .fetch_one(&self.pool)
            .await?;
        Ok(found != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn checks_news_table() {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE news (id INTEGER PRIMARY KEY, title TEXT NOT NULL)")
            .execute(&db.pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO news (id, title) VALUES (42, 'hello')")
            .execute(&db.pool)
            .await
            .unwrap();

        assert!(db.article_exists(ArticleId::new_unchecked(42)).await.unwrap());
        assert!(!db.article_exists(ArticleId::new_unchecked(999)).await.unwrap());
    }

    #[tokio::test]
    async fn missing_news_table_is_an_error() {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        let err = db.article_exists(ArticleId::new_unchecked(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Persistence(_)));
    }
}
