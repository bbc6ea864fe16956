use chrono::NaiveDateTime;
use domain::{ArticleId, Comment};
use sqlx::FromRow;

#[derive(FromRow)]
pub struct SqlComment {
    pub id: String,
    pub news_id: i64,
    pub content: String,
    pub created_at: NaiveDateTime,
    pub txn_id: Option<String>,
}

impl From<SqlComment> for Comment {
    fn from(sql: SqlComment) -> Self {
        Comment {
            id: sql.id,
            news_id: ArticleId::new_unchecked(sql.news_id),
            content: sql.content,
            created_at: sql.created_at,
            txn_id: sql.txn_id,
        }
    }
}
