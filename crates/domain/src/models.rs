use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a news article. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleId(i64);

impl ArticleId {
    pub fn new(id: i64) -> Result<Self, String> {
        if id <= 0 {
            return Err(format!("Invalid news ID: {}", id));
        }
        Ok(Self(id))
    }

    pub fn new_unchecked(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl FromStr for ArticleId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("News ID is not a number: {:?}", s))?;
        Self::new(id)
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub news_id: ArticleId,
    pub content: String,
    pub created_at: NaiveDateTime,
    // 客户端幂等键，仅在请求携带时存在
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txn_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_id_rejects_non_positive() {
        assert!(ArticleId::new(0).is_err());
        assert!(ArticleId::new(-3).is_err());
        assert_eq!(ArticleId::new(42).unwrap().get(), 42);
    }

    #[test]
    fn article_id_parses_numeric_strings() {
        assert_eq!(" 7 ".parse::<ArticleId>().unwrap(), ArticleId::new_unchecked(7));
        assert!("abc".parse::<ArticleId>().is_err());
        assert!("".parse::<ArticleId>().is_err());
        assert!("-1".parse::<ArticleId>().is_err());
    }

    #[test]
    fn comment_omits_missing_txn_id() {
        let comment = Comment {
            id: "c1".into(),
            news_id: ArticleId::new_unchecked(1),
            content: "hello".into(),
            created_at: chrono::DateTime::from_timestamp(0, 0).unwrap().naive_utc(),
            txn_id: None,
        };
        let json = serde_json::to_value(&comment).unwrap();
        assert_eq!(json["news_id"], 1);
        assert!(json.get("txn_id").is_none());
    }
}
