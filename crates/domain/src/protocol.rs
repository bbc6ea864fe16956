use crate::commands::{ListQuery, NewComment};
use crate::models::ArticleId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const COMMENTS_PATH: &str = "/comments";
// 旧版客户端使用的添加路径
pub const LEGACY_ADD_PATH: &str = "/addcomment";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CommandEnvelope {
    pub request_id: String,
    pub path: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub body: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub request_id: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    pub fn success(request_id: impl Into<String>, status: u16, data: Option<Value>) -> Self {
        Self {
            request_id: request_id.into(),
            status,
            data,
            error: None,
        }
    }

    pub fn failure(request_id: impl Into<String>, status: u16, error: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            status,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFamily {
    List,
    Add,
}

impl CommandFamily {
    /// Classifies a command by its path prefix, using the method to tell list
    /// from add when both share `/comments`.
    pub fn resolve(path: &str, method: &str) -> Option<Self> {
        let path = path.trim().to_ascii_lowercase();
        if has_prefix(&path, LEGACY_ADD_PATH) {
            return Some(Self::Add);
        }
        if !has_prefix(&path, COMMENTS_PATH) {
            return None;
        }
        match method.trim().to_ascii_uppercase().as_str() {
            "POST" => Some(Self::Add),
            "GET" | "" => Some(Self::List),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Add => "add",
        }
    }
}

fn has_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BodyError {
    #[error("malformed body: {0}")]
    Malformed(String),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub default_limit: i64,
    pub max_limit: i64,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

impl Paging {
    pub fn apply(&self, limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
        let limit = match limit {
            Some(l) if l > 0 => l.min(self.max_limit),
            _ => self.default_limit,
        };
        let offset = offset.filter(|o| *o >= 0).unwrap_or(0);
        (limit, offset)
    }
}

#[derive(Deserialize, Debug, Default)]
struct ListBody {
    news_id: Option<Value>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Deserialize, Debug, Default)]
struct AddBody {
    text: Option<String>,
    post_id: Option<i64>,
    txn_id: Option<String>,
}

/// Builds a list query from a command body. When the body carries no
/// `news_id`, the trailing path segment (`/comments/42`) is used instead.
pub fn parse_list_query(path: &str, body: &Value, paging: &Paging) -> Result<ListQuery, BodyError> {
    let raw: ListBody = if body.is_null() {
        ListBody::default()
    } else {
        serde_json::from_value(body.clone()).map_err(|e| BodyError::Malformed(e.to_string()))?
    };

    let news_id = match raw.news_id {
        Some(Value::String(s)) => s.parse::<ArticleId>().map_err(BodyError::Invalid)?,
        Some(Value::Number(n)) => {
            let id = n
                .as_i64()
                .ok_or_else(|| BodyError::Invalid(format!("News ID is not an integer: {}", n)))?;
            ArticleId::new(id).map_err(BodyError::Invalid)?
        }
        Some(Value::Null) | None => news_id_from_path(path)
            .ok_or_else(|| BodyError::Invalid("news_id is required".to_string()))?
            .map_err(BodyError::Invalid)?,
        Some(other) => {
            return Err(BodyError::Invalid(format!(
                "news_id must be a string or integer, got {}",
                other
            )))
        }
    };

    let (limit, offset) = paging.apply(raw.limit, raw.offset);
    Ok(ListQuery {
        news_id,
        limit,
        offset,
    })
}

fn news_id_from_path(path: &str) -> Option<Result<ArticleId, String>> {
    let path = path.split('?').next().unwrap_or("");
    let tail = path
        .trim_end_matches('/')
        .strip_prefix(COMMENTS_PATH)?
        .trim_start_matches('/');
    if tail.is_empty() {
        return None;
    }
    Some(tail.parse::<ArticleId>())
}

pub fn parse_new_comment(body: &Value) -> Result<NewComment, BodyError> {
    // null 等同于空对象，缺字段按 422 处理
    let raw: AddBody = if body.is_null() {
        AddBody::default()
    } else {
        serde_json::from_value(body.clone()).map_err(|e| BodyError::Malformed(e.to_string()))?
    };

    let content = raw.text.unwrap_or_default();
    if content.trim().is_empty() {
        return Err(BodyError::Invalid("text is required".to_string()));
    }
    let news_id = match raw.post_id {
        Some(id) => ArticleId::new(id).map_err(BodyError::Invalid)?,
        None => return Err(BodyError::Invalid("post_id is required".to_string())),
    };
    let txn_id = raw.txn_id.filter(|t| !t.trim().is_empty());

    Ok(NewComment {
        news_id,
        content,
        txn_id,
    })
}
