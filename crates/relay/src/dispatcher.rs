use async_trait::async_trait;
use domain::protocol::{self, BodyError, CommandEnvelope, CommandFamily, Paging, ResponseEnvelope};
use domain::{AppCommand, ListQuery, NewComment};
use serde_json::Value;
use std::sync::Arc;
use storage::StoreError;
use tracing::{debug, error, warn};

use crate::traits::{ArticleChecker, CommandHandler, CommentStore};

pub const ARTICLE_NOT_FOUND: &str = "article not found";

/// Status and payload of one dispatch. `error` is set only for status >= 400.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl Reply {
    pub fn ok(status: u16, data: Value) -> Self {
        Self {
            status,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn into_response(self, request_id: &str) -> ResponseEnvelope {
        match self.error {
            Some(error) => ResponseEnvelope::failure(request_id, self.status, error),
            None => ResponseEnvelope::success(request_id, self.status, self.data),
        }
    }
}

pub struct Dispatcher {
    store: Arc<dyn CommentStore>,
    checker: Arc<dyn ArticleChecker>,
    paging: Paging,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn CommentStore>, checker: Arc<dyn ArticleChecker>, paging: Paging) -> Self {
        Self {
            store,
            checker,
            paging,
        }
    }

    /// One attempt, no retries. Every failure is mapped to a status code.
    pub async fn dispatch(&self, cmd: &CommandEnvelope) -> Reply {
        let family = match CommandFamily::resolve(&cmd.path, &cmd.method) {
            Some(f) => f,
            None => {
                warn!(request_id = %cmd.request_id, "Unsupported route: {} {}", cmd.method, cmd.path);
                return Reply::error(400, format!("unsupported route: {} {}", cmd.method, cmd.path));
            }
        };

        let parsed = match family {
            CommandFamily::List => protocol::parse_list_query(&cmd.path, &cmd.body, &self.paging)
                .map(AppCommand::ListComments),
            CommandFamily::Add => protocol::parse_new_comment(&cmd.body).map(AppCommand::AddComment),
        };

        let command = match parsed {
            Ok(c) => c,
            Err(e) => {
                warn!(request_id = %cmd.request_id, family = family.as_str(), "Rejected command: {}", e);
                let status = match (family, &e) {
                    (CommandFamily::Add, BodyError::Invalid(_)) => 422,
                    _ => 400,
                };
                return Reply::error(status, e.to_string());
            }
        };

        let reply = self.execute(command).await;
        debug!(request_id = %cmd.request_id, status = reply.status, "Command dispatched");
        reply
    }

    pub async fn execute(&self, command: AppCommand) -> Reply {
        match command {
            AppCommand::ListComments(query) => self.list(query).await,
            AppCommand::AddComment(new_comment) => self.add(new_comment).await,
        }
    }

    async fn list(&self, query: ListQuery) -> Reply {
        if let Some(reply) = self.require_article(&query.news_id).await {
            return reply;
        }

        match self.store.list(query.news_id, query.limit, query.offset).await {
            Ok(comments) => match serde_json::to_value(&comments) {
                Ok(data) => Reply::ok(200, data),
                Err(e) => {
                    error!("Failed to encode comments: {:?}", e);
                    Reply::error(500, "failed to encode comments")
                }
            },
            Err(StoreError::InvalidArgument(msg)) => Reply::error(400, msg),
            Err(e) => {
                error!("Failed to get comments for news {}: {:?}", query.news_id, e);
                Reply::error(500, "failed to get comments")
            }
        }
    }

    async fn add(&self, new_comment: NewComment) -> Reply {
        if let Some(txn) = new_comment.txn_id.as_deref() {
            match self.store.exists_by_txn(txn).await {
                Ok(true) => {
                    warn!("Duplicate add for txn_id {}", txn);
                    return Reply::error(409, format!("comment with txn_id {} already exists", txn));
                }
                Ok(false) => {}
                Err(e) => {
                    error!("Failed to check txn_id {}: {:?}", txn, e);
                    return Reply::error(500, "failed to save comment");
                }
            }
        }

        if let Some(reply) = self.require_article(&new_comment.news_id).await {
            return reply;
        }

        // 检查与写入之间没有事务：文章在此期间被删除时评论仍会落库
        let saved = self
            .store
            .create(
                new_comment.news_id,
                &new_comment.content,
                new_comment.txn_id.as_deref(),
            )
            .await;

        match saved {
            Ok(comment) => match serde_json::to_value(&comment) {
                Ok(data) => Reply::ok(201, data),
                Err(e) => {
                    error!("Failed to encode comment {}: {:?}", comment.id, e);
                    Reply::error(500, "failed to encode comment")
                }
            },
            Err(StoreError::Duplicate(txn)) => {
                Reply::error(409, format!("comment with txn_id {} already exists", txn))
            }
            Err(StoreError::InvalidArgument(msg)) => Reply::error(422, msg),
            Err(e) => {
                error!("Failed to save comment for news {}: {:?}", new_comment.news_id, e);
                Reply::error(500, "failed to save comment")
            }
        }
    }

    async fn require_article(&self, news_id: &domain::ArticleId) -> Option<Reply> {
        match self.checker.exists(*news_id).await {
            Ok(true) => None,
            Ok(false) => {
                warn!("News {} not found", news_id);
                Some(Reply::error(404, ARTICLE_NOT_FOUND))
            }
            Err(e) => {
                error!("Failed to check news {} existence: {}", news_id, e);
                Some(Reply::error(500, "article service unavailable"))
            }
        }
    }
}

#[async_trait]
impl CommandHandler for Dispatcher {
    async fn handle(&self, cmd: &CommandEnvelope) -> Reply {
        self.dispatch(cmd).await
    }
}
