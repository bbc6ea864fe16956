use crate::models::ArticleId;

/// 已校验的列表查询，limit/offset 均已套用默认值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub news_id: ArticleId,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub news_id: ArticleId,
    pub content: String,
    pub txn_id: Option<String>, // 支持幂等去重
}

#[derive(Debug)]
pub enum AppCommand {
    ListComments(ListQuery),
    AddComment(NewComment),
}
