mod http;
mod sql;

pub use self::http::HttpArticleChecker;
pub use self::sql::SqlArticleChecker;
