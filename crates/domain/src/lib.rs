mod commands;
mod models;
pub mod protocol;

pub use commands::{AppCommand, ListQuery, NewComment};
pub use models::{ArticleId, Comment};
