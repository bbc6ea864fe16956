mod comments;
mod news;
