pub mod bus;
pub mod comments;
