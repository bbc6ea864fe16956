pub mod memory;
pub mod news;
