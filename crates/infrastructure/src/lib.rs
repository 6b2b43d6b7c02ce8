pub mod database;
pub mod feeds;
pub mod memory;

pub use database::*;
pub use feeds::{Feed, FeedLoader};
pub use memory::*;
