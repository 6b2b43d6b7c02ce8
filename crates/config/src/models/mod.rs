pub mod api_observability;
pub mod app_config;
pub mod engine;
pub mod storage;

pub use api_observability::*;
pub use app_config::*;
pub use engine::*;
pub use storage::*;
