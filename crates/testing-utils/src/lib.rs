//! # Fairshare Testing Utils
//!
//! 各crate测试共用的工具：
//!
//! - **Builders**: Worker、工作项与换班请求的构造器
//! - **ManualClock**: 手动推进的时钟，用于过期判断
//! - **Mocks**: mockall 生成的审计仓储、可切换失败的审计仓储、记录告警的通道
//!
//! ```toml
//! [dev-dependencies]
//! fairshare-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
