//! 公平分配引擎的领域模型
//!
//! 工作项（路线）、Worker（司机）、基线分配、约束、换班提议与审计记录，
//! 以及各存储的仓储抽象。本crate不包含任何算法。

pub mod assignment;
pub mod audit;
pub mod clock;
pub mod constraint;
pub mod entities;
pub mod events;
pub mod proposal;
pub mod repositories;
pub mod value_objects;

pub use assignment::*;
pub use audit::*;
pub use clock::*;
pub use constraint::*;
pub use entities::*;
pub use events::*;
pub use proposal::*;
pub use repositories::*;
pub use value_objects::*;

pub use fairshare_errors::{BindingConstraint, FairshareError, FairshareResult};
