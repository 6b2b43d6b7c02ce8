//! 公平分配引擎
//!
//! 公平性指标、约束评估、求解器、批量优化调度、换班市场与审计。

pub mod audit_trail;
pub mod availability;
pub mod baseline;
pub mod compatibility;
pub mod constraints;
pub mod context;
pub mod cron_utils;
pub mod fairness;
pub mod marketplace;
pub mod scheduler;
pub mod service;
pub mod solver;
pub mod strategies;
pub mod sweeper;

pub use audit_trail::AuditTrail;
pub use availability::{AvailabilityListener, AvailabilityOutcome};
pub use baseline::{BaselineLedger, CommitGuard};
pub use compatibility::{CompatibilityScorer, SwapHistory};
pub use constraints::{CandidateAssignment, ConstraintEvaluator, EvaluationScope};
pub use context::{EngineContext, Repositories};
pub use cron_utils::OptimizationSchedule;
pub use fairness::{gini, index_items, min_max_ratio, std_dev, variance, LoadModel};
pub use marketplace::{ProposeSwap, SwapMarketplace};
pub use scheduler::{OptimizationReport, OptimizationScheduler, OptimizationTrigger};
pub use service::FairnessEngine;
pub use solver::{AssignmentSolver, Problem, SolveOutcome, SolveRequest};
pub use strategies::{round_robin_baseline, SeedStrategy};
pub use sweeper::ExpirySweeper;
