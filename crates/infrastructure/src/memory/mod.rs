pub mod audit_repository;
pub mod baseline_repository;
pub mod proposal_repository;
pub mod roster_repository;

pub use audit_repository::InMemoryAuditRepository;
pub use baseline_repository::InMemoryBaselineRepository;
pub use proposal_repository::InMemoryProposalRepository;
pub use roster_repository::InMemoryRosterRepository;
