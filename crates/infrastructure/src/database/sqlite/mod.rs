pub mod sqlite_audit_repository;

pub use sqlite_audit_repository::SqliteAuditRepository;
