use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_location: bool,
    pub include_thread_id: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            include_location: true,
            include_thread_id: false,
        }
    }
}

pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_optimization_started(trigger: &str, item_count: usize, worker_count: usize) {
        info!(
            event = "optimization_started",
            optimization.trigger = trigger,
            optimization.items = item_count,
            optimization.workers = worker_count,
            "Optimization run started"
        );
    }

    pub fn log_baseline_published(
        version: u64,
        origin: &str,
        gini_before: f64,
        gini_after: f64,
        churn: usize,
        duration_ms: u64,
    ) {
        info!(
            event = "baseline_published",
            assignment.version = version,
            assignment.origin = origin,
            fairness.gini_before = gini_before,
            fairness.gini_after = gini_after,
            assignment.churn = churn,
            optimization.duration_ms = duration_ms,
            "New baseline assignment published"
        );
    }

    pub fn log_optimization_failed(trigger: &str, reason: &str, binding: &[String]) {
        error!(
            event = "optimization_failed",
            optimization.trigger = trigger,
            optimization.error = reason,
            optimization.binding = ?binding,
            "Optimization run failed, previous baseline kept"
        );
    }

    pub fn log_capacity_override(version: u64, violations: usize) {
        warn!(
            event = "capacity_override",
            assignment.version = version,
            constraint.violations = violations,
            "Baseline published with capacity bounds relaxed"
        );
    }

    pub fn log_swap_proposed(
        proposal_id: &str,
        from_worker: &str,
        to_worker: &str,
        item_count: usize,
        compatibility: f64,
        origin: &str,
    ) {
        info!(
            event = "swap_proposed",
            swap.id = proposal_id,
            swap.from_worker = from_worker,
            swap.to_worker = to_worker,
            swap.items = item_count,
            swap.compatibility = compatibility,
            swap.origin = origin,
            "Swap proposal created"
        );
    }

    pub fn log_swap_decision(
        proposal_id: &str,
        state: &str,
        actor: &str,
        reason: Option<&str>,
        baseline_version: Option<u64>,
    ) {
        match reason {
            None => info!(
                event = "swap_decided",
                swap.id = proposal_id,
                swap.state = state,
                swap.actor = actor,
                assignment.version = baseline_version,
                "Swap proposal resolved"
            ),
            Some(reason) => warn!(
                event = "swap_decided",
                swap.id = proposal_id,
                swap.state = state,
                swap.actor = actor,
                swap.reason = reason,
                assignment.version = baseline_version,
                "Swap proposal resolved"
            ),
        }
    }

    pub fn log_swap_conflict(proposal_id: &str, item_id: &str) {
        warn!(
            event = "swap_conflict",
            swap.id = proposal_id,
            swap.item = item_id,
            "Swap proposal conflicts with live baseline"
        );
    }

    pub fn log_proposal_expired(proposal_id: &str, expires_at: chrono::DateTime<chrono::Utc>) {
        info!(
            event = "proposal_expired",
            swap.id = proposal_id,
            swap.expires_at = %expires_at,
            "Swap proposal expired"
        );
    }

    pub fn log_availability_changed(worker_id: &str, availability: &str, rejected_proposals: usize) {
        info!(
            event = "availability_changed",
            worker.id = worker_id,
            worker.availability = availability,
            swap.rejected = rejected_proposals,
            "Worker availability changed"
        );
    }

    pub fn log_audit_append(sequence: u64, action: &str, subject: &str) {
        debug!(
            event = "audit_appended",
            audit.sequence = sequence,
            audit.action = action,
            audit.subject = subject,
            "Audit entry appended"
        );
    }
}
