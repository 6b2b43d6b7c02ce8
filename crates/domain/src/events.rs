//! 领域事件
//!
//! 由外部子系统推送给引擎的事件

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::Availability;

/// 领域事件基础trait
pub trait DomainEvent: Send + Sync {
    fn event_id(&self) -> Uuid;
    fn event_type(&self) -> &str;
    fn occurred_at(&self) -> DateTime<Utc>;
    fn aggregate_id(&self) -> String;
}

/// 健康/疲劳子系统发出的可用状态变更
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityEvent {
    pub id: Uuid,
    pub worker_id: String,
    pub availability: Availability,
    #[serde(default)]
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

impl AvailabilityEvent {
    pub fn new<W: Into<String>, R: Into<String>>(
        worker_id: W,
        availability: Availability,
        reason: R,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            worker_id: worker_id.into(),
            availability,
            reason: reason.into(),
            occurred_at,
        }
    }

    pub fn suspended<W: Into<String>, R: Into<String>>(
        worker_id: W,
        reason: R,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::new(worker_id, Availability::Suspended, reason, occurred_at)
    }

    pub fn restored<W: Into<String>>(worker_id: W, occurred_at: DateTime<Utc>) -> Self {
        Self::new(worker_id, Availability::Available, "", occurred_at)
    }
}

impl DomainEvent for AvailabilityEvent {
    fn event_id(&self) -> Uuid {
        self.id
    }

    fn event_type(&self) -> &str {
        match self.availability {
            Availability::Available => "WorkerRestored",
            Availability::Suspended => "WorkerSuspended",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    fn aggregate_id(&self) -> String {
        self.worker_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_event_type() {
        let now = Utc::now();
        let event = AvailabilityEvent::suspended("d-1", "疲劳预警", now);
        assert_eq!(event.event_type(), "WorkerSuspended");
        assert_eq!(event.aggregate_id(), "d-1");
        assert_eq!(AvailabilityEvent::restored("d-1", now).event_type(), "WorkerRestored");
    }
}
