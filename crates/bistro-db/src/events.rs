//! # Domain Events
//!
//! Notifications published once the data they describe is committed.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  atomic(|tx| ...)                                                       │
//! │     │  repo write ──► handle.emit(event) ──► HookQueue (deferred)      │
//! │     ▼                                                                   │
//! │  COMMIT ──► hooks drained in order ──► EventBus::publish               │
//! │                                            │                            │
//! │                     ┌──────────────────────┼──────────────────────┐    │
//! │                     ▼                      ▼                      ▼    │
//! │               cache refresh          notifications           audit log │
//! │                                                                         │
//! │  Rollback ──► queue dropped, nothing published                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Outside a transaction a repository write auto-commits, so the event is
//! published right after the statement succeeds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use bistro_core::{ApprovalStatus, LedgerKind, TableStatus};

/// Default buffer of the event channel. Slow subscribers lag, they never
/// block a commit.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Something that happened to committed data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    MerchantCreated {
        merchant_id: i64,
        store_id: i64,
        admin_user_id: i64,
    },
    MerchantRenewed {
        merchant_id: i64,
        expire_at: DateTime<Utc>,
    },
    TableStatusChanged {
        table_id: i64,
        from: TableStatus,
        to: TableStatus,
        order_id: Option<i64>,
    },
    LedgerPosted {
        store_id: i64,
        transaction_id: i64,
        kind: LedgerKind,
        amount_cents: i64,
        after_cents: i64,
    },
    ApprovalStatusChanged {
        entity: String,
        id: i64,
        status: ApprovalStatus,
        approver_id: Option<i64>,
    },
}

/// Broadcast channel shared by every clone of a [`Database`](crate::Database).
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        EventBus { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    /// Publishes to current subscribers. Having none is not an error.
    pub fn publish(&self, event: DomainEvent) {
        match self.sender.send(event) {
            Ok(receivers) => trace!(receivers, "Domain event published"),
            Err(_) => trace!("Domain event dropped, no subscribers"),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::TableStatusChanged {
            table_id: 3,
            from: TableStatus::Idle,
            to: TableStatus::Occupied,
            order_id: Some(40),
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, DomainEvent::TableStatusChanged { table_id: 3, .. }));
    }

    #[test]
    fn test_publish_without_subscribers() {
        EventBus::new(0).publish(DomainEvent::MerchantRenewed {
            merchant_id: 1,
            expire_at: Utc::now(),
        });
    }

    #[test]
    fn test_event_json_is_tagged() {
        let json = serde_json::to_value(DomainEvent::LedgerPosted {
            store_id: 1,
            transaction_id: 9,
            kind: LedgerKind::Income,
            amount_cents: 100,
            after_cents: 100,
        })
        .unwrap();

        assert_eq!(json["type"], "ledger_posted");
        assert_eq!(json["kind"], "income");
    }
}
