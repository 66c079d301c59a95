//! Collaborator seams. The notification engine, the dispatcher, and the
//! command handlers talk to these traits only — concrete stores and
//! transports are injected at construction, so every one of them can be
//! replaced with a test double.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{
    Container, EventKind, NewNotification, NotificationRecord, NotifyCategory, Order, OrderStatus,
    ShipmentEvent, Statistics, Subscription,
};

/// Read-only query surface over persisted shipment records.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Lifecycle events whose date falls inside the inclusive window.
    /// Returns an empty vec (not an error) when nothing matches;
    /// `StoreUnavailable` when the store cannot be reached.
    async fn events_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ShipmentEvent>>;
}

/// Durable set of recipients and their notification preferences.
#[async_trait]
pub trait SubscriptionRegistry: Send + Sync {
    /// Active subscriptions opted into the given category.
    async fn active_subscriptions(&self, category: NotifyCategory) -> Result<Vec<Subscription>>;

    async fn get(&self, chat_id: i64) -> Result<Option<Subscription>>;

    /// Insert or update a single subscription row. Atomic per row.
    async fn upsert(&self, sub: &Subscription) -> Result<()>;

    /// Soft-disable; the row is kept.
    async fn deactivate(&self, chat_id: i64) -> Result<()>;
}

/// Persistence for notification records — the dedup ledger.
#[async_trait]
pub trait NotificationLog: Send + Sync {
    /// Look up the record for a (recipient, order, event kind) tuple,
    /// sent or pending.
    async fn find(
        &self,
        chat_id: i64,
        order_number: &str,
        kind: EventKind,
    ) -> Result<Option<NotificationRecord>>;

    /// Persist a new unsent record and return it with its assigned id.
    async fn insert(&self, new: NewNotification) -> Result<NotificationRecord>;

    /// Flip a record to sent. Idempotent: marking an already-sent record
    /// is a no-op, not an error.
    async fn mark_sent(&self, id: i64) -> Result<()>;

    /// All records still awaiting delivery.
    async fn unsent(&self) -> Result<Vec<NotificationRecord>>;
}

/// Outbound messaging transport. Failure carries the transport diagnostic.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// Order query surface backing the foreground chat commands.
#[async_trait]
pub trait OrderDirectory: Send + Sync {
    async fn all_orders(&self) -> Result<Vec<Order>>;
    async fn order_by_number(&self, number: &str) -> Result<Option<Order>>;
    async fn orders_by_status(&self, status: OrderStatus) -> Result<Vec<Order>>;
    async fn active_orders(&self) -> Result<Vec<Order>>;
    /// Case-insensitive match on order number, client, goods, or route.
    async fn search_orders(&self, text: &str) -> Result<Vec<Order>>;
    async fn containers_for(&self, order_id: i64) -> Result<Vec<Container>>;
    async fn statistics(&self, days: i64) -> Result<Statistics>;
    async fn order_count(&self) -> Result<i64>;

    /// Insert or update by order number; returns the order's row id.
    async fn upsert_order(&self, order: &Order) -> Result<i64>;
    async fn replace_containers(&self, order_id: i64, containers: &[Container]) -> Result<()>;
}

/// Report rendering. Synchronous and fallible; the byte format is up to
/// the implementation.
pub trait ReportRenderer: Send + Sync {
    fn render_order_report(&self, order: &Order, containers: &[Container]) -> Result<Vec<u8>>;
    fn render_summary_report(&self, stats: &Statistics) -> Result<Vec<u8>>;
}
