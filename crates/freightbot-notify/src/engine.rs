//! Notification Engine — turns "now" plus stored lifecycle timestamps into
//! a deduplicated list of messages that need sending, and records what has
//! been sent.
//!
//! Records are persisted *before* they are handed to the dispatcher, so a
//! crash between compute and dispatch leaves exactly one retryable record,
//! never a duplicate.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use freightbot_core::error::Result;
use freightbot_core::traits::{EventStore, NotificationLog, SubscriptionRegistry};
use freightbot_core::types::{
    NewNotification, NotificationRecord, NotifyCategory, ShipmentEvent, Subscription,
};

/// Computes due reminders and owns the sent/unsent ledger. Collaborators
/// are injected so tests can substitute doubles for any of them.
pub struct NotificationEngine {
    events: Arc<dyn EventStore>,
    subscriptions: Arc<dyn SubscriptionRegistry>,
    log: Arc<dyn NotificationLog>,
    default_lead_hours: i64,
}

impl NotificationEngine {
    pub fn new(
        events: Arc<dyn EventStore>,
        subscriptions: Arc<dyn SubscriptionRegistry>,
        log: Arc<dyn NotificationLog>,
        default_lead_hours: i64,
    ) -> Self {
        Self {
            events,
            subscriptions,
            log,
            default_lead_hours,
        }
    }

    /// The deduplicated due set for this tick: every reminder whose event
    /// falls inside a recipient's lead window and which has not already
    /// been sent. Unsent records from earlier ticks re-surface until they
    /// are marked sent.
    ///
    /// Ordering: `event_at` ascending, ties by `order_number`, then
    /// `chat_id`.
    pub async fn compute_due(&self, now: DateTime<Utc>) -> Result<Vec<NotificationRecord>> {
        let subs = self
            .subscriptions
            .active_subscriptions(NotifyCategory::Reminders)
            .await?;
        if subs.is_empty() {
            return Ok(Vec::new());
        }

        // One window query wide enough for the longest lead; each recipient
        // is then filtered down to their own window.
        let max_lead = subs
            .iter()
            .map(|s| self.effective_lead(s))
            .max()
            .unwrap_or(self.default_lead_hours);
        let events = self
            .events
            .events_in_window(now, now + Duration::hours(max_lead))
            .await?;

        let mut due = Vec::new();
        for sub in &subs {
            let horizon = now + Duration::hours(self.effective_lead(sub));
            for event in events.iter().filter(|e| e.at <= horizon) {
                match self
                    .log
                    .find(sub.chat_id, &event.order_number, event.kind)
                    .await?
                {
                    Some(record) if record.sent => {}
                    Some(record) => due.push(record),
                    None => {
                        let record = self
                            .log
                            .insert(NewNotification {
                                chat_id: sub.chat_id,
                                order_number: event.order_number.clone(),
                                kind: event.kind,
                                event_at: event.at,
                                body: reminder_body(event),
                            })
                            .await?;
                        due.push(record);
                    }
                }
            }
        }

        due.sort_by(|a, b| {
            a.event_at
                .cmp(&b.event_at)
                .then(a.order_number.cmp(&b.order_number))
                .then(a.chat_id.cmp(&b.chat_id))
        });
        Ok(due)
    }

    /// Acknowledge delivery. Idempotent; a failed mark leaves the record
    /// unsent and it will be redelivered on a later tick.
    pub async fn mark_sent(&self, record_id: i64) -> Result<()> {
        self.log.mark_sent(record_id).await
    }

    /// Pending records, for status reporting.
    pub async fn pending(&self) -> Result<Vec<NotificationRecord>> {
        self.log.unsent().await
    }

    /// The per-recipient lead from the subscription is authoritative; the
    /// engine default only covers rows that never stored a usable value.
    fn effective_lead(&self, sub: &Subscription) -> i64 {
        if sub.reminder_lead_hours > 0 {
            sub.reminder_lead_hours
        } else {
            self.default_lead_hours
        }
    }
}

fn reminder_body(event: &ShipmentEvent) -> String {
    format!(
        "⏰ Reminder: {} — order {} expected {} UTC",
        event.kind.label(),
        event.order_number,
        event.at.format("%d.%m.%Y %H:%M")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use freightbot_core::error::FreightBotError;
    use freightbot_core::types::{EventKind, Order, OrderStatus};
    use freightbot_db::MemStore;

    fn order(number: &str, truck_loading: Option<DateTime<Utc>>) -> Order {
        let now = Utc::now();
        Order {
            id: 0,
            order_number: number.into(),
            client_name: "Test Client".into(),
            container_count: 1,
            goods_type: None,
            route: None,
            status: OrderStatus::LandTransit,
            departure_at: None,
            transit_arrival_at: None,
            truck_loading_at: truck_loading,
            destination_arrival_at: None,
            client_receipt_at: None,
            eta_at: None,
            has_loading_photo: false,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn subscription(chat_id: i64, lead_hours: i64) -> Subscription {
        let mut sub = Subscription::new(chat_id);
        sub.reminder_lead_hours = lead_hours;
        sub
    }

    fn engine_over(store: &Arc<MemStore>) -> NotificationEngine {
        NotificationEngine::new(store.clone(), store.clone(), store.clone(), 24)
    }

    #[tokio::test]
    async fn test_same_now_never_duplicates() {
        let store = Arc::new(MemStore::new());
        let now = Utc::now();
        store.seed_order(order("ORD-001", Some(now + Duration::hours(6))));
        store.seed_subscription(subscription(1, 24));
        let engine = engine_over(&store);

        let first = engine.compute_due(now).await.unwrap();
        assert_eq!(first.len(), 1);
        let second = engine.compute_due(now).await.unwrap();
        assert_eq!(second.len(), 1);
        // Same record re-surfaced, not a second unsent row.
        assert_eq!(second[0].id, first[0].id);
        assert_eq!(store.notification_records().len(), 1);
    }

    #[tokio::test]
    async fn test_sent_records_are_skipped() {
        let store = Arc::new(MemStore::new());
        let now = Utc::now();
        store.seed_order(order("ORD-001", Some(now + Duration::hours(6))));
        store.seed_subscription(subscription(1, 24));
        let engine = engine_over(&store);

        let due = engine.compute_due(now).await.unwrap();
        engine.mark_sent(due[0].id).await.unwrap();

        assert!(engine.compute_due(now).await.unwrap().is_empty());
        assert_eq!(store.notification_records().len(), 1);
    }

    #[tokio::test]
    async fn test_window_boundaries() {
        let store = Arc::new(MemStore::new());
        let now = Utc::now();
        store.seed_order(order(
            "ORD-IN",
            Some(now + Duration::hours(24) - Duration::minutes(1)),
        ));
        store.seed_order(order(
            "ORD-OUT",
            Some(now + Duration::hours(24) + Duration::minutes(1)),
        ));
        store.seed_subscription(subscription(1, 24));
        let engine = engine_over(&store);

        let due = engine.compute_due(now).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].order_number, "ORD-IN");
    }

    #[tokio::test]
    async fn test_ordered_by_event_date_then_order_number() {
        let store = Arc::new(MemStore::new());
        let now = Utc::now();
        store.seed_order(order("B", Some(now + Duration::hours(20))));
        store.seed_order(order("A", Some(now + Duration::hours(4))));
        store.seed_subscription(subscription(1, 24));
        let engine = engine_over(&store);

        let due = engine.compute_due(now).await.unwrap();
        let numbers: Vec<_> = due.iter().map(|r| r.order_number.as_str()).collect();
        assert_eq!(numbers, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_per_recipient_lead_is_honored() {
        let store = Arc::new(MemStore::new());
        let now = Utc::now();
        store.seed_order(order("ORD-001", Some(now + Duration::hours(24))));
        store.seed_subscription(subscription(1, 6));
        store.seed_subscription(subscription(2, 48));
        let engine = engine_over(&store);

        let due = engine.compute_due(now).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].chat_id, 2);
    }

    #[tokio::test]
    async fn test_no_subscriptions_means_no_reads_or_writes() {
        // An events store that fails loudly proves the engine short-circuits
        // before touching it.
        struct Unreachable;
        #[async_trait]
        impl EventStore for Unreachable {
            async fn events_in_window(
                &self,
                _start: DateTime<Utc>,
                _end: DateTime<Utc>,
            ) -> Result<Vec<ShipmentEvent>> {
                panic!("event store must not be queried with zero subscriptions");
            }
        }

        let store = Arc::new(MemStore::new());
        let engine =
            NotificationEngine::new(Arc::new(Unreachable), store.clone(), store.clone(), 24);
        let due = engine.compute_due(Utc::now()).await.unwrap();
        assert!(due.is_empty());
        assert!(store.notification_records().is_empty());
    }

    #[tokio::test]
    async fn test_store_outage_surfaces_and_loses_nothing() {
        struct Down;
        #[async_trait]
        impl EventStore for Down {
            async fn events_in_window(
                &self,
                _start: DateTime<Utc>,
                _end: DateTime<Utc>,
            ) -> Result<Vec<ShipmentEvent>> {
                Err(FreightBotError::StoreUnavailable("connection refused".into()))
            }
        }

        let store = Arc::new(MemStore::new());
        store.seed_subscription(subscription(1, 24));
        // A pending record from an earlier tick.
        store
            .insert(NewNotification {
                chat_id: 1,
                order_number: "ORD-001".into(),
                kind: EventKind::TruckLoading,
                event_at: Utc::now() + Duration::hours(2),
                body: "pending".into(),
            })
            .await
            .unwrap();

        let engine = NotificationEngine::new(Arc::new(Down), store.clone(), store.clone(), 24);
        let err = engine.compute_due(Utc::now()).await.unwrap_err();
        assert!(matches!(err, FreightBotError::StoreUnavailable(_)));
        // The earlier pending record is still retryable.
        assert_eq!(store.unsent().await.unwrap().len(), 1);
    }
}
