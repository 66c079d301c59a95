//! In-memory store. Backs the engine and dispatcher tests, and serves as
//! the degraded-mode fallback when the sqlite database cannot be opened —
//! the bot still answers commands against whatever the sync job brings in.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};

use freightbot_core::error::{FreightBotError, Result};
use freightbot_core::traits::{
    EventStore, NotificationLog, OrderDirectory, SubscriptionRegistry,
};
use freightbot_core::types::{
    Container, EventKind, NewNotification, NotificationRecord, NotifyCategory, Order, OrderStatus,
    ShipmentEvent, Statistics, Subscription,
};

#[derive(Default)]
struct Inner {
    orders: Vec<Order>,
    containers: Vec<Container>,
    subscriptions: Vec<Subscription>,
    notifications: Vec<NotificationRecord>,
    next_order_id: i64,
    next_notification_id: i64,
}

/// In-memory implementation of every storage trait.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| FreightBotError::StoreUnavailable(e.to_string()))
    }

    /// Test/seeding helper: insert an order without going through upsert.
    pub fn seed_order(&self, order: Order) {
        let mut inner = self.inner.lock().expect("mem store lock");
        inner.next_order_id += 1;
        let mut order = order;
        order.id = inner.next_order_id;
        inner.orders.push(order);
    }

    /// Test/seeding helper: register a subscription as-is.
    pub fn seed_subscription(&self, sub: Subscription) {
        let mut inner = self.inner.lock().expect("mem store lock");
        inner.subscriptions.retain(|s| s.chat_id != sub.chat_id);
        inner.subscriptions.push(sub);
    }

    /// All notification records, sent or not. Test helper.
    pub fn notification_records(&self) -> Vec<NotificationRecord> {
        self.inner.lock().expect("mem store lock").notifications.clone()
    }
}

#[async_trait]
impl EventStore for MemStore {
    async fn events_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ShipmentEvent>> {
        let inner = self.lock()?;
        let mut events: Vec<ShipmentEvent> = inner
            .orders
            .iter()
            .flat_map(|order| {
                EventKind::ALL.iter().filter_map(move |kind| {
                    let at = order.event_at(*kind)?;
                    (at >= start && at <= end).then(|| ShipmentEvent {
                        order_number: order.order_number.clone(),
                        kind: *kind,
                        at,
                    })
                })
            })
            .collect();
        events.sort_by(|a, b| a.at.cmp(&b.at).then(a.order_number.cmp(&b.order_number)));
        Ok(events)
    }
}

#[async_trait]
impl SubscriptionRegistry for MemStore {
    async fn active_subscriptions(&self, category: NotifyCategory) -> Result<Vec<Subscription>> {
        let inner = self.lock()?;
        let mut subs: Vec<Subscription> = inner
            .subscriptions
            .iter()
            .filter(|s| s.active && s.wants(category))
            .cloned()
            .collect();
        subs.sort_by_key(|s| s.chat_id);
        Ok(subs)
    }

    async fn get(&self, chat_id: i64) -> Result<Option<Subscription>> {
        let inner = self.lock()?;
        Ok(inner
            .subscriptions
            .iter()
            .find(|s| s.chat_id == chat_id)
            .cloned())
    }

    async fn upsert(&self, sub: &Subscription) -> Result<()> {
        let mut inner = self.lock()?;
        if let Some(existing) = inner
            .subscriptions
            .iter_mut()
            .find(|s| s.chat_id == sub.chat_id)
        {
            let created_at = existing.created_at;
            *existing = sub.clone();
            existing.created_at = created_at;
        } else {
            inner.subscriptions.push(sub.clone());
        }
        Ok(())
    }

    async fn deactivate(&self, chat_id: i64) -> Result<()> {
        let mut inner = self.lock()?;
        if let Some(sub) = inner
            .subscriptions
            .iter_mut()
            .find(|s| s.chat_id == chat_id)
        {
            sub.active = false;
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationLog for MemStore {
    async fn find(
        &self,
        chat_id: i64,
        order_number: &str,
        kind: EventKind,
    ) -> Result<Option<NotificationRecord>> {
        let inner = self.lock()?;
        Ok(inner
            .notifications
            .iter()
            .find(|n| n.chat_id == chat_id && n.order_number == order_number && n.kind == kind)
            .cloned())
    }

    async fn insert(&self, new: NewNotification) -> Result<NotificationRecord> {
        let mut inner = self.lock()?;
        let duplicate = inner.notifications.iter().any(|n| {
            n.chat_id == new.chat_id && n.order_number == new.order_number && n.kind == new.kind
        });
        if duplicate {
            return Err(FreightBotError::StoreUnavailable(
                "duplicate notification tuple".into(),
            ));
        }
        inner.next_notification_id += 1;
        let record = NotificationRecord {
            id: inner.next_notification_id,
            chat_id: new.chat_id,
            order_number: new.order_number,
            kind: new.kind,
            event_at: new.event_at,
            body: new.body,
            created_at: Utc::now(),
            sent: false,
            sent_at: None,
        };
        inner.notifications.push(record.clone());
        Ok(record)
    }

    async fn mark_sent(&self, id: i64) -> Result<()> {
        let mut inner = self.lock()?;
        if let Some(rec) = inner.notifications.iter_mut().find(|n| n.id == id)
            && !rec.sent
        {
            rec.sent = true;
            rec.sent_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn unsent(&self) -> Result<Vec<NotificationRecord>> {
        let inner = self.lock()?;
        let mut pending: Vec<NotificationRecord> = inner
            .notifications
            .iter()
            .filter(|n| !n.sent)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            a.event_at
                .cmp(&b.event_at)
                .then(a.order_number.cmp(&b.order_number))
                .then(a.chat_id.cmp(&b.chat_id))
        });
        Ok(pending)
    }
}

#[async_trait]
impl OrderDirectory for MemStore {
    async fn all_orders(&self) -> Result<Vec<Order>> {
        let inner = self.lock()?;
        let mut orders = inner.orders.clone();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn order_by_number(&self, number: &str) -> Result<Option<Order>> {
        let inner = self.lock()?;
        Ok(inner
            .orders
            .iter()
            .find(|o| o.order_number == number)
            .cloned())
    }

    async fn orders_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        let inner = self.lock()?;
        let mut orders: Vec<Order> = inner
            .orders
            .iter()
            .filter(|o| o.status == status)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn active_orders(&self) -> Result<Vec<Order>> {
        let inner = self.lock()?;
        let mut orders: Vec<Order> = inner
            .orders
            .iter()
            .filter(|o| o.status.is_active())
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn search_orders(&self, text: &str) -> Result<Vec<Order>> {
        let needle = text.to_lowercase();
        let matches = |field: Option<&str>| {
            field
                .map(|f| f.to_lowercase().contains(&needle))
                .unwrap_or(false)
        };
        let inner = self.lock()?;
        let mut orders: Vec<Order> = inner
            .orders
            .iter()
            .filter(|o| {
                matches(Some(&o.order_number))
                    || matches(Some(&o.client_name))
                    || matches(o.goods_type.as_deref())
                    || matches(o.route.as_deref())
            })
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders.truncate(20);
        Ok(orders)
    }

    async fn containers_for(&self, order_id: i64) -> Result<Vec<Container>> {
        let inner = self.lock()?;
        Ok(inner
            .containers
            .iter()
            .filter(|c| c.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn statistics(&self, days: i64) -> Result<Statistics> {
        let inner = self.lock()?;
        Ok(Statistics {
            total_orders: inner.orders.len() as i64,
            completed_orders: inner
                .orders
                .iter()
                .filter(|o| o.status == OrderStatus::Completed)
                .count() as i64,
            active_orders: inner.orders.iter().filter(|o| o.status.is_active()).count() as i64,
            total_containers: inner.containers.len() as i64,
            total_weight_kg: inner.containers.iter().map(|c| c.weight_kg).sum(),
            total_volume_m3: inner.containers.iter().map(|c| c.volume_m3).sum(),
            period_days: days,
        })
    }

    async fn order_count(&self) -> Result<i64> {
        Ok(self.lock()?.orders.len() as i64)
    }

    async fn upsert_order(&self, order: &Order) -> Result<i64> {
        let mut inner = self.lock()?;
        if let Some(existing) = inner
            .orders
            .iter_mut()
            .find(|o| o.order_number == order.order_number)
        {
            let id = existing.id;
            let created_at = existing.created_at;
            *existing = order.clone();
            existing.id = id;
            existing.created_at = created_at;
            Ok(id)
        } else {
            inner.next_order_id += 1;
            let mut order = order.clone();
            order.id = inner.next_order_id;
            let id = order.id;
            inner.orders.push(order);
            Ok(id)
        }
    }

    async fn replace_containers(&self, order_id: i64, containers: &[Container]) -> Result<()> {
        let mut inner = self.lock()?;
        inner.containers.retain(|c| c.order_id != order_id);
        inner.containers.extend_from_slice(containers);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn order(number: &str, truck_loading: Option<DateTime<Utc>>) -> Order {
        let now = Utc::now();
        Order {
            id: 0,
            order_number: number.into(),
            client_name: "Test Client".into(),
            container_count: 1,
            goods_type: None,
            route: None,
            status: OrderStatus::New,
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

    #[tokio::test]
    async fn test_events_sorted_by_date_then_order() {
        let store = MemStore::new();
        let now = Utc::now();
        store.seed_order(order("B", Some(now + Duration::hours(20))));
        store.seed_order(order("A", Some(now + Duration::hours(4))));

        let events = store
            .events_in_window(now, now + Duration::hours(24))
            .await
            .unwrap();
        let numbers: Vec<_> = events.iter().map(|e| e.order_number.as_str()).collect();
        assert_eq!(numbers, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_notification_dedup_and_mark() {
        let store = MemStore::new();
        let new = NewNotification {
            chat_id: 5,
            order_number: "A".into(),
            kind: EventKind::TruckLoading,
            event_at: Utc::now(),
            body: "hi".into(),
        };
        let rec = store.insert(new.clone()).await.unwrap();
        assert!(store.insert(new).await.is_err());

        store.mark_sent(rec.id).await.unwrap();
        store.mark_sent(rec.id).await.unwrap();
        assert!(store.unsent().await.unwrap().is_empty());
    }
}
