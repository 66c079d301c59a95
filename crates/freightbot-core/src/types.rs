//! Domain types — orders, containers, lifecycle events, subscriptions,
//! and the notification records that make reminder delivery idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default reminder lead window applied to recipients who have not
/// customized their own.
pub const DEFAULT_LEAD_HOURS: i64 = 24;

/// Lifecycle stage of a shipment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    InProgress,
    SeaTransit,
    TransitHub,
    LandTransit,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Every status that still counts as an active shipment.
    pub const ACTIVE: [OrderStatus; 5] = [
        OrderStatus::New,
        OrderStatus::InProgress,
        OrderStatus::SeaTransit,
        OrderStatus::TransitHub,
        OrderStatus::LandTransit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "New",
            OrderStatus::InProgress => "In Progress",
            OrderStatus::SeaTransit => "Sea Transit",
            OrderStatus::TransitHub => "Transit Hub",
            OrderStatus::LandTransit => "Land Transit",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    /// Case-insensitive parse of the human-readable status name.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "new" => Some(OrderStatus::New),
            "in progress" => Some(OrderStatus::InProgress),
            "sea transit" => Some(OrderStatus::SeaTransit),
            "transit hub" => Some(OrderStatus::TransitHub),
            "land transit" => Some(OrderStatus::LandTransit),
            "completed" => Some(OrderStatus::Completed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            OrderStatus::New => "🆕",
            OrderStatus::InProgress => "🔄",
            OrderStatus::SeaTransit => "🚢",
            OrderStatus::TransitHub => "🏭",
            OrderStatus::LandTransit => "🚚",
            OrderStatus::Completed => "✅",
            OrderStatus::Cancelled => "❌",
        }
    }
}

/// A shipment order synced from the upstream order-management system.
/// The six optional date columns are the source of every [`ShipmentEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub client_name: String,
    pub container_count: i64,
    pub goods_type: Option<String>,
    pub route: Option<String>,
    pub status: OrderStatus,
    pub departure_at: Option<DateTime<Utc>>,
    pub transit_arrival_at: Option<DateTime<Utc>>,
    pub truck_loading_at: Option<DateTime<Utc>>,
    pub destination_arrival_at: Option<DateTime<Utc>>,
    pub client_receipt_at: Option<DateTime<Utc>>,
    pub eta_at: Option<DateTime<Utc>>,
    pub has_loading_photo: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// The date column backing a given event kind.
    pub fn event_at(&self, kind: EventKind) -> Option<DateTime<Utc>> {
        match kind {
            EventKind::Departure => self.departure_at,
            EventKind::TransitArrival => self.transit_arrival_at,
            EventKind::TruckLoading => self.truck_loading_at,
            EventKind::DestinationArrival => self.destination_arrival_at,
            EventKind::ClientReceipt => self.client_receipt_at,
            EventKind::EstimatedArrival => self.eta_at,
        }
    }
}

/// One container travelling under an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub order_id: i64,
    pub container_number: String,
    pub container_type: Option<String>,
    pub weight_kg: f64,
    pub volume_m3: f64,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
    pub truck_number: Option<String>,
}

/// Kind of lifecycle event — one per order date column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Departure,
    TransitArrival,
    TruckLoading,
    DestinationArrival,
    ClientReceipt,
    EstimatedArrival,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Departure,
        EventKind::TransitArrival,
        EventKind::TruckLoading,
        EventKind::DestinationArrival,
        EventKind::ClientReceipt,
        EventKind::EstimatedArrival,
    ];

    /// Stable key used for storage and dedup.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Departure => "departure",
            EventKind::TransitArrival => "transit_arrival",
            EventKind::TruckLoading => "truck_loading",
            EventKind::DestinationArrival => "destination_arrival",
            EventKind::ClientReceipt => "client_receipt",
            EventKind::EstimatedArrival => "estimated_arrival",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "departure" => Some(EventKind::Departure),
            "transit_arrival" => Some(EventKind::TransitArrival),
            "truck_loading" => Some(EventKind::TruckLoading),
            "destination_arrival" => Some(EventKind::DestinationArrival),
            "client_receipt" => Some(EventKind::ClientReceipt),
            "estimated_arrival" => Some(EventKind::EstimatedArrival),
            _ => None,
        }
    }

    /// Human label for message bodies and reports.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Departure => "Departure",
            EventKind::TransitArrival => "Arrival at transit hub",
            EventKind::TruckLoading => "Truck loading",
            EventKind::DestinationArrival => "Arrival at destination",
            EventKind::ClientReceipt => "Client receipt",
            EventKind::EstimatedArrival => "Estimated arrival",
        }
    }
}

/// A timestamped lifecycle event, derived from an order's date columns.
/// Never stored — a read-only view produced by the event store.
#[derive(Debug, Clone, PartialEq)]
pub struct ShipmentEvent {
    pub order_number: String,
    pub kind: EventKind,
    pub at: DateTime<Utc>,
}

/// Notification category a subscription can opt into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyCategory {
    Events,
    Reminders,
    Alerts,
}

/// One chat's notification opt-in and preferences. Never deleted — only
/// deactivated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub chat_id: i64,
    pub active: bool,
    pub notify_events: bool,
    pub notify_reminders: bool,
    pub notify_alerts: bool,
    pub reminder_lead_hours: i64,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Fresh subscription with default preferences.
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            active: true,
            notify_events: true,
            notify_reminders: true,
            notify_alerts: false,
            reminder_lead_hours: DEFAULT_LEAD_HOURS,
            created_at: Utc::now(),
        }
    }

    pub fn wants(&self, category: NotifyCategory) -> bool {
        match category {
            NotifyCategory::Events => self.notify_events,
            NotifyCategory::Reminders => self.notify_reminders,
            NotifyCategory::Alerts => self.notify_alerts,
        }
    }
}

/// A pending-or-sent reminder. The durable idempotency guard: at most one
/// row per (chat_id, order_number, kind) tuple.
#[derive(Debug, Clone)]
pub struct NotificationRecord {
    pub id: i64,
    pub chat_id: i64,
    pub order_number: String,
    pub kind: EventKind,
    pub event_at: DateTime<Utc>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Fields of a record about to be persisted; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub chat_id: i64,
    pub order_number: String,
    pub kind: EventKind,
    pub event_at: DateTime<Utc>,
    pub body: String,
}

/// Aggregate numbers behind the summary report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub total_orders: i64,
    pub completed_orders: i64,
    pub active_orders: i64,
    pub total_containers: i64,
    pub total_weight_kg: f64,
    pub total_volume_m3: f64,
    pub period_days: i64,
}

/// A message received from a chat channel.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub sender: Option<String>,
    pub text: String,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for s in OrderStatus::ACTIVE {
            assert_eq!(OrderStatus::parse(s.as_str()), Some(s));
            assert!(s.is_active());
        }
        assert_eq!(OrderStatus::parse("completed"), Some(OrderStatus::Completed));
        assert!(!OrderStatus::Completed.is_active());
        assert_eq!(OrderStatus::parse("no such status"), None);
    }

    #[test]
    fn test_event_kind_roundtrip() {
        for k in EventKind::ALL {
            assert_eq!(EventKind::parse(k.as_str()), Some(k));
        }
        assert_eq!(EventKind::parse("arrival"), None);
    }

    #[test]
    fn test_subscription_defaults() {
        let sub = Subscription::new(42);
        assert!(sub.active);
        assert!(sub.wants(NotifyCategory::Reminders));
        assert!(!sub.wants(NotifyCategory::Alerts));
        assert_eq!(sub.reminder_lead_hours, DEFAULT_LEAD_HOURS);
    }
}
