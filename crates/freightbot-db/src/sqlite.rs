//! SQLite storage backend. Tables are created at open; the connection sits
//! behind a `Mutex` and every query maps its failure to `StoreUnavailable`
//! so callers can tell a transient store outage from everything else.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use freightbot_core::error::{FreightBotError, Result};
use freightbot_core::traits::{
    EventStore, NotificationLog, OrderDirectory, SubscriptionRegistry,
};
use freightbot_core::types::{
    Container, EventKind, NewNotification, NotificationRecord, NotifyCategory, Order, OrderStatus,
    ShipmentEvent, Statistics, Subscription,
};

/// SQLite-backed store implementing every storage trait.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

const ORDER_COLUMNS: &str = "id, order_number, client_name, container_count, goods_type, route, \
     status, departure_at, transit_arrival_at, truck_loading_at, destination_arrival_at, \
     client_receipt_at, eta_at, has_loading_photo, notes, created_at, updated_at";

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(store_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        tracing::debug!("SQLite store ready at {}", path.display());
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_number TEXT NOT NULL UNIQUE,
                client_name TEXT NOT NULL,
                container_count INTEGER NOT NULL DEFAULT 0,
                goods_type TEXT,
                route TEXT,
                status TEXT NOT NULL DEFAULT 'New',
                departure_at TEXT,
                transit_arrival_at TEXT,
                truck_loading_at TEXT,
                destination_arrival_at TEXT,
                client_receipt_at TEXT,
                eta_at TEXT,
                has_loading_photo INTEGER NOT NULL DEFAULT 0,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS containers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id INTEGER NOT NULL REFERENCES orders(id),
                container_number TEXT NOT NULL,
                container_type TEXT,
                weight_kg REAL NOT NULL DEFAULT 0,
                volume_m3 REAL NOT NULL DEFAULT 0,
                driver_name TEXT,
                driver_phone TEXT,
                truck_number TEXT
            );

            CREATE TABLE IF NOT EXISTS subscriptions (
                chat_id INTEGER PRIMARY KEY,
                active INTEGER NOT NULL DEFAULT 1,
                notify_events INTEGER NOT NULL DEFAULT 1,
                notify_reminders INTEGER NOT NULL DEFAULT 1,
                notify_alerts INTEGER NOT NULL DEFAULT 0,
                reminder_lead_hours INTEGER NOT NULL DEFAULT 24,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL,
                order_number TEXT NOT NULL,
                kind TEXT NOT NULL,
                event_at TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                sent INTEGER NOT NULL DEFAULT 0,
                sent_at TEXT
            );

            -- The anti-duplication contract: one record per tuple, ever.
            CREATE UNIQUE INDEX IF NOT EXISTS notifications_tuple
                ON notifications(chat_id, order_number, kind);
         ",
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| FreightBotError::StoreUnavailable(e.to_string()))
    }

    fn orders_where(&self, clause: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Order>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders {clause}");
        let mut stmt = conn.prepare(&sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params, order_from_row)
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        Ok(rows)
    }
}

fn store_err(e: rusqlite::Error) -> FreightBotError {
    FreightBotError::StoreUnavailable(e.to_string())
}

/// Date column backing an event kind.
fn date_column(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Departure => "departure_at",
        EventKind::TransitArrival => "transit_arrival_at",
        EventKind::TruckLoading => "truck_loading_at",
        EventKind::DestinationArrival => "destination_arrival_at",
        EventKind::ClientReceipt => "client_receipt_at",
        EventKind::EstimatedArrival => "eta_at",
    }
}

fn notify_column(category: NotifyCategory) -> &'static str {
    match category {
        NotifyCategory::Events => "notify_events",
        NotifyCategory::Reminders => "notify_reminders",
        NotifyCategory::Alerts => "notify_alerts",
    }
}

fn dt(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn opt_dt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc))
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    let status: String = row.get(6)?;
    Ok(Order {
        id: row.get(0)?,
        order_number: row.get(1)?,
        client_name: row.get(2)?,
        container_count: row.get(3)?,
        goods_type: row.get(4)?,
        route: row.get(5)?,
        status: OrderStatus::parse(&status).unwrap_or(OrderStatus::New),
        departure_at: opt_dt(row.get(7)?),
        transit_arrival_at: opt_dt(row.get(8)?),
        truck_loading_at: opt_dt(row.get(9)?),
        destination_arrival_at: opt_dt(row.get(10)?),
        client_receipt_at: opt_dt(row.get(11)?),
        eta_at: opt_dt(row.get(12)?),
        has_loading_photo: row.get::<_, i64>(13)? != 0,
        notes: row.get(14)?,
        created_at: dt(row.get(15)?),
        updated_at: dt(row.get(16)?),
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationRecord> {
    let kind: String = row.get(3)?;
    Ok(NotificationRecord {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        order_number: row.get(2)?,
        kind: EventKind::parse(&kind).unwrap_or(EventKind::EstimatedArrival),
        event_at: dt(row.get(4)?),
        body: row.get(5)?,
        created_at: dt(row.get(6)?),
        sent: row.get::<_, i64>(7)? != 0,
        sent_at: opt_dt(row.get(8)?),
    })
}

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        chat_id: row.get(0)?,
        active: row.get::<_, i64>(1)? != 0,
        notify_events: row.get::<_, i64>(2)? != 0,
        notify_reminders: row.get::<_, i64>(3)? != 0,
        notify_alerts: row.get::<_, i64>(4)? != 0,
        reminder_lead_hours: row.get(5)?,
        created_at: dt(row.get(6)?),
    })
}

const SUBSCRIPTION_COLUMNS: &str = "chat_id, active, notify_events, notify_reminders, \
     notify_alerts, reminder_lead_hours, created_at";

const NOTIFICATION_COLUMNS: &str =
    "id, chat_id, order_number, kind, event_at, body, created_at, sent, sent_at";

#[async_trait]
impl EventStore for SqliteStore {
    async fn events_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ShipmentEvent>> {
        // One UNION arm per lifecycle date column; BETWEEN is inclusive at
        // both ends, matching the lead-window contract.
        let arms: Vec<String> = EventKind::ALL
            .iter()
            .map(|k| {
                let col = date_column(*k);
                format!(
                    "SELECT order_number, '{}' AS kind, {col} AS event_at FROM orders \
                     WHERE {col} IS NOT NULL AND {col} BETWEEN ?1 AND ?2",
                    k.as_str()
                )
            })
            .collect();
        let sql = format!(
            "{} ORDER BY event_at, order_number",
            arms.join(" UNION ALL ")
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql).map_err(store_err)?;
        let rows = stmt
            .query_map(
                rusqlite::params![start.to_rfc3339(), end.to_rfc3339()],
                |row| {
                    let kind: String = row.get(1)?;
                    Ok(ShipmentEvent {
                        order_number: row.get(0)?,
                        kind: EventKind::parse(&kind).unwrap_or(EventKind::EstimatedArrival),
                        at: dt(row.get(2)?),
                    })
                },
            )
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        Ok(rows)
    }
}

#[async_trait]
impl SubscriptionRegistry for SqliteStore {
    async fn active_subscriptions(&self, category: NotifyCategory) -> Result<Vec<Subscription>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions \
             WHERE active = 1 AND {} = 1 ORDER BY chat_id",
            notify_column(category)
        );
        let mut stmt = conn.prepare(&sql).map_err(store_err)?;
        let rows = stmt
            .query_map([], subscription_from_row)
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    async fn get(&self, chat_id: i64) -> Result<Option<Subscription>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE chat_id = ?1"),
            [chat_id],
            subscription_from_row,
        )
        .optional()
        .map_err(store_err)
    }

    async fn upsert(&self, sub: &Subscription) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO subscriptions \
                 (chat_id, active, notify_events, notify_reminders, notify_alerts, \
                  reminder_lead_hours, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT(chat_id) DO UPDATE SET \
                    active = excluded.active, \
                    notify_events = excluded.notify_events, \
                    notify_reminders = excluded.notify_reminders, \
                    notify_alerts = excluded.notify_alerts, \
                    reminder_lead_hours = excluded.reminder_lead_hours",
                rusqlite::params![
                    sub.chat_id,
                    sub.active as i64,
                    sub.notify_events as i64,
                    sub.notify_reminders as i64,
                    sub.notify_alerts as i64,
                    sub.reminder_lead_hours,
                    sub.created_at.to_rfc3339(),
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }

    async fn deactivate(&self, chat_id: i64) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE subscriptions SET active = 0 WHERE chat_id = ?1",
                [chat_id],
            )
            .map_err(store_err)?;
        Ok(())
    }
}

#[async_trait]
impl NotificationLog for SqliteStore {
    async fn find(
        &self,
        chat_id: i64,
        order_number: &str,
        kind: EventKind,
    ) -> Result<Option<NotificationRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
                 WHERE chat_id = ?1 AND order_number = ?2 AND kind = ?3"
            ),
            rusqlite::params![chat_id, order_number, kind.as_str()],
            notification_from_row,
        )
        .optional()
        .map_err(store_err)
    }

    async fn insert(&self, new: NewNotification) -> Result<NotificationRecord> {
        let created_at = Utc::now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO notifications \
             (chat_id, order_number, kind, event_at, body, created_at, sent) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            rusqlite::params![
                new.chat_id,
                new.order_number,
                new.kind.as_str(),
                new.event_at.to_rfc3339(),
                new.body,
                created_at.to_rfc3339(),
            ],
        )
        .map_err(store_err)?;
        Ok(NotificationRecord {
            id: conn.last_insert_rowid(),
            chat_id: new.chat_id,
            order_number: new.order_number,
            kind: new.kind,
            event_at: new.event_at,
            body: new.body,
            created_at,
            sent: false,
            sent_at: None,
        })
    }

    async fn mark_sent(&self, id: i64) -> Result<()> {
        // `AND sent = 0` makes the second mark a no-op instead of moving
        // sent_at.
        self.conn()?
            .execute(
                "UPDATE notifications SET sent = 1, sent_at = ?2 WHERE id = ?1 AND sent = 0",
                rusqlite::params![id, Utc::now().to_rfc3339()],
            )
            .map_err(store_err)?;
        Ok(())
    }

    async fn unsent(&self) -> Result<Vec<NotificationRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
                 WHERE sent = 0 ORDER BY event_at, order_number, chat_id"
            ))
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], notification_from_row)
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        Ok(rows)
    }
}

#[async_trait]
impl OrderDirectory for SqliteStore {
    async fn all_orders(&self) -> Result<Vec<Order>> {
        self.orders_where("ORDER BY created_at DESC", &[])
    }

    async fn order_by_number(&self, number: &str) -> Result<Option<Order>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = ?1"),
            [number],
            order_from_row,
        )
        .optional()
        .map_err(store_err)
    }

    async fn orders_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        self.orders_where(
            "WHERE status = ?1 ORDER BY created_at DESC",
            &[&status.as_str()],
        )
    }

    async fn active_orders(&self) -> Result<Vec<Order>> {
        let list = OrderStatus::ACTIVE
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        self.orders_where(
            &format!("WHERE status IN ({list}) ORDER BY created_at DESC"),
            &[],
        )
    }

    async fn search_orders(&self, text: &str) -> Result<Vec<Order>> {
        let pattern = format!("%{text}%");
        self.orders_where(
            "WHERE order_number LIKE ?1 OR client_name LIKE ?1 \
                OR goods_type LIKE ?1 OR route LIKE ?1 \
             ORDER BY created_at DESC LIMIT 20",
            &[&pattern],
        )
    }

    async fn containers_for(&self, order_id: i64) -> Result<Vec<Container>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT order_id, container_number, container_type, weight_kg, volume_m3, \
                        driver_name, driver_phone, truck_number \
                 FROM containers WHERE order_id = ?1 ORDER BY container_number",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map([order_id], |row| {
                Ok(Container {
                    order_id: row.get(0)?,
                    container_number: row.get(1)?,
                    container_type: row.get(2)?,
                    weight_kg: row.get(3)?,
                    volume_m3: row.get(4)?,
                    driver_name: row.get(5)?,
                    driver_phone: row.get(6)?,
                    truck_number: row.get(7)?,
                })
            })
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    async fn statistics(&self, days: i64) -> Result<Statistics> {
        let conn = self.conn()?;
        let total_orders: i64 = conn
            .query_row("SELECT COUNT(*) FROM orders", [], |r| r.get(0))
            .map_err(store_err)?;
        let completed_orders: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM orders WHERE status = 'Completed'",
                [],
                |r| r.get(0),
            )
            .map_err(store_err)?;
        let list = OrderStatus::ACTIVE
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let active_orders: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM orders WHERE status IN ({list})"),
                [],
                |r| r.get(0),
            )
            .map_err(store_err)?;
        let (total_containers, total_weight_kg, total_volume_m3) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(weight_kg), 0), COALESCE(SUM(volume_m3), 0) \
                 FROM containers",
                [],
                |r| Ok((r.get::<_, i64>(0)?, r.get::<_, f64>(1)?, r.get::<_, f64>(2)?)),
            )
            .map_err(store_err)?;
        Ok(Statistics {
            total_orders,
            completed_orders,
            active_orders,
            total_containers,
            total_weight_kg,
            total_volume_m3,
            period_days: days,
        })
    }

    async fn order_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        conn.query_row("SELECT COUNT(*) FROM orders", [], |r| r.get(0))
            .map_err(store_err)
    }

    async fn upsert_order(&self, order: &Order) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO orders \
             (order_number, client_name, container_count, goods_type, route, status, \
              departure_at, transit_arrival_at, truck_loading_at, destination_arrival_at, \
              client_receipt_at, eta_at, has_loading_photo, notes, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16) \
             ON CONFLICT(order_number) DO UPDATE SET \
                client_name = excluded.client_name, \
                container_count = excluded.container_count, \
                goods_type = excluded.goods_type, \
                route = excluded.route, \
                status = excluded.status, \
                departure_at = excluded.departure_at, \
                transit_arrival_at = excluded.transit_arrival_at, \
                truck_loading_at = excluded.truck_loading_at, \
                destination_arrival_at = excluded.destination_arrival_at, \
                client_receipt_at = excluded.client_receipt_at, \
                eta_at = excluded.eta_at, \
                has_loading_photo = excluded.has_loading_photo, \
                notes = excluded.notes, \
                updated_at = excluded.updated_at",
            rusqlite::params![
                order.order_number,
                order.client_name,
                order.container_count,
                order.goods_type,
                order.route,
                order.status.as_str(),
                order.departure_at.map(|d| d.to_rfc3339()),
                order.transit_arrival_at.map(|d| d.to_rfc3339()),
                order.truck_loading_at.map(|d| d.to_rfc3339()),
                order.destination_arrival_at.map(|d| d.to_rfc3339()),
                order.client_receipt_at.map(|d| d.to_rfc3339()),
                order.eta_at.map(|d| d.to_rfc3339()),
                order.has_loading_photo as i64,
                order.notes,
                order.created_at.to_rfc3339(),
                order.updated_at.to_rfc3339(),
            ],
        )
        .map_err(store_err)?;
        conn.query_row(
            "SELECT id FROM orders WHERE order_number = ?1",
            [&order.order_number],
            |r| r.get(0),
        )
        .map_err(store_err)
    }

    async fn replace_containers(&self, order_id: i64, containers: &[Container]) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM containers WHERE order_id = ?1", [order_id])
            .map_err(store_err)?;
        for c in containers {
            conn.execute(
                "INSERT INTO containers \
                 (order_id, container_number, container_type, weight_kg, volume_m3, \
                  driver_name, driver_phone, truck_number) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    order_id,
                    c.container_number,
                    c.container_type,
                    c.weight_kg,
                    c.volume_m3,
                    c.driver_name,
                    c.driver_phone,
                    c.truck_number,
                ],
            )
            .map_err(store_err)?;
        }
        Ok(())
    }
}
