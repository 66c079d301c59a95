//! # Freightbot Sync
//! Pulls orders from the upstream order-management system and writes them
//! into the local store. The exchange is deliberately small: one
//! bearer-authenticated POST, one JSON payload of orders.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use freightbot_core::config::SyncConfig;
use freightbot_core::error::{FreightBotError, Result};
use freightbot_core::traits::OrderDirectory;
use freightbot_core::types::{Container, Order, OrderStatus};

/// Client for the upstream system.
pub struct SyncClient {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl SyncClient {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            client: reqwest::Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty() && !self.api_key.is_empty()
    }

    /// Fetch the full order list from upstream.
    pub async fn fetch_orders(&self) -> Result<Vec<OrderImport>> {
        if !self.is_configured() {
            return Err(FreightBotError::Sync(
                "sync not configured: set sync.endpoint and sync.api_key".into(),
            ));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "action": "get_orders" }))
            .send()
            .await
            .map_err(|e| FreightBotError::Sync(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(FreightBotError::Sync(format!(
                "upstream returned {}",
                response.status()
            )));
        }

        let body: SyncResponse = response
            .json()
            .await
            .map_err(|e| FreightBotError::Sync(format!("invalid response: {e}")))?;
        Ok(body.orders)
    }
}

#[derive(Debug, Deserialize)]
struct SyncResponse {
    #[serde(default)]
    orders: Vec<OrderImport>,
}

/// One order as the upstream system serializes it.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderImport {
    pub order_number: String,
    pub client_name: String,
    #[serde(default)]
    pub container_count: i64,
    #[serde(default)]
    pub goods_type: Option<String>,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub departure_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transit_arrival_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub truck_loading_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub destination_arrival_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub client_receipt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub eta_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_loading_photo: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub containers: Vec<ContainerImport>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerImport {
    pub container_number: String,
    #[serde(default)]
    pub container_type: Option<String>,
    #[serde(default)]
    pub weight_kg: f64,
    #[serde(default)]
    pub volume_m3: f64,
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub driver_phone: Option<String>,
    #[serde(default)]
    pub truck_number: Option<String>,
}

impl OrderImport {
    /// Map onto the domain order plus its containers. Container rows get
    /// their order id after the upsert assigns one.
    pub fn into_order(self) -> (Order, Vec<Container>) {
        let now = Utc::now();
        let status = self
            .status
            .as_deref()
            .and_then(OrderStatus::parse)
            .unwrap_or(OrderStatus::New);
        let containers = self
            .containers
            .into_iter()
            .map(|c| Container {
                order_id: 0,
                container_number: c.container_number,
                container_type: c.container_type,
                weight_kg: c.weight_kg,
                volume_m3: c.volume_m3,
                driver_name: c.driver_name,
                driver_phone: c.driver_phone,
                truck_number: c.truck_number,
            })
            .collect();
        let order = Order {
            id: 0,
            order_number: self.order_number,
            client_name: self.client_name,
            container_count: self.container_count,
            goods_type: self.goods_type,
            route: self.route,
            status,
            departure_at: self.departure_at,
            transit_arrival_at: self.transit_arrival_at,
            truck_loading_at: self.truck_loading_at,
            destination_arrival_at: self.destination_arrival_at,
            client_receipt_at: self.client_receipt_at,
            eta_at: self.eta_at,
            has_loading_photo: self.has_loading_photo,
            notes: self.notes,
            created_at: now,
            updated_at: now,
        };
        (order, containers)
    }
}

/// Fetch from upstream and upsert into the store. Returns the number of
/// orders imported.
pub async fn import_orders(client: &SyncClient, directory: &dyn OrderDirectory) -> Result<usize> {
    let imports = client.fetch_orders().await?;
    let count = imports.len();
    for import in imports {
        let number = import.order_number.clone();
        let (order, mut containers) = import.into_order();
        let id = directory.upsert_order(&order).await?;
        if !containers.is_empty() {
            for c in &mut containers {
                c.order_id = id;
            }
            directory.replace_containers(id, &containers).await?;
        }
        tracing::debug!("synced order {number}");
    }
    tracing::info!("✅ Sync finished: {count} orders imported");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use freightbot_db::MemStore;

    const SAMPLE: &str = r#"{
        "orders": [{
            "order_number": "ORD-001",
            "client_name": "Acme Trading",
            "container_count": 2,
            "route": "Shanghai - Ashgabat",
            "status": "Sea Transit",
            "departure_at": "2026-08-01T08:00:00Z",
            "containers": [
                {"container_number": "CONT-1", "weight_kg": 11500.0, "volume_m3": 60.2}
            ]
        }]
    }"#;

    #[test]
    fn test_decode_upstream_payload() {
        let parsed: SyncResponse = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(parsed.orders.len(), 1);
        let (order, containers) = parsed.orders[0].clone().into_order();
        assert_eq!(order.order_number, "ORD-001");
        assert_eq!(order.status, OrderStatus::SeaTransit);
        assert!(order.departure_at.is_some());
        assert_eq!(containers.len(), 1);
    }

    #[test]
    fn test_unknown_status_falls_back_to_new() {
        let import = OrderImport {
            order_number: "ORD-002".into(),
            client_name: "X".into(),
            container_count: 0,
            goods_type: None,
            route: None,
            status: Some("Teleporting".into()),
            departure_at: None,
            transit_arrival_at: None,
            truck_loading_at: None,
            destination_arrival_at: None,
            client_receipt_at: None,
            eta_at: None,
            has_loading_photo: false,
            notes: None,
            containers: vec![],
        };
        let (order, _) = import.into_order();
        assert_eq!(order.status, OrderStatus::New);
    }

    #[tokio::test]
    async fn test_import_writes_orders_and_containers() {
        use freightbot_core::traits::OrderDirectory;

        let parsed: SyncResponse = serde_json::from_str(SAMPLE).unwrap();
        let store = MemStore::new();
        for import in parsed.orders {
            let (order, mut containers) = import.into_order();
            let id = store.upsert_order(&order).await.unwrap();
            for c in &mut containers {
                c.order_id = id;
            }
            store.replace_containers(id, &containers).await.unwrap();
        }
        let order = store.order_by_number("ORD-001").await.unwrap().unwrap();
        assert_eq!(store.containers_for(order.id).await.unwrap().len(), 1);
    }

    #[test]
    fn test_unconfigured_client() {
        let client = SyncClient::new(&SyncConfig::default());
        assert!(!client.is_configured());
    }
}
