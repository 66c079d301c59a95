//! # Freightbot Reports
//! Renders order and summary reports as structured plain-text documents.
//! The byte output goes straight into a chat document upload.

use chrono::{DateTime, Utc};

use freightbot_core::error::Result;
use freightbot_core::traits::ReportRenderer;
use freightbot_core::types::{Container, EventKind, Order, Statistics};

const RULE: &str = "──────────────────────────────────────────────";

/// Plain-text report renderer.
#[derive(Default)]
pub struct TextReportRenderer;

impl TextReportRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl ReportRenderer for TextReportRenderer {
    fn render_order_report(&self, order: &Order, containers: &[Container]) -> Result<Vec<u8>> {
        let mut out = String::new();
        out.push_str(&format!("ORDER REPORT — {}\n{RULE}\n", order.order_number));
        out.push_str(&format!("Client:      {}\n", order.client_name));
        out.push_str(&format!(
            "Route:       {}\n",
            order.route.as_deref().unwrap_or("-")
        ));
        out.push_str(&format!(
            "Goods:       {}\n",
            order.goods_type.as_deref().unwrap_or("-")
        ));
        out.push_str(&format!("Status:      {}\n", order.status.as_str()));
        out.push_str(&format!("Containers:  {}\n", order.container_count));
        out.push_str(&format!(
            "Loading photo: {}\n",
            if order.has_loading_photo { "yes" } else { "no" }
        ));

        out.push_str(&format!("\nSchedule\n{RULE}\n"));
        for kind in EventKind::ALL {
            out.push_str(&format!(
                "{:<26} {}\n",
                kind.label(),
                fmt_date(order.event_at(kind))
            ));
        }

        if !containers.is_empty() {
            out.push_str(&format!("\nContainers\n{RULE}\n"));
            for c in containers {
                out.push_str(&format!(
                    "{} ({})  {:.0} kg / {:.1} m³",
                    c.container_number,
                    c.container_type.as_deref().unwrap_or("-"),
                    c.weight_kg,
                    c.volume_m3
                ));
                if let Some(driver) = &c.driver_name {
                    out.push_str(&format!("  driver: {driver}"));
                }
                if let Some(truck) = &c.truck_number {
                    out.push_str(&format!("  truck: {truck}"));
                }
                out.push('\n');
            }
        }

        if let Some(notes) = &order.notes {
            out.push_str(&format!("\nNotes\n{RULE}\n{notes}\n"));
        }

        out.push_str(&format!(
            "\nGenerated {}\n",
            Utc::now().format("%d.%m.%Y %H:%M UTC")
        ));
        Ok(out.into_bytes())
    }

    fn render_summary_report(&self, stats: &Statistics) -> Result<Vec<u8>> {
        let mut out = String::new();
        out.push_str(&format!(
            "SUMMARY REPORT — last {} days\n{RULE}\n",
            stats.period_days
        ));
        out.push_str(&format!("Total orders:      {}\n", stats.total_orders));
        out.push_str(&format!("Completed:         {}\n", stats.completed_orders));
        out.push_str(&format!("Active:            {}\n", stats.active_orders));
        out.push_str(&format!("Containers:        {}\n", stats.total_containers));
        out.push_str(&format!("Total weight:      {:.0} kg\n", stats.total_weight_kg));
        out.push_str(&format!("Total volume:      {:.1} m³\n", stats.total_volume_m3));
        out.push_str(&format!(
            "\nGenerated {}\n",
            Utc::now().format("%d.%m.%Y %H:%M UTC")
        ));
        Ok(out.into_bytes())
    }
}

fn fmt_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%d.%m.%Y").to_string())
        .unwrap_or_else(|| "-".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use freightbot_core::types::OrderStatus;

    fn sample_order() -> Order {
        let now = Utc::now();
        Order {
            id: 1,
            order_number: "ORD-001".into(),
            client_name: "Acme Trading".into(),
            container_count: 2,
            goods_type: Some("Electronics".into()),
            route: Some("Shanghai - Ashgabat".into()),
            status: OrderStatus::SeaTransit,
            departure_at: Some(now),
            transit_arrival_at: None,
            truck_loading_at: None,
            destination_arrival_at: None,
            client_receipt_at: None,
            eta_at: None,
            has_loading_photo: true,
            notes: Some("Fragile cargo".into()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_order_report_contains_key_fields() {
        let renderer = TextReportRenderer::new();
        let bytes = renderer
            .render_order_report(
                &sample_order(),
                &[Container {
                    order_id: 1,
                    container_number: "CONT-1".into(),
                    container_type: Some("40HC".into()),
                    weight_kg: 11_500.0,
                    volume_m3: 60.2,
                    driver_name: Some("B. Orazov".into()),
                    driver_phone: None,
                    truck_number: Some("TR 1234".into()),
                }],
            )
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("ORD-001"));
        assert!(text.contains("Acme Trading"));
        assert!(text.contains("Sea Transit"));
        assert!(text.contains("CONT-1"));
        assert!(text.contains("B. Orazov"));
        assert!(text.contains("Fragile cargo"));
    }

    #[test]
    fn test_summary_report() {
        let renderer = TextReportRenderer::new();
        let bytes = renderer
            .render_summary_report(&Statistics {
                total_orders: 12,
                completed_orders: 4,
                active_orders: 8,
                total_containers: 30,
                total_weight_kg: 250_000.0,
                total_volume_m3: 1_500.5,
                period_days: 30,
            })
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("last 30 days"));
        assert!(text.contains("Total orders:      12"));
        assert!(text.contains("250000 kg"));
    }
}
