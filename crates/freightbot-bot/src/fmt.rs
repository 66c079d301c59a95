//! Reply formatting helpers.

use chrono::{DateTime, Utc};

use freightbot_channels::escape_markdown;
use freightbot_core::types::{Order, ShipmentEvent, Subscription};

pub fn fmt_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%d.%m.%Y").to_string())
        .unwrap_or_else(|| "-".into())
}

/// One numbered order block, as shown in list replies.
pub fn order_block(index: usize, order: &Order) -> String {
    let mut out = format!("{index}. *{}*\n", escape_markdown(&order.order_number));
    out.push_str(&format!("   👤 {}\n", escape_markdown(&order.client_name)));
    out.push_str(&format!("   📦 Containers: {}\n", order.container_count));
    if let Some(route) = &order.route {
        out.push_str(&format!("   📍 {}\n", escape_markdown(route)));
    }
    out.push_str(&format!(
        "   {} {}\n",
        order.status.emoji(),
        order.status.as_str()
    ));
    out
}

/// One line per upcoming event in the /today reply.
pub fn event_line(event: &ShipmentEvent) -> String {
    format!(
        "• *{}* — {} at {}\n",
        escape_markdown(&event.order_number),
        event.kind.label(),
        event.at.format("%H:%M")
    )
}

pub fn settings_block(sub: &Subscription) -> String {
    let onoff = |b: bool| if b { "on" } else { "off" };
    format!(
        "🔔 *Notification settings*\n\n\
         Subscription: {}\n\
         Events: {}\n\
         Reminders: {}\n\
         Alerts: {}\n\
         Reminder lead: {} h\n\n\
         Change with:\n\
         `/settings lead <hours>`\n\
         `/settings events on|off`\n\
         `/settings reminders on|off`\n\
         `/settings alerts on|off`",
        if sub.active { "active" } else { "paused" },
        onoff(sub.notify_events),
        onoff(sub.notify_reminders),
        onoff(sub.notify_alerts),
        sub.reminder_lead_hours,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use freightbot_core::types::OrderStatus;

    #[test]
    fn test_order_block_escapes_markdown() {
        let now = Utc::now();
        let order = Order {
            id: 1,
            order_number: "ORD_001".into(),
            client_name: "Acme *Trading*".into(),
            container_count: 3,
            goods_type: None,
            route: Some("Shanghai - Ashgabat".into()),
            status: OrderStatus::SeaTransit,
            departure_at: None,
            transit_arrival_at: None,
            truck_loading_at: None,
            destination_arrival_at: None,
            client_receipt_at: None,
            eta_at: None,
            has_loading_photo: false,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        let block = order_block(1, &order);
        assert!(block.contains("ORD\\_001"));
        assert!(block.contains("Acme \\*Trading\\*"));
        assert!(block.contains("Sea Transit"));
    }

    #[test]
    fn test_fmt_date() {
        assert_eq!(fmt_date(None), "-");
        let d = "2026-03-05T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(fmt_date(Some(d)), "05.03.2026");
    }
}
