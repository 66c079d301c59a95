//! Command handlers. Every reply is built by a small function that talks
//! to the storage traits, so the whole surface is testable without a live
//! Telegram connection. Failures never escape: the user gets an error
//! reply and the incident is logged.

use std::sync::Arc;

use chrono::{Duration, Utc};

use freightbot_channels::{escape_markdown, TelegramChannel};
use freightbot_core::config::CompanyConfig;
use freightbot_core::error::Result;
use freightbot_core::traits::{
    EventStore, NotificationLog, OrderDirectory, ReportRenderer, SubscriptionRegistry,
};
use freightbot_core::types::{IncomingMessage, NotifyCategory, OrderStatus, Subscription};

use crate::commands::{parse_command, Command};
use crate::fmt::{event_line, order_block, settings_block};

/// Everything a handler may need, wired once at startup.
pub struct BotContext {
    pub directory: Arc<dyn OrderDirectory>,
    pub events: Arc<dyn EventStore>,
    pub registry: Arc<dyn SubscriptionRegistry>,
    pub log: Arc<dyn NotificationLog>,
    pub channel: Arc<TelegramChannel>,
    pub renderer: Arc<dyn ReportRenderer>,
    pub company: CompanyConfig,
    /// "sqlite:<path>" or "memory (degraded)".
    pub store_label: String,
    pub sync_configured: bool,
}

/// Entry point for one incoming chat message.
pub async fn handle_message(ctx: &BotContext, msg: &IncomingMessage) {
    let Some(command) = parse_command(&msg.text) else {
        return;
    };
    tracing::debug!(chat_id = msg.chat_id, "command: {:?}", command);

    match dispatch_command(ctx, msg, &command).await {
        Ok(Some(reply)) => {
            if let Err(e) = ctx.channel.send_markdown(msg.chat_id, &reply).await {
                tracing::warn!(chat_id = msg.chat_id, "reply failed: {e}");
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(chat_id = msg.chat_id, "command {:?} failed: {e}", command);
            let _ = ctx
                .channel
                .send_text(
                    msg.chat_id,
                    "❌ Something went wrong. Try again or check /dbstatus.",
                )
                .await;
        }
    }
}

/// Returns the markdown reply, or `None` when the handler already sent
/// its own response (document uploads).
async fn dispatch_command(
    ctx: &BotContext,
    msg: &IncomingMessage,
    command: &Command,
) -> Result<Option<String>> {
    let reply = match command {
        Command::Start => start_reply(msg.sender.as_deref(), &ctx.company),
        Command::Help => help_reply(),
        Command::Active => active_reply(ctx.directory.as_ref()).await?,
        Command::Today => today_reply(ctx.events.as_ref()).await?,
        Command::Search(query) => search_reply(ctx.directory.as_ref(), query).await?,
        Command::Status(arg) => status_reply(ctx.directory.as_ref(), arg).await?,
        Command::Summary(days) => {
            summary_reply(ctx.directory.as_ref(), days.unwrap_or(30)).await?
        }
        Command::Report(number) => return report_command(ctx, msg.chat_id, number).await,
        Command::Contacts => contacts_reply(&ctx.company),
        Command::DbStatus => {
            dbstatus_reply(
                ctx.directory.as_ref(),
                ctx.log.as_ref(),
                &ctx.store_label,
                ctx.sync_configured,
            )
            .await?
        }
        Command::Subscribe => subscribe_reply(ctx.registry.as_ref(), msg.chat_id).await?,
        Command::Unsubscribe => unsubscribe_reply(ctx.registry.as_ref(), msg.chat_id).await?,
        Command::SettingsShow => settings_show_reply(ctx.registry.as_ref(), msg.chat_id).await?,
        Command::SettingsLead(hours) => {
            settings_lead_reply(ctx.registry.as_ref(), msg.chat_id, *hours).await?
        }
        Command::SettingsToggle(category, enabled) => {
            settings_toggle_reply(ctx.registry.as_ref(), msg.chat_id, *category, *enabled).await?
        }
        Command::Unknown(word) => format!(
            "🤔 Unknown command `{}`. See /help for the full list.",
            escape_markdown(word)
        ),
    };
    Ok(Some(reply))
}

fn start_reply(sender: Option<&str>, company: &CompanyConfig) -> String {
    format!(
        "👋 Hi, {}!\n\n\
         I'm the {} order bot.\n\n\
         📋 *Commands:*\n\
         /active — active orders\n\
         /today — today's shipment events\n\
         /search <text> — find orders\n\
         /status <status> — orders by status\n\
         /summary [days] — summary statistics\n\
         /report <order> — order report document\n\
         /subscribe — reminders for upcoming events\n\
         /settings — notification preferences\n\
         /contacts — company contacts\n\
         /help — all commands\n\n\
         💡 Example: `/search ORD-001`",
        escape_markdown(sender.unwrap_or("there")),
        escape_markdown(&company.name),
    )
}

fn help_reply() -> String {
    "📋 *Available commands:*\n\n\
     *Orders:*\n\
     /active — active orders\n\
     /today — today's shipment events\n\
     /search <text> — search by number, client, goods, or route\n\
     /status <status> — orders by status\n\n\
     *Reports:*\n\
     /summary [days] — summary statistics (default 30 days)\n\
     /report <order> — full order report as a document\n\n\
     *Notifications:*\n\
     /subscribe — reminders for upcoming events\n\
     /unsubscribe — stop reminders\n\
     /settings — show and change preferences\n\n\
     *Other:*\n\
     /contacts — company contacts\n\
     /dbstatus — system status"
        .into()
}

async fn active_reply(directory: &dyn OrderDirectory) -> Result<String> {
    let orders = directory.active_orders().await?;
    if orders.is_empty() {
        return Ok("📭 No active orders right now.".into());
    }
    let mut out = format!("📊 *Active orders* ({}):\n\n", orders.len());
    for (i, order) in orders.iter().take(10).enumerate() {
        out.push_str(&order_block(i + 1, order));
        out.push('\n');
    }
    if orders.len() > 10 {
        out.push_str(&format!("…and {} more. Use /search to narrow down.", orders.len() - 10));
    }
    Ok(out)
}

async fn today_reply(events: &dyn EventStore) -> Result<String> {
    let start = Utc::now()
        .date_naive()
        .and_time(chrono::NaiveTime::MIN)
        .and_utc();
    let end = start + Duration::days(1) - Duration::seconds(1);
    let events = events.events_in_window(start, end).await?;
    if events.is_empty() {
        return Ok("📭 No shipment events today.".into());
    }
    let mut out = format!("📅 *Events today* ({}):\n\n", events.len());
    for event in &events {
        out.push_str(&event_line(event));
    }
    Ok(out)
}

async fn search_reply(directory: &dyn OrderDirectory, query: &str) -> Result<String> {
    if query.is_empty() {
        return Ok("🔍 Usage: `/search <text>`\n\nExample: `/search ORD-001`".into());
    }
    let orders = directory.search_orders(query).await?;
    if orders.is_empty() {
        return Ok(format!(
            "🔍 Nothing found for '{}'.",
            escape_markdown(query)
        ));
    }
    let mut out = format!("🔍 *Search results* ({}):\n\n", orders.len());
    for (i, order) in orders.iter().take(5).enumerate() {
        out.push_str(&order_block(i + 1, order));
        out.push('\n');
    }
    Ok(out)
}

async fn status_reply(directory: &dyn OrderDirectory, arg: &str) -> Result<String> {
    let Some(status) = OrderStatus::parse(arg) else {
        let list = OrderStatus::ACTIVE
            .iter()
            .chain([OrderStatus::Completed, OrderStatus::Cancelled].iter())
            .map(|s| format!("`{}`", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        return Ok(format!("📝 Usage: `/status <status>`\n\nKnown statuses: {list}"));
    };
    let orders = directory.orders_by_status(status).await?;
    if orders.is_empty() {
        return Ok(format!("📭 No orders with status '{}'.", status.as_str()));
    }
    let mut out = format!(
        "{} *{}* ({}):\n\n",
        status.emoji(),
        status.as_str(),
        orders.len()
    );
    for (i, order) in orders.iter().take(10).enumerate() {
        out.push_str(&order_block(i + 1, order));
        out.push('\n');
    }
    Ok(out)
}

async fn summary_reply(directory: &dyn OrderDirectory, days: i64) -> Result<String> {
    let stats = directory.statistics(days).await?;
    Ok(format!(
        "📊 *Summary for the last {} days:*\n\n\
         📦 Total orders: {}\n\
         ✅ Completed: {}\n\
         🔄 Active: {}\n\
         🚛 Containers: {}\n\
         ⚖️ Weight: {:.0} kg\n\
         📏 Volume: {:.1} m³",
        stats.period_days,
        stats.total_orders,
        stats.completed_orders,
        stats.active_orders,
        stats.total_containers,
        stats.total_weight_kg,
        stats.total_volume_m3,
    ))
}

async fn report_command(
    ctx: &BotContext,
    chat_id: i64,
    number: &str,
) -> Result<Option<String>> {
    if number.is_empty() {
        return Ok(Some(
            "📄 Usage: `/report <order number>`\n\nExample: `/report ORD-001`".into(),
        ));
    }
    let Some(order) = ctx.directory.order_by_number(number).await? else {
        return Ok(Some(format!(
            "📭 Order '{}' not found.",
            escape_markdown(number)
        )));
    };
    let containers = ctx.directory.containers_for(order.id).await?;
    let bytes = ctx.renderer.render_order_report(&order, &containers)?;
    ctx.channel
        .send_document(
            chat_id,
            &format!("order-{}.txt", order.order_number),
            bytes,
            Some(&format!("Report for {}", order.order_number)),
        )
        .await?;
    Ok(None)
}

fn contacts_reply(company: &CompanyConfig) -> String {
    let line = |emoji: &str, label: &str, value: &str| {
        if value.is_empty() {
            String::new()
        } else {
            format!("{emoji} {label}: {}\n", escape_markdown(value))
        }
    };
    format!(
        "🏢 *{}*\n\n{}{}{}",
        escape_markdown(&company.name),
        line("📞", "Phone", &company.phone),
        line("📧", "Email", &company.email),
        line("📱", "Telegram", &company.telegram),
    )
}

async fn dbstatus_reply(
    directory: &dyn OrderDirectory,
    log: &dyn NotificationLog,
    store_label: &str,
    sync_configured: bool,
) -> Result<String> {
    let orders = directory.order_count().await?;
    let pending = log.unsent().await?.len();
    Ok(format!(
        "📊 *System status:*\n\n\
         ✅ Bot is running\n\
         🗄 Store: {}\n\
         📦 Orders: {}\n\
         ⏳ Pending reminders: {}\n\
         🔄 Sync: {}",
        escape_markdown(store_label),
        orders,
        pending,
        if sync_configured {
            "configured"
        } else {
            "not configured"
        },
    ))
}

async fn subscribe_reply(registry: &dyn SubscriptionRegistry, chat_id: i64) -> Result<String> {
    let sub = match registry.get(chat_id).await? {
        Some(mut existing) => {
            existing.active = true;
            existing
        }
        None => Subscription::new(chat_id),
    };
    registry.upsert(&sub).await?;
    Ok(format!(
        "🔔 Subscribed. You'll get reminders about shipment events up to {} h ahead.\n\n\
         Tune with /settings, stop with /unsubscribe.",
        sub.reminder_lead_hours
    ))
}

async fn unsubscribe_reply(registry: &dyn SubscriptionRegistry, chat_id: i64) -> Result<String> {
    registry.deactivate(chat_id).await?;
    Ok("🔕 Unsubscribed. Your preferences are kept; /subscribe brings them back.".into())
}

async fn settings_show_reply(
    registry: &dyn SubscriptionRegistry,
    chat_id: i64,
) -> Result<String> {
    match registry.get(chat_id).await? {
        Some(sub) => Ok(settings_block(&sub)),
        None => Ok("🔕 You're not subscribed yet. Start with /subscribe.".into()),
    }
}

async fn settings_lead_reply(
    registry: &dyn SubscriptionRegistry,
    chat_id: i64,
    hours: i64,
) -> Result<String> {
    let mut sub = registry
        .get(chat_id)
        .await?
        .unwrap_or_else(|| Subscription::new(chat_id));
    sub.reminder_lead_hours = hours;
    registry.upsert(&sub).await?;
    Ok(format!("⏱ Reminder lead set to {hours} h."))
}

async fn settings_toggle_reply(
    registry: &dyn SubscriptionRegistry,
    chat_id: i64,
    category: NotifyCategory,
    enabled: bool,
) -> Result<String> {
    let mut sub = registry
        .get(chat_id)
        .await?
        .unwrap_or_else(|| Subscription::new(chat_id));
    let name = match category {
        NotifyCategory::Events => {
            sub.notify_events = enabled;
            "Event notifications"
        }
        NotifyCategory::Reminders => {
            sub.notify_reminders = enabled;
            "Reminders"
        }
        NotifyCategory::Alerts => {
            sub.notify_alerts = enabled;
            "Alerts"
        }
    };
    registry.upsert(&sub).await?;
    Ok(format!(
        "{} {} turned {}.",
        if enabled { "🔔" } else { "🔕" },
        name,
        if enabled { "on" } else { "off" }
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use freightbot_core::types::Order;
    use freightbot_db::MemStore;

    fn order(number: &str, status: OrderStatus, departure: Option<DateTime<Utc>>) -> Order {
        let now = Utc::now();
        Order {
            id: 0,
            order_number: number.into(),
            client_name: "Acme Trading".into(),
            container_count: 2,
            goods_type: Some("Electronics".into()),
            route: Some("Shanghai - Ashgabat".into()),
            status,
            departure_at: departure,
            transit_arrival_at: None,
            truck_loading_at: None,
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
    async fn test_active_reply_lists_orders() {
        let store = MemStore::new();
        store.seed_order(order("ORD-001", OrderStatus::SeaTransit, None));
        store.seed_order(order("ORD-002", OrderStatus::Completed, None));

        let reply = active_reply(&store).await.unwrap();
        assert!(reply.contains("ORD-001"));
        assert!(!reply.contains("ORD-002"));

        let empty = MemStore::new();
        assert!(active_reply(&empty).await.unwrap().contains("No active"));
    }

    #[tokio::test]
    async fn test_today_reply_only_sees_todays_events() {
        let store = MemStore::new();
        store.seed_order(order(
            "ORD-TODAY",
            OrderStatus::SeaTransit,
            Some(Utc::now()),
        ));
        store.seed_order(order(
            "ORD-LATER",
            OrderStatus::SeaTransit,
            Some(Utc::now() + Duration::days(3)),
        ));

        let reply = today_reply(&store).await.unwrap();
        assert!(reply.contains("ORD-TODAY"));
        assert!(!reply.contains("ORD-LATER"));
    }

    #[tokio::test]
    async fn test_search_reply() {
        let store = MemStore::new();
        store.seed_order(order("ORD-001", OrderStatus::New, None));

        assert!(search_reply(&store, "").await.unwrap().contains("Usage"));
        assert!(search_reply(&store, "acme").await.unwrap().contains("ORD-001"));
        assert!(search_reply(&store, "zzz").await.unwrap().contains("Nothing found"));
    }

    #[tokio::test]
    async fn test_status_reply_rejects_unknown_status() {
        let store = MemStore::new();
        let reply = status_reply(&store, "Teleporting").await.unwrap();
        assert!(reply.contains("Known statuses"));
    }

    #[tokio::test]
    async fn test_summary_reply() {
        let store = MemStore::new();
        store.seed_order(order("ORD-001", OrderStatus::Completed, None));
        let reply = summary_reply(&store, 30).await.unwrap();
        assert!(reply.contains("last 30 days"));
        assert!(reply.contains("Completed: 1"));
    }

    #[tokio::test]
    async fn test_subscription_flow() {
        let store = MemStore::new();
        let reply = subscribe_reply(&store, 7).await.unwrap();
        assert!(reply.contains("Subscribed"));
        assert!(store.get(7).await.unwrap().unwrap().active);

        let reply = settings_lead_reply(&store, 7, 48).await.unwrap();
        assert!(reply.contains("48 h"));
        assert_eq!(store.get(7).await.unwrap().unwrap().reminder_lead_hours, 48);

        settings_toggle_reply(&store, 7, NotifyCategory::Reminders, false)
            .await
            .unwrap();
        assert!(!store.get(7).await.unwrap().unwrap().notify_reminders);

        unsubscribe_reply(&store, 7).await.unwrap();
        assert!(!store.get(7).await.unwrap().unwrap().active);

        // Resubscribe keeps the tuned preferences.
        subscribe_reply(&store, 7).await.unwrap();
        let sub = store.get(7).await.unwrap().unwrap();
        assert!(sub.active);
        assert_eq!(sub.reminder_lead_hours, 48);
    }

    #[tokio::test]
    async fn test_dbstatus_reply() {
        let store = MemStore::new();
        store.seed_order(order("ORD-001", OrderStatus::New, None));
        let reply = dbstatus_reply(&store, &store, "memory (degraded)", false)
            .await
            .unwrap();
        assert!(reply.contains("Orders: 1"));
        assert!(reply.contains("not configured"));
    }
}
