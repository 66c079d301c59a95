//! Delivery Dispatcher — pushes due records to the messaging transport and
//! reports per-item outcome. One record's failure never blocks the rest of
//! the batch; a failed record simply stays unsent and re-surfaces on the
//! next tick.

use std::sync::Arc;

use freightbot_core::traits::MessageTransport;
use freightbot_core::types::NotificationRecord;

use crate::engine::NotificationEngine;

/// Per-item delivery result.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub record_id: i64,
    pub chat_id: i64,
    pub success: bool,
    pub error: Option<String>,
}

/// Sends a batch of due reminders, acknowledging each success back to the
/// engine immediately.
pub struct Dispatcher {
    transport: Arc<dyn MessageTransport>,
    engine: Arc<NotificationEngine>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn MessageTransport>, engine: Arc<NotificationEngine>) -> Self {
        Self { transport, engine }
    }

    /// Attempt delivery of each record independently. Never fails as a
    /// whole — the caller gets an outcome per item.
    pub async fn dispatch(&self, records: &[NotificationRecord]) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            match self.transport.send_message(record.chat_id, &record.body).await {
                Ok(()) => {
                    // Ack right away. If the ack itself fails the record
                    // stays unsent and is redelivered on a later tick —
                    // at-least-once, never silently dropped.
                    if let Err(e) = self.engine.mark_sent(record.id).await {
                        tracing::warn!(
                            record_id = record.id,
                            chat_id = record.chat_id,
                            "delivered but could not mark sent: {e}"
                        );
                    }
                    outcomes.push(DeliveryOutcome {
                        record_id: record.id,
                        chat_id: record.chat_id,
                        success: true,
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        record_id = record.id,
                        chat_id = record.chat_id,
                        order = %record.order_number,
                        "delivery failed: {e}"
                    );
                    outcomes.push(DeliveryOutcome {
                        record_id: record.id,
                        chat_id: record.chat_id,
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        outcomes
    }
}
