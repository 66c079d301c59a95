//! Telegram Bot channel — long polling + message sending via Bot API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use freightbot_core::config::TelegramConfig;
use freightbot_core::error::{FreightBotError, Result};
use freightbot_core::traits::MessageTransport;
use freightbot_core::types::IncomingMessage;

/// Telegram Bot channel. Shared between the command path (replies,
/// documents) and the reminder dispatcher (plain sends), so the update
/// cursor is atomic and every method takes `&self`.
pub struct TelegramChannel {
    config: TelegramConfig,
    client: reqwest::Client,
    last_update_id: AtomicI64,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            last_update_id: AtomicI64::new(0),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{}",
            self.config.bot_token, method
        )
    }

    /// Get updates using long polling.
    pub async fn get_updates(&self) -> Result<Vec<TelegramUpdate>> {
        let offset = self.last_update_id.load(Ordering::SeqCst) + 1;
        let response = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", "30".into()),
                ("allowed_updates", "[\"message\"]".into()),
            ])
            .send()
            .await
            .map_err(|e| FreightBotError::Transport(format!("getUpdates failed: {e}")))?;

        let body: TelegramApiResponse<Vec<TelegramUpdate>> = response
            .json()
            .await
            .map_err(|e| FreightBotError::Transport(format!("Invalid Telegram response: {e}")))?;

        if !body.ok {
            return Err(FreightBotError::Transport(format!(
                "Telegram API error: {}",
                body.description.unwrap_or_default()
            )));
        }

        let updates = body.result.unwrap_or_default();
        if let Some(last) = updates.last() {
            self.last_update_id.store(last.update_id, Ordering::SeqCst);
        }
        Ok(updates)
    }

    /// Send a plain text message.
    pub async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_payload(serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        }))
        .await
    }

    /// Send a Markdown-formatted message. Interpolated values should go
    /// through [`escape_markdown`] first.
    pub async fn send_markdown(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_payload(serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        }))
        .await
    }

    async fn send_payload(&self, body: serde_json::Value) -> Result<()> {
        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| FreightBotError::Transport(format!("sendMessage failed: {e}")))?;

        let result: TelegramApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| FreightBotError::Transport(format!("Invalid send response: {e}")))?;

        if !result.ok {
            return Err(FreightBotError::Transport(format!(
                "Send failed: {}",
                result.description.unwrap_or_default()
            )));
        }
        Ok(())
    }

    /// Send a file as a document attachment.
    pub async fn send_document(
        &self,
        chat_id: i64,
        filename: &str,
        bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<()> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }

        let response = self
            .client
            .post(self.api_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| FreightBotError::Transport(format!("sendDocument failed: {e}")))?;

        let result: TelegramApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| FreightBotError::Transport(format!("Invalid document response: {e}")))?;

        if !result.ok {
            return Err(FreightBotError::Transport(format!(
                "Document send failed: {}",
                result.description.unwrap_or_default()
            )));
        }
        Ok(())
    }

    /// Get bot info — doubles as the startup connectivity check.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| FreightBotError::Transport(format!("getMe failed: {e}")))?;
        let body: TelegramApiResponse<TelegramUser> = response
            .json()
            .await
            .map_err(|e| FreightBotError::Transport(format!("Invalid getMe response: {e}")))?;
        body.result
            .ok_or_else(|| FreightBotError::Transport("No bot info".into()))
    }

    /// Start the polling loop — returns a stream of incoming messages.
    /// Takes a clone of the shared channel so the command path can keep
    /// sending through its own handle.
    pub fn start_polling(self: Arc<Self>) -> TelegramPollingStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let channel = self;

        tokio::spawn(async move {
            tracing::info!("Telegram polling loop started");
            loop {
                match channel.get_updates().await {
                    Ok(updates) => {
                        for update in updates {
                            if let Some(msg) = update.to_incoming()
                                && tx.send(msg).is_err()
                            {
                                tracing::info!("Telegram polling stopped (receiver dropped)");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("Telegram polling error: {e}");
                        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
                    }
                }

                tokio::time::sleep(tokio::time::Duration::from_secs(
                    channel.config.poll_interval_secs,
                ))
                .await;
            }
        });

        TelegramPollingStream { rx }
    }
}

/// Stream of incoming Telegram messages from polling.
pub struct TelegramPollingStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<IncomingMessage>,
}

impl Stream for TelegramPollingStream {
    type Item = IncomingMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Unpin for TelegramPollingStream {}

#[async_trait]
impl MessageTransport for TelegramChannel {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_text(chat_id, text).await
    }
}

/// Escape Telegram MarkdownV1 special characters in interpolated values.
pub fn escape_markdown(s: &str) -> String {
    s.replace('_', "\\_")
        .replace('*', "\\*")
        .replace('[', "\\[")
        .replace('`', "\\`")
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
    pub date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
    pub title: Option<String>,
}

impl TelegramUpdate {
    /// Convert to an [`IncomingMessage`]. Bot messages and non-text
    /// updates are dropped.
    pub fn to_incoming(&self) -> Option<IncomingMessage> {
        let msg = self.message.as_ref()?;
        let text = msg.text.as_ref()?;
        let from = msg.from.as_ref()?;

        if from.is_bot {
            return None;
        }

        Some(IncomingMessage {
            chat_id: msg.chat.id,
            sender: Some(format!(
                "{}{}",
                from.first_name,
                from.last_name
                    .as_deref()
                    .map(|l| format!(" {l}"))
                    .unwrap_or_default()
            )),
            text: text.clone(),
            at: DateTime::from_timestamp(msg.date, 0).unwrap_or_else(Utc::now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(text: Option<&str>, is_bot: bool) -> TelegramUpdate {
        TelegramUpdate {
            update_id: 10,
            message: Some(TelegramMessage {
                message_id: 1,
                from: Some(TelegramUser {
                    id: 99,
                    is_bot,
                    first_name: "Lena".into(),
                    last_name: Some("K".into()),
                    username: None,
                }),
                chat: TelegramChat {
                    id: 42,
                    chat_type: "private".into(),
                    title: None,
                },
                text: text.map(String::from),
                date: 1_700_000_000,
            }),
        }
    }

    #[test]
    fn test_update_to_incoming() {
        let msg = update(Some("/active"), false).to_incoming().unwrap();
        assert_eq!(msg.chat_id, 42);
        assert_eq!(msg.text, "/active");
        assert_eq!(msg.sender.as_deref(), Some("Lena K"));
    }

    #[test]
    fn test_bot_and_textless_updates_are_dropped() {
        assert!(update(Some("hi"), true).to_incoming().is_none());
        assert!(update(None, false).to_incoming().is_none());
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("ORD_001 *now*"), "ORD\\_001 \\*now\\*");
    }

    #[test]
    fn test_api_response_decoding() {
        let raw = r#"{"ok":true,"result":[{"update_id":5,"message":{"message_id":7,
            "from":{"id":1,"is_bot":false,"first_name":"A"},
            "chat":{"id":42,"type":"private"},"text":"/start","date":1700000000}}]}"#;
        let parsed: TelegramApiResponse<Vec<TelegramUpdate>> = serde_json::from_str(raw).unwrap();
        assert!(parsed.ok);
        assert_eq!(parsed.result.unwrap()[0].update_id, 5);
    }
}
