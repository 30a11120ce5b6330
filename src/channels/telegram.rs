//! Telegram Bot API channel.
//!
//! Inbound events come from long-polling `getUpdates`; each update is
//! turned into an [`InboundEvent`] and pushed through an mpsc channel.
//! Request URLs embed the bot token, so every transport error is passed
//! through [`redact_sensitive_detail`] before it is surfaced.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::channels::{
    Button, Channel, ChatId, Document, EventStream, InboundEvent, MessageRef, TextFormat, UserId,
    parse_command,
};
use crate::config::TelegramConfig;
use crate::error::{ChannelError, redact_sensitive_detail};

const CHANNEL_NAME: &str = "telegram";
const ERROR_BACKOFF: Duration = Duration::from_secs(5);
/// Extra HTTP time on top of the long-poll timeout.
const REQUEST_GRACE: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    chat: Chat,
    #[serde(default)]
    from: Option<User>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: ChatId,
}

#[derive(Debug, Deserialize)]
struct User {
    id: UserId,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: User,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    data: Option<String>,
}

/// Turn one update into an event, if it is a text message or a button
/// press this bot understands.
fn update_to_event(update: Update) -> Option<InboundEvent> {
    if let Some(callback) = update.callback_query {
        let message = callback.message?;
        let data = callback.data?;
        return Some(InboundEvent::button(
            callback.from.id,
            MessageRef {
                chat_id: message.chat.id,
                message_id: message.message_id,
            },
            callback.id,
            data,
        ));
    }

    let message = update.message?;
    let user = message.from?.id;
    let text = message.text?;
    Some(match parse_command(&text) {
        Some(command) => InboundEvent::command(user, message.chat.id, command),
        None => InboundEvent::text(user, message.chat.id, text),
    })
}

fn inline_keyboard(buttons: &[Button]) -> Value {
    let rows: Vec<Value> = buttons
        .iter()
        .map(|b| json!([{ "text": b.label, "callback_data": b.data }]))
        .collect();
    json!({ "inline_keyboard": rows })
}

fn with_format(mut body: Value, format: TextFormat) -> Value {
    if format == TextFormat::Markdown {
        body["parse_mode"] = json!("Markdown");
    }
    body
}

/// Telegram channel over the Bot HTTP API.
pub struct TelegramChannel {
    http: reqwest::Client,
    api_base_url: String,
    token: SecretString,
    owner_id: Option<UserId>,
    poll_timeout: Duration,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Result<Self, ChannelError> {
        let token = config
            .require_token()
            .map_err(|e| ChannelError::StartupFailed {
                name: CHANNEL_NAME.to_string(),
                reason: e.to_string(),
            })?
            .clone();
        let http = reqwest::Client::builder()
            .timeout(config.poll_timeout + REQUEST_GRACE)
            .build()
            .map_err(|e| ChannelError::StartupFailed {
                name: CHANNEL_NAME.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token,
            owner_id: config.owner_id,
            poll_timeout: config.poll_timeout,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_base_url,
            self.token.expose_secret(),
            method
        )
    }

    fn is_allowed(&self, user: UserId) -> bool {
        self.owner_id.is_none_or(|owner| owner == user)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T, ChannelError> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(redact_sensitive_detail(&e.to_string())))?;
        Self::read_envelope(method, response).await
    }

    async fn read_envelope<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<T, ChannelError> {
        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| ChannelError::Http(redact_sensitive_detail(&e.to_string())))?;

        if !envelope.ok {
            let reason = format!(
                "{method}: {}",
                envelope.description.as_deref().unwrap_or("request rejected")
            );
            return Err(if envelope.error_code == Some(401) {
                ChannelError::AuthFailed {
                    name: CHANNEL_NAME.to_string(),
                    reason,
                }
            } else {
                ChannelError::SendFailed {
                    name: CHANNEL_NAME.to_string(),
                    reason,
                }
            });
        }

        envelope
            .result
            .ok_or_else(|| ChannelError::InvalidMessage(format!("{method}: response has no result")))
    }

    /// Fetch updates after `offset`, returning the next offset and the
    /// events that passed the owner filter.
    async fn poll_once(&self, offset: i64) -> Result<(i64, Vec<InboundEvent>), ChannelError> {
        let body = json!({
            "offset": offset,
            "timeout": self.poll_timeout.as_secs(),
            "allowed_updates": ["message", "callback_query"],
        });
        let updates: Vec<Update> = self.call("getUpdates", &body).await?;

        let mut next_offset = offset;
        let mut events = Vec::with_capacity(updates.len());
        for update in updates {
            next_offset = next_offset.max(update.update_id + 1);
            let Some(event) = update_to_event(update) else {
                continue;
            };
            if self.is_allowed(event.user_id) {
                events.push(event);
            } else {
                tracing::debug!(user = event.user_id, "Dropping update from non-owner");
            }
        }
        Ok((next_offset, events))
    }

    fn clone_for_polling(&self) -> Self {
        Self {
            http: self.http.clone(),
            api_base_url: self.api_base_url.clone(),
            token: self.token.clone(),
            owner_id: self.owner_id,
            poll_timeout: self.poll_timeout,
        }
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let me: Value = self.call("getMe", &json!({})).await?;
        let bot = me
            .get("username")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        tracing::info!(
            bot,
            owner_only = self.owner_id.is_some(),
            "Telegram channel connected"
        );

        let (tx, rx) = mpsc::channel(64);
        let poller = self.clone_for_polling();
        tokio::spawn(async move {
            let mut offset = 0;
            loop {
                match poller.poll_once(offset).await {
                    Ok((next_offset, events)) => {
                        offset = next_offset;
                        for event in events {
                            if tx.send(event).await.is_err() {
                                tracing::debug!("Event receiver dropped, stopping Telegram polling");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Telegram getUpdates failed");
                        tokio::time::sleep(ERROR_BACKOFF).await;
                    }
                }
                if tx.is_closed() {
                    return;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        format: TextFormat,
        buttons: &[Button],
    ) -> Result<MessageRef, ChannelError> {
        let mut body = with_format(json!({ "chat_id": chat_id, "text": text }), format);
        if !buttons.is_empty() {
            body["reply_markup"] = inline_keyboard(buttons);
        }
        let sent: Message = self.call("sendMessage", &body).await?;
        Ok(MessageRef {
            chat_id: sent.chat.id,
            message_id: sent.message_id,
        })
    }

    async fn edit_text(
        &self,
        message: &MessageRef,
        text: &str,
        format: TextFormat,
    ) -> Result<(), ChannelError> {
        let body = with_format(
            json!({
                "chat_id": message.chat_id,
                "message_id": message.message_id,
                "text": text,
            }),
            format,
        );
        let _: Value = self.call("editMessageText", &body).await?;
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        document: &Document,
    ) -> Result<(), ChannelError> {
        let part = multipart::Part::bytes(document.bytes.clone())
            .file_name(document.filename.clone())
            .mime_str("text/csv")
            .map_err(|e| ChannelError::InvalidMessage(e.to_string()))?;
        let mut form = multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);
        if let Some(caption) = &document.caption {
            form = form.text("caption", caption.clone());
        }

        let response = self
            .http
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ChannelError::Http(redact_sensitive_detail(&e.to_string())))?;
        let _: Value = Self::read_envelope("sendDocument", response).await?;
        Ok(())
    }

    async fn answer_button(&self, callback_id: &str) -> Result<(), ChannelError> {
        let _: Value = self
            .call(
                "answerCallbackQuery",
                &json!({ "callback_query_id": callback_id }),
            )
            .await?;
        Ok(())
    }
}
