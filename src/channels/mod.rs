//! Chat transports.
//!
//! A [`Channel`] produces a stream of [`InboundEvent`]s and accepts the
//! outbound operations the session flow needs: plain and Markdown text,
//! inline button menus, in-place edits, and file attachments.

mod repl;
mod telegram;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;

pub use self::repl::ReplChannel;
pub use self::telegram::TelegramChannel;

pub type UserId = i64;
pub type ChatId = i64;

/// Stream of inbound events from a channel.
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// How the transport should interpret message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Markdown,
}

/// Inline button attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    /// Opaque payload delivered back when the button is pressed.
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// A message previously sent by the bot, addressable for edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: i64,
}

/// File attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundKind {
    /// A `/command`, without the slash or any `@bot` suffix.
    Command(String),
    Text(String),
    ButtonPressed {
        callback_id: String,
        data: String,
        /// The message carrying the pressed button.
        message: MessageRef,
    },
}

/// One inbound event, keyed by the user that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub kind: InboundKind,
}

impl InboundEvent {
    pub fn text(user_id: UserId, chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            user_id,
            chat_id,
            kind: InboundKind::Text(text.into()),
        }
    }

    pub fn command(user_id: UserId, chat_id: ChatId, command: impl Into<String>) -> Self {
        Self {
            user_id,
            chat_id,
            kind: InboundKind::Command(command.into()),
        }
    }

    pub fn button(
        user_id: UserId,
        message: MessageRef,
        callback_id: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            chat_id: message.chat_id,
            kind: InboundKind::ButtonPressed {
                callback_id: callback_id.into(),
                data: data.into(),
                message,
            },
        }
    }
}

/// Split `/name@bot args` into the bare command name, if `text` is a command.
pub fn parse_command(text: &str) -> Option<String> {
    let rest = text.trim().strip_prefix('/')?;
    let word = rest.split_whitespace().next()?;
    let name = word.split('@').next().unwrap_or(word);
    if name.is_empty() {
        None
    } else {
        Some(name.to_ascii_lowercase())
    }
}

/// A chat transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name, used in logs and errors.
    fn name(&self) -> &str;

    /// Begin receiving events.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    /// Send a new message, optionally with a single column of buttons.
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        format: TextFormat,
        buttons: &[Button],
    ) -> Result<MessageRef, ChannelError>;

    /// Replace the text of a sent message; any buttons are removed.
    async fn edit_text(
        &self,
        message: &MessageRef,
        text: &str,
        format: TextFormat,
    ) -> Result<(), ChannelError>;

    async fn send_document(&self, chat_id: ChatId, document: &Document)
    -> Result<(), ChannelError>;

    /// Acknowledge a button press.
    async fn answer_button(&self, _callback_id: &str) -> Result<(), ChannelError> {
        Ok(())
    }
}
