//! Conversation flows.
//!
//! Each user walks a linear flow: pick a query from the menu, enter a
//! contract address and, for trades, a start and end time. Once the
//! inputs are complete the query runs on its own task and the result is
//! edited into the status message. The cancel button ends the flow at any
//! stage. It does not stop a query that is already running; that query's
//! result is still delivered when it arrives.

mod kind;
mod store;

use std::sync::{Arc, OnceLock};

use futures::StreamExt;
use regex::Regex;

use crate::channels::{
    Button, Channel, ChatId, Document, EventStream, InboundEvent, InboundKind, MessageRef,
    TextFormat, UserId,
};
use crate::config::{Config, ReportConfig};
use crate::error::{ChannelError, ValidationError};
use crate::lookup::TokenLookup;
use crate::query::{ExecutionPoller, QueryId, QueryParameters};
use crate::report::{FormattedResult, InlineView};

pub use self::kind::{QueryKind, escape_markdown, top_traders_params, trades_params};
pub use self::store::{SessionContext, SessionStore, Stage};

pub const WELCOME: &str = "👋 Welcome! Please choose an option:";
pub const ADDRESS_PROMPT: &str = "✍️ Please enter the Solana CA (Contract Address):";
pub const INVALID_ADDRESS: &str = "⚠️ Invalid Solana contract address format.";
pub const INVALID_TIMESTAMP: &str = "⚠️ Invalid format! Try again: YYYY-MM-DD HH:MM:SS";
pub const END_TIME_PROMPT: &str = "✅ Got start time.\nNow enter *end date* (YYYY-MM-DD HH:MM:SS):";
pub const NO_RESULTS: &str = "⚠️ No results found.";
pub const TOO_LARGE_SENDING_CSV: &str = "📂 Results too large, sending CSV...";
pub const TOO_LARGE: &str = "📂 Results too large to display.";
pub const CANCELLED: &str = "❌ Query cancelled by user.";
pub const EXPORT_CAPTION: &str = "📊 Full query results";
pub const HELP: &str = "ℹ️ *How to Use:*\n\n\
📊 *Top Traders*: Enter a Solana contract address and get the top traders.\n\n\
💹 *Trades*: Enter CA, then start and end datetime.\n\
Format: `YYYY-MM-DD HH:MM:SS`\n\n\
👉 Example:\n\
`2025-09-01 00:00:00`\n\
`2025-09-05 23:59:59`\n";

const HELP_BUTTON: &str = "help";
const CANCEL_BUTTON: &str = "cancel";

const MIN_ADDRESS_CHARS: usize = 32;
const MAX_ADDRESS_CHARS: usize = 44;

/// Accept a contract address of 32 to 44 characters, surrounding
/// whitespace ignored.
pub fn validate_address(raw: &str) -> Result<String, ValidationError> {
    let address = raw.trim();
    let length = address.chars().count();
    if (MIN_ADDRESS_CHARS..=MAX_ADDRESS_CHARS).contains(&length) {
        Ok(address.to_string())
    } else {
        Err(ValidationError::InvalidAddress { length })
    }
}

fn timestamp_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$").ok())
        .as_ref()
}

/// Accept `YYYY-MM-DD HH:MM:SS`, surrounding whitespace ignored.
///
/// Only the shape is checked; the engine interprets the value.
pub fn validate_timestamp(raw: &str) -> Result<String, ValidationError> {
    let value = raw.trim();
    if timestamp_pattern().is_some_and(|re| re.is_match(value)) {
        Ok(value.to_string())
    } else {
        Err(ValidationError::InvalidTimestamp {
            value: value.to_string(),
        })
    }
}

pub fn menu_buttons() -> Vec<Button> {
    vec![
        Button::new("📊 Top Traders", QueryKind::TopTraders.button_data()),
        Button::new("💹 Trades", QueryKind::Trades.button_data()),
        Button::new("❓ Help", HELP_BUTTON),
    ]
}

fn cancel_buttons() -> Vec<Button> {
    vec![Button::new("❌ Cancel", CANCEL_BUTTON)]
}

/// What a single event did to the user's flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowStatus {
    /// Nothing to do for this event.
    Ignored,
    MenuShown,
    HelpShown,
    /// The flow advanced and now waits at this stage.
    Prompted(Stage),
    /// Input was rejected; the flow still waits at this stage.
    Reprompted(Stage),
    /// Input was rejected and the flow ended.
    Rejected(ValidationError),
    Delivered { rows: usize, exported: bool },
    NoResults,
    /// The query or its formatting failed; the error was shown to the user.
    Failed(String),
    Cancelled,
    /// A newer flow or a cancel replaced this one while it waited.
    Superseded,
}

/// Query ids and formatting limits the flows need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub top_traders_query: QueryId,
    pub trades_query: QueryId,
    pub report: ReportConfig,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_traders_query: config.query.top_traders_query,
            trades_query: config.query.trades_query,
            report: config.report,
        }
    }

    pub fn query_id(&self, kind: QueryKind) -> QueryId {
        match kind {
            QueryKind::TopTraders => self.top_traders_query,
            QueryKind::Trades => self.trades_query,
        }
    }
}

enum InlineDelivery {
    NoResults,
    Sent { exported: bool },
}

/// A query whose inputs are complete.
struct ReadyQuery {
    user: UserId,
    flow_id: u64,
    chat_id: ChatId,
    kind: QueryKind,
    address: String,
    token_name: String,
    params: QueryParameters,
    status_text: String,
}

/// Drives every user's flow over one channel.
pub struct SessionMachine {
    channel: Arc<dyn Channel>,
    poller: Arc<ExecutionPoller>,
    lookup: Arc<dyn TokenLookup>,
    settings: SessionSettings,
    store: SessionStore,
}

impl SessionMachine {
    pub fn new(
        channel: Arc<dyn Channel>,
        poller: Arc<ExecutionPoller>,
        lookup: Arc<dyn TokenLookup>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            channel,
            poller,
            lookup,
            settings,
            store: SessionStore::new(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Handle every event of `events`, each on its own task, until the
    /// stream ends.
    pub async fn serve(self: Arc<Self>, mut events: EventStream) {
        tracing::info!(channel = self.channel.name(), "Serving chat events");
        while let Some(event) = events.next().await {
            let machine = Arc::clone(&self);
            tokio::spawn(async move {
                let user = event.user_id;
                match machine.handle(event).await {
                    Ok(status) => tracing::debug!(user, ?status, "Event handled"),
                    Err(e) => tracing::warn!(user, error = %e, "Failed to handle event"),
                }
            });
        }
        tracing::info!(channel = self.channel.name(), "Event stream ended");
    }

    pub async fn handle(&self, event: InboundEvent) -> Result<FlowStatus, ChannelError> {
        let InboundEvent {
            user_id,
            chat_id,
            kind,
        } = event;
        match kind {
            InboundKind::Command(command) => self.handle_command(chat_id, &command).await,
            InboundKind::Text(text) => self.handle_text(user_id, chat_id, &text).await,
            InboundKind::ButtonPressed {
                callback_id,
                data,
                message,
            } => {
                if let Err(e) = self.channel.answer_button(&callback_id).await {
                    tracing::warn!(user = user_id, error = %e, "Failed to acknowledge button");
                }
                self.handle_button(user_id, &data, message).await
            }
        }
    }

    async fn handle_command(&self, chat_id: ChatId, command: &str) -> Result<FlowStatus, ChannelError> {
        match command {
            "start" => {
                self.channel
                    .send_text(chat_id, WELCOME, TextFormat::Plain, &menu_buttons())
                    .await?;
                Ok(FlowStatus::MenuShown)
            }
            other => {
                tracing::debug!(command = other, "Ignoring unknown command");
                Ok(FlowStatus::Ignored)
            }
        }
    }

    pub async fn handle_button(
        &self,
        user: UserId,
        data: &str,
        message: MessageRef,
    ) -> Result<FlowStatus, ChannelError> {
        if let Some(kind) = QueryKind::from_button(data) {
            let flow_id = self.store.begin(user, message.chat_id, kind).await;
            tracing::info!(user, flow_id, ?kind, "Flow started");
            self.channel
                .send_text(
                    message.chat_id,
                    ADDRESS_PROMPT,
                    TextFormat::Plain,
                    &cancel_buttons(),
                )
                .await?;
            return Ok(FlowStatus::Prompted(Stage::AwaitAddress));
        }

        match data {
            HELP_BUTTON => {
                self.store.remove(user).await;
                self.channel
                    .send_text(message.chat_id, HELP, TextFormat::Markdown, &[])
                    .await?;
                Ok(FlowStatus::HelpShown)
            }
            CANCEL_BUTTON => self.cancel(user, &message).await,
            other => {
                tracing::debug!(user, data = other, "Ignoring unknown button");
                Ok(FlowStatus::Ignored)
            }
        }
    }

    /// End the user's flow and mark `message` as cancelled.
    pub async fn cancel(&self, user: UserId, message: &MessageRef) -> Result<FlowStatus, ChannelError> {
        let Some(context) = self.store.remove(user).await else {
            return Ok(FlowStatus::Ignored);
        };
        tracing::info!(user, flow_id = context.flow_id, stage = ?context.stage, "Flow cancelled");
        self.channel
            .edit_text(message, CANCELLED, TextFormat::Plain)
            .await?;
        Ok(FlowStatus::Cancelled)
    }

    pub async fn handle_text(
        &self,
        user: UserId,
        chat_id: ChatId,
        text: &str,
    ) -> Result<FlowStatus, ChannelError> {
        let Some(context) = self.store.get(user).await else {
            return Ok(FlowStatus::Ignored);
        };

        match context.stage {
            Stage::AwaitAddress => self.accept_address(user, chat_id, &context, text).await,
            Stage::AwaitStartTime => self.accept_start_time(user, chat_id, &context, text).await,
            Stage::AwaitEndTime => self.accept_end_time(user, chat_id, &context, text).await,
            Stage::Running => {
                tracing::debug!(user, flow_id = context.flow_id, "Ignoring text while query runs");
                Ok(FlowStatus::Ignored)
            }
        }
    }

    async fn accept_address(
        &self,
        user: UserId,
        chat_id: ChatId,
        context: &SessionContext,
        text: &str,
    ) -> Result<FlowStatus, ChannelError> {
        let flow_id = context.flow_id;
        let address = match validate_address(text) {
            Ok(address) => address,
            Err(e) => {
                self.store.finish(user, flow_id).await;
                tracing::debug!(user, flow_id, error = %e, "Address rejected");
                self.channel
                    .send_text(chat_id, INVALID_ADDRESS, TextFormat::Plain, &[])
                    .await?;
                return Ok(FlowStatus::Rejected(e));
            }
        };

        let claimed = self
            .store
            .update_if_current(user, flow_id, Stage::AwaitAddress, |c| {
                c.address = Some(address.clone());
                c.stage = Stage::Running;
            })
            .await;
        if !claimed {
            return Ok(FlowStatus::Superseded);
        }

        let token_name = self.lookup.display_name(&address).await;

        if context.kind.is_time_ranged() {
            let advanced = self
                .store
                .update_if_current(user, flow_id, Stage::Running, |c| {
                    c.token_name = Some(token_name.clone());
                    c.stage = Stage::AwaitStartTime;
                })
                .await;
            if !advanced {
                return Ok(FlowStatus::Superseded);
            }
            let prompt = format!(
                "✅ Token confirmed: *{}*\n\nNow enter *start date* (YYYY-MM-DD HH:MM:SS):",
                escape_markdown(&token_name)
            );
            self.channel
                .send_text(chat_id, &prompt, TextFormat::Markdown, &cancel_buttons())
                .await?;
            return Ok(FlowStatus::Prompted(Stage::AwaitStartTime));
        }

        let still_current = self
            .store
            .update_if_current(user, flow_id, Stage::Running, |c| {
                c.token_name = Some(token_name.clone())
            })
            .await;
        if !still_current {
            return Ok(FlowStatus::Superseded);
        }
        let status_text = format!(
            "✅ Token confirmed: *{}*\n\n⏳ Running query...",
            escape_markdown(&token_name)
        );
        self.execute(ReadyQuery {
            user,
            flow_id,
            chat_id,
            kind: context.kind,
            params: top_traders_params(&address),
            address,
            token_name,
            status_text,
        })
        .await
    }

    async fn accept_start_time(
        &self,
        user: UserId,
        chat_id: ChatId,
        context: &SessionContext,
        text: &str,
    ) -> Result<FlowStatus, ChannelError> {
        let start = match validate_timestamp(text) {
            Ok(start) => start,
            Err(_) => {
                self.channel
                    .send_text(chat_id, INVALID_TIMESTAMP, TextFormat::Plain, &cancel_buttons())
                    .await?;
                return Ok(FlowStatus::Reprompted(Stage::AwaitStartTime));
            }
        };

        let advanced = self
            .store
            .update_if_current(user, context.flow_id, Stage::AwaitStartTime, |c| {
                c.start_time = Some(start);
                c.stage = Stage::AwaitEndTime;
            })
            .await;
        if !advanced {
            return Ok(FlowStatus::Superseded);
        }

        self.channel
            .send_text(chat_id, END_TIME_PROMPT, TextFormat::Markdown, &cancel_buttons())
            .await?;
        Ok(FlowStatus::Prompted(Stage::AwaitEndTime))
    }

    async fn accept_end_time(
        &self,
        user: UserId,
        chat_id: ChatId,
        context: &SessionContext,
        text: &str,
    ) -> Result<FlowStatus, ChannelError> {
        let end = match validate_timestamp(text) {
            Ok(end) => end,
            Err(_) => {
                self.channel
                    .send_text(chat_id, INVALID_TIMESTAMP, TextFormat::Plain, &cancel_buttons())
                    .await?;
                return Ok(FlowStatus::Reprompted(Stage::AwaitEndTime));
            }
        };

        let (Some(address), Some(start)) = (context.address.clone(), context.start_time.clone())
        else {
            tracing::warn!(user, flow_id = context.flow_id, "Trades flow reached end time without inputs");
            self.store.finish(user, context.flow_id).await;
            return Ok(FlowStatus::Ignored);
        };

        let claimed = self
            .store
            .update_if_current(user, context.flow_id, Stage::AwaitEndTime, |c| {
                c.end_time = Some(end.clone());
                c.stage = Stage::Running;
            })
            .await;
        if !claimed {
            return Ok(FlowStatus::Superseded);
        }

        let status_text =
            format!("📡 Running query...\n\nCA: `{address}`\nFrom: {start}\nTo: {end}");
        self.execute(ReadyQuery {
            user,
            flow_id: context.flow_id,
            chat_id,
            kind: QueryKind::Trades,
            params: trades_params(&address, &start, &end),
            token_name: context.token_name.clone().unwrap_or_default(),
            address,
            status_text,
        })
        .await
    }

    /// Post the status message, run the query and deliver its outcome.
    /// The flow ends whatever happens.
    async fn execute(&self, ready: ReadyQuery) -> Result<FlowStatus, ChannelError> {
        let (user, flow_id) = (ready.user, ready.flow_id);
        let outcome = self.run_and_deliver(ready).await;
        self.store.finish(user, flow_id).await;
        outcome
    }

    async fn run_and_deliver(&self, ready: ReadyQuery) -> Result<FlowStatus, ChannelError> {
        let status_message = self
            .channel
            .send_text(
                ready.chat_id,
                &ready.status_text,
                TextFormat::Markdown,
                &cancel_buttons(),
            )
            .await?;

        let query = self.settings.query_id(ready.kind);
        let rows = match self.poller.run_detached(query, ready.params.clone()).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(user = ready.user, flow_id = ready.flow_id, error = %e, "Query failed");
                return self.report_error(&status_message, e.to_string()).await;
            }
        };

        let formatted = match ready.kind.format(
            &rows,
            &ready.token_name,
            &ready.address,
            &self.settings.report,
        ) {
            Ok(formatted) => formatted,
            Err(e) => {
                tracing::warn!(user = ready.user, flow_id = ready.flow_id, error = %e, "Result formatting failed");
                return self.report_error(&status_message, e.to_string()).await;
            }
        };

        match self.deliver(&ready, &status_message, formatted).await {
            Ok(InlineDelivery::NoResults) => Ok(FlowStatus::NoResults),
            Ok(InlineDelivery::Sent { exported }) => {
                tracing::info!(
                    user = ready.user,
                    flow_id = ready.flow_id,
                    rows = rows.len(),
                    exported,
                    "Results delivered"
                );
                Ok(FlowStatus::Delivered {
                    rows: rows.len(),
                    exported,
                })
            }
            Err(e) => {
                tracing::warn!(user = ready.user, flow_id = ready.flow_id, error = %e, "Result delivery failed");
                // Best effort: the status message may still be editable.
                match self.report_error(&status_message, e.to_string()).await {
                    Ok(status) => Ok(status),
                    Err(_) => Err(e),
                }
            }
        }
    }

    async fn deliver(
        &self,
        ready: &ReadyQuery,
        status_message: &MessageRef,
        formatted: FormattedResult,
    ) -> Result<InlineDelivery, ChannelError> {
        let exported = formatted.export.is_some();
        match formatted.inline {
            InlineView::NoResults => {
                self.channel
                    .edit_text(status_message, NO_RESULTS, TextFormat::Plain)
                    .await?;
                return Ok(InlineDelivery::NoResults);
            }
            InlineView::Text(text) => {
                self.channel
                    .edit_text(status_message, &text, ready.kind.result_format())
                    .await?;
            }
            InlineView::TooLarge => {
                let notice = if exported { TOO_LARGE_SENDING_CSV } else { TOO_LARGE };
                self.channel
                    .edit_text(status_message, notice, TextFormat::Plain)
                    .await?;
            }
        }

        if let Some(export) = formatted.export {
            let document = Document {
                filename: export.filename,
                bytes: export.bytes,
                caption: Some(EXPORT_CAPTION.to_string()),
            };
            self.channel.send_document(ready.chat_id, &document).await?;
        }
        Ok(InlineDelivery::Sent { exported })
    }

    async fn report_error(
        &self,
        status_message: &MessageRef,
        detail: String,
    ) -> Result<FlowStatus, ChannelError> {
        self.channel
            .edit_text(status_message, &format!("❌ Error: {detail}"), TextFormat::Plain)
            .await?;
        Ok(FlowStatus::Failed(detail))
    }
}
