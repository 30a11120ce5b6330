//! End-to-end conversation flows against scripted collaborators.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use tokenscope::channels::{
    Button, Channel, ChatId, Document, EventStream, InboundEvent, MessageRef, TextFormat,
};
use tokenscope::config::ReportConfig;
use tokenscope::error::{ChannelError, QueryError, ValidationError};
use tokenscope::lookup::TokenLookup;
use tokenscope::query::{
    ExecutionHandle, ExecutionPoller, ExecutionState, ExecutionStatus, PollSettings, QueryEngine,
    QueryId, QueryParameters, ResultRow,
};
use tokenscope::session::{
    ADDRESS_PROMPT, CANCELLED, END_TIME_PROMPT, EXPORT_CAPTION, FlowStatus, HELP,
    INVALID_ADDRESS, INVALID_TIMESTAMP, NO_RESULTS, SessionMachine, SessionSettings, Stage,
    WELCOME,
};

const USER: i64 = 42;
const CHAT: i64 = 500;
const ADDRESS: &str = "So11111111111111111111111111111111111111112";
const TOP_TRADERS_QUERY: QueryId = QueryId(5521339);
const TRADES_QUERY: QueryId = QueryId(5521412);

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Text {
        message: MessageRef,
        text: String,
        format: TextFormat,
        buttons: Vec<Button>,
    },
    Edit {
        message: MessageRef,
        text: String,
        format: TextFormat,
    },
    Document {
        chat_id: ChatId,
        document: Document,
    },
}

#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<Sent>>,
    answered: Mutex<Vec<String>>,
    next_message_id: AtomicI64,
    reject_documents: AtomicBool,
}

impl RecordingChannel {
    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("lock").clone()
    }

    fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn edits(&self) -> Vec<(MessageRef, String, TextFormat)> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Edit {
                    message,
                    text,
                    format,
                } => Some((message, text, format)),
                _ => None,
            })
            .collect()
    }

    fn documents(&self) -> Vec<Document> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Document { document, .. } => Some(document),
                _ => None,
            })
            .collect()
    }

    /// The most recent message that carried buttons.
    fn last_buttons(&self) -> Option<(MessageRef, Vec<Button>)> {
        self.sent().into_iter().rev().find_map(|s| match s {
            Sent::Text {
                message, buttons, ..
            } if !buttons.is_empty() => Some((message, buttons)),
            _ => None,
        })
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        format: TextFormat,
        buttons: &[Button],
    ) -> Result<MessageRef, ChannelError> {
        let message = MessageRef {
            chat_id,
            message_id: self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1,
        };
        self.sent.lock().expect("lock").push(Sent::Text {
            message,
            text: text.to_string(),
            format,
            buttons: buttons.to_vec(),
        });
        Ok(message)
    }

    async fn edit_text(
        &self,
        message: &MessageRef,
        text: &str,
        format: TextFormat,
    ) -> Result<(), ChannelError> {
        self.sent.lock().expect("lock").push(Sent::Edit {
            message: *message,
            text: text.to_string(),
            format,
        });
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        document: &Document,
    ) -> Result<(), ChannelError> {
        if self.reject_documents.load(Ordering::SeqCst) {
            return Err(ChannelError::SendFailed {
                name: "recording".to_string(),
                reason: "Request Entity Too Large".to_string(),
            });
        }
        self.sent.lock().expect("lock").push(Sent::Document {
            chat_id,
            document: document.clone(),
        });
        Ok(())
    }

    async fn answer_button(&self, callback_id: &str) -> Result<(), ChannelError> {
        self.answered
            .lock()
            .expect("lock")
            .push(callback_id.to_string());
        Ok(())
    }
}

/// Replays a status script, then reports RUNNING forever.
#[derive(Default)]
struct ScriptedEngine {
    statuses: Mutex<VecDeque<ExecutionStatus>>,
    rows: Vec<ResultRow>,
    submitted: Mutex<Vec<(QueryId, QueryParameters)>>,
    status_checks: AtomicUsize,
}

impl ScriptedEngine {
    fn new(states: &[ExecutionState], rows: Vec<ResultRow>) -> Self {
        Self {
            statuses: Mutex::new(states.iter().copied().map(ExecutionStatus::new).collect()),
            rows,
            ..Self::default()
        }
    }

    fn failing(detail: &str) -> Self {
        Self {
            statuses: Mutex::new(
                [ExecutionStatus::new(ExecutionState::Failed).with_detail(detail)].into(),
            ),
            ..Self::default()
        }
    }

    fn submitted(&self) -> Vec<(QueryId, QueryParameters)> {
        self.submitted.lock().expect("lock").clone()
    }
}

#[async_trait]
impl QueryEngine for ScriptedEngine {
    async fn submit(
        &self,
        query: QueryId,
        params: &QueryParameters,
    ) -> Result<ExecutionHandle, QueryError> {
        self.submitted
            .lock()
            .expect("lock")
            .push((query, params.clone()));
        Ok(ExecutionHandle::new("01EXEC"))
    }

    async fn check_status(&self, _handle: &ExecutionHandle) -> Result<ExecutionStatus, QueryError> {
        self.status_checks.fetch_add(1, Ordering::SeqCst);
        let next = self.statuses.lock().expect("lock").pop_front();
        Ok(next.unwrap_or_else(|| ExecutionStatus::new(ExecutionState::Running)))
    }

    async fn fetch_results(&self, _handle: &ExecutionHandle) -> Result<Vec<ResultRow>, QueryError> {
        Ok(self.rows.clone())
    }
}

struct FixedLookup {
    name: String,
    calls: AtomicUsize,
}

#[async_trait]
impl TokenLookup for FixedLookup {
    async fn display_name(&self, _address: &str) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.name.clone()
    }
}

struct Harness {
    machine: Arc<SessionMachine>,
    channel: Arc<RecordingChannel>,
    engine: Arc<ScriptedEngine>,
    lookup: Arc<FixedLookup>,
}

impl Harness {
    fn new(engine: ScriptedEngine) -> Self {
        Self::with_report(engine, ReportConfig::default())
    }

    fn with_report(engine: ScriptedEngine, report: ReportConfig) -> Self {
        let channel = Arc::new(RecordingChannel::default());
        let engine = Arc::new(engine);
        let lookup = Arc::new(FixedLookup {
            name: "Wrapped SOL".to_string(),
            calls: AtomicUsize::new(0),
        });
        let settings = PollSettings::new(Duration::from_secs(60), Duration::from_secs(5))
            .expect("poll settings");
        let poller = Arc::new(ExecutionPoller::new(engine.clone(), settings));
        let machine = Arc::new(SessionMachine::new(
            channel.clone(),
            poller,
            lookup.clone(),
            SessionSettings {
                top_traders_query: TOP_TRADERS_QUERY,
                trades_query: TRADES_QUERY,
                report,
            },
        ));
        Self {
            machine,
            channel,
            engine,
            lookup,
        }
    }

    fn menu_message(&self) -> MessageRef {
        MessageRef {
            chat_id: CHAT,
            message_id: 1000,
        }
    }

    async fn press(&self, data: &str, message: MessageRef) -> FlowStatus {
        self.machine
            .handle(InboundEvent::button(USER, message, "cb", data))
            .await
            .expect("button")
    }

    async fn say(&self, text: &str) -> FlowStatus {
        self.machine
            .handle(InboundEvent::text(USER, CHAT, text))
            .await
            .expect("text")
    }

    async fn stage(&self) -> Option<Stage> {
        self.machine.store().get(USER).await.map(|c| c.stage)
    }
}

fn top_trader_rows() -> Vec<ResultRow> {
    vec![
        ResultRow::new()
            .with("trader_id", "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU")
            .with("profit_usd", 1520.456)
            .with("roi", 2.1),
        ResultRow::new()
            .with("trader_id", "9aBcTg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU")
            .with("profit_usd", 80.0)
            .with("roi", 0.4),
    ]
}

fn trade_rows(count: usize) -> Vec<ResultRow> {
    (0..count)
        .map(|i| {
            ResultRow::new()
                .with("trade_date", format!("2025-09-01 10:{:02}:00.000 UTC", i))
                .with("trader_id", format!("trader{i:02}"))
                .with("token_bought_symbol", "SOL")
                .with("amount_usd", 10.5 + i as f64)
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn start_command_shows_menu() {
    let h = Harness::new(ScriptedEngine::default());

    let status = h
        .machine
        .handle(InboundEvent::command(USER, CHAT, "start"))
        .await
        .expect("start");

    assert_eq!(status, FlowStatus::MenuShown);
    let (_, buttons) = h.channel.last_buttons().expect("menu");
    assert_eq!(h.channel.texts(), vec![WELCOME.to_string()]);
    assert_eq!(
        buttons.iter().map(|b| b.data.as_str()).collect::<Vec<_>>(),
        vec!["top_traders", "trades", "help"]
    );
}

#[tokio::test(start_paused = true)]
async fn invalid_address_ends_flow_without_querying() {
    let h = Harness::new(ScriptedEngine::default());

    assert_eq!(
        h.press("trades", h.menu_message()).await,
        FlowStatus::Prompted(Stage::AwaitAddress)
    );
    let status = h.say("tooshort").await;

    assert_eq!(
        status,
        FlowStatus::Rejected(ValidationError::InvalidAddress { length: 8 })
    );
    assert_eq!(
        h.channel.texts(),
        vec![ADDRESS_PROMPT.to_string(), INVALID_ADDRESS.to_string()]
    );
    assert!(h.engine.submitted().is_empty());
    assert_eq!(h.lookup.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.stage().await, None);

    // The flow is over; further text is ignored.
    assert_eq!(h.say(ADDRESS).await, FlowStatus::Ignored);
}

#[tokio::test(start_paused = true)]
async fn invalid_timestamps_reprompt_without_advancing() {
    let h = Harness::new(ScriptedEngine::default());

    h.press("trades", h.menu_message()).await;
    assert_eq!(h.say(ADDRESS).await, FlowStatus::Prompted(Stage::AwaitStartTime));

    assert_eq!(
        h.say("2025-09-01").await,
        FlowStatus::Reprompted(Stage::AwaitStartTime)
    );
    assert_eq!(h.stage().await, Some(Stage::AwaitStartTime));

    assert_eq!(
        h.say("2025-09-01 00:00:00").await,
        FlowStatus::Prompted(Stage::AwaitEndTime)
    );
    assert_eq!(
        h.say("2025-09-05T23:59:59").await,
        FlowStatus::Reprompted(Stage::AwaitEndTime)
    );
    assert_eq!(h.stage().await, Some(Stage::AwaitEndTime));

    let texts = h.channel.texts();
    assert_eq!(texts[2], INVALID_TIMESTAMP);
    assert_eq!(texts[3], END_TIME_PROMPT);
    assert_eq!(texts[4], INVALID_TIMESTAMP);
    assert!(h.engine.submitted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn trades_flow_delivers_text_and_full_csv() {
    let h = Harness::new(ScriptedEngine::new(
        &[
            ExecutionState::Pending,
            ExecutionState::Running,
            ExecutionState::Completed,
        ],
        trade_rows(25),
    ));

    h.press("trades", h.menu_message()).await;
    h.say(ADDRESS).await;
    h.say("2025-09-01 00:00:00").await;
    let status = h.say(" 2025-09-05 23:59:59 ").await;

    assert_eq!(
        status,
        FlowStatus::Delivered {
            rows: 25,
            exported: true
        }
    );
    assert_eq!(h.stage().await, None);

    let submitted = h.engine.submitted();
    assert_eq!(submitted.len(), 1);
    let (query, params) = &submitted[0];
    assert_eq!(*query, TRADES_QUERY);
    assert_eq!(params.get("contract address"), Some(ADDRESS));
    assert_eq!(params.get("start time"), Some("2025-09-01 00:00:00"));
    assert_eq!(params.get("end time"), Some("2025-09-05 23:59:59"));

    let texts = h.channel.texts();
    assert_eq!(
        texts[1],
        "✅ Token confirmed: *Wrapped SOL*\n\nNow enter *start date* (YYYY-MM-DD HH:MM:SS):"
    );
    let status_text = texts.last().expect("status message");
    assert_eq!(
        status_text,
        &format!(
            "📡 Running query...\n\nCA: `{ADDRESS}`\nFrom: 2025-09-01 00:00:00\nTo: 2025-09-05 23:59:59"
        )
    );
    let (cancel_message, cancel_buttons) = h.channel.last_buttons().expect("cancel button");
    assert_eq!(cancel_buttons[0].data, "cancel");

    let edits = h.channel.edits();
    assert_eq!(edits.len(), 1);
    let (edited, text, format) = &edits[0];
    assert_eq!(*edited, cancel_message);
    assert_eq!(*format, TextFormat::Plain);
    assert!(text.starts_with("📊 Query Results:\n\n⏰ 2025-09-01 10:00:00.000 UTC\n👤 trader00\n💠 SOL — $10.5\n\n"));
    assert!(text.contains("trader19"));
    assert!(!text.contains("trader20"));

    let documents = h.channel.documents();
    assert_eq!(documents.len(), 1);
    let document = &documents[0];
    assert_eq!(document.filename, format!("trades_{ADDRESS}.csv"));
    assert_eq!(document.caption.as_deref(), Some(EXPORT_CAPTION));

    let mut reader = csv::Reader::from_reader(document.bytes.as_slice());
    let headers: Vec<String> = reader
        .headers()
        .expect("headers")
        .iter()
        .map(str::to_string)
        .collect();
    assert_eq!(
        headers,
        vec!["trade_date", "trader_id", "token_bought_symbol", "amount_usd"]
    );
    assert_eq!(reader.records().count(), 25);
    assert_eq!(h.engine.status_checks.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn oversized_trades_text_is_replaced_but_csv_still_sent() {
    let h = Harness::with_report(
        ScriptedEngine::new(&[ExecutionState::Completed], trade_rows(25)),
        ReportConfig {
            inline_text_max_bytes: 200,
            trades_inline_row_limit: 20,
        },
    );

    h.press("trades", h.menu_message()).await;
    h.say(ADDRESS).await;
    h.say("2025-09-01 00:00:00").await;
    h.say("2025-09-05 23:59:59").await;

    let edits = h.channel.edits();
    assert_eq!(edits[0].1, "📂 Results too large, sending CSV...");
    let documents = h.channel.documents();
    assert_eq!(documents.len(), 1);
    let mut reader = csv::Reader::from_reader(documents[0].bytes.as_slice());
    assert_eq!(reader.records().count(), 25);
}

#[tokio::test(start_paused = true)]
async fn top_traders_flow_renders_every_row_without_export() {
    let h = Harness::new(ScriptedEngine::new(
        &[ExecutionState::Completed],
        top_trader_rows(),
    ));

    h.press("top_traders", h.menu_message()).await;
    let status = h.say(ADDRESS).await;

    assert_eq!(
        status,
        FlowStatus::Delivered {
            rows: 2,
            exported: false
        }
    );
    let submitted = h.engine.submitted();
    assert_eq!(submitted[0].0, TOP_TRADERS_QUERY);
    assert_eq!(submitted[0].1.get("CA"), Some(ADDRESS));
    assert_eq!(h.lookup.calls.load(Ordering::SeqCst), 1);

    assert_eq!(
        h.channel.texts()[1],
        "✅ Token confirmed: *Wrapped SOL*\n\n⏳ Running query..."
    );
    let edits = h.channel.edits();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].2, TextFormat::Markdown);
    assert_eq!(
        edits[0].1,
        "📊 *Top Traders for Wrapped SOL*\n\n\
👤 `7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU`\n💰 Profit: 1520.46 USD\n📈 ROI: 2.10\n---\n\
👤 `9aBcTg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU`\n💰 Profit: 80.00 USD\n📈 ROI: 0.40\n---\n"
    );
    assert!(h.channel.documents().is_empty());
}

#[tokio::test(start_paused = true)]
async fn empty_result_reports_no_results_and_skips_export() {
    let h = Harness::new(ScriptedEngine::new(&[ExecutionState::Completed], Vec::new()));

    h.press("trades", h.menu_message()).await;
    h.say(ADDRESS).await;
    h.say("2025-09-01 00:00:00").await;
    let status = h.say("2025-09-05 23:59:59").await;

    assert_eq!(status, FlowStatus::NoResults);
    assert_eq!(h.channel.edits()[0].1, NO_RESULTS);
    assert!(h.channel.documents().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_query_is_reported_inline_and_ends_flow() {
    let h = Harness::new(ScriptedEngine::failing("line 3: column profit_usd does not exist"));

    h.press("top_traders", h.menu_message()).await;
    let status = h.say(ADDRESS).await;

    assert!(matches!(status, FlowStatus::Failed(_)));
    let edits = h.channel.edits();
    assert_eq!(
        edits[0].1,
        "❌ Error: Query failed (FAILED): line 3: column profit_usd does not exist"
    );
    assert_eq!(edits[0].2, TextFormat::Plain);
    assert_eq!(h.stage().await, None);
}

#[tokio::test(start_paused = true)]
async fn query_timeout_is_reported_as_distinct_error() {
    // Never terminal; the 60s budget runs out after 12 checks.
    let h = Harness::new(ScriptedEngine::default());

    h.press("top_traders", h.menu_message()).await;
    let status = h.say(ADDRESS).await;

    assert!(matches!(status, FlowStatus::Failed(_)));
    assert!(h.channel.edits()[0].1.contains("did not finish in time"));
    assert_eq!(h.engine.status_checks.load(Ordering::SeqCst), 12);
}

#[tokio::test(start_paused = true)]
async fn cancel_ends_flow_while_collecting_inputs() {
    let h = Harness::new(ScriptedEngine::default());

    h.press("trades", h.menu_message()).await;
    let (address_prompt, buttons) = h.channel.last_buttons().expect("address prompt");
    assert_eq!(buttons, vec![Button::new("❌ Cancel", "cancel")]);

    h.say(ADDRESS).await;
    let (pressed_on, buttons) = h.channel.last_buttons().expect("start time prompt");
    assert_ne!(pressed_on, address_prompt);
    assert_eq!(buttons[0].data, "cancel");

    assert_eq!(
        h.press(&buttons[0].data, pressed_on).await,
        FlowStatus::Cancelled
    );
    assert_eq!(
        h.channel.edits(),
        vec![(pressed_on, CANCELLED.to_string(), TextFormat::Plain)]
    );
    assert_eq!(h.stage().await, None);
    assert_eq!(h.say("2025-09-01 00:00:00").await, FlowStatus::Ignored);

    // Nothing left to cancel.
    assert_eq!(h.press("cancel", pressed_on).await, FlowStatus::Ignored);
    assert_eq!(
        *h.channel.answered.lock().expect("lock"),
        vec!["cb".to_string(), "cb".to_string(), "cb".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn cancel_from_address_prompt_uses_its_own_button() {
    let h = Harness::new(ScriptedEngine::default());

    h.press("top_traders", h.menu_message()).await;
    let (prompt, buttons) = h.channel.last_buttons().expect("address prompt");
    assert_eq!(h.channel.texts(), vec![ADDRESS_PROMPT.to_string()]);

    assert_eq!(h.press(&buttons[0].data, prompt).await, FlowStatus::Cancelled);
    assert_eq!(
        h.channel.edits(),
        vec![(prompt, CANCELLED.to_string(), TextFormat::Plain)]
    );
    assert_eq!(h.say(ADDRESS).await, FlowStatus::Ignored);
    assert!(h.engine.submitted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rejected_attachment_is_reported_on_status_message() {
    let h = Harness::new(ScriptedEngine::new(
        &[ExecutionState::Completed],
        trade_rows(25),
    ));
    h.channel.reject_documents.store(true, Ordering::SeqCst);

    h.press("trades", h.menu_message()).await;
    h.say(ADDRESS).await;
    h.say("2025-09-01 00:00:00").await;
    let status = h.say("2025-09-05 23:59:59").await;

    assert!(matches!(status, FlowStatus::Failed(ref detail) if detail.contains("Request Entity Too Large")));
    let (status_message, _) = h.channel.last_buttons().expect("status message");
    let edits = h.channel.edits();
    assert_eq!(edits.len(), 2);
    assert!(edits[0].1.starts_with("📊 Query Results:"));
    assert_eq!(edits[1].0, status_message);
    assert_eq!(
        edits[1].1,
        "❌ Error: Failed to send response on channel recording: Request Entity Too Large"
    );
    assert!(h.channel.documents().is_empty());
    assert_eq!(h.stage().await, None);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_query_does_not_stop_delivery() {
    let h = Harness::new(ScriptedEngine::new(
        &[
            ExecutionState::Running,
            ExecutionState::Running,
            ExecutionState::Completed,
        ],
        top_trader_rows(),
    ));

    h.press("top_traders", h.menu_message()).await;
    let machine = Arc::clone(&h.machine);
    let flow = tokio::spawn(async move {
        machine
            .handle(InboundEvent::text(USER, CHAT, ADDRESS))
            .await
            .expect("flow")
    });

    // Let the flow post its status message and start polling.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.stage().await, Some(Stage::Running));
    assert_eq!(h.say("ignored while running").await, FlowStatus::Ignored);

    let (status_message, _) = h.channel.last_buttons().expect("status message");
    assert_eq!(h.press("cancel", status_message).await, FlowStatus::Cancelled);
    assert_eq!(h.stage().await, None);

    let outcome = flow.await.expect("join");
    assert_eq!(
        outcome,
        FlowStatus::Delivered {
            rows: 2,
            exported: false
        }
    );

    let edits = h.channel.edits();
    assert_eq!(edits.len(), 2);
    assert_eq!(edits[0].1, CANCELLED);
    assert!(edits[1].1.starts_with("📊 *Top Traders for Wrapped SOL*"));
    assert_eq!(h.engine.status_checks.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn new_menu_choice_replaces_running_flow_state() {
    let h = Harness::new(ScriptedEngine::new(
        &[ExecutionState::Running, ExecutionState::Completed],
        top_trader_rows(),
    ));

    h.press("top_traders", h.menu_message()).await;
    let machine = Arc::clone(&h.machine);
    let flow = tokio::spawn(async move {
        machine
            .handle(InboundEvent::text(USER, CHAT, ADDRESS))
            .await
            .expect("flow")
    });
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Starting over while the first query runs.
    h.press("trades", h.menu_message()).await;
    flow.await.expect("join");

    // The finished query must not clear the newer flow.
    assert_eq!(h.stage().await, Some(Stage::AwaitAddress));
}

#[tokio::test(start_paused = true)]
async fn help_ends_flow_and_text_without_flow_is_ignored() {
    let h = Harness::new(ScriptedEngine::default());

    assert_eq!(h.say(ADDRESS).await, FlowStatus::Ignored);

    h.press("trades", h.menu_message()).await;
    assert_eq!(h.press("help", h.menu_message()).await, FlowStatus::HelpShown);
    assert_eq!(h.stage().await, None);
    assert_eq!(h.channel.texts().last().map(String::as_str), Some(HELP));
    assert_eq!(h.say(ADDRESS).await, FlowStatus::Ignored);
}

#[tokio::test(start_paused = true)]
async fn users_progress_independently() {
    let h = Harness::new(ScriptedEngine::default());
    let other = 43;

    h.press("trades", h.menu_message()).await;
    h.machine
        .handle(InboundEvent::button(other, h.menu_message(), "cb", "top_traders"))
        .await
        .expect("other user");

    h.say(ADDRESS).await;
    assert_eq!(h.stage().await, Some(Stage::AwaitStartTime));
    let other_stage = h.machine.store().get(other).await.map(|c| c.stage);
    assert_eq!(other_stage, Some(Stage::AwaitAddress));
}

#[tokio::test(start_paused = true)]
async fn serve_dispatches_stream_events() {
    let h = Harness::new(ScriptedEngine::default());
    let events: EventStream = Box::pin(futures::stream::iter(vec![
        InboundEvent::command(USER, CHAT, "start"),
        InboundEvent::command(43, 600, "start"),
    ]));

    Arc::clone(&h.machine).serve(events).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(h.channel.texts(), vec![WELCOME.to_string(), WELCOME.to_string()]);
}
