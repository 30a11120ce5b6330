//! Terminal channel with line editing and markdown rendering.
//!
//! Drives the same flows as the chat bot from a local terminal. Uses
//! rustyline for line editing and history, and termimad for rendering
//! Markdown replies. Buttons are listed as numbered choices; typing the
//! number presses the button. Attachments are written to the export
//! directory.
//!
//! ## Commands
//!
//! - `/start` - Show the query menu
//! - `/help` - Show terminal commands
//! - `/quit` or `/exit` - Exit

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rustyline::completion::Completer;
use rustyline::config::Config;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Editor, Helper};
use termimad::MadSkin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::channels::{
    Button, Channel, ChatId, Document, EventStream, InboundEvent, MessageRef, TextFormat, UserId,
    parse_command,
};
use crate::config::ReplConfig;
use crate::error::ChannelError;

/// The single local user and chat.
const LOCAL_USER: UserId = 0;
const LOCAL_CHAT: ChatId = 0;

/// Slash commands available in the terminal.
const SLASH_COMMANDS: &[&str] = &["/start", "/help", "/quit", "/exit"];

/// Rustyline helper for slash-command tab completion.
struct ReplHelper;

impl Completer for ReplHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        if !line.starts_with('/') {
            return Ok((0, vec![]));
        }

        let prefix = &line[..pos];
        let matches: Vec<String> = SLASH_COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .map(|cmd| cmd.to_string())
            .collect();

        Ok((0, matches))
    }
}

impl Hinter for ReplHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if !line.starts_with('/') || pos < line.len() {
            return None;
        }

        SLASH_COMMANDS
            .iter()
            .find(|cmd| cmd.starts_with(line) && **cmd != line)
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

impl Highlighter for ReplHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(format!("\x1b[90m{hint}\x1b[0m"))
    }
}

impl Validator for ReplHelper {}
impl Helper for ReplHelper {}

/// Build a termimad skin with our color scheme.
fn make_skin() -> MadSkin {
    let mut skin = MadSkin::default();
    skin.set_headers_fg(termimad::crossterm::style::Color::Yellow);
    skin.bold.set_fg(termimad::crossterm::style::Color::White);
    skin.italic
        .set_fg(termimad::crossterm::style::Color::Magenta);
    skin.inline_code
        .set_fg(termimad::crossterm::style::Color::Green);
    skin.code_block
        .set_fg(termimad::crossterm::style::Color::Green);
    skin.code_block.left_margin = 2;
    skin
}

/// Buttons of the most recent message that still has them.
type PendingChoices = Arc<Mutex<Option<(MessageRef, Vec<Button>)>>>;

/// Terminal channel.
pub struct ReplChannel {
    export_dir: PathBuf,
    next_message_id: AtomicI64,
    choices: PendingChoices,
}

impl ReplChannel {
    pub fn new(config: &ReplConfig) -> Self {
        Self {
            export_dir: config.export_dir.clone(),
            next_message_id: AtomicI64::new(1),
            choices: Arc::new(Mutex::new(None)),
        }
    }

    fn set_choices(&self, message: MessageRef, buttons: &[Button]) {
        if let Ok(mut choices) = self.choices.lock() {
            *choices = Some((message, buttons.to_vec()));
        }
    }

    /// Editing a message drops its buttons.
    fn clear_choices_of(&self, message: &MessageRef) {
        if let Ok(mut choices) = self.choices.lock()
            && choices.as_ref().is_some_and(|(m, _)| m == message)
        {
            *choices = None;
        }
    }
}

fn print_help() {
    let h = "\x1b[1m"; // bold (section headers)
    let c = "\x1b[1;36m"; // bold cyan (commands)
    let d = "\x1b[90m"; // dim gray (descriptions)
    let r = "\x1b[0m"; // reset

    println!();
    println!("  {h}tokenscope{r}");
    println!();
    println!("  {c}/start{r}             {d}show the query menu{r}");
    println!("  {c}1{r}, {c}2{r}, ...          {d}press a listed button{r}");
    println!("  {c}/help{r}              {d}show this help{r}");
    println!("  {c}/quit{r} {c}/exit{r}        {d}exit{r}");
    println!();
}

/// Map one input line to an event. A number selects a pending button.
fn line_to_event(line: &str, choices: &PendingChoices) -> InboundEvent {
    if let Ok(index) = line.parse::<usize>()
        && let Ok(pending) = choices.lock()
        && let Some((message, buttons)) = pending.as_ref()
        && let Some(button) = index.checked_sub(1).and_then(|i| buttons.get(i))
    {
        return InboundEvent::button(
            LOCAL_USER,
            *message,
            format!("repl-{}-{index}", message.message_id),
            button.data.clone(),
        );
    }

    match parse_command(line) {
        Some(command) => InboundEvent::command(LOCAL_USER, LOCAL_CHAT, command),
        None => InboundEvent::text(LOCAL_USER, LOCAL_CHAT, line),
    }
}

fn button_lines(buttons: &[Button]) -> Vec<String> {
    buttons
        .iter()
        .enumerate()
        .map(|(i, b)| format!("  \x1b[1;36m[{}]\x1b[0m {}", i + 1, b.label))
        .collect()
}

/// Keep attachment names inside the export directory.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "export.csv".to_string()
    } else {
        trimmed.to_string()
    }
}

fn render(text: &str, format: TextFormat) {
    let width = crossterm::terminal::size()
        .map(|(w, _)| w as usize)
        .unwrap_or(80);

    let sep_width = width.min(80);
    eprintln!("\x1b[90m{}\x1b[0m", "\u{2500}".repeat(sep_width));

    match format {
        TextFormat::Markdown => {
            let skin = make_skin();
            let text = termimad::FmtText::from(&skin, text, Some(width));
            print!("{text}");
        }
        TextFormat::Plain => println!("{text}"),
    }
    println!();
}

/// Get the history file path (~/.tokenscope/history).
fn history_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tokenscope")
        .join("history")
}

#[async_trait]
impl Channel for ReplChannel {
    fn name(&self) -> &str {
        "repl"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = mpsc::channel(32);
        let choices = Arc::clone(&self.choices);

        std::thread::spawn(move || {
            let config = match Config::builder().history_ignore_dups(true) {
                Ok(builder) => builder
                    .auto_add_history(true)
                    .completion_type(CompletionType::List)
                    .build(),
                Err(e) => {
                    eprintln!("Failed to configure line editor: {e}");
                    return;
                }
            };

            let mut rl = match Editor::with_config(config) {
                Ok(editor) => editor,
                Err(e) => {
                    eprintln!("Failed to initialize line editor: {e}");
                    return;
                }
            };

            rl.set_helper(Some(ReplHelper));

            let hist_path = history_path();
            if let Some(parent) = hist_path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let _ = rl.load_history(&hist_path);

            println!("\x1b[1mtokenscope\x1b[0m  /help for commands, /quit to exit");
            println!();

            if tx
                .blocking_send(InboundEvent::command(LOCAL_USER, LOCAL_CHAT, "start"))
                .is_err()
            {
                return;
            }

            loop {
                match rl.readline("\x1b[1;36m\u{203A}\x1b[0m ") {
                    Ok(line) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }

                        match line.to_lowercase().as_str() {
                            "/quit" | "/exit" => break,
                            "/help" => {
                                print_help();
                                continue;
                            }
                            _ => {}
                        }

                        if tx.blocking_send(line_to_event(line, &choices)).is_err() {
                            break;
                        }
                    }
                    Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                    Err(e) => {
                        eprintln!("Input error: {e}");
                        break;
                    }
                }
            }

            let _ = rl.save_history(&history_path());
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
        let message = MessageRef {
            chat_id,
            message_id: self.next_message_id.fetch_add(1, Ordering::Relaxed),
        };
        render(text, format);
        if !buttons.is_empty() {
            for line in button_lines(buttons) {
                println!("{line}");
            }
            println!();
            self.set_choices(message, buttons);
        }
        Ok(message)
    }

    async fn edit_text(
        &self,
        message: &MessageRef,
        text: &str,
        format: TextFormat,
    ) -> Result<(), ChannelError> {
        self.clear_choices_of(message);
        eprintln!("  \x1b[90m\u{21BB} message {} updated\x1b[0m", message.message_id);
        render(text, format);
        Ok(())
    }

    async fn send_document(
        &self,
        _chat_id: ChatId,
        document: &Document,
    ) -> Result<(), ChannelError> {
        let send_failed = |e: std::io::Error| ChannelError::SendFailed {
            name: "repl".to_string(),
            reason: e.to_string(),
        };
        tokio::fs::create_dir_all(&self.export_dir)
            .await
            .map_err(send_failed)?;
        let path = self.export_dir.join(sanitize_filename(&document.filename));
        tokio::fs::write(&path, &document.bytes)
            .await
            .map_err(send_failed)?;

        let caption = document.caption.as_deref().unwrap_or("Attachment");
        println!(
            "  \x1b[32m\u{25CF}\x1b[0m {caption} \x1b[90m({} bytes)\x1b[0m \x1b[4m{}\x1b[0m",
            document.bytes.len(),
            path.display()
        );
        println!();
        Ok(())
    }
}
