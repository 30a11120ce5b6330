use crate::channels::TextFormat;
use crate::config::ReportConfig;
use crate::error::FormatError;
use crate::query::{QueryParameters, ResultRow};
use crate::report::{ExportPolicy, FormatPolicy, FormattedResult, format_results};

const MISSING_CELL: &str = "n/a";

/// The two analytics a user can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Most profitable traders of a token. Needs only the address.
    TopTraders,
    /// Trades of a token within a time range.
    Trades,
}

impl QueryKind {
    pub fn from_button(data: &str) -> Option<Self> {
        match data {
            "top_traders" => Some(Self::TopTraders),
            "trades" => Some(Self::Trades),
            _ => None,
        }
    }

    pub fn button_data(self) -> &'static str {
        match self {
            Self::TopTraders => "top_traders",
            Self::Trades => "trades",
        }
    }

    /// Whether the flow collects a start and end time after the address.
    pub fn is_time_ranged(self) -> bool {
        matches!(self, Self::Trades)
    }

    pub fn title(self, token_name: &str) -> String {
        match self {
            Self::TopTraders => format!("📊 *Top Traders for {}*\n\n", escape_markdown(token_name)),
            Self::Trades => "📊 Query Results:\n\n".to_string(),
        }
    }

    pub fn render_row(self, row: &ResultRow) -> String {
        match self {
            Self::TopTraders => format!(
                "👤 `{}`\n💰 Profit: {} USD\n📈 ROI: {}\n---\n",
                cell(row, "trader_id"),
                fixed2(row, "profit_usd"),
                fixed2(row, "roi"),
            ),
            Self::Trades => format!(
                "⏰ {}\n👤 {}\n💠 {} — ${}\n\n",
                cell(row, "trade_date"),
                cell(row, "trader_id"),
                cell(row, "token_bought_symbol"),
                cell(row, "amount_usd"),
            ),
        }
    }

    /// How the inline result text is sent.
    pub fn result_format(self) -> TextFormat {
        match self {
            Self::TopTraders => TextFormat::Markdown,
            Self::Trades => TextFormat::Plain,
        }
    }

    pub fn policy(self, report: &ReportConfig) -> FormatPolicy {
        match self {
            Self::TopTraders => FormatPolicy {
                inline_row_limit: None,
                export: ExportPolicy::Never,
                max_inline_bytes: report.inline_text_max_bytes,
            },
            Self::Trades => FormatPolicy {
                inline_row_limit: Some(report.trades_inline_row_limit),
                export: ExportPolicy::Always,
                max_inline_bytes: report.inline_text_max_bytes,
            },
        }
    }

    pub fn export_filename(self, address: &str) -> String {
        format!("{}_{address}.csv", self.button_data())
    }

    pub fn format(
        self,
        rows: &[ResultRow],
        token_name: &str,
        address: &str,
        report: &ReportConfig,
    ) -> Result<FormattedResult, FormatError> {
        format_results(
            rows,
            &self.title(token_name),
            |row| self.render_row(row),
            &self.policy(report),
            &self.export_filename(address),
        )
    }
}

pub fn top_traders_params(address: &str) -> QueryParameters {
    QueryParameters::new().with("CA", address)
}

pub fn trades_params(address: &str, start: &str, end: &str) -> QueryParameters {
    QueryParameters::new()
        .with("contract address", address)
        .with("start time", start)
        .with("end time", end)
}

fn cell(row: &ResultRow, column: &str) -> String {
    match row.get(column) {
        None | Some(serde_json::Value::Null) => MISSING_CELL.to_string(),
        Some(_) => row.cell_text(column),
    }
}

fn fixed2(row: &ResultRow, column: &str) -> String {
    row.number(column)
        .map(|n| format!("{n:.2}"))
        .unwrap_or_else(|| MISSING_CELL.to_string())
}

/// Escape the characters legacy Telegram Markdown treats as markup.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
