//! Result formatting.
//!
//! A result set becomes an inline chat view plus, depending on the flow's
//! policy, a CSV export of every row. Formatting happens before anything
//! is sent, so a result that cannot be exported never produces a partial
//! reply.

mod export;

use crate::error::FormatError;
use crate::query::ResultRow;

pub use self::export::{TabularExport, write_csv};

/// When a flow attaches the full result set as a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPolicy {
    Never,
    /// Whenever there is at least one row.
    Always,
    /// When the inline view does not show every row.
    WhenIncomplete,
}

/// Per-flow formatting rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatPolicy {
    /// Rows rendered inline; `None` renders all of them.
    pub inline_row_limit: Option<usize>,
    pub export: ExportPolicy,
    /// Inline texts longer than this (in bytes) are replaced by a notice.
    pub max_inline_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineView {
    NoResults,
    Text(String),
    TooLarge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedResult {
    pub inline: InlineView,
    pub export: Option<TabularExport>,
}

impl FormattedResult {
    fn no_results() -> Self {
        Self {
            inline: InlineView::NoResults,
            export: None,
        }
    }
}

/// Render `rows` under `title` according to `policy`.
///
/// The export, when produced, always covers every row regardless of the
/// inline limit and byte budget.
pub fn format_results<F>(
    rows: &[ResultRow],
    title: &str,
    render_row: F,
    policy: &FormatPolicy,
    export_filename: &str,
) -> Result<FormattedResult, FormatError>
where
    F: Fn(&ResultRow) -> String,
{
    // Rows without a single column carry nothing to show or export.
    if rows.iter().all(ResultRow::is_empty) {
        return Ok(FormattedResult::no_results());
    }

    let shown = policy
        .inline_row_limit
        .map_or(rows.len(), |limit| limit.min(rows.len()));
    let mut text = String::from(title);
    for row in &rows[..shown] {
        text.push_str(&render_row(row));
    }

    let inline = if text.len() > policy.max_inline_bytes {
        tracing::debug!(
            bytes = text.len(),
            budget = policy.max_inline_bytes,
            "Inline result exceeds budget"
        );
        InlineView::TooLarge
    } else {
        InlineView::Text(text)
    };

    let complete = shown == rows.len() && matches!(inline, InlineView::Text(_));
    let wants_export = match policy.export {
        ExportPolicy::Never => false,
        ExportPolicy::Always => true,
        ExportPolicy::WhenIncomplete => !complete,
    };
    let export = if wants_export {
        Some(write_csv(export_filename, rows)?)
    } else {
        None
    };

    Ok(FormattedResult { inline, export })
}
