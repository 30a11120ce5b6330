//! CSV export of a complete result set.

use crate::error::FormatError;
use crate::query::ResultRow;

/// Full result set rendered as a downloadable table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularExport {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub row_count: usize,
    pub columns: Vec<String>,
}

/// Header and values of every row, in the first row's column order.
///
/// Every row must carry exactly the first row's column set; anything else
/// cannot be written under a single header.
pub fn write_csv(filename: &str, rows: &[ResultRow]) -> Result<TabularExport, FormatError> {
    let columns: Vec<String> = rows
        .first()
        .map(|row| row.columns().map(str::to_string).collect())
        .unwrap_or_default();

    if columns.is_empty() && !rows.is_empty() {
        return Err(FormatError::NoColumns { rows: rows.len() });
    }

    for (index, row) in rows.iter().enumerate().skip(1) {
        let same_set =
            row.len() == columns.len() && columns.iter().all(|c| row.get(c).is_some());
        if !same_set {
            return Err(FormatError::HeterogeneousColumns {
                row: index,
                expected: columns.join(", "),
                found: row.columns().collect::<Vec<_>>().join(", "),
            });
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    if !rows.is_empty() {
        writer.write_record(&columns)?;
        for row in rows {
            writer.write_record(columns.iter().map(|c| row.cell_text(c)))?;
        }
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| FormatError::Csv(e.to_string()))?;

    Ok(TabularExport {
        filename: filename.to_string(),
        bytes,
        row_count: rows.len(),
        columns,
    })
}
