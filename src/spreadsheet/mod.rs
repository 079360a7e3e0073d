//! Spreadsheet import: turns uploaded keyword reports into canonical records.
//!
//! CSV files and the first sheet of Excel workbooks are read the same way.
//! Two layouts are recognized (see [`Layout`]). A row that cannot be
//! parsed is reported as a [`RowError`] and dropped; only an unreadable file
//! or an unrecognized header fails the whole sheet.

mod layout;
mod table;
mod values;

pub use layout::{Columns, Layout};
pub use values::{derive_keyword_id, parse_amount, parse_count, parse_date};

use chrono::NaiveDate;
use csv::StringRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

use crate::records::{CanonicalPerformanceRecord, DataSource};
use layout::{
    AD_GROUP_ID, AD_GROUP_NAME, BID, CAMPAIGN_ID, CAMPAIGN_NAME, CLICKS, DATE, IMPRESSIONS,
    KEYWORD, KEYWORD_ID, MATCH_TYPE, ORDERS, SALES, SPEND, STATE, UNITS,
};

#[derive(Debug, Error)]
pub enum SpreadsheetError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Unrecognized spreadsheet layout, columns: {0:?}")]
    UnrecognizedLayout(Vec<String>),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Excel error: {0}")]
    Excel(#[from] calamine::Error),

    #[error("Workbook has no worksheets")]
    EmptyWorkbook,
}

pub type Result<T> = std::result::Result<T, SpreadsheetError>;

/// Spreadsheet container, decided by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    Csv,
    Excel,
}

impl SpreadsheetFormat {
    pub fn from_filename(filename: &str) -> Result<Self> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => Ok(SpreadsheetFormat::Csv),
            "xlsx" | "xls" => Ok(SpreadsheetFormat::Excel),
            "" => Err(SpreadsheetError::UnsupportedFormat(
                "file has no extension".to_string(),
            )),
            other => Err(SpreadsheetError::UnsupportedFormat(format!(".{}", other))),
        }
    }
}

/// A dropped row and why
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    /// 1-based line number, the header being row 1
    pub row: usize,
    pub message: String,
}

/// Per-import parsing context
#[derive(Debug, Clone)]
pub struct SheetOptions {
    pub profile_id: String,
    /// Date stamped on rows of layouts that carry no date column
    pub import_date: NaiveDate,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl SheetOptions {
    pub fn new(profile_id: impl Into<String>, import_date: NaiveDate) -> Self {
        Self {
            profile_id: profile_id.into(),
            import_date,
            start_date: None,
            end_date: None,
        }
    }

    fn in_range(&self, date: NaiveDate) -> bool {
        self.start_date.is_none_or(|start| date >= start)
            && self.end_date.is_none_or(|end| date <= end)
    }
}

#[derive(Debug, Clone)]
pub struct ParsedSheet {
    pub layout: Layout,
    pub records: Vec<CanonicalPerformanceRecord>,
    pub rejected: Vec<RowError>,
    /// Rows left out on purpose: no activity, inactive state, outside the date range
    pub skipped: usize,
}

impl ParsedSheet {
    pub fn total_rows(&self) -> usize {
        self.records.len() + self.rejected.len() + self.skipped
    }
}

/// Header check run before an import job is accepted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnCheck {
    pub detected: Vec<String>,
    pub missing: Vec<String>,
}

/// Inspect only the header row of an upload
pub fn validate_columns(bytes: &[u8], filename: &str) -> Result<ColumnCheck> {
    let columns = table::read_header(bytes, SpreadsheetFormat::from_filename(filename)?)?;

    Ok(ColumnCheck {
        detected: columns.names(),
        missing: columns.missing_required(),
    })
}

/// First rows of an upload as header -> cell maps, for a look before importing
#[derive(Debug, Clone, Serialize)]
pub struct SheetPreview {
    pub check: ColumnCheck,
    pub layout: Option<Layout>,
    pub total_rows: usize,
    /// (row number, cells by header) of the first rows
    pub rows: Vec<(usize, BTreeMap<String, String>)>,
}

pub fn preview_sheet(bytes: &[u8], filename: &str, max_rows: usize) -> Result<SheetPreview> {
    let table = table::read_table(bytes, SpreadsheetFormat::from_filename(filename)?)?;
    let names = table.columns.header();

    let rows = table
        .rows
        .iter()
        .filter_map(|row| Some((row.number, row.cells.as_ref().ok()?)))
        .take(max_rows)
        .map(|(number, cells)| {
            let data = names
                .iter()
                .zip(cells.iter())
                .filter(|(name, _)| !name.is_empty())
                .map(|(name, cell)| (name.clone(), cell.to_string()))
                .collect();
            (number, data)
        })
        .collect();

    Ok(SheetPreview {
        check: ColumnCheck {
            detected: table.columns.names(),
            missing: table.columns.missing_required(),
        },
        layout: table.columns.detect_layout(),
        total_rows: table.rows.len(),
        rows,
    })
}

/// Parse an uploaded sheet into canonical records
pub fn parse_spreadsheet(bytes: &[u8], filename: &str, options: &SheetOptions) -> Result<ParsedSheet> {
    let table = table::read_table(bytes, SpreadsheetFormat::from_filename(filename)?)?;
    parse_table(table, options)
}

enum RowOutcome {
    Parsed(Box<CanonicalPerformanceRecord>),
    Skipped,
}

pub fn parse_csv(bytes: &[u8], options: &SheetOptions) -> Result<ParsedSheet> {
    parse_table(table::read_table(bytes, SpreadsheetFormat::Csv)?, options)
}

fn parse_table(table: table::Table, options: &SheetOptions) -> Result<ParsedSheet> {
    let columns = table.columns;
    let layout = columns
        .detect_layout()
        .ok_or_else(|| SpreadsheetError::UnrecognizedLayout(columns.names()))?;

    let mut sheet = ParsedSheet {
        layout,
        records: Vec::new(),
        rejected: Vec::new(),
        skipped: 0,
    };

    for table::TableRow { number: row, cells } in table.rows {
        let outcome = cells.and_then(|record| parse_row(&Row::new(&columns, &record), layout, options));

        match outcome {
            Ok(RowOutcome::Parsed(record)) => sheet.records.push(*record),
            Ok(RowOutcome::Skipped) => sheet.skipped += 1,
            Err(message) => {
                debug!(row, %message, "Dropping spreadsheet row");
                sheet.rejected.push(RowError { row, message });
            }
        }
    }

    if !sheet.rejected.is_empty() {
        warn!(
            rejected = sheet.rejected.len(),
            parsed = sheet.records.len(),
            "Spreadsheet rows dropped"
        );
    }
    Ok(sheet)
}

struct Row<'a> {
    columns: &'a Columns,
    record: &'a StringRecord,
}

impl<'a> Row<'a> {
    fn new(columns: &'a Columns, record: &'a StringRecord) -> Self {
        Self { columns, record }
    }

    /// First non-empty cell among the aliases
    fn get(&self, aliases: &[&str]) -> Option<&'a str> {
        self.columns
            .positions(aliases)
            .into_iter()
            .filter_map(|i| self.record.get(i))
            .find(|cell| !cell.is_empty())
    }

    fn text(&self, aliases: &[&str]) -> Option<String> {
        self.get(aliases).map(str::to_string)
    }

    fn count(&self, aliases: &[&str], field: &str) -> std::result::Result<u64, String> {
        self.get(aliases)
            .map_or(Ok(0), parse_count)
            .map_err(|e| format!("{}: {}", field, e))
    }

    fn amount(&self, aliases: &[&str], field: &str) -> std::result::Result<f64, String> {
        self.get(aliases)
            .map_or(Ok(0.0), parse_amount)
            .map_err(|e| format!("{}: {}", field, e))
    }
}

fn parse_row(
    row: &Row<'_>,
    layout: Layout,
    options: &SheetOptions,
) -> std::result::Result<RowOutcome, String> {
    let state = row.text(STATE);

    let (keyword_id, keyword_text, match_type, date) = match layout {
        Layout::Standard => {
            let keyword_id = row.get(KEYWORD_ID).ok_or("missing keyword_id")?;
            let date = parse_date(row.get(DATE).ok_or("missing date")?)?;
            (
                keyword_id.to_string(),
                row.text(KEYWORD).unwrap_or_default(),
                row.text(MATCH_TYPE),
                date,
            )
        }
        Layout::ConsoleExport => {
            let keyword = row.get(KEYWORD).ok_or("missing keyword")?;
            let match_type = row.get(MATCH_TYPE).ok_or("missing match type")?;
            if state
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case("archived") || s.eq_ignore_ascii_case("paused"))
            {
                return Ok(RowOutcome::Skipped);
            }
            (
                derive_keyword_id(keyword, match_type),
                keyword.to_string(),
                Some(match_type.to_string()),
                options.import_date,
            )
        }
    };

    let impressions = row.count(IMPRESSIONS, "impressions")?;
    let clicks = row.count(CLICKS, "clicks")?;
    let spend = row.amount(SPEND, "spend")?;
    let sales = row.amount(SALES, "sales")?;

    if impressions == 0 && clicks == 0 && spend == 0.0 && sales == 0.0 {
        return Ok(RowOutcome::Skipped);
    }
    if !options.in_range(date) {
        return Ok(RowOutcome::Skipped);
    }

    Ok(RowOutcome::Parsed(Box::new(CanonicalPerformanceRecord {
        profile_id: options.profile_id.clone(),
        keyword_id,
        keyword_text,
        match_type: match_type
            .map(|m| m.to_uppercase())
            .unwrap_or_else(|| "UNKNOWN".to_string()),
        campaign_id: row.text(CAMPAIGN_ID),
        campaign_name: row.text(CAMPAIGN_NAME),
        ad_group_id: row.text(AD_GROUP_ID),
        ad_group_name: row.text(AD_GROUP_NAME),
        date,
        impressions,
        clicks,
        spend,
        sales,
        orders: row.count(ORDERS, "orders")?,
        units: row.count(UNITS, "units")?,
        bid: Some(row.amount(BID, "bid")?).filter(|bid| *bid > 0.0),
        state: state
            .map(|s| s.to_uppercase())
            .unwrap_or_else(|| "UNKNOWN".to_string()),
        source: DataSource::Upload,
    })))
}
