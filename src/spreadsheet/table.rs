//! Reads CSV and Excel uploads into one row shape so the parser does not
//! care where a sheet came from.

use calamine::{Data, DataType, Reader, open_workbook_auto_from_rs};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::io::Cursor;

use super::layout::Columns;
use super::{Result, SpreadsheetError, SpreadsheetFormat};

/// One data row, numbered as a spreadsheet app shows it (header = row 1)
pub(crate) struct TableRow {
    pub number: usize,
    /// Cells, or why the row could not be read
    pub cells: std::result::Result<StringRecord, String>,
}

pub(crate) struct Table {
    pub columns: Columns,
    pub rows: Vec<TableRow>,
}

/// Header of the first sheet only, without parsing the data rows of a CSV
pub(crate) fn read_header(bytes: &[u8], format: SpreadsheetFormat) -> Result<Columns> {
    match format {
        SpreadsheetFormat::Csv => {
            let mut reader = ReaderBuilder::new().flexible(true).from_reader(bytes);
            Ok(Columns::new(reader.headers()?.iter()))
        }
        SpreadsheetFormat::Excel => Ok(read_excel(bytes)?.columns),
    }
}

pub(crate) fn read_table(bytes: &[u8], format: SpreadsheetFormat) -> Result<Table> {
    match format {
        SpreadsheetFormat::Csv => read_csv(bytes),
        SpreadsheetFormat::Excel => read_excel(bytes),
    }
}

fn read_csv(bytes: &[u8]) -> Result<Table> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(bytes);

    let columns = Columns::new(reader.headers()?.iter());
    let rows = reader
        .records()
        .enumerate()
        .map(|(i, result)| TableRow {
            number: i + 2,
            cells: result.map_err(|e| e.to_string()),
        })
        .collect();

    Ok(Table { columns, rows })
}

/// First worksheet of an xlsx/xls workbook; fully blank rows are left out
fn read_excel(bytes: &[u8]) -> Result<Table> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SpreadsheetError::EmptyWorkbook)??;

    // the used range may begin below row 1
    let first_row = range.start().map_or(0, |(row, _)| row as usize);
    let mut rows = range.rows().enumerate();

    let columns = match rows.next() {
        Some((_, header)) => {
            let names: Vec<String> = header.iter().map(cell_text).collect();
            Columns::new(names.iter().map(String::as_str))
        }
        None => Columns::new(std::iter::empty()),
    };

    let rows = rows
        .filter_map(|(i, cells)| {
            let cells: Vec<String> = cells.iter().map(cell_text).collect();
            if cells.iter().all(String::is_empty) {
                return None;
            }
            Some(TableRow {
                number: first_row + i + 1,
                cells: Ok(StringRecord::from(cells)),
            })
        })
        .collect();

    Ok(Table { columns, rows })
}

/// Cell as the text a CSV export of the sheet would carry.
/// Date cells become `%Y-%m-%d`.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) => s.trim().to_string(),
        Data::DateTime(_) => cell
            .as_date()
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| cell.to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

    fn workbook_bytes() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");

        sheet.write_string(0, 0, "Keyword_ID").unwrap();
        sheet.write_string(0, 1, "Date").unwrap();
        sheet.write_string(0, 2, "Clicks").unwrap();

        sheet.write_number(1, 0, 101.0).unwrap();
        let date = ExcelDateTime::from_ymd(2025, 11, 2).unwrap();
        sheet.write_datetime_with_format(1, 1, &date, &date_format).unwrap();
        sheet.write_number(1, 2, 31.0).unwrap();

        // row 3 left blank
        sheet.write_string(3, 0, " 102 ").unwrap();
        sheet.write_string(3, 1, "2025-11-03").unwrap();
        sheet.write_number(3, 2, 2.5).unwrap();

        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn excel_rows_read_as_text() {
        let table = read_table(&workbook_bytes(), SpreadsheetFormat::Excel).unwrap();

        assert_eq!(table.columns.names(), vec!["keyword_id", "date", "clicks"]);
        assert_eq!(table.rows.len(), 2);

        let first = &table.rows[0];
        assert_eq!(first.number, 2);
        let cells = first.cells.as_ref().unwrap();
        assert_eq!(cells.get(0), Some("101"));
        assert_eq!(cells.get(1), Some("2025-11-02"));
        assert_eq!(cells.get(2), Some("31"));

        let second = &table.rows[1];
        assert_eq!(second.number, 4);
        let cells = second.cells.as_ref().unwrap();
        assert_eq!(cells.get(0), Some("102"));
        assert_eq!(cells.get(2), Some("2.5"));
    }

    #[test]
    fn excel_header_only() {
        let columns = read_header(&workbook_bytes(), SpreadsheetFormat::Excel).unwrap();
        assert!(columns.has(&["keyword_id"]));
    }

    #[test]
    fn garbage_is_not_a_workbook() {
        let err = read_table(b"keyword_id,date\n", SpreadsheetFormat::Excel)
            .err()
            .unwrap();
        assert!(matches!(err, SpreadsheetError::Excel(_)));
    }

    #[test]
    fn csv_rows_are_numbered_from_two() {
        let table = read_table(b"a,b\n1,2\n3,4\n", SpreadsheetFormat::Csv).unwrap();
        let numbers: Vec<usize> = table.rows.iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![2, 3]);
    }
}
