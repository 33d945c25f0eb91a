use calamine::{Data, Reader, open_workbook_auto_from_rs};
use log::debug;
use std::io::Cursor;
use std::path::Path;

use crate::error::{InventoryError, Result};
use crate::product::ImportRow;

// Column headers consumed by a batch import (exact, case-sensitive)
pub const ITEM_NAME_HEADER: &str = "Item Name";
pub const QUANTITY_HEADER: &str = "Quantity";
pub const CATEGORY_HEADER: &str = "Category";

/// Decode an uploaded spreadsheet into import rows
///
/// The file name's extension picks the decoder: `csv` goes through the CSV
/// parser, anything else is handed to calamine, which detects xlsx, xlsm, xls
/// and ods on its own.
///
/// # Arguments
/// * `file_name` - Name of the uploaded file (only the extension is used)
/// * `bytes` - Raw file contents
///
/// # Returns
/// * `Result<Vec<ImportRow>>` - One row per non-blank data row, or a decode error
///
/// # Examples
/// ```
/// use inventory::loader::decode_rows;
///
/// let csv = b"S/N,Item Name,Quantity,Category\n1,Rice,10,Food Stuff\n";
/// let rows = decode_rows("stock.csv", csv).unwrap();
/// assert_eq!(rows[0].item_name.as_deref(), Some("Rice"));
/// assert_eq!(rows[0].quantity.as_deref(), Some("10"));
/// ```
pub fn decode_rows(file_name: &str, bytes: &[u8]) -> Result<Vec<ImportRow>> {
    if bytes.is_empty() {
        return Err(InventoryError::Decode("file is empty".to_string()));
    }

    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    let table = match extension.as_deref() {
        Some("csv") => csv_table(bytes)?,
        _ => workbook_table(bytes)?,
    };

    let rows = rows_from_table(table)?;
    debug!("decoded {} rows from {}", rows.len(), file_name);
    Ok(rows)
}

/// Turn a header row plus data rows into import rows
fn rows_from_table(table: Vec<Vec<Option<String>>>) -> Result<Vec<ImportRow>> {
    let mut table = table.into_iter();
    let header = table
        .next()
        .ok_or_else(|| InventoryError::Decode("sheet has no header row".to_string()))?;

    let column = |name: &str| {
        header
            .iter()
            .position(|cell| cell.as_deref() == Some(name))
    };
    let name_col = column(ITEM_NAME_HEADER);
    let quantity_col = column(QUANTITY_HEADER);
    let category_col = column(CATEGORY_HEADER);

    let field = |row: &[Option<String>], col: Option<usize>| {
        col.and_then(|c| row.get(c).cloned().flatten())
    };

    Ok(table
        .filter(|row| row.iter().any(Option::is_some))
        .map(|row| ImportRow {
            item_name: field(row.as_slice(), name_col),
            quantity: field(row.as_slice(), quantity_col),
            category: field(row.as_slice(), category_col),
        })
        .collect())
}

fn workbook_table(bytes: &[u8]) -> Result<Vec<Vec<Option<String>>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| InventoryError::Decode(e.to_string()))?;

    // Only the first worksheet is read
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| InventoryError::Decode("no sheets found in workbook".to_string()))?
        .map_err(|e| InventoryError::Decode(e.to_string()))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

/// Render a cell as text; blank cells are `None`
fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty => return None,
        Data::String(s) => s.clone(),
        // Whole numbers lose their ".0" so "10" and 10.0 import alike
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn csv_table(bytes: &[u8]) -> Result<Vec<Vec<Option<String>>>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| InventoryError::Decode(format!("CSV is not valid UTF-8: {}", e)))?;
    // Spreadsheet tools like to prefix a byte order mark
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    Ok(text
        .lines()
        .map(|line| {
            parse_csv_row(line)
                .into_iter()
                .map(|field| {
                    let field = field.trim();
                    (!field.is_empty()).then(|| field.to_string())
                })
                .collect()
        })
        .collect())
}

// Parse a CSV row into a vector of strings
fn parse_csv_row(line: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    // Double quote inside quoted field - add a single quote
                    current_field.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                result.push(std::mem::take(&mut current_field));
            }
            _ => current_field.push(c),
        }
    }

    // Add the last field
    result.push(current_field);
    result
}
