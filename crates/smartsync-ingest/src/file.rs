//! Decoding of uploaded files into raw rows.
//!
//! Delimited text is parsed straight from memory; bytes that are not UTF-8
//! (legacy POS exports) are replaced per field rather than failing the file.
//! Workbooks are written to a
//! scoped temporary file that is removed when the guard drops, on success and
//! on every error path.

use std::io::Write;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use serde_json::Value;

use crate::{error::IngestError, RawRow};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Delimited,
    Workbook,
}

/// Picks a decoder from the file extension, falling back to magic bytes.
#[must_use]
pub fn sniff_format(file_name: Option<&str>, bytes: &[u8]) -> FileFormat {
    match extension(file_name).as_deref() {
        Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => FileFormat::Workbook,
        Some("csv" | "tsv" | "txt") => FileFormat::Delimited,
        _ if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) => FileFormat::Workbook,
        _ => FileFormat::Delimited,
    }
}

/// Decodes file bytes into rows keyed by the file's header row.
///
/// # Errors
///
/// Returns [`IngestError`] when the bytes are not a readable CSV or workbook,
/// or when the scratch file cannot be written.
pub fn decode_file(file_name: Option<&str>, bytes: &[u8]) -> Result<Vec<RawRow>, IngestError> {
    decode_file_in(&std::env::temp_dir(), file_name, bytes)
}

/// Same as [`decode_file`], placing any scratch file under `scratch_dir`.
///
/// # Errors
///
/// See [`decode_file`].
pub fn decode_file_in(
    scratch_dir: &Path,
    file_name: Option<&str>,
    bytes: &[u8],
) -> Result<Vec<RawRow>, IngestError> {
    match sniff_format(file_name, bytes) {
        FileFormat::Delimited => decode_delimited(bytes),
        FileFormat::Workbook => decode_workbook(scratch_dir, file_name, bytes),
    }
}

fn decode_delimited(bytes: &[u8]) -> Result<Vec<RawRow>, IngestError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(bytes))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .byte_headers()?
        .iter()
        .enumerate()
        .map(|(idx, h)| header_or_placeholder(&String::from_utf8_lossy(h), idx))
        .collect();

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record?;
        if record.iter().all(<[u8]>::is_empty) {
            continue;
        }
        let row: RawRow = headers
            .iter()
            .enumerate()
            .map(|(idx, header)| {
                let value = record.get(idx).map_or(Value::Null, |v| {
                    Value::String(String::from_utf8_lossy(v).into_owned())
                });
                (header.clone(), value)
            })
            .collect();
        rows.push(row);
    }

    Ok(rows)
}

fn decode_workbook(
    scratch_dir: &Path,
    file_name: Option<&str>,
    bytes: &[u8],
) -> Result<Vec<RawRow>, IngestError> {
    let suffix = format!(".{}", workbook_extension(file_name, bytes));
    let mut scratch = tempfile::Builder::new()
        .prefix("smartsync-upload-")
        .suffix(&suffix)
        .tempfile_in(scratch_dir)?;
    scratch.write_all(bytes)?;
    scratch.flush()?;

    let mut workbook = open_workbook_auto(scratch.path())?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(IngestError::NoWorksheet)??;

    let mut lines = range.rows();
    let Some(header_cells) = lines.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = header_cells
        .iter()
        .enumerate()
        .map(|(idx, cell)| header_or_placeholder(&cell.to_string(), idx))
        .collect();

    let rows = lines
        .filter(|cells| cells.iter().any(|c| !matches!(c, Data::Empty)))
        .map(|cells| {
            headers
                .iter()
                .enumerate()
                .map(|(idx, header)| {
                    let value = cells.get(idx).map_or(Value::Null, cell_to_value);
                    (header.clone(), value)
                })
                .collect::<RawRow>()
        })
        .collect();

    Ok(rows)
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => float_to_value(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

/// Spreadsheets store every number as a float; whole values come back as
/// integers so numeric SKU columns do not grow a `.0` suffix.
#[allow(clippy::cast_possible_truncation)]
fn float_to_value(f: f64) -> Value {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if f.fract() == 0.0 && f.abs() < MAX_EXACT {
        Value::from(f as i64)
    } else {
        serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)
    }
}

fn header_or_placeholder(raw: &str, idx: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        format!("column_{}", idx + 1)
    } else {
        trimmed.to_owned()
    }
}

/// Chooses `,`, `;`, or tab by frequency in the first line.
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    [b',', b';', b'\t']
        .into_iter()
        .map(|d| (d, first_line.iter().filter(|b| **b == d).count()))
        .filter(|(_, count)| *count > 0)
        .max_by_key(|(_, count)| *count)
        .map_or(b',', |(d, _)| d)
}

fn extension(file_name: Option<&str>) -> Option<String> {
    file_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

fn workbook_extension(file_name: Option<&str>, bytes: &[u8]) -> String {
    match extension(file_name) {
        Some(ext) if matches!(ext.as_str(), "xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => ext,
        _ if bytes.starts_with(OLE_MAGIC) => "xls".to_owned(),
        _ => "xlsx".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sniffs_by_extension_then_magic() {
        assert_eq!(sniff_format(Some("stock.XLSX"), b""), FileFormat::Workbook);
        assert_eq!(sniff_format(Some("stock.csv"), ZIP_MAGIC), FileFormat::Delimited);
        assert_eq!(sniff_format(None, b"PK\x03\x04rest"), FileFormat::Workbook);
        assert_eq!(sniff_format(None, b"sku,qty\n"), FileFormat::Delimited);
    }

    #[test]
    fn decodes_csv_preserving_header_order() {
        let rows = decode_file(Some("feed.csv"), b"ItemCode,QOH,MRP\nSKU001,50,19.99\n").unwrap();
        assert_eq!(rows.len(), 1);
        let headers: Vec<&String> = rows[0].keys().collect();
        assert_eq!(headers, ["ItemCode", "QOH", "MRP"]);
        assert_eq!(rows[0]["QOH"], json!("50"));
    }

    #[test]
    fn decodes_semicolon_delimited_with_bom() {
        let rows = decode_file(None, b"\xEF\xBB\xBFsku;qty\nA;1\nB;2\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["sku"], json!("B"));
    }

    #[test]
    fn ragged_rows_fill_missing_cells_with_null() {
        let rows = decode_file(None, b"sku,qty,price\nA,1\n").unwrap();
        assert_eq!(rows[0]["price"], Value::Null);
    }

    #[test]
    fn blank_rows_and_headers_are_handled() {
        let rows = decode_file(None, b"sku,,qty\n,,\nA,x,3\n").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["column_2"], json!("x"));
    }

    #[test]
    fn non_utf8_bytes_are_replaced_per_field() {
        let rows = decode_file(Some("pos.csv"), b"sku,qty,name\nA,1,Caf\xe9\nB,2,Tea\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["sku"], json!("A"));
        assert_eq!(rows[0]["name"], json!("Caf\u{FFFD}"));
        assert_eq!(rows[1]["name"], json!("Tea"));
    }

    #[test]
    fn decodes_first_worksheet_of_a_workbook() {
        let bytes = include_bytes!("../tests/data/stock.xlsx");
        let rows = decode_file(Some("stock.xlsx"), bytes).unwrap();
        assert_eq!(rows.len(), 2, "blank row must be skipped: {rows:?}");

        let headers: Vec<&String> = rows[0].keys().collect();
        assert_eq!(headers, ["ItemCode", "QOH", "column_3", "MRP"]);

        assert_eq!(rows[0]["ItemCode"], json!("SKU001"));
        assert_eq!(rows[0]["QOH"], json!(50));
        assert_eq!(rows[0]["column_3"], json!("note"));
        assert_eq!(rows[0]["MRP"], json!(19.99));

        assert_eq!(rows[1]["ItemCode"], json!(1042));
        assert_eq!(rows[1]["QOH"], json!(3));
        assert_eq!(rows[1]["MRP"], Value::Null);
    }

    #[test]
    fn workbook_is_sniffed_without_a_file_name() {
        let bytes = include_bytes!("../tests/data/stock.xlsx");
        assert_eq!(sniff_format(None, bytes), FileFormat::Workbook);
        let rows = decode_file(None, bytes).unwrap();
        assert_eq!(rows[0]["ItemCode"], json!("SKU001"));
    }

    #[test]
    fn whole_floats_become_integers() {
        assert_eq!(float_to_value(1042.0), json!(1042));
        assert_eq!(float_to_value(19.5), json!(19.5));
    }

    #[test]
    fn scratch_file_is_removed_after_failed_workbook_decode() {
        let dir = tempfile::tempdir().unwrap();
        let result = decode_file_in(dir.path(), Some("broken.xlsx"), b"PK\x03\x04not a zip");
        assert!(result.is_err());
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 0, "scratch file must not outlive the decode");
    }
}
