// File loading: CSV and spreadsheet exports into an untyped `Table`.
//
// Every cell is read as text. Typing (dates, statuses) happens later, after
// the columns have been mapped onto a canonical schema.
use crate::error::LoadError;
use crate::types::Table;
use calamine::{open_workbook, open_workbook_auto, Data, Reader, Xls, Xlsx};
use csv::ReaderBuilder;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::{debug, info, warn};

const DELIMITER_CANDIDATES: &[u8] = &[b',', b';', b'\t', b'|'];

/// Read any supported file, dispatching on the extension.
pub fn load_table(path: &Path) -> Result<Table, LoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    let table = match ext.as_str() {
        "csv" | "txt" => load_csv(path)?,
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => load_spreadsheet(path)?,
        _ => return Err(LoadError::UnsupportedFormat(path.to_path_buf())),
    };
    info!(
        path = %path.display(),
        rows = table.len(),
        columns = table.headers.len(),
        "file loaded"
    );
    Ok(table)
}

pub fn load_csv(path: &Path) -> Result<Table, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    csv_from_bytes(&bytes).map_err(|reason| LoadError::Unreadable {
        path: path.to_path_buf(),
        reason,
    })
}

/// Parse CSV bytes: sniffed delimiter with strict UTF-8 and strict row
/// lengths first, then one retry with `;`, lossy UTF-8 and ragged rows.
pub fn csv_from_bytes(bytes: &[u8]) -> Result<Table, String> {
    match read_csv_strict(bytes) {
        Ok(table) => Ok(table),
        Err(first) => {
            warn!(error = %first, "CSV read failed, retrying with ';' and lossy UTF-8");
            read_csv_fallback(bytes)
                .map_err(|second| format!("{first}; retry with ';' failed: {second}"))
        }
    }
}

fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// Pick the candidate delimiter that occurs most often in the header line.
pub fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or("");
    DELIMITER_CANDIDATES
        .iter()
        .copied()
        .map(|d| (d, header.bytes().filter(|b| *b == d).count()))
        .filter(|(_, n)| *n > 0)
        .max_by_key(|(_, n)| *n)
        .map(|(d, _)| d)
        .unwrap_or(b',')
}

fn read_csv_strict(bytes: &[u8]) -> Result<Table, String> {
    let text = std::str::from_utf8(bytes).map_err(|e| format!("invalid UTF-8: {e}"))?;
    let text = strip_bom(text);
    let delimiter = sniff_delimiter(text);
    let shown = delimiter as char;
    debug!(delimiter = ?shown, "sniffed CSV delimiter");

    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .map(str::to_string)
        .collect();
    check_headers(&headers)?;

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| e.to_string())?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(Table::new(headers, rows))
}

fn read_csv_fallback(bytes: &[u8]) -> Result<Table, String> {
    let text = String::from_utf8_lossy(bytes);
    let text = strip_bom(&text);
    let mut rdr = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .map(str::to_string)
        .collect();
    check_headers(&headers)?;

    let width = headers.len();
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| e.to_string())?;
        let mut row: Vec<String> = record.iter().take(width).map(str::to_string).collect();
        row.resize(width, String::new());
        rows.push(row);
    }
    Ok(Table::new(headers, rows))
}

fn check_headers(headers: &[String]) -> Result<(), String> {
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err("no header row".to_string());
    }
    Ok(())
}

/// Read the first worksheet of a spreadsheet. Format auto-detection first,
/// then explicit modern and legacy readers.
pub fn load_spreadsheet(path: &Path) -> Result<Table, LoadError> {
    let first = open_workbook_auto(path)
        .map_err(|e| e.to_string())
        .and_then(|mut wb| first_sheet(&mut wb));
    match first {
        Ok(table) => Ok(table),
        Err(first) => {
            warn!(path = %path.display(), error = %first, "spreadsheet read failed, retrying");
            let retry = open_workbook::<Xlsx<_>, _>(path)
                .map_err(|e| e.to_string())
                .and_then(|mut wb| first_sheet(&mut wb))
                .or_else(|_| {
                    open_workbook::<Xls<_>, _>(path)
                        .map_err(|e| e.to_string())
                        .and_then(|mut wb| first_sheet(&mut wb))
                });
            retry.map_err(|second| LoadError::Unreadable {
                path: path.to_path_buf(),
                reason: format!("{first}; retry failed: {second}"),
            })
        }
    }
}

fn first_sheet<RS, R>(workbook: &mut R) -> Result<Table, String>
where
    RS: Read + Seek,
    R: Reader<RS>,
    R::Error: std::fmt::Display,
{
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| "workbook has no sheets".to_string())?
        .map_err(|e| e.to_string())?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| "sheet is empty".to_string())?
        .iter()
        .map(cell_text)
        .collect();
    check_headers(&headers)?;

    let width = headers.len();
    let body = rows
        .map(|r| {
            let mut row: Vec<String> = r.iter().take(width).map(cell_text).collect();
            row.resize(width, String::new());
            row
        })
        .collect();
    Ok(Table::new(headers, body))
}

/// Render a spreadsheet cell as text. Dates become ISO strings and integral
/// floats lose their `.0`, so ids and CNPJs survive untouched.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTimeIso(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_semicolon() {
        assert_eq!(sniff_delimiter("empresa;vencimento;status\nA;1;2"), b';');
        assert_eq!(sniff_delimiter("a,b\n"), b',');
        assert_eq!(sniff_delimiter("single\n"), b',');
    }

    #[test]
    fn reads_sniffed_csv() {
        let t = csv_from_bytes(b"Empresa;Vencimento\nACME;10/01/2024\nBeta;11/01/2024\n").unwrap();
        assert_eq!(t.headers, vec!["Empresa", "Vencimento"]);
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.rows[1], vec!["Beta", "11/01/2024"]);
    }

    #[test]
    fn bom_is_stripped() {
        let t = csv_from_bytes("\u{feff}empresa,status\nACME,feito\n".as_bytes()).unwrap();
        assert_eq!(t.headers[0], "empresa");
    }

    #[test]
    fn latin1_bytes_fall_back_to_semicolon_lossy() {
        // "responsável" in Latin-1 is not valid UTF-8.
        let mut bytes = b"empresa;respons".to_vec();
        bytes.push(0xE1);
        bytes.extend_from_slice(b"vel\nACME;Ana\n");
        let t = csv_from_bytes(&bytes).unwrap();
        assert_eq!(t.headers.len(), 2);
        assert_eq!(t.rows[0], vec!["ACME", "Ana"]);
    }

    #[test]
    fn ragged_rows_are_padded_on_retry() {
        let t = csv_from_bytes(b"a;b;c\n1;2\n1;2;3;4\n").unwrap();
        assert_eq!(t.rows[0], vec!["1", "2", ""]);
        assert_eq!(t.rows[1], vec!["1", "2", "3"]);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(csv_from_bytes(b"").is_err());
    }

    #[test]
    fn spreadsheet_cells_render_as_text() {
        use calamine::{ExcelDateTime, ExcelDateTimeType};

        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(cell_text(&Data::String("ACME".into())), "ACME");
        assert_eq!(cell_text(&Data::Float(12345678000195.0)), "12345678000195");
        assert_eq!(cell_text(&Data::Float(42.0)), "42");
        assert_eq!(cell_text(&Data::Float(1.5)), "1.5");
        assert_eq!(cell_text(&Data::Int(7)), "7");
        assert_eq!(
            cell_text(&Data::DateTimeIso("2024-01-10T08:30:00".into())),
            "2024-01-10T08:30:00"
        );
        // Excel serial 45301 is 2024-01-10.
        let serial = ExcelDateTime::new(45301.0, ExcelDateTimeType::DateTime, false);
        assert_eq!(cell_text(&Data::DateTime(serial)), "2024-01-10");
    }

    #[test]
    fn corrupt_workbook_is_unreadable_after_retry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"this is not a zip archive").unwrap();
        match load_table(&path) {
            Err(LoadError::Unreadable { reason, .. }) => assert!(reason.contains("retry failed"), "{reason}"),
            other => panic!("expected Unreadable, got {other:?}"),
        }
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = load_table(Path::new("notes.pdf")).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedFormat(_)));
    }
}
