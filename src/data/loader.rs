use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use thiserror::Error;

use super::model::{CellValue, Table};

/// Markers read as missing values, as a dataframe reader would.
const NA_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Delimiters tried by the sniffer, in tie-break order.
const DELIMITER_CANDIDATES: &[u8] = b",;\t|:";

/// Number of leading lines inspected when sniffing the delimiter.
const SNIFF_LINES: usize = 20;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported file format '{0}': expected a .csv, .xls or .xlsx file")]
    UnsupportedFormat(String),
    #[error("error while loading {file}: {cause}")]
    Parse { file: String, cause: String },
}

/// Source format, decided from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Delimited,
    Spreadsheet,
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a table from a file on disk.  Dispatch by extension.
pub fn load_file(path: &Path) -> Result<Table, LoadError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    // Reject the extension before touching the file.
    detect_format(&name)?;
    let bytes = std::fs::read(path).map_err(|e| LoadError::Parse {
        file: name.clone(),
        cause: e.to_string(),
    })?;
    load_bytes(&name, &bytes)
}

/// Load a table from an uploaded byte stream.
///
/// Supported formats:
/// * `.csv`          – delimited text, delimiter detected from content
/// * `.xls`, `.xlsx` – spreadsheet, first sheet only
pub fn load_bytes(file_name: &str, bytes: &[u8]) -> Result<Table, LoadError> {
    let format = detect_format(file_name)?;
    let parsed = match format {
        Format::Delimited => load_delimited(bytes),
        Format::Spreadsheet => load_spreadsheet(bytes),
    };

    parsed
        .map(|table| {
            log::info!(
                "Loaded {file_name}: {} rows, columns {:?}",
                table.height(),
                table.column_names().collect::<Vec<_>>()
            );
            table
        })
        .map_err(|e| LoadError::Parse {
            file: file_name.to_string(),
            cause: format!("{e:#}"),
        })
}

fn detect_format(file_name: &str) -> Result<Format, LoadError> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "csv" => Ok(Format::Delimited),
        "xls" | "xlsx" => Ok(Format::Spreadsheet),
        _ => Err(LoadError::UnsupportedFormat(file_name.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Delimited text loader
// ---------------------------------------------------------------------------

/// Header row followed by data rows, any common delimiter.
fn load_delimited(bytes: &[u8]) -> Result<Table> {
    let text = std::str::from_utf8(bytes).context("file is not valid UTF-8")?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    if text.trim().is_empty() {
        bail!("no columns to parse from file");
    }

    let delimiter = sniff_delimiter(text);
    log::debug!("Sniffed delimiter {:?}", delimiter as char);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .context("reading header row")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows: Vec<Vec<CellValue>> = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("row {}", row_no + 1))?;
        rows.push(record.iter().map(guess_cell_type).collect());
    }
    promote_mixed_numbers(&mut rows, headers.len());

    Ok(Table::from_rows(headers, rows)?)
}

/// A column holding both integers and floats becomes a float column, as a
/// dataframe reader would infer it.
fn promote_mixed_numbers(rows: &mut [Vec<CellValue>], width: usize) {
    for col in 0..width {
        let cells = || rows.iter().filter_map(|row| row.get(col));
        let has_float = cells().any(|v| matches!(v, CellValue::Float(_)));
        let has_integer = cells().any(|v| matches!(v, CellValue::Integer(_)));
        if !(has_float && has_integer) {
            continue;
        }
        for cell in rows.iter_mut().filter_map(|row| row.get_mut(col)) {
            if let CellValue::Integer(i) = *cell {
                *cell = CellValue::Float(i as f64);
            }
        }
    }
}

/// Pick the delimiter whose per-line count is consistent and highest.
///
/// Falls back to the candidate most frequent on the header line, then to a
/// comma for single-column files.
fn sniff_delimiter(text: &str) -> u8 {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();
    let Some(header) = lines.first() else {
        return b',';
    };

    let mut consistent: Option<(u8, usize)> = None;
    let mut on_header: Option<(u8, usize)> = None;

    for &candidate in DELIMITER_CANDIDATES {
        let first = count_unquoted(header, candidate);
        if first == 0 {
            continue;
        }
        if on_header.map_or(true, |(_, best)| first > best) {
            on_header = Some((candidate, first));
        }
        let steady = lines.iter().all(|l| count_unquoted(l, candidate) == first);
        if steady && consistent.map_or(true, |(_, best)| first > best) {
            consistent = Some((candidate, first));
        }
    }

    consistent.or(on_header).map(|(d, _)| d).unwrap_or(b',')
}

fn count_unquoted(line: &str, delimiter: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for &b in line.as_bytes() {
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if b == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

fn guess_cell_type(s: &str) -> CellValue {
    if NA_MARKERS.contains(&s) {
        return CellValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return CellValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        if f.is_nan() {
            return CellValue::Null;
        }
        return CellValue::Float(f);
    }
    match s {
        "true" | "True" | "TRUE" => CellValue::Bool(true),
        "false" | "False" | "FALSE" => CellValue::Bool(false),
        _ => CellValue::Text(s.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Spreadsheet loader
// ---------------------------------------------------------------------------

/// First sheet of any workbook format calamine recognises.  The first row
/// holds the column names.
fn load_spreadsheet(bytes: &[u8]) -> Result<Table> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).context("opening workbook")?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("workbook has no sheets"))?
        .context("reading first sheet")?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        bail!("first sheet is empty");
    };
    let headers: Vec<String> = header_row.iter().map(|c| c.to_string()).collect();
    let rows: Vec<Vec<CellValue>> = rows
        .map(|row| row.iter().map(spreadsheet_cell).collect())
        .collect();

    Ok(Table::from_rows(headers, rows)?)
}

fn spreadsheet_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Int(i) => CellValue::Integer(*i),
        // Spreadsheets store every number as a float.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => CellValue::Integer(*f as i64),
        Data::Float(f) if f.is_nan() => CellValue::Null,
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::String(s) if s.is_empty() => CellValue::Null,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Empty | Data::Error(_) => CellValue::Null,
        other => CellValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::from(s)
    }

    #[test]
    fn sniffs_common_delimiters() {
        assert_eq!(sniff_delimiter("a,b,c\n1,2,3\n"), b',');
        assert_eq!(sniff_delimiter("a;b;c\n1;2;3\n"), b';');
        assert_eq!(sniff_delimiter("a\tb\n1\t2\n"), b'\t');
        assert_eq!(sniff_delimiter("a|b\n1|2\n"), b'|');
        assert_eq!(sniff_delimiter("single\n1\n2\n"), b',');
    }

    #[test]
    fn sniffing_ignores_delimiters_inside_quotes() {
        let csv = "nom;ville\n\"Dupont, Jean\";Paris\n\"Martin, Luc\";Lyon\n";
        assert_eq!(sniff_delimiter(csv), b';');
    }

    #[test]
    fn loads_semicolon_csv_with_verbatim_headers() {
        let bytes = "\u{feff}pays_accueil; Statut ;demandeur_siret\nFR;actif;111\nDE;;222\n";
        let table = load_bytes("pro.CSV", bytes.as_bytes()).unwrap();
        assert_eq!(
            table.column_names().collect::<Vec<_>>(),
            vec!["pays_accueil", " Statut ", "demandeur_siret"]
        );
        assert_eq!(table.height(), 2);
        assert_eq!(
            table.column(" Statut ").unwrap().values,
            vec![text("actif"), CellValue::Null]
        );
        assert_eq!(
            table.column("demandeur_siret").unwrap().values,
            vec![CellValue::Integer(111), CellValue::Integer(222)]
        );
    }

    #[test]
    fn guesses_cell_types() {
        assert_eq!(guess_cell_type("NA"), CellValue::Null);
        assert_eq!(guess_cell_type("42"), CellValue::Integer(42));
        assert_eq!(guess_cell_type("4.5"), CellValue::Float(4.5));
        assert_eq!(guess_cell_type("True"), CellValue::Bool(true));
        assert_eq!(guess_cell_type(" FR"), text(" FR"));
    }

    #[test]
    fn mixed_integer_and_float_column_loads_as_floats() {
        let bytes = b"pays_accueil,EPLEFPA\nFR,2\nFR,1.5\nDE,2.0\n";
        let table = load_bytes("pro.csv", bytes).unwrap();
        let values = &table.column("EPLEFPA").unwrap().values;
        assert!(values.iter().all(|v| matches!(v, CellValue::Float(_))));
        assert_eq!(
            table.distinct_values("EPLEFPA").unwrap(),
            vec![CellValue::Float(1.5), CellValue::Float(2.0)]
        );
        // Text columns are left alone.
        assert!(matches!(
            table.column("pays_accueil").unwrap().values[0],
            CellValue::Text(_)
        ));
    }

    #[test]
    fn txt_extension_is_unsupported() {
        let err = load_bytes("participants.txt", b"a,b\n1,2\n").unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedFormat(name) if name == "participants.txt"));
    }

    #[test]
    fn ragged_csv_reports_the_cause() {
        let err = load_bytes("bad.csv", b"a,b\n1,2\n3,4,5\n").unwrap_err();
        match err {
            LoadError::Parse { file, cause } => {
                assert_eq!(file, "bad.csv");
                assert!(cause.contains("row 2"), "cause was: {cause}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_and_non_utf8_csv_fail_to_parse() {
        assert!(matches!(
            load_bytes("empty.csv", b"  \n").unwrap_err(),
            LoadError::Parse { .. }
        ));
        assert!(matches!(
            load_bytes("latin1.csv", b"pays\n\xe9t\xe9\n").unwrap_err(),
            LoadError::Parse { .. }
        ));
    }

    #[test]
    fn corrupt_spreadsheet_fails_to_parse() {
        let err = load_bytes("broken.xlsx", b"definitely not a workbook").unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_a_parse_error() {
        let err = load_file(Path::new("/nonexistent/dir/data.csv")).unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
    }
}
