//! Spreadsheet decoding: first sheet of a workbook (or a CSV file) as rows of cell text.

use anyhow::{anyhow, Context};
use calamine::{open_workbook_auto, Data, Range, Reader};
use std::path::Path;

pub type Rows = Vec<Vec<String>>;

pub fn read_first_sheet(path: &Path) -> anyhow::Result<Rows> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "csv" => read_csv(path),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook(path),
        _ => Err(anyhow!(
            "unsupported file type: .{} (expected .xlsx, .xls, .xlsb, .ods or .csv)",
            ext
        )),
    }
}

/// Exam name carried by a sheet file: the file name without its last extension.
pub fn exam_name_from_path(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file_name,
    }
}

fn read_workbook(path: &Path) -> anyhow::Result<Rows> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.to_string_lossy()))?;
    let Some(first) = workbook.sheet_names().first().cloned() else {
        return Err(anyhow!("workbook has no sheets"));
    };
    let range = workbook
        .worksheet_range(&first)
        .with_context(|| format!("failed to read sheet {first}"))?;
    Ok(range_to_rows(&range))
}

fn read_csv(path: &Path) -> anyhow::Result<Rows> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    // Excel writes a UTF-8 BOM in front of "CSV UTF-8" exports.
    let data = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_reader(data);

    let mut rows: Rows = Vec::new();
    for record in reader.records() {
        let record = record.context("failed to read CSV record")?;
        rows.push(record.iter().map(|f| f.to_string()).collect());
    }
    pad_to_widest(&mut rows);
    Ok(rows)
}

/// Calamine ranges start at the first used cell; pad back so indices match sheet
/// coordinates (row 0 = sheet row 1, column 0 = column A).
fn range_to_rows(range: &Range<Data>) -> Rows {
    let (row_offset, col_offset) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows: Rows = vec![Vec::new(); row_offset];
    for sheet_row in range.rows() {
        let mut row = vec![String::new(); col_offset];
        row.extend(sheet_row.iter().map(cell_to_string));
        rows.push(row);
    }
    pad_to_widest(&mut rows);
    rows
}

/// Makes the grid rectangular: missing cells become empty strings. An empty
/// cell right of a merged header label must survive.
fn pad_to_widest(rows: &mut Rows) {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    for row in rows.iter_mut() {
        row.resize(width, String::new());
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            // Avoid trailing ".0" for whole numbers
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                format!("{}", *f as i64)
            } else {
                format!("{}", f)
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
    }
}
