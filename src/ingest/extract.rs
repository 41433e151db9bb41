use super::header::HeaderLayout;
use crate::model::SubjectScore;

/// One student row as read from the sheet, before totals and ranks are settled.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub name: String,
    pub id: Option<String>,
    pub explicit_total_score: Option<f64>,
    pub explicit_total_rank: Option<u32>,
    pub subjects: Vec<SubjectScore>,
    pub total_score: f64,
    pub total_rank: Option<u32>,
}

impl RawRecord {
    pub fn subject(&self, name: &str) -> Option<&SubjectScore> {
        self.subjects.iter().find(|s| s.name == name)
    }
}

/// Parses the longest numeric prefix of a cell, the way spreadsheet exports are
/// usually read: `"88.5分"` is 88.5, `"缺考"` is nothing.
pub fn parse_leading_f64(cell: &str) -> Option<f64> {
    let s = cell.trim_start();
    let b = s.as_bytes();
    let mut end = 0;
    if end < b.len() && (b[end] == b'+' || b[end] == b'-') {
        end += 1;
    }
    let int_start = end;
    while end < b.len() && b[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    if end < b.len() && b[end] == b'.' {
        let frac_start = end + 1;
        let mut k = frac_start;
        while k < b.len() && b[k].is_ascii_digit() {
            k += 1;
        }
        digits += k - frac_start;
        if digits > 0 {
            end = k;
        }
    }
    if digits == 0 {
        return None;
    }
    if end < b.len() && (b[end] == b'e' || b[end] == b'E') {
        let mut k = end + 1;
        if k < b.len() && (b[k] == b'+' || b[k] == b'-') {
            k += 1;
        }
        let exp_start = k;
        while k < b.len() && b[k].is_ascii_digit() {
            k += 1;
        }
        if k > exp_start {
            end = k;
        }
    }
    s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integer prefix of a cell (`"3.0"` is 3). Ranks below 1 are not ranks.
pub fn parse_rank(cell: &str) -> Option<u32> {
    let s = cell.trim_start();
    let digits = s.strip_prefix('+').unwrap_or(s);
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(digits.len());
    digits[..end].parse::<u32>().ok().filter(|r| *r >= 1)
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(|c| c.as_str()).unwrap_or("")
}

pub fn extract_records(rows: &[Vec<String>], layout: &HeaderLayout) -> Vec<RawRecord> {
    let cols = &layout.columns;
    rows.iter()
        .skip(layout.data_start_row)
        .filter_map(|row| {
            let name = cell(row, cols.name).trim();
            if name.is_empty() {
                return None;
            }

            let subjects = cols
                .subjects
                .iter()
                .filter_map(|s| {
                    let score = parse_leading_f64(cell(row, s.score_index?))?;
                    Some(SubjectScore {
                        name: s.name.clone(),
                        score: Some(score),
                        rank: s.rank_index.and_then(|i| parse_rank(cell(row, i))),
                    })
                })
                .collect();

            Some(RawRecord {
                name: name.to_string(),
                id: cols
                    .id
                    .map(|i| cell(row, i).trim())
                    .filter(|v| !v.is_empty())
                    .map(str::to_string),
                explicit_total_score: cols.total_score.and_then(|i| parse_leading_f64(cell(row, i))),
                explicit_total_rank: cols.total_rank.and_then(|i| parse_rank(cell(row, i))),
                subjects,
                total_score: 0.0,
                total_rank: None,
            })
        })
        .collect()
}
