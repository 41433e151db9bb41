use super::extract::parse_leading_f64;
use crate::error::ImportError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Keywords recognised in header cells, matched by substring containment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeaderVocabulary {
    pub name: Vec<String>,
    pub student_id: Vec<String>,
    pub total_score: Vec<String>,
    pub total_rank: Vec<String>,
    /// Marks the score half of a merged subject header (row 2).
    pub score_marker: Vec<String>,
    /// Marks the rank half of a merged subject header (row 2).
    pub rank_marker: Vec<String>,
}

impl Default for HeaderVocabulary {
    fn default() -> Self {
        fn v(words: &[&str]) -> Vec<String> {
            words.iter().map(|w| w.to_string()).collect()
        }
        Self {
            name: v(&["姓名"]),
            student_id: v(&["学号"]),
            total_score: v(&["总分"]),
            total_rank: v(&["排名", "名次"]),
            score_marker: v(&["分"]),
            rank_marker: v(&["名"]),
        }
    }
}

fn contains_any(cell: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|k| !k.is_empty() && cell.contains(k.as_str()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectColumn {
    pub name: String,
    pub score_index: Option<usize>,
    pub rank_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap {
    pub name: usize,
    pub id: Option<usize>,
    pub total_score: Option<usize>,
    pub total_rank: Option<usize>,
    pub subjects: Vec<SubjectColumn>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderLayout {
    pub columns: ColumnMap,
    /// Index of the first student row: 1 without a sub-header, 2 with one.
    pub data_start_row: usize,
}

/// Row 2 is a sub-header when it is shorter than row 1 or any of its cells
/// does not start with a number. Missing cells count as empty.
///
/// `label_columns` (name and student id) hold text in an ordinary data row and
/// are left out. Trailing columns empty in both rows are padding, not cells.
pub fn is_sub_header<S: AsRef<str>>(row1: &[S], row2: &[S], label_columns: &[usize]) -> bool {
    if row2.len() < row1.len() {
        return true;
    }
    let used = |row: &[S]| {
        row.iter()
            .rposition(|c| !c.as_ref().trim().is_empty())
            .map_or(0, |i| i + 1)
    };
    let width = used(row1).max(used(row2));
    (0..width)
        .filter(|i| !label_columns.contains(i))
        .any(|i| {
            let cell = row2.get(i).map(|c| c.as_ref()).unwrap_or("");
            parse_leading_f64(cell).is_none()
        })
}

pub fn classify(
    row1: &[String],
    row2: &[String],
    vocab: &HeaderVocabulary,
) -> Result<HeaderLayout, ImportError> {
    let row1: Vec<&str> = row1.iter().map(|c| c.trim()).collect();
    let row2: Vec<&str> = row2.iter().map(|c| c.trim()).collect();
    let cell2 = |i: usize| row2.get(i).copied().unwrap_or("");

    let label_columns: Vec<usize> = row1
        .iter()
        .enumerate()
        .filter(|(_, h)| contains_any(h, &vocab.name) || contains_any(h, &vocab.student_id))
        .map(|(i, _)| i)
        .collect();
    let sub_header = is_sub_header(&row1, &row2, &label_columns);
    let data_start_row = if sub_header { 2 } else { 1 };

    let mut name = None;
    let mut id = None;
    let mut total_score = None;
    let mut total_rank = None;
    let mut subjects: Vec<SubjectColumn> = Vec::new();

    let mut i = 0;
    while i < row1.len() {
        let h1 = row1[i];
        if h1.is_empty() {
            i += 1;
            continue;
        }

        if contains_any(h1, &vocab.name) {
            name = Some(i);
        } else if contains_any(h1, &vocab.student_id) {
            id = Some(i);
        } else if contains_any(h1, &vocab.total_score) {
            total_score = Some(i);
        } else if contains_any(h1, &vocab.total_rank) {
            total_rank = Some(i);
        } else {
            let merged = sub_header && row1.get(i + 1).map(|c| c.is_empty()).unwrap_or(false);
            let mut subject = SubjectColumn {
                name: h1.to_string(),
                score_index: None,
                rank_index: None,
            };
            if merged {
                for j in [i, i + 1] {
                    let h2 = cell2(j);
                    if contains_any(h2, &vocab.score_marker) {
                        subject.score_index = Some(j);
                    }
                    if contains_any(h2, &vocab.rank_marker) {
                        subject.rank_index = Some(j);
                    }
                }
                // The empty neighbour belongs to this subject.
                i += 1;
            } else {
                subject.score_index = Some(i);
            }

            if subjects.iter().any(|s| s.name == subject.name) {
                warn!(subject = %subject.name, column = i, "duplicate subject header ignored");
            } else {
                subjects.push(subject);
            }
        }
        i += 1;
    }

    let Some(name) = name else {
        return Err(ImportError::MissingRequiredColumn {
            keyword: vocab.name.first().cloned().unwrap_or_default(),
        });
    };

    debug!(
        name,
        ?id,
        ?total_score,
        ?total_rank,
        subjects = subjects.len(),
        data_start_row,
        "classified header"
    );

    Ok(HeaderLayout {
        columns: ColumnMap {
            name,
            id,
            total_score,
            total_rank,
            subjects,
        },
        data_start_row,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn plain_header_with_numeric_second_row() {
        let layout = classify(
            &row(&["姓名", "语文", "数学", "总分"]),
            &row(&["123", "90", "80", "170"]),
            &HeaderVocabulary::default(),
        )
        .expect("classify");
        assert_eq!(layout.data_start_row, 1);
        assert_eq!(layout.columns.name, 0);
        assert_eq!(layout.columns.total_score, Some(3));
        assert_eq!(layout.columns.total_rank, None);
        assert_eq!(
            layout.columns.subjects,
            vec![
                SubjectColumn {
                    name: "语文".into(),
                    score_index: Some(1),
                    rank_index: None
                },
                SubjectColumn {
                    name: "数学".into(),
                    score_index: Some(2),
                    rank_index: None
                },
            ]
        );
    }

    #[test]
    fn merged_subject_headers_map_score_and_rank() {
        let layout = classify(
            &row(&["学号", "姓名", "语文", "", "数学", "", "总分", "名次"]),
            &row(&["", "", "分数", "排名", "排名", "得分", "", ""]),
            &HeaderVocabulary::default(),
        )
        .expect("classify");
        assert_eq!(layout.data_start_row, 2);
        assert_eq!(layout.columns.id, Some(0));
        assert_eq!(layout.columns.name, 1);
        assert_eq!(layout.columns.total_score, Some(6));
        assert_eq!(layout.columns.total_rank, Some(7));
        assert_eq!(layout.columns.subjects.len(), 2);
        assert_eq!(layout.columns.subjects[0].score_index, Some(2));
        assert_eq!(layout.columns.subjects[0].rank_index, Some(3));
        assert_eq!(layout.columns.subjects[1].score_index, Some(5));
        assert_eq!(layout.columns.subjects[1].rank_index, Some(4));
    }

    #[test]
    fn merged_pair_without_markers_has_no_score_column() {
        let layout = classify(
            &row(&["姓名", "英语", ""]),
            &row(&["", "A", "B"]),
            &HeaderVocabulary::default(),
        )
        .expect("classify");
        assert_eq!(layout.columns.subjects[0].score_index, None);
        assert_eq!(layout.columns.subjects[0].rank_index, None);
    }

    #[test]
    fn short_second_row_is_a_sub_header() {
        let r1 = row(&["姓名", "语文", "数学"]);
        let r2 = row(&["Alice", "90"]);
        assert!(is_sub_header(&r1, &r2, &[0]));
        assert!(!is_sub_header(&r1, &row(&["1", "90", "80.5"]), &[0]));
        assert_eq!(
            classify(&r1, &r2, &HeaderVocabulary::default())
                .expect("classify")
                .data_start_row,
            2
        );
    }

    #[test]
    fn trailing_empty_cell_without_sub_header_is_not_merged() {
        let layout = classify(
            &row(&["姓名", "语文", ""]),
            &row(&["1", "90", "3"]),
            &HeaderVocabulary::default(),
        )
        .expect("classify");
        assert_eq!(layout.data_start_row, 1);
        assert_eq!(layout.columns.subjects[0].score_index, Some(1));
    }

    #[test]
    fn missing_name_column_fails() {
        let e = classify(
            &row(&["学号", "语文"]),
            &row(&["1", "90"]),
            &HeaderVocabulary::default(),
        )
        .expect_err("no name column");
        assert!(matches!(e, ImportError::MissingRequiredColumn { ref keyword } if keyword == "姓名"));
    }

    #[test]
    fn duplicate_subject_keeps_first_column() {
        let layout = classify(
            &row(&["姓名", "语文", "语文"]),
            &row(&["1", "90", "91"]),
            &HeaderVocabulary::default(),
        )
        .expect("classify");
        assert_eq!(layout.columns.subjects.len(), 1);
        assert_eq!(layout.columns.subjects[0].score_index, Some(1));
    }

    #[test]
    fn student_name_in_second_row_is_data_not_sub_header() {
        let layout = classify(
            &row(&["学号", "姓名", "语文", "数学"]),
            &row(&["S001", "Alice", "90", "80"]),
            &HeaderVocabulary::default(),
        )
        .expect("classify");
        assert_eq!(layout.data_start_row, 1);
        assert_eq!(layout.columns.subjects.len(), 2);
    }

    #[test]
    fn padding_columns_do_not_make_a_sub_header() {
        let r1 = row(&["姓名", "语文", "", ""]);
        assert!(!is_sub_header(&r1, &row(&["Alice", "90", "", ""]), &[0]));
        assert!(is_sub_header(&r1, &row(&["Alice", "", "", ""]), &[0]));
    }

    #[test]
    fn merged_last_subject_in_padded_rows() {
        let layout = classify(
            &row(&["姓名", "语文", ""]),
            &row(&["", "排名", "分数"]),
            &HeaderVocabulary::default(),
        )
        .expect("classify");
        assert_eq!(layout.data_start_row, 2);
        assert_eq!(
            layout.columns.subjects,
            vec![SubjectColumn {
                name: "语文".into(),
                score_index: Some(2),
                rank_index: Some(1),
            }]
        );
    }

    #[test]
    fn custom_vocabulary_is_honoured() {
        let vocab = HeaderVocabulary {
            name: vec!["Name".into()],
            student_id: vec!["ID".into()],
            total_score: vec!["Total".into()],
            total_rank: vec!["Rank".into()],
            score_marker: vec!["Score".into()],
            rank_marker: vec!["Place".into()],
        };
        let layout = classify(
            &row(&["ID", "Name", "Math", "Total", "Rank"]),
            &row(&["7", "1", "90", "90", "1"]),
            &vocab,
        )
        .expect("classify");
        assert_eq!(layout.columns.id, Some(0));
        assert_eq!(layout.columns.name, 1);
        assert_eq!(layout.columns.total_score, Some(3));
        assert_eq!(layout.columns.total_rank, Some(4));
    }
}
