//! Spreadsheet grade ingestion: header classification, record extraction,
//! total aggregation, competition ranking and the merge into the record store.

pub mod aggregate;
pub mod extract;
pub mod header;
pub mod merge;
pub mod rank;
pub mod writes;

use crate::db::GradeStore;
use crate::error::ImportError;
use crate::model::Exam;
use crate::sheet;
use extract::RawRecord;
use header::{HeaderLayout, HeaderVocabulary};
use merge::{ExamTarget, MatchPolicy};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Asked before an existing exam (same name and semester) is overwritten.
pub trait ConfirmOverwrite {
    fn confirm_overwrite(&mut self, exam_name: &str) -> bool;
}

impl<F: FnMut(&str) -> bool> ConfirmOverwrite for F {
    fn confirm_overwrite(&mut self, exam_name: &str) -> bool {
        self(exam_name)
    }
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub exam_name: String,
    pub semester: String,
    /// `YYYY-MM-DD` stamped on the exam and every grade.
    pub date: String,
    pub vocabulary: HeaderVocabulary,
    pub match_policy: MatchPolicy,
}

impl ImportOptions {
    pub fn new(exam_name: impl Into<String>, semester: impl Into<String>) -> Self {
        Self {
            exam_name: exam_name.into(),
            semester: semester.into(),
            date: chrono::Utc::now().date_naive().to_string(),
            vocabulary: HeaderVocabulary::default(),
            match_policy: MatchPolicy::default(),
        }
    }
}

#[derive(Debug)]
pub struct ImportOutcome {
    pub exam: Exam,
    pub overwritten: bool,
    pub updated_count: usize,
    pub created_students: usize,
    pub recalculated_totals: bool,
}

/// Classifies the header and produces ranked records. Needs at least two rows.
pub fn build_records(
    rows: &[Vec<String>],
    vocab: &HeaderVocabulary,
) -> Result<(HeaderLayout, Vec<RawRecord>, bool), ImportError> {
    if rows.len() < 2 {
        return Err(ImportError::InsufficientData { rows: rows.len() });
    }
    let layout = header::classify(&rows[0], &rows[1], vocab)?;
    let mut records = extract::extract_records(rows, &layout);
    let recalculated = aggregate::aggregate_totals(&mut records);
    let ranked_totals = rank::rank_totals(&mut records);
    let ranked_subjects = rank::rank_subjects(&mut records, &layout.columns.subjects);
    info!(
        records = records.len(),
        subjects = layout.columns.subjects.len(),
        recalculated_totals = recalculated,
        ranked_totals,
        ranked_subjects = ?ranked_subjects,
        "sheet parsed"
    );
    Ok((layout, records, recalculated))
}

/// Looks up an exam with the same name and semester. When one exists the
/// caller must confirm; a refusal stops the import before anything is read
/// or written.
pub fn resolve_target(
    store: &dyn GradeStore,
    opts: &ImportOptions,
    confirm: &mut dyn ConfirmOverwrite,
) -> Result<ExamTarget, ImportError> {
    let exams = store.get_all_exams().map_err(ImportError::storage)?;
    let existing = exams
        .iter()
        .find(|e| e.name == opts.exam_name && e.semester == opts.semester);

    let (id, overwriting) = match existing {
        Some(e) => {
            if !confirm.confirm_overwrite(&opts.exam_name) {
                return Err(ImportError::OverwriteDeclined {
                    exam_id: e.id.clone(),
                    exam_name: e.name.clone(),
                });
            }
            (e.id.clone(), true)
        }
        None => (Uuid::new_v4().to_string(), false),
    };

    Ok(ExamTarget {
        id,
        name: opts.exam_name.clone(),
        date: opts.date.clone(),
        semester: opts.semester.clone(),
        overwriting,
    })
}

pub fn import_file(
    store: &dyn GradeStore,
    path: &Path,
    opts: &ImportOptions,
    confirm: &mut dyn ConfirmOverwrite,
) -> Result<ImportOutcome, ImportError> {
    let target = resolve_target(store, opts, confirm)?;
    let rows = sheet::read_first_sheet(path).map_err(|e| ImportError::FileRead {
        message: format!("{e:#}"),
    })?;
    merge_rows(store, &rows, target, opts)
}

fn merge_rows(
    store: &dyn GradeStore,
    rows: &[Vec<String>],
    target: ExamTarget,
    opts: &ImportOptions,
) -> Result<ImportOutcome, ImportError> {
    let (layout, records, recalculated_totals) = build_records(rows, &opts.vocabulary)?;

    let students = store.get_all_students().map_err(ImportError::storage)?;
    let plan = merge::plan_merge(
        &records,
        &layout.columns.subjects,
        students,
        &target,
        opts.match_policy,
    );
    let writes = plan.work.len();
    plan.work.apply(store).into_result()?;

    info!(
        exam_id = %plan.exam.id,
        exam = %plan.exam.name,
        overwritten = target.overwriting,
        students = plan.updated_count,
        created = plan.created_students,
        writes,
        "import applied"
    );

    Ok(ImportOutcome {
        exam: plan.exam,
        overwritten: target.overwriting,
        updated_count: plan.updated_count,
        created_students: plan.created_students,
        recalculated_totals,
    })
}
