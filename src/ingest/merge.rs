use super::extract::RawRecord;
use super::header::SubjectColumn;
use super::writes::{PendingWrite, UnitOfWork};
use crate::model::{Exam, ExamSubject, Grade, Student, DEFAULT_FULL_SCORE};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How an imported row is matched to an existing student.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchPolicy {
    /// Exact name, first match wins.
    #[default]
    ByName,
    /// Sheet student id when present and known, otherwise exact name.
    ByIdThenName,
}

impl MatchPolicy {
    pub fn find(&self, students: &[Student], record: &RawRecord) -> Option<usize> {
        let by_name = || students.iter().position(|s| s.name == record.name);
        match self {
            MatchPolicy::ByName => by_name(),
            MatchPolicy::ByIdThenName => record
                .id
                .as_deref()
                .and_then(|id| students.iter().position(|s| s.id == id))
                .or_else(by_name),
        }
    }
}

/// Exam the batch is merged into. `overwriting` means `id` was taken from an
/// existing exam with the same name and semester.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamTarget {
    pub id: String,
    pub name: String,
    pub date: String,
    pub semester: String,
    pub overwriting: bool,
}

#[derive(Debug)]
pub struct MergePlan {
    pub exam: Exam,
    pub work: UnitOfWork,
    pub created_students: usize,
    pub updated_count: usize,
}

pub fn generate_student_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("S{}{}", chrono::Utc::now().timestamp_millis(), &suffix[..5])
}

/// Builds the ordered writes for one import: one student write per record,
/// then (when overwriting) the exam delete, then the exam write.
///
/// Grades held under `target.id` by students missing from `records` are left
/// untouched.
pub fn plan_merge(
    records: &[RawRecord],
    subjects: &[SubjectColumn],
    mut students: Vec<Student>,
    target: &ExamTarget,
    policy: MatchPolicy,
) -> MergePlan {
    let exam = Exam {
        id: target.id.clone(),
        name: target.name.clone(),
        date: target.date.clone(),
        semester: target.semester.clone(),
        subjects: subjects
            .iter()
            .map(|s| ExamSubject {
                name: s.name.clone(),
                full_score: DEFAULT_FULL_SCORE,
            })
            .collect(),
    };

    let mut work = UnitOfWork::new();
    let mut created_students = 0;
    for record in records {
        let idx = match policy.find(&students, record) {
            Some(i) => i,
            None => {
                let id = record.id.clone().unwrap_or_else(generate_student_id);
                students.push(Student::new(id, record.name.clone()));
                created_students += 1;
                students.len() - 1
            }
        };

        let student = &mut students[idx];
        student.replace_grade(Grade {
            exam_id: exam.id.clone(),
            exam_name: exam.name.clone(),
            date: exam.date.clone(),
            semester: exam.semester.clone(),
            rank: record.total_rank,
            explicit_total_score: Some(record.total_score),
            subjects: record.subjects.clone(),
        });
        work.push(PendingWrite::PutStudent(student.clone()));
    }

    if target.overwriting {
        work.push(PendingWrite::DeleteExam(exam.id.clone()));
    }
    work.push(PendingWrite::PutExam(exam.clone()));

    MergePlan {
        exam,
        work,
        created_students,
        updated_count: records.len(),
    }
}
