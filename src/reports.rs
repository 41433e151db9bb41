use crate::ingest::rank::assign_ranks;
use crate::model::{Exam, Student};
use serde::Serialize;

/// Rank used for ordering when a grade has none.
const UNRANKED_SORT_KEY: u32 = 999;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectCell {
    pub name: String,
    pub score: Option<f64>,
    pub rank: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRow {
    pub student_id: String,
    pub student_name: String,
    pub rank: Option<u32>,
    /// One entry per exam subject, in exam order; `None` when the student has no score.
    pub subjects: Vec<Option<SubjectCell>>,
    pub total_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRankRow {
    pub rank: u32,
    pub student_id: String,
    pub student_name: String,
    pub score: Option<f64>,
}

/// Exams of one semester, newest first.
pub fn semester_exams(exams: Vec<Exam>, semester: &str) -> Vec<Exam> {
    let mut out: Vec<Exam> = exams.into_iter().filter(|e| e.semester == semester).collect();
    out.sort_by(|a, b| b.date.cmp(&a.date));
    out
}

/// Full results table of one exam, ordered by total rank (unranked last).
pub fn exam_results(exam: &Exam, students: &[Student]) -> Vec<ResultRow> {
    let mut rows: Vec<ResultRow> = students
        .iter()
        .filter_map(|s| {
            let grade = s.grade_for(&exam.id)?;
            Some(ResultRow {
                student_id: s.id.clone(),
                student_name: s.name.clone(),
                rank: grade.rank,
                subjects: exam
                    .subjects
                    .iter()
                    .map(|es| {
                        grade.subject(&es.name).map(|gs| SubjectCell {
                            name: gs.name.clone(),
                            score: gs.score,
                            rank: gs.rank,
                        })
                    })
                    .collect(),
                total_score: grade.total_score(),
            })
        })
        .collect();
    rows.sort_by_key(|r| r.rank.unwrap_or(UNRANKED_SORT_KEY));
    rows
}

/// Students holding `subject` in `exam_id`, best score first, competition-ranked.
pub fn subject_ranking(exam_id: &str, subject: &str, students: &[Student]) -> Vec<SubjectRankRow> {
    let mut holders: Vec<(&Student, Option<f64>)> = students
        .iter()
        .filter_map(|s| {
            let score = s.grade_for(exam_id)?.subject(subject)?.score;
            Some((s, score))
        })
        .collect();
    holders.sort_by(|a, b| {
        let ka = a.1.unwrap_or(f64::NEG_INFINITY);
        let kb = b.1.unwrap_or(f64::NEG_INFINITY);
        kb.total_cmp(&ka)
    });

    let scores: Vec<Option<f64>> = holders.iter().map(|(_, score)| *score).collect();
    holders
        .iter()
        .zip(assign_ranks(&scores))
        .map(|((s, score), rank)| SubjectRankRow {
            rank,
            student_id: s.id.clone(),
            student_name: s.name.clone(),
            score: *score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExamSubject, Grade, SubjectScore};

    fn exam(id: &str, semester: &str, date: &str) -> Exam {
        Exam {
            id: id.into(),
            name: format!("exam {id}"),
            date: date.into(),
            semester: semester.into(),
            subjects: vec![
                ExamSubject {
                    name: "语文".into(),
                    full_score: 100.0,
                },
                ExamSubject {
                    name: "数学".into(),
                    full_score: 100.0,
                },
            ],
        }
    }

    fn student(name: &str, rank: Option<u32>, total: Option<f64>, scores: &[(&str, f64)]) -> Student {
        let mut s = Student::new(format!("id-{name}"), name.into());
        s.replace_grade(Grade {
            exam_id: "e1".into(),
            exam_name: "exam e1".into(),
            date: "2024-11-02".into(),
            semester: "2024-2025-1".into(),
            rank,
            explicit_total_score: total,
            subjects: scores
                .iter()
                .map(|(n, v)| SubjectScore {
                    name: n.to_string(),
                    score: Some(*v),
                    rank: None,
                })
                .collect(),
        });
        s
    }

    #[test]
    fn semester_exams_filters_and_sorts_newest_first() {
        let out = semester_exams(
            vec![
                exam("a", "S1", "2024-09-01"),
                exam("b", "S2", "2024-10-01"),
                exam("c", "S1", "2024-11-01"),
            ],
            "S1",
        );
        let ids: Vec<&str> = out.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn results_sorted_by_rank_with_unranked_last() {
        let students = vec![
            student("Zed", None, None, &[("语文", 50.0)]),
            student("Bob", Some(2), Some(150.0), &[("语文", 70.0), ("数学", 80.0)]),
            student("Amy", Some(1), Some(180.0), &[("语文", 90.0), ("数学", 90.0)]),
            Student::new("x".into(), "NoGrade".into()),
        ];
        let rows = exam_results(&exam("e1", "S1", "2024-11-02"), &students);
        let names: Vec<&str> = rows.iter().map(|r| r.student_name.as_str()).collect();
        assert_eq!(names, vec!["Amy", "Bob", "Zed"]);
        assert_eq!(rows[2].total_score, 50.0);
        assert!(rows[2].subjects[1].is_none());
        assert_eq!(rows[0].subjects[0].as_ref().and_then(|c| c.score), Some(90.0));
    }

    #[test]
    fn subject_ranking_handles_ties() {
        let students = vec![
            student("A", None, None, &[("数学", 80.0)]),
            student("B", None, None, &[("数学", 95.0)]),
            student("C", None, None, &[("数学", 80.0)]),
            student("D", None, None, &[("语文", 99.0)]),
        ];
        let rows = subject_ranking("e1", "数学", &students);
        let got: Vec<(&str, u32)> = rows
            .iter()
            .map(|r| (r.student_name.as_str(), r.rank))
            .collect();
        assert_eq!(got, vec![("B", 1), ("A", 2), ("C", 2)]);
    }
}
