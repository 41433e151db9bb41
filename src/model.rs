use serde::{Deserialize, Serialize};

pub const DEFAULT_SEMESTER: &str = "2024-2025-1";
pub const UNSPECIFIED_GENDER: &str = "未指定";
pub const DEFAULT_FULL_SCORE: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSubject {
    pub name: String,
    pub full_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: String,
    pub name: String,
    pub date: String,
    pub semester: String,
    #[serde(default)]
    pub subjects: Vec<ExamSubject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectScore {
    pub name: String,
    pub score: Option<f64>,
    pub rank: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub exam_id: String,
    pub exam_name: String,
    pub date: String,
    pub semester: String,
    pub rank: Option<u32>,
    pub explicit_total_score: Option<f64>,
    #[serde(default)]
    pub subjects: Vec<SubjectScore>,
}

impl Grade {
    /// Stored total when present, otherwise the sum of the subject scores.
    pub fn total_score(&self) -> f64 {
        self.explicit_total_score
            .unwrap_or_else(|| self.subjects.iter().filter_map(|s| s.score).sum())
    }

    pub fn subject(&self, name: &str) -> Option<&SubjectScore> {
        self.subjects.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub gender: String,
    #[serde(default)]
    pub grades: Vec<Grade>,
    #[serde(default)]
    pub discipline_records: Vec<serde_json::Value>,
}

impl Student {
    pub fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            gender: UNSPECIFIED_GENDER.to_string(),
            grades: Vec::new(),
            discipline_records: Vec::new(),
        }
    }

    pub fn grade_for(&self, exam_id: &str) -> Option<&Grade> {
        self.grades.iter().find(|g| g.exam_id == exam_id)
    }

    /// Drops every grade tied to `exam_id`. Returns true when something was removed.
    pub fn remove_grades_for(&mut self, exam_id: &str) -> bool {
        let before = self.grades.len();
        self.grades.retain(|g| g.exam_id != exam_id);
        self.grades.len() < before
    }

    /// Keeps at most one grade per exam: any prior grade for the same exam is replaced.
    pub fn replace_grade(&mut self, grade: Grade) {
        self.remove_grades_for(&grade.exam_id);
        self.grades.push(grade);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub current_semester: String,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            current_semester: DEFAULT_SEMESTER.to_string(),
        }
    }
}
