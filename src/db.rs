use crate::model::{AppState, Exam, ExamSubject, Grade, Student, SubjectScore, DEFAULT_SEMESTER};
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

pub const DB_FILE_NAME: &str = "gradesheet.sqlite3";
pub const APP_STATE_KEY: &str = "app_state.current";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            gender TEXT NOT NULL,
            discipline_records TEXT NOT NULL DEFAULT '[]',
            sort_order INTEGER NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_name ON students(name)",
        [],
    )?;
    ensure_students_updated_at(conn)?;

    // Grades reference exams by id only. Deleting an exam does not cascade here;
    // callers strip grades explicitly.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            student_id TEXT NOT NULL,
            exam_id TEXT NOT NULL,
            exam_name TEXT NOT NULL,
            date TEXT NOT NULL,
            semester TEXT NOT NULL,
            rank INTEGER,
            explicit_total_score REAL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(student_id, exam_id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_exam ON grades(exam_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_subjects(
            student_id TEXT NOT NULL,
            exam_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            name TEXT NOT NULL,
            score REAL,
            rank INTEGER,
            PRIMARY KEY(student_id, exam_id, idx),
            FOREIGN KEY(student_id, exam_id) REFERENCES grades(student_id, exam_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exams(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            date TEXT NOT NULL,
            semester TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exams_semester ON exams(semester)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_subjects(
            exam_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            name TEXT NOT NULL,
            full_score REAL NOT NULL,
            PRIMARY KEY(exam_id, idx),
            FOREIGN KEY(exam_id) REFERENCES exams(id),
            UNIQUE(exam_id, name)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS semesters(
            name TEXT PRIMARY KEY
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

fn ensure_students_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("invalid JSON in setting {key}"))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// Record store the import pipeline and the IPC handlers write through.
///
/// Every call is individually atomic. Nothing spans calls: a sequence of
/// `put_student` calls that fails halfway leaves the earlier ones applied.
pub trait GradeStore {
    fn get_all_students(&self) -> anyhow::Result<Vec<Student>>;
    fn put_student(&self, student: &Student) -> anyhow::Result<()>;
    fn delete_student(&self, student_id: &str) -> anyhow::Result<()>;
    fn get_all_exams(&self) -> anyhow::Result<Vec<Exam>>;
    fn put_exam(&self, exam: &Exam) -> anyhow::Result<()>;
    fn delete_exam(&self, exam_id: &str) -> anyhow::Result<()>;
    fn get_all_semesters(&self) -> anyhow::Result<Vec<String>>;
    fn put_semester(&self, semester: &str) -> anyhow::Result<()>;
    fn get_app_state(&self) -> anyhow::Result<AppState>;
    fn save_app_state(&self, state: &AppState) -> anyhow::Result<()>;
    fn clear_all(&self) -> anyhow::Result<()>;
}

pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl GradeStore for SqliteStore<'_> {
    fn get_all_students(&self) -> anyhow::Result<Vec<Student>> {
        load_students(self.conn)
    }

    fn put_student(&self, student: &Student) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        write_student(&tx, student)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_student(&self, student_id: &str) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        delete_student_grades(&tx, student_id)?;
        tx.execute("DELETE FROM students WHERE id = ?", [student_id])?;
        tx.commit()?;
        Ok(())
    }

    fn get_all_exams(&self) -> anyhow::Result<Vec<Exam>> {
        load_exams(self.conn)
    }

    fn put_exam(&self, exam: &Exam) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        write_exam(&tx, exam)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_exam(&self, exam_id: &str) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        remove_exam(&tx, exam_id)?;
        tx.commit()?;
        Ok(())
    }

    fn get_all_semesters(&self) -> anyhow::Result<Vec<String>> {
        let semesters = load_semesters(self.conn)?;
        if semesters.is_empty() {
            return Ok(vec![DEFAULT_SEMESTER.to_string()]);
        }
        Ok(semesters)
    }

    fn put_semester(&self, semester: &str) -> anyhow::Result<()> {
        write_semester(self.conn, semester)
    }

    fn get_app_state(&self) -> anyhow::Result<AppState> {
        match settings_get_json(self.conn, APP_STATE_KEY)? {
            Some(v) => Ok(serde_json::from_value(v).context("invalid stored app state")?),
            None => Ok(AppState::default()),
        }
    }

    fn save_app_state(&self, state: &AppState) -> anyhow::Result<()> {
        settings_set_json(self.conn, APP_STATE_KEY, &serde_json::to_value(state)?)
    }

    fn clear_all(&self) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        clear_records(&tx)?;
        tx.commit()?;
        Ok(())
    }
}

/// Deletes the exam row and its subjects. Grades are not touched.
pub fn remove_exam(conn: &Connection, exam_id: &str) -> anyhow::Result<()> {
    conn.execute("DELETE FROM exam_subjects WHERE exam_id = ?", [exam_id])?;
    conn.execute("DELETE FROM exams WHERE id = ?", [exam_id])?;
    Ok(())
}

/// Stored semesters without the default fallback.
pub fn load_semesters(conn: &Connection) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM semesters ORDER BY name")?;
    let rows = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn write_semester(conn: &Connection, semester: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO semesters(name) VALUES(?) ON CONFLICT(name) DO NOTHING",
        [semester],
    )?;
    Ok(())
}

/// Removes all students, grades, exams, semesters and the app state.
/// Other settings (vocabulary, match policy) survive.
pub fn clear_records(conn: &Connection) -> anyhow::Result<()> {
    // Explicitly delete in dependency order (no ON DELETE CASCADE).
    conn.execute("DELETE FROM grade_subjects", [])?;
    conn.execute("DELETE FROM grades", [])?;
    conn.execute("DELETE FROM students", [])?;
    conn.execute("DELETE FROM exam_subjects", [])?;
    conn.execute("DELETE FROM exams", [])?;
    conn.execute("DELETE FROM semesters", [])?;
    conn.execute("DELETE FROM settings WHERE key = ?", [APP_STATE_KEY])?;
    Ok(())
}

pub fn load_students(conn: &Connection) -> anyhow::Result<Vec<Student>> {
    let mut subjects_by_grade: HashMap<(String, String), Vec<SubjectScore>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT student_id, exam_id, name, score, rank
             FROM grade_subjects
             ORDER BY student_id, exam_id, idx",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let student_id: String = row.get(0)?;
            let exam_id: String = row.get(1)?;
            let rank: Option<i64> = row.get(4)?;
            subjects_by_grade
                .entry((student_id, exam_id))
                .or_default()
                .push(SubjectScore {
                    name: row.get(2)?,
                    score: row.get(3)?,
                    rank: rank.and_then(|r| u32::try_from(r).ok()),
                });
        }
    }

    let mut grades_by_student: HashMap<String, Vec<Grade>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT student_id, exam_id, exam_name, date, semester, rank, explicit_total_score
             FROM grades
             ORDER BY student_id, sort_order",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let student_id: String = row.get(0)?;
            let exam_id: String = row.get(1)?;
            let rank: Option<i64> = row.get(5)?;
            let subjects = subjects_by_grade
                .remove(&(student_id.clone(), exam_id.clone()))
                .unwrap_or_default();
            grades_by_student.entry(student_id).or_default().push(Grade {
                exam_id,
                exam_name: row.get(2)?,
                date: row.get(3)?,
                semester: row.get(4)?,
                rank: rank.and_then(|r| u32::try_from(r).ok()),
                explicit_total_score: row.get(6)?,
                subjects,
            });
        }
    }

    let mut stmt = conn.prepare(
        "SELECT id, name, gender, discipline_records
         FROM students
         ORDER BY sort_order, rowid",
    )?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        let discipline_raw: String = row.get(3)?;
        let discipline_records: Vec<serde_json::Value> = serde_json::from_str(&discipline_raw)
            .with_context(|| format!("invalid discipline records for student {id}"))?;
        let grades = grades_by_student.remove(&id).unwrap_or_default();
        out.push(Student {
            id,
            name: row.get(1)?,
            gender: row.get(2)?,
            grades,
            discipline_records,
        });
    }
    Ok(out)
}

/// Upserts the student row and replaces all of its grade rows.
pub fn write_student(conn: &Connection, student: &Student) -> anyhow::Result<()> {
    let existing_order: Option<i64> = conn
        .query_row(
            "SELECT sort_order FROM students WHERE id = ?",
            [&student.id],
            |r| r.get(0),
        )
        .optional()?;
    let sort_order = match existing_order {
        Some(v) => v,
        None => conn.query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM students",
            [],
            |r| r.get::<_, i64>(0),
        )?,
    };
    let updated_at = chrono::Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO students(id, name, gender, discipline_records, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           gender = excluded.gender,
           discipline_records = excluded.discipline_records,
           updated_at = excluded.updated_at",
        (
            &student.id,
            &student.name,
            &student.gender,
            serde_json::to_string(&student.discipline_records)?,
            sort_order,
            &updated_at,
        ),
    )?;

    delete_student_grades(conn, &student.id)?;

    let mut ins_grade = conn.prepare(
        "INSERT INTO grades(student_id, exam_id, exam_name, date, semester, rank, explicit_total_score, sort_order)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
    )?;
    let mut ins_subject = conn.prepare(
        "INSERT INTO grade_subjects(student_id, exam_id, idx, name, score, rank)
         VALUES(?, ?, ?, ?, ?, ?)",
    )?;
    for (i, g) in student.grades.iter().enumerate() {
        ins_grade
            .execute((
                &student.id,
                &g.exam_id,
                &g.exam_name,
                &g.date,
                &g.semester,
                g.rank.map(i64::from),
                g.explicit_total_score,
                i as i64,
            ))
            .with_context(|| format!("failed to write grade {} for {}", g.exam_id, student.id))?;
        for (j, s) in g.subjects.iter().enumerate() {
            ins_subject.execute((
                &student.id,
                &g.exam_id,
                j as i64,
                &s.name,
                s.score,
                s.rank.map(i64::from),
            ))?;
        }
    }
    Ok(())
}

fn delete_student_grades(conn: &Connection, student_id: &str) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM grade_subjects WHERE student_id = ?",
        [student_id],
    )?;
    conn.execute("DELETE FROM grades WHERE student_id = ?", [student_id])?;
    Ok(())
}

pub fn load_exams(conn: &Connection) -> anyhow::Result<Vec<Exam>> {
    let mut subjects_by_exam: HashMap<String, Vec<ExamSubject>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT exam_id, name, full_score FROM exam_subjects ORDER BY exam_id, idx",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let exam_id: String = row.get(0)?;
            subjects_by_exam.entry(exam_id).or_default().push(ExamSubject {
                name: row.get(1)?,
                full_score: row.get(2)?,
            });
        }
    }

    let mut stmt = conn.prepare("SELECT id, name, date, semester FROM exams ORDER BY rowid")?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        let subjects = subjects_by_exam.remove(&id).unwrap_or_default();
        out.push(Exam {
            id,
            name: row.get(1)?,
            date: row.get(2)?,
            semester: row.get(3)?,
            subjects,
        });
    }
    Ok(out)
}

pub fn write_exam(conn: &Connection, exam: &Exam) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO exams(id, name, date, semester) VALUES(?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           date = excluded.date,
           semester = excluded.semester",
        (&exam.id, &exam.name, &exam.date, &exam.semester),
    )?;
    conn.execute("DELETE FROM exam_subjects WHERE exam_id = ?", [&exam.id])?;
    let mut ins = conn.prepare(
        "INSERT INTO exam_subjects(exam_id, idx, name, full_score) VALUES(?, ?, ?, ?)",
    )?;
    for (i, s) in exam.subjects.iter().enumerate() {
        ins.execute((&exam.id, i as i64, &s.name, s.full_score))
            .with_context(|| format!("failed to write subject {} of exam {}", s.name, exam.id))?;
    }
    Ok(())
}
