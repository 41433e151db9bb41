pub mod backup;
pub mod core;
pub mod exams;
pub mod import;
pub mod semesters;
pub mod students;
