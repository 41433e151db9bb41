use thiserror::Error;

/// Failures that abort a sheet import. Writes already applied stay applied.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read file: {message}")]
    FileRead { message: String },

    #[error("too few rows to parse: found {rows}, need at least 2")]
    InsufficientData { rows: usize },

    #[error("the sheet must contain a '{keyword}' column")]
    MissingRequiredColumn { keyword: String },

    #[error("exam '{exam_name}' already exists in this semester")]
    OverwriteDeclined { exam_id: String, exam_name: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("import stopped after {applied} of {total} writes: {message}")]
    PartialWrite {
        applied: usize,
        total: usize,
        message: String,
    },
}

impl ImportError {
    pub fn storage(e: anyhow::Error) -> Self {
        Self::Storage(format!("{e:#}"))
    }

    /// Stable code used in IPC error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::OverwriteDeclined { .. } => "exam_exists",
            _ => "import_failed",
        }
    }
}
