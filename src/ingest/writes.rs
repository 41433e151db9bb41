use crate::db::GradeStore;
use crate::error::ImportError;
use crate::model::{Exam, Student};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    PutStudent(Student),
    DeleteExam(String),
    PutExam(Exam),
}

impl PendingWrite {
    fn describe(&self) -> String {
        match self {
            PendingWrite::PutStudent(s) => format!("put student {} ({})", s.name, s.id),
            PendingWrite::DeleteExam(id) => format!("delete exam {id}"),
            PendingWrite::PutExam(e) => format!("put exam {} ({})", e.name, e.id),
        }
    }
}

/// Ordered batch of store writes. Applied one call at a time with no
/// surrounding transaction; the report says how far it got.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitOfWork {
    writes: Vec<PendingWrite>,
}

#[derive(Debug)]
pub struct WriteFailure {
    pub index: usize,
    pub write: String,
    pub error: anyhow::Error,
}

#[derive(Debug)]
pub struct ApplyReport {
    pub applied: usize,
    pub total: usize,
    pub failure: Option<WriteFailure>,
}

impl ApplyReport {
    pub fn into_result(self) -> Result<usize, ImportError> {
        match self.failure {
            None => Ok(self.applied),
            Some(f) => Err(ImportError::PartialWrite {
                applied: self.applied,
                total: self.total,
                message: format!("write #{} ({}) failed: {:#}", f.index + 1, f.write, f.error),
            }),
        }
    }
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: PendingWrite) {
        self.writes.push(write);
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn writes(&self) -> &[PendingWrite] {
        &self.writes
    }

    /// Applies writes in order and stops at the first failure. Earlier writes
    /// stay applied.
    pub fn apply(self, store: &dyn GradeStore) -> ApplyReport {
        let total = self.writes.len();
        for (index, write) in self.writes.into_iter().enumerate() {
            let res = match &write {
                PendingWrite::PutStudent(s) => store.put_student(s),
                PendingWrite::DeleteExam(id) => store.delete_exam(id),
                PendingWrite::PutExam(e) => store.put_exam(e),
            };
            if let Err(error) = res {
                let desc = write.describe();
                warn!(index, total, write = %desc, "write failed; earlier writes stay applied");
                return ApplyReport {
                    applied: index,
                    total,
                    failure: Some(WriteFailure {
                        index,
                        write: desc,
                        error,
                    }),
                };
            }
            debug!(index, write = %write.describe(), "write applied");
        }
        ApplyReport {
            applied: total,
            total,
            failure: None,
        }
    }
}
