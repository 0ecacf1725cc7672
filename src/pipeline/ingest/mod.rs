pub mod adapter;
pub mod cancel;

pub use adapter::*;
pub use cancel::*;

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;

/// Adapter steps in execution order; a persistence failure names the step
/// that hit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStep {
    Begin,
    LookupPatient,
    LinkDevice,
    LinkLeads,
    CreateReport,
    InsertArrhythmias,
    Commit,
}

impl IngestStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::LookupPatient => "lookup_patient",
            Self::LinkDevice => "link_device",
            Self::LinkLeads => "link_leads",
            Self::CreateReport => "create_report",
            Self::InsertArrhythmias => "insert_arrhythmias",
            Self::Commit => "commit",
        }
    }
}

impl std::fmt::Display for IngestStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Patient not found: {0}")]
    PatientNotFound(Uuid),

    #[error("Persistence failed during {step}: {source}")]
    Persistence {
        step: IngestStep,
        #[source]
        source: DatabaseError,
    },

    #[error("Ingestion cancelled")]
    Cancelled,
}

impl IngestError {
    pub(crate) fn at(step: IngestStep) -> impl FnOnce(DatabaseError) -> IngestError {
        move |source| IngestError::Persistence { step, source }
    }
}
