//! Upload processing: detect → parse → store → ingest.
//!
//! Runs on a blocking worker. The HTTP layer owns the connection lifetime
//! and the cancellation flag; this module owns the ordering and the
//! cleanup of the stored file when ingestion does not complete.

use std::path::Path;

use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::models::enums::DeviceFormat;
use crate::pipeline::import::{
    detect_format, remove_staged, require_supported, sanitize_filename, store_upload, ImportError,
    PEEK_LEN,
};
use crate::pipeline::ingest::{ingest_report, CancelFlag, IngestContext, IngestError, IngestedReport};
use crate::pipeline::parsers::{parse_report, DeferredExtraction, ParseError, ParseOutcome, ParsedData};

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{}", .0.explanation())]
    DeferredExtraction(DeferredExtraction),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("Upload failed: {0}")]
    Import(#[from] ImportError),
}

/// One file as received from the client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Parse result without persistence.
#[derive(Debug, Clone, Serialize)]
pub struct ParsePreview {
    pub file_name: String,
    pub format: DeviceFormat,
    pub vendor: &'static str,
    pub data: ParsedData,
    /// Field labels not in canonical form; empty for a clean parse.
    pub warnings: Vec<String>,
}

/// Detect and parse an upload. Does not touch disk or database.
fn parse_upload(file_name: &str, bytes: &[u8]) -> Result<(DeviceFormat, ParsedData), ProcessError> {
    if bytes.is_empty() {
        return Err(ImportError::EmptyUpload.into());
    }

    let peek = &bytes[..bytes.len().min(PEEK_LEN)];
    let format = require_supported(file_name, detect_format(file_name, Some(peek)))?;
    tracing::debug!(file = file_name, format = %format, vendor = format.vendor(), "Detected upload format");

    match parse_report(format, bytes)? {
        ParseOutcome::Parsed(data) => Ok((format, data)),
        ParseOutcome::Deferred(deferred) => Err(ProcessError::DeferredExtraction(deferred)),
    }
}

fn check_invariants(file_name: &str, data: &ParsedData) -> Vec<String> {
    let violations = data.invariant_violations();
    if !violations.is_empty() {
        tracing::warn!(
            file = file_name,
            fields = ?violations,
            "Parsed values outside canonical form"
        );
    }
    violations
}

/// Parse an upload and return what would be stored.
pub fn preview_upload(upload: &UploadedFile) -> Result<ParsePreview, ProcessError> {
    let file_name = sanitize_filename(&upload.file_name);
    let (format, data) = parse_upload(&file_name, &upload.bytes)?;
    let warnings = check_invariants(&file_name, &data);
    Ok(ParsePreview {
        file_name,
        format,
        vendor: format.vendor(),
        data,
        warnings,
    })
}

/// Full ingestion of one upload for one patient.
///
/// The file is stored under `uploads_dir` before ingestion and removed
/// again if ingestion fails or is cancelled.
pub fn process_upload(
    conn: &mut Connection,
    uploads_dir: &Path,
    upload: &UploadedFile,
    patient_id: Uuid,
    user: &str,
    cancel: &CancelFlag,
) -> Result<IngestedReport, ProcessError> {
    let file_name = sanitize_filename(&upload.file_name);
    let (format, data) = parse_upload(&file_name, &upload.bytes)?;
    check_invariants(&file_name, &data);

    cancel.check()?;
    let stored = store_upload(uploads_dir, &file_name, &upload.bytes)?;

    let ctx = IngestContext {
        patient_id,
        user: user.to_string(),
        format,
        file_path: Some(stored.to_string_lossy().into_owned()),
    };

    match ingest_report(conn, &data, &ctx, cancel) {
        Ok(ingested) => Ok(ingested),
        Err(e) => {
            if let Err(cleanup) = remove_staged(&stored) {
                tracing::warn!(
                    path = %stored.display(),
                    error = %cleanup,
                    "Failed to remove stored upload after ingestion failure"
                );
            }
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository;
    use crate::db::sqlite::open_memory_database;
    use crate::models::Patient;

    fn seed_patient(conn: &Connection) -> Uuid {
        let patient = Patient {
            id: Uuid::new_v4(),
            mrn: None,
            first_name: "Ruth".into(),
            last_name: "Okafor".into(),
            date_of_birth: None,
        };
        repository::insert_patient(conn, &patient).unwrap();
        patient.id
    }

    fn bnk_upload(name: &str) -> UploadedFile {
        UploadedFile {
            file_name: name.into(),
            bytes: b"SAVE DATE: 02 Jun 2015\n\
                     SystemSerialNumber,123456\n\
                     SystemName,DYNAGEN EL ICD\n\
                     PatientFirstName,Ruth\n\
                     PatientLastName,Okafor\n"
                .to_vec(),
        }
    }

    fn uploads_in(dir: &tempfile::TempDir) -> Vec<std::path::PathBuf> {
        match std::fs::read_dir(dir.path()) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn bnk_upload_is_stored_and_ingested() {
        let mut conn = open_memory_database().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let patient_id = seed_patient(&conn);

        let result = process_upload(
            &mut conn,
            dir.path(),
            &bnk_upload("zoom.bnk"),
            patient_id,
            "dr.ng",
            &CancelFlag::new(),
        )
        .unwrap();

        assert_eq!(result.report.source_format, DeviceFormat::Bnk);
        assert_eq!(result.report.device_serial.as_deref(), Some("123456"));
        let path = result.report.file_path.clone().unwrap();
        assert!(path.ends_with("_zoom.bnk"));
        assert!(Path::new(&path).exists());
    }

    #[test]
    fn client_path_is_stripped_before_storing() {
        let mut conn = open_memory_database().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let patient_id = seed_patient(&conn);

        let result = process_upload(
            &mut conn,
            dir.path(),
            &bnk_upload("../../etc/zoom.bnk"),
            patient_id,
            "dr.ng",
            &CancelFlag::new(),
        )
        .unwrap();

        let path = std::path::PathBuf::from(result.report.file_path.unwrap());
        assert_eq!(path.parent().unwrap(), dir.path());
    }

    #[test]
    fn long_file_name_is_stored() {
        let mut conn = open_memory_database().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let patient_id = seed_patient(&conn);
        let name = format!("{}.bnk", "a".repeat(236));

        let result = process_upload(
            &mut conn,
            dir.path(),
            &bnk_upload(&name),
            patient_id,
            "dr.ng",
            &CancelFlag::new(),
        )
        .unwrap();

        let path = result.report.file_path.unwrap();
        assert!(path.ends_with(".bnk"));
        assert!(Path::new(&path).exists());
    }

    #[test]
    fn unknown_patient_leaves_no_file() {
        let mut conn = open_memory_database().unwrap();
        let dir = tempfile::tempdir().unwrap();

        let err = process_upload(
            &mut conn,
            dir.path(),
            &bnk_upload("zoom.bnk"),
            Uuid::new_v4(),
            "dr.ng",
            &CancelFlag::new(),
        )
        .unwrap_err();

        assert!(matches!(err, ProcessError::Ingest(IngestError::PatientNotFound(_))));
        assert!(uploads_in(&dir).is_empty());
    }

    #[test]
    fn cancelled_before_store_leaves_no_file() {
        let mut conn = open_memory_database().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let patient_id = seed_patient(&conn);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = process_upload(
            &mut conn,
            dir.path(),
            &bnk_upload("zoom.bnk"),
            patient_id,
            "dr.ng",
            &cancel,
        )
        .unwrap_err();

        assert!(matches!(err, ProcessError::Ingest(IngestError::Cancelled)));
        assert!(uploads_in(&dir).is_empty());
    }

    #[test]
    fn unsupported_extension_rejected_before_parsing() {
        let upload = UploadedFile {
            file_name: "report.docx".into(),
            bytes: b"PK\x03\x04".to_vec(),
        };
        let err = preview_upload(&upload).unwrap_err();
        assert!(matches!(err, ProcessError::Parse(ParseError::UnsupportedFormat(ref ext)) if ext == ".docx"));
    }

    #[test]
    fn empty_upload_rejected() {
        let upload = UploadedFile {
            file_name: "zoom.bnk".into(),
            bytes: Vec::new(),
        };
        let err = preview_upload(&upload).unwrap_err();
        assert!(matches!(err, ProcessError::Import(ImportError::EmptyUpload)));
    }

    #[test]
    fn generic_extension_is_sniffed() {
        let mut upload = bnk_upload("export.txt");
        upload.bytes = [b"\xEF\xBB\xBF".as_slice(), &upload.bytes].concat();
        let preview = preview_upload(&upload).unwrap();
        assert_eq!(preview.format, DeviceFormat::Bnk);
        assert_eq!(preview.vendor, "Boston Scientific");
        assert!(preview.warnings.is_empty());
    }

    #[test]
    fn malformed_log_reports_line() {
        let upload = UploadedFile {
            file_name: "merlin.log".into(),
            bytes: "2430\x1cName\x1cJane Doe\nabc\x1cBad\x1cx\n".as_bytes().to_vec(),
        };
        let err = preview_upload(&upload).unwrap_err();
        match err {
            ProcessError::Parse(ParseError::MalformedInput { format, offset, .. }) => {
                assert_eq!(format, DeviceFormat::Log);
                assert_eq!(offset, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn garbage_pdf_is_malformed_not_deferred() {
        let upload = UploadedFile {
            file_name: "summary.pdf".into(),
            bytes: b"%PDF-1.4 not really".to_vec(),
        };
        let err = preview_upload(&upload).unwrap_err();
        assert!(matches!(err, ProcessError::Parse(ParseError::MalformedInput { .. })));
    }
}
