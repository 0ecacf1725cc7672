//! Device report endpoints.
//!
//! `POST /api/patients/:patient_id/reports` ingests one multipart upload.
//! Parsing, storage and ingestion run on one blocking worker; dropping the
//! handler future (client gone) cancels the worker through its flag.

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ReportDetail, UserContext};
use crate::db::repository;
use crate::models::Report;
use crate::pipeline::ingest::{CancelFlag, IngestedReport};
use crate::pipeline::processor::{preview_upload, process_upload, ParsePreview, UploadedFile};

/// Multipart field carrying the device export.
const FILE_FIELD: &str = "file";

fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid {what} id: {raw}")))
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadRequest(format!("Invalid multipart body: {}", e.body_text()))
    }
}

/// First `file` field of the form; other fields are ignored.
async fn read_upload(mut multipart: Multipart) -> Result<UploadedFile, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        return Ok(UploadedFile {
            file_name,
            bytes: bytes.to_vec(),
        });
    }
    Err(ApiError::BadRequest(format!(
        "Missing '{FILE_FIELD}' field in upload"
    )))
}

/// `POST /api/patients/:patient_id/reports`
pub async fn upload(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(patient_id): Path<String>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<IngestedReport>), ApiError> {
    let patient_id = parse_id(&patient_id, "patient")?;
    let upload = read_upload(multipart).await?;
    tracing::info!(
        patient_id = %patient_id,
        user = %user.username,
        file = %upload.file_name,
        size = upload.bytes.len(),
        "Device report upload received"
    );

    let cancel = CancelFlag::new();
    let guard = cancel.drop_guard();
    let core = ctx.core.clone();

    let result = tokio::task::spawn_blocking(move || -> Result<IngestedReport, ApiError> {
        let mut conn = core.open_db()?;
        let ingested = process_upload(
            &mut conn,
            &core.uploads_dir,
            &upload,
            patient_id,
            &user.username,
            &cancel,
        )?;
        Ok(ingested)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("ingestion worker failed: {e}")))?;
    guard.disarm();

    Ok((StatusCode::CREATED, Json(result?)))
}

/// `POST /api/reports/parse`. Parse without storing anything.
pub async fn parse(multipart: Multipart) -> Result<Json<ParsePreview>, ApiError> {
    let upload = read_upload(multipart).await?;
    let preview = tokio::task::spawn_blocking(move || preview_upload(&upload))
        .await
        .map_err(|e| ApiError::Internal(format!("parse worker failed: {e}")))??;
    Ok(Json(preview))
}

/// `GET /api/patients/:patient_id/reports`, newest first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
) -> Result<Json<Vec<Report>>, ApiError> {
    let patient_id = parse_id(&patient_id, "patient")?;
    let core = ctx.core.clone();

    let reports = tokio::task::spawn_blocking(move || -> Result<Vec<Report>, ApiError> {
        let conn = core.open_db()?;
        if !repository::patient_exists(&conn, &patient_id)? {
            return Err(ApiError::NotFound(format!("Patient not found: {patient_id}")));
        }
        Ok(repository::list_reports_for_patient(&conn, &patient_id)?)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("query worker failed: {e}")))??;

    Ok(Json(reports))
}

/// `GET /api/reports/:report_id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(report_id): Path<String>,
) -> Result<Json<ReportDetail>, ApiError> {
    let report_id = parse_id(&report_id, "report")?;
    let core = ctx.core.clone();

    let detail = tokio::task::spawn_blocking(move || -> Result<ReportDetail, ApiError> {
        let conn = core.open_db()?;
        let report = repository::get_report(&conn, &report_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Report not found: {report_id}")))?;
        let arrhythmias = repository::list_arrhythmias_for_report(&conn, &report_id)?;
        Ok(ReportDetail {
            report,
            arrhythmias,
        })
    })
    .await
    .map_err(|e| ApiError::Internal(format!("query worker failed: {e}")))??;

    Ok(Json(detail))
}
