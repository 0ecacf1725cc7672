//! Report ingestion: one `ParsedData` becomes one Report plus the implanted
//! hardware and arrhythmia rows it references, inside a single transaction.

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use super::{CancelFlag, IngestError, IngestStep};
use crate::db::repository;
use crate::db::DatabaseError;
use crate::models::enums::{Chamber, DeviceFormat, ReportStatus};
use crate::models::{
    Arrhythmia, ImplantedDevice, ImplantedLead, LeadMeasurement, Report, ReportBattery,
    ReportBrady, ReportMeasurements, ReportStatistics,
};
use crate::pipeline::parsers::normalize::{parse_f64, parse_i64, text};
use crate::pipeline::parsers::{ArrhythmiaEvent, ChamberMeasurement, LeadInfo, ParsedData};

/// Who and what an ingestion is for.
#[derive(Debug, Clone)]
pub struct IngestContext {
    pub patient_id: Uuid,
    pub user: String,
    pub format: DeviceFormat,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkedDevice {
    pub device: ImplantedDevice,
    /// `false` when an existing (patient, serial) row was matched.
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkedLead {
    pub lead: ImplantedLead,
    pub created: bool,
}

/// Everything one ingestion persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestedReport {
    pub report: Report,
    pub arrhythmias: Vec<Arrhythmia>,
    pub device: Option<LinkedDevice>,
    pub leads: Vec<LinkedLead>,
}

/// Persist `data` for `ctx.patient_id`.
///
/// Steps run in a fixed order inside one transaction. Any failure, or a
/// cancellation seen between steps, drops the transaction uncommitted.
pub fn ingest_report(
    conn: &mut Connection,
    data: &ParsedData,
    ctx: &IngestContext,
    cancel: &CancelFlag,
) -> Result<IngestedReport, IngestError> {
    cancel.check()?;
    let tx = conn
        .transaction()
        .map_err(|e| IngestError::at(IngestStep::Begin)(e.into()))?;

    if !repository::patient_exists(&tx, &ctx.patient_id)
        .map_err(IngestError::at(IngestStep::LookupPatient))?
    {
        return Err(IngestError::PatientNotFound(ctx.patient_id));
    }

    cancel.check()?;
    let device = match data.serial_number.as_deref().and_then(text) {
        Some(serial) => Some(
            link_device(&tx, ctx.patient_id, &serial, data)
                .map_err(IngestError::at(IngestStep::LinkDevice))?,
        ),
        None => None,
    };

    cancel.check()?;
    let mut leads = Vec::new();
    for (chamber, info) in data.leads.with_serial() {
        let Some(serial) = info.serial_number.as_deref().and_then(text) else {
            continue;
        };
        leads.push(
            link_lead(&tx, ctx.patient_id, chamber, &serial, info)
                .map_err(IngestError::at(IngestStep::LinkLeads))?,
        );
    }

    cancel.check()?;
    let report = build_report(data, ctx, device.as_ref().map(|d| d.device.id));
    repository::insert_report(&tx, &report).map_err(IngestError::at(IngestStep::CreateReport))?;

    cancel.check()?;
    let mut arrhythmias = Vec::with_capacity(data.arrhythmias.len());
    for event in &data.arrhythmias {
        let episode = build_arrhythmia(report.id, event);
        repository::insert_arrhythmia(&tx, &episode)
            .map_err(IngestError::at(IngestStep::InsertArrhythmias))?;
        arrhythmias.push(episode);
    }

    cancel.check()?;
    tx.commit()
        .map_err(|e| IngestError::at(IngestStep::Commit)(e.into()))?;

    tracing::info!(
        report_id = %report.id,
        patient_id = %ctx.patient_id,
        format = %ctx.format,
        device_created = device.as_ref().map(|d| d.created).unwrap_or(false),
        leads = leads.len(),
        arrhythmias = arrhythmias.len(),
        "Report ingested"
    );

    Ok(IngestedReport {
        report,
        arrhythmias,
        device,
        leads,
    })
}

fn link_device(
    conn: &Connection,
    patient_id: Uuid,
    serial: &str,
    data: &ParsedData,
) -> Result<LinkedDevice, DatabaseError> {
    let manufacturer = data.manufacturer.as_deref().and_then(text);
    let model = data.model.as_deref().and_then(text);

    if let Some(existing) = repository::find_device(conn, &patient_id, serial)? {
        repository::update_device_details(
            conn,
            &existing.id,
            manufacturer.as_deref(),
            model.as_deref(),
        )?;
        let device = repository::get_device(conn, &existing.id)?.ok_or_else(|| {
            DatabaseError::NotFound {
                entity_type: "ImplantedDevice".into(),
                id: existing.id.to_string(),
            }
        })?;
        tracing::debug!(device_id = %device.id, "Matched existing device");
        return Ok(LinkedDevice {
            device,
            created: false,
        });
    }

    let device = ImplantedDevice {
        id: Uuid::new_v4(),
        patient_id,
        serial: serial.to_string(),
        manufacturer,
        model,
        implanted_at: data
            .implant_date
            .as_deref()
            .and_then(iso_date)
            .unwrap_or_else(|| Utc::now().date_naive()),
    };
    repository::insert_device(conn, &device)?;
    tracing::debug!(device_id = %device.id, "Created device");
    Ok(LinkedDevice {
        device,
        created: true,
    })
}

fn link_lead(
    conn: &Connection,
    patient_id: Uuid,
    chamber: Chamber,
    serial: &str,
    info: &LeadInfo,
) -> Result<LinkedLead, DatabaseError> {
    let manufacturer = info.manufacturer.as_deref().and_then(text);
    let model = info.model.as_deref().and_then(text);
    let implanted_at = info.implant_date.as_deref().and_then(iso_date);

    if let Some(existing) = repository::find_lead(conn, &patient_id, serial, chamber)? {
        repository::update_lead_details(
            conn,
            &existing.id,
            manufacturer.as_deref(),
            model.as_deref(),
            implanted_at,
        )?;
        let lead = repository::get_lead(conn, &existing.id)?.ok_or_else(|| {
            DatabaseError::NotFound {
                entity_type: "ImplantedLead".into(),
                id: existing.id.to_string(),
            }
        })?;
        return Ok(LinkedLead {
            lead,
            created: false,
        });
    }

    let lead = ImplantedLead {
        id: Uuid::new_v4(),
        patient_id,
        serial: serial.to_string(),
        chamber,
        manufacturer,
        model,
        implanted_at,
    };
    repository::insert_lead(conn, &lead)?;
    Ok(LinkedLead {
        lead,
        created: true,
    })
}

fn build_report(data: &ParsedData, ctx: &IngestContext, device_id: Option<Uuid>) -> Report {
    let brady = &data.brady;
    let stats = &data.statistics;
    let battery = &data.battery;

    Report {
        id: Uuid::new_v4(),
        patient_id: ctx.patient_id,
        device_id,
        status: ReportStatus::Pending,
        source_format: ctx.format,
        report_date: data.report_date.as_deref().and_then(timestamp),
        created_by: ctx.user.clone(),
        created_at: Utc::now().trunc_subsecs(0),
        file_path: ctx.file_path.clone(),
        patient_name: data.name.as_deref().and_then(text),
        mrn: data.mrn.as_deref().and_then(mrn),
        dob: data.dob.as_deref().and_then(iso_date),
        device_manufacturer: data.manufacturer.as_deref().and_then(text),
        device_model: data.model.as_deref().and_then(text),
        device_serial: data.serial_number.as_deref().and_then(text),
        brady: ReportBrady {
            mode: brady.mode.as_deref().and_then(text),
            low_rate_bpm: int(&brady.low_rate_bpm),
            max_tracking_rate_bpm: int(&brady.max_tracking_rate_bpm),
            max_sensor_rate_bpm: int(&brady.max_sensor_rate_bpm),
            mode_switch_rate_bpm: int(&brady.mode_switch_rate),
            sav_ms: real(&brady.sav),
            pav_ms: real(&brady.pav),
        },
        statistics: ReportStatistics {
            ataf_burden_percent: real(&stats.ataf_burden_percent),
            ataf_count: int(&stats.ataf_count),
            ra_percent_paced: real(&stats.ra_percent_paced),
            rv_percent_paced: real(&stats.rv_percent_paced),
            lv_percent_paced: real(&stats.lv_percent_paced),
            biv_percent_paced: real(&stats.biv_percent_paced),
            pvc_count: int(&stats.pvc_count),
            nsvt_count: int(&stats.nsvt_count),
            atp_delivered_recent: int(&stats.atp_delivered_recent),
            shocks_delivered_recent: int(&stats.shocks_delivered_recent),
        },
        battery: ReportBattery {
            status: battery.status.as_deref().and_then(text),
            percentage: real(&battery.percentage),
            voltage: real(&battery.voltage),
            remaining: battery.remaining.as_deref().and_then(text),
            cap_charge_time_s: real(&battery.cap_charge_time),
        },
        measurements: ReportMeasurements {
            ra: lead_measurement(&data.measurements.ra),
            rv: lead_measurement(&data.measurements.rv),
            lv: lead_measurement(&data.measurements.lv),
            hv_impedance_ohms: real(&data.measurements.hv_impedance_mean),
        },
        tachy: data.tachy.clone(),
    }
}

fn lead_measurement(m: &ChamberMeasurement) -> LeadMeasurement {
    LeadMeasurement {
        impedance_ohms: real(&m.impedance_mean),
        sensing_mv: real(&m.sensing_mean),
        threshold_v: real(&m.pacing_threshold),
        pulse_width_ms: real(&m.pulse_width),
    }
}

fn build_arrhythmia(report_id: Uuid, event: &ArrhythmiaEvent) -> Arrhythmia {
    Arrhythmia {
        id: Uuid::new_v4(),
        report_id,
        kind: event.kind.clone(),
        occurred_at: event.date.as_deref().and_then(timestamp),
        duration: event.duration.as_deref().and_then(text),
        therapy: event.therapy.as_deref().and_then(text),
    }
}

fn int(value: &Option<String>) -> Option<i64> {
    value.as_deref().and_then(parse_i64)
}

fn real(value: &Option<String>) -> Option<f64> {
    value.as_deref().and_then(parse_f64)
}

fn iso_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

fn timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// The MRN column is an integer; exports sometimes carry free text there.
fn mrn(raw: &str) -> Option<i64> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    match value.parse::<i64>() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(mrn = value, "Non-numeric MRN not stored");
            None
        }
    }
}
