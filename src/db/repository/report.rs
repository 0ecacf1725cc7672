use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{date_column, enum_column, format_timestamp, opt_uuid_column, timestamp_column, uuid_column};
use crate::db::DatabaseError;
use crate::models::{
    LeadMeasurement, Report, ReportBattery, ReportBrady, ReportMeasurements, ReportStatistics,
};
use crate::pipeline::parsers::TachySettings;

/// Column order shared by INSERT and SELECT. Keep in step with `report_params`.
const REPORT_COLUMNS: [&str; 51] = [
    "id",
    "patient_id",
    "device_id",
    "status",
    "source_format",
    "report_date",
    "created_by",
    "created_at",
    "file_path",
    "patient_name",
    "mrn",
    "dob",
    "device_manufacturer",
    "device_model",
    "device_serial",
    "brady_mode",
    "low_rate_bpm",
    "max_tracking_rate_bpm",
    "max_sensor_rate_bpm",
    "mode_switch_rate_bpm",
    "sav_ms",
    "pav_ms",
    "ataf_burden_percent",
    "ataf_count",
    "ra_percent_paced",
    "rv_percent_paced",
    "lv_percent_paced",
    "biv_percent_paced",
    "pvc_count",
    "nsvt_count",
    "atp_delivered_recent",
    "shocks_delivered_recent",
    "battery_status",
    "battery_percentage",
    "battery_voltage",
    "battery_remaining",
    "cap_charge_time_s",
    "ra_impedance_ohms",
    "ra_sensing_mv",
    "ra_threshold_v",
    "ra_pulse_width_ms",
    "rv_impedance_ohms",
    "rv_sensing_mv",
    "rv_threshold_v",
    "rv_pulse_width_ms",
    "lv_impedance_ohms",
    "lv_sensing_mv",
    "lv_threshold_v",
    "lv_pulse_width_ms",
    "hv_impedance_ohms",
    "tachy_settings",
];

fn select_sql(filter: &str) -> String {
    format!("SELECT {} FROM reports {filter}", REPORT_COLUMNS.join(", "))
}

fn lead_measurement_from_row(row: &Row<'_>, prefix: &str) -> rusqlite::Result<LeadMeasurement> {
    Ok(LeadMeasurement {
        impedance_ohms: row.get(format!("{prefix}_impedance_ohms").as_str())?,
        sensing_mv: row.get(format!("{prefix}_sensing_mv").as_str())?,
        threshold_v: row.get(format!("{prefix}_threshold_v").as_str())?,
        pulse_width_ms: row.get(format!("{prefix}_pulse_width_ms").as_str())?,
    })
}

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<Report> {
    let tachy_idx = row.as_ref().column_index("tachy_settings")?;
    let tachy_json: String = row.get(tachy_idx)?;
    let tachy: TachySettings = serde_json::from_str(&tachy_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(tachy_idx, Type::Text, Box::new(e))
    })?;

    let created_idx = row.as_ref().column_index("created_at")?;
    let created_at = timestamp_column(row, "created_at")?.ok_or(
        rusqlite::Error::InvalidColumnType(created_idx, "created_at".into(), Type::Null),
    )?;

    Ok(Report {
        id: uuid_column(row, "id")?,
        patient_id: uuid_column(row, "patient_id")?,
        device_id: opt_uuid_column(row, "device_id")?,
        status: enum_column(row, "status")?,
        source_format: enum_column(row, "source_format")?,
        report_date: timestamp_column(row, "report_date")?,
        created_by: row.get("created_by")?,
        created_at,
        file_path: row.get("file_path")?,
        patient_name: row.get("patient_name")?,
        mrn: row.get("mrn")?,
        dob: date_column(row, "dob")?,
        device_manufacturer: row.get("device_manufacturer")?,
        device_model: row.get("device_model")?,
        device_serial: row.get("device_serial")?,
        brady: ReportBrady {
            mode: row.get("brady_mode")?,
            low_rate_bpm: row.get("low_rate_bpm")?,
            max_tracking_rate_bpm: row.get("max_tracking_rate_bpm")?,
            max_sensor_rate_bpm: row.get("max_sensor_rate_bpm")?,
            mode_switch_rate_bpm: row.get("mode_switch_rate_bpm")?,
            sav_ms: row.get("sav_ms")?,
            pav_ms: row.get("pav_ms")?,
        },
        statistics: ReportStatistics {
            ataf_burden_percent: row.get("ataf_burden_percent")?,
            ataf_count: row.get("ataf_count")?,
            ra_percent_paced: row.get("ra_percent_paced")?,
            rv_percent_paced: row.get("rv_percent_paced")?,
            lv_percent_paced: row.get("lv_percent_paced")?,
            biv_percent_paced: row.get("biv_percent_paced")?,
            pvc_count: row.get("pvc_count")?,
            nsvt_count: row.get("nsvt_count")?,
            atp_delivered_recent: row.get("atp_delivered_recent")?,
            shocks_delivered_recent: row.get("shocks_delivered_recent")?,
        },
        battery: ReportBattery {
            status: row.get("battery_status")?,
            percentage: row.get("battery_percentage")?,
            voltage: row.get("battery_voltage")?,
            remaining: row.get("battery_remaining")?,
            cap_charge_time_s: row.get("cap_charge_time_s")?,
        },
        measurements: ReportMeasurements {
            ra: lead_measurement_from_row(row, "ra")?,
            rv: lead_measurement_from_row(row, "rv")?,
            lv: lead_measurement_from_row(row, "lv")?,
            hv_impedance_ohms: row.get("hv_impedance_ohms")?,
        },
        tachy,
    })
}

pub fn insert_report(conn: &Connection, report: &Report) -> Result<(), DatabaseError> {
    let tachy_json = serde_json::to_string(&report.tachy)?;
    let placeholders: Vec<String> = (1..=REPORT_COLUMNS.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO reports ({}) VALUES ({})",
        REPORT_COLUMNS.join(", "),
        placeholders.join(", ")
    );

    let b = &report.brady;
    let s = &report.statistics;
    let bat = &report.battery;
    let m = &report.measurements;

    conn.execute(
        &sql,
        params![
            report.id.to_string(),
            report.patient_id.to_string(),
            report.device_id.map(|id| id.to_string()),
            report.status.as_str(),
            report.source_format.as_str(),
            report.report_date.as_ref().map(format_timestamp),
            report.created_by,
            format_timestamp(&report.created_at),
            report.file_path,
            report.patient_name,
            report.mrn,
            report.dob.map(|d| d.to_string()),
            report.device_manufacturer,
            report.device_model,
            report.device_serial,
            b.mode,
            b.low_rate_bpm,
            b.max_tracking_rate_bpm,
            b.max_sensor_rate_bpm,
            b.mode_switch_rate_bpm,
            b.sav_ms,
            b.pav_ms,
            s.ataf_burden_percent,
            s.ataf_count,
            s.ra_percent_paced,
            s.rv_percent_paced,
            s.lv_percent_paced,
            s.biv_percent_paced,
            s.pvc_count,
            s.nsvt_count,
            s.atp_delivered_recent,
            s.shocks_delivered_recent,
            bat.status,
            bat.percentage,
            bat.voltage,
            bat.remaining,
            bat.cap_charge_time_s,
            m.ra.impedance_ohms,
            m.ra.sensing_mv,
            m.ra.threshold_v,
            m.ra.pulse_width_ms,
            m.rv.impedance_ohms,
            m.rv.sensing_mv,
            m.rv.threshold_v,
            m.rv.pulse_width_ms,
            m.lv.impedance_ohms,
            m.lv.sensing_mv,
            m.lv.threshold_v,
            m.lv.pulse_width_ms,
            m.hv_impedance_ohms,
            tachy_json,
        ],
    )?;
    Ok(())
}

pub fn get_report(conn: &Connection, id: &Uuid) -> Result<Option<Report>, DatabaseError> {
    let report = conn
        .query_row(
            &select_sql("WHERE id = ?1"),
            params![id.to_string()],
            report_from_row,
        )
        .optional()?;
    Ok(report)
}

/// Newest first.
pub fn list_reports_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Report>, DatabaseError> {
    let mut stmt = conn.prepare(&select_sql(
        "WHERE patient_id = ?1 ORDER BY created_at DESC, rowid DESC",
    ))?;
    let rows = stmt
        .query_map(params![patient_id.to_string()], report_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
