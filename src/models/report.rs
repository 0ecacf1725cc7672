use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{Chamber, DeviceFormat, ReportStatus};
use crate::pipeline::parsers::TachySettings;

/// One ingested interrogation. Values are typed copies of what the source
/// file reported at `report_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub device_id: Option<Uuid>,
    pub status: ReportStatus,
    pub source_format: DeviceFormat,
    pub report_date: Option<DateTime<Utc>>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub file_path: Option<String>,

    pub patient_name: Option<String>,
    pub mrn: Option<i64>,
    pub dob: Option<NaiveDate>,

    pub device_manufacturer: Option<String>,
    pub device_model: Option<String>,
    pub device_serial: Option<String>,

    pub brady: ReportBrady,
    pub statistics: ReportStatistics,
    pub battery: ReportBattery,
    pub measurements: ReportMeasurements,
    pub tachy: TachySettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportBrady {
    pub mode: Option<String>,
    pub low_rate_bpm: Option<i64>,
    pub max_tracking_rate_bpm: Option<i64>,
    pub max_sensor_rate_bpm: Option<i64>,
    pub mode_switch_rate_bpm: Option<i64>,
    pub sav_ms: Option<f64>,
    pub pav_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportStatistics {
    pub ataf_burden_percent: Option<f64>,
    pub ataf_count: Option<i64>,
    pub ra_percent_paced: Option<f64>,
    pub rv_percent_paced: Option<f64>,
    pub lv_percent_paced: Option<f64>,
    pub biv_percent_paced: Option<f64>,
    pub pvc_count: Option<i64>,
    pub nsvt_count: Option<i64>,
    pub atp_delivered_recent: Option<i64>,
    pub shocks_delivered_recent: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportBattery {
    pub status: Option<String>,
    pub percentage: Option<f64>,
    pub voltage: Option<f64>,
    pub remaining: Option<String>,
    pub cap_charge_time_s: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadMeasurement {
    pub impedance_ohms: Option<f64>,
    pub sensing_mv: Option<f64>,
    pub threshold_v: Option<f64>,
    pub pulse_width_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportMeasurements {
    pub ra: LeadMeasurement,
    pub rv: LeadMeasurement,
    pub lv: LeadMeasurement,
    pub hv_impedance_ohms: Option<f64>,
}

impl ReportMeasurements {
    pub fn chamber(&self, chamber: Chamber) -> &LeadMeasurement {
        match chamber {
            Chamber::Ra => &self.ra,
            Chamber::Rv => &self.rv,
            Chamber::Lv => &self.lv,
        }
    }

    pub fn chamber_mut(&mut self, chamber: Chamber) -> &mut LeadMeasurement {
        match chamber {
            Chamber::Ra => &mut self.ra,
            Chamber::Rv => &mut self.rv,
            Chamber::Lv => &mut self.lv,
        }
    }
}
