use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Chamber;

/// A generator implanted in a patient. `(patient_id, serial)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplantedDevice {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub serial: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub implanted_at: NaiveDate,
}

/// A lead implanted in a patient. `(patient_id, serial, chamber)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplantedLead {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub serial: String,
    pub chamber: Chamber,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub implanted_at: Option<NaiveDate>,
}
