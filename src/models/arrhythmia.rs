use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrhythmia {
    pub id: Uuid,
    pub report_id: Uuid,
    pub kind: String,
    pub occurred_at: Option<DateTime<Utc>>,
    pub duration: Option<String>,
    pub therapy: Option<String>,
}
