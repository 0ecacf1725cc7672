use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{date_column, enum_column, uuid_column};
use crate::db::DatabaseError;
use crate::models::enums::Chamber;
use crate::models::{ImplantedDevice, ImplantedLead};

// ═══════════════════════════════════════════════════════════
// Devices
// ═══════════════════════════════════════════════════════════

const DEVICE_COLUMNS: &str = "id, patient_id, serial, manufacturer, model, implanted_at";

fn device_from_row(row: &Row<'_>) -> rusqlite::Result<ImplantedDevice> {
    let idx = row.as_ref().column_index("implanted_at")?;
    Ok(ImplantedDevice {
        id: uuid_column(row, "id")?,
        patient_id: uuid_column(row, "patient_id")?,
        serial: row.get("serial")?,
        manufacturer: row.get("manufacturer")?,
        model: row.get("model")?,
        implanted_at: date_column(row, "implanted_at")?.ok_or(
            rusqlite::Error::InvalidColumnType(
                idx,
                "implanted_at".into(),
                rusqlite::types::Type::Null,
            ),
        )?,
    })
}

/// Device lookup by its natural key within one patient.
pub fn find_device(
    conn: &Connection,
    patient_id: &Uuid,
    serial: &str,
) -> Result<Option<ImplantedDevice>, DatabaseError> {
    let device = conn
        .query_row(
            &format!(
                "SELECT {DEVICE_COLUMNS} FROM implanted_devices
                 WHERE patient_id = ?1 AND serial = ?2"
            ),
            params![patient_id.to_string(), serial],
            device_from_row,
        )
        .optional()?;
    Ok(device)
}

pub fn insert_device(conn: &Connection, device: &ImplantedDevice) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO implanted_devices (id, patient_id, serial, manufacturer, model, implanted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            device.id.to_string(),
            device.patient_id.to_string(),
            device.serial,
            device.manufacturer,
            device.model,
            device.implanted_at.to_string(),
        ],
    )?;
    Ok(())
}

/// Fill manufacturer/model only where the stored value is still unknown.
pub fn update_device_details(
    conn: &Connection,
    id: &Uuid,
    manufacturer: Option<&str>,
    model: Option<&str>,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE implanted_devices
         SET manufacturer = COALESCE(manufacturer, ?2),
             model = COALESCE(model, ?3)
         WHERE id = ?1",
        params![id.to_string(), manufacturer, model],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "ImplantedDevice".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn get_device(conn: &Connection, id: &Uuid) -> Result<Option<ImplantedDevice>, DatabaseError> {
    let device = conn
        .query_row(
            &format!("SELECT {DEVICE_COLUMNS} FROM implanted_devices WHERE id = ?1"),
            params![id.to_string()],
            device_from_row,
        )
        .optional()?;
    Ok(device)
}

// ═══════════════════════════════════════════════════════════
// Leads
// ═══════════════════════════════════════════════════════════

const LEAD_COLUMNS: &str = "id, patient_id, serial, chamber, manufacturer, model, implanted_at";

fn lead_from_row(row: &Row<'_>) -> rusqlite::Result<ImplantedLead> {
    Ok(ImplantedLead {
        id: uuid_column(row, "id")?,
        patient_id: uuid_column(row, "patient_id")?,
        serial: row.get("serial")?,
        chamber: enum_column(row, "chamber")?,
        manufacturer: row.get("manufacturer")?,
        model: row.get("model")?,
        implanted_at: date_column(row, "implanted_at")?,
    })
}

pub fn find_lead(
    conn: &Connection,
    patient_id: &Uuid,
    serial: &str,
    chamber: Chamber,
) -> Result<Option<ImplantedLead>, DatabaseError> {
    let lead = conn
        .query_row(
            &format!(
                "SELECT {LEAD_COLUMNS} FROM implanted_leads
                 WHERE patient_id = ?1 AND serial = ?2 AND chamber = ?3"
            ),
            params![patient_id.to_string(), serial, chamber.as_str()],
            lead_from_row,
        )
        .optional()?;
    Ok(lead)
}

pub fn insert_lead(conn: &Connection, lead: &ImplantedLead) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO implanted_leads (id, patient_id, serial, chamber, manufacturer, model, implanted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            lead.id.to_string(),
            lead.patient_id.to_string(),
            lead.serial,
            lead.chamber.as_str(),
            lead.manufacturer,
            lead.model,
            lead.implanted_at.map(|d| d.to_string()),
        ],
    )?;
    Ok(())
}

/// Same fill-in rule as devices; the implant date is also filled when missing.
pub fn update_lead_details(
    conn: &Connection,
    id: &Uuid,
    manufacturer: Option<&str>,
    model: Option<&str>,
    implanted_at: Option<chrono::NaiveDate>,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE implanted_leads
         SET manufacturer = COALESCE(manufacturer, ?2),
             model = COALESCE(model, ?3),
             implanted_at = COALESCE(implanted_at, ?4)
         WHERE id = ?1",
        params![
            id.to_string(),
            manufacturer,
            model,
            implanted_at.map(|d| d.to_string()),
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "ImplantedLead".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn get_lead(conn: &Connection, id: &Uuid) -> Result<Option<ImplantedLead>, DatabaseError> {
    let lead = conn
        .query_row(
            &format!("SELECT {LEAD_COLUMNS} FROM implanted_leads WHERE id = ?1"),
            params![id.to_string()],
            lead_from_row,
        )
        .optional()?;
    Ok(lead)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::insert_patient;
    use crate::db::sqlite::open_memory_database;
    use crate::models::Patient;
    use chrono::NaiveDate;

    fn seed_patient(conn: &Connection) -> Uuid {
        let patient = Patient {
            id: Uuid::new_v4(),
            mrn: None,
            first_name: "Lena".into(),
            last_name: "Kovacs".into(),
            date_of_birth: None,
        };
        insert_patient(conn, &patient).unwrap();
        patient.id
    }

    fn make_device(patient_id: Uuid, serial: &str) -> ImplantedDevice {
        ImplantedDevice {
            id: Uuid::new_v4(),
            patient_id,
            serial: serial.into(),
            manufacturer: None,
            model: Some("Evia DR-T".into()),
            implanted_at: NaiveDate::from_ymd_opt(2019, 6, 2).unwrap(),
        }
    }

    #[test]
    fn device_found_by_patient_and_serial() {
        let conn = open_memory_database().unwrap();
        let patient_id = seed_patient(&conn);
        let device = make_device(patient_id, "60123456");
        insert_device(&conn, &device).unwrap();

        let found = find_device(&conn, &patient_id, "60123456").unwrap().unwrap();
        assert_eq!(found, device);
        assert!(find_device(&conn, &patient_id, "99999999").unwrap().is_none());
    }

    #[test]
    fn duplicate_serial_for_same_patient_rejected() {
        let conn = open_memory_database().unwrap();
        let patient_id = seed_patient(&conn);
        insert_device(&conn, &make_device(patient_id, "A1")).unwrap();
        assert!(insert_device(&conn, &make_device(patient_id, "A1")).is_err());
    }

    #[test]
    fn same_serial_allowed_across_patients() {
        let conn = open_memory_database().unwrap();
        let first = seed_patient(&conn);
        let second = seed_patient(&conn);
        insert_device(&conn, &make_device(first, "A1")).unwrap();
        insert_device(&conn, &make_device(second, "A1")).unwrap();

        let a = find_device(&conn, &first, "A1").unwrap().unwrap();
        let b = find_device(&conn, &second, "A1").unwrap().unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn update_fills_only_unknown_details() {
        let conn = open_memory_database().unwrap();
        let patient_id = seed_patient(&conn);
        let device = make_device(patient_id, "A1");
        insert_device(&conn, &device).unwrap();

        update_device_details(&conn, &device.id, Some("Biotronik"), Some("Other")).unwrap();
        let loaded = get_device(&conn, &device.id).unwrap().unwrap();
        assert_eq!(loaded.manufacturer.as_deref(), Some("Biotronik"));
        assert_eq!(loaded.model.as_deref(), Some("Evia DR-T"));
    }

    #[test]
    fn update_missing_device_is_not_found() {
        let conn = open_memory_database().unwrap();
        let err = update_device_details(&conn, &Uuid::new_v4(), None, None).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn lead_key_includes_chamber() {
        let conn = open_memory_database().unwrap();
        let patient_id = seed_patient(&conn);
        for chamber in [Chamber::Lv, Chamber::Ra] {
            insert_lead(
                &conn,
                &ImplantedLead {
                    id: Uuid::new_v4(),
                    patient_id,
                    serial: "L-77".into(),
                    chamber,
                    manufacturer: None,
                    model: None,
                    implanted_at: None,
                },
            )
            .unwrap();
        }

        assert!(find_lead(&conn, &patient_id, "L-77", Chamber::Ra).unwrap().is_some());
        assert!(find_lead(&conn, &patient_id, "L-77", Chamber::Lv).unwrap().is_some());
        assert!(find_lead(&conn, &patient_id, "L-77", Chamber::Rv).unwrap().is_none());
    }

    #[test]
    fn lead_update_fills_implant_date() {
        let conn = open_memory_database().unwrap();
        let patient_id = seed_patient(&conn);
        let lead = ImplantedLead {
            id: Uuid::new_v4(),
            patient_id,
            serial: "L-1".into(),
            chamber: Chamber::Rv,
            manufacturer: Some("Abbott".into()),
            model: None,
            implanted_at: None,
        };
        insert_lead(&conn, &lead).unwrap();

        let date = NaiveDate::from_ymd_opt(2020, 1, 15);
        update_lead_details(&conn, &lead.id, Some("Medtronic"), Some("7122Q"), date).unwrap();

        let loaded = get_lead(&conn, &lead.id).unwrap().unwrap();
        assert_eq!(loaded.manufacturer.as_deref(), Some("Abbott"));
        assert_eq!(loaded.model.as_deref(), Some("7122Q"));
        assert_eq!(loaded.implanted_at, date);
    }
}
