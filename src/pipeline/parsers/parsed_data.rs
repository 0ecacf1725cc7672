//! Vendor-neutral interrogation record.
//!
//! Every parser populates what its source exposes and leaves the rest as
//! `None`. Field labels (PascalCase in JSON) and string formats are stable:
//! dates are ISO `YYYY-MM-DD`, `ReportDate` is RFC 3339 UTC, rates are
//! positive integer bpm, energies carry a `" J"` suffix and pacing
//! thresholds are volts.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use super::normalize::parse_f64;
use crate::models::enums::Chamber;

/// Tachycardia detection zone, slowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TachyZone {
    #[serde(rename = "VT1")]
    Vt1,
    #[serde(rename = "VT2")]
    Vt2,
    #[serde(rename = "VF")]
    Vf,
}

impl TachyZone {
    pub const ALL: [TachyZone; 3] = [TachyZone::Vt1, TachyZone::Vt2, TachyZone::Vf];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Vt1 => "VT1",
            Self::Vt2 => "VT2",
            Self::Vf => "VF",
        }
    }

    /// Route a Biotronik `SET/ZONE/VENDOR_TYPE` value to its zone.
    pub fn from_biotronik_vendor_type(vendor_type: &str) -> Option<Self> {
        match vendor_type.trim() {
            "BIO-Zone_VT1" => Some(Self::Vt1),
            "BIO-Zone_VT2" => Some(Self::Vt2),
            "BIO-Zone_VF" => Some(Self::Vf),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ParsedData {
    pub name: Option<String>,
    pub mrn: Option<String>,
    pub dob: Option<String>,
    pub report_date: Option<String>,

    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub implant_date: Option<String>,

    pub leads: Leads,
    pub brady: BradySettings,
    pub statistics: Statistics,
    pub battery: Battery,
    pub measurements: Measurements,
    pub tachy: TachySettings,
    pub arrhythmias: Vec<ArrhythmiaEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LeadInfo {
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub implant_date: Option<String>,
}

impl LeadInfo {
    pub fn is_empty(&self) -> bool {
        self.serial_number.is_none()
            && self.manufacturer.is_none()
            && self.model.is_none()
            && self.implant_date.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Leads {
    pub ra: LeadInfo,
    pub rv: LeadInfo,
    pub lv: LeadInfo,
}

impl Leads {
    pub fn chamber(&self, chamber: Chamber) -> &LeadInfo {
        match chamber {
            Chamber::Ra => &self.ra,
            Chamber::Rv => &self.rv,
            Chamber::Lv => &self.lv,
        }
    }

    /// Direct slot access for sources that encode the chamber explicitly.
    pub fn chamber_mut(&mut self, chamber: Chamber) -> &mut LeadInfo {
        match chamber {
            Chamber::Ra => &mut self.ra,
            Chamber::Rv => &mut self.rv,
            Chamber::Lv => &mut self.lv,
        }
    }

    /// Assign leads to RA, RV, LV in the order they were found.
    ///
    /// Used for exports that do not say which chamber a lead sits in.
    /// Leads beyond the third are dropped; the number dropped is returned.
    pub fn assign_in_document_order<I>(&mut self, leads: I) -> usize
    where
        I: IntoIterator<Item = LeadInfo>,
    {
        let mut dropped = 0;
        let mut slots = Chamber::ALL.iter();
        for lead in leads {
            match slots.next() {
                Some(chamber) => *self.chamber_mut(*chamber) = lead,
                None => dropped += 1,
            }
        }
        dropped
    }

    /// Chambers with an identifiable lead (serial number present).
    pub fn with_serial(&self) -> impl Iterator<Item = (Chamber, &LeadInfo)> + '_ {
        Chamber::ALL
            .into_iter()
            .map(move |c| (c, self.chamber(c)))
            .filter(|(_, lead)| lead.serial_number.is_some())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BradySettings {
    pub mode: Option<String>,
    pub low_rate_bpm: Option<String>,
    pub max_tracking_rate_bpm: Option<String>,
    pub max_sensor_rate_bpm: Option<String>,
    pub mode_switch_rate: Option<String>,
    pub sav: Option<String>,
    pub pav: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Statistics {
    pub ataf_burden_percent: Option<String>,
    pub ataf_count: Option<String>,
    pub ra_percent_paced: Option<String>,
    pub rv_percent_paced: Option<String>,
    pub lv_percent_paced: Option<String>,
    pub biv_percent_paced: Option<String>,
    pub pvc_count: Option<String>,
    pub nsvt_count: Option<String>,
    pub atp_delivered_recent: Option<String>,
    pub shocks_delivered_recent: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Battery {
    pub status: Option<String>,
    pub percentage: Option<String>,
    pub voltage: Option<String>,
    pub remaining: Option<String>,
    pub cap_charge_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ChamberMeasurement {
    pub impedance_mean: Option<String>,
    pub sensing_mean: Option<String>,
    /// Volts.
    pub pacing_threshold: Option<String>,
    /// Milliseconds.
    pub pulse_width: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Measurements {
    pub ra: ChamberMeasurement,
    pub rv: ChamberMeasurement,
    pub lv: ChamberMeasurement,
    pub hv_impedance_mean: Option<String>,
}

impl Measurements {
    pub fn chamber(&self, chamber: Chamber) -> &ChamberMeasurement {
        match chamber {
            Chamber::Ra => &self.ra,
            Chamber::Rv => &self.rv,
            Chamber::Lv => &self.lv,
        }
    }

    pub fn chamber_mut(&mut self, chamber: Chamber) -> &mut ChamberMeasurement {
        match chamber {
            Chamber::Ra => &mut self.ra,
            Chamber::Rv => &mut self.rv,
            Chamber::Lv => &mut self.lv,
        }
    }
}

/// Programmed detection and therapy for one tachy zone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ZoneSettings {
    pub active: Option<String>,
    /// Beats per minute.
    pub detection_interval: Option<String>,
    pub therapy1_atp: Option<String>,
    pub therapy1_no_bursts: Option<String>,
    pub therapy2_atp: Option<String>,
    pub therapy2_no_bursts: Option<String>,
    pub therapy3_atp: Option<String>,
    pub therapy3_no_bursts: Option<String>,
    pub therapy3_energy: Option<String>,
    pub therapy4_atp: Option<String>,
    pub therapy4_no_bursts: Option<String>,
    pub therapy4_energy: Option<String>,
    pub therapy4_max_num_shocks: Option<String>,
    pub therapy5_atp: Option<String>,
    pub therapy5_no_bursts: Option<String>,
    pub therapy5_energy: Option<String>,
    pub therapy5_max_num_shocks: Option<String>,
}

impl ZoneSettings {
    /// ATP scheme for therapy slot 1..=5.
    pub fn atp_mut(&mut self, slot: u8) -> Option<&mut Option<String>> {
        match slot {
            1 => Some(&mut self.therapy1_atp),
            2 => Some(&mut self.therapy2_atp),
            3 => Some(&mut self.therapy3_atp),
            4 => Some(&mut self.therapy4_atp),
            5 => Some(&mut self.therapy5_atp),
            _ => None,
        }
    }

    /// Burst count for therapy slot 1..=5.
    pub fn no_bursts_mut(&mut self, slot: u8) -> Option<&mut Option<String>> {
        match slot {
            1 => Some(&mut self.therapy1_no_bursts),
            2 => Some(&mut self.therapy2_no_bursts),
            3 => Some(&mut self.therapy3_no_bursts),
            4 => Some(&mut self.therapy4_no_bursts),
            5 => Some(&mut self.therapy5_no_bursts),
            _ => None,
        }
    }

    /// Shock energy for therapy slot 3..=5.
    pub fn energy_mut(&mut self, slot: u8) -> Option<&mut Option<String>> {
        match slot {
            3 => Some(&mut self.therapy3_energy),
            4 => Some(&mut self.therapy4_energy),
            5 => Some(&mut self.therapy5_energy),
            _ => None,
        }
    }

    /// Shock count for therapy slot 4..=5.
    pub fn max_num_shocks_mut(&mut self, slot: u8) -> Option<&mut Option<String>> {
        match slot {
            4 => Some(&mut self.therapy4_max_num_shocks),
            5 => Some(&mut self.therapy5_max_num_shocks),
            _ => None,
        }
    }

    fn energies(&self) -> [(&'static str, &Option<String>); 3] {
        [
            ("Therapy3Energy", &self.therapy3_energy),
            ("Therapy4Energy", &self.therapy4_energy),
            ("Therapy5Energy", &self.therapy5_energy),
        ]
    }

    fn shock_counts(&self) -> [(&'static str, &Option<String>); 2] {
        [
            ("Therapy4MaxNumShocks", &self.therapy4_max_num_shocks),
            ("Therapy5MaxNumShocks", &self.therapy5_max_num_shocks),
        ]
    }

    /// At least one shock energy is programmed and every programmed one is zero.
    pub fn shocks_disabled(&self) -> bool {
        let mut programmed = self
            .energies()
            .into_iter()
            .filter_map(|(_, value)| value.as_deref())
            .peekable();
        programmed.peek().is_some() && programmed.all(|v| parse_f64(v) == Some(0.0))
    }

    pub fn is_empty(&self) -> bool {
        *self == ZoneSettings::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TachySettings {
    #[serde(rename = "VT1")]
    pub vt1: ZoneSettings,
    #[serde(rename = "VT2")]
    pub vt2: ZoneSettings,
    #[serde(rename = "VF")]
    pub vf: ZoneSettings,
}

impl TachySettings {
    pub fn zone(&self, zone: TachyZone) -> &ZoneSettings {
        match zone {
            TachyZone::Vt1 => &self.vt1,
            TachyZone::Vt2 => &self.vt2,
            TachyZone::Vf => &self.vf,
        }
    }

    pub fn zone_mut(&mut self, zone: TachyZone) -> &mut ZoneSettings {
        match zone {
            TachyZone::Vt1 => &mut self.vt1,
            TachyZone::Vt2 => &mut self.vt2,
            TachyZone::Vf => &mut self.vf,
        }
    }

    pub fn is_empty(&self) -> bool {
        TachyZone::ALL.iter().all(|z| self.zone(*z).is_empty())
    }
}

/// A discrete episode surfaced by the device (only some exports carry them).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ArrhythmiaEvent {
    #[serde(rename = "Type")]
    pub kind: String,
    /// RFC 3339 UTC.
    pub date: Option<String>,
    pub duration: Option<String>,
    pub therapy: Option<String>,
}

impl ParsedData {
    /// Field labels whose values break the format conventions above.
    ///
    /// An empty list means every populated field is in canonical form.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        if let Some(date) = &self.report_date {
            if !is_rfc3339_utc(date) {
                violations.push("ReportDate".to_string());
            }
        }

        let mut dates: Vec<(String, &Option<String>)> = vec![
            ("Dob".into(), &self.dob),
            ("ImplantDate".into(), &self.implant_date),
        ];
        for chamber in Chamber::ALL {
            dates.push((
                format!("Leads.{}.ImplantDate", chamber.label()),
                &self.leads.chamber(chamber).implant_date,
            ));
        }
        for (label, value) in dates {
            if let Some(v) = value {
                if !is_iso_date(v) {
                    violations.push(label);
                }
            }
        }

        let mut rates: Vec<(String, &Option<String>)> = vec![
            ("LowRateBpm".into(), &self.brady.low_rate_bpm),
            ("MaxTrackingRateBpm".into(), &self.brady.max_tracking_rate_bpm),
            ("MaxSensorRateBpm".into(), &self.brady.max_sensor_rate_bpm),
        ];
        for zone in TachyZone::ALL {
            rates.push((
                format!("{}.DetectionInterval", zone.label()),
                &self.tachy.zone(zone).detection_interval,
            ));
        }
        for (label, value) in rates {
            if let Some(v) = value {
                if !matches!(v.parse::<u32>(), Ok(n) if n > 0) {
                    violations.push(label);
                }
            }
        }

        for chamber in Chamber::ALL {
            if let Some(v) = &self.measurements.chamber(chamber).pacing_threshold {
                if v.parse::<f64>().is_err() {
                    violations.push(format!("{}.PacingThreshold", chamber.label()));
                }
            }
        }

        for zone in TachyZone::ALL {
            let settings = self.tachy.zone(zone);
            for (label, value) in settings.energies() {
                if let Some(v) = value {
                    if !v.ends_with(" J") {
                        violations.push(format!("{}.{label}", zone.label()));
                    }
                }
            }
            let disabled = settings.shocks_disabled();
            for (label, value) in settings.shock_counts() {
                if let Some(v) = value {
                    if !is_shock_count(v) || (disabled && v != "Off") {
                        violations.push(format!("{}.{label}", zone.label()));
                    }
                }
            }
        }

        violations
    }
}

fn is_rfc3339_utc(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.offset().local_minus_utc() == 0)
        .unwrap_or(false)
}

fn is_iso_date(value: &str) -> bool {
    value.len() == 10 && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

fn is_shock_count(value: &str) -> bool {
    value == "Off"
        || value
            .strip_prefix("x ")
            .map(|n| n.parse::<u32>().is_ok())
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead(serial: &str) -> LeadInfo {
        LeadInfo {
            serial_number: Some(serial.into()),
            ..Default::default()
        }
    }

    #[test]
    fn leads_assigned_in_document_order() {
        let mut leads = Leads::default();
        let dropped =
            leads.assign_in_document_order(vec![lead("A"), lead("B"), lead("C"), lead("D")]);
        assert_eq!(dropped, 1);
        assert_eq!(leads.ra.serial_number.as_deref(), Some("A"));
        assert_eq!(leads.rv.serial_number.as_deref(), Some("B"));
        assert_eq!(leads.lv.serial_number.as_deref(), Some("C"));
    }

    #[test]
    fn fewer_leads_leave_later_slots_unset() {
        let mut leads = Leads::default();
        leads.assign_in_document_order(vec![lead("A")]);
        assert!(leads.rv.is_empty());
        assert!(leads.lv.is_empty());
        let present: Vec<_> = leads.with_serial().map(|(c, _)| c).collect();
        assert_eq!(present, vec![Chamber::Ra]);
    }

    #[test]
    fn json_labels_are_stable() {
        let mut data = ParsedData {
            serial_number: Some("123".into()),
            ..Default::default()
        };
        data.brady.low_rate_bpm = Some("60".into());
        data.tachy.vt1.therapy5_max_num_shocks = Some("x 4".into());
        data.leads.rv.serial_number = Some("RV1".into());

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["SerialNumber"], "123");
        assert_eq!(json["Brady"]["LowRateBpm"], "60");
        assert_eq!(json["Tachy"]["VT1"]["Therapy5MaxNumShocks"], "x 4");
        assert_eq!(json["Leads"]["Rv"]["SerialNumber"], "RV1");

        let back: ParsedData = serde_json::from_value(json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn canonical_values_have_no_violations() {
        let mut data = ParsedData {
            dob: Some("1970-01-01".into()),
            report_date: Some("2024-03-01T10:00:00Z".into()),
            ..Default::default()
        };
        data.brady.low_rate_bpm = Some("60".into());
        data.measurements.ra.pacing_threshold = Some("2.500".into());
        data.tachy.vf.therapy3_energy = Some("41 J".into());
        data.tachy.vf.therapy5_max_num_shocks = Some("Off".into());
        assert!(data.invariant_violations().is_empty());
    }

    #[test]
    fn malformed_values_are_reported() {
        let mut data = ParsedData {
            dob: Some("01/01/1970".into()),
            report_date: Some("2024-03-01T10:00:00+02:00".into()),
            ..Default::default()
        };
        data.brady.low_rate_bpm = Some("0".into());
        data.tachy.vt2.therapy4_energy = Some("25".into());
        data.tachy.vt2.therapy5_max_num_shocks = Some("4".into());

        let violations = data.invariant_violations();
        assert!(violations.contains(&"ReportDate".to_string()));
        assert!(violations.contains(&"Dob".to_string()));
        assert!(violations.contains(&"LowRateBpm".to_string()));
        assert!(violations.contains(&"VT2.Therapy4Energy".to_string()));
        assert!(violations.contains(&"VT2.Therapy5MaxNumShocks".to_string()));
    }

    #[test]
    fn shock_count_without_energy_is_reported() {
        let mut data = ParsedData::default();
        data.tachy.vt1.therapy3_energy = Some("0 J".into());
        data.tachy.vt1.therapy5_energy = Some("0 J".into());
        data.tachy.vt1.therapy5_max_num_shocks = Some("x 6".into());
        assert_eq!(data.invariant_violations(), vec!["VT1.Therapy5MaxNumShocks".to_string()]);

        data.tachy.vt1.therapy5_max_num_shocks = Some("Off".into());
        assert!(data.invariant_violations().is_empty());

        data.tachy.vt1.therapy4_energy = Some("20 J".into());
        data.tachy.vt1.therapy5_max_num_shocks = Some("x 6".into());
        assert!(data.invariant_violations().is_empty());
    }

    #[test]
    fn shocks_disabled_needs_a_programmed_energy() {
        let mut zone = ZoneSettings::default();
        assert!(!zone.shocks_disabled());
        zone.therapy4_energy = Some("0 J".into());
        assert!(zone.shocks_disabled());
        zone.therapy3_energy = Some("5 J".into());
        assert!(!zone.shocks_disabled());
    }

    #[test]
    fn biotronik_vendor_types_route_to_zones() {
        assert_eq!(
            TachyZone::from_biotronik_vendor_type("BIO-Zone_VT2"),
            Some(TachyZone::Vt2)
        );
        assert_eq!(TachyZone::from_biotronik_vendor_type("BIO-Zone_ATR"), None);
    }

    #[test]
    fn zone_slot_accessors_cover_schema() {
        let mut zone = ZoneSettings::default();
        assert!(zone.energy_mut(2).is_none());
        assert!(zone.max_num_shocks_mut(3).is_none());
        *zone.atp_mut(5).unwrap() = Some("Ramp".into());
        assert_eq!(zone.therapy5_atp.as_deref(), Some("Ramp"));
        assert!(!zone.is_empty());
    }
}
