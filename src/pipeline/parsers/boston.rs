//! Boston Scientific bank (`.bnk`) dump.
//!
//! Line 1 carries `SAVE DATE: DD MMM YYYY`; every following line is a
//! `KEY,VALUE` pair. Rates are stored as intervals and amplitudes as
//! integer thousandths, so most fields go through a conversion.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::normalize::{
    battery_phase, convert_threshold, date_from_parts, disable_shocks_without_energy, energy,
    interval_to_bpm, midnight_utc, months_to_years, number, parse_f64, parse_i64, remaining_shocks,
    text,
};
use super::parsed_data::{ParsedData, TachyZone, ZoneSettings};
use super::{DeviceParser, ParseError};
use crate::models::enums::{Chamber, DeviceFormat};

const MANUFACTURER: &str = "Boston Scientific";

/// VF therapy 4 energy. Banks always report this zone at maximum output.
pub const VF_MAX_ENERGY: &str = "41 J";

static SAVE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"SAVE DATE:\s*(\d{1,2})[\s-]+([A-Za-z]+|\d{1,2})[\s-]+(\d{4})").unwrap()
});

type Convert = fn(&str) -> Option<String>;

pub struct BostonParser;

impl DeviceParser for BostonParser {
    fn format(&self) -> DeviceFormat {
        DeviceFormat::Bnk
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParsedData, ParseError> {
        let bank = Bank::read(bytes)?;
        tracing::debug!(keys = bank.values.len(), "Read BNK entries");
        Ok(bank.into_parsed())
    }
}

struct Bank {
    /// ISO date from the header line.
    saved_on: String,
    values: HashMap<String, String>,
}

impl Bank {
    fn read(bytes: &[u8]) -> Result<Self, ParseError> {
        let content = String::from_utf8_lossy(bytes);
        let mut lines = content.lines();

        let header = lines.next().unwrap_or_default();
        let saved_on = parse_header(header).ok_or_else(|| {
            ParseError::malformed(DeviceFormat::Bnk, 1, "missing or unreadable SAVE DATE header")
        })?;

        let mut values = HashMap::new();
        for (index, line) in lines.enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(',') else {
                tracing::debug!(line = index + 2, "Skipping BNK line without a comma");
                continue;
            };
            values
                .entry(key.trim().to_string())
                .or_insert_with(|| value.trim().to_string());
        }

        Ok(Self { saved_on, values })
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.as_str())
            .filter(|v| !v.is_empty())
    }

    fn fill(&self, target: &mut Option<String>, key: &str, convert: Convert) {
        if let Some(raw) = self.get(key) {
            *target = convert(raw);
        }
    }

    /// `{prefix}Year`, `{prefix}Month` and optional `{prefix}Day` as an ISO date.
    fn date(&self, prefix: &str) -> Option<String> {
        let year = self.get(&format!("{prefix}Year"))?;
        let month = self.get(&format!("{prefix}Month"))?;
        date_from_parts(year, month, self.get(&format!("{prefix}Day")))
    }

    fn into_parsed(self) -> ParsedData {
        let mut data = ParsedData {
            manufacturer: Some(MANUFACTURER.into()),
            report_date: midnight_utc(&self.saved_on),
            ..Default::default()
        };

        let name: Vec<&str> = ["PatientFirstName", "PatientLastName"]
            .iter()
            .filter_map(|key| self.get(key))
            .collect();
        if !name.is_empty() {
            data.name = Some(name.join(" "));
        }
        data.dob = self.date("PatientBirth");

        self.fill(&mut data.serial_number, "SystemSerialNumber", text);
        self.fill(&mut data.model, "SystemName", text);
        data.implant_date = self.date("PatientData.Implant");

        self.map_leads(&mut data);
        self.map_brady(&mut data);
        self.map_battery(&mut data);
        self.map_measurements(&mut data);
        for zone in TachyZone::ALL {
            let settings = data.tachy.zone_mut(zone);
            self.map_zone(zone, settings);
            disable_shocks_without_energy(zone, settings);
        }
        data.tachy.vf.therapy4_energy = Some(VF_MAX_ENERGY.into());

        data
    }

    fn map_leads(&self, data: &mut ParsedData) {
        for (chamber, lead_prefix, implant_prefix) in [
            (Chamber::Ra, "PatientLeadA", "PatientData.LeadA.Implant"),
            (Chamber::Rv, "PatientLeadV1", "PatientData.Lead1.Implant"),
            (Chamber::Lv, "PatientLeadV2", "PatientData.Lead2.Implant"),
        ] {
            let lead = data.leads.chamber_mut(chamber);
            self.fill(&mut lead.serial_number, &format!("{lead_prefix}SerialNum"), text);
            self.fill(&mut lead.manufacturer, &format!("{lead_prefix}Manufacturer"), text);
            self.fill(&mut lead.model, &format!("{lead_prefix}ModelNum"), text);
            lead.implant_date = self.date(implant_prefix);
        }
    }

    fn map_brady(&self, data: &mut ParsedData) {
        let brady = &mut data.brady;
        self.fill(&mut brady.mode, "BdyNormBradyMode", text);
        self.fill(&mut brady.low_rate_bpm, "NormParams.LRLIntvl", interval_to_bpm);
        self.fill(&mut brady.max_tracking_rate_bpm, "NormParams.MTRIntvl", interval_to_bpm);
        self.fill(&mut brady.max_sensor_rate_bpm, "NormParams.MSRIntvl", interval_to_bpm);
    }

    fn map_battery(&self, data: &mut ParsedData) {
        let battery = &mut data.battery;
        self.fill(&mut battery.status, "BatteryStatus.BatteryPhase", battery_phase);
        self.fill(&mut battery.remaining, "BatteryLongevityParams.TimeToERI", months_to_years);
        self.fill(&mut battery.cap_charge_time, "CapformChargeTime", number);
    }

    fn map_measurements(&self, data: &mut ParsedData) {
        for (chamber, label) in [(Chamber::Ra, "RA"), (Chamber::Rv, "RV"), (Chamber::Lv, "LV")] {
            let m = data.measurements.chamber_mut(chamber);
            self.fill(&mut m.impedance_mean, &format!("ManualLeadImpedData.{label}Msmt.Msmt"), number);
            self.fill(&mut m.sensing_mean, &format!("ManualIntrinsicResult.{label}Msmt.Msmt"), number);
            self.fill(
                &mut m.pacing_threshold,
                &format!("InterPaceThreshResult.{label}Msmt.Amplitude"),
                |raw| Some(convert_threshold(raw)),
            );
            self.fill(&mut m.pulse_width, &format!("InterPaceThreshResult.{label}Msmt.PulseWidth"), number);
        }

        let hv = &mut data.measurements.hv_impedance_mean;
        self.fill(hv, "ShockImpedanceLastMeas0", number);
        if hv.is_none() {
            self.fill(hv, "ShockImpedanceLastMeas1", number);
        }
    }

    fn map_zone(&self, zone: TachyZone, settings: &mut ZoneSettings) {
        let (prefix, budget_key) = match zone {
            TachyZone::Vt1 => ("VT1", "VT1Zone"),
            TachyZone::Vt2 => ("VT", "VTZone"),
            TachyZone::Vf => ("VF", "VFZone"),
        };
        let key = |suffix: &str| format!("{prefix}{suffix}");

        self.fill(&mut settings.active, &key("ZoneEnable"), on_off);
        self.fill(&mut settings.detection_interval, &key("DetectIntvl"), interval_to_bpm);
        for slot in 1..=2u8 {
            if let Some(target) = settings.atp_mut(slot) {
                self.fill(target, &key(&format!("ATP{slot}Type")), text);
            }
            if let Some(target) = settings.no_bursts_mut(slot) {
                self.fill(target, &key(&format!("ATP{slot}NumberOfBursts")), number);
            }
        }

        let shock1 = self.get(&key("Shock1Energy"));
        let shock2 = self.get(&key("Shock2Energy"));
        settings.therapy3_energy = shock1.and_then(energy);
        settings.therapy4_energy = shock2.and_then(energy);

        let configured: Vec<f64> = [shock1, shock2].into_iter().flatten().filter_map(parse_f64).collect();
        let max_shocks = self
            .get(&format!("VTachyConstParam.VThpySelection.MaxNumShocks[{budget_key}]"))
            .and_then(parse_i64)
            .and_then(|n| u32::try_from(n).ok());

        let remaining = remaining_shocks(zone, max_shocks, &configured);
        if remaining.as_deref().is_some_and(|r| r != "Off") {
            settings.therapy5_energy = settings.therapy4_energy.clone();
        }
        settings.therapy5_max_num_shocks = remaining;
    }
}

/// `SAVE DATE: 02 Jun 2015` anywhere on the line, as an ISO date.
fn parse_header(line: &str) -> Option<String> {
    let caps = SAVE_DATE.captures(line)?;
    date_from_parts(&caps[3], &caps[2], Some(&caps[1]))
}

fn on_off(raw: &str) -> Option<String> {
    let value = raw.trim();
    match value.to_ascii_lowercase().as_str() {
        "on" | "1" | "true" | "enabled" => Some("On".into()),
        "off" | "0" | "false" | "disabled" => Some("Off".into()),
        _ => text(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(lines: &[&str]) -> Vec<u8> {
        let mut out = String::from("SAVE DATE: 02 Jun 2015\n");
        for line in lines {
            out.push_str(line);
            out.push('\n');
        }
        out.into_bytes()
    }

    fn parse(lines: &[&str]) -> ParsedData {
        BostonParser.parse(&bank(lines)).unwrap()
    }

    #[test]
    fn header_date_becomes_midnight_utc() {
        let data = parse(&[]);
        assert_eq!(data.report_date.as_deref(), Some("2015-06-02T00:00:00Z"));
        assert_eq!(data.manufacturer.as_deref(), Some("Boston Scientific"));
    }

    #[test]
    fn threshold_amplitude_is_scaled_to_volts() {
        let data = parse(&["InterPaceThreshResult.RAMsmt.Amplitude,2500"]);
        assert_eq!(data.measurements.ra.pacing_threshold.as_deref(), Some("2.500"));
    }

    #[test]
    fn nonzero_shocks_leave_remaining_budget() {
        let data = parse(&[
            "VT1Shock1Energy,25",
            "VT1Shock2Energy,31",
            "VTachyConstParam.VThpySelection.MaxNumShocks[VT1Zone],6",
        ]);
        let vt1 = &data.tachy.vt1;
        assert_eq!(vt1.therapy3_energy.as_deref(), Some("25 J"));
        assert_eq!(vt1.therapy4_energy.as_deref(), Some("31 J"));
        assert_eq!(vt1.therapy5_energy.as_deref(), Some("31 J"));
        assert_eq!(vt1.therapy5_max_num_shocks.as_deref(), Some("x 4"));
    }

    #[test]
    fn zero_shocks_turn_budget_off() {
        let data = parse(&[
            "VT1Shock1Energy,0",
            "VT1Shock2Energy,0",
            "VTachyConstParam.VThpySelection.MaxNumShocks[VT1Zone],6",
        ]);
        assert_eq!(data.tachy.vt1.therapy5_max_num_shocks.as_deref(), Some("Off"));
        assert!(data.tachy.vt1.therapy5_energy.is_none());
    }

    #[test]
    fn budget_is_clamped_at_zero() {
        let data = parse(&[
            "VFShock1Energy,41",
            "VFShock2Energy,41",
            "VTachyConstParam.VThpySelection.MaxNumShocks[VFZone],1",
        ]);
        assert_eq!(data.tachy.vf.therapy5_max_num_shocks.as_deref(), Some("x 0"));
    }

    #[test]
    fn zone_prefixes_do_not_collide() {
        let data = parse(&[
            "VT1DetectIntvl,400",
            "VTDetectIntvl,330",
            "VFDetectIntvl,250",
            "VTZoneEnable,1",
            "VTATP1Type,Ramp",
            "VTATP1NumberOfBursts,2",
        ]);
        assert_eq!(data.tachy.vt1.detection_interval.as_deref(), Some("150"));
        assert_eq!(data.tachy.vt2.detection_interval.as_deref(), Some("182"));
        assert_eq!(data.tachy.vf.detection_interval.as_deref(), Some("240"));
        assert_eq!(data.tachy.vt2.active.as_deref(), Some("On"));
        assert_eq!(data.tachy.vt2.therapy1_atp.as_deref(), Some("Ramp"));
        assert_eq!(data.tachy.vt2.therapy1_no_bursts.as_deref(), Some("2"));
        assert!(data.tachy.vt1.therapy1_atp.is_none());
    }

    #[test]
    fn vf_therapy4_energy_is_always_maximum() {
        let data = parse(&[]);
        assert_eq!(data.tachy.vf.therapy4_energy.as_deref(), Some(VF_MAX_ENERGY));

        let data = parse(&["VFShock1Energy,31", "VFShock2Energy,35"]);
        assert_eq!(data.tachy.vf.therapy3_energy.as_deref(), Some("31 J"));
        assert_eq!(data.tachy.vf.therapy4_energy.as_deref(), Some("41 J"));
    }

    #[test]
    fn full_bank_maps_identity_leads_and_settings() {
        let data = parse(&[
            "# exported by ZOOM LATITUDE",
            "",
            "PatientFirstName,Jane",
            "PatientLastName,Doe",
            "PatientBirthDay,7",
            "PatientBirthMonth,Sept",
            "PatientBirthYear,1961",
            "SystemSerialNumber,123456",
            "SystemName,DYNAGEN MINI ICD",
            "PatientData.ImplantDay,14",
            "PatientData.ImplantMonth,3",
            "PatientData.ImplantYear,2016",
            "PatientLeadV1SerialNum,RV987",
            "PatientLeadV1Manufacturer,Boston Scientific",
            "PatientLeadV1ModelNum,0293",
            "PatientData.Lead1.ImplantMonth,Mar",
            "PatientData.Lead1.ImplantYear,2016",
            "BdyNormBradyMode,DDD",
            "NormParams.LRLIntvl,1000",
            "NormParams.MTRIntvl,461",
            "NormParams.MSRIntvl,500",
            "BatteryStatus.BatteryPhase,Beginning of Life",
            "BatteryLongevityParams.TimeToERI,50",
            "CapformChargeTime,8.2",
            "ManualLeadImpedData.RVMsmt.Msmt,612",
            "ManualIntrinsicResult.RVMsmt.Msmt,14.1",
            "InterPaceThreshResult.RVMsmt.PulseWidth,0.4",
            "ShockImpedanceLastMeas1,71",
            "Comment,with,commas",
        ]);

        assert_eq!(data.name.as_deref(), Some("Jane Doe"));
        assert_eq!(data.dob.as_deref(), Some("1961-09-07"));
        assert_eq!(data.serial_number.as_deref(), Some("123456"));
        assert_eq!(data.model.as_deref(), Some("DYNAGEN MINI ICD"));
        assert_eq!(data.implant_date.as_deref(), Some("2016-03-14"));

        assert!(data.leads.ra.is_empty());
        assert_eq!(data.leads.rv.serial_number.as_deref(), Some("RV987"));
        assert_eq!(data.leads.rv.implant_date.as_deref(), Some("2016-03-01"));

        assert_eq!(data.brady.low_rate_bpm.as_deref(), Some("60"));
        assert_eq!(data.brady.max_tracking_rate_bpm.as_deref(), Some("130"));
        assert_eq!(data.brady.max_sensor_rate_bpm.as_deref(), Some("120"));

        assert_eq!(data.battery.status.as_deref(), Some("BOL"));
        assert_eq!(data.battery.remaining.as_deref(), Some("4.2 years"));
        assert_eq!(data.battery.cap_charge_time.as_deref(), Some("8.2"));

        assert_eq!(data.measurements.rv.impedance_mean.as_deref(), Some("612"));
        assert_eq!(data.measurements.rv.sensing_mean.as_deref(), Some("14.1"));
        assert_eq!(data.measurements.hv_impedance_mean.as_deref(), Some("71"));

        assert!(data.invariant_violations().is_empty());
    }

    #[test]
    fn missing_header_is_malformed_at_line_one() {
        let err = BostonParser.parse(b"SystemSerialNumber,123\n").unwrap_err();
        assert!(matches!(
            err,
            ParseError::MalformedInput { format: DeviceFormat::Bnk, offset: 1, .. }
        ));
    }

    #[test]
    fn unparseable_header_date_is_malformed() {
        let err = BostonParser.parse(b"SAVE DATE: 31 Foo 2015\n").unwrap_err();
        assert!(matches!(err, ParseError::MalformedInput { offset: 1, .. }));
    }

    #[test]
    fn header_may_carry_surrounding_text() {
        let data = BostonParser
            .parse(b"BANK 4  SAVE DATE: 9 Sep 2021  ZOOM\r\nSystemSerialNumber,1\r\n")
            .unwrap();
        assert_eq!(data.report_date.as_deref(), Some("2021-09-09T00:00:00Z"));
        assert_eq!(data.serial_number.as_deref(), Some("1"));
    }
}
