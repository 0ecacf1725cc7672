//! Abbott (St. Jude Merlin) `.log` export: one `code FS label FS value`
//! record per line.

use std::collections::HashMap;

use super::normalize::{
    coerce_iso_date, disable_shocks_without_energy, energy, number, rate_bpm, shock_count, text,
    us_timestamp,
};
use super::parsed_data::{ParsedData, TachyZone};
use super::{DeviceParser, ParseError};
use crate::models::enums::{Chamber, DeviceFormat};

const FIELD_SEPARATOR: char = '\u{1c}';
const MANUFACTURER: &str = "Abbott";
const VF_DEFAULT_MAX_NUM_SHOCKS: &str = "x 4";

type Convert = fn(&str) -> Option<String>;
type Codes = HashMap<u32, String>;

pub struct AbbottParser;

impl DeviceParser for AbbottParser {
    fn format(&self) -> DeviceFormat {
        DeviceFormat::Log
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParsedData, ParseError> {
        let codes = read_codes(bytes)?;
        tracing::debug!(records = codes.len(), "Read LOG records");
        Ok(map_codes(&codes))
    }
}

/// Code table for one tachy zone.
struct ZoneCodes {
    detection_interval: u32,
    therapy1_atp: u32,
    therapy1_no_bursts: u32,
    /// (therapy slot, code)
    energies: &'static [(u8, u32)],
    therapy5_max_num_shocks: Option<u32>,
}

fn zone_codes(zone: TachyZone) -> ZoneCodes {
    match zone {
        TachyZone::Vt1 => ZoneCodes {
            detection_interval: 2103,
            therapy1_atp: 2320,
            therapy1_no_bursts: 2291,
            energies: &[(3, 2327), (4, 2329), (5, 2331)],
            therapy5_max_num_shocks: Some(2323),
        },
        TachyZone::Vt2 => ZoneCodes {
            detection_interval: 2102,
            therapy1_atp: 2354,
            therapy1_no_bursts: 2341,
            energies: &[(3, 2361), (4, 2363), (5, 2365)],
            therapy5_max_num_shocks: Some(2357),
        },
        TachyZone::Vf => ZoneCodes {
            detection_interval: 2101,
            therapy1_atp: 2387,
            therapy1_no_bursts: 2382,
            energies: &[(3, 2384), (4, 2386)],
            therapy5_max_num_shocks: None,
        },
    }
}

/// Lead codes per chamber: serial, manufacturer, model, implant date.
/// Alternatives are tried in order.
fn lead_codes(chamber: Chamber) -> [&'static [u32]; 4] {
    match chamber {
        Chamber::Ra => [&[2468], &[2456], &[2457, 2458], &[2459]],
        Chamber::Rv => [&[2470, 2469], &[2460], &[2461, 2462], &[2463]],
        Chamber::Lv => [&[2471], &[2464], &[2465, 2466], &[2467]],
    }
}

/// Measurement codes per chamber: impedance, sensing, threshold, pulse width.
fn measurement_codes(chamber: Chamber) -> [&'static [u32]; 4] {
    match chamber {
        Chamber::Ra => [&[512], &[2721], &[1610, 849], &[1611]],
        Chamber::Rv => [&[507], &[2722], &[1606, 1620], &[1607]],
        Chamber::Lv => [&[2720], &[2723], &[1616, 3009], &[1617]],
    }
}

/// Build the code to value map. The first record for a code wins.
fn read_codes(bytes: &[u8]) -> Result<Codes, ParseError> {
    let content = String::from_utf8_lossy(bytes);
    let mut codes = Codes::new();

    for (index, line) in content.split('\n').enumerate() {
        let line_number = index as u64 + 1;
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        if fields.len() < 3 {
            return Err(ParseError::malformed(
                DeviceFormat::Log,
                line_number,
                format!("expected 3 fields, found {}", fields.len()),
            ));
        }
        let code = fields[0].trim().parse::<u32>().map_err(|_| {
            ParseError::malformed(
                DeviceFormat::Log,
                line_number,
                format!("non-numeric record code {:?}", fields[0].trim()),
            )
        })?;

        codes.entry(code).or_insert_with(|| fields[2].trim().to_string());
    }

    Ok(codes)
}

fn lookup<'a>(codes: &'a Codes, alternatives: &[u32]) -> Option<&'a str> {
    alternatives
        .iter()
        .filter_map(|code| codes.get(code))
        .map(|v| v.as_str())
        .find(|v| !v.is_empty())
}

fn fill(target: &mut Option<String>, codes: &Codes, alternatives: &[u32], convert: Convert) {
    if let Some(raw) = lookup(codes, alternatives) {
        *target = convert(raw);
    }
}

fn map_codes(codes: &Codes) -> ParsedData {
    let mut data = ParsedData {
        manufacturer: Some(MANUFACTURER.into()),
        ..Default::default()
    };

    fill(&mut data.name, codes, &[2430], text);
    fill(&mut data.report_date, codes, &[105], us_timestamp);
    fill(&mut data.dob, codes, &[2431], coerce_iso_date);
    fill(&mut data.serial_number, codes, &[202], text);
    fill(&mut data.model, codes, &[200], text);
    fill(&mut data.implant_date, codes, &[2442], coerce_iso_date);

    for chamber in Chamber::ALL {
        let [serial, manufacturer, model, implant] = lead_codes(chamber);
        let lead = data.leads.chamber_mut(chamber);
        fill(&mut lead.serial_number, codes, serial, text);
        fill(&mut lead.manufacturer, codes, manufacturer, text);
        fill(&mut lead.model, codes, model, text);
        fill(&mut lead.implant_date, codes, implant, coerce_iso_date);

        let [impedance, sensing, threshold, pulse_width] = measurement_codes(chamber);
        let m = data.measurements.chamber_mut(chamber);
        fill(&mut m.impedance_mean, codes, impedance, number);
        fill(&mut m.sensing_mean, codes, sensing, number);
        fill(&mut m.pacing_threshold, codes, threshold, number);
        fill(&mut m.pulse_width, codes, pulse_width, number);
    }

    let brady = &mut data.brady;
    fill(&mut brady.mode, codes, &[301], text);
    fill(&mut brady.low_rate_bpm, codes, &[302], rate_bpm);
    fill(&mut brady.max_sensor_rate_bpm, codes, &[406], rate_bpm);
    fill(&mut brady.max_tracking_rate_bpm, codes, &[323], rate_bpm);

    let stats = &mut data.statistics;
    fill(&mut stats.ataf_count, codes, &[2754], number);
    fill(&mut stats.ra_percent_paced, codes, &[2682], number);
    fill(&mut stats.rv_percent_paced, codes, &[2681], number);

    let battery = &mut data.battery;
    fill(&mut battery.voltage, codes, &[519], number);
    fill(&mut battery.cap_charge_time, codes, &[2745], number);
    fill(&mut battery.remaining, codes, &[533], text);

    for zone in TachyZone::ALL {
        let table = zone_codes(zone);
        let settings = data.tachy.zone_mut(zone);
        fill(&mut settings.detection_interval, codes, &[table.detection_interval], rate_bpm);
        fill(&mut settings.therapy1_atp, codes, &[table.therapy1_atp], text);
        fill(&mut settings.therapy1_no_bursts, codes, &[table.therapy1_no_bursts], number);
        for &(slot, code) in table.energies {
            if let Some(target) = settings.energy_mut(slot) {
                fill(target, codes, &[code], energy);
            }
        }
        if let Some(code) = table.therapy5_max_num_shocks {
            fill(&mut settings.therapy5_max_num_shocks, codes, &[code], shock_count);
        }
    }
    data.tachy.vf.therapy4_max_num_shocks = Some(VF_DEFAULT_MAX_NUM_SHOCKS.into());
    for zone in TachyZone::ALL {
        disable_shocks_without_energy(zone, data.tachy.zone_mut(zone));
    }

    data
}
