//! Biotronik IEEE 11073 XML export.
//!
//! The document is streamed once into a tree of named sections, then the
//! known `MDC/IDC/...` paths are read out of that tree. Sections the table
//! does not name are kept in the tree but never looked at.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::normalize::{
    battery_phase, coerce_iso_date, disable_shocks_without_energy, energy, interval_to_bpm, number,
    rate_bpm, rfc3339_utc, shock_count, text,
};
use super::parsed_data::{ArrhythmiaEvent, LeadInfo, ParsedData, TachyZone, ZoneSettings};
use super::{DeviceParser, ParseError};
use crate::models::enums::{Chamber, DeviceFormat};

const ROOT_ELEMENT: &[u8] = b"biotronik-ieee11073-export";

type Convert = fn(&str) -> Option<String>;

pub struct BiotronikParser;

impl DeviceParser for BiotronikParser {
    fn format(&self) -> DeviceFormat {
        DeviceFormat::Xml
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParsedData, ParseError> {
        let dataset = read_dataset(bytes)?;
        Ok(map_dataset(&dataset))
    }
}

/// One `<section name="...">` with its values in document order.
#[derive(Debug, Default)]
struct Section {
    name: String,
    values: Vec<(String, String)>,
    sections: Vec<Section>,
}

impl Section {
    fn named(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    fn sections_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Section> + 'a {
        self.sections.iter().filter(move |s| s.name == name)
    }

    fn path(&self, path: &[&str]) -> Option<&Section> {
        path.iter().try_fold(self, |section, name| section.section(name))
    }

    /// First non-empty value with this name.
    fn value(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, v)| n == name && !v.is_empty())
            .map(|(_, v)| v.as_str())
    }
}

fn malformed(offset: u64, reason: impl Into<String>) -> ParseError {
    ParseError::malformed(DeviceFormat::Xml, offset, reason)
}

fn name_attribute(e: &BytesStart<'_>, offset: u64) -> Result<String, ParseError> {
    let attr = e
        .try_get_attribute("name")
        .map_err(|err| malformed(offset, err.to_string()))?;
    match attr {
        Some(attr) => attr
            .unescape_value()
            .map(|v| v.trim().to_string())
            .map_err(|err| malformed(offset, err.to_string())),
        None => Ok(String::new()),
    }
}

/// Stream the document into the `dataset` section tree.
fn read_dataset(bytes: &[u8]) -> Result<Section, ParseError> {
    let xml = std::str::from_utf8(bytes)
        .map_err(|e| malformed(e.valid_up_to() as u64, "document is not valid UTF-8"))?;
    let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut saw_root = false;
    let mut dataset: Option<Section> = None;
    // stack[0] is the open dataset, deeper entries are open sections
    let mut stack: Vec<Section> = Vec::new();
    let mut open_value: Option<(String, String)> = None;

    loop {
        let offset = reader.buffer_position() as u64;
        let event = reader
            .read_event()
            .map_err(|e| malformed(reader.buffer_position() as u64, e.to_string()))?;

        match event {
            Event::Start(e) | Event::Empty(e) if !saw_root => {
                if e.name().as_ref() != ROOT_ELEMENT {
                    let found = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    return Err(malformed(offset, format!("unexpected root element <{found}>")));
                }
                saw_root = true;
            }
            Event::Start(e) => match e.name().as_ref() {
                b"dataset" if stack.is_empty() && dataset.is_none() => {
                    stack.push(Section::named("dataset".into()));
                }
                b"section" if !stack.is_empty() => {
                    stack.push(Section::named(name_attribute(&e, offset)?));
                }
                b"value" if !stack.is_empty() => {
                    open_value = Some((name_attribute(&e, offset)?, String::new()));
                }
                _ => {}
            },
            Event::Empty(e) => {
                if e.name().as_ref() == b"section" {
                    if let Some(parent) = stack.last_mut() {
                        parent.sections.push(Section::named(name_attribute(&e, offset)?));
                    }
                }
            }
            Event::Text(t) => {
                if let Some((_, buf)) = open_value.as_mut() {
                    let txt = t.unescape().map_err(|e| malformed(offset, e.to_string()))?;
                    buf.push_str(&txt);
                }
            }
            Event::CData(c) => {
                if let Some((_, buf)) = open_value.as_mut() {
                    let txt = c.decode().map_err(|e| malformed(offset, e.to_string()))?;
                    buf.push_str(&txt);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"value" => {
                    if let (Some((name, value)), Some(section)) = (open_value.take(), stack.last_mut()) {
                        section.values.push((name, value.trim().to_string()));
                    }
                }
                b"section" if stack.len() > 1 => {
                    if let Some(done) = stack.pop() {
                        if let Some(parent) = stack.last_mut() {
                            parent.sections.push(done);
                        }
                    }
                }
                b"dataset" if stack.len() == 1 => dataset = stack.pop(),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    let end = reader.buffer_position() as u64;
    if !saw_root {
        return Err(malformed(end, "document has no root element"));
    }
    if !stack.is_empty() {
        return Err(malformed(end, "unexpected end of document"));
    }
    dataset.ok_or_else(|| malformed(end, "missing <dataset> element"))
}

/// Copy `name` from `section` into `target` unless `target` is already set.
fn fill(target: &mut Option<String>, section: Option<&Section>, name: &str, convert: Convert) {
    if target.is_some() {
        return;
    }
    if let Some(raw) = section.and_then(|s| s.value(name)) {
        *target = convert(raw);
    }
}

fn fill_all<const N: usize>(
    section: Option<&Section>,
    rules: [(&str, &mut Option<String>); N],
    convert: Convert,
) {
    for (name, target) in rules {
        fill(target, section, name, convert);
    }
}

fn map_dataset(dataset: &Section) -> ParsedData {
    let mut data = ParsedData::default();
    let Some(mdc) = dataset.section("MDC") else {
        tracing::debug!("XML export has no MDC section");
        return data;
    };

    let patient = mdc.path(&["ATTR", "PATIENT"]);
    fill(&mut data.name, patient, "NAME", text);
    fill(&mut data.dob, patient, "BIRTHDATE", coerce_iso_date);
    fill(&mut data.mrn, patient, "ID", text);

    let Some(idc) = mdc.section("IDC") else {
        return data;
    };

    let dev = idc.section("DEV");
    fill_all(
        dev,
        [
            ("SERIAL_NUM", &mut data.serial_number),
            ("MODEL", &mut data.model),
            ("MANUFACTURER", &mut data.manufacturer),
        ],
        text,
    );
    fill(&mut data.implant_date, dev, "IMPLANT_DATE", coerce_iso_date);
    fill(&mut data.report_date, idc.section("SESS"), "DATE", rfc3339_utc);

    let dropped = data
        .leads
        .assign_in_document_order(idc.sections_named("LEAD").map(lead_info));
    if dropped > 0 {
        tracing::debug!(dropped, "Ignoring leads beyond the third");
    }

    if let Some(stat) = idc.section("STAT") {
        map_statistics(stat, &mut data);
    }
    if let Some(msmt) = idc.section("MSMT") {
        map_measurements(msmt, &mut data);
    }
    if let Some(set) = idc.section("SET") {
        map_settings(set, &mut data);
    }

    data
}

fn lead_info(lead: &Section) -> LeadInfo {
    let mut info = LeadInfo::default();
    let lead = Some(lead);
    fill_all(
        lead,
        [
            ("SERIAL_NUM", &mut info.serial_number),
            ("MANUFACTURER", &mut info.manufacturer),
            ("MODEL", &mut info.model),
        ],
        text,
    );
    fill(&mut info.implant_date, lead, "IMPLANT_DATE", coerce_iso_date);
    info
}

fn map_statistics(stat: &Section, data: &mut ParsedData) {
    let stats = &mut data.statistics;
    fill_all(
        stat.section("BRADY"),
        [
            ("RA_PERCENT_PACED", &mut stats.ra_percent_paced),
            ("RV_PERCENT_PACED", &mut stats.rv_percent_paced),
            ("LV_PERCENT_PACED", &mut stats.lv_percent_paced),
            ("BIV_PERCENT_PACED", &mut stats.biv_percent_paced),
        ],
        number,
    );
    fill_all(
        stat.section("CRT"),
        [
            ("LV_PERCENT_PACED", &mut stats.lv_percent_paced),
            ("BIV_PERCENT_PACED", &mut stats.biv_percent_paced),
        ],
        number,
    );
    fill_all(
        stat.section("AT"),
        [
            ("BURDEN_PERCENT", &mut stats.ataf_burden_percent),
            ("COUNT", &mut stats.ataf_count),
        ],
        number,
    );
    fill_all(
        stat.section("TACHYTHERAPY"),
        [
            ("ATP_DELIVERED_RECENT", &mut stats.atp_delivered_recent),
            ("SHOCKS_DELIVERED_RECENT", &mut stats.shocks_delivered_recent),
        ],
        number,
    );

    let Some(arrhythmia) = stat.section("ARRHYTHMIA") else {
        return;
    };
    fill_all(
        Some(arrhythmia),
        [
            ("PVC_COUNT", &mut stats.pvc_count),
            ("NSVT_COUNT", &mut stats.nsvt_count),
        ],
        number,
    );
    for episode in arrhythmia.sections_named("EPISODE") {
        let Some(kind) = episode.value("TYPE").and_then(text) else {
            tracing::debug!("Skipping arrhythmia episode without TYPE");
            continue;
        };
        data.arrhythmias.push(ArrhythmiaEvent {
            kind,
            date: episode.value("DTM").and_then(rfc3339_utc),
            duration: episode.value("DURATION").and_then(text),
            therapy: episode.value("THERAPY").and_then(text),
        });
    }
}

fn map_measurements(msmt: &Section, data: &mut ParsedData) {
    let battery = msmt.section("BATTERY");
    let b = &mut data.battery;
    fill(&mut b.status, battery, "STATUS", battery_phase);
    fill_all(
        battery,
        [
            ("REMAINING_PERCENTAGE", &mut b.percentage),
            ("VOLTAGE", &mut b.voltage),
            ("CHARGE_TIME", &mut b.cap_charge_time),
        ],
        number,
    );
    fill(&mut b.remaining, battery, "REMAINING", text);

    for (chamber, section_name) in [
        (Chamber::Ra, "LEADCHNL_RA"),
        (Chamber::Rv, "LEADCHNL_RV"),
        (Chamber::Lv, "LEADCHNL_LV"),
    ] {
        let Some(channel) = msmt.section(section_name) else {
            continue;
        };
        let m = data.measurements.chamber_mut(chamber);
        fill(&mut m.sensing_mean, channel.section("SENSING"), "INTR_AMPL_MEAN", number);
        fill_all(
            channel.section("PACING_THRESHOLD"),
            [
                ("AMPLITUDE", &mut m.pacing_threshold),
                ("PULSEWIDTH", &mut m.pulse_width),
            ],
            number,
        );
        fill(&mut m.impedance_mean, channel.section("IMPEDANCE"), "VALUE", number);
    }

    if let Some(hv) = msmt.section("LEADHVCHNL") {
        let target = &mut data.measurements.hv_impedance_mean;
        fill(target, Some(hv), "IMPEDANCE", number);
        fill(target, hv.section("IMPEDANCE"), "VALUE", number);
    }
}

fn map_settings(set: &Section, data: &mut ParsedData) {
    let brady = set.section("BRADY");
    let b = &mut data.brady;
    fill(&mut b.mode, brady, "VENDOR_MODE", text);
    fill_all(
        brady,
        [
            ("LOWRATE", &mut b.low_rate_bpm),
            ("MAX_TRACKING_RATE", &mut b.max_tracking_rate_bpm),
            ("MAX_SENSOR_RATE", &mut b.max_sensor_rate_bpm),
        ],
        rate_bpm,
    );
    fill_all(
        brady,
        [
            ("AT_MODE_SWITCH_RATE", &mut b.mode_switch_rate),
            ("SAV", &mut b.sav),
            ("PAV", &mut b.pav),
        ],
        number,
    );

    let tachy_on = set
        .section("TACHYTHERAPY")
        .and_then(|t| t.value("VSTAT"))
        .is_some_and(|v| v.eq_ignore_ascii_case("on"));
    if !tachy_on {
        return;
    }

    for zone_section in set.sections_named("ZONE") {
        let vendor_type = zone_section.value("VENDOR_TYPE").unwrap_or_default();
        match TachyZone::from_biotronik_vendor_type(vendor_type) {
            Some(zone) => {
                let settings = data.tachy.zone_mut(zone);
                map_zone(zone_section, settings);
                disable_shocks_without_energy(zone, settings);
            }
            None => tracing::debug!(vendor_type, "Skipping non-tachy zone"),
        }
    }
}

fn map_zone(section: &Section, zone: &mut ZoneSettings) {
    let section = Some(section);
    fill(&mut zone.active, section, "STATUS", text);
    fill(&mut zone.detection_interval, section, "DETECTION_INTERVAL", interval_to_bpm);
    for slot in 1..=5u8 {
        if let Some(target) = zone.atp_mut(slot) {
            fill(target, section, &format!("TYPE_ATP_{slot}"), text);
        }
        if let Some(target) = zone.no_bursts_mut(slot) {
            fill(target, section, &format!("NUM_ATP_SEQS_{slot}"), number);
        }
        if let Some(target) = zone.energy_mut(slot) {
            fill(target, section, &format!("SHOCK_ENERGY_{slot}"), energy);
        }
        if let Some(target) = zone.max_num_shocks_mut(slot) {
            fill(target, section, &format!("NUM_SHOCKS_{slot}"), shock_count);
        }
    }
}
