//! Value cleanup shared by every vendor parser.
//!
//! Helpers never fail loudly: a value that cannot be normalised yields
//! `None` (or the original text where noted) and the caller leaves the
//! target field unset.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

use super::parsed_data::{TachyZone, ZoneSettings};

/// Unit tokens vendors append to numeric values.
const UNIT_SUFFIXES: [&str; 8] = [" Ohms", " Ohm", " bpm", " mV", " ms", " V", " %", " J"];

/// Remove one trailing unit token and surrounding whitespace.
pub fn strip_units(raw: &str) -> &str {
    let trimmed = raw.trim();
    for suffix in UNIT_SUFFIXES {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            return stripped.trim_end();
        }
    }
    trimmed
}

/// Unit-stripped value, `None` when nothing is left.
pub fn number(raw: &str) -> Option<String> {
    let value = strip_units(raw);
    (!value.is_empty()).then(|| value.to_string())
}

/// Trimmed text, `None` when blank.
pub fn text(raw: &str) -> Option<String> {
    let value = raw.trim();
    (!value.is_empty()).then(|| value.to_string())
}

pub fn parse_f64(raw: &str) -> Option<f64> {
    strip_units(raw).parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_i64(raw: &str) -> Option<i64> {
    let value = strip_units(raw);
    value
        .parse::<i64>()
        .ok()
        .or_else(|| parse_f64(value).map(|v| v.round() as i64))
}

/// Convert a pacing interval to a rate: round-half-to-even of `60000 / ms`.
///
/// `None` for non-positive intervals and for intervals so long that the
/// rate would round to zero.
pub fn ms_to_bpm(ms: i64) -> Option<u32> {
    if ms <= 0 {
        return None;
    }
    let quotient = 60_000 / ms;
    let remainder = 60_000 % ms;
    let bpm = match (2 * remainder).cmp(&ms) {
        std::cmp::Ordering::Greater => quotient + 1,
        std::cmp::Ordering::Equal if quotient % 2 == 1 => quotient + 1,
        _ => quotient,
    };
    u32::try_from(bpm).ok().filter(|b| *b > 0)
}

/// Rate field as integer bpm. Values carrying ` ms` are intervals and
/// are inverted; anything else is taken as a rate already.
pub fn rate_bpm(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if let Some(interval) = trimmed.strip_suffix(" ms").or_else(|| trimmed.strip_suffix("ms")) {
        return interval_to_bpm(interval);
    }
    let bpm = parse_f64(trimmed)?.round();
    (bpm >= 1.0).then(|| format!("{}", bpm as u32))
}

/// Interval in milliseconds (unit optional) to integer bpm text.
pub fn interval_to_bpm(raw: &str) -> Option<String> {
    let ms = parse_f64(raw)?.round() as i64;
    ms_to_bpm(ms).map(|bpm| bpm.to_string())
}

/// Scale a millivolt-style integer amplitude to volts with three decimals.
/// Non-numeric input is returned unchanged.
pub fn convert_threshold(raw: &str) -> String {
    match strip_units(raw).parse::<f64>() {
        Ok(mv) if mv.is_finite() => format!("{:.3}", mv / 1000.0),
        _ => raw.trim().to_string(),
    }
}

/// Energy with the mandatory `" J"` suffix.
pub fn energy(raw: &str) -> Option<String> {
    let value = strip_units(raw);
    value.parse::<f64>().ok()?;
    Some(format!("{value} J"))
}

/// Month index 1..=12 from a name ("Sep", "Sept", "September") or number.
pub fn month_number(name: &str) -> Option<u32> {
    let name = name.trim();
    if let Ok(n) = name.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    let lower = name.to_ascii_lowercase();
    let month = match lower.as_str() {
        "jan" | "january" => 1,
        "feb" | "february" => 2,
        "mar" | "march" => 3,
        "apr" | "april" => 4,
        "may" => 5,
        "jun" | "june" => 6,
        "jul" | "july" => 7,
        "aug" | "august" => 8,
        "sep" | "sept" | "september" => 9,
        "oct" | "october" => 10,
        "nov" | "november" => 11,
        "dec" | "december" => 12,
        _ => return None,
    };
    Some(month)
}

/// ISO calendar date from numeric parts, `None` if the date does not exist.
pub fn iso_date(year: i32, month: u32, day: u32) -> Option<String> {
    NaiveDate::from_ymd_opt(year, month, day).map(|d| d.format("%Y-%m-%d").to_string())
}

/// ISO date from textual year / month (name or number) / optional day.
/// A missing day defaults to the first of the month.
pub fn date_from_parts(year: &str, month: &str, day: Option<&str>) -> Option<String> {
    let year = year.trim().parse::<i32>().ok()?;
    let month = month_number(month)?;
    let day = match day {
        Some(d) => d.trim().parse::<u32>().ok()?,
        None => 1,
    };
    iso_date(year, month, day)
}

/// Coerce the date shapes seen in exports to ISO `YYYY-MM-DD`, dropping
/// any time component.
pub fn coerce_iso_date(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive().format("%Y-%m-%d").to_string());
    }
    if let Some(date) = value.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()) {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    let first_token = value.split_whitespace().next().unwrap_or(value);
    if let Ok(date) = NaiveDate::parse_from_str(first_token, "%m/%d/%Y") {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    let parts: Vec<&str> = value.split_whitespace().collect();
    if let [day, month, year] = parts.as_slice() {
        return date_from_parts(year, month, Some(day));
    }
    None
}

/// Canonical RFC 3339 UTC timestamp. Offset-aware input is converted;
/// naive input is taken as UTC; a bare date becomes midnight UTC.
pub fn rfc3339_utc(raw: &str) -> Option<String> {
    let value = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(format_utc(dt.with_timezone(&Utc)));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(format_utc(Utc.from_utc_datetime(&naive)));
        }
    }
    midnight_utc(value)
}

/// `M/D/YYYY h:mm:ss AM/PM` (programmer clock, recorded as UTC).
pub fn us_timestamp(raw: &str) -> Option<String> {
    let value = raw.trim();
    NaiveDateTime::parse_from_str(value, "%m/%d/%Y %I:%M:%S %p")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%m/%d/%Y %H:%M:%S"))
        .ok()
        .map(|naive| format_utc(Utc.from_utc_datetime(&naive)))
        .or_else(|| coerce_iso_date(value).and_then(|d| midnight_utc(&d)))
}

/// ISO date at `T00:00:00Z`.
pub fn midnight_utc(iso: &str) -> Option<String> {
    let date = NaiveDate::parse_from_str(iso.trim(), "%Y-%m-%d").ok()?;
    let naive = date.and_hms_opt(0, 0, 0)?;
    Some(format_utc(Utc.from_utc_datetime(&naive)))
}

fn format_utc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Battery stage abbreviation where the phrase is recognised; other values
/// pass through trimmed.
pub fn battery_phase(raw: &str) -> Option<String> {
    let value = text(raw)?;
    let lower = value.to_ascii_lowercase();
    let status = if lower.contains("beginning") || lower == "bol" || lower == "ok" {
        "BOL"
    } else if lower.contains("middle") || lower == "mol" {
        "MOL"
    } else if lower.contains("elective") || lower == "eri" || lower == "rrt" {
        "ERI"
    } else if lower.contains("end of") || lower == "eol" {
        "EOL"
    } else {
        return Some(value);
    };
    Some(status.to_string())
}

/// Remaining longevity stored in months, rendered as `"N.N years"`.
pub fn months_to_years(raw: &str) -> Option<String> {
    let months = parse_f64(raw)?;
    Some(format!("{:.1} years", months / 12.0))
}

/// Shock count as `"Off"` (zero or off) or `"x N"`.
pub fn shock_count(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.eq_ignore_ascii_case("off") {
        return Some("Off".into());
    }
    let digits = value.strip_prefix("x ").unwrap_or(value);
    match parse_i64(digits)? {
        n if n <= 0 => Some("Off".into()),
        n => Some(format!("x {n}")),
    }
}

/// Remaining shocks in a zone after the configured shock slots.
///
/// All configured energies zero means the zone delivers no shocks (`"Off"`).
/// Otherwise `max_shocks` minus the number of non-zero slots, clamped at
/// zero. `None` when nothing is configured or the budget is unknown.
pub fn remaining_shocks(zone: TachyZone, max_shocks: Option<u32>, configured: &[f64]) -> Option<String> {
    if configured.is_empty() {
        return None;
    }
    if configured.iter().all(|e| *e == 0.0) {
        return Some("Off".into());
    }
    let Some(max_shocks) = max_shocks else {
        tracing::debug!(zone = zone.label(), "Shock budget missing; remaining shocks unset");
        return None;
    };
    let used = configured.iter().filter(|e| **e != 0.0).count() as u32;
    Some(format!("x {}", max_shocks.saturating_sub(used)))
}

/// A zone whose programmed shock energies are all zero delivers no shocks:
/// every shock count it carries becomes `"Off"`.
pub fn disable_shocks_without_energy(zone: TachyZone, settings: &mut ZoneSettings) {
    if !settings.shocks_disabled() {
        return;
    }
    for slot in 4..=5u8 {
        if let Some(Some(count)) = settings.max_num_shocks_mut(slot) {
            if count.as_str() != "Off" {
                tracing::debug!(zone = zone.label(), slot, count = %count, "Zero-energy zone; shock count set Off");
                *count = "Off".into();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_unit_tokens() {
        assert_eq!(strip_units("2.5 V"), "2.5");
        assert_eq!(strip_units("540 Ohm"), "540");
        assert_eq!(strip_units(" 98 % "), "98");
        assert_eq!(strip_units("60 bpm"), "60");
        assert_eq!(strip_units("0.4 ms"), "0.4");
        assert_eq!(strip_units("3.2 mV"), "3.2");
        assert_eq!(strip_units("25 J"), "25");
        assert_eq!(strip_units("DDD"), "DDD");
    }

    #[test]
    fn ms_to_bpm_matches_rounded_division() {
        for ms in 1..=120_000i64 {
            let expected = (60_000.0 / ms as f64).round_ties_even() as u32;
            if expected == 0 {
                assert_eq!(ms_to_bpm(ms), None, "ms={ms}");
            } else {
                assert_eq!(ms_to_bpm(ms), Some(expected), "ms={ms}");
            }
        }
    }

    #[test]
    fn ms_to_bpm_rounds_half_to_even() {
        // 37.5 -> 38
        assert_eq!(ms_to_bpm(1600), Some(38));
        // 2.5 -> 2
        assert_eq!(ms_to_bpm(24_000), Some(2));
        assert_eq!(ms_to_bpm(2400), Some(25));
        assert_eq!(ms_to_bpm(1200), Some(50));
    }

    #[test]
    fn ms_to_bpm_undefined_for_non_positive() {
        assert_eq!(ms_to_bpm(0), None);
        assert_eq!(ms_to_bpm(-500), None);
        assert_eq!(ms_to_bpm(200_000), None);
    }

    #[test]
    fn bpm_round_trip_within_one() {
        for bpm in 30u32..=250 {
            let ms = (60_000.0 / bpm as f64).round() as i64;
            let back = ms_to_bpm(ms).unwrap();
            assert!(back.abs_diff(bpm) <= 1, "bpm={bpm} ms={ms} back={back}");
        }
    }

    #[test]
    fn rate_inverts_intervals_only() {
        assert_eq!(rate_bpm("1000 ms").as_deref(), Some("60"));
        assert_eq!(rate_bpm("857 ms").as_deref(), Some("70"));
        assert_eq!(rate_bpm("60 bpm").as_deref(), Some("60"));
        assert_eq!(rate_bpm("130").as_deref(), Some("130"));
        assert_eq!(rate_bpm("Off"), None);
        assert_eq!(interval_to_bpm("500").as_deref(), Some("120"));
    }

    #[test]
    fn threshold_scaled_to_volts() {
        assert_eq!(convert_threshold("2500"), "2.500");
        assert_eq!(convert_threshold("750"), "0.750");
        assert_eq!(convert_threshold("n/a"), "n/a");
    }

    #[test]
    fn energy_always_has_joule_suffix() {
        assert_eq!(energy("25").as_deref(), Some("25 J"));
        assert_eq!(energy("36 J").as_deref(), Some("36 J"));
        assert_eq!(energy("Off"), None);
    }

    #[test]
    fn month_names_and_numbers() {
        assert_eq!(month_number("Sep"), Some(9));
        assert_eq!(month_number("Sept"), Some(9));
        assert_eq!(month_number("SEPTEMBER"), Some(9));
        assert_eq!(month_number("jan"), Some(1));
        assert_eq!(month_number("12"), Some(12));
        assert_eq!(month_number("13"), None);
        assert_eq!(month_number("Smarch"), None);
    }

    #[test]
    fn dates_from_parts_default_day() {
        assert_eq!(date_from_parts("2019", "Sept", Some("7")).as_deref(), Some("2019-09-07"));
        assert_eq!(date_from_parts("2019", "3", None).as_deref(), Some("2019-03-01"));
        assert_eq!(date_from_parts("2019", "Feb", Some("30")), None);
    }

    #[test]
    fn coerces_iso_dates() {
        assert_eq!(coerce_iso_date("1970-01-01").as_deref(), Some("1970-01-01"));
        assert_eq!(coerce_iso_date("2015-06-02T00:00:00Z").as_deref(), Some("2015-06-02"));
        assert_eq!(coerce_iso_date("2015-06-02T08:30:00").as_deref(), Some("2015-06-02"));
        assert_eq!(coerce_iso_date("6/2/2015").as_deref(), Some("2015-06-02"));
        assert_eq!(coerce_iso_date("02 Jun 2015").as_deref(), Some("2015-06-02"));
        assert_eq!(coerce_iso_date("unknown"), None);
    }

    #[test]
    fn timestamps_normalised_to_utc() {
        assert_eq!(
            rfc3339_utc("2024-03-01T12:00:00+02:00").as_deref(),
            Some("2024-03-01T10:00:00Z")
        );
        assert_eq!(
            rfc3339_utc("2024-03-01T12:00:00").as_deref(),
            Some("2024-03-01T12:00:00Z")
        );
        assert_eq!(rfc3339_utc("2024-03-01").as_deref(), Some("2024-03-01T00:00:00Z"));
        assert_eq!(
            us_timestamp("5/4/2023 2:03:22 PM").as_deref(),
            Some("2023-05-04T14:03:22Z")
        );
        assert_eq!(
            us_timestamp("12/31/2023 12:00:00 AM").as_deref(),
            Some("2023-12-31T00:00:00Z")
        );
    }

    #[test]
    fn battery_phases() {
        assert_eq!(battery_phase("Beginning of Life").as_deref(), Some("BOL"));
        assert_eq!(battery_phase("Middle of Life").as_deref(), Some("MOL"));
        assert_eq!(battery_phase("ERI").as_deref(), Some("ERI"));
        assert_eq!(battery_phase("End of Life").as_deref(), Some("EOL"));
        assert_eq!(battery_phase("Charging").as_deref(), Some("Charging"));
        assert_eq!(battery_phase("  "), None);
    }

    #[test]
    fn months_rendered_as_years() {
        assert_eq!(months_to_years("50").as_deref(), Some("4.2 years"));
        assert_eq!(months_to_years("soon"), None);
    }

    #[test]
    fn shock_counts() {
        assert_eq!(shock_count("0").as_deref(), Some("Off"));
        assert_eq!(shock_count("Off").as_deref(), Some("Off"));
        assert_eq!(shock_count("6").as_deref(), Some("x 6"));
        assert_eq!(shock_count("x 4").as_deref(), Some("x 4"));
    }

    #[test]
    fn remaining_shock_budget() {
        let zone = TachyZone::Vt1;
        assert_eq!(remaining_shocks(zone, Some(6), &[25.0, 31.0]).as_deref(), Some("x 4"));
        assert_eq!(remaining_shocks(zone, Some(6), &[0.0, 0.0]).as_deref(), Some("Off"));
        assert_eq!(remaining_shocks(zone, None, &[0.0, 0.0]).as_deref(), Some("Off"));
        assert_eq!(remaining_shocks(zone, Some(6), &[25.0, 0.0]).as_deref(), Some("x 5"));
        assert_eq!(remaining_shocks(zone, Some(1), &[25.0, 31.0]).as_deref(), Some("x 0"));
        assert_eq!(remaining_shocks(zone, None, &[25.0]), None);
        assert_eq!(remaining_shocks(zone, Some(6), &[]), None);
    }

    #[test]
    fn numeric_parsing_ignores_units() {
        assert_eq!(parse_f64("2.75 V"), Some(2.75));
        assert_eq!(parse_i64("12"), Some(12));
        assert_eq!(parse_i64("12.6 %"), Some(13));
        assert_eq!(parse_i64("NaN"), None);
    }

    #[test]
    fn zero_energy_zone_turns_shock_counts_off() {
        let mut zone = ZoneSettings {
            therapy3_energy: Some("0 J".into()),
            therapy4_energy: Some("0 J".into()),
            therapy4_max_num_shocks: Some("x 2".into()),
            therapy5_max_num_shocks: Some("x 6".into()),
            ..Default::default()
        };
        disable_shocks_without_energy(TachyZone::Vt1, &mut zone);
        assert_eq!(zone.therapy4_max_num_shocks.as_deref(), Some("Off"));
        assert_eq!(zone.therapy5_max_num_shocks.as_deref(), Some("Off"));
    }

    #[test]
    fn zone_with_energy_or_unset_counts_is_left_alone() {
        let mut zone = ZoneSettings {
            therapy3_energy: Some("0 J".into()),
            therapy5_energy: Some("30 J".into()),
            therapy5_max_num_shocks: Some("x 6".into()),
            ..Default::default()
        };
        disable_shocks_without_energy(TachyZone::Vf, &mut zone);
        assert_eq!(zone.therapy5_max_num_shocks.as_deref(), Some("x 6"));

        let mut zone = ZoneSettings {
            therapy3_energy: Some("0 J".into()),
            ..Default::default()
        };
        disable_shocks_without_energy(TachyZone::Vt2, &mut zone);
        assert!(zone.therapy4_max_num_shocks.is_none());
        assert!(zone.therapy5_max_num_shocks.is_none());
    }
}
