//! Timestamp semantics: ISO 8601 parsing, platform-safe clamping, human
//! formatting, and the relative-offset mini-language used by archive
//! selection (`7d`, `8m`, ...).
//!
//! Clamping exists because filesystem timestamps occasionally overflow
//! downstream computations; a valid mtime never points to the future, so
//! clamping to a platform-portable maximum loses nothing real. The bound
//! keeps nanosecond timestamps packable on 32-bit platforms with 48 hours
//! of slack reserved for timezone arithmetic.

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Utc};
use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimeError {
    #[error("could not parse {0:?} as an ISO 8601 timestamp")]
    InvalidTimestamp(String),
}

/// `2^31 - 1 - 48h`, the 32-bit-platform-safe maximum second timestamp.
pub const MAX_S: i64 = (1i64 << 31) - 1 - 48 * 3600;
/// `MAX_S` expressed in nanoseconds.
pub const MAX_NS: i64 = MAX_S * 1_000_000_000;

/// Parse an ISO 8601 timestamp. A time-zone-naive value is assumed to be
/// in UTC.
pub fn parse_timestamp_utc(timestamp: &str) -> Result<DateTime<Utc>, TimeError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return Ok(dt.with_timezone(&Utc));
    }
    parse_naive(timestamp)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| TimeError::InvalidTimestamp(timestamp.to_string()))
}

/// Parse an ISO 8601 timestamp. A time-zone-naive value is assumed to be
/// in local time and converted to it explicitly (matching the source's
/// "naive means local" convention).
pub fn parse_timestamp_local(timestamp: &str) -> Result<DateTime<Local>, TimeError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return Ok(dt.with_timezone(&Local));
    }
    let naive = parse_naive(timestamp).ok_or_else(|| TimeError::InvalidTimestamp(timestamp.to_string()))?;
    Local
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| TimeError::InvalidTimestamp(timestamp.to_string()))
}

fn parse_naive(timestamp: &str) -> Option<chrono::NaiveDateTime> {
    chrono::NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

/// Clamp a second-resolution timestamp into `[0, MAX_S]`.
pub fn safe_s(ts: i64) -> i64 {
    ts.clamp(0, MAX_S)
}

/// Clamp a nanosecond-resolution timestamp into `[0, MAX_NS]`.
pub fn safe_ns(ts: i64) -> i64 {
    ts.clamp(0, MAX_NS)
}

/// Clamp `item_timestamp_ns` and convert it to a UTC instant.
pub fn safe_timestamp(item_timestamp_ns: i64) -> DateTime<Utc> {
    let t_ns = safe_ns(item_timestamp_ns);
    let secs = t_ns.div_euclid(1_000_000_000);
    let nanos = t_ns.rem_euclid(1_000_000_000) as u32;
    DateTime::from_timestamp(secs, nanos).expect("clamped nanosecond timestamp is always in range")
}

/// Human-friendly rendering. `format_spec` of `""`/`None` uses the default
/// `"%a, %Y-%m-%d %H:%M:%S %z"`.
pub fn format_time(ts: &DateTime<Utc>, format_spec: Option<&str>) -> String {
    let fmt = match format_spec {
        Some(f) if !f.is_empty() => f,
        _ => "%a, %Y-%m-%d %H:%M:%S %z",
    };
    ts.format(fmt).to_string()
}

/// Human-friendly rendering of a duration, e.g. `"1 days 2 hours 3 minutes 4.50 seconds"`.
pub fn format_timedelta(td: chrono::Duration) -> String {
    let total_seconds = td.num_milliseconds() as f64 / 1000.0;
    let s = total_seconds.rem_euclid(60.0);
    let m = (total_seconds / 60.0) as i64 % 60;
    let h = (total_seconds / 3600.0) as i64 % 24;
    let days = td.num_days();

    let mut txt = format!("{s:.2} seconds");
    if m != 0 {
        txt = format!("{m} minutes {txt}");
    }
    if h != 0 {
        txt = format!("{h} hours {txt}");
    }
    if days != 0 {
        txt = format!("{days} days {txt}");
    }
    txt
}

/// Compute an offset date from a relative marker embedded in `format_string`
/// (`\d+d` for days, `\d+m` for months — the first match wins, days checked
/// first). `from_date` defaults to today (UTC). `earlier` negates the
/// offset.
pub fn calculate_relative_offset(
    format_string: Option<&str>,
    from_date: Option<NaiveDate>,
    earlier: bool,
) -> NaiveDate {
    let from_date = from_date.unwrap_or_else(|| archive_ts_now().date_naive());
    let format_string = match format_string {
        Some(f) => f,
        None => return from_date,
    };

    let day_offset_regex = Regex::new(r"\d+d").expect("fixed pattern always compiles");
    let month_offset_regex = Regex::new(r"\d+m").expect("fixed pattern always compiles");

    if let Some(m) = day_offset_regex.find(format_string) {
        let digits = &m.as_str()[..m.as_str().len() - 1];
        let mut day_offset: i64 = digits.parse().unwrap_or(0);
        if earlier {
            day_offset = -day_offset;
        }
        return from_date + chrono::Duration::days(day_offset);
    }

    if let Some(m) = month_offset_regex.find(format_string) {
        let digits = &m.as_str()[..m.as_str().len() - 1];
        let mut month_offset: i64 = digits.parse().unwrap_or(0);
        if earlier {
            month_offset = -month_offset;
        }
        return offset_n_months(from_date, month_offset);
    }

    from_date
}

/// Shift `from_date` by `n_months`, clamping the day-of-month to the
/// target month's last day (e.g. Jan 31 + 1 month → Feb 28/29).
pub fn offset_n_months(from_date: NaiveDate, n_months: i64) -> NaiveDate {
    let total_months = from_date.year() as i64 * 12 + from_date.month() as i64 + n_months;
    let target_year = (total_months - 1).div_euclid(12);
    let target_month = {
        let m = total_months.rem_euclid(12);
        if m == 0 { 12 } else { m }
    };

    let next_month_month = {
        let m = (total_months + 1).rem_euclid(12);
        if m == 0 { 12 } else { m }
    };
    let next_month_year = (total_months + 1).div_euclid(12);

    let first_of_month_after_target =
        NaiveDate::from_ymd_opt(next_month_year as i32, next_month_month as u32, 1)
            .expect("computed year/month are always in range");
    let max_days_in_month = first_of_month_after_target.pred_opt().unwrap().day();

    let day = from_date.day().min(max_days_in_month);
    NaiveDate::from_ymd_opt(target_year as i32, target_month as u32, day)
        .expect("clamped day is always valid for its target month")
}

/// A UTC instant paired with the default human rendering, mirroring the
/// upstream `to_json`/`isoformat`/`__format__` trio.
pub struct OutputTimestamp(DateTime<Utc>);

impl OutputTimestamp {
    pub fn new(ts: DateTime<Utc>) -> Self {
        Self(ts)
    }

    pub fn format(&self, format_spec: &str) -> String {
        format_time(&self.0, Some(format_spec))
    }

    pub fn isoformat(&self) -> String {
        self.0.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
    }
}

impl std::fmt::Display for OutputTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format_time(&self.0, None))
    }
}

/// The current instant, for stamping newly created archives.
pub fn archive_ts_now() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_timestamp_with_microseconds() {
        let dt = parse_timestamp_utc("1970-01-01T00:00:01.000001").unwrap();
        assert_eq!(dt.timestamp(), 1);
        assert_eq!(dt.timestamp_subsec_micros(), 1);
    }

    #[test]
    fn parses_timestamp_without_microseconds() {
        let dt = parse_timestamp_utc("1970-01-01T00:00:01").unwrap();
        assert_eq!(dt.timestamp(), 1);
        assert_eq!(dt.timestamp_subsec_micros(), 0);
    }

    #[test]
    fn safe_s_clamps_negative_and_overflowing_values() {
        assert_eq!(safe_s(-5), 0);
        assert_eq!(safe_s(MAX_S + 1000), MAX_S);
        assert_eq!(safe_s(42), 42);
    }

    #[test]
    fn safe_ns_clamps_negative_and_overflowing_values() {
        assert_eq!(safe_ns(-5), 0);
        assert_eq!(safe_ns(MAX_NS + 1), MAX_NS);
    }

    #[test]
    fn offset_n_months_clamps_day_to_shorter_target_month() {
        let jan31 = NaiveDate::from_ymd_opt(2021, 1, 31).unwrap();
        let result = offset_n_months(jan31, 1);
        assert_eq!(result, NaiveDate::from_ymd_opt(2021, 2, 28).unwrap());
    }

    #[test]
    fn offset_n_months_crosses_year_boundary_forward() {
        let nov = NaiveDate::from_ymd_opt(2021, 11, 15).unwrap();
        let result = offset_n_months(nov, 2);
        assert_eq!(result, NaiveDate::from_ymd_opt(2022, 1, 15).unwrap());
    }

    #[test]
    fn offset_n_months_crosses_year_boundary_backward() {
        let jan = NaiveDate::from_ymd_opt(2022, 1, 15).unwrap();
        let result = offset_n_months(jan, -2);
        assert_eq!(result, NaiveDate::from_ymd_opt(2021, 11, 15).unwrap());
    }

    #[test]
    fn offset_n_months_handles_leap_february() {
        let jan31_2020 = NaiveDate::from_ymd_opt(2020, 1, 31).unwrap();
        let result = offset_n_months(jan31_2020, 1);
        assert_eq!(result, NaiveDate::from_ymd_opt(2020, 2, 29).unwrap());
    }

    #[test]
    fn calculate_relative_offset_days() {
        let base = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let result = calculate_relative_offset(Some("7d"), Some(base), false);
        assert_eq!(result, NaiveDate::from_ymd_opt(2024, 6, 17).unwrap());
        let earlier = calculate_relative_offset(Some("7d"), Some(base), true);
        assert_eq!(earlier, NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
    }

    #[test]
    fn calculate_relative_offset_months() {
        let base = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let result = calculate_relative_offset(Some("3m"), Some(base), false);
        assert_eq!(result, NaiveDate::from_ymd_opt(2024, 9, 10).unwrap());
    }

    #[test]
    fn calculate_relative_offset_with_no_marker_returns_from_date() {
        let base = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        assert_eq!(calculate_relative_offset(Some("nonsense"), Some(base), false), base);
        assert_eq!(calculate_relative_offset(None, Some(base), false), base);
    }
}
