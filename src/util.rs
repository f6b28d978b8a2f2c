// Utility helpers for parsing and basic statistics.
//
// All the forgiving cell handling lives here so the rest of the code can
// work with `NaiveDate`s and plain numbers.
use chrono::{Datelike, NaiveDate, NaiveTime};
use num_format::{Locale, ToFormattedString};

// Day-first shapes tried in order. ISO comes first because an ISO string
// can never be confused with a day-first one.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d"];
const SHORT_YEAR_FORMATS: &[&str] = &["%d/%m/%y", "%d-%m-%y", "%d.%m.%y"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];

/// Parse a spreadsheet date cell using the day-first convention.
///
/// - Accepts `Option<&str>` so callers can pass through optional cells.
/// - A time part after a space or `T` is validated and then dropped,
///   including fractional seconds, `Z` and `±HH:MM` offsets.
/// - Returns `None` for anything that cannot be parsed; callers turn that
///   into a missing cell rather than an error.
pub fn parse_date_dayfirst(s: Option<&str>) -> Option<NaiveDate> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    let (date_part, time_part) = match s.split_once(|c: char| c == ' ' || c == 'T') {
        Some((d, t)) => (d, Some(t.trim())),
        None => (s, None),
    };
    if let Some(t) = time_part {
        parse_time(t)?;
    }
    parse_date_part(date_part)
}

fn parse_date_part(s: &str) -> Option<NaiveDate> {
    // `%Y` happily reads "24" as year 24, so a plausible year is required
    // before accepting a four-digit-year match.
    DATE_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .find(|d| d.year() >= 1000)
        .or_else(|| {
            SHORT_YEAR_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        })
}

fn parse_time(t: &str) -> Option<NaiveTime> {
    let t = t.trim_end_matches('Z');
    // "+03:00" / "-0300" offsets start after "HH:MM".
    let t = match t.char_indices().skip(5).find(|(_, c)| *c == '+' || *c == '-') {
        Some((i, _)) => &t[..i],
        None => t,
    };
    let t = t.split('.').next().unwrap_or(t);
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(t, fmt).ok())
}

/// Whole days from `start` to `end`; negative when `end` is earlier.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days()
}

pub fn average(v: &[f64]) -> Option<f64> {
    // `None` for an empty slice so callers can tell "no data" from zero.
    if v.is_empty() {
        return None;
    }
    let sum: f64 = v.iter().copied().sum();
    Some(sum / v.len() as f64)
}

pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

/// Format with `.` thousands grouping and `,` decimals, the way the back
/// office reads numbers (e.g. `1.234.567,89`).
pub fn format_number(n: f64, decimals: usize) -> String {
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::pt);
    if let Some(frac) = frac_part {
        res.push(',');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::pt)
}

pub fn format_date(d: Option<NaiveDate>) -> String {
    d.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

pub fn format_opt<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_day_first() {
        assert_eq!(parse_date_dayfirst(Some("03/04/2024")), Some(ymd(2024, 4, 3)));
        assert_eq!(parse_date_dayfirst(Some("03-04-2024")), Some(ymd(2024, 4, 3)));
        assert_eq!(parse_date_dayfirst(Some("03.04.2024")), Some(ymd(2024, 4, 3)));
        assert_eq!(parse_date_dayfirst(Some("03/04/24")), Some(ymd(2024, 4, 3)));
    }

    #[test]
    fn parses_iso_and_datetimes() {
        assert_eq!(parse_date_dayfirst(Some("2024-01-10")), Some(ymd(2024, 1, 10)));
        assert_eq!(parse_date_dayfirst(Some(" 2024-01-10 13:45:00 ")), Some(ymd(2024, 1, 10)));
        assert_eq!(parse_date_dayfirst(Some("2024-01-10T08:00:00.000Z")), Some(ymd(2024, 1, 10)));
        assert_eq!(parse_date_dayfirst(Some("10/01/2024 08:30")), Some(ymd(2024, 1, 10)));
    }

    #[test]
    fn two_digit_years_with_time_are_not_ancient() {
        assert_eq!(parse_date_dayfirst(Some("10/01/24 08:30")), Some(ymd(2024, 1, 10)));
        assert_eq!(parse_date_dayfirst(Some("10-01-24 08:30:00")), Some(ymd(2024, 1, 10)));
        assert_eq!(parse_date_dayfirst(Some("10.01.24")), Some(ymd(2024, 1, 10)));
    }

    #[test]
    fn every_day_first_shape_accepts_a_time() {
        for s in [
            "10/01/2024 08:30",
            "10-01-2024 08:30:15",
            "10.01.2024 08:30",
            "10.01.2024 08:30:15",
            "10/01/24 08:30:15",
            "2024-01-10 08:30",
            "2024-01-10T08:30:15",
        ] {
            assert_eq!(parse_date_dayfirst(Some(s)), Some(ymd(2024, 1, 10)), "{s}");
        }
    }

    #[test]
    fn timezone_offsets_are_dropped() {
        assert_eq!(parse_date_dayfirst(Some("2024-01-10T08:30:00+00:00")), Some(ymd(2024, 1, 10)));
        assert_eq!(parse_date_dayfirst(Some("2024-01-10T23:30:00-03:00")), Some(ymd(2024, 1, 10)));
        assert_eq!(parse_date_dayfirst(Some("2024-01-10T08:30:00.250+0100")), Some(ymd(2024, 1, 10)));
    }

    #[test]
    fn bad_time_part_is_none() {
        assert_eq!(parse_date_dayfirst(Some("10/01/2024 soon")), None);
        assert_eq!(parse_date_dayfirst(Some("10/01/2024 25:00")), None);
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_date_dayfirst(None), None);
        assert_eq!(parse_date_dayfirst(Some("")), None);
        assert_eq!(parse_date_dayfirst(Some("n/a")), None);
        assert_eq!(parse_date_dayfirst(Some("31/02/2024")), None);
    }

    #[test]
    fn days_between_is_signed() {
        assert_eq!(days_between(ymd(2024, 1, 10), ymd(2024, 1, 12)), 2);
        assert_eq!(days_between(ymd(2024, 1, 12), ymd(2024, 1, 10)), -2);
    }

    #[test]
    fn number_formatting_uses_dot_grouping() {
        assert_eq!(format_int(1234567usize), "1.234.567");
        assert_eq!(format_number(1234.5, 1), "1.234,5");
        assert_eq!(format_number(-2.0, 0), "-2");
        assert_eq!(format_number(0.0, 1), "0,0");
    }

    #[test]
    fn average_of_empty_is_none() {
        assert_eq!(average(&[]), None);
        assert_eq!(average(&[1.0, 2.0]), Some(1.5));
    }
}
