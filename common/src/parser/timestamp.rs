// Request timestamp assembly from the date and first-message fields

use chrono::{NaiveDate, NaiveDateTime};

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];

/// Combine the request date and the time of the first message into one
/// timestamp.
///
/// Returns `None` when the combination matches none of the accepted
/// formats. A blank time yields midnight of the date.
pub fn parse_request_timestamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    let date = date.trim();
    let time = time.trim();
    if date.is_empty() {
        return None;
    }

    if time.is_empty() {
        if let Some(ts) = DATE_TIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(date, fmt).ok())
        {
            return Some(ts);
        }
        return DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(date, fmt).ok())
            .and_then(|d| d.and_hms_opt(0, 0, 0));
    }

    let combined = format!("{} {}", date, time);
    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&combined, fmt).ok())
}
