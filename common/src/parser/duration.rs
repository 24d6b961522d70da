// Lenient duration parsing for free-text upstream fields

use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

static STRICT_DURATION: OnceLock<Regex> = OnceLock::new();
static INTEGER: OnceLock<Regex> = OnceLock::new();

fn strict_pattern() -> &'static Regex {
    STRICT_DURATION.get_or_init(|| {
        Regex::new(r"^(?:([0-9]+)\.)?([0-9]+):([0-9]{1,2}):([0-9]{1,2})(?:\.([0-9]{1,9}))?$")
            .unwrap_or_else(|e| panic!("invalid strict duration pattern: {e}"))
    })
}

fn integer_pattern() -> &'static Regex {
    INTEGER.get_or_init(|| {
        Regex::new(r"[0-9]+").unwrap_or_else(|e| panic!("invalid integer pattern: {e}"))
    })
}

/// Parse a duration the analysis service wrote as free text.
///
/// Never fails. Blank text is zero. `H:MM:SS[.fff]` (optionally prefixed
/// with `d.` days) is taken as written. Anything else falls back to the
/// integers embedded in the text: one is seconds, two are minutes and
/// seconds, three or more are hours, minutes and seconds with extras
/// ignored. Values too large to represent saturate.
pub fn parse_lenient_duration(text: &str) -> Duration {
    let text = text.trim();
    if text.is_empty() {
        return Duration::ZERO;
    }

    if let Some(duration) = parse_strict(text) {
        return duration;
    }

    let numbers: Vec<u64> = integer_pattern()
        .find_iter(text)
        .map(|m| m.as_str().parse::<u64>().unwrap_or(u64::MAX))
        .collect();

    match numbers.as_slice() {
        [] => Duration::ZERO,
        [seconds] => Duration::from_secs(*seconds),
        [minutes, seconds] => Duration::from_secs(hms_to_secs(0, *minutes, *seconds)),
        [hours, minutes, seconds, ..] => {
            Duration::from_secs(hms_to_secs(*hours, *minutes, *seconds))
        }
    }
}

fn hms_to_secs(hours: u64, minutes: u64, seconds: u64) -> u64 {
    hours
        .saturating_mul(3600)
        .saturating_add(minutes.saturating_mul(60))
        .saturating_add(seconds)
}

fn parse_strict(text: &str) -> Option<Duration> {
    let caps = strict_pattern().captures(text)?;

    let days: u64 = match caps.get(1) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    let hours: u64 = caps[2].parse().ok()?;
    let minutes: u64 = caps[3].parse().ok()?;
    let seconds: u64 = caps[4].parse().ok()?;
    if minutes >= 60 || seconds >= 60 {
        return None;
    }

    let nanos = match caps.get(5) {
        Some(fraction) => {
            let digits = fraction.as_str();
            let padded = format!("{:0<9}", digits);
            padded.parse::<u32>().ok()?
        }
        None => 0,
    };

    let total = days
        .saturating_mul(86_400)
        .saturating_add(hms_to_secs(hours, minutes, seconds));
    Some(Duration::new(total, nanos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_is_zero() {
        assert_eq!(parse_lenient_duration(""), Duration::ZERO);
        assert_eq!(parse_lenient_duration("   "), Duration::ZERO);
    }

    #[test]
    fn test_strict_form() {
        assert_eq!(parse_lenient_duration("01:02:03"), Duration::from_secs(3723));
        assert_eq!(parse_lenient_duration("0:00:45"), Duration::from_secs(45));
        assert_eq!(
            parse_lenient_duration("1.02:00:00"),
            Duration::from_secs(86_400 + 7200)
        );
        assert_eq!(
            parse_lenient_duration("00:00:01.5"),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn test_out_of_range_strict_falls_back_to_integers() {
        // 75 minutes is not a valid strict component, integers still apply
        assert_eq!(
            parse_lenient_duration("00:75:00"),
            Duration::from_secs(75 * 60)
        );
    }

    #[test]
    fn test_free_text_integers() {
        assert_eq!(parse_lenient_duration("about 45 seconds"), Duration::from_secs(45));
        assert_eq!(
            parse_lenient_duration("5 min 30 s"),
            Duration::from_secs(330)
        );
        assert_eq!(parse_lenient_duration("12:30"), Duration::from_secs(750));
        assert_eq!(
            parse_lenient_duration("2h 15m 10s and 99 more"),
            Duration::from_secs(2 * 3600 + 15 * 60 + 10)
        );
        assert_eq!(parse_lenient_duration("immediately"), Duration::ZERO);
    }

    #[test]
    fn test_huge_numbers_saturate() {
        let d = parse_lenient_duration("99999999999999999999999 hours 1 min 1 s");
        assert_eq!(d, Duration::from_secs(u64::MAX));
    }
}
