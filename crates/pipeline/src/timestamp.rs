//! 헤더 필드 → 유닉스 타임스탬프
//!
//! 우선순위:
//! 1. 헤더의 `timestamp` 필드 (필드 맵에서 제거)
//! 2. `date` + `time` 을 프리픽스의 `time_format` 또는 내장 syslog 형식으로 해석,
//!    `timeZone` 필드(기본 UTC) 기준
//! 3. 현재 시각
//!
//! 연도가 없는 형식은 현재 연도를 붙여 해석하고, 결과가 하루 이상 미래이면
//! 작년 날짜로 봅니다 (연말에 받은 12월 31일 메시지 등).

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use netlog_core::envelope::MessageDetails;
use serde_json::Value;

use crate::message::value_to_string;

/// `time_format` 이 없을 때 차례로 시도하는 형식
pub const BUILTIN_FORMATS: [&str; 8] = [
    "%b %d %H:%M:%S",
    "%b %d %H:%M:%S%.f",
    "%b %d %Y %H:%M:%S",
    "%b %d %Y %H:%M:%S%.f",
    "%Y %b %d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

const YEAR_SPECIFIERS: [&str; 6] = ["%Y", "%y", "%C", "%G", "%F", "%D"];

/// 메시지의 타임스탬프를 결정합니다.
pub fn resolve(fields: &mut MessageDetails, time_format: Option<&str>, now: DateTime<Utc>) -> i64 {
    if let Some(explicit) = fields.remove("timestamp") {
        match explicit_seconds(&explicit) {
            Some(ts) => return ts,
            None => tracing::warn!(value = %explicit, "ignoring malformed timestamp field"),
        }
    }

    let date = fields.get("date").and_then(value_to_string);
    let time = fields.get("time").and_then(value_to_string);
    if let (Some(date), Some(time)) = (date, time)
        && !date.is_empty()
        && !time.is_empty()
    {
        let offset = fields
            .get("timeZone")
            .and_then(value_to_string)
            .map_or(Some(utc()), |tz| parse_offset(&tz));
        let Some(offset) = offset else {
            tracing::warn!("unknown timeZone in message header, using current time");
            return now.timestamp();
        };
        let text = format!("{date} {time}");
        let parsed = match time_format {
            Some(format) => parse_with(&text, format, offset, now),
            None => BUILTIN_FORMATS
                .iter()
                .find_map(|format| parse_with(&text, format, offset, now)),
        };
        match parsed {
            Some(ts) => return ts,
            None => tracing::debug!(text = %text, "unable to parse date and time, using current time"),
        }
    }

    now.timestamp()
}

fn explicit_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_with(text: &str, format: &str, offset: FixedOffset, now: DateTime<Utc>) -> Option<i64> {
    let has_year = YEAR_SPECIFIERS.iter().any(|spec| format.contains(spec));
    let (text, format) = if has_year {
        (text.to_owned(), format.to_owned())
    } else {
        (format!("{} {text}", now.year()), format!("%Y {format}"))
    };

    let parsed = match DateTime::parse_from_str(&text, &format) {
        Ok(with_offset) => with_offset.with_timezone(&Utc),
        Err(_) => {
            let naive = NaiveDateTime::parse_from_str(&text, &format).ok()?;
            offset.from_local_datetime(&naive).single()?.with_timezone(&Utc)
        }
    };

    if parsed > now + Duration::days(1) {
        let moved = parsed
            .with_year(parsed.year() - 1)
            .unwrap_or(parsed - Duration::days(365));
        return Some(moved.timestamp());
    }
    Some(parsed.timestamp())
}

fn utc() -> FixedOffset {
    Utc.fix()
}

/// `UTC`, `Z`, `GMT`, `+HH:MM`, `+HHMM`, `+HH` 형식의 시간대를 해석합니다.
fn parse_offset(tz: &str) -> Option<FixedOffset> {
    let tz = tz.trim();
    if tz.is_empty() || ["UTC", "Z", "GMT"].iter().any(|n| tz.eq_ignore_ascii_case(n)) {
        return Some(utc());
    }
    let rest = tz
        .strip_prefix("UTC")
        .or_else(|| tz.strip_prefix("GMT"))
        .unwrap_or(tz);
    let (sign, digits) = match rest.split_at_checked(1)? {
        ("+", d) => (1, d),
        ("-", d) => (-1, d),
        _ => return None,
    };
    let digits: String = digits.chars().filter(|c| *c != ':').collect();
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn fields(pairs: &[(&str, Value)]) -> MessageDetails {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn explicit_timestamp_wins_and_is_removed() {
        let mut f = fields(&[
            ("timestamp", json!("1700000000")),
            ("date", json!("Mar 30")),
            ("time", json!("12:45:19")),
        ]);
        assert_eq!(resolve(&mut f, None, now()), 1_700_000_000);
        assert!(!f.contains_key("timestamp"));
    }

    #[test]
    fn syslog_date_without_year_uses_current_year() {
        let mut f = fields(&[("date", json!("Mar 30")), ("time", json!("12:45:19"))]);
        let expected = Utc.with_ymd_and_hms(2024, 3, 30, 12, 45, 19).unwrap();
        assert_eq!(resolve(&mut f, None, now()), expected.timestamp());
    }

    #[test]
    fn future_date_moves_back_one_year() {
        let mut f = fields(&[("date", json!("Dec 31")), ("time", json!("23:59:59"))]);
        let expected = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(resolve(&mut f, None, now()), expected.timestamp());
    }

    #[test]
    fn declared_format_and_offset() {
        let mut f = fields(&[
            ("date", json!("2024/06/01")),
            ("time", json!("10:00:00")),
            ("timeZone", json!("+02:00")),
        ]);
        let expected = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        assert_eq!(
            resolve(&mut f, Some("%Y/%m/%d %H:%M:%S"), now()),
            expected.timestamp()
        );
    }

    #[test]
    fn unparseable_date_falls_back_to_now() {
        let mut f = fields(&[("date", json!("yesterday")), ("time", json!("noonish"))]);
        assert_eq!(resolve(&mut f, None, now()), now().timestamp());
    }

    #[test]
    fn missing_fields_fall_back_to_now() {
        let mut f = MessageDetails::new();
        assert_eq!(resolve(&mut f, None, now()), now().timestamp());
    }

    #[test]
    fn offsets() {
        assert_eq!(parse_offset("UTC"), Some(utc()));
        assert_eq!(parse_offset("z"), Some(utc()));
        assert_eq!(parse_offset("-0530").map(|o| o.local_minus_utc()), Some(-19800));
        assert_eq!(parse_offset("UTC+1").map(|o| o.local_minus_utc()), Some(3600));
        assert_eq!(parse_offset("Mars/Olympus"), None);
    }
}
