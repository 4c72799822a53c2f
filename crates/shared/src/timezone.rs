use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;

pub const DEFAULT_ORGANIZATION_TIME_ZONE: &str = "America/New_York";

pub fn normalize_time_zone(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    trimmed.parse::<Tz>().ok().map(|tz| tz.name().to_string())
}

pub fn parse_time_zone_or_default(value: &str) -> Tz {
    normalize_time_zone(value)
        .and_then(|normalized| normalized.parse::<Tz>().ok())
        .unwrap_or(chrono_tz::America::New_York)
}

pub fn local_now(now_utc: DateTime<Utc>, time_zone: &str) -> NaiveDateTime {
    let tz = parse_time_zone_or_default(time_zone);
    now_utc.with_timezone(&tz).naive_local()
}

pub fn local_date(now_utc: DateTime<Utc>, time_zone: &str) -> NaiveDate {
    local_now(now_utc, time_zone).date()
}
