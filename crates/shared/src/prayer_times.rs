use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::warn;

use crate::config::ConfigError;
use crate::config_env::{optional_trimmed_env, parse_u32_env, parse_u64_env};
use crate::timezone::local_date;

const DEFAULT_PRAYER_TIMES_URL: &str = "http://api.aladhan.com/v1/timingsByAddress";
const DEFAULT_PRAYER_TIMES_ADDRESS: &str = "89-89 168th St, Jamaica, NY 11432";
const DEFAULT_CALCULATION_METHOD: u32 = 2;
const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const DISPLAY_TIME_FORMAT: &str = "%-I:%M %p";

pub type PrayerTimesFuture<'a> =
    Pin<Box<dyn Future<Output = Result<PrayerTimes, PrayerTimesError>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Prayer {
    Fajr,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl Prayer {
    pub const ALL: [Prayer; 5] = [
        Prayer::Fajr,
        Prayer::Dhuhr,
        Prayer::Asr,
        Prayer::Maghrib,
        Prayer::Isha,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fajr => "Fajr",
            Self::Dhuhr => "Dhuhr",
            Self::Asr => "Asr",
            Self::Maghrib => "Maghrib",
            Self::Isha => "Isha",
        }
    }

    /// Minutes between the Adhan and the Iqama.
    pub const fn iqama_offset_minutes(self) -> i64 {
        match self {
            Self::Fajr => 20,
            Self::Maghrib => 5,
            Self::Dhuhr | Self::Asr | Self::Isha => 10,
        }
    }
}

/// One day's schedule with display strings in 12-hour `h:MM AM` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerTimes {
    pub date: String,
    pub hijri_date: String,
    pub fajr: String,
    pub fajr_iqama: String,
    pub sunrise: String,
    pub dhuhr: String,
    pub dhuhr_iqama: String,
    pub asr: String,
    pub asr_iqama: String,
    pub maghrib: String,
    pub maghrib_iqama: String,
    pub isha: String,
    pub isha_iqama: String,
}

impl PrayerTimes {
    pub fn adhan_and_iqama(&self, prayer: Prayer) -> (&str, &str) {
        match prayer {
            Prayer::Fajr => (&self.fajr, &self.fajr_iqama),
            Prayer::Dhuhr => (&self.dhuhr, &self.dhuhr_iqama),
            Prayer::Asr => (&self.asr, &self.asr_iqama),
            Prayer::Maghrib => (&self.maghrib, &self.maghrib_iqama),
            Prayer::Isha => (&self.isha, &self.isha_iqama),
        }
    }

    pub fn error_payload(date: NaiveDate) -> Value {
        json!({
            "error": "Unable to fetch prayer times",
            "date": date.format("%Y-%m-%d").to_string(),
        })
    }

    /// Builds the schedule from upstream 24-hour timings such as `"05:12"` or
    /// `"05:12 (EST)"`.
    pub fn from_upstream_timings(
        date: NaiveDate,
        hijri_date: String,
        timings: &HashMap<String, String>,
    ) -> Result<Self, PrayerTimesError> {
        let adhan = |prayer: Prayer| upstream_time(timings, prayer.as_str());
        let fajr = adhan(Prayer::Fajr)?;
        let dhuhr = adhan(Prayer::Dhuhr)?;
        let asr = adhan(Prayer::Asr)?;
        let maghrib = adhan(Prayer::Maghrib)?;
        let isha = adhan(Prayer::Isha)?;
        let sunrise = upstream_time(timings, "Sunrise")?;

        Ok(Self {
            date: date.format("%Y-%m-%d").to_string(),
            hijri_date,
            fajr: display_time(fajr),
            fajr_iqama: display_time(iqama_time(fajr, Prayer::Fajr)),
            sunrise: display_time(sunrise),
            dhuhr: display_time(dhuhr),
            dhuhr_iqama: display_time(iqama_time(dhuhr, Prayer::Dhuhr)),
            asr: display_time(asr),
            asr_iqama: display_time(iqama_time(asr, Prayer::Asr)),
            maghrib: display_time(maghrib),
            maghrib_iqama: display_time(iqama_time(maghrib, Prayer::Maghrib)),
            isha: display_time(isha),
            isha_iqama: display_time(iqama_time(isha, Prayer::Isha)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextPrayer {
    Today {
        prayer: Prayer,
        adhan_time: String,
        iqama_time: String,
    },
    FajrTomorrow,
}

impl NextPrayer {
    pub fn to_payload(&self, current_time: NaiveTime) -> Value {
        match self {
            Self::Today {
                prayer,
                adhan_time,
                iqama_time,
            } => json!({
                "next_prayer": prayer.as_str(),
                "adhan_time": adhan_time,
                "iqama_time": iqama_time,
                "current_time": current_time.format("%H:%M").to_string(),
            }),
            Self::FajrTomorrow => json!({
                "next_prayer": "Fajr (tomorrow)",
                "message": "All prayers for today have passed. Next prayer is Fajr tomorrow.",
            }),
        }
    }
}

/// First prayer in canonical order whose Adhan is strictly after `now`.
/// Entries that do not parse as a clock time are skipped.
pub fn next_prayer(times: &PrayerTimes, now: NaiveTime) -> NextPrayer {
    for prayer in Prayer::ALL {
        let (adhan, iqama) = times.adhan_and_iqama(prayer);
        let Some(adhan_clock) = parse_display_time(adhan) else {
            continue;
        };
        if adhan_clock > now {
            return NextPrayer::Today {
                prayer,
                adhan_time: adhan.to_string(),
                iqama_time: iqama.to_string(),
            };
        }
    }

    NextPrayer::FajrTomorrow
}

pub fn parse_display_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%I:%M %p").ok()
}

#[derive(Debug, Error)]
pub enum PrayerTimesError {
    #[error("prayer times request timed out")]
    Timeout,
    #[error("prayer times request failed: {0}")]
    Upstream(String),
    #[error("prayer times payload was invalid: {0}")]
    InvalidPayload(String),
}

pub trait PrayerTimesProvider: Send + Sync {
    /// Fetches the schedule for `date`, or for today in the organisation time
    /// zone when absent.
    fn fetch<'a>(&'a self, date: Option<NaiveDate>) -> PrayerTimesFuture<'a>;
}

#[derive(Debug, Clone)]
pub struct PrayerTimesConfig {
    pub url: String,
    pub address: String,
    pub method: u32,
    pub timeout_ms: u64,
}

impl Default for PrayerTimesConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PRAYER_TIMES_URL.to_string(),
            address: DEFAULT_PRAYER_TIMES_ADDRESS.to_string(),
            method: DEFAULT_CALCULATION_METHOD,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl PrayerTimesConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: optional_trimmed_env("PRAYER_TIMES_URL")
                .unwrap_or_else(|| DEFAULT_PRAYER_TIMES_URL.to_string()),
            address: optional_trimmed_env("PRAYER_TIMES_ADDRESS")
                .unwrap_or_else(|| DEFAULT_PRAYER_TIMES_ADDRESS.to_string()),
            method: parse_u32_env("PRAYER_TIMES_METHOD", DEFAULT_CALCULATION_METHOD)?,
            timeout_ms: parse_u64_env("PRAYER_TIMES_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?,
        })
    }
}

/// Aladhan `timingsByAddress` client.
#[derive(Clone)]
pub struct AladhanPrayerTimes {
    client: reqwest::Client,
    config: PrayerTimesConfig,
    time_zone: String,
}

impl AladhanPrayerTimes {
    pub fn new(
        config: PrayerTimesConfig,
        time_zone: impl Into<String>,
    ) -> Result<Self, PrayerTimesError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| PrayerTimesError::Upstream(err.to_string()))?;

        Ok(Self {
            client,
            config,
            time_zone: time_zone.into(),
        })
    }

    async fn fetch_for(&self, date: NaiveDate) -> Result<PrayerTimes, PrayerTimesError> {
        let method = self.config.method.to_string();
        let upstream_date = date.format("%d-%m-%Y").to_string();
        let response = self
            .client
            .get(&self.config.url)
            .query(&[
                ("address", self.config.address.as_str()),
                ("method", method.as_str()),
                ("date", upstream_date.as_str()),
            ])
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    PrayerTimesError::Timeout
                } else {
                    PrayerTimesError::Upstream("request_unavailable".to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PrayerTimesError::Upstream(format!(
                "status={}",
                status.as_u16()
            )));
        }

        let payload: AladhanResponse = response
            .json()
            .await
            .map_err(|err| PrayerTimesError::InvalidPayload(err.to_string()))?;

        PrayerTimes::from_upstream_timings(
            date,
            payload.data.date.hijri.display(),
            &payload.data.timings,
        )
    }
}

impl PrayerTimesProvider for AladhanPrayerTimes {
    fn fetch<'a>(&'a self, date: Option<NaiveDate>) -> PrayerTimesFuture<'a> {
        Box::pin(async move {
            let date = date.unwrap_or_else(|| local_date(Utc::now(), &self.time_zone));
            let result = self.fetch_for(date).await;
            if let Err(err) = &result {
                warn!(date = %date, error = %err, "failed to fetch prayer times");
            }
            result
        })
    }
}

#[derive(Debug, Deserialize)]
struct AladhanResponse {
    data: AladhanData,
}

#[derive(Debug, Deserialize)]
struct AladhanData {
    timings: HashMap<String, String>,
    date: AladhanDate,
}

#[derive(Debug, Deserialize)]
struct AladhanDate {
    hijri: AladhanHijri,
}

#[derive(Debug, Deserialize)]
struct AladhanHijri {
    day: String,
    month: AladhanHijriMonth,
    year: String,
}

#[derive(Debug, Deserialize)]
struct AladhanHijriMonth {
    en: String,
}

impl AladhanHijri {
    fn display(&self) -> String {
        let day = self.day.trim_start_matches('0');
        format!("{day} {} {} AH", self.month.en, self.year)
    }
}

fn upstream_time(
    timings: &HashMap<String, String>,
    key: &str,
) -> Result<NaiveTime, PrayerTimesError> {
    let raw = timings
        .get(key)
        .ok_or_else(|| PrayerTimesError::InvalidPayload(format!("missing timing {key}")))?;
    let clock = raw.split_whitespace().next().unwrap_or_default();
    NaiveTime::parse_from_str(clock, "%H:%M")
        .map_err(|_| PrayerTimesError::InvalidPayload(format!("unparsable timing {key}")))
}

fn iqama_time(adhan: NaiveTime, prayer: Prayer) -> NaiveTime {
    adhan + TimeDelta::minutes(prayer.iqama_offset_minutes())
}

fn display_time(time: NaiveTime) -> String {
    time.format(DISPLAY_TIME_FORMAT).to_string()
}
