use std::sync::Arc;

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

use super::events::NoArguments;
use super::{
    ToolContext, ToolDefinition, ToolError, ToolFuture, ToolHandler, ToolServices,
    decode_arguments, parameters_schema,
};
use crate::prayer_times::{PrayerTimes, next_prayer};

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct PrayerTimesArguments {
    /// Target date in YYYY-MM-DD format. Resolve relative dates such as "tomorrow" first.
    pub date: Option<String>,
}

pub(super) fn get_prayer_times_tool(services: &ToolServices) -> Result<ToolDefinition, ToolError> {
    ToolDefinition::new(
        "get_prayer_times",
        "Get Adhan (call to prayer) and Iqama (start of prayer) times for Fajr, Dhuhr, Asr, \
         Maghrib and Isha on any date. Work out relative dates like 'tomorrow' or 'in 3 days' \
         before calling.",
        parameters_schema::<PrayerTimesArguments>(),
        Arc::new(GetPrayerTimes {
            services: services.clone(),
        }),
    )
}

pub(super) fn get_next_prayer_time_tool(
    services: &ToolServices,
) -> Result<ToolDefinition, ToolError> {
    ToolDefinition::new(
        "get_next_prayer_time",
        "Get the next prayer today by comparing the current time with today's schedule.",
        parameters_schema::<NoArguments>(),
        Arc::new(GetNextPrayerTime {
            services: services.clone(),
        }),
    )
}

pub struct GetPrayerTimes {
    services: ToolServices,
}

impl ToolHandler for GetPrayerTimes {
    fn call<'a>(&'a self, arguments: Value, context: &'a ToolContext) -> ToolFuture<'a> {
        Box::pin(async move {
            let arguments: PrayerTimesArguments =
                match decode_arguments("get_prayer_times", arguments) {
                    Ok(arguments) => arguments,
                    Err(payload) => return payload,
                };

            let date = match arguments
                .date
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
            {
                Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                    Ok(date) => date,
                    Err(_) => {
                        return json!({
                            "error": format!("Invalid date '{raw}'. Use YYYY-MM-DD format."),
                        });
                    }
                },
                None => context.today(),
            };

            match self.services.prayer_times.fetch(Some(date)).await {
                Ok(times) => json!({ "prayer_times": times }),
                Err(_) => json!({ "prayer_times": PrayerTimes::error_payload(date) }),
            }
        })
    }
}

pub struct GetNextPrayerTime {
    services: ToolServices,
}

impl ToolHandler for GetNextPrayerTime {
    fn call<'a>(&'a self, _arguments: Value, context: &'a ToolContext) -> ToolFuture<'a> {
        Box::pin(async move {
            let today = context.today();
            match self.services.prayer_times.fetch(Some(today)).await {
                Ok(times) => {
                    let now = context.now().time();
                    next_prayer(&times, now).to_payload(now)
                }
                Err(_) => PrayerTimes::error_payload(today),
            }
        })
    }
}
