#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use shared::llm::{
    AssistantReply, ChatCompletion, ChatCompletionFuture, ChatCompletionGateway,
    ChatCompletionRequest, LlmGatewayError, ToolCallRequest,
};
use shared::prayer_times::{PrayerTimes, PrayerTimesError, PrayerTimesFuture, PrayerTimesProvider};
use shared::repos::Store;
use shared::sql_gate::SqlGate;
use shared::tools::{ToolRegistry, ToolServices};
use sqlx::migrate::Migrator;

pub const TODAY: &str = "2026-03-01";

pub fn fixed_now(time: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(&format!("{TODAY} {time}"), "%Y-%m-%d %H:%M")
        .expect("fixed time should parse")
}

/// Single-connection in-memory database with migrations applied and a small
/// fixture set loaded.
pub async fn seeded_store() -> Store {
    let pool = Store::pool_options()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database should open");

    let migrations = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../db/migrations");
    Migrator::new(migrations)
        .await
        .expect("migrations should load")
        .run(&pool)
        .await
        .expect("migrations should apply");

    sqlx::query(
        "INSERT INTO users (id, email, first_name, last_name, phone) VALUES
            (1, 'a@b.org', 'Amina', 'Begum', '555-0100'),
            (2, 'yusuf@example.org', 'Yusuf', 'Khan', NULL)",
    )
    .execute(&pool)
    .await
    .expect("users should insert");

    sqlx::query(
        "INSERT INTO events
            (id, title, description, date, time, location, category, volunteers_needed,
             contact_email, price, status)
         VALUES
            (1, 'Youth Halaqa', 'Weekly circle for teens', '2026-03-07', '16:00',
             'Main Hall', 'education', 0, 'youth@mosque.org', 0, 'active'),
            (2, 'Community Iftar', 'Open iftar for all', '2026-03-10', '18:30',
             'Courtyard', 'community', 6, 'iftar@mosque.org', 0, 'active'),
            (3, 'Marriage Workshop', 'Pre-marital course', '2026-03-14', '10:00',
             'Room 2', 'education', 0, 'family@mosque.org', 10, 'active'),
            (4, 'Park Cleanup', 'Neighbourhood cleanup', '2026-03-05', '09:00',
             'Flushing Meadows', 'service', 4, 'service@mosque.org', NULL, 'active'),
            (5, 'Old Fundraiser', 'Already happened', '2026-01-10', '19:00',
             'Main Hall', 'fundraising', 2, 'funds@mosque.org', 0, 'active'),
            (6, 'Cancelled Picnic', 'Called off', '2026-04-01', '12:00',
             'Park', 'community', 3, 'picnic@mosque.org', 0, 'cancelled')",
    )
    .execute(&pool)
    .await
    .expect("events should insert");

    Store::from_pool(pool)
}

pub async fn insert_many_events(store: &Store, count: u32) {
    for index in 0..count {
        sqlx::query(
            "INSERT INTO events (title, date, time, contact_email) VALUES (?1, ?2, '08:00', '')",
        )
        .bind(format!("Study Night {index}"))
        .bind(format!("2026-05-{:02}", (index % 28) + 1))
        .execute(store.pool())
        .await
        .expect("event should insert");
    }
}

pub fn sample_prayer_times(date: NaiveDate) -> PrayerTimes {
    PrayerTimes {
        date: date.format("%Y-%m-%d").to_string(),
        hijri_date: "11 Ramadan 1447 AH".to_string(),
        fajr: "5:20 AM".to_string(),
        fajr_iqama: "5:40 AM".to_string(),
        sunrise: "6:35 AM".to_string(),
        dhuhr: "12:10 PM".to_string(),
        dhuhr_iqama: "12:20 PM".to_string(),
        asr: "3:25 PM".to_string(),
        asr_iqama: "3:35 PM".to_string(),
        maghrib: "5:50 PM".to_string(),
        maghrib_iqama: "5:55 PM".to_string(),
        isha: "7:05 PM".to_string(),
        isha_iqama: "7:15 PM".to_string(),
    }
}

/// Serves a fixed schedule for any date, or fails every call.
#[derive(Debug, Default)]
pub struct FixedPrayerTimes {
    pub fail: bool,
    pub requested: Mutex<Vec<Option<NaiveDate>>>,
}

impl FixedPrayerTimes {
    pub fn failing() -> Self {
        Self {
            fail: true,
            requested: Mutex::new(Vec::new()),
        }
    }
}

impl PrayerTimesProvider for FixedPrayerTimes {
    fn fetch<'a>(&'a self, date: Option<NaiveDate>) -> PrayerTimesFuture<'a> {
        Box::pin(async move {
            self.requested
                .lock()
                .expect("request log lock should not be poisoned")
                .push(date);
            if self.fail {
                return Err(PrayerTimesError::Upstream("status=503".to_string()));
            }
            let date = date.unwrap_or_else(|| fixed_now("12:00").date());
            Ok(sample_prayer_times(date))
        })
    }
}

pub fn services(store: Store, prayer_times: Arc<FixedPrayerTimes>) -> ToolServices {
    ToolServices::new(store, prayer_times, Duration::from_secs(5))
}

/// Default tools over `store` whose storage calls give up after `storage_timeout`.
pub fn registry_with_timeout(store: Store, storage_timeout: Duration) -> ToolRegistry {
    ToolRegistry::with_default_tools(
        ToolServices::new(store, Arc::new(FixedPrayerTimes::default()), storage_timeout),
        SqlGate::default(),
    )
    .expect("default tools should register")
}

pub async fn default_registry() -> (ToolRegistry, Arc<FixedPrayerTimes>) {
    let prayer_times = Arc::new(FixedPrayerTimes::default());
    let registry = ToolRegistry::with_default_tools(
        services(seeded_store().await, prayer_times.clone()),
        SqlGate::default(),
    )
    .expect("default tools should register");
    (registry, prayer_times)
}

/// Replays canned model turns and records every request it receives.
#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<VecDeque<Result<AssistantReply, LlmGatewayError>>>,
    pub requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl ScriptedGateway {
    pub fn new(replies: Vec<Result<AssistantReply, LlmGatewayError>>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from(replies)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded(&self) -> Vec<ChatCompletionRequest> {
        self.requests
            .lock()
            .expect("request log lock should not be poisoned")
            .clone()
    }
}

impl ChatCompletionGateway for ScriptedGateway {
    fn complete<'a>(&'a self, request: ChatCompletionRequest) -> ChatCompletionFuture<'a> {
        Box::pin(async move {
            self.requests
                .lock()
                .expect("request log lock should not be poisoned")
                .push(request);
            let next = self
                .replies
                .lock()
                .expect("reply queue lock should not be poisoned")
                .pop_front()
                .unwrap_or_else(|| {
                    Err(LlmGatewayError::ProviderFailure(
                        "exhausted_scripted_replies".to_string(),
                    ))
                });

            next.map(|reply| ChatCompletion {
                model: "scripted-model".to_string(),
                provider_request_id: None,
                reply,
                usage: None,
            })
        })
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }
}

pub fn text_reply(content: &str) -> Result<AssistantReply, LlmGatewayError> {
    Ok(AssistantReply {
        content: Some(content.to_string()),
        tool_calls: Vec::new(),
    })
}

pub fn tool_call_reply(calls: &[(&str, &str, &str)]) -> Result<AssistantReply, LlmGatewayError> {
    Ok(AssistantReply {
        content: None,
        tool_calls: calls
            .iter()
            .map(|(id, name, arguments)| ToolCallRequest {
                id: (*id).to_string(),
                name: (*name).to_string(),
                arguments: (*arguments).to_string(),
            })
            .collect(),
    })
}
