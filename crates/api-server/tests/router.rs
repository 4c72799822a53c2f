use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_server::http::{AppState, build_router};
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use chrono::NaiveDate;
use serde_json::{Value, json};
use shared::chat::ChatOrchestrator;
use shared::config::{AiProvider, ChatSettings};
use shared::llm::{
    AssistantReply, ChatCompletion, ChatCompletionFuture, ChatCompletionGateway,
    ChatCompletionRequest, LlmGatewayError,
};
use shared::prayer_times::{PrayerTimes, PrayerTimesError, PrayerTimesFuture, PrayerTimesProvider};
use shared::repos::Store;
use shared::sessions::SessionStore;
use shared::sql_gate::SqlGate;
use shared::tools::{ToolRegistry, ToolServices};
use sqlx::migrate::Migrator;
use tower::ServiceExt;

struct CannedGateway {
    replies: Mutex<VecDeque<Result<AssistantReply, LlmGatewayError>>>,
}

impl CannedGateway {
    fn new(replies: Vec<Result<AssistantReply, LlmGatewayError>>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from(replies)),
        }
    }
}

impl ChatCompletionGateway for CannedGateway {
    fn complete<'a>(&'a self, _request: ChatCompletionRequest) -> ChatCompletionFuture<'a> {
        Box::pin(async move {
            let next = self
                .replies
                .lock()
                .expect("reply queue lock should not be poisoned")
                .pop_front()
                .unwrap_or_else(|| Err(LlmGatewayError::Timeout));
            next.map(|reply| ChatCompletion {
                model: "canned-model".to_string(),
                provider_request_id: None,
                reply,
                usage: None,
            })
        })
    }

    fn model_name(&self) -> &str {
        "canned-model"
    }
}

struct StaticPrayerTimes {
    fail: bool,
}

impl PrayerTimesProvider for StaticPrayerTimes {
    fn fetch<'a>(&'a self, date: Option<NaiveDate>) -> PrayerTimesFuture<'a> {
        Box::pin(async move {
            if self.fail {
                return Err(PrayerTimesError::Timeout);
            }
            let date = date.unwrap_or_else(|| {
                NaiveDate::from_ymd_opt(2026, 3, 1).expect("fixed date should be valid")
            });
            Ok(PrayerTimes {
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
            })
        })
    }
}

async fn memory_store() -> Store {
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
        "INSERT INTO events (title, date, time, volunteers_needed, contact_email, status) VALUES
            ('Past Bazaar', '2000-01-01', '10:00', 5, 'bazaar@mosque.org', 'active'),
            ('Future Iftar', '2099-03-10', '18:30', 6, 'iftar@mosque.org', 'active'),
            ('Future Halaqa', '2099-03-07', '16:00', 0, 'youth@mosque.org', 'active')",
    )
    .execute(&pool)
    .await
    .expect("events should insert");

    for index in 0..25 {
        sqlx::query("INSERT INTO events (title, date, time) VALUES (?1, '2099-06-01', '08:00')")
            .bind(format!("Study Night {index}"))
            .execute(&pool)
            .await
            .expect("event should insert");
    }

    Store::from_pool(pool)
}

async fn app_with(
    replies: Vec<Result<AssistantReply, LlmGatewayError>>,
    prayer_times_fail: bool,
) -> Router {
    app_over(
        memory_store().await,
        replies,
        prayer_times_fail,
        Duration::from_secs(5),
    )
}

fn app_over(
    store: Store,
    replies: Vec<Result<AssistantReply, LlmGatewayError>>,
    prayer_times_fail: bool,
    storage_timeout: Duration,
) -> Router {
    let prayer_times: Arc<dyn PrayerTimesProvider> = Arc::new(StaticPrayerTimes {
        fail: prayer_times_fail,
    });
    let tools = ToolRegistry::with_default_tools(
        ToolServices::new(store.clone(), prayer_times.clone(), storage_timeout),
        SqlGate::default(),
    )
    .expect("default tools should register");
    let orchestrator = ChatOrchestrator::new(
        ChatSettings::default(),
        SessionStore::new(8),
        tools,
        Arc::new(CannedGateway::new(replies)),
    );

    build_router(AppState {
        store,
        orchestrator,
        prayer_times,
        ai_provider: AiProvider::Groq,
        organization_time_zone: "America/New_York".to_string(),
        storage_timeout,
    })
}

fn text(content: &str) -> Result<AssistantReply, LlmGatewayError> {
    Ok(AssistantReply {
        content: Some(content.to_string()),
        tool_calls: Vec::new(),
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body should be JSON")
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

#[tokio::test]
async fn root_describes_the_service() {
    let app = app_with(Vec::new(), false).await;

    let (status, body) = send(&app, get("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider"], "groq");
    assert_eq!(body["model"], "canned-model");
}

#[tokio::test]
async fn health_reports_database_and_tools() {
    let app = app_with(Vec::new(), false).await;

    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
    assert_eq!(body["tools"], 9);
}

#[tokio::test]
async fn chat_returns_reply_and_defaults_session() {
    let app = app_with(vec![text("Wa alaikum assalam!")], false).await;

    let (status, body) = send(
        &app,
        post_json("/chat", json!({ "message": "Assalamu alaikum" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "Wa alaikum assalam!");
    assert_eq!(body["context"]["session_id"], "default");
    assert!(body["context"]["timestamp"].is_string());
    assert_eq!(body["tools_used"], json!([]));

    let (_, memory) = send(&app, get("/agent/memory/default")).await;
    assert_eq!(memory["history"][0]["role"], "user");
    assert_eq!(memory["history"][1]["content"], "Wa alaikum assalam!");
}

#[tokio::test]
async fn chat_rejects_blank_messages() {
    let app = app_with(Vec::new(), false).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/chat")
                .header("content-type", "application/json")
                .header("x-request-id", "req-blank-1")
                .body(Body::from(json!({ "message": "   " }).to_string()))
                .expect("request should build"),
        )
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok()),
        Some("req-blank-1")
    );
}

#[tokio::test]
async fn chat_failure_is_a_generic_server_error() {
    let app = app_with(
        vec![Err(LlmGatewayError::ProviderFailure(
            "status=500 code=internal secret detail".to_string(),
        ))],
        false,
    )
    .await;

    let (status, body) = send(
        &app,
        post_json("/chat", json!({ "message": "hi", "session_id": "s9" })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "chat_failed");
    let message = body["error"]["message"].as_str().unwrap_or_default();
    assert!(message.starts_with("I apologize"));
    assert!(!message.contains("secret"));

    let (_, memory) = send(&app, get("/agent/memory/s9")).await;
    assert_eq!(memory["history"], json!([]));
}

#[tokio::test]
async fn prayer_times_passthrough_validates_and_maps_failures() {
    let app = app_with(Vec::new(), false).await;

    let (status, body) = send(&app, get("/prayer-times?date=2026-03-02")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["date"], "2026-03-02");
    assert_eq!(body["fajr_iqama"], "5:40 AM");

    let (status, body) = send(&app, get("/prayer-times?date=tomorrow")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_date");

    let failing = app_with(Vec::new(), true).await;
    let (status, body) = send(&failing, get("/prayer-times")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "prayer_times_unavailable");
}

#[tokio::test]
async fn events_clamp_limit_and_skip_past_events() {
    let app = app_with(Vec::new(), false).await;

    let (status, body) = send(&app, get("/events?limit=50")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 20);
    assert_eq!(body["events"][0]["title"], "Future Halaqa");

    let (_, body) = send(&app, get("/events")).await;
    assert_eq!(body["count"], 10);

    let (_, body) = send(&app, get("/events?limit=0")).await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn volunteer_opportunities_list_upcoming_needs() {
    let app = app_with(Vec::new(), false).await;

    let (status, body) = send(&app, get("/volunteer-opportunities")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["opportunities"][0]["title"], "Future Iftar");
}

#[tokio::test]
async fn session_reset_clears_memory() {
    let app = app_with(vec![text("first")], false).await;

    send(
        &app,
        post_json("/chat", json!({ "message": "hello", "session_id": "s1" })),
    )
    .await;
    let (_, stats) = send(&app, get("/agent/stats")).await;
    assert_eq!(stats["active_sessions"], 1);
    assert_eq!(stats["tool_count"], 9);

    let (status, body) = send(&app, post_json("/sessions/s1/reset", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));

    let (_, memory) = send(&app, get("/agent/memory/s1")).await;
    assert_eq!(memory["history"], json!([]));
    let (_, stats) = send(&app, get("/agent/stats")).await;
    assert_eq!(stats["active_sessions"], 0);

    let (status, _) = send(&app, post_json("/sessions/never-seen/reset", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn slow_store_calls_fail_instead_of_hanging() {
    let store = memory_store().await;
    let app = app_over(store.clone(), Vec::new(), false, Duration::from_millis(50));
    let held = store
        .pool()
        .acquire()
        .await
        .expect("connection should be free");

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["database"], "unavailable");

    let (status, body) = send(&app, get("/events")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "internal_error");

    let (status, body) = send(&app, get("/volunteer-opportunities")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "internal_error");

    drop(held);
}
