use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::repos::Event;
use crate::sessions::SessionTurn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Client-supplied ambient context, for example `{"user_email": "..."}`.
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub context: ChatResponseContext,
    pub tools_used: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponseContext {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfoResponse {
    pub service: String,
    pub version: String,
    pub provider: String,
    pub model: String,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub tools: usize,
    pub active_sessions: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventsResponse {
    pub events: Vec<Event>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolunteerOpportunitiesResponse {
    pub opportunities: Vec<Event>,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrayerTimesQuery {
    pub date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionMemoryResponse {
    pub session_id: String,
    pub history: Vec<SessionTurn>,
    pub recent_events: Vec<String>,
    pub history_limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentStatsResponse {
    pub active_sessions: usize,
    pub tool_count: usize,
    pub tools: Vec<String>,
    pub provider: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
