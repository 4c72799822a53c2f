use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use jsonschema::JSONSchema;
use schemars::JsonSchema;
use schemars::schema_for;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::prayer_times::PrayerTimesProvider;
use crate::repos::{Store, StoreError, bounded};
use crate::sql_gate::SqlGate;

mod events;
mod prayer;
mod rsvp;
mod sql;

pub use events::{
    DEFAULT_EVENT_SEARCH_LIMIT, FindVolunteerContact, GetEventDetails, MAX_EVENT_SEARCH_LIMIT,
    SearchEvents, SearchVolunteerOpportunities, clamp_search_limit,
};
pub use prayer::{GetNextPrayerTime, GetPrayerTimes};
pub use rsvp::{RsvpCurrentUserToEvent, RsvpToEvent};
pub use sql::ExecuteSqlQuery;

pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Value> + Send + 'a>>;

/// A tool implementation. Handlers never fail: every problem is reported as an
/// `{"error": ...}` payload so the model can explain it.
pub trait ToolHandler: Send + Sync {
    fn call<'a>(&'a self, arguments: Value, context: &'a ToolContext) -> ToolFuture<'a>;
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool requested: {0}")]
    UnknownTool(String),
    #[error("parameter schema for tool {tool} failed to compile: {message}")]
    InvalidSchema { tool: String, message: String },
}

#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    handler: Arc<dyn ToolHandler>,
    validator: Arc<JSONSchema>,
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<Self, ToolError> {
        let name = name.into();
        let validator =
            JSONSchema::compile(&parameters).map_err(|err| ToolError::InvalidSchema {
                tool: name.clone(),
                message: err.to_string(),
            })?;

        Ok(Self {
            name,
            description: description.into(),
            parameters,
            handler,
            validator: Arc::new(validator),
        })
    }

    pub fn provider_schema(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }

    fn validation_errors(&self, arguments: &Value) -> Vec<String> {
        match self.validator.validate(arguments) {
            Ok(()) => Vec::new(),
            Err(errors) => errors.map(|err| err.to_string()).collect(),
        }
    }
}

/// Catalog of tools the model may call, in registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_tools(services: ToolServices, sql_gate: SqlGate) -> Result<Self, ToolError> {
        let mut registry = Self::new();
        registry.register(prayer::get_prayer_times_tool(&services)?);
        registry.register(events::search_events_tool(&services)?);
        registry.register(events::get_event_details_tool(&services)?);
        registry.register(events::search_volunteer_opportunities_tool(&services)?);
        registry.register(prayer::get_next_prayer_time_tool(&services)?);
        registry.register(events::find_volunteer_contact_tool(&services)?);
        registry.register(sql::execute_sql_query_tool(&services, sql_gate)?);
        registry.register(rsvp::rsvp_to_event_tool(&services)?);
        registry.register(rsvp::rsvp_current_user_tool(&services)?);
        Ok(registry)
    }

    /// Adds the tool, replacing any existing tool with the same name in place.
    pub fn register(&mut self, tool: ToolDefinition) {
        match self.tools.iter_mut().find(|existing| existing.name == tool.name) {
            Some(existing) => *existing = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn as_provider_tool_schemas(&self) -> Vec<Value> {
        self.tools.iter().map(ToolDefinition::provider_schema).collect()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validates `arguments` against the tool's schema and runs its handler.
    /// Only an unknown name is an `Err`; everything else is a payload.
    pub async fn execute(
        &self,
        name: &str,
        arguments: Value,
        context: &ToolContext,
    ) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        let details = tool.validation_errors(&arguments);
        if !details.is_empty() {
            warn!(tool = name, ?details, "tool arguments failed schema validation");
            return Ok(json!({
                "error": format!("Invalid arguments for {name}"),
                "details": details,
            }));
        }

        debug!(tool = name, "executing tool");
        Ok(tool.handler.call(arguments, context).await)
    }
}

/// Per-request state handed to tools: who is asking, what time it is for the
/// organisation, and which events the conversation touched recently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolContext {
    user_email: Option<String>,
    now: NaiveDateTime,
    recent_events: Vec<String>,
}

impl ToolContext {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            user_email: None,
            now,
            recent_events: Vec::new(),
        }
    }

    /// Reads `user_email` from a client-supplied context object.
    pub fn from_request_context(context: Option<&Map<String, Value>>, now: NaiveDateTime) -> Self {
        let user_email = context
            .and_then(|context| context.get("user_email"))
            .and_then(Value::as_str);

        match user_email {
            Some(email) => Self::new(now).with_user_email(email),
            None => Self::new(now),
        }
    }

    pub fn with_user_email(mut self, email: impl Into<String>) -> Self {
        let email = email.into();
        let trimmed = email.trim();
        self.user_email = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn with_recent_events(mut self, recent_events: Vec<String>) -> Self {
        self.recent_events = recent_events;
        self
    }

    pub fn user_email(&self) -> Option<&str> {
        self.user_email.as_deref()
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date()
    }

    pub fn recent_events(&self) -> &[String] {
        &self.recent_events
    }
}

/// Backends shared by every handler.
#[derive(Clone)]
pub struct ToolServices {
    pub store: Store,
    pub prayer_times: Arc<dyn PrayerTimesProvider>,
    pub storage_timeout: Duration,
}

impl ToolServices {
    pub fn new(
        store: Store,
        prayer_times: Arc<dyn PrayerTimesProvider>,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            store,
            prayer_times,
            storage_timeout,
        }
    }

    /// Bounds a storage call by `storage_timeout` and logs failures.
    pub(crate) async fn storage<T, F>(&self, operation: &'static str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let result = bounded(self.storage_timeout, call).await;
        if let Err(err) = &result {
            warn!(operation, error = %err, "tool storage call failed");
        }
        result
    }
}

/// Schema for a tool's argument struct, without the document-level keys the
/// provider does not expect.
pub fn parameters_schema<T: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| json!({}));
    if let Value::Object(entries) = &mut schema {
        entries.remove("$schema");
        entries.remove("title");
        entries
            .entry("type")
            .or_insert_with(|| Value::String("object".to_string()));
        entries
            .entry("properties")
            .or_insert_with(|| Value::Object(Map::new()));
    }
    schema
}

/// Decodes already-validated arguments, reporting a mismatch as an error payload.
pub(crate) fn decode_arguments<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, Value> {
    serde_json::from_value(arguments).map_err(|err| {
        warn!(tool, error = %err, "tool arguments could not be decoded");
        json!({ "error": format!("Invalid arguments for {tool}") })
    })
}

/// Event titles mentioned anywhere in a tool result, deduplicated.
pub fn mentioned_event_titles(result: &Value) -> Vec<String> {
    let mut titles = Vec::new();
    collect_titles(result, &mut titles);
    titles
}

fn collect_titles(value: &Value, titles: &mut Vec<String>) {
    match value {
        Value::Object(entries) => {
            for (key, entry) in entries {
                match (key.as_str(), entry) {
                    ("title" | "event" | "event_title", Value::String(title)) => {
                        if !title.trim().is_empty() && !titles.contains(title) {
                            titles.push(title.clone());
                        }
                    }
                    _ => collect_titles(entry, titles),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_titles(item, titles);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::{ToolContext, mentioned_event_titles};

    fn noon() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 6)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn request_context_reads_user_email() {
        let context = json!({"user_email": "  a@b.org "});
        let tool_context = ToolContext::from_request_context(context.as_object(), noon());

        assert_eq!(tool_context.user_email(), Some("a@b.org"));
        assert_eq!(tool_context.today(), NaiveDate::from_ymd_opt(2026, 3, 6).unwrap());
    }

    #[test]
    fn blank_or_missing_email_is_unauthenticated() {
        let blank = json!({"user_email": "  "});

        assert_eq!(
            ToolContext::from_request_context(blank.as_object(), noon()).user_email(),
            None
        );
        assert_eq!(ToolContext::from_request_context(None, noon()).user_email(), None);
    }

    #[test]
    fn event_titles_are_collected_from_nested_results() {
        let result = json!({
            "events": [
                {"title": "Youth Halaqa", "date": "2026-03-07"},
                {"title": "Community Iftar"}
            ],
            "event_details": {"title": "Youth Halaqa"},
            "event": "Park Cleanup",
            "count": 2
        });

        assert_eq!(
            mentioned_event_titles(&result),
            vec!["Park Cleanup", "Youth Halaqa", "Community Iftar"]
        );
    }

    #[test]
    fn event_title_keys_count_as_mentions() {
        let result = json!({
            "event_title": "Marriage Workshop",
            "rsvp": {"event_title": "Youth Halaqa", "status": "confirmed"}
        });

        assert_eq!(
            mentioned_event_titles(&result),
            vec!["Marriage Workshop", "Youth Halaqa"]
        );
    }
}
