use std::sync::Arc;

use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ChatSettings;
use crate::llm::{
    ChatCompletion, ChatCompletionGateway, ChatCompletionRequest, ChatMessage, CompletionStage,
    LlmGatewayError, ToolChoice, complete_with_telemetry, log_llm_telemetry, system_prompt,
};
use crate::sessions::{SessionStore, SessionTurn, TurnRole};
use crate::tools::{ToolContext, ToolRegistry, mentioned_event_titles};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResult {
    pub message: String,
    pub used_tools: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("model request exceeded the configured timeout")]
    ModelTimeout,
    #[error(transparent)]
    Model(#[from] LlmGatewayError),
}

/// Runs one user exchange: a tool-selection completion, the requested tool
/// calls, and a synthesis completion over their results.
#[derive(Clone)]
pub struct ChatOrchestrator {
    settings: ChatSettings,
    sessions: SessionStore,
    tools: ToolRegistry,
    gateway: Arc<dyn ChatCompletionGateway>,
}

impl ChatOrchestrator {
    pub fn new(
        settings: ChatSettings,
        sessions: SessionStore,
        tools: ToolRegistry,
        gateway: Arc<dyn ChatCompletionGateway>,
    ) -> Self {
        Self {
            settings,
            sessions,
            tools,
            gateway,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn model_name(&self) -> &str {
        self.gateway.model_name()
    }

    /// Produces the assistant reply for `message`. Session history is only
    /// updated when the whole exchange succeeds.
    pub async fn generate(
        &self,
        message: &str,
        session_id: &str,
        context: ToolContext,
    ) -> Result<ChatResult, ChatError> {
        let _exchange = self.sessions.lock_session(session_id).await;
        let session = self.sessions.peek(session_id).unwrap_or_default();
        let context = context.with_recent_events(session.recent_events.clone());

        let mut messages = Vec::with_capacity(session.history.len() + 2);
        messages.push(ChatMessage::system(system_prompt(
            context.now(),
            self.settings.system_prompt.as_deref(),
        )));
        messages.extend(session.history.iter().map(turn_to_message));
        messages.push(ChatMessage::user(message));

        let first = self
            .complete(
                session_id,
                CompletionStage::ToolSelection,
                ChatCompletionRequest {
                    messages: messages.clone(),
                    tools: self.tools.as_provider_tool_schemas(),
                    tool_choice: Some(ToolChoice::Auto),
                    temperature: self.settings.temperature,
                    max_tokens: self.settings.max_output_tokens,
                },
            )
            .await?;

        let mut used_tools = Vec::new();
        let mut mentioned_events: Vec<String> = Vec::new();

        let reply = if first.reply.tool_calls.is_empty() {
            first.reply.content.unwrap_or_default()
        } else {
            let tool_calls = first.reply.tool_calls;
            messages.push(ChatMessage::assistant_tool_calls(
                first.reply.content,
                tool_calls.clone(),
            ));

            for call in &tool_calls {
                used_tools.push(call.name.clone());
                let arguments = parse_tool_arguments(&call.name, &call.arguments);
                let result = match self.tools.execute(&call.name, arguments, &context).await {
                    Ok(result) => result,
                    Err(err) => {
                        warn!(session_id, tool = %call.name, error = %err, "tool call failed");
                        json!({ "error": err.to_string() })
                    }
                };

                for title in mentioned_event_titles(&result) {
                    if !mentioned_events.contains(&title) {
                        mentioned_events.push(title);
                    }
                }
                messages.push(ChatMessage::tool_result(call.id.clone(), result.to_string()));
            }

            let synthesis = self
                .complete(
                    session_id,
                    CompletionStage::Synthesis,
                    ChatCompletionRequest {
                        messages,
                        tools: Vec::new(),
                        tool_choice: None,
                        temperature: self.settings.temperature,
                        max_tokens: self.settings.max_output_tokens,
                    },
                )
                .await?;
            synthesis.reply.content.unwrap_or_default()
        };

        let reply = reply.trim().to_string();
        self.sessions
            .record_exchange(session_id, message, &reply, &mentioned_events);
        info!(session_id, tools_used = ?used_tools, "chat exchange completed");

        Ok(ChatResult {
            message: reply,
            used_tools,
        })
    }

    async fn complete(
        &self,
        session_id: &str,
        stage: CompletionStage,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletion, ChatError> {
        let outcome = tokio::time::timeout(
            self.settings.model_timeout(),
            complete_with_telemetry(self.gateway.as_ref(), stage, request),
        )
        .await;

        match outcome {
            Ok((result, telemetry)) => {
                log_llm_telemetry(session_id, &telemetry);
                result.map_err(ChatError::from)
            }
            Err(_) => {
                warn!(
                    session_id,
                    stage = stage.as_str(),
                    timeout_ms = self.settings.model_timeout_ms,
                    "llm completion timed out"
                );
                Err(ChatError::ModelTimeout)
            }
        }
    }
}

fn turn_to_message(turn: &SessionTurn) -> ChatMessage {
    match turn.role {
        TurnRole::User => ChatMessage::user(turn.content.clone()),
        TurnRole::Assistant => ChatMessage::assistant(turn.content.clone()),
    }
}

/// Tool arguments as a JSON object. Anything malformed degrades to `{}`.
fn parse_tool_arguments(tool: &str, raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Map::new());
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(arguments)) => Value::Object(arguments),
        Ok(_) | Err(_) => {
            warn!(tool, "tool arguments were not a JSON object; using empty arguments");
            Value::Object(Map::new())
        }
    }
}
