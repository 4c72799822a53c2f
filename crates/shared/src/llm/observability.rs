use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::gateway::{
    ChatCompletion, ChatCompletionGateway, ChatCompletionRequest, LlmGatewayError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStage {
    ToolSelection,
    Synthesis,
}

impl CompletionStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToolSelection => "tool_selection",
            Self::Synthesis => "synthesis",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmTelemetryEvent {
    pub stage: &'static str,
    pub outcome: &'static str,
    pub latency_ms: u64,
    pub model: Option<String>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
    pub requested_tool_calls: usize,
    pub error_type: Option<&'static str>,
}

pub async fn complete_with_telemetry(
    gateway: &dyn ChatCompletionGateway,
    stage: CompletionStage,
    request: ChatCompletionRequest,
) -> (Result<ChatCompletion, LlmGatewayError>, LlmTelemetryEvent) {
    let started_at = Instant::now();
    let result = gateway.complete(request).await;
    let telemetry = telemetry_for_result(stage, started_at.elapsed(), &result);
    (result, telemetry)
}

pub fn log_llm_telemetry(session_id: &str, telemetry: &LlmTelemetryEvent) {
    if telemetry.outcome == "success" {
        info!(
            session_id,
            stage = telemetry.stage,
            latency_ms = telemetry.latency_ms,
            model = telemetry.model.as_deref().unwrap_or("unknown"),
            prompt_tokens = telemetry.prompt_tokens,
            completion_tokens = telemetry.completion_tokens,
            total_tokens = telemetry.total_tokens,
            requested_tool_calls = telemetry.requested_tool_calls,
            "llm completion finished"
        );
    } else {
        warn!(
            session_id,
            stage = telemetry.stage,
            latency_ms = telemetry.latency_ms,
            error_type = telemetry.error_type.unwrap_or("unknown"),
            "llm completion failed"
        );
    }
}

fn telemetry_for_result(
    stage: CompletionStage,
    latency: Duration,
    result: &Result<ChatCompletion, LlmGatewayError>,
) -> LlmTelemetryEvent {
    let latency_ms = latency.as_millis().min(u64::MAX as u128) as u64;
    match result {
        Ok(completion) => {
            let usage = completion.usage.as_ref();
            LlmTelemetryEvent {
                stage: stage.as_str(),
                outcome: "success",
                latency_ms,
                model: Some(completion.model.clone()),
                prompt_tokens: usage.map(|usage| usage.prompt_tokens),
                completion_tokens: usage.map(|usage| usage.completion_tokens),
                total_tokens: usage.map(|usage| usage.total_tokens),
                requested_tool_calls: completion.reply.tool_calls.len(),
                error_type: None,
            }
        }
        Err(err) => LlmTelemetryEvent {
            stage: stage.as_str(),
            outcome: "failure",
            latency_ms,
            model: None,
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: None,
            requested_tool_calls: 0,
            error_type: Some(error_type(err)),
        },
    }
}

fn error_type(err: &LlmGatewayError) -> &'static str {
    match err {
        LlmGatewayError::Timeout => "timeout",
        LlmGatewayError::ProviderFailure(_) => "provider_failure",
        LlmGatewayError::InvalidProviderPayload(_) => "invalid_provider_payload",
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{CompletionStage, telemetry_for_result};
    use crate::llm::gateway::{AssistantReply, ChatCompletion, LlmGatewayError, LlmTokenUsage};

    #[test]
    fn telemetry_records_usage_on_success() {
        let result = Ok(ChatCompletion {
            model: "model-a".to_string(),
            provider_request_id: None,
            reply: AssistantReply::default(),
            usage: Some(LlmTokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
        });

        let telemetry =
            telemetry_for_result(CompletionStage::Synthesis, Duration::from_millis(42), &result);

        assert_eq!(telemetry.outcome, "success");
        assert_eq!(telemetry.stage, "synthesis");
        assert_eq!(telemetry.total_tokens, Some(15));
        assert_eq!(telemetry.latency_ms, 42);
    }

    #[test]
    fn telemetry_classifies_timeouts() {
        let result = Err(LlmGatewayError::Timeout);
        let telemetry =
            telemetry_for_result(CompletionStage::ToolSelection, Duration::from_millis(1), &result);

        assert_eq!(telemetry.outcome, "failure");
        assert_eq!(telemetry.error_type, Some("timeout"));
    }
}
