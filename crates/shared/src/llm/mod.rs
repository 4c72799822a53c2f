pub mod gateway;
pub mod groq;
pub mod observability;
pub mod prompts;

pub use gateway::{
    AssistantReply, ChatCompletion, ChatCompletionFuture, ChatCompletionGateway,
    ChatCompletionRequest, ChatMessage, ChatRole, LlmGatewayError, LlmTokenUsage,
    ToolCallRequest, ToolChoice,
};
pub use groq::{GroqConfigError, GroqGateway, GroqGatewayConfig};
pub use observability::{
    CompletionStage, LlmTelemetryEvent, complete_with_telemetry, log_llm_telemetry,
};
pub use prompts::system_prompt;
