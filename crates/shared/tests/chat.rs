mod support;

use std::sync::Arc;

use serde_json::{Value, json};
use shared::chat::{ChatError, ChatOrchestrator};
use shared::config::ChatSettings;
use shared::llm::{ChatRole, LlmGatewayError, ToolChoice};
use shared::sessions::{SessionStore, TurnRole};
use shared::tools::ToolContext;
use support::{ScriptedGateway, default_registry, fixed_now, text_reply, tool_call_reply};

async fn orchestrator(gateway: Arc<ScriptedGateway>) -> ChatOrchestrator {
    let (registry, _) = default_registry().await;
    ChatOrchestrator::new(
        ChatSettings::default(),
        SessionStore::new(8),
        registry,
        gateway,
    )
}

fn context() -> ToolContext {
    ToolContext::new(fixed_now("12:00"))
}

#[tokio::test]
async fn tool_call_round_trip_runs_tool_then_synthesises_without_tools() {
    let gateway = Arc::new(ScriptedGateway::new(vec![
        tool_call_reply(&[("call_1", "search_events", "{}")]),
        text_reply("  Park Cleanup is on March 5th.  "),
    ]));
    let chat = orchestrator(gateway.clone()).await;

    let result = chat
        .generate("What events are coming up?", "s1", context())
        .await
        .expect("exchange should succeed");

    assert_eq!(result.message, "Park Cleanup is on March 5th.");
    assert_eq!(result.used_tools, vec!["search_events".to_string()]);

    let requests = gateway.recorded();
    assert_eq!(requests.len(), 2);

    let first = &requests[0];
    assert_eq!(first.tools.len(), 9);
    assert_eq!(first.tool_choice, Some(ToolChoice::Auto));
    assert_eq!(first.messages[0].role, ChatRole::System);
    assert_eq!(
        first.messages.last().and_then(|m| m.content.as_deref()),
        Some("What events are coming up?")
    );

    let second = &requests[1];
    assert!(second.tools.is_empty());
    assert_eq!(second.tool_choice, None);
    let assistant = &second.messages[second.messages.len() - 2];
    assert_eq!(assistant.role, ChatRole::Assistant);
    assert_eq!(assistant.tool_calls[0].name, "search_events");
    let tool_message = second.messages.last().expect("tool result should be sent");
    assert_eq!(tool_message.role, ChatRole::Tool);
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
    let payload: Value = serde_json::from_str(
        tool_message
            .content
            .as_deref()
            .expect("tool result should have content"),
    )
    .expect("tool result should be JSON");
    assert_eq!(payload["count"], 4);

    let session = chat.sessions().get("s1");
    assert_eq!(session.history.len(), 2);
    assert_eq!(session.history[0].role, TurnRole::User);
    assert_eq!(session.history[1].content, "Park Cleanup is on March 5th.");
    assert_eq!(
        session.recent_events,
        vec![
            "Park Cleanup".to_string(),
            "Youth Halaqa".to_string(),
            "Community Iftar".to_string(),
            "Marriage Workshop".to_string(),
        ]
    );
}

#[tokio::test]
async fn plain_answer_makes_a_single_completion() {
    let gateway = Arc::new(ScriptedGateway::new(vec![text_reply("Wa alaikum assalam!")]));
    let chat = orchestrator(gateway.clone()).await;

    let result = chat
        .generate("Assalamu alaikum", "s1", context())
        .await
        .expect("exchange should succeed");

    assert_eq!(result.message, "Wa alaikum assalam!");
    assert!(result.used_tools.is_empty());
    assert_eq!(gateway.recorded().len(), 1);
}

#[tokio::test]
async fn history_is_replayed_on_the_next_exchange() {
    let gateway = Arc::new(ScriptedGateway::new(vec![
        text_reply("First answer"),
        text_reply("Second answer"),
    ]));
    let chat = orchestrator(gateway.clone()).await;

    chat.generate("First question", "s1", context())
        .await
        .expect("first exchange should succeed");
    chat.generate("Second question", "s1", context())
        .await
        .expect("second exchange should succeed");

    let requests = gateway.recorded();
    let contents: Vec<Option<&str>> = requests[1]
        .messages
        .iter()
        .skip(1)
        .map(|message| message.content.as_deref())
        .collect();
    assert_eq!(
        contents,
        vec![
            Some("First question"),
            Some("First answer"),
            Some("Second question")
        ]
    );
}

#[tokio::test]
async fn model_failure_leaves_session_untouched() {
    let gateway = Arc::new(ScriptedGateway::new(vec![
        tool_call_reply(&[("call_1", "search_events", "{}")]),
        Err(LlmGatewayError::ProviderFailure("status=503".to_string())),
    ]));
    let chat = orchestrator(gateway).await;

    let error = chat
        .generate("What events are coming up?", "s1", context())
        .await
        .expect_err("synthesis failure should surface");

    assert!(matches!(error, ChatError::Model(_)));
    assert!(chat.sessions().peek("s1").is_none());
    assert_eq!(chat.sessions().active_sessions(), 0);
}

#[tokio::test]
async fn malformed_and_unknown_tool_calls_still_reach_synthesis() {
    let gateway = Arc::new(ScriptedGateway::new(vec![
        tool_call_reply(&[
            ("call_1", "search_volunteer_opportunities", "{not json"),
            ("call_2", "summon_dragon", "{}"),
        ]),
        text_reply("Two events need volunteers."),
    ]));
    let chat = orchestrator(gateway.clone()).await;

    let result = chat
        .generate("Where can I volunteer?", "s1", context())
        .await
        .expect("exchange should succeed");

    assert_eq!(
        result.used_tools,
        vec![
            "search_volunteer_opportunities".to_string(),
            "summon_dragon".to_string()
        ]
    );

    let requests = gateway.recorded();
    let tool_results: Vec<Value> = requests[1]
        .messages
        .iter()
        .filter(|message| message.role == ChatRole::Tool)
        .filter_map(|message| message.content.as_deref())
        .filter_map(|content| serde_json::from_str(content).ok())
        .collect();
    assert_eq!(tool_results.len(), 2);
    assert_eq!(tool_results[0]["count"], 2);
    assert_eq!(
        tool_results[1],
        json!({ "error": "unknown tool requested: summon_dragon" })
    );
}

#[tokio::test]
async fn sessions_are_isolated() {
    let gateway = Arc::new(ScriptedGateway::new(vec![
        text_reply("answer a"),
        text_reply("answer b"),
    ]));
    let chat = orchestrator(gateway.clone()).await;

    chat.generate("question a", "a", context())
        .await
        .expect("exchange should succeed");
    chat.generate("question b", "b", context())
        .await
        .expect("exchange should succeed");

    let requests = gateway.recorded();
    assert_eq!(requests[1].messages.len(), 2);
    assert_eq!(chat.sessions().get("a").history.len(), 2);
    assert_eq!(chat.sessions().get("b").history.len(), 2);
}
