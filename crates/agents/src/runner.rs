use {
    serde_json::json,
    tokio_stream::StreamExt,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use skein_llm::{ContentBlock, Message, Provider, StreamEvent, ToolDef};

use crate::{
    tool_registry::ToolExecutor,
    types::{AgentEvent, AgentEventKind, EventSink, RunError, RunResult},
};

/// A tool call collected from the stream, input still in raw JSON form.
struct ToolCall {
    id: String,
    name: String,
    input_json: String,
}

/// Execute the agentic loop: stream one LLM turn, run any requested tools,
/// feed the results back, repeat until the model stops calling tools.
///
/// Every stream event reaches the sink before any tool call derived from it
/// runs. Cancellation is observed at the top of each turn.
#[allow(clippy::too_many_arguments)]
pub async fn run_loop(
    cancel: &CancellationToken,
    provider: &dyn Provider,
    system_prompt: &str,
    mut messages: Vec<Message>,
    tools: &[ToolDef],
    tool_exec: &dyn ToolExecutor,
    sink: Option<&EventSink>,
    session_id: &str,
    run_seq: u64,
    max_turns: usize,
) -> Result<(RunResult, Vec<Message>), RunError> {
    let mut total_tool_calls = 0;

    for turn in 0..max_turns {
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }

        debug!(turn, messages = messages.len(), "starting llm stream");
        let mut stream = provider.stream(system_prompt, &messages, tools);

        let mut text_buf = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut stop_reason = String::new();

        while let Some(evt) = stream.next().await {
            if let Some(sink) = sink {
                sink(map_stream_event(&evt, session_id, run_seq));
            }
            match evt {
                StreamEvent::Delta { text } => text_buf.push_str(&text),
                StreamEvent::ToolUse { .. } => {},
                StreamEvent::ToolDone {
                    tool_use_id,
                    tool_name,
                    tool_input,
                } => tool_calls.push(ToolCall {
                    id: tool_use_id,
                    name: tool_name,
                    input_json: tool_input,
                }),
                StreamEvent::Complete { stop_reason: sr } => stop_reason = sr,
                StreamEvent::Error { message } => return Err(RunError::Stream(message)),
            }
        }

        let mut blocks = Vec::new();
        if !text_buf.is_empty() {
            blocks.push(ContentBlock::text(&text_buf));
        }
        for tc in &tool_calls {
            blocks.push(ContentBlock::ToolUse {
                id: tc.id.clone(),
                name: tc.name.clone(),
                input: serde_json::from_str(&tc.input_json).unwrap_or_else(|_| json!({})),
            });
        }
        messages.push(Message::assistant(blocks));

        if tool_calls.is_empty() {
            return Ok((
                RunResult {
                    text: text_buf,
                    tool_calls: total_tool_calls,
                    stop_reason,
                },
                messages,
            ));
        }

        total_tool_calls += tool_calls.len();
        let mut results = Vec::new();
        for tc in &tool_calls {
            info!(tool = %tc.name, id = %tc.id, "executing tool");
            let output = match tool_exec.execute(&tc.name, &tc.input_json).await {
                Ok(out) => out,
                Err(e) => {
                    warn!(tool = %tc.name, err = %e, "tool execution failed");
                    format!("Error: {e}")
                },
            };
            results.push(ContentBlock::ToolResult {
                tool_use_id: tc.id.clone(),
                content: output,
            });
        }
        messages.push(Message::user(results));
    }

    Err(RunError::MaxTurns(max_turns))
}

/// Tag an LLM stream event with its run.
fn map_stream_event(evt: &StreamEvent, session_id: &str, run_seq: u64) -> AgentEvent {
    let kind = match evt {
        StreamEvent::Delta { text } => AgentEventKind::Delta { text: text.clone() },
        StreamEvent::ToolUse {
            tool_use_id,
            tool_name,
        } => AgentEventKind::ToolUse {
            tool_use_id: tool_use_id.clone(),
            tool_name: tool_name.clone(),
        },
        StreamEvent::ToolDone {
            tool_use_id,
            tool_name,
            ..
        } => AgentEventKind::ToolDone {
            tool_use_id: tool_use_id.clone(),
            tool_name: tool_name.clone(),
        },
        StreamEvent::Complete { stop_reason } => AgentEventKind::Complete {
            stop_reason: stop_reason.clone(),
        },
        StreamEvent::Error { message } => AgentEventKind::Error {
            message: message.clone(),
        },
    };
    AgentEvent {
        session_id: session_id.to_string(),
        run_seq,
        kind,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    use {async_trait::async_trait, skein_llm::EventStream};

    use super::*;
    use crate::tool_registry::{AgentTool, NoToolExecutor, ToolRegistry};

    /// Provider that replays one scripted event list per stream call.
    struct ScriptedProvider {
        scripts: Mutex<VecDeque<Vec<StreamEvent>>>,
    }

    impl ScriptedProvider {
        fn new(scripts: Vec<Vec<StreamEvent>>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
            }
        }
    }

    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-model"
        }

        fn stream(&self, _system: &str, _messages: &[Message], _tools: &[ToolDef]) -> EventStream {
            let events = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
            Box::pin(tokio_stream::iter(events))
        }
    }

    struct EchoTool;

    #[async_trait]
    impl AgentTool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes input"
        }

        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }

        async fn execute(&self, input: serde_json::Value) -> anyhow::Result<serde_json::Value> {
            Ok(input["text"].clone())
        }
    }

    fn delta(text: &str) -> StreamEvent {
        StreamEvent::Delta { text: text.into() }
    }

    fn complete(reason: &str) -> StreamEvent {
        StreamEvent::Complete {
            stop_reason: reason.into(),
        }
    }

    fn tool_turn() -> Vec<StreamEvent> {
        vec![
            StreamEvent::ToolUse {
                tool_use_id: "tu_1".into(),
                tool_name: "echo".into(),
            },
            StreamEvent::ToolDone {
                tool_use_id: "tu_1".into(),
                tool_name: "echo".into(),
                tool_input: r#"{"text":"hi"}"#.into(),
            },
            complete("tool_use"),
        ]
    }

    #[tokio::test]
    async fn plain_text_response() {
        let provider = ScriptedProvider::new(vec![vec![
            delta("Hel"),
            delta("lo!"),
            complete("end_turn"),
        ]]);
        let (result, messages) = run_loop(
            &CancellationToken::new(),
            &provider,
            "system",
            vec![Message::user(vec![ContentBlock::text("hi")])],
            &[],
            &NoToolExecutor,
            None,
            "s",
            1,
            25,
        )
        .await
        .unwrap();

        assert_eq!(result.text, "Hello!");
        assert_eq!(result.tool_calls, 0);
        assert_eq!(result.stop_reason, "end_turn");
        // The extended conversation ends with the assistant's text turn.
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, skein_llm::Role::Assistant);
    }

    #[tokio::test]
    async fn tool_iteration_feeds_results_back() {
        let provider =
            ScriptedProvider::new(vec![tool_turn(), vec![delta("Done!"), complete("end_turn")]]);
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let (result, messages) = run_loop(
            &CancellationToken::new(),
            &provider,
            "system",
            vec![Message::user(vec![ContentBlock::text("use the tool")])],
            &registry.schemas(),
            &registry,
            None,
            "s",
            1,
            25,
        )
        .await
        .unwrap();

        assert_eq!(result.text, "Done!");
        assert_eq!(result.tool_calls, 1);

        // user, assistant(tool_use), user(tool_result), assistant(text)
        assert_eq!(messages.len(), 4);
        match &messages[1].content[0] {
            ContentBlock::ToolUse { id, name, input } => {
                assert_eq!(id, "tu_1");
                assert_eq!(name, "echo");
                assert_eq!(input["text"], "hi");
            },
            other => panic!("expected tool_use block, got {other:?}"),
        }
        match &messages[2].content[0] {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
            } => {
                assert_eq!(tool_use_id, "tu_1");
                assert_eq!(content, "hi");
            },
            other => panic!("expected tool_result block, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_executor_yields_inline_error_result() {
        let provider =
            ScriptedProvider::new(vec![tool_turn(), vec![delta("ok"), complete("end_turn")]]);

        let (_result, messages) = run_loop(
            &CancellationToken::new(),
            &provider,
            "system",
            vec![Message::user(vec![ContentBlock::text("go")])],
            &[],
            &NoToolExecutor,
            None,
            "s",
            1,
            25,
        )
        .await
        .unwrap();

        match &messages[2].content[0] {
            ContentBlock::ToolResult { content, .. } => {
                assert!(
                    content.starts_with("Error: no tool executor configured"),
                    "got: {content}"
                );
            },
            other => panic!("expected tool_result block, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn max_turns_exceeded() {
        let provider = ScriptedProvider::new(vec![tool_turn(), tool_turn(), tool_turn()]);
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let err = run_loop(
            &CancellationToken::new(),
            &provider,
            "system",
            vec![Message::user(vec![ContentBlock::text("loop")])],
            &[],
            &registry,
            None,
            "s",
            1,
            2,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RunError::MaxTurns(2)));
    }

    #[tokio::test]
    async fn cancellation_is_observed_before_the_turn() {
        let provider = ScriptedProvider::new(vec![vec![delta("never"), complete("end_turn")]]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = run_loop(
            &cancel,
            &provider,
            "system",
            vec![],
            &[],
            &NoToolExecutor,
            None,
            "s",
            1,
            25,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RunError::Cancelled));
    }

    #[tokio::test]
    async fn stream_error_fails_the_run() {
        let provider = ScriptedProvider::new(vec![vec![
            delta("partial"),
            StreamEvent::Error {
                message: "overloaded".into(),
            },
        ]]);

        let err = run_loop(
            &CancellationToken::new(),
            &provider,
            "system",
            vec![],
            &[],
            &NoToolExecutor,
            None,
            "s",
            1,
            25,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RunError::Stream(msg) if msg == "overloaded"));
    }

    #[tokio::test]
    async fn sink_sees_stream_events_in_order() {
        let provider =
            ScriptedProvider::new(vec![tool_turn(), vec![delta("done"), complete("end_turn")]]);
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let seen: Arc<Mutex<Vec<AgentEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let sink: EventSink = Arc::new(move |evt| seen2.lock().unwrap().push(evt));

        run_loop(
            &CancellationToken::new(),
            &provider,
            "system",
            vec![Message::user(vec![ContentBlock::text("go")])],
            &[],
            &registry,
            Some(&sink),
            "sess",
            7,
            25,
        )
        .await
        .unwrap();

        let events = seen.lock().unwrap();
        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e.kind {
                AgentEventKind::Delta { .. } => "delta",
                AgentEventKind::ToolUse { .. } => "tool_use",
                AgentEventKind::ToolDone { .. } => "tool_done",
                AgentEventKind::Complete { .. } => "complete",
                AgentEventKind::Error { .. } => "error",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["tool_use", "tool_done", "complete", "delta", "complete"]
        );
        assert!(events.iter().all(|e| e.session_id == "sess" && e.run_seq == 7));
    }
}
