use std::sync::Arc;

use skein_llm::ToolDef;

/// Static definition of an agent.
#[derive(Debug, Clone)]
pub struct AgentDef {
    pub id: String,
    pub name: String,
    pub system_prompt: String,
    pub model: String,
    pub tools: Vec<ToolDef>,
}

/// Final outcome of an agent run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub text: String,
    pub tool_calls: usize,
    pub stop_reason: String,
}

/// Typed error returned by the run loop.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("run cancelled")]
    Cancelled,
    #[error("llm stream error: {0}")]
    Stream(String),
    #[error("max turns ({0}) exceeded")]
    MaxTurns(usize),
    #[error("agent not found: {0}")]
    UnknownAgent(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A runtime event emitted while a run streams, tagged with the run it
/// belongs to.
#[derive(Debug, Clone)]
pub struct AgentEvent {
    pub session_id: String,
    pub run_seq: u64,
    pub kind: AgentEventKind,
}

#[derive(Debug, Clone)]
pub enum AgentEventKind {
    Delta {
        text: String,
    },
    ToolUse {
        tool_use_id: String,
        tool_name: String,
    },
    ToolDone {
        tool_use_id: String,
        tool_name: String,
    },
    Complete {
        stop_reason: String,
    },
    /// Terminal stream failure. Surfaced through the run result as well;
    /// sinks normally ignore it.
    Error {
        message: String,
    },
}

/// Receives agent events for broadcasting. Must not block.
pub type EventSink = Arc<dyn Fn(AgentEvent) + Send + Sync>;
