use std::{collections::HashMap, sync::Arc};

use {tokio_util::sync::CancellationToken, tracing::{error, info}};

use {skein_llm::Provider, skein_sessions::SessionEntry};

use crate::{
    conversation,
    runner::run_loop,
    tool_registry::{NoToolExecutor, ToolExecutor},
    types::{AgentDef, EventSink, RunError, RunResult},
};

/// Orchestrates agent execution: agent registry, provider, tool executor and
/// event sink. Wire the sink and executor before sharing.
pub struct Runtime {
    provider: Arc<dyn Provider>,
    agents: HashMap<String, AgentDef>,
    max_turns: usize,
    tool_exec: Arc<dyn ToolExecutor>,
    sink: Option<EventSink>,
}

impl Runtime {
    pub fn new(provider: Arc<dyn Provider>, max_turns: usize) -> Self {
        Self {
            provider,
            agents: HashMap::new(),
            max_turns,
            tool_exec: Arc::new(NoToolExecutor),
            sink: None,
        }
    }

    pub fn register_agent(&mut self, def: AgentDef) {
        self.agents.insert(def.id.clone(), def);
    }

    pub fn agent(&self, id: &str) -> Option<&AgentDef> {
        self.agents.get(id)
    }

    pub fn set_tool_executor(&mut self, exec: Arc<dyn ToolExecutor>) {
        self.tool_exec = exec;
    }

    pub fn set_event_sink(&mut self, sink: EventSink) {
        self.sink = Some(sink);
    }

    /// Execute one run for a session and user message.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        agent_id: &str,
        entry: &SessionEntry,
        user_text: &str,
        run_seq: u64,
    ) -> Result<RunResult, RunError> {
        let def = self
            .agents
            .get(agent_id)
            .ok_or_else(|| RunError::UnknownAgent(agent_id.to_string()))?;

        info!(agent = agent_id, session = %entry.key, run_seq, "agent run start");

        let messages = conversation::build_messages(&entry.history(), user_text);

        let result = run_loop(
            cancel,
            self.provider.as_ref(),
            &def.system_prompt,
            messages,
            &def.tools,
            self.tool_exec.as_ref(),
            self.sink.as_ref(),
            &entry.key,
            run_seq,
            self.max_turns,
        )
        .await;

        match result {
            Ok((run, _messages)) => {
                info!(
                    agent = agent_id,
                    session = %entry.key,
                    tool_calls = run.tool_calls,
                    "agent run complete"
                );
                Ok(run)
            },
            Err(e) => {
                error!(agent = agent_id, session = %entry.key, err = %e, "agent run error");
                Err(e)
            },
        }
    }
}
