use std::collections::HashMap;

use {anyhow::Result, async_trait::async_trait};

use skein_llm::ToolDef;

/// An agent-callable tool.
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> serde_json::Value;
    async fn execute(&self, input: serde_json::Value) -> Result<serde_json::Value>;
}

/// Runs a tool by name. Injected into the run loop; errors are captured
/// inline as tool-result text, never aborting the run.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, name: &str, input_json: &str) -> Result<String>;
}

/// Name-keyed set of tools, usable directly as a [`ToolExecutor`].
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn AgentTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Box<dyn AgentTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn AgentTool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn schemas(&self) -> Vec<ToolDef> {
        self.tools
            .values()
            .map(|t| ToolDef {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, name: &str, input_json: &str) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("unknown tool: {name}"))?;
        let input: serde_json::Value = if input_json.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(input_json)
                .map_err(|e| anyhow::anyhow!("invalid tool input JSON: {e}"))?
        };
        let output = tool.execute(input).await?;
        Ok(match output {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
    }
}

/// Executor used when none is configured: every invocation fails, and the
/// loop turns the failure into an inline tool-result block.
pub struct NoToolExecutor;

#[async_trait]
impl ToolExecutor for NoToolExecutor {
    async fn execute(&self, name: &str, _input_json: &str) -> Result<String> {
        anyhow::bail!("no tool executor configured for tool: {name}")
    }
}
