//! Agent runtime: agent definitions, the multi-turn tool-iteration run loop
//! over the LLM driver, and the tool executor capability.

pub mod conversation;
pub mod runner;
pub mod runtime;
pub mod tool_registry;
pub mod types;

pub use runner::run_loop;
pub use runtime::Runtime;
pub use tool_registry::{AgentTool, ToolExecutor, ToolRegistry};
pub use types::{AgentDef, AgentEvent, AgentEventKind, EventSink, RunError, RunResult};
