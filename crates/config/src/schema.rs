use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    pub agents: Vec<AgentConfig>,
    pub channels: ChannelsConfig,
    pub session: SessionConfig,
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 18789,
            host: "127.0.0.1".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Connection token. Empty means all connections are allowed.
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub api_key: String,
    pub model: String,
    pub max_turns: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".into(),
            api_key: String::new(),
            model: "claude-sonnet-4-5-20250929".into(),
            max_turns: 25,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    pub system_prompt: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_token: String,
    pub default_agent: String,
    /// "open", "allowlist" or "disabled".
    pub dm_policy: String,
    /// "mention", "all" or "disabled".
    pub group_policy: String,
    pub allowed_users: Vec<i64>,
    pub allowed_groups: Vec<i64>,
    pub bindings: Vec<BindingRule>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            default_agent: String::new(),
            dm_policy: "open".into(),
            group_policy: "mention".into(),
            allowed_users: Vec::new(),
            allowed_groups: Vec::new(),
            bindings: Vec::new(),
        }
    }
}

/// A routing rule scoped to the Telegram channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingRule {
    /// "user" or "group"; empty matches any kind.
    pub peer_kind: String,
    pub peer_id: String,
    pub agent_id: String,
}

/// Session lifecycle settings. Durations are integer seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl: u64,
    pub cleanup_interval: u64,
    pub max_history: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: 30 * 60,
            cleanup_interval: 5 * 60,
            max_history: 100,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval)
    }
}

/// Lane scheduler settings. Durations are integer seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub buffer_size: usize,
    pub idle_timeout: u64,
    pub cleanup_interval: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64,
            idle_timeout: 10 * 60,
            cleanup_interval: 2 * 60,
        }
    }
}

impl QueueConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval)
    }
}
