use std::path::Path;

use tracing::debug;

use crate::{env_subst::substitute_env, schema::Config};

/// Load config from the given path (TOML, YAML or JSON by extension),
/// apply env substitution, and validate.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("yaml");
    let cfg = parse_config(&raw, ext)?;
    validate(&cfg)?;
    debug!(path = %path.display(), "loaded config");
    Ok(cfg)
}

fn parse_config(raw: &str, ext: &str) -> anyhow::Result<Config> {
    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

/// Startup validation. Any error here is fatal.
pub fn validate(cfg: &Config) -> anyhow::Result<()> {
    if cfg.server.port == 0 {
        anyhow::bail!("config: server.port must be 1-65535");
    }
    if cfg.llm.api_key.is_empty() {
        anyhow::bail!("config: llm.api_key is required");
    }
    if cfg.agents.is_empty() {
        anyhow::bail!("config: at least one agent must be defined");
    }
    if cfg.channels.telegram.enabled && cfg.channels.telegram.bot_token.is_empty() {
        anyhow::bail!("config: channels.telegram.bot_token is required when telegram is enabled");
    }
    Ok(())
}
