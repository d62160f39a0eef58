//! Canonical session keys.
//!
//! Formats:
//!
//!   agent:{agent_id}:main                                 — default/WebSocket
//!   agent:{agent_id}:{channel}:{peer_kind}:{peer_id}      — DM
//!   agent:{agent_id}:{channel}:group:{guild_id}           — group
//!   agent:{agent_id}:{channel}:group:{guild_id}:{thread}  — thread

/// Build a session key from its components. Deterministic.
pub fn build_key(
    agent_id: &str,
    channel: &str,
    peer_kind: &str,
    peer_id: &str,
    guild_id: &str,
    thread_id: &str,
) -> String {
    if channel.is_empty() || channel == "websocket" {
        return format!("agent:{agent_id}:main");
    }
    if !guild_id.is_empty() {
        let base = format!("agent:{agent_id}:{channel}:group:{guild_id}");
        if !thread_id.is_empty() {
            return format!("{base}:{thread_id}");
        }
        return base;
    }
    format!("agent:{agent_id}:{channel}:{peer_kind}:{peer_id}")
}

/// Decomposed parts of a session key. Empty strings mean "not present".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedKey {
    pub agent_id: String,
    pub channel: String,
    pub peer_kind: String,
    pub peer_id: String,
    pub guild_id: String,
    pub thread_id: String,
}

/// Decompose a session key produced by [`build_key`].
pub fn parse_key(key: &str) -> anyhow::Result<ParsedKey> {
    let parts: Vec<&str> = key.split(':').collect();
    if parts.len() < 3 || parts[0] != "agent" {
        anyhow::bail!("invalid session key: {key}");
    }

    let mut pk = ParsedKey {
        agent_id: parts[1].to_string(),
        ..Default::default()
    };

    if parts[2] == "main" {
        pk.channel = "websocket".into();
        return Ok(pk);
    }

    pk.channel = parts[2].to_string();
    if parts.len() < 5 {
        anyhow::bail!("invalid session key: {key}");
    }
    pk.peer_kind = parts[3].to_string();
    pk.peer_id = parts[4].to_string();

    if pk.peer_kind == "group" {
        pk.guild_id = std::mem::take(&mut pk.peer_id);
        if parts.len() >= 6 {
            pk.thread_id = parts[5].to_string();
        }
    }

    Ok(pk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_expected_keys() {
        let cases = [
            (("default", "websocket", "", "", "", ""), "agent:default:main"),
            (("default", "", "", "", "", ""), "agent:default:main"),
            (
                ("default", "telegram", "user", "12345", "", ""),
                "agent:default:telegram:user:12345",
            ),
            (
                ("default", "telegram", "group", "99", "99", ""),
                "agent:default:telegram:group:99",
            ),
            (
                ("default", "telegram", "group", "99", "99", "42"),
                "agent:default:telegram:group:99:42",
            ),
        ];
        for ((agent, ch, pk, pid, guild, thread), want) in cases {
            assert_eq!(build_key(agent, ch, pk, pid, guild, thread), want);
        }
    }

    #[test]
    fn parses_main_key() {
        let pk = parse_key("agent:default:main").unwrap();
        assert_eq!(pk.agent_id, "default");
        assert_eq!(pk.channel, "websocket");
    }

    #[test]
    fn parses_dm_key() {
        let pk = parse_key("agent:bot1:telegram:user:12345").unwrap();
        assert_eq!(pk.agent_id, "bot1");
        assert_eq!(pk.channel, "telegram");
        assert_eq!(pk.peer_kind, "user");
        assert_eq!(pk.peer_id, "12345");
    }

    #[test]
    fn parses_group_and_thread_keys() {
        let pk = parse_key("agent:bot1:telegram:group:99").unwrap();
        assert_eq!(pk.guild_id, "99");
        assert_eq!(pk.peer_kind, "group");
        assert!(pk.peer_id.is_empty());

        let pk = parse_key("agent:bot1:telegram:group:99:42").unwrap();
        assert_eq!(pk.guild_id, "99");
        assert_eq!(pk.thread_id, "42");
    }

    #[test]
    fn round_trips_built_keys() {
        let key = build_key("bot1", "telegram", "group", "99", "99", "42");
        let pk = parse_key(&key).unwrap();
        assert_eq!(
            build_key(
                &pk.agent_id,
                &pk.channel,
                &pk.peer_kind,
                &pk.peer_id,
                &pk.guild_id,
                &pk.thread_id
            ),
            key
        );
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(parse_key("invalid").is_err());
        assert!(parse_key("bad:key").is_err());
        assert!(parse_key("agent:x:telegram:user").is_err());
    }
}
