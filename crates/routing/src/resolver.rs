/// A rule mapping channel context to an agent. Empty fields match anything.
#[derive(Debug, Clone, Default)]
pub struct Binding {
    pub channel: String,
    /// "user", "group" or empty.
    pub peer_kind: String,
    pub peer_id: String,
    pub guild_id: String,
    pub team_id: String,
    pub agent_id: String,
}

/// Inputs to route resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolveParams {
    pub channel: String,
    pub peer_kind: String,
    pub peer_id: String,
    pub guild_id: String,
    pub team_id: String,
}

/// Immutable set of configured bindings plus the fallback agent.
pub struct BindingStore {
    bindings: Vec<Binding>,
    default_agent: String,
}

impl BindingStore {
    pub fn new(bindings: Vec<Binding>, default_agent: impl Into<String>) -> Self {
        Self {
            bindings,
            default_agent: default_agent.into(),
        }
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn default_agent(&self) -> &str {
        &self.default_agent
    }
}

/// Determines which agent handles a given message context.
pub struct Resolver {
    store: BindingStore,
}

impl Resolver {
    pub fn new(store: BindingStore) -> Self {
        Self { store }
    }

    /// Walk the priority chain and return the best matching agent id.
    ///
    /// Priority (lowest number wins; within a level the last matching
    /// binding wins):
    ///  1. Exact peer (channel + peer_kind + peer_id)
    ///  2. Parent peer (channel + peer_kind, no peer_id)
    ///  3. Guild (channel + guild_id, no peer_kind)
    ///  4. Team (team_id, no channel)
    ///  5. Channel wildcard (channel only)
    ///  6. Account/global (all fields empty)
    ///  7. Default agent
    pub fn resolve(&self, p: &ResolveParams) -> String {
        let mut peer_match = "";
        let mut parent_peer = "";
        let mut guild_match = "";
        let mut team_match = "";
        let mut channel_wild = "";
        let mut account_match = "";

        for b in self.store.bindings() {
            if b.channel == p.channel
                && b.peer_kind == p.peer_kind
                && b.peer_id == p.peer_id
                && !b.peer_id.is_empty()
            {
                peer_match = &b.agent_id;
            }
            if b.channel == p.channel
                && b.peer_kind == p.peer_kind
                && b.peer_id.is_empty()
                && b.guild_id.is_empty()
            {
                parent_peer = &b.agent_id;
            }
            if b.channel == p.channel
                && b.guild_id == p.guild_id
                && !p.guild_id.is_empty()
                && b.peer_kind.is_empty()
            {
                guild_match = &b.agent_id;
            }
            if b.team_id == p.team_id && !p.team_id.is_empty() && b.channel.is_empty() {
                team_match = &b.agent_id;
            }
            if b.channel == p.channel
                && b.peer_kind.is_empty()
                && b.peer_id.is_empty()
                && b.guild_id.is_empty()
                && b.team_id.is_empty()
            {
                channel_wild = &b.agent_id;
            }
            if b.channel.is_empty()
                && b.peer_kind.is_empty()
                && b.peer_id.is_empty()
                && b.guild_id.is_empty()
                && b.team_id.is_empty()
                && !b.agent_id.is_empty()
            {
                account_match = &b.agent_id;
            }
        }

        for candidate in [
            peer_match,
            parent_peer,
            guild_match,
            team_match,
            channel_wild,
            account_match,
        ] {
            if !candidate.is_empty() {
                return candidate.to_string();
            }
        }
        self.store.default_agent().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(channel: &str, peer_kind: &str, peer_id: &str, agent_id: &str) -> Binding {
        Binding {
            channel: channel.into(),
            peer_kind: peer_kind.into(),
            peer_id: peer_id.into(),
            agent_id: agent_id.into(),
            ..Default::default()
        }
    }

    fn test_resolver() -> Resolver {
        let bindings = vec![
            binding("telegram", "user", "42", "personal"),
            binding("telegram", "user", "", "dm-default"),
            Binding {
                channel: "telegram".into(),
                guild_id: "100".into(),
                agent_id: "group-bot".into(),
                ..Default::default()
            },
            binding("telegram", "", "", "tg-wildcard"),
            binding("", "", "", "global"),
        ];
        Resolver::new(BindingStore::new(bindings, "fallback"))
    }

    fn params(channel: &str, peer_kind: &str, peer_id: &str, guild_id: &str) -> ResolveParams {
        ResolveParams {
            channel: channel.into(),
            peer_kind: peer_kind.into(),
            peer_id: peer_id.into(),
            guild_id: guild_id.into(),
            ..Default::default()
        }
    }

    #[test]
    fn priority_chain() {
        let r = test_resolver();
        assert_eq!(r.resolve(&params("telegram", "user", "42", "")), "personal");
        assert_eq!(
            r.resolve(&params("telegram", "user", "99", "")),
            "dm-default"
        );
        assert_eq!(
            r.resolve(&params("telegram", "group", "100", "100")),
            "group-bot"
        );
        assert_eq!(
            r.resolve(&params("telegram", "group", "200", "200")),
            "tg-wildcard"
        );
        assert_eq!(r.resolve(&params("slack", "user", "1", "")), "global");
        assert_eq!(r.resolve(&params("discord", "", "", "")), "global");
    }

    #[test]
    fn team_binding() {
        let bindings = vec![Binding {
            team_id: "t1".into(),
            agent_id: "team-bot".into(),
            ..Default::default()
        }];
        let r = Resolver::new(BindingStore::new(bindings, "fallback"));
        let p = ResolveParams {
            channel: "slack".into(),
            team_id: "t1".into(),
            ..Default::default()
        };
        assert_eq!(r.resolve(&p), "team-bot");
    }

    #[test]
    fn default_fallback() {
        let r = Resolver::new(BindingStore::new(
            vec![binding("telegram", "", "", "tg-only")],
            "fallback",
        ));
        assert_eq!(r.resolve(&params("slack", "", "", "")), "fallback");
    }

    #[test]
    fn last_binding_wins_within_level() {
        let bindings = vec![
            binding("telegram", "user", "42", "first"),
            binding("telegram", "user", "42", "second"),
        ];
        let r = Resolver::new(BindingStore::new(bindings, "fallback"));
        assert_eq!(r.resolve(&params("telegram", "user", "42", "")), "second");
    }
}
