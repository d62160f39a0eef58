/// DM admission mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmPolicy {
    Open,
    Allowlist,
    Disabled,
}

impl DmPolicy {
    /// Unknown values behave as disabled.
    pub fn parse(s: &str) -> Self {
        match s {
            "open" => Self::Open,
            "allowlist" => Self::Allowlist,
            _ => Self::Disabled,
        }
    }
}

/// Group admission mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPolicy {
    Mention,
    All,
    Disabled,
}

impl GroupPolicy {
    pub fn parse(s: &str) -> Self {
        match s {
            "mention" => Self::Mention,
            "all" => Self::All,
            _ => Self::Disabled,
        }
    }
}

/// Transport-level access policy applied before a message enters the
/// pipeline.
#[derive(Debug, Clone)]
pub struct SendPolicy {
    pub dm: DmPolicy,
    pub group: GroupPolicy,
    pub allowed_users: Vec<i64>,
    pub allowed_groups: Vec<i64>,
}

impl SendPolicy {
    /// Whether a DM from `user_id` is permitted.
    pub fn allow_dm(&self, user_id: i64) -> bool {
        match self.dm {
            DmPolicy::Open => true,
            DmPolicy::Allowlist => self.allowed_users.contains(&user_id),
            DmPolicy::Disabled => false,
        }
    }

    /// Whether a group message from `group_id` is permitted. An empty
    /// allowlist admits every group.
    pub fn allow_group(&self, group_id: i64) -> bool {
        match self.group {
            GroupPolicy::Disabled => false,
            GroupPolicy::All | GroupPolicy::Mention => {
                self.allowed_groups.is_empty() || self.allowed_groups.contains(&group_id)
            },
        }
    }

    /// Whether the group policy additionally requires a bot mention.
    pub fn requires_mention(&self) -> bool {
        self.group == GroupPolicy::Mention
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(dm: DmPolicy, group: GroupPolicy) -> SendPolicy {
        SendPolicy {
            dm,
            group,
            allowed_users: vec![42, 99],
            allowed_groups: vec![100],
        }
    }

    #[test]
    fn dm_allowlist() {
        let p = policy(DmPolicy::Allowlist, GroupPolicy::All);
        assert!(p.allow_dm(42));
        assert!(p.allow_dm(99));
        assert!(!p.allow_dm(7));
    }

    #[test]
    fn dm_open_and_disabled() {
        assert!(policy(DmPolicy::Open, GroupPolicy::All).allow_dm(7));
        assert!(!policy(DmPolicy::Disabled, GroupPolicy::All).allow_dm(42));
    }

    #[test]
    fn group_allowlist() {
        let p = policy(DmPolicy::Open, GroupPolicy::All);
        assert!(p.allow_group(100));
        assert!(!p.allow_group(200));
    }

    #[test]
    fn group_empty_allowlist_admits_all() {
        let p = SendPolicy {
            dm: DmPolicy::Open,
            group: GroupPolicy::Mention,
            allowed_users: vec![],
            allowed_groups: vec![],
        };
        assert!(p.allow_group(12345));
        assert!(p.requires_mention());
    }

    #[test]
    fn group_disabled() {
        assert!(!policy(DmPolicy::Open, GroupPolicy::Disabled).allow_group(100));
    }

    #[test]
    fn unknown_policy_strings_are_disabled() {
        assert_eq!(DmPolicy::parse("whatever"), DmPolicy::Disabled);
        assert_eq!(GroupPolicy::parse(""), GroupPolicy::Disabled);
    }
}
