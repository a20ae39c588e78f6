//! Core types for the sudoers policy model
//!
//! The rule/alias data is a small closed set of variants, so everything here
//! is an enum with exhaustive handling at parse and render time rather than
//! stringly-typed checks scattered through the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The subject a sudo rule grants privileges to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Principal {
    User(String),
    Group(String),
}

impl Principal {
    /// Bare name without any sigil
    pub fn name(&self) -> &str {
        match self {
            Self::User(n) | Self::Group(n) => n,
        }
    }

    /// The token as it appears at the start of a sudoers grant line
    /// (`alice` for users, `%devs` for groups)
    pub fn sudoers_token(&self) -> String {
        match self {
            Self::User(n) => n.clone(),
            Self::Group(n) => format!("%{}", n),
        }
    }

    /// File name under the rule directory. User rules are named by the bare
    /// username; group rules carry a `10-group-` prefix so they sort after
    /// the alias and hardening files.
    pub fn file_name(&self) -> String {
        match self {
            Self::User(n) => n.clone(),
            Self::Group(n) => format!("10-group-{}", n),
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(n) => write!(f, "user {}", n),
            Self::Group(n) => write!(f, "group {}", n),
        }
    }
}

/// One entry in a rule's command list: either a literal command path
/// (arguments allowed) or a reference to a catalog alias, expanded so the UI
/// can show provenance without re-querying the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Alias { name: String, commands: Vec<String> },
    Raw(String),
}

impl CommandSpec {
    /// The token written into the sudoers command list
    pub fn token(&self) -> &str {
        match self {
            Self::Alias { name, .. } => name,
            Self::Raw(cmd) => cmd,
        }
    }
}

/// Boolean sudoers tags attached to a grant line. Only tags that differ from
/// sudoers defaults are rendered, in a fixed canonical order, so output is
/// deterministic and diff-stable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFlags {
    #[serde(default)]
    pub nopasswd: bool,
    #[serde(default)]
    pub noexec: bool,
    #[serde(default)]
    pub setenv: bool,
    #[serde(default)]
    pub log_input: bool,
    #[serde(default)]
    pub log_output: bool,
}

impl RuleFlags {
    /// Canonical (tag keyword, enabled) pairs in render order
    pub fn tags(&self) -> [(&'static str, bool); 5] {
        [
            ("NOPASSWD", self.nopasswd),
            ("NOEXEC", self.noexec),
            ("SETENV", self.setenv),
            ("LOG_INPUT", self.log_input),
            ("LOG_OUTPUT", self.log_output),
        ]
    }

    /// Parse the `NOPASSWD,NOEXEC:` prefix of a grant line
    pub fn from_tag_prefix(prefix: &str) -> Self {
        Self {
            nopasswd: prefix.contains("NOPASSWD"),
            noexec: prefix.contains("NOEXEC"),
            setenv: prefix.contains("SETENV"),
            log_input: prefix.contains("LOG_INPUT"),
            log_output: prefix.contains("LOG_OUTPUT"),
        }
    }
}

/// A structured sudo authorization rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RuleWire", into = "RuleWire")]
pub struct SudoRule {
    pub principal: Principal,
    pub runas: String,
    pub allow_all: bool,
    pub commands: Vec<CommandSpec>,
    pub flags: RuleFlags,
}

impl SudoRule {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            runas: "root".to_string(),
            allow_all: false,
            commands: Vec::new(),
            flags: RuleFlags::default(),
        }
    }
}

/// JSON shape exchanged with the UI: exactly one of `user`/`group`, flags
/// flattened onto the object, `all` marking an unrestricted grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RuleWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<String>,
    #[serde(default = "default_runas")]
    runas: String,
    #[serde(default)]
    all: bool,
    #[serde(default)]
    commands: Vec<CommandSpec>,
    #[serde(flatten)]
    flags: RuleFlags,
}

fn default_runas() -> String {
    "root".to_string()
}

impl TryFrom<RuleWire> for SudoRule {
    type Error = String;

    fn try_from(wire: RuleWire) -> Result<Self, Self::Error> {
        let principal = match (wire.user, wire.group) {
            (Some(u), None) => Principal::User(u),
            (None, Some(g)) => Principal::Group(g),
            (Some(_), Some(_)) => {
                return Err("rule must name either a user or a group, not both".to_string())
            }
            (None, None) => return Err("rule must name a user or a group".to_string()),
        };
        Ok(Self {
            principal,
            runas: wire.runas,
            allow_all: wire.all,
            commands: wire.commands,
            flags: wire.flags,
        })
    }
}

impl From<SudoRule> for RuleWire {
    fn from(rule: SudoRule) -> Self {
        let (user, group) = match rule.principal {
            Principal::User(n) => (Some(n), None),
            Principal::Group(n) => (None, Some(n)),
        };
        Self {
            user,
            group,
            runas: rule.runas,
            all: rule.allow_all,
            commands: rule.commands,
            flags: rule.flags,
        }
    }
}

/// The four sudoers alias kinds, in the declaration order sudoers expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AliasType {
    User,
    Runas,
    Host,
    Cmnd,
}

impl AliasType {
    pub const ALL: [AliasType; 4] = [Self::User, Self::Runas, Self::Host, Self::Cmnd];

    /// The sudoers directive keyword
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::User => "User_Alias",
            Self::Runas => "Runas_Alias",
            Self::Host => "Host_Alias",
            Self::Cmnd => "Cmnd_Alias",
        }
    }

    pub fn from_keyword(kw: &str) -> Option<Self> {
        match kw {
            "User_Alias" => Some(Self::User),
            "Runas_Alias" => Some(Self::Runas),
            "Host_Alias" => Some(Self::Host),
            "Cmnd_Alias" => Some(Self::Cmnd),
            _ => None,
        }
    }
}

impl fmt::Display for AliasType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl Serialize for AliasType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.keyword())
    }
}

impl<'de> Deserialize<'de> for AliasType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let kw = String::deserialize(deserializer)?;
        Self::from_keyword(&kw).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid alias type '{}': expected User_Alias, Runas_Alias, Host_Alias or Cmnd_Alias",
                kw
            ))
        })
    }
}

/// A user-declared alias as submitted over the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasDef {
    #[serde(rename = "type")]
    pub alias_type: AliasType,
    pub name: String,
    pub members: Vec<String>,
}

/// A command alias declared by a catalog file, with its source location kept
/// for duplicate diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAlias {
    pub name: String,
    pub commands: Vec<String>,
    pub category: String,
    pub line: usize,
}

/// One catalog category (one file under the catalog directory)
#[derive(Debug, Clone, Default)]
pub struct CatalogEntry {
    pub command_aliases: Vec<CommandAlias>,
    pub runas_aliases: Vec<(String, Vec<String>)>,
    pub raw_commands: Vec<String>,
    /// Policy-only categories are enforced but never offered for selection
    pub selectable: bool,
}

/// The full approved-command catalog. Lexical category order is meaningful:
/// it drives alias precedence in the compiled alias block and display
/// grouping in the UI.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub categories: BTreeMap<String, CatalogEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_wire_user() {
        let rule: SudoRule = serde_json::from_value(json!({
            "user": "alice",
            "runas": "root",
            "all": false,
            "commands": ["/usr/bin/systemctl status"],
            "nopasswd": true
        }))
        .unwrap();

        assert_eq!(rule.principal, Principal::User("alice".to_string()));
        assert_eq!(rule.runas, "root");
        assert!(!rule.allow_all);
        assert!(rule.flags.nopasswd);
        assert!(!rule.flags.noexec);
        assert_eq!(
            rule.commands,
            vec![CommandSpec::Raw("/usr/bin/systemctl status".to_string())]
        );
    }

    #[test]
    fn test_rule_wire_group_round_trip() {
        let rule = SudoRule {
            principal: Principal::Group("devs".to_string()),
            runas: "root".to_string(),
            allow_all: true,
            commands: Vec::new(),
            flags: RuleFlags::default(),
        };

        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(value["group"], "devs");
        assert!(value.get("user").is_none());
        assert_eq!(value["all"], true);

        let back: SudoRule = serde_json::from_value(value).unwrap();
        assert_eq!(back, rule);
    }

    #[test]
    fn test_rule_wire_rejects_ambiguous_principal() {
        let err = serde_json::from_value::<SudoRule>(json!({
            "user": "alice",
            "group": "devs"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("not both"));

        assert!(serde_json::from_value::<SudoRule>(json!({"runas": "root"})).is_err());
    }

    #[test]
    fn test_command_spec_untagged() {
        let specs: Vec<CommandSpec> = serde_json::from_value(json!([
            "/usr/local/bin/deploy.sh",
            {"name": "SYSTEMCTL_STATUS", "commands": ["/usr/bin/systemctl status"]}
        ]))
        .unwrap();

        assert_eq!(specs[0].token(), "/usr/local/bin/deploy.sh");
        assert_eq!(specs[1].token(), "SYSTEMCTL_STATUS");
    }

    #[test]
    fn test_principal_tokens() {
        let user = Principal::User("alice".to_string());
        let group = Principal::Group("devs".to_string());

        assert_eq!(user.sudoers_token(), "alice");
        assert_eq!(user.file_name(), "alice");
        assert_eq!(group.sudoers_token(), "%devs");
        assert_eq!(group.file_name(), "10-group-devs");
    }

    #[test]
    fn test_flag_tag_order() {
        let flags = RuleFlags {
            nopasswd: true,
            log_output: true,
            ..Default::default()
        };
        let enabled: Vec<&str> = flags
            .tags()
            .iter()
            .filter(|(_, on)| *on)
            .map(|(kw, _)| *kw)
            .collect();
        assert_eq!(enabled, vec!["NOPASSWD", "LOG_OUTPUT"]);
    }

    #[test]
    fn test_alias_type_keywords() {
        for ty in AliasType::ALL {
            assert_eq!(AliasType::from_keyword(ty.keyword()), Some(ty));
        }
        assert_eq!(AliasType::from_keyword("Cmd_Alias"), None);
    }

    #[test]
    fn test_alias_def_deserialization() {
        let def: AliasDef = serde_json::from_value(json!({
            "type": "User_Alias",
            "name": "ADMINS",
            "members": ["alice", "bob"]
        }))
        .unwrap();
        assert_eq!(def.alias_type, AliasType::User);
        assert_eq!(def.members.len(), 2);

        assert!(serde_json::from_value::<AliasDef>(json!({
            "type": "Weird_Alias", "name": "X", "members": ["a"]
        }))
        .is_err());
    }
}
