//! System group eligibility for group-based rules
//!
//! Parses `getent group` output (so local files, LDAP, and SSSD all work) and
//! applies the eligibility policy: system/daemon identities and human user
//! groups are never offered as sudo principals. Surviving groups are
//! classified into policy domains for display grouping.

use crate::policy::config::GroupPolicyConfig;
use crate::policy::errors::PolicyResult;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::process::Command;
use std::sync::LazyLock;
use tracing::debug;

static NETWORK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(net|network|vpn|firewall)").unwrap());

static WEB_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(www|web|http|nginx|apache)").unwrap());

/// An eligible group principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupInfo {
    pub name: String,
    pub gid: u32,
}

/// Eligible groups keyed by policy domain (`system`, `network`, `web`),
/// sorted by name within each domain
pub type GroupCatalog = BTreeMap<&'static str, Vec<GroupInfo>>;

/// Query the system group database and return the eligible groups
pub fn group_catalog(policy: &GroupPolicyConfig) -> PolicyResult<GroupCatalog> {
    let output = Command::new("getent").arg("group").output()?;
    let text = String::from_utf8_lossy(&output.stdout);
    Ok(classify_groups(&text, policy))
}

/// Apply the eligibility policy to `getent group` output
pub fn classify_groups(getent_output: &str, policy: &GroupPolicyConfig) -> GroupCatalog {
    let mut catalog: GroupCatalog =
        BTreeMap::from([("system", Vec::new()), ("network", Vec::new()), ("web", Vec::new())]);

    for line in getent_output.lines() {
        // name:passwd:gid:members
        let mut fields = line.splitn(4, ':');
        let (Some(name), Some(_), Some(gid_str)) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let members = fields.next().unwrap_or("");
        let Ok(gid) = gid_str.parse::<u32>() else {
            continue;
        };

        // Human/user groups are not role principals
        if gid >= policy.human_gid_threshold {
            continue;
        }
        if policy.exclude_prefixes.iter().any(|p| name.starts_with(p)) {
            continue;
        }
        if policy.exclude.iter().any(|e| e == name) {
            continue;
        }

        let allowed = policy.always_allow.iter().any(|a| a == name);
        // Memberless groups outside the allow set are implementation
        // details, not roles
        if !allowed && members.trim().is_empty() {
            debug!(group = name, "excluding memberless group");
            continue;
        }

        catalog
            .entry(classify_domain(name))
            .or_default()
            .push(GroupInfo {
                name: name.to_string(),
                gid,
            });
    }

    for groups in catalog.values_mut() {
        groups.sort_by(|a, b| a.name.cmp(&b.name));
    }
    catalog
}

fn classify_domain(name: &str) -> &'static str {
    let lname = name.to_lowercase();
    if NETWORK_RE.is_match(&lname) {
        "network"
    } else if WEB_RE.is_match(&lname) {
        "web"
    } else {
        "system"
    }
}
