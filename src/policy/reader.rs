//! Rule reader
//!
//! Parses managed rule files back into structured rules. The reader is
//! deliberately scoped to the constrained subset this system generates:
//! anything without the managed header is foreign and skipped, and a managed
//! file that fails to parse degrades to a warning instead of aborting the
//! listing.

use crate::policy::errors::PolicyResult;
use crate::policy::paths::{self, SudoPaths, LOCK_FILE_NAME, MANAGED_HEADER};
use crate::policy::types::{Catalog, CommandSpec, Principal, RuleFlags, SudoRule};
use crate::policy::validate;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

static RULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<principal>\S+)\s+ALL=\((?P<runas>[^)]+)\)\s+(?P<tags>(?:[A-Z_,]+:)?)\s*(?P<cmds>.+)$")
        .unwrap()
});

/// Result of scanning the rule directory
#[derive(Debug, Default, Serialize)]
pub struct RuleListing {
    pub rules: Vec<SudoRule>,
    pub warnings: Vec<ListWarning>,
}

/// A managed file that could not be parsed
#[derive(Debug, Serialize)]
pub struct ListWarning {
    pub file: String,
    pub message: String,
}

/// Scan the rule directory and return every managed rule, alias references
/// expanded against the catalog so callers can render provenance without a
/// second query.
pub fn list_rules(paths: &SudoPaths, catalog: &Catalog) -> PolicyResult<RuleListing> {
    let mut listing = RuleListing::default();

    if !paths.sudoers_dir.is_dir() {
        warn!(dir = %paths.sudoers_dir.display(), "rule directory missing");
        return Ok(listing);
    }

    let lookup = catalog.alias_lookup();

    let mut files: Vec<_> = std::fs::read_dir(&paths.sudoers_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    for file in files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        // Infrastructure, lock, and scratch files are not rules
        if paths::is_infrastructure(&name) || name == LOCK_FILE_NAME || name.ends_with(".tmp") {
            continue;
        }

        let text = match std::fs::read_to_string(&file) {
            Ok(t) => t,
            Err(e) => {
                listing.warnings.push(ListWarning {
                    file: name,
                    message: e.to_string(),
                });
                continue;
            }
        };

        // Only parse what we generated; hand-written sudoers is out of scope
        if text.lines().next().map(str::trim) != Some(MANAGED_HEADER) {
            debug!(file = %name, "skipping foreign sudoers file");
            continue;
        }

        match parse_rule_text(&text, &lookup) {
            Some(rule) => listing.rules.push(rule),
            None => listing.warnings.push(ListWarning {
                file: name,
                message: "no parseable grant line".to_string(),
            }),
        }
    }

    Ok(listing)
}

/// Parse managed rule-file text into a rule. Guardrail `!ALL` lines and
/// `Defaults` lines are infrastructure and excluded; the last grant line in
/// the file is the effective one.
pub fn parse_rule_text(text: &str, aliases: &HashMap<&str, &[String]>) -> Option<SudoRule> {
    let mut effective: Option<regex::Captures> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("Defaults") {
            continue;
        }
        if let Some(caps) = RULE_RE.captures(line) {
            // Skip guardrail / neutralization lines
            if caps["cmds"].trim() == "!ALL" {
                continue;
            }
            effective = Some(caps);
        }
    }

    let caps = effective?;

    let principal_token = &caps["principal"];
    let principal = match principal_token.strip_prefix('%') {
        Some(group) => Principal::Group(group.to_string()),
        None => Principal::User(principal_token.to_string()),
    };

    let runas = match &caps["runas"] {
        "ALL" => "root".to_string(),
        other => other.to_string(),
    };

    let flags = RuleFlags::from_tag_prefix(&caps["tags"]);

    let cmds = caps["cmds"].trim();
    let (allow_all, commands) = if cmds == "ALL" {
        (true, Vec::new())
    } else {
        let specs = cmds
            .split(',')
            .map(|c| validate::normalize(c))
            .filter(|c| !c.is_empty())
            .map(|token| match aliases.get(token.as_str()) {
                Some(members) => CommandSpec::Alias {
                    name: token,
                    commands: members.to_vec(),
                },
                None => CommandSpec::Raw(token),
            })
            .collect();
        (false, specs)
    };

    Some(SudoRule {
        principal,
        runas,
        allow_all,
        commands,
        flags,
    })
}
