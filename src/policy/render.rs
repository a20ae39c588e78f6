//! Sudoers text rendering
//!
//! Turns a structured rule plus the hardening policy into sudoers syntax.
//! Every user-supplied token is validated here before it is interpolated;
//! the downstream syntax checker is a second line of defense, not the first.

use crate::policy::config::HardeningConfig;
use crate::policy::errors::{ManagerError, PolicyResult};
use crate::policy::paths::MANAGED_HEADER;
use crate::policy::types::{CommandSpec, SudoRule};
use crate::policy::validate;
use chrono::Utc;

/// Header written at the top of every managed file. The first line is the
/// marker the rule reader uses to tell managed files from foreign ones.
pub fn managed_header() -> String {
    format!(
        "{}\n# Generated: {}\n# DO NOT EDIT BY HAND\n",
        MANAGED_HEADER,
        Utc::now().to_rfc3339()
    )
}

/// Render a complete rule file: header, per-principal hardening defaults,
/// guardrail negation, then the grant line.
pub fn render_rule(rule: &SudoRule, hardening: &HardeningConfig) -> PolicyResult<String> {
    check_rule(rule)?;

    let principal = rule.principal.sudoers_token();
    let mut out = managed_header();
    out.push('\n');

    if hardening.env_reset {
        out.push_str(&format!("Defaults:{} env_reset\n", principal));
    }
    out.push_str(&format!(
        "Defaults:{} secure_path=\"{}\"\n\n",
        principal, hardening.secure_path
    ));

    if hardening.guardrails {
        // Cancel any broader grant inherited from vendor fragments; the
        // managed grant below wins by last-match.
        out.push_str("# Neutralize inherited grants from other sudoers sources\n");
        out.push_str(&format!("{} ALL=(ALL) !ALL\n\n", principal));
    }

    out.push_str(&grant_line(rule));
    out.push('\n');
    Ok(out)
}

/// Render the global hardening defaults file
pub fn render_hardening(hardening: &HardeningConfig) -> String {
    let mut out = managed_header();
    out.push('\n');
    if hardening.env_reset {
        out.push_str("Defaults env_reset\n");
    }
    out.push_str(&format!(
        "Defaults secure_path=\"{}\"\n",
        hardening.secure_path
    ));
    out
}

/// The sudoers grant line for a rule
pub fn grant_line(rule: &SudoRule) -> String {
    let tags: Vec<&str> = rule
        .flags
        .tags()
        .iter()
        .filter(|(_, on)| *on)
        .map(|(kw, _)| *kw)
        .collect();
    let tag_prefix = if tags.is_empty() {
        String::new()
    } else {
        format!("{}: ", tags.join(","))
    };

    let commands = if rule.allow_all {
        "ALL".to_string()
    } else {
        rule.commands
            .iter()
            .map(|c| c.token())
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "{} ALL=({}) {}{}",
        rule.principal.sudoers_token(),
        rule.runas,
        tag_prefix,
        commands
    )
}

/// Reject a rule before any of its tokens can reach disk
fn check_rule(rule: &SudoRule) -> PolicyResult<()> {
    validate::check_principal_name(rule.principal.name(), "principal")?;
    validate::check_runas(&rule.runas)?;

    if rule.principal.is_group() && rule.flags.nopasswd {
        return Err(ManagerError::validation(
            "NOPASSWD is not permitted for group rules: group grants always require a password",
        ));
    }

    if rule.allow_all {
        if !rule.commands.is_empty() {
            return Err(ManagerError::validation(
                "a rule granting ALL must not list commands",
            ));
        }
        return Ok(());
    }

    if rule.commands.is_empty() {
        return Err(ManagerError::validation(
            "rule must list at least one command or grant ALL",
        ));
    }
    for spec in &rule.commands {
        match spec {
            CommandSpec::Raw(cmd) => validate::check_command_token(cmd)?,
            CommandSpec::Alias { name, .. } => validate::check_alias_name(name)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::types::{Principal, RuleFlags};

    fn rule(principal: Principal) -> SudoRule {
        SudoRule {
            principal,
            runas: "root".to_string(),
            allow_all: false,
            commands: vec![
                CommandSpec::Alias {
                    name: "SYSTEMCTL_STATUS".to_string(),
                    commands: vec!["/usr/bin/systemctl status".to_string()],
                },
                CommandSpec::Raw("/usr/local/bin/deploy.sh".to_string()),
            ],
            flags: RuleFlags {
                nopasswd: true,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_grant_line_shape() {
        let line = grant_line(&rule(Principal::User("alice".to_string())));
        assert_eq!(
            line,
            "alice ALL=(root) NOPASSWD: SYSTEMCTL_STATUS, /usr/local/bin/deploy.sh"
        );
    }

    #[test]
    fn test_tag_canonical_order() {
        let mut r = rule(Principal::User("alice".to_string()));
        r.flags = RuleFlags {
            log_output: true,
            noexec: true,
            nopasswd: true,
            ..Default::default()
        };
        let line = grant_line(&r);
        assert!(line.contains("NOPASSWD,NOEXEC,LOG_OUTPUT: "));
    }

    #[test]
    fn test_rendered_file_structure() {
        let text = render_rule(
            &rule(Principal::User("alice".to_string())),
            &HardeningConfig::default(),
        )
        .unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], MANAGED_HEADER);
        assert!(lines[1].starts_with("# Generated: "));
        assert!(text.contains("Defaults:alice env_reset"));
        assert!(text.contains("Defaults:alice secure_path=\""));
        assert!(text.contains("alice ALL=(ALL) !ALL"));
        // Guardrail must precede the grant so the grant wins by last-match
        let guard_pos = text.find("!ALL").unwrap();
        let grant_pos = text.find("NOPASSWD:").unwrap();
        assert!(guard_pos < grant_pos);
    }

    #[test]
    fn test_group_rendering_uses_sigil() {
        let mut r = rule(Principal::Group("devs".to_string()));
        r.flags.nopasswd = false;
        let text = render_rule(&r, &HardeningConfig::default()).unwrap();
        assert!(text.contains("Defaults:%devs env_reset"));
        assert!(text.contains("%devs ALL=(ALL) !ALL"));
        assert!(text.contains("%devs ALL=(root) SYSTEMCTL_STATUS"));
    }

    #[test]
    fn test_group_nopasswd_rejected() {
        let r = rule(Principal::Group("devs".to_string()));
        let err = render_rule(&r, &HardeningConfig::default()).unwrap_err();
        assert!(matches!(err, ManagerError::Validation(_)));
        assert!(err.to_string().contains("NOPASSWD"));
    }

    #[test]
    fn test_injection_rejected_before_render() {
        let mut r = rule(Principal::User("alice".to_string()));
        r.commands = vec![CommandSpec::Raw("/usr/bin/true; rm -rf /".to_string())];
        assert!(render_rule(&r, &HardeningConfig::default()).is_err());

        let r = rule(Principal::User("alice;evil".to_string()));
        assert!(render_rule(&r, &HardeningConfig::default()).is_err());

        let mut r = rule(Principal::User("alice".to_string()));
        r.runas = "root`id`".to_string();
        assert!(render_rule(&r, &HardeningConfig::default()).is_err());
    }

    #[test]
    fn test_allow_all_excludes_commands() {
        let mut r = rule(Principal::User("alice".to_string()));
        r.allow_all = true;
        assert!(render_rule(&r, &HardeningConfig::default()).is_err());

        r.commands.clear();
        let text = render_rule(&r, &HardeningConfig::default()).unwrap();
        assert!(text.contains("alice ALL=(root) NOPASSWD: ALL"));
    }

    #[test]
    fn test_duplicates_preserved_not_deduped() {
        let mut r = rule(Principal::User("alice".to_string()));
        r.commands = vec![
            CommandSpec::Raw("/usr/bin/id".to_string()),
            CommandSpec::Raw("/usr/bin/id".to_string()),
        ];
        let line = grant_line(&r);
        assert!(line.contains("/usr/bin/id, /usr/bin/id"));
    }

    #[test]
    fn test_hardening_file() {
        let text = render_hardening(&HardeningConfig::default());
        assert!(text.starts_with(MANAGED_HEADER));
        assert!(text.contains("Defaults env_reset\n"));
        assert!(text.contains("Defaults secure_path="));
    }
}
