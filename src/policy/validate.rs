//! Token validation for everything that ends up inside a sudoers file
//!
//! This is the primary injection defense: any user-supplied token (principal,
//! runas, command path, alias name or member) is checked before rendering,
//! never only by the downstream syntax checker. A token that reaches disk has
//! passed these checks.

use crate::policy::errors::{ManagerError, PolicyResult};
use regex::Regex;
use std::sync::LazyLock;

/// Characters with sudoers or shell meaning that must never appear in a
/// user-supplied token. Comma splits sudoers lists, `#` starts a comment,
/// `!` negates; any of them inside a token changes the meaning of the line.
const FORBIDDEN_CHARS: [char; 15] = [
    ';', '|', '&', '`', '$', '(', ')', '<', '>', '"', '\'', '\\', ',', '#', '!',
];

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9._-]*\$?$").unwrap());

static ALIAS_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").unwrap());

static HOST_MEMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^!?[A-Za-z0-9][A-Za-z0-9.:/_-]*$").unwrap());

/// Collapse runs of whitespace, as sudoers itself treats them
pub fn normalize(token: &str) -> String {
    token.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Reject control characters and shell/sudoers metacharacters
pub fn check_no_metachars(token: &str, what: &str) -> PolicyResult<()> {
    if token.is_empty() {
        return Err(ManagerError::validation(format!("{} must not be empty", what)));
    }
    if let Some(c) = token
        .chars()
        .find(|c| FORBIDDEN_CHARS.contains(c) || c.is_control())
    {
        return Err(ManagerError::validation(format!(
            "{} '{}' contains forbidden character {:?}",
            what, token, c
        )));
    }
    Ok(())
}

/// A principal name. Stricter than a general account name: the principal
/// becomes a file name under the rule directory, and sudo's include scan
/// skips any file name containing a dot, so a dotted principal would publish
/// a fragment that never takes effect.
pub fn check_principal_name(name: &str, what: &str) -> PolicyResult<()> {
    check_no_metachars(name, what)?;
    if !NAME_RE.is_match(name) {
        return Err(ManagerError::validation(format!(
            "{} '{}' is not a valid account name",
            what, name
        )));
    }
    if name.contains('.') {
        return Err(ManagerError::validation(format!(
            "{} '{}' must not contain '.': sudo ignores rule files with a dot in the name",
            what, name
        )));
    }
    Ok(())
}

/// A runas target: an account name, `ALL`, or an alias reference
pub fn check_runas(runas: &str) -> PolicyResult<()> {
    check_no_metachars(runas, "runas")?;
    if runas == "ALL" || ALIAS_NAME_RE.is_match(runas) || NAME_RE.is_match(runas) {
        Ok(())
    } else {
        Err(ManagerError::validation(format!(
            "runas '{}' is not a valid account name or alias",
            runas
        )))
    }
}

/// An alias name per sudoers grammar
pub fn check_alias_name(name: &str) -> PolicyResult<()> {
    check_no_metachars(name, "alias name")?;
    if !ALIAS_NAME_RE.is_match(name) {
        return Err(ManagerError::validation(format!(
            "alias name '{}' must match [A-Z][A-Z0-9_]*",
            name
        )));
    }
    Ok(())
}

/// A literal command: absolute path, arguments allowed, no metacharacters
pub fn check_command_token(command: &str) -> PolicyResult<()> {
    check_no_metachars(command, "command")?;
    let base = command.split_whitespace().next().unwrap_or("");
    if !base.starts_with('/') {
        return Err(ManagerError::validation(format!(
            "command '{}' must be an absolute path",
            command
        )));
    }
    Ok(())
}

/// A host alias member: hostname, address, or CIDR range, optionally negated
pub fn check_host_member(member: &str) -> PolicyResult<()> {
    let bare = member.strip_prefix('!').unwrap_or(member);
    check_no_metachars(bare, "host member")?;
    if !HOST_MEMBER_RE.is_match(member) {
        return Err(ManagerError::validation(format!(
            "host member '{}' is not a valid hostname or address",
            member
        )));
    }
    Ok(())
}

/// A user/runas alias member: account name, `%group`, or a nested alias name
pub fn check_account_member(member: &str, what: &str) -> PolicyResult<()> {
    check_no_metachars(member, what)?;
    let bare = member.strip_prefix('%').unwrap_or(member);
    if bare == "ALL" || NAME_RE.is_match(bare) || ALIAS_NAME_RE.is_match(bare) {
        Ok(())
    } else {
        Err(ManagerError::validation(format!(
            "{} '{}' is not a valid account, %group, or alias reference",
            what, member
        )))
    }
}
