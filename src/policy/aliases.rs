//! Alias compilation
//!
//! One managed file holds every alias directive: the auto-compiled
//! `Cmnd_Alias` block regenerated from the catalog on every compile, then the
//! user-declared aliases grouped by type in sudoers declaration order. Only
//! the user section is ever parsed back; the auto section is catalog output,
//! not state.
//!
//! File layout:
//!
//! ```text
//! # Managed by sudo-manager
//! # Generated: <timestamp>
//! # DO NOT EDIT BY HAND
//! #
//! # AUTO-COMPILED COMMAND ALIASES
//! Cmnd_Alias SYSTEMCTL_STATUS = /usr/bin/systemctl status
//! #
//! # USER-MANAGED ALIASES
//! User_Alias ADMINS = alice, bob, %wheel
//! Cmnd_Alias CUSTOM_CMDS = /usr/local/bin/deploy.sh
//! ```

use crate::policy::errors::{ManagerError, PolicyResult};
use crate::policy::paths::SudoPaths;
use crate::policy::render;
use crate::policy::types::{AliasDef, AliasType, Catalog};
use crate::policy::validate;
use std::collections::BTreeMap;
use tracing::debug;

const AUTO_ALIAS_MARKER: &str = "# AUTO-COMPILED COMMAND ALIASES";
const USER_ALIAS_MARKER: &str = "# USER-MANAGED ALIASES";

/// User-declared aliases, grouped by type, names kept sorted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserAliases {
    by_type: BTreeMap<AliasType, BTreeMap<String, Vec<String>>>,
}

impl UserAliases {
    /// Read the user section back from the managed alias file. A missing
    /// file means no user aliases yet.
    pub fn load(paths: &SudoPaths) -> PolicyResult<Self> {
        let path = paths.alias_file();
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)?;
        Ok(Self::parse(&text))
    }

    /// Parse user-managed aliases out of alias-file text. Lines before the
    /// user marker belong to the auto section and are ignored; malformed
    /// lines are skipped, matching what the syntax checker would have let
    /// through in the first place.
    pub fn parse(text: &str) -> Self {
        let mut aliases = Self::default();
        let mut in_user_section = false;

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.contains(USER_ALIAS_MARKER) {
                in_user_section = true;
                continue;
            }
            if !in_user_section || line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((keyword, rest)) = line.split_once(char::is_whitespace) else {
                continue;
            };
            let Some(alias_type) = AliasType::from_keyword(keyword) else {
                continue;
            };
            let Some((name, members_str)) = rest.split_once('=') else {
                continue;
            };
            let members: Vec<String> = members_str
                .split(',')
                .map(validate::normalize)
                .filter(|m| !m.is_empty())
                .collect();
            if members.is_empty() {
                continue;
            }
            aliases
                .by_type
                .entry(alias_type)
                .or_default()
                .insert(name.trim().to_string(), members);
        }

        aliases
    }

    /// Add or replace a user alias. Fails closed on invalid names/members and
    /// on collision with an auto-compiled catalog alias.
    pub fn add(&mut self, def: &AliasDef, catalog: &Catalog) -> PolicyResult<()> {
        validate::check_alias_name(&def.name)?;
        if def.members.is_empty() {
            return Err(ManagerError::validation(format!(
                "{} '{}' must have at least one member",
                def.alias_type, def.name
            )));
        }
        for member in &def.members {
            check_member(def.alias_type, member)?;
        }

        // Auto-compiled Cmnd_Alias names are owned by the catalog
        if def.alias_type == AliasType::Cmnd
            && catalog.alias_lookup().contains_key(def.name.as_str())
        {
            return Err(ManagerError::alias_conflict(
                def.alias_type.keyword(),
                &def.name,
            ));
        }

        debug!(alias = %def.name, alias_type = %def.alias_type, "upserting user alias");
        self.by_type
            .entry(def.alias_type)
            .or_default()
            .insert(def.name.clone(), def.members.clone());
        Ok(())
    }

    /// Remove a user alias; true when it existed
    pub fn remove(&mut self, alias_type: AliasType, name: &str) -> bool {
        self.by_type
            .get_mut(&alias_type)
            .map(|m| m.remove(name).is_some())
            .unwrap_or(false)
    }
}

fn check_member(alias_type: AliasType, member: &str) -> PolicyResult<()> {
    match alias_type {
        AliasType::User => validate::check_account_member(member, "user alias member"),
        AliasType::Runas => validate::check_account_member(member, "runas alias member"),
        AliasType::Host => validate::check_host_member(member),
        AliasType::Cmnd => validate::check_command_token(member),
    }
}

/// Render the complete alias file: auto-compiled catalog aliases in category
/// order, then user aliases grouped by type in sudoers declaration order.
pub fn compile(catalog: &Catalog, user: &UserAliases) -> String {
    let mut out = render::managed_header();
    out.push_str("#\n");

    out.push_str(AUTO_ALIAS_MARKER);
    out.push('\n');
    for alias in catalog.command_aliases_in_order() {
        out.push_str(&format!(
            "Cmnd_Alias {} = {}\n",
            alias.name,
            alias.commands.join(", ")
        ));
    }

    out.push_str("#\n");
    out.push_str(USER_ALIAS_MARKER);
    out.push('\n');
    for alias_type in AliasType::ALL {
        if let Some(names) = user.by_type.get(&alias_type) {
            for (name, members) in names {
                out.push_str(&format!(
                    "{} {} = {}\n",
                    alias_type.keyword(),
                    name,
                    members.join(", ")
                ));
            }
        }
    }

    out
}
