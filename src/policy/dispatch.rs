//! Command dispatcher
//!
//! The single entry point: maps an operation name plus JSON payload onto the
//! read or compile-then-publish pipelines. Every response is one JSON value;
//! every failure propagates kind and message to the caller untouched.

use crate::policy::aliases::{self, UserAliases};
use crate::policy::config::ManagerConfig;
use crate::policy::errors::{ManagerError, PolicyResult};
use crate::policy::paths::SudoPaths;
use crate::policy::render;
use crate::policy::types::{AliasDef, AliasType, Catalog, CommandSpec, SudoRule};
use crate::policy::validate;
use crate::policy::writer::Publisher;
use crate::policy::{groups, reader};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

/// Recognized operations, for the usage message
pub const OPERATIONS: [&str; 9] = [
    "list",
    "catalog",
    "group-catalog",
    "update",
    "update-group",
    "delete",
    "delete-group",
    "add-alias",
    "delete-alias",
];

#[derive(Debug, Deserialize)]
struct DeleteUserPayload {
    user: String,
}

#[derive(Debug, Deserialize)]
struct DeleteGroupPayload {
    group: String,
}

#[derive(Debug, Deserialize)]
struct DeleteAliasPayload {
    #[serde(rename = "type")]
    alias_type: AliasType,
    name: String,
}

/// Execute one operation and return its JSON response
pub fn dispatch(operation: &str, payload: Option<&str>, config: &ManagerConfig) -> PolicyResult<Value> {
    let paths = SudoPaths::new(&config.paths);
    info!(operation, "dispatching");

    match operation {
        "list" => {
            let catalog = Catalog::load(&paths)?;
            let listing = reader::list_rules(&paths, &catalog)?;
            Ok(serde_json::to_value(listing)?)
        }

        "catalog" => {
            let catalog = Catalog::load(&paths)?;
            Ok(catalog.to_wire())
        }

        "group-catalog" => {
            let catalog = groups::group_catalog(&config.groups)?;
            Ok(serde_json::to_value(catalog)?)
        }

        "update" | "update-group" => {
            let rule: SudoRule = serde_json::from_str(require_payload(operation, payload)?)?;
            if rule.principal.is_group() != (operation == "update-group") {
                return Err(ManagerError::validation(format!(
                    "'{}' expects a {} rule",
                    operation,
                    if operation == "update-group" { "group" } else { "user" }
                )));
            }
            update_rule(rule, config, &paths)
        }

        "delete" => {
            let req: DeleteUserPayload = serde_json::from_str(require_payload(operation, payload)?)?;
            validate::check_principal_name(&req.user, "user")?;
            let principal = crate::policy::types::Principal::User(req.user);
            remove_rule(&principal, config, &paths)
        }

        "delete-group" => {
            let req: DeleteGroupPayload = serde_json::from_str(require_payload(operation, payload)?)?;
            validate::check_principal_name(&req.group, "group")?;
            let principal = crate::policy::types::Principal::Group(req.group);
            remove_rule(&principal, config, &paths)
        }

        "add-alias" => {
            let def: AliasDef = serde_json::from_str(require_payload(operation, payload)?)?;
            add_alias(def, config, &paths)
        }

        "delete-alias" => {
            let req: DeleteAliasPayload =
                serde_json::from_str(require_payload(operation, payload)?)?;
            delete_alias(req, config, &paths)
        }

        other => Err(ManagerError::usage(format!(
            "unknown operation '{}'; expected one of: {}",
            other,
            OPERATIONS.join(", ")
        ))),
    }
}

/// Compile-and-publish pipeline for `update` / `update-group`. The rule file
/// is replaced wholesale; the alias and hardening files are regenerated first
/// so the published grant always resolves.
fn update_rule(mut rule: SudoRule, config: &ManagerConfig, paths: &SudoPaths) -> PolicyResult<Value> {
    // Render also enforces this, but reject before any compile work happens
    if rule.principal.is_group() && rule.flags.nopasswd {
        return Err(ManagerError::validation(
            "NOPASSWD is not permitted for group rules: group grants always require a password",
        ));
    }

    let catalog = Catalog::load(paths)?;
    rule.commands = resolve_commands(rule.commands, &catalog)?;

    let text = render::render_rule(&rule, &config.hardening)?;
    let publisher = Publisher::new(paths, &config.checker);

    publisher.publish(&paths.hardening_file(), &render::render_hardening(&config.hardening))?;
    let user_aliases = UserAliases::load(paths)?;
    publisher.publish(&paths.alias_file(), &aliases::compile(&catalog, &user_aliases))?;
    publisher.publish(&paths.rule_file(&rule.principal), &text)?;

    Ok(json!({
        "status": "ok",
        "file": rule.principal.file_name(),
    }))
}

/// Resolve every command reference: alias names must exist in the selectable
/// catalog (expanded for provenance), anything else must be an absolute path.
/// Unresolved references are rejected, never silently dropped.
fn resolve_commands(
    commands: Vec<CommandSpec>,
    catalog: &Catalog,
) -> PolicyResult<Vec<CommandSpec>> {
    let selectable = catalog.selectable_alias_names();
    let lookup = catalog.alias_lookup();

    commands
        .into_iter()
        .map(|spec| {
            let token = validate::normalize(spec.token());
            if selectable.contains(token.as_str()) {
                // Members come from the catalog, not from the caller
                let members = lookup.get(token.as_str()).copied().unwrap_or(&[]);
                return Ok(CommandSpec::Alias {
                    name: token,
                    commands: members.to_vec(),
                });
            }
            match spec {
                CommandSpec::Alias { name, .. } => Err(ManagerError::validation(format!(
                    "unknown command alias '{}'",
                    name
                ))),
                CommandSpec::Raw(_) => {
                    validate::check_command_token(&token).map_err(|_| {
                        ManagerError::validation(format!(
                            "command not allowed: '{}' (must be a catalog alias or an absolute path)",
                            token
                        ))
                    })?;
                    Ok(CommandSpec::Raw(token))
                }
            }
        })
        .collect()
}

fn remove_rule(
    principal: &crate::policy::types::Principal,
    config: &ManagerConfig,
    paths: &SudoPaths,
) -> PolicyResult<Value> {
    let publisher = Publisher::new(paths, &config.checker);
    let removed = publisher.remove(&paths.rule_file(principal))?;
    Ok(json!({
        "status": "ok",
        "removed": removed,
    }))
}

fn add_alias(def: AliasDef, config: &ManagerConfig, paths: &SudoPaths) -> PolicyResult<Value> {
    let catalog = Catalog::load(paths)?;
    let mut user_aliases = UserAliases::load(paths)?;
    user_aliases.add(&def, &catalog)?;

    let publisher = Publisher::new(paths, &config.checker);
    publisher.publish(&paths.alias_file(), &aliases::compile(&catalog, &user_aliases))?;

    Ok(json!({
        "status": "ok",
        "type": def.alias_type.keyword(),
        "alias": def.name,
        "members": def.members,
    }))
}

/// Remove a user-managed alias and republish the alias file. Auto-compiled
/// catalog aliases are not user state and cannot be removed here; removing a
/// name that was never declared is a successful no-op.
fn delete_alias(
    req: DeleteAliasPayload,
    config: &ManagerConfig,
    paths: &SudoPaths,
) -> PolicyResult<Value> {
    validate::check_alias_name(&req.name)?;
    let mut user_aliases = UserAliases::load(paths)?;
    let removed = user_aliases.remove(req.alias_type, &req.name);
    if removed {
        let catalog = Catalog::load(paths)?;
        let publisher = Publisher::new(paths, &config.checker);
        publisher.publish(&paths.alias_file(), &aliases::compile(&catalog, &user_aliases))?;
    }

    Ok(json!({
        "status": "ok",
        "type": req.alias_type.keyword(),
        "alias": req.name,
        "removed": removed,
    }))
}

fn require_payload<'a>(operation: &str, payload: Option<&'a str>) -> PolicyResult<&'a str> {
    payload.ok_or_else(|| {
        ManagerError::usage(format!("operation '{}' requires a JSON payload", operation))
    })
}
