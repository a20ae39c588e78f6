//! Approved-command catalog loader
//!
//! Reads the category files under the catalog directory into an immutable
//! in-memory catalog. Category order is lexical file-name order and is
//! semantically meaningful: it drives alias precedence in the compiled alias
//! block and grouping in the UI. The catalog is rebuilt fresh on every
//! invocation; the directory is the only source of truth.

use crate::policy::errors::{ManagerError, PolicyResult};
use crate::policy::paths::SudoPaths;
use crate::policy::types::{Catalog, CatalogEntry, CommandAlias};
use crate::policy::validate;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Synthetic category for the optional custom-commands registry
pub const CUSTOM_CATEGORY: &str = "99-custom";

static CMD_ALIAS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Cmnd_Alias\s+(\w+)\s*=\s*(.*)$").unwrap());

static RUNAS_ALIAS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Runas_Alias\s+(\w+)\s*=\s*(.*)$").unwrap());

impl Catalog {
    /// Load the catalog from disk. Pure read: no side effects.
    pub fn load(paths: &SudoPaths) -> PolicyResult<Self> {
        let mut catalog = Self::default();
        // Alias names must be unique across the whole catalog; remember where
        // each was first declared for the duplicate diagnostic.
        let mut seen: HashMap<String, (String, usize)> = HashMap::new();

        if paths.catalog_dir.is_dir() {
            let mut files: Vec<_> = std::fs::read_dir(&paths.catalog_dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect();
            files.sort();

            for file in files {
                let category = file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let entry = parse_category_file(&file, &category, &mut seen)?;
                debug!(
                    category,
                    aliases = entry.command_aliases.len(),
                    raw = entry.raw_commands.len(),
                    selectable = entry.selectable,
                    "loaded catalog category"
                );
                catalog.categories.insert(category, entry);
            }
        } else {
            warn!(dir = %paths.catalog_dir.display(), "catalog directory missing, catalog is empty");
        }

        if paths.custom_commands.is_file() {
            let entry = parse_custom_registry(&paths.custom_commands)?;
            if !entry.raw_commands.is_empty() {
                catalog.categories.insert(CUSTOM_CATEGORY.to_string(), entry);
            }
        }

        Ok(catalog)
    }

    /// Names a rule may reference: command aliases from selectable categories
    pub fn selectable_alias_names(&self) -> HashSet<&str> {
        self.categories
            .values()
            .filter(|e| e.selectable)
            .flat_map(|e| e.command_aliases.iter().map(|a| a.name.as_str()))
            .collect()
    }

    /// Alias name to member commands, over every category (policy categories
    /// included: their aliases are enforced even though not selectable)
    pub fn alias_lookup(&self) -> HashMap<&str, &[String]> {
        self.categories
            .values()
            .flat_map(|e| e.command_aliases.iter())
            .map(|a| (a.name.as_str(), a.commands.as_slice()))
            .collect()
    }

    /// All command aliases in category order, for the compiled alias block
    pub fn command_aliases_in_order(&self) -> impl Iterator<Item = &CommandAlias> {
        self.categories
            .values()
            .flat_map(|e| e.command_aliases.iter())
    }

    /// UI-facing catalog: selectable categories only
    pub fn to_wire(&self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        for (category, entry) in &self.categories {
            if !entry.selectable {
                continue;
            }
            let mut aliases = serde_json::Map::new();
            for alias in &entry.command_aliases {
                aliases.insert(alias.name.clone(), serde_json::json!(alias.commands));
            }
            let mut runas = serde_json::Map::new();
            for (name, members) in &entry.runas_aliases {
                runas.insert(name.clone(), serde_json::json!(members));
            }
            out.insert(
                category.clone(),
                serde_json::json!({
                    "command_aliases": aliases,
                    "runas_aliases": runas,
                    "raw_commands": entry.raw_commands,
                }),
            );
        }
        serde_json::Value::Object(out)
    }
}

fn parse_category_file(
    path: &Path,
    category: &str,
    seen: &mut HashMap<String, (String, usize)>,
) -> PolicyResult<CatalogEntry> {
    let text = std::fs::read_to_string(path)?;
    let mut entry = CatalogEntry {
        // Policy categories are constraints, never menu options
        selectable: !category.contains("policy"),
        ..Default::default()
    };

    let mut buffer = String::new();
    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        // Defaults lines are policy, not commands
        if line.starts_with("Defaults") {
            continue;
        }
        // Backslash line continuations
        if let Some(stripped) = line.strip_suffix('\\') {
            buffer.push_str(stripped);
            buffer.push(' ');
            continue;
        }
        let line = format!("{}{}", buffer, line);
        buffer.clear();

        if let Some(caps) = CMD_ALIAS_RE.captures(&line) {
            let name = caps[1].to_string();
            validate::check_alias_name(&name).map_err(|e| {
                ManagerError::catalog(format!("{}:{}: {}", category, line_no, e))
            })?;
            if let Some((other_cat, other_line)) = seen.get(&name) {
                return Err(ManagerError::catalog(format!(
                    "duplicate alias '{}' defined at {}:{} and {}:{}",
                    name, other_cat, other_line, category, line_no
                )));
            }
            let commands = split_members(&caps[2]);
            for cmd in &commands {
                validate::check_command_token(cmd).map_err(|e| {
                    ManagerError::catalog(format!("{}:{}: {}", category, line_no, e))
                })?;
            }
            if commands.is_empty() {
                return Err(ManagerError::catalog(format!(
                    "{}:{}: alias '{}' has no members",
                    category, line_no, name
                )));
            }
            seen.insert(name.clone(), (category.to_string(), line_no));
            entry.command_aliases.push(CommandAlias {
                name,
                commands,
                category: category.to_string(),
                line: line_no,
            });
            continue;
        }

        if let Some(caps) = RUNAS_ALIAS_RE.captures(&line) {
            let name = caps[1].to_string();
            validate::check_alias_name(&name).map_err(|e| {
                ManagerError::catalog(format!("{}:{}: {}", category, line_no, e))
            })?;
            let members = split_members(&caps[2]);
            for member in &members {
                validate::check_account_member(member, "runas alias member").map_err(|e| {
                    ManagerError::catalog(format!("{}:{}: {}", category, line_no, e))
                })?;
            }
            entry.runas_aliases.push((name, members));
            continue;
        }

        // Anything else is a raw command definition
        let command = validate::normalize(&line);
        validate::check_command_token(&command)
            .map_err(|e| ManagerError::catalog(format!("{}:{}: {}", category, line_no, e)))?;
        entry.raw_commands.push(command);
    }

    Ok(entry)
}

fn parse_custom_registry(path: &Path) -> PolicyResult<CatalogEntry> {
    let text = std::fs::read_to_string(path)?;
    let mut entry = CatalogEntry {
        selectable: true,
        ..Default::default()
    };
    for (idx, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let command = validate::normalize(line);
        validate::check_command_token(&command).map_err(|e| {
            ManagerError::catalog(format!("{}:{}: {}", path.display(), idx + 1, e))
        })?;
        entry.raw_commands.push(command);
    }
    Ok(entry)
}

fn split_members(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(validate::normalize)
        .filter(|m| !m.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, SudoPaths) {
        let dir = TempDir::new().unwrap();
        let paths = SudoPaths::under_root(dir.path());
        fs::create_dir_all(&paths.catalog_dir).unwrap();
        fs::create_dir_all(&paths.sudoers_dir).unwrap();
        (dir, paths)
    }

    #[test]
    fn test_load_orders_categories_lexically() {
        let (_dir, paths) = fixture();
        fs::write(
            paths.catalog_dir.join("40-packages"),
            "Cmnd_Alias PKG_INSTALL = /usr/bin/dnf install\n",
        )
        .unwrap();
        fs::write(
            paths.catalog_dir.join("00-aliases"),
            "Cmnd_Alias SYSTEMCTL_STATUS = /usr/bin/systemctl status\n",
        )
        .unwrap();

        let catalog = Catalog::load(&paths).unwrap();
        let order: Vec<&str> = catalog
            .command_aliases_in_order()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(order, vec!["SYSTEMCTL_STATUS", "PKG_INSTALL"]);
    }

    #[test]
    fn test_comments_continuations_and_defaults() {
        let (_dir, paths) = fixture();
        fs::write(
            paths.catalog_dir.join("10-services"),
            "# service management\n\
             Defaults env_reset\n\
             \n\
             Cmnd_Alias SERVICES = /usr/bin/systemctl start, \\\n\
                 /usr/bin/systemctl stop\n\
             /usr/sbin/nginx -t\n",
        )
        .unwrap();

        let catalog = Catalog::load(&paths).unwrap();
        let entry = &catalog.categories["10-services"];
        assert_eq!(entry.command_aliases.len(), 1);
        assert_eq!(
            entry.command_aliases[0].commands,
            vec!["/usr/bin/systemctl start", "/usr/bin/systemctl stop"]
        );
        assert_eq!(entry.raw_commands, vec!["/usr/sbin/nginx -t"]);
    }

    #[test]
    fn test_duplicate_alias_names_rejected_with_both_locations() {
        let (_dir, paths) = fixture();
        fs::write(
            paths.catalog_dir.join("00-aliases"),
            "Cmnd_Alias STATUS = /usr/bin/systemctl status\n",
        )
        .unwrap();
        fs::write(
            paths.catalog_dir.join("40-packages"),
            "Cmnd_Alias STATUS = /usr/bin/rpm -qa\n",
        )
        .unwrap();

        let err = Catalog::load(&paths).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, ManagerError::Catalog(_)));
        assert!(msg.contains("STATUS"));
        assert!(msg.contains("00-aliases:1"));
        assert!(msg.contains("40-packages:1"));
    }

    #[test]
    fn test_policy_category_not_selectable() {
        let (_dir, paths) = fixture();
        fs::write(
            paths.catalog_dir.join("05-policy"),
            "Cmnd_Alias LOCKED_DOWN = /usr/bin/false\n",
        )
        .unwrap();
        fs::write(
            paths.catalog_dir.join("10-services"),
            "Cmnd_Alias SERVICES = /usr/bin/systemctl restart\n",
        )
        .unwrap();

        let catalog = Catalog::load(&paths).unwrap();
        assert!(!catalog.categories["05-policy"].selectable);

        let selectable = catalog.selectable_alias_names();
        assert!(selectable.contains("SERVICES"));
        assert!(!selectable.contains("LOCKED_DOWN"));

        // Enforced aliases still resolve for display purposes
        assert!(catalog.alias_lookup().contains_key("LOCKED_DOWN"));

        // And the wire catalog hides the policy category entirely
        let wire = catalog.to_wire();
        assert!(wire.get("05-policy").is_none());
        assert!(wire.get("10-services").is_some());
    }

    #[test]
    fn test_relative_path_in_catalog_rejected() {
        let (_dir, paths) = fixture();
        fs::write(
            paths.catalog_dir.join("10-services"),
            "Cmnd_Alias BAD = systemctl status\n",
        )
        .unwrap();
        let err = Catalog::load(&paths).unwrap_err();
        assert!(matches!(err, ManagerError::Catalog(_)));
        assert!(err.to_string().contains("absolute path"));
    }

    #[test]
    fn test_custom_registry_extends_catalog() {
        let (_dir, paths) = fixture();
        fs::write(
            &paths.custom_commands,
            "# local additions\n/usr/local/bin/deploy.sh\n",
        )
        .unwrap();

        let catalog = Catalog::load(&paths).unwrap();
        assert_eq!(
            catalog.categories[CUSTOM_CATEGORY].raw_commands,
            vec!["/usr/local/bin/deploy.sh"]
        );
    }

    #[test]
    fn test_missing_catalog_dir_is_empty_catalog() {
        let dir = TempDir::new().unwrap();
        let paths = SudoPaths::under_root(dir.path());
        let catalog = Catalog::load(&paths).unwrap();
        assert!(catalog.categories.is_empty());
    }
}
