//! Filesystem layout for the managed sudoers tree
//!
//! File names encode load order, and load order is policy: the alias file
//! (`00-`) and hardening file (`05-`) must be parsed by sudo before any rule
//! file, group rules (`10-group-*`) before bare user files.

use crate::policy::config::PathsConfig;
use crate::policy::types::Principal;
use std::path::{Path, PathBuf};

/// Name of the compiled alias file (auto + user aliases)
pub const ALIAS_FILE_NAME: &str = "00-managed-aliases";

/// Name of the global hardening defaults file
pub const HARDENING_FILE_NAME: &str = "05-hardening";

/// Advisory lock file taken for the scratch-write/validate/rename window
pub const LOCK_FILE_NAME: &str = ".manager.lock";

/// First line of every file this system owns. Files without it are foreign
/// and never parsed or overwritten.
pub const MANAGED_HEADER: &str = "# Managed by sudo-manager";

/// File name prefixes reserved for infrastructure files, which `list` skips
/// and `delete` refuses to remove
pub const INFRA_PREFIXES: [&str; 2] = ["00-", "05-"];

/// Resolved filesystem layout
#[derive(Debug, Clone)]
pub struct SudoPaths {
    pub sudoers_dir: PathBuf,
    pub catalog_dir: PathBuf,
    pub custom_commands: PathBuf,
}

impl SudoPaths {
    pub fn new(config: &PathsConfig) -> Self {
        Self {
            sudoers_dir: config.sudoers_dir.clone(),
            catalog_dir: config.catalog_dir.clone(),
            custom_commands: config.custom_commands.clone(),
        }
    }

    /// Layout rooted under an arbitrary directory, for tests
    pub fn under_root(root: &Path) -> Self {
        Self {
            sudoers_dir: root.join("sudoers.d"),
            catalog_dir: root.join("sudo-commands.d"),
            custom_commands: root.join("commands.local"),
        }
    }

    pub fn alias_file(&self) -> PathBuf {
        self.sudoers_dir.join(ALIAS_FILE_NAME)
    }

    pub fn hardening_file(&self) -> PathBuf {
        self.sudoers_dir.join(HARDENING_FILE_NAME)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.sudoers_dir.join(LOCK_FILE_NAME)
    }

    pub fn rule_file(&self, principal: &Principal) -> PathBuf {
        self.sudoers_dir.join(principal.file_name())
    }
}

impl Default for SudoPaths {
    fn default() -> Self {
        Self::new(&PathsConfig::default())
    }
}

/// Whether a rule-directory file name is infrastructure (aliases, hardening)
pub fn is_infrastructure(name: &str) -> bool {
    INFRA_PREFIXES.iter().any(|p| name.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let paths = SudoPaths::default();
        assert_eq!(
            paths.alias_file(),
            PathBuf::from("/etc/sudoers.d/00-managed-aliases")
        );
        assert_eq!(
            paths.hardening_file(),
            PathBuf::from("/etc/sudoers.d/05-hardening")
        );
    }

    #[test]
    fn test_rule_file_names() {
        let paths = SudoPaths::default();
        assert_eq!(
            paths.rule_file(&Principal::User("alice".to_string())),
            PathBuf::from("/etc/sudoers.d/alice")
        );
        assert_eq!(
            paths.rule_file(&Principal::Group("devs".to_string())),
            PathBuf::from("/etc/sudoers.d/10-group-devs")
        );
    }

    #[test]
    fn test_infrastructure_names() {
        assert!(is_infrastructure(ALIAS_FILE_NAME));
        assert!(is_infrastructure(HARDENING_FILE_NAME));
        assert!(!is_infrastructure("alice"));
        assert!(!is_infrastructure("10-group-devs"));
    }
}
