//! TOML configuration for the policy compiler
//!
//! Every deployment-specific knob lives here so a site can adjust the
//! filesystem layout, hardening directives, checker invocation, and group
//! eligibility policy without patching code.

use crate::policy::errors::{ManagerError, PolicyResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Filesystem layout
    #[serde(default)]
    pub paths: PathsConfig,

    /// STIG-style hardening directives applied to every managed file
    #[serde(default)]
    pub hardening: HardeningConfig,

    /// External syntax checker invocation
    #[serde(default)]
    pub checker: CheckerConfig,

    /// Group eligibility policy for `group-catalog`
    #[serde(default)]
    pub groups: GroupPolicyConfig,
}

/// Filesystem layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Managed rule directory
    #[serde(default = "default_sudoers_dir")]
    pub sudoers_dir: PathBuf,

    /// Read-only catalog source directory
    #[serde(default = "default_catalog_dir")]
    pub catalog_dir: PathBuf,

    /// Optional registry of extra raw commands, one absolute path per line
    #[serde(default = "default_custom_commands")]
    pub custom_commands: PathBuf,
}

/// Hardening directives configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardeningConfig {
    /// Emit `Defaults env_reset`
    #[serde(default = "default_true")]
    pub env_reset: bool,

    /// Explicit `secure_path` value
    #[serde(default = "default_secure_path")]
    pub secure_path: String,

    /// Emit the per-principal `!ALL` guardrail stanza that neutralizes
    /// inherited vendor grants before the managed grant applies
    #[serde(default = "default_true")]
    pub guardrails: bool,
}

/// Syntax checker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerConfig {
    /// Checker argv; the candidate file path is appended
    #[serde(default = "default_checker_command")]
    pub command: Vec<String>,

    /// When set, the checker runs against a driver file that includes this
    /// base configuration plus the candidate fragment, so conflicts with
    /// existing directives are caught, not just fragment-local syntax
    #[serde(default = "default_combined_base")]
    pub combined_base: Option<PathBuf>,

    /// Set root:root on scratch files before validation. Disabled in tests
    /// that run unprivileged.
    #[serde(default = "default_true")]
    pub apply_ownership: bool,
}

/// Group eligibility policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupPolicyConfig {
    /// Groups at or above this gid are human/user groups, never principals
    #[serde(default = "default_gid_threshold")]
    pub human_gid_threshold: u32,

    /// Groups always eligible when present
    #[serde(default = "default_allowed_groups")]
    pub always_allow: Vec<String>,

    /// Groups never exposed as sudo principals
    #[serde(default = "default_excluded_groups")]
    pub exclude: Vec<String>,

    /// Name prefixes that are always excluded
    #[serde(default = "default_excluded_prefixes")]
    pub exclude_prefixes: Vec<String>,
}

impl ManagerConfig {
    /// Load configuration: an explicit path must exist and parse; otherwise
    /// the well-known path is used if present, else built-in defaults.
    pub fn load(explicit: Option<&Path>) -> PolicyResult<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from("/etc/sudo-manager/config.toml");
                if !default.is_file() {
                    tracing::debug!("no config file, using built-in defaults");
                    return Ok(Self::default());
                }
                default
            }
        };

        let raw = std::fs::read_to_string(&path)?;
        let config = Self::from_toml(&raw)
            .map_err(|e| ManagerError::usage(format!("invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        tracing::debug!(config = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Validate the configuration
    pub fn validate(&self) -> PolicyResult<()> {
        if self.checker.command.is_empty() {
            return Err(ManagerError::usage("checker.command must not be empty"));
        }
        if self.hardening.secure_path.is_empty() {
            return Err(ManagerError::usage("hardening.secure_path must not be empty"));
        }
        if self.hardening.secure_path.contains(char::is_whitespace) {
            return Err(ManagerError::usage(
                "hardening.secure_path must not contain whitespace",
            ));
        }
        Ok(())
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sudoers_dir: default_sudoers_dir(),
            catalog_dir: default_catalog_dir(),
            custom_commands: default_custom_commands(),
        }
    }
}

impl Default for HardeningConfig {
    fn default() -> Self {
        Self {
            env_reset: true,
            secure_path: default_secure_path(),
            guardrails: true,
        }
    }
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            command: default_checker_command(),
            combined_base: default_combined_base(),
            apply_ownership: true,
        }
    }
}

impl Default for GroupPolicyConfig {
    fn default() -> Self {
        Self {
            human_gid_threshold: default_gid_threshold(),
            always_allow: default_allowed_groups(),
            exclude: default_excluded_groups(),
            exclude_prefixes: default_excluded_prefixes(),
        }
    }
}

// Default value functions for serde

fn default_true() -> bool {
    true
}

fn default_sudoers_dir() -> PathBuf {
    PathBuf::from("/etc/sudoers.d")
}

fn default_catalog_dir() -> PathBuf {
    PathBuf::from("/usr/share/sudo-manager/sudo-commands.d")
}

fn default_custom_commands() -> PathBuf {
    PathBuf::from("/etc/sudo-manager/commands.local")
}

fn default_secure_path() -> String {
    "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin".to_string()
}

fn default_checker_command() -> Vec<String> {
    vec!["visudo".to_string(), "-cf".to_string()]
}

fn default_combined_base() -> Option<PathBuf> {
    Some(PathBuf::from("/etc/sudoers"))
}

fn default_gid_threshold() -> u32 {
    1000
}

fn default_allowed_groups() -> Vec<String> {
    ["wheel", "admin", "sudo", "users"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_excluded_groups() -> Vec<String> {
    [
        // Core system / daemon identities
        "daemon",
        "bin",
        "sys",
        "nobody",
        "nogroup",
        "mail",
        "maildrop",
        // systemd / IPC / policy services
        "messagebus",
        "polkitd",
        "systemd-journal",
        "systemd-coredump",
        "systemd-timesync",
        // Network / service daemons
        "postfix",
        "dnsmasq",
        "chrony",
        "sshd",
        "dirsrv",
        "tftp",
        // Hardware / kernel scoped groups
        "disk",
        "kmem",
        "kvm",
        "sgx",
        "tape",
        "audio",
        "video",
        "render",
        // Execution-context groups, not roles
        "wwwrun",
        "www",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_excluded_prefixes() -> Vec<String> {
    vec!["systemd-".to_string()]
}
