//! Sudoers policy compiler
//!
//! This module turns structured rule and alias edits into validated sudoers
//! fragments under a STIG-style hardening policy, and parses managed
//! fragments back into structured data. No text reaches the live rule
//! directory without passing token validation and the external syntax
//! checker.

pub mod aliases;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod groups;
pub mod paths;
pub mod reader;
pub mod render;
pub mod types;
pub mod validate;
pub mod writer;

// Re-export commonly used types
pub use self::aliases::UserAliases;
pub use self::config::{
    CheckerConfig, GroupPolicyConfig, HardeningConfig, ManagerConfig, PathsConfig,
};
pub use self::dispatch::{dispatch, OPERATIONS};
pub use self::errors::{ManagerError, PolicyResult};
pub use self::groups::{GroupCatalog, GroupInfo};
pub use self::paths::SudoPaths;
pub use self::reader::{ListWarning, RuleListing};
pub use self::types::{
    AliasDef, AliasType, Catalog, CatalogEntry, CommandAlias, CommandSpec, Principal, RuleFlags,
    SudoRule,
};
pub use self::writer::Publisher;
