//! Error handling for the sudoers policy compiler

use std::error::Error;
use std::fmt;

/// Result type for policy operations
pub type PolicyResult<T> = Result<T, ManagerError>;

/// Policy compiler error types
#[derive(Debug)]
pub enum ManagerError {
    /// Malformed or duplicate catalog content; fatal to loading that catalog
    Catalog(String),

    /// Request rejected before any file was touched
    Validation(String),

    /// The external syntax checker rejected the candidate configuration
    Syntax {
        file: String,
        diagnostic: String,
    },

    /// Alias name collision between user-declared and auto-compiled aliases
    AliasConflict {
        alias_type: String,
        name: String,
    },

    /// Filesystem, lock, or checker-invocation failure
    Io(std::io::Error),

    /// Payload could not be decoded
    Serialization(serde_json::Error),

    /// Unknown operation or malformed invocation
    Usage(String),
}

impl ManagerError {
    /// Create a catalog error
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a syntax-checker error
    pub fn syntax(file: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self::Syntax {
            file: file.into(),
            diagnostic: diagnostic.into(),
        }
    }

    /// Create an alias conflict error
    pub fn alias_conflict(alias_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AliasConflict {
            alias_type: alias_type.into(),
            name: name.into(),
        }
    }

    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Stable kind tag used in the JSON error shape sent to the UI
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Catalog(_) => "CatalogError",
            Self::Validation(_) => "ValidationError",
            Self::Syntax { .. } => "SyntaxError",
            Self::AliasConflict { .. } => "AliasConflict",
            Self::Io(_) => "IOError",
            Self::Serialization(_) => "ValidationError",
            Self::Usage(_) => "UsageError",
        }
    }
}

impl fmt::Display for ManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catalog(msg) => write!(f, "Catalog error: {}", msg),
            Self::Validation(msg) => write!(f, "Validation failed: {}", msg),
            Self::Syntax { file, diagnostic } => {
                write!(f, "Syntax check failed for '{}': {}", file, diagnostic)
            }
            Self::AliasConflict { alias_type, name } => {
                write!(
                    f,
                    "{} '{}' collides with an auto-compiled catalog alias",
                    alias_type, name
                )
            }
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Serialization(e) => write!(f, "Invalid payload: {}", e),
            Self::Usage(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error for ManagerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ManagerError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<serde_json::Error> for ManagerError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error)
    }
}
