//! Error types for building and committing a Landlock policy.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for Landlock policy operations.
pub type Result<T> = std::result::Result<T, LandlockError>;

/// Errors that can occur while building or committing the policy.
#[derive(Debug, Error)]
pub enum LandlockError {
    /// The kernel is too old or the Landlock syscalls are unavailable.
    #[error("Landlock not enabled, a 6.1 or newer Linux kernel with Landlock active is required")]
    Unsupported,

    /// The kernel release string has no `major.minor` prefix.
    #[error("cannot extract Linux kernel version from {release:?}")]
    VersionUnparsable { release: String },

    /// The rule's anchor path could not be opened.
    #[error("cannot open {} for a Landlock rule: {source}", .path.display())]
    OpenPath {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The kernel rejected the rule.
    #[error("failed to add Landlock rule for {}: {source}", .path.display())]
    AddRule {
        path: PathBuf,
        #[source]
        source: landlock::RulesetError,
    },

    /// The shared ruleset could not be created.
    #[error("landlock_create_ruleset failed: {0}")]
    RulesetCreation(#[source] io::Error),

    /// The ruleset has already been committed to this process.
    #[error("Landlock ruleset already committed")]
    RulesetCommitted,

    /// `PR_SET_NO_NEW_PRIVS` could not be set.
    #[error("PR_SET_NO_NEW_PRIVS failed: {0}")]
    NoNewPrivs(#[source] io::Error),

    /// `landlock_restrict_self` failed after `no_new_privs` was set.
    #[error("landlock_restrict_self failed: {0}")]
    Finalization(#[source] io::Error),

    /// One or more default rules could not be registered.
    #[error("cannot set the basic Landlock filesystem ({} of {attempted} rules failed)", .failures.len())]
    DefaultPolicy {
        attempted: usize,
        failures: Vec<LandlockError>,
    },

    /// A textual directive did not name one of the four known kinds.
    #[error("invalid Landlock directive: {0}")]
    InvalidDirective(String),

    /// The home directory handed to the default policy was empty.
    #[error("home directory must not be empty")]
    EmptyHomeDir,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl LandlockError {
    /// Whether no safe continuation exists for this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::VersionUnparsable { .. })
    }

    /// Whether this is a single-rule failure that callers log and skip.
    pub fn is_rule_failure(&self) -> bool {
        matches!(self, Self::OpenPath { .. } | Self::AddRule { .. })
    }

    /// The path a rule failure refers to, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::OpenPath { path, .. } | Self::AddRule { path, .. } => Some(path),
            _ => None,
        }
    }
}
