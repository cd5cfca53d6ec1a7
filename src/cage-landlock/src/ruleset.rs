//! The shared ruleset and path-beneath rule registration.
//!
//! One [`RulesetManager`] exists per confinement session. It creates the
//! kernel ruleset on the first rule, handles [`handled_access`], and hands
//! the descriptor to the finalizer when the policy is committed.

use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use landlock::{
    CompatLevel, Compatible, PathBeneath, Ruleset, RulesetAttr, RulesetCreated,
    RulesetCreatedAttr,
};
use serde::{Deserialize, Serialize};

use crate::access::{AccessClass, AccessMask, RestrictFlags, handled_access};
use crate::error::{LandlockError, Result};
use crate::sys;

/// Rights granted beneath one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRule {
    pub path: PathBuf,
    #[serde(with = "access_bits")]
    pub access: AccessMask,
}

impl PathRule {
    pub fn new(path: impl Into<PathBuf>, access: AccessMask) -> Self {
        Self {
            path: path.into(),
            access,
        }
    }

    pub fn for_class(class: AccessClass, path: impl Into<PathBuf>) -> Self {
        Self::new(path, class.access())
    }
}

mod access_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::access::{AccessMask, handled_access};

    pub fn serialize<S: Serializer>(access: &AccessMask, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(access.bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<AccessMask, D::Error> {
        let bits = u64::deserialize(deserializer)?;
        AccessMask::from_bits(bits)
            .ok()
            .filter(|access| handled_access().contains(*access))
            .ok_or_else(|| serde::de::Error::custom(format!("unhandled access bits {bits:#x}")))
    }
}

/// Anything rules can be registered against.
///
/// The default policy and directive dispatch only need this, which keeps
/// them independent of the kernel.
pub trait RuleSink {
    fn add_rule(&mut self, rule: &PathRule) -> Result<()>;
}

enum Slot {
    Empty,
    /// `fd` duplicates the ruleset's descriptor; it is what gets committed.
    Open {
        ruleset: RulesetCreated,
        fd: OwnedFd,
    },
    /// Creation failed; the ruleset stays unusable.
    Failed(io::ErrorKind, String),
    Committed,
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Empty => f.write_str("Empty"),
            Slot::Open { fd, .. } => f.debug_tuple("Open").field(fd).finish(),
            Slot::Failed(kind, message) => {
                f.debug_tuple("Failed").field(kind).field(message).finish()
            }
            Slot::Committed => f.write_str("Committed"),
        }
    }
}

/// Owner of the session's single ruleset.
#[derive(Debug)]
pub struct RulesetManager {
    slot: Slot,
    rules: usize,
}

impl Default for RulesetManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RulesetManager {
    pub fn new() -> Self {
        Self {
            slot: Slot::Empty,
            rules: 0,
        }
    }

    /// Create the ruleset on first use and return its descriptor.
    pub fn ensure(&mut self) -> Result<BorrowedFd<'_>> {
        self.open()?;
        match &self.slot {
            Slot::Open { fd, .. } => Ok(fd.as_fd()),
            _ => Err(LandlockError::RulesetCommitted),
        }
    }

    fn open(&mut self) -> Result<&mut RulesetCreated> {
        if let Slot::Empty = self.slot {
            match create_ruleset() {
                Ok((ruleset, fd)) => {
                    tracing::debug!(
                        fd = fd.as_raw_fd(),
                        handled = ?handled_access(),
                        "Landlock ruleset created"
                    );
                    self.slot = Slot::Open { ruleset, fd };
                }
                Err(e) => {
                    self.slot = Slot::Failed(e.kind(), e.to_string());
                    return Err(LandlockError::RulesetCreation(e));
                }
            }
        }

        match &mut self.slot {
            Slot::Open { ruleset, .. } => Ok(ruleset),
            Slot::Failed(kind, message) => Err(creation_failed(*kind, message)),
            Slot::Committed => Err(LandlockError::RulesetCommitted),
            Slot::Empty => unreachable!("ruleset slot filled above"),
        }
    }

    /// Register one path-beneath rule.
    pub fn add(&mut self, class: AccessClass, path: &Path) -> Result<()> {
        self.add_rule(&PathRule::for_class(class, path))
    }

    /// Whether creation has been attempted, successfully or not.
    pub fn is_created(&self) -> bool {
        !matches!(self.slot, Slot::Empty)
    }

    /// Whether a ruleset has been created and not yet committed.
    pub fn is_open(&self) -> bool {
        matches!(self.slot, Slot::Open { .. })
    }

    pub fn is_committed(&self) -> bool {
        matches!(self.slot, Slot::Committed)
    }

    /// Raw descriptor of the open ruleset, for inspection.
    pub fn raw_fd(&self) -> Option<RawFd> {
        match &self.slot {
            Slot::Open { fd, .. } => Some(fd.as_raw_fd()),
            _ => None,
        }
    }

    /// Number of rules the kernel accepted.
    pub fn rule_count(&self) -> usize {
        self.rules
    }

    /// Commit the ruleset to the calling thread and close it.
    ///
    /// `no_new_privs` must already be set. On failure the ruleset stays
    /// open.
    pub(crate) fn restrict_self(&mut self, flags: RestrictFlags) -> Result<()> {
        match &self.slot {
            Slot::Open { fd, .. } => {
                sys::restrict_self(fd.as_fd(), flags).map_err(LandlockError::Finalization)?;
            }
            Slot::Empty => {
                return Err(LandlockError::RulesetCreation(io::Error::new(
                    io::ErrorKind::NotFound,
                    "no Landlock ruleset was created",
                )));
            }
            Slot::Failed(kind, message) => return Err(creation_failed(*kind, message)),
            Slot::Committed => return Err(LandlockError::RulesetCommitted),
        }
        // Replacing the slot drops, and so closes, both descriptors.
        self.slot = Slot::Committed;
        Ok(())
    }
}

impl RuleSink for RulesetManager {
    fn add_rule(&mut self, rule: &PathRule) -> Result<()> {
        debug_assert!(handled_access().contains(rule.access));

        let ruleset = self.open()?;
        let anchor = open_path(&rule.path)?;
        // The rule owns `anchor` and closes it whether or not the kernel accepts it.
        ruleset
            .add_rule(PathBeneath::new(anchor, rule.access))
            .map_err(|source| LandlockError::AddRule {
                path: rule.path.clone(),
                source,
            })?;

        self.rules += 1;
        tracing::debug!(
            path = %rule.path.display(),
            access = ?rule.access,
            "Landlock rule added"
        );
        Ok(())
    }
}

/// Create a ruleset handling [`handled_access`] and duplicate its descriptor.
fn create_ruleset() -> io::Result<(RulesetCreated, OwnedFd)> {
    let ruleset = Ruleset::default()
        .set_compatibility(CompatLevel::HardRequirement)
        .handle_access(handled_access())
        .and_then(Ruleset::create)
        .map_err(io::Error::other)?;

    let fd: Option<OwnedFd> = ruleset.try_clone()?.into();
    let fd = fd.ok_or_else(|| {
        io::Error::new(io::ErrorKind::Unsupported, "Landlock ruleset is not enforced")
    })?;
    Ok((ruleset, fd))
}

fn creation_failed(kind: io::ErrorKind, message: &str) -> LandlockError {
    LandlockError::RulesetCreation(io::Error::new(kind, message.to_string()))
}

/// Open `path` with O_PATH | O_CLOEXEC: a namespace anchor, no file contents.
fn open_path(path: &Path) -> Result<OwnedFd> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_PATH)
        .open(path)
        .map(OwnedFd::from)
        .map_err(|source| LandlockError::OpenPath {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_manager_is_empty() {
        let manager = RulesetManager::new();
        assert!(!manager.is_open());
        assert!(!manager.is_committed());
        assert_eq!(manager.raw_fd(), None);
        assert_eq!(manager.rule_count(), 0);
    }

    #[test]
    fn test_path_rule_for_class() {
        let rule = PathRule::for_class(AccessClass::Execute, "/usr/bin");
        assert_eq!(rule.path, PathBuf::from("/usr/bin"));
        assert_eq!(rule.access, AccessMask::from(landlock::AccessFs::Execute));
    }

    #[test]
    fn test_path_rule_serializes_access_bits() {
        let rule = PathRule::for_class(AccessClass::Read, "/");
        let json = serde_json::to_string(&rule).unwrap();
        assert_eq!(json, r#"{"path":"/","access":12}"#);
        let back: PathRule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rule);
        assert!(serde_json::from_str::<PathRule>(r#"{"path":"/","access":65536}"#).is_err());
        // Refer is a known right, but not one the ruleset handles.
        assert!(serde_json::from_str::<PathRule>(r#"{"path":"/","access":8192}"#).is_err());
    }

    #[test]
    fn test_open_path_nonexistent() {
        let err = open_path(Path::new("/nonexistent/cage-landlock")).unwrap_err();
        assert!(err.is_rule_failure());
    }

    #[test]
    fn test_open_path_directory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("anchor");
        std::fs::write(&file, b"x").unwrap();
        assert!(open_path(dir.path()).is_ok());
        assert!(open_path(&file).is_ok());
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let mut manager = RulesetManager::new();
        let first = match manager.ensure() {
            Ok(fd) => fd.as_raw_fd(),
            Err(e) => {
                eprintln!("SKIP: Landlock not available: {e}");
                return;
            }
        };
        let second = manager.ensure().unwrap().as_raw_fd();
        assert_eq!(first, second);
        assert_eq!(manager.raw_fd(), Some(first));
    }

    #[test]
    fn test_creation_failure_is_sticky() {
        let mut manager = RulesetManager::new();
        if manager.ensure().is_ok() {
            return;
        }
        assert!(matches!(
            manager.ensure(),
            Err(LandlockError::RulesetCreation(_))
        ));
        assert!(!manager.is_open());
    }

    #[test]
    fn test_bad_path_does_not_poison_ruleset() {
        let mut manager = RulesetManager::new();
        if manager.ensure().is_err() {
            eprintln!("SKIP: Landlock not available");
            return;
        }
        let dir = tempfile::tempdir().unwrap();

        let err = manager
            .add(AccessClass::Read, Path::new("/nonexistent/cage-landlock"))
            .unwrap_err();
        assert!(err.is_rule_failure());

        manager.add(AccessClass::Write, dir.path()).unwrap();
        assert_eq!(manager.rule_count(), 1);
        assert!(manager.is_open());
    }
}
