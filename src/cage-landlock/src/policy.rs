//! The baseline allow-list applied to every confined session.
//!
//! In order:
//! 1. read and write (without special nodes) beneath the home directory
//! 2. read and special-node creation beneath `/`
//! 3. write beneath `/tmp`, `/dev`, `/run/shm` and `/run/user/<uid>`
//! 4. execute beneath the standard binary and library directories
//!
//! Every rule is attempted even when earlier ones fail, so a system without
//! `/lib32` still gets the rest of the baseline.

use std::path::{Path, PathBuf};

use crate::access::{AccessClass, home_access};
use crate::error::{LandlockError, Result};
use crate::ruleset::{PathRule, RuleSink};

/// Runtime directory of the confinement tool itself.
pub const DEFAULT_RUNTIME_DIR: &str = "/run/cage";

const WRITABLE_SYSTEM_DIRS: &[&str] = &["/tmp", "/dev", "/run/shm"];

const EXECUTABLE_DIRS: &[&str] = &[
    "/opt",
    "/bin",
    "/sbin",
    "/lib",
    "/lib32",
    "/libx32",
    "/lib64",
    "/usr/bin",
    "/usr/sbin",
    "/usr/games",
    "/usr/lib",
    "/usr/lib32",
    "/usr/libx32",
    "/usr/lib64",
    "/usr/local/bin",
    "/usr/local/sbin",
    "/usr/local/games",
    "/usr/local/lib",
];

/// Baseline policy for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultPolicy {
    home_dir: PathBuf,
    uid: u32,
    runtime_dir: PathBuf,
}

impl DefaultPolicy {
    pub fn new(home_dir: impl Into<PathBuf>, uid: u32) -> Result<Self> {
        let home_dir = home_dir.into();
        if home_dir.as_os_str().is_empty() {
            return Err(LandlockError::EmptyHomeDir);
        }
        Ok(Self {
            home_dir,
            uid,
            runtime_dir: PathBuf::from(DEFAULT_RUNTIME_DIR),
        })
    }

    /// Replace the tool runtime directory granted execute access.
    pub fn with_runtime_dir(mut self, runtime_dir: impl Into<PathBuf>) -> Self {
        self.runtime_dir = runtime_dir.into();
        self
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    /// `/run/user/<uid>`.
    pub fn user_runtime_dir(&self) -> PathBuf {
        PathBuf::from(format!("/run/user/{}", self.uid))
    }

    /// The baseline rules in application order.
    pub fn rules(&self) -> Vec<PathRule> {
        let mut rules = vec![
            PathRule::new(&self.home_dir, home_access()),
            PathRule::for_class(AccessClass::Read, "/"),
            PathRule::for_class(AccessClass::Special, "/"),
        ];

        rules.extend(
            WRITABLE_SYSTEM_DIRS
                .iter()
                .map(PathBuf::from)
                .chain(std::iter::once(self.user_runtime_dir()))
                .map(|dir| PathRule::for_class(AccessClass::Write, dir)),
        );

        rules.extend(
            EXECUTABLE_DIRS
                .iter()
                .map(PathBuf::from)
                .chain(std::iter::once(self.runtime_dir.clone()))
                .map(|dir| PathRule::for_class(AccessClass::Execute, dir)),
        );

        rules
    }

    /// Register every baseline rule with `sink`.
    ///
    /// Per-rule failures are logged and collected; the call fails with
    /// [`LandlockError::DefaultPolicy`] only after all rules were attempted.
    /// A failure of the ruleset itself is returned immediately.
    pub fn apply(&self, sink: &mut impl RuleSink) -> Result<()> {
        let rules = self.rules();
        let mut failures = Vec::new();

        for rule in &rules {
            match sink.add_rule(rule) {
                Ok(()) => {}
                Err(e) if e.is_rule_failure() => {
                    tracing::warn!("{}", e);
                    failures.push(e);
                }
                Err(e) => return Err(e),
            }
        }

        if failures.is_empty() {
            tracing::debug!(rules = rules.len(), "Default Landlock policy applied");
            return Ok(());
        }

        let err = LandlockError::DefaultPolicy {
            attempted: rules.len(),
            failures,
        };
        tracing::error!("{}", err);
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::io;

    /// Records rules, failing for configured paths.
    #[derive(Default)]
    struct RecordingSink {
        missing: HashSet<PathBuf>,
        attempted: Vec<PathRule>,
        registered: Vec<PathRule>,
    }

    impl RecordingSink {
        fn missing(paths: &[&str]) -> Self {
            Self {
                missing: paths.iter().map(PathBuf::from).collect(),
                ..Default::default()
            }
        }
    }

    impl RuleSink for RecordingSink {
        fn add_rule(&mut self, rule: &PathRule) -> Result<()> {
            self.attempted.push(rule.clone());
            if self.missing.contains(&rule.path) {
                return Err(LandlockError::OpenPath {
                    path: rule.path.clone(),
                    source: io::Error::new(io::ErrorKind::NotFound, "missing"),
                });
            }
            self.registered.push(rule.clone());
            Ok(())
        }
    }

    fn policy() -> DefaultPolicy {
        DefaultPolicy::new("/home/alice", 1000).unwrap()
    }

    #[test]
    fn test_empty_home_rejected() {
        assert!(matches!(
            DefaultPolicy::new("", 1000),
            Err(LandlockError::EmptyHomeDir)
        ));
    }

    #[test]
    fn test_rule_order() {
        let rules = policy().rules();
        let paths: Vec<_> = rules.iter().map(|r| r.path.to_str().unwrap()).collect();
        assert_eq!(
            &paths[..7],
            &["/home/alice", "/", "/", "/tmp", "/dev", "/run/shm", "/run/user/1000"]
        );
        assert_eq!(paths[7], "/opt");
        assert_eq!(*paths.last().unwrap(), DEFAULT_RUNTIME_DIR);
        assert_eq!(rules.len(), 7 + EXECUTABLE_DIRS.len() + 1);
    }

    #[test]
    fn test_rule_access_classes() {
        let rules = policy().rules();
        assert_eq!(rules[0].access, home_access());
        assert_eq!(rules[1].access, AccessClass::Read.access());
        assert_eq!(rules[2].access, AccessClass::Special.access());
        for rule in &rules[3..7] {
            assert_eq!(rule.access, AccessClass::Write.access());
        }
        for rule in &rules[7..] {
            assert_eq!(rule.access, AccessClass::Execute.access());
        }
    }

    #[test]
    fn test_no_duplicate_execute_dirs() {
        let unique: HashSet<_> = EXECUTABLE_DIRS.iter().collect();
        assert_eq!(unique.len(), EXECUTABLE_DIRS.len());
    }

    #[test]
    fn test_runtime_dirs() {
        let policy = DefaultPolicy::new("/root", 0)
            .unwrap()
            .with_runtime_dir("/run/other");
        assert_eq!(policy.user_runtime_dir(), PathBuf::from("/run/user/0"));
        let last = policy.rules().pop().unwrap();
        assert_eq!(last, PathRule::for_class(AccessClass::Execute, "/run/other"));
    }

    #[test]
    fn test_apply_all_succeed() {
        let mut sink = RecordingSink::default();
        policy().apply(&mut sink).unwrap();
        assert_eq!(sink.registered, policy().rules());
    }

    #[test]
    fn test_missing_directory_does_not_short_circuit() {
        let mut sink = RecordingSink::missing(&["/lib32"]);
        let err = policy().apply(&mut sink).unwrap_err();

        let rules = policy().rules();
        assert_eq!(sink.attempted, rules);
        assert_eq!(sink.registered.len(), rules.len() - 1);
        assert!(sink.registered.iter().all(|r| r.path != Path::new("/lib32")));

        match err {
            LandlockError::DefaultPolicy {
                attempted,
                failures,
            } => {
                assert_eq!(attempted, rules.len());
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].path(), Some(&PathBuf::from("/lib32")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_first_rule_failure_still_attempts_rest() {
        let mut sink = RecordingSink::missing(&["/home/alice", "/run/user/1000"]);
        let err = policy().apply(&mut sink).unwrap_err();
        assert_eq!(sink.attempted.len(), policy().rules().len());
        assert!(matches!(
            err,
            LandlockError::DefaultPolicy { ref failures, .. } if failures.len() == 2
        ));
    }

    struct BrokenRuleset {
        calls: usize,
    }

    impl RuleSink for BrokenRuleset {
        fn add_rule(&mut self, _rule: &PathRule) -> Result<()> {
            self.calls += 1;
            Err(LandlockError::RulesetCreation(io::Error::from_raw_os_error(38)))
        }
    }

    #[test]
    fn test_ruleset_failure_propagates() {
        let mut sink = BrokenRuleset { calls: 0 };
        let err = policy().apply(&mut sink).unwrap_err();
        assert!(matches!(err, LandlockError::RulesetCreation(_)));
        assert_eq!(sink.calls, 1);
    }
}
