//! A confinement session: one ruleset, one directive list, one commit.
//!
//! ```text
//!  Disabled ──────────────► (no-op)
//!  Building ── restrict ──► Restricted
//!      ▲           │
//!      └─ failure ─┘   (ruleset stays open)
//! ```

use std::os::fd::RawFd;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::access::{AccessClass, RestrictFlags};
use crate::directive::{Directive, DirectiveList};
use crate::error::{LandlockError, Result};
use crate::policy::DefaultPolicy;
use crate::probe::KernelSupport;
use crate::ruleset::RulesetManager;
use crate::sys;

/// Where the process stands with respect to Landlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfinementState {
    /// The kernel lacks Landlock; every operation is a no-op.
    Disabled,
    /// Rules are being collected.
    Building,
    /// The ruleset has been committed. Irreversible.
    Restricted,
}

/// Outcome of registering the directive list.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Directives the kernel accepted.
    pub registered: Vec<Directive>,
    /// Directives whose path did not exist.
    pub skipped: Vec<Directive>,
    /// Directives that could not be registered.
    pub failed: Vec<(Directive, LandlockError)>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Landlock policy for the current process.
#[derive(Debug)]
pub struct ConfinementSession {
    state: ConfinementState,
    kernel: Option<KernelSupport>,
    ruleset: RulesetManager,
    directives: DirectiveList,
}

impl ConfinementSession {
    /// Probe the kernel and start a session.
    ///
    /// Only an unparsable kernel release is an error. An old kernel, or one
    /// without Landlock active, yields a [`ConfinementState::Disabled`]
    /// session.
    pub fn new() -> Result<Self> {
        let kernel = KernelSupport::detect()?;
        if kernel.is_supported() {
            tracing::debug!(
                release = %kernel.release,
                abi = ?kernel.abi,
                "Landlock supported"
            );
        }
        Ok(Self::with_kernel(Some(kernel)))
    }

    /// Start a session with an already-made support decision.
    pub fn with_support(supported: bool) -> Self {
        let mut session = Self::with_kernel(None);
        if !supported {
            session.disable();
        }
        session
    }

    fn with_kernel(kernel: Option<KernelSupport>) -> Self {
        let supported = kernel.as_ref().is_none_or(KernelSupport::is_supported);
        let mut session = Self {
            state: ConfinementState::Building,
            kernel,
            ruleset: RulesetManager::new(),
            directives: DirectiveList::new(),
        };
        if !supported {
            session.disable();
        }
        session
    }

    fn disable(&mut self) {
        tracing::warn!("{}", LandlockError::Unsupported);
        self.state = ConfinementState::Disabled;
    }

    pub fn state(&self) -> ConfinementState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state != ConfinementState::Disabled
    }

    /// Probe results, when the session probed the kernel itself.
    pub fn kernel(&self) -> Option<&KernelSupport> {
        self.kernel.as_ref()
    }

    /// Descriptor of the open ruleset, if one exists and is uncommitted.
    pub fn ruleset_fd(&self) -> Option<RawFd> {
        self.ruleset.raw_fd()
    }

    /// Number of rules registered so far.
    pub fn rule_count(&self) -> usize {
        self.ruleset.rule_count()
    }

    /// Pending directives.
    pub fn directives(&self) -> &DirectiveList {
        &self.directives
    }

    /// Queue a directive; it is registered during [`Self::restrict`].
    pub fn push_directive(&mut self, directive: Directive) {
        self.directives.push(directive);
    }

    pub fn extend_directives(&mut self, directives: impl IntoIterator<Item = Directive>) {
        self.directives.extend(directives);
    }

    /// Register a single rule right away.
    pub fn add_rule(&mut self, class: AccessClass, path: &Path) -> Result<()> {
        match self.state {
            ConfinementState::Disabled => Err(LandlockError::Unsupported),
            ConfinementState::Restricted => Err(LandlockError::RulesetCommitted),
            ConfinementState::Building => self.ruleset.add(class, path),
        }
    }

    /// Apply the baseline policy for `home_dir` and the calling user.
    pub fn apply_defaults(&mut self, home_dir: &Path) -> Result<()> {
        let uid = unsafe { libc::getuid() };
        let policy = DefaultPolicy::new(home_dir, uid)?;
        self.apply_policy(&policy)
    }

    /// Apply a prepared baseline policy.
    pub fn apply_policy(&mut self, policy: &DefaultPolicy) -> Result<()> {
        match self.state {
            ConfinementState::Disabled => Ok(()),
            ConfinementState::Restricted => Err(LandlockError::RulesetCommitted),
            ConfinementState::Building => policy.apply(&mut self.ruleset),
        }
    }

    /// Register the pending directives, oldest first, and empty the list.
    ///
    /// Directives naming a path that does not exist are skipped. A directive
    /// the kernel rejects is logged and the rest are still registered.
    pub fn apply_directives(&mut self) -> DispatchReport {
        let directives = std::mem::take(&mut self.directives);
        let mut report = DispatchReport::default();
        if self.state != ConfinementState::Building {
            return report;
        }

        let mut directives = directives.into_iter();
        for directive in directives.by_ref() {
            if !directive.path.exists() {
                tracing::warn!(
                    "Skipping Landlock rule for {}: path does not exist",
                    directive.path.display()
                );
                report.skipped.push(directive);
                continue;
            }

            match self.ruleset.add(directive.class, &directive.path) {
                Ok(()) => report.registered.push(directive),
                Err(e) if e.is_rule_failure() => {
                    tracing::warn!("{}", e);
                    report.failed.push((directive, e));
                }
                Err(e) => {
                    // The ruleset itself is unusable; later directives would fail the same way.
                    tracing::error!("{}", e);
                    report.failed.push((directive, e));
                    break;
                }
            }
        }
        let remaining = directives.count();
        if remaining > 0 {
            tracing::debug!(remaining, "Landlock directives not attempted");
        }

        report
    }

    /// Register the directives, set `no_new_privs`, and commit the ruleset
    /// to the calling thread with `flags`.
    ///
    /// On an unsupported kernel this returns `Ok` without touching the
    /// process. If no ruleset was ever created there is nothing to commit
    /// and the process is left alone as well.
    ///
    /// On failure the ruleset stays open and the session stays
    /// [`ConfinementState::Building`]. A [`LandlockError::Finalization`]
    /// error means `no_new_privs` is already set and cannot be undone.
    pub fn restrict(&mut self, flags: RestrictFlags) -> Result<DispatchReport> {
        match self.state {
            ConfinementState::Disabled => {
                let report = self.apply_directives();
                tracing::debug!("Landlock disabled, not restricting");
                return Ok(report);
            }
            ConfinementState::Restricted => return Err(LandlockError::RulesetCommitted),
            ConfinementState::Building => {}
        }

        let report = self.apply_directives();

        if !self.ruleset.is_created() {
            tracing::debug!("No Landlock rules registered, nothing to commit");
            return Ok(report);
        }
        // Surface a failed creation before the irreversible prctl.
        self.ruleset.ensure()?;

        sys::set_no_new_privs().map_err(LandlockError::NoNewPrivs)?;
        self.ruleset.restrict_self(flags)?;

        self.state = ConfinementState::Restricted;
        tracing::info!(
            rules = self.ruleset.rule_count(),
            "Landlock ruleset committed"
        );
        Ok(report)
    }
}
