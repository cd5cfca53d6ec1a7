//! Landlock policy builder for the cage confinement tool.
//!
//! Builds an allow-list filesystem ruleset (a fixed baseline plus ordered
//! user directives) and commits it irreversibly to the calling process
//! before the confined workload starts. Enforcement after that point is
//! entirely the kernel's.
//!
//! ```rust,ignore
//! use cage_landlock::{ConfinementSession, Directive, RestrictFlags};
//!
//! let mut session = ConfinementSession::new()?;
//! session.apply_defaults(Path::new("/home/alice"))?;
//! session.push_directive("landlock.write /srv/data".parse::<Directive>()?);
//! session.restrict(RestrictFlags::empty())?;
//! ```

#[cfg(target_os = "linux")]
mod access;
#[cfg(target_os = "linux")]
mod directive;
#[cfg(target_os = "linux")]
mod error;
#[cfg(target_os = "linux")]
mod policy;
#[cfg(target_os = "linux")]
mod probe;
#[cfg(target_os = "linux")]
mod ruleset;
#[cfg(target_os = "linux")]
mod run_main;
#[cfg(target_os = "linux")]
mod session;
#[cfg(target_os = "linux")]
mod sys;

#[cfg(target_os = "linux")]
pub use access::{
    AccessClass, AccessFs, AccessMask, HANDLED_ABI, RestrictFlags, handled_access, home_access,
};
#[cfg(target_os = "linux")]
pub use directive::{DIRECTIVE_PREFIX, Directive, DirectiveList};
#[cfg(target_os = "linux")]
pub use error::{LandlockError, Result};
#[cfg(target_os = "linux")]
pub use policy::{DEFAULT_RUNTIME_DIR, DefaultPolicy};
#[cfg(target_os = "linux")]
pub use probe::{KernelSupport, KernelVersion, MIN_KERNEL, is_supported, kernel_release};
#[cfg(target_os = "linux")]
pub use ruleset::{PathRule, RuleSink, RulesetManager};
#[cfg(target_os = "linux")]
pub use session::{ConfinementSession, ConfinementState, DispatchReport};
#[cfg(target_os = "linux")]
pub use sys::no_new_privs;

/// Run the wrapper binary's main function.
#[cfg(target_os = "linux")]
pub fn run_main() -> ! {
    run_main::run_main()
}

#[cfg(not(target_os = "linux"))]
pub fn run_main() -> ! {
    eprintln!("cage-landlock is only supported on Linux");
    std::process::exit(1)
}
