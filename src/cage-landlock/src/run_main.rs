//! Main entry point for the Landlock wrapper.

use std::ffi::CString;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::access::RestrictFlags;
use crate::directive::{Directive, DirectiveList};
use crate::error::LandlockError;
use crate::policy::{DEFAULT_RUNTIME_DIR, DefaultPolicy};
use crate::probe::KernelSupport;
use crate::ruleset::PathRule;
use crate::session::{ConfinementSession, ConfinementState};

/// Command line arguments for the Landlock wrapper.
#[derive(Debug, Parser)]
#[clap(name = "cage-landlock", about = "Run a command under a Landlock allow-list")]
pub struct LandlockArgs {
    /// Home directory granted read/write by the default policy.
    #[arg(long = "home", env = "HOME", required_unless_present = "no_defaults")]
    pub home: Option<PathBuf>,

    /// Directive of the form "landlock.<read|write|special|execute> <path>".
    /// Applied after profile directives, in the order given.
    #[arg(long = "rule", value_name = "DIRECTIVE")]
    pub rules: Vec<Directive>,

    /// Profile file whose landlock.* lines are applied in file order.
    #[arg(long = "profile", value_name = "FILE")]
    pub profiles: Vec<PathBuf>,

    /// Do not apply the default policy.
    #[arg(long = "no-defaults")]
    pub no_defaults: bool,

    /// Tool runtime directory granted execute access by the default policy.
    #[arg(long = "runtime-dir", default_value = DEFAULT_RUNTIME_DIR)]
    pub runtime_dir: PathBuf,

    /// Raw flags for landlock_restrict_self.
    #[arg(long = "restrict-flags", default_value_t = 0)]
    pub restrict_flags: u32,

    /// Print the planned policy as JSON and exit without restricting.
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Log filter used when CAGE_LOG is not set.
    #[arg(long = "log-level", default_value = "warn")]
    pub log_level: String,

    /// Command and arguments to execute.
    #[arg(trailing_var_arg = true, required_unless_present = "dry_run")]
    pub command: Vec<String>,
}

/// What `--dry-run` prints.
#[derive(Debug, Serialize)]
struct PolicyPlan<'a> {
    kernel: Option<&'a KernelSupport>,
    state: ConfinementState,
    defaults: Vec<PathRule>,
    directives: &'a DirectiveList,
}

/// Main entry point.
pub fn run_main() -> ! {
    let args = LandlockArgs::parse();
    init_logging(&args.log_level);

    let directives = match collect_directives(&args) {
        Ok(directives) => directives,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };

    let mut session = match ConfinementSession::new() {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let defaults = if args.no_defaults {
        None
    } else {
        let uid = unsafe { libc::getuid() };
        match DefaultPolicy::new(args.home.clone().unwrap_or_default(), uid) {
            Ok(policy) => Some(policy.with_runtime_dir(&args.runtime_dir)),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    };

    if args.dry_run {
        let plan = PolicyPlan {
            kernel: session.kernel(),
            state: session.state(),
            defaults: defaults.as_ref().map(DefaultPolicy::rules).unwrap_or_default(),
            directives: &directives,
        };
        match serde_json::to_string_pretty(&plan) {
            Ok(json) => {
                println!("{json}");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    }

    session.extend_directives(directives);
    let flags = RestrictFlags::from_bits_retain(args.restrict_flags);
    if let Err(e) = apply_landlock_policy(&mut session, defaults.as_ref(), flags) {
        eprintln!("Failed to apply Landlock policy: {e:#}");
        std::process::exit(1);
    }

    exec_command(&args.command)
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_env("CAGE_LOG")
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Profile directives first, then `--rule` directives.
fn collect_directives(args: &LandlockArgs) -> Result<DirectiveList> {
    let mut directives = DirectiveList::new();
    for profile in &args.profiles {
        let text = std::fs::read_to_string(profile)
            .with_context(|| format!("cannot read profile {}", profile.display()))?;
        let count = directives
            .extend_from_profile(&text)
            .with_context(|| format!("invalid profile {}", profile.display()))?;
        tracing::debug!(profile = %profile.display(), count, "Profile directives loaded");
    }
    directives.extend(args.rules.iter().cloned());
    Ok(directives)
}

/// Build and commit the policy.
///
/// Per-rule failures in the default policy are already logged and do not
/// stop confinement. Anything that leaves the ruleset unusable does.
fn apply_landlock_policy(
    session: &mut ConfinementSession,
    defaults: Option<&DefaultPolicy>,
    flags: RestrictFlags,
) -> Result<()> {
    if let Some(policy) = defaults {
        match session.apply_policy(policy) {
            Ok(()) | Err(LandlockError::DefaultPolicy { .. }) => {}
            Err(e) => return Err(e).context("cannot apply the default Landlock policy"),
        }
    }

    let report = session.restrict(flags)?;
    if !report.is_clean() {
        tracing::warn!(
            failed = report.failed.len(),
            "Some Landlock directives could not be applied"
        );
    }
    if session.state() == ConfinementState::Restricted {
        tracing::debug!(
            registered = report.registered.len(),
            skipped = report.skipped.len(),
            "Landlock restriction complete"
        );
    }
    Ok(())
}

/// Execute the command using execvp.
fn exec_command(command: &[String]) -> ! {
    let c_args: Vec<CString> = match command
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect::<std::result::Result<Vec<_>, _>>()
    {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Invalid command: {e}");
            std::process::exit(1);
        }
    };
    let Some(program) = c_args.first() else {
        eprintln!("No command specified");
        std::process::exit(1);
    };

    let mut c_args_ptrs: Vec<*const libc::c_char> = c_args.iter().map(|arg| arg.as_ptr()).collect();
    c_args_ptrs.push(std::ptr::null());

    unsafe {
        libc::execvp(program.as_ptr(), c_args_ptrs.as_ptr());
    }

    // If execvp returns, there was an error
    let err = std::io::Error::last_os_error();
    eprintln!("Failed to execute {}: {}", command[0], err);
    std::process::exit(127)
}
