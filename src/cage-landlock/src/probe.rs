//! Kernel capability detection.
//!
//! Landlock is only used on kernels 6.1 and newer that also answer the ABI
//! version query. A 6.1+ kernel booted without Landlock in its LSM list
//! fails that query and counts as unsupported.

use std::ffi::CStr;
use std::fmt;
use std::io;

use serde::Serialize;

use crate::error::{LandlockError, Result};
use crate::sys;

/// Oldest kernel the policy is built on.
pub const MIN_KERNEL: KernelVersion = KernelVersion { major: 6, minor: 1 };

/// `major.minor` prefix of a kernel release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct KernelVersion {
    pub major: u32,
    pub minor: u32,
}

impl KernelVersion {
    /// Parse the leading `major.minor` of a release such as
    /// `6.8.0-45-generic`. Anything after the minor number is ignored.
    pub fn parse(release: &str) -> Result<Self> {
        let unparsable = || LandlockError::VersionUnparsable {
            release: release.to_string(),
        };

        let (major, rest) = leading_number(release.trim_start()).ok_or_else(unparsable)?;
        let rest = rest.strip_prefix('.').ok_or_else(unparsable)?;
        let (minor, _) = leading_number(rest).ok_or_else(unparsable)?;

        Ok(Self { major, minor })
    }

    pub fn supports_landlock(self) -> bool {
        self >= MIN_KERNEL
    }
}

impl fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

fn leading_number(s: &str) -> Option<(u32, &str)> {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(s.len(), |(i, _)| i);
    let value = s[..end].parse().ok()?;
    Some((value, &s[end..]))
}

/// What the running kernel offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KernelSupport {
    pub release: String,
    pub version: KernelVersion,
    /// Landlock ABI version, `None` when the query failed.
    pub abi: Option<u32>,
}

impl KernelSupport {
    /// Probe the running kernel.
    ///
    /// Fails only when the release string cannot be parsed; an old kernel is
    /// reported through [`KernelSupport::is_supported`].
    pub fn detect() -> Result<Self> {
        let release = kernel_release()?;
        let version = KernelVersion::parse(&release)?;
        let abi = match sys::abi_version() {
            Ok(abi) => Some(abi),
            Err(e) => {
                tracing::debug!("Landlock ABI query failed: {}", e);
                None
            }
        };
        Ok(Self {
            release,
            version,
            abi,
        })
    }

    pub fn is_supported(&self) -> bool {
        self.version.supports_landlock() && self.abi.is_some()
    }
}

/// Whether the running kernel is new enough for Landlock.
pub fn is_supported() -> Result<bool> {
    Ok(KernelSupport::detect()?.is_supported())
}

/// The `uname -r` string.
pub fn kernel_release() -> Result<String> {
    let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
    if unsafe { libc::uname(&mut uts) } != 0 {
        return Err(io::Error::last_os_error().into());
    }
    // SAFETY: uname NUL-terminates every field it fills.
    let release = unsafe { CStr::from_ptr(uts.release.as_ptr()) };
    Ok(release.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(release: &str) -> KernelVersion {
        KernelVersion::parse(release).unwrap()
    }

    #[test]
    fn test_parse_release_strings() {
        assert_eq!(parse("6.1.0"), KernelVersion { major: 6, minor: 1 });
        assert_eq!(parse("6.8.0-45-generic"), KernelVersion { major: 6, minor: 8 });
        assert_eq!(parse("5.15.153.1-microsoft-standard-WSL2").minor, 15);
        assert_eq!(parse("6.10-rc3"), KernelVersion { major: 6, minor: 10 });
    }

    #[test]
    fn test_version_threshold() {
        for release in ["4.19.0", "5.13.0", "5.19.17", "6.0.12", "6.0"] {
            assert!(!parse(release).supports_landlock(), "{release}");
        }
        for release in ["6.1", "6.1.0-13-amd64", "6.2.0", "6.18.44-fc", "7.0.0"] {
            assert!(parse(release).supports_landlock(), "{release}");
        }
    }

    #[test]
    fn test_minor_compares_numerically() {
        assert!(parse("6.10.0") > parse("6.9.0"));
        assert!(parse("10.0") > parse("6.1"));
    }

    #[test]
    fn test_malformed_release_is_fatal() {
        for release in ["", "linux", "6", "6.", "6-rc1", ".1", "x6.1", "99999999999.1"] {
            let err = KernelVersion::parse(release).unwrap_err();
            assert!(err.is_fatal(), "{release:?} should be fatal, got {err}");
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(MIN_KERNEL.to_string(), "6.1");
    }

    #[test]
    fn test_new_kernel_without_landlock_is_unsupported() {
        let mut support = KernelSupport {
            release: "6.8.0-45-generic".to_string(),
            version: parse("6.8.0-45-generic"),
            abi: None,
        };
        assert!(!support.is_supported());
        support.abi = Some(4);
        assert!(support.is_supported());
        support.version = parse("5.15.0");
        assert!(!support.is_supported());
    }

    #[test]
    fn test_detect_running_kernel() {
        let support = KernelSupport::detect().unwrap();
        assert!(!support.release.is_empty());
        assert_eq!(
            support.is_supported(),
            support.version >= MIN_KERNEL && support.abi.is_some()
        );
        assert_eq!(is_supported().unwrap(), support.is_supported());
    }
}
