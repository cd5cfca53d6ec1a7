//! Raw Landlock and `prctl` calls the `landlock` crate does not expose.
//!
//! `landlock_restrict_self` is issued here so the caller picks its flags and
//! sets `no_new_privs` as a separate step. libc exposes the syscall numbers
//! but no wrappers, so each call goes through `libc::syscall`.

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};

use crate::access::RestrictFlags;

const LANDLOCK_CREATE_RULESET_VERSION: u32 = 1 << 0;

/// `landlock_restrict_self(ruleset, flags)`.
pub(crate) fn restrict_self(ruleset: BorrowedFd<'_>, flags: RestrictFlags) -> io::Result<()> {
    let ret = unsafe {
        libc::syscall(
            libc::SYS_landlock_restrict_self,
            ruleset.as_raw_fd(),
            flags.bits(),
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Highest Landlock ABI version the running kernel supports.
pub(crate) fn abi_version() -> io::Result<u32> {
    let ret = unsafe {
        libc::syscall(
            libc::SYS_landlock_create_ruleset,
            std::ptr::null::<libc::c_void>(),
            0usize,
            LANDLOCK_CREATE_RULESET_VERSION,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ret as u32)
}

/// Set PR_SET_NO_NEW_PRIVS. Irreversible for this process and its children.
pub(crate) fn set_no_new_privs() -> io::Result<()> {
    let result = unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Whether PR_SET_NO_NEW_PRIVS is set on this process.
pub fn no_new_privs() -> io::Result<bool> {
    let result = unsafe { libc::prctl(libc::PR_GET_NO_NEW_PRIVS, 0, 0, 0, 0) };
    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(result == 1)
}
