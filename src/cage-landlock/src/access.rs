//! Filesystem access rights and the four access classes rules are built from.
//!
//! Rights are the `landlock` crate's [`AccessFs`]. The ruleset handles every
//! right in [`handled_access`]; each [`AccessClass`] grants a fixed subset
//! of it.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use landlock::{ABI, Access, BitFlags, make_bitflags};
use serde::{Deserialize, Serialize};

use crate::error::LandlockError;

pub use landlock::AccessFs;

/// A set of [`AccessFs`] rights.
pub type AccessMask = BitFlags<AccessFs>;

/// ABI whose filesystem rights the ruleset handles.
pub const HANDLED_ABI: ABI = ABI::V1;

/// Every right the ruleset handles. Anything in here that no rule grants for
/// a path is denied beneath it.
///
/// Pinned to the ABI v1 rights even on newer kernels. Handling `Refer`,
/// `Truncate` or `IoctlDev` would deny renames across directories,
/// truncation and device ioctls everywhere, and none of the four access
/// classes can grant them back.
pub fn handled_access() -> AccessMask {
    AccessFs::from_all(HANDLED_ABI)
}

/// Rights granted on the home directory: read plus write, without socket,
/// fifo and block-device creation.
pub fn home_access() -> AccessMask {
    AccessClass::Read.access() | AccessClass::Write.access()
}

bitflags! {
    /// Flags for `landlock_restrict_self`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RestrictFlags: u32 {
        const LOG_SAME_EXEC_OFF = 1 << 0;
        const LOG_NEW_EXEC_ON = 1 << 1;
        const LOG_SUBDOMAINS_OFF = 1 << 2;

        // Newer kernels may accept flags this crate does not name.
        const _ = !0;
    }
}

/// The kind of access a rule grants beneath a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessClass {
    /// Read files and list directories.
    Read,
    /// Write, remove, and create regular files, directories, character
    /// devices and symlinks.
    Write,
    /// Create sockets, fifos and block devices.
    Special,
    /// Execute files.
    Execute,
}

impl AccessClass {
    pub const ALL: [AccessClass; 4] = [
        AccessClass::Read,
        AccessClass::Write,
        AccessClass::Special,
        AccessClass::Execute,
    ];

    /// The rights granted by this class.
    pub fn access(self) -> AccessMask {
        match self {
            AccessClass::Read => make_bitflags!(AccessFs::{ReadFile | ReadDir}),
            AccessClass::Write => make_bitflags!(AccessFs::{
                WriteFile | RemoveFile | RemoveDir | MakeChar | MakeDir | MakeReg | MakeSym
            }),
            AccessClass::Special => make_bitflags!(AccessFs::{MakeSock | MakeFifo | MakeBlock}),
            AccessClass::Execute => make_bitflags!(AccessFs::{Execute}),
        }
    }

    /// Profile keyword for this class, e.g. `landlock.read`.
    pub fn keyword(self) -> &'static str {
        match self {
            AccessClass::Read => "landlock.read",
            AccessClass::Write => "landlock.write",
            AccessClass::Special => "landlock.special",
            AccessClass::Execute => "landlock.execute",
        }
    }
}

impl fmt::Display for AccessClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for AccessClass {
    type Err = LandlockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccessClass::ALL
            .into_iter()
            .find(|class| class.keyword() == s)
            .ok_or_else(|| LandlockError::InvalidDirective(format!("unknown kind {s:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handled_mask_is_abi_v1() {
        assert_eq!(AccessMask::from(AccessFs::Execute).bits(), 1);
        assert_eq!(AccessMask::from(AccessFs::ReadFile).bits(), 4);
        assert_eq!(AccessMask::from(AccessFs::MakeSym).bits(), 4096);
        assert_eq!(handled_access().bits(), 0x1fff);
        assert!(!handled_access().contains(AccessFs::Refer));
    }

    #[test]
    fn test_classes_are_disjoint_subsets_of_handled() {
        let handled = handled_access();
        for (i, a) in AccessClass::ALL.iter().enumerate() {
            let mask = a.access();
            assert!(!mask.is_empty());
            assert!(handled.contains(mask));
            assert_ne!(mask, handled, "{a} must not grant every handled right");
            for b in &AccessClass::ALL[i + 1..] {
                assert!(!mask.intersects(b.access()), "{a} and {b} overlap");
            }
        }
    }

    #[test]
    fn test_classes_cover_handled() {
        let union = AccessClass::ALL
            .iter()
            .fold(AccessMask::empty(), |acc, class| acc | class.access());
        assert_eq!(union, handled_access());
    }

    #[test]
    fn test_class_masks() {
        assert_eq!(
            AccessClass::Read.access(),
            AccessFs::ReadFile | AccessFs::ReadDir
        );
        assert_eq!(
            AccessClass::Special.access(),
            AccessFs::MakeSock | AccessFs::MakeFifo | AccessFs::MakeBlock
        );
        assert_eq!(AccessClass::Execute.access(), AccessMask::from(AccessFs::Execute));
        assert!(!AccessClass::Write.access().contains(AccessFs::MakeSock));
        assert!(AccessClass::Write.access().contains(AccessFs::MakeSym));
    }

    #[test]
    fn test_home_access_excludes_special_nodes() {
        let home = home_access();
        assert!(home.contains(AccessFs::ReadDir | AccessFs::MakeReg));
        assert!(!home.intersects(AccessClass::Special.access()));
        assert!(!home.contains(AccessFs::Execute));
    }

    #[test]
    fn test_keyword_round_trip() {
        for class in AccessClass::ALL {
            assert_eq!(class.keyword().parse::<AccessClass>().unwrap(), class);
        }
        assert!("landlock.readx".parse::<AccessClass>().is_err());
        assert!("read".parse::<AccessClass>().is_err());
    }

    #[test]
    fn test_restrict_flags_retain_unknown_bits() {
        let flags = RestrictFlags::from_bits_retain(1 << 8);
        assert_eq!(flags.bits(), 1 << 8);
        assert_eq!(RestrictFlags::default().bits(), 0);
    }
}
