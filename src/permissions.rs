//! Permission Model
//!
//! Stateless access checks against owner/group/other mode triads.

use crate::constants::*;
use crate::stat::Stat;

/// The acting user and group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
}

impl Identity {
    pub fn is_root(&self) -> bool {
        self.uid == DEFAULT_ROOT_UID
    }

    /// Root bypasses every check; everyone else goes through [`check_permissions`].
    pub fn can(&self, access: u32, stat: &Stat) -> bool {
        self.is_root() || check_permissions(access, self.uid, self.gid, stat)
    }
}

/// Test `access` (a mask of `R_OK`/`W_OK`/`X_OK`) against the triad selected
/// by ownership: owner if the uid matches, else group if the gid matches,
/// else other.
pub fn check_permissions(access: u32, uid: u32, gid: u32, stat: &Stat) -> bool {
    let (r, w, x) = if uid == stat.uid {
        (S_IRUSR, S_IWUSR, S_IXUSR)
    } else if gid == stat.gid {
        (S_IRGRP, S_IWGRP, S_IXGRP)
    } else {
        (S_IROTH, S_IWOTH, S_IXOTH)
    };
    let mut granted = 0;
    if stat.mode & r != 0 {
        granted |= R_OK;
    }
    if stat.mode & w != 0 {
        granted |= W_OK;
    }
    if stat.mode & x != 0 {
        granted |= X_OK;
    }
    access & granted == access
}

pub fn apply_umask(mode: u32, umask: u32) -> u32 {
    mode & !umask
}
