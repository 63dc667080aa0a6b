//! Device Types
//!
//! The character-device hook trait and the registry mapping device numbers
//! to behavior.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{DeviceError, FsResult};
use crate::fd::FileDescriptor;

pub const MAJOR_BITSIZE: u32 = 12;
pub const MINOR_BITSIZE: u32 = 20;
pub const MAJOR_MAX: u32 = (1 << MAJOR_BITSIZE) - 1;
pub const MINOR_MAX: u32 = (1 << MINOR_BITSIZE) - 1;
pub const MAJOR_MIN: u32 = 0;
pub const MINOR_MIN: u32 = 0;

/// Pack a major/minor pair into a device number.
pub fn mkdev(major: u32, minor: u32) -> u32 {
    (major << MINOR_BITSIZE) | minor
}

/// Split a device number into its major/minor pair.
pub fn unmkdev(dev: u32) -> (u32, u32) {
    (dev >> MINOR_BITSIZE, dev & MINOR_MAX)
}

/// Behavior behind a character-device inode.
///
/// The descriptor passed to each hook is the one the caller opened; hooks may
/// move its position with [`FileDescriptor::set_position`]. `position` is the
/// effective offset for this call (explicit or the descriptor's own).
pub trait CharacterDevice: Send + Sync {
    fn open(&self, _fd: &mut FileDescriptor) -> FsResult<()> {
        Ok(())
    }

    fn close(&self, _fd: &mut FileDescriptor) -> FsResult<()> {
        Ok(())
    }

    fn set_pos(&self, fd: &mut FileDescriptor, pos: i64, whence: u32) -> FsResult<()>;

    fn read(&self, fd: &mut FileDescriptor, buf: &mut [u8], position: u64) -> FsResult<usize>;

    fn write(
        &self,
        fd: &mut FileDescriptor,
        buf: &[u8],
        position: u64,
        extra_flags: u32,
    ) -> FsResult<usize>;
}

/// Registry of character devices keyed by (major, minor).
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    chr: HashMap<u32, HashMap<u32, Arc<dyn CharacterDevice>>>,
}

impl DeviceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `device`. A `None` major or minor is auto-allocated as the
    /// lowest free number. Returns the numbers actually used.
    pub fn register_chr(
        &mut self,
        device: Arc<dyn CharacterDevice>,
        major: Option<u32>,
        minor: Option<u32>,
    ) -> Result<(u32, u32), DeviceError> {
        let major = match major {
            Some(major) => major,
            None => lowest_free(MAJOR_MIN, |n| self.chr.contains_key(&n)),
        };
        let minors = self.chr.get(&major);
        let minor = match minor {
            Some(minor) => minor,
            None => lowest_free(MINOR_MIN, |n| minors.is_some_and(|m| m.contains_key(&n))),
        };
        if major > MAJOR_MAX || minor > MINOR_MAX {
            return Err(DeviceError::Range { major, minor });
        }
        if minors.is_some_and(|m| m.contains_key(&minor)) {
            return Err(DeviceError::Conflict { major, minor });
        }
        self.chr.entry(major).or_default().insert(minor, device);
        tracing::debug!(major, minor, "registered character device");
        Ok((major, minor))
    }

    pub fn deregister_chr(&mut self, major: u32, minor: u32) -> Option<Arc<dyn CharacterDevice>> {
        let minors = self.chr.get_mut(&major)?;
        let device = minors.remove(&minor)?;
        if minors.is_empty() {
            self.chr.remove(&major);
        }
        tracing::debug!(major, minor, "deregistered character device");
        Some(device)
    }

    pub fn get_chr(&self, major: u32, minor: u32) -> Option<Arc<dyn CharacterDevice>> {
        self.chr.get(&major)?.get(&minor).cloned()
    }
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut numbers: Vec<(u32, u32)> = self
            .chr
            .iter()
            .flat_map(|(major, minors)| minors.keys().map(move |minor| (*major, *minor)))
            .collect();
        numbers.sort_unstable();
        f.debug_struct("DeviceRegistry").field("chr", &numbers).finish()
    }
}

fn lowest_free(start: u32, taken: impl Fn(u32) -> bool) -> u32 {
    let mut n = start;
    while taken(n) {
        n += 1;
    }
    n
}
