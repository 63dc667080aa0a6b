//! Inode metadata record.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::constants::*;

/// File status information, owned by an inode and mutated by the layers above it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u32,
    pub size: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub birthtime: SystemTime,
}

impl Stat {
    /// Fresh metadata with every timestamp set to now.
    pub fn new(ino: u64, mode: u32, uid: u32, gid: u32) -> Self {
        let now = SystemTime::now();
        Self {
            ino,
            mode,
            nlink: 0,
            uid,
            gid,
            rdev: 0,
            size: 0,
            atime: now,
            mtime: now,
            ctime: now,
            birthtime: now,
        }
    }

    pub fn is_file(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    pub fn is_directory(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    pub fn is_character_device(&self) -> bool {
        self.mode & S_IFMT == S_IFCHR
    }

    pub fn is_block_device(&self) -> bool {
        self.mode & S_IFMT == S_IFBLK
    }

    pub fn is_fifo(&self) -> bool {
        self.mode & S_IFMT == S_IFIFO
    }

    pub fn is_socket(&self) -> bool {
        self.mode & S_IFMT == S_IFSOCK
    }

    /// Set mtime and ctime to now.
    pub(crate) fn touch_modified(&mut self) {
        let now = SystemTime::now();
        self.mtime = now;
        self.ctime = now;
    }

    pub(crate) fn touch_changed(&mut self) {
        self.ctime = SystemTime::now();
    }

    pub(crate) fn touch_accessed(&mut self) {
        self.atime = SystemTime::now();
    }
}
