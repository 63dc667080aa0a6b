//! posix-memfs - An in-memory POSIX filesystem
//!
//! Inodes, hardlinks, symlinks, character devices, file descriptors and
//! permission bits, all held in process memory. [`VirtualFs`] is the
//! synchronous entry point; [`AsyncVirtualFs`] wraps it for async callers.

pub mod constants;
pub mod counter;
pub mod cwd;
pub mod devices;
pub mod error;
pub mod fd;
pub mod fs;
pub mod inode;
pub mod path;
pub mod permissions;
pub mod stat;

pub use devices::{CharacterDevice, DeviceRegistry};
pub use error::{DeviceError, Errno, ErrnoError, FsError, FsResult};
pub use fd::Fd;
pub use fs::{
    AsyncVirtualFs, BufferEncoding, DirentEntry, FileContent, FileSystem, MmapView, OpenFlags, ReadFileOptions,
    VirtualFs, VirtualFsOptions, WriteFileOptions,
};
pub use path::{FileRef, FileUrl, PathArg};
pub use stat::Stat;
