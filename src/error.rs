//! File System Errors
//!
//! Every failure surfaces as an [`FsError`]. Filesystem-semantic failures carry
//! a POSIX [`Errno`] plus the offending path(s) and syscall; programmer errors
//! (malformed flags, wrong inode kind) are reported as [`FsError::Type`].

use std::fmt;
use thiserror::Error;

/// POSIX error codes reproduced by the filesystem (Linux numbering).
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Errno {
    EPERM,
    ENOENT,
    EIO,
    ENXIO,
    EBADF,
    ENOMEM,
    EACCES,
    EBUSY,
    EEXIST,
    EXDEV,
    ENODEV,
    ENOTDIR,
    EISDIR,
    EINVAL,
    EMFILE,
    EFBIG,
    ENOSPC,
    ESPIPE,
    EROFS,
    ENAMETOOLONG,
    ENOTEMPTY,
    ELOOP,
}

impl Errno {
    /// Numeric errno value.
    pub fn code(self) -> i32 {
        match self {
            Errno::EPERM => 1,
            Errno::ENOENT => 2,
            Errno::EIO => 5,
            Errno::ENXIO => 6,
            Errno::EBADF => 9,
            Errno::ENOMEM => 12,
            Errno::EACCES => 13,
            Errno::EBUSY => 16,
            Errno::EEXIST => 17,
            Errno::EXDEV => 18,
            Errno::ENODEV => 19,
            Errno::ENOTDIR => 20,
            Errno::EISDIR => 21,
            Errno::EINVAL => 22,
            Errno::EMFILE => 24,
            Errno::EFBIG => 27,
            Errno::ENOSPC => 28,
            Errno::ESPIPE => 29,
            Errno::EROFS => 30,
            Errno::ENAMETOOLONG => 36,
            Errno::ENOTEMPTY => 39,
            Errno::ELOOP => 40,
        }
    }

    /// Symbolic name, e.g. `"ENOENT"`.
    pub fn name(self) -> &'static str {
        match self {
            Errno::EPERM => "EPERM",
            Errno::ENOENT => "ENOENT",
            Errno::EIO => "EIO",
            Errno::ENXIO => "ENXIO",
            Errno::EBADF => "EBADF",
            Errno::ENOMEM => "ENOMEM",
            Errno::EACCES => "EACCES",
            Errno::EBUSY => "EBUSY",
            Errno::EEXIST => "EEXIST",
            Errno::EXDEV => "EXDEV",
            Errno::ENODEV => "ENODEV",
            Errno::ENOTDIR => "ENOTDIR",
            Errno::EISDIR => "EISDIR",
            Errno::EINVAL => "EINVAL",
            Errno::EMFILE => "EMFILE",
            Errno::EFBIG => "EFBIG",
            Errno::ENOSPC => "ENOSPC",
            Errno::ESPIPE => "ESPIPE",
            Errno::EROFS => "EROFS",
            Errno::ENAMETOOLONG => "ENAMETOOLONG",
            Errno::ENOTEMPTY => "ENOTEMPTY",
            Errno::ELOOP => "ELOOP",
        }
    }

    /// Human readable description.
    pub fn description(self) -> &'static str {
        match self {
            Errno::EPERM => "operation not permitted",
            Errno::ENOENT => "no such file or directory",
            Errno::EIO => "i/o error",
            Errno::ENXIO => "no such device or address",
            Errno::EBADF => "bad file descriptor",
            Errno::ENOMEM => "not enough memory",
            Errno::EACCES => "permission denied",
            Errno::EBUSY => "resource busy or locked",
            Errno::EEXIST => "file already exists",
            Errno::EXDEV => "cross-device link not permitted",
            Errno::ENODEV => "no such device",
            Errno::ENOTDIR => "not a directory",
            Errno::EISDIR => "illegal operation on a directory",
            Errno::EINVAL => "invalid argument",
            Errno::EMFILE => "too many open files",
            Errno::EFBIG => "file too large",
            Errno::ENOSPC => "no space left on device",
            Errno::ESPIPE => "invalid seek",
            Errno::EROFS => "read-only file system",
            Errno::ENAMETOOLONG => "name too long",
            Errno::ENOTEMPTY => "directory not empty",
            Errno::ELOOP => "too many symbolic links encountered",
        }
    }

    /// Build an error for this code naming `path`.
    pub fn at(self, path: impl Into<String>) -> FsError {
        FsError::Errno(ErrnoError::new(self).with_path(path))
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A POSIX error with optional path, destination path and syscall name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", describe(.errno, .path, .dest, .syscall))]
pub struct ErrnoError {
    pub errno: Errno,
    pub path: Option<String>,
    pub dest: Option<String>,
    pub syscall: Option<&'static str>,
}

impl ErrnoError {
    pub fn new(errno: Errno) -> Self {
        Self { errno, path: None, dest: None, syscall: None }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// `CODE: description[, syscall]['path'][ -> 'dest']`
fn describe(
    errno: &Errno,
    path: &Option<String>,
    dest: &Option<String>,
    syscall: &Option<&'static str>,
) -> String {
    let mut out = format!("{}: {}", errno.name(), errno.description());
    match (syscall, path) {
        (Some(syscall), Some(_)) => out.push_str(&format!(", {} ", syscall)),
        (Some(syscall), None) => out.push_str(&format!(", {}", syscall)),
        (None, Some(_)) => out.push_str(", "),
        (None, None) => {}
    }
    if let Some(path) = path {
        out.push_str(&format!("'{}'", path));
    }
    if let Some(dest) = dest {
        out.push_str(&format!(" -> '{}'", dest));
    }
    out
}

/// Errors raised by the device registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device number {major}:{minor} is already registered")]
    Conflict { major: u32, minor: u32 },

    #[error("device number {major}:{minor} is out of range")]
    Range { major: u32, minor: u32 },
}

/// File system errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    #[error("{0}")]
    Errno(ErrnoError),

    /// Caller passed something the core cannot interpret.
    #[error("TypeError: {0}")]
    Type(String),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl From<Errno> for FsError {
    fn from(errno: Errno) -> Self {
        FsError::Errno(ErrnoError::new(errno))
    }
}

impl FsError {
    pub fn type_error(message: impl Into<String>) -> Self {
        FsError::Type(message.into())
    }

    /// The POSIX code, if this is a filesystem-semantic failure.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            FsError::Errno(e) => Some(e.errno),
            _ => None,
        }
    }

    /// Stamp the syscall name, keeping one that is already set.
    pub fn syscall(mut self, name: &'static str) -> Self {
        if let FsError::Errno(e) = &mut self {
            e.syscall.get_or_insert(name);
        }
        self
    }

    /// Attach the operation's paths where the error does not already name one.
    pub fn paths(mut self, path: &str, dest: Option<&str>) -> Self {
        if let FsError::Errno(e) = &mut self {
            if e.path.is_none() {
                e.path = Some(path.to_string());
            }
            if e.dest.is_none() {
                e.dest = dest.map(str::to_string);
            }
        }
        self
    }
}

/// Result alias used throughout the crate.
pub type FsResult<T> = Result<T, FsError>;

// ============================================================================
// Tests
// ============================================================================
