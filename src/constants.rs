//! POSIX Constants
//!
//! Numeric values follow Linux x86_64 bit-for-bit so callers written against
//! a real filesystem can pass their flags straight through.

// ============================================================================
// Open flags
// ============================================================================

pub const O_RDONLY: u32 = 0;
pub const O_WRONLY: u32 = 0o1;
pub const O_RDWR: u32 = 0o2;
pub const O_ACCMODE: u32 = 0o3;
pub const O_CREAT: u32 = 0o100;
pub const O_EXCL: u32 = 0o200;
pub const O_NOCTTY: u32 = 0o400;
pub const O_TRUNC: u32 = 0o1000;
pub const O_APPEND: u32 = 0o2000;
pub const O_NONBLOCK: u32 = 0o4000;
pub const O_DSYNC: u32 = 0o10000;
pub const O_DIRECT: u32 = 0o40000;
pub const O_DIRECTORY: u32 = 0o200000;
pub const O_NOFOLLOW: u32 = 0o400000;
pub const O_NOATIME: u32 = 0o1000000;
pub const O_SYNC: u32 = 0o4010000;

// ============================================================================
// File type and permission bits
// ============================================================================

pub const S_IFMT: u32 = 0o170000;
pub const S_IFSOCK: u32 = 0o140000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFIFO: u32 = 0o010000;

pub const S_ISUID: u32 = 0o4000;
pub const S_ISGID: u32 = 0o2000;
pub const S_ISVTX: u32 = 0o1000;

pub const S_IRWXU: u32 = 0o700;
pub const S_IRUSR: u32 = 0o400;
pub const S_IWUSR: u32 = 0o200;
pub const S_IXUSR: u32 = 0o100;
pub const S_IRWXG: u32 = 0o070;
pub const S_IRGRP: u32 = 0o040;
pub const S_IWGRP: u32 = 0o020;
pub const S_IXGRP: u32 = 0o010;
pub const S_IRWXO: u32 = 0o007;
pub const S_IROTH: u32 = 0o004;
pub const S_IWOTH: u32 = 0o002;
pub const S_IXOTH: u32 = 0o001;

/// All bits chmod is allowed to touch.
pub const ALLPERMS: u32 = 0o7777;

// ============================================================================
// Access, seek, mmap and copy flags
// ============================================================================

pub const F_OK: u32 = 0;
pub const R_OK: u32 = 4;
pub const W_OK: u32 = 2;
pub const X_OK: u32 = 1;

pub const SEEK_SET: u32 = 0;
pub const SEEK_CUR: u32 = 1;
pub const SEEK_END: u32 = 2;

pub const MAP_SHARED: u32 = 1;
pub const MAP_PRIVATE: u32 = 2;

pub const COPYFILE_EXCL: u32 = 1;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_ROOT_UID: u32 = 0;
pub const DEFAULT_ROOT_GID: u32 = 0;
pub const DEFAULT_ROOT_PERM: u32 = 0o755;
pub const DEFAULT_FILE_PERM: u32 = 0o666;
pub const DEFAULT_DIRECTORY_PERM: u32 = 0o777;
pub const DEFAULT_SYMLINK_PERM: u32 = 0o777;
pub const DEFAULT_UMASK: u32 = 0o022;
