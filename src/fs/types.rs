//! File System Types
//!
//! Option records, content encodings, open-flag parsing, mmap views and the
//! async [`FileSystem`] trait.

use std::time::SystemTime;

use async_trait::async_trait;
use base64::Engine;

use crate::constants::*;
use crate::devices::DeviceRegistry;
use crate::error::{Errno, FsError, FsResult};
use crate::fd::Fd;
use crate::inode::{FileData, INodeIndex};
use crate::stat::Stat;

/// Supported buffer encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferEncoding {
    #[default]
    Utf8,
    Ascii,
    Binary,
    Base64,
    Hex,
    Latin1,
}

impl BufferEncoding {
    /// Parse encoding from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "utf8" | "utf-8" => Some(Self::Utf8),
            "ascii" => Some(Self::Ascii),
            "binary" => Some(Self::Binary),
            "base64" => Some(Self::Base64),
            "hex" => Some(Self::Hex),
            "latin1" => Some(Self::Latin1),
            _ => None,
        }
    }
}

/// File content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Text(String),
    Binary(Vec<u8>),
}

impl From<String> for FileContent {
    fn from(s: String) -> Self {
        FileContent::Text(s)
    }
}

impl From<&str> for FileContent {
    fn from(s: &str) -> Self {
        FileContent::Text(s.to_string())
    }
}

impl From<Vec<u8>> for FileContent {
    fn from(v: Vec<u8>) -> Self {
        FileContent::Binary(v)
    }
}

impl From<&[u8]> for FileContent {
    fn from(v: &[u8]) -> Self {
        FileContent::Binary(v.to_vec())
    }
}

/// Directory entry with type information (similar to Node's Dirent)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirentEntry {
    pub name: String,
    pub is_file: bool,
    pub is_directory: bool,
    pub is_symlink: bool,
    pub is_character_device: bool,
}

impl DirentEntry {
    pub(crate) fn new(name: String, stat: &Stat) -> Self {
        Self {
            name,
            is_file: stat.is_file(),
            is_directory: stat.is_directory(),
            is_symlink: stat.is_symlink(),
            is_character_device: stat.is_character_device(),
        }
    }
}

// ============================================================================
// Open flags
// ============================================================================

/// Open flags as numeric bits or a Node-style string such as `"w+"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenFlags {
    Bits(u32),
    Named(String),
}

impl OpenFlags {
    pub fn bits(&self) -> FsResult<u32> {
        match self {
            OpenFlags::Bits(bits) => Ok(*bits),
            OpenFlags::Named(name) => parse_flags(name),
        }
    }
}

impl From<u32> for OpenFlags {
    fn from(bits: u32) -> Self {
        OpenFlags::Bits(bits)
    }
}

impl From<&str> for OpenFlags {
    fn from(name: &str) -> Self {
        OpenFlags::Named(name.to_string())
    }
}

/// Translate a string flag into open bits.
pub fn parse_flags(flags: &str) -> FsResult<u32> {
    let bits = match flags {
        "r" => O_RDONLY,
        "rs" | "sr" => O_RDONLY | O_SYNC,
        "r+" => O_RDWR,
        "rs+" | "sr+" => O_RDWR | O_SYNC,
        "w" => O_TRUNC | O_CREAT | O_WRONLY,
        "wx" | "xw" => O_TRUNC | O_CREAT | O_WRONLY | O_EXCL,
        "w+" => O_TRUNC | O_CREAT | O_RDWR,
        "wx+" | "xw+" => O_TRUNC | O_CREAT | O_RDWR | O_EXCL,
        "a" => O_APPEND | O_CREAT | O_WRONLY,
        "ax" | "xa" => O_APPEND | O_CREAT | O_WRONLY | O_EXCL,
        "as" | "sa" => O_APPEND | O_CREAT | O_WRONLY | O_SYNC,
        "a+" => O_APPEND | O_CREAT | O_RDWR,
        "ax+" | "xa+" => O_APPEND | O_CREAT | O_RDWR | O_EXCL,
        "as+" | "sa+" => O_APPEND | O_CREAT | O_RDWR | O_SYNC,
        _ => return Err(FsError::type_error(format!("Unknown file open flag: {}", flags))),
    };
    Ok(bits)
}

// ============================================================================
// Options
// ============================================================================

/// Options for read_file
#[derive(Debug, Clone, Default)]
pub struct ReadFileOptions {
    /// Defaults to utf8 for the string form.
    pub encoding: Option<BufferEncoding>,
    /// Defaults to `"r"`.
    pub flag: Option<OpenFlags>,
}

/// Options for write_file / append_file
#[derive(Debug, Clone, Default)]
pub struct WriteFileOptions {
    /// How a `FileContent::Text` is turned into bytes. Defaults to utf8.
    pub encoding: Option<BufferEncoding>,
    /// Creation mode, before umask. Defaults to 0o666.
    pub mode: Option<u32>,
    /// Defaults to `"w"` for write_file and `"a"` for append_file.
    pub flag: Option<OpenFlags>,
}

/// Construction options for [`VirtualFs`](super::VirtualFs).
#[derive(Debug, Clone, Default)]
pub struct VirtualFsOptions {
    /// Defaults to 0o022.
    pub umask: Option<u32>,
    /// Acting user. Defaults to root.
    pub uid: Option<u32>,
    /// Acting group. Defaults to root.
    pub gid: Option<u32>,
    /// Defaults to a registry holding the standard devices.
    pub devices: Option<DeviceRegistry>,
    /// Create `/dev`, `/tmp` and friends at construction.
    pub standard_layout: Option<bool>,
}

// ============================================================================
// mmap
// ============================================================================

/// Byte view returned by `mmap`.
///
/// A shared view writes through to the file; a private view is a detached copy.
/// Writes go through [`VirtualFs::write_mapped`](super::VirtualFs::write_mapped)
/// so that shared writes stamp the file's times.
#[derive(Debug, Clone)]
pub enum MmapView {
    Shared { inode: INodeIndex, data: FileData, len: usize },
    Private(Vec<u8>),
}

impl MmapView {
    pub fn len(&self) -> usize {
        match self {
            MmapView::Shared { data, len, .. } => (*len).min(data.len()),
            MmapView::Private(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, MmapView::Shared { .. })
    }

    pub fn to_vec(&self) -> Vec<u8> {
        match self {
            MmapView::Shared { data, len, .. } => {
                let data = data.lock();
                data[..(*len).min(data.len())].to_vec()
            }
            MmapView::Private(bytes) => bytes.clone(),
        }
    }

    /// Write `bytes` at `offset` within the view. Returns the number of bytes
    /// that fit.
    pub(crate) fn write_at(&mut self, offset: usize, bytes: &[u8]) -> FsResult<usize> {
        let len = self.len();
        if offset > len {
            return Err(Errno::EINVAL.into());
        }
        let n = bytes.len().min(len - offset);
        match self {
            MmapView::Shared { data, .. } => {
                data.lock()[offset..offset + n].copy_from_slice(&bytes[..n]);
            }
            MmapView::Private(view) => {
                view[offset..offset + n].copy_from_slice(&bytes[..n]);
            }
        }
        Ok(n)
    }
}

/// Abstract filesystem interface with async completion.
///
/// Paths are plain strings here; the synchronous facade accepts the richer
/// path argument shapes.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn open(&self, path: &str, flags: OpenFlags, mode: Option<u32>) -> FsResult<Fd>;

    async fn close(&self, fd: Fd) -> FsResult<()>;

    async fn read(&self, fd: Fd, len: usize, position: Option<u64>) -> FsResult<Vec<u8>>;

    async fn write(&self, fd: Fd, data: &[u8], position: Option<u64>) -> FsResult<usize>;

    async fn lseek(&self, fd: Fd, offset: i64, whence: u32) -> FsResult<u64>;

    async fn fsync(&self, fd: Fd) -> FsResult<()>;

    async fn fdatasync(&self, fd: Fd) -> FsResult<()>;

    /// Read the contents of a file as bytes
    async fn read_file(&self, path: &str) -> FsResult<Vec<u8>>;

    /// Read the contents of a file as a string in `encoding`
    async fn read_file_string(&self, path: &str, encoding: BufferEncoding) -> FsResult<String>;

    /// Write content to a file, creating it if it doesn't exist
    async fn write_file(&self, path: &str, content: FileContent, options: WriteFileOptions) -> FsResult<()>;

    /// Append content to a file, creating it if it doesn't exist
    async fn append_file(&self, path: &str, content: FileContent, options: WriteFileOptions) -> FsResult<()>;

    async fn truncate(&self, path: &str, len: u64) -> FsResult<()>;

    async fn ftruncate(&self, fd: Fd, len: u64) -> FsResult<()>;

    async fn copy_file(&self, src: &str, dest: &str, flags: u32) -> FsResult<()>;

    /// Get file/directory information (follows symlinks)
    async fn stat(&self, path: &str) -> FsResult<Stat>;

    /// Get file/directory information (does not follow symlinks)
    async fn lstat(&self, path: &str) -> FsResult<Stat>;

    async fn fstat(&self, fd: Fd) -> FsResult<Stat>;

    async fn access(&self, path: &str, mode: u32) -> FsResult<()>;

    /// Check if a path exists
    async fn exists(&self, path: &str) -> bool;

    async fn mkdir(&self, path: &str, mode: Option<u32>) -> FsResult<()>;

    async fn mkdirp(&self, path: &str, mode: Option<u32>) -> FsResult<()>;

    async fn mkdtemp(&self, prefix: &str) -> FsResult<String>;

    async fn rmdir(&self, path: &str) -> FsResult<()>;

    /// Read directory contents (returns entry names)
    async fn readdir(&self, path: &str) -> FsResult<Vec<String>>;

    /// Read directory contents with file type information
    async fn readdir_with_file_types(&self, path: &str) -> FsResult<Vec<DirentEntry>>;

    /// Create a hard link
    async fn link(&self, existing_path: &str, new_path: &str) -> FsResult<()>;

    async fn unlink(&self, path: &str) -> FsResult<()>;

    /// Create a symbolic link
    async fn symlink(&self, target: &str, link_path: &str) -> FsResult<()>;

    /// Read the target of a symbolic link
    async fn readlink(&self, path: &str) -> FsResult<String>;

    /// Resolve all symlinks in a path to get the canonical physical path
    async fn realpath(&self, path: &str) -> FsResult<String>;

    async fn rename(&self, old_path: &str, new_path: &str) -> FsResult<()>;

    async fn chmod(&self, path: &str, mode: u32) -> FsResult<()>;

    async fn lchmod(&self, path: &str, mode: u32) -> FsResult<()>;

    async fn fchmod(&self, fd: Fd, mode: u32) -> FsResult<()>;

    async fn chown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()>;

    async fn lchown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()>;

    async fn fchown(&self, fd: Fd, uid: u32, gid: u32) -> FsResult<()>;

    async fn utimes(&self, path: &str, atime: SystemTime, mtime: SystemTime) -> FsResult<()>;

    async fn futimes(&self, fd: Fd, atime: SystemTime, mtime: SystemTime) -> FsResult<()>;

    async fn chdir(&self, path: &str) -> FsResult<()>;

    async fn get_cwd(&self) -> String;

    async fn mknod(&self, path: &str, mode: u32, major: u32, minor: u32) -> FsResult<()>;

    async fn mmap(&self, fd: Fd, len: usize, flags: u32) -> FsResult<MmapView>;
}

// ============================================================================
// Encoding utilities
// ============================================================================

/// Convert content to bytes with encoding
pub fn to_buffer(content: &FileContent, encoding: BufferEncoding) -> FsResult<Vec<u8>> {
    let text = match content {
        FileContent::Binary(bytes) => return Ok(bytes.clone()),
        FileContent::Text(text) => text,
    };
    match encoding {
        BufferEncoding::Base64 => base64::engine::general_purpose::STANDARD
            .decode(text.trim_end())
            .map_err(|e| FsError::type_error(format!("invalid base64 content: {}", e))),
        BufferEncoding::Hex => {
            hex::decode(text).map_err(|e| FsError::type_error(format!("invalid hex content: {}", e)))
        }
        // Each char becomes a byte (truncated to 8 bits)
        BufferEncoding::Binary | BufferEncoding::Latin1 | BufferEncoding::Ascii => {
            Ok(text.chars().map(|c| c as u8).collect())
        }
        BufferEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
    }
}

/// Convert bytes to string with encoding
pub fn from_buffer(buffer: &[u8], encoding: BufferEncoding) -> String {
    match encoding {
        BufferEncoding::Base64 => base64::engine::general_purpose::STANDARD.encode(buffer),
        BufferEncoding::Hex => hex::encode(buffer),
        BufferEncoding::Binary | BufferEncoding::Latin1 => buffer.iter().map(|&b| b as char).collect(),
        BufferEncoding::Ascii => buffer.iter().map(|&b| (b & 0x7f) as char).collect(),
        BufferEncoding::Utf8 => String::from_utf8_lossy(buffer).to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
