//! Path Arguments
//!
//! Every path-taking call accepts a string, raw bytes, a `std::path::Path`,
//! or a `file:` URL. Conversion to the string form navigation works on happens
//! once, at the top of each operation.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use crate::error::{FsError, FsResult};
use crate::fd::Fd;

/// A path operand in any of the accepted shapes.
#[derive(Debug, Clone, Copy)]
pub enum PathArg<'a> {
    Str(&'a str),
    Bytes(&'a [u8]),
    Path(&'a Path),
    Url(&'a FileUrl),
}

impl<'a> PathArg<'a> {
    /// The path as a string. NUL bytes, non-UTF-8 data and unusable URLs are
    /// type errors.
    pub fn to_path_string(&self) -> FsResult<Cow<'a, str>> {
        let path: Cow<'a, str> = match *self {
            PathArg::Str(s) => Cow::Borrowed(s),
            PathArg::Bytes(bytes) => std::str::from_utf8(bytes)
                .map(Cow::Borrowed)
                .map_err(|_| FsError::type_error("path buffer must be valid UTF-8"))?,
            PathArg::Path(path) => path
                .to_str()
                .map(Cow::Borrowed)
                .ok_or_else(|| FsError::type_error("path must be valid UTF-8"))?,
            PathArg::Url(url) => Cow::Owned(url.to_path()?),
        };
        if path.contains('\0') {
            return Err(FsError::type_error("path must be a string without null bytes"));
        }
        Ok(path)
    }
}

impl<'a> From<&'a str> for PathArg<'a> {
    fn from(s: &'a str) -> Self {
        PathArg::Str(s)
    }
}

impl<'a> From<&'a String> for PathArg<'a> {
    fn from(s: &'a String) -> Self {
        PathArg::Str(s)
    }
}

impl<'a> From<&'a [u8]> for PathArg<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        PathArg::Bytes(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for PathArg<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        PathArg::Bytes(bytes)
    }
}

impl<'a> From<&'a Path> for PathArg<'a> {
    fn from(path: &'a Path) -> Self {
        PathArg::Path(path)
    }
}

impl<'a> From<&'a PathBuf> for PathArg<'a> {
    fn from(path: &'a PathBuf) -> Self {
        PathArg::Path(path)
    }
}

impl<'a> From<&'a FileUrl> for PathArg<'a> {
    fn from(url: &'a FileUrl) -> Self {
        PathArg::Url(url)
    }
}

// ============================================================================
// file: URLs
// ============================================================================

/// A parsed URL. Only `file:` URLs with an empty host convert to paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUrl {
    /// Scheme including the trailing colon, lowercased (`"file:"`).
    pub protocol: String,
    pub hostname: String,
    /// Still percent-encoded.
    pub pathname: String,
}

impl FileUrl {
    pub fn parse(url: &str) -> FsResult<Self> {
        let (scheme, rest) = url
            .split_once(':')
            .filter(|(scheme, _)| !scheme.is_empty())
            .ok_or_else(|| FsError::type_error(format!("Invalid URL: {}", url)))?;
        let (hostname, pathname) = match rest.strip_prefix("//") {
            Some(authority) => match authority.find('/') {
                Some(slash) => (&authority[..slash], &authority[slash..]),
                None => (authority, "/"),
            },
            None => ("", rest),
        };
        Ok(Self {
            protocol: format!("{}:", scheme.to_ascii_lowercase()),
            hostname: hostname.to_string(),
            pathname: pathname.to_string(),
        })
    }

    /// Decode into a filesystem path.
    pub fn to_path(&self) -> FsResult<String> {
        if self.protocol != "file:" {
            return Err(FsError::type_error("The URL must be of scheme file"));
        }
        if !self.hostname.is_empty() {
            return Err(FsError::type_error("File URL host must be empty"));
        }
        if self.pathname.to_ascii_lowercase().contains("%2f") {
            return Err(FsError::type_error("File URL path must not include encoded / characters"));
        }
        percent_decode(&self.pathname)
    }
}

fn percent_decode(s: &str) -> FsResult<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(decoded) = hex::decode(&bytes[i + 1..i + 3]) {
                out.extend_from_slice(&decoded);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).map_err(|_| FsError::type_error("File URL path must decode to UTF-8"))
}

// ============================================================================
// Path or descriptor
// ============================================================================

/// Target of the whole-file helpers: a path, or an already-open descriptor.
#[derive(Debug, Clone, Copy)]
pub enum FileRef<'a> {
    Path(PathArg<'a>),
    Fd(Fd),
}

impl<'a> From<PathArg<'a>> for FileRef<'a> {
    fn from(path: PathArg<'a>) -> Self {
        FileRef::Path(path)
    }
}

impl<'a> From<&'a str> for FileRef<'a> {
    fn from(s: &'a str) -> Self {
        FileRef::Path(PathArg::Str(s))
    }
}

impl<'a> From<&'a String> for FileRef<'a> {
    fn from(s: &'a String) -> Self {
        FileRef::Path(PathArg::Str(s))
    }
}

impl<'a> From<&'a Path> for FileRef<'a> {
    fn from(path: &'a Path) -> Self {
        FileRef::Path(PathArg::Path(path))
    }
}

impl<'a> From<&'a FileUrl> for FileRef<'a> {
    fn from(url: &'a FileUrl) -> Self {
        FileRef::Path(PathArg::Url(url))
    }
}

impl From<Fd> for FileRef<'_> {
    fn from(fd: Fd) -> Self {
        FileRef::Fd(fd)
    }
}
