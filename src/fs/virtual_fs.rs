//! Virtual File System
//!
//! The synchronous POSIX-shaped facade. Every operation resolves its operands
//! through path navigation, checks permissions, then mutates the inode table
//! through the directory entry API. Failures carry the syscall name and the
//! path(s) involved.

use std::sync::Arc;
use std::time::SystemTime;

use rand::distributions::Alphanumeric;
use rand::Rng;

use super::types::*;
use crate::constants::*;
use crate::cwd::CurrentDirectory;
use crate::devices::{mkdev, CharacterDevice, DeviceRegistry, MAJOR_MAX, MINOR_MAX, STANDARD_DEVICE_NODES};
use crate::error::{DeviceError, Errno, FsError, FsResult};
use crate::fd::{Fd, FdManager, FileDescriptor};
use crate::inode::{INode, INodeIndex, INodeKind, INodeManager, INodeProps, INodeSpec};
use crate::path::{navigate, FileRef, NavContext, Navigated, PathArg};
use crate::permissions::{apply_umask, Identity};
use crate::stat::Stat;

const READ_CHUNK: usize = 4096;

/// In-memory POSIX filesystem.
#[derive(Debug)]
pub struct VirtualFs {
    inodes: INodeManager,
    fds: FdManager,
    devices: DeviceRegistry,
    cwd: CurrentDirectory,
    root: INodeIndex,
    identity: Identity,
    umask: u32,
}

/// Strip trailing slashes, keeping a lone `/`.
fn trim_trailing_slashes(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}

/// A path like `d/` that names something which must be a directory.
fn has_trailing_slash(path: &str) -> bool {
    path.len() > 1 && path.ends_with('/')
}

fn can_read(flags: u32) -> bool {
    flags & O_ACCMODE != O_WRONLY
}

fn can_write(flags: u32) -> bool {
    matches!(flags & O_ACCMODE, O_WRONLY | O_RDWR)
}

impl VirtualFs {
    /// An empty filesystem (just `/`) acting as root.
    pub fn new() -> FsResult<Self> {
        Self::with_options(VirtualFsOptions::default())
    }

    /// A filesystem with `/dev`, `/dev/shm`, `/tmp`, `/root` and `/proc`.
    pub fn with_standard_layout() -> FsResult<Self> {
        Self::with_options(VirtualFsOptions { standard_layout: Some(true), ..Default::default() })
    }

    pub fn with_options(options: VirtualFsOptions) -> FsResult<Self> {
        let devices = match options.devices {
            Some(devices) => devices,
            None => DeviceRegistry::with_standard_devices()?,
        };
        let mut inodes = INodeManager::new();
        let root = inodes.create(
            INodeSpec::Directory { parent: None },
            INodeProps { mode: DEFAULT_ROOT_PERM, uid: DEFAULT_ROOT_UID, gid: DEFAULT_ROOT_GID },
        )?;
        let cwd = CurrentDirectory::new(&mut inodes, root, Vec::new());
        let mut fs = Self {
            inodes,
            fds: FdManager::new(),
            devices,
            cwd,
            root,
            identity: Identity {
                uid: options.uid.unwrap_or(DEFAULT_ROOT_UID),
                gid: options.gid.unwrap_or(DEFAULT_ROOT_GID),
            },
            umask: options.umask.unwrap_or(DEFAULT_UMASK),
        };
        if options.standard_layout.unwrap_or(false) {
            fs.build_standard_layout()?;
        }
        tracing::debug!(uid = fs.identity.uid, gid = fs.identity.gid, "created virtual filesystem");
        Ok(fs)
    }

    fn build_standard_layout(&mut self) -> FsResult<()> {
        let dev = self.create_root_owned(self.root, "dev", INodeSpec::Directory { parent: Some(self.root) }, 0o775)?;
        for &(name, major, minor) in STANDARD_DEVICE_NODES {
            self.create_root_owned(dev, name, INodeSpec::CharacterDev { rdev: mkdev(major, minor) }, 0o666)?;
        }
        self.create_root_owned(dev, "shm", INodeSpec::Directory { parent: Some(dev) }, 0o1777)?;
        self.create_root_owned(self.root, "tmp", INodeSpec::Directory { parent: Some(self.root) }, 0o1777)?;
        self.create_root_owned(self.root, "root", INodeSpec::Directory { parent: Some(self.root) }, 0o700)?;
        self.create_root_owned(self.root, "proc", INodeSpec::Directory { parent: Some(self.root) }, 0o555)?;
        Ok(())
    }

    fn create_root_owned(&mut self, dir: INodeIndex, name: &str, spec: INodeSpec, mode: u32) -> FsResult<INodeIndex> {
        let index = self.inodes.create(spec, INodeProps { mode, uid: DEFAULT_ROOT_UID, gid: DEFAULT_ROOT_GID })?;
        self.inodes.add_entry(dir, name, index)?;
        Ok(index)
    }

    // ========================================================================
    // Identity
    // ========================================================================

    pub fn uid(&self) -> u32 {
        self.identity.uid
    }

    pub fn gid(&self) -> u32 {
        self.identity.gid
    }

    pub fn umask(&self) -> u32 {
        self.umask
    }

    pub fn set_uid(&mut self, uid: u32) {
        self.identity.uid = uid;
    }

    pub fn set_gid(&mut self, gid: u32) {
        self.identity.gid = gid;
    }

    pub fn set_umask(&mut self, umask: u32) {
        self.umask = umask & ALLPERMS;
    }

    /// The inode table, for inspection.
    pub fn inodes(&self) -> &INodeManager {
        &self.inodes
    }

    pub fn root_index(&self) -> INodeIndex {
        self.root
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn nav(&self, path: &str, resolve_last_link: bool) -> FsResult<Navigated> {
        let ctx = NavContext { inodes: &self.inodes, identity: self.identity, root: self.root, cwd: &self.cwd };
        navigate(&ctx, path, resolve_last_link)
    }

    /// Navigate and require an existing target.
    fn existing(&self, path: &str, resolve_last_link: bool) -> FsResult<(Navigated, INodeIndex)> {
        let nav = self.nav(path, resolve_last_link)?;
        match nav.target {
            Some(target) => Ok((nav, target)),
            None => Err(Errno::ENOENT.at(path)),
        }
    }

    /// Navigate to a name that must not exist yet, in a live directory the
    /// caller may write to.
    fn creatable(&self, path: &str) -> FsResult<Navigated> {
        let nav = self.nav(path, false)?;
        self.check_creatable(&nav, path)?;
        Ok(nav)
    }

    fn check_creatable(&self, nav: &Navigated, path: &str) -> FsResult<()> {
        if nav.target.is_some() {
            return Err(Errno::EEXIST.at(path));
        }
        if !nav.remaining.is_empty() {
            return Err(Errno::ENOENT.at(path));
        }
        let dir = self.inode(nav.dir)?;
        if dir.stat().nlink < 2 {
            return Err(Errno::ENOENT.at(path));
        }
        if !self.identity.can(W_OK, dir.stat()) {
            return Err(Errno::EACCES.at(path));
        }
        Ok(())
    }

    fn inode(&self, index: INodeIndex) -> FsResult<&INode> {
        self.inodes.get(index).ok_or_else(|| Errno::ENOENT.into())
    }

    fn inode_mut(&mut self, index: INodeIndex) -> FsResult<&mut INode> {
        self.inodes.get_mut(index).ok_or_else(|| Errno::ENOENT.into())
    }

    fn can(&self, access: u32, index: INodeIndex) -> FsResult<bool> {
        Ok(self.identity.can(access, self.inode(index)?.stat()))
    }

    fn descriptor(&self, fd: Fd) -> FsResult<&FileDescriptor> {
        self.fds.get(fd).ok_or_else(|| Errno::EBADF.into())
    }

    fn props(&self, mode: u32) -> INodeProps {
        INodeProps { mode: apply_umask(mode & ALLPERMS, self.umask), uid: self.identity.uid, gid: self.identity.gid }
    }

    fn is_directory(&self, index: INodeIndex) -> bool {
        self.inodes.get(index).is_some_and(INode::is_directory)
    }

    // ========================================================================
    // Descriptors
    // ========================================================================

    /// Open `path`, returning a descriptor. `mode` (default 0o666) applies
    /// only when the file is created.
    pub fn open<'a>(
        &mut self,
        path: impl Into<PathArg<'a>>,
        flags: impl Into<OpenFlags>,
        mode: Option<u32>,
    ) -> FsResult<Fd> {
        let path = path.into().to_path_string()?;
        let flags = flags.into().bits()?;
        self.open_path(&path, flags, mode.unwrap_or(DEFAULT_FILE_PERM))
            .map_err(|e| e.paths(&path, None).syscall("open"))
    }

    fn open_path(&mut self, path: &str, flags: u32, mode: u32) -> FsResult<Fd> {
        let mut nav = self.nav(path, false)?;
        if let Some(target) = nav.target {
            if self.inode(target)?.is_symlink() {
                if flags & O_NOFOLLOW != 0 {
                    return Err(Errno::ELOOP.at(path));
                }
                nav = self.nav(path, true)?;
            }
        }
        let target = match nav.target {
            None => {
                if !nav.remaining.is_empty() || flags & O_CREAT == 0 {
                    return Err(Errno::ENOENT.at(path));
                }
                self.check_creatable(&nav, path)?;
                let props = self.props(mode);
                let file = self.inodes.create(INodeSpec::File { data: Vec::new() }, props)?;
                self.inodes.add_entry(nav.dir, &nav.name, file)?;
                file
            }
            Some(target) => {
                if flags & O_CREAT != 0 && flags & O_EXCL != 0 {
                    return Err(Errno::EEXIST.at(path));
                }
                let inode = self.inode(target)?;
                if inode.is_directory() && flags & (O_WRONLY | O_RDWR) != 0 {
                    return Err(Errno::EISDIR.at(path));
                }
                if flags & O_DIRECTORY != 0 && !inode.is_directory() {
                    return Err(Errno::ENOTDIR.at(path));
                }
                let mut access = 0;
                if can_read(flags) {
                    access |= R_OK;
                }
                if can_write(flags) {
                    access |= W_OK;
                }
                if !self.identity.can(access, inode.stat()) {
                    return Err(Errno::EACCES.at(path));
                }
                if flags & O_TRUNC != 0 && can_write(flags) {
                    if let Some(data) = inode.file_data().cloned() {
                        data.lock().clear();
                        let stat = self.inode_mut(target)?.stat_mut();
                        stat.size = 0;
                        stat.touch_modified();
                    }
                }
                target
            }
        };
        self.fds.create(&mut self.inodes, &self.devices, target, flags)
    }

    pub fn close(&mut self, fd: Fd) -> FsResult<()> {
        self.fds.delete(&mut self.inodes, &self.devices, fd).map_err(|e| e.syscall("close"))
    }

    /// Read into `buf`. With `position` the descriptor offset is left alone.
    pub fn read(&mut self, fd: Fd, buf: &mut [u8], position: Option<u64>) -> FsResult<usize> {
        let descriptor = self.fds.get_mut(fd).ok_or(Errno::EBADF).map_err(|e| FsError::from(e).syscall("read"))?;
        if !can_read(descriptor.flags()) {
            return Err(FsError::from(Errno::EBADF).syscall("read"));
        }
        descriptor.read(&mut self.inodes, &self.devices, buf, position).map_err(|e| e.syscall("read"))
    }

    pub fn write(&mut self, fd: Fd, buf: &[u8], position: Option<u64>) -> FsResult<usize> {
        self.write_with_flags(fd, buf, position, 0)
    }

    /// Write with extra flags (`O_APPEND`) applied to this call only.
    pub fn write_with_flags(&mut self, fd: Fd, buf: &[u8], position: Option<u64>, extra_flags: u32) -> FsResult<usize> {
        let descriptor = self.fds.get_mut(fd).ok_or(Errno::EBADF).map_err(|e| FsError::from(e).syscall("write"))?;
        if !can_write(descriptor.flags()) {
            return Err(FsError::from(Errno::EBADF).syscall("write"));
        }
        descriptor
            .write(&mut self.inodes, &self.devices, buf, position, extra_flags)
            .map_err(|e| e.syscall("write"))
    }

    pub fn lseek(&mut self, fd: Fd, offset: i64, whence: u32) -> FsResult<u64> {
        let descriptor = self.fds.get_mut(fd).ok_or(Errno::EBADF).map_err(|e| FsError::from(e).syscall("lseek"))?;
        descriptor.seek(&self.inodes, &self.devices, offset, whence).map_err(|e| e.syscall("lseek"))
    }

    /// No-op beyond validating `fd`; there is nothing to flush.
    pub fn fsync(&self, fd: Fd) -> FsResult<()> {
        self.descriptor(fd).map(|_| ()).map_err(|e| e.syscall("fsync"))
    }

    pub fn fdatasync(&self, fd: Fd) -> FsResult<()> {
        self.descriptor(fd).map(|_| ()).map_err(|e| e.syscall("fdatasync"))
    }

    // ========================================================================
    // Whole-file helpers
    // ========================================================================

    /// Read to end of file. A descriptor is read from its current offset and
    /// stays open; a path is opened and always closed again.
    pub fn read_file<'a>(&mut self, file: impl Into<FileRef<'a>>, options: &ReadFileOptions) -> FsResult<Vec<u8>> {
        match file.into() {
            FileRef::Fd(fd) => self.read_to_end(fd).map_err(|e| e.syscall("readFile")),
            FileRef::Path(path) => {
                let path = path.to_path_string()?;
                let flags = options.flag.clone().unwrap_or(OpenFlags::Bits(O_RDONLY)).bits()?;
                let fd = self.open_path(&path, flags, DEFAULT_FILE_PERM).map_err(|e| e.paths(&path, None).syscall("open"))?;
                let result = self.read_to_end(fd);
                let closed = self.close(fd);
                result.and_then(|data| closed.map(|_| data)).map_err(|e| e.paths(&path, None).syscall("readFile"))
            }
        }
    }

    /// [`read_file`](Self::read_file) decoded with the options' encoding (utf8 by default).
    pub fn read_file_string<'a>(
        &mut self,
        file: impl Into<FileRef<'a>>,
        options: &ReadFileOptions,
    ) -> FsResult<String> {
        let data = self.read_file(file, options)?;
        Ok(from_buffer(&data, options.encoding.unwrap_or_default()))
    }

    fn read_to_end(&mut self, fd: Fd) -> FsResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            let n = self.read(fd, &mut chunk, None)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }

    pub fn write_file<'a>(
        &mut self,
        file: impl Into<FileRef<'a>>,
        content: impl Into<FileContent>,
        options: &WriteFileOptions,
    ) -> FsResult<()> {
        let default_flags = O_WRONLY | O_CREAT | O_TRUNC;
        self.write_whole(file.into(), &content.into(), options, default_flags, "writeFile")
    }

    pub fn append_file<'a>(
        &mut self,
        file: impl Into<FileRef<'a>>,
        content: impl Into<FileContent>,
        options: &WriteFileOptions,
    ) -> FsResult<()> {
        let default_flags = O_WRONLY | O_CREAT | O_APPEND;
        self.write_whole(file.into(), &content.into(), options, default_flags, "appendFile")
    }

    fn write_whole(
        &mut self,
        file: FileRef<'_>,
        content: &FileContent,
        options: &WriteFileOptions,
        default_flags: u32,
        syscall: &'static str,
    ) -> FsResult<()> {
        let data = to_buffer(content, options.encoding.unwrap_or_default())?;
        match file {
            FileRef::Fd(fd) => self.write_all(fd, &data).map_err(|e| e.syscall(syscall)),
            FileRef::Path(path) => {
                let path = path.to_path_string()?;
                let flags = match &options.flag {
                    Some(flag) => flag.bits()?,
                    None => default_flags,
                };
                let mode = options.mode.unwrap_or(DEFAULT_FILE_PERM);
                let fd = self.open_path(&path, flags, mode).map_err(|e| e.paths(&path, None).syscall("open"))?;
                let result = self.write_all(fd, &data);
                let closed = self.close(fd);
                result.and(closed).map_err(|e| e.paths(&path, None).syscall(syscall))
            }
        }
    }

    fn write_all(&mut self, fd: Fd, mut data: &[u8]) -> FsResult<()> {
        while !data.is_empty() {
            let n = self.write(fd, data, None)?;
            if n == 0 {
                return Err(Errno::EIO.into());
            }
            data = &data[n..];
        }
        Ok(())
    }

    /// Resize a file by path or descriptor.
    pub fn truncate<'a>(&mut self, file: impl Into<FileRef<'a>>, len: u64) -> FsResult<()> {
        match file.into() {
            FileRef::Fd(fd) => self.ftruncate(fd, len),
            FileRef::Path(path) => {
                let path = path.to_path_string()?;
                let fd = self
                    .open_path(&path, O_WRONLY, DEFAULT_FILE_PERM)
                    .map_err(|e| e.paths(&path, None).syscall("truncate"))?;
                let result = self.ftruncate(fd, len);
                let closed = self.close(fd);
                result.and(closed).map_err(|e| e.paths(&path, None).syscall("truncate"))
            }
        }
    }

    pub fn ftruncate(&mut self, fd: Fd, len: u64) -> FsResult<()> {
        let descriptor = self.fds.get_mut(fd).ok_or(Errno::EBADF).map_err(|e| FsError::from(e).syscall("ftruncate"))?;
        let is_file = self.inodes.get(descriptor.inode()).is_some_and(INode::is_file);
        if !is_file || !can_write(descriptor.flags()) {
            return Err(FsError::from(Errno::EINVAL).syscall("ftruncate"));
        }
        descriptor.truncate(&mut self.inodes, len).map_err(|e| e.syscall("ftruncate"))
    }

    /// Copy a regular file's content and permission bits. `COPYFILE_EXCL`
    /// fails if `dest` exists.
    pub fn copy_file<'a, 'b>(
        &mut self,
        src: impl Into<PathArg<'a>>,
        dest: impl Into<PathArg<'b>>,
        flags: u32,
    ) -> FsResult<()> {
        let src = src.into().to_path_string()?;
        let dest = dest.into().to_path_string()?;
        self.copy_file_paths(&src, &dest, flags).map_err(|e| e.paths(&src, Some(&*dest)).syscall("copyfile"))
    }

    fn copy_file_paths(&mut self, src: &str, dest: &str, flags: u32) -> FsResult<()> {
        let (_, source) = self.existing(src, true)?;
        let stat = self.inode(source)?.stat();
        if stat.is_directory() {
            return Err(Errno::EISDIR.at(src));
        }
        let mode = stat.mode & ALLPERMS;
        let data = self.read_file(PathArg::Str(src), &ReadFileOptions::default())?;
        let mut open_flags = O_WRONLY | O_CREAT | O_TRUNC;
        if flags & COPYFILE_EXCL != 0 {
            open_flags |= O_EXCL;
        }
        let options = WriteFileOptions { mode: Some(mode), flag: Some(OpenFlags::Bits(open_flags)), ..Default::default() };
        self.write_file(PathArg::Str(dest), data, &options).map_err(|e| e.paths(dest, None))
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    pub fn stat<'a>(&self, path: impl Into<PathArg<'a>>) -> FsResult<Stat> {
        let path = path.into().to_path_string()?;
        self.stat_path(&path, true).map_err(|e| e.syscall("stat"))
    }

    pub fn lstat<'a>(&self, path: impl Into<PathArg<'a>>) -> FsResult<Stat> {
        let path = path.into().to_path_string()?;
        self.stat_path(&path, false).map_err(|e| e.syscall("lstat"))
    }

    fn stat_path(&self, path: &str, resolve_last_link: bool) -> FsResult<Stat> {
        let (_, target) = self.existing(path, resolve_last_link)?;
        Ok(self.inode(target)?.stat().clone())
    }

    pub fn fstat(&self, fd: Fd) -> FsResult<Stat> {
        let descriptor = self.descriptor(fd).map_err(|e| e.syscall("fstat"))?;
        Ok(self.inode(descriptor.inode())?.stat().clone())
    }

    /// Check `mode` (`F_OK` or a mask of `R_OK`/`W_OK`/`X_OK`) for the acting user.
    pub fn access<'a>(&self, path: impl Into<PathArg<'a>>, mode: u32) -> FsResult<()> {
        let path = path.into().to_path_string()?;
        let check = || -> FsResult<()> {
            let (_, target) = self.existing(&path, true)?;
            if mode != F_OK && !self.can(mode, target)? {
                return Err(Errno::EACCES.at(&*path));
            }
            Ok(())
        };
        check().map_err(|e| e.syscall("access"))
    }

    pub fn exists<'a>(&self, path: impl Into<PathArg<'a>>) -> bool {
        match path.into().to_path_string() {
            Ok(path) => self.stat_path(&path, true).is_ok(),
            Err(_) => false,
        }
    }

    // ========================================================================
    // Directories
    // ========================================================================

    /// Create a directory. Every parent must already exist.
    pub fn mkdir<'a>(&mut self, path: impl Into<PathArg<'a>>, mode: Option<u32>) -> FsResult<()> {
        let path = path.into().to_path_string()?;
        self.mkdir_path(trim_trailing_slashes(&path), mode.unwrap_or(DEFAULT_DIRECTORY_PERM))
            .map_err(|e| e.paths(&path, None).syscall("mkdir"))
    }

    fn mkdir_path(&mut self, path: &str, mode: u32) -> FsResult<()> {
        let nav = self.creatable(path)?;
        let props = self.props(mode);
        let dir = self.inodes.create(INodeSpec::Directory { parent: Some(nav.dir) }, props)?;
        self.inodes.add_entry(nav.dir, &nav.name, dir)
    }

    /// Create a directory and any missing parents. Existing directories along
    /// the way, including the last, are fine.
    pub fn mkdirp<'a>(&mut self, path: impl Into<PathArg<'a>>, mode: Option<u32>) -> FsResult<()> {
        let path = path.into().to_path_string()?;
        let mode = mode.unwrap_or(DEFAULT_DIRECTORY_PERM);
        let trimmed = trim_trailing_slashes(&path);
        let mut prefix = if trimmed.starts_with('/') { String::from("/") } else { String::new() };
        let create = |fs: &mut Self, prefix: &str| -> FsResult<()> {
            let nav = fs.nav(prefix, true)?;
            match nav.target {
                Some(target) if fs.is_directory(target) => Ok(()),
                Some(_) => Err(Errno::ENOTDIR.at(prefix)),
                None => fs.mkdir_path(prefix, mode),
            }
        };
        for segment in trimmed.split('/').filter(|s| !s.is_empty()) {
            if !prefix.is_empty() && !prefix.ends_with('/') {
                prefix.push('/');
            }
            prefix.push_str(segment);
            create(self, &prefix).map_err(|e| e.paths(&path, None).syscall("mkdir"))?;
        }
        Ok(())
    }

    /// Create a uniquely named directory `prefix` + six random characters.
    pub fn mkdtemp(&mut self, prefix: &str) -> FsResult<String> {
        loop {
            let suffix: String = rand::thread_rng().sample_iter(&Alphanumeric).take(6).map(char::from).collect();
            let path = format!("{}{}", prefix, suffix);
            match self.mkdir_path(&path, 0o700) {
                Ok(()) => return Ok(path),
                Err(e) if e.errno() == Some(Errno::EEXIST) => continue,
                Err(e) => return Err(e.paths(&path, None).syscall("mkdtemp")),
            }
        }
    }

    pub fn rmdir<'a>(&mut self, path: impl Into<PathArg<'a>>) -> FsResult<()> {
        let path = path.into().to_path_string()?;
        self.rmdir_path(trim_trailing_slashes(&path)).map_err(|e| e.paths(&path, None).syscall("rmdir"))
    }

    fn rmdir_path(&mut self, path: &str) -> FsResult<()> {
        let (nav, target) = self.existing(path, false)?;
        let dir = self.inode(target)?.as_directory().ok_or_else(|| Errno::ENOTDIR.at(path))?;
        if target == self.root || nav.name.is_empty() {
            return Err(Errno::EBUSY.at(path));
        }
        if nav.name == "." {
            return Err(Errno::EINVAL.at(path));
        }
        if nav.name == ".." || !dir.is_empty() {
            return Err(Errno::ENOTEMPTY.at(path));
        }
        if !self.can(W_OK, nav.dir)? {
            return Err(Errno::EACCES.at(path));
        }
        self.inodes.delete_entry(nav.dir, &nav.name)
    }

    /// Entry names, sorted, without `.` and `..`.
    pub fn readdir<'a>(&mut self, path: impl Into<PathArg<'a>>) -> FsResult<Vec<String>> {
        let path = path.into().to_path_string()?;
        let entries = self.dir_entries(&path).map_err(|e| e.paths(&path, None).syscall("scandir"))?;
        Ok(entries.into_iter().map(|(name, _)| name).collect())
    }

    pub fn readdir_with_file_types<'a>(&mut self, path: impl Into<PathArg<'a>>) -> FsResult<Vec<DirentEntry>> {
        let path = path.into().to_path_string()?;
        let entries = self.dir_entries(&path).map_err(|e| e.paths(&path, None).syscall("scandir"))?;
        entries
            .into_iter()
            .map(|(name, index)| -> FsResult<DirentEntry> { Ok(DirentEntry::new(name, self.inode(index)?.stat())) })
            .collect()
    }

    fn dir_entries(&mut self, path: &str) -> FsResult<Vec<(String, INodeIndex)>> {
        let (_, target) = self.existing(path, true)?;
        if !self.is_directory(target) {
            return Err(Errno::ENOTDIR.at(path));
        }
        if !self.can(R_OK, target)? {
            return Err(Errno::EACCES.at(path));
        }
        let mut entries: Vec<(String, INodeIndex)> = self
            .inodes
            .entries(target)?
            .into_iter()
            .filter(|(name, _)| name != "." && name != "..")
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    // ========================================================================
    // Links
    // ========================================================================

    /// Hardlink `existing` as `new`. Directories cannot be hardlinked.
    pub fn link<'a, 'b>(&mut self, existing: impl Into<PathArg<'a>>, new: impl Into<PathArg<'b>>) -> FsResult<()> {
        let existing = existing.into().to_path_string()?;
        let new = new.into().to_path_string()?;
        self.link_paths(&existing, &new).map_err(|e| e.paths(&existing, Some(&*new)).syscall("link"))
    }

    fn link_paths(&mut self, existing: &str, new: &str) -> FsResult<()> {
        let (_, target) = self.existing(existing, false)?;
        if self.is_directory(target) {
            return Err(Errno::EPERM.at(existing));
        }
        let nav = self.creatable(new)?;
        self.inodes.add_entry(nav.dir, &nav.name, target)?;
        self.inode_mut(target)?.stat_mut().touch_changed();
        Ok(())
    }

    pub fn unlink<'a>(&mut self, path: impl Into<PathArg<'a>>) -> FsResult<()> {
        let path = path.into().to_path_string()?;
        self.unlink_path(&path).map_err(|e| e.paths(&path, None).syscall("unlink"))
    }

    fn unlink_path(&mut self, path: &str) -> FsResult<()> {
        let (nav, target) = self.existing(path, false)?;
        if self.is_directory(target) {
            return Err(Errno::EISDIR.at(path));
        }
        if !self.can(W_OK, nav.dir)? {
            return Err(Errno::EACCES.at(path));
        }
        self.inode_mut(target)?.stat_mut().touch_changed();
        self.inodes.delete_entry(nav.dir, &nav.name)
    }

    /// Create a symlink at `path` pointing at `target`. The target is stored
    /// verbatim and need not exist.
    pub fn symlink<'a, 'b>(&mut self, target: impl Into<PathArg<'a>>, path: impl Into<PathArg<'b>>) -> FsResult<()> {
        let target = target.into().to_path_string()?;
        let path = path.into().to_path_string()?;
        let create = |fs: &mut Self| -> FsResult<()> {
            if target.is_empty() {
                return Err(Errno::ENOENT.at(&*target));
            }
            let nav = fs.creatable(&path)?;
            let props = INodeProps { mode: DEFAULT_SYMLINK_PERM, uid: fs.identity.uid, gid: fs.identity.gid };
            let link = fs.inodes.create(INodeSpec::Symlink { target: target.to_string() }, props)?;
            fs.inodes.add_entry(nav.dir, &nav.name, link)
        };
        create(self).map_err(|e| e.paths(&target, Some(&*path)).syscall("symlink"))
    }

    pub fn readlink<'a>(&self, path: impl Into<PathArg<'a>>) -> FsResult<String> {
        let path = path.into().to_path_string()?;
        let read = || -> FsResult<String> {
            let (_, target) = self.existing(&path, false)?;
            self.inode(target)?
                .symlink_target()
                .map(str::to_string)
                .ok_or_else(|| Errno::EINVAL.at(&*path))
        };
        read().map_err(|e| e.syscall("readlink"))
    }

    /// Canonical absolute path with every symlink resolved.
    pub fn realpath<'a>(&self, path: impl Into<PathArg<'a>>) -> FsResult<String> {
        let path = path.into().to_path_string()?;
        self.existing(&path, true).map(|(nav, _)| nav.canonical_path()).map_err(|e| e.syscall("realpath"))
    }

    /// Move `old` to `new`, replacing a compatible existing target. A trailing
    /// slash on either operand requires the source to be a directory.
    pub fn rename<'a, 'b>(&mut self, old: impl Into<PathArg<'a>>, new: impl Into<PathArg<'b>>) -> FsResult<()> {
        let old = old.into().to_path_string()?;
        let new = new.into().to_path_string()?;
        let must_be_dir = has_trailing_slash(&old) || has_trailing_slash(&new);
        self.rename_paths(trim_trailing_slashes(&old), trim_trailing_slashes(&new), must_be_dir)
            .map_err(|e| e.paths(&old, Some(&*new)).syscall("rename"))
    }

    fn rename_paths(&mut self, old: &str, new: &str, must_be_dir: bool) -> FsResult<()> {
        let (src, source) = self.existing(old, false)?;
        if must_be_dir && !self.is_directory(source) {
            return Err(Errno::ENOTDIR.at(old));
        }
        let dst = self.nav(new, false)?;
        if source == self.root || src.name.is_empty() || dst.name.is_empty() || dst.target == Some(self.root) {
            return Err(Errno::EBUSY.at(old));
        }
        if src.name == "." || src.name == ".." || dst.name == "." || dst.name == ".." {
            return Err(Errno::EBUSY.at(old));
        }
        if !dst.remaining.is_empty() {
            return Err(Errno::ENOENT.at(new));
        }
        if self.is_directory(source) {
            if let Some(existing) = dst.target {
                let dir = self.inode(existing)?.as_directory().ok_or_else(|| Errno::ENOTDIR.at(new))?;
                if existing != source && !dir.is_empty() {
                    return Err(Errno::ENOTEMPTY.at(new));
                }
            }
            let mut dst_stack = dst.path_stack.clone();
            if dst.target.is_none() {
                dst_stack.push(dst.name.clone());
            }
            if dst_stack.len() > src.path_stack.len() && dst_stack.starts_with(&src.path_stack) {
                return Err(Errno::EINVAL.at(old));
            }
        } else if dst.target.is_some_and(|t| self.is_directory(t)) {
            return Err(Errno::EISDIR.at(new));
        }
        if !self.can(W_OK, src.dir)? || !self.can(W_OK, dst.dir)? {
            return Err(Errno::EACCES.at(old));
        }
        if self.inode(dst.dir)?.stat().nlink < 2 {
            return Err(Errno::ENOENT.at(new));
        }
        if dst.target == Some(source) {
            return Ok(());
        }

        if dst.target.is_some() {
            self.inodes.delete_entry(dst.dir, &dst.name)?;
        }
        if src.dir == dst.dir {
            self.inodes.rename_entry(src.dir, &src.name, &dst.name)?;
        } else {
            self.inodes.add_entry(dst.dir, &dst.name, source)?;
            self.inodes.delete_entry(src.dir, &src.name)?;
            if self.is_directory(source) {
                self.inodes.reparent(source, dst.dir)?;
            }
        }
        self.inode_mut(source)?.stat_mut().touch_changed();
        tracing::debug!(from = old, to = new, ino = source, "renamed");
        Ok(())
    }

    // ========================================================================
    // Ownership, permissions and times
    // ========================================================================

    pub fn chmod<'a>(&mut self, path: impl Into<PathArg<'a>>, mode: u32) -> FsResult<()> {
        let path = path.into().to_path_string()?;
        self.chmod_path(&path, true, mode).map_err(|e| e.paths(&path, None).syscall("chmod"))
    }

    pub fn lchmod<'a>(&mut self, path: impl Into<PathArg<'a>>, mode: u32) -> FsResult<()> {
        let path = path.into().to_path_string()?;
        self.chmod_path(&path, false, mode).map_err(|e| e.paths(&path, None).syscall("lchmod"))
    }

    pub fn fchmod(&mut self, fd: Fd, mode: u32) -> FsResult<()> {
        let target = self.descriptor(fd).map_err(|e| e.syscall("fchmod"))?.inode();
        self.chmod_inode(target, mode).map_err(|e| e.syscall("fchmod"))
    }

    fn chmod_path(&mut self, path: &str, resolve_last_link: bool, mode: u32) -> FsResult<()> {
        let (_, target) = self.existing(path, resolve_last_link)?;
        self.chmod_inode(target, mode)
    }

    fn chmod_inode(&mut self, target: INodeIndex, mode: u32) -> FsResult<()> {
        let identity = self.identity;
        let stat = self.inode_mut(target)?.stat_mut();
        if !identity.is_root() && identity.uid != stat.uid {
            return Err(Errno::EPERM.into());
        }
        stat.mode = (stat.mode & S_IFMT) | (mode & ALLPERMS);
        stat.touch_changed();
        Ok(())
    }

    pub fn chown<'a>(&mut self, path: impl Into<PathArg<'a>>, uid: u32, gid: u32) -> FsResult<()> {
        let path = path.into().to_path_string()?;
        self.chown_path(&path, true, uid, gid).map_err(|e| e.paths(&path, None).syscall("chown"))
    }

    pub fn lchown<'a>(&mut self, path: impl Into<PathArg<'a>>, uid: u32, gid: u32) -> FsResult<()> {
        let path = path.into().to_path_string()?;
        self.chown_path(&path, false, uid, gid).map_err(|e| e.paths(&path, None).syscall("lchown"))
    }

    pub fn fchown(&mut self, fd: Fd, uid: u32, gid: u32) -> FsResult<()> {
        let target = self.descriptor(fd).map_err(|e| e.syscall("fchown"))?.inode();
        self.chown_inode(target, uid, gid).map_err(|e| e.syscall("fchown"))
    }

    fn chown_path(&mut self, path: &str, resolve_last_link: bool, uid: u32, gid: u32) -> FsResult<()> {
        let (_, target) = self.existing(path, resolve_last_link)?;
        self.chown_inode(target, uid, gid)
    }

    /// Root may set any owner. Anyone else must own the inode, keep
    /// themselves as owner, and may only switch the group to their own.
    fn chown_inode(&mut self, target: INodeIndex, uid: u32, gid: u32) -> FsResult<()> {
        let identity = self.identity;
        let stat = self.inode_mut(target)?.stat_mut();
        if !identity.is_root() {
            let owns = identity.uid == stat.uid && uid == identity.uid;
            let group_ok = gid == stat.gid || gid == identity.gid;
            if !owns || !group_ok {
                return Err(Errno::EPERM.into());
            }
        }
        stat.uid = uid;
        stat.gid = gid;
        stat.touch_changed();
        Ok(())
    }

    pub fn utimes<'a>(&mut self, path: impl Into<PathArg<'a>>, atime: SystemTime, mtime: SystemTime) -> FsResult<()> {
        let path = path.into().to_path_string()?;
        let result = self.existing(&path, true).and_then(|(_, target)| self.utimes_inode(target, atime, mtime));
        result.map_err(|e| e.paths(&path, None).syscall("utime"))
    }

    pub fn futimes(&mut self, fd: Fd, atime: SystemTime, mtime: SystemTime) -> FsResult<()> {
        let target = self.descriptor(fd).map_err(|e| e.syscall("futime"))?.inode();
        self.utimes_inode(target, atime, mtime).map_err(|e| e.syscall("futime"))
    }

    fn utimes_inode(&mut self, target: INodeIndex, atime: SystemTime, mtime: SystemTime) -> FsResult<()> {
        let identity = self.identity;
        let stat = self.inode_mut(target)?.stat_mut();
        if !identity.is_root() && identity.uid != stat.uid {
            return Err(Errno::EPERM.into());
        }
        stat.atime = atime;
        stat.mtime = mtime;
        stat.touch_changed();
        Ok(())
    }

    // ========================================================================
    // Working directory
    // ========================================================================

    pub fn chdir<'a>(&mut self, path: impl Into<PathArg<'a>>) -> FsResult<()> {
        let path = path.into().to_path_string()?;
        let (nav, target) = self.existing(&path, true).map_err(|e| e.syscall("chdir"))?;
        if !self.is_directory(target) {
            return Err(Errno::ENOTDIR.at(&*path).syscall("chdir"));
        }
        if !self.can(X_OK, target)? {
            return Err(Errno::EACCES.at(&*path).syscall("chdir"));
        }
        self.cwd.change_dir(&mut self.inodes, target, nav.path_stack);
        Ok(())
    }

    pub fn get_cwd(&self) -> String {
        self.cwd.path()
    }

    // ========================================================================
    // Devices and mmap
    // ========================================================================

    /// Create a character-device node. Only `S_IFCHR` is supported.
    pub fn mknod<'a>(&mut self, path: impl Into<PathArg<'a>>, mode: u32, major: u32, minor: u32) -> FsResult<()> {
        let path = path.into().to_path_string()?;
        if mode & S_IFMT != S_IFCHR {
            return Err(FsError::type_error("mknod only supports character devices"));
        }
        if major > MAJOR_MAX || minor > MINOR_MAX {
            return Err(Errno::EINVAL.at(&*path).syscall("mknod"));
        }
        let create = |fs: &mut Self| -> FsResult<()> {
            let nav = fs.creatable(&path)?;
            let props = fs.props(mode);
            let node = fs.inodes.create(INodeSpec::CharacterDev { rdev: mkdev(major, minor) }, props)?;
            fs.inodes.add_entry(nav.dir, &nav.name, node)
        };
        create(self).map_err(|e| e.paths(&path, None).syscall("mknod"))
    }

    /// Register a character device; `None` numbers are auto-allocated.
    pub fn register_character_device(
        &mut self,
        device: Arc<dyn CharacterDevice>,
        major: Option<u32>,
        minor: Option<u32>,
    ) -> Result<(u32, u32), DeviceError> {
        self.devices.register_chr(device, major, minor)
    }

    pub fn deregister_character_device(&mut self, major: u32, minor: u32) -> Option<Arc<dyn CharacterDevice>> {
        self.devices.deregister_chr(major, minor)
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    /// Map the first `len` bytes of an open regular file.
    pub fn mmap(&self, fd: Fd, len: usize, flags: u32) -> FsResult<MmapView> {
        let map = || -> FsResult<MmapView> {
            let descriptor = self.descriptor(fd)?;
            let data = match self.inode(descriptor.inode())?.kind() {
                INodeKind::File(data) => data.clone(),
                _ => return Err(Errno::ENODEV.into()),
            };
            if len == 0 {
                return Err(Errno::EINVAL.into());
            }
            if !can_read(descriptor.flags()) {
                return Err(Errno::EACCES.into());
            }
            match flags {
                MAP_PRIVATE => {
                    let bytes = data.lock();
                    Ok(MmapView::Private(bytes[..len.min(bytes.len())].to_vec()))
                }
                MAP_SHARED => {
                    if descriptor.flags() & O_ACCMODE != O_RDWR {
                        return Err(Errno::EACCES.into());
                    }
                    Ok(MmapView::Shared { inode: descriptor.inode(), data, len })
                }
                _ => Err(Errno::EINVAL.into()),
            }
        };
        map().map_err(|e| e.syscall("mmap"))
    }

    /// Write into a mapped view. Shared writes land in the file and update
    /// its mtime and ctime; private writes touch only the copy.
    pub fn write_mapped(&mut self, view: &mut MmapView, offset: usize, bytes: &[u8]) -> FsResult<usize> {
        let n = view.write_at(offset, bytes)?;
        if let MmapView::Shared { inode, data, .. } = view {
            // the mapped inode may be gone and its index reused
            if let Some(node) = self.inodes.get_mut(*inode) {
                if n > 0 && node.file_data().is_some_and(|d| d.ptr_eq(data)) {
                    node.stat_mut().touch_modified();
                }
            }
        }
        Ok(n)
    }
}
