//! File Descriptors
//!
//! A descriptor pins its inode for as long as it is open and carries the open
//! flags plus a byte offset. Descriptor numbers come from their own index space
//! starting at 0, independent of inode indices.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::constants::*;
use crate::counter::IndexCounter;
use crate::devices::{unmkdev, CharacterDevice, DeviceRegistry};
use crate::error::{Errno, FsError, FsResult};
use crate::inode::{FileData, INodeIndex, INodeKind, INodeManager};

/// An open descriptor number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fd(pub u32);

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Fd {
    fn from(fd: u32) -> Self {
        Fd(fd)
    }
}

#[derive(Debug, Clone)]
pub struct FileDescriptor {
    inode: INodeIndex,
    flags: u32,
    pos: u64,
}

/// What a descriptor's inode is, captured so no inode borrow outlives the lookup.
enum Target {
    File(FileData),
    Directory,
    Device(Arc<dyn CharacterDevice>),
}

impl FileDescriptor {
    pub fn new(inode: INodeIndex, flags: u32) -> Self {
        Self { inode, flags, pos: 0 }
    }

    pub fn inode(&self) -> INodeIndex {
        self.inode
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn set_position(&mut self, pos: u64) {
        self.pos = pos;
    }

    fn target(&self, inodes: &INodeManager, devices: &DeviceRegistry) -> FsResult<Target> {
        let inode = inodes.get(self.inode).ok_or(Errno::EBADF)?;
        match inode.kind() {
            INodeKind::File(data) => Ok(Target::File(data.clone())),
            INodeKind::Directory(_) => Ok(Target::Directory),
            INodeKind::CharacterDev => {
                let (major, minor) = unmkdev(inode.stat().rdev);
                devices.get_chr(major, minor).map(Target::Device).ok_or_else(|| Errno::ENXIO.into())
            }
            INodeKind::Symlink(_) => Err(FsError::type_error("descriptor refers to a symlink")),
        }
    }

    /// Read into `buf` from `position`, or from (and advancing) the stored
    /// offset when `position` is `None`.
    pub fn read(
        &mut self,
        inodes: &mut INodeManager,
        devices: &DeviceRegistry,
        buf: &mut [u8],
        position: Option<u64>,
    ) -> FsResult<usize> {
        let start = position.unwrap_or(self.pos);
        let read = match self.target(inodes, devices)? {
            Target::File(data) => {
                let data = data.lock();
                let start = usize::try_from(start).unwrap_or(usize::MAX).min(data.len());
                let n = buf.len().min(data.len() - start);
                buf[..n].copy_from_slice(&data[start..start + n]);
                n
            }
            Target::Directory => return Err(Errno::EISDIR.into()),
            Target::Device(device) => device.read(self, buf, start)?,
        };
        if let Some(inode) = inodes.get_mut(self.inode) {
            inode.stat_mut().touch_accessed();
        }
        if position.is_none() {
            self.pos += read as u64;
        }
        Ok(read)
    }

    /// Write `buf` at `position`, or at (and advancing) the stored offset.
    /// `O_APPEND` in the open flags or `extra_flags` forces end-of-data.
    pub fn write(
        &mut self,
        inodes: &mut INodeManager,
        devices: &DeviceRegistry,
        buf: &[u8],
        position: Option<u64>,
        extra_flags: u32,
    ) -> FsResult<usize> {
        let mut start = position.unwrap_or(self.pos);
        let written = match self.target(inodes, devices)? {
            Target::File(data) => {
                let mut data = data.lock();
                if (self.flags | extra_flags) & O_APPEND != 0 {
                    start = data.len() as u64;
                }
                let offset = usize::try_from(start).map_err(|_| Errno::EFBIG)?;
                let end = offset.checked_add(buf.len()).ok_or(Errno::EFBIG)?;
                if end > data.len() {
                    let grow = end - data.len();
                    data.try_reserve(grow).map_err(|_| Errno::ENOSPC)?;
                    data.resize(end, 0);
                }
                data[offset..end].copy_from_slice(buf);
                let size = data.len() as u64;
                drop(data);
                if let Some(inode) = inodes.get_mut(self.inode) {
                    let stat = inode.stat_mut();
                    stat.size = size;
                    stat.touch_modified();
                }
                buf.len()
            }
            Target::Directory => return Err(Errno::EISDIR.into()),
            Target::Device(device) => {
                let n = device.write(self, buf, start, extra_flags)?;
                if let Some(inode) = inodes.get_mut(self.inode) {
                    inode.stat_mut().touch_modified();
                }
                n
            }
        };
        if position.is_none() {
            self.pos = start + written as u64;
        }
        Ok(written)
    }

    /// Move the stored offset. Returns the new offset.
    pub fn seek(
        &mut self,
        inodes: &INodeManager,
        devices: &DeviceRegistry,
        offset: i64,
        whence: u32,
    ) -> FsResult<u64> {
        let target = self.target(inodes, devices)?;
        if let Target::Device(device) = &target {
            device.set_pos(self, offset, whence)?;
            return Ok(self.pos);
        }
        let base = match whence {
            SEEK_SET => 0,
            SEEK_CUR => self.pos as i64,
            SEEK_END => match &target {
                Target::File(data) => data.len() as i64,
                _ => 0,
            },
            _ => return Err(Errno::EINVAL.into()),
        };
        let pos = base.checked_add(offset).filter(|p| *p >= 0).ok_or(Errno::EINVAL)?;
        self.pos = pos as u64;
        Ok(self.pos)
    }

    /// Resize the file to `len`, zero-filling growth, and clamp the offset.
    pub fn truncate(&mut self, inodes: &mut INodeManager, len: u64) -> FsResult<()> {
        let inode = inodes.get_mut(self.inode).ok_or(Errno::EBADF)?;
        let Some(data) = inode.file_data().cloned() else {
            return Err(Errno::EINVAL.into());
        };
        let len_usize = usize::try_from(len).map_err(|_| Errno::EFBIG)?;
        {
            let mut data = data.lock();
            if len_usize > data.len() {
                let grow = len_usize - data.len();
                data.try_reserve(grow).map_err(|_| Errno::ENOSPC)?;
            }
            data.resize(len_usize, 0);
        }
        let stat = inode.stat_mut();
        stat.size = len;
        stat.touch_modified();
        self.pos = self.pos.min(len);
        Ok(())
    }
}

// ============================================================================
// Descriptor table
// ============================================================================

#[derive(Debug)]
pub struct FdManager {
    fds: HashMap<Fd, FileDescriptor>,
    counter: IndexCounter,
}

impl Default for FdManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FdManager {
    pub fn new() -> Self {
        Self { fds: HashMap::new(), counter: IndexCounter::new(0) }
    }

    /// Open a descriptor on `inode`, pinning it and running the device open
    /// hook for character devices.
    pub fn create(
        &mut self,
        inodes: &mut INodeManager,
        devices: &DeviceRegistry,
        inode: INodeIndex,
        flags: u32,
    ) -> FsResult<Fd> {
        let mut descriptor = FileDescriptor::new(inode, flags);
        if let Target::Device(device) = descriptor.target(inodes, devices)? {
            device.open(&mut descriptor)?;
        }
        let fd = u32::try_from(self.counter.allocate()).map(Fd).map_err(|_| Errno::EMFILE)?;
        inodes.pin(inode);
        self.fds.insert(fd, descriptor);
        tracing::debug!(fd = fd.0, ino = inode, flags = format_args!("{:o}", flags), "opened descriptor");
        Ok(fd)
    }

    pub fn get(&self, fd: Fd) -> Option<&FileDescriptor> {
        self.fds.get(&fd)
    }

    pub fn get_mut(&mut self, fd: Fd) -> Option<&mut FileDescriptor> {
        self.fds.get_mut(&fd)
    }

    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// Close `fd`: device close hook first, then unpin the inode.
    pub fn delete(&mut self, inodes: &mut INodeManager, devices: &DeviceRegistry, fd: Fd) -> FsResult<()> {
        let mut descriptor = self.fds.remove(&fd).ok_or(Errno::EBADF)?;
        self.counter.deallocate(u64::from(fd.0));
        let closed = match descriptor.target(inodes, devices) {
            Ok(Target::Device(device)) => device.close(&mut descriptor),
            _ => Ok(()),
        };
        inodes.unpin(descriptor.inode());
        tracing::debug!(fd = fd.0, ino = descriptor.inode(), "closed descriptor");
        closed
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::mkdev;
    use crate::inode::{INodeProps, INodeSpec};

    struct Setup {
        inodes: INodeManager,
        devices: DeviceRegistry,
        root: INodeIndex,
    }

    fn setup() -> Setup {
        let mut inodes = INodeManager::new();
        let root = inodes
            .create(INodeSpec::Directory { parent: None }, INodeProps { mode: 0o755, uid: 0, gid: 0 })
            .unwrap();
        inodes.pin(root);
        let devices = DeviceRegistry::with_standard_devices().unwrap();
        Setup { inodes, devices, root }
    }

    fn file(s: &mut Setup, name: &str, data: &[u8]) -> INodeIndex {
        let index = s
            .inodes
            .create(INodeSpec::File { data: data.to_vec() }, INodeProps { mode: 0o644, uid: 0, gid: 0 })
            .unwrap();
        s.inodes.add_entry(s.root, name, index).unwrap();
        index
    }

    fn content(s: &Setup, index: INodeIndex) -> Vec<u8> {
        s.inodes.get(index).unwrap().file_data().unwrap().to_vec()
    }

    #[test]
    fn test_read_advances_position() {
        let mut s = setup();
        let f = file(&mut s, "f", b"hello world");
        let mut fd = FileDescriptor::new(f, O_RDONLY);
        let mut buf = [0u8; 5];
        assert_eq!(fd.read(&mut s.inodes, &s.devices, &mut buf, None).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(fd.position(), 5);
        let mut rest = [0u8; 32];
        assert_eq!(fd.read(&mut s.inodes, &s.devices, &mut rest, None).unwrap(), 6);
        assert_eq!(&rest[..6], b" world");
        assert_eq!(fd.read(&mut s.inodes, &s.devices, &mut rest, None).unwrap(), 0);
    }

    #[test]
    fn test_positional_read_keeps_offset() {
        let mut s = setup();
        let f = file(&mut s, "f", b"abcdef");
        let mut fd = FileDescriptor::new(f, O_RDONLY);
        let mut buf = [0u8; 2];
        fd.read(&mut s.inodes, &s.devices, &mut buf, Some(3)).unwrap();
        assert_eq!(&buf, b"de");
        assert_eq!(fd.position(), 0);
        assert_eq!(fd.read(&mut s.inodes, &s.devices, &mut buf, Some(100)).unwrap(), 0);
    }

    #[test]
    fn test_write_past_end_zero_fills() {
        let mut s = setup();
        let f = file(&mut s, "f", b"ab");
        let mut fd = FileDescriptor::new(f, O_WRONLY);
        fd.write(&mut s.inodes, &s.devices, b"z", Some(4), 0).unwrap();
        assert_eq!(content(&s, f), b"ab\0\0z");
        assert_eq!(s.inodes.get(f).unwrap().stat().size, 5);
        assert_eq!(fd.position(), 0);
    }

    #[test]
    fn test_overwrite_in_place() {
        let mut s = setup();
        let f = file(&mut s, "f", b"abcdef");
        let mut fd = FileDescriptor::new(f, O_RDWR);
        fd.write(&mut s.inodes, &s.devices, b"XY", None, 0).unwrap();
        assert_eq!(content(&s, f), b"XYcdef");
        assert_eq!(fd.position(), 2);
    }

    #[test]
    fn test_append_forces_end() {
        let mut s = setup();
        let f = file(&mut s, "f", b"abc");
        let mut fd = FileDescriptor::new(f, O_WRONLY | O_APPEND);
        fd.write(&mut s.inodes, &s.devices, b"d", Some(0), 0).unwrap();
        assert_eq!(content(&s, f), b"abcd");
        fd.write(&mut s.inodes, &s.devices, b"e", None, 0).unwrap();
        assert_eq!(content(&s, f), b"abcde");
        assert_eq!(fd.position(), 5);

        let mut plain = FileDescriptor::new(f, O_WRONLY);
        plain.write(&mut s.inodes, &s.devices, b"!", Some(0), O_APPEND).unwrap();
        assert_eq!(content(&s, f), b"abcde!");
    }

    #[test]
    fn test_directory_io_is_eisdir() {
        let mut s = setup();
        let mut fd = FileDescriptor::new(s.root, O_RDONLY);
        let mut buf = [0u8; 4];
        let err = fd.read(&mut s.inodes, &s.devices, &mut buf, None).unwrap_err();
        assert_eq!(err.errno(), Some(Errno::EISDIR));
    }

    #[test]
    fn test_seek_whence() {
        let mut s = setup();
        let f = file(&mut s, "f", b"0123456789");
        let mut fd = FileDescriptor::new(f, O_RDONLY);
        assert_eq!(fd.seek(&s.inodes, &s.devices, 4, SEEK_SET).unwrap(), 4);
        assert_eq!(fd.seek(&s.inodes, &s.devices, 2, SEEK_CUR).unwrap(), 6);
        assert_eq!(fd.seek(&s.inodes, &s.devices, -3, SEEK_END).unwrap(), 7);
        let err = fd.seek(&s.inodes, &s.devices, -1, SEEK_SET).unwrap_err();
        assert_eq!(err.errno(), Some(Errno::EINVAL));
        assert_eq!(fd.position(), 7);
        let err = fd.seek(&s.inodes, &s.devices, 0, 42).unwrap_err();
        assert_eq!(err.errno(), Some(Errno::EINVAL));
    }

    #[test]
    fn test_truncate_grows_and_clamps() {
        let mut s = setup();
        let f = file(&mut s, "f", b"abcdef");
        let mut fd = FileDescriptor::new(f, O_RDWR);
        fd.set_position(6);
        fd.truncate(&mut s.inodes, 2).unwrap();
        assert_eq!(content(&s, f), b"ab");
        assert_eq!(fd.position(), 2);
        fd.truncate(&mut s.inodes, 4).unwrap();
        assert_eq!(content(&s, f), b"ab\0\0");
        assert_eq!(s.inodes.get(f).unwrap().stat().size, 4);
    }

    #[test]
    fn test_device_read_delegates() {
        let mut s = setup();
        let dev = s
            .inodes
            .create(INodeSpec::CharacterDev { rdev: mkdev(1, 5) }, INodeProps { mode: 0o666, uid: 0, gid: 0 })
            .unwrap();
        s.inodes.add_entry(s.root, "zero", dev).unwrap();
        let mut fd = FileDescriptor::new(dev, O_RDONLY);
        let mut buf = [9u8; 3];
        assert_eq!(fd.read(&mut s.inodes, &s.devices, &mut buf, None).unwrap(), 3);
        assert_eq!(buf, [0, 0, 0]);
    }

    #[test]
    fn test_unregistered_device_is_enxio() {
        let mut s = setup();
        let dev = s
            .inodes
            .create(INodeSpec::CharacterDev { rdev: mkdev(200, 1) }, INodeProps { mode: 0o666, uid: 0, gid: 0 })
            .unwrap();
        s.inodes.add_entry(s.root, "nodev", dev).unwrap();
        let mut fds = FdManager::new();
        let err = fds.create(&mut s.inodes, &s.devices, dev, O_RDONLY).unwrap_err();
        assert_eq!(err.errno(), Some(Errno::ENXIO));
        assert_eq!(s.inodes.get(dev).unwrap().pins(), 0);
        assert!(fds.is_empty());
    }

    #[test]
    fn test_manager_pins_and_recycles() {
        let mut s = setup();
        let f = file(&mut s, "f", b"x");
        let mut fds = FdManager::new();
        let a = fds.create(&mut s.inodes, &s.devices, f, O_RDONLY).unwrap();
        let b = fds.create(&mut s.inodes, &s.devices, f, O_RDONLY).unwrap();
        assert_eq!((a, b), (Fd(0), Fd(1)));
        assert_eq!(s.inodes.get(f).unwrap().pins(), 2);

        fds.delete(&mut s.inodes, &s.devices, a).unwrap();
        assert_eq!(s.inodes.get(f).unwrap().pins(), 1);
        assert_eq!(fds.create(&mut s.inodes, &s.devices, f, O_RDONLY).unwrap(), Fd(0));

        let err = fds.delete(&mut s.inodes, &s.devices, Fd(9)).unwrap_err();
        assert_eq!(err.errno(), Some(Errno::EBADF));
    }

    #[test]
    fn test_unlinked_file_lives_until_close() {
        let mut s = setup();
        let f = file(&mut s, "f", b"data");
        let mut fds = FdManager::new();
        let fd = fds.create(&mut s.inodes, &s.devices, f, O_RDONLY).unwrap();
        s.inodes.delete_entry(s.root, "f").unwrap();
        let mut buf = [0u8; 4];
        let descriptor = fds.get_mut(fd).unwrap();
        descriptor.read(&mut s.inodes, &s.devices, &mut buf, None).unwrap();
        assert_eq!(&buf, b"data");
        fds.delete(&mut s.inodes, &s.devices, fd).unwrap();
        assert!(s.inodes.get(f).is_none());
    }
}
