//! Core INode types.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use super::directory::Directory;
use crate::constants::*;
use crate::stat::Stat;

/// Index of an inode in the manager's table. 0 is never allocated.
pub type INodeIndex = u64;

/// Byte content of a regular file.
///
/// Cloning shares the same buffer; this is what backs `MAP_SHARED` views.
#[derive(Debug, Clone, Default)]
pub struct FileData(Arc<Mutex<Vec<u8>>>);

impl FileData {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Arc::new(Mutex::new(bytes)))
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.lock().clone()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.0.lock()
    }

    /// True when both handles share one buffer.
    pub fn ptr_eq(&self, other: &FileData) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Variant payload of an inode.
#[derive(Debug)]
pub enum INodeKind {
    File(FileData),
    Directory(Directory),
    Symlink(String),
    /// Device number lives in `Stat::rdev`.
    CharacterDev,
}

/// What to build in [`INodeManager::create`](super::INodeManager::create).
#[derive(Debug, Clone)]
pub enum INodeSpec {
    File { data: Vec<u8> },
    /// `parent: None` makes a root that is its own parent.
    Directory { parent: Option<INodeIndex> },
    Symlink { target: String },
    CharacterDev { rdev: u32 },
}

impl INodeSpec {
    pub(crate) fn type_bits(&self) -> u32 {
        match self {
            INodeSpec::File { .. } => S_IFREG,
            INodeSpec::Directory { .. } => S_IFDIR,
            INodeSpec::Symlink { .. } => S_IFLNK,
            INodeSpec::CharacterDev { .. } => S_IFCHR,
        }
    }
}

/// Ownership and permission bits for a new inode.
#[derive(Debug, Clone, Copy)]
pub struct INodeProps {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

/// A filesystem object: shared metadata plus variant payload.
#[derive(Debug)]
pub struct INode {
    pub(super) stat: Stat,
    pub(super) kind: INodeKind,
    pub(super) pins: u64,
}

impl INode {
    pub fn stat(&self) -> &Stat {
        &self.stat
    }

    pub fn stat_mut(&mut self) -> &mut Stat {
        &mut self.stat
    }

    pub fn kind(&self) -> &INodeKind {
        &self.kind
    }

    pub fn index(&self) -> INodeIndex {
        self.stat.ino
    }

    /// Number of descriptors / cwd references holding this inode.
    pub fn pins(&self) -> u64 {
        self.pins
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, INodeKind::File(_))
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, INodeKind::Directory(_))
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self.kind, INodeKind::Symlink(_))
    }

    pub fn is_character_device(&self) -> bool {
        matches!(self.kind, INodeKind::CharacterDev)
    }

    pub fn as_directory(&self) -> Option<&Directory> {
        match &self.kind {
            INodeKind::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    pub fn file_data(&self) -> Option<&FileData> {
        match &self.kind {
            INodeKind::File(data) => Some(data),
            _ => None,
        }
    }

    pub fn symlink_target(&self) -> Option<&str> {
        match &self.kind {
            INodeKind::Symlink(target) => Some(target),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_data_clones_share_buffer() {
        let data = FileData::new(b"abc".to_vec());
        let view = data.clone();
        data.lock().push(b'd');
        assert_eq!(view.to_vec(), b"abcd");
        assert_eq!(view.len(), 4);
        assert!(!view.is_empty());
    }

    #[test]
    fn test_spec_type_bits() {
        assert_eq!(INodeSpec::File { data: vec![] }.type_bits(), S_IFREG);
        assert_eq!(INodeSpec::Directory { parent: None }.type_bits(), S_IFDIR);
        assert_eq!(INodeSpec::Symlink { target: "x".into() }.type_bits(), S_IFLNK);
        assert_eq!(INodeSpec::CharacterDev { rdev: 0 }.type_bits(), S_IFCHR);
    }
}
