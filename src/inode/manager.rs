//! INode manager: owns every inode, allocates indices, and collects inodes
//! whose usage drops to the destruction threshold.
//!
//! Usage is `nlink + pins`. An inode is destroyed at usage 0, and a directory
//! at usage 1 because its own `.` entry is not an external reference.

use std::collections::HashMap;

use super::directory::{is_dot_entry, Directory};
use super::types::{FileData, INode, INodeIndex, INodeKind, INodeProps, INodeSpec};
use crate::constants::S_IFMT;
use crate::counter::IndexCounter;
use crate::error::{FsError, FsResult};
use crate::stat::Stat;

#[derive(Debug)]
pub struct INodeManager {
    inodes: HashMap<INodeIndex, INode>,
    counter: IndexCounter,
}

impl Default for INodeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl INodeManager {
    pub fn new() -> Self {
        Self { inodes: HashMap::new(), counter: IndexCounter::new(1) }
    }

    /// Allocate and register a new inode.
    ///
    /// Directories start with their `.` link (plus `..` for a root that is its
    /// own parent) and link their parent for `..`.
    pub fn create(&mut self, spec: INodeSpec, props: INodeProps) -> FsResult<INodeIndex> {
        if let INodeSpec::Directory { parent: Some(parent) } = &spec {
            if !self.get(*parent).is_some_and(INode::is_directory) {
                return Err(FsError::type_error(format!("inode {} is not a directory", parent)));
            }
        }
        let index = self.counter.allocate();
        let mut stat = Stat::new(index, spec.type_bits() | (props.mode & !S_IFMT), props.uid, props.gid);
        let kind = match spec {
            INodeSpec::File { data } => {
                stat.size = data.len() as u64;
                INodeKind::File(FileData::new(data))
            }
            INodeSpec::Directory { parent: None } => {
                stat.nlink = 2;
                INodeKind::Directory(Directory::new(index, index))
            }
            INodeSpec::Directory { parent: Some(parent) } => {
                stat.nlink = 1;
                self.link(parent);
                INodeKind::Directory(Directory::new(index, parent))
            }
            INodeSpec::Symlink { target } => {
                stat.size = target.len() as u64;
                INodeKind::Symlink(target)
            }
            INodeSpec::CharacterDev { rdev } => {
                stat.rdev = rdev;
                INodeKind::CharacterDev
            }
        };
        tracing::debug!(ino = index, mode = format_args!("{:o}", stat.mode), "created inode");
        self.inodes.insert(index, INode { stat, kind, pins: 0 });
        Ok(index)
    }

    pub fn get(&self, index: INodeIndex) -> Option<&INode> {
        self.inodes.get(&index)
    }

    pub fn get_mut(&mut self, index: INodeIndex) -> Option<&mut INode> {
        self.inodes.get_mut(&index)
    }

    /// Number of live inodes.
    pub fn len(&self) -> usize {
        self.inodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inodes.is_empty()
    }

    pub fn link(&mut self, index: INodeIndex) {
        if let Some(inode) = self.inodes.get_mut(&index) {
            inode.stat.nlink += 1;
        }
    }

    pub fn unlink(&mut self, index: INodeIndex) {
        if let Some(inode) = self.inodes.get_mut(&index) {
            inode.stat.nlink = inode.stat.nlink.saturating_sub(1);
            self.collect(index);
        }
    }

    /// Hold `index` alive independently of hardlinks.
    pub fn pin(&mut self, index: INodeIndex) {
        if let Some(inode) = self.inodes.get_mut(&index) {
            inode.pins += 1;
        }
    }

    pub fn unpin(&mut self, index: INodeIndex) {
        if let Some(inode) = self.inodes.get_mut(&index) {
            inode.pins = inode.pins.saturating_sub(1);
            self.collect(index);
        }
    }

    fn collect(&mut self, index: INodeIndex) {
        let Some(inode) = self.inodes.get(&index) else {
            return;
        };
        let usage = inode.stat.nlink + inode.pins;
        if usage != 0 && !(usage == 1 && inode.is_directory()) {
            return;
        }
        // a directory's `..` holds a link on its parent; root is its own parent
        if let Some(parent) = inode.as_directory().map(Directory::parent) {
            if parent != index {
                self.unlink(parent);
            }
        }
        self.inodes.remove(&index);
        self.counter.deallocate(index);
        tracing::debug!(ino = index, "destroyed inode");
    }

    // ========================================================================
    // Directory entries
    // ========================================================================

    fn directory(&self, dir: INodeIndex) -> FsResult<&Directory> {
        self.get(dir)
            .and_then(INode::as_directory)
            .ok_or_else(|| FsError::type_error(format!("inode {} is not a directory", dir)))
    }

    fn directory_mut(&mut self, dir: INodeIndex) -> FsResult<(&mut Stat, &mut Directory)> {
        match self.inodes.get_mut(&dir) {
            Some(INode { stat, kind: INodeKind::Directory(d), .. }) => Ok((stat, d)),
            _ => Err(FsError::type_error(format!("inode {} is not a directory", dir))),
        }
    }

    pub fn get_entry(&self, dir: INodeIndex, name: &str) -> FsResult<Option<INodeIndex>> {
        Ok(self.directory(dir)?.get(name))
    }

    /// Snapshot of every entry (including `.` and `..`); touches atime.
    pub fn entries(&mut self, dir: INodeIndex) -> FsResult<Vec<(String, INodeIndex)>> {
        let (stat, directory) = self.directory_mut(dir)?;
        stat.touch_accessed();
        Ok(directory.iter().map(|(name, index)| (name.to_string(), index)).collect())
    }

    /// Add `name -> target` and link the target. Fails if `name` is taken.
    pub fn add_entry(&mut self, dir: INodeIndex, name: &str, target: INodeIndex) -> FsResult<()> {
        if is_dot_entry(name) {
            return Err(FsError::type_error("not allowed to add `.` or `..` entries"));
        }
        if !self.inodes.contains_key(&target) {
            return Err(FsError::type_error(format!("inode {} does not exist", target)));
        }
        let (stat, directory) = self.directory_mut(dir)?;
        if directory.get(name).is_some() {
            return Err(FsError::type_error(format!("entry `{}` already exists", name)));
        }
        directory.insert(name, target);
        stat.touch_modified();
        self.link(target);
        Ok(())
    }

    /// Remove `name` and unlink its target. Missing names are ignored.
    pub fn delete_entry(&mut self, dir: INodeIndex, name: &str) -> FsResult<()> {
        if is_dot_entry(name) {
            return Err(FsError::type_error("not allowed to delete `.` or `..` entries"));
        }
        let (stat, directory) = self.directory_mut(dir)?;
        if let Some(target) = directory.remove(name) {
            stat.touch_modified();
            self.unlink(target);
        }
        Ok(())
    }

    /// Move the mapping for `old` to `new` without touching link counts.
    pub fn rename_entry(&mut self, dir: INodeIndex, old: &str, new: &str) -> FsResult<()> {
        if is_dot_entry(old) || is_dot_entry(new) {
            return Err(FsError::type_error("not allowed to rename `.` or `..` entries"));
        }
        let (stat, directory) = self.directory_mut(dir)?;
        if directory.get(new).is_some() {
            return Err(FsError::type_error(format!("entry `{}` already exists", new)));
        }
        if let Some(target) = directory.remove(old) {
            directory.insert(new, target);
            stat.touch_modified();
        }
        Ok(())
    }

    /// Re-point `dir`'s `..` at `parent`, moving the link from the old parent.
    pub(crate) fn reparent(&mut self, dir: INodeIndex, parent: INodeIndex) -> FsResult<()> {
        self.directory(parent)?;
        let (stat, directory) = self.directory_mut(dir)?;
        let old = directory.parent();
        if old == parent {
            return Ok(());
        }
        directory.set_parent(parent);
        stat.touch_modified();
        self.link(parent);
        self.unlink(old);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
