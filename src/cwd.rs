//! Current working directory.

use crate::inode::{INodeIndex, INodeManager};

/// The working directory inode (pinned) and its canonical segments.
#[derive(Debug, Clone)]
pub struct CurrentDirectory {
    inode: INodeIndex,
    path_stack: Vec<String>,
}

impl CurrentDirectory {
    /// Start at `inode`, pinning it.
    pub fn new(inodes: &mut INodeManager, inode: INodeIndex, path_stack: Vec<String>) -> Self {
        inodes.pin(inode);
        Self { inode, path_stack }
    }

    pub fn inode(&self) -> INodeIndex {
        self.inode
    }

    pub fn path_stack(&self) -> &[String] {
        &self.path_stack
    }

    /// Absolute path, e.g. `/a/b`, or `/` at the root.
    pub fn path(&self) -> String {
        format!("/{}", self.path_stack.join("/"))
    }

    /// Move to `inode`. The new directory is pinned before the old one is
    /// released so a chdir to the same directory never drops its last pin.
    pub fn change_dir(&mut self, inodes: &mut INodeManager, inode: INodeIndex, path_stack: Vec<String>) {
        inodes.pin(inode);
        inodes.unpin(self.inode);
        tracing::debug!(ino = inode, path = %format!("/{}", path_stack.join("/")), "changed directory");
        self.inode = inode;
        self.path_stack = path_stack;
    }
}
