//! Directory payload: the name -> inode mapping.
//!
//! The map is only mutated through [`INodeManager`](super::INodeManager),
//! which keeps link counts and timestamps in step with it.

use indexmap::IndexMap;

use super::types::INodeIndex;

#[derive(Debug, Clone)]
pub struct Directory {
    entries: IndexMap<String, INodeIndex>,
}

impl Directory {
    pub(super) fn new(itself: INodeIndex, parent: INodeIndex) -> Self {
        let mut entries = IndexMap::new();
        entries.insert(".".to_string(), itself);
        entries.insert("..".to_string(), parent);
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<INodeIndex> {
        self.entries.get(name).copied()
    }

    pub fn parent(&self) -> INodeIndex {
        self.entries.get("..").copied().unwrap_or_default()
    }

    pub fn itself(&self) -> INodeIndex {
        self.entries.get(".").copied().unwrap_or_default()
    }

    /// Entry count including `.` and `..`.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when only `.` and `..` remain.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 2
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, INodeIndex)> {
        self.entries.iter().map(|(name, index)| (name.as_str(), *index))
    }

    pub(super) fn insert(&mut self, name: &str, index: INodeIndex) -> Option<INodeIndex> {
        self.entries.insert(name.to_string(), index)
    }

    pub(super) fn remove(&mut self, name: &str) -> Option<INodeIndex> {
        self.entries.shift_remove(name)
    }

    pub(super) fn set_parent(&mut self, parent: INodeIndex) {
        self.entries.insert("..".to_string(), parent);
    }
}

pub(super) fn is_dot_entry(name: &str) -> bool {
    name == "." || name == ".."
}
