//! INodes
//!
//! Every filesystem object is an inode in a single table owned by
//! [`INodeManager`]. Directories refer to children by index, never by
//! pointer, so hardlinks and `..` back-references are plain integers.

pub mod directory;
pub mod manager;
pub mod types;

pub use directory::Directory;
pub use manager::INodeManager;
pub use types::*;
