//! File System Module
//!
//! The user-facing filesystem:
//! - VirtualFs: synchronous POSIX-shaped API over the inode table
//! - AsyncVirtualFs: async and callback-completion wrappers around it

pub mod async_fs;
pub mod types;
pub mod virtual_fs;


pub use async_fs::AsyncVirtualFs;
pub use types::*;
pub use virtual_fs::VirtualFs;
