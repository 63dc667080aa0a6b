//! Device Registry
//!
//! Character devices are plain behavior objects registered under a
//! (major, minor) pair. Inodes only hold the packed number and look the
//! behavior up on every open/read/write/seek/close.

pub mod standard;
pub mod types;

pub use standard::*;
pub use types::*;
