//! Paths
//!
//! Path operand types and the navigation engine that resolves them.

pub mod arg;
pub mod navigate;

pub use arg::{FileRef, FileUrl, PathArg};
pub use navigate::{navigate, navigate_from, NavContext, Navigated};
