//! Shared helpers.

pub mod mime;
pub mod mtime;
pub mod path;
