//! Asset kinds, compiler configuration and the published manifest.

mod command;
mod kind;
pub mod manifest;
mod paths;

pub use command::{Command, CompilerSet, INFILE, OUTFILE};
pub use kind::AssetKind;
pub use manifest::{FileInfo, Manifest};
pub use paths::AssetPaths;
