//! Command-line interface module.

mod args;
pub mod build;
pub mod compile;
pub mod path;
pub mod serve;

pub use args::{BuildArgs, Cli, Commands};
