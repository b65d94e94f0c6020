//! Configuration section definitions.

mod build;
mod serve;

pub use build::{BuildConfig, CompressionLevel};
pub use serve::{ServeConfig, ServeMode};
