//! Asset compilation pipeline.
//!
//! ```text
//! source ──▶ compiler ──▶ compiler ──▶ minifier ──┬──▶ <name>-<md5>.<ext>
//!            (rightmost extension first)          ├──▶ md5
//!                                                 └──▶ <name>-<md5>.<ext>.gz
//! ```
//!
//! - [`naming`]: split a file name into filename, extension and compiler chain
//! - [`stage`]: stage output that converts between bytes and files on demand
//! - [`exec`]: run one external command as a stage
//! - [`transform`]: orchestrate the stages and publish the result atomically

mod error;
mod exec;
mod naming;
mod stage;
mod transform;

pub use error::{PipelineError, Result};
pub use transform::{GZIP_SUFFIX, Options, Pipeline, Published};
