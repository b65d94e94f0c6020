//! Pipeline error types.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::asset::AssetKind;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no compilers registered for asset kind `{kind}`")]
    NotConfigured { kind: AssetKind },

    #[error("`{}` not found", .0.display())]
    NotFound(PathBuf),

    #[error(
        "command `{program}` failed with {status}\nargs: {args:?}\nstderr: {}\nstdout: {}",
        String::from_utf8_lossy(.stderr).trim(),
        String::from_utf8_lossy(.stdout).trim()
    )]
    CommandFailed {
        program: String,
        args: Vec<String>,
        status: ExitStatus,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Errors a client should see as "not found" rather than a server fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotConfigured { .. } | Self::NotFound(_))
    }
}

/// Attach operation context to `io::Result`s, like `anyhow::Context`.
pub trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| PipelineError::Io {
            context: f().into(),
            source,
        })
    }
}
