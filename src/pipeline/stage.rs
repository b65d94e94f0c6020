//! Output of one pipeline stage.
//!
//! A stage produces either captured stdout or a file on disk. The next stage
//! may want a byte stream (stdin piping) or a path (`$infile`), so the value
//! converts lazily and only as far as needed:
//!
//! | value     | `reader()`        | `path()`                          |
//! |-----------|-------------------|-----------------------------------|
//! | `Source`  | opens the file    | the path itself                   |
//! | `Scratch` | opens the file    | the path itself                   |
//! | `Buffer`  | streams the bytes | spills once to a scratch file     |
//!
//! Scratch files are owned by the value and removed when it is dropped.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tempfile::TempPath;

use super::error::{IoContext, Result};

const SCRATCH_PREFIX: &str = "sluice";

#[derive(Debug)]
pub enum StageValue {
    /// File owned by someone else (the original source). Never removed.
    Source(PathBuf),
    /// File written by a stage into a scratch path.
    Scratch(TempPath),
    /// Captured process output.
    Buffer {
        bytes: Vec<u8>,
        spilled: Option<TempPath>,
    },
}

impl StageValue {
    pub fn source(path: impl Into<PathBuf>) -> Self {
        Self::Source(path.into())
    }

    pub fn buffer(bytes: Vec<u8>) -> Self {
        Self::Buffer {
            bytes,
            spilled: None,
        }
    }

    /// Readable stream over the stage output. Safe to call repeatedly.
    pub fn reader(&self) -> Result<Box<dyn Read + Send + '_>> {
        match self {
            Self::Buffer { bytes, .. } => Ok(Box::new(bytes.as_slice())),
            Self::Source(path) => open(path),
            Self::Scratch(path) => open(path),
        }
    }

    /// Concrete file path holding the stage output.
    ///
    /// Buffers are written to a scratch file on the first call; later calls
    /// return the same path.
    pub fn path(&mut self) -> Result<&Path> {
        match self {
            Self::Source(path) => Ok(path),
            Self::Scratch(path) => Ok(path),
            Self::Buffer { bytes, spilled } => {
                if spilled.is_none() {
                    *spilled = Some(spill(bytes)?);
                }
                match spilled {
                    Some(path) => Ok(path),
                    None => unreachable!("buffer was spilled above"),
                }
            }
        }
    }

    /// Whether this is the untouched original input.
    #[cfg(test)]
    pub fn is_source(&self) -> bool {
        matches!(self, Self::Source(_))
    }
}

fn open(path: &Path) -> Result<Box<dyn Read + Send + '_>> {
    let file =
        File::open(path).io_context(|| format!("failed to open stage output {}", path.display()))?;
    Ok(Box::new(file))
}

/// Allocate an empty scratch file in the system temp directory.
pub(super) fn scratch_file() -> Result<(File, TempPath)> {
    let tmp = tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempfile()
        .io_context(|| "failed to create scratch file")?;
    let (file, path) = tmp.into_parts();
    Ok((file, path))
}

fn spill(bytes: &[u8]) -> Result<TempPath> {
    let (mut file, path) = scratch_file()?;
    file.write_all(bytes)
        .and_then(|()| file.flush())
        .io_context(|| format!("failed to spill stage output to {}", path.display()))?;
    Ok(path)
}
