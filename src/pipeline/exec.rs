//! Run one external command as a pipeline stage.
//!
//! Argument tokens equal to `$infile` become a path holding the previous
//! stage's output; `$outfile` becomes a fresh scratch path. The command's
//! output is either its captured stdout or whatever it wrote to `$outfile`.

use std::ffi::OsString;
use std::io::{self, ErrorKind};
use std::path::Path;
use std::process::{self, Stdio};
use std::sync::OnceLock;
use std::thread;

use regex::Regex;
use tempfile::TempPath;

use super::error::{IoContext, PipelineError, Result};
use super::stage::{StageValue, scratch_file};
use crate::asset::{Command, INFILE, OUTFILE};
use crate::debug;

/// Run `command` over `input` and return the produced stage value.
pub fn run(command: &Command, input: &mut StageValue) -> Result<StageValue> {
    let mut outfile: Option<TempPath> = None;
    let mut args: Vec<OsString> = Vec::with_capacity(command.args.len());

    for arg in &command.args {
        match arg.as_str() {
            INFILE => args.push(input.path()?.as_os_str().to_owned()),
            OUTFILE => {
                if outfile.is_none() {
                    outfile = Some(scratch_file()?.1);
                }
                if let Some(path) = &outfile {
                    args.push(path.as_os_str().to_owned());
                }
            }
            _ => args.push(arg.into()),
        }
    }

    if !command.stdout && outfile.is_none() {
        outfile = Some(scratch_file()?.1);
    }

    debug!("exec"; "{} {}", command.cmd, display_args(&args));

    let mut child = process::Command::new(&command.cmd)
        .args(&args)
        .stdin(if command.stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .io_context(|| format!("failed to spawn `{}`", command.cmd))?;

    let output = match child.stdin.take() {
        Some(mut stdin) => {
            let mut reader = input.reader()?;
            // Feed stdin from a separate thread so a child that fills its
            // stdout pipe before draining stdin cannot deadlock us.
            thread::scope(|s| {
                let feeder = s.spawn(move || match io::copy(&mut reader, &mut stdin) {
                    Err(e) if e.kind() != ErrorKind::BrokenPipe => Err(e),
                    _ => Ok(()),
                });
                let output = child.wait_with_output();
                let fed = feeder
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
                fed.io_context(|| format!("failed to write stdin of `{}`", command.cmd))?;
                output.io_context(|| format!("failed to wait for `{}`", command.cmd))
            })?
        }
        None => child
            .wait_with_output()
            .io_context(|| format!("failed to wait for `{}`", command.cmd))?,
    };

    if !output.status.success() {
        return Err(PipelineError::CommandFailed {
            program: command.cmd.clone(),
            args: args
                .iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect(),
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = strip_ansi(stderr.trim());
    if !stderr.is_empty() {
        debug!(&command.cmd; "{stderr}");
    }

    match outfile {
        Some(path) if !command.stdout => Ok(StageValue::Scratch(path)),
        _ => Ok(StageValue::buffer(output.stdout)),
    }
}

/// Run `stages` in order, starting from the file at `source`.
///
/// Intermediate scratch files are removed as soon as the following stage
/// has consumed them. With no stages the source itself is returned.
pub fn run_stages<'a, I>(source: &Path, stages: I) -> Result<StageValue>
where
    I: IntoIterator<Item = &'a Command>,
{
    let mut value = StageValue::source(source);
    for command in stages {
        value = run(command, &mut value)?;
    }
    Ok(value)
}

fn display_args(args: &[OsString]) -> String {
    args.iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip ANSI escape codes from tool output before logging.
fn strip_ansi(s: &str) -> std::borrow::Cow<'_, str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());
    re.replace_all(s, "")
}
