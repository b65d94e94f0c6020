//! External commands and per-kind compiler sets.
//!
//! ```toml
//! [js.compilers.ts]
//! cmd = "tsc"
//! args = ["--outFile", "$outfile", "$infile"]
//!
//! [js.minifier]
//! cmd = "uglifyjs"
//! args = ["$infile"]
//! stdout = true
//! ```

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Placeholder replaced by a path holding the previous stage's output.
pub const INFILE: &str = "$infile";

/// Placeholder replaced by a fresh scratch path the command must write to.
pub const OUTFILE: &str = "$outfile";

/// An external executable that turns one stage's output into the next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Executable name or path.
    pub cmd: String,

    /// Argument template; `$infile` and `$outfile` are substituted at run time.
    #[serde(default)]
    pub args: Vec<String>,

    /// Pipe the previous stage's output into the process.
    #[serde(default)]
    pub stdin: bool,

    /// Take the process's stdout as the stage output instead of `$outfile`.
    #[serde(default)]
    pub stdout: bool,
}

#[cfg(test)]
impl Command {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            args: Vec::new(),
            stdin: false,
            stdout: false,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn stdin(mut self, enable: bool) -> Self {
        self.stdin = enable;
        self
    }

    pub fn stdout(mut self, enable: bool) -> Self {
        self.stdout = enable;
        self
    }
}

/// Compilers keyed by lowercase extension token, plus an optional minifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerSet {
    pub compilers: FxHashMap<String, Command>,
    pub minifier: Option<Command>,
}

impl CompilerSet {
    /// Look up the compiler for an extension token, ignoring case.
    pub fn compiler(&self, ext: &str) -> Option<&Command> {
        self.compilers.get(&ext.to_ascii_lowercase())
    }

    pub fn has_compiler(&self, ext: &str) -> bool {
        self.compiler(ext).is_some()
    }

    /// Nothing configured: the compiled output is the source itself.
    pub fn is_passthrough(&self) -> bool {
        self.compilers.is_empty() && self.minifier.is_none()
    }

    /// Lowercase every extension key.
    ///
    /// Returns the keys that collided after lowercasing.
    pub fn normalize_keys(&mut self) -> Vec<String> {
        let mut normalized = FxHashMap::default();
        let mut collisions = Vec::new();

        let mut entries: Vec<_> = self.compilers.drain().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        for (key, command) in entries {
            let lower = key.to_ascii_lowercase();
            if normalized.contains_key(&lower) {
                collisions.push(key);
                continue;
            }
            normalized.insert(lower, command);
        }

        self.compilers = normalized;
        collisions
    }

    /// All commands in this set, compilers first.
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.compilers.values().chain(self.minifier.as_ref())
    }
}

#[cfg(test)]
impl CompilerSet {
    pub fn with_compiler(mut self, ext: &str, command: Command) -> Self {
        self.compilers.insert(ext.to_ascii_lowercase(), command);
        self
    }

    pub fn with_minifier(mut self, command: Command) -> Self {
        self.minifier = Some(command);
        self
    }
}
