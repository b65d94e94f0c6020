//! Configuration management for `sluice.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # [build] and [serve]
//! ├── error          # ConfigError
//! ├── util           # config discovery, env parsing
//! └── mod.rs         # SluiceConfig (this file)
//! ```
//!
//! # Sections
//!
//! | Section                          | Purpose                                   |
//! |----------------------------------|-------------------------------------------|
//! | `[build]`                        | Roots, CDN prefix, pipeline toggles       |
//! | `[serve]`                        | Interface, port, dynamic or static mode   |
//! | `[js]` `[css]` `[img]` ...       | Compilers and minifier for one asset kind |
//!
//! Values are layered: CLI flag > `SLUICE_*` environment variable > file >
//! default.

mod error;
pub mod section;
mod util;

pub use error::ConfigError;
pub use section::{BuildConfig, CompressionLevel, ServeConfig, ServeMode};

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use util::{executable_exists, find_config_file, parse_bool};

use crate::asset::{AssetKind, CompilerSet};
use crate::cli::{BuildArgs, Cli, Commands};
use crate::log;
use crate::pipeline::{Options, Pipeline};
use crate::utils::path::{normalize_path, resolve_in};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "SLUICE_";

/// Root configuration structure representing sluice.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SluiceConfig {
    /// Absolute path to the config file; empty when running without one
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub root: PathBuf,

    pub build: BuildConfig,
    pub serve: ServeConfig,

    pub js: Option<CompilerSet>,
    pub css: Option<CompilerSet>,
    pub img: Option<CompilerSet>,
    pub audio: Option<CompilerSet>,
    pub videos: Option<CompilerSet>,
    pub fonts: Option<CompilerSet>,
}

impl SluiceConfig {
    /// Load configuration for a CLI invocation.
    ///
    /// Searches upward from cwd for the config file. Running without one is
    /// allowed when both `--input` and `--output` are given.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;
        let args = cli.build_args();

        let mut config = match find_config_file(&cli.config, &cwd) {
            Some(path) => {
                let mut config = Self::from_path(&path)?;
                config.root = path.parent().map(Path::to_path_buf).unwrap_or_default();
                config.config_path = normalize_path(&path);
                config
            }
            None if args.input.is_some() && args.output.is_some() => Self {
                root: cwd.clone(),
                ..Self::default()
            },
            None => {
                return Err(ConfigError::Validation(format!(
                    "config file '{}' not found; create one or pass both --input and --output",
                    cli.config.display()
                ))
                .into());
            }
        };

        config.finalize(cli, &cwd, |key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides, resolve paths and validate.
    ///
    /// `env` looks up environment variables; tests pass a closure over a map.
    fn finalize<F>(&mut self, cli: &Cli, cwd: &Path, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let collisions = self.normalize_compiler_keys();

        // File paths are relative to the config; env and CLI paths to cwd
        self.normalize_paths();
        self.apply_env(cwd, env)?;
        self.apply_cli(cli, cwd);

        self.validate(&collisions)?;
        self.warn_missing_executables();
        Ok(())
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    // ========================================================================
    // asset kinds
    // ========================================================================

    /// Compiler set of a kind, `None` if the kind has no section.
    pub fn compilers(&self, kind: AssetKind) -> Option<&CompilerSet> {
        match kind {
            AssetKind::Script => self.js.as_ref(),
            AssetKind::Stylesheet => self.css.as_ref(),
            AssetKind::Image => self.img.as_ref(),
            AssetKind::Audio => self.audio.as_ref(),
            AssetKind::Video => self.videos.as_ref(),
            AssetKind::Font => self.fonts.as_ref(),
        }
    }

    fn compilers_mut(&mut self, kind: AssetKind) -> Option<&mut CompilerSet> {
        match kind {
            AssetKind::Script => self.js.as_mut(),
            AssetKind::Stylesheet => self.css.as_mut(),
            AssetKind::Image => self.img.as_mut(),
            AssetKind::Audio => self.audio.as_mut(),
            AssetKind::Video => self.videos.as_mut(),
            AssetKind::Font => self.fonts.as_mut(),
        }
    }

    /// Kinds with a section in the config file.
    pub fn registered_kinds(&self) -> impl Iterator<Item = (AssetKind, &CompilerSet)> {
        AssetKind::ALL
            .into_iter()
            .filter_map(|kind| self.compilers(kind).map(|set| (kind, set)))
    }

    /// Pipeline toggles from `[build]`.
    pub fn pipeline_options(&self) -> Options {
        Options {
            compile: self.build.compile,
            minify: self.build.minify,
            fingerprint: self.build.fingerprint,
            compress: self.build.compress,
            compression: self.build.compression.to_compression(),
        }
    }

    /// Pipeline over every registered kind.
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            &self.build.input,
            &self.build.output,
            self.registered_kinds().map(|(kind, set)| (kind, set.clone())),
            self.pipeline_options(),
        )
    }

    /// Lowercase compiler keys; returns `(kind, key)` for each collision.
    fn normalize_compiler_keys(&mut self) -> Vec<(AssetKind, String)> {
        let mut collisions = Vec::new();
        for kind in AssetKind::ALL {
            if let Some(set) = self.compilers_mut(kind) {
                collisions.extend(set.normalize_keys().into_iter().map(|key| (kind, key)));
            }
        }
        collisions
    }

    // ========================================================================
    // overrides
    // ========================================================================

    /// Apply `SLUICE_*` environment variables.
    fn apply_env<F>(&mut self, cwd: &Path, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            env(&key).map(|value| (key, value))
        };

        if let Some((_, value)) = var("INPUT") {
            self.build.input = resolve_in(cwd, Path::new(&value));
        }
        if let Some((_, value)) = var("OUTPUT") {
            self.build.output = resolve_in(cwd, Path::new(&value));
        }
        if let Some((_, value)) = var("CDN_URL") {
            self.build.cdn_url = value;
        }

        let build = &mut self.build;
        for (name, field) in [
            ("COMPILE", &mut build.compile),
            ("MINIFY", &mut build.minify),
            ("FINGERPRINT", &mut build.fingerprint),
            ("COMPRESS", &mut build.compress),
        ] {
            if let Some((key, value)) = var(name) {
                *field = parse_bool(&value).ok_or(ConfigError::Env { key, value })?;
            }
        }
        Ok(())
    }

    /// Apply command-line flags.
    fn apply_cli(&mut self, cli: &Cli, cwd: &Path) {
        let args = cli.build_args();
        crate::logger::set_verbose(args.verbose);
        self.apply_build_args(args, cwd);

        if let Commands::Serve {
            static_mode,
            interface,
            port,
            ..
        } = &cli.command
        {
            if *static_mode {
                self.serve.mode = ServeMode::Static;
            }
            Self::update_option(&mut self.serve.interface, interface.as_ref());
            Self::update_option(&mut self.serve.port, port.as_ref());
        }
    }

    fn apply_build_args(&mut self, args: &BuildArgs, cwd: &Path) {
        if let Some(input) = &args.input {
            self.build.input = resolve_in(cwd, input);
        }
        if let Some(output) = &args.output {
            self.build.output = resolve_in(cwd, output);
        }
        Self::update_option(&mut self.build.cdn_url, args.cdn_url.as_ref());

        if args.no_compile {
            self.build.compile = false;
        }
        if args.no_minify {
            self.build.minify = false;
        }
        if args.no_hash {
            self.build.fingerprint = false;
        }
        if args.no_compress {
            self.build.compress = false;
        }
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Resolve `input` and `output` against the config directory.
    fn normalize_paths(&mut self) {
        self.build.input = resolve_in(&self.root, &self.build.input);
        self.build.output = resolve_in(&self.root, &self.build.output);
    }

    // ========================================================================
    // validation
    // ========================================================================

    /// Validate configuration, collecting every problem into one error.
    fn validate(&self, collisions: &[(AssetKind, String)]) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        for (kind, key) in collisions {
            errors.push(format!(
                "[{kind}] compiler `{key}` collides with another key after lowercasing"
            ));
        }

        for (kind, set) in self.registered_kinds() {
            if set.minifier.is_some() && !kind.supports_minify() {
                errors.push(format!(
                    "[{kind}] minifier is only supported for js and css"
                ));
            }
            for command in set.commands() {
                if command.cmd.trim().is_empty() {
                    errors.push(format!("[{kind}] command with empty `cmd`"));
                }
            }
        }

        let cdn = &self.build.cdn_url;
        if !cdn.is_empty() && url::Url::parse(cdn).is_err() {
            errors.push(format!("[build] cdn_url `{cdn}` is not an absolute URL"));
        }

        if !self.build.compression.is_valid() {
            errors.push(format!(
                "[build] compression must be \"fast\", \"best\", \"default\" or 0..={}",
                CompressionLevel::MAX
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("\n")))
        }
    }

    fn warn_missing_executables(&self) {
        for (kind, set) in self.registered_kinds() {
            for command in set.commands() {
                if !executable_exists(&command.cmd) {
                    log!("warning"; "[{kind}] `{}` not found on PATH", command.cmd);
                }
            }
        }
    }
}

// ============================================================================
// Test Helpers (available to all modules via `use crate::config::test_*`)
// ============================================================================

/// Parse config, panicking on unknown fields (to catch typos in tests).
#[cfg(test)]
pub fn test_parse_config(content: &str) -> SluiceConfig {
    let (parsed, ignored) = SluiceConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

// ============================================================================
// tests
// ============================================================================
