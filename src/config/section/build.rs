//! `[build]` section configuration.
//!
//! ```toml
//! [build]
//! input = "assets"        # <input>/<kind-dir>/... holds the sources
//! output = "public"       # compiled files land in <output>/assets/<kind-dir>/...
//! cdn_url = ""            # prefix for template asset paths
//! compile = true
//! minify = true
//! fingerprint = true      # append -<md5> to file names and write the manifest
//! compress = true         # write a .gz companion next to each output
//! compression = "fast"    # "fast" | "best" | "default" | 0..=9
//! ```

use std::path::PathBuf;

use flate2::Compression;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Source root.
    pub input: PathBuf,

    /// Output root.
    pub output: PathBuf,

    /// Prefix prepended to every public asset path.
    pub cdn_url: String,

    pub compile: bool,
    pub minify: bool,
    pub fingerprint: bool,
    pub compress: bool,

    /// Gzip level for the `.gz` companions.
    pub compression: CompressionLevel,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            input: "assets".into(),
            output: "public".into(),
            cdn_url: String::new(),
            compile: true,
            minify: true,
            fingerprint: true,
            compress: true,
            compression: CompressionLevel::default(),
        }
    }
}

/// Gzip level, by name or number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompressionLevel {
    Preset(CompressionPreset),
    Level(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionPreset {
    Fast,
    Best,
    Default,
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::Preset(CompressionPreset::Fast)
    }
}

impl CompressionLevel {
    pub const MAX: u32 = 9;

    pub fn is_valid(self) -> bool {
        match self {
            Self::Preset(_) => true,
            Self::Level(level) => level <= Self::MAX,
        }
    }

    pub fn to_compression(self) -> Compression {
        match self {
            Self::Preset(CompressionPreset::Fast) => Compression::fast(),
            Self::Preset(CompressionPreset::Best) => Compression::best(),
            Self::Preset(CompressionPreset::Default) => Compression::default(),
            Self::Level(level) => Compression::new(level.min(Self::MAX)),
        }
    }
}
