//! Precompiled asset manifest (`<output>/assets/manifest.json`).
//!
//! ```json
//! {
//!   "files": {
//!     "/assets/js/app-5d41402abc4b2a76b9719d911017c592.js": {
//!       "mtime": "2016-06-18T14:18:44-07:00",
//!       "size": 158986,
//!       "digest": "5d41402abc4b2a76b9719d911017c592"
//!     }
//!   },
//!   "assets": {
//!     "js/app.js": "/assets/js/app-5d41402abc4b2a76b9719d911017c592.js"
//!   }
//! }
//! ```
//!
//! Written by `sluice build`, read once by the static server at startup.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Directory under the output root that holds compiled assets and the manifest.
pub const ASSETS_DIR: &str = "assets";

/// File name of the manifest inside [`ASSETS_DIR`].
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    /// Public URL path -> metadata of the compiled file.
    pub files: BTreeMap<String, FileInfo>,

    /// Logical key (`<kind>/<relative path>`) -> public URL path.
    pub assets: BTreeMap<String, String>,
}

/// Metadata recorded for a compiled file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub mtime: DateTime<Utc>,
    pub size: u64,
    pub digest: String,
}

impl FileInfo {
    pub fn modified(&self) -> SystemTime {
        SystemTime::from(self.mtime)
    }
}

impl Manifest {
    /// Location of the manifest for an output root.
    pub fn path_in(output: &Path) -> PathBuf {
        output.join(ASSETS_DIR).join(MANIFEST_FILE)
    }

    /// Load the manifest from `<output>/assets/manifest.json`.
    pub fn load(output: &Path) -> Result<Self> {
        let path = Self::path_in(output);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid manifest {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Write the manifest atomically (scratch file + rename).
    pub fn save(&self, output: &Path) -> Result<PathBuf> {
        let path = Self::path_in(output);
        let dir = path.parent().unwrap_or(output);
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".manifest")
            .tempfile_in(dir)
            .context("Failed to create scratch manifest")?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.write_all(b"\n")?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to write manifest {}", path.display()))?;
        Ok(path)
    }

    /// Register one compiled output under both mappings.
    pub fn insert(&mut self, key: String, url: String, info: FileInfo) {
        self.files.insert(url.clone(), info);
        self.assets.insert(key, url);
    }

    pub fn file(&self, url: &str) -> Option<&FileInfo> {
        self.files.get(url)
    }

    pub fn asset(&self, key: &str) -> Option<&str> {
        self.assets.get(key).map(String::as_str)
    }
}

#[cfg(test)]
pub(crate) const TEST_MANIFEST: &str = r#"
{
    "files": {
        "/assets/js/test/javascript-abc.js": {
            "mtime": "2016-06-18T14:18:44-07:00",
            "size": 158986,
            "digest": "abc"
        },
        "/assets/css/stylesheet-def.css": {
            "mtime": "2016-06-18T14:18:44-07:00",
            "size": 158986,
            "digest": "def"
        },
        "/assets/img/image-ghi.png": {
            "mtime": "2016-06-18T14:18:44-07:00",
            "size": 158986,
            "digest": "ghi"
        },
        "/assets/videos/video-jkl.mp4": {
            "mtime": "2016-06-18T14:18:44-07:00",
            "size": 158986,
            "digest": "jkl"
        },
        "/assets/audio/audio-mno.ogg": {
            "mtime": "2016-06-18T14:18:44-07:00",
            "size": 158986,
            "digest": "mno"
        },
        "/assets/fonts/font-pqr.ttf": {
            "mtime": "2016-06-18T14:18:44-07:00",
            "size": 158986,
            "digest": "pqr"
        }
    },
    "assets": {
        "js/test/javascript.js": "/assets/js/test/javascript-abc.js",
        "css/stylesheet.css": "/assets/css/stylesheet-def.css",
        "img/image.png": "/assets/img/image-ghi.png",
        "videos/video.mp4": "/assets/videos/video-jkl.mp4",
        "audio/audio.ogg": "/assets/audio/audio-mno.ogg",
        "fonts/font.ttf": "/assets/fonts/font-pqr.ttf"
    }
}
"#;
