//! Public URL helpers for templates.
//!
//! With fingerprinting enabled every lookup goes through the manifest, so a
//! template can only reference assets that were precompiled. Without it the
//! URL is derived from the logical path directly.

use std::sync::Arc;

use super::{AssetKind, Manifest, manifest::ASSETS_DIR};

/// Resolves logical asset paths (`app.js`) to public URLs.
#[derive(Debug, Clone)]
pub struct AssetPaths {
    manifest: Arc<Manifest>,
    cdn_url: String,
    fingerprint: bool,
}

impl AssetPaths {
    pub fn new(manifest: Arc<Manifest>, cdn_url: &str, fingerprint: bool) -> Self {
        Self {
            manifest,
            cdn_url: cdn_url.trim_end_matches('/').to_string(),
            fingerprint,
        }
    }

    /// Public URL for `file` (relative to the kind's directory).
    ///
    /// # Panics
    ///
    /// When fingerprinting is enabled and the asset is missing from the
    /// manifest. Serving a guessed path would hand out a broken link.
    pub fn path(&self, kind: AssetKind, file: &str) -> String {
        match self.try_path(kind, file) {
            Some(url) => url,
            None => panic!(
                "asset {} requested but was not in manifest, did you remember to run `sluice build`?",
                Self::key(kind, file)
            ),
        }
    }

    /// Like [`AssetPaths::path`], `None` instead of panicking.
    pub fn try_path(&self, kind: AssetKind, file: &str) -> Option<String> {
        let file = file.trim_start_matches('/');

        if !self.fingerprint {
            return Some(format!("{}/{ASSETS_DIR}/{}/{file}", self.cdn_url, kind.dir()));
        }

        self.manifest
            .asset(&Self::key(kind, file))
            .map(|url| format!("{}{url}", self.cdn_url))
    }

    /// Manifest key of a logical path.
    pub fn key(kind: AssetKind, file: &str) -> String {
        format!("{}/{}", kind.dir(), file.trim_start_matches('/'))
    }

    pub fn script(&self, file: &str) -> String {
        self.path(AssetKind::Script, file)
    }

    pub fn stylesheet(&self, file: &str) -> String {
        self.path(AssetKind::Stylesheet, file)
    }

    pub fn image(&self, file: &str) -> String {
        self.path(AssetKind::Image, file)
    }

    pub fn video(&self, file: &str) -> String {
        self.path(AssetKind::Video, file)
    }

    pub fn audio(&self, file: &str) -> String {
        self.path(AssetKind::Audio, file)
    }

    pub fn font(&self, file: &str) -> String {
        self.path(AssetKind::Font, file)
    }
}
