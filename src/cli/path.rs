//! Template path lookup (`sluice path`).

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::asset::{AssetKind, AssetPaths, Manifest};
use crate::config::SluiceConfig;

/// Print the public URL a template would use for `file`.
///
/// Goes through the same helpers templates call, so an asset missing from
/// the manifest panics here too.
pub fn print_path(config: &SluiceConfig, kind: AssetKind, file: &str) -> Result<()> {
    let paths = asset_paths(config)?;
    println!("{}", lookup(&paths, kind, file));
    Ok(())
}

fn asset_paths(config: &SluiceConfig) -> Result<AssetPaths> {
    let fingerprint = config.build.fingerprint;
    let manifest = if fingerprint {
        Manifest::load(&config.build.output)
            .context("Fingerprinted paths need a manifest, run `sluice build` first")?
    } else {
        Manifest::default()
    };
    Ok(AssetPaths::new(Arc::new(manifest), &config.build.cdn_url, fingerprint))
}

fn lookup(paths: &AssetPaths, kind: AssetKind, file: &str) -> String {
    match kind {
        AssetKind::Script => paths.script(file),
        AssetKind::Stylesheet => paths.stylesheet(file),
        AssetKind::Image => paths.image(file),
        AssetKind::Audio => paths.audio(file),
        AssetKind::Video => paths.video(file),
        AssetKind::Font => paths.font(file),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::FileInfo;
    use crate::config::test_parse_config;
    use tempfile::TempDir;

    fn config(dir: &TempDir, fingerprint: bool) -> SluiceConfig {
        let mut config = test_parse_config("[js]\n");
        config.build.output = dir.path().to_path_buf();
        config.build.fingerprint = fingerprint;
        config
    }

    #[test]
    fn test_lookup_through_manifest() {
        let dir = TempDir::new().unwrap();
        let mut manifest = Manifest::default();
        manifest.insert(
            "js/app.js".into(),
            "/assets/js/app-abc.js".into(),
            FileInfo {
                mtime: "2016-06-18T14:18:44-07:00".parse().unwrap(),
                size: 1,
                digest: "abc".into(),
            },
        );
        manifest.save(dir.path()).unwrap();

        let paths = asset_paths(&config(&dir, true)).unwrap();
        assert_eq!(lookup(&paths, AssetKind::Script, "app.js"), "/assets/js/app-abc.js");
    }

    #[test]
    fn test_lookup_without_fingerprint() {
        let dir = TempDir::new().unwrap();
        let paths = asset_paths(&config(&dir, false)).unwrap();
        assert_eq!(lookup(&paths, AssetKind::Font, "a.ttf"), "/assets/fonts/a.ttf");
    }

    #[test]
    fn test_missing_manifest_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(asset_paths(&config(&dir, true)).is_err());
    }

    #[test]
    #[should_panic(expected = "js/missing.js")]
    fn test_unknown_asset_panics() {
        let dir = TempDir::new().unwrap();
        Manifest::default().save(dir.path()).unwrap();
        let paths = asset_paths(&config(&dir, true)).unwrap();
        lookup(&paths, AssetKind::Script, "missing.js");
    }
}
