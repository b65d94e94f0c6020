//! Batch precompilation (`sluice build`).
//!
//! Phases:
//! - **Collect** - Walk `<input>/<kind-dir>` for every registered kind
//! - **Publish** - Run every source through its pipeline in parallel
//! - **Manifest** - Record fingerprinted outputs in `manifest.json`

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SubsecRound, Utc};
use jwalk::WalkDir;
use rayon::prelude::*;

use crate::asset::{AssetKind, FileInfo, Manifest};
use crate::config::SluiceConfig;
use crate::core::is_shutdown;
use crate::logger::ProgressLine;
use crate::pipeline::{Pipeline, Published};
use crate::{debug, log};

/// One source file and the kind whose pipeline it goes through.
#[derive(Debug)]
struct Job {
    kind: AssetKind,
    source: PathBuf,
}

/// Precompile every source and, when fingerprinting, write the manifest.
pub fn build_all(config: &SluiceConfig, quiet: bool) -> Result<Vec<Published>> {
    let started = Instant::now();
    let pipeline = config.pipeline();

    let jobs = collect_jobs(&pipeline);
    if jobs.is_empty() {
        log!("build"; "no assets found in {}", pipeline.input().display());
    }

    let progress = (!quiet && !jobs.is_empty()).then(|| create_progress(&pipeline, &jobs));
    let published = publish_all(&pipeline, &jobs, progress.as_ref())?;
    if let Some(p) = progress {
        p.finish();
    }

    if pipeline.options().fingerprint {
        let manifest = build_manifest(&published)?;
        let path = manifest.save(pipeline.output())?;
        debug!("build"; "manifest: {}", path.display());
    }

    if !quiet {
        log!(
            "build"; "{} assets published to {} in {:.2?}",
            published.len(),
            pipeline.output().display(),
            started.elapsed()
        );
    }
    Ok(published)
}

/// Every source under `<input>/<kind-dir>`, kinds in order, paths sorted.
fn collect_jobs(pipeline: &Pipeline) -> Vec<Job> {
    pipeline
        .kinds()
        .flat_map(|kind| {
            collect_sources(&pipeline.source_dir(kind, Path::new("")))
                .into_iter()
                .map(move |source| Job { kind, source })
        })
        .collect()
}

/// Regular files below `dir`. Hidden files and directories (`.DS_Store`,
/// editor swap files) are skipped.
fn collect_sources(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .skip_hidden(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path())
        .collect();
    files.sort();
    files
}

fn create_progress(pipeline: &Pipeline, jobs: &[Job]) -> ProgressLine {
    let counts: Vec<(&'static str, usize)> = pipeline
        .kinds()
        .map(|kind| (kind.dir(), jobs.iter().filter(|j| j.kind == kind).count()))
        .collect();
    ProgressLine::new(&counts)
}

/// Publish all jobs in parallel; the first failure stops scheduling.
fn publish_all(
    pipeline: &Pipeline,
    jobs: &[Job],
    progress: Option<&ProgressLine>,
) -> Result<Vec<Published>> {
    let has_error = AtomicBool::new(false);

    jobs.par_iter()
        .map(|job| {
            if is_shutdown() || has_error.load(Ordering::Relaxed) {
                return Err(anyhow!("Aborted"));
            }
            match pipeline.publish(job.kind, &job.source) {
                Ok(published) => {
                    debug!("build"; "{} -> {}", job.source.display(), published.path.display());
                    if let Some(gz) = &published.gz {
                        debug!("build"; "{} -> {}", job.source.display(), gz.display());
                    }
                    if let Some(p) = progress {
                        p.inc(job.kind.dir());
                    }
                    Ok(published)
                }
                Err(e) => {
                    if !has_error.swap(true, Ordering::Relaxed) {
                        log!("error"; "{}: {}", job.source.display(), e);
                    }
                    Err(anyhow!("Build failed"))
                }
            }
        })
        .collect()
}

/// Manifest entries for every fingerprinted output.
fn build_manifest(published: &[Published]) -> Result<Manifest> {
    let mut manifest = Manifest::default();
    for item in published {
        let Some(digest) = &item.digest else {
            continue;
        };
        let modified = fs::metadata(&item.path)
            .and_then(|m| m.modified())
            .with_context(|| format!("Failed to stat {}", item.path.display()))?;
        let info = FileInfo {
            mtime: DateTime::<Utc>::from(modified).trunc_subsecs(0),
            size: item.size,
            digest: digest.clone(),
        };
        manifest.insert(item.key(), item.url(), info);
    }
    Ok(manifest)
}
