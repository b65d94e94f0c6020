//! Serve precompiled files listed in the manifest.
//!
//! Fingerprinted names never change content, so these responses carry
//! strong validators from the manifest: the stored digest becomes both
//! `Content-Md5` and the `ETag`, and the recorded mtime is `Last-Modified`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Result;

use super::Handler;
use super::request::RequestHead;
use super::response::{FileReply, Reply};
use crate::asset::{FileInfo, Manifest};
use crate::pipeline::GZIP_SUFFIX;
use crate::utils::path::{join_segments, safe_segments};
use crate::{debug, log};

pub struct StaticHandler {
    output: PathBuf,
    manifest: Manifest,
    compress: bool,
}

impl StaticHandler {
    pub fn new(output: impl Into<PathBuf>, manifest: Manifest, compress: bool) -> Self {
        Self {
            output: output.into(),
            manifest,
            compress,
        }
    }

    /// Load `<output>/assets/manifest.json` once for the lifetime of the server.
    pub fn load(output: &Path, compress: bool) -> Result<Self> {
        let manifest = Manifest::load(output)?;
        log!(
            "serve";
            "static mode, {} files in manifest",
            manifest.files.len()
        );
        Ok(Self::new(output, manifest, compress))
    }

    fn serve(&self, head: &RequestHead, url: &str, public: &Path, info: &FileInfo) -> Reply {
        let gzip = self.compress && head.accepts_gzip();
        let path = if gzip {
            let mut name = public.as_os_str().to_owned();
            name.push(GZIP_SUFFIX);
            PathBuf::from(name)
        } else {
            public.to_path_buf()
        };

        let size = match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => return Reply::not_found(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Reply::not_found(),
            Err(e) => {
                log!("error"; "failed to stat {}: {e}", path.display());
                return Reply::internal_error();
            }
        };

        let file = FileReply {
            path: &path,
            name: public,
            size,
            modified: Some(info.modified()),
            etag: Some(format!("\"{}\"", info.digest)),
        };
        let mut reply = Reply::file(file, &head.conditions())
            .with_header("Content-Md5", info.digest.as_str());
        if gzip {
            reply = reply.with_header("Content-Encoding", "gzip");
        }
        if self.compress {
            reply = reply.with_header("Vary", "Accept-Encoding");
        }
        debug!("serve"; "{url} -> {}", path.display());
        reply
    }
}

impl Handler for StaticHandler {
    fn handle(&self, head: &RequestHead) -> Reply {
        if head.path.split('/').any(|s| s == "..") {
            return Reply::not_found();
        }
        // `.` and empty segments are dropped before the lookup
        let segments = safe_segments(&head.path);
        let url = format!("/{}", segments.join("/"));

        let Some(info) = self.manifest.file(&url) else {
            return Reply::not_found();
        };
        let Some(public) = join_segments(&self.output, &segments) else {
            return Reply::not_found();
        };
        self.serve(head, &url, &public, info)
    }
}
