//! Compile assets on request and reuse the result until the source changes.
//!
//! The filesystem is the cache: a compiled file at the deterministic output
//! location that is newer than its source is served as is. Two concurrent
//! misses for the same asset both compile; each publishes through its own
//! scratch file, so the later rename simply wins.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::Handler;
use super::request::RequestHead;
use super::response::{FileReply, Reply};
use crate::asset::{AssetKind, manifest::ASSETS_DIR};
use crate::pipeline::{self, Options, Pipeline, PipelineError};
use crate::utils::mtime::is_fresh;
use crate::utils::path::{join_segments, safe_segments};
use crate::{debug, log};

pub struct DynamicHandler {
    pipeline: Pipeline,
}

/// A request path split into its asset parts.
struct AssetRequest<'a> {
    kind: AssetKind,
    rel: Vec<&'a str>,
    name: &'a str,
}

impl DynamicHandler {
    /// Fingerprinting is always off here: outputs must land at the
    /// location the staleness check looks at.
    pub fn new(pipeline: Pipeline) -> Self {
        let options = Options {
            fingerprint: false,
            ..pipeline.options()
        };
        Self {
            pipeline: pipeline.with_options(options),
        }
    }

    /// `/assets/<kind>/<rel...>/<name>`; `None` for anything else.
    fn parse<'a>(&self, path: &'a str) -> Option<AssetRequest<'a>> {
        if path.ends_with('/') {
            return None;
        }
        let segments = safe_segments(path);
        let [assets, kind, rest @ ..] = segments.as_slice() else {
            return None;
        };
        if *assets != ASSETS_DIR {
            return None;
        }
        let (&name, rel) = rest.split_last()?;
        let kind = AssetKind::from_dir(kind)?;
        self.pipeline.compilers(kind).ok()?;
        Some(AssetRequest {
            kind,
            rel: rel.to_vec(),
            name,
        })
    }

    /// Three-way branch: source as is, cached output, or a fresh compile.
    ///
    /// A compiled kind only answers to the name its output is published
    /// under, so `app.js.ts` or `app` never stand in for `app.js`.
    fn compile(
        &self,
        kind: AssetKind,
        rel: &Path,
        name: &str,
        source: &Path,
    ) -> pipeline::Result<PathBuf> {
        if self.pipeline.compilers(kind)?.is_passthrough() {
            return Ok(source.to_path_buf());
        }

        let logical = self.pipeline.resolve(kind, source)?.logical_name();
        let cached = self.pipeline.output_dir(kind, rel).join(&logical);
        if logical != name {
            return Err(PipelineError::NotFound(cached));
        }
        let fresh = is_fresh(&cached, source).map_err(|e| PipelineError::Io {
            context: format!("failed to stat {}", cached.display()),
            source: e,
        })?;
        if fresh {
            debug!("serve"; "cached {}", cached.display());
            return Ok(cached);
        }

        log!("serve"; "compiling {}", source.display());
        self.pipeline.transform(kind, source)
    }
}

impl Handler for DynamicHandler {
    fn handle(&self, head: &RequestHead) -> Reply {
        let Some(req) = self.parse(&head.path) else {
            return Reply::not_found();
        };

        let source_root = self.pipeline.source_dir(req.kind, Path::new(""));
        let Some(source_dir) = join_segments(&source_root, &req.rel) else {
            return Reply::not_found();
        };
        let source = match find_source(&source_dir, req.name) {
            Ok(Some(source)) => source,
            Ok(None) => return Reply::not_found(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Reply::not_found(),
            Err(e) => {
                log!("error"; "failed to list {}: {e}", source_dir.display());
                return Reply::internal_error();
            }
        };

        let rel: PathBuf = req.rel.iter().collect();
        let served = match self.compile(req.kind, &rel, req.name, &source) {
            Ok(served) => served,
            Err(e) if e.is_not_found() => return Reply::not_found(),
            Err(e) => {
                log!("error"; "failed to transform {}: {e}", source.display());
                return Reply::internal_error();
            }
        };

        let size = match fs::metadata(&served) {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => return Reply::not_found(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Reply::not_found(),
            Err(e) => {
                log!("error"; "failed to stat {}: {e}", served.display());
                return Reply::internal_error();
            }
        };

        let file = FileReply {
            path: &served,
            name: Path::new(req.name),
            size,
            modified: Some(SystemTime::now()),
            etag: None,
        };
        Reply::file(file, &head.conditions()).with_header("Cache-Control", "no-cache")
    }
}

/// First file in `dir` (by name) whose dot-separated tokens start with the
/// tokens of `name`, so `app.js` finds `app.js.ts`.
fn find_source(dir: &Path, name: &str) -> io::Result<Option<PathBuf>> {
    let wanted: Vec<&str> = name.split('.').collect();

    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.path().is_file() {
            candidates.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    candidates.sort();

    Ok(candidates
        .into_iter()
        .find(|candidate| {
            let tokens: Vec<&str> = candidate.split('.').collect();
            tokens.len() >= wanted.len() && tokens.iter().zip(&wanted).all(|(a, b)| a == b)
        })
        .map(|candidate| dir.join(candidate)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{Command, CompilerSet};
    use std::time::Duration;
    use tempfile::TempDir;

    const SOURCE: &str = "let answer = 42;\n";

    struct Fixture {
        dir: TempDir,
        handler: DynamicHandler,
    }

    impl Fixture {
        fn input(&self) -> PathBuf {
            self.dir.path().join("in")
        }

        fn output(&self) -> PathBuf {
            self.dir.path().join("out")
        }

        fn counter(&self) -> PathBuf {
            self.dir.path().join("count")
        }

        /// How many times the counting compiler ran.
        fn runs(&self) -> usize {
            fs::read_to_string(self.counter())
                .map(|s| s.lines().count())
                .unwrap_or(0)
        }

        fn write_source(&self, rel: &str, content: &str, age: Duration) -> PathBuf {
            let path = self.input().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            set_mtime(&path, SystemTime::now() - age);
            path
        }

        fn get(&self, url: &str) -> Reply {
            self.handler.handle(&RequestHead::new(url))
        }
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    /// `js` compiles `.ts` with a `cat` that appends a line to a counter;
    /// `img` has nothing configured; `css` has a compiler that always fails.
    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let counter = dir.path().join("count");
        let script = format!("echo run >> '{}'; cat", counter.display());

        let js = CompilerSet::default().with_compiler(
            "ts",
            Command::new("sh").args(["-c", script.as_str()]).stdin(true).stdout(true),
        );
        let css = CompilerSet::default().with_compiler(
            "scss",
            Command::new("sh").args(["-c", "exit 1"]).stdout(true),
        );
        let kinds = [
            (AssetKind::Script, js),
            (AssetKind::Stylesheet, css),
            (AssetKind::Image, CompilerSet::default()),
        ];
        let pipeline = Pipeline::new(
            dir.path().join("in"),
            dir.path().join("out"),
            kinds,
            Options::default(),
        );
        Fixture {
            dir,
            handler: DynamicHandler::new(pipeline),
        }
    }

    #[test]
    fn test_compiles_then_serves_cached() {
        let fx = fixture();
        fx.write_source("js/app.js.ts", SOURCE, Duration::from_secs(60));

        let first = fx.get("/assets/js/app.js");
        assert_eq!(first.status, 200);
        assert_eq!(first.body_bytes(), SOURCE.as_bytes());
        assert_eq!(fx.runs(), 1);

        let compiled = fx.output().join("assets/js/app.js");
        assert!(compiled.is_file());
        // Unhashed output, no fingerprinted copy
        assert_eq!(fs::read_to_string(&compiled).unwrap(), SOURCE);

        let second = fx.get("/assets/js/app.js");
        assert_eq!(second.status, 200);
        assert_eq!(second.body_bytes(), SOURCE.as_bytes());
        assert_eq!(fx.runs(), 1);
    }

    #[test]
    fn test_recompiles_when_source_is_newer() {
        let fx = fixture();
        let source = fx.write_source("js/app.js.ts", SOURCE, Duration::from_secs(60));
        assert_eq!(fx.get("/assets/js/app.js").status, 200);
        assert_eq!(fx.runs(), 1);

        fs::write(&source, "let answer = 43;\n").unwrap();
        set_mtime(&source, SystemTime::now() + Duration::from_secs(60));

        let reply = fx.get("/assets/js/app.js");
        assert_eq!(reply.body_bytes(), b"let answer = 43;\n");
        assert_eq!(fx.runs(), 2);
    }

    #[test]
    fn test_nested_directory() {
        let fx = fixture();
        fx.write_source("js/vendor/lib.js.ts", SOURCE, Duration::from_secs(60));

        let reply = fx.get("/assets/js/vendor/lib.js");
        assert_eq!(reply.status, 200);
        assert!(fx.output().join("assets/js/vendor/lib.js").is_file());
    }

    #[test]
    fn test_passthrough_serves_source() {
        let fx = fixture();
        fx.write_source("img/logo.png", "png bytes", Duration::from_secs(60));

        let reply = fx.get("/assets/img/logo.png");
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body_bytes(), b"png bytes");
        assert_eq!(reply.header("Content-Type"), Some(crate::utils::mime::types::PNG));
        assert!(!fx.output().exists());
    }

    #[test]
    fn test_headers() {
        let fx = fixture();
        fx.write_source("js/app.js.ts", SOURCE, Duration::from_secs(60));

        let reply = fx.get("/assets/js/app.js");
        assert_eq!(reply.header("Cache-Control"), Some("no-cache"));
        assert_eq!(reply.header("Content-Type"), Some(crate::utils::mime::types::JAVASCRIPT));
        assert_eq!(reply.header("ETag"), None);
        assert!(reply.header("Last-Modified").is_some());
    }

    #[test]
    fn test_range_request() {
        let fx = fixture();
        fx.write_source("js/app.js.ts", SOURCE, Duration::from_secs(60));

        let head = RequestHead::new("/assets/js/app.js").with_header("Range", "bytes=4-9");
        let reply = fx.handler.handle(&head);
        assert_eq!(reply.status, 206);
        assert_eq!(reply.body_bytes(), b"answer");
    }

    #[test]
    fn test_not_found_paths() {
        let fx = fixture();
        fx.write_source("js/app.js.ts", SOURCE, Duration::from_secs(60));

        for url in [
            "/assets/js/",
            "/assets/js",
            "/assets",
            "/",
            "/static/js/app.js",
            "/assets/scripts/app.js",
            "/assets/fonts/font.ttf",
            "/assets/js/missing.js",
            "/assets/js/nested/app.js",
            "/assets/js/app.css",
        ] {
            assert_eq!(fx.get(url).status, 404, "{url}");
        }
        assert_eq!(fx.runs(), 0);
    }

    #[test]
    fn test_only_published_name_is_served() {
        let fx = fixture();
        fx.write_source("js/app.js.ts", SOURCE, Duration::from_secs(60));

        assert_eq!(fx.get("/assets/js/app.js.ts").status, 404);
        assert_eq!(fx.get("/assets/js/app").status, 404);
        assert_eq!(fx.runs(), 0);
        assert_eq!(fx.get("/assets/js/app.js").status, 200);
    }

    #[cfg(unix)]
    #[test]
    fn test_cache_stat_failure_is_internal_error() {
        let fx = fixture();
        fx.write_source("js/app.js.ts", SOURCE, Duration::from_secs(60));
        // A file where the output directory should be makes the stat fail
        // with something other than "not found"
        fs::create_dir_all(fx.output().join("assets")).unwrap();
        fs::write(fx.output().join("assets/js"), "").unwrap();

        assert_eq!(fx.get("/assets/js/app.js").status, 500);
        assert_eq!(fx.runs(), 0);
    }

    #[test]
    fn test_compiler_failure_is_internal_error() {
        let fx = fixture();
        fx.write_source("css/site.css.scss", "a {}", Duration::from_secs(60));

        let reply = fx.get("/assets/css/site.css");
        assert_eq!(reply.status, 500);
        assert!(!fx.output().join("assets/css/site.css").exists());
    }

    #[test]
    fn test_find_source_prefers_first_sorted_match() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.js.ts"), "").unwrap();
        fs::write(dir.path().join("app.json"), "").unwrap();
        fs::write(dir.path().join("application.js"), "").unwrap();
        fs::create_dir(dir.path().join("app.js.d")).unwrap();

        assert_eq!(
            find_source(dir.path(), "app.js").unwrap(),
            Some(dir.path().join("app.js.ts"))
        );
        assert_eq!(
            find_source(dir.path(), "app").unwrap(),
            Some(dir.path().join("app.js.ts"))
        );
        assert_eq!(find_source(dir.path(), "app.css").unwrap(), None);
        assert!(find_source(&dir.path().join("nope"), "app.js").is_err());
    }

    #[test]
    fn test_minifier_only_kind_is_compiled() {
        let dir = TempDir::new().unwrap();
        let css = CompilerSet::default()
            .with_minifier(Command::new("tr").args(["-d", " "]).stdin(true).stdout(true));
        let pipeline = Pipeline::new(
            dir.path().join("in"),
            dir.path().join("out"),
            [(AssetKind::Stylesheet, css)],
            Options::default(),
        );
        let handler = DynamicHandler::new(pipeline);

        let source = dir.path().join("in/css/site.css");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, "a { color: red; }").unwrap();
        set_mtime(&source, SystemTime::now() - Duration::from_secs(60));

        let reply = handler.handle(&RequestHead::new("/assets/css/site.css"));
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body_bytes(), b"a{color:red;}");
        assert!(dir.path().join("out/assets/css/site.css").is_file());
    }
}
