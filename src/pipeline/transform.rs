//! Run one source file through its kind's compilers and publish the result.
//!
//! Publishing is a single pass over the final stage output that feeds every
//! enabled sink at once: the scratch output file, the MD5 digest and the
//! gzip encoder. The scratch files live next to their final location and are
//! renamed into place only after every sink finished, so a reader of the
//! output tree never sees a partial file. On any failure the scratch files
//! are removed when their `TempPath` drops.

use std::fs::{self, File};
use std::io::{self, BufWriter, ErrorKind, Read, Write};
use std::path::{Component, Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempPath;

use super::error::{IoContext, PipelineError, Result};
use super::exec::run_stages;
use super::naming::FileNaming;
use crate::asset::{AssetKind, Command, CompilerSet, manifest::ASSETS_DIR};
use crate::debug;

/// Suffix of the gzip companion written next to each output.
pub const GZIP_SUFFIX: &str = ".gz";

const SCRATCH_PREFIX: &str = ".sluice-";
const CHUNK_SIZE: usize = 64 * 1024;

/// Feature toggles applied to every transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    pub compile: bool,
    pub minify: bool,
    pub fingerprint: bool,
    pub compress: bool,
    pub compression: Compression,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            compile: true,
            minify: true,
            fingerprint: true,
            compress: true,
            compression: Compression::fast(),
        }
    }
}

/// A compiled file that was renamed into the output tree.
#[derive(Debug, Clone)]
pub struct Published {
    pub kind: AssetKind,
    /// Directory of the source relative to `<input>/<kind-dir>`.
    pub rel_dir: PathBuf,
    pub naming: FileNaming,
    /// Absolute path of the published file.
    pub path: PathBuf,
    /// Hex MD5 of the published bytes, when fingerprinting.
    pub digest: Option<String>,
    pub size: u64,
    /// Gzip companion, when compressing.
    pub gz: Option<PathBuf>,
}

impl Published {
    /// Manifest key: `<kind-dir>/<rel-dir>/<filename>.<extension>`.
    pub fn key(&self) -> String {
        join_segments(self.kind, &self.rel_dir, &self.naming.logical_name())
    }

    /// Public URL path of the published file.
    pub fn url(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("/{ASSETS_DIR}/{}", join_segments(self.kind, &self.rel_dir, &name))
    }
}

/// Compiler configuration plus the source and output roots.
#[derive(Debug, Clone)]
pub struct Pipeline {
    input: PathBuf,
    output: PathBuf,
    kinds: Vec<(AssetKind, CompilerSet)>,
    options: Options,
}

impl Pipeline {
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        kinds: impl IntoIterator<Item = (AssetKind, CompilerSet)>,
        options: Options,
    ) -> Self {
        let mut kinds: Vec<_> = kinds.into_iter().collect();
        kinds.sort_by_key(|(kind, _)| *kind);
        kinds.dedup_by_key(|(kind, _)| *kind);
        Self {
            input: input.into(),
            output: output.into(),
            kinds,
            options,
        }
    }

    pub fn options(&self) -> Options {
        self.options
    }

    /// Same configuration with different toggles.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Registered kinds.
    pub fn kinds(&self) -> impl Iterator<Item = AssetKind> + '_ {
        self.kinds.iter().map(|(kind, _)| *kind)
    }

    pub fn compilers(&self, kind: AssetKind) -> Result<&CompilerSet> {
        self.kinds
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, set)| set)
            .ok_or(PipelineError::NotConfigured { kind })
    }

    /// `<input>/<kind-dir>/<rel>`
    pub fn source_dir(&self, kind: AssetKind, rel: &Path) -> PathBuf {
        self.input.join(kind.dir()).join(rel)
    }

    /// `<output>/assets/<kind-dir>/<rel>`
    pub fn output_dir(&self, kind: AssetKind, rel: &Path) -> PathBuf {
        self.output.join(ASSETS_DIR).join(kind.dir()).join(rel)
    }

    /// Resolve the naming of `source` under `kind`'s compiler set.
    pub fn resolve(&self, kind: AssetKind, source: &Path) -> Result<FileNaming> {
        let compilers = self.compilers(kind)?;
        Ok(FileNaming::resolve(&file_name(source)?, compilers))
    }

    /// Compile `source` and return the path to serve.
    ///
    /// A kind with neither compilers nor a minifier serves its sources as
    /// they are: the source path comes back unchanged and nothing is written.
    pub fn transform(&self, kind: AssetKind, source: &Path) -> Result<PathBuf> {
        if self.compilers(kind)?.is_passthrough() {
            return Ok(source.to_path_buf());
        }
        Ok(self.publish(kind, source)?.path)
    }

    /// Run the full pipeline for `source` and rename the result into the
    /// output tree.
    pub fn publish(&self, kind: AssetKind, source: &Path) -> Result<Published> {
        let compilers = self.compilers(kind)?;
        match fs::metadata(source) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(PipelineError::NotFound(source.to_path_buf())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PipelineError::NotFound(source.to_path_buf()));
            }
            Err(e) => {
                return Err(e).io_context(|| format!("failed to stat {}", source.display()));
            }
        }

        let naming = FileNaming::resolve(&file_name(source)?, compilers);
        let stages = self.stages(kind, compilers, &naming);
        let value = run_stages(source, stages)?;

        let rel_dir = self.rel_dir(kind, source);
        let out_dir = self.output_dir(kind, &rel_dir);
        fs::create_dir_all(&out_dir)
            .io_context(|| format!("failed to create directory {}", out_dir.display()))?;

        let written = self.write_sinks(&mut value.reader()?, &out_dir)?;

        let final_name = naming.final_name(written.digest.as_deref());
        let path = out_dir.join(&final_name);

        // Companion first, so the main file never appears without it
        let gz = match written.gz {
            Some(tmp) => {
                let gz_path = out_dir.join(format!("{final_name}{GZIP_SUFFIX}"));
                persist(tmp, &gz_path)?;
                Some(gz_path)
            }
            None => None,
        };
        persist(written.output, &path)?;

        debug!("pipeline"; "{} -> {}", source.display(), path.display());

        Ok(Published {
            kind,
            rel_dir,
            naming,
            path,
            digest: written.digest,
            size: written.size,
            gz,
        })
    }

    /// Compilers in run order, then the minifier.
    fn stages<'a>(
        &self,
        kind: AssetKind,
        compilers: &'a CompilerSet,
        naming: &FileNaming,
    ) -> Vec<&'a Command> {
        let mut stages = Vec::new();
        if self.options.compile {
            stages.extend(naming.compile_order().filter_map(|ext| compilers.compiler(ext)));
        }
        if self.options.minify && kind.supports_minify() {
            stages.extend(compilers.minifier.as_ref());
        }
        stages
    }

    fn rel_dir(&self, kind: AssetKind, source: &Path) -> PathBuf {
        let root = self.input.join(kind.dir());
        source
            .parent()
            .and_then(|parent| parent.strip_prefix(&root).ok())
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    fn write_sinks(&self, reader: &mut dyn Read, out_dir: &Path) -> Result<Written> {
        let (file, output) = scratch_in(out_dir)?;
        let mut sinks = vec![Sink::Output(BufWriter::new(file))];

        if self.options.fingerprint {
            sinks.push(Sink::Digest(md5::Context::new()));
        }

        let gz = if self.options.compress {
            let (file, path) = scratch_in(out_dir)?;
            sinks.push(Sink::Gzip(GzEncoder::new(
                BufWriter::new(file),
                self.options.compression,
            )));
            Some(path)
        } else {
            None
        };

        let size = fan_out(reader, &mut sinks)
            .io_context(|| format!("failed to write output in {}", out_dir.display()))?;

        let mut digest = None;
        for sink in sinks {
            if let Some(hex) = sink
                .finish()
                .io_context(|| format!("failed to finish output in {}", out_dir.display()))?
            {
                digest = Some(hex);
            }
        }

        Ok(Written {
            output,
            gz,
            digest,
            size,
        })
    }
}

struct Written {
    output: TempPath,
    gz: Option<TempPath>,
    digest: Option<String>,
    size: u64,
}

/// One destination of the fan-out loop.
enum Sink {
    Output(BufWriter<File>),
    Digest(md5::Context),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Sink {
    fn write_all(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self {
            Self::Output(w) => w.write_all(chunk),
            Self::Digest(ctx) => {
                ctx.consume(chunk);
                Ok(())
            }
            Self::Gzip(enc) => enc.write_all(chunk),
        }
    }

    /// Flush to disk; the digest sink yields its hex string.
    fn finish(self) -> io::Result<Option<String>> {
        match self {
            Self::Output(w) => {
                w.into_inner().map_err(io::IntoInnerError::into_error)?;
                Ok(None)
            }
            Self::Digest(ctx) => Ok(Some(format!("{:x}", ctx.finalize()))),
            Self::Gzip(enc) => {
                enc.finish()?
                    .into_inner()
                    .map_err(io::IntoInnerError::into_error)?;
                Ok(None)
            }
        }
    }
}

/// Read `reader` once, writing every chunk to every sink.
fn fan_out(reader: &mut dyn Read, sinks: &mut [Sink]) -> io::Result<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        for sink in sinks.iter_mut() {
            sink.write_all(&buf[..n])?;
        }
        total += n as u64;
    }
    Ok(total)
}

/// Scratch file that becomes a published output; readable by everyone
/// like any other file in the tree, not owner-only.
fn scratch_in(dir: &Path) -> Result<(File, TempPath)> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(SCRATCH_PREFIX);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o644));
    }
    let tmp = builder
        .tempfile_in(dir)
        .io_context(|| format!("failed to create scratch file in {}", dir.display()))?;
    Ok(tmp.into_parts())
}

fn persist(tmp: TempPath, dest: &Path) -> Result<()> {
    tmp.persist(dest)
        .map_err(io::Error::from)
        .io_context(|| format!("failed to rename output to {}", dest.display()))
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| PipelineError::NotFound(path.to_path_buf()))
}

/// `<kind-dir>/<rel segments...>/<name>` with `/` separators on every platform.
fn join_segments(kind: AssetKind, rel_dir: &Path, name: &str) -> String {
    let mut parts = vec![kind.dir().to_string()];
    parts.extend(rel_dir.components().filter_map(|c| match c {
        Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
        _ => None,
    }));
    parts.push(name.to_string());
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{INFILE, OUTFILE};
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    const SCRIPT: &str = "function hello() {\n  return 'world';\n}\n";

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
            }
        }

        fn input(&self) -> PathBuf {
            self.dir.path().join("src")
        }

        fn output(&self) -> PathBuf {
            self.dir.path().join("public")
        }

        fn source(&self, kind: AssetKind, rel: &str, content: &str) -> PathBuf {
            let path = self.input().join(kind.dir()).join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            path
        }

        fn pipeline(&self, kind: AssetKind, set: CompilerSet, options: Options) -> Pipeline {
            Pipeline::new(self.input(), self.output(), [(kind, set)], options)
        }
    }

    /// `cat` and `tee` compilers plus a `cat $infile` minifier.
    fn chain() -> CompilerSet {
        CompilerSet::default()
            .with_compiler("cat", Command::new("cat").stdin(true).stdout(true))
            .with_compiler("tee", Command::new("tee").args([OUTFILE]).stdin(true))
            .with_minifier(Command::new("cat").args([INFILE]).stdout(true))
    }

    fn md5_hex(content: &str) -> String {
        format!("{:x}", md5::compute(content))
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_chain_roundtrips_bytes() {
        let fx = Fixture::new();
        let src = fx.source(AssetKind::Script, "app.js.tee.cat", SCRIPT);
        let pipeline = fx.pipeline(AssetKind::Script, chain(), Options::default());

        let published = pipeline.publish(AssetKind::Script, &src).unwrap();
        let digest = md5_hex(SCRIPT);

        assert_eq!(published.digest.as_deref(), Some(digest.as_str()));
        assert_eq!(
            published.path,
            fx.output().join("assets/js").join(format!("app-{digest}.js"))
        );
        assert_eq!(fs::read_to_string(&published.path).unwrap(), SCRIPT);
        assert_eq!(published.size, SCRIPT.len() as u64);
        assert_eq!(published.key(), "js/app.js");
        assert_eq!(published.url(), format!("/assets/js/app-{digest}.js"));
    }

    #[test]
    fn test_gzip_companion() {
        let fx = Fixture::new();
        let src = fx.source(AssetKind::Script, "app.js", SCRIPT);
        let pipeline = fx.pipeline(AssetKind::Script, chain(), Options::default());

        let published = pipeline.publish(AssetKind::Script, &src).unwrap();
        let gz = published.gz.unwrap();
        assert_eq!(gz, PathBuf::from(format!("{}.gz", published.path.display())));

        let mut decoded = String::new();
        GzDecoder::new(File::open(&gz).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, SCRIPT);
    }

    #[test]
    fn test_digest_is_deterministic() {
        let fx = Fixture::new();
        let a = fx.source(AssetKind::Script, "a/app.js.cat", SCRIPT);
        let b = fx.source(AssetKind::Script, "b/app.js.cat", SCRIPT);
        let pipeline = fx.pipeline(AssetKind::Script, chain(), Options::default());

        let first = pipeline.publish(AssetKind::Script, &a).unwrap();
        let second = pipeline.publish(AssetKind::Script, &b).unwrap();
        let again = pipeline.publish(AssetKind::Script, &a).unwrap();

        assert_eq!(first.digest, second.digest);
        assert_eq!(first.path.file_name(), second.path.file_name());
        assert_eq!(first.path, again.path);
        assert_eq!(second.key(), "js/b/app.js");
    }

    #[test]
    fn test_passthrough_returns_source_without_writes() {
        let fx = Fixture::new();
        let src = fx.source(AssetKind::Image, "logo.png", "png");
        let pipeline = fx.pipeline(AssetKind::Image, CompilerSet::default(), Options::default());

        let served = pipeline.transform(AssetKind::Image, &src).unwrap();
        assert_eq!(served, src);
        assert!(!fx.output().exists());
    }

    #[test]
    fn test_unregistered_kind() {
        let fx = Fixture::new();
        let src = fx.source(AssetKind::Font, "a.ttf", "font");
        let pipeline = fx.pipeline(AssetKind::Script, chain(), Options::default());

        let err = pipeline.transform(AssetKind::Font, &src).unwrap_err();
        assert!(matches!(err, PipelineError::NotConfigured { kind: AssetKind::Font }));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_missing_source() {
        let fx = Fixture::new();
        let pipeline = fx.pipeline(AssetKind::Script, chain(), Options::default());
        let missing = fx.input().join("js/nope.js");

        let err = pipeline.transform(AssetKind::Script, &missing).unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[test]
    fn test_unhashed_uncompressed() {
        let fx = Fixture::new();
        let src = fx.source(AssetKind::Stylesheet, "site/main.css.cat", "body{}");
        let options = Options {
            fingerprint: false,
            compress: false,
            ..Options::default()
        };
        let set = CompilerSet::default()
            .with_compiler("cat", Command::new("cat").stdin(true).stdout(true));
        let pipeline = fx.pipeline(AssetKind::Stylesheet, set, options);

        let path = pipeline.transform(AssetKind::Stylesheet, &src).unwrap();
        let out_dir = fx.output().join("assets/css/site");
        assert_eq!(path, out_dir.join("main.css"));
        assert_eq!(files_in(&out_dir), ["main.css"]);
    }

    #[test]
    fn test_minify_only() {
        let fx = Fixture::new();
        let src = fx.source(AssetKind::Stylesheet, "main.css", "a {  }");
        let set = CompilerSet::default().with_minifier(
            Command::new("sh")
                .args(["-c", "tr -d ' ' < \"$0\"", INFILE])
                .stdout(true),
        );
        let options = Options {
            fingerprint: false,
            compress: false,
            ..Options::default()
        };
        let pipeline = fx.pipeline(AssetKind::Stylesheet, set, options);

        let path = pipeline.transform(AssetKind::Stylesheet, &src).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "a{}");

        // Disabling minification copies the source through untouched
        let pipeline = pipeline.with_options(Options {
            minify: false,
            ..options
        });
        let path = pipeline.transform(AssetKind::Stylesheet, &src).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "a {  }");
    }

    #[test]
    fn test_minifier_ignored_for_images() {
        let fx = Fixture::new();
        let src = fx.source(AssetKind::Image, "a.svg", "<svg/>");
        let set = CompilerSet::default().with_minifier(Command::new("false"));
        let options = Options {
            fingerprint: false,
            compress: false,
            ..Options::default()
        };
        let pipeline = fx.pipeline(AssetKind::Image, set, options);

        let path = pipeline.transform(AssetKind::Image, &src).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "<svg/>");
    }

    #[test]
    fn test_failure_leaves_no_output() {
        let fx = Fixture::new();
        let src = fx.source(AssetKind::Script, "app.js.bad", SCRIPT);
        let set = CompilerSet::default()
            .with_compiler("bad", Command::new("sh").args(["-c", "exit 1"]).stdout(true));
        let pipeline = fx.pipeline(AssetKind::Script, set, Options::default());

        let err = pipeline.publish(AssetKind::Script, &src).unwrap_err();
        assert!(matches!(err, PipelineError::CommandFailed { .. }));
        let out_dir = fx.output().join("assets/js");
        assert!(!out_dir.exists() || files_in(&out_dir).is_empty());
    }

    #[test]
    fn test_no_scratch_files_left_behind() {
        let fx = Fixture::new();
        let src = fx.source(AssetKind::Script, "app.js.tee.cat", SCRIPT);
        let pipeline = fx.pipeline(AssetKind::Script, chain(), Options::default());

        pipeline.publish(AssetKind::Script, &src).unwrap();
        let names = files_in(&fx.output().join("assets/js"));
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| !n.starts_with(SCRATCH_PREFIX)));
    }
}
