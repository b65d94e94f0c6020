//! Split a source file name into its logical parts.
//!
//! `file.thing.css.scss.erb` with compilers for `scss` and `erb`:
//!
//! ```text
//! file.thing . css . scss.erb
//! ^ filename   ^     ^ extensions (compiled right to left)
//!              extension
//! ```
//!
//! Tokens are consumed from the right while they name a registered
//! compiler. The first token that does not is the extension. The leading
//! token always belongs to the filename, so `scss.scss` keeps `scss` as
//! its filename even when `scss` is a compiler.

use crate::asset::CompilerSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNaming {
    /// Everything before the extension (may itself contain dots).
    pub filename: String,
    /// Extension of the compiled output; empty when the name has no dot.
    pub extension: String,
    /// Compiler tokens, in file-name order.
    pub extensions: Vec<String>,
}

impl FileNaming {
    pub fn resolve(name: &str, compilers: &CompilerSet) -> Self {
        let tokens: Vec<&str> = name.split('.').collect();
        if tokens.len() < 2 {
            return Self {
                filename: name.to_string(),
                extension: String::new(),
                extensions: Vec::new(),
            };
        }

        // Index of the extension token; at least 1
        let mut ext = tokens.len() - 1;
        while ext > 1 && compilers.has_compiler(tokens[ext]) {
            ext -= 1;
        }

        Self {
            filename: tokens[..ext].join("."),
            extension: tokens[ext].to_string(),
            extensions: tokens[ext + 1..].iter().map(|t| t.to_string()).collect(),
        }
    }

    /// `<filename>.<extension>`, the name a page asks for.
    pub fn logical_name(&self) -> String {
        self.with_suffix(None)
    }

    /// Published name, with `-<digest>` appended to the filename if given.
    pub fn final_name(&self, digest: Option<&str>) -> String {
        self.with_suffix(digest)
    }

    /// Compiler tokens in the order their compilers run.
    pub fn compile_order(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().rev().map(String::as_str)
    }

    fn with_suffix(&self, digest: Option<&str>) -> String {
        let mut name = self.filename.clone();
        if let Some(digest) = digest {
            name.push('-');
            name.push_str(digest);
        }
        if !self.extension.is_empty() {
            name.push('.');
            name.push_str(&self.extension);
        }
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Command;

    fn compilers(exts: &[&str]) -> CompilerSet {
        exts.iter().fold(CompilerSet::default(), |set, ext| {
            set.with_compiler(ext, Command::new("cat"))
        })
    }

    fn naming(filename: &str, extension: &str, extensions: &[&str]) -> FileNaming {
        FileNaming {
            filename: filename.into(),
            extension: extension.into(),
            extensions: extensions.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_resolve_compiler_chain() {
        let set = compilers(&["scss", "erb"]);
        assert_eq!(
            FileNaming::resolve("file.thing.css.scss.erb", &set),
            naming("file.thing", "css", &["scss", "erb"])
        );
    }

    #[test]
    fn test_resolve_plain() {
        let set = compilers(&["scss"]);
        assert_eq!(FileNaming::resolve("app.css", &set), naming("app", "css", &[]));
        assert_eq!(
            FileNaming::resolve("jquery.min.js", &CompilerSet::default()),
            naming("jquery.min", "js", &[])
        );
    }

    #[test]
    fn test_resolve_no_dot() {
        let set = compilers(&["scss"]);
        let n = FileNaming::resolve("LICENSE", &set);
        assert_eq!(n, naming("LICENSE", "", &[]));
        assert_eq!(n.final_name(Some("abc")), "LICENSE-abc");
        assert_eq!(n.logical_name(), "LICENSE");
    }

    #[test]
    fn test_resolve_leading_token_is_filename() {
        let set = compilers(&["scss"]);
        assert_eq!(FileNaming::resolve("scss.scss", &set), naming("scss", "scss", &[]));
        assert_eq!(
            FileNaming::resolve("a.scss.scss", &set),
            naming("a", "scss", &["scss"])
        );
    }

    #[test]
    fn test_resolve_ignores_case() {
        let set = compilers(&["scss"]);
        assert_eq!(
            FileNaming::resolve("Site.CSS.SCSS", &set),
            naming("Site", "CSS", &["SCSS"])
        );
    }

    #[test]
    fn test_final_name() {
        let n = naming("file.thing", "css", &["scss", "erb"]);
        assert_eq!(n.final_name(None), "file.thing.css");
        assert_eq!(
            n.final_name(Some("5d41402abc4b2a76b9719d911017c592")),
            "file.thing-5d41402abc4b2a76b9719d911017c592.css"
        );
        assert_eq!(n.compile_order().collect::<Vec<_>>(), ["erb", "scss"]);
    }
}
