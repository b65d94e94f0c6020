//! Asset kind definitions.

use std::fmt;

/// Category of asset. Each kind owns an independent compiler configuration
/// and its own subdirectory in both the source and output trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetKind {
    Script,
    Stylesheet,
    Image,
    Audio,
    Video,
    Font,
}

impl AssetKind {
    pub const ALL: [AssetKind; 6] = [
        Self::Script,
        Self::Stylesheet,
        Self::Image,
        Self::Audio,
        Self::Video,
        Self::Font,
    ];

    /// Directory name used in source paths, output paths and URLs.
    pub const fn dir(self) -> &'static str {
        match self {
            Self::Script => "js",
            Self::Stylesheet => "css",
            Self::Image => "img",
            Self::Audio => "audio",
            Self::Video => "videos",
            Self::Font => "fonts",
        }
    }

    /// Parse a directory name (`js`, `css`, ...) back into a kind.
    pub fn from_dir(dir: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.dir() == dir)
    }

    /// Only scripts and stylesheets have a minification stage.
    pub const fn supports_minify(self) -> bool {
        matches!(self, Self::Script | Self::Stylesheet)
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir())
    }
}
