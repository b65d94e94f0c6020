//! Command-line interface definitions.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{ColorChoice, Parser, Subcommand};

use crate::asset::AssetKind;

/// Asset compiler, fingerprinter and server
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: sluice.toml, searched upward)
    #[arg(
        short = 'C',
        long,
        global = true,
        default_value = "sluice.toml",
        value_hint = clap::ValueHint::FilePath
    )]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Precompile every asset and write the manifest
    #[command(visible_alias = "b")]
    Build {
        #[command(flatten)]
        build_args: BuildArgs,
    },

    /// Run one file through its pipeline and print the output path
    #[command(visible_alias = "c")]
    Compile {
        #[command(flatten)]
        build_args: BuildArgs,

        /// Asset kind (js, css, img, audio, videos, fonts)
        #[arg(value_parser = parse_kind)]
        kind: AssetKind,

        /// Source file
        #[arg(value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,
    },

    /// Serve assets over HTTP
    #[command(visible_alias = "s")]
    Serve {
        #[command(flatten)]
        build_args: BuildArgs,

        /// Serve precompiled files from the manifest instead of compiling on request
        #[arg(long = "static")]
        static_mode: bool,

        /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(long)]
        interface: Option<IpAddr>,

        /// Port number to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the public URL a template would use for an asset
    #[command(visible_alias = "p")]
    Path {
        #[command(flatten)]
        build_args: BuildArgs,

        /// Asset kind (js, css, img, audio, videos, fonts)
        #[arg(value_parser = parse_kind)]
        kind: AssetKind,

        /// Logical path relative to the kind's directory (e.g. `app.js`)
        file: String,
    },
}

/// Shared arguments for every command that touches the pipeline
#[derive(clap::Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Source root (contains js/, css/, img/, ...)
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub input: Option<PathBuf>,

    /// Output root (compiled files go to <output>/assets/)
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub output: Option<PathBuf>,

    /// Prefix for public asset URLs
    #[arg(long = "cdn-url", value_hint = clap::ValueHint::Url)]
    pub cdn_url: Option<String>,

    /// Skip compilers, keep the source extensions' contents as they are
    #[arg(long)]
    pub no_compile: bool,

    /// Skip the minifier stage
    #[arg(long)]
    pub no_minify: bool,

    /// Do not fingerprint file names (and do not write the manifest)
    #[arg(long)]
    pub no_hash: bool,

    /// Do not write .gz companions
    #[arg(long)]
    pub no_compress: bool,

    /// Log every external command and its stderr
    #[arg(short = 'V', long)]
    pub verbose: bool,
}

fn parse_kind(s: &str) -> Result<AssetKind, String> {
    AssetKind::from_dir(s).ok_or_else(|| {
        let valid: Vec<_> = AssetKind::ALL.iter().map(|k| k.dir()).collect();
        format!("unknown asset kind `{s}` (expected one of: {})", valid.join(", "))
    })
}

impl Cli {
    pub const fn build_args(&self) -> &BuildArgs {
        match &self.command {
            Commands::Build { build_args }
            | Commands::Compile { build_args, .. }
            | Commands::Serve { build_args, .. }
            | Commands::Path { build_args, .. } => build_args,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compile() {
        let cli =
            Cli::try_parse_from(["sluice", "compile", "--no-hash", "js", "app.js.ts"]).unwrap();
        match cli.command {
            Commands::Compile {
                build_args,
                kind,
                file,
            } => {
                assert!(build_args.no_hash);
                assert!(!build_args.no_minify);
                assert_eq!(kind, AssetKind::Script);
                assert_eq!(file, PathBuf::from("app.js.ts"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from([
            "sluice",
            "serve",
            "-V",
            "--static",
            "-p",
            "8080",
            "-i",
            "src",
            "--interface",
            "0.0.0.0",
        ])
        .unwrap();
        assert!(cli.build_args().verbose);
        assert_eq!(cli.build_args().input, Some(PathBuf::from("src")));
        match cli.command {
            Commands::Serve {
                static_mode,
                interface,
                port,
                ..
            } => {
                assert!(static_mode);
                assert_eq!(port, Some(8080));
                assert_eq!(interface, Some("0.0.0.0".parse().unwrap()));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_unknown_kind() {
        assert!(Cli::try_parse_from(["sluice", "compile", "scripts", "a.js"]).is_err());
    }
}
