use crate::logging::LogFormat;
use crate::watermark::RawOptions;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// 批量水印 CLI 工具
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 详细输出
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log output format (overrides the configuration file)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Do not try to download FFmpeg on startup
    #[arg(long, global = true)]
    pub no_download: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watermark a set of images and videos into one ZIP archive
    Apply {
        /// Watermark image
        #[arg(short, long)]
        watermark: PathBuf,

        /// Archive to write
        #[arg(short, long)]
        output: PathBuf,

        /// top-left, top-center, top-right, center, bottom-left, bottom-center, bottom-right
        #[arg(short, long)]
        position: Option<String>,

        /// Watermark opacity (0.0-1.0)
        #[arg(long)]
        opacity: Option<String>,

        /// Watermark width relative to each file's width (0.0-1.0]
        #[arg(short, long)]
        scale: Option<String>,

        /// Files processed in parallel
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Build the archive in memory instead of tracking a background batch
        #[arg(long)]
        in_memory: bool,

        /// Images and videos to watermark
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the dimensions of a video's first stream
    Probe {
        /// 输入文件路径
        input: PathBuf,
    },
}

impl Commands {
    /// Option strings given on the command line, unset ones left empty.
    pub fn raw_options(&self) -> RawOptions {
        match self {
            Commands::Apply {
                position,
                opacity,
                scale,
                ..
            } => RawOptions {
                position: position.clone(),
                opacity: opacity.clone(),
                scale: scale.clone(),
            },
            Commands::Probe { .. } => RawOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn apply_collects_raw_options() {
        let cli = Cli::parse_from([
            "seal", "apply", "-w", "wm.png", "-o", "out.zip", "--opacity", "0.4", "-p", "center",
            "a.jpg", "b.mp4",
        ]);
        let raw = cli.command.raw_options();
        assert_eq!(raw.position.as_deref(), Some("center"));
        assert_eq!(raw.opacity.as_deref(), Some("0.4"));
        assert_eq!(raw.scale, None);
        match cli.command {
            Commands::Apply { files, in_memory, .. } => {
                assert_eq!(files.len(), 2);
                assert!(!in_memory);
            }
            Commands::Probe { .. } => panic!("expected apply"),
        }
    }
}
