//! External tools used by the video path.
//!
//! The trait returns raw exit codes and captured stdout; interpreting them
//! (parse errors, non-zero exits) is left to the video compositor so every
//! failure mode can be exercised with a scripted toolchain.

use crate::error::{Result, WatermarkError};
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// Result of one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Arguments of one transcode: burn `watermark` into `input`, write `output`.
#[derive(Debug, Clone, Copy)]
pub struct TranscodeJob<'a> {
    pub input: &'a Path,
    pub watermark: &'a Path,
    pub filter_graph: &'a str,
    pub output: &'a Path,
}

impl TranscodeJob<'_> {
    /// Everything after the two inputs: filter graph, stream mapping, codecs.
    /// Audio is copied when present; `0:a?` keeps silent sources working.
    pub fn output_args(&self) -> Vec<String> {
        [
            "-filter_complex",
            self.filter_graph,
            "-map",
            "[outv]",
            "-map",
            "0:a?",
            "-c:v",
            "libx264",
            "-preset",
            "fast",
            "-c:a",
            "copy",
        ]
        .iter()
        .map(|arg| arg.to_string())
        .collect()
    }
}

/// Metadata probe and transcoder. Calls block until the process exits.
pub trait MediaToolchain: Send + Sync {
    /// Ask for the first video stream's width and height as JSON.
    fn probe(&self, input: &Path) -> Result<ToolOutput>;

    fn transcode(&self, job: &TranscodeJob<'_>) -> Result<ToolOutput>;
}

/// ffprobe + ffmpeg, located through `ffmpeg-sidecar` unless overridden.
#[derive(Debug, Clone)]
pub struct FfmpegToolchain {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegToolchain {
    pub fn new(ffmpeg: Option<PathBuf>, ffprobe: Option<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.unwrap_or_else(ffmpeg_sidecar::paths::ffmpeg_path),
            ffprobe: ffprobe.unwrap_or_else(ffmpeg_sidecar::ffprobe::ffprobe_path),
        }
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn ffprobe_path(&self) -> &Path {
        &self.ffprobe
    }

    /// Whether both binaries can be started.
    pub fn is_available(&self) -> bool {
        [&self.ffmpeg, &self.ffprobe].iter().all(|binary| {
            Command::new(binary)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|status| status.success())
                .unwrap_or(false)
        })
    }

    pub fn probe_args(input: &Path) -> Vec<String> {
        vec![
            "-v".into(),
            "error".into(),
            "-select_streams".into(),
            "v:0".into(),
            "-show_entries".into(),
            "stream=width,height".into(),
            "-of".into(),
            "json".into(),
            input.to_string_lossy().into_owned(),
        ]
    }
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| {
        WatermarkError::Toolchain(format!("path is not valid UTF-8: {}", path.display()))
    })
}

impl MediaToolchain for FfmpegToolchain {
    fn probe(&self, input: &Path) -> Result<ToolOutput> {
        let output = Command::new(&self.ffprobe)
            .args(Self::probe_args(input))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| WatermarkError::ProbeFailed(format!("failed to run ffprobe: {e}")))?;

        Ok(ToolOutput {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn transcode(&self, job: &TranscodeJob<'_>) -> Result<ToolOutput> {
        let mut child = FfmpegCommand::new_with_path(&self.ffmpeg)
            .input(path_str(job.input)?)
            .input(path_str(job.watermark)?)
            .args(job.output_args())
            .overwrite()
            .output(path_str(job.output)?)
            .spawn()
            .map_err(WatermarkError::Io)?;

        // stderr 必须被持续读取，否则 ffmpeg 可能因管道写满而阻塞
        let mut errors = Vec::new();
        let events = child
            .iter()
            .map_err(|e| WatermarkError::Toolchain(e.to_string()))?;
        for event in events {
            match event {
                FfmpegEvent::Error(message)
                | FfmpegEvent::Log(LogLevel::Error | LogLevel::Fatal, message) => {
                    errors.push(message)
                }
                FfmpegEvent::Progress(progress) => {
                    debug!(frame = progress.frame, time = %progress.time, "transcoding");
                }
                _ => {}
            }
        }

        let status = child.wait().map_err(WatermarkError::Io)?;
        if !status.success() && !errors.is_empty() {
            warn!(output = %job.output.display(), "ffmpeg reported: {}", errors.join("; "));
        }

        Ok(ToolOutput {
            exit_code: status.code(),
            stdout: Vec::new(),
            stderr: errors.join("\n"),
        })
    }
}
