use crate::error::{Result, WatermarkError};
use crate::media::toolchain::{MediaToolchain, TranscodeJob};
use crate::watermark::{geometry, CompositeJob, Compositor, WatermarkOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// # Video watermark processor
///
/// Each file costs two sequential subprocesses, a probe and a transcode,
/// run inside a private scratch directory that is always removed afterwards.
pub struct VideoWatermarker {
    toolchain: Arc<dyn MediaToolchain>,
    scratch_dir: PathBuf,
}

/// Width and height of the first video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoDimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize)]
struct ProbeReport {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
}

impl VideoWatermarker {
    pub fn new(toolchain: Arc<dyn MediaToolchain>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            toolchain,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// # Probe the first video stream's dimensions
    pub fn probe_dimensions(&self, input: &Path) -> Result<VideoDimensions> {
        let output = self.toolchain.probe(input)?;
        if !output.success() {
            return Err(WatermarkError::ProbeFailed(format!(
                "ffprobe exited with code {:?}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }
        Self::parse_probe(&output.stdout)
    }

    fn parse_probe(stdout: &[u8]) -> Result<VideoDimensions> {
        let report: ProbeReport = serde_json::from_slice(stdout)
            .map_err(|e| WatermarkError::ProbeFailed(format!("unparseable probe output: {e}")))?;
        let stream = report
            .streams
            .into_iter()
            .next()
            .ok_or(WatermarkError::NoVideoStream)?;

        match (stream.width, stream.height) {
            (Some(width), Some(height)) => Ok(VideoDimensions { width, height }),
            _ => Err(WatermarkError::ProbeFailed(
                "video stream has no width/height".to_string(),
            )),
        }
    }

    /// # Build the filter graph
    ///
    /// Input 1 (watermark) is scaled to the target width with proportional
    /// height, its alpha multiplied by the opacity, then overlaid onto input 0.
    pub fn build_filter_graph(source_width: u32, options: &WatermarkOptions) -> String {
        let position = geometry::resolve_expression(options.position);
        format!(
            "[1:v]scale={}:-1[wm];[wm]format=rgba,colorchannelmixer=aa={}[wm_opacity];[0:v][wm_opacity]overlay={}[outv]",
            options.target_width(source_width),
            options.opacity,
            position.overlay_arg()
        )
    }

    /// 临时目录前缀：批次 + 文件名，唯一后缀由 tempfile 生成
    fn scratch_prefix(job: &CompositeJob<'_>) -> String {
        let stem: String = Path::new(job.file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .take(32)
            .collect();
        format!("{}-{}-", job.batch_id, stem)
    }

    fn run_in(&self, workspace: &Path, job: &CompositeJob<'_>) -> Result<Vec<u8>> {
        let extension = job.extension().unwrap_or_else(|| "mp4".to_string());
        let input = workspace.join(format!("source.{extension}"));
        let watermark = workspace.join(format!("watermark.{}", job.watermark.extension()));
        let output = workspace.join(format!("output.{extension}"));

        std::fs::write(&input, job.content)?;
        std::fs::write(&watermark, job.watermark.bytes())?;

        let dimensions = self.probe_dimensions(&input)?;
        let filter_graph = Self::build_filter_graph(dimensions.width, job.options);
        debug!(
            file = job.file_name,
            width = dimensions.width,
            height = dimensions.height,
            %filter_graph,
            "transcoding video"
        );

        let result = self.toolchain.transcode(&TranscodeJob {
            input: &input,
            watermark: &watermark,
            filter_graph: &filter_graph,
            output: &output,
        })?;
        if !result.success() {
            return Err(WatermarkError::TranscodeFailed {
                exit_code: result.exit_code,
            });
        }

        Ok(std::fs::read(&output)?)
    }
}

impl Compositor for VideoWatermarker {
    fn apply(&self, job: &CompositeJob<'_>) -> Result<Vec<u8>> {
        std::fs::create_dir_all(&self.scratch_dir)?;
        let workspace = tempfile::Builder::new()
            .prefix(&Self::scratch_prefix(job))
            .tempdir_in(&self.scratch_dir)?;

        let result = self.run_in(workspace.path(), job);

        // 无论成功与否都清理临时文件；清理失败只记录日志
        let workspace_path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            warn!(path = %workspace_path.display(), error = %e, "failed to remove video scratch files");
        }

        result
    }

    fn name(&self) -> &'static str {
        "video"
    }
}
