use crate::batch::BatchId;
use crate::error::{Result, WatermarkError};
use crate::logging::{LogFormat, LoggingConfig, DEFAULT_LOG_LEVEL};
use crate::watermark::RawOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Service configuration, loadable from a JSON file. Every field is optional
/// in the file; command-line flags override what it sets.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Root for scratch files (`jobs/`) and finished archives (`archives/`).
    pub work_dir: PathBuf,
    /// Files of one batch processed at the same time. 1 keeps batches sequential.
    pub max_parallel_files: usize,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    /// Applied when a caller leaves an option out.
    pub default_options: RawOptions,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("seal"),
            max_parallel_files: 1,
            ffmpeg_path: None,
            ffprobe_path: None,
            default_options: RawOptions::default(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read(path.as_ref())?;
        let config: Self = serde_json::from_slice(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_parallel_files == 0 {
            return Err(WatermarkError::InvalidArgument(
                "max_parallel_files must be at least 1".to_string(),
            ));
        }
        if self.work_dir.as_os_str().is_empty() {
            return Err(WatermarkError::InvalidArgument(
                "work_dir must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.work_dir.join("jobs")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.work_dir.join("archives")
    }

    /// Archive location of a batch. Ids that could leave `archives/` are rejected.
    pub fn archive_path(&self, batch_id: &BatchId) -> Result<PathBuf> {
        if !batch_id.is_path_safe() {
            return Err(WatermarkError::InvalidBatchId(batch_id.to_string()));
        }
        Ok(self.archive_dir().join(format!("{batch_id}.zip")))
    }

    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            format: self.log_format,
        }
    }
}
