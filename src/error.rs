use thiserror::Error;

/// 项目中的错误类型定义
///
/// Per-file variants are recorded in the batch status and never stop a batch;
/// see [`WatermarkError::is_fatal`] for the ones that reject a whole batch.
#[derive(Error, Debug)]
pub enum WatermarkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Unsupported file format: {ext}")]
    UnsupportedFormat { ext: String },

    #[error("No video stream found")]
    NoVideoStream,

    #[error("Failed to probe video: {0}")]
    ProbeFailed(String),

    #[error("FFmpeg exited with code {}", display_code(.exit_code))]
    TranscodeFailed { exit_code: Option<i32> },

    #[error("Watermark image is unreadable: {0}")]
    WatermarkUnreadable(image::ImageError),

    #[error("Failed to write archive: {0}")]
    ArchiveWriteFailed(#[from] zip::result::ZipError),

    #[error("Invalid file type: {0}")]
    UnsupportedMediaType(String),

    #[error("Upload not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid batch id: {0}")]
    InvalidBatchId(String),

    #[error("Failed to install logger: {0}")]
    Logging(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Toolchain error: {0}")]
    Toolchain(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl WatermarkError {
    /// Errors that abort the whole batch instead of a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::WatermarkUnreadable(_)
                | Self::ArchiveWriteFailed(_)
                | Self::UnsupportedMediaType(_)
                | Self::InvalidArgument(_)
        )
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, WatermarkError>;
