pub mod image;
pub mod toolchain;
pub mod video;

pub use self::image::ImageWatermarker;
pub use toolchain::{FfmpegToolchain, MediaToolchain, ToolOutput, TranscodeJob};
pub use video::VideoWatermarker;

use crate::error::{Result, WatermarkError};
use std::path::Path;

/// 媒体文件类型检测
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Image,
    Video,
}

/// Upload types accepted at the request boundary.
pub const ALLOWED_MIME_TYPES: [&str; 9] = [
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "video/mp4",
    "video/quicktime",
    "video/x-msvideo",
    "video/x-matroska",
    "video/webm",
];

/// One uploaded file, owned by the batch that processes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub content: Vec<u8>,
    /// Media type declared by the uploader, if any.
    pub media_type: Option<String>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content,
            media_type: None,
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }
}

/// A watermarked file, keeping the name of its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedFile {
    pub name: String,
    pub content: Vec<u8>,
}

/// 媒体处理工具
pub struct MediaUtils;

impl MediaUtils {
    /// 根据文件扩展名检测媒体类型
    pub fn detect_media_type<P: AsRef<Path>>(path: P) -> Result<MediaType> {
        let extension = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        if Self::supported_image_formats().contains(&extension.as_str()) {
            Ok(MediaType::Image)
        } else if Self::supported_video_formats().contains(&extension.as_str()) {
            Ok(MediaType::Video)
        } else {
            Err(WatermarkError::UnsupportedFormat {
                ext: if extension.is_empty() {
                    String::new()
                } else {
                    format!(".{extension}")
                },
            })
        }
    }

    /// 获取支持的图片格式列表
    pub fn supported_image_formats() -> &'static [&'static str] {
        &["jpg", "jpeg", "png", "gif", "webp"]
    }

    /// 获取支持的视频格式列表
    pub fn supported_video_formats() -> &'static [&'static str] {
        &["mp4", "mov", "avi", "mkv", "webm"]
    }

    pub fn is_allowed_mime(media_type: &str) -> bool {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        ALLOWED_MIME_TYPES.contains(&essence.as_str())
    }

    /// Reject the request when any file declares a type outside the allow-list.
    /// Files without a declared type are left to extension dispatch.
    pub fn ensure_declared_types(files: &[SourceFile]) -> Result<()> {
        for file in files {
            if let Some(media_type) = &file.media_type {
                if !Self::is_allowed_mime(media_type) {
                    return Err(WatermarkError::UnsupportedMediaType(format!(
                        "{} ({media_type})",
                        file.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// 创建输出目录（如果不存在）
    pub fn ensure_output_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}
