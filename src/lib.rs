pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod media;
pub mod service;
pub mod watermark;

/// 便于使用的预导入模块
pub mod prelude {
    pub use crate::batch::{
        ArchivePackager, BatchId, BatchOrchestrator, BatchStatus, FileError, StatusLookup,
        StatusStore,
    };
    pub use crate::cli::{Cli, Commands};
    pub use crate::config::ServiceConfig;
    pub use crate::error::{Result, WatermarkError};
    pub use crate::logging::{init_logging, LogFormat, LoggingConfig};
    pub use crate::media::{
        FfmpegToolchain, ImageWatermarker, MediaToolchain, MediaType, MediaUtils, ProcessedFile,
        SourceFile, VideoWatermarker,
    };
    pub use crate::service::{BatchArchive, WatermarkService};
    pub use crate::watermark::{Anchor, Compositor, RawOptions, Watermark, WatermarkOptions};
}
