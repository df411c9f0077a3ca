use super::{Watermark, WatermarkOptions};
use crate::error::Result;

/// Everything a compositor needs to watermark one file.
#[derive(Debug, Clone, Copy)]
pub struct CompositeJob<'a> {
    /// Batch the file belongs to; used to namespace scratch files.
    pub batch_id: &'a str,
    pub file_name: &'a str,
    pub content: &'a [u8],
    pub watermark: &'a Watermark,
    pub options: &'a WatermarkOptions,
}

impl CompositeJob<'_> {
    /// Lower-cased extension of the file name, without the dot.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }
}

/// 水印合成器的通用接口
///
/// Implementations are blocking and are driven from the blocking thread pool.
pub trait Compositor: Send + Sync {
    /// Overlay the watermark and return the encoded result, in the same
    /// container format as the input.
    fn apply(&self, job: &CompositeJob<'_>) -> Result<Vec<u8>>;

    /// 获取合成器名称
    fn name(&self) -> &'static str;
}
