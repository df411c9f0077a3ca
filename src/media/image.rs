use crate::error::{Result, WatermarkError};
use crate::watermark::{geometry, CompositeJob, Compositor, WatermarkOptions};
use image::imageops::{self, FilterType};
use image::{ColorType, DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// 图片水印处理器
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageWatermarker;

impl ImageWatermarker {
    pub fn new() -> Self {
        Self
    }

    /// Watermark an encoded image. The output uses the container format and
    /// colour layout of the input.
    pub fn watermark_bytes(
        content: &[u8],
        file_name: &str,
        watermark: &DynamicImage,
        options: &WatermarkOptions,
    ) -> Result<Vec<u8>> {
        let format = Self::detect_format(content, file_name)?;
        let source = image::load_from_memory_with_format(content, format)?;
        let (width, height) = (source.width(), source.height());

        let overlay = Self::prepare_overlay(watermark, options.target_width(width), options);
        let offset = geometry::resolve_offset(
            width,
            height,
            overlay.width(),
            overlay.height(),
            options.position,
        );
        debug!(
            file = file_name,
            width,
            height,
            top = offset.top,
            left = offset.left,
            "compositing image"
        );

        // 越界部分由 overlay 自动裁剪
        let mut canvas = source.to_rgba8();
        imageops::overlay(&mut canvas, &overlay, offset.left, offset.top);

        let composed = Self::restore_layout(canvas, source.color());
        let mut output = Cursor::new(Vec::new());
        composed.write_to(&mut output, format)?;
        Ok(output.into_inner())
    }

    /// Scale the watermark to `target_width` (keeping its aspect ratio) and
    /// apply the batch opacity.
    pub fn prepare_overlay(
        watermark: &DynamicImage,
        target_width: u32,
        options: &WatermarkOptions,
    ) -> RgbaImage {
        let target_height = ((watermark.height() as f64 * target_width as f64
            / watermark.width().max(1) as f64)
            .round() as u32)
            .max(1);
        let mut overlay = watermark
            .resize_exact(target_width, target_height, FilterType::Lanczos3)
            .to_rgba8();
        Self::apply_opacity(&mut overlay, options.alpha_mask());
        overlay
    }

    /// Destination-in against a uniform mask: every alpha value is scaled by
    /// `mask / 255`, whatever alpha the watermark already carries.
    pub fn apply_opacity(overlay: &mut RgbaImage, mask: u8) {
        let mask = mask as u32;
        for pixel in overlay.pixels_mut() {
            let alpha = pixel[3] as u32;
            pixel[3] = ((alpha * mask + 127) / 255) as u8;
        }
    }

    fn detect_format(content: &[u8], file_name: &str) -> Result<ImageFormat> {
        image::guess_format(content).or_else(|err| {
            std::path::Path::new(file_name)
                .extension()
                .and_then(ImageFormat::from_extension)
                .ok_or(WatermarkError::Decode(err))
        })
    }

    /// 恢复原始像素格式，避免编码器不支持 RGBA（例如 JPEG）
    fn restore_layout(canvas: RgbaImage, color: ColorType) -> DynamicImage {
        let canvas = DynamicImage::ImageRgba8(canvas);
        match color {
            ColorType::L8 => DynamicImage::ImageLuma8(canvas.to_luma8()),
            ColorType::La8 => DynamicImage::ImageLumaA8(canvas.to_luma_alpha8()),
            ColorType::Rgb8 => DynamicImage::ImageRgb8(canvas.to_rgb8()),
            ColorType::L16 => DynamicImage::ImageLuma16(canvas.to_luma16()),
            ColorType::La16 => DynamicImage::ImageLumaA16(canvas.to_luma_alpha16()),
            ColorType::Rgb16 => DynamicImage::ImageRgb16(canvas.to_rgb16()),
            ColorType::Rgba16 => DynamicImage::ImageRgba16(canvas.to_rgba16()),
            _ => canvas,
        }
    }
}

impl Compositor for ImageWatermarker {
    fn apply(&self, job: &CompositeJob<'_>) -> Result<Vec<u8>> {
        Self::watermark_bytes(
            job.content,
            job.file_name,
            job.watermark.image(),
            job.options,
        )
    }

    fn name(&self) -> &'static str {
        "image"
    }
}
