#![allow(dead_code)]

use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage, Rgba, RgbaImage};
use seal::batch::{BatchId, BatchIdGenerator};
use seal::config::ServiceConfig;
use seal::error::Result;
use seal::media::{MediaToolchain, ToolOutput, TranscodeJob};
use seal::service::WatermarkService;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Ids `batch-1`, `batch-2`, ...
pub struct SequentialIds(AtomicUsize);

impl SequentialIds {
    pub fn boxed() -> Box<dyn BatchIdGenerator> {
        Box::new(Self(AtomicUsize::new(1)))
    }
}

impl BatchIdGenerator for SequentialIds {
    fn next_id(&self) -> BatchId {
        BatchId::new(format!("batch-{}", self.0.fetch_add(1, Ordering::SeqCst)))
    }
}

/// Stand-in for ffprobe/ffmpeg. Sources whose content starts with
/// `NOSTREAM` probe as `{"streams": []}`, `BROKEN` fails the transcode;
/// everything else is "transcoded" by prefixing `watermarked:`.
pub struct FakeToolchain {
    pub probes: AtomicUsize,
    pub transcodes: AtomicUsize,
}

impl FakeToolchain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            probes: AtomicUsize::new(0),
            transcodes: AtomicUsize::new(0),
        })
    }
}

impl MediaToolchain for FakeToolchain {
    fn probe(&self, input: &Path) -> Result<ToolOutput> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let content = std::fs::read(input)?;
        let stdout = if content.starts_with(b"NOSTREAM") {
            r#"{"streams": []}"#
        } else {
            r#"{"programs": [], "streams": [{"width": 640, "height": 360}]}"#
        };
        Ok(ToolOutput {
            exit_code: Some(0),
            stdout: stdout.as_bytes().to_vec(),
            stderr: String::new(),
        })
    }

    fn transcode(&self, job: &TranscodeJob<'_>) -> Result<ToolOutput> {
        self.transcodes.fetch_add(1, Ordering::SeqCst);
        let content = std::fs::read(job.input)?;
        if content.starts_with(b"BROKEN") {
            return Ok(ToolOutput {
                exit_code: Some(1),
                ..ToolOutput::default()
            });
        }
        let mut output = b"watermarked:".to_vec();
        output.extend(content);
        std::fs::write(job.output, output)?;
        Ok(ToolOutput {
            exit_code: Some(0),
            ..ToolOutput::default()
        })
    }
}

pub fn service(work_dir: &Path, max_parallel_files: usize) -> (WatermarkService, Arc<FakeToolchain>) {
    let toolchain = FakeToolchain::new();
    let config = ServiceConfig {
        work_dir: work_dir.to_path_buf(),
        max_parallel_files,
        ..ServiceConfig::default()
    };
    let service = WatermarkService::with_parts(config, toolchain.clone(), SequentialIds::boxed())
        .expect("valid config");
    (service, toolchain)
}

pub fn encode(image: DynamicImage, format: ImageOutputFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).expect("encode fixture");
    out.into_inner()
}

pub fn watermark_png() -> Vec<u8> {
    encode(
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(100, 100, Rgba([255, 255, 255, 200]))),
        ImageOutputFormat::Png,
    )
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    encode(
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 251) as u8, (y % 251) as u8, 90])
        })),
        ImageOutputFormat::Png,
    )
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    encode(
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([30, 60, 90]))),
        ImageOutputFormat::Jpeg(85),
    )
}

/// Archive entries by name.
pub fn unzip(bytes: &[u8]) -> BTreeMap<String, Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
    let mut entries = BTreeMap::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).expect("entry");
        let mut content = Vec::new();
        entry.read_to_end(&mut content).expect("entry content");
        entries.insert(entry.name().to_string(), content);
    }
    entries
}
