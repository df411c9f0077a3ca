//! Batch orchestration: dispatch each file to a compositor, keep going past
//! per-file failures, then package whatever succeeded.

pub mod archive;
pub mod status;

pub use archive::{ArchiveOutput, ArchivePackager, ArchiveTarget};
pub use status::{
    BatchId, BatchIdGenerator, BatchStatus, FileError, StatusLookup, StatusStore, UuidBatchIds,
};

use crate::error::{Result, WatermarkError};
use crate::media::{ImageWatermarker, MediaType, MediaUtils, ProcessedFile, SourceFile, VideoWatermarker};
use crate::watermark::{CompositeJob, Compositor, Watermark, WatermarkOptions};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Result of one file of a batch.
#[derive(Debug)]
pub struct FileOutcome {
    pub name: String,
    pub result: Result<ProcessedFile>,
}

struct Compositors {
    image: ImageWatermarker,
    video: VideoWatermarker,
}

impl Compositors {
    fn for_file(&self, name: &str) -> Result<&dyn Compositor> {
        let compositor: &dyn Compositor = match MediaUtils::detect_media_type(name)? {
            MediaType::Image => &self.image,
            MediaType::Video => &self.video,
        };
        Ok(compositor)
    }

    fn process(
        &self,
        batch_id: &BatchId,
        file: &SourceFile,
        watermark: &Watermark,
        options: &WatermarkOptions,
    ) -> Result<ProcessedFile> {
        let compositor = self.for_file(&file.name)?;
        debug!(batch = %batch_id, file = %file.name, compositor = compositor.name(), "processing file");

        let content = compositor.apply(&CompositeJob {
            batch_id: batch_id.as_str(),
            file_name: &file.name,
            content: &file.content,
            watermark,
            options,
        })?;

        Ok(ProcessedFile {
            name: file.name.clone(),
            content,
        })
    }
}

pub struct BatchOrchestrator {
    compositors: Arc<Compositors>,
    store: Arc<StatusStore>,
    max_parallel_files: usize,
}

impl BatchOrchestrator {
    pub fn new(video: VideoWatermarker, store: Arc<StatusStore>, max_parallel_files: usize) -> Self {
        Self {
            compositors: Arc::new(Compositors {
                image: ImageWatermarker::new(),
                video,
            }),
            store,
            max_parallel_files: max_parallel_files.max(1),
        }
    }

    /// Watermark every file, recording each outcome in the batch status as it
    /// resolves. Outcomes come back in input order.
    pub async fn process_files(
        &self,
        batch_id: &BatchId,
        watermark: Arc<Watermark>,
        files: Vec<SourceFile>,
        options: WatermarkOptions,
    ) -> Vec<FileOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel_files));
        let mut pending = Vec::with_capacity(files.len());

        for file in files {
            // the semaphore is never closed, so this only waits for a free slot
            let permit = Arc::clone(&semaphore).acquire_owned().await.ok();
            let compositors = Arc::clone(&self.compositors);
            let store = Arc::clone(&self.store);
            let watermark = Arc::clone(&watermark);
            let id = batch_id.clone();
            let name = file.name.clone();

            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let result = compositors.process(&id, &file, &watermark, &options);
                match &result {
                    Ok(_) => store.record_success(&id),
                    Err(e) => {
                        warn!(batch = %id, file = %file.name, error = %e, "file failed");
                        store.record_failure(&id, &file.name, &e.to_string());
                    }
                }
                result
            });
            pending.push((name, handle));
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        for (name, handle) in pending {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    let err = WatermarkError::Task(join_error.to_string());
                    self.store.record_failure(batch_id, &name, &err.to_string());
                    Err(err)
                }
            };
            outcomes.push(FileOutcome { name, result });
        }
        outcomes
    }

    /// Run a registered batch to completion and package the results.
    ///
    /// Only batch-wide problems (the archive cannot be written) are returned
    /// as errors; per-file failures end up in the status instead.
    pub async fn execute(
        &self,
        batch_id: &BatchId,
        watermark: Arc<Watermark>,
        files: Vec<SourceFile>,
        options: WatermarkOptions,
        target: ArchiveTarget,
    ) -> Result<ArchiveOutput> {
        info!(
            batch = %batch_id,
            total = files.len(),
            position = %options.position,
            opacity = options.opacity,
            scale = options.scale,
            "batch started"
        );

        let outcomes = self.process_files(batch_id, watermark, files, options).await;
        let (archived, failed) = collect_successes(outcomes);
        let archived_count = archived.len();

        let output = tokio::task::spawn_blocking(move || ArchivePackager::package(&archived, target))
            .await
            .map_err(|e| WatermarkError::Task(e.to_string()))??;

        self.store.mark_completed(batch_id);
        info!(batch = %batch_id, archived = archived_count, failed, "batch completed");
        Ok(output)
    }
}

/// Keep the successful files, later duplicates of an archive name replacing
/// earlier ones. Returns the files and the number of failures.
fn collect_successes(outcomes: Vec<FileOutcome>) -> (Vec<ProcessedFile>, usize) {
    let mut files: Vec<ProcessedFile> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut failed = 0;

    for outcome in outcomes {
        match outcome.result {
            Ok(file) => {
                let entry = ArchivePackager::entry_name(&file.name);
                match positions.get(&entry) {
                    Some(&index) => {
                        warn!(file = %file.name, "duplicate file name, keeping the later file");
                        files[index] = file;
                    }
                    None => {
                        positions.insert(entry, files.len());
                        files.push(file);
                    }
                }
            }
            Err(_) => failed += 1,
        }
    }

    (files, failed)
}
