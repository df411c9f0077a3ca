//! The narrow interface the request layer talks to.

use crate::batch::{
    ArchiveOutput, ArchiveTarget, BatchId, BatchIdGenerator, BatchOrchestrator, BatchStatus,
    StatusLookup, StatusStore, UuidBatchIds,
};
use crate::config::ServiceConfig;
use crate::error::{Result, WatermarkError};
use crate::media::{FfmpegToolchain, MediaToolchain, MediaUtils, SourceFile, VideoWatermarker};
use crate::watermark::{Watermark, WatermarkOptions};
use std::io::ErrorKind;
use std::sync::Arc;
use tracing::{error, info, warn};

/// An archive built in memory, with the final status of its batch.
#[derive(Debug, Clone)]
pub struct BatchArchive {
    pub bytes: Vec<u8>,
    pub status: BatchStatus,
}

/// Long-lived service owning the status store and the orchestrator.
pub struct WatermarkService {
    config: ServiceConfig,
    store: Arc<StatusStore>,
    orchestrator: Arc<BatchOrchestrator>,
}

impl WatermarkService {
    /// Service backed by ffmpeg/ffprobe and random batch ids.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let toolchain = FfmpegToolchain::new(config.ffmpeg_path.clone(), config.ffprobe_path.clone());
        Self::with_parts(config, Arc::new(toolchain), Box::new(UuidBatchIds))
    }

    pub fn with_parts(
        config: ServiceConfig,
        toolchain: Arc<dyn MediaToolchain>,
        ids: Box<dyn BatchIdGenerator>,
    ) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(StatusStore::new(ids));
        let video = VideoWatermarker::new(toolchain, config.scratch_dir());
        let orchestrator = Arc::new(BatchOrchestrator::new(
            video,
            Arc::clone(&store),
            config.max_parallel_files,
        ));

        Ok(Self {
            config,
            store,
            orchestrator,
        })
    }

    async fn prepare(watermark: Vec<u8>, files: &[SourceFile]) -> Result<Arc<Watermark>> {
        MediaUtils::ensure_declared_types(files)?;
        let watermark = tokio::task::spawn_blocking(move || Watermark::decode(watermark))
            .await
            .map_err(|e| WatermarkError::Task(e.to_string()))??;
        Ok(Arc::new(watermark))
    }

    /// Register a batch and process it in the background; poll
    /// [`get_status`](Self::get_status) for progress.
    ///
    /// Rejected up front when the watermark cannot be decoded or a declared
    /// media type is not allowed.
    pub async fn start_batch(
        &self,
        watermark: Vec<u8>,
        files: Vec<SourceFile>,
        options: WatermarkOptions,
    ) -> Result<BatchId> {
        let watermark = Self::prepare(watermark, &files).await?;
        let batch_id = self.store.create(files.len());
        let target = match self.config.archive_path(&batch_id) {
            Ok(path) => ArchiveTarget::Path(path),
            Err(e) => {
                self.store.remove(&batch_id);
                return Err(e);
            }
        };

        let orchestrator = Arc::clone(&self.orchestrator);
        let store = Arc::clone(&self.store);
        let id = batch_id.clone();
        tokio::spawn(async move {
            let run_id = id.clone();
            let run = tokio::spawn(async move {
                orchestrator
                    .execute(&run_id, watermark, files, options, target)
                    .await
            });

            // 后台任务的失败必须写回状态，不能静默丢失
            let failure = match run.await {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(join_error) => Some(WatermarkError::Task(join_error.to_string()).to_string()),
            };
            if let Some(reason) = failure {
                error!(batch = %id, %reason, "batch failed");
                store.mark_failed(&id, reason);
            }
        });

        info!(batch = %batch_id, "batch accepted");
        Ok(batch_id)
    }

    /// Process a batch and return the archive bytes once everything is done.
    pub async fn process_batch(
        &self,
        watermark: Vec<u8>,
        files: Vec<SourceFile>,
        options: WatermarkOptions,
    ) -> Result<BatchArchive> {
        let watermark = Self::prepare(watermark, &files).await?;
        let batch_id = self.store.create(files.len());

        let output = self
            .orchestrator
            .execute(&batch_id, watermark, files, options, ArchiveTarget::Memory)
            .await;
        let status = self.store.remove(&batch_id).unwrap_or_default();

        match output? {
            ArchiveOutput::Memory(bytes) => Ok(BatchArchive { bytes, status }),
            ArchiveOutput::Path(path) => Ok(BatchArchive {
                bytes: tokio::fs::read(path).await?,
                status,
            }),
        }
    }

    pub fn get_status(&self, batch_id: &BatchId) -> StatusLookup {
        self.store.lookup(batch_id)
    }

    /// Bytes of a finished disk-backed batch. Ids this service did not issue,
    /// or has already cleaned up, are `NotFound` without touching the disk.
    pub async fn fetch_archive(&self, batch_id: &BatchId) -> Result<Vec<u8>> {
        if !self.store.contains(batch_id) {
            return Err(WatermarkError::NotFound(batch_id.to_string()));
        }
        match tokio::fs::read(self.config.archive_path(batch_id)?).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(WatermarkError::NotFound(batch_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Forget a batch: delete its archive and status entry. Never fails;
    /// problems are logged. Unknown ids leave the disk alone.
    pub async fn cleanup(&self, batch_id: &BatchId) {
        if self.store.remove(batch_id).is_none() {
            warn!(batch = %batch_id, "cleanup of unknown batch");
            return;
        }
        let path = match self.config.archive_path(batch_id) {
            Ok(path) => path,
            Err(e) => {
                warn!(batch = %batch_id, error = %e, "cleanup error");
                return;
            }
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(batch = %batch_id, path = %path.display(), error = %e, "cleanup error"),
        }
    }
}
