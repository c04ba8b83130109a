use super::status::{IndicatorBusy, StatusIndicator};
use super::transport::{UploadForm, UploadTransport};
use super::types::{FileDescriptor, UploadBatch, UploadResult, UploadTarget};
use crate::config::Timings;
use crate::session::SessionResolver;
use chrono::Utc;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("no files selected")]
    NoFiles,
    #[error(transparent)]
    Busy(#[from] IndicatorBusy),
}

/// Uploads picked files one at a time and drives the status indicator.
pub struct Orchestrator {
    transport: Arc<dyn UploadTransport>,
    session: SessionResolver,
    indicator: Arc<StatusIndicator>,
    pacing: Duration,
    result_display: Duration,
}

impl Orchestrator {
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        session: SessionResolver,
        indicator: Arc<StatusIndicator>,
        timings: &Timings,
    ) -> Self {
        Self {
            transport,
            session,
            indicator,
            pacing: timings.pacing(),
            result_display: timings.result_display(),
        }
    }

    pub fn indicator(&self) -> &Arc<StatusIndicator> {
        &self.indicator
    }

    /// Upload `files` into `target` strictly in order. Returns once the indicator is back to Idle.
    pub async fn run_batch(
        &self,
        files: Vec<FileDescriptor>,
        target: UploadTarget,
    ) -> Result<UploadBatch, BatchError> {
        if files.is_empty() {
            info!("[Upload] empty selection, nothing to upload");
            return Err(BatchError::NoFiles);
        }

        self.indicator.begin(Some(files.len())).await?;
        let mut batch = UploadBatch::new(target, &files);
        info!(
            "[Upload] batch of {} file(s) into '{}'",
            batch.total(),
            batch.target()
        );

        for file in files {
            let index = batch.resolved();
            let name = file.name.clone();
            let result = self.upload_one(file, batch.target()).await;
            log_result(index, batch.total(), &name, &result);

            batch.record(result);
            self.indicator.update_counter(batch.counter_label()).await;

            if !batch.is_complete() {
                tokio::time::sleep(self.pacing).await;
            }
        }

        let elapsed = Utc::now() - batch.started_at();
        info!(
            "[Upload] batch into '{}' done: {} ok, {} failed in {}ms",
            batch.target(),
            batch.success_count(),
            batch.failure_count(),
            elapsed.num_milliseconds()
        );

        self.settle(batch.failure_count() == 0).await;
        Ok(batch)
    }

    /// Upload only the first picked file, without a counter label.
    pub async fn upload_single(
        &self,
        files: Vec<FileDescriptor>,
        target: UploadTarget,
    ) -> Result<UploadResult, BatchError> {
        let file = files.into_iter().next().ok_or_else(|| {
            info!("[Upload] empty selection, nothing to upload");
            BatchError::NoFiles
        })?;

        self.indicator.begin(None).await?;
        let name = file.name.clone();
        let result = self.upload_one(file, &target).await;
        log_result(0, 1, &name, &result);

        self.settle(result.is_success()).await;
        Ok(result)
    }

    async fn upload_one(&self, file: FileDescriptor, target: &UploadTarget) -> UploadResult {
        let form = UploadForm {
            file,
            collection_name: target.clone(),
            session_id: self.session.current_session_id().await,
        };

        match self.transport.send(form).await {
            Ok(resp) if resp.success => UploadResult::Success,
            Ok(resp) => UploadResult::ApplicationFailure(resp.reason()),
            Err(e) => UploadResult::TransportFailure(e.to_string()),
        }
    }

    /// Show the terminal glyph for the display period, then go back to Idle.
    async fn settle(&self, success: bool) {
        self.indicator.finish(success).await;
        tokio::time::sleep(self.result_display).await;
        self.indicator.reset().await;
    }
}

fn log_result(index: usize, total: usize, name: &str, result: &UploadResult) {
    match result {
        UploadResult::Success => info!("[Upload] {}/{} '{}' uploaded", index + 1, total, name),
        UploadResult::ApplicationFailure(reason) => warn!(
            "[Upload] {}/{} '{}' rejected by server: {}",
            index + 1,
            total,
            name,
            reason
        ),
        UploadResult::TransportFailure(reason) => warn!(
            "[Upload] {}/{} '{}' failed in transport: {}",
            index + 1,
            total,
            name,
            reason
        ),
    }
}
