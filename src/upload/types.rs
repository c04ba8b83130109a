use chrono::{DateTime, Utc};
use log::debug;
use std::fmt;

/// Destination collection for a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadTarget(String);

impl UploadTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A picked file. Identity is its queue position, so names may repeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub name: String,
    pub content: Vec<u8>,
}

impl FileDescriptor {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadResult {
    Success,
    /// The server answered `success: false`.
    ApplicationFailure(String),
    /// The request did not produce a decodable 2xx answer.
    TransportFailure(String),
}

impl UploadResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Progress of one batch. Counters only grow and never exceed `total`.
#[derive(Debug, Clone)]
pub struct UploadBatch {
    target: UploadTarget,
    total: usize,
    results: Vec<UploadResult>,
    success_count: usize,
    failure_count: usize,
    started_at: DateTime<Utc>,
}

impl UploadBatch {
    pub fn new(target: UploadTarget, files: &[FileDescriptor]) -> Self {
        Self {
            target,
            total: files.len(),
            results: Vec::with_capacity(files.len()),
            success_count: 0,
            failure_count: 0,
            started_at: Utc::now(),
        }
    }

    pub fn target(&self) -> &UploadTarget {
        &self.target
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn success_count(&self) -> usize {
        self.success_count
    }

    pub fn failure_count(&self) -> usize {
        self.failure_count
    }

    pub fn resolved(&self) -> usize {
        self.success_count + self.failure_count
    }

    pub fn is_complete(&self) -> bool {
        self.resolved() == self.total()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Results in submission order.
    pub fn results(&self) -> &[UploadResult] {
        &self.results
    }

    /// Record the outcome of the next pending file. Outcomes past `total` are dropped.
    pub(crate) fn record(&mut self, result: UploadResult) -> bool {
        if self.is_complete() {
            debug!("[Upload] batch already complete, dropping {:?}", result);
            return false;
        }
        if result.is_success() {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.results.push(result);
        true
    }

    /// `success/total`, the label shown next to the spinner.
    pub fn counter_label(&self) -> String {
        format!("{}/{}", self.success_count, self.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(n: usize) -> Vec<FileDescriptor> {
        (0..n).map(|_| FileDescriptor::new("same.docx", vec![1u8])).collect()
    }

    #[test]
    fn counters_track_outcomes_in_order() {
        let mut batch = UploadBatch::new(UploadTarget::new("finance"), &files(3));
        assert_eq!(batch.counter_label(), "0/3");

        batch.record(UploadResult::Success);
        batch.record(UploadResult::ApplicationFailure("rejected".into()));
        assert_eq!(batch.resolved(), 2);
        assert_eq!(batch.counter_label(), "1/3");

        batch.record(UploadResult::TransportFailure("reset".into()));
        assert!(batch.is_complete());
        assert_eq!(batch.success_count(), 1);
        assert_eq!(batch.failure_count(), 2);
        assert_eq!(batch.resolved(), batch.total());
    }

    #[test]
    fn duplicate_names_are_distinct_positions() {
        let batch = UploadBatch::new(UploadTarget::new("t"), &files(2));
        assert_eq!(batch.total(), 2);
        assert_eq!(batch.counter_label(), "0/2");
    }

    #[test]
    fn outcomes_past_total_are_dropped() {
        let mut batch = UploadBatch::new(UploadTarget::new("t"), &files(1));
        assert!(batch.record(UploadResult::Success));
        assert!(!batch.record(UploadResult::TransportFailure("late".into())));

        assert_eq!(batch.success_count(), 1);
        assert_eq!(batch.failure_count(), 0);
        assert_eq!(batch.results(), &[UploadResult::Success]);
        assert_eq!(batch.counter_label(), "1/1");
    }
}
