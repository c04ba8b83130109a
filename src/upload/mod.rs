pub mod orchestrator;
pub mod status;
pub mod transport;
pub mod types;

pub use orchestrator::{BatchError, Orchestrator};
pub use status::{StatusIndicator, StatusState, StatusView};
pub use types::{FileDescriptor, UploadBatch, UploadResult, UploadTarget};
