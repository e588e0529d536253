pub mod reports;
pub mod feedback;
pub mod blobs;

pub use reports::{JsonReportStore, MemoryReportStore, NewReport, ReportRecord, ReportStore, ReportType};
pub use feedback::{Feedback, FeedbackSink, JsonlFeedbackSink, MemoryFeedbackSink};
pub use blobs::{schedule_deletion, BlobStore, FsBlobStore, MemoryBlobStore};
