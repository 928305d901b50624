//! External collaborators at the edge of the engine: device inventory,
//! Discard Set persistence, transcripts and the failure report.

mod discard;
mod inventory;
mod report;
mod transcript;

pub use discard::DiscardSet;
pub use inventory::{ALL_TIERS, Device, Inventory, TierSelection};
pub use report::{FailureRecord, JsonReportWriter, ReportSink, report_timestamp};
pub use transcript::{FileTranscript, MemoryTranscript, TranscriptSink};
