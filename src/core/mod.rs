pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod runner;

pub use models::{
    DestinationContainer, FetchUrl, JobHandle, JobState, Outcome, ReportEntry, RunReport,
    TransferItem, TransferJob,
};
pub use orchestrator::{PollPolicy, TransferOrchestrator};
pub use progress::ProgressTracker;
pub use runner::{RunSummary, Runner, transferable_keys};
