//! Read-aloud pipeline.
//!
//! Chunks are fanned out to a synthesizer by a bounded pool of tokio tasks,
//! fanned back in by index, and reassembled into one WAV stream. Progress
//! flows to a sink over a bounded, lossy channel and never gates the run.

pub mod assembler;
pub mod dispatcher;
pub mod orchestrator;
pub mod progress;
pub mod types;

pub use assembler::{AssemblyConfig, AudioStream, PartialFailurePolicy, Segment, assemble};
pub use dispatcher::{CancelFlag, DispatchConfig, Dispatcher, RetryPolicy};
pub use orchestrator::{Pipeline, PipelineConfig, RunOutcome, RunSummary};
pub use progress::{
    CollectorSink, LogSink, ProgressEmitter, ProgressEvent, ProgressReporter, ProgressSink,
    ProgressStatus,
};
pub use types::{ChunkOutcome, ChunkResult, DispatchReport, RunStatus};
