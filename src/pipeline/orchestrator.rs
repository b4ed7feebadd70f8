//! End-to-end run: text → chunks → dispatch → assembly → WAV.

use crate::defaults;
use crate::error::{ReadaloudError, Result};
use crate::pipeline::assembler::{AssemblyConfig, AudioStream, assemble};
use crate::pipeline::dispatcher::{CancelFlag, DispatchConfig, Dispatcher};
use crate::pipeline::progress::{ProgressReporter, ProgressSink};
use crate::pipeline::types::DispatchReport;
use crate::synth::Synthesizer;
use crate::text;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Upper bound on characters per chunk.
    pub max_chunk_chars: usize,
    pub dispatch: DispatchConfig,
    pub assembly: AssemblyConfig,
    /// Capacity of the progress event channel.
    pub progress_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: defaults::MAX_CHUNK_CHARS,
            dispatch: DispatchConfig::default(),
            assembly: AssemblyConfig::default(),
            progress_buffer: defaults::PROGRESS_BUFFER,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_chars == 0 {
            return Err(ReadaloudError::invalid_config(
                "max_chunk_chars",
                "must be at least 1",
            ));
        }
        self.dispatch.validate()
    }
}

/// How a run ended when it did not fail outright.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome<T> {
    Completed(T),
    /// The cancel flag was raised; nothing was assembled or written.
    Cancelled { submitted: usize, collected: usize },
}

impl<T> RunOutcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The completed value, or `None` if the run was cancelled.
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Cancelled { .. } => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RunOutcome<U> {
        match self {
            Self::Completed(value) => RunOutcome::Completed(f(value)),
            Self::Cancelled {
                submitted,
                collected,
            } => RunOutcome::Cancelled {
                submitted,
                collected,
            },
        }
    }
}

/// What a completed file run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub output: PathBuf,
    pub chunk_count: usize,
    pub succeeded: usize,
    /// Failed chunks skipped under best-effort assembly.
    pub omitted: Vec<usize>,
    /// Synthesis calls made, retries included.
    pub attempts: u32,
    pub audio_duration: Duration,
    pub elapsed: Duration,
    pub dropped_events: u64,
}

/// Assembled output plus the run data needed for a summary.
struct Assembled {
    report: DispatchReport,
    stream: AudioStream,
    dropped_events: u64,
}

/// Read-aloud pipeline over one synthesizer.
pub struct Pipeline {
    config: PipelineConfig,
    synth: Arc<dyn Synthesizer>,
    sink: Option<Box<dyn ProgressSink>>,
    cancel: CancelFlag,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, synth: Arc<dyn Synthesizer>) -> Self {
        Self {
            config,
            synth,
            sink: None,
            cancel: CancelFlag::new(),
        }
    }

    /// Send progress events to `sink` on a reporter thread.
    pub fn with_progress_sink(mut self, sink: Box<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Use an externally owned cancel flag (e.g. raised by Ctrl-C).
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that cancels this pipeline's run.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Synthesize `text` into an in-memory stream.
    pub async fn synthesize(self, text: &str) -> Result<RunOutcome<AudioStream>> {
        Ok(self.execute(text).await?.map(|run| run.stream))
    }

    /// Synthesize `text` and write the result to `output`.
    ///
    /// Nothing is written when the run is cancelled or assembly fails.
    pub async fn run_to_file(self, text: &str, output: &Path) -> Result<RunOutcome<RunSummary>> {
        let started = Instant::now();
        let run = match self.execute(text).await? {
            RunOutcome::Completed(run) => run,
            RunOutcome::Cancelled {
                submitted,
                collected,
            } => {
                return Ok(RunOutcome::Cancelled {
                    submitted,
                    collected,
                });
            }
        };

        run.stream.write_wav(output)?;

        let summary = RunSummary {
            output: output.to_path_buf(),
            chunk_count: run.report.chunk_count,
            succeeded: run.report.succeeded(),
            omitted: run.stream.omitted.clone(),
            attempts: run.report.total_attempts(),
            audio_duration: run.stream.duration(),
            elapsed: started.elapsed(),
            dropped_events: run.dropped_events,
        };
        info!(
            "wrote {} ({:.1}s of audio from {} chunks) in {:.1}s",
            summary.output.display(),
            summary.audio_duration.as_secs_f64(),
            summary.chunk_count,
            summary.elapsed.as_secs_f64()
        );
        Ok(RunOutcome::Completed(summary))
    }

    async fn execute(mut self, text: &str) -> Result<RunOutcome<Assembled>> {
        self.config.validate()?;

        let chunks = text::split(text, self.config.max_chunk_chars)?;
        let chunk_count = chunks.len();
        info!(
            "split {} characters into {chunk_count} chunks (max {})",
            text.chars().count(),
            self.config.max_chunk_chars
        );

        let reporter = match self.sink.take() {
            Some(sink) => Some(ProgressReporter::spawn(sink, self.config.progress_buffer)?),
            None => None,
        };

        let mut dispatcher = Dispatcher::new(self.synth.clone(), self.config.dispatch.clone())?;
        if let Some(reporter) = &reporter {
            dispatcher = dispatcher.with_progress(reporter.emitter());
        }
        let report = dispatcher.run(chunks, &self.cancel).await;
        drop(dispatcher);

        let dropped_events = match reporter {
            Some(reporter) => tokio::task::spawn_blocking(move || reporter.finish())
                .await
                .map_err(|e| ReadaloudError::Other(format!("Progress reporter failed: {e}")))?,
            None => 0,
        };
        if dropped_events > 0 {
            debug!("{dropped_events} progress events dropped");
        }

        if report.is_cancelled() {
            warn!(
                "run cancelled: {} of {chunk_count} chunks submitted, {} results collected",
                report.submitted,
                report.results.len()
            );
            return Ok(RunOutcome::Cancelled {
                submitted: report.submitted,
                collected: report.results.len(),
            });
        }

        let stream = assemble(chunk_count, &report.results, &self.config.assembly)?;
        if !stream.omitted.is_empty() {
            warn!("omitted failed chunks {:?}", stream.omitted);
        }

        Ok(RunOutcome::Completed(Assembled {
            report,
            stream,
            dropped_events,
        }))
    }
}
