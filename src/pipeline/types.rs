//! Data types shared by the dispatcher and assembler.

use std::collections::BTreeMap;

/// Terminal outcome of one chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    /// Complete WAV payload returned by the backend.
    Success(Vec<u8>),
    /// Reason of the last failed attempt.
    Failure(String),
}

/// Result for a single chunk, written once by the task that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkResult {
    pub index: usize,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    pub outcome: ChunkOutcome,
}

impl ChunkResult {
    pub fn success(index: usize, attempts: u32, audio: Vec<u8>) -> Self {
        Self {
            index,
            attempts,
            outcome: ChunkOutcome::Success(audio),
        }
    }

    pub fn failure(index: usize, attempts: u32, reason: impl Into<String>) -> Self {
        Self {
            index,
            attempts,
            outcome: ChunkOutcome::Failure(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ChunkOutcome::Success(_))
    }

    /// Failure reason, if this chunk failed.
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            ChunkOutcome::Failure(reason) => Some(reason),
            ChunkOutcome::Success(_) => None,
        }
    }
}

/// How a dispatch run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every chunk was submitted and reached a terminal outcome.
    Finished,
    /// Cancellation was observed; results may be incomplete.
    Cancelled,
}

/// Everything a dispatch run produced.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub status: RunStatus,
    pub chunk_count: usize,
    /// Chunks handed to a worker task.
    pub submitted: usize,
    pub results: BTreeMap<usize, ChunkResult>,
}

impl DispatchReport {
    /// Indices that ended in failure, ascending.
    pub fn failed_indices(&self) -> Vec<usize> {
        self.results
            .values()
            .filter(|r| !r.is_success())
            .map(|r| r.index)
            .collect()
    }

    /// Indices in `[0, chunk_count)` with no result at all, ascending.
    pub fn missing_indices(&self) -> Vec<usize> {
        (0..self.chunk_count)
            .filter(|i| !self.results.contains_key(i))
            .collect()
    }

    /// Number of successful chunks.
    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|r| r.is_success()).count()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == RunStatus::Cancelled
    }

    /// Total attempts across every chunk.
    pub fn total_attempts(&self) -> u32 {
        self.results.values().map(|r| r.attempts).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: RunStatus, chunk_count: usize, results: Vec<ChunkResult>) -> DispatchReport {
        DispatchReport {
            status,
            chunk_count,
            submitted: results.len(),
            results: results.into_iter().map(|r| (r.index, r)).collect(),
        }
    }

    #[test]
    fn failure_reason_only_on_failure() {
        assert_eq!(ChunkResult::success(0, 1, vec![1]).failure_reason(), None);
        assert_eq!(
            ChunkResult::failure(0, 3, "timeout").failure_reason(),
            Some("timeout")
        );
    }

    #[test]
    fn report_classifies_indices() {
        let report = report(
            RunStatus::Cancelled,
            5,
            vec![
                ChunkResult::success(0, 1, vec![]),
                ChunkResult::failure(3, 3, "boom"),
                ChunkResult::success(1, 2, vec![]),
            ],
        );

        assert_eq!(report.failed_indices(), vec![3]);
        assert_eq!(report.missing_indices(), vec![2, 4]);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.total_attempts(), 6);
        assert!(report.is_cancelled());
    }

    #[test]
    fn empty_report_has_nothing_missing() {
        let report = report(RunStatus::Finished, 0, vec![]);
        assert!(report.missing_indices().is_empty());
        assert!(report.failed_indices().is_empty());
        assert_eq!(report.succeeded(), 0);
    }
}
