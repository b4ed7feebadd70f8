//! Terminal output for the CLI: progress bar and run summaries.

use crate::pipeline::progress::{ProgressEvent, ProgressSink, ProgressStatus};
use crate::pipeline::RunSummary;
use crate::text::Chunk;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use owo_colors::OwoColorize;
use std::time::Duration;

const BAR_TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta}) {msg}";

/// Progress sink that drives an indicatif bar on stderr.
pub struct ConsoleSink {
    bar: ProgressBar,
    retries: usize,
    failures: usize,
}

impl ConsoleSink {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
        match ProgressStyle::default_bar().template(BAR_TEMPLATE) {
            Ok(style) => bar.set_style(style.progress_chars("#>-")),
            Err(e) => tracing::debug!("progress bar template rejected: {e}"),
        }
        Self {
            bar,
            retries: 0,
            failures: 0,
        }
    }

    fn status_message(&self) -> String {
        match (self.retries, self.failures) {
            (0, 0) => String::new(),
            (r, 0) => format!("{r} retries"),
            (r, f) => format!("{r} retries, {f} failed"),
        }
    }
}

impl ProgressSink for ConsoleSink {
    fn handle(&mut self, event: &ProgressEvent) {
        match event.status {
            ProgressStatus::Started => {}
            ProgressStatus::Retrying => self.retries += 1,
            ProgressStatus::Failed => {
                self.failures += 1;
                self.bar
                    .println(format!("  chunk {} failed after {} attempts", event.chunk_index, event.attempt));
            }
            ProgressStatus::Completed => {}
        }
        if event.is_terminal() {
            self.bar.set_position(event.completed as u64);
        }
        self.bar.set_message(self.status_message());
    }

    fn finish(&mut self) {
        self.bar.finish_and_clear();
    }
}

/// Render indices as `0, 3, 7`, eliding the middle of long lists.
pub fn format_indices(indices: &[usize]) -> String {
    const SHOWN: usize = 10;
    if indices.len() <= SHOWN {
        return indices
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(", ");
    }
    let head = indices[..SHOWN]
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("{head} and {} more", indices.len() - SHOWN)
}

/// Render a duration as `1m 05.3s` or `4.2s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs >= 60.0 {
        let minutes = (secs / 60.0).floor();
        format!("{}m {:04.1}s", minutes as u64, secs - minutes * 60.0)
    } else {
        format!("{secs:.1}s")
    }
}

/// Print the summary of a completed `speak` run.
pub fn print_summary(summary: &RunSummary) {
    println!(
        "{} {}",
        "Wrote".green(),
        summary.output.display().to_string().bold()
    );
    println!(
        "  {}     {}",
        "Audio:".dimmed(),
        format_duration(summary.audio_duration)
    );
    println!(
        "  {}    {}/{} synthesized ({} requests)",
        "Chunks:".dimmed(),
        summary.succeeded,
        summary.chunk_count,
        summary.attempts
    );
    println!(
        "  {}   {}",
        "Elapsed:".dimmed(),
        format_duration(summary.elapsed)
    );
    if !summary.omitted.is_empty() {
        println!(
            "  {}   {}",
            "Omitted:".dimmed(),
            format_indices(&summary.omitted).yellow()
        );
    }
}

/// Print a cancelled run's state.
pub fn print_cancelled(submitted: usize, collected: usize) {
    eprintln!(
        "{} {submitted} chunks submitted, {collected} finished; no output written",
        "Cancelled:".yellow()
    );
}

/// Print chunks for `split`.
pub fn print_chunks(chunks: &[Chunk]) {
    for chunk in chunks {
        println!(
            "{} {}",
            format!("[{:>4}] ({:>3})", chunk.index, chunk.char_len()).dimmed(),
            chunk.text
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_indices_short() {
        assert_eq!(format_indices(&[]), "");
        assert_eq!(format_indices(&[3]), "3");
        assert_eq!(format_indices(&[1, 4, 9]), "1, 4, 9");
    }

    #[test]
    fn test_format_indices_long() {
        let indices: Vec<usize> = (0..25).collect();
        assert_eq!(
            format_indices(&indices),
            "0, 1, 2, 3, 4, 5, 6, 7, 8, 9 and 15 more"
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(4200)), "4.2s");
        assert_eq!(format_duration(Duration::from_millis(65_300)), "1m 05.3s");
        assert_eq!(format_duration(Duration::ZERO), "0.0s");
    }

    #[test]
    fn test_console_sink_tracks_counts() {
        let mut sink = ConsoleSink::new(3);
        sink.bar.set_draw_target(ProgressDrawTarget::hidden());

        sink.handle(&ProgressEvent::new(0, ProgressStatus::Started, 1, 0, 3));
        sink.handle(&ProgressEvent::new(0, ProgressStatus::Retrying, 2, 0, 3));
        sink.handle(&ProgressEvent::new(0, ProgressStatus::Failed, 2, 1, 3));
        sink.handle(&ProgressEvent::new(1, ProgressStatus::Completed, 1, 2, 3));

        assert_eq!(sink.retries, 1);
        assert_eq!(sink.failures, 1);
        assert_eq!(sink.bar.position(), 2);
        assert_eq!(sink.status_message(), "1 retries, 1 failed");
        sink.finish();
    }
}
