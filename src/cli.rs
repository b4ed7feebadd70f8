//! Command-line interface for readaloud
//!
//! Provides argument parsing using clap derive macros.

use crate::config::Config;
use crate::pipeline::PartialFailurePolicy;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Read long documents aloud through a remote TTS backend
#[derive(Parser, Debug)]
#[command(
    name = "readaloud",
    version,
    about = "Read long documents aloud through a remote TTS backend"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress progress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: info, -vv: debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a duration string.
///
/// Supports any duration format accepted by `humantime` (`500ms`, `30s`,
/// `1m30s`); bare numbers are seconds.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Parse a per-request timeout, which is configured in whole seconds.
fn parse_timeout(s: &str) -> Result<Duration, String> {
    let timeout = parse_duration(s)?;
    if timeout.is_zero() || timeout.subsec_nanos() != 0 {
        return Err(format!(
            "timeout must be a whole number of seconds, got {}",
            humantime::format_duration(timeout)
        ));
    }
    Ok(timeout)
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Synthesize a text file into one WAV file
    Speak(SpeakArgs),

    /// Show how a text would be chunked, without synthesizing
    Split {
        /// Text file to read ("-" for stdin)
        input: PathBuf,

        /// Maximum characters per chunk
        #[arg(long, value_name = "N")]
        max_chars: Option<usize>,

        /// Verify that the chunks rejoin to the normalized input
        #[arg(long)]
        check: bool,
    },

    /// Check that the synthesis backend is reachable
    Check {
        /// Backend base URL
        #[arg(long, value_name = "URL")]
        url: Option<String>,
    },

    /// View and create configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Arguments of `readaloud speak`. Flags override the config file.
#[derive(Args, Debug, Default)]
pub struct SpeakArgs {
    /// Text file to read ("-" for stdin)
    pub input: PathBuf,

    /// Output WAV file
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Backend base URL
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Maximum synthesis requests in flight
    #[arg(long, short = 'j', value_name = "N")]
    pub concurrency: Option<usize>,

    /// Maximum characters per chunk
    #[arg(long, value_name = "N")]
    pub max_chars: Option<usize>,

    /// Attempts per chunk, first try included
    #[arg(long, value_name = "N")]
    pub attempts: Option<u32>,

    /// Delay before the first retry (doubles afterwards). Examples: 500ms, 2s
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub backoff: Option<Duration>,

    /// Per-request timeout in whole seconds. Examples: 30s, 2m
    #[arg(long, value_name = "DURATION", value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Write whatever succeeded instead of failing on any chunk error
    #[arg(long)]
    pub best_effort: bool,

    /// Silence inserted for each failed chunk in best-effort mode
    #[arg(long, value_name = "MS")]
    pub silence_ms: Option<u32>,

    /// Voice identifier passed to the backend
    #[arg(long, value_name = "VOICE")]
    pub voice: Option<String>,

    /// Model identifier passed to the backend
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,
}

impl SpeakArgs {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.url {
            config.backend.url = url.clone();
        }
        if let Some(n) = self.concurrency {
            config.dispatch.concurrency_limit = n;
        }
        if let Some(n) = self.max_chars {
            config.chunker.max_chunk_chars = n;
        }
        if let Some(n) = self.attempts {
            config.dispatch.max_attempts = n;
        }
        if let Some(backoff) = self.backoff {
            config.dispatch.backoff_ms = backoff.as_millis() as u64;
        }
        if let Some(timeout) = self.timeout {
            config.backend.timeout_secs = timeout.as_secs();
        }
        if self.best_effort {
            config.assembly.partial_failure = PartialFailurePolicy::BestEffort;
        }
        if let Some(ms) = self.silence_ms {
            config.assembly.failed_segment_silence_ms = ms;
        }
        if let Some(voice) = &self.voice {
            config.backend.voice = Some(voice.clone());
        }
        if let Some(model) = &self.model {
            config.backend.model = Some(model.clone());
        }
    }
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_speak_minimal() {
        let cli = Cli::try_parse_from(["readaloud", "speak", "book.txt", "-o", "book.wav"]).unwrap();
        match cli.command {
            Commands::Speak(args) => {
                assert_eq!(args.input, PathBuf::from("book.txt"));
                assert_eq!(args.output, PathBuf::from("book.wav"));
                assert!(args.url.is_none());
                assert!(args.concurrency.is_none());
                assert!(!args.best_effort);
            }
            _ => panic!("Expected Speak command"),
        }
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_speak_all_flags() {
        let cli = Cli::try_parse_from([
            "readaloud",
            "speak",
            "-",
            "--output",
            "out.wav",
            "--url",
            "http://tts:5100",
            "-j",
            "4",
            "--max-chars",
            "200",
            "--attempts",
            "5",
            "--backoff",
            "250ms",
            "--timeout",
            "2m",
            "--best-effort",
            "--silence-ms",
            "300",
            "--voice",
            "en_US-hfc_male-medium",
            "--model",
            "medium",
        ])
        .unwrap();

        let Commands::Speak(args) = cli.command else {
            panic!("Expected Speak command");
        };
        assert_eq!(args.input, PathBuf::from("-"));
        assert_eq!(args.url.as_deref(), Some("http://tts:5100"));
        assert_eq!(args.concurrency, Some(4));
        assert_eq!(args.max_chars, Some(200));
        assert_eq!(args.attempts, Some(5));
        assert_eq!(args.backoff, Some(Duration::from_millis(250)));
        assert_eq!(args.timeout, Some(Duration::from_secs(120)));
        assert!(args.best_effort);
        assert_eq!(args.silence_ms, Some(300));
        assert_eq!(args.voice.as_deref(), Some("en_US-hfc_male-medium"));
        assert_eq!(args.model.as_deref(), Some("medium"));
    }

    #[test]
    fn test_speak_requires_output() {
        let result = Cli::try_parse_from(["readaloud", "speak", "book.txt"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_speak_args_override_config() {
        let args = SpeakArgs {
            url: Some("http://other:9000".to_string()),
            concurrency: Some(2),
            backoff: Some(Duration::from_millis(50)),
            timeout: Some(Duration::from_secs(10)),
            best_effort: true,
            voice: Some("alan".to_string()),
            ..SpeakArgs::default()
        };
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.backend.url, "http://other:9000");
        assert_eq!(config.dispatch.concurrency_limit, 2);
        assert_eq!(config.dispatch.backoff_ms, 50);
        assert_eq!(config.backend.timeout_secs, 10);
        assert_eq!(
            config.assembly.partial_failure,
            PartialFailurePolicy::BestEffort
        );
        assert_eq!(config.backend.voice.as_deref(), Some("alan"));
        // Untouched
        assert_eq!(config.chunker.max_chunk_chars, 400);
        assert_eq!(config.dispatch.max_attempts, 3);
    }

    #[test]
    fn test_parse_duration_formats() {
        assert_eq!(parse_duration("30"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration(" 1m30s "), Ok(Duration::from_secs(90)));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_parse_timeout_requires_whole_seconds() {
        assert_eq!(parse_timeout("90"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_timeout("2m"), Ok(Duration::from_secs(120)));
        assert!(parse_timeout("1500ms").is_err());
        assert!(parse_timeout("0s").is_err());

        let result = Cli::try_parse_from([
            "readaloud", "speak", "in.txt", "-o", "out.wav", "--timeout", "1500ms",
        ]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ValueValidation
        );
    }

    #[test]
    fn test_parse_split() {
        let cli =
            Cli::try_parse_from(["readaloud", "split", "notes.txt", "--max-chars", "80", "--check"])
                .unwrap();
        match cli.command {
            Commands::Split {
                input,
                max_chars,
                check,
            } => {
                assert_eq!(input, PathBuf::from("notes.txt"));
                assert_eq!(max_chars, Some(80));
                assert!(check);
            }
            _ => panic!("Expected Split command"),
        }
    }

    #[test]
    fn test_parse_check_with_url() {
        let cli = Cli::try_parse_from(["readaloud", "check", "--url", "http://x:1"]).unwrap();
        match cli.command {
            Commands::Check { url } => assert_eq!(url.as_deref(), Some("http://x:1")),
            _ => panic!("Expected Check command"),
        }
    }

    #[test]
    fn test_parse_config_init_force() {
        let cli = Cli::try_parse_from(["readaloud", "config", "init", "--force"]).unwrap();
        match cli.command {
            Commands::Config {
                action: ConfigAction::Init { force },
            } => assert!(force),
            _ => panic!("Expected Config Init command"),
        }
    }

    #[test]
    fn test_parse_verbose_repeated_flags() {
        let cli = Cli::try_parse_from(["readaloud", "-v", "-v", "config", "show"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_global_options_after_command() {
        let cli = Cli::try_parse_from([
            "readaloud",
            "config",
            "path",
            "--config",
            "/tmp/config.toml",
            "-q",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/config.toml")));
        assert!(cli.quiet);
    }

    #[test]
    fn test_missing_command_is_error() {
        let result = Cli::try_parse_from(["readaloud"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_command_returns_error() {
        let result = Cli::try_parse_from(["readaloud", "invalid"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["readaloud", "completions", "bash"]).unwrap();
        match cli.command {
            Commands::Completions { shell } => assert_eq!(shell, Shell::Bash),
            _ => panic!("Expected Completions command"),
        }
    }
}
