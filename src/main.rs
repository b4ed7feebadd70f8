use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use readaloud::cli::{Cli, Commands, ConfigAction, SpeakArgs};
use readaloud::config::Config;
use readaloud::output::{ConsoleSink, print_cancelled, print_chunks, print_summary};
use readaloud::pipeline::{CancelFlag, LogSink, Pipeline, RunOutcome};
use readaloud::synth::HttpSynthesizer;
use readaloud::text;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    tracing::debug!("readaloud {}", readaloud::version_string());

    match cli.command {
        Commands::Speak(args) => {
            let config = load_config(cli.config.as_deref())?;
            handle_speak(config, args, cli.quiet).await?;
        }
        Commands::Split {
            input,
            max_chars,
            check,
        } => {
            let config = load_config(cli.config.as_deref())?;
            handle_split(&config, &input, max_chars, check, cli.quiet)?;
        }
        Commands::Check { url } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(url) = url {
                config.backend.url = url;
            }
            handle_check(&config).await?;
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "readaloud", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Install the stderr log subscriber.
///
/// `RUST_LOG` wins over `-v` when set.
fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/readaloud/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path()?)?
    };

    Ok(config.with_env_overrides())
}

/// Read the whole input, from stdin when the path is `-`.
fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read text from stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))
    }
}

async fn handle_speak(mut config: Config, args: SpeakArgs, quiet: bool) -> Result<()> {
    args.apply(&mut config);
    config.validate()?;

    let text = read_input(&args.input)?;
    let chunk_count = text::split(&text, config.chunker.max_chunk_chars)?.len();

    let synth = Arc::new(HttpSynthesizer::new(config.http_config())?);
    let cancel = CancelFlag::new();
    let mut pipeline = Pipeline::new(config.pipeline_config(), synth).with_cancel_flag(cancel.clone());
    pipeline = if quiet {
        pipeline.with_progress_sink(Box::new(LogSink))
    } else {
        pipeline.with_progress_sink(Box::new(ConsoleSink::new(chunk_count)))
    };

    // First Ctrl-C stops new work; in-flight requests finish on their own.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Stopping: waiting for in-flight requests...".yellow());
            cancel.cancel();
        }
    });

    match pipeline.run_to_file(&text, &args.output).await? {
        RunOutcome::Completed(summary) => {
            if !quiet {
                print_summary(&summary);
            }
            Ok(())
        }
        RunOutcome::Cancelled {
            submitted,
            collected,
        } => {
            print_cancelled(submitted, collected);
            std::process::exit(130);
        }
    }
}

fn handle_split(
    config: &Config,
    input: &Path,
    max_chars: Option<usize>,
    check: bool,
    quiet: bool,
) -> Result<()> {
    let max = max_chars.unwrap_or(config.chunker.max_chunk_chars);
    let text = read_input(input)?;
    let chunks = text::split(&text, max)?;

    if !quiet {
        print_chunks(&chunks);
    }

    let longest = chunks.iter().map(|c| c.char_len()).max().unwrap_or(0);
    eprintln!(
        "{} chunks, longest {} characters (limit {})",
        chunks.len(),
        longest,
        max
    );

    if check {
        if text::rejoin(&chunks) == text::normalize(&text) {
            eprintln!("{}", "Chunks rejoin to the normalized input".green());
        } else {
            bail!("Chunks do not rejoin to the input (a word longer than {max} characters was split)");
        }
    }
    Ok(())
}

async fn handle_check(config: &Config) -> Result<()> {
    let synth = HttpSynthesizer::new(config.http_config())?;
    match synth.health().await {
        Ok(health) if health.is_ok() => {
            println!("{} {} (HTTP {})", "Backend OK:".green(), health.url, health.status);
            Ok(())
        }
        Ok(health) => {
            bail!("Backend at {} answered HTTP {}", health.url, health.status);
        }
        Err(e) => {
            eprintln!("{}", e.to_string().red());
            eprintln!("Is the synthesis server running? Set the URL with --url or READALOUD_API_URL.");
            std::process::exit(1);
        }
    }
}

/// Handle configuration commands.
fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = match custom_path {
        Some(path) => path.to_path_buf(),
        None => Config::default_path()?,
    };

    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(&config_path)?.with_env_overrides();
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
        ConfigAction::Init { force } => {
            write_default_config(&config_path, force)?;
            println!("Wrote {}", config_path.display());
        }
    }
    Ok(())
}

fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, Config::default().to_toml()?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
