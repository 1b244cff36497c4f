//! Sigscope CLI Application

use anyhow::Context;
use clap::{Parser, Subcommand};
use sigscope_app::{apply_effect_arg, ComparisonApp, LiveApp};
use sigscope_core::domain::backend::Transport;
use sigscope_core::domain::config::{ConfigManager, SigscopeConfig};
use sigscope_core::domain::playback::LivePlayer;
use sigscope_core::domain::session::Session;
use sigscope_infra::audio::{decode_wav_file, CpalHost};
use sigscope_infra::backend::HttpBackend;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sigscope")]
#[command(about = "Audio effect chains with live and offline signal views", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log destination for the terminal UI commands
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process a source link with an effect chain and compare input and output
    Submit {
        /// Source link, e.g. a YouTube URL
        link: String,

        /// Effect as <type>[@<start>-<end>][,<param>=<value>...]; repeat in chain order
        #[arg(short, long = "effect", value_name = "EFFECT", required = true)]
        effects: Vec<String>,

        /// Receive progress events while the backend works
        #[arg(long)]
        stream: bool,

        /// Print a summary instead of opening the chart view
        #[arg(long)]
        no_tui: bool,

        /// Delete the processed file from the backend before exiting
        #[arg(long)]
        cleanup: bool,
    },

    /// Play a WAV file with a live waveform and dominant frequency readout
    Play {
        file: PathBuf,
    },

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the default configuration file
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let uses_terminal = match &cli.command {
        Command::Submit { no_tui, .. } => !no_tui,
        Command::Play { .. } => true,
        Command::Config { .. } => false,
    };
    let log_file = uses_terminal.then(|| {
        cli.log_file
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("sigscope.log"))
    });
    init_logging(cli.verbose, log_file.as_deref())?;

    tracing::info!("Sigscope starting...");

    let manager = match &cli.config {
        Some(path) => ConfigManager::for_file(path.clone()),
        None => ConfigManager::new(ConfigManager::default_config_dir()?),
    };

    match cli.command {
        Command::Submit {
            link,
            effects,
            stream,
            no_tui,
            cleanup,
        } => {
            let config = manager.load().await;
            submit(&config, link, &effects, stream, no_tui, cleanup).await
        }
        Command::Play { file } => {
            let config = manager.load().await;
            play(&config, &file)
        }
        Command::Config { action } => run_config(&manager, action).await,
    }
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sigscope={level},warn")));

    match log_file {
        // Keep the terminal clean for the UI
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Cannot open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

async fn submit(
    config: &SigscopeConfig,
    link: String,
    effects: &[String],
    stream: bool,
    no_tui: bool,
    cleanup: bool,
) -> anyhow::Result<()> {
    let backend = HttpBackend::new(&config.backend)?;
    let mut session = Session::new(backend);
    session.set_link(link);
    for arg in effects {
        apply_effect_arg(session.chain_mut(), arg)?;
    }

    println!("{}", session.progress_message());
    let outcome = if stream || config.backend.transport == Transport::Streaming {
        session
            .submit_streaming(|event| println!("{}", event.describe()))
            .await?
            .clone()
    } else {
        session.submit().await?.clone()
    };

    println!("Processed file: {}", outcome.file_url);
    if let Some(original) = &outcome.original_file_url {
        println!("Original file: {}", original);
    }
    if let Some(result) = &outcome.result {
        println!("{}", result);
    }

    let results = session.results();
    if no_tui {
        for result in &results {
            let frame = &result.frame;
            println!(
                "{}: {} samples, {} frequency bins",
                result.title(),
                frame.time_domain.len(),
                frame.frequency_domain.audible_bins().len()
            );
        }
    } else {
        let status = format!(
            "{} effect(s) applied, output at {}",
            results.len(),
            outcome.file_url
        );
        let mut app = ComparisonApp::new(results, status, config.app.stem_target_points);
        let mut terminal = ratatui::init();
        let result = app.run(&mut terminal, frame_interval(config));
        ratatui::restore();
        result?;
    }

    if cleanup {
        // Cleanup failures are logged, not fatal
        session.reset().await;
        println!("Cleanup requested for {}", outcome.file_url);
    }
    Ok(())
}

fn play(config: &SigscopeConfig, file: &Path) -> anyhow::Result<()> {
    let element = Arc::new(
        decode_wav_file(file).with_context(|| format!("Cannot decode {}", file.display()))?,
    );
    let title = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    let player = LivePlayer::new(CpalHost::new(), element, config.analysis.clone());
    let mut app = LiveApp::new(player, title);

    let mut terminal = ratatui::init();
    let result = app.run(&mut terminal, frame_interval(config));
    ratatui::restore();
    Ok(result?)
}

async fn run_config(manager: &ConfigManager, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = manager.load().await;
            println!("# {}", manager.config_path().display());
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Init { force } => {
            if manager.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    manager.config_path().display()
                );
            }
            manager.save(&SigscopeConfig::default()).await?;
            println!("Wrote {}", manager.config_path().display());
        }
    }
    Ok(())
}

fn frame_interval(config: &SigscopeConfig) -> Duration {
    Duration::from_millis(config.app.frame_interval_ms)
}
