use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use levi_live::app::{run_play_command, run_talk_command};
use levi_live::audio::capture::{list_devices, suppress_audio_warnings};
use levi_live::audio::playback::list_output_devices;
use levi_live::cli::{Cli, Commands, ConfigAction};
use levi_live::config::Config;
use owo_colors::OwoColorize;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    suppress_audio_warnings();
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Talk(args) => {
            let config = load_config(cli.config.as_deref())?;
            run_talk_command(config, args, cli.quiet).await?;
        }
        Commands::Play {
            file,
            raw,
            output_device,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let device = output_device.or(config.audio.output_device);
            run_play_command(&file, raw, device.as_deref(), cli.quiet)
                .await
                .with_context(|| format!("Failed to play {}", file.display()))?;
        }
        Commands::Devices => {
            list_audio_devices()?;
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "levi-live",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Install the tracing subscriber.
///
/// `RUST_LOG` wins; otherwise the level follows the `-v` count.
fn init_logging(verbose: u8, quiet: bool) {
    let default_level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "levi_live=info",
        (false, 2) => "levi_live=debug",
        _ => "levi_live=trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/levi-live/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides())
}

/// List available audio input and output devices.
fn list_audio_devices() -> Result<()> {
    let inputs = list_devices()?;
    let outputs = list_output_devices()?;

    if inputs.is_empty() && outputs.is_empty() {
        eprintln!("{}", "No audio devices found".red());
        std::process::exit(1);
    }

    println!("{}", "Audio input devices:".bold());
    for (idx, device) in inputs.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }
    println!("{}", "Audio output devices:".bold());
    for (idx, device) in outputs.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

fn handle_config_command(
    action: ConfigAction,
    custom_path: Option<&std::path::Path>,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", config.to_redacted_toml()?);
            if let Err(e) = config.validate() {
                eprintln!("{} {}", "warning:".yellow().bold(), e);
            }
        }
        ConfigAction::Path => {
            let path = custom_path
                .map(std::path::Path::to_path_buf)
                .unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
    }
    Ok(())
}
