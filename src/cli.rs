//! Command-line interface for levi-live
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Live voice direction for the LEVI studio
#[derive(Parser, Debug)]
#[command(
    name = "levi-live",
    version,
    about = "Real-time voice dialogue with the LEVI production director"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress status output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: info logs, -vv: debug, -vvv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open a live voice session with the director
    Talk(TalkArgs),
    /// Play a speech payload (24kHz 16-bit PCM) from a file
    Play {
        /// File holding the base64 payload
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// FILE holds raw little-endian PCM instead of base64 text
        #[arg(long)]
        raw: bool,

        /// Audio output device
        #[arg(long, value_name = "DEVICE")]
        output_device: Option<String>,
    },
    /// List available audio input and output devices
    Devices,
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Options of a live session
#[derive(clap::Args, Debug, Default)]
pub struct TalkArgs {
    /// Production strategy briefed to the director (creator, ads)
    #[arg(long, value_name = "MODE")]
    pub workflow: Option<String>,

    /// Art style lock, e.g. REALISTIC, ANIME, CINEMATIC
    #[arg(long, value_name = "STYLE")]
    pub style: Option<String>,

    /// Prebuilt voice of the director
    #[arg(long, value_name = "VOICE")]
    pub voice: Option<String>,

    /// Audio input device
    #[arg(long, value_name = "DEVICE")]
    pub input_device: Option<String>,

    /// Audio output device
    #[arg(long, value_name = "DEVICE")]
    pub output_device: Option<String>,

    /// End the session after this long. Examples: 90s, 5m, 1h30m
    #[arg(long, short = 'd', value_name = "DURATION", value_parser = parse_duration)]
    pub duration: Option<Duration>,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration (API key masked)
    Show,
    /// Print the configuration file path
    Path,
}

/// Parse a session duration.
///
/// Supports any duration format accepted by `humantime`, plus bare numbers
/// as seconds.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_talk_defaults() {
        let cli = Cli::try_parse_from(["levi-live", "talk"]).unwrap();
        match cli.command {
            Commands::Talk(args) => {
                assert!(args.workflow.is_none());
                assert!(args.duration.is_none());
            }
            other => panic!("Expected Talk, got {:?}", other),
        }
        assert_eq!(cli.verbose, 0);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_cli_talk_with_options() {
        let cli = Cli::try_parse_from([
            "levi-live",
            "talk",
            "--workflow",
            "ads",
            "--style",
            "anime",
            "--voice",
            "Kore",
            "--input-device",
            "pipewire",
            "--duration",
            "2m",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Talk(args) => {
                assert_eq!(args.workflow.as_deref(), Some("ads"));
                assert_eq!(args.style.as_deref(), Some("anime"));
                assert_eq!(args.voice.as_deref(), Some("Kore"));
                assert_eq!(args.input_device.as_deref(), Some("pipewire"));
                assert_eq!(args.duration, Some(Duration::from_secs(120)));
            }
            other => panic!("Expected Talk, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_play() {
        let cli = Cli::try_parse_from(["levi-live", "play", "vo.b64"]).unwrap();
        match cli.command {
            Commands::Play {
                file,
                raw,
                output_device,
            } => {
                assert_eq!(file, PathBuf::from("vo.b64"));
                assert!(!raw);
                assert!(output_device.is_none());
            }
            other => panic!("Expected Play, got {:?}", other),
        }

        let cli = Cli::try_parse_from(["levi-live", "play", "--raw", "vo.pcm"]).unwrap();
        assert!(matches!(cli.command, Commands::Play { raw: true, .. }));
    }

    #[test]
    fn test_cli_config_subcommands() {
        let cli = Cli::try_parse_from(["levi-live", "config", "path"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Path
            }
        ));

        let cli = Cli::try_parse_from(["levi-live", "--config", "/tmp/c.toml", "config", "show"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["levi-live"]).is_err());
    }

    #[test]
    fn test_parse_duration_formats() {
        assert_eq!(parse_duration("45"), Ok(Duration::from_secs(45)));
        assert_eq!(parse_duration("1h30m"), Ok(Duration::from_secs(5400)));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
