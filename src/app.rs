//! Composition root: wires config, CPAL devices and the websocket transport
//! into the `talk` and `play` commands.

use crate::audio::capture::CpalMicrophone;
use crate::audio::codec::file_to_base64;
use crate::audio::playback::CpalOutput;
use crate::cli::TalkArgs;
use crate::config::Config;
use crate::error::{LiveError, Result};
use crate::live::link::LiveLink;
use crate::live::session::{LiveSession, SessionStatus};
use crate::live::websocket::WebSocketTransport;
use crate::speech::VoiceOver;
use crate::studio::{StudioOptions, WorkflowMode};
use owo_colors::OwoColorize;
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;

/// Run one live session until Ctrl+C, SIGTERM, the optional duration, or the
/// service ends it.
pub async fn run_talk_command(config: Config, args: TalkArgs, quiet: bool) -> Result<()> {
    let config = apply_talk_overrides(config, &args);
    config.validate()?;
    let api_key = config.api_key()?.to_string();
    let options = studio_options(&config, args.workflow.as_deref(), args.style.as_deref())?;

    if !quiet {
        eprintln!(
            "Briefing director: {} / {}",
            options.workflow().bold(),
            options.style().bold()
        );
    }

    let transport = WebSocketTransport::new(&config.live.endpoint, api_key)
        .with_outbound_capacity(config.audio.outbound_capacity);
    let mic = CpalMicrophone::new(config.audio.input_device.as_deref())
        .with_sample_rate(config.audio.capture_rate);
    let output = CpalOutput::new(config.audio.output_device.as_deref());
    let session = LiveSession::new(transport, mic, output, config.session_config(&options));

    let mut link = LiveLink::new();
    link.open(|| session.spawn()).await;
    let Some(handle) = link.handle() else {
        return Ok(());
    };

    let printer = tokio::spawn(print_status(handle.subscribe(), quiet));

    let final_status = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            if !quiet {
                eprintln!("\nReceived SIGINT, hanging up...");
            }
            None
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                eprintln!("Error setting up signal handler: {}", e);
            }
            None
        }
        _ = sleep_or_forever(args.duration) => {
            if !quiet {
                eprintln!("Session time elapsed, hanging up...");
            }
            None
        }
        status = handle.terminated() => Some(status),
    };

    link.close().await;
    if let Err(e) = printer.await {
        eprintln!("levi-live: status task failed: {e}");
    }

    match final_status {
        Some(status @ SessionStatus::Error(_)) => Err(LiveError::Other(format!(
            "live session ended: {}",
            status
        ))),
        _ => Ok(()),
    }
}

/// Play a speech payload stored in `file`, base64 text or raw PCM when `raw`.
pub async fn run_play_command(
    file: &Path,
    raw: bool,
    output_device: Option<&str>,
    quiet: bool,
) -> Result<()> {
    let payload = load_speech_payload(file, raw)?;
    let mut vo = VoiceOver::play(&payload, CpalOutput::new(output_device))?;

    if !quiet {
        eprintln!("Playing voice-over ({:.1}s)...", vo.duration());
    }

    let interrupted = tokio::select! {
        _ = vo.wait() => false,
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        vo.stop();
    }
    Ok(())
}

/// Base64 payload of a stored speech file.
fn load_speech_payload(file: &Path, raw: bool) -> Result<String> {
    if raw {
        return file_to_base64(file);
    }
    Ok(std::fs::read_to_string(file)?.trim().to_string())
}

fn apply_talk_overrides(mut config: Config, args: &TalkArgs) -> Config {
    if let Some(voice) = args.voice.as_ref() {
        config.live.voice = Some(voice.clone());
    }
    if let Some(device) = args.input_device.as_ref() {
        config.audio.input_device = Some(device.clone());
    }
    if let Some(device) = args.output_device.as_ref() {
        config.audio.output_device = Some(device.clone());
    }
    config
}

fn studio_options(
    config: &Config,
    workflow: Option<&str>,
    style: Option<&str>,
) -> Result<StudioOptions> {
    let mut options = config.studio_options()?;
    if let Some(workflow) = workflow {
        options = options.with_workflow(workflow.parse::<WorkflowMode>()?);
    }
    if let Some(style) = style {
        options = options.with_style(style)?;
    }
    Ok(options)
}

/// Print each status change until the session's status channel closes.
async fn print_status(mut status: watch::Receiver<SessionStatus>, quiet: bool) {
    loop {
        let current = *status.borrow_and_update();
        if !quiet {
            match current {
                SessionStatus::Open => eprintln!("{}", current.green().bold()),
                SessionStatus::Error(_) => eprintln!("{}", current.red().bold()),
                SessionStatus::Closed => eprintln!("{}", current.dimmed()),
                _ => eprintln!("{}", current.yellow()),
            }
        }
        if current.is_terminal() || status.changed().await.is_err() {
            break;
        }
    }
}

async fn sleep_or_forever(duration: Option<Duration>) {
    match duration {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

/// Wait for SIGTERM signal.
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| LiveError::Other(format!("Failed to register SIGTERM handler: {}", e)))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    // On non-Unix, just wait forever (Ctrl+C will still work)
    std::future::pending::<()>().await
}
