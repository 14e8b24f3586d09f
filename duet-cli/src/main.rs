use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::{Confirm, Select};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use duet_client::api::ApiClient;
use duet_client::capture::{CaptureBackend, DeviceInfo, DeviceManager, MeetingConfig, SyntheticCapture};
use duet_client::config::ClientConfig;
use duet_client::signaling::SignalingChannel;
use duet_client::transport::RtcTransportFactory;
use duet_client::{CallSession, SessionContext, SessionEvent, SessionHandle};
use duet_core::{MediaKind, ParticipantId, RoomId};

#[derive(Parser)]
#[command(name = "duet", version, about = "Two-party call client")]
struct Cli {
    /// JSON file with client settings; flags below override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, env = "DUET_SIGNALING_URL")]
    signaling_url: Option<String>,

    #[arg(long, global = true, env = "DUET_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List capture devices.
    Devices,
    /// Pick devices interactively, then join.
    Lobby {
        /// Room to join; a new one is generated when omitted.
        room: Option<String>,

        #[arg(long, env = "DUET_PARTICIPANT_ID")]
        name: Option<String>,
    },
    /// Join a room with the default devices.
    Join {
        room: Option<String>,

        #[arg(long, env = "DUET_PARTICIPANT_ID")]
        name: Option<String>,

        /// Join with the camera switched off.
        #[arg(long)]
        no_camera: bool,

        /// Join with the microphone switched off.
        #[arg(long)]
        muted: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config(&cli)?;
    let capture: Arc<SyntheticCapture> = Arc::new(SyntheticCapture::new());

    match cli.command {
        Commands::Devices => {
            let devices = capture
                .enumerate_devices()
                .await
                .context("Failed to enumerate devices")?;
            print_devices("Cameras", devices.iter().filter(|d| d.kind == MediaKind::Video));
            print_devices("Microphones", devices.iter().filter(|d| d.kind == MediaKind::Audio));
        }
        Commands::Lobby { room, name } => {
            let meeting = run_lobby(capture.clone()).await?;
            join(config, capture, room, name, meeting).await?;
        }
        Commands::Join {
            room,
            name,
            no_camera,
            muted,
        } => {
            let meeting = MeetingConfig {
                camera_enabled: !no_camera,
                microphone_enabled: !muted,
                ..Default::default()
            };
            join(config, capture, room, name, meeting).await?;
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => ClientConfig::default(),
    };
    if let Some(url) = &cli.signaling_url {
        config.signaling.url = url.clone();
    }
    if let Some(url) = &cli.api_url {
        config.api.base_url = url.clone();
    }
    Ok(config)
}

fn read_config(path: &Path) -> Result<ClientConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
}

fn print_devices<'a>(title: &str, devices: impl Iterator<Item = &'a DeviceInfo>) {
    println!("{}", title.cyan().bold());
    for device in devices {
        println!("   {}  {}", device.device_id.yellow(), device.label);
    }
}

async fn run_lobby(capture: Arc<SyntheticCapture>) -> Result<MeetingConfig> {
    let mut devices = DeviceManager::new(capture);
    devices
        .initialize()
        .await
        .context("Could not access camera and microphone")?;

    if let Some(id) = choose("Camera", devices.cameras(), devices.selected_camera())? {
        devices.select_camera(&id).await?;
    }
    if let Some(id) = choose("Microphone", devices.microphones(), devices.selected_microphone())? {
        devices.select_microphone(&id).await?;
    }

    if !Confirm::new()
        .with_prompt("Camera on?")
        .default(devices.is_camera_enabled())
        .interact()?
    {
        devices.toggle_camera();
    }
    if !Confirm::new()
        .with_prompt("Microphone on?")
        .default(devices.is_microphone_enabled())
        .interact()?
    {
        devices.toggle_microphone();
    }

    let meeting = devices.meeting_config();
    // The call opens its own capture; the preview must let go of the devices.
    devices.release();
    Ok(meeting)
}

fn choose(prompt: &str, options: &[DeviceInfo], selected: Option<&str>) -> Result<Option<String>> {
    if options.len() < 2 {
        return Ok(None);
    }
    let labels: Vec<&str> = options.iter().map(|d| d.label.as_str()).collect();
    let current = options
        .iter()
        .position(|d| Some(d.device_id.as_str()) == selected)
        .unwrap_or(0);

    let index = Select::new()
        .with_prompt(prompt)
        .items(&labels)
        .default(current)
        .interact()?;
    Ok(Some(options[index].device_id.clone()))
}

async fn join(
    config: ClientConfig,
    capture: Arc<SyntheticCapture>,
    room: Option<String>,
    name: Option<String>,
    meeting: MeetingConfig,
) -> Result<()> {
    let room_id = match room {
        Some(raw) => RoomId::parse(&raw)?,
        None => RoomId::generate(),
    };
    let local_id = name.map(ParticipantId::from).unwrap_or_default();

    println!(
        "{} {} as {}",
        "Joining room".green().bold(),
        room_id.as_str().yellow(),
        local_id
    );

    let channel = SignalingChannel::new(config.signaling.clone(), &local_id);
    channel
        .connect()
        .await
        .context("Could not reach the signaling server")?;

    let api = Arc::new(ApiClient::new(&config.api));
    let ctx = SessionContext {
        local_id,
        capture,
        transports: Arc::new(RtcTransportFactory::new(config.transport.clone())),
        signaling: channel.clone(),
        inbound: channel.subscribe(),
        takes: api.clone(),
        storage: api,
        config,
    };

    let (handle, mut events) = CallSession::join(ctx, room_id, &meeting).await?;
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::CallEnded(reason)) => {
                    println!("{} {:?}", "Call ended:".red().bold(), reason);
                    break;
                }
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(n)) => warn!("Missed {} session events", n),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => run_command(&handle, line.trim()).await,
                None => {
                    stdin_open = false;
                    handle.leave().await;
                }
            },
        }
    }

    info!("Waiting for pending uploads");
    handle.uploads().drained().await;
    channel.close();
    Ok(())
}

fn print_help() {
    println!(
        "{}",
        "Commands: a (mic), v (camera), s (share screen), x (stop share), r (record), t (stop recording), i (info), q (leave), e (end call)"
            .cyan()
    );
}

async fn run_command(handle: &SessionHandle, command: &str) {
    let result = match command {
        "a" => handle.toggle_audio().await.map(|on| format!("microphone {}", on_off(on))),
        "v" => handle.toggle_video().await.map(|on| format!("camera {}", on_off(on))),
        "s" => handle
            .start_screen_share()
            .await
            .map(|_| "sharing screen".to_owned()),
        "x" => handle
            .stop_screen_share()
            .await
            .map(|_| "screen share stopped".to_owned()),
        "r" => handle
            .start_recording()
            .await
            .map(|take| format!("recording take {take}")),
        "t" => handle
            .stop_recording()
            .await
            .map(|take| format!("stopped take {take}")),
        "i" => handle.snapshot().await.map(|s| format!("{s:#?}")),
        "q" => {
            handle.leave().await;
            return;
        }
        "e" => {
            handle.end_call().await;
            return;
        }
        "" => return,
        _ => {
            print_help();
            return;
        }
    };

    match result {
        Ok(message) => println!("{}", message.green()),
        Err(e) => println!("{} {}", "Error:".red().bold(), e),
    }
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::RemoteJoined {
            participant_id,
            role,
        } => println!("{} {} ({:?})", "Joined:".green(), participant_id, role),
        SessionEvent::RemoteLeft { participant_id } => {
            println!("{} {}", "Left:".yellow(), participant_id)
        }
        SessionEvent::Connected => println!("{}", "Connected".green().bold()),
        SessionEvent::RemoteMedia(state) => println!(
            "Remote camera {}, screen share {}",
            on_off(state.is_remote_camera_on),
            on_off(state.is_remote_screen_sharing)
        ),
        SessionEvent::ScreenShareEnded => println!("{}", "Screen share ended, camera restored".yellow()),
        SessionEvent::SignalingDisconnected => println!("{}", "Signaling lost, reconnecting...".yellow()),
        other => info!("{:?}", other),
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}
