//! VBox PVR - command line front end
//! Connects to a VBox gateway and prints what the backend sees

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vbox_pvr::{AddonStatus, Backend, LogHost, PvrClient, Settings, VBoxClient};

const CAPABILITY_WAIT: Duration = Duration::from_secs(30);

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vbox_pvr=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut settings = Settings::load();
    // Optional overrides: vbox-pvr [hostname] [port]
    let mut args = std::env::args().skip(1);
    if let Some(hostname) = args.next() {
        settings.hostname = hostname;
    }
    if let Some(port) = args.next() {
        match port.parse() {
            Ok(port) => settings.port = port,
            Err(_) => {
                eprintln!("invalid port: {}", port);
                return ExitCode::FAILURE;
            }
        }
    }

    tracing::info!(host = %settings.hostname, port = settings.port, "starting VBox PVR client");

    let device = VBoxClient::new(&settings);
    let backend = Arc::new(Backend::new(settings, device));
    let client = PvrClient::create(backend, LogHost);

    match client.status() {
        AddonStatus::Ok => {}
        AddonStatus::PermanentFailure => {
            eprintln!("gateway firmware is not supported");
            return ExitCode::FAILURE;
        }
        AddonStatus::LostConnection => {
            eprintln!("could not connect to {}", client.connection_string());
            return ExitCode::FAILURE;
        }
    }

    let caps = client.capabilities(CAPABILITY_WAIT);
    println!("{} {}", client.backend_name(), client.backend_version());
    println!("Connection: {}", client.connection_string());

    let tv = client.channels(false);
    let radio = client.channels(true);
    println!("Channels: {} TV, {} radio", tv.len(), radio.len());
    for channel in tv.iter().chain(radio.iter()) {
        println!("  {:>4}  {}", channel.channel_number, channel.name);
    }

    if caps.supports_recordings {
        let (total, used) = client.drive_space();
        println!("Storage: {} of {} MB used", used / 1024, total / 1024);
        println!("Recordings: {}", client.recordings_amount());
        for recording in client.recordings() {
            println!("  [{}] {} ({})", recording.recording_id, recording.title, recording.channel_name);
        }
        println!("Timers: {}", client.timers_amount());
        for timer in client.timers() {
            println!("  [{}] {} {:?}", timer.client_index, timer.title, timer.state);
        }
    } else {
        println!("Recording is not available (no external storage)");
    }

    ExitCode::SUCCESS
}
