//! pulselink CLI
//!
//! Runs the monitor pipeline from a terminal: `monitor` listens for a
//! wearable over TCP and prints live status; `demo` wires a simulated
//! wearable and monitor together in-process, including a stand-in
//! classifier, so the whole pipeline can be watched without hardware.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use clap::{Parser, Subcommand};
use rand::Rng;
use tokio::sync::broadcast;
use uuid::Uuid;

use pulselink::classify::{spawn_scoring, Classifier, LatestScore};
use pulselink::link::service::StatusEvent;
use pulselink::link::simulated::SimNetwork;
use pulselink::link::tcp::TcpTransport;
use pulselink::link::transport::LinkSession;
use pulselink::{MonitorEvent, Supervisor, SupervisorConfig};

#[derive(Parser)]
#[command(name = "pulselink", about = "Heart-rate monitor link pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for a wearable over TCP and print live status
    Monitor {
        /// Address to bind the listening endpoint on
        #[arg(long, default_value = "0.0.0.0:7600")]
        listen: String,
        /// Override the advertised service identifier
        #[arg(long)]
        service_id: Option<Uuid>,
        /// Seconds between status re-broadcasts to the peer (0 disables)
        #[arg(long, default_value_t = 5)]
        status_interval: u64,
    },
    /// Run a simulated wearable and monitor pair in-process
    Demo {
        /// Stop after this many completed windows
        #[arg(long, default_value_t = 2)]
        windows: u64,
        /// Baseline heart rate for the synthetic feed
        #[arg(long, default_value_t = 78.0)]
        bpm: f32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Monitor {
            listen,
            service_id,
            status_interval,
        } => monitor(listen, service_id, status_interval).await,
        Command::Demo { windows, bpm } => demo(windows, bpm).await,
    }
}

async fn monitor(
    listen: String,
    service_id: Option<Uuid>,
    status_interval: u64,
) -> anyhow::Result<()> {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown-host".to_string());
    log::info!("Starting monitor on {} ({})", listen, host);

    let mut config = SupervisorConfig {
        status_interval: (status_interval > 0).then(|| Duration::from_secs(status_interval)),
        ..Default::default()
    };
    if let Some(id) = service_id {
        config.service_id = id;
    }
    println!("service identifier: {}", config.service_id);

    let supervisor = Supervisor::new(Arc::new(TcpTransport::new(listen)), config);
    let mut events = supervisor.events();
    supervisor.start();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutting down");
                supervisor.stop();
                break;
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Display fell behind, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
    Ok(())
}

/// Stand-in for the trained model: coefficient of variation of the window.
struct VariabilityScore;

impl Classifier for VariabilityScore {
    fn classify(&self, window: &[f32]) -> f32 {
        let mean = window.iter().sum::<f32>() / window.len() as f32;
        let variance =
            window.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / window.len() as f32;
        variance.sqrt() / mean.max(1.0)
    }
}

async fn demo(windows: u64, bpm: f32) -> anyhow::Result<()> {
    let network = SimNetwork::new();
    let monitor_device = Arc::new(network.create_device());
    let wearable = network.create_device();
    let monitor_addr = monitor_device.address();

    let config = SupervisorConfig {
        retry_delay: Duration::from_millis(200),
        status_interval: Some(Duration::from_secs(2)),
        ..Default::default()
    };
    let service_id = config.service_id;

    let supervisor = Supervisor::new(monitor_device, config);
    let latest = Arc::new(LatestScore::new());
    let mut scores = latest.subscribe();
    let _scoring = spawn_scoring(&supervisor, Arc::new(VariabilityScore), Arc::clone(&latest));
    let mut events = supervisor.events();
    supervisor.start();

    // Synthetic wearable: connect, stream jittered BPM text chunks, and
    // log status lines coming back from the monitor.
    tokio::spawn(async move {
        let session = loop {
            match wearable.connect(monitor_addr, service_id).await {
                Ok(session) => break session,
                Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        };
        loop {
            tokio::select! {
                result = session.read() => match result {
                    Ok(line) => {
                        if let Ok(event) = StatusEvent::from_line(&line) {
                            log::debug!("monitor status: connected={}", event.connected);
                        }
                    }
                    Err(_) => break,
                },
                _ = tokio::time::sleep(Duration::from_millis(20)) => {
                    let jitter: f32 = rand::thread_rng().gen_range(-4.0..4.0);
                    let chunk = format!("{:.1}", bpm + jitter);
                    if session.send(chunk.as_bytes()).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut completed = 0u64;
    while completed < windows {
        match events.recv().await {
            Ok(MonitorEvent::WindowReady(window)) => {
                completed += 1;
                print_event(&MonitorEvent::WindowReady(window));
                if let Ok(score) = scores.recv().await {
                    println!("  variability score: {:.4}", score);
                }
            }
            Ok(event) => print_event(&event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::warn!("Display fell behind, skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    supervisor.stop();
    Ok(())
}

fn print_event(event: &MonitorEvent) {
    let stamp = Local::now().format("%H:%M:%S%.3f");
    match event {
        MonitorEvent::ConnectionStatusChanged(true) => {
            println!("[{}] wearable connected", stamp);
        }
        MonitorEvent::ConnectionStatusChanged(false) => {
            println!("[{}] wearable disconnected, listening again", stamp);
        }
        MonitorEvent::SampleAppended(sample) => {
            println!("[{}] {:>6.1} bpm", stamp, sample);
        }
        MonitorEvent::WindowReady(window) => {
            println!("[{}] window ready ({} samples)", stamp, window.len());
        }
    }
}
