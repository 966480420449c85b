//! Railpoint - command station control core for model railway automation
//!
//! Connects to the command station over UDP, tracks sensor feedback
//! statistics, and drives configured journeys and workflows.
//!
//! Module structure:
//! - `domain/` - Core business types (Journey, Workflow, Feedback)
//! - `protocol/` - Wire codec (frame builders, inbound decoding)
//! - `io/` - UDP transport with receive loop and retrying sends
//! - `services/` - Client, feedback monitor, journeys, workflow engine
//! - `infra/` - Configuration and event plumbing

use async_trait::async_trait;
use clap::Parser;
use railpoint::domain::journey::{EndOfRoute, Journey, Station};
use railpoint::domain::workflow::{Action, Workflow};
use railpoint::infra::Config;
use railpoint::io::{RetryPolicy, UdpTransport};
use railpoint::services::actions::BackendError;
use railpoint::services::{
    forward_feedback, CommandStationClient, ExecutionContext, FeedbackMonitor, JourneyDirector,
    SoundBackend, SpeechBackend,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Railpoint - model railway automation core
#[derive(Parser, Debug)]
#[command(name = "railpoint", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Wire up a demo shuttle journey that announces stops via the log
    #[arg(long)]
    demo_journey: bool,
}

/// Speech backend that routes announcements to the log. Platform
/// integrations provide real TTS; the core stays headless.
struct LogSpeech;

#[async_trait]
impl SpeechBackend for LogSpeech {
    async fn speak(&self, text: &str) -> Result<(), BackendError> {
        info!(text = %text, "announcement");
        Ok(())
    }
}

struct LogSound;

#[async_trait]
impl SoundBackend for LogSound {
    async fn play(&self, file: &str) -> Result<(), BackendError> {
        info!(file = %file, "audio");
        Ok(())
    }
}

/// A small looping journey bound to feedback channel 1, for bench
/// testing against real hardware or `simulate_feedback`.
fn demo_journey() -> (Vec<Journey>, Vec<Workflow>) {
    let arrival = Workflow::new(
        "Demo arrival",
        vec![
            Action::gong(),
            Action::announcement("Stop call", "{StationName}").with_delay(500),
        ],
    );

    let journey = Journey::new(
        "Demo shuttle",
        1,
        vec![
            Station::new("Central", 1).with_workflow(arrival.id),
            Station::new("Harbor", 1).with_workflow(arrival.id),
        ],
    )
    .with_end_of_route(EndOfRoute::BeginAgainFromFirstStop)
    .with_template("Next stop: {StationName}, exit on the {ExitSide}");

    (vec![journey], vec![arrival])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging, level via RUST_LOG (default: info)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("railpoint starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        station_host = %config.station_host(),
        station_port = %config.station_port(),
        send_retry_attempts = %config.send_retry_attempts(),
        send_backoff_ms = %config.send_backoff_ms(),
        keepalive_interval_secs = %config.keepalive_interval_secs(),
        "config_loaded"
    );

    let retry = RetryPolicy {
        max_attempts: config.send_retry_attempts(),
        initial_backoff: Duration::from_millis(config.send_backoff_ms()),
    };
    let transport = Arc::new(UdpTransport::new(retry));
    let client = CommandStationClient::with_settings(
        transport,
        Duration::from_millis(config.startup_command_gap_ms()),
        Duration::from_secs(config.keepalive_interval_secs()),
    );

    let monitor = Arc::new(FeedbackMonitor::new());

    let (journeys, workflows) =
        if args.demo_journey { demo_journey() } else { (Vec::new(), Vec::new()) };

    let context = ExecutionContext::new(client.clone())
        .with_speech(Arc::new(LogSpeech))
        .with_sound(Arc::new(LogSound));

    let director = JourneyDirector::new(journeys, workflows, monitor.clone(), context);
    let events = forward_feedback(&client, 1024);
    tokio::spawn(director.run(events));

    // Periodic feedback statistics summary
    let stats_interval = config.stats_interval_secs();
    if stats_interval > 0 {
        let monitor = monitor.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(stats_interval));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let all = monitor.all_statistics();
                let total: u64 = all.iter().map(|s| s.total_count).sum();
                info!(channels = all.len(), total_feedbacks = total, "feedback_statistics");
            }
        });
    }

    let addr = tokio::net::lookup_host((config.station_host(), config.station_port()))
        .await?
        .next()
        .ok_or_else(|| anyhow::anyhow!("station address did not resolve"))?;

    client.connect(addr).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown_signal_received");

    client.disconnect().await;
    info!("railpoint shutdown complete");
    Ok(())
}
