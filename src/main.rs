//! Climbing monitor device binary.
//!
//! Wires the session engine to the MQTT transport, the simulated sensor
//! suite and the console panel, then runs the cooperative scheduler loop:
//! drain inbound requests, read the button, advance the state machine.
//! Press Enter to simulate the momentary button (start / end / cancel by
//! current state).

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

use climb_monitor_rs::clock::MonotonicClock;
use climb_monitor_rs::config::Config;
use climb_monitor_rs::gateway::{MessageGateway, StatusRequest};
use climb_monitor_rs::panel::ConsolePanel;
use climb_monitor_rs::sensors::{SensorSuite, SimulatedSensors};
use climb_monitor_rs::session::SessionController;
use climb_monitor_rs::transport::MqttTransport;

/// Scheduler iteration period
const TICK_MS: u64 = 100;

#[derive(Parser, Debug)]
#[command(name = "climb_monitor")]
#[command(about = "Climbing monitor device - session tracking and fall detection", long_about = None)]
struct Args {
    /// Duration in seconds (0 = continuous)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// Path to the device configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Simulated barometric altitude at boot, meters
    #[arg(long, default_value = "1200.0")]
    base_altitude: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    log::info!("Climbing monitor starting");
    let config = Config::load(&args.config).context("Failed to load configuration")?;
    log::info!(
        "Configured as device {} against {}",
        config.device.serial,
        config.mqtt.broker_url
    );

    // Sensor bus check is the one fatal gate: running with unverified
    // sensing would silently degrade the safety guarantees
    let mut sensors = SimulatedSensors::new(args.base_altitude);
    sensors
        .self_test()
        .context("Sensor self-test failed, refusing to start")?;

    let request_topic = format!("climbing/{}/request", config.device.serial);
    let (transport, mut request_rx) = MqttTransport::connect(&config.mqtt, &request_topic)
        .await
        .context("Failed to connect to MQTT broker")?;

    let gateway = MessageGateway::new(transport, &config.device.serial);
    let mut controller = SessionController::new(sensors, gateway, ConsolePanel::new(), &config);
    controller.announce_startup();

    // Console stand-in for the momentary button: one press per input line
    let (button_tx, mut button_rx) = mpsc::channel::<()>(4);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(_)) = lines.next_line().await {
            if button_tx.send(()).await.is_err() {
                break;
            }
        }
    });

    let clock = MonotonicClock::new();
    let mut ticker = interval(Duration::from_millis(TICK_MS));

    log::info!("Entering scheduler loop ({}ms tick). Press Enter for the button, Ctrl+C to stop.", TICK_MS);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now_ms = clock.now_ms();

                // Inbound requests first, answered inline (last one wins)
                while let Ok(payload) = request_rx.try_recv() {
                    if let Some(request) = StatusRequest::decode(&payload) {
                        controller.handle_request(request);
                    }
                }

                while let Ok(()) = button_rx.try_recv() {
                    controller.handle_button(now_ms);
                }

                controller.tick(now_ms);

                if args.duration > 0 && now_ms >= args.duration * 1000 {
                    log::info!("Duration reached, stopping");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    if controller.session().is_open() {
        log::warn!(
            "shutting down with session {} still open",
            controller.session().id
        );
    }

    log::info!("Climbing monitor stopped");
    Ok(())
}
