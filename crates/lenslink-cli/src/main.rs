//! `lenslink-cli` – streams a test pattern to a remote endpoint.
//!
//! 1. Initialises tracing (see `lenslink_runtime::telemetry`).
//! 2. Loads `~/.lenslink/config.toml`, writing the defaults on first run.
//! 3. Connects once the source is ready and streams at the configured rate,
//!    printing connection changes and pose updates as they arrive.
//! 4. On Ctrl-C, stops the ticker, disconnects and exits.

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tokio::sync::Notify;
use tracing::warn;

use lenslink_hal::TestPatternSource;
use lenslink_middleware::{Topic, WsChannelFactory};
use lenslink_runtime::{ClientConfig, StreamingClient, config};
use lenslink_types::{Event, EventPayload};

const SOURCE_WIDTH: u32 = 320;
const SOURCE_HEIGHT: u32 = 240;
const READY_POLL: Duration = Duration::from_millis(50);
const READY_TIMEOUT: Duration = Duration::from_secs(10);
/// Anchor written into the config on first run.
const FIRST_RUN_ANCHOR: [f32; 3] = [0.0, 0.5, 0.0];

fn main() {
    let _telemetry = lenslink_runtime::init_tracing("lenslink");

    print_banner();

    let cfg = load_or_create_config();
    if let Err(e) = cfg.validate() {
        println!("{}: {}", "Invalid configuration".red().bold(), e);
        std::process::exit(2);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            println!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(run(cfg)) {
        println!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cfg: ClientConfig) -> Result<(), lenslink_types::LinkError> {
    let shutdown = Arc::new(Notify::new());
    let on_ctrlc = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – disconnecting …".yellow().bold());
        on_ctrlc.notify_one();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; use SIGKILL to stop");
    }

    let client = StreamingClient::new(
        cfg,
        Box::new(TestPatternSource::new("test-pattern", SOURCE_WIDTH, SOURCE_HEIGHT)),
        Arc::new(WsChannelFactory),
    )?;

    let mut lifecycle = client.bus().subscribe_to(Topic::Lifecycle);
    let mut poses = client.bus().subscribe_to(Topic::Pose);
    let reporter = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                Some(e) = lifecycle.next() => e,
                Some(e) = poses.next() => e,
                else => break,
            };
            if let Some(line) = describe(&event) {
                println!("{line}");
            }
        }
    });

    println!(
        "  Streaming {}x{} test pattern to {} at {} Hz ({:?})",
        SOURCE_WIDTH,
        SOURCE_HEIGHT,
        client.config().endpoint.bold(),
        client.config().capture_hz,
        client.config().payload,
    );
    println!("  Position {}\n", describe_anchor(client.config().anchor));
    client.start_when_ready(READY_POLL, READY_TIMEOUT).await?;

    shutdown.notified().await;
    client.stop().await;
    reporter.abort();

    let pose = client.sink().snapshot();
    println!(
        "{}",
        format!(
            "  ✓ Disconnected after {} pose update(s); last position {:?}",
            pose.revision,
            pose.position().to_array()
        )
        .green()
    );
    Ok(())
}

/// One console line per interesting event.
fn describe(event: &Event) -> Option<String> {
    match &event.payload {
        EventPayload::StateChanged { to, .. } => Some(format!("  connection {}", to.to_string().bold())),
        EventPayload::ChannelError(message) => Some(format!("  {} {}", "channel error:".red(), message)),
        EventPayload::PoseApplied { position, rotation_rad } => Some(format!(
            "  pose  T {:.3} {:.3} {:.3}  R {:.3} {:.3} {:.3}",
            position[0], position[1], position[2], rotation_rad[0], rotation_rad[1], rotation_rad[2]
        )),
        EventPayload::FrameSent { .. } => None,
    }
}

fn describe_anchor(anchor: Option<[f32; 3]>) -> String {
    match anchor {
        Some([x, y, z]) => format!("pinned at ({x}, {y}, {z}); only rotation is tracked"),
        None => "tracked from pose messages".to_string(),
    }
}

fn first_run_config() -> ClientConfig {
    ClientConfig { anchor: Some(FIRST_RUN_ANCHOR), ..Default::default() }
}

fn load_or_create_config() -> ClientConfig {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = first_run_config();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = ClientConfig::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   __                  __ _       __  "#.bold().cyan());
    println!("{}", r#"  / /  ___ ___  ___   / /(_)___  / /__"#.bold().cyan());
    println!("{}", r#" / /__/ -_) _ \(_-<  / // // _ \/  '_/"#.bold().cyan());
    println!("{}", r#"/____/\__/_//_/___/ /_//_//_//_/_/\_\ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "lenslink".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Real-time frame streaming with pose feedback");
    println!();
}
