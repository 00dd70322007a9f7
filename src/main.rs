//! camscout — discover video cameras on the local network

use clap::{Parser, Subcommand};

use camscout::config::{AppConfig, DEFAULT_CONFIG_PATH};
use camscout::{logging, net, CancelToken, Detector};

#[derive(Parser)]
#[command(
    name = "camscout",
    version,
    about = "Scans the local network for video cameras and classifies their streaming protocols (RTSP, RTMP, HLS, MPEG-DASH, MJPEG, WebRTC, ONVIF, UPnP)"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "")]
    config: String,

    /// Verbose output (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default configuration to configs/config.yaml
    Init,
    /// Scan the network for video cameras
    Scan,
    /// Show the application version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Init => {
            AppConfig::write_default_file(DEFAULT_CONFIG_PATH)?;
            println!("Configuration file created: {DEFAULT_CONFIG_PATH}");
            Ok(())
        }
        Command::Version => {
            println!("camscout v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Scan => run_scan(&cli.config, cli.verbose).await,
    }
}

async fn run_scan(config_path: &str, verbose: bool) -> anyhow::Result<()> {
    let config = AppConfig::load(config_path)?;
    logging::init(&config.log, verbose)?;

    tracing::info!("camscout v{} started", env!("CARGO_PKG_VERSION"));
    net::log_interfaces();

    let subnet = if !config.scan.subnet.is_empty() {
        config.scan.subnet.clone()
    } else if config.network.auto_detect_subnet {
        let detected = net::auto_detect_subnet(&config.network.interface)?;
        tracing::info!(subnet = %detected, "Auto-detected subnet");
        detected
    } else {
        anyhow::bail!("subnet not specified and auto-detection is disabled");
    };

    let cancel = CancelToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing with partial results");
            ctrl_c_token.cancel();
        }
    });

    let detector = Detector::new(config.scan.clone(), config.rtsp.clone());
    let devices = detector.scan(&subnet, cancel).await?;

    tracing::info!("Scan completed. Found {} device(s)", devices.len());
    for (index, device) in devices.iter().enumerate() {
        println!("\nDevice {}:", index + 1);
        println!("  IP: {}", device.ip);
        if !device.hostname.is_empty() {
            println!("  Hostname: {}", device.hostname);
        }
        if !device.manufacturer.is_empty() {
            println!("  Manufacturer: {}", device.manufacturer);
        }
        if !device.model.is_empty() {
            println!("  Model: {}", device.model);
        }
        if !device.protocols.is_empty() {
            println!("  Protocols:");
            for protocol in &device.protocols {
                println!(
                    "    - {} (port {}): {}",
                    protocol.kind, protocol.port, protocol.url
                );
            }
        }
        if !device.rtsp_streams.is_empty() {
            println!("  RTSP streams:");
            for stream in &device.rtsp_streams {
                let mut details = Vec::new();
                if !stream.codec.is_empty() {
                    details.push(stream.codec.clone());
                }
                if !stream.resolution.is_empty() {
                    details.push(stream.resolution.clone());
                }
                if stream.fps > 0.0 {
                    details.push(format!("{:.1} fps", stream.fps));
                }
                if details.is_empty() {
                    println!("    - {}", stream.url);
                } else {
                    println!("    - {} ({})", stream.url, details.join(", "));
                }
            }
        }
    }

    Ok(())
}
