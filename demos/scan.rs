use automower_ble::{BleManager, ConnectionParams, Result};
use clap::Parser;
use tracing::info;

/// List mowers in range
#[derive(Debug, Parser)]
struct Args {
    /// Scan duration in seconds
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// List every BLE device, not only mowers
    #[arg(long)]
    show_all: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let params = ConnectionParams {
        scan_timeout_ms: args.timeout * 1000,
        ..ConnectionParams::default()
    };

    let manager = BleManager::new().await?;
    info!("Scanning for {} s", args.timeout);

    let devices = if args.show_all {
        manager.scan_all(&params).await?
    } else {
        manager.scan_for_mowers(&params).await?
    };

    if devices.is_empty() {
        println!("No devices found");
        return Ok(());
    }

    println!("{:<20} {:<28} {:>6}  Mower", "Address", "Name", "RSSI");
    for device in devices {
        println!(
            "{:<20} {:<28} {:>6}  {}",
            device.address,
            device.name.as_deref().unwrap_or("-"),
            device
                .rssi
                .map_or_else(|| "-".to_string(), |rssi| rssi.to_string()),
            if device.is_husqvarna { "yes" } else { "no" }
        );
    }

    Ok(())
}
