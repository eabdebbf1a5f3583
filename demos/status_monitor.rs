use automower_ble::{ConnectionParams, Mower, Result, SessionConfig};
use clap::Parser;
use std::time::Duration;
use tokio::time::{interval, Instant};
use tracing::{error, info, warn};

/// Poll a mower's status until Ctrl+C
#[derive(Debug, Parser)]
struct Args {
    /// Mower Bluetooth address
    #[arg(long, env = "AUTOMOWER_ADDRESS")]
    address: String,

    /// PIN code
    #[arg(long, env = "AUTOMOWER_PIN")]
    pin: Option<u16>,

    /// Seconds between polls
    #[arg(long, default_value_t = 30)]
    interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = SessionConfig {
        pin: args.pin,
        ..SessionConfig::default()
    };

    let mower =
        match Mower::connect_address(&args.address, &ConnectionParams::default(), config).await {
            Ok(mower) => mower,
            Err(e) => {
                error!("Failed to connect to {}: {}", args.address, e);
                return Err(e);
            }
        };

    info!("Connected to {}", mower.get_model().await?);
    info!("Press Ctrl+C to stop monitoring");

    let mut poll = interval(Duration::from_secs(args.interval));
    let start_time = Instant::now();

    loop {
        tokio::select! {
            _ = poll.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        if !mower.is_connected().await {
            warn!("Session lost, stopping");
            break;
        }

        let elapsed = start_time.elapsed().as_secs();
        let battery = mower.battery_level().await;
        let state = mower.mower_state().await;
        let activity = mower.mower_activity().await;

        match (battery, state, activity) {
            (Ok(battery), Ok(state), Ok(activity)) => {
                let next = mower
                    .next_start_time()
                    .await
                    .ok()
                    .flatten()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map_or_else(|| "-".to_string(), |d| d.as_secs().to_string());
                println!(
                    "[{:02}:{:02}] battery {:3}%  state {:<16} activity {:<16} next start {}",
                    elapsed / 60,
                    elapsed % 60,
                    battery,
                    state.to_string(),
                    activity.to_string(),
                    next
                );
            }
            (battery, state, activity) => {
                for e in [battery.err(), state.err(), activity.err()].into_iter().flatten() {
                    warn!("Status query failed: {}", e);
                }
            }
        }
    }

    mower.disconnect().await?;
    info!("Monitoring stopped");
    Ok(())
}
