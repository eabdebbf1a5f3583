use automower_ble::{ConnectionParams, Mower, MowerError, Result, SessionConfig};
use clap::Parser;
use std::time::Duration;
use tracing::{error, info};

/// Connect to a mower, print its status and optionally send one action
#[derive(Debug, Parser)]
struct Args {
    /// Mower Bluetooth address
    #[arg(long, env = "AUTOMOWER_ADDRESS")]
    address: String,

    /// PIN code for authenticated commands
    #[arg(long, env = "AUTOMOWER_PIN")]
    pin: Option<u16>,

    /// Send the mower home
    #[arg(long, conflicts_with_all = ["pause", "resume", "override_hours"])]
    park: bool,

    /// Pause the mower
    #[arg(long, conflicts_with_all = ["resume", "override_hours"])]
    pause: bool,

    /// Resume after a pause
    #[arg(long, conflicts_with = "override_hours")]
    resume: bool,

    /// Mow in manual mode for this many hours
    #[arg(long = "override", value_name = "HOURS")]
    override_hours: Option<u64>,
}

fn override_duration(hours: u64) -> Result<Duration> {
    hours
        .checked_mul(60 * 60)
        .map(Duration::from_secs)
        .ok_or_else(|| MowerError::Encoding(format!("Override of {hours} hours is too long")))
}

async fn print_status(mower: &Mower) -> Result<()> {
    println!("Model:      {}", mower.get_model().await?);
    println!("Name:       {}", mower.mower_name().await?);
    println!("Battery:    {}%", mower.battery_level().await?);
    println!("Charging:   {}", mower.is_charging().await?);
    println!("Mode:       {}", mower.mode_of_operation().await?);
    println!("State:      {}", mower.mower_state().await?);
    println!("Activity:   {}", mower.mower_activity().await?);
    println!("Restricted: {}", mower.restriction_reason().await?);
    Ok(())
}

async fn run(mower: &Mower, args: &Args) -> Result<()> {
    print_status(mower).await?;

    if args.park {
        mower.park().await?;
    } else if args.pause {
        mower.pause().await?;
    } else if args.resume {
        mower.resume().await?;
    } else if let Some(hours) = args.override_hours {
        mower.override_mow(override_duration(hours)?).await?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = SessionConfig {
        pin: args.pin,
        ..SessionConfig::default()
    };

    info!("Connecting to {}", args.address);
    let mower =
        Mower::connect_address(&args.address, &ConnectionParams::default(), config).await?;

    let outcome = run(&mower, &args).await;
    if let Err(MowerError::DeviceResult { code }) = &outcome {
        error!("Mower refused the command: {}", code);
    }

    mower.disconnect().await?;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_duration() {
        assert_eq!(override_duration(3).unwrap(), Duration::from_secs(10_800));
        assert!(matches!(
            override_duration(u64::MAX),
            Err(MowerError::Encoding(_))
        ));
    }
}
