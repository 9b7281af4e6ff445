//! Print the current GPS position as `lat,lon`, e.g. for
//! `https://www.google.com/maps?q=$(gps-echo)`.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use toolbelt::{args::BaseArgs, config::Config, gps, logger};

#[derive(Parser, Debug)]
#[command(version, about = "Read a position fix from a serial GPS receiver", long_about = None)]
struct Args {
    #[command(flatten)]
    base: BaseArgs,

    /// Serial device the receiver is attached to.
    #[arg(short, long)]
    device: Option<String>,

    /// Line speed of the serial device.
    #[arg(short, long)]
    baud: Option<u32>,

    /// Give up after this many seconds without a fix (default: wait forever).
    #[arg(short, long, value_name = "SECS")]
    timeout: Option<u64>,
}

fn main() -> Result<()> {
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));

    let args = Args::parse();
    logger::init(None, args.base.log_level);
    let config = Config::load(args.base.config.as_deref()).context("Could not load config")?;

    let device = args.device.unwrap_or(config.gps.device);
    let baud = args.baud.unwrap_or(config.gps.baud);
    let deadline = args
        .timeout
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    let fix = gps::open_serial(&device, baud)
        .map_err(anyhow::Error::from)
        .and_then(|mut stream| stream.next_fix(deadline).map_err(anyhow::Error::from));
    match fix {
        Ok(Some(fix)) => {
            println!("{fix}");
            Ok(())
        }
        Ok(None) => {
            log::error!("No GPS fix from {device} before the timeout");
            std::process::exit(1);
        }
        Err(err) => {
            log::debug!("{err:#}");
            println!("ERROR: failed reading gps serial device at: {device}");
            std::process::exit(1);
        }
    }
}
