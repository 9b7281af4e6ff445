//! Discover the public IP address and port this host is seen as.

use anyhow::{Context, Result};
use clap::Parser;
use toolbelt::{args::BaseArgs, config::Config, logger, stun};

#[derive(Parser, Debug)]
#[command(version, about = "Query a STUN server for the public address of this host", long_about = None)]
struct Args {
    #[command(flatten)]
    base: BaseArgs,

    /// STUN server as HOST:PORT.
    #[arg(short, long)]
    server: Option<String>,

    /// Skip the second server used to tell cone from symmetric NAT.
    #[arg(long)]
    single: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));

    let args = Args::parse();
    logger::init(None, args.base.log_level);
    let mut config = Config::load(args.base.config.as_deref())
        .context("Could not load config")?
        .stun;
    if let Some(server) = args.server {
        config.server = server;
    }
    if args.single {
        config.secondary = None;
    }

    let report = stun::discover(&config)
        .await
        .with_context(|| format!("STUN query to {} failed", config.server))?;
    println!("{report}");
    Ok(())
}
