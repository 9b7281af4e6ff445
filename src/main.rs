use std::{io::Read, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{FromArgMatches, Subcommand};
use toolbelt::{
    args::{self, BaseArgs},
    command,
    config::Config,
    logger,
    mail::SendMail,
    net::{self, ProbeKind},
    privilege, script,
};

const DESCRIPTION: &str = "Everyday helpers for scripts: connectivity, addresses, mail, root checks";

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check internet connectivity.
    Check {
        /// Host to probe (default from config, 8.8.8.8).
        #[arg(long)]
        host: Option<String>,
        /// Seconds to wait between attempts.
        #[arg(long)]
        interval: Option<u64>,
        /// Number of attempts.
        #[arg(long)]
        attempts: Option<u32>,
        /// Probe with a TCP connect instead of ping.
        #[arg(long)]
        tcp: bool,
    },
    /// Print the IPv4 address of a network interface.
    Ip { interface: String },
    /// Send a mail; the body is read from stdin.
    Mail {
        #[arg(short, long)]
        subject: String,
        /// Recipient; defaults to --email.
        #[arg(long)]
        to: Option<String>,
    },
    /// Exit with an error unless running as root.
    RequireRoot,
    /// Print the file name of a script path.
    Name { path: PathBuf },
    /// Print the log file a script at PATH would use.
    LogFile { path: PathBuf },
    /// Run a shell command line and print its output.
    Run { command_line: String },
}

fn main() -> Result<()> {
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));

    let name = script::my_name(script::current_script());
    let parser = Commands::augment_subcommands(
        args::arg_parser(Some(DESCRIPTION), Some(&name))
            .clone()
            .version(env!("CARGO_PKG_VERSION"))
            .subcommand_required(true),
    );
    let matches = parser.get_matches();
    let base = BaseArgs::from_matches(&matches)?;
    let subcommand = Commands::from_arg_matches(&matches)?;

    let config = Config::load(base.config.as_deref()).context("Could not load config")?;
    let log_file = config.logging.log_file(&name);
    logger::init(log_file.as_deref(), base.log_level);
    log::debug!("{name} v{} starting", env!("CARGO_PKG_VERSION"));

    match subcommand {
        Commands::Check {
            host,
            interval,
            attempts,
            tcp,
        } => {
            let mut settings = config.connectivity.settings();
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(interval) = interval {
                settings.interval = Duration::from_secs(interval);
            }
            if let Some(attempts) = attempts {
                settings.attempts = attempts;
            }
            let kind = if tcp {
                ProbeKind::Tcp
            } else {
                config.connectivity.probe
            };

            let connected = settings.check(kind, config.connectivity.tcp_port);
            println!("Connectivity: {connected}");
            if !connected {
                std::process::exit(1);
            }
        }
        Commands::Ip { interface } => {
            let ip = net::local_ip(&interface)
                .with_context(|| format!("Could not get address of {interface}"))?;
            println!("{ip}");
        }
        Commands::Mail { subject, to } => {
            let Some(address) = to.or(base.email) else {
                anyhow::bail!("No recipient: pass --to or --email");
            };
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .context("Could not read mail body from stdin")?;

            let mut mail = SendMail::new(address, subject);
            mail.set_body(body);
            log::debug!("{mail}");
            mail.send_via(&config.mail.mailer())
                .context("Could not send mail")?;
            log::info!("Mail sent to {}", mail.address());
        }
        Commands::RequireRoot => {
            privilege::require_root();
            println!("running as root");
        }
        Commands::Name { path } => println!("{}", script::my_name(path)),
        Commands::LogFile { path } => {
            println!("{}", script::log_filename_in(&config.logging.dir, path).display());
        }
        Commands::Run { command_line } => {
            let output = command::run_piped_command(&command_line)
                .with_context(|| format!("Command failed: {command_line}"))?;
            println!("{output}");
        }
    }

    Ok(())
}
