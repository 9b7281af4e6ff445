//! Connectivity probing and interface address lookup.

use std::{
    net::{Ipv4Addr, TcpStream, ToSocketAddrs},
    process::{Command, Stdio},
    time::Duration,
};

use serde::Deserialize;

use crate::{
    Error, Result, command,
    logger::{self, LogLevel},
};

pub const PING_HOST: &str = "8.8.8.8";
pub const PING_INTERVAL: Duration = Duration::from_secs(10);
pub const PING_ATTEMPTS: u32 = 3;
pub const PING_COUNT: u32 = 3;

/// One reachability test against a host. `Err` carries the reason, for the
/// debug log.
pub trait Probe {
    fn probe(&mut self, host: &str, timeout: Duration) -> std::result::Result<(), String>;
}

/// Runs the system `ping` binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct PingProbe;

impl Probe for PingProbe {
    fn probe(&mut self, host: &str, timeout: Duration) -> std::result::Result<(), String> {
        let mut ping = Command::new("ping");
        let count = PING_COUNT.to_string();
        ping.args(["-c", count.as_str(), "-q"]);
        if !timeout.is_zero() {
            // iputils fails the run if fewer than `-c` replies arrive by the deadline
            let seconds = timeout.as_secs().max(u64::from(PING_COUNT)).to_string();
            #[cfg(target_os = "macos")]
            ping.args(["-t", seconds.as_str()]);
            #[cfg(not(target_os = "macos"))]
            ping.args(["-w", seconds.as_str()]);
        }
        ping.arg(host)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match ping.status() {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(format!("errorcode={}", status.code().unwrap_or(-1))),
            Err(err) => Err(format!("could not run ping: {err}")),
        }
    }
}

/// Native probe: a TCP connect to `host:port`, no external binary, no root.
#[derive(Debug, Clone, Copy)]
pub struct TcpProbe {
    pub port: u16,
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self { port: 53 }
    }
}

impl Probe for TcpProbe {
    fn probe(&mut self, host: &str, timeout: Duration) -> std::result::Result<(), String> {
        let timeout = if timeout.is_zero() {
            Duration::from_secs(1)
        } else {
            timeout
        };
        let addrs = (host, self.port)
            .to_socket_addrs()
            .map_err(|err| format!("could not resolve {host}: {err}"))?;

        let mut last_error = format!("{host} did not resolve to any address");
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(_) => return Ok(()),
                Err(err) => last_error = format!("{addr}: {err}"),
            }
        }
        Err(last_error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    #[default]
    Ping,
    Tcp,
}

#[derive(Debug, Clone)]
pub struct Connectivity {
    pub host: String,
    pub interval: Duration,
    pub attempts: u32,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self {
            host: PING_HOST.to_owned(),
            interval: PING_INTERVAL,
            attempts: PING_ATTEMPTS,
        }
    }
}

impl Connectivity {
    /// True as soon as one attempt succeeds. Failed attempts are logged at
    /// debug level and followed by a pause of `interval` before the next one.
    pub fn check_with(&self, probe: &mut impl Probe) -> bool {
        for attempt in 1..=self.attempts {
            match probe.probe(&self.host, self.interval) {
                Ok(()) => return true,
                Err(reason) => logger::logger().write(
                    LogLevel::Debug,
                    format_args!("no response from {} ; {reason}", self.host),
                ),
            }
            if attempt < self.attempts && !self.interval.is_zero() {
                std::thread::sleep(self.interval);
            }
        }
        false
    }

    pub fn check(&self, kind: ProbeKind, tcp_port: u16) -> bool {
        match kind {
            ProbeKind::Ping => self.check_with(&mut PingProbe),
            ProbeKind::Tcp => self.check_with(&mut TcpProbe { port: tcp_port }),
        }
    }
}

/// Ping `host` up to `attempts` times, `interval` apart.
pub fn check_connectivity(host: &str, interval: Duration, attempts: u32) -> bool {
    Connectivity {
        host: host.to_owned(),
        interval,
        attempts,
    }
    .check_with(&mut PingProbe)
}

pub fn check_connectivity_with(probe: &mut impl Probe, settings: &Connectivity) -> bool {
    settings.check_with(probe)
}

/// IPv4 address of a network interface, as reported by `ifconfig` (or by
/// `ip` where `ifconfig` is not installed).
pub fn local_ip(interface: &str) -> Result<String> {
    let output = match command::run_command("ifconfig", [interface]) {
        Err(Error::Spawn { .. }) => command::run_command("ip", ["-4", "addr", "show", interface])?,
        other => other?,
    };

    parse_inet(&output)
        .map(|addr| addr.to_string())
        .ok_or_else(|| Error::NoAddress(interface.to_owned()))
}

/// First `inet` IPv4 address in interface-query output. Understands the
/// BSD/macOS (`inet 10.0.0.2`), old net-tools (`inet addr:10.0.0.2`) and
/// iproute2 (`inet 10.0.0.2/24`) shapes.
pub fn parse_inet(output: &str) -> Option<Ipv4Addr> {
    output.lines().find_map(|line| {
        let mut words = line.split_whitespace();
        words.find(|word| *word == "inet")?;
        let value = words.next()?;
        let value = value.strip_prefix("addr:").unwrap_or(value);
        let value = value.split('/').next()?;
        value.parse().ok()
    })
}
