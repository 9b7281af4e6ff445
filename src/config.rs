use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::{
    Error, Result,
    mail::{MAIL_PROGRAM, Mailer, SmtpConfig},
    net::{self, Connectivity, ProbeKind},
    script, stun,
};

pub const CONFIG_FILE: &str = "toolbelt.toml";

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub connectivity: ConnectivityConfig,
    pub mail: MailConfig,
    pub gps: GpsConfig,
    pub stun: StunConfig,
}

impl Config {
    /// An explicit `path` must exist. Without one, [`CONFIG_FILE`] in the
    /// working directory is read if present, otherwise defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let text = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
            path: path.clone(),
            source,
        })?;
        let config = Self::parse(&text).map_err(|source| Error::ConfigParse {
            path: path.clone(),
            source,
        })?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::de::from_str(text)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub to_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(script::TMP_DIR),
            to_file: true,
        }
    }
}

impl LoggingConfig {
    pub fn log_file(&self, script_path: impl AsRef<Path>) -> Option<PathBuf> {
        self.to_file
            .then(|| script::log_filename_in(&self.dir, script_path))
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ConnectivityConfig {
    pub host: String,
    pub interval_secs: u64,
    pub attempts: u32,
    pub probe: ProbeKind,
    pub tcp_port: u16,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            host: net::PING_HOST.to_owned(),
            interval_secs: net::PING_INTERVAL.as_secs(),
            attempts: net::PING_ATTEMPTS,
            probe: ProbeKind::Ping,
            tcp_port: 53,
        }
    }
}

impl ConnectivityConfig {
    pub fn settings(&self) -> Connectivity {
        Connectivity {
            host: self.host.clone(),
            interval: Duration::from_secs(self.interval_secs),
            attempts: self.attempts,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MailConfig {
    pub program: String,
    pub smtp: Option<SmtpConfig>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            program: MAIL_PROGRAM.to_owned(),
            smtp: None,
        }
    }
}

impl MailConfig {
    /// SMTP when configured, the mail program otherwise.
    pub fn mailer(&self) -> Mailer {
        match &self.smtp {
            Some(smtp) => Mailer::Smtp(smtp.clone()),
            None => Mailer::Command {
                program: self.program.clone(),
            },
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GpsConfig {
    pub device: String,
    pub baud: u32,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyAMA0".to_owned(),
            baud: 9600,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StunConfig {
    pub server: String,
    pub secondary: Option<String>,
    pub timeout_ms: u64,
    pub retries: u32,
}

impl Default for StunConfig {
    fn default() -> Self {
        Self {
            server: stun::DEFAULT_SERVER.to_owned(),
            secondary: Some(stun::SECONDARY_SERVER.to_owned()),
            timeout_ms: 500,
            retries: 3,
        }
    }
}

impl StunConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
