use std::{path::PathBuf, process::ExitStatus};

use thiserror::Error;

use crate::{gps::NmeaError, stun::StunError};

#[derive(Error, Debug)]
pub enum Error {
    #[error("could not launch \"{command}\": {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran but reported failure. `output` is what it printed.
    #[error("command \"{command}\" failed ({status})")]
    CommandFailed {
        command: String,
        status: ExitStatus,
        output: String,
    },

    #[error("no IPv4 address found for interface {0}")]
    NoAddress(String),

    #[error("invalid mail address \"{0}\"")]
    InvalidAddress(String),

    #[error("could not build mail: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("smtp: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("could not read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("nmea: {0}")]
    Nmea(#[from] NmeaError),

    #[error("stun: {0}")]
    Stun(#[from] StunError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
