//! Helpers shared by small command-line scripts: a base argument parser,
//! a stdout/file logger, a connectivity probe, shell and mail wrappers,
//! plus the GPS and STUN probes used by the bundled binaries.

pub mod args;
pub mod command;
pub mod config;
pub mod error;
pub mod gps;
pub mod logger;
pub mod mail;
pub mod net;
pub mod privilege;
pub mod script;
pub mod stun;

pub use error::{Error, Result};

#[doc(hidden)]
pub use log as __log;
