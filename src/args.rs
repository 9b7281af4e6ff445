use std::path::PathBuf;

use clap::{ArgMatches, Args, Command, FromArgMatches};
use once_cell::sync::OnceCell;

use crate::{logger::LogLevel, script};

static ARG_PARSER: OnceCell<Command> = OnceCell::new();

// Options every script understands. Not a doc comment: clap would take it as
// the parser's `about`.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct BaseArgs {
    /// Directly maps to logger levels.
    #[arg(
        short = 'l',
        long = "log",
        value_enum,
        value_name = "LEVEL",
        default_value_t = LogLevel::Info
    )]
    pub log_level: LogLevel,

    /// Email address to send mail.
    #[arg(short, long)]
    pub email: Option<String>,

    /// Path to a TOML config file.
    #[arg(short, long, value_name = "PATH", env = "TOOLBELT_CONFIG")]
    pub config: Option<PathBuf>,
}

impl BaseArgs {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, clap::Error> {
        Self::from_arg_matches(matches)
    }
}

/// A fresh parser carrying the base options. The program name defaults to
/// the running executable's file name.
pub fn base_command(description: Option<&str>, name: Option<&str>) -> Command {
    let name = match name {
        Some(name) => name.to_owned(),
        None => script::my_name(script::current_script()),
    };
    let command = BaseArgs::augment_args(Command::new(name));
    match description {
        Some(description) => command.about(description.to_owned()),
        None => command,
    }
}

/// The process-wide base parser.
///
/// Built on the first call; every later call returns the same instance and
/// ignores its arguments. Extend a clone of it rather than the shared one.
pub fn arg_parser(description: Option<&str>, name: Option<&str>) -> &'static Command {
    ARG_PARSER.get_or_init(|| base_command(description, name))
}
