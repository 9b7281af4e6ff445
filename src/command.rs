//! Running external programs and collecting what they print.
//!
//! [`run_piped_command`] hands a whole command line to `sh -c`, so pipes
//! work, and so does anything else the shell does with untrusted input.
//! Quote accordingly. Everything else in the crate goes through
//! [`run_command`], which passes arguments as an array and never involves
//! a shell.

use std::{
    ffi::OsStr,
    process::{Command, Output},
};

use crate::{
    Error, Result,
    logger::{self, LogLevel},
};

pub const SHELL: &str = "/bin/sh";

/// Run `command_line` through the shell and return its trimmed output.
pub fn run_piped_command(command_line: &str) -> Result<String> {
    let output = Command::new(SHELL)
        .arg("-c")
        .arg(command_line)
        .output()
        .map_err(|source| Error::Spawn {
            command: command_line.to_owned(),
            source,
        })?;

    finish(command_line, output).inspect_err(|_| {
        logger::logger().write(
            LogLevel::Error,
            format_args!("pipe command \"{command_line}\" failed"),
        );
    })
}

/// Run `program` with `args` (no shell) and return its trimmed output.
pub fn run_command<I, S>(program: &str, args: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command.args(args);
    let description = describe(&command);

    let output = command.output().map_err(|source| Error::Spawn {
        command: description.clone(),
        source,
    })?;

    finish(&description, output).inspect_err(|err| {
        logger::logger().write(LogLevel::Error, format_args!("{err}"));
    })
}

pub(crate) fn describe(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stdout followed by stderr, trimmed. Non-zero exit becomes an error.
pub(crate) fn finish(command: &str, output: Output) -> Result<String> {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    let text = text.trim().to_owned();

    if !output.status.success() {
        return Err(Error::CommandFailed {
            command: command.to_owned(),
            status: output.status,
            output: text,
        });
    }
    Ok(text)
}
