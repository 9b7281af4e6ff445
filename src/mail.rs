use std::{
    fmt,
    io::{self, Write},
    process::{ChildStdin, Command, Stdio},
};

use lettre::{
    SmtpTransport, Transport,
    message::{Mailbox, header::ContentType},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
};
use serde::Deserialize;

use crate::{Error, Result, command};

pub const MAIL_PROGRAM: &str = "mail";

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub from: String,
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
}

/// How a [`SendMail`] leaves the machine.
#[derive(Debug, Clone)]
pub enum Mailer {
    /// A `mail`-compatible program, run as `program -s <subject> <address>`
    /// with the body on stdin.
    Command { program: String },
    Smtp(SmtpConfig),
}

impl Default for Mailer {
    fn default() -> Self {
        Mailer::Command {
            program: MAIL_PROGRAM.to_owned(),
        }
    }
}

/// A quick plain-text mail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendMail {
    address: String,
    subject: String,
    body: String,
}

impl SendMail {
    pub fn new(address: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            subject: subject.into(),
            body: String::new(),
        }
    }

    pub fn set_address(&mut self, address: impl Into<String>) {
        self.address = address.into();
    }

    pub fn set_subject(&mut self, subject: impl Into<String>) {
        self.subject = subject.into();
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Send once through the system `mail` command.
    pub fn send(&self) -> Result<()> {
        self.send_via(&Mailer::default())
    }

    pub fn send_via(&self, mailer: &Mailer) -> Result<()> {
        match mailer {
            Mailer::Command { program } => self.send_command(program),
            Mailer::Smtp(config) => self.send_smtp(config),
        }
    }

    fn send_command(&self, program: &str) -> Result<()> {
        // A leading dash would be read as an option by the mail program.
        if self.address.is_empty() || self.address.starts_with('-') {
            return Err(Error::InvalidAddress(self.address.clone()));
        }

        let mut mail = Command::new(program);
        mail.arg("-s")
            .arg(&self.subject)
            .arg(&self.address)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let description = command::describe(&mail);
        log::debug!("mail.cmd={description}");

        let mut child = mail.spawn().map_err(|source| Error::Spawn {
            command: description.clone(),
            source,
        })?;
        let written = match child.stdin.take() {
            Some(stdin) => self.write_body(stdin),
            None => Ok(()),
        };
        let output = child.wait_with_output()?;
        match written {
            // the exit status below says why the program stopped reading
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                log::debug!("mail program closed its input early ; {err}");
            }
            other => other?,
        }

        if !output.status.success() {
            log::debug!("send mail failed ; {}", output.status);
        }
        command::finish(&description, output).map(|_| ())
    }

    fn write_body(&self, mut stdin: ChildStdin) -> io::Result<()> {
        stdin.write_all(self.body.as_bytes())?;
        if !self.body.ends_with('\n') {
            stdin.write_all(b"\n")?;
        }
        Ok(())
    }

    fn send_smtp(&self, config: &SmtpConfig) -> Result<()> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|_| Error::InvalidAddress(config.from.clone()))?;
        let to: Mailbox = self
            .address
            .parse()
            .map_err(|_| Error::InvalidAddress(self.address.clone()))?;

        let email = lettre::Message::builder()
            .header(ContentType::TEXT_PLAIN)
            .from(from)
            .to(to)
            .subject(self.subject.clone())
            .body(self.body.clone())?;

        let mut builder = SmtpTransport::relay(&config.host)?.credentials(Credentials::new(
            config.username.clone(),
            config.password.clone(),
        ));
        if let Some(port) = config.port {
            builder = builder
                .port(port)
                .tls(Tls::Required(TlsParameters::new(config.host.clone())?));
        }

        log::debug!("sending {self} via smtp {}", config.host);
        if let Err(err) = builder.build().send(&email) {
            log::debug!("send mail failed ; {err}");
            return Err(err.into());
        }
        Ok(())
    }
}

impl fmt::Display for SendMail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SendMail: subject: {}; address: {}",
            self.subject, self.address
        )
    }
}
