//! Process logger: stdout always, plus an optional log file.
//!
//! Lines look like `[05/16/2023 14:02:11] [INFO] message`. The logger is the
//! backend of the `log` facade, so library code just uses `log::info!` and
//! friends. CRITICAL has no `log` level of its own; it travels as an error
//! record with target [`CRITICAL_TARGET`] (see [`critical!`](crate::critical)).

use std::{
    fmt,
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use env_logger::{Target, WriteStyle};
use log::{LevelFilter, Log, Metadata, Record};
use once_cell::sync::OnceCell;
use serde::Deserialize;

pub const TIMESTAMP_FORMAT: &str = "%m/%d/%Y %H:%M:%S";
pub const CRITICAL_TARGET: &str = "critical";

static LOGGER: OnceCell<Logger> = OnceCell::new();

/// Log an error record that renders and filters as CRITICAL.
#[macro_export]
macro_rules! critical {
    ($($arg:tt)+) => {
        $crate::__log::error!(target: $crate::logger::CRITICAL_TARGET, $($arg)+)
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    #[value(name = "DEBUG")]
    Debug,
    #[value(name = "INFO")]
    Info,
    #[value(name = "WARNING")]
    Warning,
    #[value(name = "ERROR")]
    Error,
    #[value(name = "CRITICAL")]
    Critical,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warning => LevelFilter::Warn,
            LogLevel::Error | LogLevel::Critical => LevelFilter::Error,
        }
    }

    fn to_log_level(self) -> log::Level {
        match self {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error | LogLevel::Critical => log::Level::Error,
        }
    }

    fn of(metadata: &Metadata) -> Self {
        match metadata.level() {
            log::Level::Error if metadata.target() == CRITICAL_TARGET => LogLevel::Critical,
            log::Level::Error => LogLevel::Error,
            log::Level::Warn => LogLevel::Warning,
            log::Level::Info => LogLevel::Info,
            log::Level::Debug | log::Level::Trace => LogLevel::Debug,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Logger {
    level: LogLevel,
    file: Option<PathBuf>,
    sinks: Vec<env_logger::Logger>,
}

impl Logger {
    /// An empty `file` path counts as no file.
    pub fn new(file: Option<&Path>, level: LogLevel) -> Self {
        let file = file
            .filter(|path| !path.as_os_str().is_empty())
            .map(Path::to_path_buf);

        let mut sinks = vec![sink(Target::Stdout)];
        if let Some(path) = &file {
            sinks.push(sink(Target::Pipe(Box::new(LazyFile::new(path.clone())))));
        }

        Self { level, file, sinks }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn write(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        let target = match level {
            LogLevel::Critical => CRITICAL_TARGET,
            _ => module_path!(),
        };
        self.log(
            &Record::builder()
                .level(level.to_log_level())
                .target(target)
                .args(args)
                .build(),
        );
    }

    pub fn debug(&self, message: &str) {
        self.write(LogLevel::Debug, format_args!("{message}"));
    }

    pub fn info(&self, message: &str) {
        self.write(LogLevel::Info, format_args!("{message}"));
    }

    pub fn warning(&self, message: &str) {
        self.write(LogLevel::Warning, format_args!("{message}"));
    }

    pub fn error(&self, message: &str) {
        self.write(LogLevel::Error, format_args!("{message}"));
    }

    pub fn critical(&self, message: &str) {
        self.write(LogLevel::Critical, format_args!("{message}"));
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        LogLevel::of(metadata) >= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        for sink in &self.sinks {
            sink.log(record);
        }
    }

    fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }
}

/// Create the process logger and install it behind the `log` facade.
///
/// Only the first call has any effect: later calls return the same logger
/// and their arguments are ignored, including the choice of log file.
pub fn init(file: Option<&Path>, level: LogLevel) -> &'static Logger {
    let mut created = false;
    let logger = LOGGER.get_or_init(|| {
        created = true;
        Logger::new(file, level)
    });
    if created && log::set_logger(logger).is_ok() {
        log::set_max_level(logger.level.to_level_filter());
    }
    logger
}

/// The process logger, creating a stdout-only INFO logger if none exists yet.
pub fn logger() -> &'static Logger {
    match LOGGER.get() {
        Some(logger) => logger,
        None => init(None, LogLevel::Info),
    }
}

fn sink(target: Target) -> env_logger::Logger {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Trace)
        .write_style(WriteStyle::Never)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                chrono::Local::now().format(TIMESTAMP_FORMAT),
                LogLevel::of(record.metadata()),
                record.args()
            )
        })
        .target(target)
        .build()
}

/// Truncates and opens the file on the first write, so a logger that never
/// emits anything leaves no file behind.
struct LazyFile {
    path: PathBuf,
    file: Option<File>,
}

impl LazyFile {
    fn new(path: PathBuf) -> Self {
        Self { path, file: None }
    }
}

impl Write for LazyFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = match self.file.take() {
            Some(file) => file,
            None => File::create(&self.path)?,
        };
        let written = file.write(buf);
        self.file = Some(file);
        written
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}
