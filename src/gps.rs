//! GPS position from a serial NMEA receiver.
//!
//! Only RMC sentences are used; they carry the fix status, position, UTC
//! time and date in one line:
//!
//! ```text
//! $GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A
//! ```

use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader},
    os::unix::fs::OpenOptionsExt,
    time::Instant,
};

use chrono::{NaiveDate, NaiveTime};
use nix::{
    fcntl::OFlag,
    sys::termios::{self, BaudRate, ControlFlags, SetArg, SpecialCharacterIndices},
};
use thiserror::Error;

use crate::Result;

const RMC_SENTENCES: [&str; 2] = ["GPRMC", "GNRMC"];

/// Read timeout in tenths of a second (VTIME).
const READ_TIMEOUT_DECISECONDS: u8 = 5;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NmeaError {
    #[error("checksum mismatch: sentence says {expected:02X}, computed {actual:02X}")]
    Checksum { expected: u8, actual: u8 },
    #[error("missing or malformed {0} field")]
    Field(&'static str),
    #[error("RMC sentence has only {0} fields")]
    TooShort(usize),
    #[error("unsupported baud rate {0}")]
    UnsupportedBaud(u32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    /// Decimal degrees, south negative.
    pub latitude: f64,
    /// Decimal degrees, west negative.
    pub longitude: f64,
    pub time: Option<NaiveTime>,
    pub date: Option<NaiveDate>,
}

/// `lat,lon`, ready to paste into a map URL.
impl fmt::Display for Fix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// XOR of every byte between `$` and `*`.
pub fn checksum(data: &str) -> u8 {
    data.bytes().fold(0, |acc, byte| acc ^ byte)
}

/// `Ok(None)` for sentences that are not RMC and for RMC sentences without a
/// valid fix (status `V`).
pub fn parse_rmc(sentence: &str) -> std::result::Result<Option<Fix>, NmeaError> {
    let Some(body) = sentence.trim().strip_prefix('$') else {
        return Ok(None);
    };
    let (data, sum) = match body.split_once('*') {
        Some((data, sum)) => (data, Some(sum)),
        None => (body, None),
    };

    let mut fields = data.split(',');
    if !fields.next().is_some_and(|kind| RMC_SENTENCES.contains(&kind)) {
        return Ok(None);
    }

    if let Some(sum) = sum {
        let expected = u8::from_str_radix(sum.trim(), 16).map_err(|_| NmeaError::Field("checksum"))?;
        let actual = checksum(data);
        if expected != actual {
            return Err(NmeaError::Checksum { expected, actual });
        }
    }

    // time, status, lat, N/S, lon, E/W, speed, course, date, ...
    let fields: Vec<&str> = fields.collect();
    if fields.len() < 9 {
        return Err(NmeaError::TooShort(fields.len()));
    }
    if fields[1] != "A" {
        return Ok(None);
    }

    let latitude =
        coordinate(fields[2], fields[3], 2, "N", "S").ok_or(NmeaError::Field("latitude"))?;
    let longitude =
        coordinate(fields[4], fields[5], 3, "E", "W").ok_or(NmeaError::Field("longitude"))?;

    Ok(Some(Fix {
        latitude,
        longitude,
        time: fields[0]
            .split('.')
            .next()
            .and_then(|hms| NaiveTime::parse_from_str(hms, "%H%M%S").ok()),
        date: NaiveDate::parse_from_str(fields[8], "%d%m%y").ok(),
    }))
}

/// `ddmm.mmmm` (or `dddmm.mmmm`) plus hemisphere to signed decimal degrees.
fn coordinate(
    value: &str,
    hemisphere: &str,
    degree_digits: usize,
    positive: &str,
    negative: &str,
) -> Option<f64> {
    let degrees: f64 = value.get(..degree_digits)?.parse().ok()?;
    let minutes: f64 = value.get(degree_digits..)?.parse().ok()?;
    let decimal = degrees + minutes / 60.0;
    match hemisphere {
        h if h == positive => Some(decimal),
        h if h == negative => Some(-decimal),
        _ => None,
    }
}

/// Line reader over an NMEA source.
pub struct NmeaStream<R> {
    reader: R,
    line: Vec<u8>,
    follow: bool,
}

impl<R: BufRead> NmeaStream<R> {
    /// A finite source: end of input ends the stream.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
            follow: false,
        }
    }

    /// A live device: an empty read is a read timeout, not the end.
    pub fn follow(reader: R) -> Self {
        Self {
            follow: true,
            ..Self::new(reader)
        }
    }

    /// The next valid fix. `None` once `deadline` has passed or a finite
    /// source is exhausted. Garbled sentences are logged and skipped.
    pub fn next_fix(&mut self, deadline: Option<Instant>) -> io::Result<Option<Fix>> {
        loop {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Ok(None);
            }

            let read = self.reader.read_until(b'\n', &mut self.line)?;
            if self.follow && (read == 0 || !self.line.ends_with(b"\n")) {
                continue;
            }
            if read == 0 && self.line.is_empty() {
                return Ok(None);
            }

            let line = String::from_utf8_lossy(&self.line).into_owned();
            self.line.clear();
            match parse_rmc(&line) {
                Ok(Some(fix)) => return Ok(Some(fix)),
                Ok(None) => {}
                Err(err) => log::warn!("skipping sentence {:?}: {err}", line.trim()),
            }
        }
    }
}

/// Open a serial GPS receiver: raw 8N1 at `baud`, reads time out after
/// half a second so deadlines are honoured.
pub fn open_serial(device: &str, baud: u32) -> Result<NmeaStream<BufReader<File>>> {
    let file = OpenOptions::new()
        .read(true)
        .custom_flags(OFlag::O_NOCTTY.bits())
        .open(device)?;
    configure_termios(&file, baud)?;
    log::debug!("opened {device} at {baud} baud");
    Ok(NmeaStream::follow(BufReader::new(file)))
}

fn configure_termios(file: &File, baud: u32) -> Result<()> {
    let rate = baud_rate(baud).ok_or(NmeaError::UnsupportedBaud(baud))?;

    let mut tio = termios::tcgetattr(file).map_err(io::Error::from)?;
    termios::cfmakeraw(&mut tio);
    termios::cfsetispeed(&mut tio, rate).map_err(io::Error::from)?;
    termios::cfsetospeed(&mut tio, rate).map_err(io::Error::from)?;

    tio.control_flags |= ControlFlags::CLOCAL | ControlFlags::CREAD;
    tio.control_flags &= !ControlFlags::CRTSCTS;

    tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    tio.control_chars[SpecialCharacterIndices::VTIME as usize] = READ_TIMEOUT_DECISECONDS;

    termios::tcsetattr(file, SetArg::TCSANOW, &tio).map_err(io::Error::from)?;
    Ok(())
}

fn baud_rate(baud: u32) -> Option<BaudRate> {
    Some(match baud {
        4800 => BaudRate::B4800,
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        _ => return None,
    })
}
