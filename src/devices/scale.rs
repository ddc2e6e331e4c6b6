//! Serial link to the scale.
//!
//! The scale speaks a line protocol: an ASCII command terminated with CR-LF,
//! answered by a single line. Each exchange waits a settle interval between
//! write and read, and an empty or failed read is retried a fixed number of
//! times before giving up.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::thread;
use std::time::Duration;

use serialport::SerialPort;
use tracing::{error, info, warn};

use crate::error::{Result, ScaleError};

pub const ZERO_COMMAND: &str = "SC.REZERO#1";
pub const GROSS_COMMAND: &str = "SC.GROSS#1";
pub const ZERO_OK: &str = "OK";

pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_RETRIES: u32 = 3;
pub const SETTLE_INTERVAL: Duration = Duration::from_secs(1);

/// An open channel to the scale. The port is released when the connection
/// is dropped.
pub struct Connection<T: Read + Write = Box<dyn SerialPort>> {
    port_name: String,
    baud_rate: u32,
    timeout: Duration,
    settle: Duration,
    stream: BufReader<T>,
}

impl Connection {
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with(port_name, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT)
    }

    pub fn open_with(port_name: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        info!("Opening serial port {} at {} baud", port_name, baud_rate);
        let port = serialport::new(port_name, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| {
                error!("Error opening serial port {}: {}", port_name, e);
                ScaleError::Connection {
                    port: port_name.to_string(),
                    source: e,
                }
            })?;

        info!("Serial port {} opened", port_name);
        Ok(Self::from_stream(port_name, baud_rate, timeout, port))
    }
}

impl<T: Read + Write> Connection<T> {
    /// Wraps an already open byte stream.
    pub fn from_stream(port_name: &str, baud_rate: u32, timeout: Duration, stream: T) -> Self {
        Connection {
            port_name: port_name.to_string(),
            baud_rate,
            timeout,
            settle: SETTLE_INTERVAL,
            stream: BufReader::new(stream),
        }
    }

    pub fn with_settle_interval(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn send_command(&mut self, command: &str) -> Result<String> {
        self.send_command_with_retries(command, DEFAULT_RETRIES)
    }

    /// Sends `command` until a non-empty line comes back or `retries`
    /// attempts are used up. Empty lines and I/O errors both consume an
    /// attempt and are not told apart in the final error.
    pub fn send_command_with_retries(&mut self, command: &str, retries: u32) -> Result<String> {
        for attempt in 1..=retries {
            match self.exchange(command) {
                Ok(response) if !response.is_empty() => return Ok(response),
                Ok(_) => warn!(
                    "Empty response for command: {} (attempt {}/{})",
                    command, attempt, retries
                ),
                Err(e) => error!(
                    "Error sending command {}: {} (attempt {}/{})",
                    command, e, attempt, retries
                ),
            }
        }

        error!("Giving up on command {} after {} attempts", command, retries);
        Err(ScaleError::CommunicationFailure {
            command: command.to_string(),
            attempts: retries,
        })
    }

    fn exchange(&mut self, command: &str) -> io::Result<String> {
        let payload = format!("{}\r\n", command);
        info!("Sending command to scale on {}: {}", self.port_name, command);
        let port = self.stream.get_mut();
        port.write_all(payload.as_bytes())?;
        port.flush()?;

        thread::sleep(self.settle);

        // A read timeout ends the line; whatever arrived before it is the reply
        let mut line = Vec::new();
        match self.stream.read_until(b'\n', &mut line) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) => return Err(e),
        }
        let line = String::from_utf8(line)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let trimmed = line.trim().to_string();
        info!("Received response from scale: {}", trimmed);
        Ok(trimmed)
    }

    /// Flushes and releases the port.
    pub fn close(mut self) -> Result<()> {
        self.stream.get_mut().flush()?;
        Ok(())
    }
}

impl<T: Read + Write> Drop for Connection<T> {
    fn drop(&mut self) {
        info!("Releasing serial port {}", self.port_name);
    }
}

/// Names of the serial ports present on this host.
pub fn available_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports().map_err(|e| {
        error!("Failed to enumerate serial ports: {}", e);
        ScaleError::PortList(e)
    })?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
