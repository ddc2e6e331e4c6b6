//! In-memory stand-in for the scale, used when no hardware is attached.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::info;

use super::scale::{Connection, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT};

/// What the simulated scale does in answer to one command.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Answer with this line (CR-LF is appended).
    Line(String),
    /// Answer these bytes verbatim, with no terminator added.
    Raw(String),
    /// Answer nothing; the read times out.
    Silent,
    /// The next read fails as if the device went away.
    Error,
}

/// Every command line written to a [`SimulatedScale`], terminator included.
#[derive(Debug, Clone, Default)]
pub struct Transcript(Arc<Mutex<Vec<String>>>);

impl Transcript {
    pub fn commands(&self) -> Vec<String> {
        self.0.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn push(&self, command: String) {
        if let Ok(mut commands) = self.0.lock() {
            commands.push(command);
        }
    }
}

#[derive(Debug, Default)]
pub struct SimulatedScale {
    script: HashMap<String, VecDeque<Reply>>,
    pending: Vec<u8>,
    output: VecDeque<u8>,
    fail_next_read: bool,
    transcript: Transcript,
}

impl SimulatedScale {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply for `command`. Replies are used in order; once a
    /// command's queue is empty the scale stays silent.
    pub fn reply(mut self, command: &str, reply: Reply) -> Self {
        self.script
            .entry(command.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn transcript(&self) -> Transcript {
        self.transcript.clone()
    }

    /// Opens a connection to this scale with no settle delay.
    pub fn connect(self) -> Connection<SimulatedScale> {
        Connection::from_stream("SIM", DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT, self)
            .with_settle_interval(Duration::ZERO)
    }

    fn handle_line(&mut self, line: String) {
        let command = line.trim_end_matches(['\r', '\n']).to_string();
        self.transcript.push(line);

        let reply = self
            .script
            .get_mut(&command)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(Reply::Silent);
        info!("Simulated scale got {}, replying {:?}", command, reply);

        match reply {
            Reply::Line(text) => {
                self.output.extend(text.as_bytes());
                self.output.extend(b"\r\n");
            }
            Reply::Raw(text) => self.output.extend(text.as_bytes()),
            Reply::Silent => {}
            Reply::Error => self.fail_next_read = true,
        }
    }
}

impl Write for SimulatedScale {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(end) = self.pending.windows(2).position(|w| w == b"\r\n") {
            let line: Vec<u8> = self.pending.drain(..end + 2).collect();
            self.handle_line(String::from_utf8_lossy(&line).into_owned());
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for SimulatedScale {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.fail_next_read {
            self.fail_next_read = false;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "Broken pipe"));
        }

        // Like a serial port, an idle line times out instead of reporting EOF
        if self.output.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "Operation timed out"));
        }

        let n = buf.len().min(self.output.len());
        for (slot, byte) in buf.iter_mut().zip(self.output.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}
