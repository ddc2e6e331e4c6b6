//! Terminal front end: the connect / zero / measure / save form.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::devices::scale::available_ports;
use crate::session::data::{Measurements, Slot};
use crate::session::export::SHEET_EXTENSION;
use crate::error::ScaleError;
use crate::worker::{Event, Request, SessionWorker};

#[cfg(target_os = "windows")]
pub const DEFAULT_PORT: &str = "COM3";
#[cfg(not(target_os = "windows"))]
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

const HELP: &str = "\
connect [port]  open the scale's serial port
disconnect      release the serial port
ports           list serial ports
zero            zero the scale
first           record the first measurement
second          record the second measurement
save            append both measurements to a .csv sheet
status          show connection and measurements
quit            exit";

/// Modal notifications shown to the user.
pub trait Notifier {
    fn info(&mut self, title: &str, body: &str);
    fn warning(&mut self, title: &str, body: &str);
    fn error(&mut self, title: &str, body: &str);

    /// Called periodically while waiting on the scale.
    fn progress(&mut self) {}
}

/// Asks the user where to save the sheet. `None` means cancelled.
pub trait SavePathChooser {
    fn choose(&mut self) -> Option<PathBuf>;
}

pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn info(&mut self, title: &str, body: &str) {
        println!("[{}] {}", title, body);
    }

    fn warning(&mut self, title: &str, body: &str) {
        println!("[{}] (warning) {}", title, body);
    }

    fn error(&mut self, title: &str, body: &str) {
        eprintln!("[{}] {}", title, body);
    }

    fn progress(&mut self) {
        print!(".");
        let _ = io::stdout().flush();
    }
}

pub struct TerminalChooser;

impl SavePathChooser for TerminalChooser {
    fn choose(&mut self) -> Option<PathBuf> {
        print!("Save as (.{}), empty to cancel: ", SHEET_EXTENSION);
        io::stdout().flush().ok()?;

        let mut input = String::new();
        io::stdin().lock().read_line(&mut input).ok()?;
        let path = sheet_path(&input);
        if path.is_none() && !input.trim().is_empty() {
            println!("Only .{} files can be saved", SHEET_EXTENSION);
        }
        path
    }
}

/// Turns chooser input into a sheet path: empty input cancels, a missing
/// extension gets `.csv`, any other extension is refused.
pub fn sheet_path(input: &str) -> Option<PathBuf> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let path = Path::new(input);
    match path.extension() {
        None => Some(path.with_extension(SHEET_EXTENSION)),
        Some(ext) if ext.eq_ignore_ascii_case(SHEET_EXTENSION) => Some(path.to_path_buf()),
        Some(_) => None,
    }
}

pub struct Form<N: Notifier, C: SavePathChooser> {
    worker: SessionWorker,
    notifier: N,
    chooser: C,
    port: Option<String>,
    // Last snapshot of the session's slots, for labels only
    measurements: Measurements,
}

impl<N: Notifier, C: SavePathChooser> Form<N, C> {
    pub fn new(worker: SessionWorker, notifier: N, chooser: C) -> Self {
        Form {
            worker,
            notifier,
            chooser,
            port: None,
            measurements: Measurements::default(),
        }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    pub fn label(&self, slot: Slot) -> String {
        match self.measurements.get(slot) {
            Some(weight) => format!("{}: {} kg", slot, weight),
            None => format!("{}: Not Measured", slot),
        }
    }

    /// Handles one line of user input. Returns `false` when the user quits.
    pub fn dispatch(&mut self, line: &str) -> bool {
        let mut words = line.split_whitespace();
        let Some(action) = words.next() else {
            return true;
        };

        match action.to_ascii_lowercase().as_str() {
            "connect" => self.connect(words.next().unwrap_or(DEFAULT_PORT)),
            "disconnect" => self.disconnect(),
            "ports" => self.list_ports(),
            "zero" => self.zero(),
            "first" => self.record(Slot::First),
            "second" => self.record(Slot::Second),
            "save" => self.save(),
            "status" => self.status(),
            "help" => self.notifier.info("Help", HELP),
            "quit" | "exit" => return false,
            other => self
                .notifier
                .warning("Unknown Command", &format!("{} (type help)", other)),
        }
        true
    }

    fn call(&mut self, request: Request) -> Option<Event> {
        let notifier = &mut self.notifier;
        let event = self.worker.call(request, || notifier.progress());
        if event.is_none() {
            self.notifier.error("Error", "The scale worker has stopped");
        }
        event
    }

    fn require_connection(&mut self) -> bool {
        if !self.is_connected() {
            self.notifier
                .warning("Not Connected", "Connect to the scale first.");
        }
        self.is_connected()
    }

    pub fn connect(&mut self, port: &str) {
        match self.call(Request::Connect(port.to_string())) {
            Some(Event::Connected(port)) => {
                self.notifier.info("Connected", &format!("Connected to {}", port));
                self.port = Some(port);
            }
            Some(Event::Failed { error, .. }) => {
                self.port = None;
                self.notifier
                    .error("Error", &format!("Failed to connect to the scale: {}", error));
            }
            Some(other) => warn!("Unexpected event for connect: {:?}", other),
            None => {}
        }
    }

    pub fn disconnect(&mut self) {
        if let Some(Event::Disconnected) = self.call(Request::Disconnect) {
            if let Some(port) = self.port.take() {
                self.notifier.info("Disconnected", &format!("Disconnected from {}", port));
            }
        }
    }

    fn list_ports(&mut self) {
        match available_ports() {
            Ok(ports) if ports.is_empty() => self.notifier.info("Serial Ports", "No serial ports found"),
            Ok(ports) => self.notifier.info("Serial Ports", &ports.join("\n")),
            Err(e) => self.notifier.error("Error", &e.to_string()),
        }
    }

    pub fn zero(&mut self) {
        if !self.require_connection() {
            return;
        }
        match self.call(Request::Zero) {
            Some(Event::Zeroed) => self.notifier.info("Success", "Scale zeroed successfully."),
            Some(Event::Failed { error, .. }) => self
                .notifier
                .error("Error", &format!("Failed to zero scale: {}", error)),
            Some(other) => warn!("Unexpected event for zero: {:?}", other),
            None => {}
        }
    }

    pub fn record(&mut self, slot: Slot) {
        if !self.require_connection() {
            return;
        }
        match self.call(Request::Record(slot)) {
            Some(Event::Recorded { slot, measurements, .. }) => {
                self.measurements = measurements;
                let label = self.label(slot);
                self.notifier.info("Measurement", &label);
            }
            Some(Event::Failed { error, .. }) => self.notifier.error("Error", &error.to_string()),
            Some(other) => warn!("Unexpected event for record: {:?}", other),
            None => {}
        }
    }

    pub fn save(&mut self) {
        if !self.require_connection() {
            return;
        }
        if !self.refresh() {
            return;
        }
        if self.measurements.pair().is_none() {
            self.warn_missing_measurements();
            return;
        }

        let Some(path) = self.chooser.choose() else {
            return;
        };
        match self.call(Request::Export(path)) {
            Some(Event::Exported { path, .. }) => self
                .notifier
                .info("Success", &format!("Logged measurements to {}", path.display())),
            Some(Event::Failed { error: ScaleError::MissingMeasurements, .. }) => {
                self.warn_missing_measurements()
            }
            Some(Event::Failed { error, .. }) => self.notifier.error("Error", &error.to_string()),
            Some(other) => warn!("Unexpected event for save: {:?}", other),
            None => {}
        }
    }

    fn warn_missing_measurements(&mut self) {
        self.notifier.warning(
            "Missing Measurements",
            "Please record both measurements before saving.",
        );
    }

    /// Pulls the session's current slots and port into the form.
    fn refresh(&mut self) -> bool {
        match self.call(Request::Status) {
            Some(Event::Status { port, measurements }) => {
                self.port = port;
                self.measurements = measurements;
                true
            }
            Some(other) => {
                warn!("Unexpected event for status: {:?}", other);
                false
            }
            None => false,
        }
    }

    fn status(&mut self) {
        if !self.refresh() {
            return;
        }
        let connection = match &self.port {
            Some(port) => format!("Connected to {}", port),
            None => "Not connected".to_string(),
        };
        let body = format!(
            "{}\n{}\n{}",
            connection,
            self.label(Slot::First),
            self.label(Slot::Second)
        );
        self.notifier.info("Status", &body);
    }
}
