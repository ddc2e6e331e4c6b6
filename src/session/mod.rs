pub mod data;
pub mod export;

use std::io::{Read, Write};
use std::path::Path;

use serialport::SerialPort;
use tracing::{error, info, warn};

use crate::devices::scale::{Connection, GROSS_COMMAND, ZERO_COMMAND, ZERO_OK};
use crate::error::{Result, ScaleError};
use data::{LogEntry, Measurements, Slot};
use export::Exporter;

/// Two-slot weighing session on top of a scale connection.
///
/// Either slot may be recorded any number of times while connected; the
/// latest value wins. Export needs both slots and appends one row each time.
pub struct MeasurementSession<T: Read + Write = Box<dyn SerialPort>> {
    connection: Option<Connection<T>>,
    measurements: Measurements,
}

impl MeasurementSession {
    /// Opens `port_name` with the default line settings. Any previous
    /// connection is released first.
    pub fn connect(&mut self, port_name: &str) -> Result<()> {
        self.disconnect();
        let connection = Connection::open(port_name)?;
        self.attach(connection);
        Ok(())
    }
}

impl<T: Read + Write> Default for MeasurementSession<T> {
    fn default() -> Self {
        MeasurementSession {
            connection: None,
            measurements: Measurements::default(),
        }
    }
}

impl<T: Read + Write> MeasurementSession<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, connection: Connection<T>) {
        self.disconnect();
        info!("Connected to scale on {}", connection.port_name());
        self.connection = Some(connection);
    }

    /// Releases the connection. Recorded values are kept.
    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            let port = connection.port_name().to_string();
            if let Err(e) = connection.close() {
                warn!("Error while closing {}: {}", port, e);
            }
            info!("Disconnected from scale on {}", port);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.port_name())
    }

    fn connection(&mut self) -> Result<&mut Connection<T>> {
        self.connection.as_mut().ok_or_else(|| {
            error!("Attempted to talk to the scale but it is not connected");
            ScaleError::NotConnected
        })
    }

    pub fn zero(&mut self) -> Result<()> {
        info!("Zeroing scale");
        let response = self.connection()?.send_command(ZERO_COMMAND).map_err(|e| {
            error!("Failed to zero scale: {}", e);
            e
        })?;

        if response == ZERO_OK {
            info!("Scale zeroed successfully");
            Ok(())
        } else {
            error!("Failed to zero scale: {}", response);
            Err(ScaleError::InvalidResponse(response))
        }
    }

    /// Reads the gross weight in kg. The value is not range checked.
    pub fn read_weight(&mut self) -> Result<f64> {
        let response = self.connection()?.send_command(GROSS_COMMAND)?;
        match response.parse::<f64>() {
            Ok(weight) => {
                info!("Read weight: {} kg", weight);
                Ok(weight)
            }
            Err(_) => {
                error!("Invalid weight response: {}", response);
                Err(ScaleError::InvalidWeight(response))
            }
        }
    }

    /// Reads a weight into `slot`. On failure the slot keeps its old value.
    pub fn record(&mut self, slot: Slot) -> Result<f64> {
        let weight = self.read_weight()?;
        self.measurements.set(slot, weight);
        info!("{} measurement recorded: {} kg", slot, weight);
        Ok(weight)
    }

    pub fn record_first(&mut self) -> Result<f64> {
        self.record(Slot::First)
    }

    pub fn record_second(&mut self) -> Result<f64> {
        self.record(Slot::Second)
    }

    pub fn measurement(&self, slot: Slot) -> Option<f64> {
        self.measurements.get(slot)
    }

    pub fn measurements(&self) -> Measurements {
        self.measurements
    }

    /// Hands the current pair to `exporter`. Refused unless both slots hold
    /// a value.
    pub fn export(&self, destination: &Path, exporter: &dyn Exporter) -> Result<LogEntry> {
        let Some((first, second)) = self.measurements.pair() else {
            warn!("Export refused: both measurements are required");
            return Err(ScaleError::MissingMeasurements);
        };

        let entry = LogEntry::now(first, second);
        exporter.append(destination, &entry).map_err(|e| {
            error!("Failed to export to {}: {}", destination.display(), e);
            e
        })?;
        Ok(entry)
    }
}
