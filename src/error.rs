use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScaleError {
    #[error("Failed to open serial port {port}: {source}")]
    Connection {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Failed to list serial ports: {0}")]
    PortList(serialport::Error),

    #[error("Scale not connected")]
    NotConnected,

    #[error("No response to {command} after {attempts} attempts")]
    CommunicationFailure { command: String, attempts: u32 },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Invalid weight response: {0}")]
    InvalidWeight(String),

    #[error("Please record both measurements before saving.")]
    MissingMeasurements,

    #[error("Export error: {0}")]
    Export(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScaleError>;
