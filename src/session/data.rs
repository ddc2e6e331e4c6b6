use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One exported row: when it was saved and the two recorded weights in kg.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LogEntry {
    #[serde(rename = "Timestamp")]
    pub timestamp: String, // local time, TIMESTAMP_FORMAT
    #[serde(rename = "First Measurement")]
    pub first: f64,
    #[serde(rename = "Second Measurement")]
    pub second: f64,
}

impl LogEntry {
    pub fn now(first: f64, second: f64) -> Self {
        LogEntry {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            first,
            second,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    First,
    Second,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::First => write!(f, "First"),
            Slot::Second => write!(f, "Second"),
        }
    }
}

/// The two measurement slots, in kg.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Measurements {
    pub first: Option<f64>,
    pub second: Option<f64>,
}

impl Measurements {
    pub fn get(&self, slot: Slot) -> Option<f64> {
        match slot {
            Slot::First => self.first,
            Slot::Second => self.second,
        }
    }

    pub fn set(&mut self, slot: Slot, weight: f64) {
        match slot {
            Slot::First => self.first = Some(weight),
            Slot::Second => self.second = Some(weight),
        }
    }

    /// Both slots, if both hold a value.
    pub fn pair(&self) -> Option<(f64, f64)> {
        Some((self.first?, self.second?))
    }
}
