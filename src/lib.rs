pub mod devices;
pub mod error;
pub mod form;
pub mod logging;
pub mod session;
pub mod worker;

pub use error::{Result, ScaleError};
