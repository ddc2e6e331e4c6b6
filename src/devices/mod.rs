pub mod scale;
pub mod sim;

pub use scale::{available_ports, Connection};
pub use sim::{Reply, SimulatedScale, Transcript};
