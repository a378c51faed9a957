//! Concrete service adapters other than the production S3/Dropbox clients.

pub mod simulated;

pub use simulated::{DestinationEvent, Script, SimulatedDestination, SimulatedObjectStore};
