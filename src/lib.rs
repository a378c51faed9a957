//! Copy a folder of object-store objects into a Dropbox folder without
//! routing the bytes through this process: objects are presigned and the
//! destination pulls each URL itself.

pub mod adapters;
pub mod config;
pub mod context;
pub mod core;
pub mod destination;
pub mod error;
pub mod logging;
pub mod report;
pub mod signal;
pub mod source;
