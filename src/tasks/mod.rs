//! Background Tasks Module
//!
//! Contains background tasks that run periodically during node operation.
//!
//! # Tasks
//! - Status reporter: Logs the node-local store's accounting at configured intervals

mod status;

pub use status::spawn_status_reporter;
