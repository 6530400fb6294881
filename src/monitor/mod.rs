//! The polling loop.
//!
//! This module provides:
//! - The queue detector and display rules (`MonitorState`)
//! - The status board read by the controller (`StatusBoard`)
//! - The locate/capture/recognize front half of a tick (`pipeline`)
//! - The start/stop controller and its worker thread (`QueueMonitor`)

pub mod pipeline;
pub mod runner;
pub mod state;
pub mod status;

pub use runner::{QueueMonitor, Services};
