//! Co-simulation bridge between a building simulation and external models.
//!
//! Two couplings are supported: a socket client exchanging value vectors
//! with an external orchestrator, and in-process stepping of packaged
//! co-simulation models through their binary interface.

pub mod cli;
pub mod config;
pub mod error;
pub mod fmi;
/// The host simulation seen through the narrow interface the bridge needs.
pub mod host;
pub mod io;
pub mod marshal;
pub mod registry;
pub mod resolver;
pub mod snapshot;
pub mod socket;
/// Per-tick orchestration: clock, state machine and the coupling drivers.
pub mod stepper;
pub mod telemetry;
