//! Per-tick orchestration of the co-simulation.

pub mod clock;
pub mod context;
pub mod embedded;
pub mod socket;
pub mod state;

pub use clock::CommunicationClock;
pub use context::CoSimulationContext;
pub use state::StepperState;
