//! Socket coupling with an external orchestrator.
//!
//! The host is the client: it connects once, then every communication
//! interval sends its outputs with the previous simulation time and blocks
//! until the orchestrator answers with the values to apply.

pub mod client;
pub mod codec;
pub mod descriptor;

use std::path::Path;

use crate::error::SocketError;

pub use client::SocketClient;
pub use codec::Message;
pub use descriptor::{ReceivedVariable, SentVariable, SocketDescriptor, VariableMap};

/// Sent on close when the host reached the end of its simulation.
pub const FLAG_END_OF_SIMULATION: i32 = 1;
/// Sent on close when the host stops because of an error of its own.
pub const FLAG_HOST_ERROR: i32 = -1;
/// Sent when a fatal error occurs before the first exchange.
pub const FLAG_ERROR_BEFORE_START: i32 = -10;
/// Sent when a fatal error occurs after exchanges started.
pub const FLAG_ERROR_WHILE_RUNNING: i32 = -20;

/// Progress of the exchange with the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimulationStatus {
    #[default]
    NotStarted,
    Running,
    Terminated,
}

/// The single connection of a run plus its termination bookkeeping.
#[derive(Debug, Default)]
pub struct SocketSession {
    client: Option<SocketClient>,
    /// Set once the peer signalled the end of communication; never cleared.
    pub no_more_values: bool,
    pub errors_found: bool,
    pub status: SimulationStatus,
    shown_continue_warning: bool,
}

impl SocketSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Connects using the descriptor at `path`.
    ///
    /// # Errors
    ///
    /// [`SocketError::DescriptorNotFound`] if the descriptor is absent,
    /// otherwise any descriptor or connection failure.
    pub fn connect(&mut self, path: &Path) -> Result<(), SocketError> {
        let descriptor = SocketDescriptor::from_file(path)?;
        self.client = Some(SocketClient::connect(&descriptor)?);
        Ok(())
    }

    /// One round trip. The first call marks the session running.
    ///
    /// # Errors
    ///
    /// [`SocketError::Closed`] without a connection, otherwise any failure of
    /// the round trip.
    pub fn exchange(&mut self, time: f64, values: &[f64]) -> Result<Message, SocketError> {
        let client = self.client.as_mut().ok_or(SocketError::Closed)?;
        self.status = SimulationStatus::Running;
        client.exchange(time, values)
    }

    /// Records that the peer ended the exchange.
    pub fn stop_receiving(&mut self) {
        self.no_more_values = true;
    }

    /// Returns `true` exactly once after the peer stopped sending values.
    pub fn take_continue_warning(&mut self) -> bool {
        if self.no_more_values && !self.shown_continue_warning {
            self.shown_continue_warning = true;
            return true;
        }
        false
    }

    /// Best-effort notice that the host is stopping on an error.
    ///
    /// The code tells the peer whether exchanges had started. Nothing is sent
    /// without a connection.
    pub fn notify_error(&mut self) {
        self.errors_found = true;
        let Some(client) = self.client.as_mut() else {
            return;
        };
        let flag = match self.status {
            SimulationStatus::NotStarted => FLAG_ERROR_BEFORE_START,
            _ => FLAG_ERROR_WHILE_RUNNING,
        };
        if let Err(e) = client.send_flag(flag) {
            log::error!("external interface not found; could not send flag {flag}: {e}");
        }
    }

    /// Sends `flag` and releases the connection.
    ///
    /// Without an open connection one attempt is made to connect through
    /// `descriptor`, so a peer that started the host is not left waiting.
    pub fn close(&mut self, flag: i32, descriptor: &Path) {
        if self.client.is_none() && descriptor.exists() {
            if let Err(e) = self.connect(descriptor) {
                log::warn!("cannot reach the external interface to report flag {flag}: {e}");
            }
        }
        if let Some(mut client) = self.client.take() {
            if let Err(e) = client.send_flag(flag) {
                log::warn!("could not send flag {flag} to the external interface: {e}");
            }
        }
        self.status = SimulationStatus::Terminated;
    }
}
