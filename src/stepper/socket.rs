//! Socket coupling: values exchanged with an external orchestrator.

use std::path::PathBuf;

use crate::config::{CosimConfig, CouplingMode};
use crate::error::{CosimError, CosimResult};
use crate::host::{HostModel, HostPhase};
use crate::resolver::{HostTarget, ResolutionLog, resolve_output, resolve_target};
use crate::socket::{FLAG_END_OF_SIMULATION, FLAG_HOST_ERROR, SocketSession, VariableMap};
use crate::stepper::state::StepperState;
use crate::telemetry::{Direction, ExchangeLog, ExchangeRecord};

const CHANNEL: &str = "socket";

/// A resolved host output, sent to the peer.
#[derive(Debug, Clone)]
struct SentBinding {
    label: String,
    handle: usize,
}

/// A resolved host entity, written with a value from the peer.
#[derive(Debug, Clone)]
struct ReceivedBinding {
    label: String,
    target: HostTarget,
}

/// Owns the session and the positional variable bindings.
#[derive(Debug)]
pub struct SocketDriver {
    mode: CouplingMode,
    socket_config: PathBuf,
    variables_config: PathBuf,
    capacity: usize,
    session: SocketSession,
    sent: Vec<SentBinding>,
    received: Vec<ReceivedBinding>,
}

impl SocketDriver {
    pub fn new(mode: CouplingMode, config: &CosimConfig) -> Self {
        Self {
            mode,
            socket_config: config.interface.socket_config.clone(),
            variables_config: config.interface.variables_config.clone(),
            capacity: config.interface.max_exchange_variables,
            session: SocketSession::new(),
            sent: Vec::new(),
            received: Vec::new(),
        }
    }

    pub fn session(&self) -> &SocketSession {
        &self.session
    }

    /// Connects, reads the variable map and resolves every entry.
    ///
    /// # Errors
    ///
    /// Connection and descriptor failures immediately; resolution failures
    /// all together.
    pub fn configure(&mut self, host: &dyn HostModel) -> CosimResult<()> {
        self.session.connect(&self.socket_config)?;
        if !host.has_weather_run_period() {
            return Err(CosimError::NoRunPeriod);
        }

        let map = VariableMap::load(&self.variables_config, self.capacity)?;
        log::info!("number of outputs in external interface = {}", map.sent.len());
        log::info!("number of inputs  in external interface = {}", map.received.len());

        let context = format!("variable map \"{}\"", self.variables_config.display());
        let mut log = ResolutionLog::new();
        for v in &map.sent {
            if let Some(handle) = log.record(&context, resolve_output(host, &v.key, &v.name)) {
                self.sent.push(SentBinding {
                    label: format!("{}:{}", v.key, v.name),
                    handle,
                });
            }
        }
        for v in &map.received {
            if let Some(target) = log.record(&context, resolve_target(host, v.kind, &v.name)) {
                self.received.push(ReceivedBinding {
                    label: v.name.clone(),
                    target,
                });
            }
        }
        log.finish()
    }

    /// Performs the exchange of one host tick.
    ///
    /// Values are only exchanged during the run period.
    pub fn tick(
        &mut self,
        state: StepperState,
        host: &mut dyn HostModel,
        trace: &mut ExchangeLog,
        tick: usize,
    ) -> CosimResult<StepperState> {
        let phase = host.phase();
        if phase != HostPhase::RunPeriod {
            return Ok(state);
        }

        let first = state == StepperState::Configured;
        if first {
            log::info!("external interface starts first data exchange");
        }
        let time = if first { 0.0 } else { host.elapsed_seconds() };

        if self.session.take_continue_warning() && self.mode == CouplingMode::SocketMaster {
            log::warn!(
                "continue simulation without updated values from server at t = {:.2} hours",
                time / 3600.0
            );
        }
        if !self.session.no_more_values {
            self.exchange(host, time, phase, trace, tick)?;
        }
        if self.received.iter().any(|r| r.target.is_rule_variable()) {
            host.refresh_rules();
        }
        Ok(StepperState::SteadyStepping)
    }

    fn exchange(
        &mut self,
        host: &mut dyn HostModel,
        time: f64,
        phase: HostPhase,
        trace: &mut ExchangeLog,
        tick: usize,
    ) -> CosimResult<()> {
        let values: Vec<f64> = self.sent.iter().map(|s| host.output_value(s.handle)).collect();
        let reply = self
            .session
            .exchange(time, &values)
            .map_err(|source| CosimError::Exchange {
                hours: time / 3600.0,
                source,
            })?;

        if reply.flag != 0 {
            self.session.stop_receiving();
            match self.mode {
                CouplingMode::PackageExport => log::info!(
                    "external interface finished at time = {:.2} hours (flag {})",
                    time / 3600.0,
                    reply.flag
                ),
                _ => log::error!(
                    "received end of simulation flag {} at time = {:.2} hours",
                    reply.flag,
                    time / 3600.0
                ),
            }
            return Ok(());
        }
        if reply.values.len() != self.received.len() {
            return Err(CosimError::LengthMismatch {
                received: reply.values.len(),
                expected: self.received.len(),
            });
        }

        for (s, v) in self.sent.iter().zip(&values) {
            trace.push(record(tick, phase, time, &s.label, Direction::ToExternal, *v));
        }
        for (r, v) in self.received.iter().zip(&reply.values) {
            r.target.apply(host, *v);
            trace.push(record(tick, phase, time, &r.label, Direction::FromExternal, *v));
        }
        log::trace!("exchanged {} / {} values at t = {time}", values.len(), reply.values.len());
        Ok(())
    }

    /// Best-effort error notice to the peer.
    pub fn notify_error(&mut self) {
        self.session.notify_error();
    }

    /// Tells the peer the host finished and closes the connection.
    pub fn terminate(&mut self) {
        self.session.close(FLAG_END_OF_SIMULATION, &self.socket_config);
    }

    /// Tells the peer the host stopped on its own error and closes the connection.
    pub fn abort(&mut self) {
        self.session.close(FLAG_HOST_ERROR, &self.socket_config);
    }
}

fn record(
    tick: usize,
    phase: HostPhase,
    time_s: f64,
    variable: &str,
    direction: Direction,
    value: f64,
) -> ExchangeRecord {
    ExchangeRecord {
        tick,
        phase,
        time_s,
        channel: CHANNEL.to_string(),
        variable: variable.to_string(),
        direction,
        value,
    }
}
