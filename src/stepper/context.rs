//! The object a host run owns for the whole co-simulation.

use crate::config::{CosimConfig, CouplingMode};
use crate::error::{CosimError, CosimResult};
use crate::fmi::SlaveProvider;
use crate::host::{HostModel, HostPhase};
use crate::registry::InstanceRegistry;
use crate::stepper::clock::CommunicationClock;
use crate::stepper::embedded::EmbeddedDriver;
use crate::stepper::socket::SocketDriver;
use crate::stepper::state::StepperState;
use crate::telemetry::{ExchangeLog, ExchangeRecord};

enum Driver {
    Socket(SocketDriver),
    Embedded(EmbeddedDriver),
}

/// All co-simulation state of one host run.
///
/// The host calls [`exchange`](Self::exchange) once per zone time step and
/// [`finish`](Self::finish) once at the end. Configuration happens lazily on
/// the first exchange, when the host's entities exist.
pub struct CoSimulationContext {
    config: CosimConfig,
    driver: Option<Driver>,
    state: StepperState,
    ticks: usize,
    sizing_warned: bool,
    trace: ExchangeLog,
}

impl CoSimulationContext {
    /// Validates `config` and prepares the driver of its coupling mode.
    ///
    /// # Arguments
    ///
    /// * `config` - Run configuration
    /// * `provider` - Loads external model packages in embedded mode
    ///
    /// # Errors
    ///
    /// [`CosimError::Config`] carrying every validation error.
    pub fn new(config: CosimConfig, provider: Box<dyn SlaveProvider>) -> CosimResult<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            for e in &errors {
                log::error!("{e}");
            }
            return Err(CosimError::Config(errors));
        }
        for w in config.warnings() {
            log::warn!("{w}");
        }

        let driver = match config.active_mode() {
            None => None,
            Some(CouplingMode::PackageImport) => {
                let registry = InstanceRegistry::from_config(&config).map_err(CosimError::Config)?;
                Some(Driver::Embedded(EmbeddedDriver::new(registry, provider)))
            }
            Some(mode) => Some(Driver::Socket(SocketDriver::new(mode, &config))),
        };
        if let Some(mode) = config.active_mode() {
            log::info!("external interface enabled in {mode} mode");
        }
        let trace = ExchangeLog::new(config.interface.trace_exchanges);
        Ok(Self {
            config,
            driver,
            state: StepperState::Unconfigured,
            ticks: 0,
            sizing_warned: false,
            trace,
        })
    }

    pub fn state(&self) -> StepperState {
        self.state
    }

    pub fn config(&self) -> &CosimConfig {
        &self.config
    }

    /// Host ticks that reached a coupling driver.
    pub fn ticks(&self) -> usize {
        self.ticks
    }

    /// Communication clock of embedded mode.
    pub fn clock(&self) -> Option<&CommunicationClock> {
        match &self.driver {
            Some(Driver::Embedded(d)) => Some(d.clock()),
            _ => None,
        }
    }

    /// Instances of embedded mode.
    pub fn registry(&self) -> Option<&InstanceRegistry> {
        match &self.driver {
            Some(Driver::Embedded(d)) => Some(d.registry()),
            _ => None,
        }
    }

    /// Whether the socket peer ended the exchange.
    pub fn peer_finished(&self) -> bool {
        matches!(&self.driver, Some(Driver::Socket(d)) if d.session().no_more_values)
    }

    pub fn records(&self) -> &[ExchangeRecord] {
        self.trace.records()
    }

    /// Runs the co-simulation work of one host time step.
    ///
    /// # Errors
    ///
    /// Any failure stops the co-simulation for good: the peer is notified,
    /// the state becomes [`StepperState::FatalStop`] and the error is
    /// returned for the host to terminate the run. Later calls return
    /// [`CosimError::Stopped`].
    pub fn exchange(&mut self, host: &mut dyn HostModel) -> CosimResult<()> {
        match self.state {
            StepperState::Terminated => return Ok(()),
            StepperState::FatalStop => return Err(CosimError::Stopped),
            _ => {}
        }
        if self.driver.is_none() {
            return Ok(());
        }
        if host.phase() == HostPhase::Sizing {
            if !self.sizing_warned {
                log::warn!("external interface does not exchange data during sizing");
                self.sizing_warned = true;
            }
            return Ok(());
        }

        self.ticks += 1;
        match self.step(host) {
            Ok(next) => {
                if next != self.state {
                    log::debug!("external interface: {} -> {next}", self.state);
                }
                self.state = next;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn step(&mut self, host: &mut dyn HostModel) -> CosimResult<StepperState> {
        let Self {
            config,
            driver,
            state,
            ticks,
            trace,
            ..
        } = self;
        let Some(driver) = driver.as_mut() else {
            return Ok(*state);
        };
        let mut current = *state;
        if current == StepperState::Unconfigured {
            match driver {
                Driver::Socket(d) => d.configure(host)?,
                Driver::Embedded(d) => d.configure(config, host)?,
            }
            current = StepperState::Configured;
            *state = current;
        }
        match driver {
            Driver::Socket(d) => d.tick(current, host, trace, *ticks),
            Driver::Embedded(d) => d.tick(current, host, trace, *ticks),
        }
    }

    /// Ends the co-simulation after the host's last time step.
    ///
    /// Embedded instances are released; the socket peer is told the host
    /// reached its end.
    ///
    /// # Errors
    ///
    /// A failure while releasing instances.
    pub fn finish(&mut self) -> CosimResult<()> {
        if self.state.is_final() {
            return Ok(());
        }
        let result = match self.driver.as_mut() {
            Some(Driver::Embedded(d)) if self.state != StepperState::Unconfigured => d.terminate(),
            Some(Driver::Socket(d)) => {
                d.terminate();
                Ok(())
            }
            _ => Ok(()),
        };
        match result {
            Ok(()) => {
                self.state = StepperState::Terminated;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Tells the socket peer the host stopped on an error of its own.
    pub fn abort(&mut self) {
        if let Some(Driver::Socket(d)) = self.driver.as_mut() {
            d.abort();
        }
        self.state = StepperState::FatalStop;
    }

    /// The single fatal path: report, notify the peer, stop.
    fn fail(&mut self, error: CosimError) -> CosimError {
        log::error!("external interface: {error}");
        if let CosimError::Config(errors) = &error {
            for e in errors {
                log::error!("  {e}");
            }
        }
        if let Some(Driver::Socket(d)) = self.driver.as_mut() {
            d.notify_error();
        }
        log::error!(
            "external interface stopped in state {} after {} tick(s)",
            self.state,
            self.ticks
        );
        self.state = StepperState::FatalStop;
        error
    }
}
