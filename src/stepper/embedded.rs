//! Embedded coupling: external model packages stepped in-process.
//!
//! Each epoch creates fresh instances. The first warm-up tick primes them for
//! one simulated day; every warm-up day rollover and the start of the run
//! period free and recreate them, then replay the last exchanged values so
//! the models continue without a jump.

use crate::config::CosimConfig;
use crate::error::{CosimError, CosimResult};
use crate::fmi::SlaveProvider;
use crate::host::{HostModel, HostPhase};
use crate::registry::InstanceRegistry;
use crate::resolver::ResolutionLog;
use crate::snapshot::Snapshot;
use crate::stepper::clock::CommunicationClock;
use crate::stepper::state::StepperState;
use crate::telemetry::ExchangeLog;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Owns the instances, their clock and the replay snapshot.
pub struct EmbeddedDriver {
    registry: InstanceRegistry,
    provider: Box<dyn SlaveProvider>,
    clock: CommunicationClock,
    snapshot: Option<Snapshot>,
}

impl EmbeddedDriver {
    pub fn new(registry: InstanceRegistry, provider: Box<dyn SlaveProvider>) -> Self {
        Self {
            registry,
            provider,
            clock: CommunicationClock::default(),
            snapshot: None,
        }
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    pub fn clock(&self) -> &CommunicationClock {
        &self.clock
    }

    /// Snapshot replayed at the most recent epoch boundary.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Unpacks every package and resolves every binding.
    ///
    /// # Errors
    ///
    /// The first unpack or load failure, or every resolution failure at once.
    pub fn configure(&mut self, config: &CosimConfig, host: &dyn HostModel) -> CosimResult<()> {
        if !host.has_weather_run_period() {
            return Err(CosimError::NoRunPeriod);
        }
        self.registry.unpack_all(self.provider.as_ref())?;
        let mut log = ResolutionLog::new();
        self.registry.bind(config, host, &mut log);
        log.finish()
    }

    /// Performs the work of one host tick and returns the next state.
    pub fn tick(
        &mut self,
        state: StepperState,
        host: &mut dyn HostModel,
        trace: &mut ExchangeLog,
        tick: usize,
    ) -> CosimResult<StepperState> {
        let phase = host.phase();
        let next = match (phase, state) {
            (HostPhase::Warmup, StepperState::Configured) => {
                let start = host.calendar().start_seconds();
                self.prime(host, start, start + SECONDS_PER_DAY)?;
                StepperState::WarmupStepping
            }
            (HostPhase::Warmup, StepperState::WarmupStepping) => {
                if self.clock.reached_stop() {
                    log::debug!("warm-up day complete; recreating instances");
                    let (start, stop) = (self.clock.start(), self.clock.stop());
                    self.recreate(host, start, stop)?;
                } else {
                    self.exchange(host, None)?;
                }
                StepperState::WarmupStepping
            }
            (HostPhase::RunPeriod, StepperState::Configured) => {
                let (start, stop) = run_epoch(host);
                self.prime(host, start, stop)?;
                StepperState::SteadyStepping
            }
            (HostPhase::RunPeriod, StepperState::WarmupStepping) => {
                log::info!("warm-up finished; recreating instances for the run period");
                let (start, stop) = run_epoch(host);
                self.recreate(host, start, stop)?;
                StepperState::SteadyStepping
            }
            (HostPhase::RunPeriod, StepperState::SteadyStepping) => {
                if self.clock.reached_stop() {
                    self.terminate()?;
                    return Ok(StepperState::Terminated);
                }
                self.exchange(host, None)?;
                StepperState::SteadyStepping
            }
            (_, other) => {
                log::debug!("no exchange in phase {} while {other}", phase.label());
                return Ok(other);
            }
        };
        trace.record_instances(tick, phase, self.clock.current() - self.clock.step(), &self.registry);
        Ok(next)
    }

    /// Releases every instance at the end of the simulation.
    pub fn terminate(&mut self) -> CosimResult<()> {
        self.registry.free_all(true)?;
        self.registry.clear();
        self.snapshot = None;
        log::info!("external model instances released");
        Ok(())
    }

    /// Starts the first epoch: create, initialise, exchange.
    fn prime(&mut self, host: &mut dyn HostModel, start: f64, stop: f64) -> CosimResult<()> {
        let step = host.zone_timestep_hours() * 3600.0;
        self.clock.begin_epoch(start, stop, step);
        log::info!(
            "instantiating {} external model instance(s) for [{start}, {stop}] s",
            self.registry.instance_count()
        );
        self.registry.instantiate_all()?;
        self.registry.initialize_all(start, stop)?;
        self.exchange(host, None)
    }

    /// Starts a new epoch on existing instances: snapshot, free, create,
    /// initialise, replay.
    fn recreate(&mut self, host: &mut dyn HostModel, start: f64, stop: f64) -> CosimResult<()> {
        let snapshot = Snapshot::capture(&self.registry);
        self.registry.free_all(false)?;
        let step = host.zone_timestep_hours() * 3600.0;
        self.clock.begin_epoch(start, stop, step);
        self.registry.instantiate_all()?;
        self.registry.initialize_all(start, stop)?;
        self.registry.replay_inputs_all(&snapshot)?;
        self.exchange(host, Some(&snapshot))?;
        self.snapshot = Some(snapshot);
        Ok(())
    }

    fn exchange(&mut self, host: &mut dyn HostModel, replay: Option<&Snapshot>) -> CosimResult<()> {
        let (t, h) = (self.clock.current(), self.clock.step());
        self.registry.exchange_all(host, t, h, replay)?;
        self.clock.advance();
        Ok(())
    }
}

fn run_epoch(host: &dyn HostModel) -> (f64, f64) {
    let start = host.calendar().start_seconds();
    (start, start + f64::from(host.run_period_days()) * SECONDS_PER_DAY)
}
