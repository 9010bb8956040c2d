//! The host simulation as seen by the co-simulation layer.
//!
//! The physics solver, schedule store and rule-language system are external
//! collaborators; [`HostModel`] is the narrow surface the time stepper needs
//! from them.

pub mod calendar;
pub mod demo;
pub mod entities;

pub use calendar::CalendarPosition;
pub use entities::{EntityTable, RuleVariable};

/// Phase of the host run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPhase {
    /// Design-day or system sizing; no data is exchanged.
    Sizing,
    /// Warm-up days of the weather-file run period.
    Warmup,
    /// The actual run period.
    RunPeriod,
}

impl HostPhase {
    /// Short label used in logs and telemetry.
    pub fn label(self) -> &'static str {
        match self {
            Self::Sizing => "sizing",
            Self::Warmup => "warmup",
            Self::RunPeriod => "run",
        }
    }
}

/// Capabilities the co-simulation layer requires from the host solver.
pub trait HostModel {
    /// Current simulation phase.
    fn phase(&self) -> HostPhase;

    /// Zone time step in hours.
    fn zone_timestep_hours(&self) -> f64;

    /// Current calendar position.
    fn calendar(&self) -> CalendarPosition;

    /// Number of days in the run period.
    fn run_period_days(&self) -> u32;

    /// Simulated seconds completed in the current environment.
    fn elapsed_seconds(&self) -> f64;

    /// Whether the run control simulates a weather-file run period at all.
    fn has_weather_run_period(&self) -> bool {
        true
    }

    /// Keys of every report variable called `name`, with their handles.
    fn output_keys(&self, name: &str) -> Vec<(String, usize)>;

    /// Current value of a report variable.
    fn output_value(&self, handle: usize) -> f64;

    /// Handle of the schedule called `name`.
    fn find_schedule(&self, name: &str) -> Option<usize>;

    /// Handle and capability of the rule variable called `name`.
    fn find_rule_variable(&self, name: &str) -> Option<RuleVariable>;

    /// Overwrites the current day-schedule value.
    fn set_schedule_value(&mut self, handle: usize, value: f64);

    /// Overwrites a rule variable.
    fn set_rule_variable(&mut self, handle: usize, value: f64);

    /// Lets the rule system pick up rule variables written since the last call.
    fn refresh_rules(&mut self) {}
}
