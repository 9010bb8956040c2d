use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::config::{CosimConfig, HostConfig};
use crate::error::CosimResult;
use crate::host::calendar::days_in_month;
use crate::host::{CalendarPosition, EntityTable, HostModel, HostPhase, RuleVariable};
use crate::stepper::CoSimulationContext;

/// Report variable of the zone air temperature.
pub const ZONE_TEMPERATURE: &str = "Zone Mean Air Temperature";
/// Report variable of the delivered heating power.
pub const HEATING_RATE: &str = "Zone Air Heating Rate";
/// Report variable of the outdoor dry-bulb temperature.
pub const OUTDOOR_TEMPERATURE: &str = "Site Outdoor Air Drybulb Temperature";
/// Key of site-level report variables.
pub const ENVIRONMENT_KEY: &str = "Environment";
/// Schedule holding the heating setpoint.
pub const SETPOINT_SCHEDULE: &str = "HEATING SETPOINT";
/// Rule variable scaling the heater output when declared.
pub const HEATER_AVAILABILITY: &str = "HEATER AVAILABILITY";
/// Internal rule variable counting heater cycles; never externally writable.
pub const HEATER_CYCLES: &str = "HEATER CYCLES";

const SECONDS_PER_HOUR: f64 = 3600.0;

/// A single thermal zone driven through sizing, warm-up and run days.
///
/// The zone is a lumped capacitance behind an envelope conductance, heated
/// by a proportional thermostat. Outdoor temperature follows a daily
/// sinusoid with seeded Gaussian noise, so runs are reproducible.
///
/// # Examples
///
/// ```
/// use cosim_bridge::config::CosimConfig;
/// use cosim_bridge::host::demo::DemoBuilding;
///
/// let mut building = DemoBuilding::from_config(&CosimConfig::default());
/// let mut steps = 0;
/// while !building.is_finished() {
///     building.advance();
///     steps += 1;
/// }
/// // 2 warm-up days and 1 run day at 6 steps per hour
/// assert_eq!(steps, 3 * 24 * 6);
/// ```
#[derive(Debug, Clone)]
pub struct DemoBuilding {
    cfg: HostConfig,
    table: EntityTable,
    phase: HostPhase,
    finished: bool,
    /// Day index within the current phase.
    day: u32,
    step_in_day: u32,
    /// Completed steps of the current phase.
    phase_steps: u64,
    zone_c: f64,
    was_heating: bool,
    rng: StdRng,
    zone_output: usize,
    heating_output: usize,
    outdoor_output: usize,
    setpoint: usize,
    cycles: usize,
}

impl DemoBuilding {
    /// Builds the demonstration host from the `[host]` section and registers
    /// every externally writable entity the configuration declares.
    pub fn from_config(config: &CosimConfig) -> Self {
        let cfg = config.host.clone();
        let mut table = EntityTable::new();
        let zone_output = table.add_output(&cfg.zone, ZONE_TEMPERATURE, cfg.initial_zone_c);
        let heating_output = table.add_output(&cfg.zone, HEATING_RATE, 0.0);
        let outdoor_output = table.add_output(ENVIRONMENT_KEY, OUTDOOR_TEMPERATURE, cfg.outdoor_mean_c);
        let setpoint = table.add_schedule(SETPOINT_SCHEDULE, cfg.heating_setpoint_c);
        let cycles = table.add_rule_variable(HEATER_CYCLES, 0.0, false);
        table.declare_external(config);

        let phase = if cfg.weather_run_period {
            if cfg.warmup_days > 0 {
                HostPhase::Warmup
            } else {
                HostPhase::RunPeriod
            }
        } else {
            HostPhase::Sizing
        };
        Self {
            rng: StdRng::seed_from_u64(cfg.seed),
            zone_c: cfg.initial_zone_c,
            cfg,
            table,
            phase,
            finished: false,
            day: 0,
            step_in_day: 0,
            phase_steps: 0,
            was_heating: false,
            zone_output,
            heating_output,
            outdoor_output,
            setpoint,
            cycles,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn entities(&self) -> &EntityTable {
        &self.table
    }

    pub fn zone_temperature(&self) -> f64 {
        self.zone_c
    }

    fn steps_per_day(&self) -> u32 {
        self.cfg.steps_per_hour.max(1) * 24
    }

    fn dt_seconds(&self) -> f64 {
        SECONDS_PER_HOUR / f64::from(self.cfg.steps_per_hour.max(1))
    }

    fn outdoor_c(&mut self) -> f64 {
        let hour = f64::from(self.step_in_day) / f64::from(self.cfg.steps_per_hour.max(1));
        // coldest at 03:00, warmest at 15:00
        let angle = 2.0 * std::f64::consts::PI * (hour - 9.0) / 24.0;
        let noise = if self.cfg.noise_std_c > 0.0 {
            let u1: f64 = self.rng.random::<f64>().clamp(1e-9, 1.0);
            let u2: f64 = self.rng.random::<f64>();
            (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos() * self.cfg.noise_std_c
        } else {
            0.0
        };
        self.cfg.outdoor_mean_c + self.cfg.outdoor_amplitude_c * angle.sin() + noise
    }

    /// Simulates one zone time step and moves the calendar forward.
    pub fn advance(&mut self) {
        if self.finished {
            return;
        }
        let dt = self.dt_seconds();
        let outdoor = self.outdoor_c();
        let setpoint = self.table.schedule_value(self.setpoint);
        let availability = self
            .table
            .rule_named(HEATER_AVAILABILITY)
            .unwrap_or(1.0)
            .clamp(0.0, 1.0);
        let demand = ((setpoint - self.zone_c) / self.cfg.throttling_range_k).clamp(0.0, 1.0);
        let heating_w = demand * availability * self.cfg.heater_max_w;
        let heating = heating_w > 0.0;
        if heating && !self.was_heating {
            let n = self.table.rule_value(self.cycles);
            self.table.set_rule_variable(self.cycles, n + 1.0);
        }
        self.was_heating = heating;

        let flow_w = self.cfg.ua_w_per_k * (outdoor - self.zone_c) + heating_w;
        self.zone_c += dt * flow_w / self.cfg.capacitance_j_per_k;

        self.table.set_output(self.zone_output, self.zone_c);
        self.table.set_output(self.heating_output, heating_w);
        self.table.set_output(self.outdoor_output, outdoor);
        self.move_calendar();
    }

    fn move_calendar(&mut self) {
        self.phase_steps += 1;
        self.step_in_day += 1;
        if self.step_in_day < self.steps_per_day() {
            return;
        }
        self.step_in_day = 0;
        self.day += 1;
        let phase_days = match self.phase {
            HostPhase::Sizing => 1,
            HostPhase::Warmup => self.cfg.warmup_days,
            HostPhase::RunPeriod => self.cfg.run_days,
        };
        if self.day < phase_days {
            return;
        }
        log::debug!("host finished {} days of {}", self.day, self.phase.label());
        self.day = 0;
        self.phase_steps = 0;
        match self.phase {
            HostPhase::Warmup => self.phase = HostPhase::RunPeriod,
            HostPhase::Sizing | HostPhase::RunPeriod => self.finished = true,
        }
    }
}

impl HostModel for DemoBuilding {
    fn phase(&self) -> HostPhase {
        self.phase
    }

    fn zone_timestep_hours(&self) -> f64 {
        1.0 / f64::from(self.cfg.steps_per_hour.max(1))
    }

    /// Warm-up repeats the first run-period day.
    fn calendar(&self) -> CalendarPosition {
        let run_day = if self.phase == HostPhase::RunPeriod {
            self.day
        } else {
            0
        };
        let (mut month, mut day) = (self.cfg.start_month, self.cfg.start_day + run_day);
        while day > days_in_month(month, self.cfg.leap_year) {
            day -= days_in_month(month, self.cfg.leap_year);
            month = month % 12 + 1;
        }
        CalendarPosition {
            month,
            day_of_month: day,
            hour_of_day: self.step_in_day / self.cfg.steps_per_hour.max(1) + 1,
            leap_year: self.cfg.leap_year,
        }
    }

    fn run_period_days(&self) -> u32 {
        self.cfg.run_days
    }

    fn elapsed_seconds(&self) -> f64 {
        self.phase_steps as f64 * self.dt_seconds()
    }

    fn has_weather_run_period(&self) -> bool {
        self.cfg.weather_run_period
    }

    fn output_keys(&self, name: &str) -> Vec<(String, usize)> {
        self.table.output_keys(name)
    }

    fn output_value(&self, handle: usize) -> f64 {
        self.table.output_value(handle)
    }

    fn find_schedule(&self, name: &str) -> Option<usize> {
        self.table.find_schedule(name)
    }

    fn find_rule_variable(&self, name: &str) -> Option<RuleVariable> {
        self.table.find_rule_variable(name)
    }

    fn set_schedule_value(&mut self, handle: usize, value: f64) {
        self.table.set_schedule_value(handle, value);
    }

    fn set_rule_variable(&mut self, handle: usize, value: f64) {
        self.table.set_rule_variable(handle, value);
    }
}

/// Outcome of a demonstration run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Zone time steps simulated, all phases included.
    pub steps: usize,
    /// Exchange ticks that reached the coupling layer.
    pub coupled_ticks: usize,
    pub final_zone_c: f64,
    /// Mean zone temperature over the run period.
    pub mean_run_zone_c: f64,
}

/// Drives `building` to completion, exchanging with `ctx` at the start of
/// every zone time step.
///
/// # Errors
///
/// The first co-simulation failure; the run stops at that step.
pub fn run(building: &mut DemoBuilding, ctx: &mut CoSimulationContext) -> CosimResult<RunSummary> {
    let mut steps = 0;
    let (mut run_sum, mut run_steps) = (0.0, 0usize);
    while !building.is_finished() {
        ctx.exchange(building)?;
        let in_run = building.phase() == HostPhase::RunPeriod;
        building.advance();
        if in_run {
            run_sum += building.zone_temperature();
            run_steps += 1;
        }
        steps += 1;
    }
    ctx.finish()?;
    Ok(RunSummary {
        steps,
        coupled_ticks: ctx.ticks(),
        final_zone_c: building.zone_temperature(),
        mean_run_zone_c: if run_steps > 0 {
            run_sum / run_steps as f64
        } else {
            building.zone_temperature()
        },
    })
}
