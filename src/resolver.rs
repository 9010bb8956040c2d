//! Name-to-handle resolution for host entities.
//!
//! Report variables are matched by name and then disambiguated by key.
//! Schedules, free variables and actuators resolve to a [`HostTarget`], the
//! single place where an external value is written back into the host.

use std::fmt;

use crate::config::{ConfigError, same_name};
use crate::error::{CosimError, CosimResult, ResolveError};
use crate::host::HostModel;

/// Kind of host entity an external value is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Schedule,
    FreeVariable,
    Actuator,
}

impl BindingKind {
    /// Every kind, in the order outputs are fetched from an external model.
    pub const ALL: [BindingKind; 3] = [Self::Schedule, Self::FreeVariable, Self::Actuator];

    /// Parses the tag used in variable-mapping descriptors.
    pub fn from_tag(tag: &str) -> Option<Self> {
        if same_name(tag, "schedule") {
            Some(Self::Schedule)
        } else if same_name(tag, "variable") {
            Some(Self::FreeVariable)
        } else if same_name(tag, "actuator") {
            Some(Self::Actuator)
        } else {
            None
        }
    }

    /// Descriptor tag of this kind.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::FreeVariable => "variable",
            Self::Actuator => "actuator",
        }
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A resolved, writable host entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostTarget {
    Schedule(usize),
    FreeVariable(usize),
    Actuator(usize),
}

impl HostTarget {
    /// Kind of the target.
    pub fn kind(self) -> BindingKind {
        match self {
            Self::Schedule(_) => BindingKind::Schedule,
            Self::FreeVariable(_) => BindingKind::FreeVariable,
            Self::Actuator(_) => BindingKind::Actuator,
        }
    }

    /// Host handle of the target.
    pub fn handle(self) -> usize {
        match self {
            Self::Schedule(h) | Self::FreeVariable(h) | Self::Actuator(h) => h,
        }
    }

    /// Whether writing this target requires a rule refresh.
    pub fn is_rule_variable(self) -> bool {
        !matches!(self, Self::Schedule(_))
    }

    /// Writes `value` into the host entity.
    pub fn apply(self, host: &mut dyn HostModel, value: f64) {
        match self {
            Self::Schedule(h) => host.set_schedule_value(h, value),
            Self::FreeVariable(h) | Self::Actuator(h) => host.set_rule_variable(h, value),
        }
    }
}

/// Resolves a report variable by `key` and `name`.
///
/// # Errors
///
/// Returns [`ResolveError::OutputNotFound`] if no variable matches both.
pub fn resolve_output(host: &dyn HostModel, key: &str, name: &str) -> Result<usize, ResolveError> {
    host.output_keys(name)
        .into_iter()
        .find(|(k, _)| same_name(k, key))
        .map(|(_, handle)| handle)
        .ok_or_else(|| ResolveError::OutputNotFound {
            key: key.to_string(),
            name: name.to_string(),
        })
}

/// Resolves a writable host entity of the given kind.
///
/// Free variables and actuators must have been declared for external writes;
/// an ordinary rule variable with the same name is rejected.
///
/// # Errors
///
/// Returns [`ResolveError::TargetNotFound`] if nothing is called `name`, or
/// [`ResolveError::WrongDeclarationKind`] for an ordinary rule variable.
pub fn resolve_target(
    host: &dyn HostModel,
    kind: BindingKind,
    name: &str,
) -> Result<HostTarget, ResolveError> {
    let not_found = || ResolveError::TargetNotFound {
        kind,
        name: name.to_string(),
    };
    match kind {
        BindingKind::Schedule => host
            .find_schedule(name)
            .map(HostTarget::Schedule)
            .ok_or_else(not_found),
        BindingKind::FreeVariable | BindingKind::Actuator => {
            let found = host.find_rule_variable(name).ok_or_else(not_found)?;
            if !found.externally_writable {
                return Err(ResolveError::WrongDeclarationKind {
                    kind,
                    name: name.to_string(),
                });
            }
            Ok(match kind {
                BindingKind::Actuator => HostTarget::Actuator(found.index),
                _ => HostTarget::FreeVariable(found.index),
            })
        }
    }
}

/// Accumulates resolution failures so every problem is reported together.
#[derive(Debug, Default)]
pub struct ResolutionLog {
    errors: Vec<ConfigError>,
}

impl ResolutionLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps a successful resolution, or records its failure under `context`.
    pub fn record<T, E: fmt::Display>(&mut self, context: &str, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                log::error!("{context}: {e}");
                self.errors.push(ConfigError::new(context, e.to_string()));
                None
            }
        }
    }

    /// Records a configuration error that is not a resolution failure.
    pub fn push(&mut self, error: ConfigError) {
        log::error!("{}: {}", error.field, error.message);
        self.errors.push(error);
    }

    /// Number of failures recorded so far.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns `true` if nothing failed.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Ends the configuration pass.
    ///
    /// # Errors
    ///
    /// Returns [`CosimError::Config`] carrying every recorded failure.
    pub fn finish(self) -> CosimResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(CosimError::Config(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CalendarPosition, EntityTable, HostPhase, RuleVariable};

    struct TableHost(EntityTable);

    impl HostModel for TableHost {
        fn phase(&self) -> HostPhase {
            HostPhase::RunPeriod
        }
        fn zone_timestep_hours(&self) -> f64 {
            0.25
        }
        fn calendar(&self) -> CalendarPosition {
            CalendarPosition {
                month: 1,
                day_of_month: 1,
                hour_of_day: 1,
                leap_year: false,
            }
        }
        fn run_period_days(&self) -> u32 {
            1
        }
        fn elapsed_seconds(&self) -> f64 {
            0.0
        }
        fn output_keys(&self, name: &str) -> Vec<(String, usize)> {
            self.0.output_keys(name)
        }
        fn output_value(&self, handle: usize) -> f64 {
            self.0.output_value(handle)
        }
        fn find_schedule(&self, name: &str) -> Option<usize> {
            self.0.find_schedule(name)
        }
        fn find_rule_variable(&self, name: &str) -> Option<RuleVariable> {
            self.0.find_rule_variable(name)
        }
        fn set_schedule_value(&mut self, handle: usize, value: f64) {
            self.0.set_schedule_value(handle, value);
        }
        fn set_rule_variable(&mut self, handle: usize, value: f64) {
            self.0.set_rule_variable(handle, value);
        }
    }

    fn host() -> TableHost {
        let mut t = EntityTable::new();
        t.add_output("ZONE 1", "Zone Mean Air Temperature", 20.0);
        t.add_output("ZONE 2", "Zone Mean Air Temperature", 18.0);
        t.add_schedule("TSetHea", 20.0);
        t.add_rule_variable("yShade", 0.0, true);
        t.add_rule_variable("internalCounter", 0.0, false);
        TableHost(t)
    }

    #[test]
    fn key_disambiguates_same_named_outputs() {
        let h = host();
        let a = resolve_output(&h, "zone 2", "zone mean air temperature").expect("resolves");
        assert_eq!(h.output_value(a), 18.0);
    }

    #[test]
    fn unknown_key_fails() {
        let h = host();
        let err = resolve_output(&h, "ZONE 3", "Zone Mean Air Temperature");
        assert!(matches!(err, Err(ResolveError::OutputNotFound { .. })));
    }

    #[test]
    fn ordinary_rule_variable_rejected() {
        let h = host();
        let err = resolve_target(&h, BindingKind::Actuator, "internalCounter");
        assert!(matches!(err, Err(ResolveError::WrongDeclarationKind { .. })));
        let ok = resolve_target(&h, BindingKind::FreeVariable, "YSHADE").expect("writable");
        assert_eq!(ok.kind(), BindingKind::FreeVariable);
    }

    #[test]
    fn apply_dispatches_on_kind() {
        let mut h = host();
        let sched = resolve_target(&h, BindingKind::Schedule, "tsethea").expect("schedule");
        let var = resolve_target(&h, BindingKind::Actuator, "yShade").expect("actuator");
        sched.apply(&mut h, 22.5);
        var.apply(&mut h, 1.0);
        assert_eq!(h.0.schedule_named("TSetHea"), Some(22.5));
        assert_eq!(h.0.rule_named("yShade"), Some(1.0));
        assert!(var.is_rule_variable());
        assert!(!sched.is_rule_variable());
    }

    #[test]
    fn log_accumulates_all_failures() {
        let h = host();
        let mut log = ResolutionLog::new();
        let a = log.record("a", resolve_target(&h, BindingKind::Schedule, "missing"));
        let b = log.record("b", resolve_output(&h, "ZONE 9", "Zone Mean Air Temperature"));
        let c = log.record("c", resolve_target(&h, BindingKind::Schedule, "TSetHea"));
        assert!(a.is_none() && b.is_none() && c.is_some());
        assert_eq!(log.len(), 2);
        match log.finish() {
            Err(CosimError::Config(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn tags_round_trip() {
        for kind in BindingKind::ALL {
            assert_eq!(BindingKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(BindingKind::from_tag("meter"), None);
    }
}
