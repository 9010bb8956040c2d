//! In-memory bookkeeping of host report variables, schedules and rule variables.

use crate::config::{CosimConfig, same_name};

/// A named report variable of the host.
#[derive(Debug, Clone)]
struct ReportVariable {
    key: String,
    name: String,
    value: f64,
}

/// A day schedule whose current value can be overwritten externally.
#[derive(Debug, Clone)]
struct Schedule {
    name: String,
    value: f64,
}

/// A rule-language variable (free variable or actuator).
#[derive(Debug, Clone)]
struct RuleSlot {
    name: String,
    value: f64,
    externally_writable: bool,
}

/// Result of looking up a rule-language variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleVariable {
    /// Index into the host's rule-variable table.
    pub index: usize,
    /// Whether the variable was declared for external writes.
    pub externally_writable: bool,
}

/// Host-side entity table.
///
/// Name lookups are case-insensitive; indices are stable for the lifetime of
/// the table.
#[derive(Debug, Clone, Default)]
pub struct EntityTable {
    outputs: Vec<ReportVariable>,
    schedules: Vec<Schedule>,
    rules: Vec<RuleSlot>,
}

impl EntityTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a report variable and returns its index.
    pub fn add_output(&mut self, key: &str, name: &str, value: f64) -> usize {
        self.outputs.push(ReportVariable {
            key: key.to_string(),
            name: name.to_string(),
            value,
        });
        self.outputs.len() - 1
    }

    /// Registers a schedule, or returns the existing one with the same name.
    pub fn add_schedule(&mut self, name: &str, value: f64) -> usize {
        if let Some(i) = self.find_schedule(name) {
            return i;
        }
        self.schedules.push(Schedule {
            name: name.to_string(),
            value,
        });
        self.schedules.len() - 1
    }

    /// Registers a rule variable, or returns the existing one with the same name.
    ///
    /// An existing variable keeps its original writability.
    pub fn add_rule_variable(&mut self, name: &str, value: f64, externally_writable: bool) -> usize {
        if let Some(found) = self.find_rule_variable(name) {
            return found.index;
        }
        self.rules.push(RuleSlot {
            name: name.to_string(),
            value,
            externally_writable,
        });
        self.rules.len() - 1
    }

    /// Registers every externally writable entity a configuration declares.
    ///
    /// Socket-mode `external_*` declarations and the host side of
    /// embedded-mode output bindings become schedules or writable rule
    /// variables seeded with their initial value.
    pub fn declare_external(&mut self, config: &CosimConfig) {
        for s in &config.external_schedule {
            self.add_schedule(&s.name, s.initial_value);
        }
        for v in config.external_variable.iter().chain(&config.external_actuator) {
            self.add_rule_variable(&v.name, v.initial_value, true);
        }
        for b in &config.to_schedule {
            self.add_schedule(&b.host_name, b.initial_value.unwrap_or_default());
        }
        for b in config.to_variable.iter().chain(&config.to_actuator) {
            self.add_rule_variable(&b.host_name, b.initial_value.unwrap_or_default(), true);
        }
    }

    /// Keys of every report variable called `name`, with their indices.
    pub fn output_keys(&self, name: &str) -> Vec<(String, usize)> {
        self.outputs
            .iter()
            .enumerate()
            .filter(|(_, o)| same_name(&o.name, name))
            .map(|(i, o)| (o.key.clone(), i))
            .collect()
    }

    /// Current value of report variable `index` (0.0 if out of range).
    pub fn output_value(&self, index: usize) -> f64 {
        self.outputs.get(index).map_or(0.0, |o| o.value)
    }

    /// Overwrites report variable `index`.
    pub fn set_output(&mut self, index: usize, value: f64) {
        if let Some(o) = self.outputs.get_mut(index) {
            o.value = value;
        }
    }

    /// Index of the schedule called `name`.
    pub fn find_schedule(&self, name: &str) -> Option<usize> {
        self.schedules.iter().position(|s| same_name(&s.name, name))
    }

    /// Current value of schedule `index` (0.0 if out of range).
    pub fn schedule_value(&self, index: usize) -> f64 {
        self.schedules.get(index).map_or(0.0, |s| s.value)
    }

    /// Overwrites schedule `index`.
    pub fn set_schedule_value(&mut self, index: usize, value: f64) {
        if let Some(s) = self.schedules.get_mut(index) {
            s.value = value;
        }
    }

    /// Looks up the rule variable called `name`.
    pub fn find_rule_variable(&self, name: &str) -> Option<RuleVariable> {
        self.rules
            .iter()
            .position(|r| same_name(&r.name, name))
            .map(|index| RuleVariable {
                index,
                externally_writable: self.rules[index].externally_writable,
            })
    }

    /// Current value of rule variable `index` (0.0 if out of range).
    pub fn rule_value(&self, index: usize) -> f64 {
        self.rules.get(index).map_or(0.0, |r| r.value)
    }

    /// Overwrites rule variable `index`.
    pub fn set_rule_variable(&mut self, index: usize, value: f64) {
        if let Some(r) = self.rules.get_mut(index) {
            r.value = value;
        }
    }

    /// Current value of the schedule called `name`.
    pub fn schedule_named(&self, name: &str) -> Option<f64> {
        self.find_schedule(name).map(|i| self.schedules[i].value)
    }

    /// Current value of the rule variable called `name`.
    pub fn rule_named(&self, name: &str) -> Option<f64> {
        self.find_rule_variable(name).map(|r| self.rules[r.index].value)
    }
}
