use std::fmt;

use crate::host::HostPhase;
use crate::registry::InstanceRegistry;

/// Which way a value crossed the coupling boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host value sent to an external model or peer.
    ToExternal,
    /// External value applied to the host.
    FromExternal,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Self::ToExternal => "to_external",
            Self::FromExternal => "from_external",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One exchanged value.
#[derive(Clone, Debug, PartialEq)]
pub struct ExchangeRecord {
    /// Host tick the value was exchanged in, counted from 1.
    pub tick: usize,
    pub phase: HostPhase,
    /// Communication time in seconds.
    pub time_s: f64,
    /// `package/instance` in embedded mode, `socket` otherwise.
    pub channel: String,
    pub variable: String,
    pub direction: Direction,
    pub value: f64,
}

/// Collected records of a run; collection is off unless enabled.
#[derive(Debug, Default)]
pub struct ExchangeLog {
    enabled: bool,
    records: Vec<ExchangeRecord>,
}

impl ExchangeLog {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            records: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Stores `record` if collection is enabled.
    pub fn push(&mut self, record: ExchangeRecord) {
        if self.enabled {
            self.records.push(record);
        }
    }

    /// Records the current input and output values of every instance.
    pub fn record_instances(
        &mut self,
        tick: usize,
        phase: HostPhase,
        time_s: f64,
        registry: &InstanceRegistry,
    ) {
        if !self.enabled {
            return;
        }
        for (settings, inst) in registry.instances() {
            let channel = format!("{}/{}", settings.stem, inst.name());
            let sent = inst
                .inputs
                .iter()
                .map(|i| (&i.external_name, Direction::ToExternal, i.value));
            let received = inst
                .outputs
                .iter()
                .map(|o| (&o.external_name, Direction::FromExternal, o.value));
            for (variable, direction, value) in sent.chain(received) {
                self.records.push(ExchangeRecord {
                    tick,
                    phase,
                    time_s,
                    channel: channel.clone(),
                    variable: variable.clone(),
                    direction,
                    value,
                });
            }
        }
    }

    pub fn records(&self) -> &[ExchangeRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ExchangeRecord> {
        self.records
    }
}
