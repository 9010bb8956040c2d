//! Resolved variable bindings of one model instance.

use crate::host::HostModel;
use crate::resolver::{BindingKind, HostTarget};

/// Host report variable feeding an external model input.
#[derive(Debug, Clone, PartialEq)]
pub struct InputBinding {
    /// Key of the host report variable.
    pub key: String,
    /// Name of the host report variable.
    pub name: String,
    /// Input variable name inside the external model.
    pub external_name: String,
    /// Resolved host report-variable handle.
    pub output: usize,
    pub value_reference: u32,
    /// Last value read from the host.
    pub value: f64,
}

impl InputBinding {
    /// Reads the current host value into the binding.
    pub fn read(&mut self, host: &dyn HostModel) {
        self.value = host.output_value(self.output);
    }
}

/// External model output delivered to a host entity.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputBinding {
    /// Output variable name inside the external model.
    pub external_name: String,
    /// Name of the host schedule, variable or actuator.
    pub host_name: String,
    pub target: HostTarget,
    pub value_reference: u32,
    /// Last value received from the external model.
    pub value: f64,
}

impl OutputBinding {
    pub fn kind(&self) -> BindingKind {
        self.target.kind()
    }

    /// Writes the last received value into the host.
    pub fn apply(&self, host: &mut dyn HostModel) {
        self.target.apply(host, self.value);
    }
}
