//! Copies of instance I/O values held across a re-instantiation.
//!
//! A snapshot is taken right before every instance is freed at an epoch
//! boundary and replayed into the freshly initialised instances, so the
//! external models resume from the last exchanged values.

use crate::registry::InstanceRegistry;

/// Value-bearing fields of one instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceValues {
    /// Last values sent to the external model, in binding order.
    pub inputs: Vec<f64>,
    /// Last values received from the external model, in binding order.
    pub outputs: Vec<f64>,
}

/// Stored values of every instance, in registry order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    instances: Vec<InstanceValues>,
}

impl Snapshot {
    /// Copies the current values of every instance in `registry`.
    pub fn capture(registry: &InstanceRegistry) -> Self {
        Self {
            instances: registry.instances().map(|(_, i)| i.values()).collect(),
        }
    }

    /// Values of the instance at `index` in registry order.
    pub fn get(&self, index: usize) -> Option<&InstanceValues> {
        self.instances.get(index)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
