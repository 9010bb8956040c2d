//! One instantiation of an external model package.

use std::path::{Path, PathBuf};

use crate::error::SlaveError;
use crate::fmi::{
    CoSimSlave, InstantiateParams, SUPPORTED_VERSION, SlaveProvider, version_supported,
};
use crate::host::HostModel;
use crate::marshal::RealBuffer;
use crate::registry::PackageSettings;
use crate::registry::binding::{InputBinding, OutputBinding};
use crate::resolver::BindingKind;
use crate::snapshot::InstanceValues;

/// A named instance with its own working directory, artifact and bindings.
pub struct ModelInstance {
    name: String,
    working_dir: PathBuf,
    version: Option<String>,
    slave: Option<Box<dyn CoSimSlave>>,
    /// Host outputs sent to the model, in declaration order.
    pub inputs: Vec<InputBinding>,
    /// Model outputs delivered to the host, in declaration order.
    pub outputs: Vec<OutputBinding>,
}

impl std::fmt::Debug for ModelInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInstance")
            .field("name", &self.name)
            .field("working_dir", &self.working_dir)
            .field("version", &self.version)
            .field("loaded", &self.slave.is_some())
            .field("instantiated", &self.is_instantiated())
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

impl ModelInstance {
    /// Declares an instance that works in `working_dir`.
    pub fn new(name: &str, working_dir: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            working_dir,
            version: None,
            slave: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Interface version, once resolved.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// The loaded artifact, if any.
    pub fn slave(&self) -> Option<&dyn CoSimSlave> {
        self.slave.as_deref()
    }

    /// Whether a binary-interface handle is live.
    pub fn is_instantiated(&self) -> bool {
        self.slave.as_ref().is_some_and(|s| s.is_instantiated())
    }

    fn live(&mut self, call: &'static str) -> Result<&mut Box<dyn CoSimSlave>, SlaveError> {
        self.slave
            .as_mut()
            .ok_or(SlaveError::NotInstantiated { call })
    }

    /// Extracts `archive` into the working directory and loads it.
    ///
    /// # Errors
    ///
    /// Any extraction or loading failure.
    pub fn unpack(&mut self, provider: &dyn SlaveProvider, archive: &Path) -> Result<(), SlaveError> {
        provider.unpack(archive, &self.working_dir)?;
        self.slave = Some(provider.load(&self.working_dir)?);
        Ok(())
    }

    /// Queries and checks the artifact's interface version.
    ///
    /// # Errors
    ///
    /// [`SlaveError::Version`] if it differs from the supported version.
    pub fn resolve_version(&mut self) -> Result<String, SlaveError> {
        let found = self.live("version query")?.version();
        if !version_supported(&found) {
            return Err(SlaveError::Version {
                found,
                supported: SUPPORTED_VERSION,
            });
        }
        self.version = Some(found.clone());
        Ok(found)
    }

    /// Acquires the binary-interface handle.
    ///
    /// # Errors
    ///
    /// [`SlaveError::NullHandle`] or any failure of the instantiate call.
    pub fn instantiate(&mut self, settings: &PackageSettings) -> Result<(), SlaveError> {
        let working_dir =
            std::path::absolute(&self.working_dir).unwrap_or_else(|_| self.working_dir.clone());
        let params = InstantiateParams {
            instance_name: self.name.clone(),
            working_dir,
            timeout_ms: settings.timeout_ms,
            visible: settings.visible,
            interactive: settings.interactive,
            logging_on: settings.logging_on,
        };
        self.live("fmiInstantiateSlave")?.instantiate(&params)
    }

    /// Primes the model for the epoch `[t_start, t_stop]`.
    pub fn initialize(&mut self, t_start: f64, t_stop: f64) -> Result<(), SlaveError> {
        self.live("fmiInitializeSlave")?.initialize(t_start, t_stop)
    }

    /// Fetches the current values of every output of `kind`.
    pub fn get_outputs(&mut self, kind: BindingKind) -> Result<(), SlaveError> {
        let refs: Vec<u32> = self
            .outputs
            .iter()
            .filter(|o| o.kind() == kind)
            .map(|o| o.value_reference)
            .collect();
        if refs.is_empty() {
            return Ok(());
        }
        let mut buf = RealBuffer::zeroed(refs);
        self.live("fmiGetReal")?.get_real(&mut buf)?;
        let mut values = buf.into_values().into_iter();
        for out in self.outputs.iter_mut().filter(|o| o.kind() == kind) {
            if let Some(v) = values.next() {
                out.value = v;
            }
        }
        Ok(())
    }

    /// Writes the current input values into the model.
    pub fn set_inputs(&mut self) -> Result<(), SlaveError> {
        let refs = self.inputs.iter().map(|i| i.value_reference).collect();
        let values = self.inputs.iter().map(|i| i.value).collect();
        let buf = RealBuffer::new(refs, values)?;
        self.live("fmiSetReal")?.set_real(&buf)
    }

    /// Advances the model from `t` by `h`.
    pub fn step(&mut self, t: f64, h: f64) -> Result<(), SlaveError> {
        self.live("fmiDoStep")?.do_step(t, h)
    }

    /// Releases the handle and verifies it is gone.
    ///
    /// # Errors
    ///
    /// [`SlaveError::LeakedHandle`] if the handle is still live afterwards.
    pub fn free(&mut self, end_of_simulation: bool) -> Result<(), SlaveError> {
        let Some(slave) = self.slave.as_mut() else {
            return Ok(());
        };
        slave.free(end_of_simulation)?;
        if slave.is_instantiated() {
            return Err(SlaveError::LeakedHandle);
        }
        Ok(())
    }

    /// Writes every output into the host; returns whether a rule variable was written.
    pub fn apply_outputs(&self, host: &mut dyn HostModel) -> bool {
        for out in &self.outputs {
            out.apply(host);
        }
        self.outputs.iter().any(|o| o.target.is_rule_variable())
    }

    /// Reads every bound host output into the inputs.
    pub fn read_inputs(&mut self, host: &dyn HostModel) {
        for input in &mut self.inputs {
            input.read(host);
        }
    }

    /// One communication step: outputs, host update, inputs, step.
    ///
    /// With `replay`, outputs come from the stored values instead of the
    /// model and inputs are not pushed (they were pushed right after
    /// re-initialisation).
    pub fn exchange(
        &mut self,
        host: &mut dyn HostModel,
        t: f64,
        h: f64,
        replay: Option<&InstanceValues>,
    ) -> Result<bool, SlaveError> {
        match replay {
            Some(values) => self.restore_outputs(values),
            None => {
                for kind in BindingKind::ALL {
                    self.get_outputs(kind)?;
                }
            }
        }
        let wrote_rules = self.apply_outputs(host);
        self.read_inputs(host);
        if replay.is_none() {
            self.set_inputs()?;
        }
        self.step(t, h)?;
        Ok(wrote_rules)
    }

    /// Copy of the value-bearing fields.
    pub fn values(&self) -> InstanceValues {
        InstanceValues {
            inputs: self.inputs.iter().map(|i| i.value).collect(),
            outputs: self.outputs.iter().map(|o| o.value).collect(),
        }
    }

    /// Pushes stored input values into a freshly initialised model.
    pub fn replay_inputs(&mut self, values: &InstanceValues) -> Result<(), SlaveError> {
        for (input, v) in self.inputs.iter_mut().zip(&values.inputs) {
            input.value = *v;
        }
        self.set_inputs()
    }

    fn restore_outputs(&mut self, values: &InstanceValues) {
        for (out, v) in self.outputs.iter_mut().zip(&values.outputs) {
            out.value = *v;
        }
    }
}
