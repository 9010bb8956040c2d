//! External model packages, their instances, and lifecycle over all of them.
//!
//! Every lifecycle operation exists per instance on [`ModelInstance`] and as
//! an `_all` variant here that walks packages and instances in declaration
//! order and attaches package/instance context to any failure.

pub mod binding;
pub mod instance;

use std::path::{Path, PathBuf};

use crate::config::{ConfigError, CosimConfig, PackageConfig, same_name};
use crate::error::{CosimError, CosimResult};
use crate::fmi::{Causality, SlaveProvider};
use crate::host::HostModel;
use crate::resolver::{BindingKind, ResolutionLog, resolve_output, resolve_target};
use crate::snapshot::Snapshot;

pub use binding::{InputBinding, OutputBinding};
pub use instance::ModelInstance;

/// Immutable settings of a declared package.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageSettings {
    /// Name used by bindings (the declared file path).
    pub name: String,
    pub file: PathBuf,
    /// File name without directories or extension.
    pub stem: String,
    pub timeout_ms: f64,
    pub visible: bool,
    pub interactive: bool,
    pub logging_on: bool,
}

impl From<&PackageConfig> for PackageSettings {
    fn from(cfg: &PackageConfig) -> Self {
        Self {
            name: cfg.name(),
            file: cfg.file.clone(),
            stem: cfg.stem(),
            timeout_ms: cfg.timeout_ms,
            visible: cfg.visible,
            interactive: cfg.interactive,
            logging_on: cfg.logging_on,
        }
    }
}

/// One declared external model package and its instances.
#[derive(Debug)]
pub struct ExternalModelPackage {
    pub settings: PackageSettings,
    pub instances: Vec<ModelInstance>,
}

/// All packages of a run.
#[derive(Debug)]
pub struct InstanceRegistry {
    working_root: PathBuf,
    packages: Vec<ExternalModelPackage>,
}

impl InstanceRegistry {
    /// Creates an empty registry whose instances work under `working_root`.
    pub fn new(working_root: &Path) -> Self {
        Self {
            working_root: working_root.to_path_buf(),
            packages: Vec::new(),
        }
    }

    /// Declares every package and every instance a configuration references.
    ///
    /// # Errors
    ///
    /// Returns every declaration problem found: unknown packages, instance
    /// names shared between packages, and packages without instances.
    pub fn from_config(config: &CosimConfig) -> Result<Self, Vec<ConfigError>> {
        let mut registry = Self::new(&config.interface.working_root);
        for pkg in &config.packages {
            registry.add_package(pkg.into());
        }

        let mut errors = Vec::new();
        let referenced = config
            .from_variable
            .iter()
            .map(|b| (b.package.as_str(), b.instance.as_str()))
            .chain(
                config
                    .to_bindings()
                    .map(|(_, b)| (b.package.as_str(), b.instance.as_str())),
            );
        for (package, instance) in referenced {
            if let Err(e) = registry.declare(package, instance) {
                errors.push(e);
            }
        }
        for pkg in registry.packages.iter().filter(|p| p.instances.is_empty()) {
            errors.push(ConfigError::new(
                "package",
                format!(
                    "package \"{}\" does not have any instances; declare at least one binding \
                     naming an instance of it",
                    pkg.settings.name
                ),
            ));
        }
        if errors.is_empty() {
            Ok(registry)
        } else {
            Err(errors)
        }
    }

    /// Adds a package with no instances.
    pub fn add_package(&mut self, settings: PackageSettings) {
        self.packages.push(ExternalModelPackage {
            settings,
            instances: Vec::new(),
        });
    }

    /// Registers `instance` under `package`; re-declaring is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if the package is unknown or the instance name is already used
    /// by another package.
    pub fn declare(&mut self, package: &str, instance: &str) -> Result<(), ConfigError> {
        if let Some(other) = self.packages.iter().find(|p| {
            !same_name(&p.settings.name, package)
                && p.instances.iter().any(|i| same_name(i.name(), instance))
        }) {
            return Err(ConfigError::new(
                "instance",
                format!(
                    "instance \"{instance}\" is declared for package \"{}\" and package \
                     \"{package}\"",
                    other.settings.name
                ),
            ));
        }
        let root = &self.working_root;
        let pkg = self
            .packages
            .iter_mut()
            .find(|p| same_name(&p.settings.name, package))
            .ok_or_else(|| {
                ConfigError::new("package", format!("unknown package \"{package}\""))
            })?;
        if !pkg.instances.iter().any(|i| same_name(i.name(), instance)) {
            let dir = root.join(format!("{}_{instance}", pkg.settings.stem));
            pkg.instances.push(ModelInstance::new(instance, dir));
        }
        Ok(())
    }

    pub fn packages(&self) -> &[ExternalModelPackage] {
        &self.packages
    }

    /// Every instance with its package settings, in declaration order.
    pub fn instances(&self) -> impl Iterator<Item = (&PackageSettings, &ModelInstance)> {
        self.packages
            .iter()
            .flat_map(|p| p.instances.iter().map(move |i| (&p.settings, i)))
    }

    fn instances_mut(&mut self) -> impl Iterator<Item = (&PackageSettings, &mut ModelInstance)> {
        self.packages.iter_mut().flat_map(|p| {
            let settings = &p.settings;
            p.instances.iter_mut().map(move |i| (settings, i))
        })
    }

    /// Total number of instances.
    pub fn instance_count(&self) -> usize {
        self.packages.iter().map(|p| p.instances.len()).sum()
    }

    /// Finds an instance by package and instance name.
    pub fn find(&self, package: &str, instance: &str) -> Option<&ModelInstance> {
        self.instances()
            .find(|(p, i)| same_name(&p.name, package) && same_name(i.name(), instance))
            .map(|(_, i)| i)
    }

    pub fn find_mut(&mut self, package: &str, instance: &str) -> Option<&mut ModelInstance> {
        self.instances_mut()
            .find(|(p, i)| same_name(&p.name, package) && same_name(i.name(), instance))
            .map(|(_, i)| i)
    }

    /// Unpacks and loads every instance, then checks its interface version.
    ///
    /// # Errors
    ///
    /// The first extraction, loading or version failure.
    pub fn unpack_all(&mut self, provider: &dyn SlaveProvider) -> CosimResult<()> {
        for (settings, inst) in self.instances_mut() {
            log::info!(
                "unpacking \"{}\" into \"{}\"",
                settings.file.display(),
                inst.working_dir().display()
            );
            inst.unpack(provider, &settings.file)
                .map_err(|e| CosimError::slave(&settings.name, inst.name(), e))?;
            let version = inst
                .resolve_version()
                .map_err(|e| CosimError::slave(&settings.name, inst.name(), e))?;
            log::debug!("instance \"{}\" uses interface {version}", inst.name());
        }
        Ok(())
    }

    /// Resolves every binding against the loaded artifacts and the host.
    ///
    /// Failures are recorded in `log` so all of them surface together.
    pub fn bind(&mut self, config: &CosimConfig, host: &dyn HostModel, log: &mut ResolutionLog) {
        for (settings, inst) in self.instances_mut() {
            let Some(slave) = inst.slave() else { continue };
            let owns = |package: &str, instance: &str| {
                same_name(package, &settings.name) && same_name(instance, inst.name())
            };
            let context = format!("instance \"{}\" of package \"{}\"", inst.name(), settings.name);

            let mut inputs = Vec::new();
            for b in config.from_variable.iter().filter(|b| owns(&b.package, &b.instance)) {
                let vr = log.record(
                    &context,
                    slave.value_reference(&b.external_name, Causality::Input),
                );
                let output = log.record(&context, resolve_output(host, &b.key, &b.name));
                if let (Some(value_reference), Some(output)) = (vr, output) {
                    inputs.push(InputBinding {
                        key: b.key.clone(),
                        name: b.name.clone(),
                        external_name: b.external_name.clone(),
                        output,
                        value_reference,
                        value: host.output_value(output),
                    });
                }
            }

            let mut outputs = Vec::new();
            let sections = [
                (BindingKind::Schedule, &config.to_schedule),
                (BindingKind::FreeVariable, &config.to_variable),
                (BindingKind::Actuator, &config.to_actuator),
            ];
            for (kind, bindings) in sections {
                for b in bindings.iter().filter(|b| owns(&b.package, &b.instance)) {
                    let vr = log.record(
                        &context,
                        slave.value_reference(&b.external_name, Causality::Output),
                    );
                    let target = log.record(&context, resolve_target(host, kind, &b.host_name));
                    if let (Some(value_reference), Some(target)) = (vr, target) {
                        outputs.push(OutputBinding {
                            external_name: b.external_name.clone(),
                            host_name: b.host_name.clone(),
                            target,
                            value_reference,
                            value: b.initial_value.unwrap_or_default(),
                        });
                    }
                }
            }

            let (artifact_inputs, artifact_outputs) = slave.variable_counts();
            if artifact_inputs != inputs.len() {
                log::warn!(
                    "{context}: the artifact declares {artifact_inputs} input(s) but {} are \
                     bound; only the bound inputs are set",
                    inputs.len()
                );
            }
            if artifact_outputs != outputs.len() {
                log::warn!(
                    "{context}: the artifact declares {artifact_outputs} output(s) but {} are \
                     bound; only the bound outputs are read",
                    outputs.len()
                );
            }
            log::info!(
                "{context}: {} input(s), {} output(s)",
                inputs.len(),
                outputs.len()
            );
            inst.inputs = inputs;
            inst.outputs = outputs;
        }
    }

    /// Acquires a handle for every instance.
    pub fn instantiate_all(&mut self) -> CosimResult<()> {
        for (settings, inst) in self.instances_mut() {
            inst.instantiate(settings)
                .map_err(|e| CosimError::slave(&settings.name, inst.name(), e))?;
        }
        Ok(())
    }

    /// Initialises every instance for the epoch `[t_start, t_stop]`.
    pub fn initialize_all(&mut self, t_start: f64, t_stop: f64) -> CosimResult<()> {
        for (settings, inst) in self.instances_mut() {
            inst.initialize(t_start, t_stop)
                .map_err(|e| CosimError::slave(&settings.name, inst.name(), e))?;
        }
        Ok(())
    }

    /// Runs one exchange on every instance, then refreshes host rules if needed.
    ///
    /// With a snapshot, outputs are replayed from it instead of being read.
    pub fn exchange_all(
        &mut self,
        host: &mut dyn HostModel,
        t: f64,
        h: f64,
        replay: Option<&Snapshot>,
    ) -> CosimResult<()> {
        let mut wrote_rules = false;
        for (index, (settings, inst)) in self.instances_mut().enumerate() {
            let stored = replay.and_then(|s| s.get(index));
            wrote_rules |= inst
                .exchange(host, t, h, stored)
                .map_err(|e| CosimError::slave(&settings.name, inst.name(), e))?;
        }
        if wrote_rules {
            host.refresh_rules();
        }
        Ok(())
    }

    /// Pushes the snapshot's input values into every freshly initialised instance.
    pub fn replay_inputs_all(&mut self, snapshot: &Snapshot) -> CosimResult<()> {
        for (index, (settings, inst)) in self.instances_mut().enumerate() {
            let Some(values) = snapshot.get(index) else { continue };
            inst.replay_inputs(values)
                .map_err(|e| CosimError::slave(&settings.name, inst.name(), e))?;
        }
        Ok(())
    }

    /// Releases every handle.
    pub fn free_all(&mut self, end_of_simulation: bool) -> CosimResult<()> {
        for (settings, inst) in self.instances_mut() {
            inst.free(end_of_simulation)
                .map_err(|e| CosimError::slave(&settings.name, inst.name(), e))?;
        }
        Ok(())
    }

    /// Drops every binding and loaded artifact.
    pub fn clear(&mut self) {
        self.packages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CosimConfig {
        CosimConfig::from_toml_str(
            r#"
[interface]
modes = ["package-import"]
working_root = "work"

[[package]]
file = "models/room.fmu"

[[package]]
file = "models/plant.fmu"

[[from_variable]]
key = "ZONE 1"
name = "Zone Mean Air Temperature"
package = "models/room.fmu"
instance = "a"
external_name = "TRoo"

[[from_variable]]
key = "ZONE 2"
name = "Zone Mean Air Temperature"
package = "models/room.fmu"
instance = "b"
external_name = "TRoo"

[[to_actuator]]
host_name = "yValve"
package = "models/plant.fmu"
instance = "p"
external_name = "y"
"#,
        )
        .expect("parse")
    }

    #[test]
    fn instances_get_distinct_working_dirs() {
        let reg = InstanceRegistry::from_config(&config()).expect("declarations valid");
        assert_eq!(reg.instance_count(), 3);
        let dirs: Vec<_> = reg.instances().map(|(_, i)| i.working_dir().to_path_buf()).collect();
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("work/room_a"),
                PathBuf::from("work/room_b"),
                PathBuf::from("work/plant_p"),
            ]
        );
        assert!(reg.find("MODELS/ROOM.FMU", "B").is_some());
    }

    #[test]
    fn declare_is_idempotent() {
        let mut reg = InstanceRegistry::from_config(&config()).expect("valid");
        reg.declare("models/room.fmu", "A").expect("same package");
        assert_eq!(reg.instance_count(), 3);
    }

    #[test]
    fn instance_reused_across_packages_rejected() {
        let mut reg = InstanceRegistry::from_config(&config()).expect("valid");
        let err = reg.declare("models/plant.fmu", "a");
        assert!(err.is_err_and(|e| e.field == "instance"));
    }

    #[test]
    fn unknown_package_and_empty_package_reported() {
        let mut cfg = config();
        cfg.to_actuator[0].package = "models/absent.fmu".into();
        let errors = InstanceRegistry::from_config(&cfg).expect_err("invalid");
        assert!(errors.iter().any(|e| e.message.contains("unknown package")));
        assert!(errors.iter().any(|e| e.message.contains("does not have any instances")));
    }
}
