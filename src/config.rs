//! TOML-based run configuration: coupling declarations, external packages,
//! variable bindings, and the demonstration host.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::host::calendar::days_in_month;
use crate::registry::InstanceRegistry;

/// Coupling protocol selected for a whole run.
///
/// `SocketMaster` and `PackageExport` both talk to an external master process
/// over the socket client; `PackageImport` drives external packages in-process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CouplingMode {
    SocketMaster,
    PackageImport,
    PackageExport,
}

impl CouplingMode {
    /// Returns `true` for the modes driven by the socket protocol client.
    pub fn uses_socket(self) -> bool {
        matches!(self, Self::SocketMaster | Self::PackageExport)
    }

    /// Human-readable name used in diagnostics.
    pub fn label(self) -> &'static str {
        match self {
            Self::SocketMaster => "socket-master",
            Self::PackageImport => "package-import",
            Self::PackageExport => "package-export",
        }
    }
}

impl fmt::Display for CouplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Top-level run configuration parsed from TOML.
///
/// All sections default to a run with no coupling declared, which simply
/// drives the demonstration host to completion.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CosimConfig {
    /// Coupling declaration and interface-wide settings.
    #[serde(default)]
    pub interface: InterfaceConfig,
    /// Demonstration host parameters.
    #[serde(default)]
    pub host: HostConfig,
    /// External model packages (embedded mode).
    #[serde(default, rename = "package")]
    pub packages: Vec<PackageConfig>,
    /// Host report variable -> external model input.
    #[serde(default)]
    pub from_variable: Vec<FromHostConfig>,
    /// External model output -> host schedule.
    #[serde(default)]
    pub to_schedule: Vec<ToHostConfig>,
    /// External model output -> host free variable.
    #[serde(default)]
    pub to_variable: Vec<ToHostConfig>,
    /// External model output -> host actuator.
    #[serde(default)]
    pub to_actuator: Vec<ToHostConfig>,
    /// Host schedules writable by a socket peer.
    #[serde(default)]
    pub external_schedule: Vec<ExternalEntityConfig>,
    /// Host free variables writable by a socket peer.
    #[serde(default)]
    pub external_variable: Vec<ExternalEntityConfig>,
    /// Host actuators writable by a socket peer.
    #[serde(default)]
    pub external_actuator: Vec<ExternalEntityConfig>,
}

/// Interface-wide settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterfaceConfig {
    /// Declared coupling modes; exactly zero or one may be present.
    pub modes: Vec<CouplingMode>,
    /// Maximum number of values exchanged over the socket (inputs + outputs).
    pub max_exchange_variables: usize,
    /// Root directory under which package instances are unpacked.
    pub working_root: PathBuf,
    /// Socket connection descriptor file.
    pub socket_config: PathBuf,
    /// Socket variable-mapping descriptor file.
    pub variables_config: PathBuf,
    /// Record every exchanged value for telemetry export.
    pub trace_exchanges: bool,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            modes: Vec::new(),
            max_exchange_variables: 1024,
            working_root: PathBuf::from("tmp-fmus"),
            socket_config: PathBuf::from("socket.cfg"),
            variables_config: PathBuf::from("variables.cfg"),
            trace_exchanges: false,
        }
    }
}

/// Demonstration host: a single thermal zone driven through warm-up and run days.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Zone time steps per hour (must divide 60).
    pub steps_per_hour: u32,
    /// Number of warm-up days before the run period.
    pub warmup_days: u32,
    /// Number of run-period days (must be > 0).
    pub run_days: u32,
    /// Month of the first run-period day (1-12).
    pub start_month: u32,
    /// Day of month of the first run-period day.
    pub start_day: u32,
    /// Whether the simulated year is a leap year.
    pub leap_year: bool,
    /// Whether the run control includes a weather-file run period.
    pub weather_run_period: bool,
    /// Seed for outdoor temperature noise.
    pub seed: u64,
    /// Zone key used for the zone report variables.
    pub zone: String,
    /// Envelope conductance (W/K).
    pub ua_w_per_k: f64,
    /// Zone thermal capacitance (J/K).
    pub capacitance_j_per_k: f64,
    /// Heater capacity (W).
    pub heater_max_w: f64,
    /// Proportional band of the heating thermostat (K).
    pub throttling_range_k: f64,
    /// Mean outdoor temperature (°C).
    pub outdoor_mean_c: f64,
    /// Daily outdoor temperature amplitude (K).
    pub outdoor_amplitude_c: f64,
    /// Outdoor temperature noise standard deviation (K).
    pub noise_std_c: f64,
    /// Initial zone air temperature (°C).
    pub initial_zone_c: f64,
    /// Initial heating setpoint schedule value (°C).
    pub heating_setpoint_c: f64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            steps_per_hour: 6,
            warmup_days: 2,
            run_days: 1,
            start_month: 1,
            start_day: 1,
            leap_year: false,
            weather_run_period: true,
            seed: 42,
            zone: "ZONE 1".to_string(),
            ua_w_per_k: 250.0,
            capacitance_j_per_k: 2.0e6,
            heater_max_w: 6000.0,
            throttling_range_k: 1.0,
            outdoor_mean_c: 2.0,
            outdoor_amplitude_c: 5.0,
            noise_std_c: 0.3,
            initial_zone_c: 18.0,
            heating_setpoint_c: 20.0,
        }
    }
}

/// One external model package declaration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageConfig {
    /// Path of the package archive; also the package name used by bindings.
    pub file: PathBuf,
    /// Communication time-out handed to the binary interface (ms).
    #[serde(default)]
    pub timeout_ms: f64,
    /// Whether the external tool should show a window.
    #[serde(default)]
    pub visible: bool,
    /// Whether the external tool may interact with the user.
    #[serde(default)]
    pub interactive: bool,
    /// Whether the external model should emit debug log messages.
    #[serde(default)]
    pub logging_on: bool,
}

impl PackageConfig {
    /// Package name as referenced by bindings.
    pub fn name(&self) -> String {
        self.file.display().to_string()
    }

    /// File name without directories or extension.
    pub fn stem(&self) -> String {
        self.file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name())
    }
}

/// Host report variable sent to an external model input.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FromHostConfig {
    /// Key of the host report variable (e.g. a zone name).
    pub key: String,
    /// Name of the host report variable.
    pub name: String,
    /// Owning package (its `file`).
    pub package: String,
    /// Owning instance.
    pub instance: String,
    /// Input variable name inside the external model.
    pub external_name: String,
}

/// External model output written into a host entity.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToHostConfig {
    /// Host schedule, variable or actuator name.
    pub host_name: String,
    /// Owning package (its `file`).
    pub package: String,
    /// Owning instance.
    pub instance: String,
    /// Output variable name inside the external model.
    pub external_name: String,
    /// Value used until the first exchange.
    #[serde(default)]
    pub initial_value: Option<f64>,
}

/// Host entity writable through the socket interface.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalEntityConfig {
    /// Entity name.
    pub name: String,
    /// Value used until the first exchange.
    #[serde(default)]
    pub initial_value: f64,
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"interface.modes"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    /// Creates a configuration error for `field`.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl CosimConfig {
    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("config", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// The single active coupling mode, if one is declared.
    pub fn active_mode(&self) -> Option<CouplingMode> {
        self.interface.modes.first().copied()
    }

    /// Instance names of `package`, in order of first appearance across bindings.
    pub fn instances_of(&self, package: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let referenced = self
            .from_variable
            .iter()
            .map(|b| (&b.package, &b.instance))
            .chain(self.to_bindings().map(|(_, b)| (&b.package, &b.instance)));
        for (pkg, inst) in referenced {
            if same_name(pkg, package) && !names.iter().any(|n| same_name(n, inst)) {
                names.push(inst.clone());
            }
        }
        names
    }

    /// All output bindings tagged with their section name.
    pub fn to_bindings(&self) -> impl Iterator<Item = (&'static str, &ToHostConfig)> {
        self.to_schedule
            .iter()
            .map(|b| ("to_schedule", b))
            .chain(self.to_variable.iter().map(|b| ("to_variable", b)))
            .chain(self.to_actuator.iter().map(|b| ("to_actuator", b)))
    }

    /// Validates all fields and returns every error found.
    ///
    /// Returns an empty vector if the configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        self.validate_modes(&mut errors);
        self.validate_host(&mut errors);
        if self.interface.max_exchange_variables == 0 {
            errors.push(ConfigError::new(
                "interface.max_exchange_variables",
                "must be > 0",
            ));
        }
        if self.active_mode() == Some(CouplingMode::PackageImport) {
            self.validate_packages(&mut errors);
        }
        errors
    }

    /// Advisory messages for declarations that will be ignored in this run.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let mode = self.active_mode();
        let socket = mode.is_some_and(CouplingMode::uses_socket);
        let import = mode == Some(CouplingMode::PackageImport);

        let socket_objects = [
            ("external_schedule", self.external_schedule.len()),
            ("external_variable", self.external_variable.len()),
            ("external_actuator", self.external_actuator.len()),
        ];
        if !socket {
            for (section, n) in socket_objects.into_iter().filter(|(_, n)| *n > 0) {
                warnings.push(format!(
                    "configuration contains {n} \"{section}\" object(s), but no socket coupling \
                     mode is enabled; values will not be updated"
                ));
            }
        }

        let import_objects = [
            ("package", self.packages.len()),
            ("from_variable", self.from_variable.len()),
            ("to_schedule", self.to_schedule.len()),
            ("to_variable", self.to_variable.len()),
            ("to_actuator", self.to_actuator.len()),
        ];
        if !import {
            for (section, n) in import_objects.into_iter().filter(|(_, n)| *n > 0) {
                warnings.push(format!(
                    "configuration contains {n} \"{section}\" object(s), but package-import is \
                     not enabled; values will not be updated"
                ));
            }
        } else {
            for pkg in &self.packages {
                let name = pkg.name();
                if !self.from_variable.iter().any(|b| same_name(&b.package, &name)) {
                    warnings.push(format!(
                        "package \"{name}\" is defined but has no input variables; check the \
                         from_variable declarations"
                    ));
                }
            }
        }
        warnings
    }

    fn validate_modes(&self, errors: &mut Vec<ConfigError>) {
        let mut counts: HashMap<CouplingMode, usize> = HashMap::new();
        for mode in &self.interface.modes {
            *counts.entry(*mode).or_default() += 1;
        }
        for (mode, n) in &counts {
            if *n > 1 {
                errors.push(ConfigError::new(
                    "interface.modes",
                    format!("cannot have more than one {mode} interface"),
                ));
            }
        }
        let has = |m| counts.contains_key(&m);
        if has(CouplingMode::SocketMaster) && has(CouplingMode::PackageExport) {
            errors.push(ConfigError::new(
                "interface.modes",
                "cannot have socket-master and package-export interfaces simultaneously",
            ));
        }
        if has(CouplingMode::PackageImport) && has(CouplingMode::PackageExport) {
            errors.push(ConfigError::new(
                "interface.modes",
                "cannot have package-import and package-export interfaces simultaneously",
            ));
        }
        if has(CouplingMode::SocketMaster) && has(CouplingMode::PackageImport) {
            errors.push(ConfigError::new(
                "interface.modes",
                "cannot have socket-master and package-import interfaces simultaneously",
            ));
        }
        if !self.interface.modes.is_empty() && !self.host.weather_run_period {
            errors.push(ConfigError::new(
                "host.weather_run_period",
                "a run period from the weather file must be simulated when an external \
                 interface is enabled, because the interface is not active during sizing",
            ));
        }
    }

    fn validate_host(&self, errors: &mut Vec<ConfigError>) {
        let h = &self.host;
        if h.steps_per_hour == 0 || 60 % h.steps_per_hour != 0 {
            errors.push(ConfigError::new(
                "host.steps_per_hour",
                "must be > 0 and divide 60",
            ));
        }
        if h.run_days == 0 {
            errors.push(ConfigError::new("host.run_days", "must be > 0"));
        }
        if !(1..=12).contains(&h.start_month) {
            errors.push(ConfigError::new("host.start_month", "must be in [1, 12]"));
        } else if h.start_day == 0 || h.start_day > days_in_month(h.start_month, h.leap_year) {
            errors.push(ConfigError::new(
                "host.start_day",
                format!("is not a day of month {}", h.start_month),
            ));
        }
        if h.capacitance_j_per_k <= 0.0 {
            errors.push(ConfigError::new("host.capacitance_j_per_k", "must be > 0"));
        }
        if h.throttling_range_k <= 0.0 {
            errors.push(ConfigError::new("host.throttling_range_k", "must be > 0"));
        }
    }

    fn validate_packages(&self, errors: &mut Vec<ConfigError>) {
        // Distinct files may not collapse onto the same working directory stem.
        for (i, a) in self.packages.iter().enumerate() {
            for b in &self.packages[i + 1..] {
                if same_name(&a.stem(), &b.stem()) && a.file != b.file {
                    errors.push(ConfigError::new(
                        "package.file",
                        format!(
                            "duplicate file names (but not same file) entered: \"{}\" and \"{}\"",
                            a.file.display(),
                            b.file.display()
                        ),
                    ));
                } else if a.file == b.file {
                    errors.push(ConfigError::new(
                        "package.file",
                        format!("package \"{}\" is declared twice", a.file.display()),
                    ));
                }
            }
        }

        if let Err(mut declared) = InstanceRegistry::from_config(self) {
            errors.append(&mut declared);
        }

        let mut seen: HashMap<(String, String, String), usize> = HashMap::new();
        for b in &self.from_variable {
            let key = (
                b.package.to_ascii_uppercase(),
                b.instance.to_ascii_uppercase(),
                b.external_name.to_ascii_uppercase(),
            );
            let n = seen.entry(key).or_default();
            *n += 1;
            if *n == 2 {
                errors.push(ConfigError::new(
                    "from_variable.external_name",
                    format!(
                        "input \"{}\" of instance \"{}\" is declared more than once",
                        b.external_name, b.instance
                    ),
                ));
            }
        }
    }
}

/// Case-insensitive name comparison, as used for every object name in the input.
pub fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
