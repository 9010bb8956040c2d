//! Typed adapter over the binary co-simulation interface.
//!
//! [`CoSimSlave`] is one loaded artifact with at most one live handle.
//! [`SlaveProvider`] knows how to unpack and load artifacts; the native
//! implementation lives in [`native`], tests substitute their own.

pub mod model_description;
pub mod native;
pub mod unpack;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::SlaveError;
use crate::marshal::RealBuffer;

pub use model_description::{ModelDescription, ScalarVariable};

/// The only artifact interface version this crate drives.
pub const SUPPORTED_VERSION: &str = "1.0";

/// Status code returned by every interface call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Warning,
    Discard,
    Error,
    Fatal,
    Pending,
}

impl Status {
    /// Maps the raw C enum value; unknown codes are treated as fatal.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Self::Ok,
            1 => Self::Warning,
            2 => Self::Discard,
            3 => Self::Error,
            5 => Self::Pending,
            _ => Self::Fatal,
        }
    }

    /// Raw C enum value.
    pub fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Warning => 1,
            Self::Discard => 2,
            Self::Error => 3,
            Self::Fatal => 4,
            Self::Pending => 5,
        }
    }

    /// Converts a non-OK status into [`SlaveError::Status`].
    ///
    /// # Errors
    ///
    /// Every status other than [`Status::Ok`].
    pub fn check(self, call: &'static str) -> Result<(), SlaveError> {
        match self {
            Self::Ok => Ok(()),
            status => Err(SlaveError::Status { call, status }),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::Warning => "Warning",
            Self::Discard => "Discard",
            Self::Error => "Error",
            Self::Fatal => "Fatal",
            Self::Pending => "Pending",
        };
        write!(f, "{name} ({})", self.code())
    }
}

/// Direction of a model variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Causality {
    Input,
    Output,
    Internal,
    None,
}

impl Causality {
    /// Parses the `causality` attribute; unknown values count as internal.
    pub fn from_attribute(s: &str) -> Self {
        match s {
            "input" => Self::Input,
            "output" => Self::Output,
            "none" => Self::None,
            _ => Self::Internal,
        }
    }
}

impl fmt::Display for Causality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Internal => "internal",
            Self::None => "none",
        })
    }
}

/// Arguments of an instantiation call.
#[derive(Debug, Clone, PartialEq)]
pub struct InstantiateParams {
    pub instance_name: String,
    /// Absolute path of the unpacked artifact.
    pub working_dir: PathBuf,
    pub timeout_ms: f64,
    pub visible: bool,
    pub interactive: bool,
    pub logging_on: bool,
}

/// One loaded artifact and its (optional) live handle.
///
/// Implementations free a still-live handle when dropped.
pub trait CoSimSlave {
    /// Metadata of the unpacked artifact.
    fn description(&self) -> &ModelDescription;

    /// Acquires the handle.
    fn instantiate(&mut self, params: &InstantiateParams) -> Result<(), SlaveError>;

    /// Primes the model for an epoch `[t_start, t_stop]`.
    fn initialize(&mut self, t_start: f64, t_stop: f64) -> Result<(), SlaveError>;

    /// Fills `buf` with the values of its references.
    fn get_real(&mut self, buf: &mut RealBuffer) -> Result<(), SlaveError>;

    /// Writes the values of `buf` to its references.
    fn set_real(&mut self, buf: &RealBuffer) -> Result<(), SlaveError>;

    /// Advances from `t` by `h`.
    fn do_step(&mut self, t: f64, h: f64) -> Result<(), SlaveError>;

    /// Terminates and releases the handle.
    fn free(&mut self, end_of_simulation: bool) -> Result<(), SlaveError>;

    /// Whether a handle is currently held.
    fn is_instantiated(&self) -> bool;

    /// Interface version the artifact reports.
    fn version(&self) -> String {
        self.description().fmi_version.clone()
    }

    /// Number of (input, output) variables the artifact declares.
    fn variable_counts(&self) -> (usize, usize) {
        let md = self.description();
        (md.count(Causality::Input), md.count(Causality::Output))
    }

    /// Value reference of a named variable with the expected causality.
    fn value_reference(&self, name: &str, causality: Causality) -> Result<u32, SlaveError> {
        self.description().value_reference(name, causality)
    }
}

/// Unpacks and loads artifacts.
pub trait SlaveProvider {
    /// Extracts `archive` into `dir`.
    fn unpack(&self, archive: &Path, dir: &Path) -> Result<(), SlaveError>;

    /// Loads the artifact previously unpacked into `dir`.
    fn load(&self, dir: &Path) -> Result<Box<dyn CoSimSlave>, SlaveError>;
}

/// Whether an artifact's interface version is the supported one.
///
/// Only the major.minor pair is compared, so "1.0" and "1.0.1" both match.
pub fn version_supported(found: &str) -> bool {
    let mut parts = found.trim().split('.');
    let major = parts.next();
    let minor = parts.next().unwrap_or("0");
    let mut supported = SUPPORTED_VERSION.split('.');
    major == supported.next() && Some(minor) == supported.next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for raw in 0..=5 {
            assert_eq!(Status::from_raw(raw).code(), raw);
        }
        assert_eq!(Status::from_raw(42), Status::Fatal);
        assert!(Status::Ok.check("fmiDoStep").is_ok());
        assert!(matches!(
            Status::Discard.check("fmiDoStep"),
            Err(SlaveError::Status {
                call: "fmiDoStep",
                status: Status::Discard
            })
        ));
    }

    #[test]
    fn version_check() {
        assert!(version_supported("1.0"));
        assert!(version_supported(" 1.0 "));
        assert!(!version_supported("2.0"));
        assert!(!version_supported("1.1"));
        assert!(!version_supported(""));
    }

    #[test]
    fn causality_parsing() {
        assert_eq!(Causality::from_attribute("input"), Causality::Input);
        assert_eq!(Causality::from_attribute("parameter"), Causality::Internal);
        assert_eq!(Causality::Output.to_string(), "output");
    }
}
