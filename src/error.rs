//! Error types for every layer of the co-simulation bridge.
//!
//! Each layer owns a small enum; [`CosimError`] wraps them so the time stepper
//! can funnel any failure through one fatal path.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::fmi::{Causality, Status};
use crate::resolver::BindingKind;

/// Failure to map a host-side name to a handle.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("simulation model has no variable \"{name}\" with key \"{key}\"")]
    OutputNotFound { key: String, name: String },
    #[error("declares {kind} \"{name}\", but it was not found in the host model")]
    TargetNotFound { kind: BindingKind, name: String },
    #[error(
        "\"{name}\" is an ordinary rule {kind}, not an external interface {kind}; \
         declare it as externally writable"
    )]
    WrongDeclarationKind { kind: BindingKind, name: String },
}

/// Failure while moving strings or arrays across the binary interface boundary.
#[derive(Debug, Error)]
pub enum MarshalError {
    #[error("{field} is {len} bytes long, the buffer holds {capacity}")]
    BufferOverflow {
        field: String,
        len: usize,
        capacity: usize,
    },
    #[error("{field} contains an interior NUL byte")]
    InteriorNul { field: String },
    #[error("{refs} value references but {values} values")]
    LengthMismatch { refs: usize, values: usize },
}

/// Failure reported by the binary co-simulation interface.
#[derive(Debug, Error)]
pub enum SlaveError {
    #[error("cannot unpack \"{archive}\" into \"{dir}\": {reason}")]
    Unpack {
        archive: PathBuf,
        dir: PathBuf,
        reason: String,
    },
    #[error("invalid model description \"{path}\": {reason}")]
    ModelDescription { path: PathBuf, reason: String },
    #[error("no binaries for this platform at \"{0}\"")]
    LibraryPath(PathBuf),
    #[error("cannot load interface library: {0}")]
    Library(#[from] libloading::Error),
    #[error("version \"{found}\" differs from supported version {supported}")]
    Version {
        found: String,
        supported: &'static str,
    },
    #[error("no variable named \"{0}\" in the model description")]
    UnknownVariable(String),
    #[error("variable \"{name}\" is not an {expected} variable")]
    WrongCausality { name: String, expected: Causality },
    #[error("instantiation returned a null handle")]
    NullHandle,
    #[error("{call} called without a live handle")]
    NotInstantiated { call: &'static str },
    #[error("{call} returned status {status}")]
    Status { call: &'static str, status: Status },
    #[error("handle is still valid after free")]
    LeakedHandle,
    #[error(transparent)]
    Marshal(#[from] MarshalError),
}

/// Failure of the socket protocol client.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("did not find file \"{0}\"; it needs to be in the working directory")]
    DescriptorNotFound(PathBuf),
    #[error("invalid descriptor \"{path}\": {reason}")]
    Descriptor { path: PathBuf, reason: String },
    #[error("could not open socket to {addr}: {source}")]
    Connect { addr: String, source: io::Error },
    #[error("socket i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("malformed message from peer: {0}")]
    Protocol(String),
    #[error("peer closed the connection")]
    Closed,
    #[error("peer speaks protocol version {found}, expected {expected}")]
    Version { found: i32, expected: i32 },
}

/// Top-level error returned by every co-simulation operation.
#[derive(Debug, Error)]
pub enum CosimError {
    #[error("{} configuration error(s); preceding conditions cause termination", .0.len())]
    Config(Vec<ConfigError>),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("instance \"{instance}\" of package \"{package}\": {source}")]
    Slave {
        package: String,
        instance: String,
        source: SlaveError,
    },
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error(
        "too many variables to be exchanged: {outputs} outputs plus {inputs} inputs, \
         maximum allowed sum is {capacity}; raise interface.max_exchange_variables"
    )]
    TooManyVariables {
        outputs: usize,
        inputs: usize,
        capacity: usize,
    },
    #[error("socket communication failed at time = {hours:.2} hours: {source}")]
    Exchange { hours: f64, source: SocketError },
    #[error("received {received} double values, expected {expected}")]
    LengthMismatch { received: usize, expected: usize },
    #[error("run control has no weather-file run period; the external interface is inactive during sizing")]
    NoRunPeriod,
    #[error("external interface already stopped after a fatal error")]
    Stopped,
    #[error(transparent)]
    Marshal(#[from] MarshalError),
}

/// Convenience alias used throughout the crate.
pub type CosimResult<T> = Result<T, CosimError>;

impl CosimError {
    /// Wraps a binary-interface failure with the instance it happened in.
    pub fn slave(package: &str, instance: &str, source: SlaveError) -> Self {
        Self::Slave {
            package: package.to_string(),
            instance: instance.to_string(),
            source,
        }
    }
}
