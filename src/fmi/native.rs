//! Native co-simulation slaves loaded from shared libraries.
//!
//! Symbols follow the `<modelIdentifier>_fmi<Function>` naming of the
//! version 1.0 co-simulation interface. The library lives under
//! `binaries/<platform>/` inside the unpacked artifact.

use std::ffi::{c_char, c_int, c_void};
use std::path::{Path, PathBuf};
use std::ptr;

use libloading::{Library, Symbol};

use crate::error::SlaveError;
use crate::fmi::unpack::unpack_archive;
use crate::fmi::{CoSimSlave, InstantiateParams, ModelDescription, SlaveProvider, Status};
use crate::marshal::{RealBuffer, from_c_str, to_c_string};

const MIME_TYPE: &str = "application/x-fmu-sharedlibrary";

type Component = *mut c_void;

// The interface declares the logger variadic; the trailing arguments are
// never read here, so the fixed prefix is declared.
type LoggerFn = unsafe extern "C" fn(Component, *const c_char, c_int, *const c_char, *const c_char);
type AllocateFn = unsafe extern "C" fn(usize, usize) -> *mut c_void;
type FreeMemoryFn = unsafe extern "C" fn(*mut c_void);
type StepFinishedFn = unsafe extern "C" fn(Component, c_int);

#[repr(C)]
#[derive(Clone, Copy)]
struct CallbackFunctions {
    logger: LoggerFn,
    allocate_memory: AllocateFn,
    free_memory: FreeMemoryFn,
    step_finished: Option<StepFinishedFn>,
}

type GetVersionFn = unsafe extern "C" fn() -> *const c_char;
type InstantiateFn = unsafe extern "C" fn(
    *const c_char,
    *const c_char,
    *const c_char,
    *const c_char,
    f64,
    u8,
    u8,
    CallbackFunctions,
    u8,
) -> Component;
type InitializeFn = unsafe extern "C" fn(Component, f64, u8, f64) -> c_int;
type TerminateFn = unsafe extern "C" fn(Component) -> c_int;
type FreeInstanceFn = unsafe extern "C" fn(Component);
type GetRealFn = unsafe extern "C" fn(Component, *const u32, usize, *mut f64) -> c_int;
type SetRealFn = unsafe extern "C" fn(Component, *const u32, usize, *const f64) -> c_int;
type DoStepFn = unsafe extern "C" fn(Component, f64, f64, u8) -> c_int;

/// Resolved function table.
#[derive(Clone, Copy)]
struct Api {
    get_version: GetVersionFn,
    instantiate: InstantiateFn,
    initialize: InitializeFn,
    terminate: TerminateFn,
    free_instance: FreeInstanceFn,
    get_real: GetRealFn,
    set_real: SetRealFn,
    do_step: DoStepFn,
}

impl Api {
    /// Looks up every function the co-simulation loop needs.
    ///
    /// # Safety
    ///
    /// The library must export the named symbols with the declared signatures.
    unsafe fn load(lib: &Library, id: &str) -> Result<Self, SlaveError> {
        macro_rules! sym {
            ($ty:ty, $name:literal) => {{
                let symbol = format!("{id}_{}", $name);
                // SAFETY: signature fixed by the interface standard.
                let f: Symbol<'_, $ty> = unsafe { lib.get(symbol.as_bytes()) }?;
                *f
            }};
        }
        Ok(Self {
            get_version: sym!(GetVersionFn, "fmiGetVersion"),
            instantiate: sym!(InstantiateFn, "fmiInstantiateSlave"),
            initialize: sym!(InitializeFn, "fmiInitializeSlave"),
            terminate: sym!(TerminateFn, "fmiTerminateSlave"),
            free_instance: sym!(FreeInstanceFn, "fmiFreeSlaveInstance"),
            get_real: sym!(GetRealFn, "fmiGetReal"),
            set_real: sym!(SetRealFn, "fmiSetReal"),
            do_step: sym!(DoStepFn, "fmiDoStep"),
        })
    }
}

unsafe extern "C" fn log_message(
    _c: Component,
    instance: *const c_char,
    status: c_int,
    category: *const c_char,
    message: *const c_char,
) {
    // SAFETY: the model passes NUL-terminated strings or null.
    let (instance, category, message) =
        unsafe { (from_c_str(instance), from_c_str(category), from_c_str(message)) };
    match Status::from_raw(status) {
        Status::Ok | Status::Pending => log::debug!("[{instance}] {category}: {message}"),
        Status::Warning | Status::Discard => log::warn!("[{instance}] {category}: {message}"),
        Status::Error | Status::Fatal => log::error!("[{instance}] {category}: {message}"),
    }
}

unsafe extern "C" fn allocate_memory(nobj: usize, size: usize) -> *mut c_void {
    // SAFETY: calloc accepts any sizes and returns null on failure.
    unsafe { libc::calloc(nobj, size) }
}

unsafe extern "C" fn free_memory(obj: *mut c_void) {
    // SAFETY: obj was returned by allocate_memory or is null.
    unsafe { libc::free(obj) }
}

const CALLBACKS: CallbackFunctions = CallbackFunctions {
    logger: log_message,
    allocate_memory,
    free_memory,
    step_finished: None,
};

/// Platform directory under `binaries/`.
pub fn platform_dir() -> &'static str {
    match (std::env::consts::OS, cfg!(target_pointer_width = "64")) {
        ("windows", true) => "win64",
        ("windows", false) => "win32",
        ("macos", true) => "darwin64",
        ("macos", false) => "darwin32",
        (_, true) => "linux64",
        (_, false) => "linux32",
    }
}

/// Path of the shared library for `model_identifier` inside `dir`.
pub fn library_path(dir: &Path, model_identifier: &str) -> PathBuf {
    dir.join("binaries")
        .join(platform_dir())
        .join(format!("{model_identifier}.{}", std::env::consts::DLL_EXTENSION))
}

/// A shared-library slave.
///
/// Dropping it frees a still-live handle.
pub struct NativeSlave {
    description: ModelDescription,
    api: Api,
    handle: Component,
    last_status: Status,
    // Keeps the function table valid; dropped last.
    _library: Library,
}

impl NativeSlave {
    /// Loads the artifact unpacked in `dir`.
    ///
    /// # Errors
    ///
    /// Fails if the description is invalid, the platform library is absent,
    /// or a required symbol is missing.
    pub fn load(dir: &Path) -> Result<Self, SlaveError> {
        let description = ModelDescription::from_dir(dir)?;
        let path = library_path(dir, &description.model_identifier);
        if !path.is_file() {
            return Err(SlaveError::LibraryPath(path));
        }
        // SAFETY: loading runs the library's initialisers; artifacts are
        // trusted input of the run configuration.
        let library = unsafe { Library::new(&path) }?;
        // SAFETY: symbols are looked up with the standard signatures.
        let api = unsafe { Api::load(&library, &description.model_identifier) }?;
        log::info!(
            "loaded \"{}\" (model \"{}\", interface {})",
            path.display(),
            description.model_identifier,
            description.fmi_version
        );
        Ok(Self {
            description,
            api,
            handle: ptr::null_mut(),
            last_status: Status::Ok,
            _library: library,
        })
    }

    /// Version string the library reports.
    pub fn library_version(&self) -> String {
        // SAFETY: returns a static NUL-terminated string.
        unsafe { from_c_str((self.api.get_version)()) }
    }

    fn live(&self, call: &'static str) -> Result<Component, SlaveError> {
        if self.handle.is_null() {
            Err(SlaveError::NotInstantiated { call })
        } else {
            Ok(self.handle)
        }
    }

    fn record(&mut self, call: &'static str, raw: c_int) -> Result<(), SlaveError> {
        self.last_status = Status::from_raw(raw);
        self.last_status.check(call)
    }
}

impl CoSimSlave for NativeSlave {
    fn description(&self) -> &ModelDescription {
        &self.description
    }

    fn version(&self) -> String {
        let reported = self.library_version();
        if reported.is_empty() {
            self.description.fmi_version.clone()
        } else {
            reported
        }
    }

    fn instantiate(&mut self, params: &InstantiateParams) -> Result<(), SlaveError> {
        if !self.handle.is_null() {
            return Err(SlaveError::LeakedHandle);
        }
        let name = to_c_string("instance name", &params.instance_name)?;
        let guid = to_c_string("guid", &self.description.guid)?;
        let location = to_c_string(
            "location",
            &format!("file://{}", params.working_dir.display()),
        )?;
        let mime = to_c_string("mime type", MIME_TYPE)?;
        // SAFETY: every string outlives the call; callbacks are 'static.
        let handle = unsafe {
            (self.api.instantiate)(
                name.as_ptr(),
                guid.as_ptr(),
                location.as_ptr(),
                mime.as_ptr(),
                params.timeout_ms,
                u8::from(params.visible),
                u8::from(params.interactive),
                CALLBACKS,
                u8::from(params.logging_on),
            )
        };
        if handle.is_null() {
            return Err(SlaveError::NullHandle);
        }
        self.handle = handle;
        self.last_status = Status::Ok;
        Ok(())
    }

    fn initialize(&mut self, t_start: f64, t_stop: f64) -> Result<(), SlaveError> {
        let c = self.live("fmiInitializeSlave")?;
        // SAFETY: live handle from instantiate.
        let raw = unsafe { (self.api.initialize)(c, t_start, 1, t_stop) };
        self.record("fmiInitializeSlave", raw)
    }

    fn get_real(&mut self, buf: &mut RealBuffer) -> Result<(), SlaveError> {
        let c = self.live("fmiGetReal")?;
        if buf.is_empty() {
            return Ok(());
        }
        let n = buf.len();
        let refs = buf.refs().as_ptr();
        // SAFETY: `refs` and the value slice both hold `n` elements.
        let raw = unsafe { (self.api.get_real)(c, refs, n, buf.values_mut().as_mut_ptr()) };
        self.record("fmiGetReal", raw)
    }

    fn set_real(&mut self, buf: &RealBuffer) -> Result<(), SlaveError> {
        let c = self.live("fmiSetReal")?;
        if buf.is_empty() {
            return Ok(());
        }
        // SAFETY: both slices hold `buf.len()` elements.
        let raw = unsafe {
            (self.api.set_real)(c, buf.refs().as_ptr(), buf.len(), buf.values().as_ptr())
        };
        self.record("fmiSetReal", raw)
    }

    fn do_step(&mut self, t: f64, h: f64) -> Result<(), SlaveError> {
        let c = self.live("fmiDoStep")?;
        // SAFETY: live handle from instantiate.
        let raw = unsafe { (self.api.do_step)(c, t, h, 1) };
        self.record("fmiDoStep", raw)
    }

    fn free(&mut self, end_of_simulation: bool) -> Result<(), SlaveError> {
        if self.handle.is_null() {
            return Ok(());
        }
        let c = self.handle;
        // A slave that reported a fatal status must not be called again.
        if self.last_status != Status::Fatal {
            // SAFETY: live handle from instantiate.
            let status = Status::from_raw(unsafe { (self.api.terminate)(c) });
            if status != Status::Ok {
                log::warn!(
                    "fmiTerminateSlave of \"{}\" returned {status}",
                    self.description.model_identifier
                );
            }
            // SAFETY: handle is not used after this call.
            unsafe { (self.api.free_instance)(c) };
        }
        self.handle = ptr::null_mut();
        log::debug!(
            "freed instance of \"{}\" (end of simulation: {end_of_simulation})",
            self.description.model_identifier
        );
        Ok(())
    }

    fn is_instantiated(&self) -> bool {
        !self.handle.is_null()
    }
}

impl Drop for NativeSlave {
    fn drop(&mut self) {
        if let Err(e) = self.free(true) {
            log::warn!("releasing \"{}\": {e}", self.description.model_identifier);
        }
    }
}

/// Provider backed by zip extraction and dynamic loading.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeProvider;

impl SlaveProvider for NativeProvider {
    fn unpack(&self, archive: &Path, dir: &Path) -> Result<(), SlaveError> {
        unpack_archive(archive, dir)
    }

    fn load(&self, dir: &Path) -> Result<Box<dyn CoSimSlave>, SlaveError> {
        Ok(Box::new(NativeSlave::load(dir)?))
    }
}
