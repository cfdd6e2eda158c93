//! Opal Kelly FrontPanel transport.
//!
//! Binds the FrontPanel C API at runtime. Register writes are wire-ins,
//! register reads are wire-outs and bulk reads come from a block pipe.

use crate::error::ControllerError;
use crate::transport::RegisterTransport;
use libloading::{Library, Symbol};
use log::{debug, info, warn};
use std::ffi::{CString, OsStr, c_char, c_int, c_long, c_ulong, c_void};
use std::fs;
use std::path::{Path, PathBuf};

/// FrontPanel's success code.
const OK_NO_ERROR: c_int = 0;

type Handle = *mut c_void;

/// A [`RegisterTransport`] backed by an Opal Kelly FPGA board.
///
/// The FPGA is configured with `bitfile` on every [`connect`](RegisterTransport::connect).
///
/// # Example
///
/// ```no_run
/// use celex_sdk::{Celex4Controller, FrontPanel, SensorController, SequenceManager};
///
/// let transport = FrontPanel::new("top.bit")?;
/// let mut sensor = Celex4Controller::new(transport, SequenceManager::celex4_builtin()?);
/// sensor.open_sensor()?;
/// # Ok::<(), celex_sdk::ControllerError>(())
/// ```
pub struct FrontPanel {
    lib: Library,
    handle: Handle,
    bitfile: PathBuf,
    serial: String,
    open: bool,
}

// Safety: the handle is only used through the library functions, and the
// Library outlives it. The transport is never shared between threads.
unsafe impl Send for FrontPanel {}

impl FrontPanel {
    /// Load the FrontPanel library from the system search path.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::Io`] if the bitfile cannot be accessed
    /// - [`ControllerError::Library`] if the library or a symbol cannot be loaded
    /// - [`ControllerError::TransportUnavailable`] if no device handle could be created
    pub fn new(bitfile: impl Into<PathBuf>) -> Result<Self, ControllerError> {
        Self::with_library(libloading::library_filename("okFrontPanel"), bitfile)
    }

    /// Load the FrontPanel library from an explicit path.
    pub fn with_library(library: impl AsRef<OsStr>, bitfile: impl Into<PathBuf>) -> Result<Self, ControllerError> {
        let bitfile = bitfile.into();
        fs::metadata(&bitfile)?;

        unsafe {
            let lib = Library::new(library.as_ref())?;

            type ConstructFn = unsafe extern "C" fn() -> Handle;
            let construct: Symbol<ConstructFn> = lib.get(b"okFrontPanel_Construct")?;
            let handle = construct();
            if handle.is_null() {
                return Err(ControllerError::TransportUnavailable);
            }
            debug!("FrontPanel library loaded from {:?}", library.as_ref());

            Ok(Self {
                lib,
                handle,
                bitfile,
                serial: String::new(),
                open: false,
            })
        }
    }

    /// Open the board with this serial number instead of the first one found.
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = serial.into();
        self
    }

    /// The bitfile loaded on connect.
    pub fn bitfile(&self) -> &Path {
        &self.bitfile
    }

    fn symbol<F>(&self, name: &[u8]) -> Option<Symbol<'_, F>> {
        match unsafe { self.lib.get::<F>(name) } {
            Ok(symbol) => Some(symbol),
            Err(e) => {
                warn!("FrontPanel: {}", e);
                None
            }
        }
    }

    fn open_device(&mut self) -> bool {
        let Ok(serial) = CString::new(self.serial.as_str()) else {
            warn!("FrontPanel: invalid serial number {:?}", self.serial);
            return false;
        };
        let Some(bitfile) = self.bitfile.to_str().and_then(|p| CString::new(p).ok()) else {
            warn!("FrontPanel: bitfile path is not representable: {}", self.bitfile.display());
            return false;
        };

        type OpenFn = unsafe extern "C" fn(Handle, *const c_char) -> c_int;
        type ConfigureFn = unsafe extern "C" fn(Handle, *const c_char) -> c_int;
        type EnabledFn = unsafe extern "C" fn(Handle) -> c_int;

        unsafe {
            let Some(open) = self.symbol::<OpenFn>(b"okFrontPanel_OpenBySerial") else {
                return false;
            };
            let code = open(self.handle, serial.as_ptr());
            if code != OK_NO_ERROR {
                warn!("FrontPanel: no device could be opened (code {})", code);
                return false;
            }

            let Some(configure) = self.symbol::<ConfigureFn>(b"okFrontPanel_ConfigureFPGA") else {
                return false;
            };
            let code = configure(self.handle, bitfile.as_ptr());
            if code != OK_NO_ERROR {
                warn!("FrontPanel: FPGA configuration failed (code {})", code);
                return false;
            }

            let Some(enabled) = self.symbol::<EnabledFn>(b"okFrontPanel_IsFrontPanelEnabled") else {
                return false;
            };
            if enabled(self.handle) == 0 {
                warn!("FrontPanel: support is not enabled in {}", self.bitfile.display());
                return false;
            }
        }
        true
    }
}

impl RegisterTransport for FrontPanel {
    fn connect(&mut self) -> bool {
        if self.open {
            return true;
        }
        if !self.bitfile.exists() {
            warn!("FrontPanel: bitfile {} does not exist", self.bitfile.display());
            return false;
        }
        self.open = self.open_device();
        if self.open {
            info!("FrontPanel: FPGA configured with {}", self.bitfile.display());
        }
        self.open
    }

    fn disconnect(&mut self) {
        if !self.open {
            return;
        }
        type CloseFn = unsafe extern "C" fn(Handle);
        if let Some(close) = self.symbol::<CloseFn>(b"okFrontPanel_Close") {
            unsafe { close(self.handle) };
        }
        self.open = false;
    }

    fn is_ready(&self) -> bool {
        if !self.open {
            return false;
        }
        type IsOpenFn = unsafe extern "C" fn(Handle) -> c_int;
        self.symbol::<IsOpenFn>(b"okFrontPanel_IsOpen")
            .is_some_and(|is_open| unsafe { is_open(self.handle) } != 0)
    }

    fn write_register(&mut self, address: u32, value: u32, mask: u32) -> bool {
        type SetWireInFn = unsafe extern "C" fn(Handle, c_int, c_ulong, c_ulong) -> c_int;
        type UpdateFn = unsafe extern "C" fn(Handle) -> c_int;

        let Some(set) = self.symbol::<SetWireInFn>(b"okFrontPanel_SetWireInValue") else {
            return false;
        };
        let Some(update) = self.symbol::<UpdateFn>(b"okFrontPanel_UpdateWireIns") else {
            return false;
        };
        unsafe {
            let code = set(self.handle, address as c_int, value.into(), mask.into());
            if code != OK_NO_ERROR {
                return false;
            }
            update(self.handle);
        }
        true
    }

    fn read_register(&mut self, address: u32, mask: u32) -> Option<u32> {
        type UpdateFn = unsafe extern "C" fn(Handle) -> c_int;
        type GetWireOutFn = unsafe extern "C" fn(Handle, c_int) -> c_ulong;

        let update = self.symbol::<UpdateFn>(b"okFrontPanel_UpdateWireOuts")?;
        let get = self.symbol::<GetWireOutFn>(b"okFrontPanel_GetWireOutValue")?;
        unsafe {
            update(self.handle);
            Some(get(self.handle, address as c_int) as u32 & mask)
        }
    }

    fn read_bulk(&mut self, endpoint: u32, block_size: u32, buf: &mut [u8]) -> i64 {
        type ReadPipeFn = unsafe extern "C" fn(Handle, c_int, c_int, c_long, *mut u8) -> c_long;

        let Some(read) = self.symbol::<ReadPipeFn>(b"okFrontPanel_ReadFromBlockPipeOut") else {
            return -1;
        };
        let len = c_long::try_from(buf.len()).unwrap_or(c_long::MAX);
        unsafe { read(self.handle, endpoint as c_int, block_size as c_int, len, buf.as_mut_ptr()).into() }
    }
}

impl Drop for FrontPanel {
    fn drop(&mut self) {
        self.disconnect();
        unsafe {
            type DestructFn = unsafe extern "C" fn(Handle);
            if let Ok(destruct) = self.lib.get::<DestructFn>(b"okFrontPanel_Destruct") {
                destruct(self.handle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_library() {
        let bitfile = tempfile::NamedTempFile::new().unwrap();
        let result = FrontPanel::with_library("/nonexistent/libokFrontPanel.so", bitfile.path());
        assert!(matches!(result, Err(ControllerError::Library(_))));
    }

    #[test]
    fn test_missing_bitfile() {
        let dir = tempfile::tempdir().unwrap();
        let result = FrontPanel::with_library("/nonexistent/libokFrontPanel.so", dir.path().join("top.bit"));
        match result {
            Err(ControllerError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            _ => panic!("expected an IO error"),
        }
    }
}
