//! AMX host ABI
//!
//! The server hands the plugin a data table on `Load`. Slot `0x00` holds
//! `logprintf`, slot `0x10` the table of AMX API functions, of which only
//! `amx_GetAddr` and `amx_Register` are used.

pub mod string;

use std::ffi::{c_char, c_int, c_void, CString};
use std::ptr;
use std::sync::OnceLock;

use crate::core::encoding::{encode_document, TextEncoding};
use crate::error::{Error, Result};
use crate::log::HostLog;

/// A script cell
pub type Cell = i32;

/// Opaque script instance
#[repr(C)]
pub struct Amx {
    _private: [u8; 0],
}

/// Native function as the VM calls it. `params[0]` is the byte size of the
/// arguments that follow.
pub type AmxNative = unsafe extern "C" fn(amx: *mut Amx, params: *const Cell) -> Cell;

#[repr(C)]
pub struct AmxNativeInfo {
    pub name: *const c_char,
    pub func: AmxNative,
}

// Names point at static C string literals
unsafe impl Sync for AmxNativeInfo {}

pub type LogPrintfFn = unsafe extern "C" fn(format: *const c_char, ...);
type GetAddrFn = unsafe extern "C" fn(*mut Amx, Cell, *mut *mut Cell) -> c_int;
type RegisterFn = unsafe extern "C" fn(*mut Amx, *const AmxNativeInfo, c_int) -> c_int;

pub const SUPPORTS_VERSION: u32 = 0x0200;
pub const SUPPORTS_AMX_NATIVES: u32 = 0x10000;

pub const PLUGIN_DATA_LOGPRINTF: usize = 0x00;
pub const PLUGIN_DATA_AMX_EXPORTS: usize = 0x10;

pub const AMX_EXPORT_GET_ADDR: usize = 13;
pub const AMX_EXPORT_REGISTER: usize = 33;

pub const AMX_ERR_NONE: c_int = 0;
pub const AMX_ERR_MEMACCESS: c_int = 5;
pub const AMX_ERR_GENERAL: c_int = 27;

static EXPORTS: OnceLock<AmxExports> = OnceLock::new();

/// The AMX API functions the plugin calls
#[derive(Clone, Copy)]
pub struct AmxExports {
    get_addr: GetAddrFn,
    register: RegisterFn,
}

impl AmxExports {
    /// Read the functions out of the host's export table.
    ///
    /// # Safety
    ///
    /// `table` must be null or point to the AMX export table the server
    /// passes in the plugin data.
    pub unsafe fn from_table(table: *const *const c_void) -> Option<Self> {
        if table.is_null() {
            return None;
        }
        let (get_addr, register) =
            unsafe { (*table.add(AMX_EXPORT_GET_ADDR), *table.add(AMX_EXPORT_REGISTER)) };
        if get_addr.is_null() || register.is_null() {
            return None;
        }
        Some(AmxExports {
            get_addr: unsafe { std::mem::transmute::<*const c_void, GetAddrFn>(get_addr) },
            register: unsafe { std::mem::transmute::<*const c_void, RegisterFn>(register) },
        })
    }

    /// Make these the process-wide exports. The first install wins; the
    /// host passes the same table on every load.
    pub fn install(self) {
        let _ = EXPORTS.set(self);
    }

    pub fn installed() -> Result<AmxExports> {
        EXPORTS.get().copied().ok_or(Error::NotLoaded)
    }

    /// Physical address of the script cell at `amx_addr`.
    ///
    /// # Safety
    ///
    /// `amx` must be the live instance that issued the native call.
    pub unsafe fn address(&self, amx: *mut Amx, amx_addr: Cell) -> Result<*mut Cell> {
        let mut phys = ptr::null_mut();
        let code = unsafe { (self.get_addr)(amx, amx_addr, &mut phys) };
        if code != AMX_ERR_NONE || phys.is_null() {
            return Err(Error::Amx(code));
        }
        Ok(phys)
    }

    /// Register natives with a script.
    ///
    /// # Safety
    ///
    /// `amx` must be a live instance.
    pub unsafe fn register(&self, amx: *mut Amx, natives: &'static [AmxNativeInfo]) -> Result<()> {
        let count = c_int::try_from(natives.len()).unwrap_or(c_int::MAX);
        match unsafe { (self.register)(amx, natives.as_ptr(), count) } {
            AMX_ERR_NONE => Ok(()),
            code => Err(Error::Amx(code)),
        }
    }
}

/// Console output through the server's `logprintf`
#[derive(Clone, Copy)]
pub struct HostPrinter(LogPrintfFn);

impl HostPrinter {
    /// Take `logprintf` out of the plugin data table.
    ///
    /// # Safety
    ///
    /// `data` must be null or point to the plugin data table.
    pub unsafe fn from_plugin_data(data: *const *const c_void) -> Option<Self> {
        if data.is_null() {
            return None;
        }
        let printf = unsafe { *data.add(PLUGIN_DATA_LOGPRINTF) };
        if printf.is_null() {
            return None;
        }
        Some(HostPrinter(unsafe {
            std::mem::transmute::<*const c_void, LogPrintfFn>(printf)
        }))
    }
}

impl HostLog for HostPrinter {
    fn log(&self, message: &str) {
        // The console is byte oriented; scripts and configs are Latin-1
        let mut bytes = encode_document(message, TextEncoding::Latin1);
        bytes.retain(|&b| b != 0);
        let Ok(line) = CString::new(bytes) else {
            return;
        };
        unsafe { (self.0)(c"%s".as_ptr(), line.as_ptr()) }
    }
}
