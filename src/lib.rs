//! samp-xml - XML documents and XPath queries for SA-MP Pawn scripts
//!
//! Layers, bottom up:
//! - `core`: decoding, entities and the document parser
//! - `dom`: the generation-checked node arena shared by every document
//! - `xpath`: XPath 1.0 compilation and evaluation over the arena
//! - `bridge`: the script operations as safe methods
//! - `amx` and `natives`: the host ABI and the native table
//!
//! The server drives the plugin through the exports at the bottom of this
//! file.

use std::ffi::c_void;

pub mod amx;
pub mod bridge;
pub mod config;
pub mod core;
pub mod dom;
pub mod error;
pub mod log;
pub mod natives;
pub mod xpath;

use amx::{
    Amx, AmxExports, HostPrinter, AMX_ERR_GENERAL, AMX_ERR_NONE, PLUGIN_DATA_AMX_EXPORTS,
    SUPPORTS_AMX_NATIVES, SUPPORTS_VERSION,
};
use bridge::XmlBridge;
use config::BridgeConfig;
use error::Error;
use log::HostLog;

// ============================================================================
// Allocator Configuration
// ============================================================================

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

// ============================================================================
// Plugin Exports
// ============================================================================

#[no_mangle]
pub extern "system" fn Supports() -> u32 {
    SUPPORTS_VERSION | SUPPORTS_AMX_NATIVES
}

/// # Safety
///
/// `data` must be the plugin data table the server passes on load.
#[no_mangle]
pub unsafe extern "system" fn Load(data: *const *const c_void) -> bool {
    let Some(printer) = (unsafe { HostPrinter::from_plugin_data(data) }) else {
        return false;
    };
    let table = unsafe { *data.add(PLUGIN_DATA_AMX_EXPORTS) }.cast::<*const c_void>();
    let Some(exports) = (unsafe { AmxExports::from_table(table) }) else {
        printer.log("  XML plugin: AMX exports missing, not loaded");
        return false;
    };
    exports.install();

    natives::install(XmlBridge::new(BridgeConfig::default(), Box::new(printer)));
    log::init_tracing(printer);
    printer.log(&format!("  XML plugin {}", env!("CARGO_PKG_VERSION")));
    true
}

#[no_mangle]
pub extern "system" fn Unload() {
    if let Some(bridge) = natives::shutdown() {
        tracing::debug!(nodes = bridge.live_nodes(), "freeing documents");
    }
}

/// # Safety
///
/// `amx` must be the script instance being loaded.
#[no_mangle]
pub unsafe extern "system" fn AmxLoad(amx: *mut Amx) -> i32 {
    match unsafe { natives::register(amx) } {
        Ok(()) => AMX_ERR_NONE,
        Err(Error::Amx(code)) => code,
        Err(err) => {
            tracing::warn!(error = %err, "cannot register natives");
            AMX_ERR_GENERAL
        }
    }
}

#[no_mangle]
pub extern "system" fn AmxUnload(_amx: *mut Amx) -> i32 {
    AMX_ERR_NONE
}
