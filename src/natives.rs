//! Script natives
//!
//! Each native unpacks its cells, locks the process-wide bridge for the
//! whole call and turns the outcome into the cell the script expects.
//! Failures never cross the boundary: errors become the native's failure
//! value plus a tracing event, and panics are caught the same way.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, warn};

use crate::amx::string::{read_string, write_string};
use crate::amx::{Amx, AmxExports, AmxNativeInfo, Cell};
use crate::bridge::XmlBridge;
use crate::dom::{Direction, NodeId, NodeType};
use crate::error::{Error, Result};

static BRIDGE: Mutex<Option<XmlBridge>> = Mutex::new(None);

/// Calls run one at a time; a panic in an earlier call leaves the arena
/// consistent, so a poisoned lock is taken over as is.
fn lock() -> MutexGuard<'static, Option<XmlBridge>> {
    BRIDGE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Make `bridge` the instance every native works on.
pub fn install(bridge: XmlBridge) {
    *lock() = Some(bridge);
}

/// Take the bridge out, freeing every document when it is dropped.
pub fn shutdown() -> Option<XmlBridge> {
    lock().take()
}

/// Register the native table with a script.
///
/// # Safety
///
/// `amx` must be a live script instance.
pub unsafe fn register(amx: *mut Amx) -> Result<()> {
    unsafe { AmxExports::installed()?.register(amx, &NATIVES) }
}

// ============================================================================
// Argument access
// ============================================================================

/// The parameter block of one native call. Index 0 holds the byte size of
/// the arguments; arguments start at 1.
struct Args<'a> {
    amx: *mut Amx,
    exports: AmxExports,
    cells: &'a [Cell],
}

impl<'a> Args<'a> {
    /// # Safety
    ///
    /// `params` must be null or the parameter block the VM passed along
    /// with `amx`.
    unsafe fn new(amx: *mut Amx, params: *const Cell) -> Result<Self> {
        let exports = AmxExports::installed()?;
        let cells: &'a [Cell] = if params.is_null() {
            &[]
        } else {
            let bytes = usize::try_from(unsafe { *params }).unwrap_or(0);
            let count = bytes / std::mem::size_of::<Cell>();
            unsafe { std::slice::from_raw_parts(params, count + 1) }
        };
        Ok(Args { amx, exports, cells })
    }

    fn len(&self) -> usize {
        self.cells.len().saturating_sub(1)
    }

    fn cell(&self, index: usize) -> Cell {
        self.cells.get(index).copied().unwrap_or(0)
    }

    fn node(&self, index: usize) -> Result<NodeId> {
        let raw = self.cell(index) as u32;
        NodeId::from_raw(raw).ok_or(Error::InvalidHandle(raw))
    }

    fn string(&self, index: usize) -> Result<String> {
        // the VM resolved the address against this call's script
        let ptr = unsafe { self.exports.address(self.amx, self.cell(index))? };
        Ok(unsafe { read_string(ptr) })
    }

    /// A string argument where `""` or an omitted argument means "not
    /// supplied".
    fn optional(&self, index: usize) -> Result<Option<String>> {
        if index > self.len() {
            return Ok(None);
        }
        let text = self.string(index)?;
        Ok((!text.is_empty()).then_some(text))
    }

    /// Copy `text` into the buffer at `index`, sized by the cell at
    /// `maxlen`. Returns the characters written.
    fn write(&self, index: usize, text: &str, maxlen: usize) -> Result<Cell> {
        let maxlen = usize::try_from(self.cell(maxlen)).unwrap_or(0);
        let dest = unsafe { self.exports.address(self.amx, self.cell(index))? };
        let written = unsafe { write_string(dest, text, maxlen) };
        Ok(Cell::try_from(written).unwrap_or(Cell::MAX))
    }

    /// Write a result string, or clear the buffer and pass the error on.
    fn write_result(&self, index: usize, maxlen: usize, text: Result<String>) -> Result<Cell> {
        match text {
            Ok(text) => self.write(index, &text, maxlen),
            Err(err) => {
                self.write(index, "", maxlen)?;
                Err(err)
            }
        }
    }
}

fn handle(id: NodeId) -> Cell {
    id.into_raw() as Cell
}

fn optional_handle(id: Option<NodeId>) -> Cell {
    id.map_or(0, handle)
}

/// A `Float:` result travels as the bit pattern of an `f32`.
fn float_cell(value: f64) -> Cell {
    (value as f32).to_bits() as Cell
}

// ============================================================================
// Dispatch
// ============================================================================

/// Run `body` against the bridge and map every failure to `failure`.
///
/// # Safety
///
/// `amx` and `params` must be the arguments the VM passed to the native.
unsafe fn call_native<F>(
    name: &'static str,
    amx: *mut Amx,
    params: *const Cell,
    arity: usize,
    failure: Cell,
    body: F,
) -> Cell
where
    F: FnOnce(&mut XmlBridge, &Args<'_>) -> Result<Cell>,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<Cell> {
        let args = unsafe { Args::new(amx, params)? };
        if args.len() < arity {
            warn!(native = name, expected = arity, found = args.len(), "missing arguments");
            return Ok(failure);
        }
        let mut guard = lock();
        let bridge = guard.as_mut().ok_or(Error::NotLoaded)?;
        body(bridge, &args)
    }));

    match outcome {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            match err {
                // already on the console, or routine for scripts probing handles
                Error::Parse(_) | Error::InvalidHandle(_) => debug!(native = name, error = %err),
                _ => warn!(native = name, error = %err),
            }
            failure
        }
        Err(_) => {
            error!(native = name, "native panicked");
            failure
        }
    }
}

// ============================================================================
// Documents
// ============================================================================

unsafe extern "C" fn create_document(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe {
        call_native("XML_CreateDocument", amx, params, 1, 0, |bridge, args| {
            let filename = args.string(1)?;
            let version = args.optional(2)?;
            let encoding = args.optional(3)?;
            let doc = bridge.create_document(&filename, version.as_deref(), encoding.as_deref())?;
            Ok(handle(doc))
        })
    }
}

unsafe extern "C" fn load_document(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe {
        call_native("XML_LoadDocument", amx, params, 1, 0, |bridge, args| {
            let filename = args.string(1)?;
            Ok(handle(bridge.load_document(&filename)?))
        })
    }
}

unsafe extern "C" fn save_document(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe {
        call_native("XML_SaveDocument", amx, params, 1, 0, |bridge, args| {
            let doc = args.node(1)?;
            let target = args.optional(2)?;
            bridge.save_document(doc, target.as_deref())?;
            Ok(1)
        })
    }
}

unsafe extern "C" fn unload_document(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe {
        call_native("XML_UnloadDocument", amx, params, 1, 0, |bridge, args| {
            bridge.unload_document(args.node(1)?)?;
            Ok(1)
        })
    }
}

// ============================================================================
// Nodes
// ============================================================================

unsafe extern "C" fn create_node(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe {
        call_native("XML_CreateNode", amx, params, 2, 0, |bridge, args| {
            let parent = args.node(1)?;
            let value = args.string(2)?;
            let node_type = match args.len() {
                0..=2 => NodeType::Element,
                _ => NodeType::from_raw(args.cell(3)).unwrap_or(NodeType::Element),
            };
            Ok(handle(bridge.create_node(parent, &value, node_type)?))
        })
    }
}

unsafe extern "C" fn remove_child(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe {
        call_native("XML_RemoveChild", amx, params, 2, 0, |bridge, args| {
            bridge.remove_child(args.node(1)?, args.node(2)?)?;
            Ok(1)
        })
    }
}

unsafe extern "C" fn destroy_node(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe {
        call_native("XML_DestroyNode", amx, params, 1, 0, |bridge, args| {
            bridge.destroy_node(args.node(1)?)?;
            Ok(1)
        })
    }
}

unsafe fn navigate(
    name: &'static str,
    direction: Direction,
    amx: *mut Amx,
    params: *const Cell,
) -> Cell {
    unsafe {
        call_native(name, amx, params, 1, 0, |bridge, args| {
            let node = args.node(1)?;
            let filter = args.optional(2)?;
            Ok(optional_handle(bridge.navigate(node, direction, filter.as_deref())?))
        })
    }
}

unsafe extern "C" fn get_first_child(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe { navigate("XML_GetFirstChild", Direction::FirstChild, amx, params) }
}

unsafe extern "C" fn get_last_child(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe { navigate("XML_GetLastChild", Direction::LastChild, amx, params) }
}

unsafe extern "C" fn get_next_sibling(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe { navigate("XML_GetNextSibling", Direction::NextSibling, amx, params) }
}

unsafe extern "C" fn get_previous_sibling(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe { navigate("XML_GetPreviousSibling", Direction::PreviousSibling, amx, params) }
}

unsafe extern "C" fn get_parent(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe {
        call_native("XML_GetParent", amx, params, 1, 0, |bridge, args| {
            Ok(optional_handle(bridge.parent(args.node(1)?)?))
        })
    }
}

unsafe extern "C" fn get_value(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe {
        call_native("XML_GetValue", amx, params, 3, 0, |bridge, args| {
            let value = args
                .node(1)
                .and_then(|node| bridge.value(node).map(str::to_string));
            args.write_result(2, 3, value)
        })
    }
}

unsafe extern "C" fn set_value(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe {
        call_native("XML_SetValue", amx, params, 2, 0, |bridge, args| {
            let node = args.node(1)?;
            bridge.set_value(node, &args.string(2)?)?;
            Ok(1)
        })
    }
}

unsafe extern "C" fn get_node_type(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe {
        call_native("XML_GetNodeType", amx, params, 1, -1, |bridge, args| {
            Ok(bridge.node_type(args.node(1)?)?.as_raw())
        })
    }
}

// ============================================================================
// Attributes
// ============================================================================

/// 1 found, 0 not found, -1 for a bad handle or a node that is not an
/// element. The buffer is cleared unless the attribute was found.
unsafe extern "C" fn get_attribute(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe {
        call_native("XML_GetAttribute", amx, params, 4, -1, |bridge, args| {
            let name = args.string(2)?;
            let found = args
                .node(1)
                .and_then(|element| bridge.attribute(element, &name).map(|v| v.map(str::to_string)));
            match found {
                Ok(Some(value)) => {
                    args.write(3, &value, 4)?;
                    Ok(1)
                }
                Ok(None) => {
                    args.write(3, "", 4)?;
                    Ok(0)
                }
                Err(err) => {
                    args.write(3, "", 4)?;
                    Err(err)
                }
            }
        })
    }
}

unsafe extern "C" fn set_attribute(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe {
        call_native("XML_SetAttribute", amx, params, 3, 0, |bridge, args| {
            let element = args.node(1)?;
            bridge.set_attribute(element, &args.string(2)?, &args.string(3)?)?;
            Ok(1)
        })
    }
}

unsafe extern "C" fn remove_attribute(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe {
        call_native("XML_RemoveAttribute", amx, params, 2, 0, |bridge, args| {
            let element = args.node(1)?;
            Ok(Cell::from(bridge.remove_attribute(element, &args.string(2)?)?))
        })
    }
}

// ============================================================================
// XPath
// ============================================================================

unsafe extern "C" fn get_xpath_int(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe {
        call_native("XML_GetXPathInt", amx, params, 2, 0, |bridge, args| {
            bridge.xpath_int(args.node(1)?, &args.string(2)?)
        })
    }
}

unsafe extern "C" fn get_xpath_bool(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe {
        call_native("XML_GetXPathBool", amx, params, 2, 0, |bridge, args| {
            Ok(Cell::from(bridge.xpath_bool(args.node(1)?, &args.string(2)?)?))
        })
    }
}

unsafe extern "C" fn get_xpath_float(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe {
        call_native("XML_GetXPathFloat", amx, params, 2, 0, |bridge, args| {
            Ok(float_cell(bridge.xpath_double(args.node(1)?, &args.string(2)?)?))
        })
    }
}

unsafe extern "C" fn get_xpath_string(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe {
        call_native("XML_GetXPathString", amx, params, 4, 0, |bridge, args| {
            let result = args
                .node(1)
                .and_then(|node| Ok((node, args.string(2)?)))
                .and_then(|(node, query)| bridge.xpath_string(node, &query));
            args.write_result(3, 4, result)
        })
    }
}

unsafe extern "C" fn get_xpath_node(amx: *mut Amx, params: *const Cell) -> Cell {
    unsafe {
        call_native("XML_GetXPathNode", amx, params, 2, 0, |bridge, args| {
            Ok(optional_handle(bridge.xpath_node(args.node(1)?, &args.string(2)?)?))
        })
    }
}

pub static NATIVES: [AmxNativeInfo; 23] = [
    AmxNativeInfo { name: c"XML_CreateDocument".as_ptr(), func: create_document },
    AmxNativeInfo { name: c"XML_LoadDocument".as_ptr(), func: load_document },
    AmxNativeInfo { name: c"XML_SaveDocument".as_ptr(), func: save_document },
    AmxNativeInfo { name: c"XML_UnloadDocument".as_ptr(), func: unload_document },
    AmxNativeInfo { name: c"XML_CreateNode".as_ptr(), func: create_node },
    AmxNativeInfo { name: c"XML_RemoveChild".as_ptr(), func: remove_child },
    AmxNativeInfo { name: c"XML_DestroyNode".as_ptr(), func: destroy_node },
    AmxNativeInfo { name: c"XML_GetFirstChild".as_ptr(), func: get_first_child },
    AmxNativeInfo { name: c"XML_GetLastChild".as_ptr(), func: get_last_child },
    AmxNativeInfo { name: c"XML_GetNextSibling".as_ptr(), func: get_next_sibling },
    AmxNativeInfo { name: c"XML_GetPreviousSibling".as_ptr(), func: get_previous_sibling },
    AmxNativeInfo { name: c"XML_GetParent".as_ptr(), func: get_parent },
    AmxNativeInfo { name: c"XML_GetValue".as_ptr(), func: get_value },
    AmxNativeInfo { name: c"XML_SetValue".as_ptr(), func: set_value },
    AmxNativeInfo { name: c"XML_GetAttribute".as_ptr(), func: get_attribute },
    AmxNativeInfo { name: c"XML_SetAttribute".as_ptr(), func: set_attribute },
    AmxNativeInfo { name: c"XML_RemoveAttribute".as_ptr(), func: remove_attribute },
    AmxNativeInfo { name: c"XML_GetNodeType".as_ptr(), func: get_node_type },
    AmxNativeInfo { name: c"XML_GetXPathInt".as_ptr(), func: get_xpath_int },
    AmxNativeInfo { name: c"XML_GetXPathBool".as_ptr(), func: get_xpath_bool },
    AmxNativeInfo { name: c"XML_GetXPathFloat".as_ptr(), func: get_xpath_float },
    AmxNativeInfo { name: c"XML_GetXPathString".as_ptr(), func: get_xpath_string },
    AmxNativeInfo { name: c"XML_GetXPathNode".as_ptr(), func: get_xpath_node },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amx::string::{decode, encode};
    use crate::amx::{AmxNative, AMX_ERR_MEMACCESS, AMX_ERR_NONE, AMX_EXPORT_GET_ADDR, AMX_EXPORT_REGISTER};
    use crate::config::BridgeConfig;
    use crate::log::MemoryLog;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::ffi::{c_int, c_void, CStr};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const MEMORY_CELLS: usize = 2048;

    static SERIAL: Mutex<()> = Mutex::new(());
    static REGISTERED: AtomicUsize = AtomicUsize::new(0);

    // The fake script instance pointer is the base of its memory and
    // addresses are byte offsets into it.
    unsafe extern "C" fn fake_get_addr(amx: *mut Amx, addr: Cell, phys: *mut *mut Cell) -> c_int {
        let Ok(offset) = usize::try_from(addr) else {
            return AMX_ERR_MEMACCESS;
        };
        if offset % 4 != 0 || offset / 4 >= MEMORY_CELLS {
            return AMX_ERR_MEMACCESS;
        }
        unsafe { *phys = amx.cast::<Cell>().add(offset / 4) };
        AMX_ERR_NONE
    }

    unsafe extern "C" fn fake_register(_amx: *mut Amx, _natives: *const AmxNativeInfo, count: c_int) -> c_int {
        REGISTERED.store(count as usize, Ordering::SeqCst);
        AMX_ERR_NONE
    }

    fn install_fake_exports() {
        let mut table = [std::ptr::null::<c_void>(); 44];
        table[AMX_EXPORT_GET_ADDR] = fake_get_addr as *const c_void;
        table[AMX_EXPORT_REGISTER] = fake_register as *const c_void;
        unsafe { AmxExports::from_table(table.as_ptr()) }.unwrap().install();
    }

    fn native(name: &str) -> AmxNative {
        NATIVES
            .iter()
            .find(|n| unsafe { CStr::from_ptr(n.name) }.to_str() == Ok(name))
            .map(|n| n.func)
            .unwrap_or_else(|| panic!("no native {name}"))
    }

    struct Script {
        memory: Vec<Cell>,
        top: usize,
    }

    impl Script {
        fn new() -> Self {
            Script {
                memory: vec![0; MEMORY_CELLS],
                top: 0,
            }
        }

        fn store(&mut self, cells: &[Cell]) -> Cell {
            let at = self.top;
            self.memory[at..at + cells.len()].copy_from_slice(cells);
            self.top += cells.len();
            (at * 4) as Cell
        }

        fn string(&mut self, text: &str) -> Cell {
            self.store(&encode(text, text.chars().count() + 1))
        }

        fn buffer(&mut self, len: usize) -> Cell {
            self.store(&vec![-1; len])
        }

        fn read(&self, addr: Cell) -> String {
            decode(&self.memory[addr as usize / 4..])
        }

        fn amx(&mut self) -> *mut Amx {
            self.memory.as_mut_ptr().cast()
        }

        fn call(&mut self, name: &str, args: &[Cell]) -> Cell {
            let mut params = vec![(args.len() * 4) as Cell];
            params.extend_from_slice(args);
            let amx = self.amx();
            unsafe { native(name)(amx, params.as_ptr()) }
        }
    }

    struct Harness {
        _serial: MutexGuard<'static, ()>,
        dir: TempDir,
        log: MemoryLog,
        script: Script,
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            shutdown();
        }
    }

    fn harness() -> Harness {
        let serial = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
        install_fake_exports();
        let dir = tempfile::tempdir().unwrap();
        let log = MemoryLog::default();
        let config = BridgeConfig::with_root(format!("{}/", dir.path().display()));
        install(XmlBridge::new(config, Box::new(log.clone())));
        Harness {
            _serial: serial,
            dir,
            log,
            script: Script::new(),
        }
    }

    #[test]
    fn registers_every_native_once() {
        let mut h = harness();
        let amx = h.script.amx();
        unsafe { register(amx) }.unwrap();
        assert_eq!(REGISTERED.load(Ordering::SeqCst), NATIVES.len());

        let names: HashSet<_> = NATIVES
            .iter()
            .map(|n| unsafe { CStr::from_ptr(n.name) }.to_str().unwrap())
            .collect();
        assert_eq!(names.len(), NATIVES.len());
        assert!(names.iter().all(|n| n.starts_with("XML_")));
    }

    #[test]
    fn builds_saves_and_queries_a_document() {
        let mut h = harness();
        let s = &mut h.script;
        let (file, empty) = (s.string("natives.xml"), s.string(""));
        let doc = s.call("XML_CreateDocument", &[file, empty, empty]);
        assert_ne!(doc, 0);

        let name = s.string("root");
        let root = s.call("XML_CreateNode", &[doc, name, NodeType::Element.as_raw()]);
        let hello = s.string("hello");
        let text = s.call("XML_CreateNode", &[root, hello, NodeType::Text.as_raw()]);
        assert_eq!(s.call("XML_GetNodeType", &[text]), NodeType::Text.as_raw());

        let (id, seven) = (s.string("id"), s.string("7"));
        assert_eq!(s.call("XML_SetAttribute", &[root, id, seven]), 1);
        assert_eq!(s.call("XML_SaveDocument", &[doc, empty]), 1);
        assert!(h.dir.path().join("natives.xml").exists());

        let loaded = s.call("XML_LoadDocument", &[file]);
        assert_ne!(loaded, 0);
        let query = s.string("/root/@id");
        assert_eq!(s.call("XML_GetXPathInt", &[loaded, query]), 7);

        let buf = s.buffer(16);
        let query = s.string("/root");
        assert_eq!(s.call("XML_GetXPathString", &[loaded, query, buf, 16]), 5);
        assert_eq!(s.read(buf), "hello");

        let node = s.call("XML_GetXPathNode", &[loaded, query]);
        assert_eq!(s.call("XML_GetValue", &[node, buf, 16]), 4);
        assert_eq!(s.read(buf), "root");
        assert_eq!(s.call("XML_GetParent", &[node]), loaded);

        assert_eq!(s.call("XML_UnloadDocument", &[loaded]), 1);
        assert_eq!(s.call("XML_GetNodeType", &[node]), -1);
    }

    #[test]
    fn xpath_results_by_type() {
        let mut h = harness();
        fs_write(&h.dir, "q.xml", "<a><b>42</b><b>x</b></a>");
        let s = &mut h.script;
        let file = s.string("q.xml");
        let doc = s.call("XML_LoadDocument", &[file]);

        let quarter = s.string("/a/b[1] div 168");
        let bits = s.call("XML_GetXPathFloat", &[doc, quarter]);
        assert_eq!(f32::from_bits(bits as u32), 0.25);

        let exists = s.string("/a/b[2] = 'x'");
        assert_eq!(s.call("XML_GetXPathBool", &[doc, exists]), 1);
        let missing = s.string("/a/c");
        assert_eq!(s.call("XML_GetXPathBool", &[doc, missing]), 0);
        assert_eq!(s.call("XML_GetXPathNode", &[doc, missing]), 0);

        let broken = s.string("/a/b[");
        assert_eq!(s.call("XML_GetXPathInt", &[doc, broken]), 0);
        assert_eq!(s.call("XML_GetXPathFloat", &[doc, broken]), 0);
    }

    #[test]
    fn navigation_with_filters() {
        let mut h = harness();
        fs_write(&h.dir, "n.xml", "<list><note/><item/><note/><item/></list>");
        let s = &mut h.script;
        let file = s.string("n.xml");
        let doc = s.call("XML_LoadDocument", &[file]);
        let empty = s.string("");
        let list = s.call("XML_GetFirstChild", &[doc, empty]);

        let item = s.string("item");
        let first = s.call("XML_GetFirstChild", &[list, item]);
        let last = s.call("XML_GetLastChild", &[list, item]);
        assert_ne!(first, 0);
        assert_ne!(first, last);
        assert_eq!(s.call("XML_GetNextSibling", &[first, item]), last);
        assert_eq!(s.call("XML_GetPreviousSibling", &[last, item]), first);
        assert_eq!(s.call("XML_GetNextSibling", &[last, item]), 0);

        let missing = s.string("missing");
        assert_eq!(s.call("XML_GetFirstChild", &[list, missing]), 0);
        // filter omitted entirely
        assert_ne!(s.call("XML_GetFirstChild", &[list]), 0);
    }

    #[test]
    fn attribute_codes_distinguish_failures() {
        let mut h = harness();
        let s = &mut h.script;
        let (file, empty) = (s.string("attr.xml"), s.string(""));
        let doc = s.call("XML_CreateDocument", &[file, empty, empty]);
        let name = s.string("el");
        let el = s.call("XML_CreateNode", &[doc, name, NodeType::Element.as_raw()]);
        let text = s.call("XML_CreateNode", &[el, name, NodeType::Text.as_raw()]);

        let (key, value) = (s.string("key"), s.string("a value"));
        let buf = s.buffer(32);
        assert_eq!(s.call("XML_GetAttribute", &[el, key, buf, 32]), 0);
        assert_eq!(s.read(buf), "");
        assert_eq!(s.call("XML_SetAttribute", &[el, key, value]), 1);
        assert_eq!(s.call("XML_GetAttribute", &[el, key, buf, 32]), 1);
        assert_eq!(s.read(buf), "a value");
        assert_eq!(s.call("XML_GetAttribute", &[text, key, buf, 32]), -1);
        assert_eq!(s.read(buf), "");
        assert_eq!(s.call("XML_GetAttribute", &[0, key, buf, 32]), -1);

        assert_eq!(s.call("XML_RemoveAttribute", &[el, key]), 1);
        assert_eq!(s.call("XML_RemoveAttribute", &[el, key]), 0);
        assert_eq!(s.call("XML_SetAttribute", &[text, key, value]), 0);
    }

    #[test]
    fn stale_and_bogus_handles_return_sentinels() {
        let mut h = harness();
        let s = &mut h.script;
        let (file, empty) = (s.string("stale.xml"), s.string(""));
        let doc = s.call("XML_CreateDocument", &[file, empty, empty]);
        let name = s.string("p");
        let parent = s.call("XML_CreateNode", &[doc, name, NodeType::Element.as_raw()]);
        let child = s.call("XML_CreateNode", &[parent, name, NodeType::Element.as_raw()]);

        assert_eq!(s.call("XML_RemoveChild", &[doc, child]), 0);
        assert_eq!(s.call("XML_DestroyNode", &[parent]), 1);
        assert_eq!(s.call("XML_DestroyNode", &[parent]), 0);
        assert_eq!(s.call("XML_GetNodeType", &[child]), -1);

        let buf = s.buffer(8);
        assert_eq!(s.call("XML_GetValue", &[child, buf, 8]), 0);
        assert_eq!(s.read(buf), "");
        for bogus in [0, -1, 0x7FFF_FFFF] {
            assert_eq!(s.call("XML_GetNodeType", &[bogus]), -1);
            assert_eq!(s.call("XML_GetParent", &[bogus]), 0);
        }
        assert_eq!(s.call("XML_UnloadDocument", &[parent]), 0);
        assert_eq!(s.call("XML_UnloadDocument", &[doc]), 1);
    }

    #[test]
    fn load_failures_are_reported_and_return_zero() {
        let mut h = harness();
        let file = h.script.string("absent.xml");
        assert_eq!(h.script.call("XML_LoadDocument", &[file]), 0);
        assert_eq!(h.log.lines(), vec!["XML Error 2: Failed to open file (line: 0, col: 0)"]);
    }

    #[test]
    fn packed_string_arguments() {
        let mut h = harness();
        let packed: Vec<Cell> = [*b"pack", *b"ed.x", *b"ml\0\0"]
            .into_iter()
            .map(|b| u32::from_be_bytes(b) as Cell)
            .collect();
        let file = h.script.store(&packed);
        let empty = h.script.string("");
        let doc = h.script.call("XML_CreateDocument", &[file, empty, empty]);

        let buf = h.script.buffer(256);
        let written = h.script.call("XML_GetValue", &[doc, buf, 256]);
        let path = h.script.read(buf);
        assert!(path.ends_with("/packed.xml"));
        assert_eq!(written as usize, path.chars().count());
    }

    #[test]
    fn bad_arguments_never_reach_the_bridge() {
        let mut h = harness();
        // address outside script memory
        assert_eq!(h.script.call("XML_LoadDocument", &[-4]), 0);
        // too few arguments
        assert_eq!(h.script.call("XML_CreateNode", &[1]), 0);
        assert_eq!(h.script.call("XML_GetNodeType", &[]), -1);

        shutdown();
        let file = h.script.string("late.xml");
        assert_eq!(h.script.call("XML_CreateDocument", &[file]), 0);
    }

    fn fs_write(dir: &TempDir, name: &str, contents: &str) {
        std::fs::write(dir.path().join(name), contents).unwrap();
    }
}
