//! The Sable virtual machine.
//!
//! The VM owns an evaluation stack of [`Value`] slots, a globals table, a
//! registry for host-held references, and the named-metatable map. All
//! methods take `&self`; state lives behind `RefCell`/`Cell` so host
//! callbacks holding an `Rc<Vm>` can re-enter the VM mid-call.
//!
//! Stack addressing follows the usual C-API convention: positive indices
//! count 1-based from the current frame's base, negative indices count
//! from the top (`-1` is the top slot).

pub mod interp;
pub mod stdlib;
pub mod table;
pub mod value;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Instant;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::parser;
use crate::vm::table::Table;
use crate::vm::value::{Kind, NativeCallback, NativeFn, ScriptFn, Userdata, Value};

pub use stdlib::Lib;

/// Token for a value parked in the registry.
pub type RegistryKey = usize;

/// Nesting limit for script/native call frames.
const MAX_CALL_DEPTH: usize = 200;

// ============================================================================
// Vm
// ============================================================================

/// A single-threaded Sable VM instance.
pub struct Vm {
    stack: RefCell<Vec<Value>>,
    /// Frame bases: `frames.last()` is the current frame's base. Slot `i`
    /// (1-based) of the current frame is `stack[base + i - 1]`.
    frames: RefCell<Vec<usize>>,
    globals: Rc<Table>,
    registry: RefCell<Registry>,
    metatables: RefCell<FxHashMap<String, Rc<Table>>>,
    depth: Cell<usize>,
    started: Instant,
    weak: RefCell<Weak<Vm>>,
}

#[derive(Default)]
struct Registry {
    slots: Vec<Option<Value>>,
    free: Vec<usize>,
}

impl Vm {
    /// Create a fresh VM with an empty stack and no libraries opened.
    pub fn new() -> Rc<Vm> {
        let vm = Rc::new(Vm {
            stack: RefCell::new(Vec::new()),
            frames: RefCell::new(vec![0]),
            globals: Rc::new(Table::new()),
            registry: RefCell::new(Registry::default()),
            metatables: RefCell::new(FxHashMap::default()),
            depth: Cell::new(0),
            started: Instant::now(),
            weak: RefCell::new(Weak::new()),
        });
        *vm.weak.borrow_mut() = Rc::downgrade(&vm);
        vm
    }

    /// A strong handle to this VM, for storage inside values and closures.
    pub fn handle(&self) -> Rc<Vm> {
        self.weak
            .borrow()
            .upgrade()
            .expect("VM accessed during teardown")
    }

    // ------------------------------------------------------------------
    // Stack addressing
    // ------------------------------------------------------------------

    fn base(&self) -> usize {
        *self.frames.borrow().last().unwrap_or(&0)
    }

    /// Number of slots in the current frame.
    pub fn top(&self) -> usize {
        self.stack.borrow().len() - self.base()
    }

    /// Resolve an index to its positive (frame-relative, 1-based) form.
    pub fn abs_index(&self, idx: i32) -> Result<usize> {
        let top = self.top() as i32;
        let abs = if idx > 0 { idx } else { top + idx + 1 };
        if abs >= 1 && abs <= top {
            Ok(abs as usize)
        } else {
            Err(Error::InvalidIndex(idx))
        }
    }

    /// Absolute position in the backing vector.
    fn slot(&self, idx: i32) -> Result<usize> {
        Ok(self.base() + self.abs_index(idx)? - 1)
    }

    /// Clone the value at `idx`.
    pub fn value(&self, idx: i32) -> Result<Value> {
        let at = self.slot(idx)?;
        Ok(self.stack.borrow()[at].clone())
    }

    /// The kind of the slot at `idx`; out-of-range reads as `Kind::None`.
    pub fn kind_of(&self, idx: i32) -> Kind {
        match self.value(idx) {
            Ok(v) => v.kind(),
            Err(_) => Kind::None,
        }
    }

    /// Human-readable name of a kind, as used in error messages.
    pub fn type_name(&self, kind: Kind) -> &'static str {
        kind.name()
    }

    // ------------------------------------------------------------------
    // Push / pop
    // ------------------------------------------------------------------

    /// Push any value.
    pub fn push(&self, v: Value) {
        self.stack.borrow_mut().push(v);
    }

    /// Pop `n` slots from the current frame.
    pub fn pop(&self, n: usize) -> Result<()> {
        if self.top() < n {
            return Err(Error::InvalidIndex(-(n as i32)));
        }
        let mut stack = self.stack.borrow_mut();
        let len = stack.len();
        stack.truncate(len - n);
        Ok(())
    }

    /// Push nil.
    pub fn push_nil(&self) {
        self.push(Value::Nil);
    }

    /// Push a boolean.
    pub fn push_bool(&self, b: bool) {
        self.push(Value::Boolean(b));
    }

    /// Push an integer.
    pub fn push_integer(&self, i: i64) {
        self.push(Value::Integer(i));
    }

    /// Push a float.
    pub fn push_number(&self, n: f64) {
        self.push(Value::Number(n));
    }

    /// Push a byte string.
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.push(Value::str_from(bytes));
    }

    /// Push a light userdata (bare pointer).
    pub fn push_light(&self, ptr: *mut ()) {
        self.push(Value::LightUserdata(ptr));
    }

    /// Wrap a host callback as a function value and push it.
    pub fn push_native(&self, name: impl Into<String>, func: NativeCallback) {
        self.push(Value::Native(Rc::new(NativeFn::new(name, func))));
    }

    // ------------------------------------------------------------------
    // Typed reads
    // ------------------------------------------------------------------

    fn type_err(&self, expected: &'static str, idx: i32) -> Error {
        Error::Type {
            expected,
            got: self.kind_of(idx).name(),
        }
    }

    /// Read an integer (integral floats narrow).
    pub fn to_integer(&self, idx: i32) -> Result<i64> {
        self.value(idx)?
            .as_integer()
            .ok_or_else(|| self.type_err("number", idx))
    }

    /// Read a float (integers widen).
    pub fn to_number(&self, idx: i32) -> Result<f64> {
        self.value(idx)?
            .as_number()
            .ok_or_else(|| self.type_err("number", idx))
    }

    /// Read a boolean by truthiness (never fails on an in-range slot).
    pub fn to_bool(&self, idx: i32) -> Result<bool> {
        Ok(self.value(idx)?.truthy())
    }

    /// Read a byte string.
    pub fn to_bytes(&self, idx: i32) -> Result<Rc<[u8]>> {
        match self.value(idx)? {
            Value::Str(s) => Ok(s),
            _ => Err(self.type_err("string", idx)),
        }
    }

    /// Read a table.
    pub fn to_table(&self, idx: i32) -> Result<Rc<Table>> {
        match self.value(idx)? {
            Value::Table(t) => Ok(t),
            _ => Err(self.type_err("table", idx)),
        }
    }

    /// Read a full userdata cell.
    pub fn to_userdata(&self, idx: i32) -> Result<Rc<Userdata>> {
        match self.value(idx)? {
            Value::Userdata(u) => Ok(u),
            _ => Err(self.type_err("userdata", idx)),
        }
    }

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    /// Create an empty table, push it, and return the cell.
    pub fn create_table(&self) -> Rc<Table> {
        let t = Rc::new(Table::new());
        self.push(Value::Table(t.clone()));
        t
    }

    /// `t[k]` with `__index` dispatch: pops the key from the top, pushes
    /// the result.
    pub fn get_table(&self, idx: i32) -> Result<()> {
        let target = self.value(idx)?;
        let key = self.value(-1)?;
        self.pop(1)?;
        let out = self.index_value(&target, &key)?;
        self.push(out);
        Ok(())
    }

    /// `t[k] = v` with `__newindex` dispatch: pops value then key.
    pub fn set_table(&self, idx: i32) -> Result<()> {
        let target = self.value(idx)?;
        let value = self.value(-1)?;
        let key = self.value(-2)?;
        self.pop(2)?;
        self.newindex_value(&target, key, value)
    }

    /// `t.name` with metamethod dispatch; pushes the result.
    pub fn get_field(&self, idx: i32, name: &str) -> Result<()> {
        let target = self.value(idx)?;
        let out = self.index_value(&target, &Value::str_from(name.as_bytes()))?;
        self.push(out);
        Ok(())
    }

    /// `t.name = v` with metamethod dispatch: pops the value from the top.
    pub fn set_field(&self, idx: i32, name: &str) -> Result<()> {
        let target = self.value(idx)?;
        let value = self.value(-1)?;
        self.pop(1)?;
        self.newindex_value(&target, Value::str_from(name.as_bytes()), value)
    }

    // ------------------------------------------------------------------
    // Metatables
    // ------------------------------------------------------------------

    /// Pop a table from the top and attach it as the metatable of the
    /// value at `idx` (tables and full userdata only).
    pub fn set_metatable(&self, idx: i32) -> Result<()> {
        let meta = match self.value(-1)? {
            Value::Table(t) => Some(t),
            Value::Nil => None,
            _ => return Err(self.type_err("table", -1)),
        };
        self.pop(1)?;
        match self.value(idx)? {
            Value::Table(t) => t.set_metatable(meta),
            Value::Userdata(u) => u.set_metatable(meta),
            _ => return Err(self.type_err("table", idx)),
        }
        Ok(())
    }

    /// Push the metatable of the value at `idx`. Returns false (pushing
    /// nothing) when it has none.
    pub fn get_metatable(&self, idx: i32) -> Result<bool> {
        let meta = match self.value(idx)? {
            Value::Table(t) => t.metatable(),
            Value::Userdata(u) => u.metatable(),
            _ => None,
        };
        match meta {
            Some(t) => {
                self.push(Value::Table(t));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Fetch-or-create a named metatable and push it. Returns true when
    /// the table was freshly created.
    pub fn new_metatable(&self, name: &str) -> bool {
        let mut map = self.metatables.borrow_mut();
        if let Some(t) = map.get(name) {
            self.push(Value::Table(t.clone()));
            return false;
        }
        let t = Rc::new(Table::new());
        map.insert(name.to_string(), t.clone());
        self.push(Value::Table(t));
        true
    }

    /// Push a previously registered named metatable, if any.
    pub fn push_metatable(&self, name: &str) -> bool {
        match self.metatables.borrow().get(name) {
            Some(t) => {
                self.push(Value::Table(t.clone()));
                true
            }
            None => false,
        }
    }

    /// Look up a named metatable without touching the stack.
    pub fn named_metatable(&self, name: &str) -> Option<Rc<Table>> {
        self.metatables.borrow().get(name).cloned()
    }

    /// Register (or alias) a metatable under a name without touching the
    /// stack.
    pub fn set_named_metatable(&self, name: &str, table: Rc<Table>) {
        self.metatables.borrow_mut().insert(name.to_string(), table);
    }

    // ------------------------------------------------------------------
    // Userdata
    // ------------------------------------------------------------------

    /// Box a host payload as full userdata and push it.
    pub fn new_userdata(&self, payload: Box<dyn Any>) -> Rc<Userdata> {
        let u = Rc::new(Userdata::new(payload));
        self.push(Value::Userdata(u.clone()));
        u
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Pop the top value and park it in the registry. Keys are recycled
    /// from a free list.
    pub fn registry_ref(&self) -> Result<RegistryKey> {
        let v = self.value(-1)?;
        self.pop(1)?;
        let mut reg = self.registry.borrow_mut();
        let key = match reg.free.pop() {
            Some(k) => {
                reg.slots[k] = Some(v);
                k
            }
            None => {
                reg.slots.push(Some(v));
                reg.slots.len() - 1
            }
        };
        Ok(key)
    }

    /// Release a registry slot. Idempotence is not supported: each key is
    /// released at most once by its owning handle.
    pub fn registry_unref(&self, key: RegistryKey) {
        let mut reg = self.registry.borrow_mut();
        if let Some(slot) = reg.slots.get_mut(key) {
            if slot.take().is_some() {
                reg.free.push(key);
            }
        }
    }

    /// Push the value parked under `key`.
    pub fn push_registry(&self, key: RegistryKey) -> Result<()> {
        self.push(self.registry_get(key)?);
        Ok(())
    }

    /// Clone the value parked under `key` without touching the stack.
    pub fn registry_get(&self, key: RegistryKey) -> Result<Value> {
        self.registry
            .borrow()
            .slots
            .get(key)
            .and_then(|s| s.clone())
            .ok_or_else(|| Error::Runtime(format!("stale registry key {key}")))
    }

    // ------------------------------------------------------------------
    // Globals
    // ------------------------------------------------------------------

    /// The globals table.
    pub fn globals(&self) -> Rc<Table> {
        self.globals.clone()
    }

    /// Write a global by name.
    pub fn set_global(&self, name: &str, v: Value) {
        self.globals.raw_set_str(name, v);
    }

    /// Read a global by name (absent reads nil).
    pub fn get_global(&self, name: &str) -> Value {
        self.globals.raw_get_str(name)
    }

    // ------------------------------------------------------------------
    // Loading and calling
    // ------------------------------------------------------------------

    /// Compile a chunk and push it as a zero-argument function.
    pub fn load(&self, src: &str, chunkname: &str) -> Result<()> {
        let block = parser::parse(src)?;
        let f = ScriptFn {
            name: Rc::from(chunkname),
            body: Rc::new(crate::parser::ast::FuncBody {
                params: Vec::new(),
                block,
            }),
            captured: Vec::new(),
        };
        self.push(Value::Function(Rc::new(f)));
        Ok(())
    }

    /// Read a file and compile it as a chunk.
    pub fn load_file(&self, path: &std::path::Path) -> Result<()> {
        let src = std::fs::read_to_string(path)?;
        let name = path.to_string_lossy().into_owned();
        self.load(&src, &name)
    }

    /// Protected call. The function sits below its `nargs` arguments at
    /// the top of the stack; on success both are replaced by the results,
    /// padded or truncated to `nresults` when one is requested. On error
    /// the stack is restored to its depth below the function and the
    /// error is returned.
    pub fn pcall(&self, nargs: usize, nresults: Option<usize>) -> Result<usize> {
        if self.top() < nargs + 1 {
            return Err(Error::InvalidIndex(-(nargs as i32 + 1)));
        }
        let func_at = self.stack.borrow().len() - nargs - 1;
        let func = self.stack.borrow()[func_at].clone();
        let args: Vec<Value> = self.stack.borrow()[func_at + 1..].to_vec();
        self.stack.borrow_mut().truncate(func_at);

        match self.call_value(&func, args) {
            Ok(mut results) => {
                if let Some(want) = nresults {
                    results.resize(want, Value::Nil);
                }
                let n = results.len();
                self.stack.borrow_mut().extend(results);
                Ok(n)
            }
            Err(e) => {
                self.stack.borrow_mut().truncate(func_at);
                Err(e)
            }
        }
    }

    /// Compile and run a chunk in one step, discarding results.
    pub fn run(&self, src: &str, chunkname: &str) -> Result<()> {
        self.load(src, chunkname)?;
        self.pcall(0, Some(0))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Frames and depth (used by the interpreter)
    // ------------------------------------------------------------------

    pub(crate) fn enter_frame(&self, base: usize) {
        self.frames.borrow_mut().push(base);
    }

    pub(crate) fn leave_frame(&self) {
        self.frames.borrow_mut().pop();
    }

    pub(crate) fn enter_call(&self) -> Result<()> {
        let d = self.depth.get() + 1;
        if d > MAX_CALL_DEPTH {
            return Err(Error::Runtime("call stack overflow".into()));
        }
        self.depth.set(d);
        Ok(())
    }

    pub(crate) fn leave_call(&self) {
        self.depth.set(self.depth.get() - 1);
    }

    pub(crate) fn raw_len(&self) -> usize {
        self.stack.borrow().len()
    }

    pub(crate) fn stack_ref(&self) -> std::cell::Ref<'_, Vec<Value>> {
        self.stack.borrow()
    }

    pub(crate) fn truncate_raw(&self, len: usize) {
        self.stack.borrow_mut().truncate(len);
    }

    /// Seconds since this VM was created (backs `os.clock`).
    pub fn clock(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Request a full collection. Reclamation is reference-counted and
    /// immediate, so this is a no-op provided for API parity.
    pub fn collect_garbage(&self) {}
}
