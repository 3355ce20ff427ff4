//! The Sable value model.
//!
//! A [`Value`] is a tagged slot on the VM's evaluation stack. Primitive
//! values are stored inline; strings, tables, functions, and userdata are
//! reference-counted heap cells shared across the stack, the globals table,
//! and the registry.

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::parser::ast::FuncBody;
use crate::vm::table::Table;
use crate::vm::Vm;

// ============================================================================
// Kind
// ============================================================================

/// The closed set of VM value kinds, plus the `Poly` wildcard.
///
/// `Poly` never appears in a stack slot; it is the "matches anything" kind
/// used by kind checks. `None` is the kind of an empty (out-of-range) slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// No value (slot index beyond the stack top)
    None,
    /// The nil value
    Nil,
    /// true / false
    Boolean,
    /// Integer or floating-point number
    Number,
    /// Byte string
    Str,
    /// Table
    Table,
    /// Script or native function
    Function,
    /// Full userdata (host aggregate owned or referenced by the VM)
    Userdata,
    /// Light userdata (bare host pointer, no metatable)
    LightUserdata,
    /// Coroutine handle (passed through opaquely)
    Thread,
    /// Wildcard: matches any kind
    Poly,
}

impl Kind {
    /// Human-readable kind name, as used in type errors.
    pub fn name(self) -> &'static str {
        match self {
            Kind::None => "no value",
            Kind::Nil => "nil",
            Kind::Boolean => "boolean",
            Kind::Number => "number",
            Kind::Str => "string",
            Kind::Table => "table",
            Kind::Function => "function",
            Kind::Userdata | Kind::LightUserdata => "userdata",
            Kind::Thread => "thread",
            Kind::Poly => "any",
        }
    }

    /// Whether a slot of kind `actual` satisfies this expected kind.
    pub fn matches(self, actual: Kind) -> bool {
        self == Kind::Poly || self == actual
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Value
// ============================================================================

/// A single VM value.
#[derive(Clone)]
pub enum Value {
    /// The nil value
    Nil,
    /// Boolean
    Boolean(bool),
    /// 64-bit integer
    Integer(i64),
    /// 64-bit float
    Number(f64),
    /// Byte string (embedded NULs allowed)
    Str(Rc<[u8]>),
    /// Table
    Table(Rc<Table>),
    /// Script function (closure)
    Function(Rc<ScriptFn>),
    /// Native (host) function
    Native(Rc<NativeFn>),
    /// Full userdata
    Userdata(Rc<Userdata>),
    /// Light userdata: a bare host pointer
    LightUserdata(*mut ()),
}

impl Value {
    /// Allocate a string value from bytes.
    pub fn str_from(bytes: &[u8]) -> Value {
        Value::Str(Rc::from(bytes))
    }

    /// The kind of this value.
    pub fn kind(&self) -> Kind {
        match self {
            Value::Nil => Kind::Nil,
            Value::Boolean(_) => Kind::Boolean,
            Value::Integer(_) | Value::Number(_) => Kind::Number,
            Value::Str(_) => Kind::Str,
            Value::Table(_) => Kind::Table,
            Value::Function(_) | Value::Native(_) => Kind::Function,
            Value::Userdata(_) => Kind::Userdata,
            Value::LightUserdata(_) => Kind::LightUserdata,
        }
    }

    /// Everything except `nil` and `false` is truthy.
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    /// Raw equality: numeric across integer/float, bytewise for strings,
    /// identity for heap values. Does not consult `__eq`.
    pub fn raw_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Integer(a), Value::Number(b)) | (Value::Number(b), Value::Integer(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Userdata(a), Value::Userdata(b)) => Rc::ptr_eq(a, b),
            (Value::LightUserdata(a), Value::LightUserdata(b)) => a == b,
            _ => false,
        }
    }

    /// Numeric coercion to f64 (integers widen, floats pass through).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Integer read; floats with an integral value narrow.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Number(n) => write!(f, "{}", fmt_number(*n)),
            Value::Str(s) => write!(f, "{:?}", String::from_utf8_lossy(s)),
            Value::Table(t) => write!(f, "table: {:p}", Rc::as_ptr(t)),
            Value::Function(v) => write!(f, "function: {:p}", Rc::as_ptr(v)),
            Value::Native(v) => write!(f, "function: builtin {}", v.name()),
            Value::Userdata(u) => write!(f, "userdata: {:p}", Rc::as_ptr(u)),
            Value::LightUserdata(p) => write!(f, "userdata: {:p}", p),
        }
    }
}

/// Format a float the way scripts expect (`9.0`, not `9`).
pub(crate) fn fmt_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.1}", n)
    } else {
        format!("{}", n)
    }
}

// ============================================================================
// Functions
// ============================================================================

/// A lexical scope: name → value, shared between a closure and its creator.
pub type Scope = Rc<RefCell<rustc_hash::FxHashMap<Rc<str>, Value>>>;

/// A script function value: a compiled body plus its captured scope chain.
pub struct ScriptFn {
    /// Diagnostic name ("chunk" for top-level chunks, otherwise the
    /// declaration name or "anonymous")
    pub name: Rc<str>,
    /// Parameter list and body
    pub body: Rc<FuncBody>,
    /// Captured enclosing scopes, innermost last
    pub captured: Vec<Scope>,
}

/// The calling convention for native functions.
///
/// Arguments are the current frame's slots `1..=top()`; the function pushes
/// its results and returns how many it pushed.
pub type NativeCallback = Box<dyn Fn(&Vm) -> Result<usize>>;

/// A host function callable from scripts.
pub struct NativeFn {
    name: String,
    func: NativeCallback,
}

impl NativeFn {
    /// Wrap a host callback under a diagnostic name.
    pub fn new(name: impl Into<String>, func: NativeCallback) -> Self {
        NativeFn {
            name: name.into(),
            func,
        }
    }

    /// Diagnostic name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the callback on the current frame.
    pub fn call(&self, vm: &Vm) -> Result<usize> {
        (self.func)(vm)
    }
}

// ============================================================================
// Userdata
// ============================================================================

/// VM-side storage for a host aggregate.
///
/// The payload is type-erased; the embedding layer downcasts it back. When
/// the last reference dies the payload is dropped, which runs the host
/// type's destructor exactly once (the `__gc` contract).
pub struct Userdata {
    data: RefCell<Box<dyn Any>>,
    meta: RefCell<Option<Rc<Table>>>,
}

impl Userdata {
    /// Box a payload with no metatable.
    pub fn new(payload: Box<dyn Any>) -> Self {
        Userdata {
            data: RefCell::new(payload),
            meta: RefCell::new(None),
        }
    }

    /// Shared borrow of the payload.
    pub fn borrow(&self) -> Result<Ref<'_, Box<dyn Any>>> {
        self.data
            .try_borrow()
            .map_err(|_| Error::Runtime("userdata is mutably borrowed".into()))
    }

    /// Exclusive borrow of the payload.
    pub fn borrow_mut(&self) -> Result<RefMut<'_, Box<dyn Any>>> {
        self.data
            .try_borrow_mut()
            .map_err(|_| Error::Runtime("userdata is already borrowed".into()))
    }

    /// The attached metatable, if any.
    pub fn metatable(&self) -> Option<Rc<Table>> {
        self.meta.borrow().clone()
    }

    /// Attach or replace the metatable.
    pub fn set_metatable(&self, meta: Option<Rc<Table>>) {
        *self.meta.borrow_mut() = meta;
    }
}
