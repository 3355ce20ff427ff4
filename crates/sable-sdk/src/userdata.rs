//! Registering host types with the VM.
//!
//! A [`UserType`] registration builds two named metatables for a host
//! type `T`: the value form (under the registered name) and the reference
//! form (under `name*`). Both set `__index` to themselves and carry the
//! method trampolines; the value form also carries the constructor and is
//! exposed as a global, so `Name.new(...)` and `Name:new(...)` both
//! construct.
//!
//! Instances live in the VM as `Rc<RefCell<T>>` payloads. The host type's
//! destructor runs exactly once, when the last handle (VM or host side)
//! goes away.

use std::any::TypeId;
use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use sable_engine::{Kind, NativeFn, Value, Vm};

use crate::call::{call_syntax, CallSyntax};
use crate::error::{Error, Result};
use crate::stack::{FromSable, FromSableMulti, ToSable, ToSableMulti};

/// The closed set of metamethod names a registration may install.
pub const METAMETHOD_NAMES: [&str; 19] = [
    "__index",
    "__newindex",
    "__mode",
    "__call",
    "__metatable",
    "__tostring",
    "__len",
    "__gc",
    "__unm",
    "__add",
    "__sub",
    "__mul",
    "__div",
    "__mod",
    "__pow",
    "__concat",
    "__eq",
    "__lt",
    "__le",
];

/// Whether a method name is one of the recognised metamethods.
pub fn is_metamethod(name: &str) -> bool {
    METAMETHOD_NAMES.contains(&name)
}

/// Registry alias a type's metatables are filed under, so pushes and
/// extractions can find them from the `TypeId` alone.
fn type_alias<T: 'static>() -> String {
    format!("sable.type {:?}", TypeId::of::<T>())
}

fn ref_form(name: &str) -> String {
    format!("{name}*")
}

/// Pull the shared cell out of a userdata slot.
fn extract<T: 'static>(vm: &Vm, idx: i32) -> Result<Rc<RefCell<T>>> {
    let ud = vm.to_userdata(idx)?;
    let guard = ud.borrow()?;
    guard
        .downcast_ref::<Rc<RefCell<T>>>()
        .cloned()
        .ok_or_else(|| Error::Script(format!(
            "userdata is not a {}",
            std::any::type_name::<T>()
        )))
}

// ============================================================================
// Ud: shared instance handle
// ============================================================================

/// A shared handle to a live registered-type instance.
///
/// `Ud` is how bound methods accept instances of their own type as
/// arguments (including the receiver itself) without aliasing trouble:
/// extraction clones the cell, and the borrow happens only inside
/// [`Ud::with`] / [`Ud::with_mut`].
pub struct Ud<T> {
    cell: Rc<RefCell<T>>,
}

impl<T: 'static> Ud<T> {
    /// Wrap a host value for sharing with the VM.
    pub fn new(value: T) -> Ud<T> {
        Ud {
            cell: Rc::new(RefCell::new(value)),
        }
    }

    /// Run `f` against a shared borrow of the instance.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let guard = self
            .cell
            .try_borrow()
            .map_err(|_| Error::Script("instance is mutably borrowed".into()))?;
        Ok(f(&guard))
    }

    /// Run `f` against an exclusive borrow of the instance.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut guard = self
            .cell
            .try_borrow_mut()
            .map_err(|_| Error::Script("instance is already borrowed".into()))?;
        Ok(f(&mut guard))
    }

    /// Copy the instance out.
    pub fn get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Whether two handles address the same instance.
    pub fn ptr_eq(&self, other: &Ud<T>) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T> Clone for Ud<T> {
    fn clone(&self) -> Self {
        Ud {
            cell: self.cell.clone(),
        }
    }
}

impl<T: 'static> ToSable for Ud<T> {
    const KIND: Kind = Kind::Userdata;
    /// Pushes a reference-form userdata; requires the type to have been
    /// registered in this VM.
    fn push_to(self, vm: &Vm) -> Result<usize> {
        let meta = vm
            .named_metatable(&ref_form(&type_alias::<T>()))
            .ok_or_else(|| Error::Registration(format!(
                "type {} is not registered",
                std::any::type_name::<T>()
            )))?;
        let ud = vm.new_userdata(Box::new(self.cell));
        ud.set_metatable(Some(meta));
        Ok(1)
    }
}

impl<T: 'static> FromSable for Ud<T> {
    const KIND: Kind = Kind::Userdata;
    fn from_stack(vm: &Vm, idx: i32) -> Result<Self> {
        Ok(Ud {
            cell: extract::<T>(vm, idx)?,
        })
    }
}

impl<T: 'static> ToSableMulti for Ud<T> {
    fn push_all(self, vm: &Vm) -> Result<usize> {
        self.push_to(vm)
    }
}

impl<T: 'static> FromSableMulti for Ud<T> {
    const COUNT: usize = 1;
    fn from_top(vm: &Vm) -> Result<Self> {
        Ud::from_stack(vm, -1)
    }
}

// ============================================================================
// Constructor and method adapters
// ============================================================================

/// A host callable usable as a constructor overload for `T`.
pub trait SableCtor<T, A>: 'static {
    /// Number of script arguments this overload consumes.
    const ARITY: usize;

    /// Build a `T` from the frame slots starting at `first`.
    fn construct(&self, vm: &Vm, first: i32) -> Result<T>;
}

macro_rules! impl_ctor {
    ($n:expr $(, $arg:ident : $ty:ident)*) => {
        impl<FN, T $(, $ty)*> SableCtor<T, ($($ty,)*)> for FN
        where
            FN: Fn($($ty),*) -> T + 'static,
            $($ty: FromSable + 'static,)*
        {
            const ARITY: usize = $n;
            fn construct(&self, vm: &Vm, first: i32) -> Result<T> {
                #[allow(unused_mut, unused_variables)]
                let mut slot = first;
                $(
                    let $arg = $ty::from_stack(vm, slot)?;
                    slot += 1;
                )*
                let _ = vm;
                Ok((self)($($arg),*))
            }
        }
    };
}

impl_ctor!(0);
impl_ctor!(1, a: A);
impl_ctor!(2, a: A, b: B);
impl_ctor!(3, a: A, b: B, c: C);
impl_ctor!(4, a: A, b: B, c: C, d: D);
impl_ctor!(5, a: A, b: B, c: C, d: D, e: E);
impl_ctor!(6, a: A, b: B, c: C, d: D, e: E, f: F);
impl_ctor!(7, a: A, b: B, c: C, d: D, e: E, f: F, g: G);
impl_ctor!(8, a: A, b: B, c: C, d: D, e: E, f: F, g: G, h: H);

/// A host callable usable as a shared-receiver method on `T`.
pub trait SableMethod<T, A, R>: 'static {
    /// Number of script arguments after the receiver.
    const ARITY: usize;

    /// Invoke against the receiver, reading arguments from `first` on.
    fn invoke(&self, recv: &T, vm: &Vm, first: i32) -> Result<R>;
}

macro_rules! impl_method {
    ($n:expr $(, $arg:ident : $ty:ident)*) => {
        impl<FN, T, R $(, $ty)*> SableMethod<T, ($($ty,)*), R> for FN
        where
            FN: Fn(&T, $($ty),*) -> R + 'static,
            $($ty: FromSable + 'static,)*
        {
            const ARITY: usize = $n;
            fn invoke(&self, recv: &T, vm: &Vm, first: i32) -> Result<R> {
                #[allow(unused_mut, unused_variables)]
                let mut slot = first;
                $(
                    let $arg = $ty::from_stack(vm, slot)?;
                    slot += 1;
                )*
                let _ = vm;
                Ok((self)(recv, $($arg),*))
            }
        }
    };
}

impl_method!(0);
impl_method!(1, a: A);
impl_method!(2, a: A, b: B);
impl_method!(3, a: A, b: B, c: C);
impl_method!(4, a: A, b: B, c: C, d: D);
impl_method!(5, a: A, b: B, c: C, d: D, e: E);
impl_method!(6, a: A, b: B, c: C, d: D, e: E, f: F);
impl_method!(7, a: A, b: B, c: C, d: D, e: E, f: F, g: G);
impl_method!(8, a: A, b: B, c: C, d: D, e: E, f: F, g: G, h: H);

/// A host callable usable as an exclusive-receiver method on `T`.
pub trait SableMethodMut<T, A, R>: 'static {
    /// Number of script arguments after the receiver.
    const ARITY: usize;

    /// Invoke against the receiver, reading arguments from `first` on.
    fn invoke(&self, recv: &mut T, vm: &Vm, first: i32) -> Result<R>;
}

macro_rules! impl_method_mut {
    ($n:expr $(, $arg:ident : $ty:ident)*) => {
        impl<FN, T, R $(, $ty)*> SableMethodMut<T, ($($ty,)*), R> for FN
        where
            FN: Fn(&mut T, $($ty),*) -> R + 'static,
            $($ty: FromSable + 'static,)*
        {
            const ARITY: usize = $n;
            fn invoke(&self, recv: &mut T, vm: &Vm, first: i32) -> Result<R> {
                #[allow(unused_mut, unused_variables)]
                let mut slot = first;
                $(
                    let $arg = $ty::from_stack(vm, slot)?;
                    slot += 1;
                )*
                let _ = vm;
                Ok((self)(recv, $($arg),*))
            }
        }
    };
}

impl_method_mut!(0);
impl_method_mut!(1, a: A);
impl_method_mut!(2, a: A, b: B);
impl_method_mut!(3, a: A, b: B, c: C);
impl_method_mut!(4, a: A, b: B, c: C, d: D);
impl_method_mut!(5, a: A, b: B, c: C, d: D, e: E);
impl_method_mut!(6, a: A, b: B, c: C, d: D, e: E, f: F);
impl_method_mut!(7, a: A, b: B, c: C, d: D, e: E, f: F, g: G);
impl_method_mut!(8, a: A, b: B, c: C, d: D, e: E, f: F, g: G, h: H);

// ============================================================================
// UserType builder
// ============================================================================

type CtorThunk<T> = Rc<dyn Fn(&Vm, i32) -> Result<T>>;
type MethodThunk = Rc<dyn Fn(&Vm) -> sable_engine::Result<usize>>;

/// A pending registration of host type `T`.
pub struct UserType<T> {
    name: String,
    ctors: Vec<(usize, CtorThunk<T>)>,
    methods: Vec<(String, MethodThunk)>,
}

impl<T: 'static> UserType<T> {
    /// Start a registration under the given script-visible name.
    pub fn new(name: &str) -> UserType<T> {
        UserType {
            name: name.to_string(),
            ctors: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Add a constructor overload; overloads are dispatched by argument
    /// count.
    pub fn ctor<A, F: SableCtor<T, A>>(mut self, f: F) -> Self {
        self.ctors
            .push((F::ARITY, Rc::new(move |vm, first| f.construct(vm, first))));
        self
    }

    /// Add a shared-receiver method.
    ///
    /// Names from [`METAMETHOD_NAMES`] install as metamethods; any other
    /// double-underscore name is rejected when the registration is
    /// applied.
    pub fn method<A, R, F>(mut self, name: &str, f: F) -> Self
    where
        F: SableMethod<T, A, R>,
        R: ToSableMulti,
    {
        let thunk: MethodThunk = Rc::new(move |vm: &Vm| {
            let first = receiver_slot(vm, F::ARITY);
            let cell = extract::<T>(vm, first).map_err(Error::into_engine)?;
            let guard = cell
                .try_borrow()
                .map_err(|_| sable_engine::Error::Runtime("instance is mutably borrowed".into()))?;
            let out = f
                .invoke(&guard, vm, first + 1)
                .map_err(Error::into_engine)?;
            drop(guard);
            out.push_all(vm).map_err(Error::into_engine)
        });
        self.methods.push((name.to_string(), thunk));
        self
    }

    /// Add an exclusive-receiver method.
    pub fn method_mut<A, R, F>(mut self, name: &str, f: F) -> Self
    where
        F: SableMethodMut<T, A, R>,
        R: ToSableMulti,
    {
        let thunk: MethodThunk = Rc::new(move |vm: &Vm| {
            let first = receiver_slot(vm, F::ARITY);
            let cell = extract::<T>(vm, first).map_err(Error::into_engine)?;
            let mut guard = cell
                .try_borrow_mut()
                .map_err(|_| sable_engine::Error::Runtime("instance is already borrowed".into()))?;
            let out = f
                .invoke(&mut guard, vm, first + 1)
                .map_err(Error::into_engine)?;
            drop(guard);
            out.push_all(vm).map_err(Error::into_engine)
        });
        self.methods.push((name.to_string(), thunk));
        self
    }

    /// Validate and install the registration into `vm`.
    pub(crate) fn register(self, vm: &Vm) -> Result<()> {
        let mut ctors: FxHashMap<usize, CtorThunk<T>> = FxHashMap::default();
        for (arity, thunk) in self.ctors {
            if ctors.insert(arity, thunk).is_some() {
                return Err(Error::Registration(format!(
                    "'{}' has two constructors of arity {}",
                    self.name, arity
                )));
            }
        }

        let mut seen: FxHashMap<&str, ()> = FxHashMap::default();
        for (name, _) in &self.methods {
            // double-underscore names must come from the closed set
            if name.starts_with("__") && !is_metamethod(name) {
                return Err(Error::Registration(format!(
                    "'{}' registers '{}', which is not a recognised metamethod",
                    self.name, name
                )));
            }
            if seen.insert(name.as_str(), ()).is_some() {
                return Err(Error::Registration(format!(
                    "'{}' registers method '{}' twice",
                    self.name, name
                )));
            }
        }

        let value_mt = Rc::new(sable_engine::Table::new());
        let ref_mt = Rc::new(sable_engine::Table::new());
        // both forms resolve methods off themselves
        value_mt.raw_set_str("__index", Value::Table(value_mt.clone()));
        ref_mt.raw_set_str("__index", Value::Table(ref_mt.clone()));

        for (name, thunk) in &self.methods {
            let make = |thunk: MethodThunk| {
                Value::Native(Rc::new(NativeFn::new(
                    name.clone(),
                    Box::new(move |vm: &Vm| thunk(vm)),
                )))
            };
            value_mt.raw_set_str(name, make(thunk.clone()));
            ref_mt.raw_set_str(name, make(thunk.clone()));
        }

        let type_name = self.name.clone();
        let ctor = move |vm: &Vm| -> sable_engine::Result<usize> {
            // `Name:new(...)` carries the exposed global as slot 1
            let skip = match call_syntax(vm, &type_name) {
                CallSyntax::Colon => 1,
                CallSyntax::Dot => 0,
            };
            let argc = vm.top() - skip;
            let thunk = ctors.get(&argc).ok_or_else(|| sable_engine::Error::Arity {
                type_name: type_name.clone(),
                got: argc,
            })?;
            let instance = thunk(vm, skip as i32 + 1).map_err(Error::into_engine)?;
            let meta = vm
                .named_metatable(&type_alias::<T>())
                .ok_or_else(|| sable_engine::Error::Runtime(format!(
                    "type '{}' was unregistered",
                    type_name
                )))?;
            let ud = vm.new_userdata(Box::new(Rc::new(RefCell::new(instance))));
            ud.set_metatable(Some(meta));
            Ok(1)
        };
        value_mt.raw_set_str(
            "new",
            Value::Native(Rc::new(NativeFn::new("new", Box::new(ctor)))),
        );

        // file both forms under the script name and the TypeId alias
        vm.set_named_metatable(&self.name, value_mt.clone());
        vm.set_named_metatable(&type_alias::<T>(), value_mt.clone());
        vm.set_named_metatable(&ref_form(&self.name), ref_mt.clone());
        vm.set_named_metatable(&ref_form(&type_alias::<T>()), ref_mt);

        vm.set_global(&self.name, Value::Table(value_mt));
        Ok(())
    }
}

/// Slot of the method receiver under the last-N binding rule.
fn receiver_slot(vm: &Vm, arity: usize) -> i32 {
    (vm.top() + 1).saturating_sub(arity + 1) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metamethod_set_is_closed() {
        assert_eq!(METAMETHOD_NAMES.len(), 19);
        assert!(is_metamethod("__gc"));
        assert!(is_metamethod("__le"));
        assert!(!is_metamethod("__close"));
        assert!(!is_metamethod("new"));
    }

    #[test]
    fn duplicate_ctor_arity_is_rejected() {
        let vm = Vm::new();
        let err = UserType::<i64>::new("num")
            .ctor(|| 0i64)
            .ctor(|| 1i64)
            .register(&vm)
            .unwrap_err();
        assert!(matches!(err, Error::Registration(_)));
        assert!(err.to_string().contains("arity 0"));
    }

    #[test]
    fn unknown_metamethod_names_are_rejected() {
        let vm = Vm::new();
        let err = UserType::<i64>::new("num")
            .method("__close", |v: &i64| *v)
            .register(&vm)
            .unwrap_err();
        assert!(matches!(err, Error::Registration(_)));
        assert!(err.to_string().contains("__close"));

        // names from the closed set still register
        assert!(UserType::<i64>::new("num2")
            .method("__len", |v: &i64| *v)
            .register(&vm)
            .is_ok());
    }

    #[test]
    fn duplicate_method_name_is_rejected() {
        let vm = Vm::new();
        let err = UserType::<i64>::new("num")
            .method("get", |v: &i64| *v)
            .method("get", |v: &i64| *v + 1)
            .register(&vm)
            .unwrap_err();
        assert!(matches!(err, Error::Registration(_)));
    }

    #[test]
    fn pushing_an_unregistered_type_fails() {
        struct Ghost;
        let vm = Vm::new();
        let err = Ud::new(Ghost).push_to(&vm).unwrap_err();
        assert!(matches!(err, Error::Registration(_)));
    }

    #[test]
    fn ud_handles_share_one_instance() {
        let a = Ud::new(vec![1, 2, 3]);
        let b = a.clone();
        b.with_mut(|v| v.push(4)).unwrap();
        assert_eq!(a.with(|v| v.len()).unwrap(), 4);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&Ud::new(vec![1])));
    }
}
