//! Typed view over callable VM values.

use std::marker::PhantomData;

use sable_engine::{Kind, Vm};

use crate::error::{Error, Result};
use crate::reference::Ref;
use crate::stack::{FromSable, FromSableMulti, ToSable, ToSableMulti};

/// An owned handle to a VM function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Function(pub(crate) Ref);

impl Function {
    pub(crate) fn from_ref(r: Ref) -> Result<Function> {
        match r.kind() {
            Kind::Function => Ok(Function(r)),
            got => Err(Error::TypeMismatch {
                expected: "function",
                got: got.name(),
            }),
        }
    }

    /// The underlying reference handle.
    pub fn as_ref_handle(&self) -> &Ref {
        &self.0
    }

    /// Call with typed arguments and a statically known return shape.
    ///
    /// The call is protected: script failures come back as
    /// [`Error::Script`] and the stack is left balanced. Extra returned
    /// values beyond `R`'s count are discarded; missing ones read as nil.
    pub fn call<A: ToSableMulti, R: FromSableMulti>(&self, args: A) -> Result<R> {
        let vm = self.0.vm();
        let entry = vm.top();
        let out = self.call_inner(vm, args);
        let excess = vm.top().saturating_sub(entry);
        if excess > 0 {
            let _ = vm.pop(excess);
        }
        out
    }

    fn call_inner<A: ToSableMulti, R: FromSableMulti>(&self, vm: &Vm, args: A) -> Result<R> {
        self.0.push()?;
        let nargs = args.push_all(vm)?;
        vm.pcall(nargs, Some(R::COUNT))?;
        R::from_top(vm)
    }
}

impl ToSable for Function {
    const KIND: Kind = Kind::Function;
    fn push_to(self, vm: &Vm) -> Result<usize> {
        vm.push(self.0.value()?);
        Ok(1)
    }
}

impl FromSable for Function {
    const KIND: Kind = Kind::Function;
    fn from_stack(vm: &Vm, idx: i32) -> Result<Self> {
        Function::from_ref(Ref::from_slot(vm, idx)?)
    }
}

impl ToSableMulti for Function {
    fn push_all(self, vm: &Vm) -> Result<usize> {
        self.push_to(vm)
    }
}

impl FromSableMulti for Function {
    const COUNT: usize = 1;
    fn from_top(vm: &Vm) -> Result<Self> {
        Function::from_stack(vm, -1)
    }
}

/// A VM function captured behind a fixed host signature.
///
/// `Callback` is how bound host functions accept script functions as
/// arguments: the host side owns the registry slot, so no reference cycle
/// forms between the VM and the closure.
pub struct Callback<A, R> {
    func: Function,
    _sig: PhantomData<fn(A) -> R>,
}

impl<A: ToSableMulti, R: FromSableMulti> Callback<A, R> {
    /// Invoke the captured function.
    pub fn invoke(&self, args: A) -> Result<R> {
        self.func.call(args)
    }
}

impl<A, R> Callback<A, R> {
    /// The untyped function handle.
    pub fn function(&self) -> &Function {
        &self.func
    }
}

impl<A, R> Clone for Callback<A, R> {
    fn clone(&self) -> Self {
        Callback {
            func: self.func.clone(),
            _sig: PhantomData,
        }
    }
}

impl<A, R> FromSable for Callback<A, R> {
    const KIND: Kind = Kind::Function;
    fn from_stack(vm: &Vm, idx: i32) -> Result<Self> {
        Ok(Callback {
            func: Function::from_stack(vm, idx)?,
            _sig: PhantomData,
        })
    }
}

impl<A, R> FromSableMulti for Callback<A, R> {
    const COUNT: usize = 1;
    fn from_top(vm: &Vm) -> Result<Self> {
        Callback::from_stack(vm, -1)
    }
}

impl<A, R> ToSable for Callback<A, R> {
    const KIND: Kind = Kind::Function;
    fn push_to(self, vm: &Vm) -> Result<usize> {
        self.func.push_to(vm)
    }
}
