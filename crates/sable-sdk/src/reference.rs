//! Registry-backed reference handles.
//!
//! A [`Ref`] pins one VM value in the registry so the host can hold it
//! beyond the stack operation that produced it. Each handle owns exactly
//! one registry slot; cloning registers a fresh slot, dropping releases.

use std::rc::Rc;

use sable_engine::{Kind, RegistryKey, Value, Vm};

use crate::error::Result;
use crate::stack::{FromSable, FromSableMulti, ToSable, ToSableMulti};

/// An owned handle to a VM value.
pub struct Ref {
    vm: Rc<Vm>,
    key: RegistryKey,
}

impl Ref {
    /// Pin the value at `idx` (the slot itself is left in place).
    pub fn from_slot(vm: &Vm, idx: i32) -> Result<Ref> {
        let v = vm.value(idx)?;
        vm.push(v);
        let key = vm.registry_ref()?;
        Ok(Ref {
            vm: vm.handle(),
            key,
        })
    }

    /// Pin an already-materialised value.
    pub(crate) fn from_value(vm: &Vm, v: Value) -> Result<Ref> {
        vm.push(v);
        let key = vm.registry_ref()?;
        Ok(Ref {
            vm: vm.handle(),
            key,
        })
    }

    /// The VM this handle belongs to.
    pub fn vm(&self) -> &Rc<Vm> {
        &self.vm
    }

    /// Re-materialise the referenced value on the stack.
    pub fn push(&self) -> Result<()> {
        self.vm.push_registry(self.key)?;
        Ok(())
    }

    /// Clone the referenced value without touching the stack.
    pub(crate) fn value(&self) -> Result<Value> {
        self.vm.registry_get(self.key).map_err(Into::into)
    }

    /// The kind of the referenced value.
    pub fn kind(&self) -> Kind {
        self.value().map(|v| v.kind()).unwrap_or(Kind::None)
    }
}

impl Clone for Ref {
    /// Cloning registers a fresh registry slot for the same value.
    fn clone(&self) -> Self {
        let v = self.value().unwrap_or(Value::Nil);
        Ref::from_value(&self.vm, v).expect("registry insertion cannot fail")
    }
}

impl Drop for Ref {
    fn drop(&mut self) {
        self.vm.registry_unref(self.key);
    }
}

/// Handles are equal when they belong to the same VM and pin the same
/// registry slot.
impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.vm, &other.vm) && self.key == other.key
    }
}

impl Eq for Ref {}

impl std::fmt::Debug for Ref {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ref")
            .field("key", &self.key)
            .field("kind", &self.kind())
            .finish()
    }
}

impl ToSable for Ref {
    const KIND: Kind = Kind::Poly;
    fn push_to(self, vm: &Vm) -> Result<usize> {
        vm.push(self.value()?);
        Ok(1)
    }
}

impl ToSable for &Ref {
    const KIND: Kind = Kind::Poly;
    fn push_to(self, vm: &Vm) -> Result<usize> {
        vm.push(self.value()?);
        Ok(1)
    }
}

impl FromSable for Ref {
    const KIND: Kind = Kind::Poly;
    fn from_stack(vm: &Vm, idx: i32) -> Result<Self> {
        Ref::from_slot(vm, idx)
    }
}

impl ToSableMulti for Ref {
    fn push_all(self, vm: &Vm) -> Result<usize> {
        self.push_to(vm)
    }
}

impl FromSableMulti for Ref {
    const COUNT: usize = 1;
    fn from_top(vm: &Vm) -> Result<Self> {
        Ref::from_slot(vm, -1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_and_rematerialise() {
        let vm = Vm::new();
        vm.push_integer(42);
        let r = Ref::from_slot(&vm, -1).unwrap();
        vm.pop(1).unwrap();
        assert_eq!(vm.top(), 0);

        r.push().unwrap();
        assert_eq!(vm.to_integer(-1).unwrap(), 42);
        vm.pop(1).unwrap();
        assert_eq!(r.kind(), Kind::Number);
    }

    #[test]
    fn clone_owns_a_distinct_slot() {
        let vm = Vm::new();
        vm.push_bytes(b"shared");
        let a = Ref::from_slot(&vm, -1).unwrap();
        vm.pop(1).unwrap();
        let b = a.clone();
        assert_ne!(a, b);
        drop(a);
        // b still resolves after a's slot is released
        b.push().unwrap();
        assert_eq!(&*vm.to_bytes(-1).unwrap(), b"shared");
        vm.pop(1).unwrap();
    }

    #[test]
    fn drop_releases_the_slot() {
        let vm = Vm::new();
        vm.push_integer(1);
        let r = Ref::from_slot(&vm, -1).unwrap();
        vm.pop(1).unwrap();
        drop(r);

        // the freed key is recycled by the next registration
        vm.push_integer(2);
        let r2 = Ref::from_slot(&vm, -1).unwrap();
        vm.pop(1).unwrap();
        r2.push().unwrap();
        assert_eq!(vm.to_integer(-1).unwrap(), 2);
        vm.pop(1).unwrap();
    }
}
