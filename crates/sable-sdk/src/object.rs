//! Kind-erased view over any VM value.

use sable_engine::{Kind, Vm};

use crate::error::Result;
use crate::reference::Ref;
use crate::stack::{FromSable, FromSableMulti, ToSable, ToSableMulti};

/// An owned handle to a VM value of any kind.
///
/// `Object` defers typing: probe with [`Object::is`], then extract with
/// [`Object::cast`]. Casting is always checked; a mismatch is an error,
/// never undefined behaviour.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Object(pub(crate) Ref);

impl Object {
    /// The underlying reference handle.
    pub fn as_ref_handle(&self) -> &Ref {
        &self.0
    }

    /// The kind of the referenced value.
    pub fn kind(&self) -> Kind {
        self.0.kind()
    }

    /// Whether the value would extract as `T`.
    pub fn is<T: FromSable>(&self) -> bool {
        T::KIND.matches(self.kind())
    }

    /// Checked extraction.
    pub fn cast<T: FromSable>(&self) -> Result<T> {
        let vm = self.0.vm();
        self.0.push()?;
        let out = T::from_stack(vm, -1);
        let _ = vm.pop(1);
        out
    }
}

impl ToSable for Object {
    const KIND: Kind = Kind::Poly;
    fn push_to(self, vm: &Vm) -> Result<usize> {
        vm.push(self.0.value()?);
        Ok(1)
    }
}

impl FromSable for Object {
    const KIND: Kind = Kind::Poly;
    fn from_stack(vm: &Vm, idx: i32) -> Result<Self> {
        Ok(Object(Ref::from_slot(vm, idx)?))
    }
}

impl ToSableMulti for Object {
    fn push_all(self, vm: &Vm) -> Result<usize> {
        self.push_to(vm)
    }
}

impl FromSableMulti for Object {
    const COUNT: usize = 1;
    fn from_top(vm: &Vm) -> Result<Self> {
        Object::from_stack(vm, -1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_then_cast() {
        let vm = Vm::new();
        vm.push_integer(42);
        let obj = Object::from_stack(&vm, -1).unwrap();
        vm.pop(1).unwrap();

        assert_eq!(obj.kind(), Kind::Number);
        assert!(obj.is::<i64>());
        assert!(!obj.is::<String>());
        assert_eq!(obj.cast::<i64>().unwrap(), 42);
        assert_eq!(vm.top(), 0);
    }

    #[test]
    fn cast_mismatch_is_an_error() {
        let vm = Vm::new();
        vm.push_bool(true);
        let obj = Object::from_stack(&vm, -1).unwrap();
        vm.pop(1).unwrap();

        let err = obj.cast::<String>().unwrap_err();
        assert_eq!(err.to_string(), "expected string, received boolean");
    }
}
