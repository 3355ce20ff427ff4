//! Binding host callables as VM functions.
//!
//! [`SableFn`] turns any `Fn` of arity 0..=8 whose parameters implement
//! [`FromSable`] and whose return implements
//! [`crate::stack::ToSableMulti`] into the engine's native-function ABI.
//! Arguments bind to the last N frame slots, so a colon-call receiver
//! sitting ahead of them is skipped naturally.

use std::rc::Rc;

use sable_engine::{NativeCallback, Value, Vm};

use crate::error::Error;
use crate::stack::{FromSable, ToSableMulti};

/// A host callable bindable as a VM function.
///
/// `A` is the argument tuple, `R` the (possibly multi-value) return type.
/// Both type parameters exist purely to steer impl selection.
pub trait SableFn<A, R>: 'static {
    /// Wrap the callable into the engine's native calling convention.
    fn into_callback(self) -> NativeCallback;
}

macro_rules! impl_sable_fn {
    ($n:expr $(, $arg:ident : $ty:ident)*) => {
        impl<FN, R $(, $ty)*> SableFn<($($ty,)*), R> for FN
        where
            FN: Fn($($ty),*) -> R + 'static,
            R: ToSableMulti,
            $($ty: FromSable + 'static,)*
        {
            fn into_callback(self) -> NativeCallback {
                Box::new(move |vm: &Vm| {
                    let wanted: usize = $n;
                    let top = vm.top();
                    #[allow(unused_mut, unused_variables)]
                    let mut slot = (top + 1).saturating_sub(wanted) as i32;
                    $(
                        let $arg = $ty::from_stack(vm, slot).map_err(Error::into_engine)?;
                        slot += 1;
                    )*
                    let out = (self)($($arg),*);
                    out.push_all(vm).map_err(Error::into_engine)
                })
            }
        }
    };
}

impl_sable_fn!(0);
impl_sable_fn!(1, a: A);
impl_sable_fn!(2, a: A, b: B);
impl_sable_fn!(3, a: A, b: B, c: C);
impl_sable_fn!(4, a: A, b: B, c: C, d: D);
impl_sable_fn!(5, a: A, b: B, c: C, d: D, e: E);
impl_sable_fn!(6, a: A, b: B, c: C, d: D, e: E, f: F);
impl_sable_fn!(7, a: A, b: B, c: C, d: D, e: E, f: F, g: G);
impl_sable_fn!(8, a: A, b: B, c: C, d: D, e: E, f: F, g: G, h: H);

/// Whether a native trampoline was invoked with dot or colon syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSyntax {
    /// `T.f(...)` — no implicit receiver
    Dot,
    /// `T:f(...)` — slot 1 is the receiver
    Colon,
}

/// Detect the call syntax of the current native frame for a registered
/// type: a colon call on the type's exposed global passes the type's own
/// metatable as the first argument.
pub fn call_syntax(vm: &Vm, type_name: &str) -> CallSyntax {
    if vm.top() >= 1 {
        if let (Ok(Value::Table(first)), Some(meta)) =
            (vm.value(1), vm.named_metatable(type_name))
        {
            if Rc::ptr_eq(&first, &meta) {
                return CallSyntax::Colon;
            }
        }
    }
    CallSyntax::Dot
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_engine::Vm;

    #[test]
    fn binds_arity_two() {
        let vm = Vm::new();
        let add = (|a: i64, b: i64| a + b).into_callback();
        vm.push_native("add", add);
        let f = vm.value(-1).unwrap();
        vm.pop(1).unwrap();
        let out = vm.call_value(&f, vec![Value::Integer(2), Value::Integer(3)]).unwrap();
        assert!(out[0].raw_eq(&Value::Integer(5)));
    }

    #[test]
    fn binds_arity_zero_and_multi_return() {
        let vm = Vm::new();
        vm.push_native("three", (|| (1i64, 2i64, 3i64)).into_callback());
        let f = vm.value(-1).unwrap();
        vm.pop(1).unwrap();
        let out = vm.call_value(&f, Vec::new()).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out[2].raw_eq(&Value::Integer(3)));
    }

    #[test]
    fn extra_leading_arguments_are_skipped() {
        let vm = Vm::new();
        vm.push_native("id", (|x: i64| x).into_callback());
        let f = vm.value(-1).unwrap();
        vm.pop(1).unwrap();
        // two args for a one-arg host fn binds the last one
        let out = vm
            .call_value(&f, vec![Value::Integer(7), Value::Integer(9)])
            .unwrap();
        assert!(out[0].raw_eq(&Value::Integer(9)));
    }

    #[test]
    fn argument_mismatch_surfaces_as_type_error() {
        let vm = Vm::new();
        vm.push_native("id", (|x: i64| x).into_callback());
        let f = vm.value(-1).unwrap();
        vm.pop(1).unwrap();
        let err = vm
            .call_value(&f, vec![Value::str_from(b"nope")])
            .unwrap_err();
        assert_eq!(err.to_string(), "expected number, received string");
    }
}
