//! Stack marshaling: the `ToSable` / `FromSable` trait pair.
//!
//! `ToSable` moves a host value onto the VM stack; `FromSable` reads one
//! back without consuming the slot. The multi-value companions carry
//! tuples across call boundaries. Every implementation here pushes or
//! reads exactly one slot; only the tuple impls span several.

use std::collections::HashMap;

use sable_engine::{Kind, Value, Vm};

use crate::error::{Error, Result};
use crate::types::{Bytes, LightUserdata, Nil};

// ============================================================================
// Core traits
// ============================================================================

/// Host → VM: push a value onto the stack.
pub trait ToSable {
    /// The VM kind this type pushes as.
    const KIND: Kind;

    /// Push the value, returning the number of slots occupied (one for
    /// every implementation in this module).
    fn push_to(self, vm: &Vm) -> Result<usize>;
}

/// VM → host: read a value from a stack slot.
///
/// Reads are non-destructive; the slot stays in place. A kind mismatch
/// reads as [`Error::TypeMismatch`] with "expected X, received Y" wording.
pub trait FromSable: Sized {
    /// The VM kind this type expects to find.
    const KIND: Kind;

    /// Read the slot at `idx` (positive from the frame base, negative
    /// from the top).
    fn from_stack(vm: &Vm, idx: i32) -> Result<Self>;
}

/// Host → VM: push a group of values (call arguments, return values).
pub trait ToSableMulti {
    /// Push everything, returning the slot count.
    fn push_all(self, vm: &Vm) -> Result<usize>;
}

/// VM → host: read a group of values off the top of the stack.
pub trait FromSableMulti: Sized {
    /// How many slots this group spans.
    const COUNT: usize;

    /// Read the top `COUNT` slots (leftmost value deepest).
    fn from_top(vm: &Vm) -> Result<Self>;
}

// ============================================================================
// Helpers
// ============================================================================

/// Read the top slot and shrink the stack by one. The slot is consumed
/// whether or not the read succeeds, so callers stay stack-balanced on
/// the error path.
pub fn pop<T: FromSable>(vm: &Vm) -> Result<T> {
    let v = T::from_stack(vm, -1);
    vm.pop(1).map_err(Error::from)?;
    v
}

/// Verify that the slot at `idx` holds a value of `T`'s kind, reporting
/// mismatches through `handler`. `Kind::Poly` expectations match any slot.
pub fn check_with<T: FromSable>(
    vm: &Vm,
    idx: i32,
    handler: impl FnOnce(Kind, Kind) -> Error,
) -> Result<()> {
    let got = vm.kind_of(idx);
    if T::KIND.matches(got) {
        Ok(())
    } else {
        Err(handler(T::KIND, got))
    }
}

/// [`check_with`] using the default type-mismatch error.
pub fn check<T: FromSable>(vm: &Vm, idx: i32) -> Result<()> {
    check_with::<T>(vm, idx, |expected, got| Error::TypeMismatch {
        expected: expected.name(),
        got: got.name(),
    })
}

// ============================================================================
// Scalars
// ============================================================================

impl ToSable for i64 {
    const KIND: Kind = Kind::Number;
    fn push_to(self, vm: &Vm) -> Result<usize> {
        vm.push_integer(self);
        Ok(1)
    }
}

impl FromSable for i64 {
    const KIND: Kind = Kind::Number;
    fn from_stack(vm: &Vm, idx: i32) -> Result<Self> {
        vm.to_integer(idx).map_err(Error::from)
    }
}

macro_rules! int_via_i64 {
    ($($t:ty),*) => {$(
        impl ToSable for $t {
            const KIND: Kind = Kind::Number;
            fn push_to(self, vm: &Vm) -> Result<usize> {
                vm.push_integer(self as i64);
                Ok(1)
            }
        }
        impl FromSable for $t {
            const KIND: Kind = Kind::Number;
            fn from_stack(vm: &Vm, idx: i32) -> Result<Self> {
                Ok(vm.to_integer(idx)? as $t)
            }
        }
    )*};
}

int_via_i64!(i8, i16, i32, isize);

// Unsigned widths route through the signed representation: pushing keeps
// the two's-complement bit pattern, and narrowing reads wrap rather than
// error.
int_via_i64!(u8, u16, u32, u64, usize);

impl ToSable for f64 {
    const KIND: Kind = Kind::Number;
    fn push_to(self, vm: &Vm) -> Result<usize> {
        vm.push_number(self);
        Ok(1)
    }
}

impl FromSable for f64 {
    const KIND: Kind = Kind::Number;
    fn from_stack(vm: &Vm, idx: i32) -> Result<Self> {
        vm.to_number(idx).map_err(Error::from)
    }
}

impl ToSable for f32 {
    const KIND: Kind = Kind::Number;
    fn push_to(self, vm: &Vm) -> Result<usize> {
        vm.push_number(self as f64);
        Ok(1)
    }
}

impl FromSable for f32 {
    const KIND: Kind = Kind::Number;
    fn from_stack(vm: &Vm, idx: i32) -> Result<Self> {
        Ok(vm.to_number(idx)? as f32)
    }
}

impl ToSable for bool {
    const KIND: Kind = Kind::Boolean;
    fn push_to(self, vm: &Vm) -> Result<usize> {
        vm.push_bool(self);
        Ok(1)
    }
}

impl FromSable for bool {
    const KIND: Kind = Kind::Boolean;
    /// Reads by truthiness: nil and false are false, everything else true.
    fn from_stack(vm: &Vm, idx: i32) -> Result<Self> {
        vm.to_bool(idx).map_err(Error::from)
    }
}

// ============================================================================
// Strings
// ============================================================================

impl ToSable for String {
    const KIND: Kind = Kind::Str;
    fn push_to(self, vm: &Vm) -> Result<usize> {
        vm.push_bytes(self.as_bytes());
        Ok(1)
    }
}

impl FromSable for String {
    const KIND: Kind = Kind::Str;
    fn from_stack(vm: &Vm, idx: i32) -> Result<Self> {
        let bytes = vm.to_bytes(idx)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl ToSable for &str {
    const KIND: Kind = Kind::Str;
    fn push_to(self, vm: &Vm) -> Result<usize> {
        vm.push_bytes(self.as_bytes());
        Ok(1)
    }
}

impl ToSable for &[u8] {
    const KIND: Kind = Kind::Str;
    fn push_to(self, vm: &Vm) -> Result<usize> {
        vm.push_bytes(self);
        Ok(1)
    }
}

impl ToSable for Bytes {
    const KIND: Kind = Kind::Str;
    fn push_to(self, vm: &Vm) -> Result<usize> {
        vm.push_bytes(&self.0);
        Ok(1)
    }
}

impl FromSable for Bytes {
    const KIND: Kind = Kind::Str;
    fn from_stack(vm: &Vm, idx: i32) -> Result<Self> {
        Ok(Bytes(vm.to_bytes(idx)?.to_vec()))
    }
}

// ============================================================================
// Sentinels and passthrough
// ============================================================================

impl ToSable for Nil {
    const KIND: Kind = Kind::Nil;
    fn push_to(self, vm: &Vm) -> Result<usize> {
        vm.push_nil();
        Ok(1)
    }
}

impl FromSable for Nil {
    const KIND: Kind = Kind::Nil;
    fn from_stack(vm: &Vm, idx: i32) -> Result<Self> {
        match vm.kind_of(idx) {
            Kind::Nil => Ok(Nil),
            got => Err(Error::TypeMismatch {
                expected: Kind::Nil.name(),
                got: got.name(),
            }),
        }
    }
}

impl ToSable for LightUserdata {
    const KIND: Kind = Kind::LightUserdata;
    fn push_to(self, vm: &Vm) -> Result<usize> {
        vm.push_light(self.0);
        Ok(1)
    }
}

impl FromSable for LightUserdata {
    const KIND: Kind = Kind::LightUserdata;
    fn from_stack(vm: &Vm, idx: i32) -> Result<Self> {
        match vm.value(idx)? {
            Value::LightUserdata(p) => Ok(LightUserdata(p)),
            other => Err(Error::TypeMismatch {
                expected: "userdata",
                got: other.kind().name(),
            }),
        }
    }
}

impl ToSable for Value {
    const KIND: Kind = Kind::Poly;
    fn push_to(self, vm: &Vm) -> Result<usize> {
        vm.push(self);
        Ok(1)
    }
}

impl FromSable for Value {
    const KIND: Kind = Kind::Poly;
    fn from_stack(vm: &Vm, idx: i32) -> Result<Self> {
        vm.value(idx).map_err(Error::from)
    }
}

impl FromSable for Kind {
    const KIND: Kind = Kind::Poly;
    /// Reads the slot's kind rather than its value; out-of-range slots
    /// read as `Kind::None`.
    fn from_stack(vm: &Vm, idx: i32) -> Result<Self> {
        Ok(vm.kind_of(idx))
    }
}

impl<T: ToSable> ToSable for Option<T> {
    const KIND: Kind = Kind::Poly;
    fn push_to(self, vm: &Vm) -> Result<usize> {
        match self {
            Some(v) => v.push_to(vm),
            None => {
                vm.push_nil();
                Ok(1)
            }
        }
    }
}

impl<T: FromSable> FromSable for Option<T> {
    const KIND: Kind = Kind::Poly;
    /// Nil (or an empty slot) reads as `None`.
    fn from_stack(vm: &Vm, idx: i32) -> Result<Self> {
        match vm.kind_of(idx) {
            Kind::Nil | Kind::None => Ok(None),
            _ => T::from_stack(vm, idx).map(Some),
        }
    }
}

// ============================================================================
// Containers
// ============================================================================

impl<T: ToSable> ToSable for Vec<T> {
    const KIND: Kind = Kind::Table;
    /// Pushes a fresh table with the elements at keys `1..=len`.
    fn push_to(self, vm: &Vm) -> Result<usize> {
        vm.create_table();
        for (i, item) in self.into_iter().enumerate() {
            vm.push_integer(i as i64 + 1);
            item.push_to(vm)?;
            vm.set_table(-3)?;
        }
        Ok(1)
    }
}

impl<T: FromSable> FromSable for Vec<T> {
    const KIND: Kind = Kind::Table;
    /// Reads the table's 1-based sequence part.
    fn from_stack(vm: &Vm, idx: i32) -> Result<Self> {
        let abs = vm.abs_index(idx)? as i32;
        let len = vm.to_table(abs)?.len();
        let mut out = Vec::with_capacity(len as usize);
        for i in 1..=len {
            vm.push_integer(i);
            vm.get_table(abs)?;
            let item = T::from_stack(vm, -1);
            vm.pop(1)?;
            out.push(item?);
        }
        Ok(out)
    }
}

impl<K: ToSable, V: ToSable, S> ToSable for HashMap<K, V, S> {
    const KIND: Kind = Kind::Table;
    /// Pushes a fresh keyed table.
    fn push_to(self, vm: &Vm) -> Result<usize> {
        vm.create_table();
        for (k, v) in self {
            k.push_to(vm)?;
            v.push_to(vm)?;
            vm.set_table(-3)?;
        }
        Ok(1)
    }
}

// ============================================================================
// Multi-value impls
// ============================================================================

/// Single-value types participate in multi-value positions as a group of
/// one. Implemented per type; tuples are the only multi-slot groups.
macro_rules! single_value_multi {
    ($($t:ty),* $(,)?) => {$(
        impl ToSableMulti for $t {
            fn push_all(self, vm: &Vm) -> Result<usize> {
                ToSable::push_to(self, vm)
            }
        }
        impl FromSableMulti for $t {
            const COUNT: usize = 1;
            fn from_top(vm: &Vm) -> Result<Self> {
                FromSable::from_stack(vm, -1)
            }
        }
    )*};
}

single_value_multi!(
    i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, bool, String, Bytes, Nil,
    LightUserdata, Value
);

impl ToSableMulti for &str {
    fn push_all(self, vm: &Vm) -> Result<usize> {
        self.push_to(vm)
    }
}

impl FromSableMulti for Kind {
    const COUNT: usize = 1;
    fn from_top(vm: &Vm) -> Result<Self> {
        FromSable::from_stack(vm, -1)
    }
}

impl<T: ToSable> ToSableMulti for Vec<T> {
    fn push_all(self, vm: &Vm) -> Result<usize> {
        self.push_to(vm)
    }
}

impl<T: FromSable> FromSableMulti for Vec<T> {
    const COUNT: usize = 1;
    fn from_top(vm: &Vm) -> Result<Self> {
        FromSable::from_stack(vm, -1)
    }
}

impl<T: ToSable> ToSableMulti for Option<T> {
    fn push_all(self, vm: &Vm) -> Result<usize> {
        self.push_to(vm)
    }
}

impl<T: FromSable> FromSableMulti for Option<T> {
    const COUNT: usize = 1;
    fn from_top(vm: &Vm) -> Result<Self> {
        FromSable::from_stack(vm, -1)
    }
}

impl ToSableMulti for () {
    fn push_all(self, _vm: &Vm) -> Result<usize> {
        Ok(0)
    }
}

impl FromSableMulti for () {
    const COUNT: usize = 0;
    fn from_top(_vm: &Vm) -> Result<Self> {
        Ok(())
    }
}

macro_rules! tuple_multi {
    ($count:expr; $($t:ident => $off:expr),+) => {
        impl<$($t: ToSable),+> ToSableMulti for ($($t,)+) {
            fn push_all(self, vm: &Vm) -> Result<usize> {
                #[allow(non_snake_case)]
                let ($($t,)+) = self;
                let mut n = 0;
                $(n += $t.push_to(vm)?;)+
                Ok(n)
            }
        }
        impl<$($t: FromSable),+> FromSableMulti for ($($t,)+) {
            const COUNT: usize = $count;
            fn from_top(vm: &Vm) -> Result<Self> {
                Ok(($($t::from_stack(vm, $off - $count)?,)+))
            }
        }
    };
}

tuple_multi!(1; A => 0);
tuple_multi!(2; A => 0, B => 1);
tuple_multi!(3; A => 0, B => 1, C => 2);
tuple_multi!(4; A => 0, B => 1, C => 2, D => 3);
tuple_multi!(5; A => 0, B => 1, C => 2, D => 3, E => 4);
tuple_multi!(6; A => 0, B => 1, C => 2, D => 3, E => 4, F => 5);
tuple_multi!(7; A => 0, B => 1, C => 2, D => 3, E => 4, F => 5, G => 6);
tuple_multi!(8; A => 0, B => 1, C => 2, D => 3, E => 4, F => 5, G => 6, H => 7);
