//! Typed view over VM tables.

use std::rc::Rc;

use sable_engine::{Kind, Value, Vm};

use crate::call::SableFn;
use crate::error::{Error, Result};
use crate::function::Function;
use crate::reference::Ref;
use crate::stack::{FromSable, FromSableMulti, ToSable, ToSableMulti};

/// An owned handle to a VM table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Table(pub(crate) Ref);

impl Table {
    /// Create a fresh empty table in `vm`.
    pub fn create(vm: &Vm) -> Result<Table> {
        vm.create_table();
        let r = Ref::from_slot(vm, -1)?;
        vm.pop(1)?;
        Ok(Table(r))
    }

    pub(crate) fn from_ref(r: Ref) -> Result<Table> {
        match r.kind() {
            Kind::Table => Ok(Table(r)),
            got => Err(Error::TypeMismatch {
                expected: "table",
                got: got.name(),
            }),
        }
    }

    /// The underlying reference handle.
    pub fn as_ref_handle(&self) -> &Ref {
        &self.0
    }

    fn raw(&self) -> Result<Rc<sable_engine::Table>> {
        match self.0.value()? {
            Value::Table(t) => Ok(t),
            other => Err(Error::TypeMismatch {
                expected: "table",
                got: other.kind().name(),
            }),
        }
    }

    /// Typed read of `self[key]`, honouring `__index`.
    pub fn get<K: ToSable, T: FromSable>(&self, key: K) -> Result<T> {
        let vm = self.0.vm();
        let entry = vm.top();
        let out = (|| {
            self.0.push()?;
            key.push_to(vm)?;
            vm.get_table(-2)?;
            T::from_stack(vm, -1)
        })();
        restore(vm, entry);
        out
    }

    /// Typed write of `self[key] = value`, honouring `__newindex`.
    pub fn set<K: ToSable, V: ToSable>(&self, key: K, value: V) -> Result<()> {
        let vm = self.0.vm();
        let entry = vm.top();
        let out = (|| {
            self.0.push()?;
            key.push_to(vm)?;
            value.push_to(vm)?;
            vm.set_table(-3)?;
            Ok(())
        })();
        restore(vm, entry);
        out
    }

    /// Sequence length (consecutive integer keys from 1).
    pub fn len(&self) -> Result<i64> {
        Ok(self.raw()?.len())
    }

    /// Whether the table holds no entries at all.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.raw()?.is_empty())
    }

    /// Bind a host callable under `name`.
    pub fn set_function<A, R, F: SableFn<A, R>>(&self, name: &str, f: F) -> Result<()> {
        let vm = self.0.vm();
        let entry = vm.top();
        let out = (|| {
            self.0.push()?;
            vm.push_native(name, f.into_callback());
            vm.set_field(-2, name)?;
            Ok(())
        })();
        restore(vm, entry);
        out
    }

    /// A deferred-access proxy for `self[name]`.
    pub fn key(&self, name: &str) -> Entry {
        Entry {
            table: self.clone(),
            name: name.to_string(),
        }
    }
}

fn restore(vm: &Vm, entry: usize) {
    let excess = vm.top().saturating_sub(entry);
    if excess > 0 {
        let _ = vm.pop(excess);
    }
}

impl ToSable for Table {
    const KIND: Kind = Kind::Table;
    fn push_to(self, vm: &Vm) -> Result<usize> {
        vm.push(self.0.value()?);
        Ok(1)
    }
}

impl FromSable for Table {
    const KIND: Kind = Kind::Table;
    fn from_stack(vm: &Vm, idx: i32) -> Result<Self> {
        Table::from_ref(Ref::from_slot(vm, idx)?)
    }
}

impl ToSableMulti for Table {
    fn push_all(self, vm: &Vm) -> Result<usize> {
        self.push_to(vm)
    }
}

impl FromSableMulti for Table {
    const COUNT: usize = 1;
    fn from_top(vm: &Vm) -> Result<Self> {
        Table::from_stack(vm, -1)
    }
}

/// A pending `table[name]` access: read, write, or call it later.
pub struct Entry {
    table: Table,
    name: String,
}

impl Entry {
    /// The key this proxy addresses.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The kind currently stored under the key.
    pub fn kind(&self) -> Kind {
        self.table
            .get::<_, Value>(self.name.as_str())
            .map(|v| v.kind())
            .unwrap_or(Kind::None)
    }

    /// Typed read.
    pub fn get<T: FromSable>(&self) -> Result<T> {
        self.table.get(self.name.as_str())
    }

    /// Typed write.
    pub fn set<V: ToSable>(&self, value: V) -> Result<()> {
        self.table.set(self.name.as_str(), value)
    }

    /// Call the stored function directly.
    pub fn call<A: ToSableMulti, R: FromSableMulti>(&self, args: A) -> Result<R> {
        let f: Function = self.get()?;
        f.call(args)
    }
}
