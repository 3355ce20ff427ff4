//! The top-level embedding handle.

use std::path::Path;
use std::rc::Rc;

use sable_engine::{Lib, Vm};

use crate::call::SableFn;
use crate::error::{Error, Result};
use crate::reference::Ref;
use crate::stack::{pop, FromSable, FromSableMulti, ToSable};
use crate::table::{Entry, Table};
use crate::userdata::UserType;

/// An owned VM with the ergonomic surface on top.
///
/// `State` is the usual entry point: open libraries, run scripts, move
/// values across the boundary by name, bind host functions, and register
/// host types. Every operation leaves the VM stack balanced.
pub struct State {
    vm: Rc<Vm>,
}

impl State {
    /// Create a VM with no libraries opened.
    pub fn new() -> State {
        State { vm: Vm::new() }
    }

    /// Open a set of standard libraries.
    pub fn open_libraries(&self, libs: &[Lib]) {
        for lib in libs {
            self.vm.open_library(*lib);
        }
    }

    /// Compile and run a chunk, discarding its results.
    pub fn script(&self, src: &str) -> Result<()> {
        self.vm.run(src, "chunk").map_err(Error::from)
    }

    /// Compile and run a script file.
    pub fn open_file(&self, path: impl AsRef<Path>) -> Result<()> {
        self.vm.load_file(path.as_ref())?;
        self.vm.pcall(0, Some(0))?;
        Ok(())
    }

    /// Typed read of a global.
    pub fn get<T: FromSable>(&self, name: &str) -> Result<T> {
        self.vm.push(self.vm.get_global(name));
        pop(&self.vm)
    }

    /// Typed read of several globals at once, e.g.
    /// `get_many::<(i64, i64, i64)>(&["x", "y", "z"])`.
    pub fn get_many<T: FromSableMulti>(&self, names: &[&str]) -> Result<T> {
        if names.len() != T::COUNT {
            return Err(Error::Script(format!(
                "expected {} names, got {}",
                T::COUNT,
                names.len()
            )));
        }
        for name in names {
            self.vm.push(self.vm.get_global(name));
        }
        let out = T::from_top(&self.vm);
        let _ = self.vm.pop(names.len());
        out
    }

    /// Typed write of a global.
    pub fn set<T: ToSable>(&self, name: &str, value: T) -> Result<()> {
        value.push_to(&self.vm)?;
        let v = self.vm.value(-1)?;
        self.vm.pop(1)?;
        self.vm.set_global(name, v);
        Ok(())
    }

    /// Bind a host callable as a global function.
    pub fn set_function<A, R, F: SableFn<A, R>>(&self, name: &str, f: F) {
        self.vm.push_native(name, f.into_callback());
        let v = self
            .vm
            .value(-1)
            .expect("freshly pushed slot is in range");
        let _ = self.vm.pop(1);
        self.vm.set_global(name, v);
    }

    /// Install a prepared user-type registration.
    pub fn set_usertype<T: 'static>(&self, reg: UserType<T>) -> Result<()> {
        reg.register(&self.vm)
    }

    /// Build and install a user-type registration in one step.
    pub fn new_usertype<T: 'static>(
        &self,
        name: &str,
        build: impl FnOnce(UserType<T>) -> UserType<T>,
    ) -> Result<()> {
        self.set_usertype(build(UserType::new(name)))
    }

    /// A table view over the globals table.
    pub fn globals(&self) -> Result<Table> {
        self.vm.push(sable_engine::Value::Table(self.vm.globals()));
        let r = Ref::from_slot(&self.vm, -1)?;
        self.vm.pop(1)?;
        Table::from_ref(r)
    }

    /// A deferred-access proxy for the global `name`.
    pub fn entry(&self, name: &str) -> Result<Entry> {
        Ok(self.globals()?.key(name))
    }

    /// Request a full collection. Reclamation is reference-counted and
    /// immediate; this exists so finalisation-sensitive call sites read
    /// naturally.
    pub fn gc(&self) {
        self.vm.collect_garbage();
    }

    /// The raw VM handle, for extension through the push/get ABI.
    pub fn vm(&self) -> &Rc<Vm> {
        &self.vm
    }
}

impl Default for State {
    fn default() -> Self {
        State::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globals_round_trip() {
        let state = State::new();
        state.set("x", 9i64).unwrap();
        assert_eq!(state.get::<i64>("x").unwrap(), 9);
        assert_eq!(state.vm().top(), 0);
    }

    #[test]
    fn get_many_reads_tuples() {
        let state = State::new();
        state.script("x = 1 y = 2 z = 3").unwrap();
        let (x, y, z) = state.get_many::<(i64, i64, i64)>(&["x", "y", "z"]).unwrap();
        assert_eq!((x, y, z), (1, 2, 3));
        assert!(state.get_many::<(i64, i64)>(&["x"]).is_err());
    }

    #[test]
    fn missing_global_reads_as_nil() {
        let state = State::new();
        let err = state.get::<i64>("absent").unwrap_err();
        assert_eq!(err.to_string(), "expected number, received nil");
        assert_eq!(state.get::<crate::types::Nil>("absent").unwrap(), crate::types::Nil);
    }

    #[test]
    fn entry_proxy_on_globals() {
        let state = State::new();
        let e = state.entry("counter").unwrap();
        e.set(5i64).unwrap();
        assert_eq!(state.get::<i64>("counter").unwrap(), 5);
        assert_eq!(e.get::<i64>().unwrap(), 5);
    }
}
