//! Tables: the VM's sole aggregate data structure.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::vm::value::Value;

/// A hashable table key.
///
/// Float keys with an integral value normalise to integer keys so that
/// `t[1]` and `t[1.0]` address the same slot. Heap values key by identity.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum TableKey {
    /// Integer key (also normalised integral floats)
    Int(i64),
    /// String key
    Str(Rc<[u8]>),
    /// Boolean key
    Bool(bool),
    /// Non-integral float key, by bit pattern
    Bits(u64),
    /// Table / function / userdata / pointer key, by identity
    Obj(usize),
}

impl TableKey {
    /// Convert a value into a key. Nil and NaN are invalid keys.
    pub fn from_value(v: &Value) -> Result<TableKey> {
        match v {
            Value::Nil => Err(Error::Runtime("table index is nil".into())),
            Value::Boolean(b) => Ok(TableKey::Bool(*b)),
            Value::Integer(i) => Ok(TableKey::Int(*i)),
            Value::Number(n) => {
                if n.is_nan() {
                    Err(Error::Runtime("table index is NaN".into()))
                } else if n.fract() == 0.0 && n.is_finite() && *n >= i64::MIN as f64 && *n <= i64::MAX as f64 {
                    Ok(TableKey::Int(*n as i64))
                } else {
                    Ok(TableKey::Bits(n.to_bits()))
                }
            }
            Value::Str(s) => Ok(TableKey::Str(s.clone())),
            Value::Table(t) => Ok(TableKey::Obj(Rc::as_ptr(t) as usize)),
            Value::Function(f) => Ok(TableKey::Obj(Rc::as_ptr(f) as usize)),
            Value::Native(f) => Ok(TableKey::Obj(Rc::as_ptr(f) as usize)),
            Value::Userdata(u) => Ok(TableKey::Obj(Rc::as_ptr(u) as usize)),
            Value::LightUserdata(p) => Ok(TableKey::Obj(*p as usize)),
        }
    }
}

/// A table: key → value map with an optional metatable.
pub struct Table {
    data: RefCell<FxHashMap<TableKey, Value>>,
    meta: RefCell<Option<Rc<Table>>>,
}

impl Table {
    /// Create an empty table.
    pub fn new() -> Self {
        Table {
            data: RefCell::new(FxHashMap::default()),
            meta: RefCell::new(None),
        }
    }

    /// Raw read (no `__index` dispatch). Absent keys read nil.
    pub fn raw_get(&self, key: &Value) -> Value {
        match TableKey::from_value(key) {
            Ok(k) => self.data.borrow().get(&k).cloned().unwrap_or(Value::Nil),
            Err(_) => Value::Nil,
        }
    }

    /// Raw read by string key.
    pub fn raw_get_str(&self, key: &str) -> Value {
        self.data
            .borrow()
            .get(&TableKey::Str(Rc::from(key.as_bytes())))
            .cloned()
            .unwrap_or(Value::Nil)
    }

    /// Raw write (no `__newindex` dispatch). Writing nil erases the key.
    pub fn raw_set(&self, key: Value, value: Value) -> Result<()> {
        let k = TableKey::from_value(&key)?;
        if matches!(value, Value::Nil) {
            self.data.borrow_mut().remove(&k);
        } else {
            self.data.borrow_mut().insert(k, value);
        }
        Ok(())
    }

    /// Raw write by string key.
    pub fn raw_set_str(&self, key: &str, value: Value) {
        let k = TableKey::Str(Rc::from(key.as_bytes()));
        if matches!(value, Value::Nil) {
            self.data.borrow_mut().remove(&k);
        } else {
            self.data.borrow_mut().insert(k, value);
        }
    }

    /// Sequence length: the number of consecutive integer keys from 1.
    pub fn len(&self) -> i64 {
        let data = self.data.borrow();
        let mut n = 0i64;
        while data.contains_key(&TableKey::Int(n + 1)) {
            n += 1;
        }
        n
    }

    /// Whether the table holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.data.borrow().is_empty()
    }

    /// Number of entries (hash semantics, not sequence semantics).
    pub fn entry_count(&self) -> usize {
        self.data.borrow().len()
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

impl Default for Table {
    fn default() -> Self {
        Table::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_float_keys_normalise() {
        let t = Table::new();
        t.raw_set(Value::Integer(1), Value::Integer(10)).unwrap();
        assert!(t.raw_get(&Value::Number(1.0)).raw_eq(&Value::Integer(10)));
    }

    #[test]
    fn nil_write_erases() {
        let t = Table::new();
        t.raw_set_str("k", Value::Integer(1));
        assert_eq!(t.entry_count(), 1);
        t.raw_set_str("k", Value::Nil);
        assert_eq!(t.entry_count(), 0);
        assert!(t.raw_get_str("k").raw_eq(&Value::Nil));
    }

    #[test]
    fn sequence_length_stops_at_border() {
        let t = Table::new();
        for i in 1..=10 {
            t.raw_set(Value::Integer(i), Value::Integer(i)).unwrap();
        }
        t.raw_set(Value::Integer(12), Value::Integer(12)).unwrap();
        assert_eq!(t.len(), 10);
    }

    #[test]
    fn nil_key_is_an_error() {
        let t = Table::new();
        assert!(t.raw_set(Value::Nil, Value::Integer(1)).is_err());
    }
}
