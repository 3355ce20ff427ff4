//! Standard library openers.
//!
//! Each [`Lib`] installs a group of native functions: `base` goes straight
//! into the globals table, the rest live in their own named global table.

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::vm::table::Table;
use crate::vm::value::{NativeFn, Value};
use crate::vm::Vm;

/// A loadable standard library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lib {
    /// print, type, tostring, tonumber, assert, error, collectgarbage
    Base,
    /// string.len/sub/upper/lower/rep/byte
    String,
    /// math.abs/floor/ceil/sqrt/max/min + pi, huge
    Math,
    /// os.clock/time
    Os,
    /// table.insert/remove/concat
    Table,
}

fn reg(t: &Table, name: &'static str, f: impl Fn(&Vm) -> Result<usize> + 'static) {
    t.raw_set_str(name, Value::Native(Rc::new(NativeFn::new(name, Box::new(f)))));
}

impl Vm {
    /// Install one standard library into this VM.
    pub fn open_library(&self, lib: Lib) {
        match lib {
            Lib::Base => self.open_base(),
            Lib::String => self.open_string(),
            Lib::Math => self.open_math(),
            Lib::Os => self.open_os(),
            Lib::Table => self.open_table(),
        }
    }

    fn open_base(&self) {
        let g = self.globals();

        reg(&g, "print", |vm| {
            let mut line = Vec::new();
            for i in 1..=vm.top() {
                if i > 1 {
                    line.push(b'\t');
                }
                let v = vm.value(i as i32)?;
                line.extend(vm.display_bytes(&v)?);
            }
            println!("{}", String::from_utf8_lossy(&line));
            Ok(0)
        });

        reg(&g, "type", |vm| {
            let kind = vm.kind_of(1);
            vm.push_bytes(kind.name().as_bytes());
            Ok(1)
        });

        reg(&g, "tostring", |vm| {
            let v = vm.value(1)?;
            let bytes = vm.display_bytes(&v)?;
            vm.push_bytes(&bytes);
            Ok(1)
        });

        reg(&g, "tonumber", |vm| {
            let v = vm.value(1)?;
            match v {
                Value::Integer(_) | Value::Number(_) => vm.push(v),
                Value::Str(s) => {
                    let text = String::from_utf8_lossy(&s);
                    let text = text.trim();
                    if let Ok(i) = text.parse::<i64>() {
                        vm.push_integer(i);
                    } else if let Ok(n) = text.parse::<f64>() {
                        vm.push_number(n);
                    } else {
                        vm.push_nil();
                    }
                }
                _ => vm.push_nil(),
            }
            Ok(1)
        });

        reg(&g, "assert", |vm| {
            if vm.top() == 0 || !vm.value(1)?.truthy() {
                let msg = if vm.top() >= 2 {
                    String::from_utf8_lossy(&vm.display_bytes(&vm.value(2)?)?).into_owned()
                } else {
                    "assertion failed!".to_string()
                };
                return Err(Error::Runtime(msg));
            }
            // assert passes all its arguments through on success
            Ok(vm.top())
        });

        reg(&g, "error", |vm| {
            let msg = if vm.top() >= 1 {
                let v = vm.value(1)?;
                String::from_utf8_lossy(&vm.display_bytes(&v)?).into_owned()
            } else {
                "nil".to_string()
            };
            Err(Error::Runtime(msg))
        });

        reg(&g, "collectgarbage", |vm| {
            vm.collect_garbage();
            vm.push_integer(0);
            Ok(1)
        });
    }

    fn open_string(&self) {
        let t = Table::new();

        reg(&t, "len", |vm| {
            let s = vm.to_bytes(1)?;
            vm.push_integer(s.len() as i64);
            Ok(1)
        });

        reg(&t, "sub", |vm| {
            let s = vm.to_bytes(1)?;
            let len = s.len() as i64;
            let mut i = vm.to_integer(2)?;
            let mut j = if vm.top() >= 3 { vm.to_integer(3)? } else { -1 };
            if i < 0 {
                i = (len + i + 1).max(1);
            } else if i < 1 {
                i = 1;
            }
            if j < 0 {
                j = len + j + 1;
            } else if j > len {
                j = len;
            }
            if i > j {
                vm.push_bytes(b"");
            } else {
                vm.push_bytes(&s[(i - 1) as usize..j as usize]);
            }
            Ok(1)
        });

        reg(&t, "upper", |vm| {
            let s = vm.to_bytes(1)?;
            let out: Vec<u8> = s.iter().map(|b| b.to_ascii_uppercase()).collect();
            vm.push_bytes(&out);
            Ok(1)
        });

        reg(&t, "lower", |vm| {
            let s = vm.to_bytes(1)?;
            let out: Vec<u8> = s.iter().map(|b| b.to_ascii_lowercase()).collect();
            vm.push_bytes(&out);
            Ok(1)
        });

        reg(&t, "rep", |vm| {
            let s = vm.to_bytes(1)?;
            let n = vm.to_integer(2)?.max(0) as usize;
            vm.push_bytes(&s.repeat(n));
            Ok(1)
        });

        reg(&t, "byte", |vm| {
            let s = vm.to_bytes(1)?;
            let i = if vm.top() >= 2 { vm.to_integer(2)? } else { 1 };
            match s.get((i - 1).max(0) as usize) {
                Some(b) => vm.push_integer(*b as i64),
                None => vm.push_nil(),
            }
            Ok(1)
        });

        self.set_global("string", Value::Table(Rc::new(t)));
    }

    fn open_math(&self) {
        let t = Table::new();

        t.raw_set_str("pi", Value::Number(std::f64::consts::PI));
        t.raw_set_str("huge", Value::Number(f64::INFINITY));

        reg(&t, "abs", |vm| {
            match vm.value(1)? {
                Value::Integer(i) => vm.push_integer(i.wrapping_abs()),
                _ => vm.push_number(vm.to_number(1)?.abs()),
            }
            Ok(1)
        });

        reg(&t, "floor", |vm| {
            vm.push_integer(vm.to_number(1)?.floor() as i64);
            Ok(1)
        });

        reg(&t, "ceil", |vm| {
            vm.push_integer(vm.to_number(1)?.ceil() as i64);
            Ok(1)
        });

        reg(&t, "sqrt", |vm| {
            vm.push_number(vm.to_number(1)?.sqrt());
            Ok(1)
        });

        reg(&t, "max", |vm| {
            let mut best = vm.value(1)?;
            for i in 2..=vm.top() {
                let v = vm.value(i as i32)?;
                let (x, y) = (v.as_number(), best.as_number());
                match (x, y) {
                    (Some(x), Some(y)) if x > y => best = v,
                    (Some(_), Some(_)) => {}
                    _ => return Err(Error::Runtime("bad argument to 'max'".into())),
                }
            }
            vm.push(best);
            Ok(1)
        });

        reg(&t, "min", |vm| {
            let mut best = vm.value(1)?;
            for i in 2..=vm.top() {
                let v = vm.value(i as i32)?;
                let (x, y) = (v.as_number(), best.as_number());
                match (x, y) {
                    (Some(x), Some(y)) if x < y => best = v,
                    (Some(_), Some(_)) => {}
                    _ => return Err(Error::Runtime("bad argument to 'min'".into())),
                }
            }
            vm.push(best);
            Ok(1)
        });

        self.set_global("math", Value::Table(Rc::new(t)));
    }

    fn open_os(&self) {
        let t = Table::new();

        reg(&t, "clock", |vm| {
            vm.push_number(vm.clock());
            Ok(1)
        });

        reg(&t, "time", |vm| {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_err(|e| Error::Runtime(e.to_string()))?;
            vm.push_integer(now.as_secs() as i64);
            Ok(1)
        });

        self.set_global("os", Value::Table(Rc::new(t)));
    }

    fn open_table(&self) {
        let t = Table::new();

        reg(&t, "insert", |vm| {
            let target = vm.to_table(1)?;
            if vm.top() >= 3 {
                // insert(t, pos, v) shifts the tail up
                let pos = vm.to_integer(2)?;
                let v = vm.value(3)?;
                let len = target.len();
                let mut i = len;
                while i >= pos {
                    let moved = target.raw_get(&Value::Integer(i));
                    target.raw_set(Value::Integer(i + 1), moved)?;
                    i -= 1;
                }
                target.raw_set(Value::Integer(pos), v)?;
            } else {
                let v = vm.value(2)?;
                target.raw_set(Value::Integer(target.len() + 1), v)?;
            }
            Ok(0)
        });

        reg(&t, "remove", |vm| {
            let target = vm.to_table(1)?;
            let len = target.len();
            let pos = if vm.top() >= 2 { vm.to_integer(2)? } else { len };
            if len == 0 {
                vm.push_nil();
                return Ok(1);
            }
            let removed = target.raw_get(&Value::Integer(pos));
            for i in pos..len {
                let moved = target.raw_get(&Value::Integer(i + 1));
                target.raw_set(Value::Integer(i), moved)?;
            }
            target.raw_set(Value::Integer(len), Value::Nil)?;
            vm.push(removed);
            Ok(1)
        });

        reg(&t, "concat", |vm| {
            let target = vm.to_table(1)?;
            let sep = if vm.top() >= 2 {
                vm.to_bytes(2)?.to_vec()
            } else {
                Vec::new()
            };
            let from = if vm.top() >= 3 { vm.to_integer(3)? } else { 1 };
            let to = if vm.top() >= 4 {
                vm.to_integer(4)?
            } else {
                target.len()
            };
            let mut out = Vec::new();
            for i in from..=to {
                if i > from {
                    out.extend_from_slice(&sep);
                }
                let v = target.raw_get(&Value::Integer(i));
                out.extend(vm.display_bytes(&v)?);
            }
            vm.push_bytes(&out);
            Ok(1)
        });

        self.set_global("table", Value::Table(Rc::new(t)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm_with(libs: &[Lib]) -> Rc<Vm> {
        let vm = Vm::new();
        for lib in libs {
            vm.open_library(*lib);
        }
        vm
    }

    #[test]
    fn base_type_and_tostring() {
        let vm = vm_with(&[Lib::Base]);
        let out = vm.eval_chunk("return type(1), type('s'), type(nil)", "t").unwrap();
        assert!(out[0].raw_eq(&Value::str_from(b"number")));
        assert!(out[1].raw_eq(&Value::str_from(b"string")));
        assert!(out[2].raw_eq(&Value::str_from(b"nil")));

        let out = vm.eval_chunk("return tostring(9.0)", "t").unwrap();
        assert!(out[0].raw_eq(&Value::str_from(b"9.0")));
    }

    #[test]
    fn tonumber_parses_strings() {
        let vm = vm_with(&[Lib::Base]);
        let out = vm
            .eval_chunk("return tonumber('42'), tonumber('1.5'), tonumber('x')", "t")
            .unwrap();
        assert!(out[0].raw_eq(&Value::Integer(42)));
        assert!(out[1].raw_eq(&Value::Number(1.5)));
        assert!(out[2].raw_eq(&Value::Nil));
    }

    #[test]
    fn assert_and_error_raise() {
        let vm = vm_with(&[Lib::Base]);
        assert!(vm.eval_chunk("assert(true)", "t").is_ok());
        let err = vm.eval_chunk("assert(false, 'boom')", "t").unwrap_err();
        assert_eq!(err.to_string(), "boom");
        let err = vm.eval_chunk("error('bad')", "t").unwrap_err();
        assert_eq!(err.to_string(), "bad");
    }

    #[test]
    fn string_library() {
        let vm = vm_with(&[Lib::Base, Lib::String]);
        let out = vm
            .eval_chunk(
                "return string.len('abc'), string.sub('hello', 2, 4), \
                 string.upper('ab'), string.rep('ab', 3), string.byte('A')",
                "t",
            )
            .unwrap();
        assert!(out[0].raw_eq(&Value::Integer(3)));
        assert!(out[1].raw_eq(&Value::str_from(b"ell")));
        assert!(out[2].raw_eq(&Value::str_from(b"AB")));
        assert!(out[3].raw_eq(&Value::str_from(b"ababab")));
        assert!(out[4].raw_eq(&Value::Integer(65)));
    }

    #[test]
    fn string_sub_negative_indices() {
        let vm = vm_with(&[Lib::String]);
        let out = vm.eval_chunk("return string.sub('hello', -3)", "t").unwrap();
        assert!(out[0].raw_eq(&Value::str_from(b"llo")));
    }

    #[test]
    fn math_library() {
        let vm = vm_with(&[Lib::Math]);
        let out = vm
            .eval_chunk(
                "return math.abs(-3), math.floor(2.7), math.ceil(2.1), \
                 math.sqrt(9), math.max(1, 5, 3), math.min(1, 5, 3)",
                "t",
            )
            .unwrap();
        assert!(out[0].raw_eq(&Value::Integer(3)));
        assert!(out[1].raw_eq(&Value::Integer(2)));
        assert!(out[2].raw_eq(&Value::Integer(3)));
        assert!(out[3].raw_eq(&Value::Number(3.0)));
        assert!(out[4].raw_eq(&Value::Integer(5)));
        assert!(out[5].raw_eq(&Value::Integer(1)));
    }

    #[test]
    fn table_library() {
        let vm = vm_with(&[Lib::Table]);
        let out = vm
            .eval_chunk(
                "local t = {1, 2, 4}\n\
                 table.insert(t, 3, 3)\n\
                 local removed = table.remove(t)\n\
                 return #t, t[3], removed, table.concat(t, ',')",
                "t",
            )
            .unwrap();
        assert!(out[0].raw_eq(&Value::Integer(3)));
        assert!(out[1].raw_eq(&Value::Integer(3)));
        assert!(out[2].raw_eq(&Value::Integer(4)));
        assert!(out[3].raw_eq(&Value::str_from(b"1,2,3")));
    }

    #[test]
    fn os_clock_advances() {
        let vm = vm_with(&[Lib::Os]);
        let out = vm.eval_chunk("return os.clock()", "t").unwrap();
        assert!(out[0].as_number().unwrap() >= 0.0);
    }
}
