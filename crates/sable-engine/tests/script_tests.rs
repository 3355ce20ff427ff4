//! End-to-end language tests: source in, values out.

use std::io::Write;
use std::rc::Rc;

use sable_engine::{Lib, Table, Value, Vm};

fn vm() -> Rc<Vm> {
    let vm = Vm::new();
    vm.open_library(Lib::Base);
    vm.open_library(Lib::String);
    vm.open_library(Lib::Math);
    vm.open_library(Lib::Table);
    vm
}

fn eval(vm: &Vm, src: &str) -> Vec<Value> {
    vm.eval_chunk(src, "test").unwrap()
}

#[test]
fn arithmetic_and_precedence() {
    let vm = vm();
    let out = eval(&vm, "return 1 + 2 * 3, (1 + 2) * 3, 2 ^ 3 ^ 2, 7 % 3, -2 ^ 2");
    assert!(out[0].raw_eq(&Value::Integer(7)));
    assert!(out[1].raw_eq(&Value::Integer(9)));
    assert!(out[2].raw_eq(&Value::Number(512.0)));
    assert!(out[3].raw_eq(&Value::Integer(1)));
    // unary minus binds below the power operator
    assert!(out[4].raw_eq(&Value::Number(-4.0)));
}

#[test]
fn integer_and_float_arithmetic_mix() {
    let vm = vm();
    let out = eval(&vm, "local b = 0.2\nreturn 9 + b, 10 / 4, 3 * 3");
    assert!(out[0].raw_eq(&Value::Number(9.2)));
    assert!(out[1].raw_eq(&Value::Number(2.5)));
    assert!(out[2].raw_eq(&Value::Integer(9)));
}

#[test]
fn locals_shadow_globals() {
    let vm = vm();
    let out = eval(&vm, "x = 1\nlocal x = 2\ndo local x = 3 end\nreturn x");
    assert!(out[0].raw_eq(&Value::Integer(2)));
    assert!(vm.get_global("x").raw_eq(&Value::Integer(1)));
}

#[test]
fn while_loop_and_break() {
    let vm = vm();
    let out = eval(
        &vm,
        "local i = 0\nwhile true do\n  i = i + 1\n  if i >= 5 then break end\nend\nreturn i",
    );
    assert!(out[0].raw_eq(&Value::Integer(5)));
}

#[test]
fn numeric_for() {
    let vm = vm();
    let out = eval(&vm, "local s = 0\nfor i = 1, 10 do s = s + i end\nreturn s");
    assert!(out[0].raw_eq(&Value::Integer(55)));

    let out = eval(&vm, "local s = 0\nfor i = 10, 1, -2 do s = s + i end\nreturn s");
    assert!(out[0].raw_eq(&Value::Integer(30)));
}

#[test]
fn closures_share_upvalues() {
    let vm = vm();
    let out = eval(
        &vm,
        "local n = 0\n\
         local function bump() n = n + 1 return n end\n\
         bump()\nbump()\n\
         return bump(), n",
    );
    assert!(out[0].raw_eq(&Value::Integer(3)));
    assert!(out[1].raw_eq(&Value::Integer(3)));
}

#[test]
fn recursion() {
    let vm = vm();
    let out = eval(
        &vm,
        "local function fib(n)\n\
           if n < 2 then return n end\n\
           return fib(n - 1) + fib(n - 2)\n\
         end\n\
         return fib(15)",
    );
    assert!(out[0].raw_eq(&Value::Integer(610)));
}

#[test]
fn unbounded_recursion_errors_instead_of_overflowing() {
    let vm = vm();
    let err = vm
        .eval_chunk("local function f() return f() end\nreturn f()", "test")
        .unwrap_err();
    assert!(err.to_string().contains("call stack overflow"));
}

#[test]
fn multiple_returns_and_adjustment() {
    let vm = vm();
    let out = eval(
        &vm,
        "function g() return 10, 11, 12 end\n\
         local x, y, z = g()\n\
         local a, b = g(), 20\n\
         return x, y, z, a, b",
    );
    assert!(out[0].raw_eq(&Value::Integer(10)));
    assert!(out[1].raw_eq(&Value::Integer(11)));
    assert!(out[2].raw_eq(&Value::Integer(12)));
    // g() in a non-final position is adjusted to one value
    assert!(out[3].raw_eq(&Value::Integer(10)));
    assert!(out[4].raw_eq(&Value::Integer(20)));
}

#[test]
fn trailing_call_expands_into_arguments() {
    let vm = vm();
    let out = eval(
        &vm,
        "function pair() return 3, 4 end\n\
         function sum(a, b, c) return a + b + c end\n\
         return sum(1, pair())",
    );
    assert!(out[0].raw_eq(&Value::Integer(8)));
}

#[test]
fn table_constructors() {
    let vm = vm();
    let out = eval(
        &vm,
        "local t = {10, 20, 30, answer = 42, ['k'] = 'v'}\n\
         return #t, t[2], t.answer, t.k",
    );
    assert!(out[0].raw_eq(&Value::Integer(3)));
    assert!(out[1].raw_eq(&Value::Integer(20)));
    assert!(out[2].raw_eq(&Value::Integer(42)));
    assert!(out[3].raw_eq(&Value::str_from(b"v")));
}

#[test]
fn method_calls_use_colon_sugar() {
    let vm = vm();
    let out = eval(
        &vm,
        "local account = {balance = 100}\n\
         function account.deposit(self, n) self.balance = self.balance + n end\n\
         account:deposit(50)\n\
         account.deposit(account, 25)\n\
         return account.balance",
    );
    assert!(out[0].raw_eq(&Value::Integer(175)));
}

#[test]
fn method_definition_sugar_adds_self() {
    let vm = vm();
    let out = eval(
        &vm,
        "local t = {n = 7}\n\
         function t:get() return self.n end\n\
         return t:get()",
    );
    assert!(out[0].raw_eq(&Value::Integer(7)));
}

#[test]
fn concat_and_length() {
    let vm = vm();
    let out = eval(&vm, "return 'a' .. 'b' .. 1 .. 2.5, #'hello', #{1, 2, 3}");
    assert!(out[0].raw_eq(&Value::str_from(b"ab12.5")));
    assert!(out[1].raw_eq(&Value::Integer(5)));
    assert!(out[2].raw_eq(&Value::Integer(3)));
}

#[test]
fn and_or_short_circuit() {
    let vm = vm();
    let out = eval(
        &vm,
        "local hits = 0\n\
         local function f() hits = hits + 1 return true end\n\
         local a = false and f()\n\
         local b = true or f()\n\
         local c = nil or 'fallback'\n\
         return hits, a, b, c",
    );
    assert!(out[0].raw_eq(&Value::Integer(0)));
    assert!(out[1].raw_eq(&Value::Boolean(false)));
    assert!(out[2].raw_eq(&Value::Boolean(true)));
    assert!(out[3].raw_eq(&Value::str_from(b"fallback")));
}

// ----------------------------------------------------------------------
// Metamethods (metatables attached from the host side)
// ----------------------------------------------------------------------

fn table_global(vm: &Vm, name: &str) -> Rc<Table> {
    match vm.get_global(name) {
        Value::Table(t) => t,
        other => panic!("{name} is not a table: {other:?}"),
    }
}

#[test]
fn index_metamethod_table_form() {
    let vm = vm();
    eval(&vm, "defaults = {color = 'red'}\nobj = {}");
    let meta = Rc::new(Table::new());
    meta.raw_set_str("__index", Value::Table(table_global(&vm, "defaults")));
    table_global(&vm, "obj").set_metatable(Some(meta));
    let out = eval(&vm, "return obj.color, obj.missing");
    assert!(out[0].raw_eq(&Value::str_from(b"red")));
    assert!(out[1].raw_eq(&Value::Nil));
}

#[test]
fn index_metamethod_function_form() {
    let vm = vm();
    eval(
        &vm,
        "handler = function(t, k) return k .. '!' end\nobj = {}",
    );
    let meta = Rc::new(Table::new());
    meta.raw_set_str("__index", vm.get_global("handler"));
    table_global(&vm, "obj").set_metatable(Some(meta));
    let out = eval(&vm, "return obj.ping");
    assert!(out[0].raw_eq(&Value::str_from(b"ping!")));
}

#[test]
fn metamethod_results_adjust_to_one_value() {
    let vm = vm();
    eval(
        &vm,
        "obj = {}\nhandler = function(t, k) return 'first', 'second' end",
    );
    let meta = Rc::new(Table::new());
    meta.raw_set_str("__index", vm.get_global("handler"));
    table_global(&vm, "obj").set_metatable(Some(meta));
    let out = eval(&vm, "return obj.anything");
    assert_eq!(out.len(), 1);
    assert!(out[0].raw_eq(&Value::str_from(b"first")));
}

#[test]
fn newindex_metamethod_redirects_writes() {
    let vm = vm();
    eval(&vm, "log = {}\nobj = {}\nsink = function(t, k, v) log[k] = v end");
    let meta = Rc::new(Table::new());
    meta.raw_set_str("__newindex", vm.get_global("sink"));
    table_global(&vm, "obj").set_metatable(Some(meta));
    eval(&vm, "obj.x = 9");
    let out = eval(&vm, "return log.x, obj.x");
    assert!(out[0].raw_eq(&Value::Integer(9)));
    // the write never landed in obj itself
    assert!(out[1].raw_eq(&Value::Nil));
}

#[test]
fn arithmetic_metamethods() {
    let vm = vm();
    eval(
        &vm,
        "a = {v = 2}\nb = {v = 3}\n\
         add = function(x, y) return x.v + y.v end\n\
         mul = function(x, y) return x.v * y.v end",
    );
    let meta = Rc::new(Table::new());
    meta.raw_set_str("__add", vm.get_global("add"));
    meta.raw_set_str("__mul", vm.get_global("mul"));
    table_global(&vm, "a").set_metatable(Some(meta.clone()));
    table_global(&vm, "b").set_metatable(Some(meta));
    let out = eval(&vm, "return a + b, a * b, a + a");
    assert!(out[0].raw_eq(&Value::Integer(5)));
    assert!(out[1].raw_eq(&Value::Integer(6)));
    assert!(out[2].raw_eq(&Value::Integer(4)));
}

#[test]
fn call_metamethod() {
    let vm = vm();
    eval(&vm, "obj = {}\ntramp = function(self, x) return x * 2 end");
    let meta = Rc::new(Table::new());
    meta.raw_set_str("__call", vm.get_global("tramp"));
    table_global(&vm, "obj").set_metatable(Some(meta));
    let out = eval(&vm, "return obj(21)");
    assert!(out[0].raw_eq(&Value::Integer(42)));
}

#[test]
fn comparison_and_tostring_metamethods() {
    let vm = vm();
    eval(
        &vm,
        "a = {v = 1}\nb = {v = 2}\n\
         lt = function(x, y) return x.v < y.v end\n\
         eq = function(x, y) return x.v == y.v end\n\
         show = function(x) return 'box(' .. x.v .. ')' end",
    );
    let meta = Rc::new(Table::new());
    meta.raw_set_str("__lt", vm.get_global("lt"));
    meta.raw_set_str("__eq", vm.get_global("eq"));
    meta.raw_set_str("__tostring", vm.get_global("show"));
    table_global(&vm, "a").set_metatable(Some(meta.clone()));
    table_global(&vm, "b").set_metatable(Some(meta));
    let out = eval(&vm, "return a < b, b < a, a == b, a ~= b, tostring(a)");
    assert!(out[0].raw_eq(&Value::Boolean(true)));
    assert!(out[1].raw_eq(&Value::Boolean(false)));
    assert!(out[2].raw_eq(&Value::Boolean(false)));
    assert!(out[3].raw_eq(&Value::Boolean(true)));
    assert!(out[4].raw_eq(&Value::str_from(b"box(1)")));
}

#[test]
fn len_metamethod_overrides_border() {
    let vm = vm();
    eval(&vm, "obj = {1, 2, 3}\nn = function(x) return 99 end");
    let meta = Rc::new(Table::new());
    meta.raw_set_str("__len", vm.get_global("n"));
    table_global(&vm, "obj").set_metatable(Some(meta));
    let out = eval(&vm, "return #obj");
    assert!(out[0].raw_eq(&Value::Integer(99)));
}

// ----------------------------------------------------------------------
// Errors and loading
// ----------------------------------------------------------------------

#[test]
fn runtime_errors_are_protected() {
    let vm = vm();
    let err = vm.eval_chunk("nil[5]", "test").unwrap_err();
    assert!(err.to_string().contains("unexpected token"));

    let err = vm.eval_chunk("local x = nil\nreturn x[5]", "test").unwrap_err();
    assert!(err.to_string().contains("attempt to index a nil value"));
    // the stack holds no residue after a failed chunk
    assert_eq!(vm.top(), 0);
}

#[test]
fn parse_error_carries_line() {
    let vm = vm();
    let err = vm.load("local a = 1\nlocal = 2", "test").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("line 2"), "got: {msg}");
}

#[test]
fn pcall_truncates_to_requested_results() {
    let vm = vm();
    vm.load("return 1, 2, 3", "test").unwrap();
    let n = vm.pcall(0, Some(2)).unwrap();
    assert_eq!(n, 2);
    assert_eq!(vm.top(), 2);
    assert_eq!(vm.to_integer(1).unwrap(), 1);
    assert_eq!(vm.to_integer(2).unwrap(), 2);
}

#[test]
fn load_file_runs_a_script() {
    let vm = vm();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "answer = 42").unwrap();
    vm.load_file(file.path()).unwrap();
    vm.pcall(0, Some(0)).unwrap();
    assert!(vm.get_global("answer").raw_eq(&Value::Integer(42)));
}

#[test]
fn load_file_missing_is_an_io_error() {
    let vm = vm();
    let err = vm.load_file(std::path::Path::new("/no/such/script")).unwrap_err();
    assert!(err.to_string().contains("cannot open script"));
}

#[test]
fn strings_keep_embedded_nuls() {
    let vm = vm();
    let out = eval(&vm, "local s = 'a\\0b'\nreturn s, #s");
    assert!(out[0].raw_eq(&Value::str_from(b"a\0b")));
    assert!(out[1].raw_eq(&Value::Integer(3)));
}
