//! Tree-walking interpreter.
//!
//! Executes AST blocks against a chain of lexical scopes. Closures capture
//! the chain by `Rc`, so an inner function sees later writes to outer
//! locals. Metamethod dispatch for indexing, arithmetic, comparison,
//! concatenation, length, and calls lives here as well; the stack-facing
//! table operations in [`crate::vm`] route through the same helpers.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::parser::ast::{BinOp, Block, Expr, Stat, TableItem, UnOp};
use crate::vm::table::Table;
use crate::vm::value::{fmt_number, Scope, ScriptFn, Value};
use crate::vm::Vm;

/// How a block finished.
pub(crate) enum Flow {
    Normal,
    Break,
    Return(Vec<Value>),
}

fn new_scope() -> Scope {
    Rc::new(RefCell::new(FxHashMap::default()))
}

impl Vm {
    // ------------------------------------------------------------------
    // Calling
    // ------------------------------------------------------------------

    /// Invoke a callable value with already-evaluated arguments.
    pub fn call_value(&self, func: &Value, args: Vec<Value>) -> Result<Vec<Value>> {
        self.enter_call()?;
        let out = self.call_value_inner(func, args);
        self.leave_call();
        out
    }

    fn call_value_inner(&self, func: &Value, args: Vec<Value>) -> Result<Vec<Value>> {
        match func {
            Value::Function(f) => {
                let mut scopes = f.captured.clone();
                let params = new_scope();
                {
                    let mut map = params.borrow_mut();
                    for (i, name) in f.body.params.iter().enumerate() {
                        map.insert(name.clone(), args.get(i).cloned().unwrap_or(Value::Nil));
                    }
                }
                scopes.push(params);
                match self.exec_block(&f.body.block, &mut scopes)? {
                    Flow::Return(vals) => Ok(vals),
                    _ => Ok(Vec::new()),
                }
            }
            Value::Native(f) => {
                // Native functions see their arguments as frame slots
                // 1..=N and push their results.
                let base = self.raw_len();
                for a in args {
                    self.push(a);
                }
                self.enter_frame(base);
                let res = f.call(self);
                let out = match res {
                    Ok(n) => {
                        let len = self.raw_len();
                        let results = {
                            let from = len.saturating_sub(n).max(base);
                            self.stack_slice(from, len)
                        };
                        Ok(results)
                    }
                    Err(e) => Err(e),
                };
                self.leave_frame();
                self.truncate_raw(base);
                out
            }
            other => {
                // Tables and userdata may still be callable through `__call`.
                if let Some(mm) = self.metamethod(other, "__call") {
                    let mut full = Vec::with_capacity(args.len() + 1);
                    full.push(other.clone());
                    full.extend(args);
                    return self.call_value_inner(&mm, full);
                }
                Err(Error::Type {
                    expected: "function",
                    got: other.kind().name(),
                })
            }
        }
    }

    fn stack_slice(&self, from: usize, to: usize) -> Vec<Value> {
        let stack = self.stack_ref();
        stack[from..to].to_vec()
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    pub(crate) fn exec_block(&self, block: &Block, scopes: &mut Vec<Scope>) -> Result<Flow> {
        scopes.push(new_scope());
        let flow = self.exec_stats(&block.0, scopes);
        scopes.pop();
        flow
    }

    fn exec_stats(&self, stats: &[Stat], scopes: &mut Vec<Scope>) -> Result<Flow> {
        for stat in stats {
            match self.exec_stat(stat, scopes)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stat(&self, stat: &Stat, scopes: &mut Vec<Scope>) -> Result<Flow> {
        match stat {
            Stat::Local { names, exprs } => {
                let values = self.eval_list(exprs, names.len(), scopes)?;
                let scope = scopes.last().expect("scope chain is never empty");
                let mut map = scope.borrow_mut();
                for (name, value) in names.iter().zip(values) {
                    map.insert(name.clone(), value);
                }
                Ok(Flow::Normal)
            }
            Stat::Assign { targets, exprs } => {
                let values = self.eval_list(exprs, targets.len(), scopes)?;
                for (target, value) in targets.iter().zip(values) {
                    self.assign(target, value, scopes)?;
                }
                Ok(Flow::Normal)
            }
            Stat::Call(expr) => {
                self.eval_multi(expr, scopes)?;
                Ok(Flow::Normal)
            }
            Stat::If { arms, else_body } => {
                for (cond, body) in arms {
                    if self.eval(cond, scopes)?.truthy() {
                        return self.exec_block(body, scopes);
                    }
                }
                match else_body {
                    Some(body) => self.exec_block(body, scopes),
                    None => Ok(Flow::Normal),
                }
            }
            Stat::While { cond, body } => {
                while self.eval(cond, scopes)?.truthy() {
                    match self.exec_block(body, scopes)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal)
            }
            Stat::NumericFor {
                var,
                start,
                limit,
                step,
                body,
            } => self.exec_numeric_for(var, start, limit, step.as_ref(), body, scopes),
            Stat::Do(body) => self.exec_block(body, scopes),
            Stat::Break => Ok(Flow::Break),
            Stat::Return(exprs) => {
                let mut values = Vec::new();
                for (i, e) in exprs.iter().enumerate() {
                    if i + 1 == exprs.len() {
                        values.extend(self.eval_multi(e, scopes)?);
                    } else {
                        values.push(self.eval(e, scopes)?);
                    }
                }
                Ok(Flow::Return(values))
            }
            Stat::Function { target, body } => {
                let name = match target {
                    Expr::Name(n) => n.clone(),
                    _ => Rc::from("anonymous"),
                };
                let f = Value::Function(Rc::new(ScriptFn {
                    name,
                    body: body.clone(),
                    captured: scopes.clone(),
                }));
                self.assign(target, f, scopes)?;
                Ok(Flow::Normal)
            }
            Stat::LocalFunction { name, body } => {
                // The name is in scope inside the body, so declare first
                // and fill in after capture.
                let scope = scopes.last().expect("scope chain is never empty").clone();
                scope.borrow_mut().insert(name.clone(), Value::Nil);
                let f = Value::Function(Rc::new(ScriptFn {
                    name: name.clone(),
                    body: body.clone(),
                    captured: scopes.clone(),
                }));
                scope.borrow_mut().insert(name.clone(), f);
                Ok(Flow::Normal)
            }
        }
    }

    fn exec_numeric_for(
        &self,
        var: &Rc<str>,
        start: &Expr,
        limit: &Expr,
        step: Option<&Expr>,
        body: &Block,
        scopes: &mut Vec<Scope>,
    ) -> Result<Flow> {
        let start = self.eval_number(start, scopes)?;
        let limit = self.eval_number(limit, scopes)?;
        let step = match step {
            Some(e) => self.eval_number(e, scopes)?,
            None => Value::Integer(1),
        };

        let loop_scope = new_scope();
        scopes.push(loop_scope.clone());
        let mut flow = Flow::Normal;

        // Integer loop when every control value is integral, float otherwise.
        match (&start, &limit, &step) {
            (Value::Integer(s), Value::Integer(l), Value::Integer(st)) => {
                let (s, l, st) = (*s, *l, *st);
                if st == 0 {
                    scopes.pop();
                    return Err(Error::Runtime("'for' step is zero".into()));
                }
                let mut i = s;
                while (st > 0 && i <= l) || (st < 0 && i >= l) {
                    loop_scope.borrow_mut().insert(var.clone(), Value::Integer(i));
                    match self.exec_block(body, scopes)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => {
                            flow = ret;
                            break;
                        }
                    }
                    i = match i.checked_add(st) {
                        Some(next) => next,
                        None => break,
                    };
                }
            }
            _ => {
                let s = start.as_number().unwrap();
                let l = limit.as_number().unwrap();
                let st = step.as_number().unwrap();
                if st == 0.0 {
                    scopes.pop();
                    return Err(Error::Runtime("'for' step is zero".into()));
                }
                let mut i = s;
                while (st > 0.0 && i <= l) || (st < 0.0 && i >= l) {
                    loop_scope.borrow_mut().insert(var.clone(), Value::Number(i));
                    match self.exec_block(body, scopes)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => {
                            flow = ret;
                            break;
                        }
                    }
                    i += st;
                }
            }
        }

        scopes.pop();
        Ok(flow)
    }

    fn eval_number(&self, e: &Expr, scopes: &mut Vec<Scope>) -> Result<Value> {
        let v = self.eval(e, scopes)?;
        match v {
            Value::Integer(_) | Value::Number(_) => Ok(v),
            other => Err(Error::Runtime(format!(
                "'for' control value must be a number, got {}",
                other.kind().name()
            ))),
        }
    }

    fn assign(&self, target: &Expr, value: Value, scopes: &mut Vec<Scope>) -> Result<()> {
        match target {
            Expr::Name(name) => {
                for scope in scopes.iter().rev() {
                    if scope.borrow().contains_key(name) {
                        scope.borrow_mut().insert(name.clone(), value);
                        return Ok(());
                    }
                }
                self.globals().raw_set_str(name, value);
                Ok(())
            }
            Expr::Index(obj, key) => {
                let obj = self.eval(obj, scopes)?;
                let key = self.eval(key, scopes)?;
                self.newindex_value(&obj, key, value)
            }
            _ => Err(Error::Runtime("cannot assign to this expression".into())),
        }
    }

    /// Evaluate an expression list, expanding a trailing call and adjusting
    /// to exactly `want` values.
    fn eval_list(
        &self,
        exprs: &[Expr],
        want: usize,
        scopes: &mut Vec<Scope>,
    ) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(want);
        for (i, e) in exprs.iter().enumerate() {
            if i + 1 == exprs.len() {
                values.extend(self.eval_multi(e, scopes)?);
            } else {
                values.push(self.eval(e, scopes)?);
            }
        }
        values.resize(want, Value::Nil);
        Ok(values)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn eval(&self, e: &Expr, scopes: &mut Vec<Scope>) -> Result<Value> {
        match e {
            Expr::Nil => Ok(Value::Nil),
            Expr::True => Ok(Value::Boolean(true)),
            Expr::False => Ok(Value::Boolean(false)),
            Expr::Integer(i) => Ok(Value::Integer(*i)),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Function(body) => Ok(Value::Function(Rc::new(ScriptFn {
                name: Rc::from("anonymous"),
                body: body.clone(),
                captured: scopes.clone(),
            }))),
            Expr::Name(name) => {
                for scope in scopes.iter().rev() {
                    if let Some(v) = scope.borrow().get(name) {
                        return Ok(v.clone());
                    }
                }
                Ok(self.globals().raw_get_str(name))
            }
            Expr::Index(obj, key) => {
                let obj = self.eval(obj, scopes)?;
                let key = self.eval(key, scopes)?;
                self.index_value(&obj, &key)
            }
            Expr::Call(_, _) | Expr::MethodCall(_, _, _) => {
                let mut vals = self.eval_multi(e, scopes)?;
                Ok(if vals.is_empty() {
                    Value::Nil
                } else {
                    vals.swap_remove(0)
                })
            }
            Expr::Table(items) => self.eval_table(items, scopes),
            Expr::Binary(op, a, b) => {
                let a = self.eval(a, scopes)?;
                let b = self.eval(b, scopes)?;
                self.binary_op(*op, &a, &b)
            }
            Expr::And(a, b) => {
                let a = self.eval(a, scopes)?;
                if a.truthy() {
                    self.eval(b, scopes)
                } else {
                    Ok(a)
                }
            }
            Expr::Or(a, b) => {
                let a = self.eval(a, scopes)?;
                if a.truthy() {
                    Ok(a)
                } else {
                    self.eval(b, scopes)
                }
            }
            Expr::Unary(op, v) => {
                let v = self.eval(v, scopes)?;
                self.unary_op(*op, &v)
            }
        }
    }

    /// Evaluate a call (or any expression) keeping all returned values.
    fn eval_multi(&self, e: &Expr, scopes: &mut Vec<Scope>) -> Result<Vec<Value>> {
        match e {
            Expr::Call(callee, args) => {
                let func = self.eval(callee, scopes)?;
                let args = self.eval_args(args, scopes)?;
                self.call_value(&func, args)
            }
            Expr::MethodCall(obj, name, args) => {
                let obj = self.eval(obj, scopes)?;
                let func = self.index_value(&obj, &Value::str_from(name.as_bytes()))?;
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(obj);
                full.extend(self.eval_args(args, scopes)?);
                self.call_value(&func, full)
            }
            _ => Ok(vec![self.eval(e, scopes)?]),
        }
    }

    fn eval_args(&self, args: &[Expr], scopes: &mut Vec<Scope>) -> Result<Vec<Value>> {
        let mut out = Vec::with_capacity(args.len());
        for (i, a) in args.iter().enumerate() {
            if i + 1 == args.len() {
                out.extend(self.eval_multi(a, scopes)?);
            } else {
                out.push(self.eval(a, scopes)?);
            }
        }
        Ok(out)
    }

    fn eval_table(&self, items: &[TableItem], scopes: &mut Vec<Scope>) -> Result<Value> {
        let t = Table::new();
        let mut next = 1i64;
        for (i, item) in items.iter().enumerate() {
            match item {
                TableItem::Positional(e) => {
                    if i + 1 == items.len() {
                        for v in self.eval_multi(e, scopes)? {
                            t.raw_set(Value::Integer(next), v)?;
                            next += 1;
                        }
                    } else {
                        t.raw_set(Value::Integer(next), self.eval(e, scopes)?)?;
                        next += 1;
                    }
                }
                TableItem::Named(name, e) => {
                    t.raw_set_str(name, self.eval(e, scopes)?);
                }
                TableItem::Keyed(key, e) => {
                    let key = self.eval(key, scopes)?;
                    let value = self.eval(e, scopes)?;
                    t.raw_set(key, value)?;
                }
            }
        }
        Ok(Value::Table(Rc::new(t)))
    }

    // ------------------------------------------------------------------
    // Metamethod dispatch
    // ------------------------------------------------------------------

    pub(crate) fn metamethod(&self, v: &Value, name: &str) -> Option<Value> {
        let meta = match v {
            Value::Table(t) => t.metatable(),
            Value::Userdata(u) => u.metatable(),
            _ => None,
        }?;
        match meta.raw_get_str(name) {
            Value::Nil => None,
            mm => Some(mm),
        }
    }

    /// `obj[key]` with `__index` chains.
    pub(crate) fn index_value(&self, obj: &Value, key: &Value) -> Result<Value> {
        match obj {
            Value::Table(t) => {
                let raw = t.raw_get(key);
                if !matches!(raw, Value::Nil) {
                    return Ok(raw);
                }
                match self.metamethod(obj, "__index") {
                    Some(mm @ Value::Table(_)) => self.index_value(&mm, key),
                    Some(mm) => {
                        let out = self.call_value(&mm, vec![obj.clone(), key.clone()])?;
                        Ok(out.into_iter().next().unwrap_or(Value::Nil))
                    }
                    None => Ok(Value::Nil),
                }
            }
            Value::Userdata(_) => match self.metamethod(obj, "__index") {
                Some(Value::Table(t)) => self.index_value(&Value::Table(t), key),
                Some(mm) => {
                    let out = self.call_value(&mm, vec![obj.clone(), key.clone()])?;
                    Ok(out.into_iter().next().unwrap_or(Value::Nil))
                }
                None => Err(Error::Runtime("attempt to index a userdata value".into())),
            },
            other => Err(Error::Runtime(format!(
                "attempt to index a {} value",
                other.kind().name()
            ))),
        }
    }

    /// `obj[key] = value` with `__newindex` chains.
    pub(crate) fn newindex_value(&self, obj: &Value, key: Value, value: Value) -> Result<()> {
        match obj {
            Value::Table(t) => {
                if matches!(t.raw_get(&key), Value::Nil) {
                    match self.metamethod(obj, "__newindex") {
                        Some(mm @ Value::Table(_)) => {
                            return self.newindex_value(&mm, key, value);
                        }
                        Some(mm) => {
                            self.call_value(&mm, vec![obj.clone(), key, value])?;
                            return Ok(());
                        }
                        None => {}
                    }
                }
                t.raw_set(key, value)
            }
            Value::Userdata(_) => match self.metamethod(obj, "__newindex") {
                Some(mm @ Value::Table(_)) => self.newindex_value(&mm, key, value),
                Some(mm) => {
                    self.call_value(&mm, vec![obj.clone(), key, value])?;
                    Ok(())
                }
                None => Err(Error::Runtime("attempt to index a userdata value".into())),
            },
            other => Err(Error::Runtime(format!(
                "attempt to index a {} value",
                other.kind().name()
            ))),
        }
    }

    fn binary_op(&self, op: BinOp, a: &Value, b: &Value) -> Result<Value> {
        match op {
            BinOp::Add => self.arith(a, b, "__add", |x, y| x + y, i64::wrapping_add),
            BinOp::Sub => self.arith(a, b, "__sub", |x, y| x - y, i64::wrapping_sub),
            BinOp::Mul => self.arith(a, b, "__mul", |x, y| x * y, i64::wrapping_mul),
            BinOp::Div => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => Ok(Value::Number(x / y)),
                _ => self.arith_meta(a, b, "__div"),
            },
            BinOp::Mod => self.modulo(a, b),
            BinOp::Pow => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => Ok(Value::Number(x.powf(y))),
                _ => self.arith_meta(a, b, "__pow"),
            },
            BinOp::Concat => self.concat(a, b),
            BinOp::Eq => Ok(Value::Boolean(self.values_equal(a, b)?)),
            BinOp::Ne => Ok(Value::Boolean(!self.values_equal(a, b)?)),
            BinOp::Lt => self.order(a, b, "__lt", false),
            BinOp::Le => self.order(a, b, "__le", true),
            BinOp::Gt => self.order(b, a, "__lt", false),
            BinOp::Ge => self.order(b, a, "__le", true),
        }
    }

    fn arith(
        &self,
        a: &Value,
        b: &Value,
        mm: &str,
        ff: fn(f64, f64) -> f64,
        fi: fn(i64, i64) -> i64,
    ) -> Result<Value> {
        match (a, b) {
            (Value::Integer(x), Value::Integer(y)) => Ok(Value::Integer(fi(*x, *y))),
            _ => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => Ok(Value::Number(ff(x, y))),
                _ => self.arith_meta(a, b, mm),
            },
        }
    }

    fn arith_meta(&self, a: &Value, b: &Value, mm: &str) -> Result<Value> {
        let handler = self
            .metamethod(a, mm)
            .or_else(|| self.metamethod(b, mm))
            .ok_or_else(|| {
                let offender = if a.as_number().is_none() { a } else { b };
                Error::Runtime(format!(
                    "attempt to perform arithmetic on a {} value",
                    offender.kind().name()
                ))
            })?;
        let out = self.call_value(&handler, vec![a.clone(), b.clone()])?;
        Ok(out.into_iter().next().unwrap_or(Value::Nil))
    }

    fn modulo(&self, a: &Value, b: &Value) -> Result<Value> {
        match (a, b) {
            (Value::Integer(x), Value::Integer(y)) => {
                if *y == 0 {
                    return Err(Error::Runtime("attempt to perform 'n%0'".into()));
                }
                // Floored modulo: the result takes the divisor's sign.
                let r = x.wrapping_rem(*y);
                Ok(Value::Integer(if r != 0 && (r < 0) != (*y < 0) {
                    r + y
                } else {
                    r
                }))
            }
            _ => match (a.as_number(), b.as_number()) {
                // Floored modulo, matching the sign of the divisor.
                (Some(x), Some(y)) => Ok(Value::Number(x - (x / y).floor() * y)),
                _ => self.arith_meta(a, b, "__mod"),
            },
        }
    }

    fn concat(&self, a: &Value, b: &Value) -> Result<Value> {
        fn coerce(v: &Value) -> Option<Vec<u8>> {
            match v {
                Value::Str(s) => Some(s.to_vec()),
                Value::Integer(i) => Some(i.to_string().into_bytes()),
                Value::Number(n) => Some(fmt_number(*n).into_bytes()),
                _ => None,
            }
        }
        match (coerce(a), coerce(b)) {
            (Some(mut x), Some(y)) => {
                x.extend_from_slice(&y);
                Ok(Value::Str(Rc::from(x.as_slice())))
            }
            _ => {
                let handler = self
                    .metamethod(a, "__concat")
                    .or_else(|| self.metamethod(b, "__concat"))
                    .ok_or_else(|| {
                        let offender = if matches!(a, Value::Str(_)) || a.as_number().is_some() {
                            b
                        } else {
                            a
                        };
                        Error::Runtime(format!(
                            "attempt to concatenate a {} value",
                            offender.kind().name()
                        ))
                    })?;
                let out = self.call_value(&handler, vec![a.clone(), b.clone()])?;
                Ok(out.into_iter().next().unwrap_or(Value::Nil))
            }
        }
    }

    pub(crate) fn values_equal(&self, a: &Value, b: &Value) -> Result<bool> {
        if a.raw_eq(b) {
            return Ok(true);
        }
        // `__eq` fires only for two tables or two userdata.
        let both_heap = matches!(
            (a, b),
            (Value::Table(_), Value::Table(_)) | (Value::Userdata(_), Value::Userdata(_))
        );
        if both_heap {
            if let Some(mm) = self.metamethod(a, "__eq").or_else(|| self.metamethod(b, "__eq")) {
                let out = self.call_value(&mm, vec![a.clone(), b.clone()])?;
                return Ok(out.into_iter().next().unwrap_or(Value::Nil).truthy());
            }
        }
        Ok(false)
    }

    fn order(&self, a: &Value, b: &Value, mm: &str, or_equal: bool) -> Result<Value> {
        match (a, b) {
            (Value::Str(x), Value::Str(y)) => Ok(Value::Boolean(if or_equal {
                x <= y
            } else {
                x < y
            })),
            _ => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => Ok(Value::Boolean(if or_equal { x <= y } else { x < y })),
                _ => {
                    let handler = self
                        .metamethod(a, mm)
                        .or_else(|| self.metamethod(b, mm))
                        .ok_or_else(|| {
                            Error::Runtime(format!(
                                "attempt to compare {} with {}",
                                a.kind().name(),
                                b.kind().name()
                            ))
                        })?;
                    let out = self.call_value(&handler, vec![a.clone(), b.clone()])?;
                    Ok(Value::Boolean(
                        out.into_iter().next().unwrap_or(Value::Nil).truthy(),
                    ))
                }
            },
        }
    }

    fn unary_op(&self, op: UnOp, v: &Value) -> Result<Value> {
        match op {
            UnOp::Not => Ok(Value::Boolean(!v.truthy())),
            UnOp::Neg => match v {
                Value::Integer(i) => Ok(Value::Integer(i.wrapping_neg())),
                Value::Number(n) => Ok(Value::Number(-n)),
                _ => match self.metamethod(v, "__unm") {
                    Some(mm) => {
                        let out = self.call_value(&mm, vec![v.clone(), v.clone()])?;
                        Ok(out.into_iter().next().unwrap_or(Value::Nil))
                    }
                    None => Err(Error::Runtime(format!(
                        "attempt to perform arithmetic on a {} value",
                        v.kind().name()
                    ))),
                },
            },
            UnOp::Len => self.length_of(v),
        }
    }

    pub(crate) fn length_of(&self, v: &Value) -> Result<Value> {
        if let Some(mm) = self.metamethod(v, "__len") {
            let out = self.call_value(&mm, vec![v.clone()])?;
            return Ok(out.into_iter().next().unwrap_or(Value::Nil));
        }
        match v {
            Value::Str(s) => Ok(Value::Integer(s.len() as i64)),
            Value::Table(t) => Ok(Value::Integer(t.len())),
            other => Err(Error::Runtime(format!(
                "attempt to get length of a {} value",
                other.kind().name()
            ))),
        }
    }

    /// The bytes `tostring`/`print`/`..` would produce for a value,
    /// honouring `__tostring`.
    pub(crate) fn display_bytes(&self, v: &Value) -> Result<Vec<u8>> {
        if let Some(mm) = self.metamethod(v, "__tostring") {
            let out = self.call_value(&mm, vec![v.clone()])?;
            return match out.into_iter().next() {
                Some(Value::Str(s)) => Ok(s.to_vec()),
                Some(other) => Ok(format!("{:?}", other).into_bytes()),
                None => Ok(b"nil".to_vec()),
            };
        }
        Ok(match v {
            Value::Nil => b"nil".to_vec(),
            Value::Boolean(b) => if *b { &b"true"[..] } else { &b"false"[..] }.to_vec(),
            Value::Integer(i) => i.to_string().into_bytes(),
            Value::Number(n) => fmt_number(*n).into_bytes(),
            Value::Str(s) => s.to_vec(),
            other => format!("{:?}", other).into_bytes(),
        })
    }

    /// Run a whole chunk and hand back everything it returned.
    pub fn eval_chunk(&self, src: &str, chunkname: &str) -> Result<Vec<Value>> {
        self.load(src, chunkname)?;
        let func = self.value(-1)?;
        self.pop(1)?;
        self.call_value(&func, Vec::new())
    }
}
