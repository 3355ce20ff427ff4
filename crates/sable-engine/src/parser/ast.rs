//! Abstract syntax tree for the Sable surface syntax.

use std::rc::Rc;

/// A sequence of statements.
#[derive(Debug, Clone)]
pub struct Block(pub Vec<Stat>);

/// One statement.
#[derive(Debug, Clone)]
pub enum Stat {
    /// `local a, b = e1, e2`
    Local {
        /// Declared names
        names: Vec<Rc<str>>,
        /// Initialisers (may be shorter or longer than `names`)
        exprs: Vec<Expr>,
    },
    /// `t1, t2 = e1, e2` — targets are `Name` or `Index` expressions
    Assign {
        /// Assignment targets
        targets: Vec<Expr>,
        /// Right-hand side
        exprs: Vec<Expr>,
    },
    /// A call evaluated for its side effects
    Call(Expr),
    /// `if c1 then b1 elseif c2 then b2 else b3 end`
    If {
        /// (condition, body) pairs for if / elseif arms
        arms: Vec<(Expr, Block)>,
        /// `else` body
        else_body: Option<Block>,
    },
    /// `while c do b end`
    While {
        /// Loop condition
        cond: Expr,
        /// Loop body
        body: Block,
    },
    /// `for v = start, limit [, step] do b end`
    NumericFor {
        /// Control variable
        var: Rc<str>,
        /// Initial value
        start: Expr,
        /// Inclusive limit
        limit: Expr,
        /// Step (defaults to 1)
        step: Option<Expr>,
        /// Loop body
        body: Block,
    },
    /// `do b end`
    Do(Block),
    /// `break`
    Break,
    /// `return e1, e2`
    Return(Vec<Expr>),
    /// `function name(...)` / `function a.b(...)` sugar
    Function {
        /// Assignment target (`Name` or `Index`)
        target: Expr,
        /// Function body
        body: Rc<FuncBody>,
    },
    /// `local function name(...)`
    LocalFunction {
        /// Declared name (in scope inside the body, for recursion)
        name: Rc<str>,
        /// Function body
        body: Rc<FuncBody>,
    },
}

/// One expression.
#[derive(Debug, Clone)]
pub enum Expr {
    /// `nil`
    Nil,
    /// `true`
    True,
    /// `false`
    False,
    /// Integer literal
    Integer(i64),
    /// Float literal
    Number(f64),
    /// String literal (bytes, escapes already decoded)
    Str(Rc<[u8]>),
    /// Anonymous function literal
    Function(Rc<FuncBody>),
    /// Variable reference
    Name(Rc<str>),
    /// `obj[key]` / `obj.key`
    Index(Box<Expr>, Box<Expr>),
    /// `f(args)`
    Call(Box<Expr>, Vec<Expr>),
    /// `obj:m(args)`
    MethodCall(Box<Expr>, Rc<str>, Vec<Expr>),
    /// `{ ... }`
    Table(Vec<TableItem>),
    /// Binary operation (excluding `and`/`or`)
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Short-circuit `and`
    And(Box<Expr>, Box<Expr>),
    /// Short-circuit `or`
    Or(Box<Expr>, Box<Expr>),
    /// Unary operation
    Unary(UnOp, Box<Expr>),
}

/// One entry of a table constructor.
#[derive(Debug, Clone)]
pub enum TableItem {
    /// `expr` — appended at the next 1-based index
    Positional(Expr),
    /// `name = expr`
    Named(Rc<str>, Expr),
    /// `[key] = expr`
    Keyed(Expr, Expr),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `^`
    Pow,
    /// `..`
    Concat,
    /// `==`
    Eq,
    /// `~=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// `-`
    Neg,
    /// `not`
    Not,
    /// `#`
    Len,
}

/// A function literal: parameters plus body.
#[derive(Debug, Clone)]
pub struct FuncBody {
    /// Declared parameter names
    pub params: Vec<Rc<str>>,
    /// Statements
    pub block: Block,
}
