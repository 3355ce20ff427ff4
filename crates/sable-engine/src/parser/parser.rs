//! Recursive-descent parser producing the AST in [`crate::parser::ast`].
//!
//! Expressions use the usual precedence-climbing scheme; statement parsing
//! is a straightforward hand-written descent over the token stream.

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::parser::ast::{BinOp, Block, Expr, FuncBody, Stat, TableItem, UnOp};
use crate::parser::lexer::{lex, Tok};

/// Parse a whole chunk.
pub fn parse(src: &str) -> Result<Block> {
    let toks = lex(src)?;
    let mut p = Parser { toks, pos: 0 };
    let block = p.block()?;
    if let Some((tok, line)) = p.toks.get(p.pos) {
        return Err(Error::Parse {
            line: *line,
            message: format!("unexpected token {:?}", tok),
        });
    }
    Ok(block)
}

struct Parser {
    toks: Vec<(Tok, u32)>,
    pos: usize,
}

// Binding powers, mirroring Lua's operator table: (left, right).
fn binop_of(tok: &Tok) -> Option<(BinOp, u8, u8)> {
    Some(match tok {
        Tok::Eq => (BinOp::Eq, 3, 3),
        Tok::Ne => (BinOp::Ne, 3, 3),
        Tok::Lt => (BinOp::Lt, 3, 3),
        Tok::Le => (BinOp::Le, 3, 3),
        Tok::Gt => (BinOp::Gt, 3, 3),
        Tok::Ge => (BinOp::Ge, 3, 3),
        Tok::Concat => (BinOp::Concat, 9, 8),
        Tok::Plus => (BinOp::Add, 10, 10),
        Tok::Minus => (BinOp::Sub, 10, 10),
        Tok::Star => (BinOp::Mul, 11, 11),
        Tok::Slash => (BinOp::Div, 11, 11),
        Tok::Percent => (BinOp::Mod, 11, 11),
        Tok::Caret => (BinOp::Pow, 14, 13),
        _ => return None,
    })
}

const UNARY_PRIORITY: u8 = 12;

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|(t, _)| t)
    }

    fn line(&self) -> u32 {
        self.toks
            .get(self.pos)
            .or_else(|| self.toks.last())
            .map(|(_, l)| *l)
            .unwrap_or(1)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn err<T>(&self, message: impl Into<String>) -> Result<T> {
        Err(Error::Parse {
            line: self.line(),
            message: message.into(),
        })
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok, what: &str) -> Result<()> {
        if self.eat(tok) {
            Ok(())
        } else {
            self.err(format!("expected {}", what))
        }
    }

    fn expect_name(&mut self) -> Result<Rc<str>> {
        if let Some(Tok::Name(n)) = self.peek() {
            let n = n.clone();
            self.pos += 1;
            Ok(n)
        } else {
            self.err("expected a name")
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn block(&mut self) -> Result<Block> {
        let mut stats = Vec::new();
        loop {
            match self.peek() {
                None | Some(Tok::End) | Some(Tok::Else) | Some(Tok::Elseif) => break,
                Some(Tok::Semi) => {
                    self.pos += 1;
                }
                Some(Tok::Return) => {
                    self.pos += 1;
                    let exprs = if matches!(
                        self.peek(),
                        None | Some(Tok::End) | Some(Tok::Else) | Some(Tok::Elseif) | Some(Tok::Semi)
                    ) {
                        Vec::new()
                    } else {
                        self.exprlist()?
                    };
                    self.eat(&Tok::Semi);
                    stats.push(Stat::Return(exprs));
                    break;
                }
                Some(_) => stats.push(self.statement()?),
            }
        }
        Ok(Block(stats))
    }

    fn statement(&mut self) -> Result<Stat> {
        match self.peek() {
            Some(Tok::Local) => {
                self.pos += 1;
                if self.eat(&Tok::Function) {
                    let name = self.expect_name()?;
                    let body = self.funcbody()?;
                    return Ok(Stat::LocalFunction { name, body });
                }
                let mut names = vec![self.expect_name()?];
                while self.eat(&Tok::Comma) {
                    names.push(self.expect_name()?);
                }
                let exprs = if self.eat(&Tok::Assign) {
                    self.exprlist()?
                } else {
                    Vec::new()
                };
                Ok(Stat::Local { names, exprs })
            }
            Some(Tok::Function) => {
                self.pos += 1;
                let mut target = Expr::Name(self.expect_name()?);
                let mut is_method = false;
                loop {
                    if self.eat(&Tok::Dot) {
                        let field = self.expect_name()?;
                        target = Expr::Index(
                            Box::new(target),
                            Box::new(Expr::Str(Rc::from(field.as_bytes()))),
                        );
                    } else if self.eat(&Tok::Colon) {
                        let field = self.expect_name()?;
                        target = Expr::Index(
                            Box::new(target),
                            Box::new(Expr::Str(Rc::from(field.as_bytes()))),
                        );
                        is_method = true;
                        break;
                    } else {
                        break;
                    }
                }
                let mut body = self.funcbody()?;
                if is_method {
                    let mut params = vec![Rc::<str>::from("self")];
                    params.extend(body.params.iter().cloned());
                    body = Rc::new(FuncBody {
                        params,
                        block: body.block.clone(),
                    });
                }
                Ok(Stat::Function { target, body })
            }
            Some(Tok::If) => {
                self.pos += 1;
                let mut arms = Vec::new();
                let cond = self.expr()?;
                self.expect(&Tok::Then, "'then'")?;
                arms.push((cond, self.block()?));
                let mut else_body = None;
                loop {
                    if self.eat(&Tok::Elseif) {
                        let cond = self.expr()?;
                        self.expect(&Tok::Then, "'then'")?;
                        arms.push((cond, self.block()?));
                    } else if self.eat(&Tok::Else) {
                        else_body = Some(self.block()?);
                        self.expect(&Tok::End, "'end'")?;
                        break;
                    } else {
                        self.expect(&Tok::End, "'end'")?;
                        break;
                    }
                }
                Ok(Stat::If { arms, else_body })
            }
            Some(Tok::While) => {
                self.pos += 1;
                let cond = self.expr()?;
                self.expect(&Tok::Do, "'do'")?;
                let body = self.block()?;
                self.expect(&Tok::End, "'end'")?;
                Ok(Stat::While { cond, body })
            }
            Some(Tok::For) => {
                self.pos += 1;
                let var = self.expect_name()?;
                self.expect(&Tok::Assign, "'=' in numeric for")?;
                let start = self.expr()?;
                self.expect(&Tok::Comma, "','")?;
                let limit = self.expr()?;
                let step = if self.eat(&Tok::Comma) {
                    Some(self.expr()?)
                } else {
                    None
                };
                self.expect(&Tok::Do, "'do'")?;
                let body = self.block()?;
                self.expect(&Tok::End, "'end'")?;
                Ok(Stat::NumericFor {
                    var,
                    start,
                    limit,
                    step,
                    body,
                })
            }
            Some(Tok::Do) => {
                self.pos += 1;
                let body = self.block()?;
                self.expect(&Tok::End, "'end'")?;
                Ok(Stat::Do(body))
            }
            Some(Tok::Break) => {
                self.pos += 1;
                Ok(Stat::Break)
            }
            _ => self.exprstat(),
        }
    }

    fn exprstat(&mut self) -> Result<Stat> {
        let first = self.suffixedexp()?;
        if matches!(self.peek(), Some(Tok::Assign) | Some(Tok::Comma)) {
            let mut targets = vec![first];
            while self.eat(&Tok::Comma) {
                targets.push(self.suffixedexp()?);
            }
            for t in &targets {
                if !matches!(t, Expr::Name(_) | Expr::Index(_, _)) {
                    return self.err("cannot assign to this expression");
                }
            }
            self.expect(&Tok::Assign, "'='")?;
            let exprs = self.exprlist()?;
            Ok(Stat::Assign { targets, exprs })
        } else if matches!(first, Expr::Call(_, _) | Expr::MethodCall(_, _, _)) {
            Ok(Stat::Call(first))
        } else {
            self.err("syntax error: expected a statement")
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn exprlist(&mut self) -> Result<Vec<Expr>> {
        let mut exprs = vec![self.expr()?];
        while self.eat(&Tok::Comma) {
            exprs.push(self.expr()?);
        }
        Ok(exprs)
    }

    fn expr(&mut self) -> Result<Expr> {
        self.subexpr(0)
    }

    fn subexpr(&mut self, limit: u8) -> Result<Expr> {
        let mut left = match self.peek() {
            Some(Tok::Not) => {
                self.pos += 1;
                Expr::Unary(UnOp::Not, Box::new(self.subexpr(UNARY_PRIORITY)?))
            }
            Some(Tok::Minus) => {
                self.pos += 1;
                Expr::Unary(UnOp::Neg, Box::new(self.subexpr(UNARY_PRIORITY)?))
            }
            Some(Tok::Hash) => {
                self.pos += 1;
                Expr::Unary(UnOp::Len, Box::new(self.subexpr(UNARY_PRIORITY)?))
            }
            _ => self.simpleexp()?,
        };
        loop {
            match self.peek() {
                Some(Tok::And) if 1 > limit => {
                    self.pos += 1;
                    let rhs = self.subexpr(1)?;
                    left = Expr::And(Box::new(left), Box::new(rhs));
                }
                Some(Tok::Or) if 1 > limit => {
                    // `or` binds weaker than `and`; both sit below the
                    // comparison tier so limit 0 is the only entry point.
                    self.pos += 1;
                    let rhs = self.subexpr(1)?;
                    left = Expr::Or(Box::new(left), Box::new(rhs));
                }
                Some(tok) => match binop_of(tok) {
                    Some((op, l, r)) if l > limit => {
                        self.pos += 1;
                        let rhs = self.subexpr(r)?;
                        left = Expr::Binary(op, Box::new(left), Box::new(rhs));
                    }
                    _ => break,
                },
                None => break,
            }
        }
        Ok(left)
    }

    fn simpleexp(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Tok::Nil) => {
                self.pos += 1;
                Ok(Expr::Nil)
            }
            Some(Tok::True) => {
                self.pos += 1;
                Ok(Expr::True)
            }
            Some(Tok::False) => {
                self.pos += 1;
                Ok(Expr::False)
            }
            Some(Tok::Int(i)) => {
                let i = *i;
                self.pos += 1;
                Ok(Expr::Integer(i))
            }
            Some(Tok::Float(f)) => {
                let f = *f;
                self.pos += 1;
                Ok(Expr::Number(f))
            }
            Some(Tok::Str(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(Expr::Str(s))
            }
            Some(Tok::Function) => {
                self.pos += 1;
                Ok(Expr::Function(self.funcbody()?))
            }
            Some(Tok::LBrace) => self.tablector(),
            _ => self.suffixedexp(),
        }
    }

    fn suffixedexp(&mut self) -> Result<Expr> {
        let mut e = match self.peek() {
            Some(Tok::Name(n)) => {
                let n = n.clone();
                self.pos += 1;
                Expr::Name(n)
            }
            Some(Tok::LParen) => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(&Tok::RParen, "')'")?;
                inner
            }
            _ => return self.err("unexpected token in expression"),
        };
        loop {
            match self.peek() {
                Some(Tok::Dot) => {
                    self.pos += 1;
                    let name = self.expect_name()?;
                    e = Expr::Index(
                        Box::new(e),
                        Box::new(Expr::Str(Rc::from(name.as_bytes()))),
                    );
                }
                Some(Tok::LBracket) => {
                    self.pos += 1;
                    let key = self.expr()?;
                    self.expect(&Tok::RBracket, "']'")?;
                    e = Expr::Index(Box::new(e), Box::new(key));
                }
                Some(Tok::Colon) => {
                    self.pos += 1;
                    let name = self.expect_name()?;
                    let args = self.callargs()?;
                    e = Expr::MethodCall(Box::new(e), name, args);
                }
                Some(Tok::LParen) | Some(Tok::Str(_)) | Some(Tok::LBrace) => {
                    let args = self.callargs()?;
                    e = Expr::Call(Box::new(e), args);
                }
                _ => break,
            }
        }
        Ok(e)
    }

    fn callargs(&mut self) -> Result<Vec<Expr>> {
        match self.peek() {
            Some(Tok::LParen) => {
                self.pos += 1;
                let args = if self.peek() == Some(&Tok::RParen) {
                    Vec::new()
                } else {
                    self.exprlist()?
                };
                self.expect(&Tok::RParen, "')'")?;
                Ok(args)
            }
            Some(Tok::Str(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(vec![Expr::Str(s)])
            }
            Some(Tok::LBrace) => Ok(vec![self.tablector()?]),
            _ => self.err("expected call arguments"),
        }
    }

    fn tablector(&mut self) -> Result<Expr> {
        self.expect(&Tok::LBrace, "'{'")?;
        let mut items = Vec::new();
        loop {
            match self.peek() {
                Some(Tok::RBrace) => break,
                Some(Tok::LBracket) => {
                    self.pos += 1;
                    let key = self.expr()?;
                    self.expect(&Tok::RBracket, "']'")?;
                    self.expect(&Tok::Assign, "'='")?;
                    items.push(TableItem::Keyed(key, self.expr()?));
                }
                Some(Tok::Name(_))
                    if matches!(self.toks.get(self.pos + 1), Some((Tok::Assign, _))) =>
                {
                    let name = self.expect_name()?;
                    self.pos += 1; // '='
                    items.push(TableItem::Named(name, self.expr()?));
                }
                _ => items.push(TableItem::Positional(self.expr()?)),
            }
            if !(self.eat(&Tok::Comma) || self.eat(&Tok::Semi)) {
                break;
            }
        }
        self.expect(&Tok::RBrace, "'}'")?;
        Ok(Expr::Table(items))
    }

    fn funcbody(&mut self) -> Result<Rc<FuncBody>> {
        self.expect(&Tok::LParen, "'('")?;
        let mut params = Vec::new();
        if self.peek() != Some(&Tok::RParen) {
            params.push(self.expect_name()?);
            while self.eat(&Tok::Comma) {
                params.push(self.expect_name()?);
            }
        }
        self.expect(&Tok::RParen, "')'")?;
        let block = self.block()?;
        self.expect(&Tok::End, "'end'")?;
        Ok(Rc::new(FuncBody { params, block }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assignment() {
        let b = parse("a = 9").unwrap();
        assert!(matches!(&b.0[0], Stat::Assign { targets, exprs }
            if targets.len() == 1 && exprs.len() == 1));
    }

    #[test]
    fn parses_multi_assignment() {
        let b = parse("x, y, z = f()").unwrap();
        match &b.0[0] {
            Stat::Assign { targets, exprs } => {
                assert_eq!(targets.len(), 3);
                assert_eq!(exprs.len(), 1);
                assert!(matches!(exprs[0], Expr::Call(_, _)));
            }
            other => panic!("unexpected stat: {other:?}"),
        }
    }

    #[test]
    fn parses_method_call_statement() {
        let b = parse("a:g('woof')").unwrap();
        assert!(matches!(&b.0[0], Stat::Call(Expr::MethodCall(_, name, args))
            if &**name == "g" && args.len() == 1));
    }

    #[test]
    fn precedence_of_concat_and_compare() {
        // parsed as ((('a' .. x) == y) and z)
        let b = parse("r = 'a' .. x == y and z").unwrap();
        match &b.0[0] {
            Stat::Assign { exprs, .. } => assert!(matches!(exprs[0], Expr::And(_, _))),
            other => panic!("unexpected stat: {other:?}"),
        }
    }

    #[test]
    fn pow_is_right_associative() {
        let b = parse("r = 2 ^ 3 ^ 2").unwrap();
        match &b.0[0] {
            Stat::Assign { exprs, .. } => match &exprs[0] {
                Expr::Binary(BinOp::Pow, _, rhs) => {
                    assert!(matches!(**rhs, Expr::Binary(BinOp::Pow, _, _)))
                }
                other => panic!("unexpected expr: {other:?}"),
            },
            other => panic!("unexpected stat: {other:?}"),
        }
    }

    #[test]
    fn function_statement_sugar() {
        let b = parse("function my_add(i, j, k) return i + j + k end").unwrap();
        match &b.0[0] {
            Stat::Function { target, body } => {
                assert!(matches!(target, Expr::Name(n) if &**n == "my_add"));
                assert_eq!(body.params.len(), 3);
            }
            other => panic!("unexpected stat: {other:?}"),
        }
    }

    #[test]
    fn rejects_assignment_to_call() {
        assert!(parse("f() = 1").is_err());
    }

    #[test]
    fn reports_missing_end() {
        let err = parse("if true then a = 1").unwrap_err();
        assert!(err.to_string().contains("expected 'end'"));
    }
}
