//! Lexer for the Sable surface syntax.
//!
//! Built on the logos library. Produces a token stream with 1-based line
//! numbers for error reporting.

use std::rc::Rc;

use logos::Logos;

use crate::error::{Error, Result};

/// One lexical token.
#[allow(missing_docs)]
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"--[^\n]*")]
pub enum Tok {
    // Keywords
    #[token("and")]
    And,
    #[token("break")]
    Break,
    #[token("do")]
    Do,
    #[token("else")]
    Else,
    #[token("elseif")]
    Elseif,
    #[token("end")]
    End,
    #[token("false")]
    False,
    #[token("for")]
    For,
    #[token("function")]
    Function,
    #[token("if")]
    If,
    #[token("local")]
    Local,
    #[token("nil")]
    Nil,
    #[token("not")]
    Not,
    #[token("or")]
    Or,
    #[token("return")]
    Return,
    #[token("then")]
    Then,
    #[token("true")]
    True,
    #[token("while")]
    While,

    // Symbols
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("#")]
    Hash,
    #[token("==")]
    Eq,
    #[token("~=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=")]
    Assign,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token("..")]
    Concat,
    #[token(".")]
    Dot,

    // Literals
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    #[regex(r"0[xX][0-9a-fA-F]+", parse_hex)]
    Int(i64),

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, unescape)]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, unescape)]
    Str(Rc<[u8]>),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| Rc::<str>::from(lex.slice()))]
    Name(Rc<str>),
}

fn parse_hex(lex: &mut logos::Lexer<'_, Tok>) -> Option<i64> {
    u64::from_str_radix(&lex.slice()[2..], 16).ok().map(|v| v as i64)
}

fn unescape(lex: &mut logos::Lexer<'_, Tok>) -> Option<Rc<[u8]>> {
    let raw = lex.slice().as_bytes();
    // Strip the surrounding quotes before decoding escapes.
    let inner = &raw[1..raw.len() - 1];
    let mut out = Vec::with_capacity(inner.len());
    let mut i = 0;
    while i < inner.len() {
        let b = inner[i];
        if b == b'\\' {
            i += 1;
            let esc = *inner.get(i)?;
            out.push(match esc {
                b'n' => b'\n',
                b't' => b'\t',
                b'r' => b'\r',
                b'a' => 0x07,
                b'b' => 0x08,
                b'0' => 0,
                b'\\' => b'\\',
                b'"' => b'"',
                b'\'' => b'\'',
                _ => return None,
            });
        } else {
            out.push(b);
        }
        i += 1;
    }
    Some(Rc::from(out.as_slice()))
}

/// Tokenise a whole chunk, pairing each token with its source line.
pub fn lex(src: &str) -> Result<Vec<(Tok, u32)>> {
    let mut out = Vec::new();
    let mut lexer = Tok::lexer(src);
    let mut line = 1u32;
    let mut scanned = 0usize;
    while let Some(item) = lexer.next() {
        let span = lexer.span();
        line += src[scanned..span.start].bytes().filter(|b| *b == b'\n').count() as u32;
        scanned = span.start;
        match item {
            Ok(tok) => out.push((tok, line)),
            Err(()) => {
                return Err(Error::Parse {
                    line,
                    message: format!("unexpected character '{}'", &src[span.start..span.end]),
                })
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        lex(src).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn keywords_beat_names() {
        assert_eq!(toks("and"), vec![Tok::And]);
        assert_eq!(toks("andy"), vec![Tok::Name(Rc::from("andy"))]);
    }

    #[test]
    fn numbers() {
        assert_eq!(toks("42"), vec![Tok::Int(42)]);
        assert_eq!(toks("0x10"), vec![Tok::Int(16)]);
        assert_eq!(toks("9.2"), vec![Tok::Float(9.2)]);
        assert_eq!(toks("1e3"), vec![Tok::Float(1000.0)]);
    }

    #[test]
    fn concat_vs_dot() {
        assert_eq!(
            toks("a..b"),
            vec![
                Tok::Name(Rc::from("a")),
                Tok::Concat,
                Tok::Name(Rc::from("b"))
            ]
        );
        assert_eq!(
            toks("a.b"),
            vec![Tok::Name(Rc::from("a")), Tok::Dot, Tok::Name(Rc::from("b"))]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            toks(r#""a\nb""#),
            vec![Tok::Str(Rc::from(&b"a\nb"[..]))]
        );
        assert_eq!(toks(r#"'it'"#), vec![Tok::Str(Rc::from(&b"it"[..]))]);
        assert_eq!(toks(r#""a\0b""#), vec![Tok::Str(Rc::from(&b"a\0b"[..]))]);
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(toks("a = 1 -- trailing\nb"), toks("a = 1\nb"));
    }

    #[test]
    fn line_numbers() {
        let lexed = lex("a\nb\n\nc").unwrap();
        let lines: Vec<u32> = lexed.iter().map(|(_, l)| *l).collect();
        assert_eq!(lines, vec![1, 2, 4]);
    }

    #[test]
    fn bad_character_reports_line() {
        let err = lex("a = 1\n@").unwrap_err();
        match err {
            Error::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
