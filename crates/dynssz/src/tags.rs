//! Parses `ssz-size`/`dynssz-size`/`ssz-max`/`dynssz-max` tag strings and evaluates the
//! arithmetic expressions `dynssz-*` tags may carry.
//!
//! A tag string is comma-separated, one token per dimension, outermost first. Each token is
//! either `?` (dynamic), a decimal literal, or — for `dynssz-*` tags only — an arithmetic
//! expression over spec-value identifiers.

use crate::error::SszError;
use crate::spec::SpecValues;

/// One dimension's worth of a parsed `ssz-size`/`ssz-max` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeHint {
    /// `?` — this dimension has no static bound; determined purely by the value.
    Dynamic,
    /// A literal decimal size/maximum.
    Literal(u64),
    /// A `dynssz-*` expression to be evaluated against the spec-value table.
    Expr(Expr),
}

/// Parses a comma-separated `ssz-*` tag string into one [`SizeHint`] per dimension.
///
/// Every token in an `ssz-*` (non-`dyn`) tag must be `?` or a literal; expressions are only
/// legal in `dynssz-*` tags.
pub fn parse_static_tag(tag: &str) -> Result<Vec<SizeHint>, SszError> {
    tag.split(',')
        .map(str::trim)
        .map(|tok| {
            if tok == "?" {
                Ok(SizeHint::Dynamic)
            } else {
                tok.parse::<u64>().map(SizeHint::Literal).map_err(|_| {
                    SszError::MalformedAnnotation(format!("expected `?` or a literal, got `{tok}`"))
                })
            }
        })
        .collect()
}

/// Parses a comma-separated `dynssz-*` tag string into one [`SizeHint`] per dimension.
pub fn parse_dyn_tag(tag: &str) -> Result<Vec<SizeHint>, SszError> {
    tag.split(',')
        .map(str::trim)
        .map(|tok| {
            if tok == "?" {
                Ok(SizeHint::Dynamic)
            } else if let Ok(lit) = tok.parse::<u64>() {
                Ok(SizeHint::Literal(lit))
            } else {
                Ok(SizeHint::Expr(parse_expr(tok)?))
            }
        })
        .collect()
}

/// Resolves the per-dimension hints for one field, merging a `dynssz-*` tag (if present)
/// over an `ssz-*` default tag.
///
/// An identifier a `dynssz-*` expression references but that is absent from the spec-value
/// table is **not** a hard error: that dimension silently falls back to the corresponding
/// `ssz-*` default. This mirrors the documented, compatibility-preserving behavior of the
/// system this engine is part of (see the design ledger for the rationale).
pub fn resolve_hints(
    static_hints: Option<&[SizeHint]>,
    dyn_hints: Option<&[SizeHint]>,
    spec: &SpecValues,
) -> Result<Vec<u64>, SszError> {
    let len = dyn_hints
        .map(<[_]>::len)
        .or_else(|| static_hints.map(<[_]>::len))
        .unwrap_or(0);

    (0..len)
        .map(|i| {
            let dyn_hint = dyn_hints.and_then(|h| h.get(i));
            let static_hint = static_hints.and_then(|h| h.get(i));
            resolve_one(dyn_hint, static_hint, spec)
        })
        .collect()
}

fn resolve_one(
    dyn_hint: Option<&SizeHint>,
    static_hint: Option<&SizeHint>,
    spec: &SpecValues,
) -> Result<u64, SszError> {
    if let Some(hint) = dyn_hint {
        match hint {
            SizeHint::Literal(n) => return Ok(*n),
            SizeHint::Expr(expr) => match expr.eval(spec) {
                Ok(v) => return Ok(v),
                Err(SszError::SpecUnknown(_)) => {
                    // Fall through to the ssz-* default below.
                }
                Err(e) => return Err(e),
            },
            SizeHint::Dynamic => return Ok(u64::MAX),
        }
    }
    match static_hint {
        Some(SizeHint::Literal(n)) => Ok(*n),
        Some(SizeHint::Dynamic) | None => Ok(u64::MAX),
        Some(SizeHint::Expr(_)) => Err(SszError::MalformedAnnotation(
            "ssz-* tags cannot carry expressions".into(),
        )),
    }
}

/// An arithmetic expression over spec-value identifiers, integer literals, and
/// `+ - * / %`, evaluated with checked unsigned 64-bit arithmetic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// A literal integer.
    Lit(u64),
    /// A reference to a named spec value.
    Ident(String),
    /// A binary operation over two sub-expressions.
    Binop(Box<Expr>, Op, Box<Expr>),
}

/// A supported binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Integer division.
    Div,
    /// Remainder.
    Rem,
}

impl Expr {
    /// Evaluates this expression against a spec-value table.
    ///
    /// Returns [`SszError::SpecUnknown`] if an identifier is not present in `spec`, and
    /// [`SszError::InvalidValueRange`] on overflow or division/remainder by zero.
    pub fn eval(&self, spec: &SpecValues) -> Result<u64, SszError> {
        match self {
            Expr::Lit(n) => Ok(*n),
            Expr::Ident(name) => spec
                .get(name)
                .ok_or_else(|| SszError::SpecUnknown(name.clone())),
            Expr::Binop(lhs, op, rhs) => {
                let l = lhs.eval(spec)?;
                let r = rhs.eval(spec)?;
                let overflow = || {
                    SszError::InvalidValueRange {
                        value: format!("{l:?} {op:?} {r:?} overflowed"),
                    }
                };
                match op {
                    Op::Add => l.checked_add(r).ok_or_else(overflow),
                    Op::Sub => l.checked_sub(r).ok_or_else(overflow),
                    Op::Mul => l.checked_mul(r).ok_or_else(overflow),
                    Op::Div => l.checked_div(r).ok_or_else(overflow),
                    Op::Rem => l.checked_rem(r).ok_or_else(overflow),
                }
            }
        }
    }
}

/// A small recursive-descent parser for [`Expr`]: `term (('+' | '-') term)*`, where
/// `term := factor (('*' | '/' | '%') factor)*`, and `factor` is a literal, identifier, or a
/// parenthesized expression.
struct ExprParser<'a> {
    tokens: Vec<Tok<'a>>,
    pos: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tok<'a> {
    Ident(&'a str),
    Num(u64),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<Tok<'_>>, SszError> {
    let mut toks = Vec::new();
    let bytes = src.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                toks.push(Tok::Plus);
                i += 1;
            }
            '-' => {
                toks.push(Tok::Minus);
                i += 1;
            }
            '*' => {
                toks.push(Tok::Star);
                i += 1;
            }
            '/' => {
                toks.push(Tok::Slash);
                i += 1;
            }
            '%' => {
                toks.push(Tok::Percent);
                i += 1;
            }
            '(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                    i += 1;
                }
                let n = src[start..i].parse::<u64>().map_err(|_| {
                    SszError::MalformedAnnotation(format!("bad integer literal in `{src}`"))
                })?;
                toks.push(Tok::Num(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len()
                    && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] as char == '_')
                {
                    i += 1;
                }
                toks.push(Tok::Ident(&src[start..i]));
            }
            other => {
                return Err(SszError::MalformedAnnotation(format!(
                    "unexpected character `{other}` in expression `{src}`"
                )));
            }
        }
    }
    Ok(toks)
}

impl<'a> ExprParser<'a> {
    fn peek(&self) -> Option<Tok<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Tok<'a>> {
        let t = self.peek();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_expr(&mut self) -> Result<Expr, SszError> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => Op::Add,
                Some(Tok::Minus) => Op::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_term()?;
            lhs = Expr::Binop(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, SszError> {
        let mut lhs = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => Op::Mul,
                Some(Tok::Slash) => Op::Div,
                Some(Tok::Percent) => Op::Rem,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_factor()?;
            lhs = Expr::Binop(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> Result<Expr, SszError> {
        match self.bump() {
            Some(Tok::Num(n)) => Ok(Expr::Lit(n)),
            Some(Tok::Ident(name)) => Ok(Expr::Ident(name.to_string())),
            Some(Tok::LParen) => {
                let inner = self.parse_expr()?;
                match self.bump() {
                    Some(Tok::RParen) => Ok(inner),
                    _ => Err(SszError::MalformedAnnotation("expected `)`".into())),
                }
            }
            other => Err(SszError::MalformedAnnotation(format!(
                "expected a value, got {other:?}"
            ))),
        }
    }
}

/// Parses a single arithmetic expression (one comma-separated dimension of a `dynssz-*` tag).
pub fn parse_expr(src: &str) -> Result<Expr, SszError> {
    let tokens = tokenize(src)?;
    let mut parser = ExprParser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(SszError::MalformedAnnotation(format!(
            "trailing tokens in expression `{src}`"
        )));
    }
    Ok(expr)
}
