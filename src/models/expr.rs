//! Constrained numeric expressions of a single variable `t`.
//!
//! User-defined chronology functions are given as a short program of
//! assignments, e.g.
//!
//! ```text
//! a = 5.44e-14 * (exp(6.93*t) - 1)
//! b = 8.38e-4 * t
//! n1 = a + b
//! ```
//!
//! Supported: numbers, `t`, `pi`, `e`, previously assigned names, `+ - * /`,
//! `^` and `**` (right associative), unary signs, parentheses and the
//! elementary functions listed in [`Func`]. Everything is resolved when the
//! program is compiled, so evaluation cannot fail.

use std::collections::HashMap;

use crate::error::{CraterError, ErrorKind};

/// Name of the variable holding the program's result.
const RESULT_NAME: &str = "n1";
/// Slot of the independent variable.
const T_SLOT: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Exp,
    Ln,
    Log10,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Abs,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "exp" => Func::Exp,
            "log" | "ln" => Func::Ln,
            "log10" => Func::Log10,
            "sqrt" => Func::Sqrt,
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "asin" | "arcsin" => Func::Asin,
            "acos" | "arccos" => Func::Acos,
            "atan" | "arctan" => Func::Atan,
            "sinh" => Func::Sinh,
            "cosh" => Func::Cosh,
            "tanh" => Func::Tanh,
            "abs" => Func::Abs,
            _ => return None,
        })
    }

    fn apply(self, x: f64) -> f64 {
        match self {
            Func::Exp => x.exp(),
            Func::Ln => x.ln(),
            Func::Log10 => x.log10(),
            Func::Sqrt => x.sqrt(),
            Func::Sin => x.sin(),
            Func::Cos => x.cos(),
            Func::Tan => x.tan(),
            Func::Asin => x.asin(),
            Func::Acos => x.acos(),
            Func::Atan => x.atan(),
            Func::Sinh => x.sinh(),
            Func::Cosh => x.cosh(),
            Func::Tanh => x.tanh(),
            Func::Abs => x.abs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Num(f64),
    Var(usize),
    Neg(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Box<Expr>),
}

impl Expr {
    fn eval(&self, slots: &[f64]) -> f64 {
        match self {
            Expr::Num(v) => *v,
            Expr::Var(i) => slots[*i],
            Expr::Neg(e) => -e.eval(slots),
            Expr::Call(f, e) => f.apply(e.eval(slots)),
            Expr::Bin(op, a, b) => {
                let (a, b) = (a.eval(slots), b.eval(slots));
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Pow,
    LParen,
    RParen,
}

fn invalid(msg: impl Into<String>) -> CraterError {
    CraterError::new(ErrorKind::InvalidExpression, msg)
}

fn tokenize(src: &str) -> Result<Vec<Token>, CraterError> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' => i += 1,
            '+' => {
                out.push(Token::Plus);
                i += 1;
            }
            '-' => {
                out.push(Token::Minus);
                i += 1;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                out.push(Token::Pow);
                i += 2;
            }
            '*' => {
                out.push(Token::Star);
                i += 1;
            }
            '/' => {
                out.push(Token::Slash);
                i += 1;
            }
            '^' => {
                out.push(Token::Pow);
                i += 1;
            }
            '(' => {
                out.push(Token::LParen);
                i += 1;
            }
            ')' => {
                out.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        while j < chars.len() && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let v: f64 = text
                    .parse()
                    .map_err(|_| invalid(format!("Invalid number: {text}")))?;
                out.push(Token::Num(v));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                out.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(invalid(format!("Unexpected character '{other}'"))),
        }
    }
    Ok(out)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    names: &'a HashMap<String, usize>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, tok: Token) -> Result<(), CraterError> {
        match self.next() {
            Some(t) if t == tok => Ok(()),
            Some(t) => Err(invalid(format!("Expected {tok:?}, found {t:?}"))),
            None => Err(invalid(format!("Expected {tok:?} at end of expression"))),
        }
    }

    fn expr(&mut self) -> Result<Expr, CraterError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, CraterError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, CraterError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, CraterError> {
        let base = self.primary()?;
        if self.peek() == Some(&Token::Pow) {
            self.pos += 1;
            let exp = self.unary()?;
            return Ok(Expr::Bin(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, CraterError> {
        match self.next() {
            Some(Token::Num(v)) => Ok(Expr::Num(v)),
            Some(Token::LParen) => {
                let e = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(e)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    let f = Func::from_name(&name)
                        .ok_or_else(|| invalid(format!("Unknown function: {name}")))?;
                    self.pos += 1;
                    let arg = self.expr()?;
                    self.expect(Token::RParen)?;
                    return Ok(Expr::Call(f, Box::new(arg)));
                }
                if let Some(&slot) = self.names.get(&name) {
                    return Ok(Expr::Var(slot));
                }
                match name.as_str() {
                    "pi" => Ok(Expr::Num(std::f64::consts::PI)),
                    "e" => Ok(Expr::Num(std::f64::consts::E)),
                    _ => Err(invalid(format!("Unknown name: {name}"))),
                }
            }
            Some(t) => Err(invalid(format!("Unexpected token {t:?}"))),
            None => Err(invalid("Unexpected end of expression")),
        }
    }
}

fn parse_expr(src: &str, names: &HashMap<String, usize>) -> Result<Expr, CraterError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(invalid("Empty expression"));
    }
    let mut p = Parser { tokens, pos: 0, names };
    let e = p.expr()?;
    if p.pos != p.tokens.len() {
        return Err(invalid(format!("Trailing input in expression: {src}")));
    }
    Ok(e)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A compiled assignment program evaluating `n1` as a function of `t`.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    steps: Vec<(usize, Expr)>,
    result: usize,
    n_slots: usize,
}

impl Formula {
    /// Compile `src`: either one bare expression or a sequence of
    /// `name = expr` lines (or `;`-separated statements) assigning `n1`.
    pub fn parse(src: &str) -> Result<Self, CraterError> {
        let statements: Vec<&str> = src
            .split(['\n', ';'])
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.starts_with('#'))
            .collect();
        if statements.is_empty() {
            return Err(invalid("Empty formula"));
        }

        let mut names: HashMap<String, usize> = HashMap::new();
        names.insert("t".to_string(), T_SLOT);
        let mut steps = Vec::with_capacity(statements.len());

        if statements.len() == 1 && !statements[0].contains('=') {
            let e = parse_expr(statements[0], &names)?;
            return Ok(Self {
                steps: vec![(1, e)],
                result: 1,
                n_slots: 2,
            });
        }

        for stmt in statements {
            let (lhs, rhs) = stmt
                .split_once('=')
                .ok_or_else(|| invalid(format!("Expected assignment: {stmt}")))?;
            let name = lhs.trim();
            if !is_identifier(name) || name == "t" || Func::from_name(name).is_some() {
                return Err(invalid(format!("Invalid assignment target: {name}")));
            }
            let e = parse_expr(rhs, &names)?;
            let next = names.len();
            let slot = *names.entry(name.to_string()).or_insert(next);
            steps.push((slot, e));
        }

        let result = *names
            .get(RESULT_NAME)
            .ok_or_else(|| invalid(format!("Formula never assigns {RESULT_NAME}")))?;
        Ok(Self {
            steps,
            result,
            n_slots: names.len(),
        })
    }

    pub fn eval(&self, t: f64) -> f64 {
        let mut slots = vec![f64::NAN; self.n_slots];
        slots[T_SLOT] = t;
        for (slot, e) in &self.steps {
            slots[*slot] = e.eval(&slots);
        }
        slots[self.result]
    }
}
