//! Safe expression evaluation for expression-type decisions.
//!
//! Evaluation happens in two phases:
//! 1. every `$.path` occurrence in the raw text is substituted with the
//!    JSON-serialized literal of its resolved value (unresolved → `null`);
//! 2. the substituted text is parsed and evaluated against a closed grammar:
//!    JSON literals, comparisons (`== != > < >= <=`), boolean connectives
//!    (`&& || !`), postfix `.length`, and the functions `exists(x)`,
//!    `empty(x)`, `length(x)`.
//!
//! A static screen on the raw (pre-substitution) text rejects the patterns
//! a hostile author could use to probe a general-purpose evaluator. It runs
//! on the raw text only: substituted state values may legitimately contain
//! braces.

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::EvalError;
use crate::vars::resolve_variable;

// ---------------------------------------------------------------------------
// Static screen
// ---------------------------------------------------------------------------

/// Identifier patterns that are rejected outright.
const FORBIDDEN_WORDS: &[&str] = &[
    "function",
    "new",
    "eval",
    "import",
    "require",
    "window",
    "global",
    "process",
    "__proto__",
    "constructor",
];

/// Reject forbidden patterns in the raw expression before substitution.
fn screen(raw: &str) -> Result<(), EvalError> {
    for c in raw.chars() {
        if c == ';' || c == '{' || c == '}' {
            return Err(EvalError::Forbidden(c.to_string()));
        }
    }
    for word in FORBIDDEN_WORDS {
        if raw.contains(word) {
            return Err(EvalError::Forbidden((*word).to_string()));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Substitution
// ---------------------------------------------------------------------------

fn path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$(?:\.[A-Za-z0-9_]+|\[\d+\])+").expect("path regex is valid")
    })
}

/// Replace every `$.path` occurrence with the JSON literal of its resolved
/// value. Unresolved paths become the literal `null`.
pub fn substitute_paths(raw: &str, scope: &Value) -> String {
    path_regex()
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            let path = &caps[0];
            let resolved = resolve_variable(path, scope).unwrap_or(Value::Null);
            serde_json::to_string(&resolved).unwrap_or_else(|_| "null".to_string())
        })
        .into_owned()
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Colon,
    Comma,
    Dot,
    EqEq,
    NotEq,
    Gt,
    Lt,
    Ge,
    Le,
    AndAnd,
    OrOr,
    Bang,
    Ident(String),
    Str(String),
    Num(Value),
}

fn tokenize(text: &str) -> Result<Vec<Token>, EvalError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '{' => {
                tokens.push(Token::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Token::RBrace);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(EvalError::Parse("'=' is not an operator".into()));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    tokens.push(Token::Bang);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    return Err(EvalError::Parse("single '&' is not an operator".into()));
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    return Err(EvalError::Parse("single '|' is not an operator".into()));
                }
            }
            '"' => {
                let (raw, next) = scan_quoted(&chars, i, '"')?;
                let value: Value = serde_json::from_str(&raw)
                    .map_err(|e| EvalError::Parse(format!("bad string literal: {e}")))?;
                match value {
                    Value::String(s) => tokens.push(Token::Str(s)),
                    _ => return Err(EvalError::Parse("bad string literal".into())),
                }
                i = next;
            }
            '\'' => {
                let (raw, next) = scan_quoted(&chars, i, '\'')?;
                // Single-quoted strings get minimal unescaping only.
                let inner: String = raw[1..raw.len() - 1].to_string();
                tokens.push(Token::Str(inner.replace("\\'", "'").replace("\\\\", "\\")));
                i = next;
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || matches!(chars[i], '.' | 'e' | 'E' | '+' | '-'))
                {
                    // A '.' followed by a non-digit ends the number (postfix
                    // `.length` on a literal).
                    if chars[i] == '.' && !chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) {
                        break;
                    }
                    // '+'/'-' only continue a number directly after an exponent.
                    if matches!(chars[i], '+' | '-') && !matches!(chars[i - 1], 'e' | 'E') {
                        break;
                    }
                    i += 1;
                }
                let raw: String = chars[start..i].iter().collect();
                let value: Value = serde_json::from_str(&raw)
                    .map_err(|_| EvalError::Parse(format!("bad number literal '{raw}'")))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(EvalError::Parse(format!("unexpected character '{other}'")));
            }
        }
    }

    Ok(tokens)
}

/// Scan a quoted string starting at `start`; returns the raw slice including
/// quotes and the index just past the closing quote.
fn scan_quoted(chars: &[char], start: usize, quote: char) -> Result<(String, usize), EvalError> {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == '\\' {
            i += 2;
            continue;
        }
        if chars[i] == quote {
            return Ok((chars[start..=i].iter().collect(), i + 1));
        }
        i += 1;
    }
    Err(EvalError::Parse("unterminated string literal".into()))
}

// ---------------------------------------------------------------------------
// Parser (recursive descent)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Not(Box<Expr>),
    Length(Box<Expr>),
    Call(Func, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Func {
    Exists,
    Empty,
    Length,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, expected: &Token) -> Result<(), EvalError> {
        match self.next() {
            Some(ref t) if t == expected => Ok(()),
            other => Err(EvalError::Parse(format!(
                "expected {expected:?}, found {other:?}"
            ))),
        }
    }

    fn is_done(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// or := and ('||' and)*
    fn parse_or(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::OrOr) {
            self.next();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    /// and := cmp ('&&' cmp)*
    fn parse_and(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_cmp()?;
        while self.peek() == Some(&Token::AndAnd) {
            self.next();
            let right = self.parse_cmp()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    /// cmp := unary (op unary)?  — comparisons do not chain.
    fn parse_cmp(&mut self) -> Result<Expr, EvalError> {
        let left = self.parse_unary()?;
        let op = match self.peek() {
            Some(Token::EqEq) => CmpOp::Eq,
            Some(Token::NotEq) => CmpOp::Ne,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Ge) => CmpOp::Ge,
            Some(Token::Le) => CmpOp::Le,
            _ => return Ok(left),
        };
        self.next();
        let right = self.parse_unary()?;
        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    /// unary := '!' unary | postfix
    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        if self.peek() == Some(&Token::Bang) {
            self.next();
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_postfix()
    }

    /// postfix := primary ('.' 'length')*
    fn parse_postfix(&mut self) -> Result<Expr, EvalError> {
        let mut expr = self.parse_primary()?;
        while self.peek() == Some(&Token::Dot) {
            self.next();
            match self.next() {
                Some(Token::Ident(name)) if name == "length" => {
                    expr = Expr::Length(Box::new(expr));
                }
                other => {
                    return Err(EvalError::Parse(format!(
                        "only '.length' is allowed after a value, found {other:?}"
                    )));
                }
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.eat(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.peek() == Some(&Token::RBracket) {
                    self.next();
                    return Ok(Expr::Array(items));
                }
                loop {
                    items.push(self.parse_or()?);
                    match self.next() {
                        Some(Token::Comma) => continue,
                        Some(Token::RBracket) => break,
                        other => {
                            return Err(EvalError::Parse(format!(
                                "expected ',' or ']' in array, found {other:?}"
                            )));
                        }
                    }
                }
                Ok(Expr::Array(items))
            }
            Some(Token::LBrace) => {
                let mut pairs = Vec::new();
                if self.peek() == Some(&Token::RBrace) {
                    self.next();
                    return Ok(Expr::Object(pairs));
                }
                loop {
                    let key = match self.next() {
                        Some(Token::Str(s)) => s,
                        other => {
                            return Err(EvalError::Parse(format!(
                                "expected string key in object, found {other:?}"
                            )));
                        }
                    };
                    self.eat(&Token::Colon)?;
                    pairs.push((key, self.parse_or()?));
                    match self.next() {
                        Some(Token::Comma) => continue,
                        Some(Token::RBrace) => break,
                        other => {
                            return Err(EvalError::Parse(format!(
                                "expected ',' or '}}' in object, found {other:?}"
                            )));
                        }
                    }
                }
                Ok(Expr::Object(pairs))
            }
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Num(n)) => Ok(Expr::Literal(n)),
            Some(Token::Ident(name)) => match name.as_str() {
                "null" => Ok(Expr::Literal(Value::Null)),
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "exists" | "empty" | "length" => {
                    let func = match name.as_str() {
                        "exists" => Func::Exists,
                        "empty" => Func::Empty,
                        _ => Func::Length,
                    };
                    self.eat(&Token::LParen)?;
                    let arg = self.parse_or()?;
                    self.eat(&Token::RParen)?;
                    Ok(Expr::Call(func, Box::new(arg)))
                }
                other => Err(EvalError::Parse(format!("unknown identifier '{other}'"))),
            },
            other => Err(EvalError::Parse(format!(
                "unexpected token {other:?} in expression"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// JS-style boolean coercion: `null`, `false`, `0`, `NaN` and `""` are
/// falsy; everything else (including empty arrays/objects) is truthy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Loose equality: numbers compare numerically, everything else structurally.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(fx), Some(fy)) => fx == fy,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Ordering is defined for number pairs and string pairs only.
pub fn compare_order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.as_str().cmp(y.as_str())),
        _ => None,
    }
}

fn eval_expr(expr: &Expr) -> Value {
    match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Array(items) => Value::Array(items.iter().map(eval_expr).collect()),
        Expr::Object(pairs) => Value::Object(
            pairs
                .iter()
                .map(|(k, v)| (k.clone(), eval_expr(v)))
                .collect(),
        ),
        Expr::Not(inner) => Value::Bool(!truthy(&eval_expr(inner))),
        Expr::Length(inner) => match eval_expr(inner) {
            Value::Array(items) => Value::from(items.len()),
            Value::String(s) => Value::from(s.chars().count()),
            // No length on other types; mirrors undefined-property lookup.
            _ => Value::Null,
        },
        Expr::Call(func, arg) => {
            let v = eval_expr(arg);
            match func {
                Func::Exists => Value::Bool(!v.is_null()),
                Func::Empty => Value::Bool(match &v {
                    Value::Null => true,
                    Value::String(s) => s.is_empty(),
                    Value::Array(items) => items.is_empty(),
                    Value::Object(map) => map.is_empty(),
                    _ => false,
                }),
                Func::Length => match &v {
                    Value::Array(items) => Value::from(items.len()),
                    Value::String(s) => Value::from(s.chars().count()),
                    Value::Object(map) => Value::from(map.len()),
                    _ => Value::from(0),
                },
            }
        }
        Expr::Compare(op, left, right) => {
            let (lv, rv) = (eval_expr(left), eval_expr(right));
            let result = match op {
                CmpOp::Eq => values_equal(&lv, &rv),
                CmpOp::Ne => !values_equal(&lv, &rv),
                // Incomparable operand pairs are simply not ordered.
                CmpOp::Gt => compare_order(&lv, &rv) == Some(Ordering::Greater),
                CmpOp::Lt => compare_order(&lv, &rv) == Some(Ordering::Less),
                CmpOp::Ge => matches!(
                    compare_order(&lv, &rv),
                    Some(Ordering::Greater | Ordering::Equal)
                ),
                CmpOp::Le => matches!(
                    compare_order(&lv, &rv),
                    Some(Ordering::Less | Ordering::Equal)
                ),
            };
            Value::Bool(result)
        }
        Expr::And(left, right) => {
            if !truthy(&eval_expr(left)) {
                Value::Bool(false)
            } else {
                Value::Bool(truthy(&eval_expr(right)))
            }
        }
        Expr::Or(left, right) => {
            if truthy(&eval_expr(left)) {
                Value::Bool(true)
            } else {
                Value::Bool(truthy(&eval_expr(right)))
            }
        }
    }
}

/// Evaluate a raw decision expression against a lookup scope.
///
/// Runs the static screen, substitutes `$.path` references, then parses and
/// evaluates. The returned value is the expression's result literal; callers
/// coerce it with [`truthy`].
pub fn evaluate(raw: &str, scope: &Value) -> Result<Value, EvalError> {
    screen(raw)?;
    let substituted = substitute_paths(raw, scope);
    let tokens = tokenize(&substituted)?;
    if tokens.is_empty() {
        return Err(EvalError::Parse("empty expression".into()));
    }
    let mut parser = Parser::new(tokens);
    let parsed = parser.parse_or()?;
    if !parser.is_done() {
        return Err(EvalError::Parse("unexpected trailing tokens".into()));
    }
    Ok(eval_expr(&parsed))
}
