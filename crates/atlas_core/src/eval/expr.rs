//! `${ ... }` expressions embedded in document strings.
//!
//! The grammar is small on purpose:
//!
//! ```text
//! expr    := operand (("==" | "!=") operand)?
//! operand := literal | ident "(" (expr ("," expr)*)? ")" | path
//! path    := ident ("." ident | "[" integer "]")*
//! literal := "null" | "true" | "false" | number | "string"
//! ```

use std::fmt;

use serde_json::{Number, Value};

use crate::error::{CoreError, Result};

/// A dotted reference such as `data.sql.users.values[0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub root: String,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Attr(String),
    Index(usize),
}

impl Reference {
    /// The attribute name at `index`, if that step is an attribute.
    pub fn attr(&self, index: usize) -> Option<&str> {
        match self.steps.get(index) {
            Some(Step::Attr(name)) => Some(name),
            _ => None,
        }
    }

    /// `data.<type>.<label>` when this refers into a data block.
    pub fn data_block(&self) -> Option<String> {
        if self.root != "data" {
            return None;
        }
        Some(format!("data.{}.{}", self.attr(0)?, self.attr(1)?))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)?;
        for step in &self.steps {
            match step {
                Step::Attr(name) => write!(f, ".{name}")?,
                Step::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ref(Reference),
    Call { name: String, args: Vec<Expr> },
    Compare { negate: bool, lhs: Box<Expr>, rhs: Box<Expr> },
}

/// Resolves references while evaluating.
pub trait Scope {
    fn lookup(&self, reference: &Reference) -> Result<Value>;
}

impl Expr {
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = lex(source)?;
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
        };
        let expr = parser.expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(expr)
    }

    pub fn eval(&self, scope: &dyn Scope) -> Result<Value> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Ref(reference) => scope.lookup(reference),
            Expr::Compare { negate, lhs, rhs } => {
                let equal = lhs.eval(scope)? == rhs.eval(scope)?;
                Ok(Value::Bool(equal != *negate))
            }
            Expr::Call { name, args } => call(name, args, scope),
        }
    }

    fn references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Ref(reference) => out.push(reference),
            Expr::Compare { lhs, rhs, .. } => {
                lhs.references(out);
                rhs.references(out);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| a.references(out)),
        }
    }
}

fn call(name: &str, args: &[Expr], scope: &dyn Scope) -> Result<Value> {
    match (name, args) {
        ("keys", [arg]) => match arg.eval(scope)? {
            Value::Object(map) => Ok(Value::Array(map.keys().cloned().map(Value::String).collect())),
            other => Err(CoreError::expression(
                "keys",
                format!("expected an object, got {}", kind(&other)),
            )),
        },
        ("keys", _) => Err(CoreError::expression("keys", "expected exactly one argument")),
        _ => Err(CoreError::expression(name, "unknown function")),
    }
}

pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(Number),
    Str(String),
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Eq,
    Ne,
}

fn lex(source: &str) -> Result<Vec<Token>> {
    let err = |message: String| CoreError::expression(source, message);
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
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
            '=' | '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(if c == '=' { Token::Eq } else { Token::Ne });
                i += 2;
            }
            '"' => {
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(err("unterminated string".into())),
                        Some('"') => break,
                        Some('\\') => {
                            match chars.get(i + 1) {
                                Some('n') => text.push('\n'),
                                Some('t') => text.push('\t'),
                                Some(&other) => text.push(other),
                                None => return Err(err("unterminated string".into())),
                            }
                            i += 2;
                        }
                        Some(&other) => {
                            text.push(other);
                            i += 1;
                        }
                    }
                }
                i += 1;
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) => {
                let start = i;
                i += 1;
                while chars.get(i).is_some_and(|c| c.is_ascii_digit() || *c == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = match text.parse::<i64>() {
                    Ok(n) => Number::from(n),
                    Err(_) => text
                        .parse::<f64>()
                        .ok()
                        .and_then(Number::from_f64)
                        .ok_or_else(|| err(format!("invalid number {text}")))?,
                };
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while chars
                    .get(i)
                    .is_some_and(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(err(format!("unexpected character {other:?}"))),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> CoreError {
        CoreError::expression(self.source, message)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        match self.next() {
            Some(t) if t == token => Ok(()),
            _ => Err(self.error(&format!("expected {token:?}"))),
        }
    }

    fn expr(&mut self) -> Result<Expr> {
        let lhs = self.operand()?;
        let negate = match self.peek() {
            Some(Token::Eq) => false,
            Some(Token::Ne) => true,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.operand()?;
        Ok(Expr::Compare {
            negate,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn operand(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Number(n)) => Ok(Expr::Literal(Value::Number(n))),
            Some(Token::Ident(name)) => match name.as_str() {
                "null" => Ok(Expr::Literal(Value::Null)),
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                _ if self.peek() == Some(&Token::LParen) => self.call(name),
                _ => self.path(name),
            },
            _ => Err(self.error("expected a value or reference")),
        }
    }

    fn call(&mut self, name: String) -> Result<Expr> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(Expr::Call { name, args });
        }
        loop {
            args.push(self.expr()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                _ => return Err(self.error("expected , or )")),
            }
        }
        Ok(Expr::Call { name, args })
    }

    fn path(&mut self, root: String) -> Result<Expr> {
        let mut steps = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Ident(name)) => steps.push(Step::Attr(name)),
                        _ => return Err(self.error("expected an attribute name after .")),
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = match self.next() {
                        Some(Token::Number(n)) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
                        _ => None,
                    }
                    .ok_or_else(|| self.error("expected a non-negative index"))?;
                    self.expect(Token::RBracket)?;
                    steps.push(Step::Index(index));
                }
                _ => break,
            }
        }
        Ok(Expr::Ref(Reference { root, steps }))
    }
}

/// A document string split into literal text and expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Text(String),
    Expr(Expr),
}

impl Template {
    pub fn parse(input: &str) -> Result<Self> {
        let mut parts = Vec::new();
        let mut text = String::new();
        let mut rest = input;
        while let Some(at) = rest.find("${") {
            if rest[..at].ends_with('$') {
                text.push_str(&rest[..at - 1]);
                text.push_str("${");
                rest = &rest[at + 2..];
                continue;
            }
            text.push_str(&rest[..at]);
            let body = &rest[at + 2..];
            let end = closing_brace(body)
                .ok_or_else(|| CoreError::expression(input, "unterminated ${"))?;
            if !text.is_empty() {
                parts.push(Part::Text(std::mem::take(&mut text)));
            }
            parts.push(Part::Expr(Expr::parse(body[..end].trim())?));
            rest = &body[end + 1..];
        }
        text.push_str(rest);
        if !text.is_empty() {
            parts.push(Part::Text(text));
        }
        Ok(Self { parts })
    }

    /// References used by the expressions of this string.
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        for part in &self.parts {
            if let Part::Expr(expr) = part {
                expr.references(&mut out);
            }
        }
        out
    }

    /// A lone expression yields its raw value; anything else interpolates to
    /// a string.
    pub fn eval(&self, scope: &dyn Scope) -> Result<Value> {
        if let [Part::Expr(expr)] = self.parts.as_slice() {
            return expr.eval(scope);
        }
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Expr(expr) => match expr.eval(scope)? {
                    Value::Null => {}
                    Value::String(s) => out.push_str(&s),
                    Value::Bool(b) => out.push_str(&b.to_string()),
                    Value::Number(n) => out.push_str(&n.to_string()),
                    other => {
                        return Err(CoreError::expression(
                            "${...}",
                            format!("cannot interpolate a {} into a string", kind(&other)),
                        ));
                    }
                },
            }
        }
        Ok(Value::String(out))
    }
}

/// Offset of the `}` closing an expression, skipping string literals.
fn closing_brace(body: &str) -> Option<usize> {
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '}' if !in_string => return Some(i),
            _ => {}
        }
    }
    None
}

/// Evaluate every string inside `value`.
pub fn eval_value(value: &Value, scope: &dyn Scope) -> Result<Value> {
    Ok(match value {
        Value::String(s) => Template::parse(s)?.eval(scope)?,
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| eval_value(v, scope))
                .collect::<Result<_>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), eval_value(v, scope)?)))
                .collect::<Result<_>>()?,
        ),
        other => other.clone(),
    })
}

/// Collect every reference made by the strings inside `value`.
pub fn references(value: &Value, out: &mut Vec<Reference>) -> Result<()> {
    match value {
        Value::String(s) => {
            let template = Template::parse(s)?;
            out.extend(template.references().into_iter().cloned());
        }
        Value::Array(items) => {
            for item in items {
                references(item, out)?;
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                references(item, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}
