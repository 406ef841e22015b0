//! Calculator tool - evaluates arithmetic expressions
//!
//! A small recursive-descent evaluator over `f64`. Precedence, lowest first:
//! `+ -`, `* / %`, unary sign, `** ^` (right associative), atoms.

use super::{Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::f64::consts::{E, PI};
use thiserror::Error;

/// Integral results up to this magnitude print without a fraction
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0; // 2^53

/// Longest expression accepted, in characters
const MAX_EXPRESSION_CHARS: usize = 4096;

/// Deepest nesting of signs, exponents and parentheses the parser descends
const MAX_DEPTH: usize = 256;

#[derive(Debug, Deserialize)]
struct CalculatorInput {
    expression: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("unexpected character {0:?} at position {1}")]
    UnexpectedChar(char, usize),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token {0}")]
    UnexpectedToken(String),
    #[error("unknown name {0:?}")]
    UnknownName(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NotFinite,
    #[error("expression is longer than {0} characters")]
    TooLong(usize),
    #[error("expression nests deeper than {0} levels")]
    TooDeep(usize),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Pow,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<Token>, CalcError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Scientific notation: 1e3, 2.5E-4
                if i < chars.len() && matches!(chars[i], 'e' | 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && matches!(chars[j], '+' | '-') {
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
                let value = text
                    .parse::<f64>()
                    .map_err(|_| CalcError::UnexpectedToken(text.clone()))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Pow);
                i += 2;
            }
            '+' | '-' | '*' | '/' | '%' | '^' | '(' | ')' => {
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '^' => Token::Pow,
                    '(' => Token::LParen,
                    _ => Token::RParen,
                });
                i += 1;
            }
            other => return Err(CalcError::UnexpectedChar(other, i)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), CalcError> {
        match self.next() {
            Some(ref t) if t == expected => Ok(()),
            Some(t) => Err(CalcError::UnexpectedToken(format!("{t:?}"))),
            None => Err(CalcError::UnexpectedEnd),
        }
    }

    fn expr(&mut self) -> Result<f64, CalcError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    if rhs == 0.0 {
                        return Err(CalcError::DivisionByZero);
                    }
                    value /= rhs;
                }
                Some(Token::Percent) => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    if rhs == 0.0 {
                        return Err(CalcError::DivisionByZero);
                    }
                    // Sign follows the divisor
                    value -= rhs * (value / rhs).floor();
                }
                _ => return Ok(value),
            }
        }
    }

    /// All recursion passes through here, so nesting is bounded here
    fn unary(&mut self) -> Result<f64, CalcError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CalcError::TooDeep(MAX_DEPTH));
        }
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> Result<f64, CalcError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, CalcError> {
        let base = self.atom()?;
        if self.peek() == Some(&Token::Pow) {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64, CalcError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let arg = self.expr()?;
                    self.expect(&Token::RParen)?;
                    apply_function(&name, arg)
                } else {
                    constant(&name)
                }
            }
            Some(t) => Err(CalcError::UnexpectedToken(format!("{t:?}"))),
            None => Err(CalcError::UnexpectedEnd),
        }
    }
}

fn constant(name: &str) -> Result<f64, CalcError> {
    match name {
        "pi" => Ok(PI),
        "e" => Ok(E),
        _ => Err(CalcError::UnknownName(name.to_string())),
    }
}

fn apply_function(name: &str, x: f64) -> Result<f64, CalcError> {
    Ok(match name {
        "sqrt" => x.sqrt(),
        "abs" => x.abs(),
        "exp" => x.exp(),
        "ln" | "log" => x.ln(),
        "log10" => x.log10(),
        "sin" => x.sin(),
        "cos" => x.cos(),
        "tan" => x.tan(),
        "floor" => x.floor(),
        "ceil" => x.ceil(),
        "round" => x.round(),
        _ => return Err(CalcError::UnknownName(name.to_string())),
    })
}

/// Evaluate an arithmetic expression
pub fn evaluate(src: &str) -> Result<f64, CalcError> {
    if src.chars().count() > MAX_EXPRESSION_CHARS {
        return Err(CalcError::TooLong(MAX_EXPRESSION_CHARS));
    }
    let mut parser = Parser {
        tokens: tokenize(src)?,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(extra) = parser.next() {
        return Err(CalcError::UnexpectedToken(format!("{extra:?}")));
    }
    if !value.is_finite() {
        return Err(CalcError::NotFinite);
    }
    Ok(value)
}

/// Integral values print like integers, everything else in shortest form
#[allow(clippy::cast_possible_truncation)]
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() <= MAX_EXACT_INTEGER {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Calculator tool for exact arithmetic
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &'static str {
        "calculator"
    }

    fn description(&self) -> String {
        "Evaluate a single-line arithmetic expression and return the numeric result. \
Supports + - * / % ** ^, parentheses, the constants pi and e, and the functions \
sqrt, abs, exp, ln, log, log10, sin, cos, tan, floor, ceil, round. \
Examples: \"37593 * 67\", \"37593**(1/5)\", \"sqrt(49) + 3*5\". No variables."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["expression"],
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "A single-line arithmetic expression"
                }
            }
        })
    }

    async fn run(&self, input: Value, _ctx: ToolContext) -> ToolOutput {
        let input: CalculatorInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return ToolOutput::error(format!("Invalid input: {e}")),
        };

        match evaluate(input.expression.trim()) {
            Ok(value) => ToolOutput::success(format_number(value)),
            Err(e) => ToolOutput::error(format!("Cannot evaluate {:?}: {e}", input.expression)),
        }
    }
}
