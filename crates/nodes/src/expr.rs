//! Scoped expression evaluator used by the transform node.
//!
//! Supports literals (numbers, quoted strings, `true`, `false`, `null`),
//! dotted path lookups into the data bag, parentheses, unary minus and the
//! binary operators `* / %` and `+ -`. `+` concatenates when either operand
//! is a string. Nothing else is reachable: no calls, no assignment.

use serde_json::{Number, Value};
use thiserror::Error;

use crate::path::get_value_from_path;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    #[error("unexpected character '{0}' at offset {1}")]
    UnexpectedChar(char, usize),

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unexpected token {0}")]
    UnexpectedToken(String),

    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: char,
        left: &'static str,
        right: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NotFinite,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64, bool),
    Str(String),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '+' | '-' | '*' | '/' | '%' => {
                tokens.push(Token::Op(c));
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
            '\'' | '"' => {
                let quote = c;
                let mut out = String::new();
                i += 1;
                loop {
                    let Some(&ch) = chars.get(i) else {
                        return Err(ExprError::UnterminatedString);
                    };
                    i += 1;
                    match ch {
                        '\\' => {
                            let escaped = chars.get(i).copied().ok_or(ExprError::UnterminatedString)?;
                            i += 1;
                            out.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => other,
                            });
                        }
                        ch if ch == quote => break,
                        ch => out.push(ch),
                    }
                }
                tokens.push(Token::Str(out));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: f64 = text.parse().map_err(|_| ExprError::UnexpectedToken(text.clone()))?;
                tokens.push(Token::Number(n, !text.contains('.')));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '$' | '.'))
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(ExprError::UnexpectedChar(other, i)),
        }
    }

    Ok(tokens)
}

/// Recursive-descent evaluator over a token stream.
struct Evaluator<'a> {
    tokens: Vec<Token>,
    pos: usize,
    data: &'a Value,
}

/// Intermediate value that remembers whether a number is integral, so
/// `2 + 3` yields `5` rather than `5.0`.
#[derive(Debug, Clone)]
enum Operand {
    Num(f64, bool),
    Json(Value),
}

impl Operand {
    fn from_json(value: Value) -> Self {
        if let Value::Number(n) = &value {
            return Operand::Num(n.as_f64().unwrap_or(0.0), n.is_i64() || n.is_u64());
        }
        Operand::Json(value)
    }

    fn kind(&self) -> &'static str {
        match self {
            Operand::Num(..) => "number",
            Operand::Json(Value::String(_)) => "string",
            Operand::Json(Value::Null) => "null",
            Operand::Json(Value::Bool(_)) => "boolean",
            Operand::Json(Value::Array(_)) => "array",
            Operand::Json(Value::Object(_)) => "object",
            Operand::Json(Value::Number(_)) => "number",
        }
    }

    fn display(&self) -> String {
        match self {
            Operand::Num(n, true) => format!("{}", *n as i64),
            Operand::Num(n, false) => n.to_string(),
            Operand::Json(Value::String(s)) => s.clone(),
            Operand::Json(other) => other.to_string(),
        }
    }

    fn into_json(self) -> Result<Value, ExprError> {
        match self {
            Operand::Num(n, true) if n.abs() < i64::MAX as f64 => Ok(Value::from(n as i64)),
            Operand::Num(n, _) => Number::from_f64(n).map(Value::Number).ok_or(ExprError::NotFinite),
            Operand::Json(v) => Ok(v),
        }
    }
}

impl<'a> Evaluator<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expression(&mut self) -> Result<Operand, ExprError> {
        let mut left = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let right = self.term()?;
            left = binary(op, left, right)?;
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Operand, ExprError> {
        let mut left = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek().cloned() {
            self.pos += 1;
            let right = self.unary()?;
            left = binary(op, left, right)?;
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Operand, ExprError> {
        if matches!(self.peek(), Some(Token::Op('-'))) {
            self.pos += 1;
            return match self.unary()? {
                Operand::Num(n, int) => Ok(Operand::Num(-n, int)),
                other => Err(ExprError::TypeMismatch {
                    op: '-',
                    left: "nothing",
                    right: other.kind(),
                }),
            };
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Operand, ExprError> {
        match self.advance().ok_or(ExprError::UnexpectedEnd)? {
            Token::Number(n, int) => Ok(Operand::Num(n, int)),
            Token::Str(s) => Ok(Operand::Json(Value::String(s))),
            Token::Ident(name) => Ok(match name.as_str() {
                "true" => Operand::Json(Value::Bool(true)),
                "false" => Operand::Json(Value::Bool(false)),
                "null" | "undefined" => Operand::Json(Value::Null),
                path => Operand::from_json(self.lookup(path)),
            }),
            Token::LParen => {
                let inner = self.expression()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    Some(other) => Err(ExprError::UnexpectedToken(format!("{other:?}"))),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            other => Err(ExprError::UnexpectedToken(format!("{other:?}"))),
        }
    }

    /// Resolve a path against the bag. A leading `data.` is accepted as an
    /// alias for the bag root unless the bag has its own `data` key.
    fn lookup(&self, path: &str) -> Value {
        if let Some(v) = get_value_from_path(self.data, path) {
            return v.clone();
        }
        path.strip_prefix("data.")
            .and_then(|rest| get_value_from_path(self.data, rest))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

fn binary(op: char, left: Operand, right: Operand) -> Result<Operand, ExprError> {
    let is_str = |o: &Operand| matches!(o, Operand::Json(Value::String(_)));
    if op == '+' && (is_str(&left) || is_str(&right)) {
        return Ok(Operand::Json(Value::String(left.display() + &right.display())));
    }

    let (Operand::Num(a, a_int), Operand::Num(b, b_int)) = (&left, &right) else {
        return Err(ExprError::TypeMismatch {
            op,
            left: left.kind(),
            right: right.kind(),
        });
    };
    let (a, b, both_int) = (*a, *b, *a_int && *b_int);

    let result = match op {
        '+' => Operand::Num(a + b, both_int),
        '-' => Operand::Num(a - b, both_int),
        '*' => Operand::Num(a * b, both_int),
        '/' => {
            if b == 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            let q = a / b;
            Operand::Num(q, both_int && q.fract() == 0.0)
        }
        '%' => {
            if b == 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            Operand::Num(a % b, both_int)
        }
        other => return Err(ExprError::UnexpectedToken(other.to_string())),
    };
    Ok(result)
}

/// Evaluate `expression` against `data`.
pub fn evaluate(expression: &str, data: &Value) -> Result<Value, ExprError> {
    let tokens = tokenize(expression)?;
    let mut evaluator = Evaluator { tokens, pos: 0, data };
    let result = evaluator.expression()?;
    if let Some(extra) = evaluator.peek() {
        return Err(ExprError::UnexpectedToken(format!("{extra:?}")));
    }
    result.into_json()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(expr: &str) -> Result<Value, ExprError> {
        let data = json!({
            "price": 20,
            "qty": 3,
            "rate": 0.5,
            "user": { "first": "Ana", "last": "Lima" },
            "items": [{ "sku": "A1" }]
        });
        evaluate(expr, &data)
    }

    #[test]
    fn arithmetic_respects_precedence() {
        assert_eq!(eval("price * qty + 1").unwrap(), json!(61));
        assert_eq!(eval("(price + 10) / qty").unwrap(), json!(10));
        assert_eq!(eval("price * rate").unwrap(), json!(10.0));
        assert_eq!(eval("-qty + 1").unwrap(), json!(-2));
        assert_eq!(eval("7 % 4").unwrap(), json!(3));
    }

    #[test]
    fn plus_concatenates_strings() {
        assert_eq!(eval("user.first + ' ' + user.last").unwrap(), json!("Ana Lima"));
        assert_eq!(eval("'#' + qty").unwrap(), json!("#3"));
        assert_eq!(eval("items.0.sku + \"-x\"").unwrap(), json!("A1-x"));
    }

    #[test]
    fn data_prefix_and_missing_paths() {
        assert_eq!(eval("data.price").unwrap(), json!(20));
        assert_eq!(eval("nope").unwrap(), Value::Null);
        assert_eq!(eval("true").unwrap(), json!(true));
    }

    #[test]
    fn rejects_anything_outside_the_grammar() {
        assert_eq!(eval("price / 0"), Err(ExprError::DivisionByZero));
        assert!(matches!(eval("process.exit(1)"), Err(ExprError::UnexpectedToken(_))));
        assert!(matches!(eval("price = 3"), Err(ExprError::UnexpectedChar('=', _))));
        assert!(matches!(eval("'open"), Err(ExprError::UnterminatedString)));
        assert!(matches!(eval("user * 2"), Err(ExprError::TypeMismatch { .. })));
        assert_eq!(eval("1 +"), Err(ExprError::UnexpectedEnd));
    }
}
