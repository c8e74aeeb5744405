// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)
//! Assertion expression evaluation over extracted captures.
//!
//! Assertions are pure functions of the extracted map. The grammar, in
//! ascending precedence: `||`, `&&`, `!`, comparisons
//! (`==` `!=` `<=` `>=` `<` `>`), `+`/`-`, `*`/`/`, unary `-`, atoms
//! (numbers, quoted strings, booleans, capture names, parenthesized
//! expressions).
//!
//! Capture names resolve against the extracted map with numeric inference:
//! values that parse as integers or floats are Numbers, everything else is a
//! String. Arithmetic and ordering require Numbers; equality across types is
//! simply unequal rather than an error; `&&`/`||` require booleans and
//! short-circuit; division by zero is an evaluation error.

use thiserror::Error;

use crate::grok::ExtractedMap;

/// Why an assertion could not produce a boolean.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum EvalError {
    /// The expression text does not parse.
    #[error("syntax error in assertion: {0}")]
    Syntax(String),

    /// An identifier is not present in the extracted map.
    #[error("assertion references undefined capture {0}")]
    UndefinedCapture(String),

    /// An operator was applied to operands of the wrong type.
    #[error("type error in assertion: {0}")]
    Type(String),

    /// The right-hand side of a division evaluated to zero.
    #[error("division by zero in assertion")]
    DivisionByZero,
}

/// Evaluate `expression` against `extracted`, requiring a boolean result.
pub fn evaluate(expression: &str, extracted: &ExtractedMap) -> Result<bool, EvalError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(EvalError::Syntax(format!(
            "unexpected trailing token {token}"
        )));
    }
    match eval(&expr, extracted)? {
        Value::Bool(result) => Ok(result),
        other => Err(EvalError::Type(format!(
            "assertion must evaluate to a boolean, got {}",
            other.type_name()
        ))),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Text(_) => "string",
            Value::Bool(_) => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Bool(bool),
    Ident(String),
    OrOr,
    AndAnd,
    Bang,
    EqEq,
    NotEq,
    LessEq,
    GreaterEq,
    Less,
    Greater,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "`{n}`"),
            Token::Text(s) => write!(f, "`\"{s}\"`"),
            Token::Bool(b) => write!(f, "`{b}`"),
            Token::Ident(i) => write!(f, "`{i}`"),
            Token::OrOr => write!(f, "`||`"),
            Token::AndAnd => write!(f, "`&&`"),
            Token::Bang => write!(f, "`!`"),
            Token::EqEq => write!(f, "`==`"),
            Token::NotEq => write!(f, "`!=`"),
            Token::LessEq => write!(f, "`<=`"),
            Token::GreaterEq => write!(f, "`>=`"),
            Token::Less => write!(f, "`<`"),
            Token::Greater => write!(f, "`>`"),
            Token::Plus => write!(f, "`+`"),
            Token::Minus => write!(f, "`-`"),
            Token::Star => write!(f, "`*`"),
            Token::Slash => write!(f, "`/`"),
            Token::LParen => write!(f, "`(`"),
            Token::RParen => write!(f, "`)`"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let bytes: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '|' => {
                if bytes.get(i + 1) == Some(&'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    return Err(EvalError::Syntax("single `|` is not an operator".into()));
                }
            }
            '&' => {
                if bytes.get(i + 1) == Some(&'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    return Err(EvalError::Syntax("single `&` is not an operator".into()));
                }
            }
            '=' => {
                if bytes.get(i + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(EvalError::Syntax(
                        "single `=` is not an operator (use `==`)".into(),
                    ));
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    tokens.push(Token::Bang);
                    i += 1;
                }
            }
            '<' => {
                if bytes.get(i + 1) == Some(&'=') {
                    tokens.push(Token::LessEq);
                    i += 2;
                } else {
                    tokens.push(Token::Less);
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&'=') {
                    tokens.push(Token::GreaterEq);
                    i += 2;
                } else {
                    tokens.push(Token::Greater);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match bytes.get(i) {
                        None => {
                            return Err(EvalError::Syntax("unterminated string literal".into()))
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Text(text));
            }
            '0'..='9' => {
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if bytes.get(i) == Some(&'.') && bytes.get(i + 1).is_some_and(char::is_ascii_digit)
                {
                    i += 1;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = bytes[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| EvalError::Syntax(format!("invalid number `{text}`")))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == '_')
                {
                    i += 1;
                }
                let word: String = bytes[start..i].iter().collect();
                match word.as_str() {
                    "true" => tokens.push(Token::Bool(true)),
                    "false" => tokens.push(Token::Bool(false)),
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            other => {
                return Err(EvalError::Syntax(format!(
                    "unexpected character `{other}`"
                )))
            }
        }
    }

    if tokens.is_empty() {
        return Err(EvalError::Syntax("empty assertion".into()));
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Or => "||",
            BinOp::And => "&&",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        }
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Number(f64),
    Text(String),
    Bool(bool),
    Ident(String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let right = self.parse_and()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::AndAnd) {
            let right = self.parse_not()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, EvalError> {
        if self.eat(&Token::Bang) {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr, EvalError> {
        let left = self.parse_add()?;
        let op = match self.peek() {
            Some(Token::EqEq) => BinOp::Eq,
            Some(Token::NotEq) => BinOp::Ne,
            Some(Token::LessEq) => BinOp::Le,
            Some(Token::GreaterEq) => BinOp::Ge,
            Some(Token::Less) => BinOp::Lt,
            Some(Token::Greater) => BinOp::Gt,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.parse_add()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn parse_add(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_mul()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_mul(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr, EvalError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Text(s)) => Ok(Expr::Text(s)),
            Some(Token::Bool(b)) => Ok(Expr::Bool(b)),
            Some(Token::Ident(name)) => Ok(Expr::Ident(name)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                if !self.eat(&Token::RParen) {
                    return Err(EvalError::Syntax("missing closing parenthesis".into()));
                }
                Ok(inner)
            }
            Some(token) => Err(EvalError::Syntax(format!("unexpected token {token}"))),
            None => Err(EvalError::Syntax("unexpected end of expression".into())),
        }
    }
}

fn eval(expr: &Expr, extracted: &ExtractedMap) -> Result<Value, EvalError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Text(s) => Ok(Value::Text(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Ident(name) => {
            let raw = extracted
                .get(name)
                .ok_or_else(|| EvalError::UndefinedCapture(name.clone()))?;
            Ok(infer(raw))
        }
        Expr::Not(inner) => match eval(inner, extracted)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(EvalError::Type(format!(
                "`!` requires a boolean operand, got {}",
                other.type_name()
            ))),
        },
        Expr::Neg(inner) => match eval(inner, extracted)? {
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(EvalError::Type(format!(
                "unary `-` requires a numeric operand, got {}",
                other.type_name()
            ))),
        },
        Expr::Binary(BinOp::Or, left, right) => match eval(left, extracted)? {
            Value::Bool(true) => Ok(Value::Bool(true)),
            Value::Bool(false) => expect_bool(eval(right, extracted)?, "||"),
            other => Err(logic_type_error("||", &other)),
        },
        Expr::Binary(BinOp::And, left, right) => match eval(left, extracted)? {
            Value::Bool(false) => Ok(Value::Bool(false)),
            Value::Bool(true) => expect_bool(eval(right, extracted)?, "&&"),
            other => Err(logic_type_error("&&", &other)),
        },
        Expr::Binary(op, left, right) => {
            let lhs = eval(left, extracted)?;
            let rhs = eval(right, extracted)?;
            apply(*op, lhs, rhs)
        }
    }
}

/// Numeric parse first (integer, then floating); otherwise the capture is a
/// string.
fn infer(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::Number(int as f64);
    }
    if let Ok(float) = raw.parse::<f64>() {
        return Value::Number(float);
    }
    Value::Text(raw.to_string())
}

fn expect_bool(value: Value, op: &str) -> Result<Value, EvalError> {
    match value {
        Value::Bool(_) => Ok(value),
        other => Err(logic_type_error(op, &other)),
    }
}

fn logic_type_error(op: &str, value: &Value) -> EvalError {
    EvalError::Type(format!(
        "`{op}` requires boolean operands, got {}",
        value.type_name()
    ))
}

fn apply(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    match op {
        BinOp::Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
        BinOp::Ne => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let (a, b) = numeric_operands(op, lhs, rhs)?;
            let result = match op {
                BinOp::Lt => a < b,
                BinOp::Le => a <= b,
                BinOp::Gt => a > b,
                _ => a >= b,
            };
            Ok(Value::Bool(result))
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul => {
            let (a, b) = numeric_operands(op, lhs, rhs)?;
            let result = match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                _ => a * b,
            };
            Ok(Value::Number(result))
        }
        BinOp::Div => {
            let (a, b) = numeric_operands(op, lhs, rhs)?;
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(Value::Number(a / b))
        }
        // Short-circuit operators are handled before apply().
        BinOp::Or | BinOp::And => Err(EvalError::Syntax("internal operator dispatch".into())),
    }
}

/// Same-type comparison; mixed types are unequal rather than an error.
fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => {
            matches!(a.partial_cmp(b), Some(std::cmp::Ordering::Equal))
        }
        (Value::Text(a), Value::Text(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ => false,
    }
}

fn numeric_operands(op: BinOp, lhs: Value, rhs: Value) -> Result<(f64, f64), EvalError> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Ok((a, b)),
        (lhs, rhs) => Err(EvalError::Type(format!(
            "`{}` requires numeric operands, got {} and {}",
            op.symbol(),
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> ExtractedMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // ==================== COMPARISONS ====================

    #[test]
    fn numeric_comparison_over_captures() {
        let captures = map(&[("cov", "83.0")]);
        assert!(evaluate("cov >= 80", &captures).unwrap());
        assert!(!evaluate("cov >= 90", &captures).unwrap());
        assert!(evaluate("cov > 82.9", &captures).unwrap());
        assert!(evaluate("cov <= 83", &captures).unwrap());
    }

    #[test]
    fn integer_captures_are_numbers() {
        let captures = map(&[("failures", "0")]);
        assert!(evaluate("failures == 0", &captures).unwrap());
        assert!(evaluate("failures < 1", &captures).unwrap());
    }

    #[test]
    fn string_equality() {
        let captures = map(&[("status", "ok")]);
        assert!(evaluate("status == 'ok'", &captures).unwrap());
        assert!(evaluate("status == \"ok\"", &captures).unwrap());
        assert!(evaluate("status != 'error'", &captures).unwrap());
    }

    #[test]
    fn cross_type_equality_is_unequal_not_an_error() {
        let captures = map(&[("status", "ok"), ("count", "3")]);
        assert!(!evaluate("status == 3", &captures).unwrap());
        assert!(evaluate("status != 3", &captures).unwrap());
        assert!(!evaluate("count == 'ok'", &captures).unwrap());
    }

    #[test]
    fn ordering_requires_numbers() {
        let captures = map(&[("status", "ok")]);
        let err = evaluate("status < 3", &captures).unwrap_err();
        assert!(matches!(err, EvalError::Type(_)));
    }

    // ==================== ARITHMETIC ====================

    #[test]
    fn arithmetic_precedence() {
        let captures = map(&[("a", "2"), ("b", "3"), ("c", "4")]);
        assert!(evaluate("a + b * c == 14", &captures).unwrap());
        assert!(evaluate("(a + b) * c == 20", &captures).unwrap());
        assert!(evaluate("c / a - b == -1", &captures).unwrap());
    }

    #[test]
    fn unary_minus() {
        let captures = map(&[("delta", "5")]);
        assert!(evaluate("-delta == -5", &captures).unwrap());
        assert!(evaluate("-(delta - 10) == 5", &captures).unwrap());
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let captures = map(&[("n", "1"), ("zero", "0")]);
        assert_eq!(
            evaluate("n / zero > 0", &captures).unwrap_err(),
            EvalError::DivisionByZero
        );
    }

    #[test]
    fn arithmetic_requires_numbers() {
        let captures = map(&[("status", "ok")]);
        let err = evaluate("status + 1 == 2", &captures).unwrap_err();
        assert!(matches!(err, EvalError::Type(_)));
    }

    // ==================== LOGIC ====================

    #[test]
    fn logical_operators() {
        let captures = map(&[("cov", "83"), ("failures", "0")]);
        assert!(evaluate("cov >= 80 && failures == 0", &captures).unwrap());
        assert!(evaluate("cov >= 90 || failures == 0", &captures).unwrap());
        assert!(!evaluate("cov >= 90 && failures == 0", &captures).unwrap());
        assert!(evaluate("!(cov < 80)", &captures).unwrap());
    }

    #[test]
    fn and_short_circuits() {
        let captures = map(&[("cov", "50")]);
        // The right-hand side references an undefined capture but is never
        // evaluated.
        assert!(!evaluate("cov > 80 && missing == 1", &captures).unwrap());
    }

    #[test]
    fn or_short_circuits() {
        let captures = map(&[("cov", "90")]);
        assert!(evaluate("cov > 80 || missing == 1", &captures).unwrap());
    }

    #[test]
    fn logic_requires_booleans() {
        let captures = map(&[("cov", "90")]);
        let err = evaluate("cov && true", &captures).unwrap_err();
        assert!(matches!(err, EvalError::Type(_)));
    }

    #[test]
    fn not_requires_boolean() {
        let captures = map(&[("cov", "90")]);
        let err = evaluate("!cov", &captures).unwrap_err();
        assert!(matches!(err, EvalError::Type(_)));
    }

    // ==================== IDENTIFIERS ====================

    #[test]
    fn missing_identifier_is_a_runtime_error() {
        let err = evaluate("ghost == 1", &ExtractedMap::new()).unwrap_err();
        assert_eq!(err, EvalError::UndefinedCapture("ghost".to_string()));
        assert_eq!(
            err.to_string(),
            "assertion references undefined capture ghost"
        );
    }

    #[test]
    fn non_numeric_capture_is_a_string() {
        let captures = map(&[("version", "1.2.3")]);
        assert!(evaluate("version == '1.2.3'", &captures).unwrap());
    }

    #[test]
    fn boolean_literals() {
        let captures = ExtractedMap::new();
        assert!(evaluate("true", &captures).unwrap());
        assert!(!evaluate("false", &captures).unwrap());
        assert!(evaluate("true == true", &captures).unwrap());
    }

    // ==================== SYNTAX ====================

    #[test]
    fn syntax_errors() {
        let captures = ExtractedMap::new();
        for bad in ["", "1 +", "&& true", "(1 == 1", "1 = 1", "a | b", "2 @ 3"] {
            let err = evaluate(bad, &captures).unwrap_err();
            assert!(matches!(err, EvalError::Syntax(_)), "expected syntax error for {bad:?}");
        }
    }

    #[test]
    fn unterminated_string_is_a_syntax_error() {
        let err = evaluate("status == 'ok", &ExtractedMap::new()).unwrap_err();
        assert!(matches!(err, EvalError::Syntax(_)));
    }

    #[test]
    fn non_boolean_result_is_a_type_error() {
        let captures = map(&[("n", "3")]);
        let err = evaluate("n + 1", &captures).unwrap_err();
        assert!(matches!(err, EvalError::Type(_)));
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        let err = evaluate("true false", &ExtractedMap::new()).unwrap_err();
        assert!(matches!(err, EvalError::Syntax(_)));
    }
}
