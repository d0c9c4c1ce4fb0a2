//! Restricted boolean expressions over run state.
//!
//! Transition conditions are parsed once at compile time into a small AST
//! and evaluated as pure functions of [`State`]. The grammar is closed:
//! comparisons (`== != < <= > >= in not in contains`), boolean combinators
//! (`&& || !`, also spelled `and or not`), literals, state lookups (`KEY`
//! or `state.KEY`) and lookups with a default (`get(KEY, literal)`).
//! Nothing else parses, so a condition can never execute arbitrary code.
//!
//! Type-impossible comparisons evaluate to false rather than failing the
//! run, matching how conditional nodes behave elsewhere in the engine.

use serde_json::Value;

use crate::{Result, SpecflowError, runtime::State};

/// A compiled transition condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Lookup {
        key: String,
        default: Option<Value>,
    },
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Contains,
}

impl Condition {
    /// Parse a condition string, failing with a routing error on anything
    /// outside the restricted grammar.
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = lex(source).map_err(|detail| SpecflowError::Routing(format!("invalid condition '{}': {}", source, detail)))?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or().map_err(|detail| SpecflowError::Routing(format!("invalid condition '{}': {}", source, detail)))?;
        if parser.pos != parser.tokens.len() {
            return Err(SpecflowError::Routing(format!("invalid condition '{}': unexpected trailing input", source)));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// The original condition text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against the current state. A bare value at the top level is
    /// interpreted by truthiness (null/false/0/"" are false).
    pub fn evaluate(
        &self,
        state: &State,
    ) -> bool {
        truthy(&eval_expr(&self.expr, state))
    }

    /// Whether the condition looks up the given state key anywhere.
    pub fn references(
        &self,
        key: &str,
    ) -> bool {
        references_key(&self.expr, key)
    }
}

fn references_key(
    expr: &Expr,
    key: &str,
) -> bool {
    match expr {
        Expr::Literal(_) => false,
        Expr::Lookup { key: k, .. } => k == key,
        Expr::Compare { left, right, .. } => references_key(left, key) || references_key(right, key),
        Expr::Not(inner) => references_key(inner, key),
        Expr::And(a, b) | Expr::Or(a, b) => references_key(a, key) || references_key(b, key),
    }
}

fn eval_expr(
    expr: &Expr,
    state: &State,
) -> Value {
    match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Lookup { key, default } => match state.get(key) {
            Some(v) => v.clone(),
            None => default.clone().unwrap_or(Value::Null),
        },
        Expr::Compare { op, left, right } => {
            let l = eval_expr(left, state);
            let r = eval_expr(right, state);
            Value::Bool(compare(*op, &l, &r))
        }
        Expr::Not(inner) => Value::Bool(!truthy(&eval_expr(inner, state))),
        Expr::And(a, b) => Value::Bool(truthy(&eval_expr(a, state)) && truthy(&eval_expr(b, state))),
        Expr::Or(a, b) => Value::Bool(truthy(&eval_expr(a, state)) || truthy(&eval_expr(b, state))),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn compare(
    op: CompareOp,
    left: &Value,
    right: &Value,
) -> bool {
    match op {
        CompareOp::Eq => loose_eq(left, right),
        CompareOp::Ne => !loose_eq(left, right),
        CompareOp::Lt => numeric_cmp(left, right, |a, b| a < b),
        CompareOp::Le => numeric_cmp(left, right, |a, b| a <= b),
        CompareOp::Gt => numeric_cmp(left, right, |a, b| a > b),
        CompareOp::Ge => numeric_cmp(left, right, |a, b| a >= b),
        CompareOp::In => contains_value(right, left),
        CompareOp::NotIn => !contains_value(right, left),
        CompareOp::Contains => contains_value(left, right),
    }
}

/// Equality with numeric coercion: numbers compare as f64, and a numeric
/// string compares equal to the number it parses to.
fn loose_eq(
    left: &Value,
    right: &Value,
) -> bool {
    if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
        return a == b;
    }
    left == right
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn numeric_cmp<F>(
    left: &Value,
    right: &Value,
    cmp: F,
) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

/// Membership: item in an array (loose equality) or a substring of a string.
fn contains_value(
    container: &Value,
    item: &Value,
) -> bool {
    match container {
        Value::Array(items) => items.iter().any(|v| loose_eq(v, item)),
        Value::String(s) => match item {
            Value::String(sub) => s.contains(sub.as_str()),
            _ => false,
        },
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    In,
    Contains,
    Get,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    Comma,
    Dot,
}

fn lex(source: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
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
                    tokens.push(Token::Eq);
                    i += 2;
                } else {
                    return Err("single '=' is not an operator, use '=='".to_string());
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    tokens.push(Token::Not);
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
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::And);
                    i += 2;
                } else {
                    return Err("single '&' is not an operator, use '&&'".to_string());
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::Or);
                    i += 2;
                } else {
                    return Err("single '|' is not an operator, use '||'".to_string());
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                        None => return Err("unterminated string literal".to_string()),
                    }
                }
                tokens.push(Token::Str(s));
            }
            '-' | '0'..='9' => {
                let start = i;
                if c == '-' {
                    i += 1;
                    if !matches!(chars.get(i), Some('0'..='9')) {
                        return Err("'-' must be followed by a number".to_string());
                    }
                }
                while matches!(chars.get(i), Some('0'..='9') | Some('.')) {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text.parse::<f64>().map_err(|_| format!("invalid number '{}'", text))?;
                tokens.push(Token::Number(n));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while matches!(chars.get(i), Some('a'..='z') | Some('A'..='Z') | Some('0'..='9') | Some('_')) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "contains" => Token::Contains,
                    "get" => Token::Get,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(
        &mut self,
        expected: Token,
    ) -> std::result::Result<(), String> {
        match self.next() {
            Some(t) if t == expected => Ok(()),
            Some(t) => Err(format!("expected {:?}, found {:?}", expected, t)),
            None => Err(format!("expected {:?}, found end of input", expected)),
        }
    }

    fn parse_or(&mut self) -> std::result::Result<Expr, String> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> std::result::Result<Expr, String> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> std::result::Result<Expr, String> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> std::result::Result<Expr, String> {
        let left = self.parse_primary()?;

        let op = match self.peek() {
            Some(Token::Eq) => Some(CompareOp::Eq),
            Some(Token::Ne) => Some(CompareOp::Ne),
            Some(Token::Lt) => Some(CompareOp::Lt),
            Some(Token::Le) => Some(CompareOp::Le),
            Some(Token::Gt) => Some(CompareOp::Gt),
            Some(Token::Ge) => Some(CompareOp::Ge),
            Some(Token::In) => Some(CompareOp::In),
            Some(Token::Contains) => Some(CompareOp::Contains),
            // `not in` in operator position
            Some(Token::Not) if self.tokens.get(self.pos + 1) == Some(&Token::In) => {
                self.pos += 1;
                Some(CompareOp::NotIn)
            }
            _ => None,
        };

        match op {
            None => Ok(left),
            Some(op) => {
                self.pos += 1;
                let right = self.parse_primary()?;
                Ok(Expr::Compare {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
        }
    }

    fn parse_primary(&mut self) -> std::result::Result<Expr, String> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Number(n)) => Ok(Expr::Literal(serde_json::json!(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::Get) => {
                self.expect(Token::LParen)?;
                let key = match self.next() {
                    Some(Token::Ident(name)) => name,
                    Some(Token::Str(s)) => s,
                    other => return Err(format!("get() expects a key name, found {:?}", other)),
                };
                self.expect(Token::Comma)?;
                let default = match self.next() {
                    Some(Token::Number(n)) => serde_json::json!(n),
                    Some(Token::Str(s)) => Value::String(s),
                    Some(Token::True) => Value::Bool(true),
                    Some(Token::False) => Value::Bool(false),
                    Some(Token::Null) => Value::Null,
                    other => return Err(format!("get() expects a literal default, found {:?}", other)),
                };
                self.expect(Token::RParen)?;
                Ok(Expr::Lookup {
                    key,
                    default: Some(default),
                })
            }
            Some(Token::Ident(name)) => {
                // `state.KEY` is an explicit spelling of a bare lookup.
                if name == "state" && self.peek() == Some(&Token::Dot) {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Ident(key)) => Ok(Expr::Lookup {
                            key,
                            default: None,
                        }),
                        other => return Err(format!("expected key after 'state.', found {:?}", other)),
                    }
                } else {
                    Ok(Expr::Lookup {
                        key: name,
                        default: None,
                    })
                }
            }
            other => Err(format!("unexpected token {:?}", other)),
        }
    }
}
