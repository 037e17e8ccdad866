//! Restricted breakpoint-condition grammar.
//!
//! Conditions are field-path comparisons joined by `and`/`or`:
//!
//! ```text
//! payload.size > 1024 and status == 'retrying'
//! attempt >= 3 or error.kind contains 'timeout'
//! ```
//!
//! Expressions compile to an AST at breakpoint creation, so invalid syntax is
//! rejected immediately. Evaluation walks the event data, is bounded and
//! side-effect-free, and treats missing paths or type mismatches as false.
//! `and` binds tighter than `or`.

use serde_json::Value;
use thiserror::Error;

/// Parse failure for a breakpoint condition.
#[derive(Debug, Error, PartialEq)]
pub enum ConditionError {
    #[error("condition is empty")]
    Empty,
    #[error("unexpected character `{0}` at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
    #[error("expected {expected}, found `{found}`")]
    Unexpected { expected: &'static str, found: String },
    #[error("unexpected trailing input after expression: `{0}`")]
    TrailingInput(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
}

/// Compiled condition expression.
#[derive(Debug, Clone)]
pub enum ConditionExpr {
    Clause {
        path: Vec<String>,
        op: CompareOp,
        literal: Literal,
    },
    And(Box<ConditionExpr>, Box<ConditionExpr>),
    Or(Box<ConditionExpr>, Box<ConditionExpr>),
}

impl ConditionExpr {
    /// Compile a condition source string, rejecting invalid syntax now
    /// rather than at evaluation time.
    pub fn parse(source: &str) -> Result<Self, ConditionError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(ConditionError::Empty);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(ConditionError::TrailingInput(token.describe()));
        }
        Ok(expr)
    }

    /// Evaluate against event data. Total: missing fields and type
    /// mismatches make the enclosing clause false.
    pub fn evaluate(&self, data: &Value) -> bool {
        match self {
            ConditionExpr::Clause { path, op, literal } => match resolve_path(data, path) {
                Some(value) => compare(value, *op, literal),
                None => false,
            },
            ConditionExpr::And(lhs, rhs) => lhs.evaluate(data) && rhs.evaluate(data),
            ConditionExpr::Or(lhs, rhs) => lhs.evaluate(data) || rhs.evaluate(data),
        }
    }
}

fn resolve_path<'a>(data: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = data;
    for segment in path {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn compare(value: &Value, op: CompareOp, literal: &Literal) -> bool {
    match op {
        CompareOp::Eq => literal_matches(value, literal),
        CompareOp::Ne => !literal_matches(value, literal),
        CompareOp::Gt | CompareOp::Ge | CompareOp::Lt | CompareOp::Le => {
            let (Some(lhs), Literal::Number(rhs)) = (value.as_f64(), literal) else {
                return false;
            };
            match op {
                CompareOp::Gt => lhs > *rhs,
                CompareOp::Ge => lhs >= *rhs,
                CompareOp::Lt => lhs < *rhs,
                CompareOp::Le => lhs <= *rhs,
                _ => unreachable!(),
            }
        }
        CompareOp::Contains => match (value, literal) {
            (Value::String(haystack), Literal::Str(needle)) => haystack.contains(needle),
            (Value::Array(items), literal) => {
                items.iter().any(|item| literal_matches(item, literal))
            }
            _ => false,
        },
    }
}

fn literal_matches(value: &Value, literal: &Literal) -> bool {
    match literal {
        Literal::Number(n) => value.as_f64().map(|v| v == *n).unwrap_or(false),
        Literal::Str(s) => value.as_str().map(|v| v == s).unwrap_or(false),
        Literal::Bool(b) => value.as_bool().map(|v| v == *b).unwrap_or(false),
        Literal::Null => value.is_null(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Path(String),
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Op(CompareOp),
    And,
    Or,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Path(p) => p.clone(),
            Token::Number(n) => n.to_string(),
            Token::Str(s) => format!("'{s}'"),
            Token::Bool(b) => b.to_string(),
            Token::Null => "null".to_string(),
            Token::Op(_) => "comparison operator".to_string(),
            Token::And => "and".to_string(),
            Token::Or => "or".to_string(),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CompareOp::Eq));
                    i += 2;
                } else {
                    return Err(ConditionError::UnexpectedChar('=', i));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CompareOp::Ne));
                    i += 2;
                } else {
                    return Err(ConditionError::UnexpectedChar('!', i));
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CompareOp::Ge));
                    i += 2;
                } else {
                    tokens.push(Token::Op(CompareOp::Gt));
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CompareOp::Le));
                    i += 2;
                } else {
                    tokens.push(Token::Op(CompareOp::Lt));
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let start = i;
                i += 1;
                let mut text = String::new();
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                        None => return Err(ConditionError::UnterminatedString(start)),
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| ConditionError::InvalidNumber(text.clone()))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "contains" => Token::Op(CompareOp::Contains),
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "null" => Token::Null,
                    _ => Token::Path(word),
                });
            }
            other => return Err(ConditionError::UnexpectedChar(other, i)),
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

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<ConditionExpr, ConditionError> {
        let mut expr = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            expr = ConditionExpr::Or(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<ConditionExpr, ConditionError> {
        let mut expr = self.parse_clause()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let rhs = self.parse_clause()?;
            expr = ConditionExpr::And(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_clause(&mut self) -> Result<ConditionExpr, ConditionError> {
        let path = match self.advance() {
            Some(Token::Path(path)) => path.split('.').map(str::to_string).collect(),
            Some(other) => {
                return Err(ConditionError::Unexpected {
                    expected: "field path",
                    found: other.describe(),
                })
            }
            None => {
                return Err(ConditionError::Unexpected {
                    expected: "field path",
                    found: "end of input".to_string(),
                })
            }
        };
        let op = match self.advance() {
            Some(Token::Op(op)) => op,
            Some(other) => {
                return Err(ConditionError::Unexpected {
                    expected: "comparison operator",
                    found: other.describe(),
                })
            }
            None => {
                return Err(ConditionError::Unexpected {
                    expected: "comparison operator",
                    found: "end of input".to_string(),
                })
            }
        };
        let literal = match self.advance() {
            Some(Token::Number(n)) => Literal::Number(n),
            Some(Token::Str(s)) => Literal::Str(s),
            Some(Token::Bool(b)) => Literal::Bool(b),
            Some(Token::Null) => Literal::Null,
            Some(other) => {
                return Err(ConditionError::Unexpected {
                    expected: "literal value",
                    found: other.describe(),
                })
            }
            None => {
                return Err(ConditionError::Unexpected {
                    expected: "literal value",
                    found: "end of input".to_string(),
                })
            }
        };
        Ok(ConditionExpr::Clause { path, op, literal })
    }
}
