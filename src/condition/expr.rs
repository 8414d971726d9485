// src/condition/expr.rs

//! Skip-condition expressions.
//!
//! Expressions look like `build.status == failed OR test.exit_code != 0`.
//! They are parsed once, when the task graph is built, into an [`Expr`]
//! tree that the evaluator walks for every check.
//!
//! Grammar (keywords are case-insensitive):
//!
//! ```text
//! expr    := and ( OR and )*
//! and     := unary ( AND unary )*
//! unary   := NOT unary | '(' expr ')' | atom
//! atom    := always | never | true | false | path op value
//! path    := <task-id> '.' <field>
//! op      := == | != | > | < | >= | <=
//! value   := number | word | 'quoted' | "quoted"
//! ```
//!
//! Task ids may contain matrix suffixes such as `test[mode=a,size=1]`;
//! anything inside square brackets is taken verbatim.

use std::fmt;

use serde::Serialize;

use crate::errors::{DagvisorError, Result};

/// Per-task value an expression can look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Scheduler state: `pending`, `running`, `succeeded`, `failed`, `skipped`.
    Status,
    /// Execution status: `success`, `failed`, `timed_out`, `launch_error`,
    /// or `none` if the task never ran.
    Outcome,
    ExitCode,
    Attempts,
    DurationMs,
    PeakMemoryBytes,
    MaxCpu,
    AvgCpu,
}

impl Field {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "status" | "state" => Some(Field::Status),
            "outcome" => Some(Field::Outcome),
            "exit_code" | "exitcode" => Some(Field::ExitCode),
            "attempts" => Some(Field::Attempts),
            "duration_ms" => Some(Field::DurationMs),
            "peak_memory_bytes" | "memory" => Some(Field::PeakMemoryBytes),
            "max_cpu" => Some(Field::MaxCpu),
            "avg_cpu" | "cpu" => Some(Field::AvgCpu),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Status => "status",
            Field::Outcome => "outcome",
            Field::ExitCode => "exit_code",
            Field::Attempts => "attempts",
            Field::DurationMs => "duration_ms",
            Field::PeakMemoryBytes => "peak_memory_bytes",
            Field::MaxCpu => "max_cpu",
            Field::AvgCpu => "avg_cpu",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
}

impl CompareOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::GtEq => ">=",
            CompareOp::LtEq => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "'{s}'"),
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Literal(bool),
    Compare {
        task: String,
        field: Field,
        op: CompareOp,
        value: Value,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn parse(input: &str) -> std::result::Result<Self, String> {
        let tokens = lex(input)?;
        if tokens.is_empty() {
            return Err("empty expression".into());
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if let Some(tok) = parser.peek() {
            return Err(format!("unexpected {tok} after expression"));
        }
        Ok(expr)
    }

    /// Every task id the expression reads, deduplicated.
    pub fn referenced_tasks(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_tasks(&mut out);
        out.sort_unstable();
        out.dedup();
        out
    }

    fn collect_tasks<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Compare { task, .. } => out.push(task.as_str()),
            Expr::And(exprs) | Expr::Or(exprs) => {
                for e in exprs {
                    e.collect_tasks(out);
                }
            }
            Expr::Not(inner) => inner.collect_tasks(out),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(true) => f.write_str("always"),
            Expr::Literal(false) => f.write_str("never"),
            Expr::Compare {
                task,
                field,
                op,
                value,
            } => write!(f, "{task}.{} {} {value}", field.as_str(), op.as_str()),
            Expr::And(exprs) => write_joined(f, exprs, " AND "),
            Expr::Or(exprs) => write_joined(f, exprs, " OR "),
            Expr::Not(inner) => write!(f, "NOT {inner}"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, exprs: &[Expr], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, e) in exprs.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{e}")?;
    }
    f.write_str(")")
}

/// A task's `skip_if`: the original text plus its parsed tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkipCondition {
    pub source: String,
    pub expr: Expr,
}

impl SkipCondition {
    pub fn parse(source: &str) -> Result<Self> {
        let expr = Expr::parse(source).map_err(|reason| DagvisorError::InvalidCondition {
            expression: source.to_string(),
            reason,
        })?;
        Ok(Self {
            source: source.trim().to_string(),
            expr,
        })
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Op(CompareOp),
    Word(String),
    Quoted(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::And => f.write_str("AND"),
            Token::Or => f.write_str("OR"),
            Token::Not => f.write_str("NOT"),
            Token::Op(op) => write!(f, "'{}'", op.as_str()),
            Token::Word(w) => write!(f, "'{w}'"),
            Token::Quoted(q) => write!(f, "\"{q}\""),
        }
    }
}

fn lex(input: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
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
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (op, len) = match (c, next) {
                    ('=', Some('=')) => (CompareOp::Eq, 2),
                    ('!', Some('=')) => (CompareOp::NotEq, 2),
                    ('>', Some('=')) => (CompareOp::GtEq, 2),
                    ('<', Some('=')) => (CompareOp::LtEq, 2),
                    ('>', _) => (CompareOp::Gt, 1),
                    ('<', _) => (CompareOp::Lt, 1),
                    _ => return Err(format!("unexpected '{c}' at offset {i}")),
                };
                tokens.push(Token::Op(op));
                i += len;
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == quote)
                    .map(|p| start + p)
                    .ok_or_else(|| format!("unterminated string starting at offset {i}"))?;
                tokens.push(Token::Quoted(chars[start..end].iter().collect()));
                i = end + 1;
            }
            _ => {
                let mut word = String::new();
                while i < chars.len() {
                    let ch = chars[i];
                    if ch == '[' {
                        let close = chars[i..]
                            .iter()
                            .position(|&x| x == ']')
                            .map(|p| i + p)
                            .ok_or_else(|| format!("unclosed '[' at offset {i}"))?;
                        word.extend(&chars[i..=close]);
                        i = close + 1;
                        continue;
                    }
                    if ch.is_whitespace() || "()=!<>'\"".contains(ch) {
                        break;
                    }
                    word.push(ch);
                    i += 1;
                }
                let token = match word.to_ascii_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    _ => Token::Word(word),
                };
                tokens.push(token);
            }
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn parse_or(&mut self) -> std::result::Result<Expr, String> {
        let mut parts = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            parts.push(self.parse_and()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Expr::Or(parts)
        })
    }

    fn parse_and(&mut self) -> std::result::Result<Expr, String> {
        let mut parts = vec![self.parse_unary()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            parts.push(self.parse_unary()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Expr::And(parts)
        })
    }

    fn parse_unary(&mut self) -> std::result::Result<Expr, String> {
        match self.next() {
            Some(Token::Not) => Ok(Expr::Not(Box::new(self.parse_unary()?))),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(tok) => Err(format!("expected ')' but found {tok}")),
                    None => Err("missing ')'".into()),
                }
            }
            Some(Token::Word(word)) => self.parse_atom(word),
            Some(tok) => Err(format!("unexpected {tok}")),
            None => Err("unexpected end of expression".into()),
        }
    }

    fn parse_atom(&mut self, word: String) -> std::result::Result<Expr, String> {
        match word.to_ascii_lowercase().as_str() {
            "always" | "true" => return Ok(Expr::Literal(true)),
            "never" | "false" => return Ok(Expr::Literal(false)),
            _ => {}
        }

        let (task, field) = split_path(&word)?;

        let op = match self.next() {
            Some(Token::Op(op)) => op,
            Some(tok) => {
                return Err(format!(
                    "expected comparison operator after '{word}', found {tok}"
                ));
            }
            None => return Err(format!("missing comparison operator after '{word}'")),
        };

        let value = match self.next() {
            Some(Token::Quoted(text)) => Value::Text(text),
            Some(Token::Word(w)) => match w.parse::<f64>() {
                Ok(n) => Value::Number(n),
                Err(_) => Value::Text(w),
            },
            Some(tok) => return Err(format!("expected value after '{}', found {tok}", op.as_str())),
            None => return Err(format!("missing value after '{}'", op.as_str())),
        };

        Ok(Expr::Compare {
            task,
            field,
            op,
            value,
        })
    }
}

/// Split `task.field` on the last dot outside square brackets.
fn split_path(word: &str) -> std::result::Result<(String, Field), String> {
    let mut depth = 0usize;
    let mut split_at = None;
    for (idx, ch) in word.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => split_at = Some(idx),
            _ => {}
        }
    }

    let idx = split_at.ok_or_else(|| format!("expected '<task>.<field>', got '{word}'"))?;
    let (task, field) = (&word[..idx], &word[idx + 1..]);
    if task.is_empty() {
        return Err(format!("missing task id in '{word}'"));
    }
    let field = Field::parse(field).ok_or_else(|| format!("unknown field '{field}' in '{word}'"))?;
    Ok((task.to_string(), field))
}
