//! Drive search query builder / 查询语句构造
//!
//! Turns typed filter clauses into the `q` dialect of the files.list endpoint:
//! `trashed = false and name = 'report.pdf' and 'root' in parents`.
//! Clauses are combined with a single flat joiner, no grouping.

use std::fmt;
use std::str::FromStr;

use crate::error::DriveError;

pub const DEFAULT_JOINER: &str = "and";

/// Comparison operators accepted by the Drive query grammar / 查询操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    /// Membership: rendered as `<value> in <field>`
    In,
    Has,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Contains => "contains",
            Operator::In => "in",
            Operator::Has => "has",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = DriveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" => Ok(Operator::Eq),
            "!=" => Ok(Operator::NotEq),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            "contains" => Ok(Operator::Contains),
            "in" => Ok(Operator::In),
            "has" => Ok(Operator::Has),
            other => Err(DriveError::InvalidQuery(format!("unknown operator '{}'", other))),
        }
    }
}

/// Clause value / 查询值
///
/// Booleans are emitted as bare tokens, everything else as a quoted string.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Bool(bool),
    Text(String),
}

impl QueryValue {
    /// Serialize for the query string / 序列化
    pub fn serialize(&self) -> String {
        match self {
            QueryValue::Bool(true) => "true".to_string(),
            QueryValue::Bool(false) => "false".to_string(),
            // backslashes first, otherwise the quote escapes get doubled
            QueryValue::Text(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        }
    }
}

impl From<bool> for QueryValue {
    fn from(v: bool) -> Self {
        QueryValue::Bool(v)
    }
}

impl From<&str> for QueryValue {
    fn from(v: &str) -> Self {
        QueryValue::Text(v.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(v: String) -> Self {
        QueryValue::Text(v)
    }
}

impl From<&String> for QueryValue {
    fn from(v: &String) -> Self {
        QueryValue::Text(v.clone())
    }
}

impl From<i64> for QueryValue {
    fn from(v: i64) -> Self {
        QueryValue::Text(v.to_string())
    }
}

impl From<u64> for QueryValue {
    fn from(v: u64) -> Self {
        QueryValue::Text(v.to_string())
    }
}

impl From<chrono::DateTime<chrono::Utc>> for QueryValue {
    fn from(v: chrono::DateTime<chrono::Utc>) -> Self {
        QueryValue::Text(v.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
    }
}

/// A single filter condition / 单个过滤条件
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub field: String,
    pub op: Operator,
    pub value: QueryValue,
    pub negate: bool,
}

impl Clause {
    pub fn new(field: impl Into<String>, op: Operator, value: impl Into<QueryValue>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
            negate: false,
        }
    }

    /// Build a clause from an operator token, rejecting unknown operators
    pub fn parse(field: impl Into<String>, op: &str, value: impl Into<QueryValue>) -> Result<Self, DriveError> {
        Ok(Self::new(field, op.parse()?, value))
    }

    pub fn eq(field: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        Self::new(field, Operator::Eq, value)
    }

    pub fn contains(field: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        Self::new(field, Operator::Contains, value)
    }

    /// `'<value>' in <field>`, e.g. `'root' in parents`
    pub fn within(field: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        Self::new(field, Operator::In, value)
    }

    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    pub fn render(&self) -> String {
        let value = self.value.serialize();
        let clause = match self.op {
            Operator::In => format!("{} {} {}", value, self.op, self.field),
            _ => format!("{} {} {}", self.field, self.op, value),
        };
        if self.negate {
            format!("not {}", clause)
        } else {
            clause
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Join clauses with ` and ` / 使用 and 连接
pub fn build_query(clauses: &[Clause]) -> String {
    build_query_with(clauses, DEFAULT_JOINER)
}

/// Join clauses with a caller-supplied boolean keyword
pub fn build_query_with(clauses: &[Clause], joiner: &str) -> String {
    let sep = format!(" {} ", joiner);
    clauses
        .iter()
        .map(Clause::render)
        .collect::<Vec<_>>()
        .join(&sep)
}
