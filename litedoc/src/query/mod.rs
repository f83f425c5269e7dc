// Predicate evaluation over a collection's JSON documents.
//
// The node a key-path addresses is read with json_extract(), which accepts
// the caller's path as written (`$.Numbers[0].Type`, `$.card_ids[0]`,
// `$."first name"`) and yields the scalar, 1/0 for JSON true/false, or the
// JSON text of a container. A document matches when that value compares true
// against the literal. The comparison itself is SQLite's, including its
// mixed-type ordering rules. A path that does not exist yields SQL NULL and
// so never matches an ordinary comparison.

use crate::error::{is_interrupt, LitedocError, Result};
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{params, Connection};
use std::fmt;
use std::str::FromStr;

/// Comparison operator for [`crate::Collection::query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
}

impl Op {
    pub const ALL: [Op; 6] = [
        Op::Equal,
        Op::NotEqual,
        Op::LessThan,
        Op::LessThanEqual,
        Op::GreaterThan,
        Op::GreaterThanEqual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Equal => "=",
            Op::NotEqual => "!=",
            Op::LessThan => "<",
            Op::LessThanEqual => "<=",
            Op::GreaterThan => ">",
            Op::GreaterThanEqual => ">=",
        }
    }

    /// The WHERE clause for this operator. `?1` is the key-path, `?2` the
    /// literal. A null literal tests the JSON type of the node instead, so a
    /// stored `null` and a missing key stay distinct; it has no ordering.
    fn condition(&self, value: &Literal) -> Option<&'static str> {
        if matches!(value, Literal::Null) {
            return match self {
                Op::Equal => Some("json_type(data, ?1) = 'null' AND ?2 IS NULL"),
                Op::NotEqual => Some("json_type(data, ?1) != 'null' AND ?2 IS NULL"),
                _ => None,
            };
        }
        Some(match self {
            Op::Equal => "json_extract(data, ?1) = ?2",
            Op::NotEqual => "json_extract(data, ?1) != ?2",
            Op::LessThan => "json_extract(data, ?1) < ?2",
            Op::LessThanEqual => "json_extract(data, ?1) <= ?2",
            Op::GreaterThan => "json_extract(data, ?1) > ?2",
            Op::GreaterThanEqual => "json_extract(data, ?1) >= ?2",
        })
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Op {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" | "eq" => Ok(Op::Equal),
            "!=" | "<>" | "ne" => Ok(Op::NotEqual),
            "<" | "lt" => Ok(Op::LessThan),
            "<=" | "le" => Ok(Op::LessThanEqual),
            ">" | "gt" => Ok(Op::GreaterThan),
            ">=" | "ge" => Ok(Op::GreaterThanEqual),
            other => Err(format!("unknown operator '{other}'")),
        }
    }
}

/// The right-hand side of a predicate.
///
/// Text and bytes bind as SQL text, booleans as 0/1 (the way json_extract
/// reports JSON true/false), numbers natively. `Null` matches a stored JSON
/// `null` under `=`, any other present value under `!=`, and cannot be
/// ordered.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bytes(Vec<u8>),
    Bool(bool),
}

impl Literal {
    /// Convert a JSON value. Arrays and objects become their minified JSON
    /// text, which is what json_extract reports for a container node.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Literal::Null,
            serde_json::Value::Bool(b) => Literal::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Literal::Integer(i),
                None => Literal::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Literal::Text(s.clone()),
            other => Literal::Text(other.to_string()),
        }
    }
}

impl ToSql for Literal {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Literal::Null => ToSqlOutput::Owned(Value::Null),
            Literal::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            Literal::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            Literal::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Literal::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Text(b.as_slice())),
            Literal::Bool(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
        })
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("NULL"),
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::Real(r) => write!(f, "{r}"),
            Literal::Text(s) => write!(f, "{s:?}"),
            Literal::Bytes(b) => write!(f, "{:?}", String::from_utf8_lossy(b)),
            Literal::Bool(b) => write!(f, "{}", i64::from(*b)),
        }
    }
}

macro_rules! literal_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Literal {
            fn from(v: $t) -> Self {
                Literal::Integer(i64::from(v))
            }
        })*
    };
}

literal_from_int!(i8, i16, i32, i64, u8, u16, u32);

// Values past i64::MAX keep their magnitude as a real, which is also how the
// engine reads such numbers out of JSON.
impl From<u64> for Literal {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => Literal::Integer(i),
            Err(_) => Literal::Real(v as f64),
        }
    }
}

impl From<usize> for Literal {
    fn from(v: usize) -> Self {
        Literal::from(v as u64)
    }
}

impl From<f32> for Literal {
    fn from(v: f32) -> Self {
        Literal::Real(f64::from(v))
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Literal::Real(v)
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Literal::Bool(v)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::Text(v.to_string())
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Literal::Text(v)
    }
}

impl From<&[u8]> for Literal {
    fn from(v: &[u8]) -> Self {
        Literal::Bytes(v.to_vec())
    }
}

impl From<Vec<u8>> for Literal {
    fn from(v: Vec<u8>) -> Self {
        Literal::Bytes(v)
    }
}

impl<T: Into<Literal>> From<Option<T>> for Literal {
    fn from(v: Option<T>) -> Self {
        v.map_or(Literal::Null, Into::into)
    }
}

impl From<&serde_json::Value> for Literal {
    fn from(v: &serde_json::Value) -> Self {
        Literal::from_json(v)
    }
}

/// A `(key-path, operator, literal)` filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub key_path: String,
    pub op: Op,
    pub value: Literal,
}

impl Predicate {
    pub fn new(key_path: &str, op: Op, value: impl Into<Literal>) -> Self {
        Predicate {
            key_path: key_path.to_string(),
            op,
            value: value.into(),
        }
    }

    /// Reject predicates that have no meaning before touching storage.
    pub fn check(&self) -> Result<()> {
        if self.op.condition(&self.value).is_none() {
            return Err(LitedocError::InvalidQuery(format!(
                "operator {} cannot compare against null",
                self.op
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.key_path, self.op, self.value)
    }
}

/// Select `(id, data)` of every row in `table` that satisfies `predicate`,
/// ordered by id. `table` must already be a validated, quoted identifier.
///
/// Returns `Ok(None)` when the predicate cannot be evaluated: the engine
/// rejects the key-path, or the operator has no meaning for the literal.
pub(crate) fn select_matching(
    conn: &Connection,
    table: &str,
    predicate: &Predicate,
) -> rusqlite::Result<Option<Vec<(String, Option<String>)>>> {
    let Some(condition) = predicate.op.condition(&predicate.value) else {
        return Ok(None);
    };
    if !path_is_valid(conn, &predicate.key_path)? {
        return Ok(None);
    }

    let sql = format!("SELECT id, CAST(data AS TEXT) FROM {table} WHERE {condition} ORDER BY id");
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(params![predicate.key_path, predicate.value], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(Some(out))
}

/// Ask the engine to parse `path` against a constant document, so that a
/// malformed path is told apart from a failure reading stored data.
fn path_is_valid(conn: &Connection, path: &str) -> rusqlite::Result<bool> {
    let parsed = conn.query_row("SELECT json_extract('null', ?1)", params![path], |_| Ok(()));
    match parsed {
        Ok(()) => Ok(true),
        Err(e) if is_interrupt(&e) => Err(e),
        Err(rusqlite::Error::SqliteFailure(..)) => Ok(false),
        Err(e) => Err(e),
    }
}
