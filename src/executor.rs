//! Defensive execution of SQL text against the store.
//!
//! Callers get rows or an [`ExecutionError`], never a panic or a retry: the
//! text may come from the translator and could be a mutating statement.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime};
use duckdb::types::{TimeUnit, Value};
use duckdb::{Connection, InterruptHandle, params_from_iter};
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout_at};

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            // Debug keeps the fractional part of whole floats (`5.0`, not `5`).
            Scalar::Float(x) => write!(f, "{x:?}"),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<f64> for Scalar {
    fn from(x: f64) -> Self {
        Scalar::Float(x)
    }
}

impl From<Value> for Scalar {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Scalar::Null,
            Value::Boolean(b) => Scalar::Bool(b),
            Value::TinyInt(i) => Scalar::Int(i.into()),
            Value::SmallInt(i) => Scalar::Int(i.into()),
            Value::Int(i) => Scalar::Int(i.into()),
            Value::BigInt(i) => Scalar::Int(i),
            Value::HugeInt(i) => i64::try_from(i)
                .map(Scalar::Int)
                .unwrap_or_else(|_| Scalar::Text(i.to_string())),
            Value::UTinyInt(i) => Scalar::Int(i.into()),
            Value::USmallInt(i) => Scalar::Int(i.into()),
            Value::UInt(i) => Scalar::Int(i.into()),
            Value::UBigInt(i) => i64::try_from(i)
                .map(Scalar::Int)
                .unwrap_or_else(|_| Scalar::Text(i.to_string())),
            Value::Float(x) => Scalar::Float(x.into()),
            Value::Double(x) => Scalar::Float(x),
            Value::Decimal(d) => Scalar::Text(d.to_string()),
            Value::Text(s) => Scalar::Text(s),
            Value::Date32(days) => DateTime::from_timestamp(i64::from(days) * 86_400, 0)
                .map(|dt| Scalar::Text(dt.date_naive().to_string()))
                .unwrap_or_else(|| Scalar::Text(days.to_string())),
            Value::Timestamp(unit, v) => DateTime::from_timestamp_micros(unit.to_micros(v))
                .map(|dt| Scalar::Text(dt.naive_utc().to_string()))
                .unwrap_or_else(|| Scalar::Text(v.to_string())),
            Value::Time64(unit, v) => time_of_day(unit, v)
                .map(|t| Scalar::Text(t.to_string()))
                .unwrap_or_else(|| Scalar::Text(v.to_string())),
            other => Scalar::Text(format!("{other:?}")),
        }
    }
}

fn time_of_day(unit: TimeUnit, v: i64) -> Option<NaiveTime> {
    let micros = unit.to_micros(v);
    let secs = u32::try_from(micros.div_euclid(1_000_000)).ok()?;
    let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1_000).ok()?;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
}

impl From<&Scalar> for Value {
    fn from(s: &Scalar) -> Self {
        match s {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Boolean(*b),
            Scalar::Int(i) => Value::BigInt(*i),
            Scalar::Float(x) => Value::Double(*x),
            Scalar::Text(t) => Value::Text(t.clone()),
        }
    }
}

/// One result row: column names paired with values, in select-list order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<(String, Scalar)>,
}

impl Row {
    pub fn new(columns: Vec<(String, Scalar)>) -> Self {
        Self { columns }
    }

    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn columns(&self) -> &[(String, Scalar)] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<K: Into<String>, V: Into<Scalar>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Row::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.columns.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        f.write_str("}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("database error: {0}")]
    Database(String),
    #[error("no value supplied for parameter :{0}")]
    MissingParam(String),
    #[error("query did not finish within {0:?}")]
    Timeout(Duration),
}

impl From<duckdb::Error> for ExecutionError {
    fn from(e: duckdb::Error) -> Self {
        ExecutionError::Database(e.to_string())
    }
}

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Runs `sql` with `:name` placeholders bound from `params`.
    async fn execute(
        &self,
        sql: &str,
        params: &[(&str, Scalar)],
    ) -> Result<Vec<Row>, ExecutionError>;
}

/// Runs statements on a dedicated blocking thread, one at a time.
///
/// Each call gets `query_timeout` end to end, including the wait for the
/// connection. A statement still running at the deadline is interrupted so
/// the connection is released for the next caller.
#[derive(Clone)]
pub struct DuckDbExecutor {
    db: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
    query_timeout: Duration,
}

impl DuckDbExecutor {
    pub fn new(conn: Connection) -> Self {
        Self::with_timeout(conn, DEFAULT_QUERY_TIMEOUT)
    }

    pub fn with_timeout(conn: Connection, query_timeout: Duration) -> Self {
        Self {
            interrupt: conn.interrupt_handle(),
            db: Arc::new(Mutex::new(conn)),
            query_timeout,
        }
    }
}

#[async_trait]
impl QueryExecutor for DuckDbExecutor {
    async fn execute(
        &self,
        sql: &str,
        params: &[(&str, Scalar)],
    ) -> Result<Vec<Row>, ExecutionError> {
        let (positional_sql, values) = bind_named(sql, params)?;
        let deadline = Instant::now() + self.query_timeout;

        let Ok(db) = timeout_at(deadline, Arc::clone(&self.db).lock_owned()).await else {
            tracing::warn!("query timed out waiting for the connection");
            return Err(ExecutionError::Timeout(self.query_timeout));
        };
        let task =
            tokio::task::spawn_blocking(move || run_statement(&db, &positional_sql, values));

        let result = match timeout_at(deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(ExecutionError::Database(join.to_string())),
            Err(_) => {
                self.interrupt.interrupt();
                Err(ExecutionError::Timeout(self.query_timeout))
            }
        };
        result.map_err(|e| {
            tracing::warn!("query failed: {e}");
            e
        })
    }
}

fn run_statement(
    db: &Connection,
    sql: &str,
    values: Vec<Value>,
) -> Result<Vec<Row>, ExecutionError> {
    let mut stmt = db.prepare(sql)?;

    if !returns_rows(sql) {
        let affected = stmt.execute(params_from_iter(values))?;
        tracing::debug!("statement affected {affected} rows");
        return Ok(Vec::new());
    }

    let mut rows = stmt.query(params_from_iter(values))?;
    let names = rows
        .as_ref()
        .map(|s| s.column_names())
        .unwrap_or_default();

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut columns = Vec::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            let v: Value = row.get(idx)?;
            columns.push((name.clone(), Scalar::from(v)));
        }
        out.push(Row::new(columns));
    }
    Ok(out)
}

const ROW_RETURNING_VERBS: &[&str] = &[
    "SELECT",
    "WITH",
    "VALUES",
    "FROM",
    "SHOW",
    "DESCRIBE",
    "EXPLAIN",
    "SUMMARIZE",
    "PRAGMA",
    "TABLE",
];

/// DML only yields rows through a `RETURNING` clause.
fn returns_rows(sql: &str) -> bool {
    let mut words = sql
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty());
    let first = words.next().unwrap_or("").to_ascii_uppercase();
    ROW_RETURNING_VERBS.contains(&first.as_str())
        || (["INSERT", "UPDATE", "DELETE"].contains(&first.as_str())
            && words.any(|w| w.eq_ignore_ascii_case("RETURNING")))
}

/// Rewrites `:name` placeholders to `?` and returns values in placeholder order.
///
/// Quoted literals, quoted identifiers and `::` casts are copied through untouched.
fn bind_named(sql: &str, params: &[(&str, Scalar)]) -> Result<(String, Vec<Value>), ExecutionError> {
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut chars = sql.char_indices().peekable();
    let mut quote: Option<char> = None;

    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
            }
            ':' if matches!(chars.peek(), Some((_, ':'))) => {
                out.push_str("::");
                chars.next();
            }
            ':' if matches!(chars.peek(), Some((_, n)) if n.is_ascii_alphabetic() || *n == '_') => {
                let start = i + 1;
                let mut end = start;
                while let Some((j, n)) = chars.peek().copied() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        end = j + n.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let name = &sql[start..end];
                let value = params
                    .iter()
                    .find(|(k, _)| *k == name)
                    .map(|(_, v)| Value::from(v))
                    .ok_or_else(|| ExecutionError::MissingParam(name.to_string()))?;
                values.push(value);
                out.push('?');
            }
            _ => out.push(c),
        }
    }
    Ok((out, values))
}
