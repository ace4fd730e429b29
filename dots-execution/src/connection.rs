//! Database connections
//!
//! Workloads talk to the database through the object-safe [`Connection`]
//! trait. The production implementation wraps a `sqlx::AnyConnection`, so the
//! target database is chosen by the URL scheme.

use async_trait::async_trait;
use dots_config::DatabaseConfig;
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyConnection, Connection as _, Row};
use std::borrow::Cow;
use std::fmt;
use tracing::debug;

use crate::error::DbError;

/// A bound statement parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

/// Database product behind a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    MySql,
    Sqlite,
    Other,
}

impl Backend {
    /// Classify a driver's backend name, e.g. `PostgreSQL` or `SQLite`
    pub fn from_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.contains("postgres") {
            Backend::Postgres
        } else if name.contains("mysql") || name.contains("mariadb") {
            Backend::MySql
        } else if name.contains("sqlite") {
            Backend::Sqlite
        } else {
            Backend::Other
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Postgres => write!(f, "PostgreSQL"),
            Backend::MySql => write!(f, "MySQL"),
            Backend::Sqlite => write!(f, "SQLite"),
            Backend::Other => write!(f, "unknown database"),
        }
    }
}

/// SQL text with `?` placeholders and its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }
}

/// One database connection, owned by exactly one worker
#[async_trait]
pub trait Connection: Send {
    fn backend(&self) -> Backend;

    /// Run a statement that returns no rows; yields the affected row count
    async fn execute(&mut self, statement: &Statement) -> Result<u64, DbError>;

    /// Run statements as one unit; yields the number of statements run
    async fn execute_batch(&mut self, statements: &[Statement]) -> Result<u64, DbError>;

    /// First column of the first row as an integer, if there is a row
    async fn query_scalar(&mut self, statement: &Statement) -> Result<Option<i64>, DbError>;

    /// Fetch every row and return how many there were
    async fn query_rows(&mut self, statement: &Statement) -> Result<usize, DbError>;

    /// Close the connection
    async fn close(self: Box<Self>) -> Result<(), DbError>;
}

/// Opens new connections for the load controller
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create_connection(&self) -> Result<Box<dyn Connection>, DbError>;
}

/// Connection backed by `sqlx::AnyConnection`
pub struct SqlxConnection {
    conn: AnyConnection,
    backend: Backend,
}

impl SqlxConnection {
    /// SQL as the backend expects it; Postgres numbers its placeholders
    fn sql<'s>(&self, statement: &'s Statement) -> Cow<'s, str> {
        if self.backend == Backend::Postgres && !statement.params.is_empty() {
            Cow::Owned(numbered_placeholders(&statement.sql))
        } else {
            Cow::Borrowed(statement.sql.as_str())
        }
    }
}

/// Rewrite `?` placeholders outside string literals as `$1`, `$2`, ...
fn numbered_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut in_literal = false;
    let mut n = 0;
    for c in sql.chars() {
        match c {
            '\'' => {
                in_literal = !in_literal;
                out.push(c);
            }
            '?' if !in_literal => {
                n += 1;
                out.push('$');
                out.push_str(&n.to_string());
            }
            _ => out.push(c),
        }
    }
    out
}

fn bind_params<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    params: &'q [SqlValue],
) -> Query<'q, Any, AnyArguments<'q>> {
    for param in params {
        query = match param {
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Null => query.bind(Option::<String>::None),
        };
    }
    query
}

#[async_trait]
impl Connection for SqlxConnection {
    fn backend(&self) -> Backend {
        self.backend
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64, DbError> {
        if statement.params.is_empty() {
            // Simple protocol; MySQL cannot prepare procedure DDL
            let result = sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql(&statement.sql)).await?;
            return Ok(result.rows_affected());
        }
        let sql = self.sql(statement);
        let result = bind_params(sqlx::query(&sql), &statement.params)
            .execute(&mut self.conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn execute_batch(&mut self, statements: &[Statement]) -> Result<u64, DbError> {
        let sqls: Vec<Cow<'_, str>> = statements.iter().map(|s| self.sql(s)).collect();
        let mut tx = self.conn.begin().await?;
        for (sql, statement) in sqls.iter().zip(statements) {
            bind_params(sqlx::query(sql), &statement.params)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(statements.len() as u64)
    }

    async fn query_scalar(&mut self, statement: &Statement) -> Result<Option<i64>, DbError> {
        let sql = self.sql(statement);
        let row: Option<AnyRow> = bind_params(sqlx::query(&sql), &statement.params)
            .fetch_optional(&mut self.conn)
            .await?;
        match row {
            Some(row) => Ok(Some(row.try_get::<i64, _>(0)?)),
            None => Ok(None),
        }
    }

    async fn query_rows(&mut self, statement: &Statement) -> Result<usize, DbError> {
        let sql = self.sql(statement);
        let rows = bind_params(sqlx::query(&sql), &statement.params)
            .fetch_all(&mut self.conn)
            .await?;
        Ok(rows.len())
    }

    async fn close(self: Box<Self>) -> Result<(), DbError> {
        let SqlxConnection { conn, .. } = *self;
        conn.close().await?;
        Ok(())
    }
}

/// Opens `sqlx` connections to the configured database
pub struct SqlxConnectionFactory {
    url: String,
    driver: String,
}

impl SqlxConnectionFactory {
    pub fn new(config: &DatabaseConfig) -> Result<Self, DbError> {
        sqlx::any::install_default_drivers();
        Ok(Self {
            url: with_credentials(&config.url, &config.user, &config.password)?,
            driver: config.driver.clone(),
        })
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }
}

#[async_trait]
impl ConnectionFactory for SqlxConnectionFactory {
    async fn create_connection(&self) -> Result<Box<dyn Connection>, DbError> {
        let conn = AnyConnection::connect(&self.url)
            .await
            .map_err(|e| DbError::Connect(e.to_string()))?;
        let backend = Backend::from_name(conn.backend_name());
        debug!("Opened {} connection to {}", self.driver, backend);
        Ok(Box::new(SqlxConnection { conn, backend }))
    }
}

/// Put `user` and `password` into the URL unless it already names a user
fn with_credentials(raw: &str, user: &str, password: &str) -> Result<String, DbError> {
    if user.is_empty() {
        return Ok(raw.to_string());
    }

    let mut url = url::Url::parse(raw).map_err(|e| DbError::Connect(format!("invalid URL: {}", e)))?;
    if !url.username().is_empty() {
        return Ok(raw.to_string());
    }

    let cannot_carry = || DbError::Connect(format!("URL {} cannot carry credentials", raw));
    url.set_username(user).map_err(|_| cannot_carry())?;
    if !password.is_empty() {
        url.set_password(Some(password)).map_err(|_| cannot_carry())?;
    }

    Ok(url.to_string())
}
