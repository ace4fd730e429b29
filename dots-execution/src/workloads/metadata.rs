//! Catalog and server introspection over the basic tables
//!
//! Workers seed the basic tables, then each action asks the server about
//! itself (version, settings, catalog sizes) and looks one basic table up in
//! the catalog before reading it back in key order. The catalog queries
//! depend on the backend behind the connection.

use async_trait::async_trait;
use dots_core::ApiCall;

use super::basic::{BasicWorkload, SCHEMA};
use crate::connection::{Backend, Connection, Statement};
use crate::error::DbError;
use crate::workload::{WorkerContext, Workload};

const TABLES: &[&str] = &["BASIC1", "BASIC2", "BASIC3"];

/// A server-level catalog query
#[derive(Debug, Clone, Copy)]
enum ServerQuery {
    /// Integer answer read as a scalar
    Count(&'static str),
    /// Text answer, rows fetched and dropped
    Rows(&'static str),
}

use ServerQuery::{Count, Rows};

const POSTGRES_SERVER: &[ServerQuery] = &[
    Rows("SELECT version()"),
    Rows("SELECT current_setting('server_version')"),
    Rows("SELECT CAST(current_database() AS TEXT), CAST(current_user AS TEXT)"),
    Count("SELECT COUNT(*) FROM pg_catalog.pg_settings"),
    Count("SELECT COUNT(*) FROM pg_catalog.pg_proc"),
    Count("SELECT COUNT(*) FROM pg_catalog.pg_type"),
    Count("SELECT COUNT(*) FROM information_schema.schemata"),
    Count("SELECT COUNT(*) FROM pg_catalog.pg_stat_activity"),
];

const POSTGRES_TABLE: &[&str] = &[
    "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = current_schema() AND LOWER(table_name) = LOWER(?)",
    "SELECT COUNT(*) FROM information_schema.columns WHERE table_schema = current_schema() AND LOWER(table_name) = LOWER(?)",
    "SELECT COUNT(*) FROM information_schema.table_constraints WHERE table_schema = current_schema() AND LOWER(table_name) = LOWER(?)",
    "SELECT COUNT(*) FROM pg_catalog.pg_indexes WHERE schemaname = current_schema() AND tablename = LOWER(?)",
];

const MYSQL_SERVER: &[ServerQuery] = &[
    Rows("SELECT VERSION()"),
    Rows("SELECT DATABASE(), CURRENT_USER()"),
    Count("SELECT COUNT(*) FROM information_schema.SCHEMATA"),
    Count("SELECT COUNT(*) FROM information_schema.ROUTINES"),
    Count("SELECT COUNT(*) FROM information_schema.CHARACTER_SETS"),
    Count("SELECT COUNT(*) FROM information_schema.COLLATIONS"),
    Count("SELECT COUNT(*) FROM information_schema.ENGINES"),
    Count("SELECT COUNT(*) FROM information_schema.PROCESSLIST"),
];

const MYSQL_TABLE: &[&str] = &[
    "SELECT COUNT(*) FROM information_schema.TABLES WHERE TABLE_SCHEMA = DATABASE() AND LOWER(TABLE_NAME) = LOWER(?)",
    "SELECT COUNT(*) FROM information_schema.COLUMNS WHERE TABLE_SCHEMA = DATABASE() AND LOWER(TABLE_NAME) = LOWER(?)",
    "SELECT COUNT(*) FROM information_schema.STATISTICS WHERE TABLE_SCHEMA = DATABASE() AND LOWER(TABLE_NAME) = LOWER(?)",
    "SELECT COUNT(*) FROM information_schema.KEY_COLUMN_USAGE WHERE TABLE_SCHEMA = DATABASE() AND LOWER(TABLE_NAME) = LOWER(?)",
];

const SQLITE_SERVER: &[ServerQuery] = &[
    Rows("SELECT sqlite_version()"),
    Count("SELECT COUNT(*) FROM sqlite_master"),
    Count("SELECT COUNT(*) FROM pragma_database_list"),
    Count("SELECT COUNT(*) FROM pragma_collation_list"),
    Count("SELECT COUNT(*) FROM pragma_compile_options"),
];

const SQLITE_TABLE: &[&str] = &[
    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND LOWER(name) = LOWER(?)",
    "SELECT COUNT(*) FROM pragma_table_info(?)",
    "SELECT COUNT(*) FROM pragma_index_list(?)",
    "SELECT COUNT(*) FROM pragma_foreign_key_list(?)",
];

const ANSI_SERVER: &[ServerQuery] = &[
    Count("SELECT COUNT(*) FROM information_schema.tables"),
    Count("SELECT COUNT(*) FROM information_schema.columns"),
];

const ANSI_TABLE: &[&str] = &[
    "SELECT COUNT(*) FROM information_schema.tables WHERE LOWER(table_name) = LOWER(?)",
    "SELECT COUNT(*) FROM information_schema.columns WHERE LOWER(table_name) = LOWER(?)",
];

fn server_queries(backend: Backend) -> &'static [ServerQuery] {
    match backend {
        Backend::Postgres => POSTGRES_SERVER,
        Backend::MySql => MYSQL_SERVER,
        Backend::Sqlite => SQLITE_SERVER,
        Backend::Other => ANSI_SERVER,
    }
}

/// Catalog queries taking the table name as their only parameter
fn table_queries(backend: Backend) -> &'static [&'static str] {
    match backend {
        Backend::Postgres => POSTGRES_TABLE,
        Backend::MySql => MYSQL_TABLE,
        Backend::Sqlite => SQLITE_TABLE,
        Backend::Other => ANSI_TABLE,
    }
}

/// Metadata workload
pub struct MetadataWorkload {
    tables: BasicWorkload,
}

impl MetadataWorkload {
    pub fn new() -> Self {
        Self {
            tables: BasicWorkload::plain(),
        }
    }

    /// One randomly chosen server query
    async fn inspect_server(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext) -> Result<(), DbError> {
        let Some(query) = ctx.generator.pick(server_queries(conn.backend())).copied() else {
            return Ok(());
        };
        match query {
            Count(sql) => {
                conn.query_scalar(&Statement::new(sql)).await?;
            }
            Rows(sql) => {
                conn.query_rows(&Statement::new(sql)).await?;
            }
        }
        ctx.counters.record(ApiCall::Query);
        Ok(())
    }

    /// Every catalog query for one table, then the table itself
    async fn inspect_table(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext) -> Result<(), DbError> {
        let table = ctx.generator.pick(TABLES).copied().unwrap_or("BASIC1");
        for sql in table_queries(conn.backend()) {
            conn.query_scalar(&Statement::new(*sql).bind(table)).await?;
            ctx.counters.record(ApiCall::Query);
        }
        conn.query_rows(&Statement::new(format!("SELECT * FROM {} ORDER BY 1", table)))
            .await?;
        ctx.counters.record(ApiCall::Query);
        Ok(())
    }
}

impl Default for MetadataWorkload {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Workload for MetadataWorkload {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["btcj1"]
    }

    fn description(&self) -> &'static str {
        "Server and catalog introspection over the basic tables"
    }

    fn schema(&self) -> &'static [&'static str] {
        SCHEMA
    }

    async fn action(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext) -> Result<(), DbError> {
        let count = self.tables.count_rows(conn, ctx).await?;

        if !ctx.seeded {
            if self.tables.seed_step(conn, ctx, count).await? {
                return Ok(());
            }
            ctx.seeded = true;
        }

        self.inspect_server(conn, ctx).await?;
        self.inspect_table(conn, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionFactory, SqlxConnectionFactory};
    use crate::testing::{test_context, ScriptedConnection};
    use crate::workload::prepare_schema;
    use dots_config::DatabaseConfig;

    #[tokio::test]
    async fn test_seeds_before_inspecting() {
        let workload = MetadataWorkload::new();
        let (mut ctx, _sink) = test_context(1000);
        let mut conn = ScriptedConnection::new().with_scalar(Some(0));

        workload.action(&mut conn, &mut ctx).await.unwrap();

        assert!(!ctx.seeded);
        assert_eq!(ctx.counters.get(ApiCall::Query), 1);
        assert_eq!(ctx.counters.get(ApiCall::Insert), 60);
    }

    #[tokio::test]
    async fn test_catalog_queries_follow_backend() {
        for (backend, marker) in [
            (Backend::Postgres, "current_schema()"),
            (Backend::MySql, "DATABASE()"),
            (Backend::Sqlite, "pragma_table_info"),
            (Backend::Other, "information_schema.columns"),
        ] {
            let workload = MetadataWorkload::new();
            let (mut ctx, _sink) = test_context(100);
            let mut conn = ScriptedConnection::new()
                .with_backend(backend)
                .with_scalar(Some(50));

            workload.action(&mut conn, &mut ctx).await.unwrap();

            let executed = conn.executed();
            let tables = table_queries(backend).len();
            // Row count, one server query, the table queries and the read back
            assert_eq!(executed.len(), 3 + tables, "{:?}", backend);
            assert_eq!(ctx.counters.get(ApiCall::Query), 3 + tables as u64);
            assert!(executed.iter().any(|sql| sql.contains(marker)), "{:?}", backend);
            assert!(server_queries(backend)
                .iter()
                .any(|query| matches!(query, Count(sql) | Rows(sql) if *sql == executed[1])));
            assert!(executed.last().unwrap().ends_with("ORDER BY 1"));
            assert_eq!(ctx.counters.get(ApiCall::Insert), 0);
        }
    }

    #[tokio::test]
    async fn test_against_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", dir.path().join("metadata.db").display()),
            ..Default::default()
        };
        let factory = SqlxConnectionFactory::new(&config).unwrap();
        let mut conn = factory.create_connection().await.unwrap();
        assert_eq!(conn.backend(), Backend::Sqlite);

        let workload = MetadataWorkload::new();
        prepare_schema(&workload, conn.as_mut()).await.unwrap();

        let (mut ctx, _sink) = test_context(20);
        for _ in 0..12 {
            workload.action(conn.as_mut(), &mut ctx).await.unwrap();
        }

        assert!(ctx.seeded);
        let snapshot = ctx.counters.snapshot();
        assert_eq!(snapshot.inserts, 3 * 20);
        // A row count per action, six more queries per seeded action
        assert_eq!(snapshot.queries, 12 + 11 * 6);
        assert_eq!(ctx.counters.failures(), 0);

        conn.close().await.unwrap();
    }
}
