//! Basic table cycle driven through stored procedures
//!
//! `prepare` installs two routines next to the basic tables: one counts
//! BASIC2 rows under a threshold, the other rewrites the integer column of
//! rows matching a key pattern. Postgres gets functions, MySQL gets
//! procedures. Any other database is refused at `prepare`.

use async_trait::async_trait;
use dots_core::ApiCall;

use super::basic::{BasicWorkload, SCHEMA};
use crate::connection::{Backend, Connection, Statement};
use crate::error::{DbError, ExecutionError};
use crate::workload::{WorkerContext, Workload};

const POSTGRES_ROUTINES: &[&str] = &[
    "CREATE OR REPLACE FUNCTION QUERY_PROC(threshold BIGINT) RETURNS BIGINT AS $$ \
     SELECT COUNT(*) FROM BASIC2 WHERE RND_INTEGER < threshold \
     $$ LANGUAGE SQL",
    "CREATE OR REPLACE FUNCTION UPDATE_PROC(val BIGINT, pattern TEXT) RETURNS BIGINT AS $$ \
     DECLARE changed BIGINT; \
     BEGIN \
     UPDATE BASIC2 SET RND_INTEGER = val WHERE ID_2 LIKE pattern; \
     GET DIAGNOSTICS changed = ROW_COUNT; \
     RETURN changed; \
     END $$ LANGUAGE plpgsql",
];

const MYSQL_ROUTINES: &[&str] = &[
    "DROP PROCEDURE IF EXISTS QUERY_PROC",
    "CREATE PROCEDURE QUERY_PROC(IN threshold BIGINT) \
     BEGIN SELECT COUNT(*) FROM BASIC2 WHERE RND_INTEGER < threshold; END",
    "DROP PROCEDURE IF EXISTS UPDATE_PROC",
    "CREATE PROCEDURE UPDATE_PROC(IN val BIGINT, IN pattern VARCHAR(40)) \
     BEGIN UPDATE BASIC2 SET RND_INTEGER = val WHERE ID_2 LIKE pattern; END",
];

/// Procedure workload
pub struct ProcedureWorkload {
    tables: BasicWorkload,
}

impl ProcedureWorkload {
    pub fn new() -> Self {
        Self {
            tables: BasicWorkload::plain(),
        }
    }

    /// Rewrite the integer column of one index's BASIC2 rows
    async fn call_update(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext, count: u64) -> Result<(), DbError> {
        let pattern = format!("%:{}:%", ctx.generator.int(0, count as i64));
        let value = ctx.generator.int(0, 100_000);
        match conn.backend() {
            Backend::Postgres => {
                let statement = Statement::new("SELECT UPDATE_PROC(?, ?)").bind(value).bind(pattern);
                conn.query_scalar(&statement).await?;
            }
            Backend::MySql => {
                let statement = Statement::new("CALL UPDATE_PROC(?, ?)").bind(value).bind(pattern);
                conn.execute(&statement).await?;
            }
            other => return Err(unsupported(other)),
        }
        ctx.counters.record(ApiCall::Update);
        Ok(())
    }

    /// Count BASIC2 rows under a random threshold
    async fn call_query(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext) -> Result<(), DbError> {
        let threshold = ctx.generator.int(500, 1000);
        let sql = match conn.backend() {
            Backend::Postgres => "SELECT QUERY_PROC(?)",
            Backend::MySql => "CALL QUERY_PROC(?)",
            other => return Err(unsupported(other)),
        };
        conn.query_rows(&Statement::new(sql).bind(threshold)).await?;
        ctx.counters.record(ApiCall::Query);
        Ok(())
    }
}

impl Default for ProcedureWorkload {
    fn default() -> Self {
        Self::new()
    }
}

fn unsupported(backend: Backend) -> DbError {
    DbError::Statement(format!("stored procedures are not available on {}", backend))
}

#[async_trait]
impl Workload for ProcedureWorkload {
    fn name(&self) -> &'static str {
        "procedure"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["btcj8"]
    }

    fn description(&self) -> &'static str {
        "Basic table cycle with updates and queries run by stored procedures"
    }

    fn schema(&self) -> &'static [&'static str] {
        SCHEMA
    }

    fn schema_for(&self, backend: Backend) -> Result<Vec<&'static str>, ExecutionError> {
        let routines = match backend {
            Backend::Postgres => POSTGRES_ROUTINES,
            Backend::MySql => MYSQL_ROUTINES,
            other => {
                return Err(ExecutionError::UnsupportedBackend {
                    workload: self.name(),
                    backend: other,
                })
            }
        };
        Ok(SCHEMA.iter().chain(routines).copied().collect())
    }

    async fn action(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext) -> Result<(), DbError> {
        let count = self.tables.count_rows(conn, ctx).await?;

        if !ctx.seeded {
            if self.tables.seed_step(conn, ctx, count).await? {
                return Ok(());
            }
            ctx.seeded = true;
        }

        if count > ctx.max_rows {
            let index = ctx.generator.int(count as i64, 2 * count as i64) as u64;
            self.tables.populate(conn, ctx, index).await?;
            self.call_update(conn, ctx, count).await?;
            self.call_query(conn, ctx).await?;
            self.tables.delete(conn, ctx, index).await
        } else {
            self.tables.populate(conn, ctx, count).await?;
            self.call_update(conn, ctx, count).await?;
            self.call_query(conn, ctx).await
        }
    }
}
