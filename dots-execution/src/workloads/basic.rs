//! Insert/update/query/delete cycle over three related tables
//!
//! Each worker first seeds the tables up to a tenth of the row limit, then
//! loops: insert a row set, update, join-query, and once the limit is
//! exceeded delete the row set it just inserted so the table size holds.

use async_trait::async_trait;
use chrono::Local;
use dots_core::ApiCall;

use crate::connection::{Connection, Statement};
use crate::error::DbError;
use crate::workload::{WorkerContext, Workload};

/// Rows inserted per seeding action
const SEED_BATCH: u64 = 20;

pub(super) const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS BASIC1 (ID_1 VARCHAR(40) PRIMARY KEY, RND_CHAR VARCHAR(20), RND_FLOAT REAL)",
    "CREATE TABLE IF NOT EXISTS BASIC2 (ID_2 VARCHAR(40) PRIMARY KEY, RND_INTEGER INTEGER, RND_TIME VARCHAR(20), RND_DATE VARCHAR(20))",
    "CREATE TABLE IF NOT EXISTS BASIC3 (ID_1 VARCHAR(40), ID_2 VARCHAR(40), RND_TIMESTAMP VARCHAR(30), RND_INT INTEGER)",
];

/// The basic workload, with statements sent one at a time or as batches
pub struct BasicWorkload {
    batched: bool,
}

impl BasicWorkload {
    pub fn plain() -> Self {
        Self { batched: false }
    }

    pub fn batched() -> Self {
        Self { batched: true }
    }

    pub(super) async fn count_rows(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext) -> Result<u64, DbError> {
        let count = conn
            .query_scalar(&Statement::new("SELECT COUNT(*) FROM BASIC1"))
            .await?;
        ctx.counters.record(ApiCall::Query);
        Ok(count.unwrap_or(0).max(0) as u64)
    }

    /// Run `statements` either as one batch or one by one, counting each as `call`
    async fn send(
        &self,
        conn: &mut dyn Connection,
        ctx: &mut WorkerContext,
        call: ApiCall,
        statements: Vec<Statement>,
    ) -> Result<(), DbError> {
        if self.batched {
            let count = conn.execute_batch(&statements).await?;
            ctx.counters.record_many(call, count);
        } else {
            for statement in &statements {
                conn.execute(statement).await?;
                ctx.counters.record(call);
            }
        }
        Ok(())
    }

    pub(super) async fn populate(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext, index: u64) -> Result<(), DbError> {
        let id1 = format!("ID1:{}:{}", index, ctx.identity);
        let id2 = format!("ID2:{}:{}", index, ctx.identity);
        let now = Local::now();
        let g = &mut ctx.generator;

        let statements = vec![
            Statement::new("INSERT INTO BASIC1 (ID_1, RND_CHAR, RND_FLOAT) VALUES (?, ?, ?)")
                .bind(id1.as_str())
                .bind(g.string(20))
                .bind(g.price()),
            Statement::new("INSERT INTO BASIC2 (ID_2, RND_INTEGER, RND_TIME, RND_DATE) VALUES (?, ?, ?, ?)")
                .bind(id2.as_str())
                .bind(g.int(0, 100_000))
                .bind(now.format("%H:%M:%S").to_string())
                .bind(now.format("%Y-%m-%d").to_string()),
            Statement::new("INSERT INTO BASIC3 (ID_1, ID_2, RND_TIMESTAMP, RND_INT) VALUES (?, ?, ?, ?)")
                .bind(id1)
                .bind(id2)
                .bind(now.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
                .bind(g.int(0, 1000)),
        ];
        self.send(conn, ctx, ApiCall::Insert, statements).await
    }

    /// Insert one seeding batch while the tables hold less than a tenth of
    /// the row limit. Returns `false` once seeding is complete.
    pub(super) async fn seed_step(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext, count: u64) -> Result<bool, DbError> {
        if count >= ctx.max_rows / 10 {
            return Ok(false);
        }
        for i in 0..SEED_BATCH {
            self.populate(conn, ctx, count + i).await?;
        }
        Ok(true)
    }

    async fn update(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext, count: u64) -> Result<(), DbError> {
        let key = format!("ID1:{}:{}", ctx.generator.int(0, count as i64), ctx.identity);
        let statement = Statement::new("UPDATE BASIC1 SET RND_FLOAT = ?, RND_CHAR = ? WHERE ID_1 = ?")
            .bind(ctx.generator.price())
            .bind(ctx.generator.string(20))
            .bind(key);
        conn.execute(&statement).await?;
        ctx.counters.record(ApiCall::Update);
        Ok(())
    }

    async fn query(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext, count: u64) -> Result<(), DbError> {
        let key = format!("ID1:{}:{}", ctx.generator.int(0, count as i64), ctx.identity);
        let statement = Statement::new(
            "SELECT B1.ID_1, B1.RND_CHAR, B1.RND_FLOAT, B3.RND_INT FROM BASIC1 B1, BASIC3 B3 \
             WHERE B1.ID_1 = B3.ID_1 AND B1.ID_1 = ?",
        )
        .bind(key);
        conn.query_rows(&statement).await?;
        ctx.counters.record(ApiCall::Query);
        Ok(())
    }

    pub(super) async fn delete(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext, index: u64) -> Result<(), DbError> {
        let id1 = format!("ID1:{}:{}", index, ctx.identity);
        let id2 = format!("ID2:{}:{}", index, ctx.identity);
        let statements = vec![
            Statement::new("DELETE FROM BASIC3 WHERE ID_1 = ?").bind(id1.as_str()),
            Statement::new("DELETE FROM BASIC2 WHERE ID_2 = ?").bind(id2),
            Statement::new("DELETE FROM BASIC1 WHERE ID_1 = ?").bind(id1),
        ];
        self.send(conn, ctx, ApiCall::Delete, statements).await
    }
}

#[async_trait]
impl Workload for BasicWorkload {
    fn name(&self) -> &'static str {
        if self.batched {
            "batch"
        } else {
            "basic"
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        if self.batched {
            &["btcj3"]
        } else {
            &["btcj2"]
        }
    }

    fn description(&self) -> &'static str {
        if self.batched {
            "Insert/update/query/delete cycle, inserts and deletes sent as batches"
        } else {
            "Insert/update/query/delete cycle over three related tables"
        }
    }

    fn schema(&self) -> &'static [&'static str] {
        SCHEMA
    }

    async fn action(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext) -> Result<(), DbError> {
        let count = self.count_rows(conn, ctx).await?;

        if !ctx.seeded {
            if self.seed_step(conn, ctx, count).await? {
                return Ok(());
            }
            ctx.seeded = true;
        }

        if count > ctx.max_rows {
            // Insert past the existing range and remove it again
            let index = ctx.generator.int(count as i64, 2 * count as i64) as u64;
            self.populate(conn, ctx, index).await?;
            self.update(conn, ctx, count).await?;
            self.query(conn, ctx, count).await?;
            self.delete(conn, ctx, index).await
        } else {
            self.populate(conn, ctx, count).await?;
            self.update(conn, ctx, count).await?;
            self.query(conn, ctx, count).await
        }
    }
}
