//! Online auction workload
//!
//! Workers share a user registry, an item table and a bid table. After a
//! one-time seed each action picks one of: bid, put an item up, view an
//! item, update an item, read an item's bid history.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local};
use dots_core::ApiCall;

use crate::connection::{Connection, Statement};
use crate::error::DbError;
use crate::workload::{WorkerContext, Workload};

const REGISTRY: &str = "REGISTRY";
const ITEM: &str = "ITEM";
const BID: &str = "BID";

const SEED_USERS: u64 = 1000;
const SEED_ITEMS: u64 = 100;
const SEED_BIDS: u64 = 100;

/// Auction items run this long
const LISTING_DAYS: i64 = 10;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS REGISTRY (USERID VARCHAR(20) PRIMARY KEY, PASSWORD VARCHAR(20), \
     ADDRESS VARCHAR(80), EMAIL VARCHAR(50), PHONE VARCHAR(20))",
    "CREATE TABLE IF NOT EXISTS ITEM (ITEMID VARCHAR(20) PRIMARY KEY, SELLERID VARCHAR(20), \
     DESCRIPTION VARCHAR(200), BID_PRICE REAL, START_TIME VARCHAR(30), END_TIME VARCHAR(30), BID_COUNT INTEGER)",
    "CREATE TABLE IF NOT EXISTS BID (ITEMID VARCHAR(20), BIDERID VARCHAR(20), BID_PRICE REAL, BID_TIME VARCHAR(30))",
];

pub struct AuctionWorkload;

fn tally(ctx: &WorkerContext, table: &'static str) -> u64 {
    ctx.tallies.get(table).copied().unwrap_or(0)
}

fn bump(ctx: &mut WorkerContext, table: &'static str) -> u64 {
    let entry = ctx.tallies.entry(table).or_insert(0);
    *entry += 1;
    *entry
}

fn timestamp(offset_days: i64) -> String {
    (Local::now() + ChronoDuration::days(offset_days))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

impl AuctionWorkload {
    async fn count(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext, table: &'static str) -> Result<u64, DbError> {
        let count = conn
            .query_scalar(&Statement::new(format!("SELECT COUNT(*) FROM {}", table)))
            .await?;
        ctx.counters.record(ApiCall::Query);
        Ok(count.unwrap_or(0).max(0) as u64)
    }

    fn random_item(&self, ctx: &mut WorkerContext) -> String {
        let items = tally(ctx, ITEM).max(1) as i64;
        ctx.generator.user_id("ITEM", 1, items)
    }

    fn random_user(&self, ctx: &mut WorkerContext) -> String {
        let users = tally(ctx, REGISTRY).max(1) as i64;
        ctx.generator.user_id("UID", 1, users)
    }

    /// Count the tables and fill any that are empty.
    ///
    /// Returns early, still unseeded, once termination is requested.
    async fn seed(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext) -> Result<(), DbError> {
        for table in [REGISTRY, ITEM, BID] {
            let rows = self.count(conn, ctx, table).await?;
            ctx.tallies.insert(table, rows);
        }

        if tally(ctx, REGISTRY) == 0 {
            for _ in 0..SEED_USERS {
                if ctx.termination.is_requested() {
                    return Ok(());
                }
                let user = format!("UID{}", bump(ctx, REGISTRY));
                self.register(conn, ctx, user).await?;
            }
        }
        if tally(ctx, ITEM) == 0 {
            for _ in 0..SEED_ITEMS {
                if ctx.termination.is_requested() {
                    return Ok(());
                }
                bump(ctx, ITEM);
                self.put(conn, ctx).await?;
            }
        }
        if tally(ctx, BID) == 0 {
            for _ in 0..SEED_BIDS {
                if ctx.termination.is_requested() {
                    return Ok(());
                }
                bump(ctx, BID);
                self.bid(conn, ctx).await?;
            }
        }

        ctx.seeded = true;
        Ok(())
    }

    async fn register(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext, user: String) -> Result<(), DbError> {
        let g = &mut ctx.generator;
        let statement = Statement::new(
            "INSERT INTO REGISTRY (USERID, PASSWORD, ADDRESS, EMAIL, PHONE) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user)
        .bind("password")
        .bind(format!("{} {} Street", g.int(1, 9999), g.string(12)))
        .bind(g.email())
        .bind(g.string(10));
        conn.execute(&statement).await?;
        ctx.counters.record(ApiCall::Insert);
        Ok(())
    }

    /// Put item number `tally(ITEM)` up for auction
    async fn put(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext) -> Result<(), DbError> {
        let item = format!("ITEM{}", tally(ctx, ITEM));
        let seller = self.random_user(ctx);
        let statement = Statement::new(
            "INSERT INTO ITEM (ITEMID, SELLERID, DESCRIPTION, BID_PRICE, START_TIME, END_TIME, BID_COUNT) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(item)
        .bind(seller)
        .bind(ctx.generator.string(100))
        .bind(ctx.generator.price())
        .bind(timestamp(0))
        .bind(timestamp(LISTING_DAYS))
        .bind(0);
        conn.execute(&statement).await?;
        ctx.counters.record(ApiCall::Insert);
        Ok(())
    }

    /// Outbid the current price of a random item and record the bid
    async fn bid(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext) -> Result<(), DbError> {
        let item = self.random_item(ctx);
        let bidder = self.random_user(ctx);
        let price = ctx.generator.price();

        let bid_count = conn
            .query_scalar(&Statement::new("SELECT BID_COUNT FROM ITEM WHERE ITEMID = ?").bind(item.as_str()))
            .await?;
        ctx.counters.record(ApiCall::Query);
        let Some(bid_count) = bid_count else {
            return Ok(());
        };

        let updated = conn
            .execute(
                &Statement::new("UPDATE ITEM SET BID_PRICE = ?, BID_COUNT = ? WHERE ITEMID = ? AND BID_PRICE < ?")
                    .bind(price)
                    .bind(bid_count + 1)
                    .bind(item.as_str())
                    .bind(price),
            )
            .await?;
        ctx.counters.record(ApiCall::Update);

        if updated > 0 {
            let statement = Statement::new("INSERT INTO BID (ITEMID, BIDERID, BID_PRICE, BID_TIME) VALUES (?, ?, ?, ?)")
                .bind(item)
                .bind(bidder)
                .bind(price)
                .bind(timestamp(0));
            conn.execute(&statement).await?;
            ctx.counters.record(ApiCall::Insert);
        }
        Ok(())
    }

    async fn view_item(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext) -> Result<(), DbError> {
        let item = self.random_item(ctx);
        conn.query_rows(
            &Statement::new(
                "SELECT SELLERID, DESCRIPTION, BID_PRICE, START_TIME, END_TIME, BID_COUNT FROM ITEM WHERE ITEMID = ?",
            )
            .bind(item),
        )
        .await?;
        ctx.counters.record(ApiCall::Query);
        Ok(())
    }

    /// Relist a random item with a new description, price and period
    async fn update_item(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext) -> Result<(), DbError> {
        let item = self.random_item(ctx);
        let found = conn
            .query_rows(&Statement::new("SELECT BID_PRICE FROM ITEM WHERE ITEMID = ?").bind(item.as_str()))
            .await?;
        ctx.counters.record(ApiCall::Query);
        if found == 0 {
            return Ok(());
        }

        let statement = Statement::new(
            "UPDATE ITEM SET DESCRIPTION = ?, BID_PRICE = ?, START_TIME = ?, END_TIME = ? WHERE ITEMID = ?",
        )
        .bind(ctx.generator.string(100))
        .bind(ctx.generator.price())
        .bind(timestamp(0))
        .bind(timestamp(LISTING_DAYS))
        .bind(item);
        conn.execute(&statement).await?;
        ctx.counters.record(ApiCall::Update);
        Ok(())
    }

    async fn bid_history(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext) -> Result<(), DbError> {
        let item = self.random_item(ctx);
        conn.query_rows(
            &Statement::new("SELECT BIDERID, BID_PRICE, BID_TIME FROM BID WHERE ITEMID = ? ORDER BY BID_TIME DESC")
                .bind(item),
        )
        .await?;
        ctx.counters.record(ApiCall::Query);
        Ok(())
    }
}

#[async_trait]
impl Workload for AuctionWorkload {
    fn name(&self) -> &'static str {
        "auction"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["atcj2"]
    }

    fn description(&self) -> &'static str {
        "Online auction: registrations, items, bids and bid history"
    }

    fn schema(&self) -> &'static [&'static str] {
        SCHEMA
    }

    async fn action(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext) -> Result<(), DbError> {
        if !ctx.seeded {
            return self.seed(conn, ctx).await;
        }

        match ctx.generator.int(1, 5) {
            1 => {
                if bump(ctx, BID) <= ctx.max_rows {
                    self.bid(conn, ctx).await?;
                }
            }
            2 => {
                if bump(ctx, ITEM) <= ctx.max_rows {
                    self.put(conn, ctx).await?;
                }
            }
            3 => self.view_item(conn, ctx).await?,
            4 => self.update_item(conn, ctx).await?,
            _ => self.bid_history(conn, ctx).await?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionFactory, SqlxConnectionFactory};
    use crate::testing::{test_context, ScriptedConnection};
    use crate::workload::prepare_schema;
    use dots_config::DatabaseConfig;
    use std::time::Duration;

    #[tokio::test]
    async fn test_seed_fills_empty_tables() {
        let workload = AuctionWorkload;
        let (mut ctx, _sink) = test_context(1000);
        // Every COUNT(*) and BID_COUNT lookup answers 0
        let mut conn = ScriptedConnection::new().with_scalar(Some(0));

        workload.action(&mut conn, &mut ctx).await.unwrap();

        assert!(ctx.seeded);
        assert_eq!(tally(&ctx, REGISTRY), SEED_USERS);
        assert_eq!(tally(&ctx, ITEM), SEED_ITEMS);
        assert_eq!(tally(&ctx, BID), SEED_BIDS);

        let snapshot = ctx.counters.snapshot();
        // users + items + one BID per accepted bid
        assert_eq!(snapshot.inserts, SEED_USERS + SEED_ITEMS + SEED_BIDS);
        assert_eq!(snapshot.updates, SEED_BIDS);
        assert_eq!(snapshot.queries, 3 + SEED_BIDS);
    }

    #[tokio::test]
    async fn test_seed_skips_populated_tables() {
        let workload = AuctionWorkload;
        let (mut ctx, _sink) = test_context(1000);
        let mut conn = ScriptedConnection::new().with_scalar(Some(500));

        workload.action(&mut conn, &mut ctx).await.unwrap();

        assert_eq!(tally(&ctx, ITEM), 500);
        assert_eq!(ctx.counters.snapshot().inserts, 0);
        assert_eq!(conn.executed().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seed_stops_on_termination() {
        let workload = AuctionWorkload;
        let (mut ctx, _sink) = test_context(1000);
        let termination = ctx.termination.clone();
        let conn = ScriptedConnection::new()
            .with_scalar(Some(0))
            .with_latency(Duration::from_millis(10));

        // 1000 users at 10ms each; stop while they are still going in
        let mut worker_conn = conn.clone();
        let seeding = tokio::spawn(async move {
            workload.action(&mut worker_conn, &mut ctx).await.unwrap();
            ctx
        });
        tokio::time::sleep(Duration::from_secs(5)).await;
        termination.request(dots_core::TerminationCause::Operator);
        let ctx = seeding.await.unwrap();

        assert!(!ctx.seeded);
        let executed = conn.executed();
        let users = executed.iter().filter(|sql| sql.starts_with("INSERT INTO REGISTRY")).count();
        assert!(users > 0 && users < SEED_USERS as usize);
        assert!(!executed.iter().any(|sql| sql.starts_with("INSERT INTO ITEM")));
    }

    #[tokio::test]
    async fn test_bid_on_missing_item_is_noop() {
        let workload = AuctionWorkload;
        let (mut ctx, _sink) = test_context(1000);
        ctx.tallies.insert(ITEM, 10);
        ctx.tallies.insert(REGISTRY, 10);
        let mut conn = ScriptedConnection::new().with_scalar(None);

        workload.bid(&mut conn, &mut ctx).await.unwrap();

        assert_eq!(ctx.counters.get(ApiCall::Query), 1);
        assert_eq!(ctx.counters.get(ApiCall::Update), 0);
    }

    #[tokio::test]
    async fn test_against_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", dir.path().join("auction.db").display()),
            ..Default::default()
        };
        let factory = SqlxConnectionFactory::new(&config).unwrap();
        let mut conn = factory.create_connection().await.unwrap();

        let workload = AuctionWorkload;
        prepare_schema(&workload, conn.as_mut()).await.unwrap();

        let (mut ctx, _sink) = test_context(5000);
        for _ in 0..50 {
            workload.action(conn.as_mut(), &mut ctx).await.unwrap();
        }

        let users = conn
            .query_scalar(&Statement::new("SELECT COUNT(*) FROM REGISTRY"))
            .await
            .unwrap();
        assert_eq!(users, Some(SEED_USERS as i64));

        let items = conn
            .query_scalar(&Statement::new("SELECT COUNT(*) FROM ITEM"))
            .await
            .unwrap()
            .unwrap();
        assert!(items >= SEED_ITEMS as i64);
        assert_eq!(ctx.counters.failures(), 0);

        conn.close().await.unwrap();
    }
}
