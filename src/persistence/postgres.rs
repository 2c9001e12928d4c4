use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::Result;

use super::{TradeRecord, TradeStore};

/// Postgres-backed trade store.
///
/// Pool sizing is the only concurrency control persistence needs; handlers
/// never await each other on the pool.
pub struct PostgresTradeStore {
    pool: PgPool,
}

impl PostgresTradeStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        info!(max_connections = config.max_connections, "database pool ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TradeStore for PostgresTradeStore {
    async fn save_trade_record(
        &self,
        record: &TradeRecord,
        fill_time: DateTime<Utc>,
        stop_price: Option<Decimal>,
        target_price: Option<Decimal>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO new_trades (
                algo_run_id, symbol, operation, qty, price,
                indicators, tstamp, stop_price, target_price
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.run_id)
        .bind(&record.symbol)
        .bind(&record.operation)
        .bind(record.qty as i64)
        .bind(record.price)
        .bind(&record.indicators)
        .bind(fill_time)
        .bind(stop_price)
        .bind(target_price)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn register_run(&self, run_id: Uuid, strategy: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO algo_runs (run_id, strategy, start_time)
            VALUES ($1, $2, NOW())
            "#,
        )
        .bind(run_id)
        .bind(strategy)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_run_end(&self, run_id: Uuid, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE algo_runs
            SET end_time = NOW(), end_reason = $2
            WHERE run_id = $1
            "#,
        )
        .bind(run_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
