//! PostgreSQL swap store

use super::types::{
    QueryOrder, RegisteredSwap, ResultGuard, ResultUpdate, StatusQuery, SwapKey, SwapResult,
    SwapStatus, SwapUpdate,
};
use super::SwapStore;
use crate::chain::{SwapInfo, SwapType};
use crate::config::DatabaseConfig;
use crate::error::{RouterError, RouterResult};

use async_trait::async_trait;
use ethers::types::U256;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use std::collections::HashMap;
use tracing::{debug, info};

const SWAP_COLUMNS: &str = "from_chain_id, tx_id, log_index, swap_type, swap_info, value, \
     from_addr, bind, to_chain_id, status, init_time, updated_at, memo";

const RESULT_COLUMNS: &str = "from_chain_id, tx_id, log_index, swap_type, swap_info, value, \
     from_addr, bind, to_chain_id, swap_tx, old_swap_txs, swap_height, swap_time, swap_value, \
     swap_nonce, mpc, status, init_time, updated_at, memo";

/// Swap store persisted in PostgreSQL
pub struct PgSwapStore {
    pool: PgPool,
}

impl PgSwapStore {
    /// Connect a pool using the database settings
    pub async fn connect(config: &DatabaseConfig) -> RouterResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist
    pub async fn run_migrations(&self) -> RouterResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS router_swaps (
                from_chain_id BIGINT NOT NULL,
                tx_id VARCHAR(128) NOT NULL,
                log_index INTEGER NOT NULL,
                swap_type VARCHAR(16) NOT NULL,
                swap_info TEXT NOT NULL,
                value TEXT NOT NULL,
                from_addr TEXT NOT NULL,
                bind TEXT NOT NULL,
                to_chain_id BIGINT NOT NULL,
                status INTEGER NOT NULL,
                init_time BIGINT NOT NULL,
                updated_at BIGINT NOT NULL,
                memo TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (from_chain_id, tx_id, log_index)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_router_swaps_status
            ON router_swaps (status, updated_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS router_swap_results (
                from_chain_id BIGINT NOT NULL,
                tx_id VARCHAR(128) NOT NULL,
                log_index INTEGER NOT NULL,
                swap_type VARCHAR(16) NOT NULL,
                swap_info TEXT NOT NULL,
                value TEXT NOT NULL,
                from_addr TEXT NOT NULL,
                bind TEXT NOT NULL,
                to_chain_id BIGINT NOT NULL,
                swap_tx VARCHAR(128) NOT NULL DEFAULT '',
                old_swap_txs TEXT[] NOT NULL DEFAULT '{}',
                swap_height BIGINT NOT NULL DEFAULT 0,
                swap_time BIGINT NOT NULL DEFAULT 0,
                swap_value TEXT NOT NULL DEFAULT '0',
                swap_nonce BIGINT NOT NULL DEFAULT 0,
                mpc VARCHAR(64) NOT NULL DEFAULT '',
                status INTEGER NOT NULL,
                init_time BIGINT NOT NULL,
                updated_at BIGINT NOT NULL,
                memo TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (from_chain_id, tx_id, log_index)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_router_results_status
            ON router_swap_results (status, updated_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_router_results_nonce
            ON router_swap_results (to_chain_id, mpc, swap_nonce)
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Database migrations complete");
        Ok(())
    }

    async fn fetch_swaps(
        &self,
        mut builder: QueryBuilder<'_, Postgres>,
    ) -> RouterResult<Vec<RegisteredSwap>> {
        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(swap_from_row).collect()
    }

    async fn fetch_results(
        &self,
        mut builder: QueryBuilder<'_, Postgres>,
    ) -> RouterResult<Vec<SwapResult>> {
        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(result_from_row).collect()
    }
}

fn push_key(builder: &mut QueryBuilder<'_, Postgres>, key: &SwapKey) {
    builder
        .push(" WHERE from_chain_id = ")
        .push_bind(key.from_chain_id as i64)
        .push(" AND tx_id = ")
        .push_bind(key.tx_id.clone())
        .push(" AND log_index = ")
        .push_bind(key.log_index as i32);
}

fn push_status_query(builder: &mut QueryBuilder<'_, Postgres>, query: &StatusQuery) {
    builder
        .push(" WHERE status = ")
        .push_bind(query.status.code() as i32)
        .push(" AND updated_at >= ")
        .push_bind(query.since);
    if let Some(chain_id) = query.from_chain_id {
        builder
            .push(" AND from_chain_id = ")
            .push_bind(chain_id as i64);
    }
    if let Some(chain_id) = query.to_chain_id {
        builder.push(" AND to_chain_id = ").push_bind(chain_id as i64);
    }
    match query.order {
        QueryOrder::InitTime => builder.push(" ORDER BY init_time"),
        QueryOrder::SwapNonce => builder.push(" ORDER BY swap_nonce"),
    };
    builder.push(" LIMIT ").push_bind(query.limit as i64);
}

fn parse_u256(column: &str, value: &str) -> RouterResult<U256> {
    U256::from_dec_str(value)
        .map_err(|e| RouterError::Store(format!("bad {} value '{}': {}", column, value, e)))
}

fn parse_status(code: i32) -> RouterResult<SwapStatus> {
    u16::try_from(code)
        .ok()
        .and_then(SwapStatus::from_code)
        .ok_or_else(|| RouterError::Store(format!("unknown swap status {}", code)))
}

fn parse_swap_type(value: &str) -> RouterResult<SwapType> {
    SwapType::parse(value).ok_or_else(|| RouterError::Store(format!("unknown swap type {}", value)))
}

fn encode_swap_info(info: &SwapInfo) -> RouterResult<String> {
    serde_json::to_string(info).map_err(|e| RouterError::Store(e.to_string()))
}

fn decode_swap_info(value: &str) -> RouterResult<SwapInfo> {
    serde_json::from_str(value).map_err(|e| RouterError::Store(format!("bad swap info: {}", e)))
}

fn key_from_row(row: &PgRow) -> RouterResult<SwapKey> {
    Ok(SwapKey {
        from_chain_id: row.try_get::<i64, _>("from_chain_id")? as u64,
        tx_id: row.try_get("tx_id")?,
        log_index: row.try_get::<i32, _>("log_index")? as u32,
    })
}

fn swap_from_row(row: &PgRow) -> RouterResult<RegisteredSwap> {
    Ok(RegisteredSwap {
        key: key_from_row(row)?,
        swap_type: parse_swap_type(row.try_get("swap_type")?)?,
        swap_info: decode_swap_info(row.try_get("swap_info")?)?,
        value: parse_u256("value", row.try_get("value")?)?,
        from: row.try_get("from_addr")?,
        bind: row.try_get("bind")?,
        to_chain_id: row.try_get::<i64, _>("to_chain_id")? as u64,
        status: parse_status(row.try_get("status")?)?,
        init_time: row.try_get("init_time")?,
        timestamp: row.try_get("updated_at")?,
        memo: row.try_get("memo")?,
    })
}

fn result_from_row(row: &PgRow) -> RouterResult<SwapResult> {
    Ok(SwapResult {
        key: key_from_row(row)?,
        swap_type: parse_swap_type(row.try_get("swap_type")?)?,
        swap_info: decode_swap_info(row.try_get("swap_info")?)?,
        value: parse_u256("value", row.try_get("value")?)?,
        from: row.try_get("from_addr")?,
        bind: row.try_get("bind")?,
        to_chain_id: row.try_get::<i64, _>("to_chain_id")? as u64,
        swap_tx: row.try_get("swap_tx")?,
        old_swap_txs: row.try_get("old_swap_txs")?,
        swap_height: row.try_get::<i64, _>("swap_height")? as u64,
        swap_time: row.try_get::<i64, _>("swap_time")? as u64,
        swap_value: parse_u256("swap_value", row.try_get("swap_value")?)?,
        swap_nonce: row.try_get::<i64, _>("swap_nonce")? as u64,
        mpc: row.try_get("mpc")?,
        status: parse_status(row.try_get("status")?)?,
        init_time: row.try_get("init_time")?,
        timestamp: row.try_get("updated_at")?,
        memo: row.try_get("memo")?,
    })
}

#[async_trait]
impl SwapStore for PgSwapStore {
    async fn insert_swap(&self, swap: &RegisteredSwap) -> RouterResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO router_swaps
                (from_chain_id, tx_id, log_index, swap_type, swap_info, value,
                 from_addr, bind, to_chain_id, status, init_time, updated_at, memo)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(swap.key.from_chain_id as i64)
        .bind(&swap.key.tx_id)
        .bind(swap.key.log_index as i32)
        .bind(swap.swap_type.as_str())
        .bind(encode_swap_info(&swap.swap_info)?)
        .bind(swap.value.to_string())
        .bind(&swap.from)
        .bind(&swap.bind)
        .bind(swap.to_chain_id as i64)
        .bind(swap.status.code() as i32)
        .bind(swap.init_time)
        .bind(swap.timestamp)
        .bind(&swap.memo)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RouterError::AlreadyExists {
                key: swap.key.to_string(),
            });
        }
        debug!("Stored swap {}", swap.key);
        Ok(())
    }

    async fn insert_result(&self, result: &SwapResult) -> RouterResult<()> {
        let outcome = sqlx::query(
            r#"
            INSERT INTO router_swap_results
                (from_chain_id, tx_id, log_index, swap_type, swap_info, value,
                 from_addr, bind, to_chain_id, swap_tx, old_swap_txs, swap_height,
                 swap_time, swap_value, swap_nonce, mpc, status, init_time, updated_at, memo)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(result.key.from_chain_id as i64)
        .bind(&result.key.tx_id)
        .bind(result.key.log_index as i32)
        .bind(result.swap_type.as_str())
        .bind(encode_swap_info(&result.swap_info)?)
        .bind(result.value.to_string())
        .bind(&result.from)
        .bind(&result.bind)
        .bind(result.to_chain_id as i64)
        .bind(&result.swap_tx)
        .bind(&result.old_swap_txs)
        .bind(result.swap_height as i64)
        .bind(result.swap_time as i64)
        .bind(result.swap_value.to_string())
        .bind(result.swap_nonce as i64)
        .bind(&result.mpc)
        .bind(result.status.code() as i32)
        .bind(result.init_time)
        .bind(result.timestamp)
        .bind(&result.memo)
        .execute(&self.pool)
        .await?;

        if outcome.rows_affected() == 0 {
            return Err(RouterError::AlreadyExists {
                key: result.key.to_string(),
            });
        }
        debug!("Stored swap result {}", result.key);
        Ok(())
    }

    async fn get_swap(&self, key: &SwapKey) -> RouterResult<Option<RegisteredSwap>> {
        let mut builder = QueryBuilder::new(format!("SELECT {} FROM router_swaps", SWAP_COLUMNS));
        push_key(&mut builder, key);
        Ok(self.fetch_swaps(builder).await?.into_iter().next())
    }

    async fn get_result(&self, key: &SwapKey) -> RouterResult<Option<SwapResult>> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {} FROM router_swap_results",
            RESULT_COLUMNS
        ));
        push_key(&mut builder, key);
        Ok(self.fetch_results(builder).await?.into_iter().next())
    }

    async fn find_first_swap(
        &self,
        from_chain_id: u64,
        tx_id: &str,
    ) -> RouterResult<Option<RegisteredSwap>> {
        let mut builder = QueryBuilder::new(format!("SELECT {} FROM router_swaps", SWAP_COLUMNS));
        builder
            .push(" WHERE from_chain_id = ")
            .push_bind(from_chain_id as i64)
            .push(" AND tx_id = ")
            .push_bind(tx_id.to_lowercase())
            .push(" ORDER BY log_index LIMIT 1");
        Ok(self.fetch_swaps(builder).await?.into_iter().next())
    }

    async fn find_first_result(
        &self,
        from_chain_id: u64,
        tx_id: &str,
    ) -> RouterResult<Option<SwapResult>> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {} FROM router_swap_results",
            RESULT_COLUMNS
        ));
        builder
            .push(" WHERE from_chain_id = ")
            .push_bind(from_chain_id as i64)
            .push(" AND tx_id = ")
            .push_bind(tx_id.to_lowercase())
            .push(" ORDER BY log_index LIMIT 1");
        Ok(self.fetch_results(builder).await?.into_iter().next())
    }

    async fn update_swap(
        &self,
        key: &SwapKey,
        update: &SwapUpdate,
        expected_status: Option<SwapStatus>,
    ) -> RouterResult<bool> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE router_swaps SET updated_at = ");
        builder.push_bind(update.timestamp);
        if let Some(status) = update.status.filter(|s| *s != SwapStatus::KeepStatus) {
            builder.push(", status = ").push_bind(status.code() as i32);
        }
        if let Some(memo) = &update.memo {
            builder.push(", memo = ").push_bind(memo.clone());
        }
        push_key(&mut builder, key);
        if let Some(status) = expected_status {
            builder.push(" AND status = ").push_bind(status.code() as i32);
        }

        let outcome = builder.build().execute(&self.pool).await?;
        Ok(outcome.rows_affected() > 0)
    }

    async fn update_result(
        &self,
        key: &SwapKey,
        update: &ResultUpdate,
        guard: &ResultGuard,
    ) -> RouterResult<bool> {
        let mut builder =
            QueryBuilder::<Postgres>::new("UPDATE router_swap_results SET updated_at = ");
        builder.push_bind(update.timestamp);
        if let Some(status) = update.status.filter(|s| *s != SwapStatus::KeepStatus) {
            builder.push(", status = ").push_bind(status.code() as i32);
        }
        if let Some(mpc) = &update.mpc {
            builder.push(", mpc = ").push_bind(mpc.clone());
        }
        if let Some(tx) = &update.swap_tx {
            builder.push(", swap_tx = ").push_bind(tx.clone());
        }
        if let Some(old) = &update.old_swap_txs {
            builder.push(", old_swap_txs = ").push_bind(old.clone());
        }
        if let Some(height) = update.swap_height {
            builder.push(", swap_height = ").push_bind(height as i64);
        }
        if let Some(time) = update.swap_time {
            builder.push(", swap_time = ").push_bind(time as i64);
        }
        if let Some(value) = update.swap_value {
            builder.push(", swap_value = ").push_bind(value.to_string());
        }
        if let Some(nonce) = update.swap_nonce {
            builder.push(", swap_nonce = ").push_bind(nonce as i64);
        }
        if let Some(memo) = &update.memo {
            builder.push(", memo = ").push_bind(memo.clone());
        }

        push_key(&mut builder, key);
        if let Some(status) = guard.status {
            builder.push(" AND status = ").push_bind(status.code() as i32);
        }
        if let Some(nonce) = guard.swap_nonce {
            builder.push(" AND swap_nonce = ").push_bind(nonce as i64);
        }
        if let Some(tx) = &guard.swap_tx {
            builder
                .push(" AND LOWER(swap_tx) = ")
                .push_bind(tx.to_lowercase());
        }

        let outcome = builder.build().execute(&self.pool).await?;
        Ok(outcome.rows_affected() > 0)
    }

    async fn query_swaps(&self, query: &StatusQuery) -> RouterResult<Vec<RegisteredSwap>> {
        let mut builder = QueryBuilder::new(format!("SELECT {} FROM router_swaps", SWAP_COLUMNS));
        push_status_query(&mut builder, query);
        self.fetch_swaps(builder).await
    }

    async fn query_results(&self, query: &StatusQuery) -> RouterResult<Vec<SwapResult>> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {} FROM router_swap_results",
            RESULT_COLUMNS
        ));
        push_status_query(&mut builder, query);
        self.fetch_results(builder).await
    }

    async fn max_swap_nonce(&self, to_chain_id: u64, mpc: &str) -> RouterResult<Option<u64>> {
        let row = sqlx::query(
            r#"
            SELECT MAX(swap_nonce) AS max_nonce
            FROM router_swap_results
            WHERE to_chain_id = $1 AND mpc = $2
            "#,
        )
        .bind(to_chain_id as i64)
        .bind(mpc.to_lowercase())
        .fetch_one(&self.pool)
        .await?;

        Ok(row
            .try_get::<Option<i64>, _>("max_nonce")?
            .map(|n| n as u64))
    }

    async fn count_by_status(&self) -> RouterResult<Vec<(SwapStatus, u64)>> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS total FROM router_swaps GROUP BY status
            UNION ALL
            SELECT status, COUNT(*) AS total FROM router_swap_results GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts: HashMap<SwapStatus, u64> = HashMap::new();
        for row in rows {
            let status = parse_status(row.try_get("status")?)?;
            *counts.entry(status).or_default() += row.try_get::<i64, _>("total")? as u64;
        }
        let mut counts: Vec<_> = counts.into_iter().collect();
        counts.sort_by_key(|(status, _)| status.code());
        Ok(counts)
    }

    async fn health_check(&self) -> RouterResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_helpers() {
        assert_eq!(
            parse_u256("value", "1000000000000000000000").unwrap(),
            U256::exp10(21)
        );
        assert!(parse_u256("value", "0x10").is_err());
        assert_eq!(parse_status(256).unwrap(), SwapStatus::Reswapping);
        assert!(parse_status(-1).is_err());
        assert!(parse_status(2).is_err());
        assert_eq!(parse_swap_type("anycall").unwrap(), SwapType::AnyCall);
    }

    #[test]
    fn test_guarded_update_sql() {
        let key = SwapKey::new(1, "0xAB", 2);
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE router_swap_results SET updated_at = ");
        builder.push_bind(1i64);
        push_key(&mut builder, &key);
        assert_eq!(
            builder.sql(),
            "UPDATE router_swap_results SET updated_at = $1 WHERE from_chain_id = $2 AND tx_id = $3 AND log_index = $4"
        );
    }

    #[test]
    fn test_status_query_sql() {
        let query = StatusQuery {
            status: SwapStatus::MatchTxNotStable,
            since: 0,
            from_chain_id: None,
            to_chain_id: Some(56),
            order: QueryOrder::SwapNonce,
            limit: 100,
        };
        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM router_swap_results");
        push_status_query(&mut builder, &query);
        assert_eq!(
            builder.sql(),
            "SELECT * FROM router_swap_results WHERE status = $1 AND updated_at >= $2 AND to_chain_id = $3 ORDER BY swap_nonce LIMIT $4"
        );
    }

    /// Needs a scratch database: `DATABASE_URL=postgres://... cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn test_guarded_result_update_against_postgres() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL not set");
        let store = PgSwapStore::from_pool(PgPool::connect(&url).await.unwrap());
        store.run_migrations().await.unwrap();
        store.health_check().await.unwrap();

        let ts = chrono::Utc::now().timestamp();
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap();
        let key = SwapKey::new(1, &format!("0x{:x}", nanos), 0);
        let swap = RegisteredSwap {
            key: key.clone(),
            swap_type: SwapType::Erc20,
            swap_info: SwapInfo::Erc20 {
                for_native: false,
                for_underlying: false,
                token: "0x3333333333333333333333333333333333333333".into(),
                token_id: "usdc".into(),
                path: vec![],
                amount_out_min: U256::zero(),
            },
            value: U256::exp10(21),
            from: "0x5555555555555555555555555555555555555555".into(),
            bind: "0x6666666666666666666666666666666666666666".into(),
            to_chain_id: 2,
            status: SwapStatus::Processed,
            init_time: ts,
            timestamp: ts,
            memo: String::new(),
        };
        store.insert_swap(&swap).await.unwrap();
        let initial = SwapResult::from_swap(&swap, SwapStatus::MatchTxEmpty, ts);
        store.insert_result(&initial).await.unwrap();

        let assign = ResultUpdate {
            status: Some(SwapStatus::MatchTxNotStable),
            mpc: Some("0x2222222222222222222222222222222222222222".into()),
            swap_tx: Some("0xabcdef".into()),
            swap_nonce: Some(7),
            timestamp: ts,
            ..Default::default()
        };
        let stale = ResultGuard::observed(&initial);
        assert!(store.update_result(&key, &assign, &stale).await.unwrap());

        // same guard again: the row no longer matches what was observed
        let overwrite = ResultUpdate {
            swap_nonce: Some(8),
            ..assign.clone()
        };
        assert!(!store.update_result(&key, &overwrite, &stale).await.unwrap());

        // tx guard compares case-insensitively; KeepStatus leaves the status alone
        let guard = ResultGuard {
            status: None,
            swap_nonce: Some(7),
            swap_tx: Some("0xABCDEF".into()),
        };
        let memo = ResultUpdate {
            status: Some(SwapStatus::KeepStatus),
            memo: Some("checked".into()),
            timestamp: ts + 1,
            ..Default::default()
        };
        assert!(store.update_result(&key, &memo, &guard).await.unwrap());

        let stored = store.get_result(&key).await.unwrap().unwrap();
        assert_eq!(stored.status, SwapStatus::MatchTxNotStable);
        assert_eq!(stored.swap_nonce, 7);
        assert_eq!(stored.swap_tx, "0xabcdef");
        assert_eq!(stored.memo, "checked");
        assert_eq!(stored.value, U256::exp10(21));
    }
}
