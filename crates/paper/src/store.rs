use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{CustomData, Result, Trade};

use crate::report::ClosedTrade;

/// Write-through record of a replay's positions and their custom data.
///
/// The host keeps the live position in memory and writes every change here;
/// nothing is read back during a run. A finished run can be inspected through
/// `load_custom_data` or the SQLite tables.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Insert or update the open position.
    async fn save_trade(&self, strategy: &str, trade: &Trade) -> Result<()>;

    /// Stored bag for `trade_id`; empty when nothing was saved.
    async fn load_custom_data(&self, trade_id: &str) -> Result<CustomData>;

    /// Replace the stored bag for `trade_id`.
    async fn save_custom_data(&self, trade_id: &str, data: &CustomData) -> Result<()>;

    async fn close_trade(&self, closed: &ClosedTrade) -> Result<()>;
}

// ─── SQLite ──────────────────────────────────────────────────────────────────

pub struct SqliteTradeStore {
    db: SqlitePool,
}

impl SqliteTradeStore {
    /// Connect and run pending migrations.
    ///
    /// The pool holds a single connection so `sqlite::memory:` keeps one
    /// database for the whole run.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(database_url)
            .await?;
        sqlx::migrate!("../../migrations").run(&db).await?;
        info!(url = %database_url, "Trade store ready");
        Ok(Self { db })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }
}

#[async_trait]
impl TradeStore for SqliteTradeStore {
    async fn save_trade(&self, strategy: &str, trade: &Trade) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trades (id, strategy, pair, direction, open_rate, open_date,
                                stake_amount, amount, leverage, enter_tag)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                open_rate    = excluded.open_rate,
                stake_amount = excluded.stake_amount,
                amount       = excluded.amount
            "#,
        )
        .bind(&trade.id)
        .bind(strategy)
        .bind(&trade.pair)
        .bind(trade.direction.to_string())
        .bind(trade.open_rate)
        .bind(trade.open_date.to_rfc3339())
        .bind(trade.stake_amount)
        .bind(trade.amount)
        .bind(trade.leverage)
        .bind(trade.enter_tag.as_deref())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn load_custom_data(&self, trade_id: &str) -> Result<CustomData> {
        let rows = sqlx::query("SELECT key, value FROM trade_custom_data WHERE trade_id = ?1")
            .bind(trade_id)
            .fetch_all(&self.db)
            .await?;

        let mut values = BTreeMap::new();
        for row in rows {
            let key: String = row.try_get("key")?;
            let raw: String = row.try_get("value")?;
            values.insert(key, serde_json::from_str(&raw)?);
        }
        Ok(CustomData::from_map(values))
    }

    async fn save_custom_data(&self, trade_id: &str, data: &CustomData) -> Result<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM trade_custom_data WHERE trade_id = ?1")
            .bind(trade_id)
            .execute(&mut *tx)
            .await?;
        for (key, value) in data.iter() {
            sqlx::query("INSERT INTO trade_custom_data (trade_id, key, value) VALUES (?1, ?2, ?3)")
                .bind(trade_id)
                .bind(key)
                .bind(serde_json::to_string(value)?)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!(trade_id, keys = data.len(), "Custom data persisted");
        Ok(())
    }

    async fn close_trade(&self, closed: &ClosedTrade) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE trades
            SET is_open = 0, close_rate = ?2, close_date = ?3,
                exit_reason = ?4, exit_tag = ?5, profit_abs = ?6
            WHERE id = ?1
            "#,
        )
        .bind(&closed.trade_id)
        .bind(closed.close_rate)
        .bind(closed.close_date.to_rfc3339())
        .bind(closed.reason.as_str())
        .bind(closed.exit_tag.as_deref())
        .bind(closed.profit_abs)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

// ─── In-memory ───────────────────────────────────────────────────────────────

/// Store for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryTradeStore {
    open: RwLock<HashMap<String, (String, Trade)>>,
    custom: RwLock<HashMap<String, CustomData>>,
    closed: RwLock<Vec<ClosedTrade>>,
}

impl MemoryTradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open_trades(&self) -> Vec<Trade> {
        self.open.read().await.values().map(|(_, t)| t.clone()).collect()
    }

    pub async fn closed_trades(&self) -> Vec<ClosedTrade> {
        self.closed.read().await.clone()
    }
}

#[async_trait]
impl TradeStore for MemoryTradeStore {
    async fn save_trade(&self, strategy: &str, trade: &Trade) -> Result<()> {
        self.open
            .write()
            .await
            .insert(trade.id.clone(), (strategy.to_string(), trade.clone()));
        Ok(())
    }

    async fn load_custom_data(&self, trade_id: &str) -> Result<CustomData> {
        Ok(self.custom.read().await.get(trade_id).cloned().unwrap_or_default())
    }

    async fn save_custom_data(&self, trade_id: &str, data: &CustomData) -> Result<()> {
        let mut stored = data.clone();
        stored.take_dirty();
        self.custom.write().await.insert(trade_id.to_string(), stored);
        Ok(())
    }

    async fn close_trade(&self, closed: &ClosedTrade) -> Result<()> {
        self.open.write().await.remove(&closed.trade_id);
        self.closed.write().await.push(closed.clone());
        Ok(())
    }
}
