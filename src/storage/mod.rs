//! Persistence layer.
//!
//! SQLite-backed ticket store. The fingerprint is the primary key, which
//! makes ingestion idempotent at the database level: re-syncing the same
//! export is a sequence of conflicting upserts. The conflict arm only
//! rewrites rows still PENDING, so a settled ticket can never regress to
//! pending when the source re-serves it without outcome hints.

use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::types::{
    BetType, CanonicalBet, SettlementOutcome, TicketError, TicketStatus,
};

const SCHEMA: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS tickets (
    fingerprint      TEXT PRIMARY KEY,
    race_id          TEXT NOT NULL,
    bet_type         TEXT NOT NULL,
    buy_method       TEXT NOT NULL,
    content          TEXT NOT NULL,
    amount_per_point INTEGER NOT NULL,
    total_points     INTEGER NOT NULL,
    total_cost       INTEGER NOT NULL,
    cost_mismatch    INTEGER NOT NULL DEFAULT 0,
    payout           INTEGER NOT NULL DEFAULT 0,
    status           TEXT NOT NULL DEFAULT 'PENDING',
    source           TEXT NOT NULL,
    mode             TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
)
"#,
    "CREATE INDEX IF NOT EXISTS idx_tickets_race_status ON tickets(race_id, status)",
];

/// Ticket store over a SQLite pool.
#[derive(Clone)]
pub struct TicketStore {
    pool: SqlitePool,
}

impl TicketStore {
    /// Connect and ensure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, TicketError> {
        // An in-memory db exists per connection; a pool of one keeps every
        // query on the same database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| TicketError::Storage(format!("connect {database_url}: {e}")))?;

        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&pool).await.map_err(storage_err)?;
        }

        info!(database_url, "Ticket store ready");
        Ok(Self { pool })
    }

    /// Fresh in-memory store, used by tests.
    pub async fn in_memory() -> Result<Self, TicketError> {
        Self::connect("sqlite::memory:").await
    }

    /// Insert or refresh one canonical bet. Returns true when the row was
    /// written, false when an already-settled row blocked the update.
    pub async fn upsert_ticket(&self, bet: &CanonicalBet) -> Result<bool, TicketError> {
        let content = serde_json::to_string(&bet.content)
            .map_err(|e| TicketError::Storage(format!("serialize content: {e}")))?;
        let bet_type = bet
            .bet_type
            .map(|t| t.code().to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO tickets (
                fingerprint, race_id, bet_type, buy_method, content,
                amount_per_point, total_points, total_cost, cost_mismatch,
                payout, status, source, mode, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
            ON CONFLICT(fingerprint) DO UPDATE SET
                race_id = excluded.race_id,
                bet_type = excluded.bet_type,
                buy_method = excluded.buy_method,
                content = excluded.content,
                amount_per_point = excluded.amount_per_point,
                total_points = excluded.total_points,
                total_cost = excluded.total_cost,
                cost_mismatch = excluded.cost_mismatch,
                payout = excluded.payout,
                status = excluded.status,
                source = excluded.source,
                mode = excluded.mode,
                updated_at = excluded.updated_at
            WHERE tickets.status = 'PENDING'
            "#,
        )
        .bind(&bet.fingerprint)
        .bind(&bet.race_id)
        .bind(&bet_type)
        .bind(bet.buy_method.to_string())
        .bind(&content)
        .bind(bet.amount_per_point)
        .bind(bet.total_points)
        .bind(bet.total_cost)
        .bind(bet.cost_mismatch)
        .bind(bet.payout)
        .bind(bet.status.to_string())
        .bind(&bet.source)
        .bind(&bet.mode)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(result.rows_affected() > 0)
    }

    /// Distinct race ids that still have pending tickets.
    pub async fn pending_race_ids(&self) -> Result<Vec<String>, TicketError> {
        let rows = sqlx::query(
            "SELECT DISTINCT race_id FROM tickets WHERE status = 'PENDING' ORDER BY race_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("race_id").map_err(storage_err))
            .collect()
    }

    /// All pending tickets for one race.
    pub async fn pending_for_race(&self, race_id: &str) -> Result<Vec<CanonicalBet>, TicketError> {
        let rows = sqlx::query(
            r#"
            SELECT fingerprint, race_id, bet_type, content, amount_per_point,
                   total_points, total_cost, cost_mismatch, payout, status,
                   source, mode
            FROM tickets
            WHERE race_id = ?1 AND status = 'PENDING'
            ORDER BY fingerprint
            "#,
        )
        .bind(race_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(row_to_bet).collect()
    }

    /// Apply a settlement decision.
    pub async fn record_outcome(&self, outcome: &SettlementOutcome) -> Result<(), TicketError> {
        let result = sqlx::query(
            "UPDATE tickets SET status = ?1, payout = ?2, updated_at = ?3 WHERE fingerprint = ?4",
        )
        .bind(outcome.status.to_string())
        .bind(outcome.payout)
        .bind(Utc::now().to_rfc3339())
        .bind(&outcome.fingerprint)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(
            fingerprint = %outcome.fingerprint,
            status = %outcome.status,
            payout = outcome.payout,
            rows = result.rows_affected(),
            "Outcome recorded"
        );
        Ok(())
    }

    /// Total tickets currently pending, for cycle reports.
    pub async fn pending_count(&self) -> Result<i64, TicketError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM tickets WHERE status = 'PENDING'")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        row.try_get("n").map_err(storage_err)
    }
}

fn storage_err(e: sqlx::Error) -> TicketError {
    TicketError::Storage(e.to_string())
}

fn row_to_bet(row: &sqlx::sqlite::SqliteRow) -> Result<CanonicalBet, TicketError> {
    let bet_type_str: String = row.try_get("bet_type").map_err(storage_err)?;
    let bet_type = bet_type_str.parse::<BetType>().ok();

    let content_str: String = row.try_get("content").map_err(storage_err)?;
    let content = serde_json::from_str(&content_str)
        .map_err(|e| TicketError::Storage(format!("decode content: {e}")))?;

    let status_str: String = row.try_get("status").map_err(storage_err)?;
    let status = status_str
        .parse::<TicketStatus>()
        .map_err(|e| TicketError::Storage(e.to_string()))?;

    Ok(CanonicalBet {
        race_id: row.try_get("race_id").map_err(storage_err)?,
        bet_type,
        buy_method: crate::types::BetContent::buy_method(&content),
        content,
        amount_per_point: row.try_get("amount_per_point").map_err(storage_err)?,
        total_points: row.try_get("total_points").map_err(storage_err)?,
        total_cost: row.try_get("total_cost").map_err(storage_err)?,
        cost_mismatch: row.try_get("cost_mismatch").map_err(storage_err)?,
        payout: row.try_get("payout").map_err(storage_err)?,
        status,
        source: row.try_get("source").map_err(storage_err)?,
        mode: row.try_get("mode").map_err(storage_err)?,
        fingerprint: row.try_get("fingerprint").map_err(storage_err)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
