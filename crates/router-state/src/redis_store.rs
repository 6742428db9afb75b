//! Shared state backend on Redis.
//!
//! The sliding window is a pair of sorted sets per provider, scored by
//! millisecond timestamps:
//!
//! - `usage:rpm:{provider}`: one member per sample, `"{ts}:{nonce}"`
//! - `usage:tpm:{provider}`: one member per sample, `"{ts}:{tokens}:{nonce}"`
//!
//! Every mutation runs as a single atomic MULTI/EXEC pipeline: purge
//! members scored strictly below `now - window`, add the new sample, and
//! refresh a key TTL of twice the window as a safety net. Reads use the
//! same `[now - window, now]` range so per-instance clock skew cannot
//! double-count. Session bindings and circuit markers are plain keys with
//! native TTLs.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;
use uuid::Uuid;

use crate::store::{StateError, StateResult, StateStore, Usage};

fn rpm_key(provider: &str) -> String {
    format!("usage:rpm:{provider}")
}

fn tpm_key(provider: &str) -> String {
    format!("usage:tpm:{provider}")
}

fn circuit_key(provider: &str) -> String {
    format!("circuit:{provider}")
}

fn session_key(session_id: &str) -> String {
    format!("session:{session_id}")
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Token count from a `"{ts}:{tokens}:{nonce}"` member.
fn decode_tpm_member(member: &str) -> StateResult<u64> {
    member
        .split(':')
        .nth(1)
        .and_then(|tokens| tokens.parse::<u64>().ok())
        .ok_or_else(|| StateError::Corrupt(format!("bad tpm member '{member}'")))
}

/// Multi-instance state backend on Redis.
pub struct RedisStateStore {
    conn: ConnectionManager,
}

impl RedisStateStore {
    /// Connect to the store at `url` (e.g. `redis://localhost:6379`).
    ///
    /// # Errors
    /// Returns [`StateError::Backend`] when the URL is invalid or the
    /// initial connection fails.
    pub async fn connect(url: &str) -> StateResult<Self> {
        let client = Client::open(url).map_err(StateError::from)?;
        let conn = ConnectionManager::new(client).await?;
        debug!(url = %url, "connected to shared state store");
        Ok(Self { conn })
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn record_request(
        &self,
        provider: &str,
        tokens: u64,
        window: Duration,
    ) -> StateResult<()> {
        let now = now_ms();
        let cutoff = now.saturating_sub(window.as_millis() as u64);
        let nonce = Uuid::new_v4().simple().to_string();
        let expiry = (2 * window.as_secs().max(1)) as i64;

        let rpm = rpm_key(provider);
        let tpm = tpm_key(provider);

        // Strictly-below purge bound: a sample scored exactly at the window
        // edge stays in.
        let mut pipeline = redis::pipe();
        pipeline
            .atomic()
            .zrembyscore(&rpm, "-inf", format!("({cutoff}"))
            .ignore()
            .zadd(&rpm, format!("{now}:{nonce}"), now)
            .ignore()
            .expire(&rpm, expiry)
            .ignore()
            .zrembyscore(&tpm, "-inf", format!("({cutoff}"))
            .ignore()
            .zadd(&tpm, format!("{now}:{tokens}:{nonce}"), now)
            .ignore()
            .expire(&tpm, expiry)
            .ignore();

        let mut conn = self.conn.clone();
        let () = pipeline.query_async(&mut conn).await?;
        Ok(())
    }

    async fn get_usage(&self, provider: &str, window: Duration) -> StateResult<Usage> {
        let now = now_ms();
        let cutoff = now.saturating_sub(window.as_millis() as u64);
        let mut conn = self.conn.clone();

        let rpm: u64 = conn.zcount(rpm_key(provider), cutoff, now).await?;
        let members: Vec<String> = conn
            .zrangebyscore(tpm_key(provider), cutoff, now)
            .await?;

        let mut tpm = 0u64;
        for member in &members {
            tpm += decode_tpm_member(member)?;
        }
        Ok(Usage { rpm, tpm })
    }

    async fn get_session_provider(&self, session_id: &str) -> StateResult<Option<String>> {
        let mut conn = self.conn.clone();
        let provider: Option<String> = conn.get(session_key(session_id)).await?;
        Ok(provider)
    }

    async fn set_session_provider(
        &self,
        session_id: &str,
        provider: &str,
        ttl: Duration,
    ) -> StateResult<()> {
        let mut conn = self.conn.clone();
        let () = conn
            .set_ex(session_key(session_id), provider, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn set_circuit_open(&self, provider: &str, cooldown: Duration) -> StateResult<()> {
        let mut conn = self.conn.clone();
        let () = conn
            .set_ex(circuit_key(provider), 1u8, cooldown.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn circuit_is_open(&self, provider: &str) -> StateResult<bool> {
        let mut conn = self.conn.clone();
        let open: bool = conn.exists(circuit_key(provider)).await?;
        Ok(open)
    }

    async fn close(&self) -> StateResult<()> {
        // The connection manager has no explicit shutdown; dropping the
        // store closes the multiplexed connection.
        Ok(())
    }
}
