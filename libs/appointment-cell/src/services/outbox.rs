use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::services::side_effects::{SideEffect, SideEffectDispatcher};

const DEFAULT_NAMESPACE: &str = "appointment_outbox";
const PROMOTE_BATCH: isize = 16;
const MAX_RETRY_DELAY: Duration = Duration::from_secs(15 * 60);

#[derive(Error, Debug)]
pub enum OutboxError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis pool error: {0}")]
    Pool(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One pending side effect, keyed by appointment and effect kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub effect: SideEffect,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    /// Earliest time the entry may be claimed; set when a retry is scheduled.
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    pub fn new(appointment_id: Uuid, effect: SideEffect) -> Self {
        Self {
            id: Uuid::new_v4(),
            appointment_id,
            effect,
            attempts: 0,
            last_error: None,
            enqueued_at: Utc::now(),
            not_before: None,
        }
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.appointment_id, self.effect)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.not_before.map_or(true, |at| at <= now)
    }
}

#[async_trait]
pub trait OutboxQueue: Send + Sync {
    /// Queues the entry unless one with the same key is already pending.
    /// Returns whether it was queued.
    async fn push(&self, entry: &OutboxEntry) -> Result<bool, OutboxError>;

    /// Claims the next due entry. A claimed entry stays in flight until
    /// `ack` is called for it, so a crash mid-delivery does not lose it.
    async fn pop(&self) -> Result<Option<OutboxEntry>, OutboxError>;

    /// Releases a claimed entry once its outcome has been recorded.
    async fn ack(&self, entry: &OutboxEntry) -> Result<(), OutboxError>;

    async fn dead_letter(&self, entry: &OutboxEntry) -> Result<(), OutboxError>;

    /// Entries waiting to be claimed, including scheduled retries.
    async fn pending(&self) -> Result<usize, OutboxError>;
}

// ==============================================================================
// REDIS QUEUE
// ==============================================================================

/// Durable queue. Ready entries sit in a list, scheduled retries in a sorted
/// set scored by due time, and claimed entries in a processing list until
/// acknowledged.
pub struct RedisOutbox {
    pool: Pool,
    ready_key: String,
    delayed_key: String,
    processing_key: String,
    keys_key: String,
    dead_key: String,
}

impl RedisOutbox {
    pub async fn new(redis_url: &str) -> Result<Self, OutboxError> {
        Self::with_namespace(redis_url, DEFAULT_NAMESPACE).await
    }

    pub async fn with_namespace(redis_url: &str, namespace: &str) -> Result<Self, OutboxError> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| OutboxError::Pool(format!("Failed to create Redis pool: {}", e)))?;

        let mut conn = pool
            .get()
            .await
            .map_err(|e| OutboxError::Pool(format!("Failed to connect to Redis: {}", e)))?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis outbox initialized ({})", namespace);

        Ok(Self {
            pool,
            ready_key: format!("{}:pending", namespace),
            delayed_key: format!("{}:delayed", namespace),
            processing_key: format!("{}:processing", namespace),
            keys_key: format!("{}:pending_keys", namespace),
            dead_key: format!("{}:dead", namespace),
        })
    }

    async fn connection(&self) -> Result<Connection, OutboxError> {
        self.pool.get().await.map_err(|e| OutboxError::Pool(e.to_string()))
    }

    /// Moves entries left in flight by a previous process back to the ready
    /// list. Run before the worker starts; returns how many were recovered.
    pub async fn requeue_in_flight(&self) -> Result<usize, OutboxError> {
        let mut conn = self.connection().await?;
        let mut recovered = 0;

        loop {
            let raw: Option<String> = conn.rpoplpush(&self.processing_key, &self.ready_key).await?;
            let Some(raw) = raw else {
                break;
            };

            match serde_json::from_str::<OutboxEntry>(&raw) {
                Ok(entry) => {
                    let _: () = conn.sadd(&self.keys_key, entry.key()).await?;
                }
                Err(e) => warn!("Recovered an unreadable outbox entry: {}", e),
            }
            recovered += 1;
        }

        if recovered > 0 {
            warn!("Requeued {} outbox entries left in flight", recovered);
        }
        Ok(recovered)
    }

    /// Moves due retries from the delayed set onto the ready list. Each move
    /// is a WATCHed transaction, so concurrent workers promote an entry once.
    async fn promote_due(&self, conn: &mut Connection) -> Result<(), OutboxError> {
        let now = Utc::now().timestamp_millis();

        let _: () = redis::cmd("WATCH").arg(&self.delayed_key).query_async(conn).await?;
        let due: Vec<String> = conn
            .zrangebyscore_limit(&self.delayed_key, "-inf", now, 0, PROMOTE_BATCH)
            .await?;

        if due.is_empty() {
            let _: () = redis::cmd("UNWATCH").query_async(conn).await?;
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for raw in &due {
            pipe.zrem(&self.delayed_key, raw).ignore();
            pipe.lpush(&self.ready_key, raw).ignore();
        }

        let committed: Option<()> = pipe.query_async(conn).await?;
        match committed {
            Some(()) => debug!("Promoted {} scheduled outbox entries", due.len()),
            None => debug!("Another worker promoted scheduled outbox entries"),
        }
        Ok(())
    }
}

#[async_trait]
impl OutboxQueue for RedisOutbox {
    async fn push(&self, entry: &OutboxEntry) -> Result<bool, OutboxError> {
        let mut conn = self.connection().await?;
        let key = entry.key();
        let raw = serde_json::to_string(entry)?;

        loop {
            let _: () = redis::cmd("WATCH").arg(&self.keys_key).query_async(&mut conn).await?;

            let queued: bool = conn.sismember(&self.keys_key, &key).await?;
            if queued {
                let _: () = redis::cmd("UNWATCH").query_async(&mut conn).await?;
                debug!("Outbox entry {} already pending", key);
                return Ok(false);
            }

            let mut pipe = redis::pipe();
            pipe.atomic().sadd(&self.keys_key, &key).ignore();
            match entry.not_before {
                Some(at) if at > Utc::now() => {
                    pipe.zadd(&self.delayed_key, &raw, at.timestamp_millis()).ignore();
                }
                _ => {
                    pipe.lpush(&self.ready_key, &raw).ignore();
                }
            }

            let committed: Option<()> = pipe.query_async(&mut conn).await?;
            if committed.is_some() {
                return Ok(true);
            }
            debug!("Pending keys changed while queueing {}, retrying", key);
        }
    }

    async fn pop(&self) -> Result<Option<OutboxEntry>, OutboxError> {
        let mut conn = self.connection().await?;
        self.promote_due(&mut conn).await?;

        let raw: Option<String> = conn.rpoplpush(&self.ready_key, &self.processing_key).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let entry: OutboxEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                error!("Unreadable outbox entry moved to dead letters: {}", e);
                let _: () = redis::pipe()
                    .atomic()
                    .lrem(&self.processing_key, 1, &raw)
                    .ignore()
                    .lpush(&self.dead_key, &raw)
                    .ignore()
                    .query_async(&mut conn)
                    .await?;
                return Err(e.into());
            }
        };

        let _: () = conn.srem(&self.keys_key, entry.key()).await?;
        Ok(Some(entry))
    }

    async fn ack(&self, entry: &OutboxEntry) -> Result<(), OutboxError> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.lrem(&self.processing_key, 1, serde_json::to_string(entry)?).await?;
        if removed == 0 {
            warn!("Outbox entry {} was not in flight", entry.key());
        }
        Ok(())
    }

    async fn dead_letter(&self, entry: &OutboxEntry) -> Result<(), OutboxError> {
        let mut conn = self.connection().await?;
        let _: () = conn.lpush(&self.dead_key, serde_json::to_string(entry)?).await?;
        Ok(())
    }

    async fn pending(&self) -> Result<usize, OutboxError> {
        let mut conn = self.connection().await?;
        let ready: usize = conn.llen(&self.ready_key).await?;
        let delayed: usize = conn.zcard(&self.delayed_key).await?;
        Ok(ready + delayed)
    }
}

// ==============================================================================
// IN-MEMORY QUEUE
// ==============================================================================

#[derive(Default)]
struct MemoryState {
    pending: VecDeque<OutboxEntry>,
    keys: HashSet<String>,
    in_flight: Vec<OutboxEntry>,
}

/// Process-local queue for development and tests; lost on restart.
#[derive(Default)]
pub struct InMemoryOutbox {
    state: Mutex<MemoryState>,
    dead: Mutex<Vec<OutboxEntry>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn dead_letters(&self) -> Vec<OutboxEntry> {
        self.dead.lock().await.clone()
    }

    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }
}

#[async_trait]
impl OutboxQueue for InMemoryOutbox {
    async fn push(&self, entry: &OutboxEntry) -> Result<bool, OutboxError> {
        let mut state = self.state.lock().await;
        if !state.keys.insert(entry.key()) {
            return Ok(false);
        }
        state.pending.push_back(entry.clone());
        Ok(true)
    }

    async fn pop(&self) -> Result<Option<OutboxEntry>, OutboxError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let Some(index) = state.pending.iter().position(|entry| entry.is_due(now)) else {
            return Ok(None);
        };
        let Some(entry) = state.pending.remove(index) else {
            return Ok(None);
        };

        state.keys.remove(&entry.key());
        state.in_flight.push(entry.clone());
        Ok(Some(entry))
    }

    async fn ack(&self, entry: &OutboxEntry) -> Result<(), OutboxError> {
        let mut state = self.state.lock().await;
        if let Some(index) = state.in_flight.iter().position(|claimed| claimed == entry) {
            state.in_flight.swap_remove(index);
        }
        Ok(())
    }

    async fn dead_letter(&self, entry: &OutboxEntry) -> Result<(), OutboxError> {
        self.dead.lock().await.push(entry.clone());
        Ok(())
    }

    async fn pending(&self) -> Result<usize, OutboxError> {
        Ok(self.state.lock().await.pending.len())
    }
}

// ==============================================================================
// WORKER
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Idle,
    Delivered,
    Retried,
    DeadLettered,
}

/// Drains the outbox, retrying failed effects with exponential backoff until
/// `max_retries` attempts have been made, then parking them as dead letters.
pub struct OutboxWorker {
    queue: Arc<dyn OutboxQueue>,
    dispatcher: Arc<SideEffectDispatcher>,
    max_retries: u32,
    retry_delay: Duration,
    poll_interval: Duration,
    is_shutdown: RwLock<bool>,
}

impl OutboxWorker {
    pub fn new(queue: Arc<dyn OutboxQueue>, dispatcher: Arc<SideEffectDispatcher>, max_retries: u32) -> Self {
        Self {
            queue,
            dispatcher,
            max_retries: max_retries.max(1),
            retry_delay: Duration::from_secs(5),
            poll_interval: Duration::from_millis(500),
            is_shutdown: RwLock::new(false),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Base delay before the first retry; doubled for each further attempt.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    fn backoff(&self, attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempts.saturating_sub(1));
        self.retry_delay.saturating_mul(factor).min(MAX_RETRY_DELAY)
    }

    pub async fn process_next(&self) -> Result<ProcessOutcome, OutboxError> {
        let Some(claimed) = self.queue.pop().await? else {
            return Ok(ProcessOutcome::Idle);
        };

        let outcome = match self.dispatcher.execute_by_id(claimed.appointment_id, claimed.effect).await {
            Ok(()) => {
                debug!("Delivered {}", claimed.key());
                ProcessOutcome::Delivered
            }
            Err(e) => {
                let mut entry = claimed.clone();
                entry.attempts += 1;
                entry.last_error = Some(e.to_string());

                if entry.attempts >= self.max_retries {
                    error!("Giving up on {} after {} attempts: {}", entry.key(), entry.attempts, e);
                    self.queue.dead_letter(&entry).await?;
                    ProcessOutcome::DeadLettered
                } else {
                    let delay = self.backoff(entry.attempts);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        entry.key(),
                        entry.attempts,
                        self.max_retries,
                        delay,
                        e
                    );
                    let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
                    entry.not_before = Some(Utc::now() + chrono::Duration::milliseconds(delay_ms));
                    self.queue.push(&entry).await?;
                    ProcessOutcome::Retried
                }
            }
        };

        self.queue.ack(&claimed).await?;
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub async fn run(&self) {
        info!("Outbox worker started (max retries {}, retry delay {:?})", self.max_retries, self.retry_delay);

        loop {
            if *self.is_shutdown.read().await {
                break;
            }

            match self.process_next().await {
                Ok(ProcessOutcome::Idle) => tokio::time::sleep(self.poll_interval).await,
                Ok(_) => {}
                Err(e) => {
                    error!("Outbox queue error: {}", e);
                    tokio::time::sleep(self.poll_interval * 10).await;
                }
            }
        }

        info!("Outbox worker stopped");
    }

    pub async fn shutdown(&self) {
        *self.is_shutdown.write().await = true;
    }
}
