use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent<T> {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub subject_id: Option<i64>,
    pub payload: T,
}

impl<T> DomainEvent<T> {
    pub fn new(name: impl Into<String>, subject_id: Option<i64>, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            occurred_at: Utc::now(),
            subject_id,
            payload,
        }
    }
}

/// Destination for domain activity events. Engines receive one per call
/// (through [`Activity`]) rather than reaching for a global logger.
pub trait ActivitySink: Send + Sync {
    fn emit(&self, event: Value);
}

pub type EventBus = broadcast::Sender<Value>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<Value>) {
    broadcast::channel(1024)
}

impl ActivitySink for EventBus {
    fn emit(&self, event: Value) {
        // No receivers just means nobody is persisting right now.
        let _ = self.send(event);
    }
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ActivitySink for NoopSink {
    fn emit(&self, _event: Value) {}
}

/// Keeps every event in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Value>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Value> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn names(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|event| event.get("name").and_then(Value::as_str).map(String::from))
            .collect()
    }
}

impl ActivitySink for RecordingSink {
    fn emit(&self, event: Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Request context for activity logging (IP, User-Agent, etc.)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Extract context from Axum request headers
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            });

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self { ip, user_agent }
    }
}

/// Structured activity payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPayload {
    /// The current/new state of the entity
    #[serde(rename = "new")]
    pub current: Value,
    /// The previous state (for update/delete operations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
    pub severity: Severity,
}

/// Per-call handle engines use to emit activity: a sink plus whatever is
/// known about the request that triggered the call.
#[derive(Clone, Copy)]
pub struct Activity<'a> {
    sink: &'a dyn ActivitySink,
    context: Option<&'a RequestContext>,
}

impl<'a> Activity<'a> {
    pub fn new(sink: &'a dyn ActivitySink) -> Self {
        Self { sink, context: None }
    }

    pub fn with_context(mut self, context: &'a RequestContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn record<T: Loggable>(&self, action: &str, entity: &T) {
        self.record_change(action, entity, None);
    }

    /// Emits `<entity_type>.<action>` with the new state and, for updates,
    /// the previous one.
    pub fn record_change<T: Loggable>(&self, action: &str, entity: &T, old_entity: Option<&T>) {
        let event_name = format!("{}.{}", T::entity_type(), action);

        let payload = ActivityPayload {
            current: serde_json::to_value(entity).unwrap_or_default(),
            old: old_entity.map(|e| serde_json::to_value(e).unwrap_or_default()),
            context: self.context.cloned(),
            severity: entity.severity_for_action(action),
        };

        let event = DomainEvent::new(
            event_name,
            Some(entity.subject_id()),
            serde_json::to_value(&payload).unwrap_or_default(),
        );

        tracing::debug!(event = %event.name, subject_id = entity.subject_id(), "activity");
        self.sink.emit(serde_json::to_value(event).unwrap_or_default());
    }
}

fn describe(name: &str) -> &'static str {
    match name {
        "user.created" => "New account provisioned",
        "user.deleted" => "Account deleted",
        "user.password_changed" => "Account password changed",
        "user_role.assigned" => "Role assigned to account",
        "user_role.revoked" => "Role revoked from account",
        "role_permission.granted" => "Permission granted to role",
        "role_permission.revoked" => "Permission revoked from role",
        "user_setting.updated" => "Account setting updated",
        "article.created" => "Article created",
        "article.updated" => "Article updated",
        "article.deleted" => "Article deleted",
        _ => "System event",
    }
}

pub async fn start_activity_listener(mut rx: broadcast::Receiver<Value>, pool: SqlitePool) {
    tracing::info!("Activity listener started");
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Err(e) = persist_event(&pool, &event).await {
                    tracing::error!("Failed to persist activity event: {}", e);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "activity listener lagged; events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::info!("Activity listener stopped");
}

/// Writes one event to the `activity_log` projection and appends it to the
/// hash-chained `event_store`.
pub async fn persist_event(pool: &SqlitePool, event: &Value) -> Result<(), sqlx::Error> {
    let name = event.get("name").and_then(Value::as_str).unwrap_or("unknown");
    let subject_id = event.get("subject_id").and_then(Value::as_i64);
    let occurred_at = event
        .get("occurred_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let severity = event
        .get("payload")
        .and_then(|p| p.get("severity"))
        .and_then(Value::as_str)
        .unwrap_or(Severity::default().as_str());
    let payload = serde_json::to_string(event).unwrap_or_default();

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO activity_log (id, event_name, description, subject_id, occurred_at, properties, severity) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(describe(name))
    .bind(subject_id)
    .bind(occurred_at)
    .bind(&payload)
    .bind(severity)
    .execute(&mut *tx)
    .await?;

    let previous: Option<(i64, String)> =
        sqlx::query_as("SELECT seq, hash FROM event_store ORDER BY seq DESC LIMIT 1")
            .fetch_optional(&mut *tx)
            .await?;

    let prev_hash = previous.as_ref().map(|(_, hash)| hash.clone());
    let seq = previous.map(|(seq, _)| seq + 1).unwrap_or(1);
    let hash = chain_hash(prev_hash.as_deref(), &payload);

    sqlx::query(
        "INSERT INTO event_store (id, seq, event_name, occurred_at, subject_id, payload, severity, prev_hash, hash) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(seq)
    .bind(name)
    .bind(occurred_at)
    .bind(subject_id)
    .bind(&payload)
    .bind(severity)
    .bind(&prev_hash)
    .bind(&hash)
    .execute(&mut *tx)
    .await?;

    tx.commit().await
}

/// SHA256(prev_hash || payload), hex encoded.
pub fn chain_hash(prev_hash: Option<&str>, payload: &str) -> String {
    let mut hasher = Sha256::new();
    if let Some(ph) = prev_hash {
        hasher.update(ph.as_bytes());
    }
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

/// Recomputes the event store chain; false if any row was altered or removed.
pub async fn verify_event_chain(pool: &SqlitePool) -> Result<bool, sqlx::Error> {
    let rows: Vec<(String, Option<String>, String)> =
        sqlx::query_as("SELECT payload, prev_hash, hash FROM event_store ORDER BY seq")
            .fetch_all(pool)
            .await?;

    let mut expected_prev: Option<String> = None;
    for (payload, prev_hash, hash) in rows {
        if prev_hash != expected_prev || chain_hash(prev_hash.as_deref(), &payload) != hash {
            return Ok(false);
        }
        expected_prev = Some(hash);
    }

    Ok(true)
}
