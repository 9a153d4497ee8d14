// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`MessageStore`] trait.
//!
//! Payloads are stored as JSON text and timestamps as epoch milliseconds.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{ErrorCode, OptionalExtension, params_from_iter};
use tracing::debug;
use wapipe_core::traits::GroupCount;
use wapipe_core::{
    AdapterType, GroupField, HealthStatus, MessageFilter, MessageOrder, MessagePatch,
    MessageStatus, MessageStore, PluginAdapter, Priority, QueuedMessage, WapipeError,
};

use crate::database::{Database, map_tr_err};

const COLUMNS: &str = "id, tenant_id, customer_id, recipient, payload, priority, status, \
     retry_count, max_retries, created_at, scheduled_at, expires_at, last_attempt_at, \
     last_error, provider_message_id, processed_at, idempotency_key, reply_to";

/// Durable message store backed by SQLite.
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub async fn open(path: &str) -> Result<Self, WapipeError> {
        Ok(Self {
            db: Database::open(path).await?,
        })
    }

    pub async fn open_in_memory() -> Result<Self, WapipeError> {
        Ok(Self {
            db: Database::open_in_memory().await?,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn select(
        &self,
        filter: &MessageFilter,
        order: MessageOrder,
        limit: Option<usize>,
    ) -> Result<Vec<MessageRow>, WapipeError> {
        let (where_sql, mut values) = where_clause(filter);
        let order_sql = match order {
            MessageOrder::Dispatch => "priority ASC, scheduled_at ASC, created_at ASC",
            MessageOrder::CreatedAt => "created_at ASC",
        };
        let mut sql = format!("SELECT {COLUMNS} FROM queued_messages{where_sql} ORDER BY {order_sql}");
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        self.db
            .connection()
            .call(move |conn| -> Result<Vec<MessageRow>, rusqlite::Error> {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(values.iter()), MessageRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, WapipeError> {
        self.db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WapipeError> {
        self.db.checkpoint().await?;
        debug!("shutdown: WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn create(&self, message: &QueuedMessage) -> Result<(), WapipeError> {
        let payload = serde_json::to_string(&message.payload).map_err(WapipeError::storage)?;
        let values = vec![
            Value::Text(message.id.clone()),
            Value::Text(message.tenant_id.clone()),
            opt_text(&message.customer_id),
            Value::Text(message.to.clone()),
            Value::Text(payload),
            Value::Integer(message.priority.rank()),
            Value::Text(message.status.to_string()),
            Value::Integer(i64::from(message.retry_count)),
            Value::Integer(i64::from(message.max_retries)),
            millis(message.created_at),
            millis(message.scheduled_at),
            millis(message.expires_at),
            opt_millis(message.last_attempt_at),
            opt_text(&message.last_error),
            opt_text(&message.provider_message_id),
            opt_millis(message.processed_at),
            opt_text(&message.idempotency_key),
            opt_text(&message.reply_to),
        ];
        let inserted = self
            .db
            .connection()
            .call(move |conn| -> Result<bool, rusqlite::Error> {
                let result = conn.execute(
                    &format!(
                        "INSERT INTO queued_messages ({COLUMNS}) VALUES \
                         (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
                    ),
                    params_from_iter(values.iter()),
                );
                match result {
                    Ok(_) => Ok(true),
                    Err(e) if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => {
                        Ok(false)
                    }
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)?;
        if inserted {
            Ok(())
        } else {
            Err(duplicate(message))
        }
    }

    async fn find_many(
        &self,
        filter: &MessageFilter,
        order: MessageOrder,
        limit: Option<usize>,
    ) -> Result<Vec<QueuedMessage>, WapipeError> {
        self.select(filter, order, limit)
            .await?
            .into_iter()
            .map(MessageRow::into_message)
            .collect()
    }

    async fn update(&self, id: &str, patch: &MessagePatch) -> Result<bool, WapipeError> {
        let (set_sql, mut values) = set_clause(patch);
        let id = id.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<bool, rusqlite::Error> {
                if set_sql.is_empty() {
                    let found = conn
                        .query_row(
                            "SELECT 1 FROM queued_messages WHERE id = ?1",
                            [&id],
                            |_| Ok(()),
                        )
                        .optional()?;
                    return Ok(found.is_some());
                }
                values.push(Value::Text(id));
                let changed = conn.execute(
                    &format!("UPDATE queued_messages SET {set_sql} WHERE id = ?"),
                    params_from_iter(values.iter()),
                )?;
                Ok(changed > 0)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn update_many(
        &self,
        filter: &MessageFilter,
        patch: &MessagePatch,
    ) -> Result<u64, WapipeError> {
        let (set_sql, mut values) = set_clause(patch);
        if set_sql.is_empty() {
            return self.count(filter).await;
        }
        let (where_sql, where_values) = where_clause(filter);
        values.extend(where_values);
        self.db
            .connection()
            .call(move |conn| -> Result<u64, rusqlite::Error> {
                let changed = conn.execute(
                    &format!("UPDATE queued_messages SET {set_sql}{where_sql}"),
                    params_from_iter(values.iter()),
                )?;
                Ok(changed as u64)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn count(&self, filter: &MessageFilter) -> Result<u64, WapipeError> {
        let (where_sql, values) = where_clause(filter);
        self.db
            .connection()
            .call(move |conn| -> Result<u64, rusqlite::Error> {
                let count: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM queued_messages{where_sql}"),
                    params_from_iter(values.iter()),
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn group_by(
        &self,
        field: GroupField,
        filter: &MessageFilter,
    ) -> Result<Vec<GroupCount>, WapipeError> {
        let column = match field {
            GroupField::Status => "status",
            GroupField::Priority => "priority",
            GroupField::TenantId => "tenant_id",
        };
        let (where_sql, values) = where_clause(filter);
        let rows = self
            .db
            .connection()
            .call(move |conn| -> Result<Vec<(Value, i64)>, rusqlite::Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {column}, COUNT(*) FROM queued_messages{where_sql} \
                     GROUP BY {column} ORDER BY {column}"
                ))?;
                let rows = stmt
                    .query_map(params_from_iter(values.iter()), |row| {
                        Ok((row.get::<_, Value>(0)?, row.get::<_, i64>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)?;

        rows.into_iter()
            .map(|(key, count)| {
                let key = match key {
                    Value::Integer(rank) if field == GroupField::Priority => {
                        Priority::from_rank(rank)
                            .map(|p| p.to_string())
                            .ok_or_else(|| corrupt(format!("unknown priority rank {rank}")))?
                    }
                    Value::Text(text) => text,
                    other => return Err(corrupt(format!("unexpected group key {other:?}"))),
                };
                Ok((key, count as u64))
            })
            .collect()
    }
}

/// Raw column values, decoded outside the connection thread.
struct MessageRow {
    id: String,
    tenant_id: String,
    customer_id: Option<String>,
    recipient: String,
    payload: String,
    priority: i64,
    status: String,
    retry_count: i64,
    max_retries: i64,
    created_at: i64,
    scheduled_at: i64,
    expires_at: i64,
    last_attempt_at: Option<i64>,
    last_error: Option<String>,
    provider_message_id: Option<String>,
    processed_at: Option<i64>,
    idempotency_key: Option<String>,
    reply_to: Option<String>,
}

impl MessageRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            customer_id: row.get(2)?,
            recipient: row.get(3)?,
            payload: row.get(4)?,
            priority: row.get(5)?,
            status: row.get(6)?,
            retry_count: row.get(7)?,
            max_retries: row.get(8)?,
            created_at: row.get(9)?,
            scheduled_at: row.get(10)?,
            expires_at: row.get(11)?,
            last_attempt_at: row.get(12)?,
            last_error: row.get(13)?,
            provider_message_id: row.get(14)?,
            processed_at: row.get(15)?,
            idempotency_key: row.get(16)?,
            reply_to: row.get(17)?,
        })
    }

    fn into_message(self) -> Result<QueuedMessage, WapipeError> {
        Ok(QueuedMessage {
            payload: serde_json::from_str(&self.payload).map_err(WapipeError::storage)?,
            priority: Priority::from_rank(self.priority)
                .ok_or_else(|| corrupt(format!("unknown priority rank {}", self.priority)))?,
            status: MessageStatus::from_str(&self.status)
                .map_err(|_| corrupt(format!("unknown status `{}`", self.status)))?,
            retry_count: self.retry_count.try_into().unwrap_or(0),
            max_retries: self.max_retries.try_into().unwrap_or(0),
            created_at: from_millis(self.created_at)?,
            scheduled_at: from_millis(self.scheduled_at)?,
            expires_at: from_millis(self.expires_at)?,
            last_attempt_at: self.last_attempt_at.map(from_millis).transpose()?,
            processed_at: self.processed_at.map(from_millis).transpose()?,
            id: self.id,
            tenant_id: self.tenant_id,
            customer_id: self.customer_id,
            to: self.recipient,
            last_error: self.last_error,
            provider_message_id: self.provider_message_id,
            idempotency_key: self.idempotency_key,
            reply_to: self.reply_to,
        })
    }
}

/// Rejection for a message whose id or `(tenant, idempotency key)` is taken.
fn duplicate(message: &QueuedMessage) -> WapipeError {
    match &message.idempotency_key {
        Some(key) => WapipeError::Duplicate {
            entity: "idempotency key",
            key: format!("{}/{key}", message.tenant_id),
        },
        None => WapipeError::Duplicate {
            entity: "message id",
            key: message.id.clone(),
        },
    }
}

fn corrupt(message: String) -> WapipeError {
    WapipeError::Storage {
        source: message.into(),
    }
}

fn millis(at: DateTime<Utc>) -> Value {
    Value::Integer(at.timestamp_millis())
}

fn opt_millis(at: Option<DateTime<Utc>>) -> Value {
    at.map_or(Value::Null, millis)
}

fn opt_text(text: &Option<String>) -> Value {
    text.clone().map_or(Value::Null, Value::Text)
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, WapipeError> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| corrupt(format!("timestamp {ms} out of range")))
}

/// ` WHERE ...` for a filter, or an empty string when it matches everything.
fn where_clause(filter: &MessageFilter) -> (String, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values = Vec::new();

    if let Some(id) = &filter.id {
        clauses.push("id = ?".into());
        values.push(Value::Text(id.clone()));
    }
    if let Some(tenant) = &filter.tenant_id {
        clauses.push("tenant_id = ?".into());
        values.push(Value::Text(tenant.clone()));
    }
    if !filter.excluded_tenants.is_empty() {
        let marks = vec!["?"; filter.excluded_tenants.len()].join(", ");
        clauses.push(format!("tenant_id NOT IN ({marks})"));
        values.extend(filter.excluded_tenants.iter().cloned().map(Value::Text));
    }
    if let Some(key) = &filter.idempotency_key {
        clauses.push("idempotency_key = ?".into());
        values.push(Value::Text(key.clone()));
    }
    if !filter.statuses.is_empty() {
        let marks = vec!["?"; filter.statuses.len()].join(", ");
        clauses.push(format!("status IN ({marks})"));
        values.extend(filter.statuses.iter().map(|s| Value::Text(s.to_string())));
    }
    if let Some(at) = filter.scheduled_at_or_before {
        clauses.push("scheduled_at <= ?".into());
        values.push(millis(at));
    }
    if let Some(at) = filter.expires_after {
        clauses.push("expires_at > ?".into());
        values.push(millis(at));
    }
    if let Some(at) = filter.expires_at_or_before {
        clauses.push("expires_at <= ?".into());
        values.push(millis(at));
    }
    if let Some(at) = filter.processed_before {
        clauses.push("processed_at IS NOT NULL AND processed_at < ?".into());
        values.push(millis(at));
    }
    if let Some(at) = filter.processed_at_or_after {
        clauses.push("processed_at IS NOT NULL AND processed_at >= ?".into());
        values.push(millis(at));
    }
    if let Some(at) = filter.last_attempt_before {
        clauses.push("last_attempt_at IS NOT NULL AND last_attempt_at < ?".into());
        values.push(millis(at));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

fn set_clause(patch: &MessagePatch) -> (String, Vec<Value>) {
    let mut sets: Vec<&str> = Vec::new();
    let mut values = Vec::new();

    if let Some(status) = patch.status {
        sets.push("status = ?");
        values.push(Value::Text(status.to_string()));
    }
    if let Some(count) = patch.retry_count {
        sets.push("retry_count = ?");
        values.push(Value::Integer(i64::from(count)));
    }
    if let Some(at) = patch.scheduled_at {
        sets.push("scheduled_at = ?");
        values.push(millis(at));
    }
    if let Some(at) = patch.last_attempt_at {
        sets.push("last_attempt_at = ?");
        values.push(millis(at));
    }
    if let Some(err) = &patch.last_error {
        sets.push("last_error = ?");
        values.push(Value::Text(err.clone()));
    }
    if let Some(id) = &patch.provider_message_id {
        sets.push("provider_message_id = ?");
        values.push(Value::Text(id.clone()));
    }
    if let Some(at) = patch.processed_at {
        sets.push("processed_at = ?");
        values.push(millis(at));
    }

    (sets.join(", "), values)
}
