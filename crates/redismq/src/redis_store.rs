//! Redis Streams implementation of [`StreamStore`].
//!
//! Blocking `XREADGROUP` calls run on their own connection. Commands on a
//! multiplexed connection are served in order, so sharing one connection would
//! hold acknowledgments from handler tasks behind a blocked read.

use crate::error::{RedisMqError, RedisMqResult};
use crate::message::{PendingRecord, StreamEntry};
use crate::store::{GroupStatus, StreamStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisResult, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Redis Streams store.
pub struct RedisStore {
    client: Client,
    /// Non-blocking commands (XPENDING, XCLAIM, XACK/XDEL, XADD, XGROUP).
    conn: RwLock<MultiplexedConnection>,
    /// Blocking XREADGROUP only.
    read_conn: RwLock<MultiplexedConnection>,
    payload_field: String,
}

impl RedisStore {
    /// Connect to Redis. `payload_field` names the entry field holding the
    /// payload, for both reads and appends.
    pub async fn connect(redis_url: &str, payload_field: impl Into<String>) -> RedisMqResult<Self> {
        let payload_field = payload_field.into();
        if payload_field.is_empty() {
            return Err(RedisMqError::Config(
                "payload_field must not be empty".to_string(),
            ));
        }

        let client = Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        let read_conn = client.get_multiplexed_async_connection().await?;

        Ok(Self {
            client,
            conn: RwLock::new(conn),
            read_conn: RwLock::new(read_conn),
            payload_field,
        })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.read().clone()
    }

    fn read_conn(&self) -> MultiplexedConnection {
        self.read_conn.read().clone()
    }
}

#[async_trait]
impl StreamStore for RedisStore {
    async fn create_group(&self, stream: &str, group: &str) -> RedisMqResult<GroupStatus> {
        // XGROUP CREATE key groupname id MKSTREAM
        // "0" anchors the group at the origin so history is visible too
        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut self.conn())
            .await;

        match result {
            Ok(()) => Ok(GroupStatus::Created),
            Err(e) if is_busy_group(&e) => Ok(GroupStatus::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Option<Duration>,
    ) -> RedisMqResult<Vec<StreamEntry>> {
        // XREADGROUP GROUP group consumer COUNT n [BLOCK ms] STREAMS key >
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(group).arg(consumer).arg("COUNT").arg(count);
        if let Some(block) = block {
            cmd.arg("BLOCK").arg(block.as_millis() as u64);
        }
        cmd.arg("STREAMS").arg(stream).arg(">");

        let value: Value = cmd.query_async(&mut self.read_conn()).await?;
        parse_read_reply(value, &self.payload_field)
    }

    async fn list_pending(
        &self,
        stream: &str,
        group: &str,
        min_idle: Duration,
        count: usize,
    ) -> RedisMqResult<Vec<PendingRecord>> {
        // XPENDING key group IDLE min-idle-time - + count (Redis 6.2+)
        let value: Value = redis::cmd("XPENDING")
            .arg(stream)
            .arg(group)
            .arg("IDLE")
            .arg(min_idle.as_millis() as u64)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut self.conn())
            .await?;

        parse_pending_reply(value)
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[String],
    ) -> RedisMqResult<Vec<StreamEntry>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // XCLAIM key group consumer min-idle-time id [id ...]
        let value: Value = redis::cmd("XCLAIM")
            .arg(stream)
            .arg(group)
            .arg(consumer)
            .arg(min_idle.as_millis() as u64)
            .arg(ids)
            .query_async(&mut self.conn())
            .await?;

        parse_entries(value, &self.payload_field)
    }

    async fn ack_and_delete(&self, stream: &str, group: &str, id: &str) -> RedisMqResult<()> {
        let (acked, deleted): (i64, i64) = redis::pipe()
            .atomic()
            .cmd("XACK")
            .arg(stream)
            .arg(group)
            .arg(id)
            .cmd("XDEL")
            .arg(stream)
            .arg(id)
            .query_async(&mut self.conn())
            .await?;

        if acked == 1 {
            debug!(message_id = %id, stream = %stream, deleted, "Acknowledged and deleted entry");
        } else {
            warn!(
                message_id = %id,
                stream = %stream,
                deleted,
                "XACK returned {}, entry may already be finalized",
                acked
            );
        }

        Ok(())
    }

    async fn append(&self, stream: &str, payload: &str) -> RedisMqResult<String> {
        let id: String = redis::cmd("XADD")
            .arg(stream)
            .arg("*")
            .arg(&self.payload_field)
            .arg(payload)
            .query_async(&mut self.conn())
            .await?;
        Ok(id)
    }

    async fn reconnect(&self) -> RedisMqResult<()> {
        info!("Reconnecting to Redis...");
        let conn = self.client.get_multiplexed_async_connection().await?;
        let read_conn = self.client.get_multiplexed_async_connection().await?;
        *self.conn.write() = conn;
        *self.read_conn.write() = read_conn;
        Ok(())
    }
}

fn is_busy_group(err: &redis::RedisError) -> bool {
    err.code() == Some("BUSYGROUP") || err.to_string().contains("BUSYGROUP")
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(s) => Some(String::from_utf8_lossy(s).to_string()),
        Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

/// Parse an XREADGROUP reply.
///
/// Format: `[[stream_key, [[id, [field, value, ...]], ...]], ...]`, or nil on timeout.
fn parse_read_reply(value: Value, payload_field: &str) -> RedisMqResult<Vec<StreamEntry>> {
    let streams = match value {
        Value::Array(streams) => streams,
        Value::Nil => return Ok(Vec::new()),
        other => {
            return Err(RedisMqError::Protocol(format!(
                "Unexpected XREADGROUP response type: {:?}",
                other
            )))
        }
    };

    let mut entries = Vec::new();
    for stream in streams {
        let mut parts = match stream {
            Value::Array(parts) if parts.len() >= 2 => parts,
            _ => {
                return Err(RedisMqError::Protocol(
                    "Expected [key, entries] for stream reply".to_string(),
                ))
            }
        };
        let messages = parts.swap_remove(1);
        entries.extend(parse_entries(messages, payload_field)?);
    }

    Ok(entries)
}

/// Parse a list of `[id, [field, value, ...]]` entries, as returned by XCLAIM.
///
/// Nil items (entries deleted while pending) are skipped.
fn parse_entries(value: Value, payload_field: &str) -> RedisMqResult<Vec<StreamEntry>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Nil => return Ok(Vec::new()),
        other => {
            return Err(RedisMqError::Protocol(format!(
                "Expected array of entries, got {:?}",
                other
            )))
        }
    };

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let entry = match item {
            Value::Array(entry) => entry,
            Value::Nil => continue,
            other => {
                return Err(RedisMqError::Protocol(format!(
                    "Expected array for entry, got {:?}",
                    other
                )))
            }
        };

        if entry.len() < 2 {
            return Err(RedisMqError::Protocol("Entry too short".to_string()));
        }

        let id = value_to_string(&entry[0]).ok_or_else(|| {
            RedisMqError::Protocol(format!("Expected string for entry ID, got {:?}", entry[0]))
        })?;

        let payload = match &entry[1] {
            Value::Array(fields) => find_field(fields, payload_field),
            // Deleted entry whose ID is still pending
            Value::Nil => None,
            other => {
                return Err(RedisMqError::Protocol(format!(
                    "Expected array for fields, got {:?}",
                    other
                )))
            }
        };

        let payload = payload.unwrap_or_else(|| {
            warn!(
                message_id = %id,
                field = %payload_field,
                "Entry missing payload field, delivering empty payload"
            );
            String::new()
        });

        entries.push(StreamEntry { id, payload });
    }

    Ok(entries)
}

fn find_field(fields: &[Value], name: &str) -> Option<String> {
    fields
        .chunks_exact(2)
        .find(|pair| value_to_string(&pair[0]).as_deref() == Some(name))
        .and_then(|pair| value_to_string(&pair[1]))
}

/// Parse an extended XPENDING reply: `[[id, consumer, idle_ms, delivery_count], ...]`.
fn parse_pending_reply(value: Value) -> RedisMqResult<Vec<PendingRecord>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Nil => return Ok(Vec::new()),
        other => {
            return Err(RedisMqError::Protocol(format!(
                "Unexpected XPENDING response type: {:?}",
                other
            )))
        }
    };

    items
        .into_iter()
        .map(|item| {
            let fields = match item {
                Value::Array(fields) if fields.len() >= 4 => fields,
                other => {
                    return Err(RedisMqError::Protocol(format!(
                        "Expected 4-element pending record, got {:?}",
                        other
                    )))
                }
            };

            let id = value_to_string(&fields[0]).ok_or_else(|| {
                RedisMqError::Protocol("Expected string for pending ID".to_string())
            })?;
            let idle_ms = match fields[2] {
                Value::Int(ms) => ms.max(0) as u64,
                _ => return Err(RedisMqError::Protocol("Expected integer idle time".to_string())),
            };
            let delivery_count = match fields[3] {
                Value::Int(n) => n.max(0) as u64,
                _ => {
                    return Err(RedisMqError::Protocol(
                        "Expected integer delivery count".to_string(),
                    ))
                }
            };

            Ok(PendingRecord {
                id,
                idle: Duration::from_millis(idle_ms),
                delivery_count,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    fn entry(id: &str, fields: &[(&str, &str)]) -> Value {
        let mut flat = Vec::new();
        for (k, v) in fields {
            flat.push(bulk(k));
            flat.push(bulk(v));
        }
        Value::Array(vec![bulk(id), Value::Array(flat)])
    }

    #[test]
    fn test_parse_read_reply_timeout_is_empty() {
        assert!(parse_read_reply(Value::Nil, "message").unwrap().is_empty());
    }

    #[test]
    fn test_parse_read_reply_extracts_payload_field() {
        let reply = Value::Array(vec![Value::Array(vec![
            bulk("orders"),
            Value::Array(vec![
                entry("1-0", &[("other", "x"), ("message", "first")]),
                entry("2-0", &[("message", "second")]),
            ]),
        ])]);

        let entries = parse_read_reply(reply, "message").unwrap();
        assert_eq!(
            entries,
            vec![
                StreamEntry { id: "1-0".into(), payload: "first".into() },
                StreamEntry { id: "2-0".into(), payload: "second".into() },
            ]
        );
    }

    #[test]
    fn test_missing_payload_field_yields_empty_payload() {
        let reply = Value::Array(vec![entry("3-0", &[("body", "x")])]);
        let entries = parse_entries(reply, "message").unwrap();
        assert_eq!(entries[0].payload, "");
    }

    #[test]
    fn test_custom_payload_field() {
        let reply = Value::Array(vec![entry("5-0", &[("message", "ignored"), ("body", "wanted")])]);
        let entries = parse_entries(reply, "body").unwrap();
        assert_eq!(entries[0].payload, "wanted");
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_payload_field() {
        let result = RedisStore::connect("redis://127.0.0.1:6379", "").await;
        assert!(matches!(result, Err(RedisMqError::Config(_))));
    }

    #[test]
    fn test_parse_entries_skips_deleted() {
        let reply = Value::Array(vec![Value::Nil, entry("4-0", &[("message", "kept")])]);
        let entries = parse_entries(reply, "message").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "4-0");
    }

    #[test]
    fn test_parse_pending_reply() {
        let reply = Value::Array(vec![
            Value::Array(vec![bulk("1-0"), bulk("consumer-a"), Value::Int(5000), Value::Int(2)]),
            Value::Array(vec![bulk("2-0"), bulk("consumer-b"), Value::Int(10), Value::Int(1)]),
        ]);

        let pending = parse_pending_reply(reply).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, "1-0");
        assert_eq!(pending[0].idle, Duration::from_secs(5));
        assert_eq!(pending[0].delivery_count, 2);
        assert_eq!(pending[1].delivery_count, 1);
    }

    #[test]
    fn test_parse_pending_reply_rejects_short_records() {
        let reply = Value::Array(vec![Value::Array(vec![bulk("1-0")])]);
        assert!(matches!(
            parse_pending_reply(reply),
            Err(RedisMqError::Protocol(_))
        ));
    }

    #[test]
    fn test_unexpected_reply_type_is_protocol_error() {
        assert!(parse_read_reply(Value::Int(1), "message").is_err());
    }
}
