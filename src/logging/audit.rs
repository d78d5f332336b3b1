//! Append-only audit trail
//!
//! Every routing decision, auth outcome and node communication is written
//! as one JSON line. Records are never updated or deleted; the trail is the
//! only historical record of what the queen did.
//!
//! Writes go through a single mutex, so each line lands whole even when
//! many requests append at once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

pub const AUDIT_FILE: &str = "audit.log";
pub const SIGNAL_FILE: &str = "signals.log";

/// Audit event kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEvent {
    /// Inbound HTTP request
    Request,
    /// Routing decision for a classified signal
    SignalRouted,
    /// Webhook delivery accepted for processing
    WebhookReceived,
    AuthSuccess,
    AuthFailure,
    /// Dispatch initiation or outcome between two nodes
    NodeCommunication,
    NotFound,
    Error,
    QueenStarted,
}

/// One audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl AuditRecord {
    pub fn new(event: AuditEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
            fields: Map::new(),
        }
    }

    /// Attach a field. `timestamp` and `event` are reserved and ignored.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        if key != "timestamp" && key != "event" {
            self.fields.insert(key.to_string(), value.into());
        }
        self
    }

    /// Attach every key of `extra`
    pub fn with_all(mut self, extra: Map<String, Value>) -> Self {
        for (key, value) in extra {
            self = self.with(&key, value);
        }
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Audit trail recorder, cheap to clone
#[derive(Clone)]
pub struct AuditTrail {
    inner: Arc<Mutex<AuditTrailInner>>,
    echo: bool,
}

struct AuditTrailInner {
    audit: Option<BufWriter<File>>,
    signals: Option<BufWriter<File>>,
    /// Retained copies for inspection (tests and in-process consumers)
    memory: Option<Vec<AuditRecord>>,
}

impl AuditTrail {
    /// A recorder that drops everything
    pub fn disabled() -> Self {
        Self::from_inner(None, None, None, false)
    }

    /// A recorder that keeps records in memory only
    pub fn in_memory() -> Self {
        Self::from_inner(None, None, Some(Vec::new()), false)
    }

    /// Open `audit.log` and `signals.log` for append under `dir`
    pub fn open(dir: &Path, echo: bool) -> std::io::Result<Self> {
        fs::create_dir_all(dir)?;
        let audit = open_append(&dir.join(AUDIT_FILE))?;
        let signals = open_append(&dir.join(SIGNAL_FILE))?;

        info!("Audit trail writing to {}", dir.display());
        Ok(Self::from_inner(Some(audit), Some(signals), None, echo))
    }

    fn from_inner(
        audit: Option<BufWriter<File>>,
        signals: Option<BufWriter<File>>,
        memory: Option<Vec<AuditRecord>>,
        echo: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(AuditTrailInner {
                audit,
                signals,
                memory,
            })),
            echo,
        }
    }

    /// Append a record to the audit log
    pub async fn record(&self, record: AuditRecord) {
        self.append(record, false).await;
    }

    /// Append a routing record to both the audit log and the signal log
    pub async fn record_signal(&self, record: AuditRecord) {
        self.append(record, true).await;
    }

    async fn append(&self, record: AuditRecord, signal_log: bool) {
        let line = match record.to_jsonl() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize audit record: {}", e);
                return;
            }
        };

        if self.echo {
            info!(target: "audit", "{}", line);
        }

        let mut inner = self.inner.lock().await;

        if let Some(ref mut writer) = inner.audit {
            write_line(writer, &line, AUDIT_FILE);
        }
        if signal_log {
            if let Some(ref mut writer) = inner.signals {
                write_line(writer, &line, SIGNAL_FILE);
            }
        }
        if let Some(ref mut memory) = inner.memory {
            memory.push(record);
        }
    }

    /// Snapshot of retained records (empty unless retaining)
    pub async fn records(&self) -> Vec<AuditRecord> {
        let inner = self.inner.lock().await;
        inner.memory.clone().unwrap_or_default()
    }

    /// Retained records of one kind
    pub async fn records_of(&self, event: AuditEvent) -> Vec<AuditRecord> {
        self.records()
            .await
            .into_iter()
            .filter(|r| r.event == event)
            .collect()
    }
}

fn open_append(path: &Path) -> std::io::Result<BufWriter<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::new(file))
}

fn write_line(writer: &mut BufWriter<File>, line: &str, name: &str) {
    if let Err(e) = writeln!(writer, "{}", line) {
        error!("Failed to write {}: {}", name, e);
        return;
    }
    if let Err(e) = writer.flush() {
        error!("Failed to flush {}: {}", name, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_flat() {
        let record = AuditRecord::new(AuditEvent::SignalRouted)
            .with("signalType", "academic")
            .with("source", "test")
            .with("event", "overwritten?");

        let json: Value = serde_json::from_str(&record.to_jsonl().unwrap()).unwrap();
        assert_eq!(json["event"], "SIGNAL_ROUTED");
        assert_eq!(json["signalType"], "academic");
        assert_eq!(json["source"], "test");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_in_memory_retains_records() {
        let trail = AuditTrail::in_memory();
        trail.record(AuditRecord::new(AuditEvent::AuthSuccess)).await;
        trail.record_signal(AuditRecord::new(AuditEvent::SignalRouted)).await;

        assert_eq!(trail.records().await.len(), 2);
        assert_eq!(trail.records_of(AuditEvent::SignalRouted).await.len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_drops_everything() {
        let trail = AuditTrail::disabled();
        trail.record(AuditRecord::new(AuditEvent::Request)).await;
        assert!(trail.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_file_trail_splits_signal_log() {
        let dir = tempfile::tempdir().unwrap();
        let trail = AuditTrail::open(dir.path(), false).unwrap();

        trail
            .record(AuditRecord::new(AuditEvent::AuthFailure).with("reason", "invalid-token"))
            .await;
        trail
            .record_signal(AuditRecord::new(AuditEvent::SignalRouted).with("target", "knowledge"))
            .await;

        let audit = std::fs::read_to_string(dir.path().join(AUDIT_FILE)).unwrap();
        let signals = std::fs::read_to_string(dir.path().join(SIGNAL_FILE)).unwrap();
        assert_eq!(audit.lines().count(), 2);
        assert_eq!(signals.lines().count(), 1);
        assert!(signals.contains("\"target\":\"knowledge\""));
    }

    #[tokio::test]
    async fn test_concurrent_appends_stay_whole() {
        let dir = tempfile::tempdir().unwrap();
        let trail = AuditTrail::open(dir.path(), false).unwrap();

        let mut handles = Vec::new();
        for i in 0..50 {
            let trail = trail.clone();
            handles.push(tokio::spawn(async move {
                trail
                    .record(
                        AuditRecord::new(AuditEvent::Request)
                            .with("n", i)
                            .with("padding", "x".repeat(512)),
                    )
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let audit = std::fs::read_to_string(dir.path().join(AUDIT_FILE)).unwrap();
        assert_eq!(audit.lines().count(), 50);
        for line in audit.lines() {
            let parsed: AuditRecord = serde_json::from_str(line).unwrap();
            assert_eq!(parsed.event, AuditEvent::Request);
        }
    }
}
