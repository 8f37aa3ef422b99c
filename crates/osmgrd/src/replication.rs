//! Replication bridge between the agent's tables and the system of record.
//!
//! Records travel as JSON, one per line:
//!
//! ```text
//! {"table":"port","op":"set","row":{"ifname":"eth0","admin_status":"up","speed":"100G"}}
//! {"table":"intf","op":"del","row":{"ifname":"eth0","ipaddr":"10.0.0.1/24"}}
//! ```
//!
//! Inbound records ([`ConfigChange`]) are applied to the `config` tables;
//! outbound records ([`AppliedChange`]) are produced by the publisher and
//! fanned out over a broadcast channel. Delivery is best effort: a
//! subscriber that falls more than the channel capacity behind loses the
//! oldest records, which is logged as lag.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sonic_osmgr_db::Operation;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::agent::OsMgr;
use crate::error::{OsmgrError, Result};
use crate::types::{AppliedIntf, AppliedPort, IntfAddress, PortConfig};

/// A desired-state change replicated in from the system of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum ConfigChange {
    Port { op: Operation, row: PortConfig },
    Intf { op: Operation, row: IntfAddress },
}

/// An applied-state change replicated out to the system of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum AppliedChange {
    Port { op: Operation, row: AppliedPort },
    Intf { op: Operation, row: AppliedIntf },
}

impl AppliedChange {
    pub fn op(&self) -> Operation {
        match self {
            AppliedChange::Port { op, .. } | AppliedChange::Intf { op, .. } => *op,
        }
    }

    pub fn ifname(&self) -> &str {
        match self {
            AppliedChange::Port { row, .. } => &row.ifname,
            AppliedChange::Intf { row, .. } => &row.ifname,
        }
    }
}

/// Receives every committed applied-state change.
pub trait ReplicationSink: Send + Sync {
    fn publish(&self, change: AppliedChange);
}

/// In-process outbound transport over a broadcast channel.
#[derive(Debug, Clone)]
pub struct ReplicationBridge {
    tx: broadcast::Sender<AppliedChange>,
}

impl ReplicationBridge {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribes to applied-state changes published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AppliedChange> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl ReplicationSink for ReplicationBridge {
    fn publish(&self, change: AppliedChange) {
        if self.tx.send(change).is_err() {
            debug!("No replication subscriber, applied change not forwarded");
        }
    }
}

/// Applies inbound JSON-line records to the agent until EOF.
///
/// Each record is applied on the blocking pool, since reconciliation runs
/// kernel commands. Malformed lines, including ones that are not valid
/// UTF-8, are logged and skipped. Returns the number of records applied.
pub async fn pump_inbound<R>(mut reader: R, agent: Arc<OsMgr>) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut applied = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }

        let change: ConfigChange = match serde_json::from_slice(line) {
            Ok(change) => change,
            Err(e) => {
                warn!(
                    error = %e,
                    line = %String::from_utf8_lossy(line),
                    "Skipping malformed replication record"
                );
                continue;
            }
        };

        let agent = agent.clone();
        tokio::task::spawn_blocking(move || agent.apply_config(change))
            .await
            .map_err(|e| OsmgrError::Replication(format!("Inbound apply task failed: {}", e)))?;
        applied += 1;
    }

    info!(applied, "Inbound replication stream closed");
    Ok(applied)
}

/// Writes outbound changes as JSON lines until the channel closes.
///
/// Returns the number of records written.
pub async fn pump_outbound<W>(
    mut rx: broadcast::Receiver<AppliedChange>,
    mut writer: W,
) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    loop {
        match rx.recv().await {
            Ok(change) => {
                let mut line = serde_json::to_vec(&change)?;
                line.push(b'\n');
                writer.write_all(&line).await?;
                writer.flush().await?;
                written += 1;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Outbound replication lagged, changes dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
    Ok(written)
}

/// Logs outbound changes until the channel closes.
pub async fn log_outbound(mut rx: broadcast::Receiver<AppliedChange>) -> usize {
    let mut seen = 0;
    loop {
        match rx.recv().await {
            Ok(change) => {
                info!(
                    op = ?change.op(),
                    ifname = %change.ifname(),
                    change = ?change,
                    "Applied state replicated"
                );
                seen += 1;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Outbound replication lagged, changes dropped");
            }
            Err(RecvError::Closed) => return seen,
        }
    }
}
