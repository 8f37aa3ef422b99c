//! Applied-state publisher.
//!
//! Owns the `appl` tables. Every committed write is handed to the
//! replication sink from the table trigger, in commit order. What the sink
//! does with it is up to the sink; [`ReplicationBridge`] is best effort and
//! drops records for subscribers that lag too far behind.
//!
//! [`ReplicationBridge`]: crate::replication::ReplicationBridge

use std::sync::Arc;

use sonic_osmgr_db::{Row, RowChange};
use tracing::debug;

use crate::db::ApplDb;
use crate::reconciler::AppliedWrite;
use crate::replication::{AppliedChange, ReplicationSink};
use crate::types::{AppliedIntf, AppliedPort};

#[derive(Debug, Clone)]
pub struct AppliedStatePublisher {
    appl: Arc<ApplDb>,
}

impl AppliedStatePublisher {
    /// Creates the applied-state tables and wires them to `sink`.
    pub fn new(sink: Arc<dyn ReplicationSink>) -> Self {
        let appl = Arc::new(ApplDb::new());

        let port_sink = sink.clone();
        appl.port.on_change(move |change: &RowChange<AppliedPort>| {
            port_sink.publish(AppliedChange::Port {
                op: change.operation(),
                row: change.row().clone(),
            });
        });

        appl.intf.on_change(move |change: &RowChange<AppliedIntf>| {
            sink.publish(AppliedChange::Intf {
                op: change.operation(),
                row: change.row().clone(),
            });
        });

        Self { appl }
    }

    /// Commits one applied-state write.
    pub fn record(&self, write: AppliedWrite) {
        match write {
            AppliedWrite::UpsertPort(row) => {
                let kind = self.appl.port.upsert(row);
                debug!(kind = ?kind, table = %self.appl.port.name(), "Applied state written");
            }
            AppliedWrite::UpsertIntf(row) => {
                let kind = self.appl.intf.upsert(row);
                debug!(kind = ?kind, table = %self.appl.intf.name(), "Applied state written");
            }
            AppliedWrite::DeleteIntf(row) => {
                if self.appl.intf.delete(&row.key()).is_none() {
                    debug!(
                        ifname = %row.ifname,
                        ipaddr = %row.ipaddr,
                        "Applied address was not recorded"
                    );
                }
            }
        }
    }

    /// Read access to the applied-state tables.
    pub fn applied(&self) -> &ApplDb {
        &self.appl
    }
}
