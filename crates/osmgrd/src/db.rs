//! Desired-state (`config`) and applied-state (`appl`) databases.

use sonic_osmgr_db::{MutationKind, Operation, Row, Table};
use tracing::debug;

use crate::replication::ConfigChange;
use crate::tables::{APPL_INTF_TABLE, APPL_PORT_TABLE, CFG_INTF_TABLE, CFG_PORT_TABLE};
use crate::types::{AppliedIntf, AppliedPort, IntfAddress, PortConfig};

/// Desired state, written by replication from SysDB.
#[derive(Debug)]
pub struct ConfigDb {
    pub port: Table<PortConfig>,
    pub intf: Table<IntfAddress>,
}

impl ConfigDb {
    pub fn new() -> Self {
        Self {
            port: Table::new(CFG_PORT_TABLE),
            intf: Table::new(CFG_INTF_TABLE),
        }
    }

    /// Applies one replicated change.
    ///
    /// SET upserts the row, DEL deletes by key. Returns the committed
    /// mutation, or `None` when a DEL named an absent row.
    pub fn apply(&self, change: ConfigChange) -> Option<MutationKind> {
        debug!(change = ?change, "Applying desired-state change");
        match change {
            ConfigChange::Port { op: Operation::Set, row } => Some(self.port.upsert(row)),
            ConfigChange::Port { op: Operation::Del, row } => self
                .port
                .delete(&row.key())
                .map(|_| MutationKind::Delete),
            ConfigChange::Intf { op: Operation::Set, row } => Some(self.intf.upsert(row)),
            ConfigChange::Intf { op: Operation::Del, row } => self
                .intf
                .delete(&row.key())
                .map(|_| MutationKind::Delete),
        }
    }
}

impl Default for ConfigDb {
    fn default() -> Self {
        Self::new()
    }
}

/// Applied state, owned by the publisher and replicated to SysDB.
#[derive(Debug)]
pub struct ApplDb {
    pub port: Table<AppliedPort>,
    pub intf: Table<AppliedIntf>,
}

impl ApplDb {
    pub fn new() -> Self {
        Self {
            port: Table::new(APPL_PORT_TABLE),
            intf: Table::new(APPL_INTF_TABLE),
        }
    }
}

impl Default for ApplDb {
    fn default() -> Self {
        Self::new()
    }
}
