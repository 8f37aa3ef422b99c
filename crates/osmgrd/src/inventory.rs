//! Interface inventory: the set of kernel interfaces the agent knows about.
//!
//! The inventory is the join point between discovery (netlink listener) and
//! configuration (reconciler). It only grows; interfaces are never removed.

use std::sync::Arc;

use sonic_osmgr_db::Table;
use tracing::debug;

use crate::error::Result;
use crate::tables::OSMGR_INTF_TABLE;
use crate::types::Interface;

/// Shared handle to the `osmgr.intf` table.
#[derive(Debug, Clone)]
pub struct Inventory {
    table: Arc<Table<Interface>>,
}

impl Inventory {
    /// Creates an empty inventory.
    pub fn new() -> Self {
        Self {
            table: Arc::new(Table::new(OSMGR_INTF_TABLE)),
        }
    }

    /// Records a discovered interface.
    ///
    /// Returns true if the name was new. A repeated discovery is a no-op.
    pub fn record(&self, ifname: &str) -> bool {
        match self.table.insert(Interface::discovered(ifname)) {
            Ok(()) => {
                debug!(ifname = %ifname, "Interface recorded");
                true
            }
            Err(e) => {
                debug!(ifname = %ifname, error = %e, "Interface already known");
                false
            }
        }
    }

    /// Returns true if the interface has been discovered.
    pub fn exists(&self, ifname: &str) -> bool {
        self.table.exists(&ifname.to_string())
    }

    /// Returns the inventory row for an interface.
    pub fn get(&self, ifname: &str) -> Option<Interface> {
        self.table.get(&ifname.to_string())
    }

    /// Stores the admin state last applied to the kernel for an interface.
    pub fn set_admin_status(&self, ifname: &str, up: bool) -> Result<()> {
        self.table
            .update_with(&ifname.to_string(), |intf| intf.admin_status = Some(up))?;
        Ok(())
    }

    /// Returns all known interface names in order.
    pub fn names(&self) -> Vec<String> {
        self.table.rows().into_iter().map(|intf| intf.ifname).collect()
    }

    /// Returns the number of known interfaces.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if no interface has been discovered yet.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}
