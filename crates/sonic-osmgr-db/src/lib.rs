//! Keyed in-memory tables with change notifications for the SONiC OS manager.
//!
//! This crate provides the storage collaborator used by `osmgrd`:
//!
//! - [`Table`]: a keyed row set with point lookups, inserts, upserts and deletes
//! - [`Row`]: trait implemented by every row type to expose its primary key
//! - [`RowChange`]: the old/new row images handed to triggers after a commit
//! - [`Operation`]: the SET/DEL view of a change used on replication streams
//!
//! # Architecture
//!
//! Every mutation commits under the table's write lock, so readers never see a
//! partially applied row. Triggers registered with [`Table::on_change`] run
//! synchronously after the commit, outside the data lock, one change at a time
//! in commit order.
//!
//! # Example
//!
//! ```
//! use sonic_osmgr_db::{Row, Table};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Link {
//!     name: String,
//! }
//!
//! impl Row for Link {
//!     type Key = String;
//!     fn key(&self) -> String {
//!         self.name.clone()
//!     }
//! }
//!
//! let table: Table<Link> = Table::new("osmgr.intf");
//! table.on_change(|change| println!("{:?} {:?}", change.kind(), change.row()));
//! table.insert(Link { name: "eth0".into() }).unwrap();
//! assert!(table.exists(&"eth0".to_string()));
//! ```

mod change;
mod error;
mod table;

pub use change::{MutationKind, Operation, RowChange};
pub use error::{DbError, DbResult};
pub use table::{Row, Table, Trigger};
