//! Keyed row table with after-commit triggers.
//!
//! Like `SyncMap`, a [`Table`] never creates rows implicitly: every write is
//! an explicit insert, upsert, update or delete, and lookups return `Option`.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::change::{MutationKind, RowChange};
use crate::error::{DbError, DbResult};

/// A row stored in a [`Table`].
pub trait Row: Clone + fmt::Debug + Send + Sync + 'static {
    /// Primary key type.
    type Key: Ord + Clone + fmt::Debug + Send + Sync + 'static;

    /// Returns the primary key of this row.
    fn key(&self) -> Self::Key;
}

/// Callback invoked after every committed change.
pub type Trigger<R> = Box<dyn Fn(&RowChange<R>) + Send + Sync>;

/// A keyed set of rows with point operations and change triggers.
///
/// # Concurrency
///
/// Rows live behind a `RwLock`; each mutation is a single atomic write.
/// Mutations on one table are additionally serialized by a notification
/// mutex that is held while the triggers run, so triggers observe changes
/// one at a time in commit order. A trigger must not write to the table it
/// is registered on.
pub struct Table<R: Row> {
    name: String,
    rows: RwLock<BTreeMap<R::Key, R>>,
    triggers: RwLock<Vec<Trigger<R>>>,
    notify: Mutex<()>,
}

impl<R: Row> Table<R> {
    /// Creates an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: RwLock::new(BTreeMap::new()),
            triggers: RwLock::new(Vec::new()),
            notify: Mutex::new(()),
        }
    }

    /// Returns the table name (e.g. "config.port").
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a trigger fired after every committed insert, update and delete.
    pub fn on_change<F>(&self, trigger: F)
    where
        F: Fn(&RowChange<R>) + Send + Sync + 'static,
    {
        self.triggers.write().push(Box::new(trigger));
    }

    /// Inserts a new row.
    ///
    /// Fails with [`DbError::DuplicateKey`] if the key is already present; in
    /// that case the table is unchanged and no trigger fires.
    pub fn insert(&self, row: R) -> DbResult<()> {
        let _serial = self.notify.lock();
        {
            let mut rows = self.rows.write();
            match rows.entry(row.key()) {
                Entry::Occupied(slot) => {
                    return Err(DbError::duplicate_key(&self.name, format!("{:?}", slot.key())));
                }
                Entry::Vacant(slot) => {
                    slot.insert(row.clone());
                }
            }
        }
        self.fire(&RowChange::Insert { new: row });
        Ok(())
    }

    /// Inserts the row, or replaces the row with the same key.
    ///
    /// Returns which of the two happened.
    pub fn upsert(&self, row: R) -> MutationKind {
        let _serial = self.notify.lock();
        let previous = self.rows.write().insert(row.key(), row.clone());
        let change = match previous {
            Some(old) => RowChange::Update { old, new: row },
            None => RowChange::Insert { new: row },
        };
        let kind = change.kind();
        self.fire(&change);
        kind
    }

    /// Modifies an existing row in place.
    ///
    /// The closure must not change the row's key. Fails with
    /// [`DbError::KeyNotFound`] if no row has the given key.
    pub fn update_with<F>(&self, key: &R::Key, f: F) -> DbResult<()>
    where
        F: FnOnce(&mut R),
    {
        let _serial = self.notify.lock();
        let change = {
            let mut rows = self.rows.write();
            let Some(row) = rows.get_mut(key) else {
                return Err(DbError::key_not_found(&self.name, format!("{:?}", key)));
            };
            let old = row.clone();
            f(row);
            debug_assert!(row.key() == *key, "update_with changed the row key");
            RowChange::Update {
                old,
                new: row.clone(),
            }
        };
        self.fire(&change);
        Ok(())
    }

    /// Deletes the row with the given key, returning it.
    ///
    /// Deleting an absent key is a no-op and fires no trigger.
    pub fn delete(&self, key: &R::Key) -> Option<R> {
        let _serial = self.notify.lock();
        let old = self.rows.write().remove(key)?;
        self.fire(&RowChange::Delete { old: old.clone() });
        Some(old)
    }

    /// Returns true if a row with the given key exists.
    pub fn exists(&self, key: &R::Key) -> bool {
        self.rows.read().contains_key(key)
    }

    /// Returns a copy of the row with the given key.
    pub fn get(&self, key: &R::Key) -> Option<R> {
        self.rows.read().get(key).cloned()
    }

    /// Returns a snapshot of all rows in key order.
    pub fn rows(&self) -> Vec<R> {
        self.rows.read().values().cloned().collect()
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns true if the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    fn fire(&self, change: &RowChange<R>) {
        trace!(table = %self.name, kind = ?change.kind(), row = ?change.row(), "Row committed");
        for trigger in self.triggers.read().iter() {
            trigger(change);
        }
    }
}

impl<R: Row> fmt::Debug for Table<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("rows", &self.len())
            .field("triggers", &self.triggers.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Link {
        name: String,
        value: u32,
    }

    impl Row for Link {
        type Key = String;

        fn key(&self) -> String {
            self.name.clone()
        }
    }

    fn entry(name: &str, value: u32) -> Link {
        Link {
            name: name.to_string(),
            value,
        }
    }

    fn recording_table() -> (Table<Link>, Arc<Mutex<Vec<RowChange<Link>>>>) {
        let table = Table::new("test.entry");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        table.on_change(move |change| sink.lock().push(change.clone()));
        (table, seen)
    }

    #[test]
    fn test_insert_and_lookup() {
        let table = Table::new("test.entry");
        table.insert(entry("eth0", 1)).unwrap();

        assert!(table.exists(&"eth0".to_string()));
        assert!(!table.exists(&"eth1".to_string()));
        assert_eq!(table.get(&"eth0".to_string()), Some(entry("eth0", 1)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_insert_duplicate_is_rejected_without_trigger() {
        let (table, seen) = recording_table();
        table.insert(entry("eth0", 1)).unwrap();

        let err = table.insert(entry("eth0", 2)).unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(table.get(&"eth0".to_string()), Some(entry("eth0", 1)));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_upsert_reports_kind() {
        let (table, seen) = recording_table();

        assert_eq!(table.upsert(entry("eth0", 1)), MutationKind::Insert);
        assert_eq!(table.upsert(entry("eth0", 2)), MutationKind::Update);

        let seen = seen.lock();
        assert_eq!(seen[1].old_row(), Some(&entry("eth0", 1)));
        assert_eq!(seen[1].new_row(), Some(&entry("eth0", 2)));
    }

    #[test]
    fn test_update_with() {
        let (table, seen) = recording_table();
        table.insert(entry("eth0", 1)).unwrap();

        table
            .update_with(&"eth0".to_string(), |row| row.value = 5)
            .unwrap();
        assert_eq!(table.get(&"eth0".to_string()), Some(entry("eth0", 5)));
        assert_eq!(seen.lock()[1].kind(), MutationKind::Update);

        let err = table.update_with(&"eth9".to_string(), |_| {}).unwrap_err();
        assert!(matches!(err, DbError::KeyNotFound { .. }));
    }

    #[test]
    fn test_delete() {
        let (table, seen) = recording_table();
        table.insert(entry("eth0", 1)).unwrap();

        assert_eq!(table.delete(&"eth0".to_string()), Some(entry("eth0", 1)));
        assert_eq!(table.delete(&"eth0".to_string()), None);
        assert!(table.is_empty());

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], RowChange::Delete { old: entry("eth0", 1) });
    }

    #[test]
    fn test_rows_in_key_order() {
        let table = Table::new("test.entry");
        table.insert(entry("eth2", 2)).unwrap();
        table.insert(entry("eth0", 0)).unwrap();
        table.insert(entry("eth1", 1)).unwrap();

        let names: Vec<_> = table.rows().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["eth0", "eth1", "eth2"]);
    }

    #[test]
    fn test_trigger_can_read_own_table() {
        let table: Arc<Table<Link>> = Arc::new(Table::new("test.entry"));
        let observed = Arc::new(Mutex::new(None));
        let (reader, out) = (Arc::downgrade(&table), observed.clone());
        table.on_change(move |change: &RowChange<Link>| {
            if let Some(table) = reader.upgrade() {
                *out.lock() = Some(table.exists(&change.row().name));
            }
        });

        table.insert(entry("eth0", 1)).unwrap();
        assert_eq!(*observed.lock(), Some(true));
    }
}
