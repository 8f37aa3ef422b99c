//! Row change notifications.

use serde::{Deserialize, Serialize};

/// Kind of committed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    /// A new row was inserted.
    Insert,
    /// An existing row was replaced.
    Update,
    /// A row was removed.
    Delete,
}

impl MutationKind {
    /// Returns the replication operation for this mutation.
    pub fn operation(&self) -> Operation {
        match self {
            MutationKind::Insert | MutationKind::Update => Operation::Set,
            MutationKind::Delete => Operation::Del,
        }
    }
}

/// Operation type carried on replication streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Set operation (add or update)
    Set,
    /// Delete operation
    Del,
}

impl Operation {
    /// Returns true if this is a Set operation.
    pub fn is_set(&self) -> bool {
        matches!(self, Operation::Set)
    }

    /// Returns true if this is a Del operation.
    pub fn is_del(&self) -> bool {
        matches!(self, Operation::Del)
    }
}

/// A committed change to one row, with its before and after images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowChange<R> {
    /// Row inserted.
    Insert {
        /// The inserted row.
        new: R,
    },
    /// Row replaced.
    Update {
        /// Row image before the update.
        old: R,
        /// Row image after the update.
        new: R,
    },
    /// Row removed.
    Delete {
        /// The removed row.
        old: R,
    },
}

impl<R> RowChange<R> {
    /// Returns the mutation kind.
    pub fn kind(&self) -> MutationKind {
        match self {
            RowChange::Insert { .. } => MutationKind::Insert,
            RowChange::Update { .. } => MutationKind::Update,
            RowChange::Delete { .. } => MutationKind::Delete,
        }
    }

    /// Row image before the change, absent for inserts.
    pub fn old_row(&self) -> Option<&R> {
        match self {
            RowChange::Insert { .. } => None,
            RowChange::Update { old, .. } | RowChange::Delete { old } => Some(old),
        }
    }

    /// Row image after the change, absent for deletes.
    pub fn new_row(&self) -> Option<&R> {
        match self {
            RowChange::Insert { new } | RowChange::Update { new, .. } => Some(new),
            RowChange::Delete { .. } => None,
        }
    }

    /// The row the change is about: the new image, or the old one for deletes.
    pub fn row(&self) -> &R {
        match self {
            RowChange::Insert { new } | RowChange::Update { new, .. } => new,
            RowChange::Delete { old } => old,
        }
    }

    /// Consumes the change, returning the row it is about.
    pub fn into_row(self) -> R {
        match self {
            RowChange::Insert { new } | RowChange::Update { new, .. } => new,
            RowChange::Delete { old } => old,
        }
    }

    /// Returns the replication operation for this change.
    pub fn operation(&self) -> Operation {
        self.kind().operation()
    }
}
