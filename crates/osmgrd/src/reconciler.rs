//! Reconciler: turns desired-state changes into kernel actuation and
//! applied-state writes.
//!
//! Decisions are made by the pure planners [`plan_port_change`] and
//! [`plan_intf_change`], which only read the inventory. [`Reconciler`]
//! executes the resulting [`Plan`] against a [`KernelActuator`] and the
//! [`AppliedStatePublisher`].
//!
//! # Rules
//!
//! - A change for an interface missing from the inventory is rejected. It is
//!   not retried; a later change to the same row re-evaluates it.
//! - Port insert/update: set link admin state, then upsert `appl.port`.
//! - Address insert: add the address, then upsert `appl.intf`.
//! - Address delete: remove the address (old row image), then delete from
//!   `appl.intf`.
//! - Port delete and address update are ignored.
//! - Old and new rows are never diffed; every update re-issues the actuation.
//! - A failed actuation stops the plan: nothing is written to applied state.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sonic_osmgr_db::RowChange;
use tracing::{debug, error, info, warn};

use crate::actuator::{Actuation, KernelActuator};
use crate::inventory::Inventory;
use crate::publisher::AppliedStatePublisher;
use crate::types::{AppliedIntf, AppliedPort, IntfAddress, PortConfig};

/// Read-only view of discovered interfaces, as needed by the planners.
pub trait InterfaceLookup {
    fn exists(&self, ifname: &str) -> bool;
}

impl InterfaceLookup for Inventory {
    fn exists(&self, ifname: &str) -> bool {
        Inventory::exists(self, ifname)
    }
}

impl InterfaceLookup for HashSet<String> {
    fn exists(&self, ifname: &str) -> bool {
        self.contains(ifname)
    }
}

/// A write to the applied-state tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliedWrite {
    UpsertPort(AppliedPort),
    UpsertIntf(AppliedIntf),
    DeleteIntf(AppliedIntf),
}

/// One step of a reconciliation plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Actuate(Actuation),
    Record(AppliedWrite),
}

/// Decision for a single desired-state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Run the steps in order, stopping at the first failed actuation
    Execute(Vec<Step>),
    /// The interface is not in the inventory
    Reject { ifname: String },
    /// Nothing to do for this kind of change
    Ignore,
}

/// Plans a `config.port` change.
pub fn plan_port_change(change: &RowChange<PortConfig>, interfaces: &dyn InterfaceLookup) -> Plan {
    let port = match change {
        RowChange::Insert { new } | RowChange::Update { new, .. } => new,
        RowChange::Delete { .. } => return Plan::Ignore,
    };

    if !interfaces.exists(&port.ifname) {
        return Plan::Reject {
            ifname: port.ifname.clone(),
        };
    }

    Plan::Execute(vec![
        Step::Actuate(Actuation::SetLinkState {
            ifname: port.ifname.clone(),
            up: port.admin_status,
        }),
        Step::Record(AppliedWrite::UpsertPort(AppliedPort::from(port))),
    ])
}

/// Plans a `config.intf` change.
pub fn plan_intf_change(change: &RowChange<IntfAddress>, interfaces: &dyn InterfaceLookup) -> Plan {
    match change {
        RowChange::Insert { new } => {
            if !interfaces.exists(&new.ifname) {
                return Plan::Reject {
                    ifname: new.ifname.clone(),
                };
            }
            Plan::Execute(vec![
                Step::Actuate(Actuation::AddAddress {
                    ifname: new.ifname.clone(),
                    prefix: new.ipaddr,
                }),
                Step::Record(AppliedWrite::UpsertIntf(AppliedIntf::from(new))),
            ])
        }
        RowChange::Delete { old } => {
            if !interfaces.exists(&old.ifname) {
                return Plan::Reject {
                    ifname: old.ifname.clone(),
                };
            }
            Plan::Execute(vec![
                Step::Actuate(Actuation::RemoveAddress {
                    ifname: old.ifname.clone(),
                    prefix: old.ipaddr,
                }),
                Step::Record(AppliedWrite::DeleteIntf(AppliedIntf::from(old))),
            ])
        }
        RowChange::Update { .. } => Plan::Ignore,
    }
}

/// Result of handling one change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied,
    Rejected,
    Ignored,
    ActuationFailed,
}

/// Outcome counters.
#[derive(Debug, Default)]
pub struct ReconcileStats {
    applied: AtomicU64,
    rejected: AtomicU64,
    ignored: AtomicU64,
    failed: AtomicU64,
}

impl ReconcileStats {
    fn count(&self, outcome: ReconcileOutcome) {
        let counter = match outcome {
            ReconcileOutcome::Applied => &self.applied,
            ReconcileOutcome::Rejected => &self.rejected,
            ReconcileOutcome::Ignored => &self.ignored,
            ReconcileOutcome::ActuationFailed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

impl fmt::Display for ReconcileStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "applied={} rejected={} ignored={} failed={}",
            self.applied(),
            self.rejected(),
            self.ignored(),
            self.failed()
        )
    }
}

/// Executes reconciliation plans.
///
/// Holds its collaborators explicitly; there is no process-wide state.
pub struct Reconciler {
    inventory: Inventory,
    actuator: Arc<dyn KernelActuator>,
    publisher: AppliedStatePublisher,
    stats: Arc<ReconcileStats>,
}

impl Reconciler {
    pub fn new(
        inventory: Inventory,
        actuator: Arc<dyn KernelActuator>,
        publisher: AppliedStatePublisher,
    ) -> Self {
        Self {
            inventory,
            actuator,
            publisher,
            stats: Arc::new(ReconcileStats::default()),
        }
    }

    /// Handles a committed `config.port` change.
    pub fn on_port_change(&self, change: &RowChange<PortConfig>) -> ReconcileOutcome {
        debug!(kind = ?change.kind(), ifname = %change.row().ifname, "Port config changed");
        self.execute(plan_port_change(change, &self.inventory))
    }

    /// Handles a committed `config.intf` change.
    pub fn on_intf_change(&self, change: &RowChange<IntfAddress>) -> ReconcileOutcome {
        debug!(
            kind = ?change.kind(),
            ifname = %change.row().ifname,
            ipaddr = %change.row().ipaddr,
            "Interface address changed"
        );
        self.execute(plan_intf_change(change, &self.inventory))
    }

    /// Runs a plan and records its outcome.
    pub fn execute(&self, plan: Plan) -> ReconcileOutcome {
        let outcome = match plan {
            Plan::Ignore => {
                debug!("Change ignored");
                ReconcileOutcome::Ignored
            }
            Plan::Reject { ifname } => {
                warn!(ifname = %ifname, "Interface does not exist, change not applied");
                ReconcileOutcome::Rejected
            }
            Plan::Execute(steps) => self.run_steps(steps),
        };
        self.stats.count(outcome);
        outcome
    }

    fn run_steps(&self, steps: Vec<Step>) -> ReconcileOutcome {
        for step in steps {
            match step {
                Step::Actuate(actuation) => {
                    if let Err(e) = actuation.apply(self.actuator.as_ref()) {
                        error!(
                            ifname = %actuation.ifname(),
                            error = %e,
                            "Kernel actuation failed, applied state unchanged"
                        );
                        return ReconcileOutcome::ActuationFailed;
                    }
                    if let Actuation::SetLinkState { ifname, up } = &actuation {
                        if let Err(e) = self.inventory.set_admin_status(ifname, *up) {
                            warn!(ifname = %ifname, error = %e, "Failed to record admin status");
                        }
                    }
                }
                Step::Record(write) => self.publisher.record(write),
            }
        }
        info!("Change applied");
        ReconcileOutcome::Applied
    }

    pub fn stats(&self) -> Arc<ReconcileStats> {
        self.stats.clone()
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("inventory", &self.inventory.len())
            .field("stats", &self.stats.to_string())
            .finish()
    }
}
