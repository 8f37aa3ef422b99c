//! The OS manager agent: wires tables, reconciler and publisher together.

use std::sync::Arc;

use sonic_osmgr_db::MutationKind;
use tokio::sync::oneshot;
use tracing::info;

use crate::actuator::KernelActuator;
use crate::db::{ApplDb, ConfigDb};
use crate::error::{OsmgrError, Result};
use crate::inventory::Inventory;
use crate::netlink::{
    record_discoveries, spawn_listener, LinkEnumerator, LinkEventSource, LinkNotification,
};
use crate::publisher::AppliedStatePublisher;
use crate::reconciler::{ReconcileStats, Reconciler};
use crate::replication::{ConfigChange, ReplicationSink};

/// One agent instance.
///
/// Every collaborator is passed in or created here; two agents in the same
/// process share nothing.
#[derive(Debug)]
pub struct OsMgr {
    inventory: Inventory,
    config: ConfigDb,
    publisher: AppliedStatePublisher,
    reconciler: Arc<Reconciler>,
}

impl OsMgr {
    /// Creates the agent and registers the reconciler on the config tables.
    pub fn new(actuator: Arc<dyn KernelActuator>, sink: Arc<dyn ReplicationSink>) -> Self {
        let inventory = Inventory::new();
        let publisher = AppliedStatePublisher::new(sink);
        let reconciler = Arc::new(Reconciler::new(
            inventory.clone(),
            actuator,
            publisher.clone(),
        ));

        let config = ConfigDb::new();
        let port_reconciler = reconciler.clone();
        config.port.on_change(move |change| {
            port_reconciler.on_port_change(change);
        });
        let intf_reconciler = reconciler.clone();
        config.intf.on_change(move |change| {
            intf_reconciler.on_intf_change(change);
        });

        Self {
            inventory,
            config,
            publisher,
            reconciler,
        }
    }

    /// Records every interface that already exists in the kernel.
    ///
    /// Must run before the live listener starts. Returns how many interfaces
    /// were new.
    pub fn bootstrap(&self, enumerator: &dyn LinkEnumerator) -> Result<usize> {
        let notifications: Vec<LinkNotification> = enumerator
            .link_names()
            .map_err(|e| match e {
                OsmgrError::Enumerate(_) => e,
                other => OsmgrError::Enumerate(other.to_string()),
            })?
            .into_iter()
            .map(|ifname| LinkNotification::Created { ifname })
            .collect();

        let added = record_discoveries(&self.inventory, &notifications);
        info!(found = notifications.len(), added, "Bootstrap enumeration complete");
        Ok(added)
    }

    /// Starts the live listener feeding this agent's inventory.
    pub fn start_listener<S>(&self, source: S) -> Result<oneshot::Receiver<OsmgrError>>
    where
        S: LinkEventSource + 'static,
    {
        spawn_listener(source, self.inventory.clone())
    }

    /// Applies one desired-state change; the reconciler runs before this returns.
    pub fn apply_config(&self, change: ConfigChange) -> Option<MutationKind> {
        self.config.apply(change)
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn config(&self) -> &ConfigDb {
        &self.config
    }

    pub fn applied(&self) -> &ApplDb {
        self.publisher.applied()
    }

    pub fn stats(&self) -> Arc<ReconcileStats> {
        self.reconciler.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{Actuation, RecordingActuator};
    use crate::netlink::MockLinkEnumerator;
    use crate::replication::ReplicationBridge;
    use crate::types::PortConfig;
    use pretty_assertions::assert_eq;
    use sonic_osmgr_db::Operation;

    fn agent() -> (OsMgr, Arc<RecordingActuator>) {
        let actuator = Arc::new(RecordingActuator::new());
        let agent = OsMgr::new(actuator.clone(), Arc::new(ReplicationBridge::new(16)));
        (agent, actuator)
    }

    #[test]
    fn test_bootstrap_records_links() {
        let (agent, _) = agent();
        let mut enumerator = MockLinkEnumerator::new();
        enumerator
            .expect_link_names()
            .times(1)
            .returning(|| Ok(vec!["lo".to_string(), "eth0".to_string(), "lo".to_string()]));

        assert_eq!(agent.bootstrap(&enumerator).unwrap(), 2);
        assert!(agent.inventory().exists("lo"));
        assert!(agent.inventory().exists("eth0"));
    }

    #[test]
    fn test_bootstrap_failure_is_fatal() {
        let (agent, _) = agent();
        let mut enumerator = MockLinkEnumerator::new();
        enumerator
            .expect_link_names()
            .returning(|| Err(OsmgrError::Io(std::io::Error::other("EMFILE"))));

        let err = agent.bootstrap(&enumerator).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_config_trigger_runs_reconciler() {
        let (agent, actuator) = agent();
        agent.inventory().record("eth0");

        agent.apply_config(ConfigChange::Port {
            op: Operation::Set,
            row: PortConfig {
                ifname: "eth0".to_string(),
                admin_status: false,
                lanes: None,
                speed: None,
            },
        });

        assert_eq!(
            actuator.calls(),
            vec![Actuation::SetLinkState {
                ifname: "eth0".to_string(),
                up: false,
            }]
        );
        assert!(agent.applied().port.exists(&"eth0".to_string()));
        assert_eq!(agent.stats().applied(), 1);
    }
}
