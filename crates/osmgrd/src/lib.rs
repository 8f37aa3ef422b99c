//! OS Manager Daemon
//!
//! Discovers kernel network interfaces, applies desired port and address
//! configuration to the kernel, and republishes what was applied.
//!
//! Data flows in one direction:
//!
//! ```text
//! netlink / getifaddrs --> osmgr.intf (Inventory)
//!                               |  exists?
//! replication in --> config.port / config.intf --trigger--> Reconciler
//!                                                              |
//!                                               KernelActuator (ip link / ip address)
//!                                                              |  on success
//!                               appl.port / appl.intf --trigger--> replication out
//! ```

pub mod actuator;
pub mod agent;
pub mod config;
pub mod db;
pub mod error;
pub mod inventory;
pub mod netlink;
pub mod publisher;
pub mod reconciler;
pub mod replication;
pub mod tables;
pub mod types;

pub use actuator::{
    Actuation, DryRunActuator, IpCommandActuator, KernelActuator, RecordingActuator,
};
pub use agent::OsMgr;
pub use config::{
    InboundSource, KernelConfig, LogFormat, LoggingConfig, OsmgrConfig, OutboundSink,
    ReplicationConfig, DEFAULT_CONFIG_PATH,
};
pub use db::{ApplDb, ConfigDb};
pub use error::*;
pub use inventory::Inventory;
pub use netlink::{
    record_discoveries, run_listener, spawn_listener, IfAddrsEnumerator, LinkEnumerator,
    LinkEventListener, LinkEventSource, LinkNotification,
};
pub use publisher::AppliedStatePublisher;
pub use reconciler::{
    plan_intf_change, plan_port_change, AppliedWrite, InterfaceLookup, Plan, ReconcileOutcome,
    ReconcileStats, Reconciler, Step,
};
pub use replication::{
    log_outbound, pump_inbound, pump_outbound, AppliedChange, ConfigChange, ReplicationBridge,
    ReplicationSink,
};
pub use types::{AppliedIntf, AppliedPort, IntfAddress, Interface, PortConfig};
