//! Table and field name constants

// osmgr database (interface inventory)
pub const OSMGR_INTF_TABLE: &str = "osmgr.intf";

// config database (desired state, replicated in from SysDB)
pub const CFG_PORT_TABLE: &str = "config.port";
pub const CFG_INTF_TABLE: &str = "config.intf";

// appl database (applied state, replicated out to SysDB)
pub const APPL_PORT_TABLE: &str = "appl.port";
pub const APPL_INTF_TABLE: &str = "appl.intf";

// Kernel command
pub const IP_CMD: &str = "/sbin/ip";

// Admin status values
pub const ADMIN_UP: &str = "up";
pub const ADMIN_DOWN: &str = "down";
