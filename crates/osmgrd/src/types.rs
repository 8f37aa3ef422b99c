//! Row types for the inventory, desired-state and applied-state tables.

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use sonic_osmgr_db::Row;

use crate::tables::{ADMIN_DOWN, ADMIN_UP};

/// A kernel network interface known to the agent (`osmgr.intf`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    /// Kernel interface name, e.g. "eth0"
    pub ifname: String,
    /// Last admin state applied to the kernel, absent until configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_status: Option<bool>,
}

impl Interface {
    /// Creates an inventory row for a freshly discovered interface.
    pub fn discovered(ifname: impl Into<String>) -> Self {
        Self {
            ifname: ifname.into(),
            admin_status: None,
        }
    }
}

impl Row for Interface {
    type Key = String;

    fn key(&self) -> String {
        self.ifname.clone()
    }
}

/// Desired port attributes (`config.port`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    pub ifname: String,
    /// Desired admin state; a missing value means down
    #[serde(default, deserialize_with = "admin_status::deserialize")]
    pub admin_status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lanes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
}

impl Row for PortConfig {
    type Key = String;

    fn key(&self) -> String {
        self.ifname.clone()
    }
}

/// Desired interface address (`config.intf`).
///
/// An interface may carry several addresses, so the key is the
/// (ifname, canonical CIDR) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntfAddress {
    pub ifname: String,
    pub ipaddr: IpNetwork,
}

impl Row for IntfAddress {
    type Key = (String, String);

    fn key(&self) -> (String, String) {
        (self.ifname.clone(), self.ipaddr.to_string())
    }
}

/// Port attributes confirmed applied to the kernel (`appl.port`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPort {
    pub ifname: String,
    pub admin_status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lanes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
}

impl From<&PortConfig> for AppliedPort {
    fn from(port: &PortConfig) -> Self {
        Self {
            ifname: port.ifname.clone(),
            admin_status: port.admin_status,
            lanes: port.lanes.clone(),
            speed: port.speed.clone(),
        }
    }
}

impl Row for AppliedPort {
    type Key = String;

    fn key(&self) -> String {
        self.ifname.clone()
    }
}

/// Interface address confirmed applied to the kernel (`appl.intf`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedIntf {
    pub ifname: String,
    pub ipaddr: IpNetwork,
}

impl From<&IntfAddress> for AppliedIntf {
    fn from(addr: &IntfAddress) -> Self {
        Self {
            ifname: addr.ifname.clone(),
            ipaddr: addr.ipaddr,
        }
    }
}

impl Row for AppliedIntf {
    type Key = (String, String);

    fn key(&self) -> (String, String) {
        (self.ifname.clone(), self.ipaddr.to_string())
    }
}

/// Renders an admin state the way `ip link set` expects it.
pub fn admin_status_str(up: bool) -> &'static str {
    if up {
        ADMIN_UP
    } else {
        ADMIN_DOWN
    }
}

/// Accepts `true`/`false` as well as SONiC-style `"up"`/`"down"`.
mod admin_status {
    use serde::de::{Deserializer, Error};
    use serde::Deserialize;

    use crate::tables::{ADMIN_DOWN, ADMIN_UP};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Flag(bool),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Repr::deserialize(deserializer)? {
            Repr::Flag(up) => Ok(up),
            Repr::Text(text) => match text.as_str() {
                ADMIN_UP => Ok(true),
                ADMIN_DOWN => Ok(false),
                other => Err(D::Error::custom(format!(
                    "invalid admin_status '{}', expected up or down",
                    other
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_port_config_admin_status_forms() {
        let port: PortConfig =
            serde_json::from_str(r#"{"ifname":"eth0","admin_status":"up","speed":"100G"}"#)
                .unwrap();
        assert!(port.admin_status);
        assert_eq!(port.speed.as_deref(), Some("100G"));
        assert_eq!(port.lanes, None);

        let port: PortConfig =
            serde_json::from_str(r#"{"ifname":"eth0","admin_status":false}"#).unwrap();
        assert!(!port.admin_status);
    }

    #[test]
    fn test_port_config_missing_admin_status_is_down() {
        let port: PortConfig = serde_json::from_str(r#"{"ifname":"eth0"}"#).unwrap();
        assert!(!port.admin_status);
    }

    #[test]
    fn test_port_config_rejects_unknown_admin_status() {
        let result: Result<PortConfig, _> =
            serde_json::from_str(r#"{"ifname":"eth0","admin_status":"sideways"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_intf_address_key_is_canonical_cidr() {
        let addr: IntfAddress =
            serde_json::from_str(r#"{"ifname":"eth0","ipaddr":"2001:db8:0:0::1/64"}"#).unwrap();
        assert_eq!(
            addr.key(),
            ("eth0".to_string(), "2001:db8::1/64".to_string())
        );
    }

    #[test]
    fn test_applied_rows_mirror_desired() {
        let port = PortConfig {
            ifname: "eth0".to_string(),
            admin_status: true,
            lanes: Some("1".to_string()),
            speed: Some("100G".to_string()),
        };
        let applied = AppliedPort::from(&port);
        assert_eq!(applied.ifname, "eth0");
        assert!(applied.admin_status);
        assert_eq!(applied.lanes.as_deref(), Some("1"));
        assert_eq!(applied.key(), port.key());
    }

    #[test]
    fn test_admin_status_str() {
        assert_eq!(admin_status_str(true), "up");
        assert_eq!(admin_status_str(false), "down");
    }
}
