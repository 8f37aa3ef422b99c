//! Kernel actuation: the operations that change live link and address state.
//!
//! [`KernelActuator`] is the seam between the reconciler and the kernel.
//! [`IpCommandActuator`] applies changes through iproute2, [`DryRunActuator`]
//! only logs them, and [`RecordingActuator`] keeps them for inspection in tests.

use std::fmt;
use std::process::{Command, Output};
use std::sync::atomic::{AtomicBool, Ordering};

use ipnetwork::IpNetwork;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{OsmgrError, Result};
use crate::tables::IP_CMD;
use crate::types::admin_status_str;

/// Kernel operations used by the reconciler.
///
/// The reconciler re-issues operations on every update, so implementations
/// must tolerate repeats (setting an up link up again succeeds).
#[cfg_attr(test, mockall::automock)]
pub trait KernelActuator: Send + Sync {
    /// Sets the administrative state of a link.
    fn set_link_state(&self, ifname: &str, up: bool) -> Result<()>;

    /// Adds an address (canonical CIDR) to an interface.
    fn add_address(&self, ifname: &str, prefix: &IpNetwork) -> Result<()>;

    /// Removes an address (canonical CIDR) from an interface.
    fn remove_address(&self, ifname: &str, prefix: &IpNetwork) -> Result<()>;
}

/// One kernel operation, as planned by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actuation {
    SetLinkState { ifname: String, up: bool },
    AddAddress { ifname: String, prefix: IpNetwork },
    RemoveAddress { ifname: String, prefix: IpNetwork },
}

impl Actuation {
    /// Interface the operation targets.
    pub fn ifname(&self) -> &str {
        match self {
            Actuation::SetLinkState { ifname, .. }
            | Actuation::AddAddress { ifname, .. }
            | Actuation::RemoveAddress { ifname, .. } => ifname,
        }
    }

    /// Runs the operation against an actuator.
    pub fn apply(&self, actuator: &dyn KernelActuator) -> Result<()> {
        match self {
            Actuation::SetLinkState { ifname, up } => actuator.set_link_state(ifname, *up),
            Actuation::AddAddress { ifname, prefix } => actuator.add_address(ifname, prefix),
            Actuation::RemoveAddress { ifname, prefix } => actuator.remove_address(ifname, prefix),
        }
    }

    /// iproute2 arguments for the operation.
    pub fn ip_args(&self) -> Vec<String> {
        match self {
            Actuation::SetLinkState { ifname, up } => vec![
                "link".to_string(),
                "set".to_string(),
                "dev".to_string(),
                ifname.clone(),
                admin_status_str(*up).to_string(),
            ],
            Actuation::AddAddress { ifname, prefix } => vec![
                "address".to_string(),
                "add".to_string(),
                prefix.to_string(),
                "dev".to_string(),
                ifname.clone(),
            ],
            Actuation::RemoveAddress { ifname, prefix } => vec![
                "address".to_string(),
                "del".to_string(),
                prefix.to_string(),
                "dev".to_string(),
                ifname.clone(),
            ],
        }
    }
}

impl fmt::Display for Actuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ip {}", self.ip_args().join(" "))
    }
}

/// Applies changes by running the iproute2 `ip` binary.
///
/// Arguments are passed as argv, never through a shell, so interface names
/// need no quoting.
#[derive(Debug, Clone)]
pub struct IpCommandActuator {
    ip_cmd: String,
}

impl IpCommandActuator {
    /// Creates an actuator using the given `ip` binary path.
    pub fn new(ip_cmd: impl Into<String>) -> Self {
        Self {
            ip_cmd: ip_cmd.into(),
        }
    }

    /// Path of the `ip` binary in use.
    pub fn ip_cmd(&self) -> &str {
        &self.ip_cmd
    }

    fn run(&self, actuation: &Actuation) -> Result<()> {
        let args = actuation.ip_args();
        let command = format!("{} {}", self.ip_cmd, args.join(" "));
        info!(command = %command, "Applying kernel change");

        let output = Command::new(&self.ip_cmd)
            .args(&args)
            .output()
            .map_err(|source| OsmgrError::ActuatorSpawn {
                command: command.clone(),
                source,
            })?;

        if output.status.success() {
            debug!(command = %command, "Command succeeded");
            return Ok(());
        }

        let exit_code = output.status.code().unwrap_or(-1);
        let output = combined_output(&output);
        warn!(command = %command, exit_code, output = %output, "Command failed");
        Err(OsmgrError::ActuatorFailed {
            command,
            exit_code,
            output,
        })
    }
}

impl Default for IpCommandActuator {
    fn default() -> Self {
        Self::new(IP_CMD)
    }
}

impl KernelActuator for IpCommandActuator {
    fn set_link_state(&self, ifname: &str, up: bool) -> Result<()> {
        self.run(&Actuation::SetLinkState {
            ifname: ifname.to_string(),
            up,
        })
    }

    fn add_address(&self, ifname: &str, prefix: &IpNetwork) -> Result<()> {
        self.run(&Actuation::AddAddress {
            ifname: ifname.to_string(),
            prefix: *prefix,
        })
    }

    fn remove_address(&self, ifname: &str, prefix: &IpNetwork) -> Result<()> {
        self.run(&Actuation::RemoveAddress {
            ifname: ifname.to_string(),
            prefix: *prefix,
        })
    }
}

/// Returns stdout and stderr joined for error messages.
fn combined_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        stdout
    } else if stdout.is_empty() {
        stderr
    } else {
        format!("{}\n{}", stdout, stderr)
    }
}

/// Logs every requested operation and reports success without touching the
/// kernel. Used for `kernel.dry_run`; nothing is retained.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunActuator;

impl DryRunActuator {
    fn log(&self, actuation: Actuation) -> Result<()> {
        info!(command = %actuation, "Dry run, kernel change not applied");
        Ok(())
    }
}

impl KernelActuator for DryRunActuator {
    fn set_link_state(&self, ifname: &str, up: bool) -> Result<()> {
        self.log(Actuation::SetLinkState {
            ifname: ifname.to_string(),
            up,
        })
    }

    fn add_address(&self, ifname: &str, prefix: &IpNetwork) -> Result<()> {
        self.log(Actuation::AddAddress {
            ifname: ifname.to_string(),
            prefix: *prefix,
        })
    }

    fn remove_address(&self, ifname: &str, prefix: &IpNetwork) -> Result<()> {
        self.log(Actuation::RemoveAddress {
            ifname: ifname.to_string(),
            prefix: *prefix,
        })
    }
}

/// Records every requested operation without touching the kernel.
///
/// The history grows until [`RecordingActuator::clear`], so this is a test
/// fake. Calls can be made to fail with [`RecordingActuator::set_failing`].
#[derive(Debug, Default)]
pub struct RecordingActuator {
    calls: Mutex<Vec<Actuation>>,
    failing: AtomicBool,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent calls fail (they are still recorded).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns the operations requested so far, in order.
    pub fn calls(&self) -> Vec<Actuation> {
        self.calls.lock().clone()
    }

    /// Forgets recorded operations.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, actuation: Actuation) -> Result<()> {
        info!(command = %actuation, "Recording kernel change (not applied)");
        let failing = self.failing.load(Ordering::SeqCst);
        let command = actuation.to_string();
        self.calls.lock().push(actuation);
        if failing {
            return Err(OsmgrError::ActuatorFailed {
                command,
                exit_code: 1,
                output: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl KernelActuator for RecordingActuator {
    fn set_link_state(&self, ifname: &str, up: bool) -> Result<()> {
        self.record(Actuation::SetLinkState {
            ifname: ifname.to_string(),
            up,
        })
    }

    fn add_address(&self, ifname: &str, prefix: &IpNetwork) -> Result<()> {
        self.record(Actuation::AddAddress {
            ifname: ifname.to_string(),
            prefix: *prefix,
        })
    }

    fn remove_address(&self, ifname: &str, prefix: &IpNetwork) -> Result<()> {
        self.record(Actuation::RemoveAddress {
            ifname: ifname.to_string(),
            prefix: *prefix,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn prefix(s: &str) -> IpNetwork {
        s.parse().unwrap()
    }

    #[test]
    fn test_actuation_display() {
        let set = Actuation::SetLinkState {
            ifname: "eth0".to_string(),
            up: true,
        };
        assert_eq!(set.to_string(), "ip link set dev eth0 up");

        let add = Actuation::AddAddress {
            ifname: "eth0".to_string(),
            prefix: prefix("10.0.0.1/24"),
        };
        assert_eq!(add.to_string(), "ip address add 10.0.0.1/24 dev eth0");

        let del = Actuation::RemoveAddress {
            ifname: "eth0".to_string(),
            prefix: prefix("2001:db8:0::1/64"),
        };
        assert_eq!(del.to_string(), "ip address del 2001:db8::1/64 dev eth0");
        assert_eq!(del.ifname(), "eth0");
    }

    #[test]
    fn test_recording_actuator_records_in_order() {
        let actuator = RecordingActuator::new();
        actuator.set_link_state("eth0", false).unwrap();
        actuator.add_address("eth0", &prefix("10.0.0.1/24")).unwrap();

        assert_eq!(
            actuator.calls(),
            vec![
                Actuation::SetLinkState {
                    ifname: "eth0".to_string(),
                    up: false,
                },
                Actuation::AddAddress {
                    ifname: "eth0".to_string(),
                    prefix: prefix("10.0.0.1/24"),
                },
            ]
        );

        actuator.clear();
        assert!(actuator.calls().is_empty());
    }

    #[test]
    fn test_recording_actuator_failing() {
        let actuator = RecordingActuator::new();
        actuator.set_failing(true);
        let err = actuator.set_link_state("eth0", true).unwrap_err();
        assert!(matches!(err, OsmgrError::ActuatorFailed { .. }));
        assert_eq!(actuator.calls().len(), 1);
    }

    #[test]
    fn test_dry_run_actuator_always_succeeds() {
        let actuator = DryRunActuator;
        assert!(actuator.set_link_state("eth0", true).is_ok());
        assert!(actuator.add_address("eth0", &prefix("10.0.0.1/24")).is_ok());
        assert!(actuator.remove_address("no-such-if", &prefix("10.0.0.1/24")).is_ok());
    }

    #[test]
    fn test_actuation_apply_dispatch() {
        let mut mock = MockKernelActuator::new();
        mock.expect_remove_address()
            .withf(|ifname, prefix| ifname == "eth1" && prefix.to_string() == "10.1.0.1/16")
            .times(1)
            .returning(|_, _| Ok(()));

        let actuation = Actuation::RemoveAddress {
            ifname: "eth1".to_string(),
            prefix: prefix("10.1.0.1/16"),
        };
        assert!(actuation.apply(&mock).is_ok());
    }

    #[test]
    fn test_ip_command_success() {
        // echo accepts any arguments and exits 0
        let actuator = IpCommandActuator::new("echo");
        assert!(actuator.set_link_state("eth0", true).is_ok());
    }

    #[test]
    fn test_ip_command_failure() {
        let actuator = IpCommandActuator::new("false");
        match actuator.add_address("eth0", &prefix("10.0.0.1/24")) {
            Err(OsmgrError::ActuatorFailed {
                command, exit_code, ..
            }) => {
                assert_eq!(exit_code, 1);
                assert_eq!(command, "false address add 10.0.0.1/24 dev eth0");
            }
            other => panic!("Expected ActuatorFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_ip_command_spawn_failure() {
        let actuator = IpCommandActuator::new("/nonexistent/ip");
        let err = actuator.set_link_state("eth0", false).unwrap_err();
        assert!(matches!(err, OsmgrError::ActuatorSpawn { .. }));
    }

    #[test]
    fn test_default_ip_cmd() {
        assert_eq!(IpCommandActuator::default().ip_cmd(), "/sbin/ip");
    }
}
