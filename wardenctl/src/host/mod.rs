//! Live host facts
//!
//! Privilege, port occupancy and clock state are read from the host each
//! time a step asks; nothing is cached across steps.

use std::net::{Ipv4Addr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::process::{CommandRunner, CommandSpec};

/// Occupancy of a TCP port
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortStatus {
    Free,
    /// Bound by some process; the owner's command name when it could be found
    Bound { owner: Option<String> },
}

#[async_trait]
pub trait HostFacts: Send + Sync {
    /// Whether the process runs with administrative privilege
    fn is_elevated(&self) -> bool;

    /// Current occupancy of a TCP port
    async fn port_status(&self, port: u16) -> PortStatus;

    /// Whether the clock is synchronized, `None` when no sync mechanism answers
    async fn clock_synchronized(&self) -> Option<bool>;

    /// Ask the sync mechanism to synchronize. Returns false if it is unavailable.
    async fn request_time_sync(&self) -> bool;
}

/// Host facts read from the running system
pub struct SystemHost {
    runner: Arc<dyn CommandRunner>,
    query_timeout: Duration,
}

impl SystemHost {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            query_timeout: Duration::from_secs(10),
        }
    }

    async fn port_owner(&self, port: u16) -> Option<String> {
        let spec = CommandSpec::new("ss")
            .args(["-H", "-ltnp"])
            .arg(format!("sport = :{}", port))
            .timeout(self.query_timeout);
        match self.runner.run(&spec).await {
            Ok(output) if output.success() => parse_ss_owner(&output.stdout),
            Ok(output) => {
                debug!(port, diagnostic = %output.diagnostic(), "ss lookup failed");
                None
            }
            Err(e) => {
                debug!(port, error = %e, "ss unavailable");
                None
            }
        }
    }
}

#[async_trait]
impl HostFacts for SystemHost {
    fn is_elevated(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }

    async fn port_status(&self, port: u16) -> PortStatus {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)) {
            Ok(listener) => {
                drop(listener);
                PortStatus::Free
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => PortStatus::Bound {
                owner: self.port_owner(port).await,
            },
            Err(e) => {
                warn!(port, error = %e, "Unable to probe port, assuming free");
                PortStatus::Free
            }
        }
    }

    async fn clock_synchronized(&self) -> Option<bool> {
        let spec = CommandSpec::new("timedatectl")
            .args(["show", "-p", "NTPSynchronized", "--value"])
            .timeout(self.query_timeout);
        match self.runner.run(&spec).await {
            Ok(output) if output.success() => Some(output.stdout.trim() == "yes"),
            _ => None,
        }
    }

    async fn request_time_sync(&self) -> bool {
        let spec = CommandSpec::new("timedatectl")
            .args(["set-ntp", "true"])
            .timeout(self.query_timeout);
        matches!(self.runner.run(&spec).await, Ok(output) if output.success())
    }
}

/// Extract the first process name from `ss -p` output,
/// e.g. `users:(("nginx",pid=812,fd=6))` yields `nginx`.
pub fn parse_ss_owner(output: &str) -> Option<String> {
    let start = output.find("((\"")? + 3;
    let rest = &output[start..];
    let end = rest.find('"')?;
    let name = &rest[..end];
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
