//! Preflight checks: privilege, port availability, clock sync

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::errors::DeployError;
use crate::host::{HostFacts, PortStatus};
use crate::models::step::{StepName, StepResult};

/// Fail unless the process runs with administrative privilege
pub fn require_elevated(host: &dyn HostFacts) -> Result<(), DeployError> {
    if host.is_elevated() {
        Ok(())
    } else {
        Err(DeployError::PermissionError(
            "wardenctl must run as root (try sudo)".to_string(),
        ))
    }
}

/// Fail if `port` is bound by a process that is not part of this deployment
pub async fn check_port(
    host: &dyn HostFacts,
    port: u16,
    managed_port_owners: &[String],
) -> Result<(), DeployError> {
    match host.port_status(port).await {
        PortStatus::Free => Ok(()),
        PortStatus::Bound { owner: Some(owner) }
            if managed_port_owners.iter().any(|m| *m == owner) =>
        {
            debug!(port, %owner, "Port held by a managed service");
            Ok(())
        }
        PortStatus::Bound { owner } => Err(DeployError::PortConflictError { port, owner }),
    }
}

/// Run every preflight check in order.
///
/// `required_ports` must be free. `default_ports` are only offered as
/// defaults later on, so a busy one is noted and left to the input
/// collector, which asks for another.
pub async fn run_preflight(
    host: &dyn HostFacts,
    required_ports: &[u16],
    default_ports: &[u16],
    managed_port_owners: &[String],
    time_sync_grace: Duration,
) -> StepResult {
    StepResult::from_outcome(
        StepName::Preflight,
        run_preflight_impl(
            host,
            required_ports,
            default_ports,
            managed_port_owners,
            time_sync_grace,
        )
        .await,
    )
}

async fn run_preflight_impl(
    host: &dyn HostFacts,
    required_ports: &[u16],
    default_ports: &[u16],
    managed_port_owners: &[String],
    time_sync_grace: Duration,
) -> Result<String, DeployError> {
    require_elevated(host)?;

    for port in required_ports {
        check_port(host, *port, managed_port_owners).await?;
    }
    debug!(ports = ?required_ports, "Required ports available");

    let mut busy = Vec::new();
    for port in default_ports {
        if let Err(e) = check_port(host, *port, managed_port_owners).await {
            warn!(port, error = %e, "Default port unavailable, another must be chosen");
            busy.push(port.to_string());
        }
    }

    let clock = check_clock(host, time_sync_grace).await;
    let mut message = "privileged".to_string();
    if !required_ports.is_empty() {
        message.push_str(&format!(", ports {:?} available", required_ports));
    }
    if !busy.is_empty() {
        message.push_str(&format!(", default ports busy: {}", busy.join(", ")));
    }
    Ok(format!("{}, {}", message, clock))
}

/// Clock problems are reported as warnings, never as failures.
async fn check_clock(host: &dyn HostFacts, grace: Duration) -> String {
    match host.clock_synchronized().await {
        Some(true) => "clock synchronized".to_string(),
        None => {
            warn!("No time sync mechanism available, clock not verified");
            "warning: clock sync not verifiable".to_string()
        }
        Some(false) => {
            if !host.request_time_sync().await {
                warn!("Clock not synchronized and time sync could not be enabled");
                return "warning: clock not synchronized".to_string();
            }
            info!(?grace, "Requested time synchronization, waiting");
            tokio::time::sleep(grace).await;
            if host.clock_synchronized().await == Some(true) {
                "clock synchronized after sync request".to_string()
            } else {
                warn!("Clock still not synchronized after grace period");
                "warning: clock not synchronized".to_string()
            }
        }
    }
}
