//! Runtime options for a deploy or decommission run

use std::time::Duration;

use crate::installer::install::ToolSpec;
use crate::models::config::{EdgePorts, WorkloadPorts};
use crate::storage::layout::StorageLayout;
use crate::utils::CooldownOptions;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Host paths
    pub layout: StorageLayout,

    /// Default timeout for external commands
    pub command_timeout: Duration,

    /// Preflight options
    pub preflight: PreflightOptions,

    /// Tools the dependency provisioner ensures
    pub tools: Vec<ToolSpec>,

    /// Port defaults offered by the input collector
    pub default_ports: PortDefaults,

    /// Workload options
    pub workload: WorkloadOptions,

    /// Edge options
    pub edge: EdgeOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            layout: StorageLayout::default(),
            command_timeout: Duration::from_secs(600),
            preflight: PreflightOptions::default(),
            tools: ToolSpec::default_tools(),
            default_ports: PortDefaults::default(),
            workload: WorkloadOptions::default(),
            edge: EdgeOptions::default(),
        }
    }
}

/// Preflight options
#[derive(Debug, Clone)]
pub struct PreflightOptions {
    /// Ports that must be free before anything is asked
    pub required_ports: Vec<u16>,

    /// Process names whose listening sockets belong to this deployment
    pub managed_port_owners: Vec<String>,

    /// Wait after requesting a time sync before checking again
    pub time_sync_grace: Duration,
}

impl Default for PreflightOptions {
    fn default() -> Self {
        Self {
            required_ports: Vec::new(),
            managed_port_owners: vec!["nginx".to_string(), "docker-proxy".to_string()],
            time_sync_grace: Duration::from_secs(10),
        }
    }
}

/// Port defaults
#[derive(Debug, Clone, Copy, Default)]
pub struct PortDefaults {
    pub workload: WorkloadPorts,
    pub edge: EdgePorts,
}

impl PortDefaults {
    /// Every default, edge ports first
    pub fn all(&self) -> Vec<u16> {
        vec![
            self.edge.http,
            self.edge.https,
            self.workload.app,
            self.workload.websocket,
        ]
    }
}

/// Workload options
#[derive(Debug, Clone)]
pub struct WorkloadOptions {
    /// Image reference without tag
    pub image: String,

    /// Explicit image tag
    pub tag: String,

    /// Compose project name
    pub project_name: String,

    /// Container name
    pub container_name: String,

    /// Allow open sign-ups on the deployed vault
    pub signups_allowed: bool,

    /// Wait after start before probing
    pub settle_time: Duration,

    /// Readiness probe attempts
    pub readiness_attempts: u32,

    /// Delay between readiness attempts
    pub readiness_backoff: CooldownOptions,

    /// Timeout for pulling and starting the workload
    pub start_timeout: Duration,
}

impl WorkloadOptions {
    pub fn image_reference(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

impl Default for WorkloadOptions {
    fn default() -> Self {
        Self {
            image: "vaultwarden/server".to_string(),
            tag: "1.32.7".to_string(),
            project_name: "vaultwarden".to_string(),
            container_name: "vaultwarden".to_string(),
            signups_allowed: false,
            settle_time: Duration::from_secs(5),
            readiness_attempts: 6,
            readiness_backoff: CooldownOptions::default(),
            start_timeout: Duration::from_secs(300),
        }
    }
}

/// Edge options
#[derive(Debug, Clone)]
pub struct EdgeOptions {
    /// DH parameter size in bits
    pub dhparam_bits: u32,

    /// Timeout for DH parameter generation
    pub dhparam_timeout: Duration,

    /// Timeout for HTTP-01 issuance
    pub certbot_timeout: Duration,

    /// Seconds certbot waits for DNS propagation
    pub dns_propagation: Duration,

    /// Timeout for DNS-01 issuance, covering propagation
    pub dns_timeout: Duration,

    /// Probe `/alive` over HTTPS through the edge during verification
    pub routed_probe: bool,
}

impl Default for EdgeOptions {
    fn default() -> Self {
        Self {
            dhparam_bits: 2048,
            dhparam_timeout: Duration::from_secs(900),
            certbot_timeout: Duration::from_secs(300),
            dns_propagation: Duration::from_secs(60),
            dns_timeout: Duration::from_secs(900),
            routed_probe: true,
        }
    }
}
