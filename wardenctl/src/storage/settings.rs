//! Settings file management
//!
//! Settings are optional: a missing file means defaults everywhere, and
//! every field may be omitted.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::options::{
    AppOptions, EdgeOptions, PortDefaults, PreflightOptions, WorkloadOptions,
};
use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::installer::install::ToolSpec;
use crate::logs::LogLevel;
use crate::models::config::{EdgePorts, WorkloadPorts};
use crate::storage::layout::StorageLayout;
use crate::utils::CooldownOptions;

/// Default location of the settings file
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/wardenctl/settings.json";

/// Tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Log level
    pub log_level: LogLevel,

    /// Directory for the run log, empty string disables it
    pub log_dir: String,

    /// Timeout for external commands in seconds
    pub command_timeout_secs: u64,

    /// Host paths
    pub paths: PathSettings,

    /// Default ports
    pub ports: PortSettings,

    /// Workload settings
    pub workload: WorkloadSettings,

    /// Edge settings
    pub edge: EdgeSettings,

    /// Preflight settings
    pub preflight: PreflightSettings,

    /// Tools to ensure, replaces the built-in list when set
    pub tools: Option<Vec<ToolSpec>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_dir: "/var/log/wardenctl".to_string(),
            command_timeout_secs: 600,
            paths: PathSettings::default(),
            ports: PortSettings::default(),
            workload: WorkloadSettings::default(),
            edge: EdgeSettings::default(),
            preflight: PreflightSettings::default(),
            tools: None,
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when the file does not exist
    pub async fn load(file: &File) -> Result<Self, DeployError> {
        match file.read_optional().await? {
            Some(contents) => serde_json::from_str(&contents).map_err(|e| {
                DeployError::ConfigError(format!(
                    "Invalid settings file {}: {}",
                    file.path().display(),
                    e
                ))
            }),
            None => Ok(Settings::default()),
        }
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        if self.log_dir.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.log_dir))
        }
    }

    /// Convert to runtime options
    pub fn to_options(&self) -> AppOptions {
        AppOptions {
            layout: self.paths.to_layout(),
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            preflight: PreflightOptions {
                required_ports: self.preflight.required_ports.clone(),
                managed_port_owners: self.preflight.managed_port_owners.clone(),
                time_sync_grace: Duration::from_secs(self.preflight.time_sync_grace_secs),
            },
            tools: self
                .tools
                .clone()
                .unwrap_or_else(ToolSpec::default_tools),
            default_ports: PortDefaults {
                workload: WorkloadPorts {
                    app: self.ports.app,
                    websocket: self.ports.websocket,
                },
                edge: EdgePorts {
                    http: self.ports.edge_http,
                    https: self.ports.edge_https,
                },
            },
            workload: WorkloadOptions {
                image: self.workload.image.clone(),
                tag: self.workload.tag.clone(),
                project_name: self.workload.project_name.clone(),
                container_name: self.workload.container_name.clone(),
                signups_allowed: self.workload.signups_allowed,
                settle_time: Duration::from_secs(self.workload.settle_secs),
                readiness_attempts: self.workload.readiness_attempts,
                readiness_backoff: CooldownOptions {
                    max_delay: Duration::from_secs(self.workload.readiness_max_delay_secs),
                    ..Default::default()
                },
                start_timeout: Duration::from_secs(self.workload.start_timeout_secs),
            },
            edge: EdgeOptions {
                dhparam_bits: self.edge.dhparam_bits,
                dhparam_timeout: Duration::from_secs(self.edge.dhparam_timeout_secs),
                certbot_timeout: Duration::from_secs(self.edge.certbot_timeout_secs),
                dns_propagation: Duration::from_secs(self.edge.dns_propagation_secs),
                dns_timeout: Duration::from_secs(self.edge.dns_timeout_secs),
                routed_probe: self.edge.routed_probe,
            },
        }
    }
}

/// Host path settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub base_dir: PathBuf,
    pub nginx_dir: PathBuf,
    pub letsencrypt_dir: PathBuf,
    pub webroot_dir: PathBuf,
    pub dns_credentials_path: PathBuf,
    pub dhparam_path: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        let layout = StorageLayout::default();
        Self {
            base_dir: layout.base_dir,
            nginx_dir: layout.nginx_dir,
            letsencrypt_dir: layout.letsencrypt_dir,
            webroot_dir: layout.webroot_dir,
            dns_credentials_path: layout.dns_credentials_path,
            dhparam_path: layout.dhparam_path,
        }
    }
}

impl PathSettings {
    pub fn to_layout(&self) -> StorageLayout {
        StorageLayout {
            base_dir: self.base_dir.clone(),
            nginx_dir: self.nginx_dir.clone(),
            letsencrypt_dir: self.letsencrypt_dir.clone(),
            webroot_dir: self.webroot_dir.clone(),
            dns_credentials_path: self.dns_credentials_path.clone(),
            dhparam_path: self.dhparam_path.clone(),
        }
    }
}

/// Default port settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortSettings {
    pub app: u16,
    pub websocket: u16,
    pub edge_http: u16,
    pub edge_https: u16,
}

impl Default for PortSettings {
    fn default() -> Self {
        let workload = WorkloadPorts::default();
        let edge = EdgePorts::default();
        Self {
            app: workload.app,
            websocket: workload.websocket,
            edge_http: edge.http,
            edge_https: edge.https,
        }
    }
}

/// Workload settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadSettings {
    pub image: String,
    pub tag: String,
    pub project_name: String,
    pub container_name: String,
    pub signups_allowed: bool,
    pub settle_secs: u64,
    pub readiness_attempts: u32,
    pub readiness_max_delay_secs: u64,
    pub start_timeout_secs: u64,
}

impl Default for WorkloadSettings {
    fn default() -> Self {
        let options = WorkloadOptions::default();
        Self {
            image: options.image,
            tag: options.tag,
            project_name: options.project_name,
            container_name: options.container_name,
            signups_allowed: options.signups_allowed,
            settle_secs: options.settle_time.as_secs(),
            readiness_attempts: options.readiness_attempts,
            readiness_max_delay_secs: options.readiness_backoff.max_delay.as_secs(),
            start_timeout_secs: options.start_timeout.as_secs(),
        }
    }
}

/// Edge settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeSettings {
    pub dhparam_bits: u32,
    pub dhparam_timeout_secs: u64,
    pub certbot_timeout_secs: u64,
    pub dns_propagation_secs: u64,
    pub dns_timeout_secs: u64,
    pub routed_probe: bool,
}

impl Default for EdgeSettings {
    fn default() -> Self {
        let options = EdgeOptions::default();
        Self {
            dhparam_bits: options.dhparam_bits,
            dhparam_timeout_secs: options.dhparam_timeout.as_secs(),
            certbot_timeout_secs: options.certbot_timeout.as_secs(),
            dns_propagation_secs: options.dns_propagation.as_secs(),
            dns_timeout_secs: options.dns_timeout.as_secs(),
            routed_probe: options.routed_probe,
        }
    }
}

/// Preflight settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflightSettings {
    pub required_ports: Vec<u16>,
    pub managed_port_owners: Vec<String>,
    pub time_sync_grace_secs: u64,
}

impl Default for PreflightSettings {
    fn default() -> Self {
        let options = PreflightOptions::default();
        Self {
            required_ports: options.required_ports,
            managed_port_owners: options.managed_port_owners,
            time_sync_grace_secs: options.time_sync_grace.as_secs(),
        }
    }
}
