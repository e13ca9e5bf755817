//! Typed compose definition for the workload

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::app::options::WorkloadOptions;
use crate::errors::DeployError;
use crate::models::config::DeploymentConfig;
use crate::storage::layout::StorageLayout;

/// Port the workload's web server listens on inside the container
pub const CONTAINER_APP_PORT: u16 = 80;

/// Port the workload's websocket server listens on inside the container
pub const CONTAINER_WEBSOCKET_PORT: u16 = 3012;

/// Name of the single service in the definition
pub const SERVICE_NAME: &str = "vaultwarden";

/// A compose document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeDefinition {
    pub services: BTreeMap<String, ComposeService>,
}

/// One compose service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeService {
    pub image: String,
    pub container_name: String,
    pub restart: String,
    pub ports: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub env_file: Vec<String>,
    pub volumes: Vec<String>,
}

impl ComposeDefinition {
    /// Build the definition for a deployment. The admin secret is only
    /// referenced through `env_file`, never inlined.
    pub fn for_workload(
        config: &DeploymentConfig,
        options: &WorkloadOptions,
        layout: &StorageLayout,
    ) -> Self {
        let ports = config.workload_ports();

        let mut environment = BTreeMap::new();
        environment.insert("DOMAIN".to_string(), config.public_url());
        environment.insert("ROCKET_PORT".to_string(), CONTAINER_APP_PORT.to_string());
        environment.insert("WEBSOCKET_ENABLED".to_string(), "true".to_string());
        environment.insert(
            "WEBSOCKET_PORT".to_string(),
            CONTAINER_WEBSOCKET_PORT.to_string(),
        );
        environment.insert(
            "SIGNUPS_ALLOWED".to_string(),
            options.signups_allowed.to_string(),
        );

        let service = ComposeService {
            image: options.image_reference(),
            container_name: options.container_name.clone(),
            restart: "unless-stopped".to_string(),
            ports: vec![
                loopback_binding(ports.app, CONTAINER_APP_PORT),
                loopback_binding(ports.websocket, CONTAINER_WEBSOCKET_PORT),
            ],
            environment,
            env_file: vec![layout.secret_file().path().display().to_string()],
            volumes: vec![format!("{}:/data", layout.data_dir().path().display())],
        };

        let mut services = BTreeMap::new();
        services.insert(SERVICE_NAME.to_string(), service);
        Self { services }
    }

    /// Render as YAML
    pub fn render(&self) -> Result<String, DeployError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn loopback_binding(host_port: u16, container_port: u16) -> String {
    format!("127.0.0.1:{}:{}", host_port, container_port)
}
