//! Operator-supplied deployment parameters

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Port ACME HTTP-01 validation always connects to
pub const ACME_HTTP_PORT: u16 = 80;

/// Local ports the workload publishes on loopback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadPorts {
    /// Main application (HTTP API and web vault)
    pub app: u16,

    /// Websocket notifications
    pub websocket: u16,
}

impl Default for WorkloadPorts {
    fn default() -> Self {
        Self {
            app: 8080,
            websocket: 3012,
        }
    }
}

/// Public ports the edge listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgePorts {
    pub http: u16,
    pub https: u16,
}

impl Default for EdgePorts {
    fn default() -> Self {
        Self {
            http: 80,
            https: 443,
        }
    }
}

impl EdgePorts {
    /// Whether these differ from the well-known 80/443 pair
    pub fn is_custom(&self) -> bool {
        *self != EdgePorts::default()
    }
}

/// How the TLS certificate is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertStrategy {
    /// HTTP-01 challenge served from a webroot
    Webroot,

    /// DNS-01 challenge through the DNS provider plugin
    Dns,
}

/// Validated deployment parameters. Immutable once collected.
#[derive(Debug)]
pub struct DeploymentConfig {
    domain: String,
    email: String,
    dns_api_token: Option<SecretString>,
    workload_ports: WorkloadPorts,
    edge_ports: EdgePorts,
}

impl DeploymentConfig {
    /// Assemble a config from already-validated parts
    pub fn new(
        domain: String,
        email: String,
        dns_api_token: Option<SecretString>,
        workload_ports: WorkloadPorts,
        edge_ports: EdgePorts,
    ) -> Self {
        Self {
            domain,
            email,
            dns_api_token,
            workload_ports,
            edge_ports,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn dns_api_token(&self) -> Option<&SecretString> {
        self.dns_api_token.as_ref()
    }

    pub fn workload_ports(&self) -> WorkloadPorts {
        self.workload_ports
    }

    pub fn edge_ports(&self) -> EdgePorts {
        self.edge_ports
    }

    /// DNS-01 when provider credentials were supplied, HTTP-01 otherwise
    pub fn cert_strategy(&self) -> CertStrategy {
        if self.dns_api_token.is_some() {
            CertStrategy::Dns
        } else {
            CertStrategy::Webroot
        }
    }

    /// Public base URL of the deployed service
    pub fn public_url(&self) -> String {
        if self.edge_ports.https == 443 {
            format!("https://{}", self.domain)
        } else {
            format!("https://{}:{}", self.domain, self.edge_ports.https)
        }
    }
}
