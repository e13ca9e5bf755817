//! Deployment parameter collection
//!
//! Every field is asked until a valid answer arrives. Only a closed input
//! stream aborts collection.

use secrecy::SecretString;
use tracing::{info, warn};

use crate::app::options::PortDefaults;
use crate::deploy::preflight::check_port;
use crate::errors::DeployError;
use crate::host::HostFacts;
use crate::input::validate::{check_workload_port, parse_port, validate_domain, validate_email};
use crate::input::{Prompt, PromptSource};
use crate::models::config::{DeploymentConfig, EdgePorts, WorkloadPorts, ACME_HTTP_PORT};

/// Collect and validate a full deployment config
pub async fn collect_config(
    source: &mut dyn PromptSource,
    host: &dyn HostFacts,
    defaults: PortDefaults,
    managed_port_owners: &[String],
) -> Result<DeploymentConfig, DeployError> {
    let domain = ask_until_valid(
        source,
        &Prompt::new("domain", "Domain name for the vault (e.g. vault.example.com)"),
        validate_domain,
    )
    .await?;

    let email = ask_until_valid(
        source,
        &Prompt::new("email", "Contact email for certificate notices"),
        validate_email,
    )
    .await?;

    let dns_api_token = ask_until_valid(
        source,
        &Prompt::new(
            "dns_api_token",
            "Cloudflare API token for DNS-01 issuance (blank for HTTP-01)",
        ),
        |raw| {
            let token = raw.trim();
            if token.contains(char::is_whitespace) {
                Err("token must not contain whitespace".to_string())
            } else if token.is_empty() {
                Ok(None)
            } else {
                Ok(Some(token.to_string()))
            }
        },
    )
    .await?
    .map(SecretString::from);

    let app = ask_port(
        source,
        host,
        managed_port_owners,
        Prompt::new("app_port", "Local port for the vault web interface")
            .with_default(defaults.workload.app),
        check_workload_port,
    )
    .await?;

    let websocket = ask_port(
        source,
        host,
        managed_port_owners,
        Prompt::new("websocket_port", "Local port for websocket notifications")
            .with_default(defaults.workload.websocket),
        |port| {
            let port = check_workload_port(port)?;
            if port == app {
                return Err(format!("port {} is already used for the web interface", port));
            }
            Ok(port)
        },
    )
    .await?;

    let taken_by_workload = move |port: u16| {
        if port == app || port == websocket {
            Err(format!("port {} is already assigned to the workload", port))
        } else {
            Ok(port)
        }
    };

    // Without a DNS token the certificate comes over HTTP-01
    let http_challenge = dns_api_token.is_none();
    let http = ask_port(
        source,
        host,
        managed_port_owners,
        Prompt::new("edge_http_port", "Public HTTP port").with_default(defaults.edge.http),
        |port| {
            let port = taken_by_workload(port)?;
            if http_challenge && port != ACME_HTTP_PORT {
                return Err(format!(
                    "HTTP-01 validation only reaches port {}; use it or supply a DNS API token",
                    ACME_HTTP_PORT
                ));
            }
            Ok(port)
        },
    )
    .await?;

    let https = ask_port(
        source,
        host,
        managed_port_owners,
        Prompt::new("edge_https_port", "Public HTTPS port").with_default(defaults.edge.https),
        |port| {
            let port = taken_by_workload(port)?;
            if port == http {
                return Err(format!("port {} is already used for HTTP", port));
            }
            Ok(port)
        },
    )
    .await?;

    let config = DeploymentConfig::new(
        domain,
        email,
        dns_api_token,
        WorkloadPorts { app, websocket },
        EdgePorts { http, https },
    );
    info!(
        domain = %config.domain(),
        strategy = ?config.cert_strategy(),
        app_port = app,
        websocket_port = websocket,
        http_port = http,
        https_port = https,
        "Deployment parameters collected"
    );
    Ok(config)
}

/// Ask until `validate` accepts the answer
pub async fn ask_until_valid<T, F>(
    source: &mut dyn PromptSource,
    prompt: &Prompt,
    validate: F,
) -> Result<T, DeployError>
where
    F: Fn(&str) -> Result<T, String>,
{
    loop {
        let raw = source
            .ask(prompt)
            .await?
            .ok_or_else(|| DeployError::InputClosed(prompt.key.clone()))?;
        match validate(&raw) {
            Ok(value) => return Ok(value),
            Err(reason) => {
                warn!(key = %prompt.key, %reason, "Invalid answer");
                source.reject(prompt, &reason).await;
            }
        }
    }
}

/// Ask for a port until it parses, passes `check`, and is free on the host
async fn ask_port<F>(
    source: &mut dyn PromptSource,
    host: &dyn HostFacts,
    managed_port_owners: &[String],
    prompt: Prompt,
    check: F,
) -> Result<u16, DeployError>
where
    F: Fn(u16) -> Result<u16, String>,
{
    let default = prompt
        .default
        .as_deref()
        .and_then(|d| d.parse().ok())
        .unwrap_or_default();
    loop {
        let port = ask_until_valid(source, &prompt, |raw| parse_port(raw, default).and_then(&check)).await?;
        match check_port(host, port, managed_port_owners).await {
            Ok(()) => return Ok(port),
            Err(e) => {
                let reason = e.to_string();
                warn!(key = %prompt.key, %reason, "Port unavailable");
                source.reject(&prompt, &reason).await;
            }
        }
    }
}
