//! Edge configuration: certificate issuance and the TLS reverse proxy

use std::path::PathBuf;
use std::sync::Arc;

use secrecy::ExposeSecret;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::options::{AppOptions, EdgeOptions};
use crate::deploy::nginx::NginxControl;
use crate::errors::DeployError;
use crate::filesys::file::{File, MODE_SECRET};
use crate::models::config::{CertStrategy, DeploymentConfig};
use crate::models::step::{StepName, StepResult};
use crate::process::{CommandRunner, CommandSpec};
use crate::render::nginx::{challenge_only_site, default_deny_server, tls_site, TlsSiteParams};
use crate::storage::layout::StorageLayout;

/// Issue the certificate if needed and activate the TLS site
pub async fn configure_edge(
    runner: Arc<dyn CommandRunner>,
    options: &AppOptions,
    config: &DeploymentConfig,
) -> StepResult {
    StepResult::from_outcome(
        StepName::ConfigureEdge,
        configure_edge_impl(runner, options, config).await,
    )
}

async fn configure_edge_impl(
    runner: Arc<dyn CommandRunner>,
    options: &AppOptions,
    config: &DeploymentConfig,
) -> Result<String, DeployError> {
    let layout = &options.layout;
    let domain = config.domain();
    layout.setup().await?;

    let dhparam = layout.dhparam_file();
    let dh_task = if dhparam.exists().await {
        debug!(path = %dhparam.path().display(), "DH parameters already present");
        None
    } else {
        Some(spawn_dhparam(runner.clone(), dhparam.path().to_path_buf(), &options.edge))
    };

    let nginx = NginxControl::new(runner.as_ref(), layout, options.command_timeout);
    let issued = match ensure_certificate(runner.as_ref(), &nginx, options, config).await {
        Ok(issued) => issued,
        Err(e) => {
            if let Some(task) = dh_task {
                task.abort();
            }
            return Err(e);
        }
    };

    if let Some(task) = dh_task {
        match task.await {
            Ok(Ok(())) => info!("DH parameters generated"),
            Ok(Err(e)) => warn!(error = %e, "DH parameter generation failed, continuing without"),
            Err(e) => warn!(error = %e, "DH parameter task did not finish"),
        }
    }
    let dhparam = dhparam
        .exists()
        .await
        .then(|| dhparam.path().to_path_buf());

    let edge = config.edge_ports();
    let mut site = tls_site(&TlsSiteParams {
        domain: domain.to_string(),
        edge,
        workload: config.workload_ports(),
        webroot: layout.webroot_dir.clone(),
        fullchain: layout.fullchain(domain).path().to_path_buf(),
        privkey: layout.privkey(domain).path().to_path_buf(),
        dhparam,
    });
    if edge.is_custom() {
        site.servers.push(default_deny_server(edge));
    }
    nginx.activate(domain, &site).await?;

    Ok(format!(
        "certificate {} for {}, serving {}",
        if issued { "issued" } else { "already present" },
        domain,
        config.public_url()
    ))
}

/// Make sure a certificate exists for the domain. Returns whether one was
/// issued in this run.
async fn ensure_certificate(
    runner: &dyn CommandRunner,
    nginx: &NginxControl<'_>,
    options: &AppOptions,
    config: &DeploymentConfig,
) -> Result<bool, DeployError> {
    let layout = &options.layout;
    let domain = config.domain();
    if certificate_present(layout, domain).await {
        info!(%domain, "Certificate already present, skipping issuance");
        return Ok(false);
    }

    let spec = match config.cert_strategy() {
        CertStrategy::Webroot => {
            let site = challenge_only_site(domain, config.edge_ports().http, &layout.webroot_dir);
            nginx.activate(domain, &site).await?;
            webroot_command(layout, config).timeout(options.edge.certbot_timeout)
        }
        CertStrategy::Dns => {
            write_dns_credentials(layout, config).await?;
            dns_command(layout, &options.edge, config).timeout(options.edge.dns_timeout)
        }
    };

    info!(%domain, strategy = ?config.cert_strategy(), "Requesting certificate");
    let output = runner.run(&spec).await.map_err(|e| match e {
        DeployError::CommandError { reason, .. } => DeployError::CertificateIssuanceError(reason),
        other => other,
    })?;
    if !output.success() {
        return Err(DeployError::CertificateIssuanceError(output.diagnostic()));
    }
    if !certificate_present(layout, domain).await {
        return Err(DeployError::CertificateIssuanceError(format!(
            "certbot succeeded but no certificate found under {}",
            layout.cert_live_dir(domain).path().display()
        )));
    }
    info!(%domain, "Certificate issued");
    Ok(true)
}

pub async fn certificate_present(layout: &StorageLayout, domain: &str) -> bool {
    layout.fullchain(domain).exists().await && layout.privkey(domain).exists().await
}

async fn write_dns_credentials(
    layout: &StorageLayout,
    config: &DeploymentConfig,
) -> Result<(), DeployError> {
    let token = config.dns_api_token().ok_or_else(|| {
        DeployError::Internal("DNS-01 selected without an API token".to_string())
    })?;
    let file = layout.dns_credentials_file();
    let contents = format!("dns_cloudflare_api_token = {}\n", token.expose_secret());
    file.write_atomic_with_mode(contents.as_bytes(), MODE_SECRET).await?;
    debug!(path = %file.path().display(), "DNS credentials written");
    Ok(())
}

fn certbot_base(config: &DeploymentConfig) -> CommandSpec {
    CommandSpec::new("certbot")
        .arg("certonly")
        .args(["--cert-name", config.domain(), "-d", config.domain()])
        .args(["--email", config.email()])
        .args(["--agree-tos", "--non-interactive", "--keep-until-expiring"])
}

/// HTTP-01 issuance through the webroot
pub fn webroot_command(layout: &StorageLayout, config: &DeploymentConfig) -> CommandSpec {
    certbot_base(config)
        .arg("--webroot")
        .arg("-w")
        .arg(layout.webroot_dir.display().to_string())
}

/// DNS-01 issuance through the Cloudflare plugin
pub fn dns_command(
    layout: &StorageLayout,
    options: &EdgeOptions,
    config: &DeploymentConfig,
) -> CommandSpec {
    certbot_base(config)
        .arg("--dns-cloudflare")
        .arg("--dns-cloudflare-credentials")
        .arg(layout.dns_credentials_path.display().to_string())
        .arg("--dns-cloudflare-propagation-seconds")
        .arg(options.dns_propagation.as_secs().to_string())
}

fn spawn_dhparam(
    runner: Arc<dyn CommandRunner>,
    path: PathBuf,
    options: &EdgeOptions,
) -> JoinHandle<Result<(), DeployError>> {
    let bits = options.dhparam_bits;
    let timeout = options.dhparam_timeout;
    tokio::spawn(async move {
        info!(bits, path = %path.display(), "Generating DH parameters in the background");
        let spec = CommandSpec::new("openssl")
            .args(["dhparam", "-out"])
            .arg(path.display().to_string())
            .arg(bits.to_string())
            .timeout(timeout);
        let err = match runner.run(&spec).await {
            Ok(output) if output.success() => return Ok(()),
            Ok(output) => DeployError::CommandError {
                command: spec.to_string(),
                reason: output.diagnostic(),
            },
            Err(e) => e,
        };
        // openssl may leave a truncated file behind
        File::new(&path).delete().await?;
        Err(err)
    })
}
