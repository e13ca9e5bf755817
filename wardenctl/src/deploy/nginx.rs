//! nginx control and the site activation gate
//!
//! A site only reaches `sites-enabled` after it passed `nginx -t` in
//! isolation, and nginx is only reloaded after the full configuration passed
//! `nginx -t` with the new site in place. A failing full check puts the
//! previous site file back.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use tokio::fs;
use tracing::{debug, info, warn};

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::process::{CommandOutput, CommandRunner, CommandSpec};
use crate::render::nginx::{fallback_default_site, NginxSite};
use crate::storage::layout::StorageLayout;
use crate::utils::fingerprint;

const SERVICE: &str = "nginx";

/// Drives the host's nginx for one storage layout
pub struct NginxControl<'a> {
    runner: &'a dyn CommandRunner,
    layout: &'a StorageLayout,
    timeout: Duration,
}

impl<'a> NginxControl<'a> {
    pub fn new(runner: &'a dyn CommandRunner, layout: &'a StorageLayout, timeout: Duration) -> Self {
        Self {
            runner,
            layout,
            timeout,
        }
    }

    /// `nginx -t` against the live configuration
    pub async fn check(&self) -> Result<(), DeployError> {
        let output = self.run(CommandSpec::new("nginx").arg("-t")).await?;
        expect_valid(output)
    }

    /// `nginx -t` against a wrapper that only includes `site`
    pub async fn check_isolated(&self, site: &Path) -> Result<(), DeployError> {
        let wrapper = File::new(self.layout.nginx_dir.join("wardenctl-check.conf"));
        let wrapper = File::new(wrapper.sibling_temp_path());
        let contents = format!(
            "events {{}}\nhttp {{\n    include {};\n}}\n",
            site.display()
        );
        wrapper.write_string(&contents).await?;

        let output = self
            .run(
                CommandSpec::new("nginx")
                    .args(["-t", "-q", "-c"])
                    .arg(wrapper.path().display().to_string()),
            )
            .await;
        wrapper.delete().await?;
        expect_valid(output?)
    }

    pub async fn reload(&self) -> Result<(), DeployError> {
        self.systemctl("reload-or-restart").await
    }

    pub async fn start(&self) -> Result<(), DeployError> {
        self.systemctl("start").await
    }

    pub async fn is_active(&self) -> bool {
        let spec = CommandSpec::new("systemctl").args(["is-active", "--quiet", SERVICE]);
        matches!(self.run(spec).await, Ok(output) if output.success())
    }

    /// Put `site` in place for `domain` through the activation gate
    pub async fn activate(&self, domain: &str, site: &NginxSite) -> Result<(), DeployError> {
        let text = site.render();
        let digest = fingerprint(text.as_bytes());
        let site_file = self.layout.site_file(domain);
        let staged = File::new(site_file.sibling_temp_path());

        staged.write_string(&text).await?;
        if let Err(e) = self.check_isolated(staged.path()).await {
            warn!(%domain, %digest, error = %e, "Staged site rejected");
            staged.delete().await?;
            return Err(e);
        }

        let previous = site_file.read_optional().await?;
        fs::rename(staged.path(), site_file.path()).await?;
        let link = self.layout.site_link(domain);
        let link_created = ensure_symlink(site_file.path(), &link).await?;
        let default_link = self.layout.default_site_link();
        let default_target = fs::read_link(&default_link).await.ok();
        if default_target.is_some() {
            fs::remove_file(&default_link).await?;
            debug!(path = %default_link.display(), "Disabled distribution default site");
        }

        if let Err(e) = self.check().await {
            warn!(%domain, %digest, error = %e, "Full nginx check failed, restoring previous site");
            match previous {
                Some(contents) => site_file.write_atomic(contents.as_bytes()).await?,
                None => {
                    site_file.delete().await?;
                }
            }
            if link_created {
                remove_link(&link).await?;
            }
            if let Some(target) = default_target {
                ensure_symlink(&target, &default_link).await?;
            }
            return Err(e);
        }

        self.reload().await?;
        info!(%domain, %digest, path = %site_file.path().display(), "Site activated");
        Ok(())
    }

    /// Disable and delete the site for `domain`, re-enable a default site,
    /// then validate and reload. Returns `false` when nothing was there.
    pub async fn deactivate(&self, domain: &str) -> Result<bool, DeployError> {
        let link = self.layout.site_link(domain);
        let removed_link = remove_link(&link).await?;
        let removed_file = self.layout.site_file(domain).delete().await?;
        if !removed_link && !removed_file {
            return Ok(false);
        }

        let default_site = self.layout.default_site();
        if !default_site.exists().await {
            default_site
                .write_atomic(fallback_default_site().render().as_bytes())
                .await?;
            info!(path = %default_site.path().display(), "Wrote fallback default site");
        }
        ensure_symlink(default_site.path(), &self.layout.default_site_link()).await?;

        self.check().await?;
        self.reload().await?;
        info!(%domain, "Site removed, default site restored");
        Ok(true)
    }

    async fn systemctl(&self, verb: &str) -> Result<(), DeployError> {
        let spec = CommandSpec::new("systemctl").args([verb, SERVICE]);
        let output = self.run(spec.clone()).await?;
        if output.success() {
            Ok(())
        } else {
            Err(DeployError::CommandError {
                command: spec.to_string(),
                reason: output.diagnostic(),
            })
        }
    }

    async fn run(&self, spec: CommandSpec) -> Result<CommandOutput, DeployError> {
        self.runner.run(&spec.timeout(self.timeout)).await
    }
}

fn expect_valid(output: CommandOutput) -> Result<(), DeployError> {
    if output.success() {
        Ok(())
    } else {
        Err(DeployError::ConfigValidationError(output.diagnostic()))
    }
}

/// Create `link -> target` unless `link` already exists. Returns whether a
/// link was created.
async fn ensure_symlink(target: &Path, link: &Path) -> Result<bool, DeployError> {
    if fs::symlink_metadata(link).await.is_ok() {
        return Ok(false);
    }
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::symlink(target, link).await?;
    Ok(true)
}

async fn remove_link(link: &Path) -> Result<bool, DeployError> {
    match fs::remove_file(link).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
