//! Storage layout configuration
//!
//! Every path the tool reads or writes on the host is derived here, so a
//! whole deployment can be re-rooted (tests point it at a temp directory).

use std::path::PathBuf;

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Storage layout for a deployment
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory holding the compose definition, data and secret
    pub base_dir: PathBuf,

    /// nginx configuration root (contains `sites-available`, `sites-enabled`)
    pub nginx_dir: PathBuf,

    /// certbot configuration root (contains `live`, `archive`, `renewal`)
    pub letsencrypt_dir: PathBuf,

    /// Webroot served for HTTP-01 challenges
    pub webroot_dir: PathBuf,

    /// DNS provider credentials for DNS-01
    pub dns_credentials_path: PathBuf,

    /// Diffie-Hellman parameters referenced by the TLS server
    pub dhparam_path: PathBuf,
}

impl StorageLayout {
    /// Create a layout with every path below `root`
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            base_dir: root.join("opt/vaultwarden"),
            nginx_dir: root.join("etc/nginx"),
            letsencrypt_dir: root.join("etc/letsencrypt"),
            webroot_dir: root.join("var/www/letsencrypt"),
            dns_credentials_path: root.join("root/.secrets/certbot/cloudflare.ini"),
            dhparam_path: root.join("etc/nginx/dhparam.pem"),
        }
    }

    /// Get the compose definition file
    pub fn compose_file(&self) -> File {
        File::new(self.base_dir.join("compose.yaml"))
    }

    /// Get the admin secret env file
    pub fn secret_file(&self) -> File {
        File::new(self.base_dir.join("admin.env"))
    }

    /// Get the persistent data directory
    pub fn data_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("data"))
    }

    /// Get the nginx `sites-available` directory
    pub fn sites_available(&self) -> Dir {
        Dir::new(self.nginx_dir.join("sites-available"))
    }

    /// Get the nginx `sites-enabled` directory
    pub fn sites_enabled(&self) -> Dir {
        Dir::new(self.nginx_dir.join("sites-enabled"))
    }

    /// Get the site file for a domain
    pub fn site_file(&self, domain: &str) -> File {
        self.sites_available().file(&format!("{}.conf", domain))
    }

    /// Get the enabling symlink for a domain's site
    pub fn site_link(&self, domain: &str) -> PathBuf {
        self.sites_enabled().path().join(format!("{}.conf", domain))
    }

    /// Get the distribution default site
    pub fn default_site(&self) -> File {
        self.sites_available().file("default")
    }

    /// Get the enabling symlink for the default site
    pub fn default_site_link(&self) -> PathBuf {
        self.sites_enabled().path().join("default")
    }

    /// Get the certbot live directory for a domain
    pub fn cert_live_dir(&self, domain: &str) -> Dir {
        Dir::new(self.letsencrypt_dir.join("live").join(domain))
    }

    /// Get the certbot archive directory for a domain
    pub fn cert_archive_dir(&self, domain: &str) -> Dir {
        Dir::new(self.letsencrypt_dir.join("archive").join(domain))
    }

    /// Get the certbot renewal configuration for a domain
    pub fn cert_renewal_file(&self, domain: &str) -> File {
        File::new(
            self.letsencrypt_dir
                .join("renewal")
                .join(format!("{}.conf", domain)),
        )
    }

    /// Get the certificate chain for a domain
    pub fn fullchain(&self, domain: &str) -> File {
        self.cert_live_dir(domain).file("fullchain.pem")
    }

    /// Get the private key for a domain
    pub fn privkey(&self, domain: &str) -> File {
        self.cert_live_dir(domain).file("privkey.pem")
    }

    /// Get the HTTP-01 webroot
    pub fn webroot(&self) -> Dir {
        Dir::new(&self.webroot_dir)
    }

    /// Get the DNS-01 credentials file
    pub fn dns_credentials_file(&self) -> File {
        File::new(&self.dns_credentials_path)
    }

    /// Get the DH parameters file
    pub fn dhparam_file(&self) -> File {
        File::new(&self.dhparam_path)
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), DeployError> {
        Dir::new(&self.base_dir).create().await?;
        self.data_dir().create().await?;
        self.sites_available().create().await?;
        self.sites_enabled().create().await?;
        self.webroot().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/opt/vaultwarden"),
            nginx_dir: PathBuf::from("/etc/nginx"),
            letsencrypt_dir: PathBuf::from("/etc/letsencrypt"),
            webroot_dir: PathBuf::from("/var/www/letsencrypt"),
            dns_credentials_path: PathBuf::from("/root/.secrets/certbot/cloudflare.ini"),
            dhparam_path: PathBuf::from("/etc/nginx/dhparam.pem"),
        }
    }
}
