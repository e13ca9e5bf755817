//! Typed nginx site configuration
//!
//! Sites are assembled from [`ServerBlock`]s and [`Location`]s and rendered
//! into nginx's grammar by [`NginxSite::render`]. Three shapes are built
//! here: the challenge-only site used before a certificate exists, the full
//! TLS site, and the default-deny server for custom ports.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::models::config::{EdgePorts, WorkloadPorts};

/// Path the ACME HTTP-01 challenge is served under
pub const ACME_CHALLENGE_PATH: &str = "/.well-known/acme-challenge/";

/// Path of the workload's websocket endpoint
pub const WEBSOCKET_PATH: &str = "/notifications/hub";

/// A single `name arg1 arg2;` directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub name: String,
    pub args: Vec<String>,
}

impl Directive {
    pub fn new<I, S>(name: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn render(&self, out: &mut String, indent: usize) {
        let _ = write!(out, "{:indent$}{}", "", self.name, indent = indent);
        for arg in &self.args {
            out.push(' ');
            out.push_str(&quote(arg));
        }
        out.push_str(";\n");
    }
}

/// A `location` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Match modifier such as `^~` or `=`
    pub modifier: Option<String>,
    pub path: String,
    pub directives: Vec<Directive>,
}

impl Location {
    pub fn new(path: &str) -> Self {
        Self {
            modifier: None,
            path: path.to_string(),
            directives: Vec::new(),
        }
    }

    pub fn prefix(path: &str) -> Self {
        Self {
            modifier: Some("^~".to_string()),
            ..Self::new(path)
        }
    }

    pub fn directive<I, S>(mut self, name: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.directives.push(Directive::new(name, args));
        self
    }

    fn render(&self, out: &mut String, indent: usize) {
        let _ = write!(out, "{:indent$}location ", "", indent = indent);
        if let Some(modifier) = &self.modifier {
            out.push_str(modifier);
            out.push(' ');
        }
        out.push_str(&self.path);
        out.push_str(" {\n");
        for directive in &self.directives {
            directive.render(out, indent + 4);
        }
        let _ = writeln!(out, "{:indent$}}}", "", indent = indent);
    }
}

/// A `server` block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerBlock {
    pub directives: Vec<Directive>,
    pub locations: Vec<Location>,
}

impl ServerBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn directive<I, S>(mut self, name: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.directives.push(Directive::new(name, args));
        self
    }

    pub fn location(mut self, location: Location) -> Self {
        self.locations.push(location);
        self
    }

    fn render(&self, out: &mut String) {
        out.push_str("server {\n");
        for directive in &self.directives {
            directive.render(out, 4);
        }
        for location in &self.locations {
            out.push('\n');
            location.render(out, 4);
        }
        out.push_str("}\n");
    }
}

/// A complete site file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NginxSite {
    pub servers: Vec<ServerBlock>,
}

impl NginxSite {
    pub fn render(&self) -> String {
        let mut out = String::from("# Managed by wardenctl. Local changes are overwritten on deploy.\n");
        for server in &self.servers {
            out.push('\n');
            server.render(&mut out);
        }
        out
    }
}

/// Everything the full TLS site needs
#[derive(Debug, Clone)]
pub struct TlsSiteParams {
    pub domain: String,
    pub edge: EdgePorts,
    pub workload: WorkloadPorts,
    pub webroot: PathBuf,
    pub fullchain: PathBuf,
    pub privkey: PathBuf,
    /// Omitted from the site when `None`
    pub dhparam: Option<PathBuf>,
}

/// Port-80 site that only answers ACME challenges
pub fn challenge_only_site(domain: &str, http_port: u16, webroot: &Path) -> NginxSite {
    NginxSite {
        servers: vec![http_listener(http_port, false)
            .directive("server_name", [domain])
            .location(acme_location(webroot))
            .location(Location::new("/").directive("return", ["404"]))],
    }
}

/// HTTP redirect server plus TLS-terminating reverse proxy
pub fn tls_site(params: &TlsSiteParams) -> NginxSite {
    let redirect_target = if params.edge.https == 443 {
        "https://$host$request_uri".to_string()
    } else {
        format!("https://$host:{}$request_uri", params.edge.https)
    };

    let redirect = http_listener(params.edge.http, false)
        .directive("server_name", [params.domain.as_str()])
        .location(acme_location(&params.webroot))
        .location(Location::new("/").directive("return", ["301", redirect_target.as_str()]));

    let app_upstream = format!("http://127.0.0.1:{}", params.workload.app);
    let websocket_upstream = format!("http://127.0.0.1:{}", params.workload.websocket);

    let mut tls = https_listener(params.edge.https, false)
        .directive("server_name", [params.domain.as_str()])
        .directive("ssl_certificate", [path_arg(&params.fullchain)])
        .directive("ssl_certificate_key", [path_arg(&params.privkey)])
        .directive("ssl_protocols", ["TLSv1.2", "TLSv1.3"])
        .directive("ssl_prefer_server_ciphers", ["off"])
        .directive("ssl_session_timeout", ["1d"])
        .directive("ssl_session_cache", ["shared:wardenctl:10m"])
        .directive("client_max_body_size", ["525M"])
        .directive(
            "add_header",
            ["Strict-Transport-Security", "max-age=63072000", "always"],
        );
    if let Some(dhparam) = &params.dhparam {
        tls = tls.directive("ssl_dhparam", [path_arg(dhparam)]);
    }

    let tls = tls
        .location(proxied(Location::new("/"), &app_upstream))
        .location(
            proxied(Location::new(WEBSOCKET_PATH), &websocket_upstream)
                .directive("proxy_http_version", ["1.1"])
                .directive("proxy_set_header", ["Upgrade", "$http_upgrade"])
                .directive("proxy_set_header", ["Connection", "upgrade"]),
        )
        .location(proxied(
            Location::new(&format!("{}/negotiate", WEBSOCKET_PATH)),
            &app_upstream,
        ));

    NginxSite {
        servers: vec![redirect, tls],
    }
}

/// Catch-all server that drops requests whose host matches no site
pub fn default_deny_server(edge: EdgePorts) -> ServerBlock {
    let mut server = http_listener(edge.http, true);
    server
        .directives
        .extend(https_listener(edge.https, true).directives);
    server
        .directive("server_name", ["_"])
        .directive("ssl_reject_handshake", ["on"])
        .directive("return", ["444"])
}

/// Plain-HTTP default site restored on decommission when the distribution's
/// own default is gone
pub fn fallback_default_site() -> NginxSite {
    NginxSite {
        servers: vec![http_listener(80, true)
            .directive("server_name", ["_"])
            .directive("return", ["404"])],
    }
}

fn http_listener(port: u16, default_server: bool) -> ServerBlock {
    listeners(port, &[], default_server)
}

fn https_listener(port: u16, default_server: bool) -> ServerBlock {
    listeners(port, &["ssl", "http2"], default_server)
}

/// IPv4 and IPv6 `listen` directives for one port
fn listeners(port: u16, flags: &[&str], default_server: bool) -> ServerBlock {
    let mut flags: Vec<String> = flags.iter().map(|f| f.to_string()).collect();
    if default_server {
        flags.push("default_server".to_string());
    }
    let v4 = std::iter::once(port.to_string()).chain(flags.iter().cloned());
    let v6 = std::iter::once(format!("[::]:{}", port)).chain(flags.iter().cloned());
    ServerBlock::new().directive("listen", v4).directive("listen", v6)
}

fn acme_location(webroot: &Path) -> Location {
    Location::prefix(ACME_CHALLENGE_PATH)
        .directive("root", [path_arg(webroot)])
        .directive("default_type", ["text/plain"])
}

fn proxied(location: Location, upstream: &str) -> Location {
    location
        .directive("proxy_pass", [upstream])
        .directive("proxy_set_header", ["Host", "$host"])
        .directive("proxy_set_header", ["X-Real-IP", "$remote_addr"])
        .directive("proxy_set_header", ["X-Forwarded-For", "$proxy_add_x_forwarded_for"])
        .directive("proxy_set_header", ["X-Forwarded-Proto", "$scheme"])
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// Quote an argument when nginx would otherwise split or misread it
fn quote(arg: &str) -> String {
    let needs_quotes = arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ';' | '{' | '}' | '"' | '\'' | '#'));
    if needs_quotes {
        format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}
