//! End-to-end deploy pipeline tests

use std::sync::Arc;

use wardenctl::deploy::pipeline::Orchestrator;
use wardenctl::models::step::{StepName, StepStatus};
use wardenctl::process::CommandRunner;
use wardenctl::storage::layout::StorageLayout;

use crate::common::{
    answers_for, deploy_answers, issuing_runner, test_options, workload_listener, FakeHost,
    FakeRunner, DOMAIN,
};

fn orchestrator(runner: &Arc<FakeRunner>, root: &std::path::Path) -> Orchestrator {
    orchestrator_on(runner, FakeHost::new(), root)
}

fn orchestrator_on(runner: &Arc<FakeRunner>, host: FakeHost, root: &std::path::Path) -> Orchestrator {
    let runner: Arc<dyn CommandRunner> = runner.clone();
    Orchestrator::new(runner, Arc::new(host), test_options(root))
}

#[tokio::test]
async fn test_http01_deploy_serves_tls_with_redirect() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::rooted(dir.path());
    let listener = workload_listener();
    let app_port = listener.local_addr().unwrap().port();
    let runner = Arc::new(issuing_runner(&layout));

    let summary = orchestrator(&runner, dir.path())
        .deploy(&mut deploy_answers(app_port))
        .await
        .unwrap();

    assert_eq!(summary.public_url, format!("https://{}", DOMAIN));
    assert_eq!(summary.results.len(), StepName::ALL.len());
    assert!(summary.results.iter().all(|r| r.status == StepStatus::Success));

    let site = layout.site_file(DOMAIN).read_string().await.unwrap();
    assert!(site.contains("listen 443 ssl http2;"));
    assert!(site.contains("return 301 https://$host$request_uri;"));
    assert!(site.contains(&format!("proxy_pass http://127.0.0.1:{};", app_port)));
    assert!(site.contains(&format!("proxy_pass http://127.0.0.1:{};", app_port + 1)));
    assert!(site.contains("ssl_dhparam"));
    assert!(std::fs::symlink_metadata(layout.site_link(DOMAIN)).is_ok());

    let compose = layout.compose_file().read_string().await.unwrap();
    assert!(compose.contains(&format!("127.0.0.1:{}:80", app_port)));
    assert!(!compose.contains("ADMIN_TOKEN"));
    assert_eq!(layout.secret_file().mode().await.unwrap(), 0o600);

    // The challenge-only site went live before certbot ran
    let calls = runner.calls();
    let certbot = runner.position("certbot certonly").unwrap();
    assert!(calls[certbot].contains("--webroot"));
    let first_reload = runner.position("systemctl reload-or-restart nginx").unwrap();
    assert!(first_reload < certbot);
    assert!(runner.position("docker compose -f").unwrap() < certbot);
}

#[tokio::test]
async fn test_second_deploy_keeps_secret_and_certificate() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::rooted(dir.path());
    let listener = workload_listener();
    let app_port = listener.local_addr().unwrap().port();

    let first = Arc::new(issuing_runner(&layout));
    let summary = orchestrator(&first, dir.path())
        .deploy(&mut deploy_answers(app_port))
        .await
        .unwrap();
    let secret = layout.secret_file().read_string().await.unwrap();

    let second = Arc::new(issuing_runner(&layout));
    let again = orchestrator(&second, dir.path())
        .deploy(&mut deploy_answers(app_port))
        .await
        .unwrap();

    assert_eq!(layout.secret_file().read_string().await.unwrap(), secret);
    assert_eq!(again.secret_fingerprint, summary.secret_fingerprint);
    assert!(!second.called("certbot certonly"));
    assert!(!second.called("openssl dhparam"));
    assert!(second.called("docker compose -f"));
}

#[tokio::test]
async fn test_rejected_site_is_never_activated() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::rooted(dir.path());
    let listener = workload_listener();
    let app_port = listener.local_addr().unwrap().port();
    let runner = Arc::new(
        issuing_runner(&layout).fail("nginx -t -q -c", 1, "unknown directive \"ssl_reject\""),
    );

    let report = orchestrator(&runner, dir.path())
        .deploy(&mut deploy_answers(app_port))
        .await
        .unwrap_err();

    assert_eq!(report.step, StepName::ConfigureEdge);
    assert_eq!(report.kind, "ConfigValidationError");
    assert!(report.diagnostic.contains("unknown directive"));
    assert!(!runner.called("systemctl reload-or-restart nginx"));
    assert!(!runner.called("certbot certonly"));
    assert!(!layout.site_file(DOMAIN).exists().await);
    assert!(std::fs::symlink_metadata(layout.site_link(DOMAIN)).is_err());
}

#[tokio::test]
async fn test_full_check_failure_restores_previous_site() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::rooted(dir.path());
    let listener = workload_listener();
    let app_port = listener.local_addr().unwrap().port();

    orchestrator(&Arc::new(issuing_runner(&layout)), dir.path())
        .deploy(&mut deploy_answers(app_port))
        .await
        .unwrap();
    let live_site = layout.site_file(DOMAIN).read_string().await.unwrap();

    // Redeploy with a different websocket port while the full check fails
    let runner = Arc::new(
        issuing_runner(&layout).fail_exact("nginx -t", 1, "duplicate listen options for [::]:443"),
    );
    let mut answers = answers_for(app_port, app_port + 2, "", "", "");
    let report = orchestrator(&runner, dir.path())
        .deploy(&mut answers)
        .await
        .unwrap_err();

    assert_eq!(report.kind, "ConfigValidationError");
    assert!(!runner.called("systemctl reload-or-restart nginx"));
    assert_eq!(layout.site_file(DOMAIN).read_string().await.unwrap(), live_site);
}

#[tokio::test]
async fn test_certbot_failure_leaves_challenge_only_site() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::rooted(dir.path());
    let listener = workload_listener();
    let app_port = listener.local_addr().unwrap().port();
    let runner = Arc::new(
        FakeRunner::new()
            .fail("certbot certonly", 1, "too many certificates already issued")
            .fail("systemctl is-active", 3, ""),
    );

    let report = orchestrator(&runner, dir.path())
        .deploy(&mut deploy_answers(app_port))
        .await
        .unwrap_err();

    assert_eq!(report.step, StepName::ConfigureEdge);
    assert_eq!(report.kind, "CertificateIssuanceError");
    assert!(report.diagnostic.contains("too many certificates"));
    assert_eq!(report.compensations, vec!["nginx was stopped, started it"]);
    assert!(runner.called("systemctl start nginx"));

    let site = layout.site_file(DOMAIN).read_string().await.unwrap();
    assert!(site.contains("location ^~ /.well-known/acme-challenge/"));
    assert!(site.contains("return 404;"));
    assert!(!site.contains("ssl_certificate"));
}

#[tokio::test]
async fn test_dns01_deploy_with_custom_edge_ports() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::rooted(dir.path());
    let listener = workload_listener();
    let app_port = listener.local_addr().unwrap().port();
    let runner = Arc::new(issuing_runner(&layout));
    let mut answers = answers_for(app_port, app_port + 1, "cf-secret-token", "8081", "8443");

    let summary = orchestrator(&runner, dir.path())
        .deploy(&mut answers)
        .await
        .unwrap();
    assert_eq!(summary.public_url, format!("https://{}:8443", DOMAIN));

    let certbot = runner.calls()[runner.position("certbot certonly").unwrap()].clone();
    assert!(certbot.contains("--dns-cloudflare-credentials"));
    assert!(runner.calls().iter().all(|c| !c.contains("cf-secret-token")));
    let credentials = layout.dns_credentials_file();
    assert_eq!(credentials.mode().await.unwrap(), 0o600);

    let site = layout.site_file(DOMAIN).read_string().await.unwrap();
    assert!(site.contains("return 301 https://$host:8443$request_uri;"));
    assert!(site.contains("listen 8443 ssl http2 default_server;"));
    assert!(site.contains("ssl_reject_handshake on;"));
    assert!(site.contains("return 444;"));
    assert!(site.contains("listen 8081;"));
}

#[tokio::test]
async fn test_busy_default_edge_ports_can_be_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::rooted(dir.path());
    let listener = workload_listener();
    let app_port = listener.local_addr().unwrap().port();
    let host = FakeHost::new()
        .with_bound(80, Some("apache2"))
        .with_bound(443, Some("apache2"));
    let runner = Arc::new(issuing_runner(&layout));
    let mut answers = answers_for(app_port, app_port + 1, "cf-secret-token", "8081", "8443");

    let summary = orchestrator_on(&runner, host, dir.path())
        .deploy(&mut answers)
        .await
        .unwrap();

    assert_eq!(summary.public_url, format!("https://{}:8443", DOMAIN));
    assert!(summary.results[0].message.contains("default ports busy: 80, 443"));
    assert!(answers.rejected().is_empty());
    let site = layout.site_file(DOMAIN).read_string().await.unwrap();
    assert!(site.contains("listen 8081;"));
    assert!(!site.contains("listen 80;"));
}

#[tokio::test]
async fn test_compose_up_failure_is_workload_start_error() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::rooted(dir.path());
    let listener = workload_listener();
    let app_port = listener.local_addr().unwrap().port();
    let up = format!(
        "docker compose -f {} -p vaultwarden up -d --force-recreate",
        layout.compose_file().path().display()
    );
    let runner = Arc::new(issuing_runner(&layout).fail_exact(&up, 1, "port is already allocated"));

    let report = orchestrator(&runner, dir.path())
        .deploy(&mut deploy_answers(app_port))
        .await
        .unwrap_err();

    assert_eq!(report.step, StepName::DeployWorkload);
    assert_eq!(report.kind, "WorkloadStartError");
    assert!(report.diagnostic.contains("port is already allocated"));
    assert_eq!(report.compensations, vec!["nginx is running"]);
    assert!(runner.called(&up));
    assert!(!runner.called("certbot certonly"));
}

#[tokio::test]
async fn test_install_failure_stops_before_input() {
    let dir = tempfile::tempdir().unwrap();
    let listener = workload_listener();
    let app_port = listener.local_addr().unwrap().port();
    let runner = Arc::new(
        FakeRunner::new()
            .fail("nginx -v", 127, "nginx: not found")
            .fail("apt-get install", 100, "E: Unable to locate package nginx"),
    );
    let mut answers = deploy_answers(app_port);

    let report = orchestrator(&runner, dir.path())
        .deploy(&mut answers)
        .await
        .unwrap_err();

    assert_eq!(report.step, StepName::Dependencies);
    assert_eq!(report.kind, "DependencyInstallError");
    assert!(report.diagnostic.contains("nginx"));
    assert!(report.diagnostic.contains("Unable to locate package"));
    assert!(answers.asked().is_empty());
}
