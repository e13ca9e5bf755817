//! Input collection tests

use tokio_test::{assert_err, assert_ok};

use wardenctl::app::options::PortDefaults;
use wardenctl::errors::DeployError;
use wardenctl::input::collector::collect_config;
use wardenctl::input::scripted::ScriptedPrompts;
use wardenctl::models::config::CertStrategy;

use crate::common::{FakeHost, DOMAIN};

fn managed() -> Vec<String> {
    vec!["nginx".to_string()]
}

fn base_answers() -> ScriptedPrompts {
    ScriptedPrompts::new()
        .answer("dns_api_token", "")
        .answer("app_port", "")
        .answer("websocket_port", "")
        .answer("edge_http_port", "")
        .answer("edge_https_port", "")
}

#[tokio::test]
async fn test_invalid_answers_are_asked_again() {
    let mut prompts = base_answers()
        .answers("domain", &["", "not a domain", "localhost", DOMAIN])
        .answers("email", &["ops", "ops@example.test"]);

    let config = assert_ok!(
        collect_config(&mut prompts, &FakeHost::new(), PortDefaults::default(), &managed()).await
    );

    assert_eq!(config.domain(), DOMAIN);
    assert_eq!(config.email(), "ops@example.test");
    assert_eq!(config.cert_strategy(), CertStrategy::Webroot);
    assert_eq!(config.workload_ports().app, 8080);
    assert_eq!(config.edge_ports().https, 443);

    let rejected: Vec<&str> = prompts.rejected().iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(rejected, vec!["domain", "domain", "domain", "email"]);
}

#[tokio::test]
async fn test_ports_must_be_distinct_in_range_and_free() {
    let host = FakeHost::new().with_bound(9000, Some("python3"));
    let mut prompts = ScriptedPrompts::new()
        .answer("domain", DOMAIN)
        .answer("email", "ops@example.test")
        .answer("dns_api_token", "cf-token")
        .answers("app_port", &["80", "9000", "9001"])
        .answers("websocket_port", &["9001", "9002"])
        .answers("edge_http_port", &["9002", "8081"])
        .answers("edge_https_port", &["8081", "8443"]);

    let config = assert_ok!(collect_config(&mut prompts, &host, PortDefaults::default(), &managed()).await);

    assert_eq!(config.workload_ports().app, 9001);
    assert_eq!(config.workload_ports().websocket, 9002);
    assert_eq!(config.edge_ports().http, 8081);
    assert_eq!(config.edge_ports().https, 8443);
    assert!(config.edge_ports().is_custom());
    assert_eq!(config.cert_strategy(), CertStrategy::Dns);
    assert_eq!(config.public_url(), format!("https://{}:8443", DOMAIN));
    assert_eq!(prompts.rejected().len(), 5);
}

#[tokio::test]
async fn test_closed_input_aborts() {
    let mut prompts = ScriptedPrompts::new().answers("domain", &["bad"]);
    let err = assert_err!(
        collect_config(&mut prompts, &FakeHost::new(), PortDefaults::default(), &managed()).await
    );
    assert!(matches!(err, DeployError::InputClosed(key) if key == "domain"));
}

#[tokio::test]
async fn test_http01_keeps_the_challenge_on_port_80() {
    let mut prompts = ScriptedPrompts::new()
        .answer("domain", DOMAIN)
        .answer("email", "ops@example.test")
        .answer("dns_api_token", "")
        .answer("app_port", "9001")
        .answer("websocket_port", "9002")
        .answers("edge_http_port", &["8081", "80"])
        .answer("edge_https_port", "8443");

    let config = assert_ok!(
        collect_config(&mut prompts, &FakeHost::new(), PortDefaults::default(), &managed()).await
    );

    assert_eq!(config.cert_strategy(), CertStrategy::Webroot);
    assert_eq!(config.edge_ports().http, 80);
    assert_eq!(config.edge_ports().https, 8443);
    match prompts.rejected() {
        [(key, reason)] => {
            assert_eq!(key, "edge_http_port");
            assert!(reason.contains("DNS API token"), "{}", reason);
        }
        other => panic!("unexpected rejections: {:?}", other),
    }
}

#[tokio::test]
async fn test_http01_with_only_custom_http_ports_aborts() {
    let mut prompts = ScriptedPrompts::new()
        .answer("domain", DOMAIN)
        .answer("email", "ops@example.test")
        .answer("dns_api_token", "")
        .answer("app_port", "9001")
        .answer("websocket_port", "9002")
        .answer("edge_http_port", "8081");

    let err = assert_err!(
        collect_config(&mut prompts, &FakeHost::new(), PortDefaults::default(), &managed()).await
    );
    assert!(matches!(err, DeployError::InputClosed(key) if key == "edge_http_port"));
}
