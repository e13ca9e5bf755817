//! Fakes shared by the integration tests

use std::collections::HashMap;
use std::net::TcpListener;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use wardenctl::app::options::AppOptions;
use wardenctl::errors::DeployError;
use wardenctl::host::{HostFacts, PortStatus};
use wardenctl::input::scripted::ScriptedPrompts;
use wardenctl::process::{CommandOutput, CommandRunner, CommandSpec};
use wardenctl::storage::layout::StorageLayout;
use wardenctl::utils::CooldownOptions;

pub const DOMAIN: &str = "vault.example.test";

type Effect = Arc<dyn Fn(&CommandSpec) + Send + Sync>;

enum Matcher {
    Prefix(String),
    Exact(String),
}

impl Matcher {
    fn matches(&self, command: &str) -> bool {
        match self {
            Matcher::Prefix(p) => command.starts_with(p.as_str()),
            Matcher::Exact(e) => command == e,
        }
    }
}

struct Rule {
    matcher: Matcher,
    output: Option<CommandOutput>,
    effect: Option<Effect>,
    // Matches left before the rule stops applying
    remaining: Option<usize>,
}

/// Records every command and answers from rules; unmatched commands succeed
#[derive(Default)]
pub struct FakeRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands starting with `prefix` exit with `code` and `stderr`
    pub fn fail(self, prefix: &str, code: i32, stderr: &str) -> Self {
        self.push(Matcher::Prefix(prefix.to_string()), failure(code, stderr), None)
    }

    /// Commands starting with `prefix` fail `times` times, then succeed
    pub fn fail_times(self, prefix: &str, times: usize, code: i32, stderr: &str) -> Self {
        let runner = self.fail(prefix, code, stderr);
        if let Some(rule) = runner.rules.lock().unwrap().last_mut() {
            rule.remaining = Some(times);
        }
        runner
    }

    /// Exactly `command` exits with `code` and `stderr`
    pub fn fail_exact(self, command: &str, code: i32, stderr: &str) -> Self {
        self.push(Matcher::Exact(command.to_string()), failure(code, stderr), None)
    }

    /// Run `effect` whenever a command starting with `prefix` succeeds
    pub fn on(self, prefix: &str, effect: impl Fn(&CommandSpec) + Send + Sync + 'static) -> Self {
        self.push(Matcher::Prefix(prefix.to_string()), None, Some(Arc::new(effect)))
    }

    fn push(self, matcher: Matcher, output: Option<CommandOutput>, effect: Option<Effect>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            matcher,
            output,
            effect,
            remaining: None,
        });
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, prefix: &str) -> bool {
        self.position(prefix).is_some()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.starts_with(prefix))
    }
}

fn failure(code: i32, stderr: &str) -> Option<CommandOutput> {
    Some(CommandOutput {
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    })
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, DeployError> {
        let command = spec.to_string();
        self.calls.lock().unwrap().push(command.clone());

        let mut rules = self.rules.lock().unwrap();
        // Later rules win
        for rule in rules.iter_mut().rev() {
            if !rule.matcher.matches(&command) || rule.remaining == Some(0) {
                continue;
            }
            if let Some(remaining) = rule.remaining.as_mut() {
                *remaining -= 1;
            }
            if let Some(output) = &rule.output {
                return Ok(output.clone());
            }
            if let Some(effect) = &rule.effect {
                effect(spec);
            }
            break;
        }
        Ok(CommandOutput {
            code: Some(0),
            ..Default::default()
        })
    }
}

/// Host whose facts are set by the test
pub struct FakeHost {
    pub elevated: bool,
    pub bound: HashMap<u16, Option<String>>,
    pub clock: Option<bool>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            elevated: true,
            bound: HashMap::new(),
            clock: Some(true),
        }
    }

    pub fn with_bound(mut self, port: u16, owner: Option<&str>) -> Self {
        self.bound.insert(port, owner.map(str::to_string));
        self
    }
}

#[async_trait]
impl HostFacts for FakeHost {
    fn is_elevated(&self) -> bool {
        self.elevated
    }

    async fn port_status(&self, port: u16) -> PortStatus {
        match self.bound.get(&port) {
            Some(owner) => PortStatus::Bound {
                owner: owner.clone(),
            },
            None => PortStatus::Free,
        }
    }

    async fn clock_synchronized(&self) -> Option<bool> {
        self.clock
    }

    async fn request_time_sync(&self) -> bool {
        false
    }
}

/// Options with every path under `root` and no waiting
pub fn test_options(root: &Path) -> AppOptions {
    let mut options = AppOptions {
        layout: StorageLayout::rooted(root),
        ..Default::default()
    };
    options.preflight.time_sync_grace = Duration::ZERO;
    options.workload.settle_time = Duration::ZERO;
    options.workload.readiness_attempts = 2;
    options.workload.readiness_backoff = CooldownOptions {
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(10),
        multiplier: 2.0,
    };
    options.edge.routed_probe = false;
    options
}

/// certbot that leaves certificate files behind like the real one
pub fn issuing_runner(layout: &StorageLayout) -> FakeRunner {
    with_issuing_certbot(FakeRunner::new(), layout)
}

pub fn with_issuing_certbot(runner: FakeRunner, layout: &StorageLayout) -> FakeRunner {
    let letsencrypt = layout.letsencrypt_dir.clone();
    let dhparam = layout.dhparam_path.clone();
    runner
        .on("certbot certonly", move |_| {
            let live = letsencrypt.join("live").join(DOMAIN);
            std::fs::create_dir_all(&live).unwrap();
            std::fs::write(live.join("fullchain.pem"), "CHAIN").unwrap();
            std::fs::write(live.join("privkey.pem"), "KEY").unwrap();
            let archive = letsencrypt.join("archive").join(DOMAIN);
            std::fs::create_dir_all(&archive).unwrap();
            let renewal = letsencrypt.join("renewal");
            std::fs::create_dir_all(&renewal).unwrap();
            std::fs::write(renewal.join(format!("{}.conf", DOMAIN)), "").unwrap();
        })
        .on("openssl dhparam", move |_| {
            std::fs::write(&dhparam, "DH PARAMETERS").unwrap();
        })
}

/// A listener standing in for the workload, on a port the collector accepts
pub fn workload_listener() -> TcpListener {
    for port in 20000..40000 {
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)) {
            return listener;
        }
    }
    panic!("no free port for the workload listener");
}

/// Answers for a deploy with default edge ports and HTTP-01 issuance
pub fn deploy_answers(app_port: u16) -> ScriptedPrompts {
    answers_for(app_port, app_port + 1, "", "", "")
}

/// Answers for every deploy prompt; blank means the default
pub fn answers_for(
    app_port: u16,
    websocket_port: u16,
    dns_api_token: &str,
    edge_http_port: &str,
    edge_https_port: &str,
) -> ScriptedPrompts {
    ScriptedPrompts::new()
        .answer("domain", DOMAIN)
        .answer("email", "ops@example.test")
        .answer("dns_api_token", dns_api_token)
        .answer("app_port", &app_port.to_string())
        .answer("websocket_port", &websocket_port.to_string())
        .answer("edge_http_port", edge_http_port)
        .answer("edge_https_port", edge_https_port)
}
