//! Error types for wardenctl

use thiserror::Error;

/// Main error type for deployment and decommission runs
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Permission error: {0}")]
    PermissionError(String),

    #[error("Port conflict: port {port} is already in use{}", owner_suffix(.owner))]
    PortConflictError { port: u16, owner: Option<String> },

    #[error("Failed to install {tool}: {diagnostic}")]
    DependencyInstallError { tool: String, diagnostic: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Workload failed to start: {0}")]
    WorkloadStartError(String),

    #[error("Workload not ready on port {port} after {attempts} attempts")]
    ReadinessTimeoutError { port: u16, attempts: u32 },

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    #[error("Certificate issuance failed: {0}")]
    CertificateIssuanceError(String),

    #[error("Verification failed: {0}")]
    VerificationError(String),

    #[error("Command `{command}` failed: {reason}")]
    CommandError { command: String, reason: String },

    #[error("Input stream closed while waiting for {0}")]
    InputClosed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn owner_suffix(owner: &Option<String>) -> String {
    match owner {
        Some(name) => format!(" (held by {})", name),
        None => String::new(),
    }
}

impl DeployError {
    /// Short, stable name of the error kind for reports
    pub fn kind(&self) -> &'static str {
        match self {
            DeployError::PermissionError(_) => "PermissionError",
            DeployError::PortConflictError { .. } => "PortConflictError",
            DeployError::DependencyInstallError { .. } => "DependencyInstallError",
            DeployError::ValidationError(_) => "ValidationError",
            DeployError::WorkloadStartError(_) => "WorkloadStartError",
            DeployError::ReadinessTimeoutError { .. } => "ReadinessTimeoutError",
            DeployError::ConfigValidationError(_) => "ConfigValidationError",
            DeployError::CertificateIssuanceError(_) => "CertificateIssuanceError",
            DeployError::VerificationError(_) => "VerificationError",
            DeployError::CommandError { .. } => "CommandError",
            DeployError::InputClosed(_) => "InputClosed",
            DeployError::IoError(_) => "IoError",
            DeployError::JsonError(_) => "JsonError",
            DeployError::YamlError(_) => "YamlError",
            DeployError::HttpError(_) => "HttpError",
            DeployError::ConfigError(_) => "ConfigError",
            DeployError::Internal(_) => "Internal",
        }
    }
}

impl From<anyhow::Error> for DeployError {
    fn from(err: anyhow::Error) -> Self {
        DeployError::Internal(err.to_string())
    }
}
