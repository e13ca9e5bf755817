//! Syntax checks for operator input

use std::ops::RangeInclusive;

/// Ports the workload may publish on: unprivileged, below the ephemeral range
pub const WORKLOAD_PORT_RANGE: RangeInclusive<u16> = 1024..=49151;

/// Validate and normalize a domain name
pub fn validate_domain(raw: &str) -> Result<String, String> {
    let domain = raw.trim().trim_end_matches('.').to_lowercase();
    if domain.is_empty() {
        return Err("domain must not be empty".to_string());
    }
    if domain.len() > 253 {
        return Err("domain is longer than 253 characters".to_string());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(format!("'{}' is not a fully qualified domain name", domain));
    }
    for label in &labels {
        validate_label(label).map_err(|e| format!("'{}': {}", domain, e))?;
    }
    if labels
        .last()
        .is_some_and(|tld| tld.chars().all(|c| c.is_ascii_digit()))
    {
        return Err(format!("'{}' looks like an IP address, not a domain", domain));
    }
    Ok(domain)
}

fn validate_label(label: &str) -> Result<(), String> {
    if label.is_empty() {
        return Err("empty label".to_string());
    }
    if label.len() > 63 {
        return Err(format!("label '{}' is longer than 63 characters", label));
    }
    if label.starts_with('-') || label.ends_with('-') {
        return Err(format!("label '{}' starts or ends with a hyphen", label));
    }
    if !label
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(format!("label '{}' contains invalid characters", label));
    }
    Ok(())
}

/// Validate a contact email address
pub fn validate_email(raw: &str) -> Result<String, String> {
    let email = raw.trim();
    if email.is_empty() {
        return Err("email must not be empty".to_string());
    }
    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| format!("'{}' is missing '@'", email))?;
    if local.is_empty() || local.len() > 64 {
        return Err(format!("'{}' has an invalid local part", email));
    }
    if local.contains(char::is_whitespace) || domain.contains('@') {
        return Err(format!("'{}' is not a valid address", email));
    }
    validate_domain(domain).map_err(|e| format!("'{}' has an invalid domain: {}", email, e))?;
    Ok(email.to_string())
}

/// Parse a port, using `default` for a blank answer
pub fn parse_port(raw: &str, default: u16) -> Result<u16, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(default);
    }
    match raw.parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("'{}' is not a port number (1-65535)", raw)),
        Ok(port) => Ok(port),
    }
}

/// Check a workload port is in the allowed range
pub fn check_workload_port(port: u16) -> Result<u16, String> {
    if WORKLOAD_PORT_RANGE.contains(&port) {
        Ok(port)
    } else {
        Err(format!(
            "port {} is outside {}-{}",
            port,
            WORKLOAD_PORT_RANGE.start(),
            WORKLOAD_PORT_RANGE.end()
        ))
    }
}
