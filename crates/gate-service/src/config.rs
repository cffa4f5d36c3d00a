//! Gate configuration.
//!
//! Configuration is loaded from environment variables. Only `JWKS_URL` is
//! required; everything else has a default. Embedded policy mode additionally
//! requires `POLICY_FILE`.

use common::jwt::{DEFAULT_LEEWAY, MAX_LEEWAY};
use jsonwebtoken::Algorithm;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default decision service host.
pub const DEFAULT_OPA_HOST: &str = "localhost";

/// Default decision service port.
pub const DEFAULT_OPA_PORT: u16 = 8181;

/// Default decision query.
pub const DEFAULT_POLICY_QUERY: &str = "data.authz.allow";

/// Default remote decision timeout in milliseconds.
pub const DEFAULT_OPA_TIMEOUT_MS: u64 = 5000;

/// Default periodic key set refresh interval in seconds.
pub const DEFAULT_JWKS_REFRESH_INTERVAL_SECONDS: u64 = 300;

/// Default minimum spacing between on-demand key set refreshes in seconds.
pub const DEFAULT_JWKS_MIN_REFRESH_INTERVAL_SECONDS: u64 = 30;

/// Default key set fetch timeout in seconds.
pub const DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Signing algorithms a verifier may be configured with.
pub const SUPPORTED_ALGORITHMS: [Algorithm; 7] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::EdDSA,
];

/// Where policy decisions are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyMode {
    /// In-process Rego evaluation.
    Embedded,
    /// HTTP call to an external decision service.
    Remote,
}

impl PolicyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyMode::Embedded => "embedded",
            PolicyMode::Remote => "remote",
        }
    }
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "embedded" => Ok(PolicyMode::Embedded),
            "remote" => Ok(PolicyMode::Remote),
            other => Err(ConfigError::InvalidPolicyMode(format!(
                "POLICY_MODE must be 'embedded' or 'remote', got '{}'",
                other
            ))),
        }
    }
}

/// Gate configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// URL of the published key set document.
    pub jwks_url: String,

    /// The only signing algorithm tokens may use.
    pub jwt_algorithm: Algorithm,

    /// Leeway in seconds applied to `exp`/`nbf`.
    pub jwt_leeway_seconds: u64,

    /// Required `iss` claim, if any.
    pub jwt_issuer: Option<String>,

    /// Required `aud` claim, if any.
    pub jwt_audience: Option<String>,

    /// Periodic key set refresh interval. Zero disables the refresher task.
    pub jwks_refresh_interval_seconds: u64,

    /// Minimum spacing between on-demand refreshes triggered by unknown key IDs.
    pub jwks_min_refresh_interval_seconds: u64,

    /// Timeout for a single key set fetch.
    pub jwks_fetch_timeout_seconds: u64,

    /// Embedded or remote policy evaluation.
    pub policy_mode: PolicyMode,

    /// Dotted decision query, e.g. `data.authz.allow`.
    pub policy_query: String,

    /// Rego module path (embedded mode only).
    pub policy_file: Option<String>,

    /// Decision service host (default: "localhost").
    pub opa_host: String,

    /// Decision service port (default: 8181).
    pub opa_port: u16,

    /// Remote decision timeout in milliseconds.
    pub opa_timeout_ms: u64,

    /// Let calls without a bearer token through to the policy as anonymous.
    pub auth_optional: bool,

    /// Whole-request timeout; also the call deadline handed to the pipeline.
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWT algorithm configuration: {0}")]
    InvalidJwtAlgorithm(String),

    #[error("Invalid JWT leeway configuration: {0}")]
    InvalidJwtLeeway(String),

    #[error("Invalid policy mode configuration: {0}")]
    InvalidPolicyMode(String),

    #[error("Invalid decision service port: {0}")]
    InvalidOpaPort(String),

    #[error("Invalid duration configuration: {0}")]
    InvalidDuration(String),

    #[error("Invalid boolean configuration: {0}")]
    InvalidBool(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let jwks_url = vars
            .get("JWKS_URL")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("JWKS_URL".to_string()))?
            .clone();

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let jwt_algorithm = match vars.get("JWT_ALGORITHM") {
            Some(value) => parse_algorithm(value)?,
            None => Algorithm::RS256,
        };

        let jwt_leeway_seconds = if let Some(value_str) = vars.get("JWT_LEEWAY_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtLeeway(format!(
                    "JWT_LEEWAY_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value > MAX_LEEWAY.as_secs() {
                return Err(ConfigError::InvalidJwtLeeway(format!(
                    "JWT_LEEWAY_SECONDS must not exceed {} seconds, got {}",
                    MAX_LEEWAY.as_secs(),
                    value
                )));
            }

            value
        } else {
            DEFAULT_LEEWAY.as_secs()
        };

        let jwt_issuer = vars.get("JWT_ISSUER").filter(|v| !v.is_empty()).cloned();
        let jwt_audience = vars.get("JWT_AUDIENCE").filter(|v| !v.is_empty()).cloned();

        let jwks_refresh_interval_seconds = parse_seconds(
            vars,
            "JWKS_REFRESH_INTERVAL_SECONDS",
            DEFAULT_JWKS_REFRESH_INTERVAL_SECONDS,
            true,
        )?;
        let jwks_min_refresh_interval_seconds = parse_seconds(
            vars,
            "JWKS_MIN_REFRESH_INTERVAL_SECONDS",
            DEFAULT_JWKS_MIN_REFRESH_INTERVAL_SECONDS,
            true,
        )?;
        let jwks_fetch_timeout_seconds = parse_seconds(
            vars,
            "JWKS_FETCH_TIMEOUT_SECONDS",
            DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS,
            false,
        )?;

        let policy_mode = match vars.get("POLICY_MODE") {
            Some(value) => value.parse()?,
            None => PolicyMode::Remote,
        };

        let policy_query = vars
            .get("POLICY_QUERY")
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_POLICY_QUERY.to_string());

        let policy_file = vars.get("POLICY_FILE").filter(|v| !v.is_empty()).cloned();
        if policy_mode == PolicyMode::Embedded && policy_file.is_none() {
            return Err(ConfigError::MissingEnvVar("POLICY_FILE".to_string()));
        }

        let opa_host = vars
            .get("OPA_HOST")
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_OPA_HOST.to_string());

        let opa_port = match vars.get("OPA_PORT").filter(|v| !v.is_empty()) {
            Some(value_str) => value_str.parse::<u16>().map_err(|e| {
                ConfigError::InvalidOpaPort(format!(
                    "OPA_PORT must be a valid port number, got '{}': {}",
                    value_str, e
                ))
            })?,
            None => DEFAULT_OPA_PORT,
        };

        let opa_timeout_ms = parse_seconds(vars, "OPA_TIMEOUT_MS", DEFAULT_OPA_TIMEOUT_MS, false)?;

        let auth_optional = match vars.get("AUTH_OPTIONAL") {
            Some(value) => parse_bool("AUTH_OPTIONAL", value)?,
            None => false,
        };

        let request_timeout_seconds = parse_seconds(
            vars,
            "REQUEST_TIMEOUT_SECONDS",
            DEFAULT_REQUEST_TIMEOUT_SECONDS,
            false,
        )?;

        Ok(Config {
            bind_address,
            jwks_url,
            jwt_algorithm,
            jwt_leeway_seconds,
            jwt_issuer,
            jwt_audience,
            jwks_refresh_interval_seconds,
            jwks_min_refresh_interval_seconds,
            jwks_fetch_timeout_seconds,
            policy_mode,
            policy_query,
            policy_file,
            opa_host,
            opa_port,
            opa_timeout_ms,
            auth_optional,
            request_timeout_seconds,
        })
    }

    /// Base URL of the remote decision service.
    pub fn opa_base_url(&self) -> String {
        format!("http://{}:{}", self.opa_host, self.opa_port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn parse_algorithm(value: &str) -> Result<Algorithm, ConfigError> {
    let algorithm = Algorithm::from_str(value).map_err(|e| {
        ConfigError::InvalidJwtAlgorithm(format!(
            "JWT_ALGORITHM '{}' is not a known algorithm: {}",
            value, e
        ))
    })?;

    if !SUPPORTED_ALGORITHMS.contains(&algorithm) {
        return Err(ConfigError::InvalidJwtAlgorithm(format!(
            "JWT_ALGORITHM '{}' is not supported for key set verification",
            value
        )));
    }

    Ok(algorithm)
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
    allow_zero: bool,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidDuration(format!(
            "{} must be a valid non-negative integer, got '{}': {}",
            name, value_str, e
        ))
    })?;

    if value == 0 && !allow_zero {
        return Err(ConfigError::InvalidDuration(format!(
            "{} must be greater than 0",
            name
        )));
    }

    Ok(value)
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBool(format!(
            "{} must be true or false, got '{}'",
            name, value
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            "JWKS_URL".to_string(),
            "http://localhost:8082/.well-known/jwks.json".to_string(),
        )])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.jwks_url, "http://localhost:8082/.well-known/jwks.json");
        assert_eq!(config.jwt_algorithm, Algorithm::RS256);
        assert_eq!(config.jwt_leeway_seconds, 0);
        assert!(config.jwt_issuer.is_none());
        assert!(config.jwt_audience.is_none());
        assert_eq!(
            config.jwks_refresh_interval_seconds,
            DEFAULT_JWKS_REFRESH_INTERVAL_SECONDS
        );
        assert_eq!(
            config.jwks_min_refresh_interval_seconds,
            DEFAULT_JWKS_MIN_REFRESH_INTERVAL_SECONDS
        );
        assert_eq!(config.policy_mode, PolicyMode::Remote);
        assert_eq!(config.policy_query, DEFAULT_POLICY_QUERY);
        assert_eq!(config.opa_host, "localhost");
        assert_eq!(config.opa_port, 8181);
        assert_eq!(config.opa_timeout_ms, DEFAULT_OPA_TIMEOUT_MS);
        assert!(!config.auth_optional);
        assert_eq!(config.opa_base_url(), "http://localhost:8181");
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert("JWT_ALGORITHM".to_string(), "EdDSA".to_string());
        vars.insert("JWT_LEEWAY_SECONDS".to_string(), "30".to_string());
        vars.insert("JWT_ISSUER".to_string(), "https://issuer.example".to_string());
        vars.insert("JWT_AUDIENCE".to_string(), "gate".to_string());
        vars.insert("POLICY_MODE".to_string(), "embedded".to_string());
        vars.insert("POLICY_FILE".to_string(), "/etc/gate/policy.rego".to_string());
        vars.insert("POLICY_QUERY".to_string(), "data.api.allow".to_string());
        vars.insert("OPA_HOST".to_string(), "opa.internal".to_string());
        vars.insert("OPA_PORT".to_string(), "9181".to_string());
        vars.insert("AUTH_OPTIONAL".to_string(), "true".to_string());
        vars.insert("JWKS_REFRESH_INTERVAL_SECONDS".to_string(), "0".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.jwt_algorithm, Algorithm::EdDSA);
        assert_eq!(config.jwt_leeway_seconds, 30);
        assert_eq!(config.jwt_issuer.as_deref(), Some("https://issuer.example"));
        assert_eq!(config.jwt_audience.as_deref(), Some("gate"));
        assert_eq!(config.policy_mode, PolicyMode::Embedded);
        assert_eq!(config.policy_file.as_deref(), Some("/etc/gate/policy.rego"));
        assert_eq!(config.policy_query, "data.api.allow");
        assert_eq!(config.opa_base_url(), "http://opa.internal:9181");
        assert!(config.auth_optional);
        assert_eq!(config.jwks_refresh_interval_seconds, 0);
    }

    #[test]
    fn test_from_vars_missing_jwks_url() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "JWKS_URL"));
    }

    #[test]
    fn test_empty_opa_host_falls_back_to_default() {
        let mut vars = base_vars();
        vars.insert("OPA_HOST".to_string(), String::new());
        vars.insert("OPA_PORT".to_string(), String::new());

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.opa_base_url(), "http://localhost:8181");
    }

    #[test]
    fn test_embedded_mode_requires_policy_file() {
        let mut vars = base_vars();
        vars.insert("POLICY_MODE".to_string(), "embedded".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "POLICY_FILE"));
    }

    #[test]
    fn test_policy_mode_rejects_unknown() {
        let mut vars = base_vars();
        vars.insert("POLICY_MODE".to_string(), "sidecar-ish".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidPolicyMode(_))));
    }

    #[test]
    fn test_algorithm_rejects_hmac() {
        let mut vars = base_vars();
        vars.insert("JWT_ALGORITHM".to_string(), "HS256".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidJwtAlgorithm(msg)) if msg.contains("not supported"))
        );
    }

    #[test]
    fn test_algorithm_rejects_unknown_name() {
        let mut vars = base_vars();
        vars.insert("JWT_ALGORITHM".to_string(), "none".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidJwtAlgorithm(msg)) if msg.contains("not a known algorithm"))
        );
    }

    #[test]
    fn test_leeway_rejects_too_large() {
        let mut vars = base_vars();
        vars.insert("JWT_LEEWAY_SECONDS".to_string(), "601".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidJwtLeeway(msg)) if msg.contains("must not exceed 600"))
        );
    }

    #[test]
    fn test_leeway_rejects_negative() {
        let mut vars = base_vars();
        vars.insert("JWT_LEEWAY_SECONDS".to_string(), "-5".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidJwtLeeway(_))));
    }

    #[test]
    fn test_opa_port_rejects_out_of_range() {
        let mut vars = base_vars();
        vars.insert("OPA_PORT".to_string(), "70000".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidOpaPort(_))));
    }

    #[test]
    fn test_fetch_timeout_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("JWKS_FETCH_TIMEOUT_SECONDS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidDuration(msg)) if msg.contains("must be greater than 0"))
        );
    }

    #[test]
    fn test_auth_optional_rejects_garbage() {
        let mut vars = base_vars();
        vars.insert("AUTH_OPTIONAL".to_string(), "maybe".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidBool(_))));
    }
}
