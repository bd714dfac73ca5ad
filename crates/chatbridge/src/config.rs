use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        let expanded = expand_env_vars(&contents)?;
        Ok(serde_saphyr::from_str(&expanded)?)
    }
}

/// Resolve a path relative to the config file directory.
///
/// Absolute paths are returned as-is; relative paths are joined with the
/// config file's parent directory so behavior does not depend on the
/// current working directory.
pub fn resolve_path(config_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }

    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    config_dir.join(path)
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_seconds: u64,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            request_timeout_seconds: 30,
            max_connections: 64,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite audit database. Relative paths resolve against
    /// the config file directory.
    pub path: Option<PathBuf>,
}

/// Automation driver subprocess settings.
///
/// One driver process is spawned per tenant, with the tenant's profile
/// directory appended to `args` (see [`crate::client::SubprocessClientFactory`]).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// Root directory for per-tenant driver profiles.
    pub profile_dir: Option<PathBuf>,
    /// How long to wait for the driver to complete a command.
    pub command_timeout_seconds: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            command: "chatbridge-driver".to_string(),
            args: Vec::new(),
            env: HashMap::new(),
            profile_dir: None,
            command_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Minimum granularity for recurring-send intervals. Requested intervals
    /// must be a positive multiple of this value.
    pub min_interval_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1000,
        }
    }
}

// ============================================================================
// Default Paths
// ============================================================================

/// Default audit database file (relative to config file).
pub const DEFAULT_DATABASE_PATH: &str = "history.db";
/// Default driver profile root (relative to config file).
pub const DEFAULT_PROFILE_DIR: &str = ".chatbridge/profiles";

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports shell-compatible syntax:
/// - `${VAR}` - required variable, errors if not set
/// - `${VAR:-default}` - optional variable with default value
/// - `$$` - escaped `$` (only needed before `{`)
///
/// No nested expansion; an unclosed `${` is an error.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        match chars.peek() {
            Some((_, '$')) => {
                chars.next();
                out.push('$');
            }
            Some((_, '{')) => {
                chars.next();
                let rest = &input[idx..];
                let Some(end) = rest.find('}') else {
                    return Err(ConfigError::UnclosedVarReference);
                };
                let reference = &rest[2..end];
                out.push_str(&resolve_var(reference)?);
                // Skip everything up to and including the closing brace.
                while let Some((i, _)) = chars.peek() {
                    if *i > idx + end {
                        break;
                    }
                    chars.next();
                }
            }
            _ => out.push('$'),
        }
    }

    Ok(out)
}

fn resolve_var(reference: &str) -> Result<String, ConfigError> {
    match reference.split_once(":-") {
        Some((name, default)) => Ok(std::env::var(name).unwrap_or_else(|_| default.to_string())),
        None => {
            std::env::var(reference).map_err(|_| ConfigError::MissingEnvVar(reference.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.dispatch.min_interval_ms, 1000);
        assert_eq!(config.driver.command_timeout_seconds, 30);
        assert!(config.database.path.is_none());
    }

    #[test]
    fn parses_partial_yaml() {
        let yaml = "server:\n  port: 8081\ndriver:\n  command: my-driver\n";
        let config: Config = serde_saphyr::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.driver.command, "my-driver");
    }

    #[test]
    fn expands_variable_with_default() {
        let out = expand_env_vars("host: ${CHATBRIDGE_TEST_UNSET:-localhost}").unwrap();
        assert_eq!(out, "host: localhost");
    }

    #[test]
    fn expands_set_variable() {
        // SAFETY: test-local variable, no concurrent reader depends on it.
        unsafe { std::env::set_var("CHATBRIDGE_TEST_HOST", "10.0.0.1") };
        let out = expand_env_vars("host: ${CHATBRIDGE_TEST_HOST}").unwrap();
        assert_eq!(out, "host: 10.0.0.1");
    }

    #[test]
    fn missing_required_variable_errors() {
        let err = expand_env_vars("token: ${CHATBRIDGE_TEST_MISSING}").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(name) if name == "CHATBRIDGE_TEST_MISSING"));
    }

    #[test]
    fn unclosed_reference_errors() {
        let err = expand_env_vars("token: ${OOPS").unwrap_err();
        assert!(matches!(err, ConfigError::UnclosedVarReference));
    }

    #[test]
    fn escaped_dollar_passes_through() {
        let out = expand_env_vars("price: $${not_a_var}").unwrap();
        assert_eq!(out, "price: ${not_a_var}");
    }

    #[test]
    fn resolve_path_relative_to_config() {
        let resolved = resolve_path(Path::new("/etc/chatbridge/chatbridge.yaml"), Path::new("history.db"));
        assert_eq!(resolved, PathBuf::from("/etc/chatbridge/history.db"));

        let absolute = resolve_path(Path::new("chatbridge.yaml"), Path::new("/var/db/history.db"));
        assert_eq!(absolute, PathBuf::from("/var/db/history.db"));
    }
}
