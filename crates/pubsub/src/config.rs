use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use xmpp_parsers::jid::Jid;

use crate::error::ConfigError;
use crate::node::DiscoveryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct PubSubConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub jid: String,
    pub node: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryPolicyKind {
    #[default]
    Lenient,
    Strict,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub policy: DiscoveryPolicyKind,
    pub surface_after: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Default, Clone)]
struct ConfigOverrides {
    service: Option<String>,
    node: Option<String>,
    log_level: Option<String>,
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl PubSubConfig {
    /// The service JID. Validation has already checked that it parses.
    pub fn service_jid(&self) -> Result<Jid, ConfigError> {
        parse_service_jid(&self.service.jid)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.transport.request_timeout_seconds)
    }

    pub fn discovery_policy(&self) -> DiscoveryPolicy {
        match (self.discovery.policy, self.discovery.surface_after) {
            (DiscoveryPolicyKind::Strict, _) => DiscoveryPolicy::Strict,
            (DiscoveryPolicyKind::Lenient, Some(n)) => DiscoveryPolicy::SurfaceAfter(n),
            (DiscoveryPolicyKind::Lenient, None) => DiscoveryPolicy::Lenient,
        }
    }
}

/// Load configuration from a file, merging environment variable overrides.
pub fn load_config_from(path: PathBuf) -> Result<PubSubConfig, ConfigError> {
    load_config_from_with_overrides(path, config_overrides_from_env())
}

/// Parse configuration from a TOML string, merging environment variable
/// overrides.
pub fn load_config_from_str(toml_str: &str) -> Result<PubSubConfig, ConfigError> {
    load_config_from_str_with_overrides(toml_str, config_overrides_from_env())
}

fn load_config_from_with_overrides(
    path: PathBuf,
    overrides: ConfigOverrides,
) -> Result<PubSubConfig, ConfigError> {
    let contents = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigError::FileNotFound { path: path.clone() },
        _ => ConfigError::Io(e),
    })?;

    load_config_from_str_with_overrides(&contents, overrides)
}

fn load_config_from_str_with_overrides(
    toml_str: &str,
    overrides: ConfigOverrides,
) -> Result<PubSubConfig, ConfigError> {
    let mut config: PubSubConfig =
        toml::from_str(toml_str).map_err(|e| invalid_toml(toml_str, &e))?;

    apply_overrides(&mut config, overrides);
    validate(&config)?;

    Ok(config)
}

fn invalid_toml(source: &str, error: &toml::de::Error) -> ConfigError {
    let (line, column) = error
        .span()
        .map_or((0, 0), |span| line_and_column(source, span.start));

    ConfigError::InvalidToml {
        line,
        column,
        message: error.message().to_string(),
    }
}

/// 1-based line and column of a byte offset into `source`.
fn line_and_column(source: &str, offset: usize) -> (usize, usize) {
    let prefix = source.get(..offset).unwrap_or(source);
    let line_start = prefix.rfind('\n').map_or(0, |nl| nl + 1);
    let line = prefix.matches('\n').count() + 1;
    let column = prefix[line_start..].chars().count() + 1;
    (line, column)
}

fn config_overrides_from_env() -> ConfigOverrides {
    ConfigOverrides {
        service: std::env::var("WADDLE_PUBSUB_SERVICE").ok(),
        node: std::env::var("WADDLE_PUBSUB_NODE").ok(),
        log_level: std::env::var("WADDLE_PUBSUB_LOG_LEVEL").ok(),
    }
}

fn apply_overrides(config: &mut PubSubConfig, overrides: ConfigOverrides) {
    if let Some(service) = overrides.service {
        config.service.jid = service;
    }
    if let Some(node) = overrides.node {
        config.service.node = Some(node);
    }
    if let Some(level) = overrides.log_level {
        config.logging.level = level;
    }
}

fn validate(config: &PubSubConfig) -> Result<(), ConfigError> {
    if config.service.jid.is_empty() {
        return Err(ConfigError::MissingRequiredFields {
            fields: vec!["service.jid".to_string()],
        });
    }
    parse_service_jid(&config.service.jid)?;

    if config.service.node.as_deref() == Some("") {
        return Err(ConfigError::InvalidValue {
            field: "service.node".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    if config.transport.request_timeout_seconds == 0 {
        return Err(ConfigError::InvalidValue {
            field: "transport.request_timeout_seconds".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }

    match (config.discovery.policy, config.discovery.surface_after) {
        (_, Some(0)) => {
            return Err(ConfigError::InvalidValue {
                field: "discovery.surface_after".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        (DiscoveryPolicyKind::Strict, Some(_)) => {
            return Err(ConfigError::InvalidValue {
                field: "discovery.surface_after".to_string(),
                message: "only applies to the lenient policy".to_string(),
            });
        }
        _ => {}
    }

    if !VALID_LOG_LEVELS.contains(&config.logging.level.as_str()) {
        return Err(ConfigError::InvalidValue {
            field: "logging.level".to_string(),
            message: format!("must be one of: {}", VALID_LOG_LEVELS.join(", ")),
        });
    }

    Ok(())
}

fn parse_service_jid(jid: &str) -> Result<Jid, ConfigError> {
    jid.parse().map_err(|e| ConfigError::InvalidValue {
        field: "service.jid".to_string(),
        message: format!("{e}"),
    })
}
