// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for the event-tap daemon.
//!
//! [`EtapConfig`] holds the daemon's runtime settings. Every field is
//! optional so that a TOML file, the environment and command-line flags can
//! be layered with [`merge_configs`]; the `*_or_default` accessors resolve
//! the effective value.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// An environment override held a value of the wrong shape.
    #[error("invalid value for {var}: {reason}")]
    InvalidEnv {
        /// Variable name.
        var: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A recommended optional field is missing.
    MissingOptionalField {
        /// Name of the missing field.
        field: String,
        /// Why it matters.
        hint: String,
    },
    /// An outbound HTTP timeout is unusually large.
    LargeTimeout {
        /// Field name.
        field: String,
        /// Timeout value in seconds.
        secs: u64,
    },
    /// A zero interval turns a runner wait into a busy loop.
    TightLoop {
        /// Field name.
        field: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            ConfigWarning::LargeTimeout { field, secs } => {
                write!(f, "'{field}' is unusually large ({secs}s)")
            }
            ConfigWarning::TightLoop { field } => {
                write!(f, "'{field}' is 0; runners will spin without pausing")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

/// Top-level runtime configuration for the event-tap daemon.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct EtapConfig {
    /// Control-plane listen address, e.g. `"0.0.0.0:6677"` or `":6677"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Path of the SQLite state file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<String>,

    /// Base URL of the upstream event service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_source_url: Option<String>,

    /// Log level or `EnvFilter` directive (e.g. `"debug"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Log output format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_format: Option<LogFormat>,

    /// Request timeout for upstream polls and webhook deliveries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_timeout_secs: Option<u64>,

    /// Pause after a failed iteration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,

    /// Pause after an empty poll.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_poll_ms: Option<u64>,

    /// How long shutdown waits for runners to stop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutdown_grace_ms: Option<u64>,

    /// Script engine limits.
    #[serde(default)]
    pub script: ScriptConfig,
}

/// Per-tap script engine limits. `None` keeps the engine default.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ScriptConfig {
    /// Maximum iterations of any single loop in one invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_iteration_limit: Option<u64>,

    /// Maximum call-stack depth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursion_limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default control-plane listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0:6677";
/// Default state file.
pub const DEFAULT_STATE_FILE: &str = "state";
/// Default upstream event service.
pub const DEFAULT_EVENT_SOURCE_URL: &str = "http://localhost:5566";
/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// Default outbound request timeout.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
/// Default pause after a failed iteration.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
/// Default pause after an empty poll.
pub const DEFAULT_IDLE_POLL_MS: u64 = 200;
/// Default shutdown grace period.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 1_000;

/// Maximum allowed HTTP timeout in seconds (1 hour).
const MAX_HTTP_TIMEOUT_SECS: u64 = 3_600;

/// Threshold above which an HTTP timeout generates a warning.
const LARGE_TIMEOUT_THRESHOLD: u64 = 300;

/// Recognised log levels.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

impl EtapConfig {
    /// Effective listen address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] when `bind` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = self.bind.as_deref().unwrap_or(DEFAULT_BIND);
        parse_bind(raw).ok_or_else(|| ConfigError::ValidationError {
            reasons: vec![format!("invalid bind address '{raw}'")],
        })
    }

    /// Effective state file path.
    pub fn state_file_or_default(&self) -> &str {
        self.state_file.as_deref().unwrap_or(DEFAULT_STATE_FILE)
    }

    /// Effective upstream base URL.
    pub fn event_source_url_or_default(&self) -> &str {
        self.event_source_url
            .as_deref()
            .unwrap_or(DEFAULT_EVENT_SOURCE_URL)
    }

    /// Effective log level directive.
    pub fn log_level_or_default(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Effective log format.
    pub fn log_format_or_default(&self) -> LogFormat {
        self.log_format.unwrap_or_default()
    }

    /// Effective outbound request timeout.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS))
    }

    /// Effective retry delay.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS))
    }

    /// Effective idle poll interval.
    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms.unwrap_or(DEFAULT_IDLE_POLL_MS))
    }

    /// Effective shutdown grace period.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms.unwrap_or(DEFAULT_SHUTDOWN_GRACE_MS))
    }
}

/// Parse a listen address. A bare `:port` binds every interface.
pub fn parse_bind(raw: &str) -> Option<SocketAddr> {
    let raw = raw.trim();
    if let Some(port) = raw.strip_prefix(':') {
        return format!("0.0.0.0:{port}").parse().ok();
    }
    raw.parse().ok()
}

/// JSON schema of the configuration file.
pub fn config_schema() -> schemars::Schema {
    schemars::schema_for!(EtapConfig)
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load an [`EtapConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`EtapConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<EtapConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => EtapConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Parse a TOML string into an [`EtapConfig`].
pub fn parse_toml(content: &str) -> Result<EtapConfig, ConfigError> {
    toml::from_str::<EtapConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides from the process environment.
///
/// Recognised variables:
/// - `ETAP_BIND`
/// - `ETAP_STATE_FILE`
/// - `ETAP_EVENT_SOURCE_URL`
/// - `ETAP_LOG_LEVEL`
/// - `ETAP_LOG_FORMAT`
/// - `ETAP_HTTP_TIMEOUT_SECS`
/// - `ETAP_RETRY_DELAY_MS`
/// - `ETAP_IDLE_POLL_MS`
pub fn apply_env_overrides(config: &mut EtapConfig) -> Result<(), ConfigError> {
    apply_overrides_from(config, |var| std::env::var(var).ok())
}

/// Apply overrides from an arbitrary variable lookup.
pub fn apply_overrides_from<F>(config: &mut EtapConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("ETAP_BIND") {
        config.bind = Some(val);
    }
    if let Some(val) = lookup("ETAP_STATE_FILE") {
        config.state_file = Some(val);
    }
    if let Some(val) = lookup("ETAP_EVENT_SOURCE_URL") {
        config.event_source_url = Some(val);
    }
    if let Some(val) = lookup("ETAP_LOG_LEVEL") {
        config.log_level = Some(val);
    }
    if let Some(val) = lookup("ETAP_LOG_FORMAT") {
        config.log_format = Some(val.parse().map_err(|reason| ConfigError::InvalidEnv {
            var: "ETAP_LOG_FORMAT".into(),
            reason,
        })?);
    }
    if let Some(val) = lookup("ETAP_HTTP_TIMEOUT_SECS") {
        config.http_timeout_secs = Some(parse_number("ETAP_HTTP_TIMEOUT_SECS", &val)?);
    }
    if let Some(val) = lookup("ETAP_RETRY_DELAY_MS") {
        config.retry_delay_ms = Some(parse_number("ETAP_RETRY_DELAY_MS", &val)?);
    }
    if let Some(val) = lookup("ETAP_IDLE_POLL_MS") {
        config.idle_poll_ms = Some(parse_number("ETAP_IDLE_POLL_MS", &val)?);
    }
    Ok(())
}

fn parse_number(var: &str, val: &str) -> Result<u64, ConfigError> {
    val.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::InvalidEnv {
        var: var.into(),
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (unparseable addresses and URLs, out-of-range timeouts) are
/// returned as a [`ConfigError::ValidationError`]; soft issues come back as
/// warnings.
pub fn validate_config(config: &EtapConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if let Some(ref level) = config.log_level
        && !VALID_LOG_LEVELS.contains(&level.as_str())
    {
        errors.push(format!("invalid log_level '{level}'"));
    }

    if let Some(ref bind) = config.bind
        && parse_bind(bind).is_none()
    {
        errors.push(format!("invalid bind address '{bind}'"));
    }

    if let Some(ref file) = config.state_file
        && file.trim().is_empty()
    {
        errors.push("state_file must not be empty".into());
    }

    if let Some(ref raw) = config.event_source_url {
        match url::Url::parse(raw) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            Ok(u) => errors.push(format!(
                "event_source_url '{raw}' has unsupported scheme '{}'",
                u.scheme()
            )),
            Err(e) => errors.push(format!("event_source_url '{raw}' is not a URL: {e}")),
        }
    }

    if let Some(t) = config.http_timeout_secs {
        if t == 0 || t > MAX_HTTP_TIMEOUT_SECS {
            errors.push(format!(
                "http_timeout_secs {t} out of range (1..{MAX_HTTP_TIMEOUT_SECS})"
            ));
        } else if t > LARGE_TIMEOUT_THRESHOLD {
            warnings.push(ConfigWarning::LargeTimeout {
                field: "http_timeout_secs".into(),
                secs: t,
            });
        }
    }

    if config.retry_delay_ms == Some(0) {
        warnings.push(ConfigWarning::TightLoop {
            field: "retry_delay_ms".into(),
        });
    }
    if config.idle_poll_ms == Some(0) {
        warnings.push(ConfigWarning::TightLoop {
            field: "idle_poll_ms".into(),
        });
    }

    if config.script.loop_iteration_limit == Some(0) {
        errors.push("script.loop_iteration_limit must be positive".into());
    }
    if config.script.recursion_limit == Some(0) {
        errors.push("script.recursion_limit must be positive".into());
    }

    // Advisory: missing optional fields.
    if config.state_file.is_none() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "state_file".into(),
            hint: format!("taps will be stored in ./{DEFAULT_STATE_FILE}"),
        });
    }
    if config.event_source_url.is_none() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "event_source_url".into(),
            hint: format!("events will be read from {DEFAULT_EVENT_SOURCE_URL}"),
        });
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge two configurations.  Values in `overlay` take precedence over `base`.
pub fn merge_configs(base: EtapConfig, overlay: EtapConfig) -> EtapConfig {
    EtapConfig {
        bind: overlay.bind.or(base.bind),
        state_file: overlay.state_file.or(base.state_file),
        event_source_url: overlay.event_source_url.or(base.event_source_url),
        log_level: overlay.log_level.or(base.log_level),
        log_format: overlay.log_format.or(base.log_format),
        http_timeout_secs: overlay.http_timeout_secs.or(base.http_timeout_secs),
        retry_delay_ms: overlay.retry_delay_ms.or(base.retry_delay_ms),
        idle_poll_ms: overlay.idle_poll_ms.or(base.idle_poll_ms),
        shutdown_grace_ms: overlay.shutdown_grace_ms.or(base.shutdown_grace_ms),
        script: ScriptConfig {
            loop_iteration_limit: overlay
                .script
                .loop_iteration_limit
                .or(base.script.loop_iteration_limit),
            recursion_limit: overlay
                .script
                .recursion_limit
                .or(base.script.recursion_limit),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn default_config_is_valid_with_advisories() {
        let warnings = validate_config(&EtapConfig::default()).unwrap();
        assert_eq!(warnings.len(), 2, "{warnings:?}");
    }

    #[test]
    fn defaults_resolve_to_the_documented_values() {
        let cfg = EtapConfig::default();
        assert_eq!(cfg.bind_addr().unwrap().port(), 6677);
        assert_eq!(cfg.state_file_or_default(), "state");
        assert_eq!(cfg.event_source_url_or_default(), "http://localhost:5566");
        assert_eq!(cfg.log_level_or_default(), "info");
        assert_eq!(cfg.log_format_or_default(), LogFormat::Text);
        assert_eq!(cfg.http_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.retry_delay(), Duration::from_secs(1));
        assert_eq!(cfg.idle_poll_interval(), Duration::from_millis(200));
        assert_eq!(cfg.shutdown_grace(), Duration::from_secs(1));
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
            bind = "127.0.0.1:7000"
            state_file = "/var/lib/etap/state.db"
            event_source_url = "http://buffer:5566"
            log_level = "debug"
            log_format = "json"
            http_timeout_secs = 10
            retry_delay_ms = 250
            idle_poll_ms = 50

            [script]
            loop_iteration_limit = 1000
            recursion_limit = 64
        "#;
        let cfg = parse_toml(toml).unwrap();
        assert_eq!(cfg.bind_addr().unwrap().to_string(), "127.0.0.1:7000");
        assert_eq!(cfg.log_format, Some(LogFormat::Json));
        assert_eq!(cfg.retry_delay(), Duration::from_millis(250));
        assert_eq!(cfg.script.recursion_limit, Some(64));
        assert!(validate_config(&cfg).unwrap().is_empty());
    }

    #[test]
    fn parse_invalid_toml_gives_parse_error() {
        let err = parse_toml("this is [not valid toml =").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn parse_wrong_types_gives_parse_error() {
        let err = parse_toml("retry_delay_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn unknown_log_format_is_a_parse_error() {
        let err = parse_toml("log_format = \"xml\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn colon_port_binds_every_interface() {
        assert_eq!(
            parse_bind(":6677").unwrap(),
            "0.0.0.0:6677".parse::<SocketAddr>().unwrap()
        );
        assert!(parse_bind("localhost").is_none());
        assert!(parse_bind(":notaport").is_none());
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut cfg = EtapConfig {
            bind: Some("127.0.0.1:1".into()),
            retry_delay_ms: Some(5),
            ..Default::default()
        };
        apply_overrides_from(
            &mut cfg,
            env(&[
                ("ETAP_BIND", ":9000"),
                ("ETAP_RETRY_DELAY_MS", "42"),
                ("ETAP_LOG_FORMAT", "json"),
                ("ETAP_STATE_FILE", "/tmp/s"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.bind.as_deref(), Some(":9000"));
        assert_eq!(cfg.retry_delay_ms, Some(42));
        assert_eq!(cfg.log_format, Some(LogFormat::Json));
        assert_eq!(cfg.state_file.as_deref(), Some("/tmp/s"));
    }

    #[test]
    fn non_numeric_env_override_is_rejected() {
        let mut cfg = EtapConfig::default();
        let err =
            apply_overrides_from(&mut cfg, env(&[("ETAP_IDLE_POLL_MS", "fast")])).unwrap_err();
        match err {
            ConfigError::InvalidEnv { var, .. } => assert_eq!(var, "ETAP_IDLE_POLL_MS"),
            other => panic!("expected InvalidEnv, got {other:?}"),
        }
    }

    #[test]
    fn absent_env_leaves_config_untouched() {
        let mut cfg = EtapConfig {
            log_level: Some("warn".into()),
            ..Default::default()
        };
        apply_overrides_from(&mut cfg, env(&[])).unwrap();
        assert_eq!(cfg.log_level.as_deref(), Some("warn"));
    }

    #[test]
    fn merge_overlay_overrides_base() {
        let base = EtapConfig {
            bind: Some(":1".into()),
            log_level: Some("info".into()),
            script: ScriptConfig {
                loop_iteration_limit: Some(10),
                recursion_limit: Some(10),
            },
            ..Default::default()
        };
        let overlay = EtapConfig {
            bind: Some(":2".into()),
            script: ScriptConfig {
                recursion_limit: Some(20),
                ..Default::default()
            },
            ..Default::default()
        };
        let merged = merge_configs(base, overlay);
        assert_eq!(merged.bind.as_deref(), Some(":2"));
        assert_eq!(merged.log_level.as_deref(), Some("info"));
        assert_eq!(merged.script.loop_iteration_limit, Some(10));
        assert_eq!(merged.script.recursion_limit, Some(20));
    }

    #[test]
    fn toml_roundtrip() {
        let cfg = EtapConfig {
            bind: Some(":6677".into()),
            state_file: Some("state".into()),
            log_format: Some(LogFormat::Json),
            idle_poll_ms: Some(0),
            ..Default::default()
        };
        let serialized = toml::to_string(&cfg).unwrap();
        let deserialized: EtapConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(cfg, deserialized);
    }

    #[test]
    fn load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etap.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "state_file = \"taps.db\"\nlog_level = \"warn\"").unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.state_file.as_deref(), Some("taps.db"));
    }

    #[test]
    fn load_missing_file_gives_file_not_found() {
        let err = load_config(Some(Path::new("/nonexistent/etap.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn schema_names_every_top_level_field() {
        let schema = serde_json::to_value(config_schema()).unwrap();
        let props = schema["properties"].as_object().unwrap();
        for field in ["bind", "state_file", "event_source_url", "retry_delay_ms", "script"] {
            assert!(props.contains_key(field), "missing {field}");
        }
    }

    #[test]
    fn warning_display() {
        let w = ConfigWarning::LargeTimeout {
            field: "http_timeout_secs".into(),
            secs: 900,
        };
        assert!(w.to_string().contains("900"));
        let w = ConfigWarning::TightLoop {
            field: "idle_poll_ms".into(),
        };
        assert!(w.to_string().contains("idle_poll_ms"));
    }
}
