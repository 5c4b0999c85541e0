//! Tool configuration file and application descriptor loading.
//!
//! The tool config lives at `$XDG_CONFIG_HOME/aeremote/config.toml` (or
//! `$HOME/.config/aeremote/config.toml`) and is a flat list of
//! `key = value` lines. It is optional; every key has a built-in default.

mod descriptor;

use std::env;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use url::Url;

pub use descriptor::{AppDescriptor, UrlHandler};

/// Errors while loading configuration or the application descriptor.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A file could not be read.
    #[error("failed to read '{path}': {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A config line could not be parsed.
    #[error("invalid config on line {line}: {reason}")]
    Syntax {
        /// 1-based line number.
        line: usize,
        /// What was wrong.
        reason: String,
    },
    /// A config key is not recognized.
    #[error("unknown configuration key '{key}' on line {line}")]
    UnknownKey {
        /// The key as written.
        key: String,
        /// 1-based line number.
        line: usize,
    },
    /// A value is syntactically fine but out of range.
    #[error("invalid config value for `{key}`: {reason}")]
    InvalidValue {
        /// The offending key.
        key: &'static str,
        /// What was wrong.
        reason: String,
    },
    /// The application descriptor is not valid YAML for the expected shape.
    #[error("failed to parse application descriptor '{path}': {source}")]
    Descriptor {
        /// Descriptor file.
        path: PathBuf,
        /// YAML error.
        #[source]
        source: serde_yaml::Error,
    },
}

/// Values read from the tool config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolConfig {
    /// Cookie file location (default `~/.cookies`).
    pub cookie_file: Option<PathBuf>,
    /// Seal the cookie file with a key held in the system keychain.
    pub encrypt_cookies: Option<bool>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Total HTTP request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Identity provider login URL.
    pub identity_provider_url: Option<Url>,
    /// Service endpoint, overriding the mode default.
    pub service_endpoint: Option<Url>,
    /// Application endpoint, overriding the mode default.
    pub application_endpoint: Option<Url>,
}

impl ToolConfig {
    /// Parses config file contents.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on syntax errors, unknown keys, and out-of-range values.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        for (line_index, raw_line) in raw.lines().enumerate() {
            let line_number = line_index + 1;
            let line = strip_inline_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }

            let Some((raw_key, raw_value)) = line.split_once('=') else {
                return Err(syntax(line_number, "expected key = value"));
            };
            let key = raw_key.trim();
            let value = raw_value.trim();

            match key {
                "cookie_file" => {
                    let parsed = parse_string_literal(value, line_number)?;
                    cfg.cookie_file = Some(PathBuf::from(parsed));
                }
                "encrypt_cookies" => {
                    cfg.encrypt_cookies = Some(parse_boolean(value, line_number)?);
                }
                "connect_timeout_secs" => {
                    cfg.connect_timeout_secs = Some(parse_integer_u64(value, line_number)?);
                }
                "request_timeout_secs" => {
                    cfg.request_timeout_secs = Some(parse_integer_u64(value, line_number)?);
                }
                "identity_provider_url" => {
                    cfg.identity_provider_url = Some(parse_url(value, line_number)?);
                }
                "service_endpoint" => {
                    cfg.service_endpoint = Some(parse_url(value, line_number)?);
                }
                "application_endpoint" => {
                    cfg.application_endpoint = Some(parse_url(value, line_number)?);
                }
                unknown => {
                    return Err(ConfigError::UnknownKey {
                        key: unknown.to_string(),
                        line: line_number,
                    });
                }
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for out-of-range timeouts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("request_timeout_secs", self.request_timeout_secs)?;
        Ok(())
    }
}

fn validate_timeout_secs(key: &'static str, value: Option<u64>) -> Result<(), ConfigError> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        return Err(ConfigError::InvalidValue {
            key,
            reason: format!("{value}. Expected range: 1..=3600"),
        });
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed config; defaults when no file exists.
    pub config: ToolConfig,
    /// Indicates whether configuration was loaded from disk.
    pub loaded_from_file: bool,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/aeremote/config.toml`
/// 2. `$HOME/.config/aeremote/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    resolve_config_path(
        env_var_non_empty_os("XDG_CONFIG_HOME"),
        env_var_non_empty_os("HOME"),
    )
}

fn resolve_config_path(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    if let Some(xdg_config_home) = xdg_config_home {
        return Some(PathBuf::from(xdg_config_home).join("aeremote").join("config.toml"));
    }

    let home = home?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("aeremote")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if present.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file exists but cannot be read or parsed.
pub fn load_default_tool_config() -> Result<LoadedConfig, ConfigError> {
    let path = resolve_default_config_path();
    match path.as_deref() {
        Some(path_ref) if path_ref.exists() => {
            let config = load_tool_config(path_ref)?;
            Ok(LoadedConfig {
                path,
                config,
                loaded_from_file: true,
            })
        }
        _ => Ok(LoadedConfig {
            path,
            config: ToolConfig::default(),
            loaded_from_file: false,
        }),
    }
}

/// Loads and parses the config file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file cannot be read or parsed.
pub fn load_tool_config(path: &Path) -> Result<ToolConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ToolConfig::parse(&raw)
}

fn syntax(line: usize, reason: impl Into<String>) -> ConfigError {
    ConfigError::Syntax {
        line,
        reason: reason.into(),
    }
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str, line: usize) -> Result<String, ConfigError> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        return Err(syntax(line, "expected double-quoted string"));
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str, line: usize) -> Result<u64, ConfigError> {
    let token = raw_value.trim();
    if token.is_empty() {
        return Err(syntax(line, "expected integer value"));
    }
    token
        .parse::<u64>()
        .map_err(|_| syntax(line, format!("expected non-negative integer, got '{token}'")))
}

fn parse_boolean(raw_value: &str, line: usize) -> Result<bool, ConfigError> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(syntax(line, format!("expected true or false, got '{other}'"))),
    }
}

fn parse_url(raw_value: &str, line: usize) -> Result<Url, ConfigError> {
    let literal = parse_string_literal(raw_value, line)?;
    let url = Url::parse(&literal)
        .map_err(|error| syntax(line, format!("invalid URL '{literal}': {error}")))?;
    if !url.has_host() {
        return Err(syntax(line, format!("URL '{literal}' has no host")));
    }
    Ok(url)
}
