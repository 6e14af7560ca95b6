//! Connection settings.
//!
//! Settings come from code, from a TOML file (by default
//! `<config dir>/gremlin-mapper/gremlin.toml`) and from `GREMLIN_*`
//! environment variables, in increasing order of precedence.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MapperError, Result};

/// Default Gremlin Server port.
pub const DEFAULT_PORT: u16 = 8182;
/// Default response size limit in bytes.
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 65_536;
/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Wire serializer negotiated with the server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Serializer {
    /// Untyped GraphSON 1.0.
    GraphsonV1,
    /// Typed GraphSON 2.0.
    GraphsonV2,
    /// Typed GraphSON 3.0.
    #[default]
    GraphsonV3,
    /// GraphBinary 1.0.
    GraphbinaryV1,
}

impl Serializer {
    /// Canonical configuration name.
    pub fn name(self) -> &'static str {
        match self {
            Serializer::GraphsonV1 => "graphson-v1",
            Serializer::GraphsonV2 => "graphson-v2",
            Serializer::GraphsonV3 => "graphson-v3",
            Serializer::GraphbinaryV1 => "graphbinary-v1",
        }
    }

    /// Media type requested from the server.
    pub fn mime_type(self) -> &'static str {
        match self {
            Serializer::GraphsonV1 => "application/vnd.gremlin-v1.0+json",
            Serializer::GraphsonV2 => "application/vnd.gremlin-v2.0+json",
            Serializer::GraphsonV3 => "application/vnd.gremlin-v3.0+json",
            Serializer::GraphbinaryV1 => "application/vnd.graphbinary-v1.0",
        }
    }
}

impl fmt::Display for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Serializer {
    type Err = MapperError;

    /// Accepts `graphson-v3`, `GRAPHSON_V3`, `graphsonv3` and friends.
    fn from_str(value: &str) -> Result<Self> {
        let normalized: String = value
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "graphson" | "graphsonv1" => Ok(Serializer::GraphsonV1),
            "graphsonv2" => Ok(Serializer::GraphsonV2),
            "graphsonv3" => Ok(Serializer::GraphsonV3),
            "graphbinary" | "graphbinaryv1" => Ok(Serializer::GraphbinaryV1),
            _ => Err(MapperError::ConfigurationError(format!(
                "unknown serializer '{value}'"
            ))),
        }
    }
}

/// Validated connection settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GremlinConfig {
    /// Host name of the Gremlin server.
    pub endpoint: String,
    /// TCP port.
    pub port: u16,
    /// Optional basic-auth user.
    pub username: Option<String>,
    /// Optional basic-auth password.
    pub password: Option<String>,
    /// Use TLS.
    pub ssl_enabled: bool,
    /// Wire serializer.
    pub serializer: Serializer,
    /// Largest accepted response body in bytes.
    pub max_content_length: usize,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GremlinConfig {
    fn default() -> Self {
        Self {
            endpoint: "localhost".to_owned(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            ssl_enabled: false,
            serializer: Serializer::default(),
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl GremlinConfig {
    /// Plain-text local server on the default port.
    pub fn local() -> Self {
        Self::default()
    }

    /// Default settings against `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Loads `explicit`, or the default file when present, then applies the
    /// environment overrides.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self> {
        let path = explicit.or_else(default_config_path);
        let mut config = match path.as_deref() {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            MapperError::ConfigurationError(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parses TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(contents)
            .map_err(|err| MapperError::ConfigurationError(format!("invalid TOML: {err}")))?;
        Self::from_raw(raw)
    }

    /// Writes the settings as TOML.
    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                MapperError::ConfigurationError(format!(
                    "failed to create {}: {err}",
                    parent.display()
                ))
            })?;
        }
        let serialized = toml::to_string_pretty(&RawConfig::from(self))
            .map_err(|err| MapperError::ConfigurationError(err.to_string()))?;
        fs::write(path, serialized).map_err(|err| {
            MapperError::ConfigurationError(format!("failed to write {}: {err}", path.display()))
        })
    }

    /// Applies `GREMLIN_ENDPOINT`, `GREMLIN_PORT`, `GREMLIN_USERNAME`,
    /// `GREMLIN_PASSWORD` and `GREMLIN_SERIALIZER` as returned by `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup("GREMLIN_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(port) = lookup("GREMLIN_PORT") {
            let parsed = port.trim().parse::<i64>().map_err(|_| {
                MapperError::ConfigurationError(format!("GREMLIN_PORT '{port}' is not a number"))
            })?;
            self.port = checked_port(parsed)?;
        }
        if let Some(username) = lookup("GREMLIN_USERNAME") {
            self.username = Some(username);
        }
        if let Some(password) = lookup("GREMLIN_PASSWORD") {
            self.password = Some(password);
        }
        if let Some(serializer) = lookup("GREMLIN_SERIALIZER") {
            self.serializer = serializer.parse()?;
        }
        Ok(())
    }

    /// Rejects settings no client can be built from.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(MapperError::ConfigurationError(
                "endpoint must not be empty".into(),
            ));
        }
        if self.port == 0 {
            return Err(MapperError::ConfigurationError(
                "port must be between 1 and 65535".into(),
            ));
        }
        Ok(())
    }

    /// `http(s)://endpoint:port/gremlin`.
    pub fn url(&self) -> String {
        let scheme = if self.ssl_enabled { "https" } else { "http" };
        format!("{scheme}://{}:{}/gremlin", self.endpoint, self.port)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            endpoint: raw.endpoint.unwrap_or(defaults.endpoint),
            port: match raw.port {
                Some(port) => checked_port(port)?,
                None => defaults.port,
            },
            username: raw.username,
            password: raw.password,
            ssl_enabled: raw.ssl_enabled.unwrap_or(defaults.ssl_enabled),
            serializer: match raw.serializer.as_deref() {
                Some(name) => name.parse()?,
                None => defaults.serializer,
            },
            max_content_length: match raw.max_content_length {
                Some(length) if length > 0 => usize::try_from(length).unwrap_or(usize::MAX),
                _ => defaults.max_content_length,
            },
            timeout_secs: raw.timeout_secs.unwrap_or(defaults.timeout_secs),
        };
        config.validate()?;
        Ok(config)
    }
}

fn checked_port(port: i64) -> Result<u16> {
    u16::try_from(port)
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| {
            MapperError::ConfigurationError(format!("port {port} is outside 1..=65535"))
        })
}

/// Default location of the settings file.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("gremlin-mapper").join("gremlin.toml"))
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawConfig {
    endpoint: Option<String>,
    port: Option<i64>,
    username: Option<String>,
    password: Option<String>,
    ssl_enabled: Option<bool>,
    serializer: Option<String>,
    max_content_length: Option<i64>,
    timeout_secs: Option<u64>,
}

impl From<&GremlinConfig> for RawConfig {
    fn from(config: &GremlinConfig) -> Self {
        Self {
            endpoint: Some(config.endpoint.clone()),
            port: Some(i64::from(config.port)),
            username: config.username.clone(),
            password: config.password.clone(),
            ssl_enabled: Some(config.ssl_enabled),
            serializer: Some(config.serializer.name().to_owned()),
            max_content_length: i64::try_from(config.max_content_length).ok(),
            timeout_secs: Some(config.timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_target_local_server() {
        let config = GremlinConfig::local();
        assert_eq!(config.url(), "http://localhost:8182/gremlin");
        assert_eq!(config.serializer, Serializer::GraphsonV3);
        assert_eq!(config.max_content_length, DEFAULT_MAX_CONTENT_LENGTH);
    }

    #[test]
    fn toml_values_are_validated() {
        let config = GremlinConfig::from_toml_str(
            r#"
            endpoint = "janus.internal"
            port = 443
            ssl_enabled = true
            serializer = "GRAPHSON_V2"
            max_content_length = 0
            "#,
        )
        .expect("parse");
        assert_eq!(config.url(), "https://janus.internal:443/gremlin");
        assert_eq!(config.serializer, Serializer::GraphsonV2);
        assert_eq!(config.max_content_length, DEFAULT_MAX_CONTENT_LENGTH);

        for bad in ["port = 70000", "port = 0", "serializer = \"gryo\"", "endpoint = \"\""] {
            let err = GremlinConfig::from_toml_str(bad).unwrap_err();
            assert_eq!(err.code(), "ConfigurationError", "{bad}");
        }
    }

    #[test]
    fn overrides_take_precedence() {
        let env: HashMap<&str, &str> = [
            ("GREMLIN_ENDPOINT", "graph.example"),
            ("GREMLIN_PORT", "9000"),
            ("GREMLIN_USERNAME", "reader"),
        ]
        .into_iter()
        .collect();
        let mut config = GremlinConfig::local();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .expect("overrides");
        assert_eq!(config.endpoint, "graph.example");
        assert_eq!(config.port, 9000);
        assert_eq!(config.username.as_deref(), Some("reader"));

        let mut config = GremlinConfig::local();
        let err = config
            .apply_overrides(|key| (key == "GREMLIN_PORT").then(|| "-1".to_owned()))
            .unwrap_err();
        assert_eq!(err.code(), "ConfigurationError");
    }

    #[test]
    fn persisted_settings_load_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("gremlin.toml");
        let mut config = GremlinConfig::new("db.local");
        config.password = Some("s3cret".into());
        config.serializer = Serializer::GraphsonV1;
        config.persist(&path).expect("persist");
        assert_eq!(GremlinConfig::from_file(&path).expect("load"), config);
    }
}
