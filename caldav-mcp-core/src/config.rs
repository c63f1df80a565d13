//! Layered configuration: defaults < JSON file < environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, File, FileFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{CalDavError, CalDavResult};
use crate::time::DEFAULT_TIMEZONE;

pub const DEFAULT_CONFIG_PATH: &str = "config/settings.json";

/// Environment variable → configuration key.
const ENV_KEYS: &[(&str, &str)] = &[
    ("CALDAV_SERVER_URL", "server_url"),
    ("CALDAV_USERNAME", "username"),
    ("CALDAV_PASSWORD", "password"),
    ("CALDAV_USE_SSL", "use_ssl"),
    ("CALDAV_CALENDAR", "calendar"),
    ("LOG_LEVEL", "log_level"),
    ("TIMEZONE", "timezone"),
];

/// Typed snapshot of the resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub server_url: String,
    pub username: String,
    pub password: String,
    pub use_ssl: bool,
    pub log_level: String,
    pub timezone: String,
    /// Calendar collection to use, by display name or href. `None` picks the first.
    pub calendar: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            server_url: "http://localhost:5232".to_string(),
            username: "user".to_string(),
            password: String::new(),
            use_ssl: true,
            log_level: "INFO".to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            calendar: None,
        }
    }
}

/// Flat key-value configuration store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    path: PathBuf,
    values: Map<String, Value>,
}

impl ConfigResolver {
    /// Load from `path` and the process environment.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::load_with_env(path, &env)
    }

    /// Load from `path` and an explicit environment map.
    ///
    /// An unreadable or malformed file is logged and skipped.
    pub fn load_with_env(path: impl Into<PathBuf>, env: &HashMap<String, String>) -> Self {
        let path = path.into();

        let config = match build(Some(&path), env) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring configuration file {}: {}", path.display(), e);
                match build(None, env) {
                    Ok(config) => config,
                    Err(e) => {
                        warn!("Failed to apply configuration overrides: {}", e);
                        return ConfigResolver {
                            path,
                            values: defaults(),
                        };
                    }
                }
            }
        };

        let values = config
            .try_deserialize::<Map<String, Value>>()
            .unwrap_or_else(|e| {
                warn!("Failed to read resolved configuration: {}", e);
                defaults()
            });

        ConfigResolver { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str, default: Value) -> Value {
        self.values.get(key).cloned().unwrap_or(default)
    }

    /// String form of a scalar value.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Write the merged state back to the file. Failures are logged, never fatal.
    pub fn persist(&self) {
        if let Err(e) = self.try_persist() {
            warn!("Failed to save configuration to {}: {}", self.path.display(), e);
        }
    }

    pub fn try_persist(&self) -> CalDavResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.values)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn settings(&self) -> Settings {
        let defaults = Settings::default();
        let string = |key: &str, fallback: String| self.get_string(key).unwrap_or(fallback);

        Settings {
            server_url: string("server_url", defaults.server_url),
            username: string("username", defaults.username),
            password: string("password", defaults.password),
            use_ssl: match self.values.get("use_ssl") {
                Some(Value::Bool(b)) => *b,
                Some(Value::String(s)) => parse_bool(s),
                _ => defaults.use_ssl,
            },
            log_level: string("log_level", defaults.log_level),
            timezone: string("timezone", defaults.timezone),
            calendar: self.get_string("calendar").filter(|s| !s.trim().is_empty()),
        }
    }
}

impl Settings {
    /// Configured timezone, parsed.
    pub fn tz(&self) -> CalDavResult<chrono_tz::Tz> {
        crate::time::parse_timezone(&self.timezone)
    }
}

/// `"true"` in any case is true, anything else false.
fn parse_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn build(path: Option<&Path>, env: &HashMap<String, String>) -> Result<Config, ConfigError> {
    let defaults = Settings::default();
    let mut builder = Config::builder()
        .set_default("server_url", defaults.server_url)?
        .set_default("username", defaults.username)?
        .set_default("password", defaults.password)?
        .set_default("use_ssl", defaults.use_ssl)?
        .set_default("log_level", defaults.log_level)?
        .set_default("timezone", defaults.timezone)?;

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).format(FileFormat::Json).required(false));
    }

    for (var, key) in ENV_KEYS {
        let Some(value) = env.get(*var) else {
            continue;
        };
        builder = if *key == "use_ssl" {
            builder.set_override(*key, parse_bool(value))?
        } else {
            builder.set_override(*key, value.as_str())?
        };
    }

    builder.build()
}

fn defaults() -> Map<String, Value> {
    match serde_json::to_value(Settings::default()) {
        Ok(Value::Object(mut map)) => {
            map.remove("calendar");
            map
        }
        _ => Map::new(),
    }
}

impl From<ConfigError> for CalDavError {
    fn from(e: ConfigError) -> Self {
        CalDavError::Config(e.to_string())
    }
}
