use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, warn};

pub const ADDON_CHANNEL: &str = "addon";
pub const SETTINGS_CHANNEL: &str = "settings";
pub const KODI_CHANNEL: &str = "kodi";

pub const DEFAULT_ADDON_ID: &str = "service.notifications.bridge";

/// Error types for configuration operations
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Configuration property not found: {channel}.{property}")]
    PropertyNotFound { channel: String, property: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration value types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ConfigValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

/// Values are handed out as strings, the same shape the host uses for add-on settings.
impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Boolean(b) => write!(f, "{}", b),
            ConfigValue::Integer(i) => write!(f, "{}", i),
            ConfigValue::Float(x) => write!(f, "{}", x),
            ConfigValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

/// Configuration channel containing properties
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigChannel {
    #[serde(flatten)]
    pub properties: HashMap<String, ConfigValue>,
}

impl ConfigChannel {
    pub fn get(&self, property: &str) -> Option<&ConfigValue> {
        self.properties.get(property)
    }
}

/// Read access to the user-editable add-on settings (`icon_theme`, `timeout`, `sound`).
pub trait SettingsProvider: Send + Sync {
    fn get_setting(&self, key: &str) -> Result<String, ConfigError>;
}

/// Read access to the add-on metadata (`id`, `name`, `author`, `version`, `profile`).
pub trait AddonInfo: Send + Sync {
    fn get_info(&self, key: &str) -> Result<String, ConfigError>;
}

fn default_value(channel: &str, property: &str) -> Option<ConfigValue> {
    let value = match (channel, property) {
        (ADDON_CHANNEL, "id") => DEFAULT_ADDON_ID.into(),
        (ADDON_CHANNEL, "name") => "Desktop Notifications".into(),
        (ADDON_CHANNEL, "author") => "kodi-notifications".into(),
        (ADDON_CHANNEL, "version") => env!("CARGO_PKG_VERSION").into(),
        (SETTINGS_CHANNEL, "icon_theme") => "/usr/share/icons/hicolor".into(),
        (SETTINGS_CHANNEL, "timeout") => ConfigValue::Integer(5),
        (SETTINGS_CHANNEL, "sound") => ConfigValue::Boolean(true),
        (KODI_CHANNEL, "home") => "~/.kodi".into(),
        (KODI_CHANNEL, "host") => "127.0.0.1".into(),
        (KODI_CHANNEL, "port") => ConfigValue::Integer(9090),
        _ => return None,
    };
    Some(value)
}

#[derive(Debug, Default)]
struct LoadedConfig {
    channels: HashMap<String, ConfigChannel>,
    modified: Option<SystemTime>,
}

/// File-backed add-on configuration.
///
/// The file is re-read whenever its modification time changes, so settings
/// edited while the daemon runs apply to the next request.
pub struct AddonConfig {
    config_path: PathBuf,
    state: RwLock<LoadedConfig>,
}

impl fmt::Debug for AddonConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddonConfig")
            .field("config_path", &self.config_path)
            .field("state", &"RwLock<LoadedConfig>")
            .finish()
    }
}

impl AddonConfig {
    pub fn new(config_path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let config_path = config_path.into();
        let loaded = Self::load_from_file(&config_path)?;

        Ok(Self {
            config_path,
            state: RwLock::new(loaded),
        })
    }

    /// `$XDG_CONFIG_HOME/kodi-notifications/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kodi-notifications")
            .join("config.toml")
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    fn load_from_file(path: &Path) -> Result<LoadedConfig, ConfigError> {
        if !path.exists() {
            debug!("No configuration file at {}, using defaults", path.display());
            return Ok(LoadedConfig::default());
        }

        let modified = std::fs::metadata(path)?.modified().ok();
        let content = std::fs::read_to_string(path)?;
        let channels: HashMap<String, ConfigChannel> = toml::from_str(&content)?;
        Ok(LoadedConfig { channels, modified })
    }

    /// Reload the file if it changed on disk since the last load.
    pub fn refresh(&self) -> Result<(), ConfigError> {
        let on_disk = std::fs::metadata(&self.config_path)
            .ok()
            .and_then(|meta| meta.modified().ok());

        let current = self.state.read().unwrap_or_else(PoisonError::into_inner).modified;
        if on_disk == current {
            return Ok(());
        }

        debug!("Reloading configuration from {}", self.config_path.display());
        let loaded = Self::load_from_file(&self.config_path)?;
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = loaded;
        Ok(())
    }

    /// Get a configuration property, falling back to the built-in default.
    pub fn get_property(&self, channel: &str, property: &str) -> Result<ConfigValue, ConfigError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);

        state
            .channels
            .get(channel)
            .and_then(|c| c.get(property))
            .cloned()
            .or_else(|| default_value(channel, property))
            .ok_or_else(|| ConfigError::PropertyNotFound {
                channel: channel.to_string(),
                property: property.to_string(),
            })
    }

    /// Kodi's home directory, the root of `special://` paths.
    pub fn kodi_home(&self) -> Result<PathBuf, ConfigError> {
        let home = self.get_property(KODI_CHANNEL, "home")?.to_string();
        Ok(expand_home(&home))
    }

    /// Host and port of Kodi's raw TCP JSON-RPC listener.
    pub fn jsonrpc_endpoint(&self) -> Result<(String, u16), ConfigError> {
        let host = self.get_property(KODI_CHANNEL, "host")?.to_string();
        let port = match self.get_property(KODI_CHANNEL, "port")? {
            ConfigValue::Integer(port) => u16::try_from(port).ok(),
            other => other.to_string().parse().ok(),
        }
        .ok_or_else(|| ConfigError::InvalidValue {
            key: "kodi.port".to_string(),
            reason: "expected a TCP port number".to_string(),
        })?;

        Ok((host, port))
    }

    /// Translate a logical path against the configured Kodi home.
    pub fn translate_path(&self, path: &str) -> Result<PathBuf, ConfigError> {
        Ok(translate_path(path, &self.kodi_home()?))
    }

    /// Absolute path of the add-on's profile directory.
    pub fn profile_dir(&self) -> Result<PathBuf, ConfigError> {
        let profile = self.get_info("profile")?;
        self.translate_path(&profile)
    }
}

impl SettingsProvider for AddonConfig {
    fn get_setting(&self, key: &str) -> Result<String, ConfigError> {
        if let Err(e) = self.refresh() {
            warn!("Failed to reload {}: {}", self.config_path.display(), e);
        }
        self.get_property(SETTINGS_CHANNEL, key).map(|v| v.to_string())
    }
}

impl AddonInfo for AddonConfig {
    fn get_info(&self, key: &str) -> Result<String, ConfigError> {
        if key == "profile" {
            if let Ok(profile) = self.get_property(ADDON_CHANNEL, "profile") {
                return Ok(profile.to_string());
            }
            let id = self.get_info("id")?;
            return Ok(format!("special://profile/addon_data/{}/", id));
        }
        self.get_property(ADDON_CHANNEL, key).map(|v| v.to_string())
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/"))
            .join(rest),
        None if path == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from("/")),
        None => PathBuf::from(path),
    }
}

/// Resolve a `special://` path onto the filesystem below `kodi_home`.
///
/// Plain paths are returned as-is, with a leading `~` expanded.
pub fn translate_path(path: &str, kodi_home: &Path) -> PathBuf {
    let Some(rest) = path.strip_prefix("special://") else {
        return expand_home(path);
    };

    let (root, tail) = rest.split_once('/').unwrap_or((rest, ""));
    let base = match root {
        "home" => kodi_home.to_path_buf(),
        "profile" | "masterprofile" | "userdata" => kodi_home.join("userdata"),
        "temp" => kodi_home.join("temp"),
        "logpath" => kodi_home.join("temp"),
        other => {
            warn!("Unknown special path root '{}', leaving {} untranslated", other, path);
            return PathBuf::from(path);
        }
    };

    let tail = tail.trim_end_matches('/');
    if tail.is_empty() {
        base
    } else {
        base.join(tail)
    }
}
