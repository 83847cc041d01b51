use kodi_notify_config::ConfigError;
use kodi_notify_icons::IconError;
use thiserror::Error;

pub mod display;
pub mod handler;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

pub use display::{KodiNotifier, LogNotifier, Notifier, Toast};
pub use handler::{NotificationHandler, NotificationRequest, ServerInformation};
pub use server::{serve, NotificationServer};

/// Well-known name claimed on the session bus.
pub const BUS_NAME: &str = "org.freedesktop.Notifications";
/// Object path the notification service is served at.
pub const OBJECT_PATH: &str = "/org/freedesktop/Notifications";

/// Error types for the notification bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Icon lookup failed: {0}")]
    Icon(#[from] IconError),

    #[error("D-Bus error: {0}")]
    DBus(#[from] zbus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid setting {key}: {value:?}")]
    InvalidSetting { key: String, value: String },

    #[error("Kodi rejected the notification: {0}")]
    Rejected(String),

    #[error("Timed out {0}")]
    Timeout(&'static str),

    #[error("Notification task failed: {0}")]
    Task(String),
}

impl From<BridgeError> for zbus::fdo::Error {
    fn from(err: BridgeError) -> Self {
        zbus::fdo::Error::Failed(err.to_string())
    }
}
