//! Stand-ins for the handler's collaborators.

use crate::display::{Notifier, Toast};
use crate::BridgeError;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use kodi_notify_config::{AddonInfo, ConfigError, SettingsProvider};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub(crate) struct FakeSettings {
    values: Mutex<HashMap<String, String>>,
}

impl FakeSettings {
    pub(crate) fn with(theme: &str, timeout: &str, sound: &str) -> Arc<Self> {
        let settings = Self::default();
        settings.set("icon_theme", theme);
        settings.set("timeout", timeout);
        settings.set("sound", sound);
        Arc::new(settings)
    }

    pub(crate) fn set(&self, key: &str, value: &str) {
        self.values.lock().unwrap().insert(key.to_string(), value.to_string());
    }
}

impl SettingsProvider for FakeSettings {
    fn get_setting(&self, key: &str) -> Result<String, ConfigError> {
        self.values.lock().unwrap().get(key).cloned().ok_or_else(|| {
            ConfigError::PropertyNotFound {
                channel: "settings".to_string(),
                property: key.to_string(),
            }
        })
    }
}

pub(crate) struct FakeAddon;

impl AddonInfo for FakeAddon {
    fn get_info(&self, key: &str) -> Result<String, ConfigError> {
        Ok(match key {
            "name" => "Desktop Notifications",
            "author" => "someone",
            "version" => "2.0.1",
            other => other,
        }
        .to_string())
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub(crate) shown: Mutex<Vec<Toast>>,
}

impl Notifier for RecordingNotifier {
    fn show_notification<'a>(&'a self, toast: &'a Toast) -> BoxFuture<'a, Result<(), BridgeError>> {
        self.shown.lock().unwrap().push(toast.clone());
        futures_util::future::ready(Ok(())).boxed()
    }
}

/// Behaves like a Kodi instance that refuses every notification.
pub(crate) struct RejectingNotifier;

impl Notifier for RejectingNotifier {
    fn show_notification<'a>(&'a self, _toast: &'a Toast) -> BoxFuture<'a, Result<(), BridgeError>> {
        futures_util::future::ready(Err(BridgeError::Rejected("Invalid params.".to_string()))).boxed()
    }
}

pub(crate) fn touch(root: &Path, rel: &str) -> String {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"png").unwrap();
    path.to_string_lossy().into_owned()
}
