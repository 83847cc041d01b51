use crate::display::{Notifier, Toast};
use crate::BridgeError;
use kodi_notify_config::{AddonInfo, SettingsProvider};
use kodi_notify_icons::IconResolver;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use zbus::zvariant::OwnedValue;

/// Every notification gets the same id; nothing is tracked after display.
pub const NOTIFICATION_ID: u32 = 1;

/// Version of the notification specification reported to callers.
pub const SPEC_VERSION: &str = "1";

/// One `Notify` call.
#[derive(Debug, Default)]
pub struct NotificationRequest {
    pub app_name: String,
    pub replaces_id: u32,
    pub app_icon: String,
    pub summary: String,
    pub body: String,
    pub actions: Vec<String>,
    /// Accepted and ignored.
    pub hints: HashMap<String, OwnedValue>,
    /// Milliseconds. Zero or negative means the configured default.
    pub expire_timeout: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInformation {
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub spec_version: String,
}

/// Turns notification requests into toasts.
///
/// Owns the icon cache; settings are read on every request so changes made
/// in the add-on settings take effect without a restart.
pub struct NotificationHandler {
    settings: Arc<dyn SettingsProvider>,
    addon: Arc<dyn AddonInfo>,
    notifier: Arc<dyn Notifier>,
    icons: IconResolver,
}

impl std::fmt::Debug for NotificationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHandler")
            .field("icons", &self.icons)
            .finish_non_exhaustive()
    }
}

impl NotificationHandler {
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        addon: Arc<dyn AddonInfo>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            settings,
            addon,
            notifier,
            icons: IconResolver::new(),
        }
    }

    fn default_timeout_ms(&self) -> Result<i32, BridgeError> {
        let raw = self.settings.get_setting("timeout")?;
        raw.trim()
            .parse::<i32>()
            .ok()
            .and_then(|secs| secs.checked_mul(1000))
            .ok_or(BridgeError::InvalidSetting {
                key: "timeout".to_string(),
                value: raw,
            })
    }

    /// Build the toast for a request: resolve the icon, fill in the timeout and sound flag.
    ///
    /// Blocks while an icon theme is scanned.
    pub fn prepare(&self, request: &NotificationRequest) -> Result<Toast, BridgeError> {
        let theme = self.settings.get_setting("icon_theme")?;
        let icon = self.icons.resolve(&theme, &request.app_icon)?;

        let timeout_ms = if request.expire_timeout <= 0 {
            self.default_timeout_ms()?
        } else {
            request.expire_timeout
        };

        let sound = self.settings.get_setting("sound")? == "true";

        Ok(Toast {
            title: request.summary.clone(),
            body: request.body.clone(),
            icon,
            timeout_ms,
            sound,
        })
    }

    /// Prepare the toast on the blocking pool, then hand it to the display.
    pub async fn notify(self: Arc<Self>, request: NotificationRequest) -> Result<u32, BridgeError> {
        debug!("New notification:");
        debug!(
            "  app={}, title={}, body={}, icon={}, timeout={}",
            request.app_name, request.summary, request.body, request.app_icon, request.expire_timeout
        );

        let span = tracing::Span::current();
        let handler = self.clone();
        let toast = tokio::task::spawn_blocking(move || {
            let _enter = span.enter();
            handler.prepare(&request)
        })
        .await
        .map_err(|e| BridgeError::Task(e.to_string()))??;

        self.notifier.show_notification(&toast).await?;
        Ok(NOTIFICATION_ID)
    }

    pub fn capabilities(&self) -> Vec<String> {
        vec!["body".to_string()]
    }

    pub fn server_information(&self) -> Result<ServerInformation, BridgeError> {
        Ok(ServerInformation {
            name: self.addon.get_info("name")?,
            vendor: self.addon.get_info("author")?,
            version: self.addon.get_info("version")?,
            spec_version: SPEC_VERSION.to_string(),
        })
    }
}
