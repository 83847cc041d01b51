use crate::handler::{NotificationHandler, NotificationRequest};
use crate::{BridgeError, BUS_NAME, OBJECT_PATH};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};
use zbus::zvariant::OwnedValue;
use zbus::{interface, Connection, SignalContext};

/// The `org.freedesktop.Notifications` object.
#[derive(Debug, Clone)]
pub struct NotificationServer {
    handler: Arc<NotificationHandler>,
}

impl NotificationServer {
    pub fn new(handler: Arc<NotificationHandler>) -> Self {
        Self { handler }
    }
}

#[interface(name = "org.freedesktop.Notifications")]
impl NotificationServer {
    #[allow(clippy::too_many_arguments)]
    async fn notify(
        &self,
        app_name: String,
        replaces_id: u32,
        app_icon: String,
        summary: String,
        body: String,
        actions: Vec<String>,
        hints: HashMap<String, OwnedValue>,
        expire_timeout: i32,
    ) -> zbus::fdo::Result<u32> {
        let request = NotificationRequest {
            app_name,
            replaces_id,
            app_icon,
            summary,
            body,
            actions,
            hints,
            expire_timeout,
        };

        self.handler.clone().notify(request).await.map_err(|e| {
            error!("Notify failed: {}", e);
            e.into()
        })
    }

    fn get_capabilities(&self) -> Vec<String> {
        self.handler.capabilities()
    }

    fn close_notification(&self, id: u32) {
        debug!("CloseNotification({}) ignored", id);
    }

    #[zbus(out_args("name", "vendor", "version", "spec_version"))]
    fn get_server_information(&self) -> zbus::fdo::Result<(String, String, String, String)> {
        let info = self.handler.server_information()?;
        Ok((info.name, info.vendor, info.version, info.spec_version))
    }

    /// Part of the interface for callers that subscribe to it; never emitted.
    #[zbus(signal)]
    async fn notification_closed(ctxt: &SignalContext<'_>, id: u32, reason: u32) -> zbus::Result<()>;
}

/// Connect to the session bus, claim [`BUS_NAME`] and serve the handler at [`OBJECT_PATH`].
///
/// The service stays registered for as long as the returned connection lives.
pub async fn serve(handler: Arc<NotificationHandler>) -> Result<Connection, BridgeError> {
    let connection = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, NotificationServer::new(handler))?
        .build()
        .await?;

    info!("Serving {} at {}", BUS_NAME, OBJECT_PATH);
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::Notifier;
    use crate::testing::{FakeAddon, FakeSettings, RecordingNotifier, RejectingNotifier};
    use tokio::net::UnixStream;
    use zbus::connection::Builder;
    use zbus::zvariant::Value;
    use zbus::Guid;

    /// A client connection talking directly to a server that exports the handler.
    async fn connect(notifier: Arc<dyn Notifier>) -> (Connection, Connection) {
        let settings = FakeSettings::with("/nonexistent", "5", "true");
        let handler = Arc::new(NotificationHandler::new(settings, Arc::new(FakeAddon), notifier));

        let (client, server) = UnixStream::pair().unwrap();
        let guid = Guid::generate();
        tokio::try_join!(
            Builder::unix_stream(client).p2p().build(),
            Builder::unix_stream(server)
                .server(guid)
                .unwrap()
                .p2p()
                .serve_at(OBJECT_PATH, NotificationServer::new(handler))
                .unwrap()
                .build(),
        )
        .unwrap()
    }

    async fn call_notify(client: &Connection, hints: HashMap<&str, Value<'_>>) -> zbus::Result<u32> {
        let reply = client
            .call_method(
                None::<&str>,
                OBJECT_PATH,
                Some(BUS_NAME),
                "Notify",
                &(
                    "thunderbird",
                    0u32,
                    "thunderbird",
                    "New mail",
                    "You have 3 unread messages",
                    Vec::<&str>::new(),
                    hints,
                    4000i32,
                ),
            )
            .await?;
        reply.body().deserialize::<u32>()
    }

    #[tokio::test]
    async fn test_notify_accepts_variant_hints() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (client, _server) = connect(notifier.clone()).await;

        let mut hints = HashMap::new();
        hints.insert("urgency", Value::U8(1));
        hints.insert("desktop-entry", Value::from("thunderbird"));
        hints.insert("transient", Value::Bool(true));

        assert_eq!(call_notify(&client, hints).await.unwrap(), 1);

        let shown = notifier.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].title, "New mail");
        assert_eq!(shown[0].icon, "thunderbird");
        assert_eq!(shown[0].timeout_ms, 4000);
    }

    #[tokio::test]
    async fn test_notify_reports_display_failure() {
        let (client, _server) = connect(Arc::new(RejectingNotifier)).await;

        match call_notify(&client, HashMap::new()).await {
            Err(zbus::Error::MethodError(name, _, _)) => {
                assert_eq!(name.as_str(), "org.freedesktop.DBus.Error.Failed")
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_static_methods() {
        let (client, _server) = connect(Arc::new(RecordingNotifier::default())).await;

        let reply = client
            .call_method(None::<&str>, OBJECT_PATH, Some(BUS_NAME), "GetCapabilities", &())
            .await
            .unwrap();
        assert_eq!(reply.body().deserialize::<Vec<String>>().unwrap(), vec!["body"]);

        client
            .call_method(None::<&str>, OBJECT_PATH, Some(BUS_NAME), "CloseNotification", &(1u32,))
            .await
            .unwrap();

        let reply = client
            .call_method(None::<&str>, OBJECT_PATH, Some(BUS_NAME), "GetServerInformation", &())
            .await
            .unwrap();
        let info: (String, String, String, String) = reply.body().deserialize().unwrap();
        assert_eq!(
            info,
            (
                "Desktop Notifications".to_string(),
                "someone".to_string(),
                "2.0.1".to_string(),
                "1".to_string(),
            )
        );
    }

    #[tokio::test]
    async fn test_introspection_lists_interface() {
        let (client, _server) = connect(Arc::new(RecordingNotifier::default())).await;

        let reply = client
            .call_method(
                None::<&str>,
                OBJECT_PATH,
                Some("org.freedesktop.DBus.Introspectable"),
                "Introspect",
                &(),
            )
            .await
            .unwrap();
        let xml: String = reply.body().deserialize().unwrap();

        assert!(xml.contains(r#"<interface name="org.freedesktop.Notifications">"#));
        assert!(xml.contains(r#"<method name="Notify">"#));
        assert!(xml.contains(r#"type="a{sv}""#));
        assert!(xml.contains(r#"name="spec_version""#));
        assert!(xml.contains(r#"<signal name="NotificationClosed">"#));
    }
}
