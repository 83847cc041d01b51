//! Presenting notifications on Kodi's screen.

use crate::BridgeError;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Shortest `displaytime` Kodi's `GUI.ShowNotification` accepts.
pub const MIN_DISPLAY_TIME_MS: i32 = 1500;

/// A notification as handed to the display.
#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub title: String,
    pub body: String,
    /// Resolved file path, or the name the caller sent if it did not resolve.
    pub icon: String,
    pub timeout_ms: i32,
    pub sound: bool,
}

/// Something that can put a toast on screen.
///
/// An error fails the `Notify` call that produced the toast.
pub trait Notifier: Send + Sync {
    fn show_notification<'a>(&'a self, toast: &'a Toast) -> BoxFuture<'a, Result<(), BridgeError>>;
}

/// Writes toasts to the log instead of showing them.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show_notification<'a>(&'a self, toast: &'a Toast) -> BoxFuture<'a, Result<(), BridgeError>> {
        info!(
            "Notification: title={:?}, body={:?}, icon={:?}, timeout={}ms, sound={}",
            toast.title, toast.body, toast.icon, toast.timeout_ms, toast.sound
        );
        futures_util::future::ready(Ok(())).boxed()
    }
}

#[derive(Debug, Serialize)]
struct ShowNotificationParams<'a> {
    title: &'a str,
    message: &'a str,
    image: &'a str,
    displaytime: i32,
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: P,
}

/// Shows toasts through `GUI.ShowNotification` on Kodi's TCP JSON-RPC port.
#[derive(Debug)]
pub struct KodiNotifier {
    host: String,
    port: u16,
    next_id: AtomicU64,
}

impl KodiNotifier {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            next_id: AtomicU64::new(1),
        }
    }

    fn request_body(&self, id: u64, toast: &Toast) -> Result<Vec<u8>, BridgeError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method: "GUI.ShowNotification",
            params: ShowNotificationParams {
                title: &toast.title,
                message: &toast.body,
                image: &toast.icon,
                displaytime: toast.timeout_ms.max(MIN_DISPLAY_TIME_MS),
            },
        };
        Ok(serde_json::to_vec(&request)?)
    }

    async fn connect(&self) -> Result<TcpStream, BridgeError> {
        match timeout(CONNECT_TIMEOUT, TcpStream::connect((self.host.as_str(), self.port))).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(BridgeError::Timeout("connecting to Kodi")),
        }
    }

    async fn send(&self, toast: &Toast) -> Result<(), BridgeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = self.request_body(id, toast)?;

        let mut stream = self.connect().await?;
        match timeout(IO_TIMEOUT, stream.write_all(&body)).await {
            Ok(result) => result?,
            Err(_) => return Err(BridgeError::Timeout("sending to Kodi")),
        }

        // JSON-RPC has no sound parameter; Kodi plays its own notification sound.
        debug!("Sent GUI.ShowNotification to {}:{} (sound={})", self.host, self.port, toast.sound);

        // Only an explicit error reply fails the call.
        let reply = match timeout(IO_TIMEOUT, read_reply(&mut stream, id)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                debug!("No usable reply from Kodi: {}", e);
                return Ok(());
            }
            Err(_) => {
                debug!("Kodi did not reply in time");
                return Ok(());
            }
        };

        match reply {
            Some(value) if value.get("error").is_some() => {
                warn!("Kodi rejected notification: {}", value["error"]);
                Err(BridgeError::Rejected(value["error"].to_string()))
            }
            Some(value) => {
                debug!("Kodi replied: {}", value);
                Ok(())
            }
            None => {
                debug!("Kodi closed the connection without replying");
                Ok(())
            }
        }
    }
}

/// Read JSON values until the reply to request `id` arrives.
///
/// Kodi pushes its own notifications (no `id`) down the same socket; those are skipped.
async fn read_reply(stream: &mut TcpStream, id: u64) -> Result<Option<serde_json::Value>, BridgeError> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let consumed = {
            let mut values = serde_json::Deserializer::from_slice(&buf).into_iter::<serde_json::Value>();
            let mut consumed = 0;
            loop {
                match values.next() {
                    Some(Ok(value)) => {
                        consumed = values.byte_offset();
                        if value.get("id").and_then(|v| v.as_u64()) == Some(id) {
                            return Ok(Some(value));
                        }
                        debug!("Skipping Kodi message: {}", value);
                    }
                    Some(Err(e)) if e.is_eof() => break,
                    Some(Err(e)) => return Err(e.into()),
                    None => break,
                }
            }
            consumed
        };
        buf.drain(..consumed);

        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

impl Notifier for KodiNotifier {
    fn show_notification<'a>(&'a self, toast: &'a Toast) -> BoxFuture<'a, Result<(), BridgeError>> {
        self.send(toast).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn toast() -> Toast {
        Toast {
            title: "Build finished".to_string(),
            body: "All tests passed".to_string(),
            icon: "/icons/512x512/ok.png".to_string(),
            timeout_ms: 7000,
            sound: true,
        }
    }

    /// Accepts one connection, reads the request and answers with `reply(request)`.
    async fn fake_kodi<F>(reply: F) -> (u16, tokio::task::JoinHandle<serde_json::Value>)
    where
        F: FnOnce(&serde_json::Value) -> Vec<serde_json::Value> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            // The request is a single JSON object with no trailing newline.
            let request = loop {
                let n = stream.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&buf) {
                    break value;
                }
            };
            for message in reply(&request) {
                stream.write_all(message.to_string().as_bytes()).await.unwrap();
            }
            request
        });

        (port, server)
    }

    #[test]
    fn test_kodi_request_shape() {
        let notifier = KodiNotifier::new("localhost", 9090);
        let body = notifier.request_body(4, &toast()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 4);
        assert_eq!(value["method"], "GUI.ShowNotification");
        assert_eq!(value["params"]["title"], "Build finished");
        assert_eq!(value["params"]["message"], "All tests passed");
        assert_eq!(value["params"]["image"], "/icons/512x512/ok.png");
        assert_eq!(value["params"]["displaytime"], 7000);
    }

    #[test]
    fn test_short_timeouts_are_raised_to_kodi_minimum() {
        let notifier = KodiNotifier::new("localhost", 9090);
        let short = Toast {
            timeout_ms: 1000,
            ..toast()
        };
        let value: serde_json::Value =
            serde_json::from_slice(&notifier.request_body(1, &short).unwrap()).unwrap();
        assert_eq!(value["params"]["displaytime"], MIN_DISPLAY_TIME_MS);
    }

    #[tokio::test]
    async fn test_kodi_notifier_sends_request() {
        let (port, server) = fake_kodi(|request| {
            vec![
                serde_json::json!({"jsonrpc": "2.0", "method": "GUI.OnScreensaverDeactivated", "params": {}}),
                serde_json::json!({"id": request["id"], "jsonrpc": "2.0", "result": "OK"}),
            ]
        })
        .await;

        KodiNotifier::new("127.0.0.1", port)
            .show_notification(&toast())
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert_eq!(request["method"], "GUI.ShowNotification");
        assert_eq!(request["params"]["title"], "Build finished");
    }

    #[tokio::test]
    async fn test_error_reply_fails_the_call() {
        let (port, server) = fake_kodi(|request| {
            vec![serde_json::json!({
                "id": request["id"],
                "jsonrpc": "2.0",
                "error": {"code": -32602, "message": "Invalid params."}
            })]
        })
        .await;

        let result = KodiNotifier::new("127.0.0.1", port)
            .show_notification(&toast())
            .await;

        match result {
            Err(BridgeError::Rejected(reason)) => assert!(reason.contains("Invalid params.")),
            other => panic!("unexpected result: {:?}", other),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_kodi_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = KodiNotifier::new("127.0.0.1", port)
            .show_notification(&toast())
            .await;
        assert!(matches!(result, Err(BridgeError::Io(_))));
    }
}
