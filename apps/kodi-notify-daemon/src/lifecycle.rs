use crate::monitor::HostMonitor;
use anyhow::{anyhow, bail, Context, Result};
use std::future::Future;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// How often the host shutdown flag is checked.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Directory created below the add-on profile at startup.
pub const ICON_CACHE_DIR: &str = ".icon-cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// A tokio runtime driving the bus on its own thread.
///
/// Whatever `setup` returns is kept alive until the loop is asked to quit,
/// which is how the D-Bus connection stays registered.
#[derive(Debug)]
pub struct EventLoop {
    quit: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl EventLoop {
    /// Spawn the loop thread and wait until `setup` has finished on it.
    pub fn start<F, Fut, G>(setup: F) -> Result<Self>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<G>>,
        G: 'static,
    {
        let (quit_tx, quit_rx) = oneshot::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let span = tracing::Span::current();

        let thread = std::thread::Builder::new()
            .name("event-loop".to_string())
            .spawn(move || {
                let _enter = span.enter();
                let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };

                runtime.block_on(async move {
                    let guard = match setup().await {
                        Ok(guard) => guard,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(()));

                    // A dropped sender also ends the loop.
                    let _ = quit_rx.await;
                    debug!("Event loop quitting");
                    drop(guard);
                });
            })
            .context("Failed to spawn event loop thread")?;

        let ready = ready_rx.recv();
        let mut event_loop = Self {
            quit: Some(quit_tx),
            thread: Some(thread),
        };

        match ready {
            Ok(Ok(())) => Ok(event_loop),
            Ok(Err(e)) => {
                event_loop.join()?;
                Err(e)
            }
            Err(_) => {
                event_loop.join()?;
                Err(anyhow!("Event loop thread exited during startup"))
            }
        }
    }

    /// Ask the loop to return. Does not wait.
    pub fn quit(&mut self) {
        if let Some(quit) = self.quit.take() {
            let _ = quit.send(());
        }
    }

    /// Quit and wait for the loop thread to exit, without a timeout.
    pub fn join(&mut self) -> Result<()> {
        self.quit();
        if let Some(thread) = self.thread.take() {
            thread.join().map_err(|_| anyhow!("Event loop thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        let _ = self.join();
    }
}

/// Runs the service for as long as the host wants it.
///
/// `Idle -> Running -> Stopping -> Stopped`, each state entered once.
pub struct ServiceLifecycle<M: HostMonitor> {
    state: LifecycleState,
    monitor: M,
    poll_interval: Duration,
    cache_dir: PathBuf,
    event_loop: Option<EventLoop>,
}

impl<M: HostMonitor> ServiceLifecycle<M> {
    pub fn new(monitor: M, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            state: LifecycleState::Idle,
            monitor,
            poll_interval: POLL_INTERVAL,
            cache_dir: cache_dir.into(),
            event_loop: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    fn expect_state(&self, expected: LifecycleState) -> Result<()> {
        if self.state != expected {
            bail!("Service is {:?}, expected {:?}", self.state, expected);
        }
        Ok(())
    }

    /// Create the cache directory, start the event loop and register the service on it.
    pub fn start<F, Fut, G>(&mut self, setup: F) -> Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<G>>,
        G: 'static,
    {
        self.expect_state(LifecycleState::Idle)?;

        if let Err(e) = std::fs::create_dir_all(&self.cache_dir) {
            self.state = LifecycleState::Stopped;
            return Err(e).with_context(|| format!("Failed to create {}", self.cache_dir.display()));
        }

        info!("Starting event loop...");
        match EventLoop::start(setup) {
            Ok(event_loop) => {
                self.event_loop = Some(event_loop);
                self.state = LifecycleState::Running;
                Ok(())
            }
            Err(e) => {
                self.state = LifecycleState::Stopped;
                Err(e)
            }
        }
    }

    /// Block until the host requests shutdown.
    pub fn wait_for_shutdown(&mut self) -> Result<()> {
        self.expect_state(LifecycleState::Running)?;

        info!("Waiting for host shutdown request...");
        while !self.monitor.abort_requested() {
            if self.monitor.wait_for_abort(self.poll_interval) {
                break;
            }
        }

        info!("Abort requested, exiting...");
        self.state = LifecycleState::Stopping;
        Ok(())
    }

    /// Stop the event loop and wait for its thread.
    pub fn stop(&mut self) -> Result<()> {
        self.expect_state(LifecycleState::Stopping)?;

        info!("Cleaning up...");
        if let Some(mut event_loop) = self.event_loop.take() {
            event_loop.quit();
            info!("Waiting for threads to finish...");
            event_loop.join()?;
        }

        self.state = LifecycleState::Stopped;
        info!("All done!");
        Ok(())
    }

    pub fn run<F, Fut, G>(&mut self, setup: F) -> Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<G>>,
        G: 'static,
    {
        self.start(setup)?;
        self.wait_for_shutdown()?;
        self.stop()
    }
}
