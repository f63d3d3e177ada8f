// src/core/shutdown.rs
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Turns termination signals into a single cooperative stop request.
///
/// The flag flips at most once; later requests are logged and ignored.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    tx: Arc<watch::Sender<bool>>,
}

/// Read side of the stop flag, checked by the engine between cycles.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raises the stop flag. Returns `true` only for the call that flipped it.
    pub fn request(&self, reason: &str) -> bool {
        let flipped = self.tx.send_if_modified(|stop| {
            if *stop {
                false
            } else {
                *stop = true;
                true
            }
        });
        if flipped {
            info!(reason, "Shutdown requested");
        } else {
            debug!(reason, "Shutdown already in progress");
        }
        flipped
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Spawns a task forwarding SIGINT and SIGTERM (Ctrl+C elsewhere) to
    /// [`ShutdownCoordinator::request`] for the life of the process.
    pub fn listen_for_signals(&self) -> std::io::Result<JoinHandle<()>> {
        let coordinator = self.clone();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigint = signal(SignalKind::interrupt())?;
            let mut sigterm = signal(SignalKind::terminate())?;

            Ok(tokio::spawn(async move {
                loop {
                    let received = tokio::select! {
                        s = sigint.recv() => s.map(|_| "SIGINT"),
                        s = sigterm.recv() => s.map(|_| "SIGTERM"),
                    };
                    match received {
                        Some(name) => {
                            info!(signal = name, "Received signal");
                            coordinator.request(name);
                        }
                        None => break,
                    }
                }
            }))
        }

        #[cfg(not(unix))]
        {
            Ok(tokio::spawn(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    info!(signal = "ctrl_c", "Received signal");
                    coordinator.request("ctrl_c");
                }
            }))
        }
    }
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once stop has been requested. If every coordinator is gone
    /// before that, no request can arrive and this never resolves.
    pub async fn triggered(&mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
