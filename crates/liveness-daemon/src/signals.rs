//! Signal handling for daemon shutdown.
//!
//! SIGTERM and SIGINT store the signal number in an atomic from an
//! async-signal-safe handler. A watcher thread turns that into a shutdown
//! request the pipeline loop polls.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Signal number delivered but not yet seen by the watcher, or 0.
static PENDING_SIGNAL: AtomicI32 = AtomicI32::new(0);

/// Signals that request shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// SIGTERM, sent by the orchestrator on pod termination.
    Terminate,
    /// SIGINT (Ctrl+C).
    Interrupt,
}

impl SignalKind {
    /// Map a raw signal number.
    #[cfg(unix)]
    fn from_raw(signum: i32) -> Option<Self> {
        match signum {
            libc::SIGTERM => Some(Self::Terminate),
            libc::SIGINT => Some(Self::Interrupt),
            _ => None,
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Terminate => write!(f, "SIGTERM"),
            SignalKind::Interrupt => write!(f, "SIGINT"),
        }
    }
}

/// Shutdown flag shared between the watcher thread and the pipeline loop.
#[derive(Debug, Default)]
pub struct ShutdownState {
    requested: AtomicBool,
    signal_count: AtomicU32,
}

impl ShutdownState {
    /// Whether shutdown has been requested.
    #[inline]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Relaxed)
    }

    /// Request shutdown (can be called from any thread).
    pub fn request(&self) {
        self.requested.store(true, Ordering::Relaxed);
    }

    fn record_signal(&self) {
        self.signal_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of shutdown signals received.
    pub fn signal_count(&self) -> u32 {
        self.signal_count.load(Ordering::Relaxed)
    }
}

/// Handle the pipeline loop polls for shutdown.
#[derive(Debug, Clone)]
pub struct SignalHandler {
    state: Arc<ShutdownState>,
}

impl SignalHandler {
    /// Install SIGTERM and SIGINT handlers and start the watcher thread.
    ///
    /// On non-Unix platforms only [`request_shutdown`](Self::request_shutdown)
    /// ends the loop.
    pub fn new() -> std::io::Result<Self> {
        let handler = Self::detached();

        #[cfg(unix)]
        handler.install()?;

        Ok(handler)
    }

    /// A handler that is not connected to any OS signal.
    pub fn detached() -> Self {
        Self {
            state: Arc::new(ShutdownState::default()),
        }
    }

    #[cfg(unix)]
    fn install(&self) -> std::io::Result<()> {
        use std::os::raw::c_int;

        extern "C" fn on_signal(signum: c_int) {
            PENDING_SIGNAL.store(signum, Ordering::Relaxed);
        }

        for signum in [libc::SIGTERM, libc::SIGINT] {
            let previous = unsafe { libc::signal(signum, on_signal as libc::sighandler_t) };
            if previous == libc::SIG_ERR {
                return Err(std::io::Error::last_os_error());
            }
        }

        let state = Arc::clone(&self.state);
        std::thread::Builder::new()
            .name("signal-watch".into())
            .spawn(move || {
                while !state.is_requested() {
                    let signum = PENDING_SIGNAL.swap(0, Ordering::Relaxed);
                    if let Some(kind) = SignalKind::from_raw(signum) {
                        info!(signal = %kind, "Shutdown signal received");
                        state.record_signal();
                        state.request();
                    }
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
            })?;

        debug!("Unix signal handlers registered");
        Ok(())
    }

    /// Whether shutdown has been requested.
    #[inline]
    pub fn shutdown_requested(&self) -> bool {
        self.state.is_requested()
    }

    /// Manually request shutdown.
    pub fn request_shutdown(&self) {
        info!("Manual shutdown requested");
        self.state.request();
    }

    /// Shared state for inspection.
    pub fn state(&self) -> &ShutdownState {
        &self.state
    }
}
