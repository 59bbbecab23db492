//! Health check server lifecycle.
//!
//! The [`Supervisor`] decides how activity probes map onto idle trackers,
//! then runs the liveness endpoint on a dedicated `health-check` thread with
//! its own single-threaded runtime. The pipeline's processing threads never
//! wait on it, and it never waits on them.

use crate::endpoint::{router, LivenessState};
use axum::Router;
use liveness_common::config::{HealthCheckConfig, TrackerBinding};
use liveness_common::error::{LivenessError, LivenessResult};
use liveness_monitor::{
    ActivityProbe, Clock, IdleTracker, ObservationPoint, PipelineTopology, SystemClock,
};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Owns the idle trackers, the probes feeding them, and the endpoint thread.
pub struct Supervisor {
    config: HealthCheckConfig,
    clock: Arc<dyn Clock>,
    /// Trackers consulted by the endpoint. With shared binding this holds
    /// exactly one tracker from construction on.
    trackers: Vec<Arc<IdleTracker>>,
    probes: Vec<Arc<ActivityProbe>>,
    server: Option<HealthServer>,
}

impl Supervisor {
    /// Create a supervisor on the system monotonic clock.
    #[must_use]
    pub fn new(config: HealthCheckConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Create a supervisor whose trackers read `clock`.
    #[must_use]
    pub fn with_clock(config: HealthCheckConfig, clock: Arc<dyn Clock>) -> Self {
        let mut trackers = Vec::new();
        if config.enabled && config.binding == TrackerBinding::Shared {
            trackers.push(Arc::new(IdleTracker::with_clock(
                config.idle_threshold,
                Arc::clone(&clock),
            )));
        }
        Self {
            config,
            clock,
            trackers,
            probes: Vec::new(),
            server: None,
        }
    }

    /// Whether the health check feature is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// The configuration this supervisor was created with.
    #[must_use]
    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    /// Attach an activity probe at `point` in `topology`.
    ///
    /// Returns `Ok(None)` without touching the topology when the feature is
    /// disabled.
    ///
    /// # Errors
    ///
    /// Fails if the observation point does not exist, or if the server has
    /// already started.
    pub fn add_probe(
        &mut self,
        topology: &mut dyn PipelineTopology,
        point: ObservationPoint,
    ) -> LivenessResult<Option<Arc<ActivityProbe>>> {
        if !self.config.enabled {
            debug!(point = %point, "Health check disabled, not adding probe");
            return Ok(None);
        }
        if self.server.is_some() {
            return Err(LivenessError::Config(
                "probes must be added before the health check server starts".into(),
            ));
        }

        let probe = match self.config.binding {
            TrackerBinding::Shared => {
                let tracker = self.trackers.first().cloned().ok_or_else(|| {
                    LivenessError::Config("shared idle tracker is missing".into())
                })?;
                ActivityProbe::register(topology, point, tracker)?
            }
            TrackerBinding::PerProbe => {
                let tracker = Arc::new(IdleTracker::with_clock(
                    self.config.idle_threshold,
                    Arc::clone(&self.clock),
                ));
                let probe = ActivityProbe::register(topology, point, Arc::clone(&tracker))?;
                self.trackers.push(tracker);
                probe
            }
        };

        self.probes.push(Arc::clone(&probe));
        Ok(Some(probe))
    }

    /// Trackers the endpoint consults.
    #[must_use]
    pub fn trackers(&self) -> &[Arc<IdleTracker>] {
        &self.trackers
    }

    /// Probes added so far.
    #[must_use]
    pub fn probes(&self) -> &[Arc<ActivityProbe>] {
        &self.probes
    }

    /// Bind the listener and start serving on the `health-check` thread.
    ///
    /// Does nothing when the feature is disabled; no port is bound.
    ///
    /// # Errors
    ///
    /// Returns [`LivenessError::Bind`] if the address cannot be bound, and
    /// [`LivenessError::Config`] if per-probe binding has no probes or the
    /// server is already running.
    pub fn start(&mut self) -> LivenessResult<()> {
        if !self.config.enabled {
            info!("Health check disabled");
            return Ok(());
        }
        if self.server.is_some() {
            return Err(LivenessError::Config(
                "health check server already running".into(),
            ));
        }
        if self.trackers.is_empty() {
            return Err(LivenessError::Config(
                "per-probe tracker binding requires at least one probe".into(),
            ));
        }
        if self.probes.is_empty() {
            warn!("Health check started without probes; it will report unhealthy");
        }

        let state = LivenessState::new(self.trackers.clone());
        let server = HealthServer::spawn(&self.config.bind_addr(), router(state))?;
        info!(
            addr = %server.local_addr,
            idle_threshold = ?self.config.idle_threshold,
            trackers = self.trackers.len(),
            "Health check server listening"
        );
        self.server = Some(server);
        Ok(())
    }

    /// Address actually bound, once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(|s| s.local_addr)
    }

    /// Whether the endpoint thread is serving.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.server
            .as_ref()
            .is_some_and(|s| s.running.load(Ordering::Acquire))
    }

    /// Stop serving and wait for the endpoint thread to exit.
    ///
    /// In-flight requests are not drained.
    pub fn stop(&mut self) {
        if let Some(server) = self.server.take() {
            info!("Stopping health check server");
            server.stop();
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.config)
            .field("trackers", &self.trackers.len())
            .field("probes", &self.probes.len())
            .field("local_addr", &self.local_addr())
            .finish_non_exhaustive()
    }
}

/// The endpoint thread and the means to stop it.
struct HealthServer {
    handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
}

impl HealthServer {
    /// Bind synchronously so address errors surface to the caller, then hand
    /// the listener to a background thread.
    fn spawn(addr: &str, app: Router) -> LivenessResult<Self> {
        let bind_err = |e: std::io::Error| LivenessError::Bind {
            addr: addr.to_string(),
            reason: e.to_string(),
        };
        let listener = std::net::TcpListener::bind(addr).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| LivenessError::Server(format!("failed to build runtime: {e}")))?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let handle = match thread::Builder::new()
            .name("health-check".into())
            .spawn(move || {
                let result = runtime.block_on(async move {
                    let listener = tokio::net::TcpListener::from_std(listener)?;
                    tokio::select! {
                        result = axum::serve(listener, app).into_future() => result,
                        _ = shutdown_rx => Ok(()),
                    }
                });
                if let Err(e) = result {
                    error!(error = %e, "Health check server failed");
                }
                thread_running.store(false, Ordering::Release);
                info!("Health check server stopped");
            }) {
            Ok(h) => h,
            Err(e) => {
                return Err(LivenessError::Server(format!(
                    "failed to spawn health check thread: {e}"
                )));
            }
        };

        Ok(Self {
            handle: Some(handle),
            shutdown_tx: Some(shutdown_tx),
            local_addr,
            running,
        })
    }

    fn stop(mut self) {
        self.signal();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.join() {
                warn!("Health check thread panicked: {:?}", e);
            }
        }
    }

    fn signal(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            // Receiver is gone if the thread already exited
            let _ = tx.send(());
        }
    }
}

impl Drop for HealthServer {
    /// Signals the thread without joining; process exit may cut it short.
    fn drop(&mut self) {
        self.signal();
    }
}
