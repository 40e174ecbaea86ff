//! Idle shutdown coordination.
//!
//! The server may stop itself after a period without compile triggers, but
//! never while a compilation holds an event lock. Whether to stop is a pure
//! function of "has the idle timer fired" and "how many compilations are in
//! flight"; [`ShutdownCoordinator`] owns the timer and feeds that function.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};
use vgb_compiler::EventLocks;

/// Poll interval while draining in-flight compilations.
const DRAIN_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownDecision {
    /// Timer has not fired; keep waiting.
    Continue,
    /// Timer fired with work in flight; re-arm.
    Defer,
    /// Timer fired and nothing is running.
    Shutdown,
}

pub fn decide(timer_fired: bool, active: usize) -> ShutdownDecision {
    match (timer_fired, active) {
        (false, _) => ShutdownDecision::Continue,
        (true, 0) => ShutdownDecision::Shutdown,
        (true, _) => ShutdownDecision::Defer,
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    idle_timeout: Option<Duration>,
    locks: EventLocks,
    last_activity: Arc<Mutex<Instant>>,
    signal: Arc<watch::Sender<bool>>,
}

impl ShutdownCoordinator {
    /// `idle_timeout = None` disables idle shutdown; signals still work.
    pub fn new(idle_timeout: Option<Duration>, locks: EventLocks) -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            idle_timeout,
            locks,
            last_activity: Arc::new(Mutex::new(Instant::now())),
            signal: Arc::new(signal),
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// Record activity, pushing the idle deadline out.
    pub fn touch(&self) {
        *self.last_activity.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Compilations currently in flight.
    pub fn active(&self) -> usize {
        self.locks.active_count()
    }

    pub fn is_triggered(&self) -> bool {
        *self.signal.borrow()
    }

    /// Request shutdown.
    pub fn trigger(&self, reason: &str) {
        if !self.signal.send_replace(true) {
            info!(reason = %reason, "Shutdown requested");
        }
    }

    /// Resolves once shutdown has been requested.
    pub async fn wait(&self) {
        let mut rx = self.signal.subscribe();
        let _ = rx.wait_for(|&triggered| triggered).await;
    }

    fn deadline(&self, timeout: Duration) -> Instant {
        *self.last_activity.lock().unwrap_or_else(PoisonError::into_inner) + timeout
    }

    /// Start the idle timer task. `None` when idle shutdown is disabled.
    pub fn spawn_idle_watch(&self) -> Option<JoinHandle<()>> {
        let timeout = self.idle_timeout?;
        let this = self.clone();
        Some(tokio::spawn(async move { this.idle_watch(timeout).await }))
    }

    async fn idle_watch(self, timeout: Duration) {
        info!(timeout_secs = timeout.as_secs(), "Idle shutdown enabled");
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(self.deadline(timeout)) => {}
                _ = self.wait() => return,
            }

            let fired = Instant::now() >= self.deadline(timeout);
            match decide(fired, self.active()) {
                ShutdownDecision::Continue => {}
                ShutdownDecision::Defer => {
                    info!(active = self.active(), "Idle timeout reached with compilations in flight, deferring");
                    self.touch();
                }
                ShutdownDecision::Shutdown => {
                    self.trigger("idle");
                    return;
                }
            }
        }
    }

    /// Wait up to `grace` for in-flight compilations to finish.
    /// Returns how many were still running.
    pub async fn drain(&self, grace: Duration) -> usize {
        let deadline = Instant::now() + grace;
        loop {
            let active = self.active();
            let now = Instant::now();
            if active == 0 || now >= deadline {
                return active;
            }
            tokio::time::sleep(DRAIN_POLL.min(deadline - now)).await;
        }
    }
}

/// Resolves on SIGINT, SIGTERM or an idle shutdown request.
pub async fn shutdown_signal(coordinator: ShutdownCoordinator) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => coordinator.trigger("SIGINT"),
        _ = terminate => coordinator.trigger("SIGTERM"),
        _ = coordinator.wait() => {}
    }
}
