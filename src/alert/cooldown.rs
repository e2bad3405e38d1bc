//! Cooldown rate-limiting filter (spec §4.9).
//!
//! "Simultaneously an emitter and a subscriber": here that's a driver task
//! that pulls from an upstream [`Emitter`] (playing subscriber) and
//! re-queues admitted alerts behind its own [`Emitter`] implementation,
//! the same upstream-pull-then-requeue shape as [`crate::alert::emitter::VideoSourceAlertEmitter`]
//! and [`crate::subscriber::registrar::SubscriptionRegistrar`]'s per-emitter
//! pump, reused rather than introducing a second filtering mechanism.
//! Grounded in the `Cooldown` filter from
//! `examples/original_source/packages/sentinel-server/sentinel_server/alert/filters.py`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::time::Instant;

use crate::model::Alert;
use crate::subscriber::registrar::Emitter;
use crate::task::CancelableJoinHandle;

/// Rate-limits an upstream alert stream to at most one alert per `duration`.
/// Uses `tokio::time::Instant` so tests can drive it with `tokio::time::pause`/`advance`.
pub struct Cooldown {
    duration: Duration,
    last_allowed: Mutex<Option<Instant>>,
    tx: mpsc::UnboundedSender<Alert>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<Alert>>,
}

impl Cooldown {
    /// Spawns a driver task pulling from `upstream` and filtering through a
    /// cooldown of `duration`. Returns the filter (an [`Emitter`] in its own
    /// right) and the driver task handle; dropping the handle stops the pull.
    pub fn spawn(duration: Duration, upstream: Arc<dyn Emitter>) -> (Arc<Self>, CancelableJoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cooldown = Arc::new(Self {
            duration,
            last_allowed: Mutex::new(None),
            tx,
            rx: AsyncMutex::new(rx),
        });

        let driver_cooldown = cooldown.clone();
        let task = CancelableJoinHandle::spawn(async move {
            loop {
                let alert = upstream.next_alert().await;
                driver_cooldown.offer(alert);
            }
        });

        (cooldown, task)
    }

    /// Admits `alert` if `duration` has elapsed since the last admitted
    /// alert, silently dropping it otherwise (spec §4.9: "drops are silent,
    /// no back-pressure on upstream").
    fn offer(&self, alert: Alert) {
        let now = Instant::now();
        let admit = {
            let mut last_allowed = self.last_allowed.lock();
            let admit = last_allowed.is_none_or(|t| now >= t + self.duration);
            if admit {
                *last_allowed = Some(now);
            }
            admit
        };
        if admit {
            let _ = self.tx.send(alert);
        }
    }
}

#[async_trait]
impl Emitter for Cooldown {
    async fn next_alert(&self) -> Alert {
        self.rx.lock().await.recv().await.expect("cooldown sender dropped while in use")
    }
}
