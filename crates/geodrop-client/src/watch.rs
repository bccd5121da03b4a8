//! Continuous location watch
//!
//! A background task polls the provider on a fixed period and forwards each
//! result over a channel. The owning view cancels the watch on teardown;
//! dropping the handle cancels it too.

use crate::location::{locate, LocationProvider, PositionOptions};
use geodrop_core::error::{GeoDropError, Result};
use geodrop_core::types::UserPosition;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const CHANNEL_CAPACITY: usize = 16;

/// Handle to a running location watch.
pub struct LocationWatch {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    rx: mpsc::Receiver<Result<UserPosition>>,
}

impl LocationWatch {
    /// Starts polling `provider` every `period`.
    ///
    /// The first request is issued immediately. The watch ends on its own
    /// after a permission denial, since further requests cannot succeed.
    pub fn spawn<P>(provider: Arc<P>, options: PositionOptions, period: Duration) -> Self
    where
        P: LocationProvider + ?Sized + 'static,
    {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Location watch cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let result = tokio::select! {
                            _ = token.cancelled() => break,
                            result = locate(provider.as_ref(), options) => result,
                        };
                        let denied = matches!(result, Err(GeoDropError::Permission(_)));
                        if let Err(e) = &result {
                            warn!(error = %e, "Location watch fix failed");
                        }
                        if tx.send(result).await.is_err() {
                            debug!("Location watch receiver dropped");
                            break;
                        }
                        if denied {
                            info!("Location permission denied, stopping watch");
                            break;
                        }
                    }
                }
            }
        });

        Self {
            cancel,
            handle: Some(handle),
            rx,
        }
    }

    /// Waits for the next result. Returns `None` once the watch has ended.
    pub async fn next(&mut self) -> Option<Result<UserPosition>> {
        self.rx.recv().await
    }

    /// Returns a result if one is already queued.
    pub fn try_next(&mut self) -> Option<Result<UserPosition>> {
        self.rx.try_recv().ok()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancels the watch and waits for the task to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Location watch task failed");
            }
        }
    }
}

impl Drop for LocationWatch {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
