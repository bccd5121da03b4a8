//! Nearby fetch with cooldown
//!
//! Repeated position fixes would otherwise turn into a storm of directory
//! queries. A fetch inside the cooldown window is refused without touching
//! the directory; the caller keeps its last result set.

use crate::directory::CollectibleDirectory;
use geodrop_core::config::LocationConfig;
use geodrop_core::error::Result;
use geodrop_core::types::{Collectible, Coordinate};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Result of a fetch attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Fresh result set from the directory
    Fetched(Vec<Collectible>),
    /// Refused, the previous fetch is too recent
    CoolingDown { retry_in: Duration },
}

/// Serializes nearby queries against a directory.
pub struct NearbyFetcher<D: CollectibleDirectory + ?Sized> {
    directory: Arc<D>,
    radius_m: u32,
    cooldown: Duration,
    last_request: Option<Instant>,
}

impl<D: CollectibleDirectory + ?Sized> NearbyFetcher<D> {
    pub fn new(directory: Arc<D>, config: &LocationConfig) -> Self {
        Self {
            directory,
            radius_m: config.search_radius_m,
            cooldown: config.fetch_cooldown(),
            last_request: None,
        }
    }

    pub fn directory(&self) -> &Arc<D> {
        &self.directory
    }

    pub fn radius_m(&self) -> u32 {
        self.radius_m
    }

    /// Time left before the next fetch is allowed.
    pub fn remaining_cooldown(&self) -> Duration {
        self.last_request
            .map(|at| self.cooldown.saturating_sub(at.elapsed()))
            .unwrap_or(Duration::ZERO)
    }

    /// Queries the directory around `center` unless cooling down.
    ///
    /// A failed query still starts the cooldown.
    pub async fn fetch(&mut self, center: Coordinate) -> Result<FetchOutcome> {
        let retry_in = self.remaining_cooldown();
        if !retry_in.is_zero() {
            debug!(retry_in_ms = retry_in.as_millis() as u64, "Nearby fetch cooling down");
            return Ok(FetchOutcome::CoolingDown { retry_in });
        }

        self.last_request = Some(Instant::now());
        match self.directory.list_nearby(center, self.radius_m).await {
            Ok(collectibles) => {
                debug!(%center, count = collectibles.len(), "Fetched nearby collectibles");
                Ok(FetchOutcome::Fetched(collectibles))
            }
            Err(e) => {
                warn!(error = %e, %center, "Nearby fetch failed");
                Err(e)
            }
        }
    }

    /// Clears the cooldown so the next fetch goes through.
    pub fn reset(&mut self) {
        self.last_request = None;
    }
}
