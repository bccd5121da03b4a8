//! Collect view
//!
//! Wires the async collaborators to a map session. Position fixes feed the
//! geofence and trigger cooled-down nearby fetches; fetched results
//! reconcile the markers. Failures become a user notice while the map stays
//! interactive, so a denied location permission still leaves manual pin
//! placement working.

use geodrop_client::{
    locate, CollectReceipt, CollectibleDirectory, FetchOutcome, LocationProvider, LocationWatch,
    NearbyFetcher, PositionOptions,
};
use geodrop_core::clock::Clock;
use geodrop_core::config::AppConfig;
use geodrop_core::error::{DirectoryError, GeoDropError, Result, TransientError};
use geodrop_core::types::{Collectible, CollectibleId, Coordinate, NewCollectible, Rarity, UserPosition};
use geodrop_geo::validate::RawAxis;
use geodrop_map::{MapSession, RefreshOutcome, RenderSurface};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Details the user fills in before submitting the draft pin.
#[derive(Debug, Clone, Default)]
pub struct PinDetails {
    pub name: String,
    /// Geofence radius, the configured default if unset
    pub radius_m: Option<u32>,
    pub rarity: Rarity,
    pub collection: String,
    pub media_uri: String,
}

/// What one position fix changed.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationUpdate {
    pub position: UserPosition,
    /// Geofence eligibility was recomputed
    pub geofence_changed: bool,
    /// A fresh nearby set arrived from the directory
    pub fetched: bool,
    /// Marker refresh triggered by the fetch, if rendering
    pub refresh: Option<RefreshOutcome>,
}

/// The collect screen: location, nearby collectibles and pin authoring.
pub struct CollectView<S, C, P, D>
where
    S: RenderSurface,
    C: Clock,
    P: LocationProvider + ?Sized + 'static,
    D: CollectibleDirectory + ?Sized,
{
    session: MapSession<S, C>,
    provider: Arc<P>,
    fetcher: NearbyFetcher<D>,
    options: PositionOptions,
    watch_period: Duration,
    watch: Option<LocationWatch>,
    rendering: bool,
    default_radius_m: u32,
    notice: Option<String>,
}

impl<S, C, P, D> CollectView<S, C, P, D>
where
    S: RenderSurface,
    C: Clock,
    P: LocationProvider + ?Sized + 'static,
    D: CollectibleDirectory + ?Sized,
{
    /// Opens the view.
    ///
    /// A missing map access token disables rendering of collectible
    /// markers; location, geofence and directory features keep working.
    /// The draft pin is still drawn so a pin can be placed by hand.
    pub fn open(config: &AppConfig, surface: S, clock: C, provider: Arc<P>, directory: Arc<D>) -> Self {
        let mut notice = None;
        let rendering = match config.map.require_access_token() {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Map rendering disabled");
                notice = e.user_message();
                false
            }
        };

        info!(
            rendering,
            search_radius_m = config.location.search_radius_m,
            "Collect view opened"
        );

        Self {
            session: MapSession::new(config, surface, clock),
            provider,
            fetcher: NearbyFetcher::new(directory, &config.location),
            options: PositionOptions::from(&config.location),
            watch_period: config.location.watch_interval(),
            watch: None,
            rendering,
            default_radius_m: config.pin.default_radius_m,
            notice,
        }
    }

    pub fn session(&self) -> &MapSession<S, C> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut MapSession<S, C> {
        &mut self.session
    }

    pub fn rendering_enabled(&self) -> bool {
        self.rendering
    }

    /// Latest user-visible message.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    fn report(&mut self, err: &GeoDropError) {
        match err.user_message() {
            Some(message) => {
                warn!(error = %err, %message, "Collect view error");
                self.notice = Some(message);
            }
            None => debug!(error = %err, "Collect view error handled locally"),
        }
    }

    /// Requests a fix and refreshes the nearby set around it.
    pub async fn refresh_location(&mut self) -> Result<LocationUpdate> {
        match locate(self.provider.as_ref(), self.options).await {
            Ok(position) => self.apply_position(position).await,
            Err(e) => {
                self.report(&e);
                Err(e)
            }
        }
    }

    async fn apply_position(&mut self, position: UserPosition) -> Result<LocationUpdate> {
        let geofence_changed = self.session.update_position(&position)?;

        let (fetched, refresh) = match self.fetcher.fetch(position.coordinate).await {
            Ok(FetchOutcome::Fetched(collectibles)) => (true, self.show(collectibles)),
            Ok(FetchOutcome::CoolingDown { .. }) => (false, None),
            Err(e) => {
                self.report(&e);
                return Err(e);
            }
        };

        Ok(LocationUpdate {
            position,
            geofence_changed,
            fetched,
            refresh,
        })
    }

    fn show(&mut self, collectibles: Vec<Collectible>) -> Option<RefreshOutcome> {
        if self.rendering {
            Some(self.session.set_nearby(collectibles, false))
        } else {
            self.session.track_nearby(collectibles);
            None
        }
    }

    /// Starts the continuous location watch.
    pub fn start_watch(&mut self) {
        if self.watch.as_ref().is_some_and(|w| !w.is_cancelled()) {
            return;
        }
        self.watch = Some(LocationWatch::spawn(
            self.provider.clone(),
            self.options,
            self.watch_period,
        ));
        debug!(period_ms = self.watch_period.as_millis() as u64, "Location watch started");
    }

    pub fn stop_watch(&mut self) {
        if let Some(watch) = self.watch.take() {
            watch.cancel();
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    /// Applies a queued watch result, if any.
    pub async fn poll_watch(&mut self) -> Option<Result<LocationUpdate>> {
        let next = self.watch.as_mut()?.try_next()?;
        Some(self.apply_watch_result(next).await)
    }

    /// Waits for the next watch result and applies it.
    ///
    /// Returns `None` when no watch is running or the watch has ended.
    pub async fn next_watch_update(&mut self) -> Option<Result<LocationUpdate>> {
        let next = self.watch.as_mut()?.next().await?;
        Some(self.apply_watch_result(next).await)
    }

    async fn apply_watch_result(&mut self, next: Result<UserPosition>) -> Result<LocationUpdate> {
        match next {
            Ok(position) => self.apply_position(position).await,
            Err(e) => {
                self.report(&e);
                Err(e)
            }
        }
    }

    /// Collects a nearby collectible at the last known position.
    pub async fn collect(&mut self, id: &CollectibleId) -> Result<CollectReceipt> {
        let Some(at) = self.session.geofence().position() else {
            let e = GeoDropError::from(TransientError::PositionUnavailable);
            self.report(&e);
            return Err(e);
        };

        let radius_m = self
            .session
            .nearby()
            .iter()
            .find(|c| &c.id == id)
            .map(|c| c.radius_m);
        if let (Some(radius_m), Some(fence)) = (radius_m, self.session.check(id)) {
            if !fence.within_radius {
                debug!(%id, distance_m = fence.distance_m, radius_m, "Collect refused locally");
                return Err(DirectoryError::OutsideGeofence {
                    distance_m: fence.distance_m,
                    radius_m,
                }
                .into());
            }
        }

        let receipt = match self.fetcher.directory().collect(id, at).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.report(&e);
                return Err(e);
            }
        };

        if let Err(violation) = self.session.remove_collectible(id) {
            debug!(%id, %violation, "Collected marker left in place");
        }
        info!(%id, distance_m = receipt.distance_m, "Collected");
        Ok(receipt)
    }

    /// Places the draft pin, surfacing the rejection of a second pin.
    ///
    /// The draft marker is created even with rendering disabled, since the
    /// drag and commit flow runs on the marker state.
    pub fn place_pin(&mut self, lat: impl Into<RawAxis>, lng: impl Into<RawAxis>) -> Result<Coordinate> {
        let result = self.session.place_pin(lat, lng);
        if let Err(e) = &result {
            self.report(e);
        }
        result
    }

    /// Registers the draft pin with the directory and clears it.
    ///
    /// The draft stays on the map if the directory refuses it.
    pub async fn submit_pin(&mut self, details: PinDetails) -> Result<CollectibleId> {
        let anchor = self.session.pin_submission()?;
        let draft = NewCollectible {
            name: details.name,
            anchor,
            radius_m: details.radius_m.unwrap_or(self.default_radius_m),
            rarity: details.rarity,
            collection: details.collection,
            media_uri: details.media_uri,
        };

        let id = match self.fetcher.directory().pin(draft).await {
            Ok(id) => id,
            Err(e) => {
                self.report(&e);
                return Err(e);
            }
        };
        self.session.submit_pin()?;
        info!(%id, %anchor, "Pin submitted");

        self.fetcher.reset();
        if let Some(at) = self.session.geofence().position() {
            match self.fetcher.fetch(at).await {
                Ok(FetchOutcome::Fetched(collectibles)) => {
                    self.show(collectibles);
                }
                Ok(FetchOutcome::CoolingDown { .. }) => {}
                Err(e) => self.report(&e),
            }
        }
        Ok(id)
    }

    /// Drives session timers.
    pub fn tick(&mut self) -> Option<RefreshOutcome> {
        self.session.tick()
    }

    /// Cancels the watch and releases every marker.
    pub fn close(&mut self) -> usize {
        self.stop_watch();
        self.session.teardown()
    }
}
