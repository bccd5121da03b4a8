//! Map session
//!
//! One session per open map view. It owns the marker registry and the
//! components allowed to mutate it, and releases every render handle on
//! [`MapSession::teardown`].

use crate::lifecycle::{MarkerLifecycleManager, RefreshOutcome, UpsertOutcome, Viewport};
use crate::metrics::MarkerMetrics;
use crate::pin::{AuthoringForm, PinPlacementController};
use crate::registry::MarkerRegistry;
use crate::state::MarkerKey;
use crate::surface::{ClickAction, MarkerHandle, RenderSurface};
use geodrop_core::clock::Clock;
use geodrop_core::config::AppConfig;
use geodrop_core::error::{ConcurrencyViolation, Result};
use geodrop_core::types::{Collectible, CollectibleId, Coordinate, UserPosition};
use geodrop_geo::cluster::ClusterPolicy;
use geodrop_geo::geofence::{GeofenceCheck, GeofenceEngine};
use geodrop_geo::validate::{validate_collectible, validate_position, RawAxis};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Marker state and collaborators of one open map.
pub struct MapSession<S: RenderSurface, C: Clock> {
    surface: S,
    clock: C,
    registry: MarkerRegistry,
    lifecycle: MarkerLifecycleManager,
    pin: PinPlacementController,
    geofence: GeofenceEngine,
    metrics: Arc<MarkerMetrics>,
    viewport: Viewport,
    camera_duration: Duration,
    nearby: Vec<Collectible>,
}

impl<S: RenderSurface, C: Clock> MapSession<S, C> {
    pub fn new(config: &AppConfig, surface: S, clock: C) -> Self {
        let metrics = Arc::new(MarkerMetrics::new());
        let policy = ClusterPolicy::new(&config.clustering);
        Self {
            surface,
            clock,
            registry: MarkerRegistry::new(),
            lifecycle: MarkerLifecycleManager::new(&config.markers, policy, metrics.clone()),
            pin: PinPlacementController::new(&config.pin, metrics.clone()),
            geofence: GeofenceEngine::new(),
            metrics,
            viewport: Viewport::at_zoom(config.map.initial_zoom),
            camera_duration: config.map.camera_duration(),
            nearby: Vec::new(),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn registry(&self) -> &MarkerRegistry {
        &self.registry
    }

    pub fn lifecycle(&self) -> &MarkerLifecycleManager {
        &self.lifecycle
    }

    pub fn geofence(&self) -> &GeofenceEngine {
        &self.geofence
    }

    pub fn metrics(&self) -> &MarkerMetrics {
        &self.metrics
    }

    pub fn form(&self) -> &AuthoringForm {
        self.pin.form()
    }

    pub fn pin(&self) -> &PinPlacementController {
        &self.pin
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Last nearby result set.
    pub fn nearby(&self) -> &[Collectible] {
        &self.nearby
    }

    fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Feeds a location fix.
    ///
    /// Returns true if geofence eligibility was recomputed.
    pub fn update_position(&mut self, position: &UserPosition) -> Result<bool> {
        let position = validate_position(position)?;
        self.pin.set_user_position(Some(position.coordinate));
        Ok(self.geofence.update_position(&position))
    }

    /// Replaces the nearby set and reconciles markers against it.
    pub fn set_nearby(&mut self, collectibles: Vec<Collectible>, force: bool) -> RefreshOutcome {
        self.track_nearby(collectibles);
        self.refresh(force)
    }

    /// Replaces the nearby set without touching markers.
    ///
    /// Entries with unusable anchors are dropped; swapped anchors are
    /// corrected before the geofence sees them.
    pub fn track_nearby(&mut self, collectibles: Vec<Collectible>) {
        self.nearby = collectibles
            .into_iter()
            .filter_map(|c| {
                let id = c.id.clone();
                validate_collectible(c)
                    .map_err(|e| debug!(%id, error = %e, "Dropping collectible with bad anchor"))
                    .ok()
            })
            .collect();
        self.geofence.track(&self.nearby);
    }

    /// Reconciles markers against the last nearby set.
    pub fn refresh(&mut self, force: bool) -> RefreshOutcome {
        let now = self.now();
        self.lifecycle.bulk_refresh(
            &mut self.registry,
            &mut self.surface,
            &self.nearby,
            self.viewport,
            force,
            now,
        )
    }

    /// Creates or updates one collectible's marker outside a refresh.
    pub fn upsert(&mut self, collectible: &Collectible, force: bool) -> Result<UpsertOutcome> {
        let now = self.now();
        self.lifecycle
            .create_or_update(&mut self.registry, &mut self.surface, collectible, force, now)
    }

    /// User started panning or zooming.
    pub fn begin_interaction(&mut self) {
        self.viewport.interacting = true;
    }

    /// User let go of the camera.
    pub fn end_interaction(&mut self, zoom: f64) -> RefreshOutcome {
        self.viewport = Viewport::at_zoom(zoom);
        self.refresh(false)
    }

    /// Zoom changed programmatically.
    pub fn on_zoom_changed(&mut self, zoom: f64) -> RefreshOutcome {
        self.viewport.zoom = zoom;
        self.refresh(false)
    }

    /// Routes a click on a rendered marker.
    ///
    /// Cluster clicks fly the camera past the clustering threshold and
    /// trigger the individual-marker pass.
    pub fn handle_click(&mut self, handle: MarkerHandle) -> Option<ClickAction> {
        let action = self.registry.find_by_handle(handle)?.click().clone();
        if let ClickAction::ZoomToCluster(target) = &action {
            self.surface.fly_to(*target, self.camera_duration);
            let outcome = self.on_zoom_changed(target.zoom);
            debug!(zoom = target.zoom, ?outcome, "Flew into cluster");
        }
        Some(action)
    }

    /// Centers the camera on the user.
    pub fn recenter(&mut self) -> bool {
        match self.geofence.position() {
            Some(at) => {
                self.surface.ease_to(at, self.camera_duration);
                true
            }
            None => false,
        }
    }

    /// Geofence result for a collectible at the last fix.
    pub fn check(&self, id: &CollectibleId) -> Option<GeofenceCheck> {
        self.geofence.check_for(id)
    }

    /// Removes a collected or discarded collectible from the map.
    pub fn remove_collectible(&mut self, id: &CollectibleId) -> std::result::Result<bool, ConcurrencyViolation> {
        self.nearby.retain(|c| &c.id != id);
        self.geofence.track(&self.nearby);
        self.lifecycle
            .remove(&mut self.registry, &mut self.surface, &MarkerKey::Collectible(id.clone()))
    }

    pub fn place_pin(&mut self, lat: impl Into<RawAxis>, lng: impl Into<RawAxis>) -> Result<Coordinate> {
        let now = self.now();
        self.pin.place(
            &mut self.registry,
            &mut self.surface,
            &self.lifecycle,
            lat,
            lng,
            now,
        )
    }

    pub fn drag_start(&mut self) -> Result<()> {
        self.pin.drag_start(&mut self.registry, &mut self.surface)
    }

    pub fn drag(&mut self, lat: impl Into<RawAxis>, lng: impl Into<RawAxis>) -> Result<Coordinate> {
        self.pin.drag(&self.registry, lat, lng)
    }

    pub fn drag_end(&mut self, lat: impl Into<RawAxis>, lng: impl Into<RawAxis>) -> Result<Coordinate> {
        let now = self.now();
        self.pin
            .drag_end(&mut self.registry, &mut self.surface, lat, lng, now)
    }

    /// The surface moved the draft on its own.
    pub fn notify_external_move(&mut self, reported: Coordinate) -> bool {
        self.pin
            .notify_external_move(&self.registry, &mut self.surface, reported)
    }

    /// Applies a geocode result requested at `requested_at`.
    pub fn apply_search_result(&mut self, result: Coordinate, requested_at: Instant) -> Result<bool> {
        let now = self.now();
        self.pin.apply_search_result(
            &mut self.registry,
            &mut self.surface,
            &self.lifecycle,
            result,
            requested_at,
            now,
        )
    }

    /// Coordinate the draft would be submitted at.
    pub fn pin_submission(&self) -> Result<Coordinate> {
        self.pin.submission(&self.registry)
    }

    /// Submits the draft and catches up on refreshes skipped while it was
    /// protected.
    pub fn submit_pin(&mut self) -> Result<Coordinate> {
        let at = self
            .pin
            .submit(&mut self.registry, &mut self.surface, &self.lifecycle)?;
        self.refresh(false);
        Ok(at)
    }

    pub fn cancel_pin(&mut self) -> Result<()> {
        self.pin
            .cancel(&mut self.registry, &mut self.surface, &self.lifecycle)?;
        self.refresh(false);
        Ok(())
    }

    /// Drives timers: surface retries, debounced refreshes, pin watchdog.
    pub fn tick(&mut self) -> Option<RefreshOutcome> {
        let now = self.now();
        self.pin.tick(&self.registry, &mut self.surface, now);
        self.lifecycle
            .tick(&mut self.registry, &mut self.surface, self.viewport, now)
    }

    /// Releases every marker. The session can be reused afterwards.
    pub fn teardown(&mut self) -> usize {
        self.pin.reset();
        let released = self.registry.teardown(&mut self.surface);
        self.nearby.clear();
        info!(released, "Map session closed");
        released
    }
}
