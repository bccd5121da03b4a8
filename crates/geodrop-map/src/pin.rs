//! Draft pin placement
//!
//! The draft pin is the singleton marker used to author a new collectible.
//! Once the user lets go of it, the dropped coordinate is authoritative: it
//! overrides whatever the form held before, the pin stays protected until
//! submit or cancel, and a short watchdog re-asserts the position if the
//! surface drifts it.

use crate::lifecycle::MarkerLifecycleManager;
use crate::metrics::MarkerMetrics;
use crate::registry::MarkerRegistry;
use crate::state::{MarkerKey, MarkerState, Owner};
use crate::surface::RenderSurface;
use geodrop_core::config::PinConfig;
use geodrop_core::error::{ConcurrencyViolation, GeoDropError, Result};
use geodrop_core::types::Coordinate;
use geodrop_geo::geofence::haversine_distance_m;
use geodrop_geo::validate::{normalize, validate_coordinate, RawAxis, ValidationReason};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Where the form's coordinate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSource {
    Placed,
    Dragged,
    Search,
}

/// What the authoring form shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSnapshot {
    pub coordinate: Option<Coordinate>,
    pub committed: bool,
    pub source: Option<CoordinateSource>,
    pub validation: Option<ValidationReason>,
    pub distance_to_target_m: Option<f64>,
}

/// Authoring form state driven by the pin controller.
#[derive(Debug, Clone, Default)]
pub struct AuthoringForm {
    live: Option<Coordinate>,
    committed: Option<Coordinate>,
    committed_at: Option<Instant>,
    source: Option<CoordinateSource>,
    validation: Option<ValidationReason>,
    user_position: Option<Coordinate>,
}

impl AuthoringForm {
    /// Coordinate currently shown, live while dragging.
    pub fn coordinate(&self) -> Option<Coordinate> {
        self.live.or(self.committed)
    }

    /// Last committed coordinate.
    pub fn committed(&self) -> Option<Coordinate> {
        self.committed
    }

    pub fn committed_at(&self) -> Option<Instant> {
        self.committed_at
    }

    pub fn source(&self) -> Option<CoordinateSource> {
        self.source
    }

    pub fn validation(&self) -> Option<ValidationReason> {
        self.validation
    }

    /// Distance from the user to the shown coordinate.
    pub fn distance_to_target_m(&self) -> Option<f64> {
        match (self.user_position, self.coordinate()) {
            (Some(user), Some(target)) => Some(haversine_distance_m(&user, &target)),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> FormSnapshot {
        FormSnapshot {
            coordinate: self.coordinate(),
            committed: self.committed.is_some() && self.live == self.committed,
            source: self.source,
            validation: self.validation,
            distance_to_target_m: self.distance_to_target_m(),
        }
    }

    fn show(&mut self, at: Coordinate, source: CoordinateSource, reason: ValidationReason) {
        self.live = Some(at);
        self.source = Some(source);
        self.validation = Some(reason);
    }

    fn commit(&mut self, at: Coordinate, source: CoordinateSource, now: Instant) {
        self.live = Some(at);
        self.committed = Some(at);
        self.committed_at = Some(now);
        self.source = Some(source);
        self.validation = Some(ValidationReason::Ok);
    }

    fn reset(&mut self) {
        *self = Self {
            user_position: self.user_position,
            ..Self::default()
        };
    }
}

#[derive(Debug, Clone, Copy)]
struct Watchdog {
    target: Coordinate,
    next_check: Instant,
    until: Instant,
}

/// Controller for the draft pin.
#[derive(Debug)]
pub struct PinPlacementController {
    interval: Duration,
    window: Duration,
    tolerance_deg: f64,
    form: AuthoringForm,
    watchdog: Option<Watchdog>,
    metrics: Arc<MarkerMetrics>,
}

impl PinPlacementController {
    pub fn new(config: &PinConfig, metrics: Arc<MarkerMetrics>) -> Self {
        Self {
            interval: config.watchdog_interval(),
            window: config.watchdog_window(),
            tolerance_deg: config.drift_tolerance_deg,
            form: AuthoringForm::default(),
            watchdog: None,
            metrics,
        }
    }

    pub fn form(&self) -> &AuthoringForm {
        &self.form
    }

    /// Returns true while the drift watchdog runs.
    pub fn watchdog_active(&self) -> bool {
        self.watchdog.is_some()
    }

    /// Feeds the user's position for the distance-to-target readout.
    pub fn set_user_position(&mut self, at: Option<Coordinate>) {
        self.form.user_position = at;
    }

    /// Places the draft pin or moves an unlocked one.
    ///
    /// Rejected while a committed draft exists; it must be submitted or
    /// cancelled first.
    pub fn place(
        &mut self,
        registry: &mut MarkerRegistry,
        surface: &mut dyn RenderSurface,
        lifecycle: &MarkerLifecycleManager,
        lat: impl Into<RawAxis>,
        lng: impl Into<RawAxis>,
        now: Instant,
    ) -> Result<Coordinate> {
        let validated = validate_coordinate(lat, lng);
        let reason = validated.reason;
        let at = validated.into_result()?;

        match registry.state(&MarkerKey::Draft) {
            MarkerState::Locked | MarkerState::Protected => {
                let violation = ConcurrencyViolation::DraftAlreadyPlaced;
                info!(%violation, "Second draft pin rejected");
                self.metrics.record_violation();
                return Err(violation.into());
            }
            MarkerState::Dragging => {
                return Err(ConcurrencyViolation::protected("draft", "place").into());
            }
            MarkerState::Stable => lifecycle.move_draft(registry, surface, at, now)?,
            MarkerState::Absent | MarkerState::Creating | MarkerState::Removed => {
                lifecycle.create_draft(registry, surface, at, now)?;
            }
        }

        self.form.show(at, CoordinateSource::Placed, reason);
        debug!(coordinate = %at, "Draft pin placed");
        Ok(at)
    }

    /// User grabbed the draft.
    pub fn drag_start(
        &mut self,
        registry: &mut MarkerRegistry,
        surface: &mut dyn RenderSurface,
    ) -> Result<()> {
        let handle = draft_handle(registry)?;
        registry.transition(&MarkerKey::Draft, Owner::PinPlacement, MarkerState::Dragging)?;
        self.watchdog = None;
        if let Err(e) = surface.set_emphasis(handle, true) {
            warn!(error = %e, "Failed to emphasize draft pin");
        }
        Ok(())
    }

    /// Live position while dragging. Shown in the form, not committed.
    pub fn drag(
        &mut self,
        registry: &MarkerRegistry,
        lat: impl Into<RawAxis>,
        lng: impl Into<RawAxis>,
    ) -> Result<Coordinate> {
        expect_dragging(registry)?;
        let validated = validate_coordinate(lat, lng);
        let reason = validated.reason;
        let at = match validated.into_result() {
            Ok(at) => at,
            Err(e) => {
                self.form.validation = Some(reason);
                return Err(e.into());
            }
        };
        self.form.show(at, CoordinateSource::Dragged, reason);
        Ok(at)
    }

    /// User let go of the draft.
    ///
    /// Commits the drop coordinate, locks and protects the draft, and starts
    /// the drift watchdog. An unusable drop coordinate falls back to the last
    /// live drag position.
    pub fn drag_end(
        &mut self,
        registry: &mut MarkerRegistry,
        surface: &mut dyn RenderSurface,
        lat: impl Into<RawAxis>,
        lng: impl Into<RawAxis>,
        now: Instant,
    ) -> Result<Coordinate> {
        expect_dragging(registry)?;
        let handle = draft_handle(registry)?;

        let at = match validate_coordinate(lat, lng).into_result() {
            Ok(at) => at,
            Err(e) => {
                let fallback = self
                    .form
                    .live
                    .or_else(|| registry.get(&MarkerKey::Draft).map(|m| m.position()));
                warn!(error = %e, "Invalid drop coordinate, keeping last drag position");
                fallback.ok_or(GeoDropError::from(e))?
            }
        };

        registry.transition(&MarkerKey::Draft, Owner::PinPlacement, MarkerState::Locked)?;
        self.form.commit(at, CoordinateSource::Dragged, now);
        registry.set_position(&MarkerKey::Draft, at, now);
        if let Err(e) = surface.set_marker_position(handle, at) {
            warn!(error = %e, "Failed to place committed draft pin");
        }
        if let Err(e) = surface.set_emphasis(handle, false) {
            warn!(error = %e, "Failed to clear draft emphasis");
        }
        registry.transition(&MarkerKey::Draft, Owner::PinPlacement, MarkerState::Protected)?;

        self.start_watchdog(at, now);
        info!(coordinate = %at, "Draft pin committed");
        Ok(at)
    }

    fn start_watchdog(&mut self, target: Coordinate, now: Instant) {
        self.watchdog = Some(Watchdog {
            target,
            next_check: now + self.interval,
            until: now + self.window,
        });
    }

    /// Runs a due watchdog check. Returns true if the pin was corrected.
    pub fn tick(
        &mut self,
        registry: &MarkerRegistry,
        surface: &mut dyn RenderSurface,
        now: Instant,
    ) -> bool {
        let Some(mut watchdog) = self.watchdog else {
            return false;
        };
        if !registry.state(&MarkerKey::Draft).is_protected() {
            self.watchdog = None;
            return false;
        }

        let mut corrected = false;
        if now >= watchdog.next_check {
            corrected = self.reassert(registry, surface, watchdog.target, None);
            watchdog.next_check = now + self.interval;
        }

        if now >= watchdog.until {
            debug!("Draft watchdog window ended");
            self.watchdog = None;
        } else {
            self.watchdog = Some(watchdog);
        }
        corrected
    }

    /// The surface reports it moved the draft on its own.
    ///
    /// Returns true if the committed position was re-asserted.
    pub fn notify_external_move(
        &mut self,
        registry: &MarkerRegistry,
        surface: &mut dyn RenderSurface,
        reported: Coordinate,
    ) -> bool {
        let state = registry.state(&MarkerKey::Draft);
        if !matches!(state, MarkerState::Locked | MarkerState::Protected) {
            return false;
        }
        match self.form.committed {
            Some(target) => self.reassert(registry, surface, target, Some(reported)),
            None => false,
        }
    }

    fn reassert(
        &self,
        registry: &MarkerRegistry,
        surface: &mut dyn RenderSurface,
        target: Coordinate,
        reported: Option<Coordinate>,
    ) -> bool {
        let Some(marker) = registry.get(&MarkerKey::Draft) else {
            return false;
        };
        let handle = marker.handle();
        let shown = reported.or_else(|| surface.marker_position(handle));
        let drifted = shown.map_or(true, |p| p.degree_distance(&target) > self.tolerance_deg);
        if !drifted {
            return false;
        }

        match surface.set_marker_position(handle, target) {
            Ok(()) => {
                debug!(target = %target, "Draft pin drift corrected");
                self.metrics.record_watchdog_correction();
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to correct draft pin drift");
                false
            }
        }
    }

    /// Applies a geocode or search result to the form.
    ///
    /// Results requested before the last commit are stale and discarded, as
    /// are results arriving while the user holds the pin. Returns true if the
    /// result was applied.
    pub fn apply_search_result(
        &mut self,
        registry: &mut MarkerRegistry,
        surface: &mut dyn RenderSurface,
        lifecycle: &MarkerLifecycleManager,
        result: Coordinate,
        requested_at: Instant,
        now: Instant,
    ) -> Result<bool> {
        let at = normalize(result).into_result()?;

        if self.form.committed_at.is_some_and(|c| requested_at < c) {
            debug!(coordinate = %at, "Stale search result discarded");
            return Ok(false);
        }

        match registry.state(&MarkerKey::Draft) {
            MarkerState::Dragging | MarkerState::Locked => {
                debug!("Search result ignored during drag");
                return Ok(false);
            }
            MarkerState::Protected => {
                let handle = draft_handle(registry)?;
                self.form.commit(at, CoordinateSource::Search, now);
                registry.set_position(&MarkerKey::Draft, at, now);
                surface.set_marker_position(handle, at)?;
                self.start_watchdog(at, now);
            }
            MarkerState::Stable => {
                lifecycle.move_draft(registry, surface, at, now)?;
                self.form.show(at, CoordinateSource::Search, ValidationReason::Ok);
            }
            MarkerState::Absent | MarkerState::Creating | MarkerState::Removed => {
                lifecycle.create_draft(registry, surface, at, now)?;
                self.form.show(at, CoordinateSource::Search, ValidationReason::Ok);
            }
        }
        Ok(true)
    }

    /// Coordinate a submit would author at, without submitting.
    ///
    /// Fails while the draft is being dragged or is locked.
    pub fn submission(&self, registry: &MarkerRegistry) -> Result<Coordinate> {
        match registry.state(&MarkerKey::Draft) {
            MarkerState::Absent | MarkerState::Removed => {
                Err(ConcurrencyViolation::NoDraft.into())
            }
            MarkerState::Dragging | MarkerState::Locked => {
                Err(ConcurrencyViolation::protected("draft", "submit").into())
            }
            MarkerState::Creating | MarkerState::Stable | MarkerState::Protected => Ok(self
                .form
                .committed
                .or(self.form.live)
                .ok_or(ConcurrencyViolation::NoDraft)?),
        }
    }

    /// Submits the draft, releasing protection and removing the pin.
    ///
    /// Returns the coordinate to author the collectible at.
    pub fn submit(
        &mut self,
        registry: &mut MarkerRegistry,
        surface: &mut dyn RenderSurface,
        lifecycle: &MarkerLifecycleManager,
    ) -> Result<Coordinate> {
        let at = self.submission(registry)?;
        self.discard_draft(registry, surface, lifecycle, "submit")?;
        info!(coordinate = %at, "Draft pin submitted");
        Ok(at)
    }

    /// Drops the draft without submitting.
    pub fn cancel(
        &mut self,
        registry: &mut MarkerRegistry,
        surface: &mut dyn RenderSurface,
        lifecycle: &MarkerLifecycleManager,
    ) -> Result<()> {
        self.discard_draft(registry, surface, lifecycle, "cancel")?;
        debug!("Draft pin cancelled");
        Ok(())
    }

    fn discard_draft(
        &mut self,
        registry: &mut MarkerRegistry,
        surface: &mut dyn RenderSurface,
        lifecycle: &MarkerLifecycleManager,
        operation: &str,
    ) -> Result<()> {
        match registry.state(&MarkerKey::Draft) {
            MarkerState::Absent | MarkerState::Removed => {
                return Err(ConcurrencyViolation::NoDraft.into());
            }
            MarkerState::Dragging | MarkerState::Locked => {
                return Err(ConcurrencyViolation::protected("draft", operation).into());
            }
            MarkerState::Protected => lifecycle.release_draft(registry)?,
            MarkerState::Creating | MarkerState::Stable => {}
        }

        self.watchdog = None;
        lifecycle.remove(registry, surface, &MarkerKey::Draft)?;
        self.form.reset();
        Ok(())
    }

    /// Forgets form and watchdog state. Used on session teardown.
    pub fn reset(&mut self) {
        self.watchdog = None;
        self.form.reset();
    }
}

fn draft_handle(registry: &MarkerRegistry) -> Result<crate::surface::MarkerHandle> {
    registry
        .get(&MarkerKey::Draft)
        .map(|m| m.handle())
        .ok_or_else(|| ConcurrencyViolation::NoDraft.into())
}

fn expect_dragging(registry: &MarkerRegistry) -> Result<()> {
    match registry.state(&MarkerKey::Draft) {
        MarkerState::Dragging => Ok(()),
        MarkerState::Absent | MarkerState::Removed => Err(ConcurrencyViolation::NoDraft.into()),
        other => Err(ConcurrencyViolation::IllegalTransition {
            marker: MarkerKey::Draft.to_string(),
            from: other.to_string(),
            to: MarkerState::Dragging.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{RefreshOutcome, SkipReason, Viewport};
    use crate::surface::HeadlessSurface;
    use geodrop_core::config::{ClusterConfig, MarkerConfig};
    use geodrop_core::error::MSG_PIN_ALREADY_PLACED;
    use geodrop_core::types::Collectible;
    use geodrop_geo::cluster::ClusterPolicy;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    struct Fixture {
        pin: PinPlacementController,
        lifecycle: MarkerLifecycleManager,
        registry: MarkerRegistry,
        surface: HeadlessSurface,
        start: Instant,
    }

    impl Fixture {
        fn new() -> Self {
            let metrics = Arc::new(MarkerMetrics::new());
            Self {
                pin: PinPlacementController::new(&PinConfig::default(), metrics.clone()),
                lifecycle: MarkerLifecycleManager::new(
                    &MarkerConfig::default(),
                    ClusterPolicy::new(&ClusterConfig::default()),
                    metrics,
                ),
                registry: MarkerRegistry::new(),
                surface: HeadlessSurface::new(),
                start: Instant::now(),
            }
        }

        fn place(&mut self, lat: f64, lng: f64) -> Result<Coordinate> {
            let now = self.start;
            self.pin
                .place(&mut self.registry, &mut self.surface, &self.lifecycle, lat, lng, now)
        }

        fn drag_to_and_drop(&mut self, lat: f64, lng: f64, at_ms: u64) -> Coordinate {
            self.pin.drag_start(&mut self.registry, &mut self.surface).unwrap();
            self.pin.drag(&self.registry, lat, lng).unwrap();
            let now = self.start + ms(at_ms);
            self.pin
                .drag_end(&mut self.registry, &mut self.surface, lat, lng, now)
                .unwrap()
        }

        fn draft_position(&self) -> Option<Coordinate> {
            let handle = self.surface.handle_for(&MarkerKey::Draft)?;
            self.surface.marker_position(handle)
        }
    }

    #[test]
    fn test_drag_end_commits_dropped_coordinate() {
        let mut f = Fixture::new();
        f.place(10.0, 20.0).unwrap();
        assert_eq!(f.pin.form().coordinate(), Some(Coordinate::new(10.0, 20.0)));

        let committed = f.drag_to_and_drop(10.001, 20.001, 500);
        assert_eq!(committed, Coordinate::new(10.001, 20.001));
        assert_eq!(f.pin.form().committed(), Some(Coordinate::new(10.001, 20.001)));
        assert_eq!(f.pin.form().coordinate(), Some(Coordinate::new(10.001, 20.001)));
        assert_eq!(f.registry.state(&MarkerKey::Draft), MarkerState::Protected);
        assert_eq!(f.draft_position(), Some(Coordinate::new(10.001, 20.001)));
    }

    #[test]
    fn test_invalid_drop_commits_last_drag_position() {
        let mut f = Fixture::new();
        f.place(10.0, 20.0).unwrap();
        f.pin.drag_start(&mut f.registry, &mut f.surface).unwrap();
        f.pin.drag(&f.registry, 10.001, 20.001).unwrap();

        let now = f.start + ms(500);
        let committed = f
            .pin
            .drag_end(&mut f.registry, &mut f.surface, f64::NAN, 20.001, now)
            .unwrap();

        assert_eq!(committed, Coordinate::new(10.001, 20.001));
        assert_eq!(f.pin.form().committed(), Some(Coordinate::new(10.001, 20.001)));
        assert_eq!(f.pin.form().source(), Some(CoordinateSource::Dragged));
        assert_eq!(f.registry.state(&MarkerKey::Draft), MarkerState::Protected);
        assert_eq!(f.draft_position(), Some(Coordinate::new(10.001, 20.001)));
    }

    #[test]
    fn test_invalid_drop_without_drag_keeps_placed_position() {
        let mut f = Fixture::new();
        f.place(10.0, 20.0).unwrap();
        f.pin.drag_start(&mut f.registry, &mut f.surface).unwrap();

        let now = f.start + ms(500);
        let committed = f
            .pin
            .drag_end(&mut f.registry, &mut f.surface, "north", "east", now)
            .unwrap();

        assert_eq!(committed, Coordinate::new(10.0, 20.0));
        assert_eq!(f.pin.form().committed(), Some(Coordinate::new(10.0, 20.0)));
        assert_eq!(f.registry.state(&MarkerKey::Draft), MarkerState::Protected);
        assert_eq!(f.draft_position(), Some(Coordinate::new(10.0, 20.0)));
    }

    #[test]
    fn test_drag_reports_live_without_committing() {
        let mut f = Fixture::new();
        f.place(10.0, 20.0).unwrap();
        f.pin.drag_start(&mut f.registry, &mut f.surface).unwrap();

        let handle = f.surface.handle_for(&MarkerKey::Draft).unwrap();
        assert!(f.surface.marker(handle).unwrap().emphasized);

        f.pin.drag(&f.registry, 10.0005, 20.0005).unwrap();
        let form = f.pin.form();
        assert_eq!(form.coordinate(), Some(Coordinate::new(10.0005, 20.0005)));
        assert!(form.committed().is_none());
        assert_eq!(form.source(), Some(CoordinateSource::Dragged));
    }

    #[test]
    fn test_second_place_rejected_while_committed() {
        let mut f = Fixture::new();
        f.place(10.0, 20.0).unwrap();
        f.drag_to_and_drop(10.001, 20.001, 0);

        let err = f.place(11.0, 21.0).unwrap_err();
        assert_eq!(err.user_message().as_deref(), Some(MSG_PIN_ALREADY_PLACED));
        assert_eq!(f.pin.form().committed(), Some(Coordinate::new(10.001, 20.001)));
        assert_eq!(f.registry.len(), 1);
    }

    #[test]
    fn test_unlocked_draft_moves_on_place() {
        let mut f = Fixture::new();
        f.place(10.0, 20.0).unwrap();
        f.place(11.0, 21.0).unwrap();

        assert_eq!(f.registry.len(), 1);
        assert_eq!(f.draft_position(), Some(Coordinate::new(11.0, 21.0)));
    }

    #[test]
    fn test_place_rejects_invalid_coordinate() {
        let mut f = Fixture::new();
        let err = f.place(f64::NAN, 20.0).unwrap_err();
        assert!(matches!(err, GeoDropError::Input(_)));
        assert!(f.registry.is_empty());
    }

    #[test]
    fn test_watchdog_corrects_drift_within_window() {
        let mut f = Fixture::new();
        f.place(10.0, 20.0).unwrap();
        f.drag_to_and_drop(10.001, 20.001, 0);
        assert!(f.pin.watchdog_active());

        let handle = f.surface.handle_for(&MarkerKey::Draft).unwrap();
        f.surface.nudge(handle, Coordinate::new(10.0, 20.0));

        assert!(!f.pin.tick(&f.registry, &mut f.surface, f.start + ms(50)));
        assert!(f.pin.tick(&f.registry, &mut f.surface, f.start + ms(100)));
        assert_eq!(f.draft_position(), Some(Coordinate::new(10.001, 20.001)));

        // No drift, nothing to do
        assert!(!f.pin.tick(&f.registry, &mut f.surface, f.start + ms(200)));

        // Window over
        f.pin.tick(&f.registry, &mut f.surface, f.start + ms(2_000));
        assert!(!f.pin.watchdog_active());
        f.surface.nudge(handle, Coordinate::new(10.0, 20.0));
        assert!(!f.pin.tick(&f.registry, &mut f.surface, f.start + ms(2_100)));
    }

    #[test]
    fn test_external_move_is_corrected_while_protected() {
        let mut f = Fixture::new();
        f.place(10.0, 20.0).unwrap();
        f.drag_to_and_drop(10.001, 20.001, 0);

        let handle = f.surface.handle_for(&MarkerKey::Draft).unwrap();
        f.surface.nudge(handle, Coordinate::new(9.0, 19.0));
        assert!(f
            .pin
            .notify_external_move(&f.registry, &mut f.surface, Coordinate::new(9.0, 19.0)));
        assert_eq!(f.draft_position(), Some(Coordinate::new(10.001, 20.001)));
        assert!(f.lifecycle.metrics().watchdog_corrections() >= 1);
    }

    #[test]
    fn test_stale_search_result_discarded() {
        let mut f = Fixture::new();
        f.place(10.0, 20.0).unwrap();
        let requested = f.start + ms(10);
        f.drag_to_and_drop(10.001, 20.001, 50);

        let applied = f
            .pin
            .apply_search_result(
                &mut f.registry,
                &mut f.surface,
                &f.lifecycle,
                Coordinate::new(48.85, 2.35),
                requested,
                f.start + ms(60),
            )
            .unwrap();
        assert!(!applied);
        assert_eq!(f.pin.form().coordinate(), Some(Coordinate::new(10.001, 20.001)));
    }

    #[test]
    fn test_search_result_before_commit_moves_draft() {
        let mut f = Fixture::new();
        f.place(10.0, 20.0).unwrap();
        let applied = f
            .pin
            .apply_search_result(
                &mut f.registry,
                &mut f.surface,
                &f.lifecycle,
                Coordinate::new(48.85, 2.35),
                f.start + ms(5),
                f.start + ms(10),
            )
            .unwrap();
        assert!(applied);
        assert_eq!(f.pin.form().source(), Some(CoordinateSource::Search));
        assert_eq!(f.draft_position(), Some(Coordinate::new(48.85, 2.35)));
    }

    #[test]
    fn test_protection_survives_refresh_until_submit() {
        let mut f = Fixture::new();
        f.place(10.0, 20.0).unwrap();
        f.drag_to_and_drop(10.001, 20.001, 0);

        let drops = vec![Collectible::builder().id("a").anchor(Coordinate::new(40.0, -74.0)).build()];
        for i in 1..=3 {
            let outcome = f.lifecycle.bulk_refresh(
                &mut f.registry,
                &mut f.surface,
                &drops,
                Viewport::at_zoom(15.0),
                true,
                f.start + ms(i * 1_000),
            );
            assert_eq!(outcome, RefreshOutcome::Skipped(SkipReason::Protected(MarkerKey::Draft)));
        }

        let submitted = f
            .pin
            .submit(&mut f.registry, &mut f.surface, &f.lifecycle)
            .unwrap();
        assert_eq!(submitted, Coordinate::new(10.001, 20.001));
        assert!(f.registry.is_empty());
        assert!(f.pin.form().coordinate().is_none());

        let outcome = f.lifecycle.bulk_refresh(
            &mut f.registry,
            &mut f.surface,
            &drops,
            Viewport::at_zoom(15.0),
            false,
            f.start + ms(10_000),
        );
        assert!(outcome.is_applied());
    }

    #[test]
    fn test_submit_rejected_while_dragging() {
        let mut f = Fixture::new();
        f.place(10.0, 20.0).unwrap();
        f.pin.drag_start(&mut f.registry, &mut f.surface).unwrap();

        let err = f
            .pin
            .submit(&mut f.registry, &mut f.surface, &f.lifecycle)
            .unwrap_err();
        assert!(matches!(
            err,
            GeoDropError::Concurrency(ConcurrencyViolation::MarkerProtected { .. })
        ));
    }

    #[test]
    fn test_cancel_allows_new_placement() {
        let mut f = Fixture::new();
        f.place(10.0, 20.0).unwrap();
        f.drag_to_and_drop(10.001, 20.001, 0);
        f.pin
            .cancel(&mut f.registry, &mut f.surface, &f.lifecycle)
            .unwrap();
        assert!(!f.pin.watchdog_active());

        f.place(11.0, 21.0).unwrap();
        assert_eq!(f.registry.state(&MarkerKey::Draft), MarkerState::Stable);
    }

    #[test]
    fn test_redrag_after_commit() {
        let mut f = Fixture::new();
        f.place(10.0, 20.0).unwrap();
        f.drag_to_and_drop(10.001, 20.001, 0);
        let second = f.drag_to_and_drop(10.002, 20.002, 500);

        assert_eq!(second, Coordinate::new(10.002, 20.002));
        assert_eq!(f.pin.form().committed(), Some(second));
    }

    #[test]
    fn test_distance_to_target() {
        let mut f = Fixture::new();
        f.pin.set_user_position(Some(Coordinate::new(10.0, 20.0)));
        f.place(10.0, 20.0).unwrap();
        assert_eq!(f.pin.form().distance_to_target_m(), Some(0.0));

        let snapshot = f.pin.form().snapshot();
        assert!(!snapshot.committed);
        assert_eq!(snapshot.validation, Some(ValidationReason::Ok));
    }
}
