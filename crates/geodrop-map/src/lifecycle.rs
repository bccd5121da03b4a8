//! Marker lifecycle manager
//!
//! Reconciles the registry against the nearby result set. A refresh never
//! clears and recreates: new collectibles are created, changed ones are
//! updated in place, fresh ones are kept and vanished ones are removed.
//!
//! A refresh is a strict no-op while any marker is protected or the user is
//! moving the viewport. Requests arriving inside the debounce window replace
//! one pending request that [`MarkerLifecycleManager::tick`] flushes when the
//! window expires. If the surface is not ready the request is deferred on a
//! bounded backoff and dropped once the attempts run out.

use crate::metrics::MarkerMetrics;
use crate::registry::MarkerRegistry;
use crate::retry::RetryState;
use crate::state::{check_transition, MarkerKey, MarkerState, Owner};
use crate::surface::{ClickAction, MarkerHandle, MarkerKind, MarkerSpec, RenderSurface};
use geodrop_core::config::MarkerConfig;
use geodrop_core::error::{ConcurrencyViolation, GeoDropError, InputError, Result, TransientError};
use geodrop_core::types::{Collectible, CollectibleId, Coordinate};
use geodrop_geo::cluster::{Cluster, ClusterPolicy};
use geodrop_geo::validate::validate_collectible;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Camera state relevant to refresh decisions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub zoom: f64,
    /// User is panning or zooming
    pub interacting: bool,
}

impl Viewport {
    pub fn at_zoom(zoom: f64) -> Self {
        Self {
            zoom,
            interacting: false,
        }
    }
}

/// Why a refresh request did not render.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// A marker is dragging, locked or protected
    Protected(MarkerKey),
    /// The user is moving the viewport
    ViewportBusy,
    /// Held until the debounce window expires
    Debounced,
    /// Same input as the last applied pass
    Duplicate,
    /// Waiting for the surface to become ready
    Deferred,
    /// The surface never became ready
    SurfaceUnavailable(TransientError),
}

/// Marker changes made by one refresh pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub preserved: usize,
}

/// Result of a refresh request.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Applied(RefreshReport),
    Skipped(SkipReason),
}

impl RefreshOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, RefreshOutcome::Applied(_))
    }
}

/// Result of a single create-or-update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
    /// Drawn as part of a cluster marker
    Clustered,
    /// Queued until the surface is ready
    Deferred,
    /// The marker is protected
    Rejected(ConcurrencyViolation),
    /// The collectible failed validation
    Invalid(InputError),
}

#[derive(Debug, Clone)]
struct RefreshRequest {
    collectibles: Vec<Collectible>,
    zoom: f64,
    force: bool,
    input: u64,
}

impl RefreshRequest {
    fn new(collectibles: &[Collectible], zoom: f64, force: bool) -> Self {
        let mut hasher = DefaultHasher::new();
        zoom.to_bits().hash(&mut hasher);
        for c in collectibles {
            collectible_fingerprint(c).hash(&mut hasher);
        }
        Self {
            collectibles: collectibles.to_vec(),
            zoom,
            force,
            input: hasher.finish(),
        }
    }
}

/// Content hash of what a collectible marker renders.
pub fn collectible_fingerprint(c: &Collectible) -> u64 {
    let mut hasher = DefaultHasher::new();
    c.id.hash(&mut hasher);
    c.name.hash(&mut hasher);
    c.anchor.lat.to_bits().hash(&mut hasher);
    c.anchor.lng.to_bits().hash(&mut hasher);
    c.radius_m.hash(&mut hasher);
    c.rarity.hash(&mut hasher);
    c.collection.hash(&mut hasher);
    c.media_uri.hash(&mut hasher);
    hasher.finish()
}

fn cluster_fingerprint(cluster: &Cluster) -> u64 {
    let mut hasher = DefaultHasher::new();
    cluster.members().hash(&mut hasher);
    cluster.centroid().lat.to_bits().hash(&mut hasher);
    cluster.centroid().lng.to_bits().hash(&mut hasher);
    hasher.finish()
}

/// One marker the current pass wants on the map.
struct Desired {
    spec: MarkerSpec,
    fingerprint: u64,
    click: ClickAction,
}

fn collectible_spec(c: &Collectible) -> Desired {
    let label = if c.name.is_empty() {
        c.id.to_string()
    } else {
        c.name.clone()
    };
    Desired {
        spec: MarkerSpec {
            key: MarkerKey::Collectible(c.id.clone()),
            position: c.anchor,
            label,
            kind: MarkerKind::Collectible { rarity: c.rarity },
            draggable: false,
        },
        fingerprint: collectible_fingerprint(c),
        click: ClickAction::OpenDetail(c.id.clone()),
    }
}

/// Owns creation, update and removal of markers.
#[derive(Debug)]
pub struct MarkerLifecycleManager {
    debounce: Duration,
    grace: Duration,
    policy: ClusterPolicy,
    retry: RetryState,
    metrics: Arc<MarkerMetrics>,
    last_applied_at: Option<Instant>,
    last_applied_input: Option<u64>,
    pending: Option<(RefreshRequest, Instant)>,
    deferred: Option<RefreshRequest>,
    deferred_upserts: Vec<(Collectible, bool)>,
    /// Members of the clusters drawn by the last applied pass
    clustered: HashSet<CollectibleId>,
    last_error: Option<TransientError>,
}

impl MarkerLifecycleManager {
    pub fn new(config: &MarkerConfig, policy: ClusterPolicy, metrics: Arc<MarkerMetrics>) -> Self {
        Self {
            debounce: config.debounce(),
            grace: config.grace(),
            policy,
            retry: RetryState::new(config.retry.clone()),
            metrics,
            last_applied_at: None,
            last_applied_input: None,
            pending: None,
            deferred: None,
            deferred_upserts: Vec::new(),
            clustered: HashSet::new(),
            last_error: None,
        }
    }

    pub fn policy(&self) -> &ClusterPolicy {
        &self.policy
    }

    pub fn metrics(&self) -> &MarkerMetrics {
        &self.metrics
    }

    /// Returns true while a debounced request waits for its window.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Returns true while work waits for the surface.
    pub fn has_deferred(&self) -> bool {
        self.deferred.is_some() || !self.deferred_upserts.is_empty()
    }

    /// Last surface failure that was given up on.
    pub fn last_error(&self) -> Option<&TransientError> {
        self.last_error.as_ref()
    }

    /// Creates or refreshes the marker of one collectible.
    ///
    /// A live marker whose rendered content matches is left alone unless
    /// `force` is set. Invalid anchors and protected markers are logged and
    /// reported in the outcome, never returned as errors. A collectible that
    /// the last applied pass folded into a cluster gets no marker of its own.
    pub fn create_or_update(
        &mut self,
        registry: &mut MarkerRegistry,
        surface: &mut dyn RenderSurface,
        collectible: &Collectible,
        force: bool,
        now: Instant,
    ) -> Result<UpsertOutcome> {
        let collectible = match validate_collectible(collectible.clone()) {
            Ok(c) => c,
            Err(e) => {
                warn!(id = %collectible.id, error = %e, "Discarding collectible with invalid anchor");
                return Ok(UpsertOutcome::Invalid(e));
            }
        };

        let key = MarkerKey::Collectible(collectible.id.clone());
        if registry.state(&key).is_protected() {
            let violation = ConcurrencyViolation::protected(key.to_string(), "create_or_update");
            self.discard(&violation);
            return Ok(UpsertOutcome::Rejected(violation));
        }

        if self.clustered.contains(&collectible.id) && !registry.contains(&key) {
            debug!(id = %collectible.id, "Collectible drawn by a cluster marker");
            return Ok(UpsertOutcome::Clustered);
        }

        if !surface.is_ready() {
            self.deferred_upserts.retain(|(c, _)| c.id != collectible.id);
            self.deferred_upserts.push((collectible, force));
            self.defer_retry(now);
            return Ok(UpsertOutcome::Deferred);
        }

        let desired = collectible_spec(&collectible);
        match registry.get(&key) {
            Some(marker) if marker.fingerprint() == desired.fingerprint && !force => {
                Ok(UpsertOutcome::Unchanged)
            }
            Some(marker) => {
                let handle = marker.handle();
                self.update(registry, surface, handle, desired, now)?;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                self.create(registry, surface, desired, now)?;
                Ok(UpsertOutcome::Created)
            }
        }
    }

    /// Reconciles the map against a new nearby result set.
    pub fn bulk_refresh(
        &mut self,
        registry: &mut MarkerRegistry,
        surface: &mut dyn RenderSurface,
        collectibles: &[Collectible],
        viewport: Viewport,
        force: bool,
        now: Instant,
    ) -> RefreshOutcome {
        if let Some(key) = registry.first_protected() {
            let key = key.clone();
            debug!(marker = %key, "Bulk refresh skipped, marker protected");
            self.metrics.record_refresh_skipped("protected");
            return RefreshOutcome::Skipped(SkipReason::Protected(key));
        }

        if viewport.interacting {
            debug!("Bulk refresh skipped, viewport under user control");
            self.metrics.record_refresh_skipped("viewport_busy");
            return RefreshOutcome::Skipped(SkipReason::ViewportBusy);
        }

        let request = RefreshRequest::new(collectibles, viewport.zoom, force);

        let in_window = self
            .last_applied_at
            .is_some_and(|at| now.duration_since(at) < self.debounce);
        if in_window || self.pending.is_some() {
            let due = now + self.debounce;
            if self.pending.replace((request, due)).is_some() {
                debug!("Pending refresh replaced");
            }
            self.metrics.record_refresh_skipped("debounced");
            return RefreshOutcome::Skipped(SkipReason::Debounced);
        }

        self.apply(registry, surface, request, now)
    }

    /// Runs due retries and flushes a due debounced request.
    ///
    /// Returns the outcome if a refresh was attempted.
    pub fn tick(
        &mut self,
        registry: &mut MarkerRegistry,
        surface: &mut dyn RenderSurface,
        viewport: Viewport,
        now: Instant,
    ) -> Option<RefreshOutcome> {
        if self.retry.is_due(now) {
            if let Some(outcome) = self.retry_deferred(registry, surface, now) {
                return Some(outcome);
            }
        }

        let due = self.pending.as_ref().map(|(_, due)| *due)?;
        if now < due {
            return None;
        }

        if let Some(key) = registry.first_protected() {
            let key = key.clone();
            self.pending = None;
            debug!(marker = %key, "Pending refresh dropped, marker protected");
            self.metrics.record_refresh_skipped("protected");
            return Some(RefreshOutcome::Skipped(SkipReason::Protected(key)));
        }

        if viewport.interacting {
            return None;
        }

        let (request, _) = self.pending.take()?;
        if !request.force && self.last_applied_input == Some(request.input) {
            debug!("Pending refresh matches last pass, dropped");
            self.metrics.record_refresh_skipped("duplicate");
            return Some(RefreshOutcome::Skipped(SkipReason::Duplicate));
        }

        Some(self.apply(registry, surface, request, now))
    }

    fn retry_deferred(
        &mut self,
        registry: &mut MarkerRegistry,
        surface: &mut dyn RenderSurface,
        now: Instant,
    ) -> Option<RefreshOutcome> {
        if !surface.is_ready() {
            return match self.retry.schedule(now) {
                Ok(_) => {
                    self.metrics.record_surface_retry();
                    None
                }
                Err(e) => Some(self.give_up(e)),
            };
        }

        info!(attempts = self.retry.attempts(), "Rendering surface ready");
        self.retry.reset();

        for (collectible, force) in std::mem::take(&mut self.deferred_upserts) {
            if let Err(e) = self.create_or_update(registry, surface, &collectible, force, now) {
                warn!(id = %collectible.id, error = %e, "Deferred marker failed");
            }
        }

        // Back through the regular guards on this tick
        if let Some(request) = self.deferred.take() {
            self.pending = Some((request, now));
        }
        None
    }

    fn give_up(&mut self, error: TransientError) -> RefreshOutcome {
        warn!(error = %error, "Continuing without markers");
        self.deferred = None;
        self.deferred_upserts.clear();
        self.last_error = Some(error.clone());
        self.retry.reset();
        RefreshOutcome::Skipped(SkipReason::SurfaceUnavailable(error))
    }

    fn defer_retry(&mut self, now: Instant) {
        if self.retry.is_pending() {
            return;
        }
        match self.retry.schedule(now) {
            Ok(_) => self.metrics.record_surface_retry(),
            Err(e) => {
                self.give_up(e);
            }
        }
    }

    fn apply(
        &mut self,
        registry: &mut MarkerRegistry,
        surface: &mut dyn RenderSurface,
        request: RefreshRequest,
        now: Instant,
    ) -> RefreshOutcome {
        if !surface.is_ready() {
            self.deferred = Some(request);
            self.defer_retry(now);
            self.metrics.record_refresh_skipped("deferred");
            return match &self.last_error {
                Some(e) if self.deferred.is_none() => {
                    RefreshOutcome::Skipped(SkipReason::SurfaceUnavailable(e.clone()))
                }
                _ => RefreshOutcome::Skipped(SkipReason::Deferred),
            };
        }

        match self.reconcile(registry, surface, &request, now) {
            Ok(report) => {
                self.last_applied_at = Some(now);
                self.last_applied_input = Some(request.input);
                self.last_error = None;
                self.metrics.record_refresh_applied();
                info!(
                    created = report.created,
                    updated = report.updated,
                    removed = report.removed,
                    preserved = report.preserved,
                    "Markers refreshed"
                );
                RefreshOutcome::Applied(report)
            }
            Err(e) => {
                warn!(error = %e, "Refresh interrupted, surface went away");
                self.deferred = Some(request);
                self.defer_retry(now);
                RefreshOutcome::Skipped(SkipReason::Deferred)
            }
        }
    }

    fn reconcile(
        &mut self,
        registry: &mut MarkerRegistry,
        surface: &mut dyn RenderSurface,
        request: &RefreshRequest,
        now: Instant,
    ) -> std::result::Result<RefreshReport, TransientError> {
        let mut valid = Vec::with_capacity(request.collectibles.len());
        for c in &request.collectibles {
            match validate_collectible(c.clone()) {
                Ok(c) => valid.push(c),
                Err(e) => warn!(id = %c.id, error = %e, "Discarding collectible with invalid anchor"),
            }
        }

        let plan = self.policy.plan(&valid, request.zoom);
        let mut desired: Vec<Desired> = plan.singles.iter().map(collectible_spec).collect();
        for cluster in &plan.clusters {
            desired.push(Desired {
                spec: MarkerSpec {
                    key: MarkerKey::Cluster(cluster.key()),
                    position: cluster.centroid(),
                    label: cluster.len().to_string(),
                    kind: MarkerKind::Cluster {
                        count: cluster.len(),
                    },
                    draggable: false,
                },
                fingerprint: cluster_fingerprint(cluster),
                click: ClickAction::ZoomToCluster(self.policy.fly_to(cluster)),
            });
        }

        let wanted: HashSet<MarkerKey> = desired.iter().map(|d| d.spec.key.clone()).collect();
        let mut report = RefreshReport::default();

        for key in registry.keys() {
            if key.is_draft() || wanted.contains(&key) {
                continue;
            }
            if self.remove(registry, surface, &key).unwrap_or(false) {
                report.removed += 1;
            }
        }

        for item in desired {
            let result = match registry.get(&item.spec.key) {
                None => self.create(registry, surface, item, now).map(|_| report.created += 1),
                Some(marker) => {
                    let changed = marker.fingerprint() != item.fingerprint;
                    let in_grace = now.duration_since(marker.last_updated()) < self.grace;
                    if changed || (request.force && !in_grace) {
                        let handle = marker.handle();
                        self.update(registry, surface, handle, item, now)
                            .map(|_| report.updated += 1)
                    } else {
                        report.preserved += 1;
                        Ok(())
                    }
                }
            };

            match result {
                Ok(()) => {}
                Err(GeoDropError::Transient(e)) => return Err(e),
                Err(e) => warn!(error = %e, "Marker render failed"),
            }
        }

        self.clustered = plan
            .clusters
            .iter()
            .flat_map(|cluster| cluster.members().iter().cloned())
            .collect();
        Ok(report)
    }

    fn create(
        &self,
        registry: &mut MarkerRegistry,
        surface: &mut dyn RenderSurface,
        desired: Desired,
        now: Instant,
    ) -> Result<MarkerHandle> {
        let Desired {
            spec,
            fingerprint,
            click,
        } = desired;
        let key = spec.key.clone();
        check_transition(&key, Owner::Lifecycle, registry.state(&key), MarkerState::Creating)?;

        let handle = surface.create_marker(&spec)?;
        let wired = surface.on_click(handle, click.clone()).and_then(|_| {
            registry
                .insert_creating(key.clone(), handle, spec.position, fingerprint, click, now)
                .map_err(GeoDropError::from)
        });
        if let Err(e) = wired {
            surface.remove_marker(handle);
            return Err(e);
        }

        registry.transition(&key, Owner::Lifecycle, MarkerState::Stable)?;
        self.metrics.record_created();
        Ok(handle)
    }

    fn update(
        &self,
        registry: &mut MarkerRegistry,
        surface: &mut dyn RenderSurface,
        handle: MarkerHandle,
        desired: Desired,
        now: Instant,
    ) -> Result<()> {
        surface.update_marker(handle, &desired.spec)?;
        surface.on_click(handle, desired.click.clone())?;
        registry.stamp(
            &desired.spec.key,
            desired.spec.position,
            desired.fingerprint,
            desired.click,
            now,
        );
        self.metrics.record_updated();
        Ok(())
    }

    /// Detaches a marker and deletes its registry entry.
    ///
    /// Returns false if no such marker exists. Protected markers are left in
    /// place and the violation is returned.
    pub fn remove(
        &self,
        registry: &mut MarkerRegistry,
        surface: &mut dyn RenderSurface,
        key: &MarkerKey,
    ) -> std::result::Result<bool, ConcurrencyViolation> {
        let Some(marker) = registry.get(key) else {
            return Ok(false);
        };
        if marker.state().is_protected() {
            let violation = ConcurrencyViolation::protected(key.to_string(), "remove");
            self.discard(&violation);
            return Err(violation);
        }

        let handle = marker.handle();
        registry.transition(key, Owner::Lifecycle, MarkerState::Removed)?;
        surface.remove_marker(handle);
        self.metrics.record_removed();
        Ok(true)
    }

    /// Creates the draft pin marker.
    pub fn create_draft(
        &self,
        registry: &mut MarkerRegistry,
        surface: &mut dyn RenderSurface,
        at: Coordinate,
        now: Instant,
    ) -> Result<MarkerHandle> {
        let desired = Desired {
            spec: MarkerSpec {
                key: MarkerKey::Draft,
                position: at,
                label: "new collectible".to_string(),
                kind: MarkerKind::Draft,
                draggable: true,
            },
            fingerprint: 0,
            click: ClickAction::None,
        };
        self.create(registry, surface, desired, now)
    }

    /// Moves an unlocked draft.
    pub fn move_draft(
        &self,
        registry: &mut MarkerRegistry,
        surface: &mut dyn RenderSurface,
        at: Coordinate,
        now: Instant,
    ) -> Result<()> {
        let marker = registry.get(&MarkerKey::Draft).ok_or(ConcurrencyViolation::NoDraft)?;
        if marker.state() != MarkerState::Stable {
            return Err(ConcurrencyViolation::protected("draft", "move").into());
        }
        surface.set_marker_position(marker.handle(), at)?;
        registry.set_position(&MarkerKey::Draft, at, now);
        Ok(())
    }

    /// Ends the draft's protection.
    pub fn release_draft(&self, registry: &mut MarkerRegistry) -> std::result::Result<(), ConcurrencyViolation> {
        registry.transition(&MarkerKey::Draft, Owner::Lifecycle, MarkerState::Stable)?;
        Ok(())
    }

    fn discard(&self, violation: &ConcurrencyViolation) {
        debug!(%violation, "Mutation discarded");
        self.metrics.record_violation();
    }
}
