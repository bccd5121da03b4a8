//! Rendering surface seam
//!
//! The map engine that draws markers is an external collaborator. The marker
//! pipeline talks to it only through [`RenderSurface`]; [`HeadlessSurface`]
//! is an in-memory implementation for tests and headless hosts.

use crate::state::MarkerKey;
use geodrop_core::error::{GeoDropError, Result, TransientError};
use geodrop_core::types::{CollectibleId, Coordinate, Rarity};
use geodrop_geo::cluster::CameraTarget;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Opaque handle of a rendered element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerHandle(pub u64);

impl fmt::Display for MarkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Visual kind of a marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarkerKind {
    Collectible { rarity: Rarity },
    Cluster { count: usize },
    Draft,
}

/// Everything the surface needs to draw a marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerSpec {
    pub key: MarkerKey,
    pub position: Coordinate,
    pub label: String,
    pub kind: MarkerKind,
    pub draggable: bool,
}

/// What a click on a marker does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClickAction {
    /// Open the detail view for a collectible
    OpenDetail(CollectibleId),
    /// Fly the camera into a cluster
    ZoomToCluster(CameraTarget),
    /// Nothing, used by the draft pin
    None,
}

/// Commands the marker pipeline issues to the map engine.
pub trait RenderSurface {
    /// Returns true once the surface accepts markers.
    fn is_ready(&self) -> bool;

    /// Creates a render element.
    fn create_marker(&mut self, spec: &MarkerSpec) -> Result<MarkerHandle>;

    /// Replaces the content of an existing element in place.
    fn update_marker(&mut self, handle: MarkerHandle, spec: &MarkerSpec) -> Result<()>;

    /// Moves an element.
    fn set_marker_position(&mut self, handle: MarkerHandle, position: Coordinate) -> Result<()>;

    /// Position the surface currently shows for an element.
    fn marker_position(&self, handle: MarkerHandle) -> Option<Coordinate>;

    /// Turns visual emphasis on or off.
    fn set_emphasis(&mut self, handle: MarkerHandle, emphasized: bool) -> Result<()>;

    /// Detaches an element. Unknown handles are ignored.
    fn remove_marker(&mut self, handle: MarkerHandle);

    /// Registers the click-through for an element.
    fn on_click(&mut self, handle: MarkerHandle, action: ClickAction) -> Result<()>;

    /// Animated camera flight.
    fn fly_to(&mut self, target: CameraTarget, duration: Duration);

    /// Short camera pan.
    fn ease_to(&mut self, center: Coordinate, duration: Duration);
}

/// Element state kept by [`HeadlessSurface`].
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessMarker {
    pub spec: MarkerSpec,
    pub position: Coordinate,
    pub emphasized: bool,
    pub click: Option<ClickAction>,
}

/// In-memory surface.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    ready: bool,
    next_handle: u64,
    markers: HashMap<MarkerHandle, HeadlessMarker>,
    camera: Option<CameraTarget>,
    creates: u64,
    updates: u64,
    removes: u64,
}

impl HeadlessSurface {
    /// Creates a surface that is ready immediately.
    pub fn new() -> Self {
        Self {
            ready: true,
            ..Self::default()
        }
    }

    /// Creates a surface that rejects markers until [`set_ready`](Self::set_ready).
    pub fn not_ready() -> Self {
        Self::default()
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn marker(&self, handle: MarkerHandle) -> Option<&HeadlessMarker> {
        self.markers.get(&handle)
    }

    /// Handle of the element drawn for a key.
    pub fn handle_for(&self, key: &MarkerKey) -> Option<MarkerHandle> {
        self.markers
            .iter()
            .find(|(_, m)| &m.spec.key == key)
            .map(|(h, _)| *h)
    }

    /// Number of elements currently drawn.
    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    /// Member counts of all cluster elements, sorted.
    pub fn cluster_counts(&self) -> Vec<usize> {
        let mut counts: Vec<_> = self
            .markers
            .values()
            .filter_map(|m| match m.spec.kind {
                MarkerKind::Cluster { count } => Some(count),
                _ => None,
            })
            .collect();
        counts.sort_unstable();
        counts
    }

    /// Simulates the engine moving an element on its own.
    pub fn nudge(&mut self, handle: MarkerHandle, position: Coordinate) {
        if let Some(marker) = self.markers.get_mut(&handle) {
            marker.position = position;
        }
    }

    /// Simulates a user click and returns the registered action.
    pub fn click(&self, handle: MarkerHandle) -> Option<ClickAction> {
        self.markers.get(&handle).and_then(|m| m.click.clone())
    }

    pub fn camera(&self) -> Option<CameraTarget> {
        self.camera
    }

    /// Total create, update and remove calls received.
    pub fn call_counts(&self) -> (u64, u64, u64) {
        (self.creates, self.updates, self.removes)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.ready {
            Ok(())
        } else {
            Err(TransientError::SurfaceNotReady { attempts: 0 }.into())
        }
    }

    fn get_mut(&mut self, handle: MarkerHandle) -> Result<&mut HeadlessMarker> {
        self.markers
            .get_mut(&handle)
            .ok_or_else(|| GeoDropError::Internal(format!("unknown marker handle {}", handle)))
    }
}

impl RenderSurface for HeadlessSurface {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn create_marker(&mut self, spec: &MarkerSpec) -> Result<MarkerHandle> {
        self.ensure_ready()?;
        self.next_handle += 1;
        let handle = MarkerHandle(self.next_handle);
        self.markers.insert(
            handle,
            HeadlessMarker {
                spec: spec.clone(),
                position: spec.position,
                emphasized: false,
                click: None,
            },
        );
        self.creates += 1;
        Ok(handle)
    }

    fn update_marker(&mut self, handle: MarkerHandle, spec: &MarkerSpec) -> Result<()> {
        self.ensure_ready()?;
        let marker = self.get_mut(handle)?;
        marker.spec = spec.clone();
        marker.position = spec.position;
        self.updates += 1;
        Ok(())
    }

    fn set_marker_position(&mut self, handle: MarkerHandle, position: Coordinate) -> Result<()> {
        let marker = self.get_mut(handle)?;
        marker.position = position;
        marker.spec.position = position;
        Ok(())
    }

    fn marker_position(&self, handle: MarkerHandle) -> Option<Coordinate> {
        self.markers.get(&handle).map(|m| m.position)
    }

    fn set_emphasis(&mut self, handle: MarkerHandle, emphasized: bool) -> Result<()> {
        self.get_mut(handle)?.emphasized = emphasized;
        Ok(())
    }

    fn remove_marker(&mut self, handle: MarkerHandle) {
        if self.markers.remove(&handle).is_some() {
            self.removes += 1;
        }
    }

    fn on_click(&mut self, handle: MarkerHandle, action: ClickAction) -> Result<()> {
        self.get_mut(handle)?.click = Some(action);
        Ok(())
    }

    fn fly_to(&mut self, target: CameraTarget, _duration: Duration) {
        self.camera = Some(target);
    }

    fn ease_to(&mut self, center: Coordinate, _duration: Duration) {
        let zoom = self.camera.map(|c| c.zoom).unwrap_or_default();
        self.camera = Some(CameraTarget { center, zoom });
    }
}
