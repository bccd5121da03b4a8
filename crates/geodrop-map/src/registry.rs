//! Session-owned marker registry
//!
//! Maps marker keys to render handles and lifecycle state. Only the lifecycle
//! manager and the pin controller hold `&mut` access, and every state change
//! goes through [`MarkerRegistry::transition`].

use crate::state::{check_transition, MarkerKey, MarkerState, Owner};
use crate::surface::{ClickAction, MarkerHandle, RenderSurface};
use geodrop_core::error::ConcurrencyViolation;
use geodrop_core::types::Coordinate;
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

/// A rendered marker.
#[derive(Debug, Clone)]
pub struct Marker {
    key: MarkerKey,
    handle: MarkerHandle,
    state: MarkerState,
    last_updated: Instant,
    fingerprint: u64,
    position: Coordinate,
    click: ClickAction,
}

impl Marker {
    pub fn key(&self) -> &MarkerKey {
        &self.key
    }

    pub fn handle(&self) -> MarkerHandle {
        self.handle
    }

    pub fn state(&self) -> MarkerState {
        self.state
    }

    pub fn last_updated(&self) -> Instant {
        self.last_updated
    }

    /// Hash of the content last rendered.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Position last rendered.
    pub fn position(&self) -> Coordinate {
        self.position
    }

    /// Click-through wired for this marker.
    pub fn click(&self) -> &ClickAction {
        &self.click
    }
}

/// Registry of live markers for one map session.
#[derive(Debug, Default)]
pub struct MarkerRegistry {
    markers: HashMap<MarkerKey, Marker>,
}

impl MarkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn get(&self, key: &MarkerKey) -> Option<&Marker> {
        self.markers.get(key)
    }

    pub fn contains(&self, key: &MarkerKey) -> bool {
        self.markers.contains_key(key)
    }

    /// State of a marker, `Absent` if unknown.
    pub fn state(&self, key: &MarkerKey) -> MarkerState {
        self.markers
            .get(key)
            .map(|m| m.state)
            .unwrap_or(MarkerState::Absent)
    }

    /// Keys of all registered markers, sorted.
    pub fn keys(&self) -> Vec<MarkerKey> {
        let mut keys: Vec<_> = self.markers.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// First protected marker, if any.
    pub fn first_protected(&self) -> Option<&MarkerKey> {
        self.markers
            .values()
            .find(|m| m.state.is_protected())
            .map(|m| &m.key)
    }

    /// Marker owning a render handle.
    pub fn find_by_handle(&self, handle: MarkerHandle) -> Option<&Marker> {
        self.markers.values().find(|m| m.handle == handle)
    }

    /// Registers a freshly created render element in `Creating`.
    pub(crate) fn insert_creating(
        &mut self,
        key: MarkerKey,
        handle: MarkerHandle,
        position: Coordinate,
        fingerprint: u64,
        click: ClickAction,
        now: Instant,
    ) -> Result<(), ConcurrencyViolation> {
        check_transition(&key, Owner::Lifecycle, self.state(&key), MarkerState::Creating)?;
        self.markers.insert(
            key.clone(),
            Marker {
                key,
                handle,
                state: MarkerState::Creating,
                last_updated: now,
                fingerprint,
                position,
                click,
            },
        );
        Ok(())
    }

    /// Applies a state change through the transition table.
    ///
    /// Returns the previous state. A transition to `Removed` drops the entry;
    /// the caller detaches the render handle.
    pub(crate) fn transition(
        &mut self,
        key: &MarkerKey,
        owner: Owner,
        to: MarkerState,
    ) -> Result<MarkerState, ConcurrencyViolation> {
        let from = self.state(key);
        check_transition(key, owner, from, to)?;

        if to == MarkerState::Removed {
            self.markers.remove(key);
        } else if let Some(marker) = self.markers.get_mut(key) {
            marker.state = to;
        }

        debug!(marker = %key, %from, %to, %owner, "Marker transition");
        Ok(from)
    }

    /// Records new rendered content.
    pub(crate) fn stamp(
        &mut self,
        key: &MarkerKey,
        position: Coordinate,
        fingerprint: u64,
        click: ClickAction,
        now: Instant,
    ) {
        if let Some(marker) = self.markers.get_mut(key) {
            marker.position = position;
            marker.fingerprint = fingerprint;
            marker.click = click;
            marker.last_updated = now;
        }
    }

    /// Records a new rendered position without touching content.
    pub(crate) fn set_position(&mut self, key: &MarkerKey, position: Coordinate, now: Instant) {
        if let Some(marker) = self.markers.get_mut(key) {
            marker.position = position;
            marker.last_updated = now;
        }
    }

    /// Releases every entry and its render handle.
    ///
    /// Runs when the owning view closes; protection does not apply.
    pub fn teardown(&mut self, surface: &mut dyn RenderSurface) -> usize {
        let count = self.markers.len();
        for (_, marker) in self.markers.drain() {
            surface.remove_marker(marker.handle);
        }
        if count > 0 {
            debug!(released = count, "Marker registry torn down");
        }
        count
    }
}
