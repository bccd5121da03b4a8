//! Geofence evaluation
//!
//! Great-circle distance with the haversine formula on a spherical Earth.
//! At pedestrian scale the spherical error is far below GPS accuracy, so no
//! ellipsoidal solver is used.
//!
//! Boundary rule: a user exactly `radius` meters away is inside
//! (`distance <= radius`). A radius of 0 is never satisfied by proximity;
//! such collectibles are only reachable through the authoring flow.

use geodrop_core::types::{Collectible, CollectibleId, Coordinate, UserPosition};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates in meters.
///
/// The result is symmetric in its arguments and never negative.
///
/// # Examples
///
/// ```
/// use geodrop_core::types::Coordinate;
/// use geodrop_geo::geofence::haversine_distance_m;
///
/// let berlin = Coordinate::new(52.5200, 13.4050);
/// let paris = Coordinate::new(48.8566, 2.3522);
/// let d = haversine_distance_m(&berlin, &paris);
/// assert!((d - 878_000.0).abs() < 10_000.0);
/// ```
pub fn haversine_distance_m(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let half_dlat = ((b.lat - a.lat).abs().to_radians() / 2.0).sin();
    let half_dlng = ((b.lng - a.lng).abs().to_radians() / 2.0).sin();

    let h = half_dlat * half_dlat + lat1.cos() * lat2.cos() * half_dlng * half_dlng;
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    (EARTH_RADIUS_M * c).max(0.0)
}

/// Result of checking one position against one geofence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeofenceCheck {
    pub distance_m: f64,
    pub within_radius: bool,
}

/// Checks a position against an anchor and radius.
pub fn check(user: &Coordinate, anchor: &Coordinate, radius_m: u32) -> GeofenceCheck {
    let distance_m = haversine_distance_m(user, anchor);
    GeofenceCheck {
        distance_m,
        within_radius: radius_m > 0 && distance_m <= radius_m as f64,
    }
}

/// Cached collectability for the collectibles on the map.
///
/// Eligibility is recomputed only when the user's position changes; newly
/// tracked collectibles are evaluated once against the current position.
#[derive(Debug, Default)]
pub struct GeofenceEngine {
    position: Option<Coordinate>,
    anchors: HashMap<CollectibleId, (Coordinate, u32)>,
    results: HashMap<CollectibleId, GeofenceCheck>,
    recomputations: u64,
}

impl GeofenceEngine {
    /// Creates an engine with no position and no tracked collectibles.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last position used for evaluation.
    pub fn position(&self) -> Option<Coordinate> {
        self.position
    }

    /// Number of full recomputations performed so far.
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }

    /// Replaces the tracked set.
    ///
    /// Entries for collectibles already tracked at the same anchor and
    /// radius keep their cached result; only new or moved ones are
    /// evaluated. Collectibles no longer present are forgotten.
    pub fn track(&mut self, collectibles: &[Collectible]) {
        let mut anchors = HashMap::with_capacity(collectibles.len());
        for c in collectibles {
            anchors.insert(c.id.clone(), (c.anchor, c.radius_m));
        }

        self.results.retain(|id, _| anchors.contains_key(id));

        if let Some(position) = self.position {
            for (id, (anchor, radius)) in &anchors {
                let unchanged = self.anchors.get(id) == Some(&(*anchor, *radius));
                if !unchanged || !self.results.contains_key(id) {
                    self.results.insert(id.clone(), check(&position, anchor, *radius));
                }
            }
        }

        self.anchors = anchors;
    }

    /// Feeds a new position fix.
    ///
    /// Returns true if the coordinate changed and eligibility was recomputed.
    pub fn update_position(&mut self, position: &UserPosition) -> bool {
        if self.position == Some(position.coordinate) {
            return false;
        }
        self.position = Some(position.coordinate);
        self.recompute();
        true
    }

    fn recompute(&mut self) {
        let Some(position) = self.position else {
            return;
        };
        self.results.clear();
        for (id, (anchor, radius)) in &self.anchors {
            self.results.insert(id.clone(), check(&position, anchor, *radius));
        }
        self.recomputations += 1;
        debug!(
            tracked = self.anchors.len(),
            eligible = self.results.values().filter(|r| r.within_radius).count(),
            "Recomputed geofence eligibility"
        );
    }

    /// Cached check for a collectible.
    pub fn check_for(&self, id: &CollectibleId) -> Option<GeofenceCheck> {
        self.results.get(id).copied()
    }

    /// Returns true if the collectible can be collected from the last position.
    pub fn is_collectible(&self, id: &CollectibleId) -> bool {
        self.results
            .get(id)
            .map(|r| r.within_radius)
            .unwrap_or(false)
    }

    /// Ids currently within their geofence.
    pub fn eligible(&self) -> Vec<CollectibleId> {
        let mut ids: Vec<_> = self
            .results
            .iter()
            .filter(|(_, r)| r.within_radius)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Distance from the last position to an arbitrary target.
    pub fn distance_to(&self, target: &Coordinate) -> Option<f64> {
        self.position.map(|p| haversine_distance_m(&p, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drop_at(id: &str, lat: f64, lng: f64, radius_m: u32) -> Collectible {
        Collectible::builder()
            .id(id)
            .anchor(Coordinate::new(lat, lng))
            .radius_m(radius_m)
            .build()
    }

    #[test]
    fn test_identical_coordinates() {
        let p = Coordinate::new(40.0, -74.0);
        let result = check(&p, &p, 10);
        assert_eq!(result.distance_m, 0.0);
        assert!(result.within_radius);
    }

    #[test]
    fn test_symmetry_and_zero() {
        let points = [
            Coordinate::new(0.0, 0.0),
            Coordinate::new(40.7128, -74.0060),
            Coordinate::new(-33.8688, 151.2093),
            Coordinate::new(89.9, 179.9),
            Coordinate::new(-90.0, -180.0),
            Coordinate::new(10.0, 20.0),
        ];
        for a in &points {
            assert_eq!(haversine_distance_m(a, a), 0.0);
            for b in &points {
                let ab = haversine_distance_m(a, b);
                let ba = haversine_distance_m(b, a);
                assert_eq!(ab, ba);
                assert!(ab >= 0.0);
            }
        }
    }

    #[test]
    fn test_antipodal_is_half_circumference() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 180.0);
        let d = haversine_distance_m(&a, &b);
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1e-3);
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let user = Coordinate::new(0.0, 0.0);
        let anchor = Coordinate::new(0.0, 0.001);
        // ~111.19m: inside at 112, outside at 111
        assert!(check(&user, &anchor, 112).within_radius);
        assert!(!check(&user, &anchor, 111).within_radius);
    }

    #[test]
    fn test_integer_radius_on_boundary() {
        // One degree of latitude over 1/360 of the circumference
        let user = Coordinate::new(0.0, 0.0);
        let meters_per_deg = std::f64::consts::PI * EARTH_RADIUS_M / 180.0;
        let lat = 100.0 / meters_per_deg;
        let result = check(&user, &Coordinate::new(lat, 0.0), 100);
        assert!((result.distance_m - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_radius_never_by_proximity() {
        let p = Coordinate::new(51.5, -0.12);
        let result = check(&p, &p, 0);
        assert_eq!(result.distance_m, 0.0);
        assert!(!result.within_radius);
    }

    #[test]
    fn test_engine_recomputes_only_on_move() {
        let mut engine = GeofenceEngine::new();
        engine.track(&[drop_at("a", 40.0, -74.0, 10), drop_at("b", 41.0, -74.0, 10)]);
        assert!(engine.check_for(&"a".into()).is_none());

        let here = UserPosition::new(40.0, -74.0, 5.0);
        assert!(engine.update_position(&here));
        assert_eq!(engine.recomputations(), 1);
        assert!(engine.is_collectible(&"a".into()));
        assert!(!engine.is_collectible(&"b".into()));

        // Same fix again, e.g. on a re-render
        assert!(!engine.update_position(&here));
        assert_eq!(engine.recomputations(), 1);

        let moved = UserPosition::new(41.0, -74.0, 5.0);
        assert!(engine.update_position(&moved));
        assert_eq!(engine.recomputations(), 2);
        assert_eq!(engine.eligible(), vec![CollectibleId::from("b")]);
    }

    #[test]
    fn test_track_evaluates_new_entries_without_full_recompute() {
        let mut engine = GeofenceEngine::new();
        engine.update_position(&UserPosition::new(40.0, -74.0, 5.0));
        let before = engine.recomputations();

        engine.track(&[drop_at("a", 40.0, -74.0, 10)]);
        assert!(engine.is_collectible(&"a".into()));
        assert_eq!(engine.recomputations(), before);

        engine.track(&[]);
        assert!(engine.check_for(&"a".into()).is_none());
    }

    #[test]
    fn test_distance_to() {
        let mut engine = GeofenceEngine::new();
        assert!(engine.distance_to(&Coordinate::new(0.0, 0.0)).is_none());
        engine.update_position(&UserPosition::new(10.0, 20.0, 1.0));
        assert_eq!(engine.distance_to(&Coordinate::new(10.0, 20.0)), Some(0.0));
    }
}
