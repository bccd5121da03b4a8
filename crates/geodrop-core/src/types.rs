//! Core types for the GeoDrop collectible map.
//!
//! This module defines the fundamental types shared by every crate in the
//! workspace: collectible identifiers, coordinates, rarity tiers, the
//! collectible record itself and the user's captured position.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a collectible as assigned by the collectible directory.
///
/// The directory owns the id space; this core only compares and displays ids.
///
/// # Examples
///
/// ```
/// use geodrop_core::types::CollectibleId;
///
/// let id = CollectibleId::from("drop-42");
/// assert_eq!(id.to_string(), "drop-42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectibleId(String);

impl CollectibleId {
    /// Creates an id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectibleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CollectibleId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CollectibleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u32> for CollectibleId {
    fn from(token_id: u32) -> Self {
        Self(token_id.to_string())
    }
}

/// A geographic coordinate in decimal degrees.
///
/// A `Coordinate` carries no range guarantee by itself; values coming from
/// outside the process must pass through the coordinate validator first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees (-90 to 90)
    pub lat: f64,
    /// Longitude in degrees (-180 to 180)
    pub lng: f64,
}

impl Coordinate {
    /// Creates a new coordinate.
    #[inline]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Returns true if both axes are finite and inside the WGS84 ranges.
    #[inline]
    pub fn is_in_range(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && self.lat.abs() <= 90.0
            && self.lng.abs() <= 180.0
    }

    /// Planar distance in degrees, used by the clustering policy.
    #[inline]
    pub fn degree_distance(&self, other: &Coordinate) -> f64 {
        let dlat = self.lat - other.lat;
        let dlng = self.lng - other.lng;
        (dlat * dlat + dlng * dlng).sqrt()
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// Rarity tier of a collectible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    #[default]
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rarity::Common => write!(f, "common"),
            Rarity::Uncommon => write!(f, "uncommon"),
            Rarity::Rare => write!(f, "rare"),
            Rarity::Epic => write!(f, "epic"),
            Rarity::Legendary => write!(f, "legendary"),
        }
    }
}

/// A location-anchored collectible.
///
/// # Examples
///
/// ```
/// use geodrop_core::types::{Collectible, Coordinate, Rarity};
///
/// let drop = Collectible::builder()
///     .id("drop-1")
///     .anchor(Coordinate::new(40.0, -74.0))
///     .radius_m(25)
///     .rarity(Rarity::Rare)
///     .build();
///
/// assert_eq!(drop.radius_m, 25);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collectible {
    /// Directory-assigned identifier
    pub id: CollectibleId,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Anchor coordinate of the geofence
    pub anchor: Coordinate,

    /// Geofence radius in meters
    pub radius_m: u32,

    /// Rarity tier
    #[serde(default)]
    pub rarity: Rarity,

    /// Collection reference (contract or collection symbol)
    #[serde(default)]
    pub collection: String,

    /// Media reference (image or model URI)
    #[serde(default)]
    pub media_uri: String,

    /// When the collectible was minted, if known
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Collectible {
    /// Creates a new builder for Collectible.
    pub fn builder() -> CollectibleBuilder {
        CollectibleBuilder::default()
    }
}

/// Builder for Collectible.
#[derive(Default)]
pub struct CollectibleBuilder {
    id: Option<CollectibleId>,
    name: Option<String>,
    anchor: Option<Coordinate>,
    radius_m: Option<u32>,
    rarity: Option<Rarity>,
    collection: Option<String>,
    media_uri: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

impl CollectibleBuilder {
    /// Sets the collectible id.
    pub fn id(mut self, id: impl Into<CollectibleId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the anchor coordinate.
    pub fn anchor(mut self, anchor: Coordinate) -> Self {
        self.anchor = Some(anchor);
        self
    }

    /// Sets the geofence radius in meters.
    pub fn radius_m(mut self, radius_m: u32) -> Self {
        self.radius_m = Some(radius_m);
        self
    }

    /// Sets the rarity tier.
    pub fn rarity(mut self, rarity: Rarity) -> Self {
        self.rarity = Some(rarity);
        self
    }

    /// Sets the collection reference.
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Sets the media reference.
    pub fn media_uri(mut self, uri: impl Into<String>) -> Self {
        self.media_uri = Some(uri.into());
        self
    }

    /// Sets the creation timestamp.
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Builds the Collectible.
    pub fn build(self) -> Collectible {
        Collectible {
            id: self.id.unwrap_or_else(|| CollectibleId::new("unassigned")),
            name: self.name.unwrap_or_default(),
            anchor: self.anchor.unwrap_or(Coordinate::new(0.0, 0.0)),
            radius_m: self.radius_m.unwrap_or(DEFAULT_RADIUS_M),
            rarity: self.rarity.unwrap_or_default(),
            collection: self.collection.unwrap_or_default(),
            media_uri: self.media_uri.unwrap_or_default(),
            created_at: self.created_at,
        }
    }
}

/// Radius given to collectibles built without an explicit one.
pub const DEFAULT_RADIUS_M: u32 = 50;

/// The user's position as reported by the location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserPosition {
    /// Reported coordinate
    pub coordinate: Coordinate,

    /// Horizontal accuracy in meters
    pub accuracy_m: f64,

    /// When the fix was captured
    pub captured_at: DateTime<Utc>,
}

impl UserPosition {
    /// Creates a position captured now.
    pub fn new(lat: f64, lng: f64, accuracy_m: f64) -> Self {
        Self {
            coordinate: Coordinate::new(lat, lng),
            accuracy_m,
            captured_at: Utc::now(),
        }
    }

    /// Returns the age of the fix relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.captured_at
    }
}

/// Draft of a collectible being authored, sent to the directory on submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCollectible {
    pub name: String,
    pub anchor: Coordinate,
    pub radius_m: u32,
    pub rarity: Rarity,
    pub collection: String,
    pub media_uri: String,
}

impl NewCollectible {
    /// Turns the draft into a collectible once the directory assigned an id.
    pub fn into_collectible(self, id: CollectibleId) -> Collectible {
        Collectible {
            id,
            name: self.name,
            anchor: self.anchor,
            radius_m: self.radius_m,
            rarity: self.rarity,
            collection: self.collection,
            media_uri: self.media_uri,
            created_at: Some(Utc::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collectible_id_conversions() {
        assert_eq!(CollectibleId::from(7u32).as_str(), "7");
        assert_eq!(CollectibleId::from("a"), CollectibleId::new("a".to_string()));
    }

    #[test]
    fn test_coordinate_range() {
        assert!(Coordinate::new(90.0, -180.0).is_in_range());
        assert!(!Coordinate::new(90.1, 0.0).is_in_range());
        assert!(!Coordinate::new(0.0, f64::NAN).is_in_range());
    }

    #[test]
    fn test_degree_distance() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(3.0, 4.0);
        assert!((a.degree_distance(&b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_collectible_builder_defaults() {
        let c = Collectible::builder().id("x").build();
        assert_eq!(c.id.as_str(), "x");
        assert_eq!(c.radius_m, DEFAULT_RADIUS_M);
        assert_eq!(c.rarity, Rarity::Common);
        assert!(c.created_at.is_none());
    }

    #[test]
    fn test_rarity_serde() {
        let json = serde_json::to_string(&Rarity::Legendary).unwrap();
        assert_eq!(json, "\"legendary\"");
    }

    #[test]
    fn test_new_collectible_into_collectible() {
        let draft = NewCollectible {
            name: "Fountain".to_string(),
            anchor: Coordinate::new(10.0, 20.0),
            radius_m: 30,
            rarity: Rarity::Epic,
            collection: "PARK".to_string(),
            media_uri: "ipfs://x".to_string(),
        };
        let c = draft.into_collectible(CollectibleId::from("9"));
        assert_eq!(c.id.as_str(), "9");
        assert_eq!(c.anchor, Coordinate::new(10.0, 20.0));
        assert!(c.created_at.is_some());
    }
}
