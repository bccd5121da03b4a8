//! Collectible directory seam
//!
//! The directory lists collectibles around a point, registers newly pinned
//! ones and records collection. [`MemoryDirectory`] keeps everything in
//! process and backs headless sessions and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geodrop_core::error::{DirectoryError, Result, TransientError};
use geodrop_core::types::{Collectible, CollectibleId, Coordinate, NewCollectible};
use geodrop_geo::geofence::{check, haversine_distance_m};
use geodrop_geo::validate::{normalize, parse_anchor, validate_collectible};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Proof that a collectible was collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectReceipt {
    pub id: CollectibleId,
    pub collected_at: DateTime<Utc>,
    /// Distance from the anchor at collection time
    pub distance_m: f64,
}

/// Remote catalogue of collectibles.
#[async_trait]
pub trait CollectibleDirectory: Send + Sync {
    /// Lists collectibles within `radius_m` of `center`.
    async fn list_nearby(&self, center: Coordinate, radius_m: u32) -> Result<Vec<Collectible>>;

    /// Registers a new collectible and returns its id.
    async fn pin(&self, draft: NewCollectible) -> Result<CollectibleId>;

    /// Collects `id` for a user standing at `at`.
    async fn collect(&self, id: &CollectibleId, at: Coordinate) -> Result<CollectReceipt>;
}

#[async_trait]
impl<D: CollectibleDirectory + ?Sized> CollectibleDirectory for Arc<D> {
    async fn list_nearby(&self, center: Coordinate, radius_m: u32) -> Result<Vec<Collectible>> {
        (**self).list_nearby(center, radius_m).await
    }

    async fn pin(&self, draft: NewCollectible) -> Result<CollectibleId> {
        (**self).pin(draft).await
    }

    async fn collect(&self, id: &CollectibleId, at: Coordinate) -> Result<CollectReceipt> {
        (**self).collect(id, at).await
    }
}

#[derive(Debug, Default)]
struct Catalogue {
    items: HashMap<CollectibleId, Collectible>,
    collected: HashSet<CollectibleId>,
    supply: u32,
    /// Last numeric id handed out by `pin`
    last_pinned: u32,
}

impl Catalogue {
    /// Next numeric id not already taken by a seeded collectible.
    fn next_free_id(&mut self) -> CollectibleId {
        loop {
            self.last_pinned += 1;
            let id = CollectibleId::from(self.last_pinned);
            if !self.items.contains_key(&id) {
                return id;
            }
        }
    }
}

/// In-process directory.
///
/// Pinned ids count up from 1, skipping ids already in the catalogue.
/// Collection requires the caller to stand inside the collectible's geofence.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    catalogue: RwLock<Catalogue>,
    offline: AtomicBool,
    list_calls: AtomicU64,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory seeded with `collectibles`.
    ///
    /// # Errors
    ///
    /// Fails on the first duplicate id or unusable anchor.
    pub fn with_collectibles(collectibles: impl IntoIterator<Item = Collectible>) -> Result<Self> {
        let directory = Self::new();
        for collectible in collectibles {
            directory.insert(collectible)?;
        }
        Ok(directory)
    }

    /// Adds a collectible under its own id.
    pub fn insert(&self, collectible: Collectible) -> Result<()> {
        let collectible = validate_collectible(collectible)?;
        let mut catalogue = self.catalogue.write();
        if catalogue.items.contains_key(&collectible.id) {
            return Err(DirectoryError::Rejected {
                reason: format!("collectible {} already exists", collectible.id),
            }
            .into());
        }
        catalogue.supply += 1;
        catalogue.items.insert(collectible.id.clone(), collectible);
        Ok(())
    }

    /// Moves a collectible, taking the anchor in its stored string form.
    pub fn relocate(
        &self,
        id: &CollectibleId,
        latitude: &str,
        longitude: &str,
        radius_m: u32,
    ) -> Result<Coordinate> {
        let anchor = parse_anchor(latitude, longitude)?;
        let mut catalogue = self.catalogue.write();
        let item = catalogue
            .items
            .get_mut(id)
            .ok_or_else(|| DirectoryError::NotFound { id: id.to_string() })?;
        item.anchor = anchor;
        item.radius_m = radius_m;
        info!(%id, %anchor, radius_m, "Collectible relocated");
        Ok(anchor)
    }

    pub fn get(&self, id: &CollectibleId) -> Option<Collectible> {
        self.catalogue.read().items.get(id).cloned()
    }

    /// Number of collectibles ever registered.
    pub fn total_supply(&self) -> u32 {
        self.catalogue.read().supply
    }

    pub fn is_collected(&self, id: &CollectibleId) -> bool {
        self.catalogue.read().collected.contains(id)
    }

    /// Makes every call fail with a network error until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    /// Number of `list_nearby` calls served or refused.
    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::Relaxed)
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(TransientError::Network {
                reason: "directory offline".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl CollectibleDirectory for MemoryDirectory {
    async fn list_nearby(&self, center: Coordinate, radius_m: u32) -> Result<Vec<Collectible>> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        self.ensure_online()?;
        let center = normalize(center).into_result()?;

        let catalogue = self.catalogue.read();
        let mut nearby: Vec<(f64, Collectible)> = catalogue
            .items
            .values()
            .filter(|c| !catalogue.collected.contains(&c.id))
            .map(|c| (haversine_distance_m(&center, &c.anchor), c))
            .filter(|(d, _)| *d <= radius_m as f64)
            .map(|(d, c)| (d, c.clone()))
            .collect();
        nearby.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));

        debug!(%center, radius_m, found = nearby.len(), "Listed nearby collectibles");
        Ok(nearby.into_iter().map(|(_, c)| c).collect())
    }

    async fn pin(&self, draft: NewCollectible) -> Result<CollectibleId> {
        self.ensure_online()?;
        let anchor = normalize(draft.anchor).into_result()?;
        if draft.radius_m == 0 {
            return Err(DirectoryError::Rejected {
                reason: "radius must be positive".to_string(),
            }
            .into());
        }

        let mut catalogue = self.catalogue.write();
        let id = catalogue.next_free_id();
        catalogue.supply += 1;
        let collectible = NewCollectible { anchor, ..draft }.into_collectible(id.clone());
        info!(%id, anchor = %collectible.anchor, radius_m = collectible.radius_m, "Collectible pinned");
        catalogue.items.insert(id.clone(), collectible);
        Ok(id)
    }

    async fn collect(&self, id: &CollectibleId, at: Coordinate) -> Result<CollectReceipt> {
        self.ensure_online()?;
        let at = normalize(at).into_result()?;

        let mut catalogue = self.catalogue.write();
        let item = catalogue
            .items
            .get(id)
            .ok_or_else(|| DirectoryError::NotFound { id: id.to_string() })?;
        if catalogue.collected.contains(id) {
            return Err(DirectoryError::AlreadyCollected { id: id.to_string() }.into());
        }

        let fence = check(&at, &item.anchor, item.radius_m);
        if !fence.within_radius {
            warn!(%id, distance_m = fence.distance_m, radius_m = item.radius_m, "Collect outside geofence");
            return Err(DirectoryError::OutsideGeofence {
                distance_m: fence.distance_m,
                radius_m: item.radius_m,
            }
            .into());
        }

        catalogue.collected.insert(id.clone());
        info!(%id, distance_m = fence.distance_m, "Collectible collected");
        Ok(CollectReceipt {
            id: id.clone(),
            collected_at: Utc::now(),
            distance_m: fence.distance_m,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geodrop_core::types::Rarity;
    use geodrop_core::GeoDropError;

    fn drop_at(id: &str, lat: f64, lng: f64, radius_m: u32) -> Collectible {
        Collectible::builder()
            .id(id)
            .anchor(Coordinate::new(lat, lng))
            .radius_m(radius_m)
            .build()
    }

    fn draft(lat: f64, lng: f64) -> NewCollectible {
        NewCollectible {
            name: "Fountain".to_string(),
            anchor: Coordinate::new(lat, lng),
            radius_m: 30,
            rarity: Rarity::Rare,
            collection: "GEO".to_string(),
            media_uri: "ipfs://fountain".to_string(),
        }
    }

    #[tokio::test]
    async fn test_list_nearby_filters_and_sorts() {
        let directory = MemoryDirectory::with_collectibles([
            drop_at("far", 40.01, -74.0, 10),
            drop_at("near", 40.0001, -74.0, 10),
            drop_at("other-city", 51.5, -0.12, 10),
        ])
        .unwrap();

        let nearby = directory
            .list_nearby(Coordinate::new(40.0, -74.0), 5_000)
            .await
            .unwrap();
        let ids: Vec<_> = nearby.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "far"]);
        assert_eq!(directory.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_pin_assigns_sequential_ids() {
        let directory = MemoryDirectory::new();
        let first = directory.pin(draft(10.0, 20.0)).await.unwrap();
        let second = directory.pin(draft(10.5, 20.5)).await.unwrap();

        assert_eq!(first.as_str(), "1");
        assert_eq!(second.as_str(), "2");
        assert_eq!(directory.total_supply(), 2);
        assert!(directory.get(&first).unwrap().created_at.is_some());
    }

    #[tokio::test]
    async fn test_pin_skips_ids_taken_by_seeded_collectibles() {
        let directory = MemoryDirectory::with_collectibles([drop_at("2", 1.0, 1.0, 10)]).unwrap();

        let first = directory.pin(draft(10.0, 20.0)).await.unwrap();
        let second = directory.pin(draft(10.5, 20.5)).await.unwrap();

        assert_eq!(first.as_str(), "1");
        assert_eq!(second.as_str(), "3");
        assert_eq!(directory.total_supply(), 3);
        assert_eq!(directory.get(&"2".into()).unwrap().anchor, Coordinate::new(1.0, 1.0));
    }

    #[tokio::test]
    async fn test_pin_normalizes_swapped_anchor() {
        let directory = MemoryDirectory::new();
        let id = directory.pin(draft(-122.4, 37.7)).await.unwrap();
        assert_eq!(directory.get(&id).unwrap().anchor, Coordinate::new(37.7, -122.4));
    }

    #[tokio::test]
    async fn test_pin_rejects_zero_radius() {
        let directory = MemoryDirectory::new();
        let err = directory
            .pin(NewCollectible {
                radius_m: 0,
                ..draft(1.0, 1.0)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GeoDropError::Directory(DirectoryError::Rejected { .. })));
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let directory = MemoryDirectory::new();
        directory.insert(drop_at("a", 1.0, 1.0, 10)).unwrap();
        assert!(directory.insert(drop_at("a", 2.0, 2.0, 10)).is_err());
        assert_eq!(directory.total_supply(), 1);
    }

    #[tokio::test]
    async fn test_collect_requires_geofence() {
        let directory = MemoryDirectory::with_collectibles([drop_at("a", 40.0, -74.0, 10)]).unwrap();

        let err = directory
            .collect(&"a".into(), Coordinate::new(40.001, -74.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GeoDropError::Directory(DirectoryError::OutsideGeofence { radius_m: 10, .. })
        ));

        let receipt = directory
            .collect(&"a".into(), Coordinate::new(40.0, -74.0))
            .await
            .unwrap();
        assert_eq!(receipt.distance_m, 0.0);
        assert!(directory.is_collected(&"a".into()));
    }

    #[tokio::test]
    async fn test_collect_twice_and_unknown() {
        let directory = MemoryDirectory::with_collectibles([drop_at("a", 40.0, -74.0, 10)]).unwrap();
        let here = Coordinate::new(40.0, -74.0);
        directory.collect(&"a".into(), here).await.unwrap();

        let again = directory.collect(&"a".into(), here).await.unwrap_err();
        assert!(matches!(again, GeoDropError::Directory(DirectoryError::AlreadyCollected { .. })));

        let missing = directory.collect(&"zz".into(), here).await.unwrap_err();
        assert!(matches!(missing, GeoDropError::Directory(DirectoryError::NotFound { .. })));

        let nearby = directory.list_nearby(here, 1_000).await.unwrap();
        assert!(nearby.is_empty());
    }

    #[tokio::test]
    async fn test_relocate_from_strings() {
        let directory = MemoryDirectory::with_collectibles([drop_at("a", 40.0, -74.0, 10)]).unwrap();
        let anchor = directory.relocate(&"a".into(), "48.8566", "2.3522", 25).unwrap();
        assert_eq!(anchor, Coordinate::new(48.8566, 2.3522));
        assert_eq!(directory.get(&"a".into()).unwrap().radius_m, 25);

        assert!(directory.relocate(&"a".into(), "north", "2.0", 25).is_err());
        assert!(directory.relocate(&"b".into(), "1.0", "2.0", 25).is_err());
    }

    #[tokio::test]
    async fn test_offline_is_transient() {
        let directory = MemoryDirectory::new();
        directory.set_offline(true);
        let err = directory
            .list_nearby(Coordinate::new(0.0, 0.0), 100)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.user_message().as_deref(), Some("failed to fetch nearby collectibles"));
    }
}
