//! Zoom-dependent clustering policy
//!
//! Below the zoom threshold, nearby collectibles are merged into clusters by
//! greedy first-fit against each cluster's running centroid. At or above the
//! threshold every collectible renders on its own.

use geodrop_core::config::ClusterConfig;
use geodrop_core::types::{Collectible, CollectibleId, Coordinate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable key of a rendered cluster, derived from its first member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterKey(String);

impl ClusterKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A group of collectibles rendered as one marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    centroid: Coordinate,
    members: Vec<CollectibleId>,
}

impl Cluster {
    /// Starts a cluster with a single member.
    pub fn new(id: CollectibleId, at: Coordinate) -> Self {
        Self {
            centroid: at,
            members: vec![id],
        }
    }

    /// Adds a member and moves the centroid incrementally.
    pub fn add(&mut self, id: CollectibleId, at: Coordinate) {
        self.members.push(id);
        let n = self.members.len() as f64;
        self.centroid.lat += (at.lat - self.centroid.lat) / n;
        self.centroid.lng += (at.lng - self.centroid.lng) / n;
    }

    pub fn centroid(&self) -> Coordinate {
        self.centroid
    }

    /// Member ids in insertion order.
    pub fn members(&self) -> &[CollectibleId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Key of the form `first+N` where N counts the other members.
    pub fn key(&self) -> ClusterKey {
        match self.members.first() {
            Some(first) => ClusterKey(format!("{}+{}", first, self.members.len() - 1)),
            None => ClusterKey("empty".to_string()),
        }
    }
}

/// Camera destination for a cluster click.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraTarget {
    pub center: Coordinate,
    pub zoom: f64,
}

/// What the map should render at a given zoom.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderPlan {
    /// Collectibles rendered individually
    pub singles: Vec<Collectible>,
    /// Aggregated groups of two or more
    pub clusters: Vec<Cluster>,
}

impl RenderPlan {
    /// Total number of markers the plan renders.
    pub fn marker_count(&self) -> usize {
        self.singles.len() + self.clusters.len()
    }
}

/// Clustering policy built from configuration.
#[derive(Debug, Clone)]
pub struct ClusterPolicy {
    enabled: bool,
    zoom_threshold: f64,
    merge_tolerance_deg: f64,
    fly_to_zoom_step: f64,
}

impl ClusterPolicy {
    pub fn new(config: &ClusterConfig) -> Self {
        Self {
            enabled: config.enabled,
            zoom_threshold: config.zoom_threshold,
            merge_tolerance_deg: config.merge_tolerance_deg,
            fly_to_zoom_step: config.fly_to_zoom_step,
        }
    }

    pub fn zoom_threshold(&self) -> f64 {
        self.zoom_threshold
    }

    /// Returns true if clustering applies at this zoom.
    pub fn should_cluster(&self, zoom: f64) -> bool {
        self.enabled && zoom < self.zoom_threshold
    }

    /// Splits collectibles into singles and clusters for the given zoom.
    ///
    /// Membership is decided in input order, so the same input always yields
    /// the same plan.
    pub fn plan(&self, collectibles: &[Collectible], zoom: f64) -> RenderPlan {
        if !self.should_cluster(zoom) {
            return RenderPlan {
                singles: collectibles.to_vec(),
                clusters: Vec::new(),
            };
        }

        // Each group keeps the indices of its members alongside the cluster
        let mut groups: Vec<(Cluster, Vec<usize>)> = Vec::new();
        for (index, collectible) in collectibles.iter().enumerate() {
            let anchor = collectible.anchor;
            let target = groups.iter_mut().find(|(cluster, _)| {
                cluster.centroid().degree_distance(&anchor) < self.merge_tolerance_deg
            });
            match target {
                Some((cluster, indices)) => {
                    cluster.add(collectible.id.clone(), anchor);
                    indices.push(index);
                }
                None => groups.push((Cluster::new(collectible.id.clone(), anchor), vec![index])),
            }
        }

        let mut plan = RenderPlan::default();
        for (cluster, indices) in groups {
            if cluster.len() == 1 {
                plan.singles.push(collectibles[indices[0]].clone());
            } else {
                plan.clusters.push(cluster);
            }
        }
        plan
    }

    /// Camera target for a cluster click, always past the threshold.
    pub fn fly_to(&self, cluster: &Cluster) -> CameraTarget {
        CameraTarget {
            center: cluster.centroid(),
            zoom: self.zoom_threshold + self.fly_to_zoom_step,
        }
    }
}

impl Default for ClusterPolicy {
    fn default() -> Self {
        Self::new(&ClusterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drops_near(lat: f64, lng: f64, count: usize, spread: f64) -> Vec<Collectible> {
        (0..count)
            .map(|i| {
                Collectible::builder()
                    .id(format!("c{}", i))
                    .anchor(Coordinate::new(lat + spread * i as f64, lng))
                    .build()
            })
            .collect()
    }

    #[test]
    fn test_five_close_collectibles_cluster_at_low_zoom() {
        let policy = ClusterPolicy::default();
        let drops = drops_near(40.0, -74.0, 5, 0.002);

        let plan = policy.plan(&drops, 5.0);
        assert_eq!(plan.clusters.len(), 1);
        assert!(plan.singles.is_empty());
        assert_eq!(plan.clusters[0].len(), 5);
        assert_eq!(plan.clusters[0].key().as_str(), "c0+4");
    }

    #[test]
    fn test_five_close_collectibles_split_at_high_zoom() {
        let policy = ClusterPolicy::default();
        let drops = drops_near(40.0, -74.0, 5, 0.002);

        let plan = policy.plan(&drops, 15.0);
        assert!(plan.clusters.is_empty());
        assert_eq!(plan.singles.len(), 5);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let policy = ClusterPolicy::default();
        assert!(policy.should_cluster(9.99));
        assert!(!policy.should_cluster(10.0));
    }

    #[test]
    fn test_group_of_one_renders_single() {
        let policy = ClusterPolicy::default();
        let mut drops = drops_near(40.0, -74.0, 2, 0.001);
        drops.push(
            Collectible::builder()
                .id("far")
                .anchor(Coordinate::new(45.0, -70.0))
                .build(),
        );

        let plan = policy.plan(&drops, 3.0);
        assert_eq!(plan.clusters.len(), 1);
        assert_eq!(plan.singles.len(), 1);
        assert_eq!(plan.singles[0].id.as_str(), "far");
        assert_eq!(plan.marker_count(), 2);
    }

    #[test]
    fn test_centroid_is_running_mean() {
        let mut cluster = Cluster::new("a".into(), Coordinate::new(0.0, 0.0));
        cluster.add("b".into(), Coordinate::new(0.02, 0.0));
        cluster.add("c".into(), Coordinate::new(0.04, 0.03));

        let c = cluster.centroid();
        assert!((c.lat - 0.02).abs() < 1e-12);
        assert!((c.lng - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_disabled_policy_never_clusters() {
        let config = ClusterConfig {
            enabled: false,
            ..ClusterConfig::default()
        };
        let policy = ClusterPolicy::new(&config);
        let plan = policy.plan(&drops_near(40.0, -74.0, 5, 0.001), 1.0);
        assert_eq!(plan.singles.len(), 5);
    }

    #[test]
    fn test_fly_to_exceeds_threshold() {
        let policy = ClusterPolicy::default();
        let plan = policy.plan(&drops_near(40.0, -74.0, 3, 0.001), 4.0);
        let target = policy.fly_to(&plan.clusters[0]);

        assert!(target.zoom > policy.zoom_threshold());
        assert!(!policy.should_cluster(target.zoom));
        assert_eq!(target.center, plan.clusters[0].centroid());
    }
}
