use geodrop_core::error::ConcurrencyViolation;
use geodrop_core::types::CollectibleId;
use geodrop_geo::cluster::ClusterKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerState {
    /// Not rendered
    Absent,
    /// Render handle requested, not yet settled
    Creating,
    /// Rendered and settled
    Stable,
    /// Draft is held by the user
    Dragging,
    /// Draft was released, commit in progress
    Locked,
    /// Draft is shielded from refresh until submit or cancel
    Protected,
    /// Render handle detached
    Removed,
}

impl MarkerState {
    /// Returns true if bulk refresh and removal must leave the marker alone.
    pub fn is_protected(&self) -> bool {
        matches!(
            self,
            MarkerState::Dragging | MarkerState::Locked | MarkerState::Protected
        )
    }

    /// Returns true if the marker holds a render handle.
    pub fn is_live(&self) -> bool {
        !matches!(self, MarkerState::Absent | MarkerState::Removed)
    }

    /// Component that owns transitions into this state.
    pub fn owner(&self) -> Owner {
        match self {
            MarkerState::Dragging | MarkerState::Locked | MarkerState::Protected => {
                Owner::PinPlacement
            }
            MarkerState::Absent
            | MarkerState::Creating
            | MarkerState::Stable
            | MarkerState::Removed => Owner::Lifecycle,
        }
    }
}

impl fmt::Display for MarkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerState::Absent => write!(f, "absent"),
            MarkerState::Creating => write!(f, "creating"),
            MarkerState::Stable => write!(f, "stable"),
            MarkerState::Dragging => write!(f, "dragging"),
            MarkerState::Locked => write!(f, "locked"),
            MarkerState::Protected => write!(f, "protected"),
            MarkerState::Removed => write!(f, "removed"),
        }
    }
}

/// Component allowed to drive a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Owner {
    /// Marker lifecycle manager
    Lifecycle,
    /// Pin placement controller
    PinPlacement,
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Lifecycle => write!(f, "lifecycle"),
            Owner::PinPlacement => write!(f, "pin placement"),
        }
    }
}

/// Registry key of a marker
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarkerKey {
    /// Individually rendered collectible
    Collectible(CollectibleId),
    /// Aggregate marker
    Cluster(ClusterKey),
    /// The singleton authoring pin
    Draft,
}

impl MarkerKey {
    pub fn is_draft(&self) -> bool {
        matches!(self, MarkerKey::Draft)
    }

    /// Collectible id, for individually rendered collectibles.
    pub fn collectible_id(&self) -> Option<&CollectibleId> {
        match self {
            MarkerKey::Collectible(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerKey::Collectible(id) => write!(f, "collectible:{}", id),
            MarkerKey::Cluster(key) => write!(f, "cluster:{}", key),
            MarkerKey::Draft => write!(f, "draft"),
        }
    }
}

impl From<CollectibleId> for MarkerKey {
    fn from(id: CollectibleId) -> Self {
        MarkerKey::Collectible(id)
    }
}

/// Returns true if `from -> to` is in the transition table.
///
/// The drag states are reachable for the draft only.
pub fn is_legal(key: &MarkerKey, from: MarkerState, to: MarkerState) -> bool {
    use MarkerState::*;

    match (from, to) {
        (Absent, Creating) | (Creating, Stable) => true,
        (Stable, Dragging)
        | (Dragging, Locked)
        | (Locked, Protected)
        | (Protected, Dragging)
        | (Protected, Stable) => key.is_draft(),
        (Removed, _) => false,
        (_, Removed) => true,
        _ => false,
    }
}

/// Checks a requested transition against the table and the owner rules.
pub fn check_transition(
    key: &MarkerKey,
    owner: Owner,
    from: MarkerState,
    to: MarkerState,
) -> Result<(), ConcurrencyViolation> {
    if !is_legal(key, from, to) {
        return Err(ConcurrencyViolation::IllegalTransition {
            marker: key.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    if to.owner() != owner {
        return Err(ConcurrencyViolation::NotOwner {
            marker: key.to_string(),
            owner: owner.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    Ok(())
}
