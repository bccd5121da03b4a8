//! End-to-end scenarios for the collectible map

mod common;

use common::{drops_near, open_session, open_view, ScriptedLocation};
use geodrop_client::{LocationError, MemoryDirectory};
use geodrop_core::error::{ConcurrencyViolation, GeoDropError, PermissionError};
use geodrop_core::types::{Coordinate, UserPosition};
use geodrop_geo::geofence::{check, haversine_distance_m};
use geodrop_geo::validate::{validate_coordinate, ValidationReason};
use geodrop_map::{MarkerKey, MarkerState, RefreshOutcome, RenderSurface, SkipReason};
use geodrop::PinDetails;
use std::sync::Arc;

#[test]
fn test_swapped_coordinate_is_corrected() {
    let v = validate_coordinate("-122.4194", "37.7749");
    assert!(v.valid);
    assert_eq!(v.reason, ValidationReason::SwapCorrected);
    assert_eq!(v.coordinate(), Some(Coordinate::new(37.7749, -122.4194)));

    let out = validate_coordinate(200.0, 300.0);
    assert!(!out.valid);
    assert_eq!(out.reason, ValidationReason::OutOfRange);
}

#[test]
fn test_distance_symmetry_and_zero() {
    let here = Coordinate::new(40.0, -74.0);
    let there = Coordinate::new(40.7128, -74.006);

    assert_eq!(haversine_distance_m(&here, &here), 0.0);
    assert_eq!(
        haversine_distance_m(&here, &there),
        haversine_distance_m(&there, &here)
    );

    let fence = check(&here, &here, 10);
    assert_eq!(fence.distance_m, 0.0);
    assert!(fence.within_radius);
}

#[test]
fn test_boundary_is_inclusive() {
    let anchor = Coordinate::new(0.0, 0.0);
    let user = Coordinate::new(0.0001, 0.0);
    let distance = haversine_distance_m(&user, &anchor);

    let radius = distance.ceil() as u32;
    assert!(check(&user, &anchor, radius).within_radius);
    assert!(!check(&user, &anchor, radius - 1).within_radius);
}

#[test]
fn test_rapid_refreshes_collapse_into_one_pass() {
    let (mut session, clock) = open_session();
    let drops = drops_near(40.0, -74.0, 3);

    for _ in 0..5 {
        session.set_nearby(drops.clone(), false);
        clock.advance_ms(10);
    }
    clock.advance_ms(200);
    session.tick();

    assert_eq!(session.metrics().refreshes_applied(), 1);
    assert_eq!(session.surface().call_counts().0, 3);
    assert_eq!(session.registry().len(), 3);
}

#[test]
fn test_dropped_pin_survives_refreshes() {
    let (mut session, clock) = open_session();
    session.place_pin(10.0, 20.0).unwrap();
    session.drag_start().unwrap();
    session.drag(10.0005, 20.0005).unwrap();
    let committed = session.drag_end(10.001, 20.001).unwrap();
    assert_eq!(committed, Coordinate::new(10.001, 20.001));
    assert_eq!(session.form().committed(), Some(committed));

    let handle = session.surface().handle_for(&MarkerKey::Draft).unwrap();
    for _ in 0..3 {
        clock.advance_ms(150);
        let outcome = session.set_nearby(drops_near(10.0, 20.0, 4), true);
        assert_eq!(
            outcome,
            RefreshOutcome::Skipped(SkipReason::Protected(MarkerKey::Draft))
        );
        session.tick();
    }

    assert_eq!(session.registry().state(&MarkerKey::Draft), MarkerState::Protected);
    assert_eq!(session.surface().handle_for(&MarkerKey::Draft), Some(handle));
    assert_eq!(session.surface().marker_position(handle), Some(committed));

    let err = session.place_pin(11.0, 21.0).unwrap_err();
    assert!(matches!(
        err,
        GeoDropError::Concurrency(ConcurrencyViolation::DraftAlreadyPlaced)
    ));
    assert_eq!(
        err.user_message().as_deref(),
        Some("pin already placed — remove it first")
    );
}

#[test]
fn test_cluster_splits_when_zooming_in() {
    let (mut session, clock) = open_session();
    session.on_zoom_changed(5.0);
    clock.advance_ms(200);

    assert!(session.set_nearby(drops_near(40.0, -74.0, 5), false).is_applied());
    assert_eq!(session.surface().cluster_counts(), vec![5]);
    assert_eq!(session.surface().marker_count(), 1);

    clock.advance_ms(200);
    assert!(session.on_zoom_changed(15.0).is_applied());
    assert!(session.surface().cluster_counts().is_empty());
    assert_eq!(session.surface().marker_count(), 5);
}

#[test]
fn test_geofence_at_anchor() {
    let (mut session, _clock) = open_session();
    session.update_position(&UserPosition::new(40.0, -74.0, 3.0)).unwrap();
    session.set_nearby(drops_near(40.0, -74.0, 1), false);

    let fence = session.check(&"drop-0".into()).unwrap();
    assert_eq!(fence.distance_m, 0.0);
    assert!(fence.within_radius);
}

#[tokio::test]
async fn test_permission_denied_still_allows_manual_pin() -> anyhow::Result<()> {
    let directory = Arc::new(MemoryDirectory::new());
    let (mut view, _clock) = open_view(
        ScriptedLocation::failing(LocationError::PermissionDenied),
        directory.clone(),
    );

    let err = view.refresh_location().await.unwrap_err();
    assert!(matches!(
        err,
        GeoDropError::Permission(PermissionError::LocationDenied)
    ));
    assert_eq!(view.notice(), Some("location unavailable"));

    view.place_pin(10.0, 20.0)?;
    view.session_mut().drag_start()?;
    view.session_mut().drag_end(10.001, 20.001)?;
    let id = view
        .submit_pin(PinDetails {
            name: "Corner".to_string(),
            ..PinDetails::default()
        })
        .await?;

    let pinned = directory.get(&id).expect("pinned collectible");
    assert_eq!(pinned.anchor, Coordinate::new(10.001, 20.001));
    assert!(!view.session().registry().contains(&MarkerKey::Draft));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_walk_into_geofence_and_collect() -> anyhow::Result<()> {
    let directory = Arc::new(MemoryDirectory::with_collectibles(drops_near(40.0, -74.0, 2))?);
    let provider = ScriptedLocation::at(40.01, -74.0);
    let (mut view, clock) = open_view(provider.clone(), directory.clone());

    let update = view.refresh_location().await?;
    assert!(update.fetched);
    assert!(view.session().geofence().eligible().is_empty());

    let refused = view.collect(&"drop-0".into()).await.unwrap_err();
    assert!(matches!(refused, GeoDropError::Directory(_)));

    provider.move_to(40.0, -74.0);
    clock.advance_ms(500);
    let update = view.refresh_location().await?;
    assert!(update.geofence_changed);
    assert!(!update.fetched);

    let receipt = view.collect(&"drop-0".into()).await?;
    assert_eq!(receipt.distance_m, 0.0);
    assert!(directory.is_collected(&"drop-0".into()));
    assert!(!view.session().registry().contains(&MarkerKey::Collectible("drop-0".into())));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failure_keeps_map_interactive() -> anyhow::Result<()> {
    let directory = Arc::new(MemoryDirectory::with_collectibles(drops_near(40.0, -74.0, 2))?);
    let (mut view, _clock) = open_view(ScriptedLocation::at(40.0, -74.0), directory.clone());

    directory.set_offline(true);
    assert!(view.refresh_location().await.is_err());
    assert_eq!(view.notice(), Some("failed to fetch nearby collectibles"));

    assert!(view.place_pin(40.0005, -74.0).is_ok());
    assert!(view.session().geofence().position().is_some());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_watch_feeds_view_until_closed() -> anyhow::Result<()> {
    let directory = Arc::new(MemoryDirectory::with_collectibles(drops_near(40.0, -74.0, 1))?);
    let (mut view, _clock) = open_view(ScriptedLocation::at(40.0, -74.0), directory);

    view.start_watch();
    let update = view.next_watch_update().await.expect("watch running")?;
    assert!(update.fetched);
    assert_eq!(view.session().surface().marker_count(), 1);

    assert_eq!(view.close(), 1);
    assert!(!view.is_watching());
    assert!(view.next_watch_update().await.is_none());
    Ok(())
}
