use feed_tracker::geodesy::{self, GeoPoint};
use feed_tracker::pipeline::{
    EngineMetrics, PopulationReconciler, RecordingSink, StaticReportSource, TrackEvent,
};
use feed_tracker::{Clock, Config, ManualClock, PollScheduler, Report};
use std::collections::BTreeSet;
use std::sync::Arc;

const P0: GeoPoint = GeoPoint {
    lon: 12.0,
    lat: 58.0,
};

/// Short lookahead so query times line up with report times.
fn walkthrough_config() -> Config {
    let mut config = Config::transit();
    config.trajectory.lookahead_secs = 1.0;
    config
}

fn close(a: GeoPoint, b: GeoPoint, tol_m: f64) -> bool {
    geodesy::surface_distance(a, b).unwrap() < tol_m
}

#[test]
fn test_jump_quarantined_then_confirmed() {
    let mut rec = PopulationReconciler::new(walkthrough_config(), EngineMetrics::new());

    rec.reconcile(vec![Report::new("A", 12.000, 58.000)], 0.0);

    // ~590 m in 2 s
    let summary = rec.reconcile(vec![Report::new("A", 12.010, 58.000)], 2.0);
    assert_eq!(summary.quarantined, 1);
    assert!(rec.get("A").unwrap().guard().is_quarantined());
    assert_eq!(rec.snapshot().position_of("A", 2.5), Some(P0));

    // ~30 m from the suspect
    let confirmed = GeoPoint::new(12.0105, 58.000);
    let summary = rec.reconcile(vec![Report::new("A", confirmed.lon, confirmed.lat)], 4.0);
    assert_eq!(summary.confirmed, 1);
    assert!(!rec.get("A").unwrap().guard().is_quarantined());

    let at = rec.snapshot().position_of("A", 4.5).unwrap();
    let from_start = geodesy::surface_distance(P0, at).unwrap();
    let to_confirmed = geodesy::surface_distance(at, confirmed).unwrap();
    assert!(from_start > 100.0, "still at start: {:.1} m", from_start);
    assert!(to_confirmed > 1.0, "already arrived");
    assert!(to_confirmed < geodesy::surface_distance(P0, confirmed).unwrap());

    assert!(close(rec.snapshot().position_of("A", 5.0).unwrap(), confirmed, 0.01));
}

#[test]
fn test_inconsistent_second_report_keeps_holding() {
    let mut rec = PopulationReconciler::new(walkthrough_config(), EngineMetrics::new());

    rec.reconcile(vec![Report::new("A", 12.000, 58.000)], 0.0);
    rec.reconcile(vec![Report::new("A", 12.010, 58.000)], 2.0);

    // ~590 m from the suspect, ~1180 m from the start
    let summary = rec.reconcile(vec![Report::new("A", 12.020, 58.000)], 4.0);
    assert_eq!(summary.confirmed, 0);
    assert!(rec.get("A").unwrap().guard().is_quarantined());
    assert_eq!(rec.snapshot().position_of("A", 4.5), Some(P0));
    assert_eq!(rec.snapshot().position_of("A", 5.0), Some(P0));
}

#[test]
fn test_quarantine_expires_after_ttl() {
    let mut rec = PopulationReconciler::new(walkthrough_config(), EngineMetrics::new());

    rec.reconcile(vec![Report::new("A", 12.000, 58.000)], 0.0);
    rec.reconcile(vec![Report::new("A", 12.010, 58.000)], 2.0);

    // Far from both the suspect and the start, but past the 12 s TTL.
    let summary = rec.reconcile(vec![Report::new("A", 12.030, 58.000)], 15.0);
    assert_eq!(summary.expired, 1);
    assert!(!rec.get("A").unwrap().guard().is_quarantined());

    let last = rec.get("A").unwrap().trajectory().last().copied().unwrap();
    assert_eq!(last.time, 16.0);
    assert_eq!(last.position, GeoPoint::new(12.030, 58.000));
}

#[test]
fn test_default_lookahead_interpolates_later() {
    let mut rec = PopulationReconciler::new(Config::transit(), EngineMetrics::new());

    rec.reconcile(vec![Report::new("A", 12.000, 58.000)], 0.0);
    rec.reconcile(vec![Report::new("A", 12.010, 58.000)], 2.0);
    let confirmed = GeoPoint::new(12.0105, 58.000);
    rec.reconcile(vec![Report::new("A", confirmed.lon, confirmed.lat)], 4.0);

    let snap = rec.snapshot();
    // Samples sit at 0, 3.5, 5.5 (held) and 7.5 (confirmed).
    assert_eq!(snap.position_of("A", 4.5), Some(P0));
    let mid = snap.position_of("A", 6.5).unwrap();
    assert!(!close(mid, P0, 1.0));
    assert!(!close(mid, confirmed, 1.0));
    assert!(close(snap.position_of("A", 7.5).unwrap(), confirmed, 0.01));
}

#[test]
fn test_position_unavailable_past_hold_window() {
    let mut rec = PopulationReconciler::new(Config::transit(), EngineMetrics::new());
    rec.reconcile(vec![Report::new("A", 12.0, 58.0)], 100.0);

    let snap = rec.snapshot();
    // seeded at 100 and 103.5; 15 s hold either side
    assert_eq!(snap.position_of("A", 86.0), Some(P0));
    assert_eq!(snap.position_of("A", 84.0), None);
    assert_eq!(snap.position_of("A", 118.0), Some(P0));
    assert_eq!(snap.position_of("A", 119.0), None);
}

#[test]
fn test_vessel_profile_tolerates_slow_jumps() {
    let mut rec = PopulationReconciler::new(Config::vessel(), EngineMetrics::new());

    rec.reconcile(vec![Report::new("V", 12.000, 58.000)], 0.0);
    // ~590 m in 60 s is ~35 km/h, plausible for a ship
    let summary = rec.reconcile(vec![Report::new("V", 12.010, 58.000)], 60.0);
    assert_eq!(summary.quarantined, 0);
    assert!(!rec.get("V").unwrap().guard().is_quarantined());
}

#[tokio::test]
async fn test_scheduler_reconciles_population() {
    let source = Arc::new(StaticReportSource::new(vec![
        vec![
            Report::new("a", 12.0, 58.0),
            Report::new("b", 12.1, 58.0),
            Report::new("c", 12.2, 58.0),
        ],
        vec![
            Report::new("b", 12.1, 58.0),
            Report::new("c", 12.2, 58.0),
            Report::new("d", 12.3, 58.0),
        ],
    ]));
    let sink = RecordingSink::new();
    let clock = Arc::new(ManualClock::new(0.0));
    let scheduler = PollScheduler::new(
        Config::transit(),
        source,
        Box::new(sink.clone()),
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    let rx = scheduler.subscribe();

    scheduler.run_cycle().await;
    clock.advance(1.0);
    scheduler.run_cycle().await;

    let tracked: BTreeSet<String> = rx.borrow().tracks.keys().cloned().collect();
    let expected: BTreeSet<String> = ["b", "c", "d"].iter().map(|s| s.to_string()).collect();
    assert_eq!(tracked, expected);

    assert_eq!(sink.retired_ids(), vec!["a".to_string()]);
    assert_eq!(
        sink.spawned_ids(),
        vec!["a", "b", "c", "d"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
    );

    let batches = sink.batches();
    let updated = batches[1]
        .iter()
        .filter(|e| matches!(e, TrackEvent::Updated(_)))
        .count();
    assert_eq!(updated, 2);

    // An empty poll retires everyone still tracked.
    scheduler.run_cycle().await;
    assert!(rx.borrow().is_empty());
    assert_eq!(sink.retired_ids().len(), 4);
}

#[test]
fn test_yaml_profile_with_overrides() {
    let yaml = "
profile: vessel
guard:
  confirm_reports: 3
reconcile:
  retire_after_missed_cycles: 2
";
    let config = Config::from_yaml(yaml).unwrap();
    config.validate().unwrap();
    assert_eq!(config.guard.confirm_reports, 3);
    assert_eq!(config.reconcile.retire_after_missed_cycles, 2);
    assert_eq!(config.poll.interval_ms, Config::vessel().poll.interval_ms);
}
