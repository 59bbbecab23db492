//! Liveness endpoint acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - A fresh tracker reports unhealthy before any data flows
//! - Health follows the idle threshold: healthy at 3s, unhealthy at 7s for 5s
//! - Disabled health checks bind no listener
//! - `GET /ishealthy` answers 200 "OK" while data flows, other paths 404
//! - An idle pipeline answers 500 with the idle time in whole seconds

use super::common::{enabled_config, free_port, get, pipeline_topology, request};
use liveness_common::config::{HealthCheckConfig, TrackerBinding};
use liveness_common::error::LivenessError;
use liveness_http::Supervisor;
use liveness_monitor::{Clock, IdleTracker, ManualClock};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_fresh_tracker_is_unhealthy() {
    let threshold = Duration::from_secs(120);
    let tracker = IdleTracker::new(threshold);
    assert_eq!(tracker.update_count(), 0);
    assert!(!tracker.is_healthy(threshold));
}

#[test]
fn test_staleness_transition() {
    let clock = Arc::new(ManualClock::new());
    let threshold = Duration::from_secs(5);
    let tracker = IdleTracker::with_clock(threshold, Arc::clone(&clock) as Arc<dyn Clock>);

    tracker.update();
    clock.set(Duration::from_secs(3));
    assert!(tracker.is_healthy(threshold));
    clock.set(Duration::from_secs(7));
    assert!(!tracker.is_healthy(threshold));
}

#[test]
fn test_disabled_binds_no_listener() {
    let port = free_port();
    let config = HealthCheckConfig {
        enabled: false,
        bind_host: "127.0.0.1".into(),
        bind_port: port,
        ..HealthCheckConfig::default()
    };

    let mut supervisor = Supervisor::new(config);
    let mut topology = pipeline_topology();
    assert!(supervisor
        .add_probe(&mut topology, "sink".parse().unwrap())
        .unwrap()
        .is_none());
    supervisor.start().unwrap();

    assert!(supervisor.local_addr().is_none());
    assert!(TcpStream::connect(("127.0.0.1", port)).is_err());
}

#[test]
fn test_http_contract() {
    let mut supervisor =
        Supervisor::new(enabled_config(Duration::from_secs(5), TrackerBinding::Shared));
    let mut topology = pipeline_topology();
    supervisor
        .add_probe(&mut topology, "sink".parse().unwrap())
        .unwrap();
    supervisor.start().unwrap();
    let addr = supervisor.local_addr().unwrap();

    topology.push("sink", "sink");

    let healthy = get(addr, "/ishealthy");
    assert_eq!((healthy.status, healthy.body.as_str()), (200, "OK"));

    let missing = get(addr, "/other");
    assert_eq!((missing.status, missing.body.as_str()), (404, "Not Found"));

    supervisor.stop();
}

#[test]
fn test_idle_scenario() {
    let clock = Arc::new(ManualClock::new());
    let mut supervisor = Supervisor::with_clock(
        enabled_config(Duration::from_secs(5), TrackerBinding::Shared),
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    let mut topology = pipeline_topology();
    supervisor
        .add_probe(&mut topology, "sink".parse().unwrap())
        .unwrap();
    supervisor.start().unwrap();
    let addr = supervisor.local_addr().unwrap();

    // t=0
    topology.push("sink", "sink");

    clock.set(Duration::from_secs(3));
    let response = get(addr, "/ishealthy");
    assert_eq!((response.status, response.body.as_str()), (200, "OK"));

    clock.set(Duration::from_secs(7));
    let response = get(addr, "/ishealthy");
    assert_eq!(response.status, 500);
    assert_eq!(response.body, "Pipeline has been idle for 7 seconds");
}

#[test]
fn test_stalled_pipeline_still_answers() {
    let threshold = Duration::from_millis(200);
    let mut supervisor = Supervisor::new(enabled_config(threshold, TrackerBinding::Shared));
    let mut topology = pipeline_topology();
    supervisor
        .add_probe(&mut topology, "sink".parse().unwrap())
        .unwrap();
    supervisor.start().unwrap();
    let addr = supervisor.local_addr().unwrap();

    topology.push("sink", "sink");
    assert_eq!(get(addr, "/ishealthy").status, 200);

    thread::sleep(threshold + Duration::from_millis(100));
    let response = get(addr, "/ishealthy");
    assert_eq!(response.status, 500);
    assert_eq!(response.body, "Pipeline has been idle for 0 seconds");
}

#[test]
fn test_per_probe_requires_every_point() {
    let clock = Arc::new(ManualClock::new());
    let mut supervisor = Supervisor::with_clock(
        enabled_config(Duration::from_secs(5), TrackerBinding::PerProbe),
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    let mut topology = pipeline_topology();
    for point in ["src:src", "sink"] {
        supervisor
            .add_probe(&mut topology, point.parse().unwrap())
            .unwrap();
    }
    supervisor.start().unwrap();
    let addr = supervisor.local_addr().unwrap();

    topology.push("src", "src");
    assert_eq!(get(addr, "/ishealthy").status, 500);

    topology.push("sink", "sink");
    assert_eq!(get(addr, "/ishealthy").status, 200);
}

#[test]
fn test_unknown_point_is_a_configuration_error() {
    let mut supervisor =
        Supervisor::new(enabled_config(Duration::from_secs(5), TrackerBinding::Shared));
    let mut topology = pipeline_topology();
    let err = supervisor
        .add_probe(&mut topology, "timestampcvt:video".parse().unwrap())
        .unwrap_err();
    assert_eq!(
        err,
        LivenessError::PadNotFound {
            element: "timestampcvt".into(),
            pad: "video".into(),
        }
    );
}

#[test]
fn test_post_is_not_a_liveness_check() {
    let mut supervisor =
        Supervisor::new(enabled_config(Duration::from_secs(5), TrackerBinding::Shared));
    supervisor.start().unwrap();
    let addr = supervisor.local_addr().unwrap();

    let response = request(addr, "POST", "/ishealthy").unwrap();
    assert_eq!(response.status, 405);
}
