//! Acceptance tests for stream-liveness.
//!
//! These tests exercise the crates together the way a deployment does:
//! - Timestamp conversion across the NTP, Unix and TAI domains
//! - Idle tracking fed by probes on a pipeline topology
//! - The `/ishealthy` contract over a real TCP listener

mod acceptance;
