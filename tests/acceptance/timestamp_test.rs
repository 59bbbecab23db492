//! Timestamp conversion acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - NTP capture timestamps convert to Unix seconds within 1 microsecond
//! - Zero is the invalid sentinel, one nanosecond is valid
//! - Unix timestamps survive a round trip through TAI exactly

use liveness_common::normalize::{InputTimestampMode, TimestampNormalizer};
use liveness_common::time::{
    CanonicalTimestamp, TimeDomain, NANOS_PER_SECOND, UNIX_TO_NTP_SECONDS, UTC_TO_TAI_SECONDS,
};

const NTP_OFFSET_NS: i64 = UNIX_TO_NTP_SECONDS * NANOS_PER_SECOND;

#[test]
fn test_ntp_to_unix_seconds() {
    let samples = [
        NTP_OFFSET_NS + 1,
        NTP_OFFSET_NS + 1_609_628_230_490_000_000,
        NTP_OFFSET_NS + 1_700_000_000_123_456_789,
    ];
    for raw_ns in samples {
        let ts = CanonicalTimestamp::from_raw_nanoseconds(raw_ns, TimeDomain::Ntp);
        assert!(ts.is_valid(), "{raw_ns} should convert");

        #[allow(clippy::cast_precision_loss)]
        let expected = (raw_ns - NTP_OFFSET_NS) as f64 / 1e9;
        let actual = ts.to_unix_seconds();
        assert!(
            (actual - expected).abs() < 1e-6,
            "{raw_ns}: {actual} != {expected}"
        );
    }
}

#[test]
fn test_validity_boundary() {
    assert!(!CanonicalTimestamp::from_nanoseconds(0).is_valid());
    assert!(CanonicalTimestamp::from_nanoseconds(1).is_valid());
    assert!(!CanonicalTimestamp::from_raw_nanoseconds(0, TimeDomain::Ntp).is_valid());
}

#[test]
fn test_unix_round_trip_is_exact() {
    for unix_ns in [1, 999_999_999, 1_609_628_230_490_000_000, 1_700_000_000_123_456_789] {
        let ts = CanonicalTimestamp::from_raw_nanoseconds(unix_ns, TimeDomain::UnixUtc);
        assert_eq!(ts.nanoseconds(), unix_ns + UTC_TO_TAI_SECONDS * NANOS_PER_SECOND);
        assert_eq!(ts.to_unix_nanoseconds(), unix_ns);
    }
}

#[test]
fn test_iso8601_rendering() {
    let ts = CanonicalTimestamp::from_raw_nanoseconds(
        NTP_OFFSET_NS + 1_609_628_230_490_000_000,
        TimeDomain::Ntp,
    );
    assert_eq!(ts.to_iso8601(), "2021-01-02T22:57:10.490000+00:00");
}

#[test]
fn test_normalizer_never_emits_invalid_timestamps() {
    let mut normalizer =
        TimestampNormalizer::new(InputTimestampMode::Ntp, CanonicalTimestamp::INVALID);
    let raws = [0, 40_000_000, NTP_OFFSET_NS + 1_700_000_000_000_000_000, 80_000_000];
    let outputs: Vec<_> = raws
        .iter()
        .filter_map(|raw| normalizer.normalize(*raw).unwrap())
        .collect();
    assert_eq!(outputs.len(), 1);
    assert!(outputs.iter().all(CanonicalTimestamp::is_valid));
    assert_eq!(normalizer.dropped(), 3);
}
