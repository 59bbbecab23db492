//! Timestamp domain conversion.
//!
//! Every timestamp that leaves the capture side of the pipeline is tagged
//! with a [`CanonicalTimestamp`]: signed nanoseconds since
//! 1970-01-01 00:00:00 TAI (International Atomic Time). Capture sources
//! report time in other domains (NTP for RTSP cameras, Unix UTC for the
//! system clock), so the converters here bring them onto the TAI timescale.
//!
//! All domain arithmetic is done on integer nanoseconds. Floating point is
//! only used by [`CanonicalTimestamp::to_unix_seconds`] for display.
//!
//! Conversions never fail. A value that cannot be represented collapses to
//! [`CanonicalTimestamp::INVALID`]; callers check [`CanonicalTimestamp::is_valid`]
//! before tagging data with it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Nanoseconds per second.
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Difference between the NTP epoch (1900-01-01) and the Unix epoch (1970-01-01).
///
/// Equals 70 years plus 17 leap days.
pub const UNIX_TO_NTP_SECONDS: i64 = (70 * 365 + 17) * 24 * 60 * 60;

/// UTC to TAI offset in seconds.
///
/// Valid for dates from 2017-01-01 until the next leap second is inserted.
/// This goes stale when IERS announces a new leap second and must be
/// updated (or replaced with a leap second table) at that point.
pub const UTC_TO_TAI_SECONDS: i64 = 37;

/// Current UTC to TAI offset in seconds.
///
/// Every conversion reads the offset through this function so that it can
/// become a leap second table lookup without touching call sites.
#[inline]
#[must_use]
pub const fn utc_to_tai_seconds() -> i64 {
    UTC_TO_TAI_SECONDS
}

/// The timescale a raw capture timestamp is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeDomain {
    /// Nanoseconds since 1970-01-01 00:00:00 TAI, including leap seconds.
    Tai,
    /// Nanoseconds since 1900-01-01 00:00:00 UTC, not including leap seconds.
    /// RTSP cameras that send RTCP sender reports produce these.
    #[default]
    Ntp,
    /// Nanoseconds since 1970-01-01 00:00:00 UTC, not including leap seconds.
    UnixUtc,
}

impl fmt::Display for TimeDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tai => write!(f, "tai"),
            Self::Ntp => write!(f, "ntp"),
            Self::UnixUtc => write!(f, "unix_utc"),
        }
    }
}

impl FromStr for TimeDomain {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tai" => Ok(Self::Tai),
            "ntp" => Ok(Self::Ntp),
            "unix_utc" | "unix-utc" | "unix" | "utc" => Ok(Self::UnixUtc),
            other => Err(TimestampError::UnknownDomain(other.to_string())),
        }
    }
}

/// Errors from the fallible timestamp entry points.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TimestampError {
    /// The string is not an RFC 3339 date-time.
    #[error("invalid RFC 3339 timestamp {input:?}: {reason}")]
    Parse {
        /// Input that failed to parse.
        input: String,
        /// Parser message.
        reason: String,
    },

    /// The parsed date-time is outside the representable nanosecond range.
    #[error("timestamp {0:?} is out of range")]
    OutOfRange(String),

    /// Unknown time domain name.
    #[error("unknown time domain {0:?}: expected tai, ntp or unix_utc")]
    UnknownDomain(String),

    /// Input timestamps stayed unconvertible for too long to be start-up noise.
    #[error(
        "input timestamp {raw_ns} ns cannot be converted from {mode}; \
         use timestamp_mode start_at_current_time if the source never sends real time"
    )]
    Unconvertible {
        /// Raw input timestamp that gave up the stream.
        raw_ns: i64,
        /// Configured input mode name.
        mode: String,
    },
}

/// Nanoseconds since 1970-01-01 00:00:00 TAI.
///
/// Values greater than zero are valid. Zero is the "invalid/unknown"
/// sentinel, and every conversion that would produce a non-positive value
/// produces zero instead.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CanonicalTimestamp(i64);

impl CanonicalTimestamp {
    /// The invalid/unknown sentinel.
    pub const INVALID: CanonicalTimestamp = CanonicalTimestamp(0);

    /// Smallest valid timestamp.
    pub const MIN: CanonicalTimestamp = CanonicalTimestamp(1);

    /// Largest representable timestamp.
    pub const MAX: CanonicalTimestamp = CanonicalTimestamp(i64::MAX);

    /// Wrap a raw nanosecond count without normalization.
    ///
    /// Use [`CanonicalTimestamp::from_raw_nanoseconds`] for anything that
    /// comes from a capture source.
    #[must_use]
    pub const fn from_nanoseconds(nanoseconds: i64) -> Self {
        Self(nanoseconds)
    }

    /// Convert a raw capture timestamp in `domain` to the TAI timescale.
    #[must_use]
    pub fn from_raw_nanoseconds(raw_ns: i64, domain: TimeDomain) -> Self {
        let offset_ns = match domain {
            TimeDomain::Tai => 0,
            TimeDomain::Ntp => (utc_to_tai_seconds() - UNIX_TO_NTP_SECONDS) * NANOS_PER_SECOND,
            TimeDomain::UnixUtc => utc_to_tai_seconds() * NANOS_PER_SECOND,
        };
        Self::collapse(raw_ns.checked_add(offset_ns))
    }

    /// Convert nanoseconds since the NTP epoch.
    #[must_use]
    pub fn from_ntp_nanoseconds(raw_ns: i64) -> Self {
        Self::from_raw_nanoseconds(raw_ns, TimeDomain::Ntp)
    }

    /// Convert nanoseconds since the Unix epoch (UTC).
    #[must_use]
    pub fn from_unix_nanoseconds(raw_ns: i64) -> Self {
        Self::from_raw_nanoseconds(raw_ns, TimeDomain::UnixUtc)
    }

    /// The current system time.
    #[must_use]
    pub fn now() -> Self {
        SystemTime::now().into()
    }

    /// Parse an RFC 3339 date-time such as `2021-01-02T22:57:10.49Z`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not RFC 3339 or lies outside the
    /// representable range.
    pub fn parse_rfc3339(input: &str) -> Result<Self, TimestampError> {
        let parsed =
            chrono::DateTime::parse_from_rfc3339(input).map_err(|e| TimestampError::Parse {
                input: input.to_string(),
                reason: e.to_string(),
            })?;
        let unix_ns = parsed
            .timestamp_nanos_opt()
            .ok_or_else(|| TimestampError::OutOfRange(input.to_string()))?;
        Ok(Self::from_unix_nanoseconds(unix_ns))
    }

    fn collapse(nanoseconds: Option<i64>) -> Self {
        match nanoseconds {
            Some(ns) if ns > 0 => Self(ns),
            _ => Self::INVALID,
        }
    }

    /// Nanoseconds since 1970-01-01 00:00:00 TAI.
    #[inline]
    #[must_use]
    pub const fn nanoseconds(&self) -> i64 {
        self.0
    }

    /// True for every value except the sentinel (and anything non-positive).
    #[inline]
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.0 > 0
    }

    /// Nanoseconds since the Unix epoch (UTC).
    #[must_use]
    pub const fn to_unix_nanoseconds(&self) -> i64 {
        self.0.saturating_sub(utc_to_tai_seconds() * NANOS_PER_SECOND)
    }

    /// Seconds since the Unix epoch (UTC), for display.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_unix_seconds(&self) -> f64 {
        let unix_ns = self.to_unix_nanoseconds();
        let secs = unix_ns.div_euclid(NANOS_PER_SECOND);
        let subsec = unix_ns.rem_euclid(NANOS_PER_SECOND);
        secs as f64 + subsec as f64 / 1e9
    }

    /// UTC ISO 8601 rendering with microseconds, e.g. `2021-01-02T22:57:10.490000+00:00`.
    #[must_use]
    pub fn to_iso8601(&self) -> String {
        let unix_ns = self.to_unix_nanoseconds();
        let secs = unix_ns.div_euclid(NANOS_PER_SECOND);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let subsec = unix_ns.rem_euclid(NANOS_PER_SECOND) as u32;
        match chrono::DateTime::from_timestamp(secs, subsec) {
            Some(datetime) => datetime.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string(),
            None => format!("{unix_ns} ns since 1970-01-01T00:00:00+00:00"),
        }
    }

    /// The system time this timestamp corresponds to, if valid.
    #[must_use]
    pub fn to_system_time(&self) -> Option<SystemTime> {
        if !self.is_valid() {
            return None;
        }
        let unix_ns = self.to_unix_nanoseconds();
        let magnitude = Duration::from_nanos(unix_ns.unsigned_abs());
        if unix_ns >= 0 {
            UNIX_EPOCH.checked_add(magnitude)
        } else {
            UNIX_EPOCH.checked_sub(magnitude)
        }
    }

    /// Return `self` if valid, otherwise `other`.
    #[must_use]
    pub fn or(self, other: CanonicalTimestamp) -> CanonicalTimestamp {
        if self.is_valid() {
            self
        } else {
            other
        }
    }

    /// Add a signed nanosecond offset, collapsing to the sentinel when out of range.
    #[must_use]
    pub fn offset_by(self, offset_ns: i64) -> CanonicalTimestamp {
        Self::collapse(self.0.checked_add(offset_ns))
    }
}

impl From<SystemTime> for CanonicalTimestamp {
    fn from(t: SystemTime) -> Self {
        let unix_ns = t
            .duration_since(UNIX_EPOCH)
            .ok()
            .and_then(|d| i64::try_from(d.as_nanos()).ok());
        match unix_ns {
            Some(ns) => Self::from_unix_nanoseconds(ns),
            None => Self::INVALID,
        }
    }
}

impl fmt::Display for CanonicalTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{} ({} ns)", self.to_iso8601(), self.0)
        } else {
            f.write_str("invalid")
        }
    }
}

impl fmt::Debug for CanonicalTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Format a nanosecond duration like `1:45:35.975000000`.
#[must_use]
pub fn format_clock_time(nanoseconds: u64) -> String {
    let ns_per_sec = 1_000_000_000;
    let (secs, ns) = (nanoseconds / ns_per_sec, nanoseconds % ns_per_sec);
    let (mins, secs) = (secs / 60, secs % 60);
    let (hours, mins) = (mins / 60, mins % 60);
    format!("{hours}:{mins:02}:{secs:02}.{ns:09}")
}
