//! Capture timestamp normalization.
//!
//! Sits directly behind a capture source and turns raw presentation
//! timestamps into monotonic [`CanonicalTimestamp`]s. Units whose
//! timestamp converts to the invalid sentinel are dropped rather than
//! tagged downstream, until the raw timestamps pass
//! [`UNCONVERTIBLE_GRACE`] and the stream fails instead.

use crate::time::{CanonicalTimestamp, TimeDomain, TimestampError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{error, info, trace, warn};

/// If the output timestamp would decrease, it is set to the previous
/// output plus this amount instead.
pub const PTS_CORRECTION_DELTA: Duration = Duration::from_millis(15);

/// RTSP sources emit near-zero timestamps for the first few seconds before
/// their first sender report. Unconvertible raw timestamps beyond this are
/// an error.
pub const UNCONVERTIBLE_GRACE: Duration = Duration::from_secs(15);

/// How raw input timestamps are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InputTimestampMode {
    /// Nanoseconds since the NTP epoch, not including leap seconds.
    /// RTSP sources with RTCP sender reports produce these.
    #[default]
    Ntp,
    /// Nanoseconds since 1970-01-01 00:00:00 TAI.
    Tai,
    /// Nanoseconds since the Unix epoch, not including leap seconds.
    UnixUtc,
    /// The first unit corresponds with the current time; every later unit
    /// is shifted by the same offset.
    StartAtCurrentTime,
    /// The first unit corresponds with a fixed start time; every later unit
    /// is shifted by the same offset.
    StartAtFixedTime,
}

impl InputTimestampMode {
    /// The time domain for the direct conversion modes.
    #[must_use]
    pub fn domain(self) -> Option<TimeDomain> {
        match self {
            Self::Ntp => Some(TimeDomain::Ntp),
            Self::Tai => Some(TimeDomain::Tai),
            Self::UnixUtc => Some(TimeDomain::UnixUtc),
            Self::StartAtCurrentTime | Self::StartAtFixedTime => None,
        }
    }
}

impl fmt::Display for InputTimestampMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ntp => write!(f, "ntp"),
            Self::Tai => write!(f, "tai"),
            Self::UnixUtc => write!(f, "unix_utc"),
            Self::StartAtCurrentTime => write!(f, "start_at_current_time"),
            Self::StartAtFixedTime => write!(f, "start_at_fixed_time"),
        }
    }
}

/// Stateful converter from raw capture timestamps to monotonic TAI timestamps.
#[derive(Debug)]
pub struct TimestampNormalizer {
    mode: InputTimestampMode,
    start_timestamp: CanonicalTimestamp,
    offset_ns: Option<i64>,
    prev_input: Option<CanonicalTimestamp>,
    prev_output: CanonicalTimestamp,
    dropped: u64,
    corrected: u64,
}

impl TimestampNormalizer {
    /// Create a normalizer for `mode`.
    ///
    /// `start_timestamp` is only used by [`InputTimestampMode::StartAtFixedTime`].
    #[must_use]
    pub fn new(mode: InputTimestampMode, start_timestamp: CanonicalTimestamp) -> Self {
        Self {
            mode,
            start_timestamp,
            offset_ns: None,
            prev_input: None,
            prev_output: CanonicalTimestamp::INVALID,
            dropped: 0,
            corrected: 0,
        }
    }

    /// The configured input mode.
    #[must_use]
    pub fn mode(&self) -> InputTimestampMode {
        self.mode
    }

    /// Offset latched from the first unit in the offset modes.
    #[must_use]
    pub fn offset_ns(&self) -> Option<i64> {
        self.offset_ns
    }

    /// Number of units dropped because their timestamp was unconvertible.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Number of outputs bumped forward to stay monotonic.
    #[must_use]
    pub fn corrected(&self) -> u64 {
        self.corrected
    }

    /// Normalize one raw timestamp.
    ///
    /// Returns `Ok(None)` when the unit must be dropped.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::Unconvertible`] when the raw timestamp
    /// cannot be converted and is later than [`UNCONVERTIBLE_GRACE`].
    pub fn normalize(&mut self, raw_ns: i64) -> Result<Option<CanonicalTimestamp>, TimestampError> {
        let input = self.convert(raw_ns);
        if !input.is_valid() {
            self.dropped += 1;
            warn!(
                raw_ns,
                mode = %self.mode,
                "Dropping data unit because its timestamp cannot be converted to TAI"
            );
            let grace_ns = i64::try_from(UNCONVERTIBLE_GRACE.as_nanos()).unwrap_or(i64::MAX);
            if raw_ns > grace_ns {
                error!(
                    raw_ns,
                    mode = %self.mode,
                    "Input timestamps are not valid. An RTSP source that sends no RTCP \
                     sender reports causes this; set timestamp_mode to start_at_current_time \
                     at the cost of timestamp accuracy"
                );
                return Err(TimestampError::Unconvertible {
                    raw_ns,
                    mode: self.mode.to_string(),
                });
            }
            return Ok(None);
        }

        let prev_input = self.prev_input;
        let output = match prev_input {
            Some(prev) if prev == input => self.prev_output,
            Some(_) if self.prev_output < input => input,
            Some(_) => {
                let delta_ns =
                    i64::try_from(PTS_CORRECTION_DELTA.as_nanos()).unwrap_or(i64::MAX);
                let bumped = self.prev_output.offset_by(delta_ns);
                warn!(
                    previous = %self.prev_output,
                    would_be = %input,
                    corrected = %bumped,
                    "Output timestamp would have decreased, correcting"
                );
                self.corrected += 1;
                bumped
            }
            None => input,
        };

        trace!(raw_ns, output = %output, "Normalized timestamp");
        self.prev_input = Some(input);
        self.prev_output = output;
        Ok(Some(output))
    }

    fn convert(&mut self, raw_ns: i64) -> CanonicalTimestamp {
        if let Some(domain) = self.mode.domain() {
            return CanonicalTimestamp::from_raw_nanoseconds(raw_ns, domain);
        }

        let offset_ns = match self.offset_ns {
            Some(offset) => offset,
            None => {
                let anchor = match self.mode {
                    InputTimestampMode::StartAtCurrentTime => CanonicalTimestamp::now(),
                    _ => self.start_timestamp,
                };
                let offset = anchor.nanoseconds().saturating_sub(raw_ns);
                info!(
                    offset_ns = offset,
                    mode = %self.mode,
                    "Input timestamps will be shifted by a fixed offset"
                );
                self.offset_ns = Some(offset);
                offset
            }
        };
        CanonicalTimestamp::from_nanoseconds(raw_ns).offset_by(offset_ns)
    }
}
