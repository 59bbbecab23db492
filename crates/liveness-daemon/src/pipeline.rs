//! Simulated capture pipeline.
//!
//! Stands in for a pipeline of the shape `src ! timestampcvt ! sink`. The
//! source stamps every unit with a capture time in the configured input
//! domain, `timestampcvt` normalizes it and drops units whose timestamp
//! cannot be converted (failing the stream once that persists), and the sink
//! consumes whatever reaches it. Activity
//! probes attach to the pads through [`SimulatedTopology`].

use liveness_common::config::{ConfigError, PipelineConfig};
use liveness_common::normalize::{InputTimestampMode, TimestampNormalizer};
use liveness_common::time::{
    CanonicalTimestamp, TimestampError, NANOS_PER_SECOND, UNIX_TO_NTP_SECONDS,
};
use liveness_monitor::SimulatedTopology;
use std::time::Duration;

/// Capture source element.
pub const SOURCE: &str = "src";
/// Timestamp normalizing element.
pub const CONVERTER: &str = "timestampcvt";
/// Terminal element.
pub const SINK: &str = "sink";

/// What happened to one scheduled data unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Reached the sink with this timestamp.
    Delivered(CanonicalTimestamp),
    /// Dropped by the converter.
    Dropped,
    /// The source has stopped producing.
    Stalled,
}

/// Counters for the shutdown summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Units produced by the source.
    pub emitted: u64,
    /// Units that reached the sink.
    pub delivered: u64,
    /// Units dropped for unconvertible timestamps.
    pub dropped: u64,
    /// Units whose timestamp was bumped to stay monotonic.
    pub corrected: u64,
}

/// Three-element pipeline driven one unit at a time.
pub struct SimulatedPipeline {
    topology: SimulatedTopology,
    normalizer: TimestampNormalizer,
    unit_interval: Duration,
    stall_after: Option<Duration>,
    invalid_warmup_units: u32,
    emitted: u64,
    delivered: u64,
}

impl SimulatedPipeline {
    /// Build the pipeline topology and its timestamp normalizer.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured start time is not RFC 3339.
    pub fn new(config: &PipelineConfig) -> Result<Self, ConfigError> {
        let normalizer =
            TimestampNormalizer::new(config.timestamp_mode, config.start_timestamp()?);
        let topology = SimulatedTopology::new()
            .with_element(SOURCE, &["src"])
            .with_element(CONVERTER, &["sink", "src"])
            .with_element(SINK, &["sink"]);

        Ok(Self {
            topology,
            normalizer,
            unit_interval: config.unit_interval,
            stall_after: config.stall_after,
            invalid_warmup_units: config.invalid_warmup_units,
            emitted: 0,
            delivered: 0,
        })
    }

    /// Topology that probes attach to.
    pub fn topology_mut(&mut self) -> &mut SimulatedTopology {
        &mut self.topology
    }

    /// Time between units.
    #[must_use]
    pub fn unit_interval(&self) -> Duration {
        self.unit_interval
    }

    /// Whether the source has stopped producing at `elapsed` since start.
    #[must_use]
    pub fn is_stalled(&self, elapsed: Duration) -> bool {
        self.stall_after.is_some_and(|after| elapsed >= after)
    }

    /// Produce one unit and push it as far through the pipeline as it goes.
    ///
    /// # Errors
    ///
    /// Returns the converter's error once unconvertible timestamps outlast
    /// the start-up grace period. No unit reaches the sink after that.
    pub fn step(&mut self, elapsed: Duration) -> Result<UnitOutcome, TimestampError> {
        if self.is_stalled(elapsed) {
            return Ok(UnitOutcome::Stalled);
        }

        let raw_ns = self.capture_timestamp();
        self.emitted += 1;
        self.topology.push(SOURCE, "src");
        self.topology.push(CONVERTER, "sink");

        match self.normalizer.normalize(raw_ns)? {
            Some(timestamp) => {
                self.topology.push(CONVERTER, "src");
                self.topology.push(SINK, "sink");
                self.delivered += 1;
                Ok(UnitOutcome::Delivered(timestamp))
            }
            None => Ok(UnitOutcome::Dropped),
        }
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            emitted: self.emitted,
            delivered: self.delivered,
            dropped: self.normalizer.dropped(),
            corrected: self.normalizer.corrected(),
        }
    }

    /// Presentation time of the next unit relative to stream start.
    fn stream_pts_ns(&self) -> i64 {
        let interval = i64::try_from(self.unit_interval.as_nanos()).unwrap_or(i64::MAX);
        interval.saturating_mul(i64::try_from(self.emitted).unwrap_or(i64::MAX))
    }

    fn capture_timestamp(&self) -> i64 {
        if self.emitted < u64::from(self.invalid_warmup_units) {
            return self.stream_pts_ns();
        }
        let now = CanonicalTimestamp::now();
        match self.normalizer.mode() {
            InputTimestampMode::Ntp => now
                .to_unix_nanoseconds()
                .saturating_add(UNIX_TO_NTP_SECONDS * NANOS_PER_SECOND),
            InputTimestampMode::Tai => now.nanoseconds(),
            InputTimestampMode::UnixUtc => now.to_unix_nanoseconds(),
            InputTimestampMode::StartAtCurrentTime | InputTimestampMode::StartAtFixedTime => {
                self.stream_pts_ns()
            }
        }
    }
}
