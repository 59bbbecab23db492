//! Activity probes and the observation-point contract.
//!
//! The pipeline that carries the data is external. It exposes named
//! observation points (an element and one of its pads) through
//! [`PipelineTopology`], and calls every attached [`DataObserver`]
//! synchronously as each data unit passes. An [`ActivityProbe`] is the
//! observer that refreshes an [`IdleTracker`]; it never alters, delays, or
//! drops the data.

use crate::idle::IdleTracker;
use liveness_common::error::{LivenessError, LivenessResult};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// A named location in an external pipeline: an element and one of its pads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObservationPoint {
    element: String,
    pad: String,
}

impl ObservationPoint {
    /// Pad used when a specifier names only the element.
    pub const DEFAULT_PAD: &'static str = "sink";

    /// Create an observation point.
    pub fn new(element: impl Into<String>, pad: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            pad: pad.into(),
        }
    }

    /// Element name.
    #[must_use]
    pub fn element(&self) -> &str {
        &self.element
    }

    /// Pad name on the element.
    #[must_use]
    pub fn pad(&self) -> &str {
        &self.pad
    }
}

impl FromStr for ObservationPoint {
    type Err = LivenessError;

    /// Parse `element` or `element:pad`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LivenessError::InvalidObservationPoint(s.to_string());
        let (element, pad) = match s.split_once(':') {
            Some((element, pad)) => (element.trim(), pad.trim()),
            None => (s.trim(), Self::DEFAULT_PAD),
        };
        if element.is_empty() || pad.is_empty() || pad.contains(':') {
            return Err(invalid());
        }
        Ok(Self::new(element, pad))
    }
}

impl fmt::Display for ObservationPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.element, self.pad)
    }
}

/// Callback invoked by the pipeline for each data unit at an observation point.
///
/// Runs on the pipeline's own thread, so implementations must be brief and
/// must not block.
pub trait DataObserver: Send + Sync {
    /// A data unit passed the point this observer is attached to.
    fn on_data_unit(&self);
}

/// The part of an external pipeline that activity probes can attach to.
pub trait PipelineTopology {
    /// Attach `observer` to `point`.
    ///
    /// # Errors
    ///
    /// Returns [`LivenessError::ElementNotFound`] or
    /// [`LivenessError::PadNotFound`] if the point does not exist. This is
    /// a configuration error and must not be retried.
    fn attach_observer(
        &mut self,
        point: &ObservationPoint,
        observer: Arc<dyn DataObserver>,
    ) -> LivenessResult<()>;
}

/// Refreshes an idle tracker every time data passes its observation point.
#[derive(Debug)]
pub struct ActivityProbe {
    point: ObservationPoint,
    tracker: Arc<IdleTracker>,
}

impl ActivityProbe {
    /// Create a probe feeding `tracker`. Several probes may share one tracker.
    #[must_use]
    pub fn new(point: ObservationPoint, tracker: Arc<IdleTracker>) -> Self {
        Self { point, tracker }
    }

    /// Attach a new probe to `point` in `topology`.
    ///
    /// # Errors
    ///
    /// Fails immediately if the observation point does not exist.
    pub fn register(
        topology: &mut dyn PipelineTopology,
        point: ObservationPoint,
        tracker: Arc<IdleTracker>,
    ) -> LivenessResult<Arc<ActivityProbe>> {
        let probe = Arc::new(Self::new(point, tracker));
        topology.attach_observer(&probe.point, Arc::clone(&probe) as Arc<dyn DataObserver>)?;
        info!(point = %probe.point, "Activity probe registered");
        Ok(probe)
    }

    /// Where this probe is attached.
    #[must_use]
    pub fn point(&self) -> &ObservationPoint {
        &self.point
    }

    /// The tracker this probe refreshes.
    #[must_use]
    pub fn tracker(&self) -> &Arc<IdleTracker> {
        &self.tracker
    }
}

impl DataObserver for ActivityProbe {
    #[inline]
    fn on_data_unit(&self) {
        self.tracker.update();
        debug!(point = %self.point, "{}", self.tracker.describe());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::topology::SimulatedTopology;
    use std::time::Duration;

    fn topology() -> SimulatedTopology {
        SimulatedTopology::new()
            .with_element("src", &["src"])
            .with_element("sink", &["sink"])
    }

    #[test]
    fn test_parse_observation_point() {
        let point: ObservationPoint = "timestampcvt:src".parse().unwrap();
        assert_eq!(point.element(), "timestampcvt");
        assert_eq!(point.pad(), "src");

        let point: ObservationPoint = "sink".parse().unwrap();
        assert_eq!(point.pad(), ObservationPoint::DEFAULT_PAD);
        assert_eq!(point.to_string(), "sink:sink");

        for bad in ["", ":sink", "sink:", "a:b:c"] {
            assert!(bad.parse::<ObservationPoint>().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_probe_updates_tracker() {
        let clock = Arc::new(ManualClock::new());
        let threshold = Duration::from_secs(5);
        let tracker = Arc::new(IdleTracker::with_clock(
            threshold,
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));
        let mut topology = topology();

        ActivityProbe::register(&mut topology, "sink".parse().unwrap(), Arc::clone(&tracker))
            .unwrap();
        assert!(!tracker.is_healthy(threshold));

        topology.push("sink", "sink");
        assert!(tracker.is_healthy(threshold));
        assert_eq!(tracker.update_count(), 1);

        // Data at an unprobed point does not count
        clock.advance(Duration::from_secs(6));
        topology.push("src", "src");
        assert!(!tracker.is_healthy(threshold));
    }

    #[test]
    fn test_shared_tracker_across_probes() {
        let tracker = Arc::new(IdleTracker::new(Duration::from_secs(5)));
        let mut topology = topology();
        for point in ["src:src", "sink"] {
            ActivityProbe::register(&mut topology, point.parse().unwrap(), Arc::clone(&tracker))
                .unwrap();
        }

        topology.push("src", "src");
        topology.push("sink", "sink");
        assert_eq!(tracker.update_count(), 2);
    }

    #[test]
    fn test_missing_element_is_rejected() {
        let tracker = Arc::new(IdleTracker::new(Duration::from_secs(5)));
        let mut topology = topology();
        let err = ActivityProbe::register(&mut topology, "decoder".parse().unwrap(), tracker)
            .unwrap_err();
        assert_eq!(err, LivenessError::ElementNotFound("decoder".into()));
    }

    #[test]
    fn test_missing_pad_is_rejected() {
        let tracker = Arc::new(IdleTracker::new(Duration::from_secs(5)));
        let mut topology = topology();
        let err = ActivityProbe::register(&mut topology, "src:sink".parse().unwrap(), tracker)
            .unwrap_err();
        assert_eq!(
            err,
            LivenessError::PadNotFound {
                element: "src".into(),
                pad: "sink".into()
            }
        );
    }
}
