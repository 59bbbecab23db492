//! In-process pipeline topology.
//!
//! A named graph of elements and pads that dispatches data units to attached
//! observers. Used by the daemon's simulated pipeline and by tests that need
//! a [`PipelineTopology`] without a real media framework behind it.

use crate::probe::{DataObserver, ObservationPoint, PipelineTopology};
use liveness_common::error::{LivenessError, LivenessResult};
use std::sync::Arc;

struct SimulatedPad {
    name: String,
    observers: Vec<Arc<dyn DataObserver>>,
}

struct SimulatedElement {
    name: String,
    pads: Vec<SimulatedPad>,
}

/// Elements with named pads; observers are called synchronously on push.
#[derive(Default)]
pub struct SimulatedTopology {
    elements: Vec<SimulatedElement>,
}

impl SimulatedTopology {
    /// Create an empty topology.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`add_element`](Self::add_element).
    #[must_use]
    pub fn with_element(mut self, name: &str, pads: &[&str]) -> Self {
        self.add_element(name, pads);
        self
    }

    /// Add an element exposing `pads`.
    pub fn add_element(&mut self, name: &str, pads: &[&str]) {
        self.elements.push(SimulatedElement {
            name: name.to_string(),
            pads: pads
                .iter()
                .map(|p| SimulatedPad {
                    name: (*p).to_string(),
                    observers: Vec::new(),
                })
                .collect(),
        });
    }

    fn pad(&self, element: &str, pad: &str) -> Option<&SimulatedPad> {
        self.elements
            .iter()
            .find(|e| e.name == element)
            .and_then(|e| e.pads.iter().find(|p| p.name == pad))
    }

    /// A data unit passes `element:pad`. Returns false if the pad does not exist.
    pub fn push(&self, element: &str, pad: &str) -> bool {
        match self.pad(element, pad) {
            Some(p) => {
                for observer in &p.observers {
                    observer.on_data_unit();
                }
                true
            }
            None => false,
        }
    }

    /// Number of observers attached to `point`.
    #[must_use]
    pub fn observer_count(&self, point: &ObservationPoint) -> usize {
        self.pad(point.element(), point.pad())
            .map_or(0, |p| p.observers.len())
    }
}

impl PipelineTopology for SimulatedTopology {
    fn attach_observer(
        &mut self,
        point: &ObservationPoint,
        observer: Arc<dyn DataObserver>,
    ) -> LivenessResult<()> {
        let element = self
            .elements
            .iter_mut()
            .find(|e| e.name == point.element())
            .ok_or_else(|| LivenessError::ElementNotFound(point.element().to_string()))?;
        let pad = element
            .pads
            .iter_mut()
            .find(|p| p.name == point.pad())
            .ok_or_else(|| LivenessError::PadNotFound {
                element: point.element().to_string(),
                pad: point.pad().to_string(),
            })?;
        pad.observers.push(observer);
        Ok(())
    }
}
