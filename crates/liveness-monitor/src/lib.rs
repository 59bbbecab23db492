//! Data-flow liveness monitoring.
//!
//! An [`IdleTracker`] records when data last passed a monitored point in an
//! external pipeline. [`ActivityProbe`]s are attached to those points and
//! refresh the tracker on every data unit; health checks read the tracker
//! from another thread without ever touching the data path.

pub mod clock;
pub mod idle;
pub mod probe;
pub mod topology;

pub use clock::*;
pub use idle::*;
pub use probe::*;
pub use topology::*;
