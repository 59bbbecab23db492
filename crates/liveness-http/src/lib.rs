//! HTTP liveness endpoint for stream-liveness.
//!
//! This crate provides:
//! - The `/ishealthy` endpoint an orchestrator polls, answered purely from
//!   cached idle-tracker state
//! - A [`Supervisor`] that binds probes to trackers and runs the endpoint on
//!   its own background thread, independent of the pipeline's data path
//!
//! # Usage
//!
//! ```ignore
//! use liveness_http::Supervisor;
//!
//! let mut supervisor = Supervisor::new(config.health_check.clone());
//! supervisor.add_probe(&mut topology, "sink:sink".parse()?)?;
//! supervisor.start()?;
//!
//! // Run the pipeline...
//!
//! supervisor.stop();
//! ```

mod endpoint;
mod supervisor;

pub use endpoint::*;
pub use supervisor::*;
