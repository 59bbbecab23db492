#![doc = "Common types shared across the stream-liveness workspace."]

pub mod config;
pub mod error;
pub mod normalize;
pub mod time;

pub use config::*;
pub use error::*;
pub use normalize::*;
pub use time::*;
