//! Integration tests for stream-liveness acceptance testing.
//!
//! Every HTTP test binds `127.0.0.1:0`, so the suite needs no privileges
//! and can run in parallel.

mod common;
mod liveness_test;
mod timestamp_test;
