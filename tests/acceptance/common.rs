//! Common utilities for integration tests.
//!
//! Provides helpers for:
//! - Building health check configurations on an ephemeral port
//! - A minimal HTTP/1.1 client over `std::net::TcpStream`
//! - The three-element pipeline topology the daemon uses

use liveness_common::config::{HealthCheckConfig, TrackerBinding};
use liveness_monitor::SimulatedTopology;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

/// A parsed HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code from the status line.
    pub status: u16,
    /// Body after the header block.
    pub body: String,
}

/// Enabled configuration bound to an ephemeral loopback port.
pub fn enabled_config(idle_threshold: Duration, binding: TrackerBinding) -> HealthCheckConfig {
    HealthCheckConfig {
        enabled: true,
        idle_threshold,
        bind_host: "127.0.0.1".into(),
        bind_port: 0,
        binding,
    }
}

/// A loopback port that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

/// `src ! timestampcvt ! sink` with the daemon's pad names.
pub fn pipeline_topology() -> SimulatedTopology {
    SimulatedTopology::new()
        .with_element("src", &["src"])
        .with_element("timestampcvt", &["sink", "src"])
        .with_element("sink", &["sink"])
}

/// Send a request and read the whole response.
pub fn request(addr: SocketAddr, method: &str, path: &str) -> std::io::Result<HttpResponse> {
    let mut stream = TcpStream::connect_timeout(&addr, Duration::from_secs(2))?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    write!(
        stream,
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n"
    )?;

    let mut raw = String::new();
    stream.read_to_string(&mut raw)?;

    let status = raw
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, raw.clone()))?;
    let body = raw
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    Ok(HttpResponse { status, body })
}

/// `GET path`, panicking on transport errors.
pub fn get(addr: SocketAddr, path: &str) -> HttpResponse {
    request(addr, "GET", path).expect("HTTP request")
}
