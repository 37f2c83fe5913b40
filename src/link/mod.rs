//! The device-facing pipeline: discovery, lease negotiation, both ingestion
//! channels, and the supervisor that coordinates them.

pub mod discovery;
pub mod lease;
pub mod poller;
pub mod supervisor;
pub mod udp;

// Re-export commonly used items
pub use discovery::DeviceLocator;
pub use supervisor::{SharedState, Supervisor};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identity of the discovered weather device.
///
/// Replaced wholesale when a different device advertisement appears and
/// cleared when the device is declared offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHandle {
    /// Advertised service instance name
    pub name: String,
    /// Resolved network address
    pub address: String,
    /// HTTP port
    pub port: u16,
}

impl DeviceHandle {
    /// Base URL for the device's HTTP API.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }

    /// Origin label used in published envelopes, e.g. `10.0.0.5:80 (HTTP)`.
    pub fn http_source(&self) -> String {
        format!("{}:{} (HTTP)", self.address, self.port)
    }
}

/// A negotiated real-time broadcast session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// UDP port the device will broadcast to
    pub broadcast_port: u16,
    /// When the device stops broadcasting unless renewed
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    /// Create a lease expiring `duration` from now.
    pub fn new(broadcast_port: u16, duration: Duration) -> Self {
        let duration = ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::zero());
        Self {
            broadcast_port,
            expires_at: Utc::now() + duration,
        }
    }

    /// Whether the lease deadline has passed.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Presence events emitted by the device locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A device was resolved on the local network
    Found(DeviceHandle),
    /// The current device went offline
    Lost,
}

/// Timing and endpoint configuration for the device link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// mDNS service type to browse for
    pub service_type: String,
    /// How long a single discovery attempt waits before backing off
    pub discovery_window: Duration,
    /// Pause between failed discovery attempts
    pub discovery_backoff: Duration,
    /// Interval between HTTP snapshot polls
    pub poll_interval: Duration,
    /// Broadcast duration requested from the device
    pub realtime_duration: Duration,
    /// Renewal cadence; must stay under `realtime_duration`
    pub realtime_refresh: Duration,
    /// Per-request timeout for device HTTP calls
    pub http_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            service_type: crate::SERVICE_TYPE.to_string(),
            discovery_window: Duration::from_secs(crate::DISCOVERY_WINDOW_SECS),
            discovery_backoff: Duration::from_secs(crate::DISCOVERY_BACKOFF_SECS),
            poll_interval: Duration::from_secs(crate::DEFAULT_POLL_INTERVAL_SECS),
            realtime_duration: Duration::from_secs(crate::REALTIME_DURATION_SECS),
            realtime_refresh: Duration::from_secs(crate::REALTIME_REFRESH_SECS),
            http_timeout: Duration::from_secs(10),
        }
    }
}

impl LinkConfig {
    /// Set the mDNS service type to browse for.
    pub fn with_service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = service_type.into();
        self
    }

    /// Set the HTTP snapshot poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the requested broadcast duration and renewal cadence together.
    pub fn with_realtime(mut self, duration: Duration, refresh: Duration) -> Self {
        self.realtime_duration = duration;
        self.realtime_refresh = refresh;
        self
    }

    /// Set the discovery window and retry backoff.
    pub fn with_discovery(mut self, window: Duration, backoff: Duration) -> Self {
        self.discovery_window = window;
        self.discovery_backoff = backoff;
        self
    }
}
