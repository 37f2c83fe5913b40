//! # windrose - Live Weather Telemetry Fusion
//!
//! Ingests telemetry from a WeatherLink-Live-style station on the local
//! network over two independent channels - a slow periodic HTTP snapshot and
//! a fast push UDP broadcast - fuses them into one consistent weather state,
//! and streams every merged update to WebSocket subscribers.
//!
//! ## Features
//!
//! - **Zero-configuration discovery**: the station is located via DNS-SD and
//!   re-located automatically when it drops off the network
//! - **Dual-channel fusion**: full HTTP readings form the base state, UDP
//!   push updates overlay wind and rain fields within seconds
//! - **Rain calibration**: raw bucket-tip counts are converted to inches
//!   using the device-reported collector size
//! - **Live dashboard**: merged state pushed over WebSocket to any number of
//!   clients, best-effort per subscriber
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use windrose::{start_web_server, AppState, Broadcaster, LinkConfig, Supervisor, WebConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broadcaster = Broadcaster::new(64);
//!     let supervisor = Supervisor::new(LinkConfig::default(), broadcaster.clone())?;
//!     let state = AppState { broadcaster, station: supervisor.state() };
//!
//!     tokio::spawn(supervisor.run());
//!     start_web_server(WebConfig::default(), state).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod link;
pub mod station;
pub mod web;

// Re-export public API
pub use error::{Result, StationError};
pub use link::{
    DeviceHandle, DeviceLocator, DiscoveryEvent, Lease, LinkConfig, SharedState, Supervisor,
};
pub use station::{
    data::{ConditionRecord, DataSource, Envelope, StationReading},
    merge::merge,
    rain::{convert_rain_fields, convert_rain_value},
};
pub use web::{start_web_server, AppState, Broadcaster, WebConfig};

/// The DNS-SD service type the station advertises.
pub const SERVICE_TYPE: &str = "_weatherlinklive._tcp.local.";

/// The default web server port
pub const DEFAULT_WEB_PORT: u16 = 3000;

/// Seconds between HTTP snapshot polls
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Broadcast duration requested from the device (1 hour)
pub const REALTIME_DURATION_SECS: u64 = 3600;

/// Lease renewal cadence (50 minutes, a safety margin before expiry)
pub const REALTIME_REFRESH_SECS: u64 = 3000;

/// How long one discovery attempt waits for the device
pub const DISCOVERY_WINDOW_SECS: u64 = 10;

/// Pause between failed discovery attempts
pub const DISCOVERY_BACKOFF_SECS: u64 = 30;
