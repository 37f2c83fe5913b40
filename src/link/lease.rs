//! Real-time broadcast lease activation and renewal.
//!
//! The device only streams UDP for a requested duration, so the lease is
//! re-activated on a cadence comfortably inside that duration. Renewal
//! failures are non-fatal: the previous lease stays in place and the next
//! cycle tries again.

use crate::error::{Result, StationError};
use crate::link::supervisor::Supervisor;
use crate::link::DeviceHandle;
use crate::station::data::unwrap_device_payload;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct RealtimeResponse {
    #[serde(default)]
    broadcast_port: Option<u16>,
}

/// Ask the device to broadcast for `duration`, returning the UDP port it
/// will stream to.
pub async fn activate(
    client: &reqwest::Client,
    handle: &DeviceHandle,
    duration: Duration,
) -> Result<u16> {
    let url = format!(
        "{}/v1/real_time?duration={}",
        handle.base_url(),
        duration.as_secs()
    );
    debug!("Activating real-time UDP broadcast: {}", url);

    let body: Value = client.get(&url).send().await?.json().await?;
    let payload = unwrap_device_payload(&body);
    let response: RealtimeResponse = serde_json::from_value(payload.clone())
        .map_err(|e| StationError::parse_error(format!("real-time response: {e}")))?;

    response
        .broadcast_port
        .ok_or_else(|| StationError::lease_error("no broadcast_port in real-time response"))
}

/// Renewal loop for one device generation.
///
/// Activates immediately, then re-activates every refresh interval. Exits as
/// soon as the generation moves on, so a renewal scheduled before device
/// loss never fires into fresh state.
pub(crate) async fn run_renewal_loop(
    supervisor: Arc<Supervisor>,
    handle: DeviceHandle,
    generation: u64,
) {
    loop {
        if supervisor.state().generation() != generation {
            break;
        }

        match activate(
            supervisor.client(),
            &handle,
            supervisor.config().realtime_duration,
        )
        .await
        {
            Ok(port) => {
                if !supervisor.store_lease(generation, port).await {
                    break;
                }
            }
            Err(e) => {
                // Keep the previous lease; the next cycle retries.
                warn!("Real-time activation failed: {}", e);
            }
        }

        tokio::time::sleep(supervisor.config().realtime_refresh).await;
    }
    debug!("Lease renewal loop stopped for {}", handle.name);
}
