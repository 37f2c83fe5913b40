//! Periodic HTTP snapshot polling.
//!
//! The slow channel: a full `current_conditions` reading on a fixed
//! interval. Each successful poll replaces the base snapshot wholesale and
//! triggers a merge and broadcast; failures keep the stale snapshot and are
//! retried on the next tick unconditionally.

use crate::error::{Result, StationError};
use crate::link::supervisor::Supervisor;
use crate::link::DeviceHandle;
use crate::station::data::{unwrap_device_payload, StationReading};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Fetch a full conditions reading from the device.
pub async fn fetch_conditions(
    client: &reqwest::Client,
    handle: &DeviceHandle,
) -> Result<StationReading> {
    let url = format!("{}/v1/current_conditions", handle.base_url());
    debug!("Polling current conditions from {}", url);

    let body: Value = client.get(&url).send().await?.json().await?;
    let payload = unwrap_device_payload(&body);
    serde_json::from_value(payload.clone())
        .map_err(|e| StationError::parse_error(format!("current conditions: {e}")))
}

/// Poll loop for one device generation. Polls immediately, then on the
/// configured interval, until the generation moves on.
pub(crate) async fn run_poll_loop(
    supervisor: Arc<Supervisor>,
    handle: DeviceHandle,
    generation: u64,
) {
    let mut ticker = tokio::time::interval(supervisor.config().poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if supervisor.state().generation() != generation {
            break;
        }

        match fetch_conditions(supervisor.client(), &handle).await {
            Ok(reading) => {
                if !supervisor.ingest_http(generation, &handle, reading).await {
                    break;
                }
            }
            Err(e) => {
                warn!("Conditions poll failed: {}", e);
            }
        }
    }
    debug!("Poll loop stopped for {}", handle.name);
}
