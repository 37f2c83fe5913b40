//! mDNS discovery of the weather device.
//!
//! Browses the local network for the station's DNS-SD service type and feeds
//! presence transitions to the supervisor. The locator is a small state
//! machine: Searching until a service resolves, Found until that service is
//! removed, then Searching again. A discovery attempt that finds nothing
//! within the window is abandoned and retried after a backoff, forever.

use crate::error::{Result, StationError};
use crate::link::{DeviceHandle, DiscoveryEvent, LinkConfig};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

/// Locates the weather device via DNS-SD and reports presence changes.
pub struct DeviceLocator {
    service_type: String,
    window: Duration,
    backoff: Duration,
}

enum SessionEnd {
    /// Device appeared and later went away; rediscover immediately
    Lost,
    /// Nothing resolved within the window
    WindowElapsed,
    /// Event consumer went away; stop discovering
    Closed,
}

impl DeviceLocator {
    /// Create a locator from the link configuration.
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            service_type: config.service_type.clone(),
            window: config.discovery_window,
            backoff: config.discovery_backoff,
        }
    }

    /// Run discovery forever, emitting events on `events`.
    ///
    /// Guarantees: `Found` is never emitted twice without an intervening
    /// `Lost`, and `Lost` never without a prior `Found`. Returns when the
    /// event receiver is dropped.
    pub async fn run(self, events: mpsc::Sender<DiscoveryEvent>) {
        info!(
            "Starting DNS-SD discovery for service type {}",
            self.service_type
        );
        loop {
            match self.browse_session(&events).await {
                Ok(SessionEnd::Lost) => {
                    debug!("Device lost, restarting discovery");
                }
                Ok(SessionEnd::WindowElapsed) => {
                    info!(
                        "No device found after {:?}, retrying in {:?}",
                        self.window, self.backoff
                    );
                    sleep(self.backoff).await;
                }
                Ok(SessionEnd::Closed) => break,
                Err(e) => {
                    warn!("Discovery attempt failed: {}, retrying in {:?}", e, self.backoff);
                    sleep(self.backoff).await;
                }
            }
            if events.is_closed() {
                break;
            }
        }
    }

    /// One browse session: search within the window, then track the resolved
    /// device until it is removed.
    async fn browse_session(&self, events: &mpsc::Sender<DiscoveryEvent>) -> Result<SessionEnd> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| StationError::discovery_error(format!("mDNS daemon: {e}")))?;
        let receiver = daemon
            .browse(&self.service_type)
            .map_err(|e| StationError::discovery_error(format!("mDNS browse: {e}")))?;

        let deadline = Instant::now() + self.window;
        let mut current: Option<String> = None;

        let end = loop {
            // The window only bounds the search phase; once a device is held
            // we wait indefinitely for its removal.
            let received = if current.is_none() {
                match timeout_at(deadline, receiver.recv_async()).await {
                    Ok(received) => received,
                    Err(_) => break Ok(SessionEnd::WindowElapsed),
                }
            } else {
                receiver.recv_async().await
            };

            let event = match received {
                Ok(event) => event,
                Err(e) => {
                    if current.is_some() && events.send(DiscoveryEvent::Lost).await.is_err() {
                        break Ok(SessionEnd::Closed);
                    }
                    break Err(StationError::discovery_error(format!(
                        "mDNS event channel closed: {e}"
                    )));
                }
            };

            match event {
                ServiceEvent::ServiceResolved(info) => {
                    let fullname = info.get_fullname().to_string();
                    if current.as_deref() == Some(fullname.as_str()) {
                        continue;
                    }
                    let handle = handle_from_service(&info);
                    info!(
                        "Weather device found: {} at {}:{}",
                        handle.name, handle.address, handle.port
                    );
                    // A different advertisement replaces the held device
                    // wholesale, with an explicit Lost in between.
                    if current.is_some() && events.send(DiscoveryEvent::Lost).await.is_err() {
                        break Ok(SessionEnd::Closed);
                    }
                    if events.send(DiscoveryEvent::Found(handle)).await.is_err() {
                        break Ok(SessionEnd::Closed);
                    }
                    current = Some(fullname);
                }
                ServiceEvent::ServiceRemoved(_, fullname) => {
                    if current.as_deref() == Some(fullname.as_str()) {
                        info!("Weather device went offline: {}", fullname);
                        if events.send(DiscoveryEvent::Lost).await.is_err() {
                            break Ok(SessionEnd::Closed);
                        }
                        break Ok(SessionEnd::Lost);
                    }
                    debug!("Ignoring removal of unrelated service {}", fullname);
                }
                other => {
                    debug!("mDNS event: {:?}", other);
                }
            }
        };

        let _ = daemon.stop_browse(&self.service_type);
        let _ = daemon.shutdown();
        end
    }

    /// One-shot probe: resolve the first matching device within `window`.
    pub async fn probe(service_type: &str, window: Duration) -> Result<Option<DeviceHandle>> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| StationError::discovery_error(format!("mDNS daemon: {e}")))?;
        let receiver = daemon
            .browse(service_type)
            .map_err(|e| StationError::discovery_error(format!("mDNS browse: {e}")))?;

        let deadline = Instant::now() + window;
        let found = loop {
            match timeout_at(deadline, receiver.recv_async()).await {
                Err(_) => break None,
                Ok(Err(_)) => break None,
                Ok(Ok(ServiceEvent::ServiceResolved(info))) => {
                    break Some(handle_from_service(&info))
                }
                Ok(Ok(_)) => continue,
            }
        };

        let _ = daemon.stop_browse(service_type);
        let _ = daemon.shutdown();
        Ok(found)
    }
}

fn handle_from_service(info: &ServiceInfo) -> DeviceHandle {
    // Prefer an IPv4 address; fall back to the advertised hostname.
    let address = info
        .get_addresses()
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| info.get_addresses().iter().next())
        .map(ToString::to_string)
        .unwrap_or_else(|| info.get_hostname().trim_end_matches('.').to_string());

    DeviceHandle {
        name: info.get_fullname().to_string(),
        address,
        port: info.get_port(),
    }
}
