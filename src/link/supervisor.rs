//! The coordinating component of the pipeline.
//!
//! All mutable "current state" lives in one [`SharedState`] owned here:
//! device handle, lease, base snapshot, and overlay are each single-writer
//! and replaced atomically behind their own lock. Device-scoped loops are
//! tagged with a generation counter captured at spawn; losing the device
//! bumps the counter, so a poll or renewal callback that was already in
//! flight recognizes itself as stale and drops its result instead of
//! reviving dead state.

use crate::error::Result;
use crate::link::{lease, poller, udp, DeviceHandle, DiscoveryEvent, Lease, LinkConfig};
use crate::link::discovery::DeviceLocator;
use crate::station::data::{DataSource, Envelope, StationReading};
use crate::station::merge::merge;
use crate::station::rain::convert_rain_fields;
use crate::web::websocket::Broadcaster;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{info, warn};

/// Shared pipeline state, single-writer per slot.
#[derive(Debug, Default)]
pub struct SharedState {
    /// The currently held device, written only by the supervisor
    pub device: RwLock<Option<DeviceHandle>>,
    /// The active broadcast lease, written only by the renewal loop
    pub lease: RwLock<Option<Lease>>,
    /// Latest full HTTP reading, rain fields already converted
    pub base: RwLock<Option<StationReading>>,
    /// Latest partial UDP reading, rain fields still raw counts
    pub overlay: RwLock<Option<StationReading>>,
    generation: AtomicU64,
}

impl SharedState {
    /// The current device generation. Loops capture this at spawn and stop
    /// once it moves on.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Coordinates discovery, ingestion, merging, and fan-out.
pub struct Supervisor {
    state: Arc<SharedState>,
    broadcaster: Broadcaster,
    config: LinkConfig,
    client: reqwest::Client,
    // Port instructions carry the device generation they were issued for.
    port_tx: watch::Sender<Option<(u16, u64)>>,
}

impl Supervisor {
    /// Create a supervisor publishing merged state through `broadcaster`.
    pub fn new(config: LinkConfig, broadcaster: Broadcaster) -> Result<Arc<Self>> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        let (port_tx, _) = watch::channel(None);

        Ok(Arc::new(Self {
            state: Arc::new(SharedState::default()),
            broadcaster,
            config,
            client,
            port_tx,
        }))
    }

    /// Handle to the shared pipeline state.
    pub fn state(&self) -> Arc<SharedState> {
        Arc::clone(&self.state)
    }

    /// The link configuration this supervisor runs with.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub(crate) fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Run the full pipeline: discovery, UDP listener, and per-device loops.
    /// Returns when the discovery task ends (it only does when shutting down).
    pub async fn run(self: Arc<Self>) {
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let locator = DeviceLocator::new(&self.config);
        tokio::spawn(locator.run(event_tx));
        Arc::clone(&self).spawn_udp_listener();

        while let Some(event) = event_rx.recv().await {
            match event {
                DiscoveryEvent::Found(handle) => {
                    Arc::clone(&self).on_device_found(handle).await
                }
                DiscoveryEvent::Lost => self.on_device_lost().await,
            }
        }
    }

    /// Spawn the long-lived UDP listener task. It is device-agnostic: the
    /// lease loop feeds it ports, device loss feeds it `None`.
    pub fn spawn_udp_listener(self: Arc<Self>) {
        let port_rx = self.port_tx.subscribe();
        tokio::spawn(udp::run_listener(self, port_rx));
    }

    /// Device appeared: record it and start the device-scoped loops.
    pub async fn on_device_found(self: Arc<Self>, handle: DeviceHandle) {
        info!(
            "Using weather device {} at {}:{}",
            handle.name, handle.address, handle.port
        );
        *self.state.device.write().await = Some(handle.clone());

        let generation = self.state.generation();
        tokio::spawn(poller::run_poll_loop(
            Arc::clone(&self),
            handle.clone(),
            generation,
        ));
        tokio::spawn(lease::run_renewal_loop(self, handle, generation));
    }

    /// Device disappeared: cancel device-scoped work and clear its state.
    pub async fn on_device_lost(&self) {
        warn!("Weather device went offline, clearing state");
        self.state.bump_generation();
        *self.state.device.write().await = None;
        *self.state.lease.write().await = None;
        *self.state.base.write().await = None;
        *self.state.overlay.write().await = None;
        self.set_udp_port(None);
    }

    /// Instruct the UDP listener which port to be bound to, `None` meaning
    /// unbound. The listener ignores instructions matching its current bind.
    /// Instructions are stamped with the current device generation so
    /// datagrams from a socket that outlived its device read as stale.
    pub fn set_udp_port(&self, port: Option<u16>) {
        let instruction = port.map(|p| (p, self.state.generation()));
        let _ = self.port_tx.send(instruction);
    }

    /// Record a freshly activated lease, unless the device generation has
    /// moved on. Returns whether the lease was stored.
    pub async fn store_lease(&self, generation: u64, broadcast_port: u16) -> bool {
        let mut guard = self.state.lease.write().await;
        if self.state.generation() != generation {
            return false;
        }
        let changed = guard.as_ref().map(|l| l.broadcast_port) != Some(broadcast_port);
        *guard = Some(Lease::new(broadcast_port, self.config.realtime_duration));
        drop(guard);

        if changed {
            info!("UDP broadcast port is now {}", broadcast_port);
        }
        // Sent unconditionally so a listener whose socket died can reopen on
        // the next renewal even when the port value did not change. Stamped
        // with the generation verified under the lock above.
        let _ = self.port_tx.send(Some((broadcast_port, generation)));
        true
    }

    /// Ingest a full HTTP reading: convert rain counts, swap the base
    /// snapshot, and publish a merge tagged `http`. Returns false (leaving
    /// state untouched) when the device generation has moved on.
    pub async fn ingest_http(
        &self,
        generation: u64,
        handle: &DeviceHandle,
        reading: StationReading,
    ) -> bool {
        let converted = StationReading {
            did: reading.did,
            ts: reading.ts,
            conditions: reading.conditions.iter().map(convert_rain_fields).collect(),
        };

        {
            let mut base = self.state.base.write().await;
            if self.state.generation() != generation {
                return false;
            }
            *base = Some(converted);
        }

        self.publish(DataSource::Http, handle.http_source()).await;
        true
    }

    /// Ingest a partial UDP reading: swap the overlay and publish a merge
    /// tagged `udp`. Returns false (leaving state untouched) when the device
    /// generation the datagram's socket was bound for has moved on.
    pub async fn ingest_udp(
        &self,
        generation: u64,
        reading: StationReading,
        peer: SocketAddr,
    ) -> bool {
        {
            let mut overlay = self.state.overlay.write().await;
            if self.state.generation() != generation {
                return false;
            }
            *overlay = Some(reading);
        }

        self.publish(DataSource::Udp, format!("{peer} (UDP)")).await;
        true
    }

    async fn publish(&self, data_source: DataSource, source: String) {
        let base = self.state.base.read().await;
        let overlay = self.state.overlay.read().await;
        if let Some(merged) = merge(base.as_ref(), overlay.as_ref()) {
            self.broadcaster
                .publish(Envelope::new(source, merged, data_source));
        }
    }
}
