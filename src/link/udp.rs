//! UDP overlay listener.
//!
//! Receives the device's push broadcasts on the leased port. The listener is
//! one long-lived task that owns at most one socket at a time: a rebind
//! instruction closes the current socket before opening the next, so two
//! sockets never overlap for the same logical stream. Bind failures leave
//! the listener unbound until the next lease renewal supplies a port again;
//! there is no independent retry timer.

use crate::link::supervisor::Supervisor;
use crate::station::data::StationReading;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const MAX_DATAGRAM_BYTES: usize = 4096;

enum Step {
    PortInstruction,
    Datagram(usize, SocketAddr),
    RecvError(std::io::Error),
    Shutdown,
}

/// Run the listener until the port channel is dropped.
///
/// Datagrams are handled one at a time; each parsed payload replaces the
/// overlay and triggers a merge and broadcast. Malformed payloads are
/// logged and dropped without touching state. Every datagram is tagged with
/// the device generation its socket was bound for, so one that was already
/// ready when the device went away is dropped instead of reviving state.
pub(crate) async fn run_listener(
    supervisor: Arc<Supervisor>,
    mut port_rx: watch::Receiver<Option<(u16, u64)>>,
) {
    let mut socket: Option<UdpSocket> = None;
    let mut bound: Option<(u16, u64)> = None;
    let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];

    loop {
        let step = match &socket {
            None => match port_rx.changed().await {
                Ok(()) => Step::PortInstruction,
                Err(_) => Step::Shutdown,
            },
            Some(sock) => tokio::select! {
                changed = port_rx.changed() => match changed {
                    Ok(()) => Step::PortInstruction,
                    Err(_) => Step::Shutdown,
                },
                received = sock.recv_from(&mut buf) => match received {
                    Ok((len, peer)) => Step::Datagram(len, peer),
                    Err(e) => Step::RecvError(e),
                },
            },
        };

        match step {
            Step::PortInstruction => {
                let target = *port_rx.borrow_and_update();
                if target == bound {
                    continue;
                }
                // Close the old socket before any new bind.
                if let Some(old) = socket.take() {
                    drop(old);
                    if let Some((port, _)) = bound {
                        info!("Closed UDP socket on port {}", port);
                    }
                }
                bound = None;

                if let Some((port, generation)) = target {
                    match UdpSocket::bind(("0.0.0.0", port)).await {
                        Ok(sock) => {
                            info!("UDP listener bound on port {}", port);
                            socket = Some(sock);
                            bound = Some((port, generation));
                        }
                        Err(e) => {
                            // Stay unbound; the next lease renewal supplies
                            // a port and reopens us.
                            warn!("Failed to bind UDP port {}: {}", port, e);
                        }
                    }
                }
            }
            Step::Datagram(len, peer) => {
                if let Some((_, generation)) = bound {
                    handle_datagram(&supervisor, generation, &buf[..len], peer).await;
                }
            }
            Step::RecvError(e) => {
                warn!("UDP socket error, closing socket: {}", e);
                socket = None;
                bound = None;
            }
            Step::Shutdown => break,
        }
    }
    debug!("UDP listener stopped");
}

async fn handle_datagram(
    supervisor: &Supervisor,
    generation: u64,
    payload: &[u8],
    peer: SocketAddr,
) {
    match serde_json::from_slice::<StationReading>(payload) {
        Ok(reading) => {
            debug!("Received UDP data from {}", peer);
            if !supervisor.ingest_udp(generation, reading, peer).await {
                debug!("Dropping datagram from {} for a stale device", peer);
            }
        }
        Err(e) => {
            warn!("Dropping malformed datagram from {}: {}", peer, e);
        }
    }
}
