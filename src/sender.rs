//! UDP transport for RTP packets.
//!
//! Owns the socket and destination address for one camera's stream. Kept
//! separate from the streamer's frame-forwarding loop so the two concerns
//! (packetizing + timing vs. putting bytes on the wire) can be reasoned
//! about and tested independently.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;

/// Send buffer size requested from the OS (1 MiB). Larger than default so a
/// burst of fragments from one frame doesn't overrun the kernel buffer.
const SEND_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("failed to bind UDP socket: {0}")]
    BindFailed(#[source] std::io::Error),

    #[error("failed to configure socket: {0}")]
    ConfigureFailed(#[source] std::io::Error),

    #[error("invalid destination: {0}")]
    InvalidDestination(String),
}

#[derive(Debug, Clone, Default)]
pub struct SenderStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub send_errors: u64,
}

/// A UDP socket bound to a known local port, aimed at a reconfigurable
/// remote destination, with DSCP marking and an enlarged send buffer.
pub struct Sender {
    socket: UdpSocket,
    dest_addr: RwLock<SocketAddr>,
    packets_sent: Arc<AtomicU64>,
    bytes_sent: Arc<AtomicU64>,
    send_errors: Arc<AtomicU64>,
}

impl Sender {
    /// Binds a UDP socket on `local_port` (ephemeral if 0), aimed at
    /// `dest_addr`, with the given DSCP code point applied via IP_TOS.
    pub async fn new(local_port: u16, dest_addr: SocketAddr, dscp: u8) -> Result<Self, SenderError> {
        let domain = if dest_addr.is_ipv6() {
            Domain::IPV6
        } else {
            Domain::IPV4
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
            .map_err(SenderError::BindFailed)?;
        socket.set_nonblocking(true).map_err(SenderError::ConfigureFailed)?;

        let local_addr: SocketAddr = if dest_addr.is_ipv6() {
            format!("[::]:{local_port}").parse().unwrap()
        } else {
            format!("0.0.0.0:{local_port}").parse().unwrap()
        };
        socket
            .bind(&local_addr.into())
            .map_err(SenderError::BindFailed)?;

        socket
            .set_send_buffer_size(SEND_BUFFER_SIZE)
            .map_err(SenderError::ConfigureFailed)?;

        if dscp > 0 {
            // DSCP occupies the top 6 bits of the IP TOS/Traffic Class byte.
            let tos = (dscp as u32) << 2;
            socket.set_tos(tos).map_err(SenderError::ConfigureFailed)?;
        }

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket).map_err(SenderError::BindFailed)?;

        tracing::debug!(
            local = %socket.local_addr().map_err(SenderError::BindFailed)?,
            dest = %dest_addr,
            dscp = %dscp,
            "UDP sender bound"
        );

        Ok(Self {
            socket,
            dest_addr: RwLock::new(dest_addr),
            packets_sent: Arc::new(AtomicU64::new(0)),
            bytes_sent: Arc::new(AtomicU64::new(0)),
            send_errors: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Sends one RTP packet to the current destination. A transient
    /// WouldBlock or short write is counted as a soft drop, not an error
    /// returned to the caller: a single camera's stream must not stall
    /// because one packet couldn't be sent immediately.
    pub async fn send(&self, packet: &[u8]) -> Result<(), SenderError> {
        let dest = *self.dest_addr.read().await;
        match self.socket.send_to(packet, dest).await {
            Ok(n) => {
                self.packets_sent.fetch_add(1, Ordering::Relaxed);
                self.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                self.send_errors.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(error = %err, "UDP send failed");
                Ok(())
            }
        }
    }

    /// Atomically repoints the socket at a new destination.
    pub async fn update_destination(&self, dest_addr: SocketAddr) {
        let mut guard = self.dest_addr.write().await;
        *guard = dest_addr;
    }

    pub async fn destination(&self) -> SocketAddr {
        *self.dest_addr.read().await
    }

    pub fn get_stats(&self) -> SenderStats {
        SenderStats {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
        }
    }
}
