//! Transport primitives
//!
//! The scanner talks to a device over two channels: a reliable TCP stream
//! carrying encapsulation frames, and a UDP socket carrying cyclic I/O data.
//! Both are injected behind traits so a simulated device can stand in for
//! real sockets.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use crate::eip::{EncapsulationCodec, EncapsulationPacket};
use crate::error::{EipError, Result};

/// Reliable, framed channel used for explicit messaging
#[async_trait]
pub trait SessionTransport: Send {
    /// Send one encapsulation frame
    async fn send(&mut self, packet: EncapsulationPacket) -> Result<()>;

    /// Receive the next encapsulation frame, waiting at most `wait`
    ///
    /// Returns `Timeout` when nothing arrives in time and `Transport` when
    /// the channel is broken.
    async fn receive(&mut self, wait: Duration) -> Result<EncapsulationPacket>;

    /// Remote endpoint, when known
    fn peer_addr(&self) -> Option<SocketAddr>;
}

/// Unreliable, non-blocking channel used for cyclic I/O data
pub trait CyclicTransport: Send {
    /// Send one datagram without blocking
    fn try_send_to(&mut self, data: &[u8], target: SocketAddr) -> Result<()>;

    /// Receive one pending datagram, `None` when nothing is queued
    fn try_recv(&mut self) -> Result<Option<(Vec<u8>, SocketAddr)>>;

    /// Subscribe to a multicast group announced by a device
    fn join_multicast(&mut self, group: Ipv4Addr) -> Result<()> {
        debug!("Multicast join ignored: {}", group);
        Ok(())
    }
}

// ============================================================================
// TCP
// ============================================================================

/// Encapsulation stream over TCP
pub struct TcpTransport {
    framed: Framed<TcpStream, EncapsulationCodec>,
    peer: Option<SocketAddr>,
}

impl TcpTransport {
    /// Open a TCP connection to `host:port`
    pub async fn connect(host: &str, port: u16, timeout_duration: Duration) -> Result<Self> {
        let addr = format!("{host}:{port}");
        debug!("TCP connecting: {}", addr);

        match timeout(timeout_duration, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("TCP_NODELAY: {}", e);
                }
                let peer = stream.peer_addr().ok();
                info!("TCP connected: {}", addr);
                Ok(Self {
                    framed: Framed::new(stream, EncapsulationCodec),
                    peer,
                })
            },
            Ok(Err(e)) => {
                error!("TCP err: {} - {}", addr, e);
                Err(EipError::transport(format!(
                    "Failed to connect to {addr}: {e}"
                )))
            },
            Err(_) => {
                warn!("TCP timeout: {}", addr);
                Err(EipError::timeout(format!("Connection to {addr} timed out")))
            },
        }
    }
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("peer", &self.peer)
            .finish()
    }
}

#[async_trait]
impl SessionTransport for TcpTransport {
    async fn send(&mut self, packet: EncapsulationPacket) -> Result<()> {
        self.framed.send(packet).await.map_err(|e| {
            error!("TCP TX: {}", e);
            match e {
                EipError::Validation(_) => e,
                other => EipError::transport(format!("TCP send error: {other}")),
            }
        })
    }

    async fn receive(&mut self, wait: Duration) -> Result<EncapsulationPacket> {
        match timeout(wait, self.framed.next()).await {
            Ok(Some(Ok(packet))) => Ok(packet),
            Ok(Some(Err(e))) => {
                error!("TCP RX: {}", e);
                Err(match e {
                    EipError::Transport(_) => e,
                    other => EipError::transport(format!("TCP stream corrupted: {other}")),
                })
            },
            Ok(None) => {
                error!("TCP closed by peer");
                Err(EipError::transport("Connection closed by peer"))
            },
            Err(_) => {
                debug!("TCP RX timeout");
                Err(EipError::timeout(format!(
                    "No response within {}ms",
                    wait.as_millis()
                )))
            },
        }
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}

// ============================================================================
// UDP
// ============================================================================

/// Cyclic I/O socket
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind the local I/O port (normally 2222) on all interfaces
    pub async fn bind(port: u16) -> Result<Self> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            error!("UDP bind: {} - {}", addr, e);
            EipError::transport(format!("Failed to bind UDP {addr}: {e}"))
        })?;
        info!("UDP bound: {}", addr);
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl CyclicTransport for UdpTransport {
    fn try_send_to(&mut self, data: &[u8], target: SocketAddr) -> Result<()> {
        match self.socket.try_send_to(data, target) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                // Socket buffer full; the next cycle carries fresher data anyway
                debug!("UDP TX dropped: {} busy", target);
                Ok(())
            },
            Err(e) => {
                error!("UDP TX: {} - {}", target, e);
                Err(EipError::transport(format!("UDP send error: {e}")))
            },
        }
    }

    fn try_recv(&mut self) -> Result<Option<(Vec<u8>, SocketAddr)>> {
        let mut buf = [0u8; 1500];
        match self.socket.try_recv_from(&mut buf) {
            Ok((len, from)) => Ok(Some((buf[..len].to_vec(), from))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => {
                error!("UDP RX: {}", e);
                Err(EipError::transport(format!("UDP receive error: {e}")))
            },
        }
    }

    fn join_multicast(&mut self, group: Ipv4Addr) -> Result<()> {
        self.socket
            .join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)
            .map_err(|e| EipError::transport(format!("Failed to join {group}: {e}")))?;
        info!("UDP joined multicast: {}", group);
        Ok(())
    }
}
