//! EtherNet/IP session
//!
//! A session is one registered encapsulation channel to a device. It owns
//! the response timeout applied to every exchange and never reconnects on
//! its own: after a transport failure the caller must build a new one.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::constants::{DEFAULT_TIMEOUT, EXPLICIT_PORT, PROTOCOL_VERSION};
use crate::eip::encapsulation::status as encap_status;
use crate::eip::{command, EncapsulationPacket};
use crate::error::{EipError, Result};
use crate::transport::{SessionTransport, TcpTransport};

/// Registered encapsulation session with one device
pub struct Session {
    transport: Mutex<Box<dyn SessionTransport>>,
    handle: u32,
    timeout: Duration,
    peer: Option<SocketAddr>,
    open: Arc<AtomicBool>,
    next_context: AtomicU64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("handle", &format_args!("0x{:08X}", self.handle))
            .field("peer", &self.peer)
            .field("timeout", &self.timeout)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Session {
    /// Connect over TCP and register a session
    ///
    /// `port` is normally [`EXPLICIT_PORT`] (44818).
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let transport = TcpTransport::connect(host, port, timeout).await?;
        Self::with_transport(Box::new(transport), timeout).await
    }

    /// Connect to the default explicit messaging port with the default timeout
    pub async fn connect_default(host: &str) -> Result<Self> {
        Self::connect(host, EXPLICIT_PORT, DEFAULT_TIMEOUT).await
    }

    /// Register a session over an already connected transport
    pub async fn with_transport(
        mut transport: Box<dyn SessionTransport>,
        timeout: Duration,
    ) -> Result<Self> {
        let peer = transport.peer_addr();
        let context = 1u64;

        let mut data = Vec::with_capacity(4);
        data.extend_from_slice(&PROTOCOL_VERSION.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes()); // options

        let request =
            EncapsulationPacket::new(command::REGISTER_SESSION, 0, data).with_sender_context(context);
        let reply = exchange(transport.as_mut(), request, timeout).await?;

        if reply.session_handle == 0 {
            return Err(EipError::protocol("Device assigned a zero session handle"));
        }

        info!(
            "Session registered: peer={:?} handle=0x{:08X}",
            peer, reply.session_handle
        );

        Ok(Self {
            transport: Mutex::new(transport),
            handle: reply.session_handle,
            timeout,
            peer,
            open: Arc::new(AtomicBool::new(true)),
            next_context: AtomicU64::new(context + 1),
        })
    }

    /// Device-assigned session handle
    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Shared open flag, observed by connections opened through this session
    pub(crate) fn liveness(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.open)
    }

    /// Send one command and wait for its matching reply
    ///
    /// Frames with a different command or sender context are discarded.
    /// A transport failure closes the session; a timeout does not.
    pub async fn send_and_receive(&self, command: u16, data: Vec<u8>) -> Result<EncapsulationPacket> {
        if !self.is_open() {
            return Err(EipError::SessionClosed);
        }

        let context = self.next_context.fetch_add(1, Ordering::Relaxed);
        let request =
            EncapsulationPacket::new(command, self.handle, data).with_sender_context(context);

        let mut transport = self.transport.lock().await;
        match exchange(transport.as_mut(), request, self.timeout).await {
            Err(e) if e.is_fatal() => {
                error!("Session 0x{:08X} failed: {}", self.handle, e);
                self.open.store(false, Ordering::Release);
                Err(e)
            },
            other => other,
        }
    }

    /// Unregister and mark the session closed
    ///
    /// Best effort: the device does not reply to UnRegisterSession and a
    /// send failure is only logged.
    pub async fn close(&self) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }

        let request = EncapsulationPacket::new(command::UNREGISTER_SESSION, self.handle, Vec::new());
        let mut transport = self.transport.lock().await;
        if let Err(e) = transport.send(request).await {
            warn!("UnRegisterSession 0x{:08X}: {}", self.handle, e);
        }
        info!("Session closed: handle=0x{:08X}", self.handle);
    }
}

/// Send `request` and wait for the reply carrying the same command and context
async fn exchange(
    transport: &mut dyn SessionTransport,
    request: EncapsulationPacket,
    wait: Duration,
) -> Result<EncapsulationPacket> {
    let command = request.command;
    let context = request.sender_context;
    let deadline = Instant::now() + wait;

    transport.send(request).await?;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(EipError::timeout(format!(
                "No reply to command 0x{command:04X} within {}ms",
                wait.as_millis()
            )));
        }

        let reply = transport.receive(remaining).await?;
        if reply.command != command || reply.sender_context != context {
            debug!(
                "Discarding frame: cmd={:04X} context={:016X}",
                reply.command, reply.sender_context
            );
            continue;
        }

        if reply.status != encap_status::SUCCESS {
            return Err(EipError::Encapsulation {
                command,
                status: reply.status,
            });
        }
        return Ok(reply);
    }
}
