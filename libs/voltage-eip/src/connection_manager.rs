//! Implicit connection management
//!
//! The [`ConnectionManager`] owns every open I/O connection. It opens them
//! with Forward Open, exchanges cyclic data when the caller polls
//! [`ConnectionManager::handle_connections`], and tears them down with
//! Forward Close. The application only ever holds a [`ConnectionHandle`],
//! which stops resolving as soon as the manager drops the connection.
//!
//! There is no background task: the caller's loop drives all timing.

pub mod forward_open;
pub mod handle;
pub mod io_connection;
pub mod network_params;

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::cip::status::connection_manager_extended_description;
use crate::cip::{class, EPath, GeneralStatus, ServiceCode};
use crate::constants::IMPLICIT_PORT;
use crate::eip::item_type;
use crate::error::{EipError, Result};
use crate::message_router::{MessageRouter, MessageRouterResponse};
use crate::session::Session;
use crate::transport::{CyclicTransport, UdpTransport};

pub use forward_open::{ConnectionTriad, ForwardOpenResponse};
pub use handle::ConnectionHandle;
pub use io_connection::{
    CloseListener, ConnectionState, ConnectionStats, IoConnection, ReceiveDataListener,
    SendDataListener,
};
pub use network_params::{
    ConnectionParameters, ConnectionType, NetworkConnectionParams, Ownership, Priority,
    ProductionTrigger, SizeType, TransportClass, TransportDirection, TransportTypeTrigger,
};

use forward_open::{encode_forward_close, encode_forward_open};
use handle::HandleSlab;
use io_connection::{parse_datagram, Delivery};

/// What happened to a Forward Close
///
/// The connection is gone locally whatever the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    /// Device confirmed the close
    Acknowledged,
    /// Device answered with an error status
    Rejected {
        general: GeneralStatus,
        extended: Vec<u16>,
    },
    /// No usable answer (timeout, transport error, closed session)
    Unacknowledged(EipError),
    /// Handle no longer resolved; nothing was sent
    AlreadyClosed,
}

impl CloseOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, CloseOutcome::Acknowledged)
    }
}

/// Owner of all implicit connections
pub struct ConnectionManager {
    router: MessageRouter,
    cyclic: Box<dyn CyclicTransport>,
    connections: HandleSlab<IoConnection>,
    by_t2o_id: HashMap<u32, ConnectionHandle>,
    next_serial: u16,
    implicit_port: u16,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connections", &self.connections.len())
            .field("next_serial", &self.next_serial)
            .field("implicit_port", &self.implicit_port)
            .finish()
    }
}

impl ConnectionManager {
    /// Create a manager over an injected cyclic transport
    pub fn new(cyclic: Box<dyn CyclicTransport>) -> Self {
        Self {
            router: MessageRouter::new(),
            cyclic,
            connections: HandleSlab::default(),
            by_t2o_id: HashMap::new(),
            next_serial: rand::random(),
            implicit_port: IMPLICIT_PORT,
        }
    }

    /// Create a manager listening on the given local UDP port (normally 2222)
    pub async fn bind(local_port: u16) -> Result<Self> {
        let transport = UdpTransport::bind(local_port).await?;
        Ok(Self::new(Box::new(transport)))
    }

    /// Device UDP port used when a Forward Open reply names no O→T address
    pub fn with_implicit_port(mut self, port: u16) -> Self {
        self.implicit_port = port;
        self
    }

    /// Open a connection with Forward Open (16-bit network parameters)
    pub async fn forward_open(
        &mut self,
        session: &Session,
        params: &ConnectionParameters,
    ) -> Result<ConnectionHandle> {
        self.open(session, params, false).await
    }

    /// Open a connection with Large Forward Open (32-bit network parameters)
    pub async fn large_forward_open(
        &mut self,
        session: &Session,
        params: &ConnectionParameters,
    ) -> Result<ConnectionHandle> {
        self.open(session, params, true).await
    }

    async fn open(
        &mut self,
        session: &Session,
        params: &ConnectionParameters,
        large: bool,
    ) -> Result<ConnectionHandle> {
        if !session.is_open() {
            return Err(EipError::SessionClosed);
        }

        let triad = ConnectionTriad {
            connection_serial: self.next_serial(),
            originator_vendor_id: params.originator_vendor_id,
            originator_serial: params.originator_serial_number,
        };
        let t2o_proposal: u32 = rand::random();
        let body = encode_forward_open(params, triad.connection_serial, t2o_proposal, large)?;

        let fallback = session
            .peer_addr()
            .map(|peer| SocketAddr::new(peer.ip(), self.implicit_port));
        let mut connection = IoConnection::opening(
            params,
            triad,
            fallback.unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], self.implicit_port))),
            session.liveness(),
        );
        info!(
            "[STATUS] {} - serial=0x{:04X} path={}",
            connection.state(),
            triad.connection_serial,
            params.connection_path
        );

        let service = if large {
            ServiceCode::LARGE_FORWARD_OPEN
        } else {
            ServiceCode::FORWARD_OPEN
        };
        let response = self
            .router
            .send_request(session, service, &connection_manager_path(), &body)
            .await
            .map_err(|e| {
                warn!("{} failed: {}", service, e);
                e
            })?;

        if !response.is_success() {
            log_open_rejection(service, &response);
            return Err(EipError::Status {
                service: service.0,
                general: response.general_status,
                extended: response.additional_status,
            });
        }

        // accepted by the device: an unusable reply still needs a Forward Close
        let accepted = match ForwardOpenResponse::decode(&response.data) {
            Ok(reply) => self
                .o2t_destination(&response, fallback)
                .map(|address| (reply, address)),
            Err(e) => Err(e),
        };
        let (reply, o2t_address) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(
                    "[STATUS] OPENING -> FAILED - serial=0x{:04X} unusable {} reply: {}",
                    triad.connection_serial, service, e
                );
                self.abandon_open(session, params, &triad).await;
                return Err(e);
            },
        };
        if reply.triad != triad {
            warn!(
                "Forward Open reply triad differs: sent serial 0x{:04X}, got 0x{:04X}",
                triad.connection_serial, reply.triad.connection_serial
            );
        }
        self.join_t2o_multicast(&response);

        connection.established(&reply, o2t_address);
        let t2o_id = connection.t2o_connection_id();
        let handle = self.connections.insert(connection);
        if let Some(previous) = self.by_t2o_id.insert(t2o_id, handle) {
            warn!("T→O id 0x{:08X} reused, {} replaced", t2o_id, previous);
            self.remove(previous, ConnectionState::Closed, "T→O id reused");
        }

        info!(
            "[STATUS] OPENING -> OPEN - {} o2t=0x{:08X} t2o=0x{:08X} api={}us/{}us dest={}",
            handle, reply.o2t_connection_id, t2o_id, reply.o2t_api, reply.t2o_api, o2t_address
        );
        Ok(handle)
    }

    /// Whether any connection is active
    pub fn has_open_connections(&self) -> bool {
        !self.connections.is_empty()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Handles of all active connections
    pub fn handles(&self) -> Vec<ConnectionHandle> {
        self.connections.handles()
    }

    /// Resolve a handle; fails once the connection is gone
    pub fn connection(&self, handle: ConnectionHandle) -> Result<&IoConnection> {
        self.connections
            .get(handle)
            .ok_or_else(|| EipError::connection_state(format!("{handle} is closed")))
    }

    /// Resolve a handle mutably; fails once the connection is gone
    pub fn connection_mut(&mut self, handle: ConnectionHandle) -> Result<&mut IoConnection> {
        self.connections
            .get_mut(handle)
            .ok_or_else(|| EipError::connection_state(format!("{handle} is closed")))
    }

    /// Run one polling step
    ///
    /// `poll_interval` is the time elapsed since the previous step. Bad
    /// datagrams are dropped and logged; this never fails.
    pub fn handle_connections(&mut self, poll_interval: Duration) {
        for handle in self.connections.handles() {
            let session_alive = self
                .connections
                .get(handle)
                .is_some_and(IoConnection::session_alive);
            if !session_alive {
                self.remove(handle, ConnectionState::Closed, "session closed");
            }
        }

        for handle in self.connections.handles() {
            let Some(connection) = self.connections.get_mut(handle) else {
                continue;
            };
            connection.credit_rx(poll_interval);
            match connection.poll_send(poll_interval) {
                Ok(Some(datagram)) => {
                    let target = connection.o2t_address();
                    if let Err(e) = self.cyclic.try_send_to(&datagram, target) {
                        self.fail_all(&e);
                        return;
                    }
                },
                Ok(None) => {},
                Err(e) => warn!("O→T {}: {}", handle, e),
            }
        }

        loop {
            match self.cyclic.try_recv() {
                Ok(Some((datagram, from))) => self.dispatch(&datagram, from),
                Ok(None) => break,
                Err(e) => {
                    self.fail_all(&e);
                    return;
                },
            }
        }

        for handle in self.connections.handles() {
            let timed_out = self
                .connections
                .get(handle)
                .is_some_and(IoConnection::timed_out);
            if timed_out {
                self.remove(handle, ConnectionState::Closed, "inactivity timeout");
            }
        }
    }

    /// Close a connection with Forward Close
    ///
    /// Best effort: the connection is removed and its close listener runs
    /// whether or not the device acknowledges. Closing an already closed
    /// handle does nothing.
    pub async fn forward_close(&mut self, session: &Session, handle: ConnectionHandle) -> CloseOutcome {
        let Some(connection) = self.connections.get_mut(handle) else {
            debug!("Forward Close: {} already closed", handle);
            return CloseOutcome::AlreadyClosed;
        };

        info!("[STATUS] {} -> CLOSING - {}", connection.state(), handle);
        connection.set_state(ConnectionState::Closing);
        let body = encode_forward_close(
            connection.priority_time_tick(),
            connection.timeout_ticks(),
            &connection.triad(),
            connection.connection_path(),
        );

        let sent = match body {
            Ok(body) => {
                self.router
                    .send_request(session, ServiceCode::FORWARD_CLOSE, &connection_manager_path(), &body)
                    .await
            },
            Err(e) => Err(e),
        };
        let outcome = match sent {
            Ok(response) if response.is_success() => CloseOutcome::Acknowledged,
            Ok(response) => {
                warn!("Forward Close {}: {}", handle, response.status_text());
                CloseOutcome::Rejected {
                    general: response.general_status,
                    extended: response.additional_status,
                }
            },
            Err(e) => {
                warn!("Forward Close {}: {}", handle, e);
                CloseOutcome::Unacknowledged(e)
            },
        };

        self.remove(handle, ConnectionState::Closed, "forward close");
        outcome
    }

    /// Release a connection the device accepted but this side cannot use
    ///
    /// Best effort with the triad that was sent; failures are only logged.
    async fn abandon_open(
        &self,
        session: &Session,
        params: &ConnectionParameters,
        triad: &ConnectionTriad,
    ) {
        let serial = triad.connection_serial;
        let body = match encode_forward_close(
            params.priority_time_tick,
            params.timeout_ticks,
            triad,
            &params.connection_path,
        ) {
            Ok(body) => body,
            Err(e) => {
                warn!("Forward Close for serial=0x{:04X} not sent: {}", serial, e);
                return;
            },
        };

        match self
            .router
            .send_request(session, ServiceCode::FORWARD_CLOSE, &connection_manager_path(), &body)
            .await
        {
            Ok(response) if response.is_success() => {
                info!("Forward Close released serial=0x{:04X} after failed open", serial);
            },
            Ok(response) => warn!(
                "Forward Close for serial=0x{:04X} after failed open: {}",
                serial,
                response.status_text()
            ),
            Err(e) => warn!("Forward Close for serial=0x{:04X} after failed open: {}", serial, e),
        }
    }

    fn next_serial(&mut self) -> u16 {
        let serial = self.next_serial;
        self.next_serial = self.next_serial.wrapping_add(1);
        serial
    }

    /// Route one T→O datagram to its connection
    fn dispatch(&mut self, datagram: &[u8], from: SocketAddr) {
        let (connection_id, encap_sequence, data) = match parse_datagram(datagram) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("Malformed datagram from {} dropped: {}", from, e);
                return;
            },
        };

        let Some(&handle) = self.by_t2o_id.get(&connection_id) else {
            debug!(
                "Datagram for unknown connection 0x{:08X} from {} dropped",
                connection_id, from
            );
            return;
        };
        let Some(connection) = self.connections.get_mut(handle) else {
            return;
        };

        match connection.on_datagram(encap_sequence, &data) {
            Ok(Delivery::Delivered) | Ok(Delivery::Stale) => {},
            Err(e) => warn!("T→O {} from {} dropped: {}", handle, from, e),
        }
    }

    /// Drop a connection, notifying its close listener
    fn remove(&mut self, handle: ConnectionHandle, state: ConnectionState, reason: &str) {
        let Some(mut connection) = self.connections.remove(handle) else {
            return;
        };
        let t2o_id = connection.t2o_connection_id();
        if self.by_t2o_id.get(&t2o_id) == Some(&handle) {
            self.by_t2o_id.remove(&t2o_id);
        }

        if state == ConnectionState::Failed {
            error!("[STATUS] {} -> {} - {} {}", connection.state(), state, handle, reason);
        } else {
            info!("[STATUS] {} -> {} - {} {}", connection.state(), state, handle, reason);
        }
        connection.finish(state);
    }

    /// Fatal cyclic transport error: every connection fails
    fn fail_all(&mut self, err: &EipError) {
        error!("Cyclic transport failed: {}", err);
        for handle in self.connections.handles() {
            self.remove(handle, ConnectionState::Failed, "cyclic transport error");
        }
    }

    fn o2t_destination(
        &self,
        response: &MessageRouterResponse,
        fallback: Option<SocketAddr>,
    ) -> Result<SocketAddr> {
        let announced = response
            .additional_items
            .iter()
            .find(|item| item.type_id == item_type::SOCKADDR_O2T)
            .map(|item| item.as_sockaddr())
            .transpose()?;

        match (announced, fallback) {
            (Some(addr), Some(peer)) if addr.ip().is_unspecified() => {
                Ok(SocketAddr::new(peer.ip(), addr.port()))
            },
            (Some(addr), _) => Ok(SocketAddr::from(addr)),
            (None, Some(peer)) => Ok(peer),
            (None, None) => Err(EipError::protocol(
                "No O→T address: reply has no sockaddr item and the session peer is unknown",
            )),
        }
    }

    fn join_t2o_multicast(&mut self, response: &MessageRouterResponse) {
        let group = response
            .additional_items
            .iter()
            .find(|item| item.type_id == item_type::SOCKADDR_T2O)
            .and_then(|item| item.as_sockaddr().ok())
            .map(|addr| *addr.ip())
            .filter(|ip| IpAddr::V4(*ip).is_multicast());

        if let Some(group) = group {
            if let Err(e) = self.cyclic.join_multicast(group) {
                warn!("T→O multicast {}: {}", group, e);
            }
        }
    }
}

/// Connection manager object, instance 1
fn connection_manager_path() -> EPath {
    EPath::class_instance(class::CONNECTION_MANAGER, 1)
}

fn log_open_rejection(service: ServiceCode, response: &MessageRouterResponse) {
    match response.additional_status.first() {
        Some(&extended) if response.general_status == GeneralStatus::CONNECTION_FAILURE => warn!(
            "{} rejected: {} [ext 0x{:04X}: {}]",
            service,
            response.general_status,
            extended,
            connection_manager_extended_description(extended)
        ),
        _ => warn!("{} rejected: {}", service, response.status_text()),
    }
}
