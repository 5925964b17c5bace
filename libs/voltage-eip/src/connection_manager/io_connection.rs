//! One open implicit (I/O) connection
//!
//! Cyclic datagram on UDP 2222:
//!
//! ```text
//! CPF [ SequencedAddress { connection_id u32, encap_sequence u32 },
//!       ConnectedData    { [sequence_count u16] [run_idle u32] payload } ]
//! ```
//!
//! The sequence count is present for transport classes 1-3, the run/idle
//! header only when the direction uses the real-time format.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cip::EPath;
use crate::codec::Buffer;
use crate::constants::{RUN_IDLE_RUN, TIMEOUT_MULTIPLIER_BASE};
use crate::eip::{item_type, CommonPacket, CpfItem};
use crate::error::{EipError, Result};

use super::forward_open::{ConnectionTriad, ForwardOpenResponse};
use super::network_params::{ConnectionParameters, NetworkConnectionParams, TransportClass};

/// Lifecycle state of an I/O connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Forward Open sent, no reply yet
    #[default]
    Opening,
    /// Exchanging cyclic data
    Open,
    /// Forward Close in progress
    Closing,
    /// Closed normally or by timeout
    Closed,
    /// Fatal transport error, won't recover
    Failed,
}

impl ConnectionState {
    /// Check if state represents a live connection
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Check if the connection has left the active set for good
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Opening => write!(f, "OPENING"),
            ConnectionState::Open => write!(f, "OPEN"),
            ConnectionState::Closing => write!(f, "CLOSING"),
            ConnectionState::Closed => write!(f, "CLOSED"),
            ConnectionState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Receives `(run_idle_header, sequence, payload)` for every new T→O datagram.
/// The header is 0 when the T→O direction does not carry one.
pub type ReceiveDataListener = Box<dyn FnMut(u32, u16, &[u8]) + Send>;

/// Called before each O→T datagram with the outgoing payload, which it may update
pub type SendDataListener = Box<dyn FnMut(&mut Vec<u8>) + Send>;

/// Called once when the connection leaves the active set
pub type CloseListener = Box<dyn FnOnce() + Send>;

/// Per-connection traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub sent: u64,
    pub delivered: u64,
    pub stale: u64,
    pub rejected: u64,
}

/// Result of offering a T→O datagram to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    Stale,
}

/// Implicit connection state, owned by the connection manager
pub struct IoConnection {
    o2t_connection_id: u32,
    t2o_connection_id: u32,
    triad: ConnectionTriad,
    o2t_api: u32,
    t2o_api: u32,
    connection_path: EPath,
    priority_time_tick: u8,
    timeout_ticks: u8,
    timeout_multiplier: u8,
    transport_class: TransportClass,
    o2t_params: NetworkConnectionParams,
    t2o_params: NetworkConnectionParams,
    o2t_real_time_format: bool,
    t2o_real_time_format: bool,
    o2t_address: SocketAddr,
    application_reply: Vec<u8>,

    state: ConnectionState,
    output: Option<Vec<u8>>,
    o2t_sequence: u16,
    o2t_encap_sequence: u32,
    last_t2o_sequence: Option<u32>,
    tx_elapsed: Duration,
    rx_elapsed: Duration,
    session_open: Arc<AtomicBool>,
    stats: ConnectionStats,

    receive_listener: Option<ReceiveDataListener>,
    send_listener: Option<SendDataListener>,
    close_listener: Option<CloseListener>,
}

impl fmt::Debug for IoConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoConnection")
            .field("o2t_id", &format_args!("0x{:08X}", self.o2t_connection_id))
            .field("t2o_id", &format_args!("0x{:08X}", self.t2o_connection_id))
            .field("serial", &self.triad.connection_serial)
            .field("state", &self.state)
            .field("o2t_address", &self.o2t_address)
            .field("stats", &self.stats)
            .finish()
    }
}

impl IoConnection {
    /// Connection as requested, before the device replies
    pub(crate) fn opening(
        params: &ConnectionParameters,
        triad: ConnectionTriad,
        o2t_address: SocketAddr,
        session_open: Arc<AtomicBool>,
    ) -> Self {
        Self {
            o2t_connection_id: 0,
            t2o_connection_id: 0,
            triad,
            o2t_api: params.o2t_rpi,
            t2o_api: params.t2o_rpi,
            connection_path: params.connection_path.clone(),
            priority_time_tick: params.priority_time_tick,
            timeout_ticks: params.timeout_ticks,
            timeout_multiplier: params.connection_timeout_multiplier,
            transport_class: params.transport_type_trigger.class,
            o2t_params: params.o2t_network_params,
            t2o_params: params.t2o_network_params,
            o2t_real_time_format: params.o2t_real_time_format,
            t2o_real_time_format: params.t2o_real_time_format,
            o2t_address,
            application_reply: Vec::new(),
            state: ConnectionState::Opening,
            output: None,
            o2t_sequence: 0,
            o2t_encap_sequence: 0,
            last_t2o_sequence: None,
            tx_elapsed: Duration::ZERO,
            rx_elapsed: Duration::ZERO,
            session_open,
            stats: ConnectionStats::default(),
            receive_listener: None,
            send_listener: None,
            close_listener: None,
        }
    }

    /// Apply the device's Forward Open reply and enter `Open`
    pub(crate) fn established(&mut self, response: &ForwardOpenResponse, o2t_address: SocketAddr) {
        self.o2t_connection_id = response.o2t_connection_id;
        self.t2o_connection_id = response.t2o_connection_id;
        self.o2t_api = response.o2t_api;
        self.t2o_api = response.t2o_api;
        self.application_reply = response.application_reply.clone();
        self.o2t_address = o2t_address;
        self.state = ConnectionState::Open;
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn o2t_connection_id(&self) -> u32 {
        self.o2t_connection_id
    }

    pub fn t2o_connection_id(&self) -> u32 {
        self.t2o_connection_id
    }

    pub fn connection_serial(&self) -> u16 {
        self.triad.connection_serial
    }

    pub fn triad(&self) -> ConnectionTriad {
        self.triad
    }

    /// Actual O→T packet interval, microseconds
    pub fn o2t_api(&self) -> u32 {
        self.o2t_api
    }

    /// Actual T→O packet interval, microseconds
    pub fn t2o_api(&self) -> u32 {
        self.t2o_api
    }

    pub fn connection_path(&self) -> &EPath {
        &self.connection_path
    }

    pub fn o2t_address(&self) -> SocketAddr {
        self.o2t_address
    }

    pub fn application_reply(&self) -> &[u8] {
        &self.application_reply
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    pub(crate) fn priority_time_tick(&self) -> u8 {
        self.priority_time_tick
    }

    pub(crate) fn timeout_ticks(&self) -> u8 {
        self.timeout_ticks
    }

    /// No T→O traffic for this long closes the connection
    pub fn inactivity_timeout(&self) -> Duration {
        let factor = u64::from(TIMEOUT_MULTIPLIER_BASE) << self.timeout_multiplier;
        Duration::from_micros(u64::from(self.t2o_api) * factor)
    }

    // ------------------------------------------------------------------
    // Application API
    // ------------------------------------------------------------------

    /// Register the O→T payload sent on every cycle
    ///
    /// Fixed-size connections require exactly the negotiated size,
    /// variable-size ones at most that size.
    pub fn set_data_to_send(&mut self, data: Vec<u8>) -> Result<()> {
        check_payload_size(&self.o2t_params, data.len(), "O→T")?;
        self.output = Some(data);
        Ok(())
    }

    pub fn data_to_send(&self) -> Option<&[u8]> {
        self.output.as_deref()
    }

    pub fn set_receive_data_listener(
        &mut self,
        listener: impl FnMut(u32, u16, &[u8]) + Send + 'static,
    ) {
        self.receive_listener = Some(Box::new(listener));
    }

    pub fn set_send_data_listener(&mut self, listener: impl FnMut(&mut Vec<u8>) + Send + 'static) {
        self.send_listener = Some(Box::new(listener));
    }

    pub fn set_close_listener(&mut self, listener: impl FnOnce() + Send + 'static) {
        self.close_listener = Some(Box::new(listener));
    }

    // ------------------------------------------------------------------
    // Polling step
    // ------------------------------------------------------------------

    pub(crate) fn session_alive(&self) -> bool {
        self.session_open.load(Ordering::Acquire)
    }

    /// Credit elapsed time and build the next O→T datagram when one is due
    pub(crate) fn poll_send(&mut self, elapsed: Duration) -> Result<Option<Vec<u8>>> {
        self.tx_elapsed += elapsed;
        if self.tx_elapsed < Duration::from_micros(u64::from(self.o2t_api)) {
            return Ok(None);
        }
        self.tx_elapsed = Duration::ZERO;

        if self.o2t_params.is_null() {
            return Ok(None);
        }
        let Some(output) = self.output.as_mut() else {
            return Ok(None);
        };
        if let Some(listener) = self.send_listener.as_mut() {
            listener(&mut *output);
        }
        check_payload_size(&self.o2t_params, output.len(), "O→T")?;

        let mut data = Buffer::new();
        if self.transport_class.has_sequence_count() {
            data.append(self.o2t_sequence);
        }
        if self.o2t_real_time_format {
            data.append(RUN_IDLE_RUN);
        }
        data.append_bytes(output);

        let datagram = CommonPacket::new()
            .with_item(CpfItem::sequenced_address(
                self.o2t_connection_id,
                self.o2t_encap_sequence,
            ))
            .with_item(CpfItem::connected_data(data.into_vec()))
            .encode()?;

        self.o2t_sequence = self.o2t_sequence.wrapping_add(1);
        self.o2t_encap_sequence = self.o2t_encap_sequence.wrapping_add(1);
        self.stats.sent += 1;
        Ok(Some(datagram))
    }

    /// Credit elapsed time to the inactivity watchdog
    pub(crate) fn credit_rx(&mut self, elapsed: Duration) {
        self.rx_elapsed += elapsed;
    }

    /// Output-only connections expect no T→O traffic and never time out
    pub(crate) fn timed_out(&self) -> bool {
        !self.t2o_params.is_null() && self.rx_elapsed >= self.inactivity_timeout()
    }

    /// Offer the connected data of a T→O datagram addressed to this connection
    pub(crate) fn on_datagram(&mut self, encap_sequence: u32, data: &[u8]) -> Result<Delivery> {
        let mut buffer = Buffer::from_bytes(data);
        let sequence = if self.transport_class.has_sequence_count() {
            u32::from(buffer.extract::<u16>()?)
        } else {
            encap_sequence
        };
        let header = if self.t2o_real_time_format {
            buffer.extract::<u32>()?
        } else {
            0
        };
        let payload = buffer.remaining_slice();
        if let Err(e) = check_payload_size(&self.t2o_params, payload.len(), "T→O") {
            self.stats.rejected += 1;
            return Err(e);
        }

        // any well-formed datagram proves the device is alive
        self.rx_elapsed = Duration::ZERO;

        if !self.is_newer(sequence) {
            self.stats.stale += 1;
            debug!(
                "T→O 0x{:08X}: stale seq {} dropped",
                self.t2o_connection_id, sequence
            );
            return Ok(Delivery::Stale);
        }

        self.last_t2o_sequence = Some(sequence);
        self.stats.delivered += 1;
        if let Some(listener) = self.receive_listener.as_mut() {
            listener(header, sequence as u16, payload);
        }
        Ok(Delivery::Delivered)
    }

    fn is_newer(&self, sequence: u32) -> bool {
        let Some(last) = self.last_t2o_sequence else {
            return true;
        };
        if self.transport_class.has_sequence_count() {
            (sequence as u16).wrapping_sub(last as u16) as i16 > 0
        } else {
            sequence.wrapping_sub(last) as i32 > 0
        }
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    /// Enter a terminal state and notify the close listener (at most once)
    pub(crate) fn finish(&mut self, state: ConnectionState) {
        self.state = state;
        if let Some(listener) = self.close_listener.take() {
            listener();
        }
    }
}

fn check_payload_size(params: &NetworkConnectionParams, len: usize, direction: &str) -> Result<()> {
    let max = usize::from(params.size);
    if params.is_null() {
        if len != 0 {
            return Err(EipError::validation(format!(
                "{direction} uses the null connection type, got {len} bytes"
            )));
        }
        return Ok(());
    }
    if params.is_variable() {
        if len > max {
            return Err(EipError::validation(format!(
                "{direction} payload {len} bytes exceeds {max}"
            )));
        }
    } else if len != max {
        return Err(EipError::validation(format!(
            "{direction} payload must be {max} bytes, got {len}"
        )));
    }
    Ok(())
}

/// Parse a cyclic datagram into (connection id, encapsulation sequence, connected data)
pub(crate) fn parse_datagram(datagram: &[u8]) -> Result<(u32, u32, Vec<u8>)> {
    let packet = CommonPacket::decode(datagram)?;
    let address = packet
        .find(item_type::SEQUENCED_ADDRESS)
        .ok_or_else(|| EipError::protocol("Datagram has no sequenced address item"))?;
    let (connection_id, sequence) = address.as_sequenced_address()?;
    let data = packet
        .find(item_type::CONNECTED_DATA)
        .ok_or_else(|| EipError::protocol("Datagram has no connected data item"))?;
    Ok((connection_id, sequence, data.data.clone()))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::connection_manager::network_params::SizeType;
    use std::sync::Mutex;

    fn open_connection(params: &ConnectionParameters) -> IoConnection {
        let triad = ConnectionTriad {
            connection_serial: 7,
            originator_vendor_id: params.originator_vendor_id,
            originator_serial: params.originator_serial_number,
        };
        let addr = SocketAddr::from(([127, 0, 0, 1], 2222));
        let mut conn = IoConnection::opening(params, triad, addr, Arc::new(AtomicBool::new(true)));
        conn.established(
            &ForwardOpenResponse {
                o2t_connection_id: 0x100,
                t2o_connection_id: 0x200,
                triad,
                o2t_api: 10_000,
                t2o_api: 10_000,
                application_reply: Vec::new(),
            },
            addr,
        );
        conn
    }

    fn params() -> ConnectionParameters {
        ConnectionParameters {
            connection_path: EPath::class_instance(0x04, 100),
            o2t_network_params: NetworkConnectionParams::point_to_point(4),
            t2o_network_params: NetworkConnectionParams::point_to_point(4),
            o2t_real_time_format: true,
            t2o_real_time_format: false,
            connection_timeout_multiplier: 0,
            ..Default::default()
        }
    }

    fn t2o_data(sequence: u16, payload: &[u8]) -> Vec<u8> {
        let mut data = sequence.to_le_bytes().to_vec();
        data.extend_from_slice(payload);
        data
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Open.to_string(), "OPEN");
        assert!(ConnectionState::Failed.is_terminal());
        assert!(!ConnectionState::Closing.is_terminal());
    }

    #[test]
    fn test_set_data_to_send_checks_size() {
        let mut conn = open_connection(&params());
        assert!(conn.set_data_to_send(vec![0; 3]).is_err());
        assert!(conn.set_data_to_send(vec![0; 4]).is_ok());

        let mut variable = params();
        variable.o2t_network_params = variable
            .o2t_network_params
            .with_size_type(SizeType::Variable);
        let mut conn = open_connection(&variable);
        assert!(conn.set_data_to_send(vec![0; 2]).is_ok());
        assert!(conn.set_data_to_send(vec![0; 5]).is_err());
    }

    #[test]
    fn test_send_waits_for_api_and_requires_payload() {
        let mut conn = open_connection(&params());
        assert!(conn.poll_send(Duration::from_millis(10)).unwrap().is_none());

        conn.set_data_to_send(vec![1, 2, 3, 4]).unwrap();
        assert!(conn.poll_send(Duration::from_millis(5)).unwrap().is_none());
        let first = conn.poll_send(Duration::from_millis(5)).unwrap().unwrap();

        let (id, encap_seq, data) = parse_datagram(&first).unwrap();
        assert_eq!(id, 0x100);
        assert_eq!(encap_seq, 0);
        // seq count 0, run header, payload
        assert_eq!(data, vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 1, 2, 3, 4]);

        let second = conn.poll_send(Duration::from_millis(10)).unwrap().unwrap();
        let (_, encap_seq, data) = parse_datagram(&second).unwrap();
        assert_eq!(encap_seq, 1);
        assert_eq!(&data[..2], &[0x01, 0x00]);
        assert_eq!(conn.stats().sent, 2);
    }

    #[test]
    fn test_send_listener_updates_payload() {
        let mut conn = open_connection(&params());
        conn.set_data_to_send(vec![0; 4]).unwrap();
        conn.set_send_data_listener(|data| data[0] = data[0].wrapping_add(1));

        conn.poll_send(Duration::from_millis(10)).unwrap();
        let datagram = conn.poll_send(Duration::from_millis(10)).unwrap().unwrap();
        let (_, _, data) = parse_datagram(&datagram).unwrap();
        assert_eq!(data[6], 2);
    }

    #[test]
    fn test_receive_order_and_stale_drop() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut conn = open_connection(&params());
        let sink = Arc::clone(&seen);
        conn.set_receive_data_listener(move |header, seq, payload| {
            assert_eq!(header, 0);
            sink.lock().unwrap().push((seq, payload.to_vec()));
        });

        assert_eq!(conn.on_datagram(0, &t2o_data(5, &[1; 4])).unwrap(), Delivery::Delivered);
        assert_eq!(conn.on_datagram(1, &t2o_data(5, &[2; 4])).unwrap(), Delivery::Stale);
        assert_eq!(conn.on_datagram(2, &t2o_data(4, &[3; 4])).unwrap(), Delivery::Stale);
        assert_eq!(conn.on_datagram(3, &t2o_data(6, &[4; 4])).unwrap(), Delivery::Delivered);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (5, vec![1; 4]));
        assert_eq!(seen[1], (6, vec![4; 4]));
        assert_eq!(conn.stats().stale, 2);
    }

    #[test]
    fn test_sequence_wraps() {
        let mut conn = open_connection(&params());
        conn.on_datagram(0, &t2o_data(u16::MAX, &[0; 4])).unwrap();
        assert_eq!(conn.on_datagram(1, &t2o_data(0, &[0; 4])).unwrap(), Delivery::Delivered);
        assert_eq!(conn.on_datagram(2, &t2o_data(u16::MAX, &[0; 4])).unwrap(), Delivery::Stale);
    }

    #[test]
    fn test_wrong_size_rejected() {
        let mut conn = open_connection(&params());
        assert!(conn.on_datagram(0, &t2o_data(1, &[0; 3])).is_err());
        assert!(conn.on_datagram(0, &[0x01]).is_err());
        assert_eq!(conn.stats().rejected, 1);
    }

    #[test]
    fn test_inactivity_timeout() {
        let mut conn = open_connection(&params());
        // 10ms * (4 << 0)
        assert_eq!(conn.inactivity_timeout(), Duration::from_millis(40));

        conn.credit_rx(Duration::from_millis(30));
        assert!(!conn.timed_out());
        conn.on_datagram(0, &t2o_data(1, &[0; 4])).unwrap();
        conn.credit_rx(Duration::from_millis(30));
        assert!(!conn.timed_out());
        conn.credit_rx(Duration::from_millis(10));
        assert!(conn.timed_out());
    }

    #[test]
    fn test_output_only_never_times_out() {
        let params = ConnectionParameters {
            t2o_network_params: NetworkConnectionParams::null(),
            ..params()
        };
        let mut conn = open_connection(&params);

        conn.credit_rx(Duration::from_secs(60));
        assert!(!conn.timed_out());
    }

    #[test]
    fn test_finish_notifies_once() {
        let count = Arc::new(Mutex::new(0));
        let mut conn = open_connection(&params());
        let counter = Arc::clone(&count);
        conn.set_close_listener(move || *counter.lock().unwrap() += 1);

        conn.finish(ConnectionState::Closed);
        conn.finish(ConnectionState::Closed);
        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(conn.state(), ConnectionState::Closed);
    }
}
