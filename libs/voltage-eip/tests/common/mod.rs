//! Simulated EtherNet/IP device for integration tests
//!
//! `SimDevice` answers encapsulation requests the way an adapter would;
//! `SimNetwork` stands in for the UDP socket carrying cyclic data.

#![allow(clippy::disallowed_methods)] // Integration test - unwrap is acceptable
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use voltage_eip::cip::class;
use voltage_eip::connection_manager::{
    ConnectionParameters, NetworkConnectionParams, ProductionTrigger, TransportClass,
    TransportTypeTrigger,
};
use voltage_eip::eip::{command, item_type, CommonPacket, CpfItem, EncapsulationPacket};
use voltage_eip::{
    CyclicTransport, EPath, EipError, Result, ServiceCode, Session, SessionTransport,
};

pub const SESSION_HANDLE: u32 = 0x0001_2345;
pub const DEVICE_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
pub const O2T_CONNECTION_ID: u32 = 0x1000_0001;

/// Identity reply captured from a FANUC R-30iB Plus
pub const IDENTITY_REPLY: [u8; 30] = [
    0x64, 0x01, 0x0C, 0x00, 0x01, 0x00, 0x09, 0x1E, 0x30, 0x00, 0x78, 0x56, 0x34, 0x12, 0x0F,
    b'F', b'A', b'N', b'U', b'C', b' ', b'R', b'-', b'3', b'0', b'i', b'B', b'+', b' ', b' ',
];

/// How the device answers one service
#[derive(Debug, Clone)]
pub enum Reply {
    Status {
        general: u8,
        extended: Vec<u16>,
        data: Vec<u8>,
    },
    /// No answer at all
    Silent,
}

impl Reply {
    pub fn ok(data: Vec<u8>) -> Self {
        Reply::Status {
            general: 0,
            extended: Vec::new(),
            data,
        }
    }

    pub fn error(general: u8, extended: Vec<u16>) -> Self {
        Reply::Status {
            general,
            extended,
            data: Vec::new(),
        }
    }
}

#[derive(Default)]
pub struct DeviceState {
    /// Every frame the scanner sent
    pub frames: Vec<EncapsulationPacket>,
    /// Overrides by service code; Forward Open / Close are answered
    /// automatically otherwise
    pub replies: HashMap<u8, Reply>,
    /// Extra CPF items appended to Forward Open replies
    pub open_items: Vec<CpfItem>,
    /// Every send fails with a transport error
    pub broken: bool,
    pending: VecDeque<EncapsulationPacket>,
    next_o2t_id: u32,
}

/// Scripted adapter on the TCP side
#[derive(Clone, Default)]
pub struct SimDevice {
    pub state: Arc<Mutex<DeviceState>>,
}

impl SimDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_with(&self, service: ServiceCode, reply: Reply) {
        self.state.lock().unwrap().replies.insert(service.0, reply);
    }

    pub fn announce_item(&self, item: CpfItem) {
        self.state.lock().unwrap().open_items.push(item);
    }

    pub fn break_link(&self) {
        self.state.lock().unwrap().broken = true;
    }

    /// Message Router requests received so far: `(service, path, data)`
    pub fn requests(&self) -> Vec<(u8, EPath, Vec<u8>)> {
        self.state
            .lock()
            .unwrap()
            .frames
            .iter()
            .filter(|frame| frame.command == command::SEND_RR_DATA)
            .map(|frame| split_request(&frame.data))
            .collect()
    }

    pub fn requests_for(&self, service: ServiceCode) -> Vec<(EPath, Vec<u8>)> {
        self.requests()
            .into_iter()
            .filter(|(code, _, _)| *code == service.0)
            .map(|(_, path, data)| (path, data))
            .collect()
    }

    pub fn commands(&self) -> Vec<u16> {
        self.state
            .lock()
            .unwrap()
            .frames
            .iter()
            .map(|frame| frame.command)
            .collect()
    }

    /// Register a session over this device
    pub async fn session(&self) -> Session {
        Session::with_transport(Box::new(self.clone()), Duration::from_millis(200))
            .await
            .unwrap()
    }
}

/// Split an unconnected SendRRData payload into `(service, path, data)`
fn split_request(rr_data: &[u8]) -> (u8, EPath, Vec<u8>) {
    let packet = CommonPacket::decode(&rr_data[6..]).unwrap();
    let frame = &packet.find(item_type::UNCONNECTED_DATA).unwrap().data;
    let path_len = usize::from(frame[1]) * 2;
    let path = EPath::decode(&frame[2..2 + path_len]).unwrap();
    (frame[0], path, frame[2 + path_len..].to_vec())
}

fn reply_frame(service: u8, general: u8, extended: &[u16], data: &[u8]) -> Vec<u8> {
    let mut frame = vec![service | 0x80, 0, general, extended.len() as u8];
    for word in extended {
        frame.extend_from_slice(&word.to_le_bytes());
    }
    frame.extend_from_slice(data);
    frame
}

fn rr_data(frame: Vec<u8>, extra: &[CpfItem]) -> Vec<u8> {
    let mut packet = CommonPacket::new()
        .with_item(CpfItem::null_address())
        .with_item(CpfItem::unconnected_data(frame));
    for item in extra {
        packet.push(item.clone());
    }
    let mut out = vec![0u8; 6];
    out.extend_from_slice(&packet.encode().unwrap());
    out
}

/// Successful Forward Open reply echoing the request's ids and intervals
fn forward_open_reply(body: &[u8], o2t_id: u32, large: bool) -> Vec<u8> {
    // network parameters are 32-bit in a Large Forward Open
    let t2o_rpi_at = if large { 30 } else { 28 };
    let mut data = Vec::new();
    data.extend_from_slice(&o2t_id.to_le_bytes());
    data.extend_from_slice(&body[6..10]); // T→O id as proposed
    data.extend_from_slice(&body[10..18]); // triad
    data.extend_from_slice(&body[22..26]); // O→T RPI
    data.extend_from_slice(&body[t2o_rpi_at..t2o_rpi_at + 4]);
    data.extend_from_slice(&[0, 0]); // no application reply
    data
}

impl DeviceState {
    fn answer(&mut self, request: &EncapsulationPacket) -> Option<EncapsulationPacket> {
        let reply_to = |data: Vec<u8>, handle: u32| {
            Some(
                EncapsulationPacket::new(request.command, handle, data)
                    .with_sender_context(request.sender_context),
            )
        };

        match request.command {
            command::REGISTER_SESSION => reply_to(request.data.to_vec(), SESSION_HANDLE),
            command::SEND_RR_DATA => {
                let (service, _path, body) = split_request(&request.data);
                let reply = match self.replies.get(&service) {
                    Some(reply) => reply.clone(),
                    None => self.default_reply(service, &body),
                };
                match reply {
                    Reply::Silent => None,
                    Reply::Status {
                        general,
                        extended,
                        data,
                    } => {
                        let extra = if general == 0
                            && (service == ServiceCode::FORWARD_OPEN.0
                                || service == ServiceCode::LARGE_FORWARD_OPEN.0)
                        {
                            self.open_items.clone()
                        } else {
                            Vec::new()
                        };
                        let frame = reply_frame(service, general, &extended, &data);
                        reply_to(rr_data(frame, &extra), SESSION_HANDLE)
                    },
                }
            },
            _ => None,
        }
    }

    fn default_reply(&mut self, service: u8, body: &[u8]) -> Reply {
        match ServiceCode(service) {
            ServiceCode::FORWARD_OPEN | ServiceCode::LARGE_FORWARD_OPEN => {
                let large = service == ServiceCode::LARGE_FORWARD_OPEN.0;
                let o2t_id = O2T_CONNECTION_ID + self.next_o2t_id;
                self.next_o2t_id += 1;
                Reply::ok(forward_open_reply(body, o2t_id, large))
            },
            ServiceCode::FORWARD_CLOSE => {
                // serial, vendor, originator serial + no application reply
                let mut data = body[2..10].to_vec();
                data.extend_from_slice(&[0, 0]);
                Reply::ok(data)
            },
            ServiceCode::GET_ATTRIBUTE_ALL => Reply::ok(IDENTITY_REPLY.to_vec()),
            _ => Reply::error(0x08, Vec::new()),
        }
    }
}

#[async_trait]
impl SessionTransport for SimDevice {
    async fn send(&mut self, packet: EncapsulationPacket) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.broken {
            return Err(EipError::transport("Connection reset by peer"));
        }
        if let Some(reply) = state.answer(&packet) {
            state.pending.push_back(reply);
        }
        state.frames.push(packet);
        Ok(())
    }

    async fn receive(&mut self, _wait: Duration) -> Result<EncapsulationPacket> {
        let mut state = self.state.lock().unwrap();
        if state.broken {
            return Err(EipError::transport("Connection reset by peer"));
        }
        state
            .pending
            .pop_front()
            .ok_or_else(|| EipError::timeout("device did not answer"))
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(SocketAddr::V4(SocketAddrV4::new(DEVICE_IP, 44818)))
    }
}

#[derive(Default)]
pub struct NetworkState {
    pub sent: Vec<(Vec<u8>, SocketAddr)>,
    pub inbound: VecDeque<(Vec<u8>, SocketAddr)>,
    pub joined: Vec<Ipv4Addr>,
    pub broken: bool,
}

/// In-memory UDP side
#[derive(Clone, Default)]
pub struct SimNetwork {
    pub state: Arc<Mutex<NetworkState>>,
}

impl SimNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a T→O datagram from the device
    pub fn deliver(&self, datagram: Vec<u8>) {
        let from = SocketAddr::V4(SocketAddrV4::new(DEVICE_IP, 2222));
        self.state
            .lock()
            .unwrap()
            .inbound
            .push_back((datagram, from));
    }

    pub fn take_sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        std::mem::take(&mut self.state.lock().unwrap().sent)
    }

    pub fn joined(&self) -> Vec<Ipv4Addr> {
        self.state.lock().unwrap().joined.clone()
    }

    pub fn break_link(&self) {
        self.state.lock().unwrap().broken = true;
    }
}

impl CyclicTransport for SimNetwork {
    fn try_send_to(&mut self, datagram: &[u8], target: SocketAddr) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.broken {
            return Err(EipError::transport("Network is unreachable"));
        }
        state.sent.push((datagram.to_vec(), target));
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<(Vec<u8>, SocketAddr)>> {
        Ok(self.state.lock().unwrap().inbound.pop_front())
    }

    fn join_multicast(&mut self, group: Ipv4Addr) -> Result<()> {
        self.state.lock().unwrap().joined.push(group);
        Ok(())
    }
}

/// Class 1 T→O datagram without the run/idle header
pub fn t2o_datagram(connection_id: u32, sequence: u16, payload: &[u8]) -> Vec<u8> {
    let mut data = sequence.to_le_bytes().to_vec();
    data.extend_from_slice(payload);
    CommonPacket::new()
        .with_item(CpfItem::sequenced_address(connection_id, u32::from(sequence)))
        .with_item(CpfItem::connected_data(data))
        .encode()
        .unwrap()
}

/// Parsed O→T datagram: `(connection_id, encap_sequence, connected_data)`
pub fn parse_o2t(datagram: &[u8]) -> (u32, u32, Vec<u8>) {
    let packet = CommonPacket::decode(datagram).unwrap();
    let (id, sequence) = packet
        .find(item_type::SEQUENCED_ADDRESS)
        .unwrap()
        .as_sequenced_address()
        .unwrap();
    let data = packet.find(item_type::CONNECTED_DATA).unwrap().data.clone();
    (id, sequence, data)
}

/// FANUC implicit I/O: 16 bytes each way every 16 ms
pub fn robot_io() -> ConnectionParameters {
    ConnectionParameters {
        connection_path: EPath::class_instance(class::ASSEMBLY, 100)
            .with_connection_point(151)
            .with_connection_point(101),
        originator_vendor_id: 356,
        originator_serial_number: 0x12345,
        o2t_network_params: NetworkConnectionParams::point_to_point(16),
        t2o_network_params: NetworkConnectionParams::point_to_point(16),
        o2t_rpi: 16_000,
        t2o_rpi: 16_000,
        transport_type_trigger: TransportTypeTrigger::new(
            TransportClass::Class1,
            ProductionTrigger::Cyclic,
        ),
        ..ConnectionParameters::default()
    }
}

/// Counts close notifications
#[derive(Clone, Default)]
pub struct CloseCounter(Arc<AtomicUsize>);

impl CloseCounter {
    pub fn listener(&self) -> impl FnOnce() + Send + 'static {
        let count = Arc::clone(&self.0);
        move || {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
