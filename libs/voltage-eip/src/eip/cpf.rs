//! Common Packet Format (CPF)
//!
//! ```text
//! [item_count u16] ( [type_id u16][length u16][data...] )*
//! ```

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::codec::Buffer;
use crate::error::{EipError, Result};

/// CPF item type IDs
pub mod item_type {
    pub const NULL_ADDRESS: u16 = 0x0000;
    pub const LIST_IDENTITY: u16 = 0x000C;
    pub const CONNECTED_ADDRESS: u16 = 0x00A1;
    pub const CONNECTED_DATA: u16 = 0x00B1;
    pub const UNCONNECTED_DATA: u16 = 0x00B2;
    pub const SOCKADDR_O2T: u16 = 0x8000;
    pub const SOCKADDR_T2O: u16 = 0x8001;
    pub const SEQUENCED_ADDRESS: u16 = 0x8002;
}

const AF_INET: u16 = 2;
const SOCKADDR_ITEM_LEN: usize = 16;

/// One CPF item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpfItem {
    pub type_id: u16,
    pub data: Vec<u8>,
}

impl CpfItem {
    pub fn new(type_id: u16, data: Vec<u8>) -> Self {
        Self { type_id, data }
    }

    pub fn null_address() -> Self {
        Self::new(item_type::NULL_ADDRESS, Vec::new())
    }

    pub fn unconnected_data(data: Vec<u8>) -> Self {
        Self::new(item_type::UNCONNECTED_DATA, data)
    }

    pub fn connected_data(data: Vec<u8>) -> Self {
        Self::new(item_type::CONNECTED_DATA, data)
    }

    /// Sequenced address item: connection id + encapsulation sequence number
    pub fn sequenced_address(connection_id: u32, sequence: u32) -> Self {
        let mut buffer = Buffer::new();
        buffer.append(connection_id).append(sequence);
        Self::new(item_type::SEQUENCED_ADDRESS, buffer.into_vec())
    }

    /// Parse a sequenced address item into (connection id, sequence)
    pub fn as_sequenced_address(&self) -> Result<(u32, u32)> {
        if self.type_id != item_type::SEQUENCED_ADDRESS {
            return Err(EipError::protocol(format!(
                "Expected sequenced address item, got type 0x{:04X}",
                self.type_id
            )));
        }
        let mut buffer = Buffer::from_bytes(self.data.clone());
        let connection_id = buffer.extract::<u32>()?;
        let sequence = buffer.extract::<u32>()?;
        Ok((connection_id, sequence))
    }

    /// Socket address item (O→T or T→O). Fields are big-endian.
    pub fn sockaddr(type_id: u16, addr: SocketAddrV4) -> Self {
        let mut data = Vec::with_capacity(SOCKADDR_ITEM_LEN);
        data.extend_from_slice(&AF_INET.to_be_bytes());
        data.extend_from_slice(&addr.port().to_be_bytes());
        data.extend_from_slice(&addr.ip().octets());
        data.extend_from_slice(&[0u8; 8]);
        Self::new(type_id, data)
    }

    /// Parse a socket address item
    pub fn as_sockaddr(&self) -> Result<SocketAddrV4> {
        if !matches!(
            self.type_id,
            item_type::SOCKADDR_O2T | item_type::SOCKADDR_T2O
        ) {
            return Err(EipError::protocol(format!(
                "Expected sockaddr item, got type 0x{:04X}",
                self.type_id
            )));
        }
        if self.data.len() != SOCKADDR_ITEM_LEN {
            return Err(EipError::protocol(format!(
                "Invalid sockaddr item length: {}",
                self.data.len()
            )));
        }
        let port = u16::from_be_bytes([self.data[2], self.data[3]]);
        let ip = Ipv4Addr::new(self.data[4], self.data[5], self.data[6], self.data[7]);
        Ok(SocketAddrV4::new(ip, port))
    }
}

/// Common packet: an ordered list of items
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonPacket {
    items: Vec<CpfItem>,
}

impl CommonPacket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, item: CpfItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn push(&mut self, item: CpfItem) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[CpfItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<CpfItem> {
        self.items
    }

    /// First item of the given type
    pub fn find(&self, type_id: u16) -> Option<&CpfItem> {
        self.items.iter().find(|item| item.type_id == type_id)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let count = u16::try_from(self.items.len())
            .map_err(|_| EipError::validation("Too many CPF items"))?;
        let mut buffer = Buffer::new();
        buffer.append(count);
        for item in &self.items {
            let len = u16::try_from(item.data.len()).map_err(|_| {
                EipError::validation(format!("CPF item too large: {} bytes", item.data.len()))
            })?;
            buffer
                .append(item.type_id)
                .append(len)
                .append_bytes(&item.data);
        }
        Ok(buffer.into_vec())
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut buffer = Buffer::from_bytes(data);
        let count = buffer
            .extract::<u16>()
            .map_err(|e| EipError::protocol(format!("CPF item count missing: {e}")))?;

        let mut items = Vec::with_capacity(count as usize);
        for index in 0..count {
            let type_id = buffer.extract::<u16>();
            let len = buffer.extract::<u16>();
            let (type_id, len) = match (type_id, len) {
                (Ok(t), Ok(l)) => (t, l),
                _ => {
                    return Err(EipError::protocol(format!(
                        "Truncated CPF item header at item {index}"
                    )))
                },
            };
            let data = buffer.extract_bytes(len as usize).map_err(|e| {
                EipError::protocol(format!("Truncated CPF item {index} (type 0x{type_id:04X}): {e}"))
            })?;
            items.push(CpfItem { type_id, data });
        }

        if buffer.remaining() != 0 {
            return Err(EipError::protocol(format!(
                "{} trailing bytes after CPF items",
                buffer.remaining()
            )));
        }

        Ok(Self { items })
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_unconnected_packet_layout() {
        let packet = CommonPacket::new()
            .with_item(CpfItem::null_address())
            .with_item(CpfItem::unconnected_data(vec![0x0E, 0x02]));

        assert_eq!(
            packet.encode().unwrap(),
            vec![
                0x02, 0x00, // count
                0x00, 0x00, 0x00, 0x00, // null address
                0xB2, 0x00, 0x02, 0x00, 0x0E, 0x02, // unconnected data
            ]
        );
    }

    #[test]
    fn test_decode_round_trip() {
        let packet = CommonPacket::new()
            .with_item(CpfItem::sequenced_address(0xAABB_CCDD, 42))
            .with_item(CpfItem::connected_data(vec![1, 2, 3]));
        let decoded = CommonPacket::decode(&packet.encode().unwrap()).unwrap();

        assert_eq!(decoded, packet);
        assert_eq!(
            decoded.items()[0].as_sequenced_address().unwrap(),
            (0xAABB_CCDD, 42)
        );
    }

    #[test]
    fn test_decode_truncated() {
        assert!(CommonPacket::decode(&[]).is_err());
        assert!(CommonPacket::decode(&[0x01, 0x00, 0xB1]).is_err());
        assert!(CommonPacket::decode(&[0x01, 0x00, 0xB1, 0x00, 0x04, 0x00, 0x01]).is_err());
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let mut bytes = CommonPacket::new()
            .with_item(CpfItem::null_address())
            .encode()
            .unwrap();
        bytes.push(0);
        assert!(matches!(
            CommonPacket::decode(&bytes),
            Err(EipError::Protocol(_))
        ));
    }

    #[test]
    fn test_sockaddr_item() {
        let addr = SocketAddrV4::new(Ipv4Addr::new(239, 192, 1, 10), 2222);
        let item = CpfItem::sockaddr(item_type::SOCKADDR_T2O, addr);

        assert_eq!(&item.data[0..2], &[0x00, 0x02]);
        assert_eq!(&item.data[2..4], &[0x08, 0xAE]);
        assert_eq!(&item.data[4..8], &[239, 192, 1, 10]);
        assert_eq!(item.as_sockaddr().unwrap(), addr);
    }

    #[test]
    fn test_find() {
        let packet = CommonPacket::new()
            .with_item(CpfItem::null_address())
            .with_item(CpfItem::unconnected_data(vec![7]));
        assert_eq!(
            packet.find(item_type::UNCONNECTED_DATA).unwrap().data,
            vec![7]
        );
        assert!(packet.find(item_type::CONNECTED_DATA).is_none());
    }
}
