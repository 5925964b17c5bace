//! EtherNet/IP encapsulation layer
//!
//! Every TCP message is a 24-byte little-endian header followed by
//! `length` bytes of command data:
//!
//! ```text
//! [command u16][length u16][session u32][status u32][context 8B][options u32][data...]
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::constants::{ENCAPSULATION_HEADER_LEN, MAX_ENCAPSULATION_DATA_LEN};
use crate::error::{EipError, Result};

/// Encapsulation command codes
pub mod command {
    pub const NOP: u16 = 0x0000;
    pub const LIST_SERVICES: u16 = 0x0004;
    pub const LIST_IDENTITY: u16 = 0x0063;
    pub const LIST_INTERFACES: u16 = 0x0064;
    pub const REGISTER_SESSION: u16 = 0x0065;
    pub const UNREGISTER_SESSION: u16 = 0x0066;
    pub const SEND_RR_DATA: u16 = 0x006F;
    pub const SEND_UNIT_DATA: u16 = 0x0070;
}

/// Encapsulation status codes
pub mod status {
    pub const SUCCESS: u32 = 0x0000;
    pub const INVALID_COMMAND: u32 = 0x0001;
    pub const INSUFFICIENT_MEMORY: u32 = 0x0002;
    pub const INCORRECT_DATA: u32 = 0x0003;
    pub const INVALID_SESSION_HANDLE: u32 = 0x0064;
    pub const INVALID_LENGTH: u32 = 0x0065;
    pub const UNSUPPORTED_PROTOCOL_VERSION: u32 = 0x0069;
}

/// One encapsulation message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncapsulationPacket {
    pub command: u16,
    pub session_handle: u32,
    pub status: u32,
    pub sender_context: u64,
    pub options: u32,
    pub data: Bytes,
}

impl EncapsulationPacket {
    /// Create a request packet with zero status and options
    pub fn new(command: u16, session_handle: u32, data: impl Into<Bytes>) -> Self {
        Self {
            command,
            session_handle,
            status: status::SUCCESS,
            sender_context: 0,
            options: 0,
            data: data.into(),
        }
    }

    pub fn with_sender_context(mut self, context: u64) -> Self {
        self.sender_context = context;
        self
    }

    /// Encoded length in bytes
    pub fn encoded_len(&self) -> usize {
        ENCAPSULATION_HEADER_LEN + self.data.len()
    }

    /// Encode into `dst`
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        if self.data.len() > MAX_ENCAPSULATION_DATA_LEN {
            return Err(EipError::validation(format!(
                "Encapsulation data too large: {} bytes (max {})",
                self.data.len(),
                MAX_ENCAPSULATION_DATA_LEN
            )));
        }

        dst.reserve(self.encoded_len());
        dst.put_u16_le(self.command);
        dst.put_u16_le(self.data.len() as u16);
        dst.put_u32_le(self.session_handle);
        dst.put_u32_le(self.status);
        dst.put_u64_le(self.sender_context);
        dst.put_u32_le(self.options);
        dst.put_slice(&self.data);
        Ok(())
    }

    /// Encode into a new vector
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut dst = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut dst)?;
        Ok(dst.to_vec())
    }

    /// Decode a complete packet; trailing bytes are rejected
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        if data.len() < ENCAPSULATION_HEADER_LEN {
            return Err(EipError::protocol(format!(
                "Encapsulation frame too short: {} bytes",
                data.len()
            )));
        }
        let length = u16::from_le_bytes([data[2], data[3]]) as usize;
        if data.len() != ENCAPSULATION_HEADER_LEN + length {
            return Err(EipError::protocol(format!(
                "Invalid encapsulation length: header says {}, frame carries {}",
                length,
                data.len() - ENCAPSULATION_HEADER_LEN
            )));
        }

        let mut src = BytesMut::from(data);
        Ok(Self::split_from(&mut src, length))
    }

    fn split_from(src: &mut BytesMut, length: usize) -> Self {
        let mut header = src.split_to(ENCAPSULATION_HEADER_LEN);
        let command = header.get_u16_le();
        let _length = header.get_u16_le();
        let session_handle = header.get_u32_le();
        let status = header.get_u32_le();
        let sender_context = header.get_u64_le();
        let options = header.get_u32_le();
        let data = src.split_to(length).freeze();

        Self {
            command,
            session_handle,
            status,
            sender_context,
            options,
            data,
        }
    }
}

/// Framing codec for the encapsulation TCP stream
#[derive(Debug, Default, Clone, Copy)]
pub struct EncapsulationCodec;

impl Decoder for EncapsulationCodec {
    type Item = EncapsulationPacket;
    type Error = EipError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < ENCAPSULATION_HEADER_LEN {
            return Ok(None);
        }

        let length = u16::from_le_bytes([src[2], src[3]]) as usize;
        if length > MAX_ENCAPSULATION_DATA_LEN {
            return Err(EipError::protocol(format!(
                "Invalid encapsulation length: {}",
                length
            )));
        }

        let total = ENCAPSULATION_HEADER_LEN + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let packet = EncapsulationPacket::split_from(src, length);
        debug!(
            "Encap RX: cmd={:04X} session={:08X} status={:X} len={}",
            packet.command,
            packet.session_handle,
            packet.status,
            packet.data.len()
        );
        Ok(Some(packet))
    }
}

impl Encoder<EncapsulationPacket> for EncapsulationCodec {
    type Error = EipError;

    fn encode(&mut self, item: EncapsulationPacket, dst: &mut BytesMut) -> Result<()> {
        debug!(
            "Encap TX: cmd={:04X} session={:08X} len={}",
            item.command,
            item.session_handle,
            item.data.len()
        );
        item.encode_into(dst)
    }
}
