//! Explicit messaging through the device's Message Router
//!
//! Request frame carried in an Unconnected Data item of a SendRRData:
//!
//! ```text
//! [service][path_size_words][path...][data...]
//! ```
//!
//! Reply frame:
//!
//! ```text
//! [service | 0x80][reserved][general_status][additional_size_words][additional u16 * n][data...]
//! ```

use bytes::Bytes;
use tracing::{debug, warn};

use crate::cip::status::GeneralStatus;
use crate::cip::{EPath, ServiceCode};
use crate::codec::Buffer;
use crate::eip::{command, item_type, CommonPacket, CpfItem};
use crate::error::{EipError, Result};
use crate::session::Session;

/// Interface handle (u32) + timeout (u16) preceding the CPF in SendRRData
const RR_DATA_PREFIX_LEN: usize = 6;

/// Reply to an explicit request
///
/// A non-success `general_status` is an outcome, not an error: callers
/// branch on it (e.g. "object does not exist").
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRouterResponse {
    pub service: ServiceCode,
    pub general_status: GeneralStatus,
    pub additional_status: Vec<u16>,
    pub data: Bytes,
    /// CPF items other than the address and data items (e.g. sockaddr info)
    pub additional_items: Vec<CpfItem>,
}

impl MessageRouterResponse {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.general_status.is_success()
    }

    /// Human readable status, with the first extended word if present
    pub fn status_text(&self) -> String {
        match self.additional_status.first() {
            Some(ext) => format!("{} [ext 0x{:04X}]", self.general_status, ext),
            None => self.general_status.to_string(),
        }
    }

    /// Fail with [`EipError::Status`] unless the request succeeded
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(EipError::Status {
                service: self.service.0 & !ServiceCode::REPLY_FLAG,
                general: self.general_status,
                extended: self.additional_status,
            })
        }
    }
}

/// Encode a Message Router request
pub fn encode_request(service: ServiceCode, path: &EPath, data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(2 + path.encoded_len() + data.len());
    out.push(service.0);
    out.push(path.size_in_words()?);
    out.extend_from_slice(&path.encode());
    out.extend_from_slice(data);
    Ok(out)
}

/// Decode a Message Router reply
pub fn decode_response(frame: &[u8]) -> Result<MessageRouterResponse> {
    let mut buffer = Buffer::from_bytes(frame);
    let truncated = |e: EipError| EipError::protocol(format!("Truncated reply header: {e}"));

    let service = buffer.extract::<u8>().map_err(truncated)?;
    let _reserved = buffer.extract::<u8>().map_err(truncated)?;
    let general = buffer.extract::<u8>().map_err(truncated)?;
    let additional_words = buffer.extract::<u8>().map_err(truncated)?;

    if service & ServiceCode::REPLY_FLAG == 0 {
        return Err(EipError::protocol(format!(
            "Reply service 0x{service:02X} lacks the reply flag"
        )));
    }

    let mut additional_status = Vec::with_capacity(additional_words as usize);
    for _ in 0..additional_words {
        let word = buffer
            .extract::<u16>()
            .map_err(|e| EipError::protocol(format!("Truncated additional status: {e}")))?;
        additional_status.push(word);
    }

    Ok(MessageRouterResponse {
        service: ServiceCode(service),
        general_status: GeneralStatus(general),
        additional_status,
        data: Bytes::copy_from_slice(buffer.remaining_slice()),
        additional_items: Vec::new(),
    })
}

/// Sends explicit requests over a borrowed [`Session`]
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageRouter;

impl MessageRouter {
    pub fn new() -> Self {
        Self
    }

    /// Send one request and wait for the reply
    pub async fn send_request(
        &self,
        session: &Session,
        service: ServiceCode,
        path: &EPath,
        data: &[u8],
    ) -> Result<MessageRouterResponse> {
        self.send_request_with_items(session, service, path, data, Vec::new())
            .await
    }

    /// Send one request with extra CPF items after the data item
    pub async fn send_request_with_items(
        &self,
        session: &Session,
        service: ServiceCode,
        path: &EPath,
        data: &[u8],
        additional_items: Vec<CpfItem>,
    ) -> Result<MessageRouterResponse> {
        debug!("MR TX: {} {} {}B", service, path, data.len());

        let mut packet = CommonPacket::new()
            .with_item(CpfItem::null_address())
            .with_item(CpfItem::unconnected_data(encode_request(service, path, data)?));
        for item in additional_items {
            packet.push(item);
        }

        let mut rr_data = Buffer::new();
        rr_data
            .append(0u32) // interface handle
            .append(0u16) // timeout
            .append_bytes(&packet.encode()?);

        let reply = session
            .send_and_receive(command::SEND_RR_DATA, rr_data.into_vec())
            .await?;

        let response = parse_rr_data(&reply.data)?;
        if response.service.0 != service.reply_code() {
            return Err(EipError::protocol(format!(
                "Reply service mismatch: sent 0x{:02X}, got 0x{:02X}",
                service.0, response.service.0
            )));
        }

        if response.is_success() {
            debug!("MR RX: {} {}B", service, response.data.len());
        } else {
            warn!("MR RX: {} {} -> {}", service, path, response.status_text());
        }
        Ok(response)
    }
}

/// Unwrap the SendRRData payload of a reply
fn parse_rr_data(data: &[u8]) -> Result<MessageRouterResponse> {
    if data.len() < RR_DATA_PREFIX_LEN {
        return Err(EipError::protocol(format!(
            "SendRRData reply too short: {} bytes",
            data.len()
        )));
    }

    let packet = CommonPacket::decode(&data[RR_DATA_PREFIX_LEN..])?;
    let mut frame = None;
    let mut additional_items = Vec::new();
    for item in packet.into_items() {
        match item.type_id {
            item_type::NULL_ADDRESS => {},
            item_type::UNCONNECTED_DATA if frame.is_none() => frame = Some(item.data),
            _ => additional_items.push(item),
        }
    }

    let frame =
        frame.ok_or_else(|| EipError::protocol("SendRRData reply has no unconnected data item"))?;
    let mut response = decode_response(&frame)?;
    response.additional_items = additional_items;
    Ok(response)
}
