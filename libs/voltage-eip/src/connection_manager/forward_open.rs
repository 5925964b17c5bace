//! Forward Open / Forward Close request bodies
//!
//! ```text
//! Forward Open:
//!   [priority_tick u8][timeout_ticks u8][o2t_id u32][t2o_id u32]
//!   [serial u16][vendor u16][orig_serial u32][multiplier u8][reserved 3B]
//!   [o2t_rpi u32][o2t_params u16|u32][t2o_rpi u32][t2o_params u16|u32]
//!   [transport u8][path_words u8][path...]
//!
//! Forward Close:
//!   [priority_tick u8][timeout_ticks u8][serial u16][vendor u16][orig_serial u32]
//!   [path_words u8][reserved u8][path...]
//! ```

use crate::cip::EPath;
use crate::codec::Buffer;
use crate::error::{EipError, Result};

use super::network_params::ConnectionParameters;

/// Identifies a connection towards the device: (serial, vendor, originator serial)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionTriad {
    pub connection_serial: u16,
    pub originator_vendor_id: u16,
    pub originator_serial: u32,
}

/// Encode a Forward Open (or Large Forward Open) request body
pub fn encode_forward_open(
    params: &ConnectionParameters,
    connection_serial: u16,
    t2o_connection_id: u32,
    large: bool,
) -> Result<Vec<u8>> {
    params.validate()?;
    let o2t_size = params.o2t_wire_size()?;
    let t2o_size = params.t2o_wire_size()?;

    let mut buffer = Buffer::new();
    buffer
        .append(params.priority_time_tick)
        .append(params.timeout_ticks)
        .append(0u32) // O→T id, chosen by the target
        .append(t2o_connection_id)
        .append(connection_serial)
        .append(params.originator_vendor_id)
        .append(params.originator_serial_number)
        .append(params.connection_timeout_multiplier)
        .append_bytes(&[0, 0, 0])
        .append(params.o2t_rpi);
    if large {
        buffer.append(params.o2t_network_params.to_u32(o2t_size));
    } else {
        buffer.append(params.o2t_network_params.to_u16(o2t_size)?);
    }
    buffer.append(params.t2o_rpi);
    if large {
        buffer.append(params.t2o_network_params.to_u32(t2o_size));
    } else {
        buffer.append(params.t2o_network_params.to_u16(t2o_size)?);
    }
    buffer
        .append(params.transport_type_trigger.to_byte())
        .append(params.connection_path.size_in_words()?)
        .append_bytes(&params.connection_path.encode());

    Ok(buffer.into_vec())
}

/// Successful Forward Open reply body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardOpenResponse {
    pub o2t_connection_id: u32,
    pub t2o_connection_id: u32,
    pub triad: ConnectionTriad,
    /// Actual packet interval O→T, microseconds
    pub o2t_api: u32,
    /// Actual packet interval T→O, microseconds
    pub t2o_api: u32,
    pub application_reply: Vec<u8>,
}

impl ForwardOpenResponse {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut buffer = Buffer::from_bytes(data);
        let truncated = |e: EipError| EipError::protocol(format!("Truncated Forward Open reply: {e}"));

        let o2t_connection_id = buffer.extract::<u32>().map_err(truncated)?;
        let t2o_connection_id = buffer.extract::<u32>().map_err(truncated)?;
        let connection_serial = buffer.extract::<u16>().map_err(truncated)?;
        let originator_vendor_id = buffer.extract::<u16>().map_err(truncated)?;
        let originator_serial = buffer.extract::<u32>().map_err(truncated)?;
        let o2t_api = buffer.extract::<u32>().map_err(truncated)?;
        let t2o_api = buffer.extract::<u32>().map_err(truncated)?;
        let reply_words = buffer.extract::<u8>().map_err(truncated)?;
        let _reserved = buffer.extract::<u8>().map_err(truncated)?;
        let application_reply = buffer
            .extract_bytes(usize::from(reply_words) * 2)
            .map_err(truncated)?;

        Ok(Self {
            o2t_connection_id,
            t2o_connection_id,
            triad: ConnectionTriad {
                connection_serial,
                originator_vendor_id,
                originator_serial,
            },
            o2t_api,
            t2o_api,
            application_reply,
        })
    }
}

/// Encode a Forward Close request body
pub fn encode_forward_close(
    priority_time_tick: u8,
    timeout_ticks: u8,
    triad: &ConnectionTriad,
    path: &EPath,
) -> Result<Vec<u8>> {
    let mut buffer = Buffer::new();
    buffer
        .append(priority_time_tick)
        .append(timeout_ticks)
        .append(triad.connection_serial)
        .append(triad.originator_vendor_id)
        .append(triad.originator_serial)
        .append(path.size_in_words()?)
        .append(0u8)
        .append_bytes(&path.encode());
    Ok(buffer.into_vec())
}
