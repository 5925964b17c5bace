//! Identity object (class 0x01) reader

use serde::Serialize;

use crate::cip::{class, EPath, ServiceCode};
use crate::codec::Buffer;
use crate::error::{EipError, Result};
use crate::message_router::MessageRouter;
use crate::session::Session;

/// Identity object instance attributes 1-7
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityInfo {
    pub vendor_id: u16,
    pub device_type: u16,
    pub product_code: u16,
    pub revision_major: u8,
    pub revision_minor: u8,
    pub status: u16,
    pub serial_number: u32,
    pub product_name: String,
}

impl IdentityInfo {
    /// Parse a Get_Attribute_All reply body
    ///
    /// Attributes past the product name (state, configuration consistency
    /// value, ...) are optional and ignored.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut buffer = Buffer::from_bytes(data);
        let truncated = |e: EipError| EipError::protocol(format!("Truncated identity reply: {e}"));

        Ok(Self {
            vendor_id: buffer.extract().map_err(truncated)?,
            device_type: buffer.extract().map_err(truncated)?,
            product_code: buffer.extract().map_err(truncated)?,
            revision_major: buffer.extract().map_err(truncated)?,
            revision_minor: buffer.extract().map_err(truncated)?,
            status: buffer.extract().map_err(truncated)?,
            serial_number: buffer.extract().map_err(truncated)?,
            product_name: buffer.extract_short_string().map_err(truncated)?,
        })
    }

    /// Revision as `major.minor`
    pub fn revision(&self) -> String {
        format!("{}.{}", self.revision_major, self.revision_minor)
    }

    /// Read instance 1 of the identity object
    pub async fn read(session: &Session) -> Result<Self> {
        let response = MessageRouter::new()
            .send_request(
                session,
                ServiceCode::GET_ATTRIBUTE_ALL,
                &EPath::class_instance(class::IDENTITY, 1),
                &[],
            )
            .await?
            .into_result()?;
        Self::decode(&response.data)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    /// Reply captured from a FANUC R-30iB Plus
    const CAPTURED: [u8; 34] = [
        0x64, 0x01, // vendor 356
        0x0C, 0x00, // communications adapter
        0x01, 0x00, // product code
        0x09, 0x1E, // revision 9.30
        0x30, 0x00, // status
        0x78, 0x56, 0x34, 0x12, // serial
        0x0F, b'F', b'A', b'N', b'U', b'C', b' ', b'R', b'-', b'3', b'0', b'i', b'B', b'+', b' ',
        b' ', // name
        0x03, 0x00, 0x00, 0x00, // trailing state + padding
    ];

    #[test]
    fn test_decode_captured_reply() {
        let identity = IdentityInfo::decode(&CAPTURED).unwrap();
        assert_eq!(identity.vendor_id, 356);
        assert_eq!(identity.device_type, 0x0C);
        assert_eq!(identity.product_code, 1);
        assert_eq!(identity.revision(), "9.30");
        assert_eq!(identity.serial_number, 0x1234_5678);
        assert_eq!(identity.product_name, "FANUC R-30iB+  ");
    }

    #[test]
    fn test_decode_truncated() {
        assert!(matches!(
            IdentityInfo::decode(&CAPTURED[..12]),
            Err(EipError::Protocol(_))
        ));
        assert!(IdentityInfo::decode(&CAPTURED[..20]).is_err());
    }
}
