//! CIP general and extended status codes

use std::fmt;

/// General status code of a CIP reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeneralStatus(pub u8);

impl GeneralStatus {
    pub const SUCCESS: Self = Self(0x00);
    pub const CONNECTION_FAILURE: Self = Self(0x01);
    pub const RESOURCE_UNAVAILABLE: Self = Self(0x02);
    pub const INVALID_PARAMETER_VALUE: Self = Self(0x03);
    pub const PATH_SEGMENT_ERROR: Self = Self(0x04);
    pub const PATH_DESTINATION_UNKNOWN: Self = Self(0x05);
    pub const PARTIAL_TRANSFER: Self = Self(0x06);
    pub const CONNECTION_LOST: Self = Self(0x07);
    pub const SERVICE_NOT_SUPPORTED: Self = Self(0x08);
    pub const INVALID_ATTRIBUTE_VALUE: Self = Self(0x09);
    pub const ATTRIBUTE_LIST_ERROR: Self = Self(0x0A);
    pub const ALREADY_IN_REQUESTED_MODE: Self = Self(0x0B);
    pub const OBJECT_STATE_CONFLICT: Self = Self(0x0C);
    pub const OBJECT_ALREADY_EXISTS: Self = Self(0x0D);
    pub const ATTRIBUTE_NOT_SETTABLE: Self = Self(0x0E);
    pub const PRIVILEGE_VIOLATION: Self = Self(0x0F);
    pub const DEVICE_STATE_CONFLICT: Self = Self(0x10);
    pub const REPLY_DATA_TOO_LARGE: Self = Self(0x11);
    pub const FRAGMENTATION_OF_PRIMITIVE: Self = Self(0x12);
    pub const NOT_ENOUGH_DATA: Self = Self(0x13);
    pub const ATTRIBUTE_NOT_SUPPORTED: Self = Self(0x14);
    pub const TOO_MUCH_DATA: Self = Self(0x15);
    pub const OBJECT_DOES_NOT_EXIST: Self = Self(0x16);
    pub const SERVICE_FRAGMENTATION_OUT_OF_SEQUENCE: Self = Self(0x17);
    pub const NO_STORED_ATTRIBUTE_DATA: Self = Self(0x18);
    pub const STORE_OPERATION_FAILURE: Self = Self(0x19);
    pub const ROUTING_FAILURE_REQUEST_TOO_LARGE: Self = Self(0x1A);
    pub const ROUTING_FAILURE_RESPONSE_TOO_LARGE: Self = Self(0x1B);
    pub const MISSING_ATTRIBUTE_LIST_ENTRY: Self = Self(0x1C);
    pub const INVALID_ATTRIBUTE_VALUE_LIST: Self = Self(0x1D);
    pub const EMBEDDED_SERVICE_ERROR: Self = Self(0x1E);
    pub const VENDOR_SPECIFIC: Self = Self(0x1F);
    pub const INVALID_PARAMETER: Self = Self(0x20);
    pub const WRITE_ONCE_ALREADY_WRITTEN: Self = Self(0x21);
    pub const INVALID_REPLY_RECEIVED: Self = Self(0x22);
    pub const KEY_FAILURE_IN_PATH: Self = Self(0x25);
    pub const PATH_SIZE_INVALID: Self = Self(0x26);
    pub const UNEXPECTED_ATTRIBUTE_IN_LIST: Self = Self(0x27);
    pub const INVALID_MEMBER_ID: Self = Self(0x28);
    pub const MEMBER_NOT_SETTABLE: Self = Self(0x29);

    #[inline]
    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Get human-readable status description
    pub fn description(self) -> &'static str {
        match self.0 {
            0x00 => "Success",
            0x01 => "Connection failure",
            0x02 => "Resource unavailable",
            0x03 => "Invalid parameter value",
            0x04 => "Path segment error",
            0x05 => "Path destination unknown",
            0x06 => "Partial transfer",
            0x07 => "Connection lost",
            0x08 => "Service not supported",
            0x09 => "Invalid attribute value",
            0x0A => "Attribute list error",
            0x0B => "Already in requested mode/state",
            0x0C => "Object state conflict",
            0x0D => "Object already exists",
            0x0E => "Attribute not settable",
            0x0F => "Privilege violation",
            0x10 => "Device state conflict",
            0x11 => "Reply data too large",
            0x12 => "Fragmentation of a primitive value",
            0x13 => "Not enough data",
            0x14 => "Attribute not supported",
            0x15 => "Too much data",
            0x16 => "Object does not exist",
            0x17 => "Service fragmentation sequence not in progress",
            0x18 => "No stored attribute data",
            0x19 => "Store operation failure",
            0x1A => "Routing failure, request packet too large",
            0x1B => "Routing failure, response packet too large",
            0x1C => "Missing attribute list entry data",
            0x1D => "Invalid attribute value list",
            0x1E => "Embedded service error",
            0x1F => "Vendor specific error",
            0x20 => "Invalid parameter",
            0x21 => "Write-once value or medium already written",
            0x22 => "Invalid reply received",
            0x25 => "Key failure in path",
            0x26 => "Path size invalid",
            0x27 => "Unexpected attribute in list",
            0x28 => "Invalid member ID",
            0x29 => "Member not settable",
            _ => "Unknown status",
        }
    }
}

impl From<u8> for GeneralStatus {
    fn from(code: u8) -> Self {
        Self(code)
    }
}

impl fmt::Display for GeneralStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.description(), self.0)
    }
}

/// Describe a connection manager extended status (general status 0x01)
pub fn connection_manager_extended_description(extended: u16) -> &'static str {
    match extended {
        0x0100 => "Connection in use or duplicate Forward Open",
        0x0103 => "Transport class and trigger combination not supported",
        0x0106 => "Ownership conflict",
        0x0107 => "Target connection not found",
        0x0108 => "Invalid network connection parameter",
        0x0109 => "Invalid connection size",
        0x0110 => "Target for connection not configured",
        0x0111 => "RPI not supported",
        0x0113 => "Out of connections",
        0x0114 => "Vendor ID or product code mismatch",
        0x0115 => "Device type mismatch",
        0x0116 => "Revision mismatch",
        0x0117 => "Invalid produced or consumed application path",
        0x0118 => "Invalid or inconsistent configuration application path",
        0x0119 => "Non-listen only connection not opened",
        0x011A => "Target object out of connections",
        0x0203 => "Connection timed out",
        0x0204 => "Unconnected request timed out",
        0x0205 => "Parameter error in unconnected request",
        0x0311 => "Invalid port ID in path",
        0x0312 => "Invalid link address in path",
        0x0315 => "Invalid segment in connection path",
        _ => "Unknown extended status",
    }
}
