//! CIP service codes and well-known object classes

use std::fmt;

/// CIP service code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceCode(pub u8);

impl ServiceCode {
    pub const GET_ATTRIBUTE_ALL: Self = Self(0x01);
    pub const SET_ATTRIBUTE_ALL: Self = Self(0x02);
    pub const GET_ATTRIBUTE_LIST: Self = Self(0x03);
    pub const SET_ATTRIBUTE_LIST: Self = Self(0x04);
    pub const RESET: Self = Self(0x05);
    pub const START: Self = Self(0x06);
    pub const STOP: Self = Self(0x07);
    pub const CREATE: Self = Self(0x08);
    pub const DELETE: Self = Self(0x09);
    pub const MULTIPLE_SERVICE_PACKET: Self = Self(0x0A);
    pub const APPLY_ATTRIBUTES: Self = Self(0x0D);
    pub const GET_ATTRIBUTE_SINGLE: Self = Self(0x0E);
    pub const SET_ATTRIBUTE_SINGLE: Self = Self(0x10);
    pub const FIND_NEXT_OBJECT_INSTANCE: Self = Self(0x11);
    pub const RESTORE: Self = Self(0x15);
    pub const SAVE: Self = Self(0x16);
    pub const NO_OPERATION: Self = Self(0x17);
    pub const GET_MEMBER: Self = Self(0x18);
    pub const SET_MEMBER: Self = Self(0x19);
    pub const INSERT_MEMBER: Self = Self(0x1A);
    pub const REMOVE_MEMBER: Self = Self(0x1B);
    pub const GROUP_SYNC: Self = Self(0x1C);

    // Connection manager object
    pub const FORWARD_CLOSE: Self = Self(0x4E);
    pub const FORWARD_OPEN: Self = Self(0x54);
    pub const LARGE_FORWARD_OPEN: Self = Self(0x5B);

    /// Reply service code carries the request code with the high bit set
    pub const REPLY_FLAG: u8 = 0x80;

    #[inline]
    pub fn reply_code(self) -> u8 {
        self.0 | Self::REPLY_FLAG
    }

    /// Get human-readable service name
    pub fn name(self) -> &'static str {
        match self.0 {
            0x01 => "Get_Attribute_All",
            0x02 => "Set_Attribute_All",
            0x03 => "Get_Attribute_List",
            0x04 => "Set_Attribute_List",
            0x05 => "Reset",
            0x06 => "Start",
            0x07 => "Stop",
            0x08 => "Create",
            0x09 => "Delete",
            0x0A => "Multiple_Service_Packet",
            0x0D => "Apply_Attributes",
            0x0E => "Get_Attribute_Single",
            0x10 => "Set_Attribute_Single",
            0x11 => "Find_Next_Object_Instance",
            0x15 => "Restore",
            0x16 => "Save",
            0x17 => "No_Operation",
            0x18 => "Get_Member",
            0x19 => "Set_Member",
            0x1A => "Insert_Member",
            0x1B => "Remove_Member",
            0x1C => "Group_Sync",
            0x4E => "Forward_Close",
            0x54 => "Forward_Open",
            0x5B => "Large_Forward_Open",
            _ => "Vendor/Object Specific",
        }
    }
}

impl From<u8> for ServiceCode {
    fn from(code: u8) -> Self {
        Self(code)
    }
}

impl fmt::Display for ServiceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.0)
    }
}

/// Well-known object class IDs
pub mod class {
    pub const IDENTITY: u16 = 0x01;
    pub const MESSAGE_ROUTER: u16 = 0x02;
    pub const ASSEMBLY: u16 = 0x04;
    pub const CONNECTION_MANAGER: u16 = 0x06;
    pub const PARAMETER: u16 = 0x0F;
    pub const FILE: u16 = 0x37;
    pub const TCP_IP_INTERFACE: u16 = 0xF5;
    pub const ETHERNET_LINK: u16 = 0xF6;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_code() {
        assert_eq!(ServiceCode::GET_ATTRIBUTE_SINGLE.reply_code(), 0x8E);
        assert_eq!(ServiceCode::FORWARD_OPEN.reply_code(), 0xD4);
    }

    #[test]
    fn test_names() {
        assert_eq!(ServiceCode::FORWARD_CLOSE.name(), "Forward_Close");
        assert_eq!(ServiceCode(0x32).name(), "Vendor/Object Specific");
        assert_eq!(
            ServiceCode::SET_ATTRIBUTE_SINGLE.to_string(),
            "Set_Attribute_Single (0x10)"
        );
    }
}
