//! Byte order for scalar serialization
//!
//! CIP encodes every multi-byte scalar little-endian. Big-endian is kept for
//! vendor payloads that pack data in network order.

/// Byte order used by [`Buffer`](super::Buffer) for multi-byte scalars
///
/// For 32-bit value `0x12345678`:
/// - `LittleEndian (DCBA)`: [0x78, 0x56, 0x34, 0x12]
/// - `BigEndian (ABCD)`: [0x12, 0x34, 0x56, 0x78]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Least significant byte first. CIP wire order.
    LittleEndian,

    /// Most significant byte first (network byte order)
    BigEndian,
}

impl ByteOrder {
    /// Convert from common string formats
    ///
    /// - "DCBA", "LE", "LITTLE_ENDIAN" → LittleEndian
    /// - "ABCD", "BE", "BIG_ENDIAN" → BigEndian
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized = s.to_uppercase().replace('-', "");
        match normalized.as_str() {
            "DCBA" | "LE" | "LITTLE_ENDIAN" | "LITTLEENDIAN" => Some(Self::LittleEndian),
            "ABCD" | "BE" | "BIG_ENDIAN" | "BIGENDIAN" => Some(Self::BigEndian),
            _ => None,
        }
    }

    /// Get descriptive name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LittleEndian => "DCBA (Little-Endian)",
            Self::BigEndian => "ABCD (Big-Endian)",
        }
    }

    /// Check if this is the big-endian variant
    pub fn is_big_endian(&self) -> bool {
        matches!(self, Self::BigEndian)
    }
}

impl std::fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for ByteOrder {
    /// Default to little-endian (CIP wire order)
    fn default() -> Self {
        Self::LittleEndian
    }
}
