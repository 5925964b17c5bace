//! EtherNet/IP protocol constants
//!
//! Values fixed by the EtherNet/IP encapsulation and the CIP connection
//! manager object.

use std::time::Duration;

// ============================================================================
// Ports
// ============================================================================

/// TCP port for explicit messaging (0xAF12)
pub const EXPLICIT_PORT: u16 = 0xAF12;

/// UDP port for implicit (class 0/1) I/O data
pub const IMPLICIT_PORT: u16 = 2222;

// ============================================================================
// Encapsulation
// ============================================================================

/// Encapsulation header length
/// Format: Command(2) + Length(2) + Session(4) + Status(4) + Context(8) + Options(4)
pub const ENCAPSULATION_HEADER_LEN: usize = 24;

/// Largest data section an encapsulation header can describe
/// = 65535 - 24 header bytes
pub const MAX_ENCAPSULATION_DATA_LEN: usize = u16::MAX as usize - ENCAPSULATION_HEADER_LEN;

/// Protocol version sent in RegisterSession
pub const PROTOCOL_VERSION: u16 = 1;

/// Default response timeout for explicit exchanges
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Connected messaging
// ============================================================================

/// Sequence count prefix carried by class 1/2/3 connected data
pub const SEQUENCE_COUNT_LEN: usize = 2;

/// 32-bit run/idle header carried when the real-time format says so
pub const RUN_IDLE_HEADER_LEN: usize = 4;

/// Run bit of the 32-bit run/idle header
pub const RUN_IDLE_RUN: u32 = 0x0000_0001;

/// Base of the inactivity timeout: `RPI * (4 << multiplier)`
pub const TIMEOUT_MULTIPLIER_BASE: u32 = 4;

/// Largest timeout multiplier encoding (x512)
pub const MAX_TIMEOUT_MULTIPLIER: u8 = 7;

/// Largest connection size the 16-bit Forward Open can carry (9-bit field)
pub const MAX_FORWARD_OPEN_SIZE: u16 = 0x01FF;

/// Largest connection size the Large Forward Open can carry (16-bit field)
pub const MAX_LARGE_FORWARD_OPEN_SIZE: u16 = u16::MAX;

/// Default priority/time-tick byte (tick = 2^10 ms)
pub const DEFAULT_PRIORITY_TIME_TICK: u8 = 0x0A;

/// Default timeout ticks for the unconnected open request
pub const DEFAULT_TIMEOUT_TICKS: u8 = 0x0E;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_constants() {
        assert_eq!(EXPLICIT_PORT, 44818);
        assert_eq!(ENCAPSULATION_HEADER_LEN, 24);
        assert_eq!(
            ENCAPSULATION_HEADER_LEN + MAX_ENCAPSULATION_DATA_LEN,
            u16::MAX as usize
        );
    }

    #[test]
    fn test_timeout_multiplier_range() {
        assert_eq!(TIMEOUT_MULTIPLIER_BASE << MAX_TIMEOUT_MULTIPLIER, 512);
    }
}
