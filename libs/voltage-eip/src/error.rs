//! EtherNet/IP Error Types
//!
//! Core error types for the scanner. Device status codes returned for an
//! explicit request are data (see `MessageRouterResponse`), not errors.

use thiserror::Error;

use crate::cip::status::GeneralStatus;

/// Result type for voltage-eip operations
pub type Result<T> = std::result::Result<T, EipError>;

/// EtherNet/IP scanner errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EipError {
    /// Connect/send/receive failure on a transport. Fatal to the session.
    #[error("Transport error: {0}")]
    Transport(String),

    /// No response within the session timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Malformed caller input, raised before any I/O
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not enough bytes left in a buffer for the requested value
    #[error("Buffer underflow: need {needed} bytes, {remaining} remaining")]
    BufferUnderflow { needed: usize, remaining: usize },

    /// Malformed, truncated or mismatched frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Encapsulation layer rejected a command
    #[error("Encapsulation error: command 0x{command:04X} returned status 0x{status:08X}")]
    Encapsulation { command: u16, status: u32 },

    /// Device rejected a request whose failure must reach the caller
    #[error("Service 0x{service:02X} failed: {general} (extended status {extended:04X?})")]
    Status {
        service: u8,
        general: GeneralStatus,
        extended: Vec<u16>,
    },

    /// Handle refers to a connection that no longer exists
    #[error("Connection state error: {0}")]
    ConnectionState(String),

    /// Operation on a session that is closed
    #[error("Session closed")]
    SessionClosed,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for EipError {
    fn from(err: std::io::Error) -> Self {
        EipError::Transport(err.to_string())
    }
}

impl From<figment::Error> for EipError {
    fn from(err: figment::Error) -> Self {
        EipError::Config(err.to_string())
    }
}

// Helper methods for creating errors
impl EipError {
    pub fn transport(msg: impl Into<String>) -> Self {
        EipError::Transport(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        EipError::Timeout(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        EipError::Validation(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        EipError::Protocol(msg.into())
    }

    pub fn connection_state(msg: impl Into<String>) -> Self {
        EipError::ConnectionState(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        EipError::Config(msg.into())
    }

    /// Check if this error leaves the session unusable
    pub fn is_fatal(&self) -> bool {
        matches!(self, EipError::Transport(_) | EipError::SessionClosed)
    }
}
