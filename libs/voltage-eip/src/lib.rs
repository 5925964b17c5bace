//! VoltageEMS EtherNet/IP Scanner
//!
//! Client side of CIP over EtherNet/IP. Two ways of talking to a device:
//!
//! - **Explicit messaging**: request/reply through the device's Message
//!   Router over a registered TCP session ([`MessageRouter::send_request`]).
//! - **Implicit messaging**: cyclic I/O connections opened with Forward Open
//!   and exchanged over UDP while the caller polls
//!   [`ConnectionManager::handle_connections`].
//!
//! ```text
//! voltage-eip
//!     ├── codec               (scalar buffer, byte order)
//!     ├── cip                 (EPath, service / status codes, identity)
//!     ├── eip                 (encapsulation, common packet format)
//!     ├── transport           (TCP / UDP behind traits)
//!     ├── session             (RegisterSession, request/response)
//!     ├── message_router      (explicit requests)
//!     ├── connection_manager  (Forward Open / Close, cyclic data)
//!     ├── config              (figment loader)
//!     └── vendor::fanuc       (register addressing)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use voltage_eip::{EPath, MessageRouter, ServiceCode, Session};
//!
//! # async fn run() -> voltage_eip::Result<()> {
//! let session = Session::connect_default("192.168.1.10").await?;
//! let response = MessageRouter::new()
//!     .send_request(
//!         &session,
//!         ServiceCode::GET_ATTRIBUTE_SINGLE,
//!         &EPath::new(0x01, 1, 7),
//!         &[],
//!     )
//!     .await?;
//! if response.is_success() {
//!     println!("{} bytes", response.data.len());
//! }
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod cip;
pub mod codec;
pub mod config;
pub mod connection_manager;
pub mod constants;
pub mod eip;
pub mod error;
pub mod message_router;
pub mod session;
pub mod transport;
pub mod vendor;

// Re-exports for convenience
pub use cip::{EPath, GeneralStatus, IdentityInfo, ServiceCode};
pub use codec::{Buffer, ByteOrder};
pub use config::{load_config, load_config_from_file, ScannerConfig};
pub use connection_manager::{
    CloseOutcome, ConnectionHandle, ConnectionManager, ConnectionParameters, ConnectionState,
    NetworkConnectionParams, TransportTypeTrigger,
};
pub use error::{EipError, Result};
pub use message_router::{MessageRouter, MessageRouterResponse};
pub use session::Session;
pub use transport::{CyclicTransport, SessionTransport, TcpTransport, UdpTransport};
