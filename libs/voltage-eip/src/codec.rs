//! Scalar codec
//!
//! Serializes CIP elementary types to and from an ordered byte buffer.
//!
//! ```text
//! codec
//!     ├── Buffer (append / extract with cursor)
//!     ├── CipScalar (fixed-width scalar kinds)
//!     └── ByteOrder (little-endian wire order, big-endian for vendor data)
//! ```

pub mod buffer;
pub mod byte_order;

pub use buffer::*;
pub use byte_order::ByteOrder;
