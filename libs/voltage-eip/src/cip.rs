//! CIP object model vocabulary

pub mod epath;
pub mod identity;
pub mod status;
pub mod types;

pub use epath::{EPath, Segment, SegmentKind};
pub use identity::IdentityInfo;
pub use status::GeneralStatus;
pub use types::{class, ServiceCode};
