//! Vendor specific address helpers

#[cfg(feature = "fanuc")]
pub mod fanuc;
