//! Cursor-based scalar buffer
//!
//! `append` serializes scalars left-to-right, `extract` consumes them from
//! the front in the same order. A failed extraction leaves the cursor where
//! it was.

use super::ByteOrder;
use crate::error::{EipError, Result};

/// CIP elementary data types
pub type CipBool = u8;
pub type CipUsint = u8;
pub type CipUint = u16;
pub type CipUdint = u32;
pub type CipUlint = u64;
pub type CipSint = i8;
pub type CipInt = i16;
pub type CipDint = i32;
pub type CipLint = i64;
pub type CipReal = f32;
pub type CipLreal = f64;
pub type CipByte = u8;
pub type CipWord = u16;
pub type CipDword = u32;

/// Fixed-width scalar that can be written to and read from a [`Buffer`]
pub trait CipScalar: Sized + Copy {
    /// Encoded width in bytes
    const WIDTH: usize;

    /// Append the encoded value to `out`
    fn write_to(self, order: ByteOrder, out: &mut Vec<u8>);

    /// Decode from exactly `WIDTH` bytes
    fn read_from(bytes: &[u8], order: ByteOrder) -> Self;
}

macro_rules! impl_cip_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CipScalar for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn write_to(self, order: ByteOrder, out: &mut Vec<u8>) {
                    match order {
                        ByteOrder::LittleEndian => out.extend_from_slice(&self.to_le_bytes()),
                        ByteOrder::BigEndian => out.extend_from_slice(&self.to_be_bytes()),
                    }
                }

                #[inline]
                fn read_from(bytes: &[u8], order: ByteOrder) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::WIDTH]);
                    match order {
                        ByteOrder::LittleEndian => <$ty>::from_le_bytes(raw),
                        ByteOrder::BigEndian => <$ty>::from_be_bytes(raw),
                    }
                }
            }
        )*
    };
}

impl_cip_scalar!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Byte buffer with a read cursor
///
/// Invariant: `pos <= data.len()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Buffer {
    data: Vec<u8>,
    pos: usize,
    order: ByteOrder,
}

impl Buffer {
    /// Create an empty little-endian buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with a specific byte order
    pub fn with_order(order: ByteOrder) -> Self {
        Self {
            data: Vec::new(),
            pos: 0,
            order,
        }
    }

    /// Wrap received bytes for extraction, cursor at the start
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            order: ByteOrder::LittleEndian,
        }
    }

    /// Change the byte order used by subsequent calls
    pub fn order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    /// Append a scalar
    #[inline]
    pub fn append<T: CipScalar>(&mut self, value: T) -> &mut Self {
        value.write_to(self.order, &mut self.data);
        self
    }

    /// Append raw bytes
    #[inline]
    pub fn append_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.data.extend_from_slice(bytes);
        self
    }

    /// Append a CIP SHORT_STRING (one length byte followed by the characters)
    pub fn append_short_string(&mut self, value: &str) -> Result<&mut Self> {
        let len = u8::try_from(value.len()).map_err(|_| {
            EipError::validation(format!(
                "SHORT_STRING limited to 255 bytes, got {}",
                value.len()
            ))
        })?;
        self.data.push(len);
        self.data.extend_from_slice(value.as_bytes());
        Ok(self)
    }

    /// Extract a scalar from the front of the unread bytes
    #[inline]
    pub fn extract<T: CipScalar>(&mut self) -> Result<T> {
        let bytes = self.peek_slice(T::WIDTH)?;
        let value = T::read_from(bytes, self.order);
        self.pos += T::WIDTH;
        Ok(value)
    }

    /// Extract `len` raw bytes
    pub fn extract_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let bytes = self.peek_slice(len)?.to_vec();
        self.pos += len;
        Ok(bytes)
    }

    /// Extract a CIP SHORT_STRING
    pub fn extract_short_string(&mut self) -> Result<String> {
        let start = self.pos;
        let len: u8 = self.extract()?;
        match self.extract_bytes(len as usize) {
            Ok(raw) => Ok(String::from_utf8_lossy(&raw).into_owned()),
            Err(e) => {
                self.pos = start;
                Err(e)
            },
        }
    }

    /// Skip `len` bytes
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.peek_slice(len)?;
        self.pos += len;
        Ok(())
    }

    fn peek_slice(&self, len: usize) -> Result<&[u8]> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(EipError::BufferUnderflow {
                needed: len,
                remaining,
            });
        }
        Ok(&self.data[self.pos..self.pos + len])
    }

    /// Unread bytes
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Slice of the unread bytes
    #[inline]
    pub fn remaining_slice(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    /// Current cursor position
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Whole buffer contents, independent of the cursor
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume the buffer and return its bytes
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Self::from_bytes(data)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_append_little_endian_layout() {
        let mut buffer = Buffer::new();
        buffer
            .append(0x12u8)
            .append(0x3456u16)
            .append(0x789A_BCDEu32);

        assert_eq!(
            buffer.as_slice(),
            &[0x12, 0x56, 0x34, 0xDE, 0xBC, 0x9A, 0x78]
        );
    }

    #[test]
    fn test_append_big_endian_layout() {
        let mut buffer = Buffer::with_order(ByteOrder::BigEndian);
        buffer.append(0x3456u16).append(-2i32);

        assert_eq!(buffer.as_slice(), &[0x34, 0x56, 0xFF, 0xFF, 0xFF, 0xFE]);
    }

    #[test]
    fn test_round_trip_all_kinds_both_orders() {
        for order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
            let mut buffer = Buffer::with_order(order);
            buffer
                .append(0xABu8)
                .append(-5i8)
                .append(0xBEEFu16)
                .append(-12345i16)
                .append(0xDEAD_BEEFu32)
                .append(-123_456_789i32)
                .append(0x0102_0304_0506_0708u64)
                .append(i64::MIN)
                .append(3.5f32)
                .append(-1.0e300f64);

            let mut reader = Buffer::from_bytes(buffer.into_vec()).order(order);
            assert_eq!(reader.extract::<u8>().unwrap(), 0xAB);
            assert_eq!(reader.extract::<i8>().unwrap(), -5);
            assert_eq!(reader.extract::<u16>().unwrap(), 0xBEEF);
            assert_eq!(reader.extract::<i16>().unwrap(), -12345);
            assert_eq!(reader.extract::<u32>().unwrap(), 0xDEAD_BEEF);
            assert_eq!(reader.extract::<i32>().unwrap(), -123_456_789);
            assert_eq!(reader.extract::<u64>().unwrap(), 0x0102_0304_0506_0708);
            assert_eq!(reader.extract::<i64>().unwrap(), i64::MIN);
            assert_eq!(reader.extract::<f32>().unwrap(), 3.5);
            assert_eq!(reader.extract::<f64>().unwrap(), -1.0e300);
            assert_eq!(reader.remaining(), 0);
        }
    }

    #[test]
    fn test_extract_consumes_declared_width() {
        let mut buffer = Buffer::from_bytes(vec![0u8; 15]);
        buffer.extract::<u8>().unwrap();
        assert_eq!(buffer.position(), 1);
        buffer.extract::<u16>().unwrap();
        assert_eq!(buffer.position(), 3);
        buffer.extract::<f32>().unwrap();
        assert_eq!(buffer.position(), 7);
        buffer.extract::<i64>().unwrap();
        assert_eq!(buffer.position(), 15);
    }

    #[test]
    fn test_underflow_leaves_cursor_untouched() {
        let mut buffer = Buffer::from_bytes(vec![0x01, 0x02, 0x03]);
        assert_eq!(buffer.extract::<u8>().unwrap(), 0x01);

        let err = buffer.extract::<u32>().unwrap_err();
        assert_eq!(
            err,
            EipError::BufferUnderflow {
                needed: 4,
                remaining: 2
            }
        );
        assert_eq!(buffer.position(), 1);

        // Remaining bytes are still readable after the failure
        assert_eq!(buffer.extract::<u16>().unwrap(), 0x0302);
    }

    #[test]
    fn test_underflow_on_empty() {
        let mut buffer = Buffer::new();
        assert!(matches!(
            buffer.extract::<f64>(),
            Err(EipError::BufferUnderflow {
                needed: 8,
                remaining: 0
            })
        ));
        assert_eq!(buffer.position(), 0);
    }

    #[test]
    fn test_short_string() {
        let mut buffer = Buffer::new();
        buffer.append_short_string("R-30iB").unwrap();
        assert_eq!(buffer.as_slice()[0], 6);

        let mut reader = Buffer::from_bytes(buffer.into_vec());
        assert_eq!(reader.extract_short_string().unwrap(), "R-30iB");
    }

    #[test]
    fn test_truncated_short_string_restores_cursor() {
        let mut reader = Buffer::from_bytes(vec![5, b'a', b'b']);
        assert!(reader.extract_short_string().is_err());
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_short_string_too_long() {
        let long = "x".repeat(256);
        assert!(matches!(
            Buffer::new().append_short_string(&long),
            Err(EipError::Validation(_))
        ));
    }

    #[test]
    fn test_extract_bytes_and_skip() {
        let mut buffer = Buffer::from_bytes(vec![1, 2, 3, 4, 5]);
        buffer.skip(1).unwrap();
        assert_eq!(buffer.extract_bytes(3).unwrap(), vec![2, 3, 4]);
        assert_eq!(buffer.remaining_slice(), &[5]);
        assert!(buffer.skip(2).is_err());
        assert_eq!(buffer.position(), 4);
    }
}
