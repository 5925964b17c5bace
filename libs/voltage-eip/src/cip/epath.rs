//! CIP logical path (EPath)
//!
//! A path is an ordered list of logical segments. Each segment is packed in
//! the compact 8-bit form when its value fits in one byte, otherwise in the
//! padded 16-bit form. Devices reject a segment whose width does not match
//! what they expect, so the choice is never left to the caller.
//!
//! ```text
//! 8-bit : [0x20 | type << 2 | 0]  value
//! 16-bit: [0x20 | type << 2 | 1]  0x00  lo  hi
//! ```

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{EipError, Result};

const LOGICAL_SEGMENT: u8 = 0x20;
const FORMAT_8_BIT: u8 = 0x00;
const FORMAT_16_BIT: u8 = 0x01;
const FORMAT_MASK: u8 = 0x03;
const TYPE_MASK: u8 = 0x1C;

/// Logical segment kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    Class,
    Instance,
    ConnectionPoint,
    Attribute,
}

impl SegmentKind {
    /// Logical type bits (already shifted into place)
    fn type_bits(self) -> u8 {
        match self {
            SegmentKind::Class => 0x00,
            SegmentKind::Instance => 0x04,
            SegmentKind::ConnectionPoint => 0x0C,
            SegmentKind::Attribute => 0x10,
        }
    }

    fn from_type_bits(bits: u8) -> Option<Self> {
        match bits {
            0x00 => Some(SegmentKind::Class),
            0x04 => Some(SegmentKind::Instance),
            0x0C => Some(SegmentKind::ConnectionPoint),
            0x10 => Some(SegmentKind::Attribute),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            SegmentKind::Class => "class",
            SegmentKind::Instance => "instance",
            SegmentKind::ConnectionPoint => "connection_point",
            SegmentKind::Attribute => "attribute",
        }
    }
}

/// One logical segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Segment {
    pub kind: SegmentKind,
    pub value: u16,
}

impl Segment {
    pub fn new(kind: SegmentKind, value: u16) -> Self {
        Self { kind, value }
    }

    /// Whether the compact one-byte form is used
    #[inline]
    pub fn is_8_bit(&self) -> bool {
        self.value <= u16::from(u8::MAX)
    }

    /// Encoded length in bytes
    #[inline]
    pub fn encoded_len(&self) -> usize {
        if self.is_8_bit() {
            2
        } else {
            4
        }
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        let header = LOGICAL_SEGMENT | self.kind.type_bits();
        if self.is_8_bit() {
            out.push(header | FORMAT_8_BIT);
            out.push(self.value as u8);
        } else {
            out.push(header | FORMAT_16_BIT);
            out.push(0x00); // pad
            out.extend_from_slice(&self.value.to_le_bytes());
        }
    }
}

/// Hierarchical address of a class, instance, attribute or connection point
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EPath {
    segments: Vec<Segment>,
}

impl EPath {
    /// Path to an object class
    pub fn class(class_id: u16) -> Self {
        Self::empty().with_class(class_id)
    }

    /// Path to an object instance
    pub fn class_instance(class_id: u16, instance_id: u16) -> Self {
        Self::class(class_id).with_instance(instance_id)
    }

    /// Path to an attribute of an object instance
    pub fn new(class_id: u16, instance_id: u16, attribute_id: u16) -> Self {
        Self::class_instance(class_id, instance_id).with_attribute(attribute_id)
    }

    /// Path built from a raw segment list
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_class(self, class_id: u16) -> Self {
        self.push(SegmentKind::Class, class_id)
    }

    pub fn with_instance(self, instance_id: u16) -> Self {
        self.push(SegmentKind::Instance, instance_id)
    }

    pub fn with_attribute(self, attribute_id: u16) -> Self {
        self.push(SegmentKind::Attribute, attribute_id)
    }

    pub fn with_connection_point(self, point: u16) -> Self {
        self.push(SegmentKind::ConnectionPoint, point)
    }

    fn push(mut self, kind: SegmentKind, value: u16) -> Self {
        self.segments.push(Segment::new(kind, value));
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// First value of the given kind
    pub fn find(&self, kind: SegmentKind) -> Option<u16> {
        self.segments
            .iter()
            .find(|s| s.kind == kind)
            .map(|s| s.value)
    }

    pub fn class_id(&self) -> Option<u16> {
        self.find(SegmentKind::Class)
    }

    pub fn instance_id(&self) -> Option<u16> {
        self.find(SegmentKind::Instance)
    }

    pub fn attribute_id(&self) -> Option<u16> {
        self.find(SegmentKind::Attribute)
    }

    /// Encoded length in bytes
    pub fn encoded_len(&self) -> usize {
        self.segments.iter().map(Segment::encoded_len).sum()
    }

    /// Encoded length in 16-bit words, as carried in path size fields
    ///
    /// Fails when the path is longer than the one-byte size field can express.
    pub fn size_in_words(&self) -> Result<u8> {
        let words = self.encoded_len() / 2;
        u8::try_from(words)
            .map_err(|_| EipError::validation(format!("Path too long: {words} words")))
    }

    /// Encode to the padded segment form
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        for segment in &self.segments {
            segment.encode_into(&mut out);
        }
        out
    }

    /// Decode a padded segment sequence
    ///
    /// Only canonical encodings are accepted: a 16-bit segment carrying a
    /// value that fits in one byte is rejected, so that
    /// `decode(bytes)?.encode() == bytes` always holds.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut segments = Vec::new();
        let mut pos = 0;

        while pos < bytes.len() {
            let header = bytes[pos];
            if header & 0xE0 != LOGICAL_SEGMENT {
                return Err(EipError::validation(format!(
                    "Unsupported path segment 0x{header:02X} at offset {pos}"
                )));
            }
            let kind = SegmentKind::from_type_bits(header & TYPE_MASK).ok_or_else(|| {
                EipError::validation(format!(
                    "Unsupported logical segment type 0x{header:02X} at offset {pos}"
                ))
            })?;

            match header & FORMAT_MASK {
                FORMAT_8_BIT => {
                    let value = *bytes.get(pos + 1).ok_or_else(|| {
                        EipError::validation(format!("Truncated 8-bit segment at offset {pos}"))
                    })?;
                    segments.push(Segment::new(kind, u16::from(value)));
                    pos += 2;
                },
                FORMAT_16_BIT => {
                    if pos + 4 > bytes.len() {
                        return Err(EipError::validation(format!(
                            "Truncated 16-bit segment at offset {pos}"
                        )));
                    }
                    let value = u16::from_le_bytes([bytes[pos + 2], bytes[pos + 3]]);
                    if value <= u16::from(u8::MAX) {
                        return Err(EipError::validation(format!(
                            "Non-canonical 16-bit {} segment with value {value}",
                            kind.as_str()
                        )));
                    }
                    segments.push(Segment::new(kind, value));
                    pos += 4;
                },
                _ => {
                    return Err(EipError::validation(format!(
                        "Unsupported logical segment format 0x{header:02X} at offset {pos}"
                    )))
                },
            }
        }

        Ok(Self { segments })
    }
}

impl From<Vec<Segment>> for EPath {
    fn from(segments: Vec<Segment>) -> Self {
        Self::from_segments(segments)
    }
}

/// Serialized as the encoded byte sequence, e.g. `[0x20, 0x04, 0x24, 0x64]`
impl Serialize for EPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.encode().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        EPath::decode(&bytes).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for EPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}=0x{:X}", segment.kind.as_str(), segment.value)?;
        }
        write!(f, "]")
    }
}
