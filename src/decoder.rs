//! Bounds-checked, zero-copy decoding of RADIUS Accounting wire structures.
//!
//! File based on RADIUS Accounting specification RFC 2866. Minimized for
//! the attributes this crate consumes (§4.1): User-Name, Framed-IP-Address
//! and Acct-Status-Type.

use byteorder::{BigEndian, ByteOrder};
use num_derive::FromPrimitive;

/// Size in bytes of the fixed RADIUS header.
pub const HEADER_SIZE: usize = 20;
/// Size in bytes of an attribute TLV header (type + length).
pub const ATTRIBUTE_HEADER_SIZE: usize = 2;
/// Largest value an attribute's string payload may have, per RFC 2866.
pub const MAX_STRING_VALUE: usize = 253;

/// Errors raised while decoding a RADIUS wire structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The slice did not contain enough bytes for the structure being decoded.
    BufferOverflow,
    /// A string attribute declared a zero-byte value.
    EmptyString,
    /// A string attribute declared a value longer than [`MAX_STRING_VALUE`].
    OversizedString,
}

pub type Result<T> = std::result::Result<T, Error>;

/// RADIUS packet codes this crate recognizes (RFC 2866 §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum Code {
    Request = 4,
    Response = 5,
}

/// Attribute types this crate consumes (RFC 2866 §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum AttributeType {
    UserName = 1,
    FramedIpAddress = 8,
    AcctStatusType = 40,
}

/// Acct-Status-Type values this crate acts on (RFC 2866 §5.40).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u32)]
pub enum AcctStatusType {
    Start = 1,
    Stop = 2,
    Update = 3,
}

/// Decoded fixed-size RADIUS header.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub code: u8,
    pub id: u8,
    /// Total packet length, as declared on the wire (big-endian).
    pub length: u16,
}

/// Extracts the 20-byte RADIUS header from the start of `slice`.
pub fn header(slice: &[u8]) -> Result<Header> {
    if slice.len() < HEADER_SIZE {
        return Err(Error::BufferOverflow);
    }
    Ok(Header { code: slice[0], id: slice[1], length: BigEndian::read_u16(&slice[2..4]) })
}

/// Decoded attribute TLV header; the value occupies `length - 2` bytes
/// immediately following it.
#[derive(Debug, Clone, Copy)]
pub struct Attribute {
    pub kind: u8,
    pub length: u8,
}

/// Extracts a 2-byte attribute header from the start of `slice`.
pub fn attribute(slice: &[u8]) -> Result<Attribute> {
    if slice.len() < ATTRIBUTE_HEADER_SIZE {
        return Err(Error::BufferOverflow);
    }
    Ok(Attribute { kind: slice[0], length: slice[1] })
}

/// Decodes `declared_len` bytes at the start of `remaining` as attribute
/// text. No interior-NUL or encoding validation is performed on the raw
/// bytes beyond what `from_utf8_lossy` guarantees — callers that need the
/// exact subscriber identifier digits should not rely on this rejecting
/// malformed encodings.
pub fn string(remaining: &[u8], declared_len: usize) -> Result<String> {
    if declared_len > remaining.len() {
        return Err(Error::BufferOverflow);
    }
    if declared_len == 0 {
        return Err(Error::EmptyString);
    }
    if declared_len > MAX_STRING_VALUE {
        return Err(Error::OversizedString);
    }
    Ok(String::from_utf8_lossy(&remaining[..declared_len]).into_owned())
}

/// An IPv4 address, decoded from its 4 octets on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Address(pub [u8; 4]);

impl std::fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

/// Decodes the 4 octets at the start of `remaining` as an [`Ipv4Address`].
pub fn address(remaining: &[u8]) -> Result<Ipv4Address> {
    if remaining.len() < 4 {
        return Err(Error::BufferOverflow);
    }
    Ok(Ipv4Address([remaining[0], remaining[1], remaining[2], remaining[3]]))
}

/// Decodes a big-endian `u32` at the start of `remaining`.
pub fn u32(remaining: &[u8]) -> Result<u32> {
    if remaining.len() < 4 {
        return Err(Error::BufferOverflow);
    }
    Ok(BigEndian::read_u32(&remaining[..4]))
}
