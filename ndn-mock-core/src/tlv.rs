use std::io::{self, Write};
use std::time::Duration;

/// TLV (Type-Length-Value) codec for NDN packet format 0.3
///
/// Wire format:
/// - Type: 1 byte (0-252; every type used by the mock fits in one byte)
/// - Length: NDN variable-length number (1, 3, 5 or 9 bytes, big-endian)
/// - Value: `Length` bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvElement {
    pub type_: u8,
    pub value: Vec<u8>,
}

/// Failure while reading or writing TLV wire bytes
#[derive(Debug, thiserror::Error)]
pub enum TlvError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid length encoding")]
    InvalidLength,
    #[error("Buffer too short")]
    BufferTooShort,
    #[error("Invalid TLV type: {0}")]
    InvalidType(u8),
    #[error("Missing required element of type {0}")]
    MissingElement(u8),
    #[error("Invalid non-negative integer of {0} bytes")]
    InvalidInteger(usize),
}

impl TlvElement {
    pub fn new(type_: u8, value: Vec<u8>) -> Self {
        Self { type_, value }
    }

    /// Create an element carrying a NonNegativeInteger value
    pub fn from_u64(type_: u8, value: u64) -> Self {
        Self::new(type_, encode_non_negative_integer(value))
    }

    /// Interpret the value as a NonNegativeInteger
    pub fn as_u64(&self) -> Result<u64, TlvError> {
        decode_non_negative_integer(&self.value)
    }

    /// Wire size including the type and length octets
    pub fn encoded_length(&self) -> usize {
        1 + encode_length_size(self.value.len()) + self.value.len()
    }

    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        let mut buffer = Vec::with_capacity(self.encoded_length());
        self.encode_to(&mut buffer)?;
        Ok(buffer)
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<(), TlvError> {
        writer.write_all(&[self.type_])?;
        encode_length(self.value.len(), writer)?;
        writer.write_all(&self.value)?;
        Ok(())
    }

    /// Reads one element from the front of `data`; trailing bytes are left
    /// for the caller and the consumed count says where they start
    pub fn decode(data: &[u8]) -> Result<(Self, usize), TlvError> {
        if data.is_empty() {
            return Err(TlvError::BufferTooShort);
        }

        let (length, length_bytes) = decode_length(&data[1..])?;
        let start = 1 + length_bytes;
        let end = start.checked_add(length).ok_or(TlvError::InvalidLength)?;
        let value = data.get(start..end).ok_or(TlvError::BufferTooShort)?;
        Ok((TlvElement::new(data[0], value.to_vec()), end))
    }
}

/// Peek at the outermost TLV type of a buffer without decoding it
pub fn peek_type(data: &[u8]) -> Option<u8> {
    data.first().copied()
}

/// Encode length using the NDN variable-length number format
///
/// - length < 253: 1 byte
/// - length <= u16::MAX: 0xFD + 2 bytes
/// - length <= u32::MAX: 0xFE + 4 bytes
/// - otherwise: 0xFF + 8 bytes
fn encode_length<W: Write>(length: usize, writer: &mut W) -> Result<(), TlvError> {
    if length < 253 {
        writer.write_all(&[length as u8])?;
    } else if length <= u16::MAX as usize {
        writer.write_all(&[0xFD])?;
        writer.write_all(&(length as u16).to_be_bytes())?;
    } else if length <= u32::MAX as usize {
        writer.write_all(&[0xFE])?;
        writer.write_all(&(length as u32).to_be_bytes())?;
    } else {
        writer.write_all(&[0xFF])?;
        writer.write_all(&(length as u64).to_be_bytes())?;
    }
    Ok(())
}

fn encode_length_size(length: usize) -> usize {
    if length < 253 {
        1
    } else if length <= u16::MAX as usize {
        3
    } else if length <= u32::MAX as usize {
        5
    } else {
        9
    }
}

/// Decode a variable-length number, returning (value, bytes consumed)
fn decode_length(data: &[u8]) -> Result<(usize, usize), TlvError> {
    let first_byte = *data.first().ok_or(TlvError::BufferTooShort)?;

    let width = match first_byte {
        0..=252 => return Ok((first_byte as usize, 1)),
        0xFD => 2,
        0xFE => 4,
        0xFF => 8,
    };

    if data.len() < 1 + width {
        return Err(TlvError::BufferTooShort);
    }
    let length = decode_non_negative_integer(&data[1..1 + width])?;
    let length = usize::try_from(length).map_err(|_| TlvError::InvalidLength)?;
    Ok((length, 1 + width))
}

/// Encode a NonNegativeInteger using the shortest of 1, 2, 4 or 8 bytes
pub fn encode_non_negative_integer(value: u64) -> Vec<u8> {
    if value <= u8::MAX as u64 {
        vec![value as u8]
    } else if value <= u16::MAX as u64 {
        (value as u16).to_be_bytes().to_vec()
    } else if value <= u32::MAX as u64 {
        (value as u32).to_be_bytes().to_vec()
    } else {
        value.to_be_bytes().to_vec()
    }
}

/// Decode a NonNegativeInteger of 1, 2, 4 or 8 bytes
pub fn decode_non_negative_integer(data: &[u8]) -> Result<u64, TlvError> {
    match data.len() {
        1 | 2 | 4 | 8 => Ok(data.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)),
        other => Err(TlvError::InvalidInteger(other)),
    }
}

/// Milliseconds of `duration` as a wire integer, saturating at `u64::MAX`
pub fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Concatenate elements back to back, as in a packet's value
pub fn encode_tlv_sequence(elements: &[TlvElement]) -> Result<Vec<u8>, TlvError> {
    let mut buffer = Vec::with_capacity(elements.iter().map(TlvElement::encoded_length).sum());
    for element in elements {
        element.encode_to(&mut buffer)?;
    }
    Ok(buffer)
}

/// Split a packet's value into its child elements
pub fn decode_tlv_sequence(data: &[u8]) -> Result<Vec<TlvElement>, TlvError> {
    let mut elements = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        let (element, consumed) = TlvElement::decode(rest)?;
        elements.push(element);
        rest = &rest[consumed..];
    }
    Ok(elements)
}
