//! Binary encoder for OPC UA data types

use crate::encodable::BinaryEncodable;
use bytes::{BufMut, BytesMut};
use opcua_core::{UaError, UaResult};

/// Binary encoder writing little-endian values into a growable buffer
#[derive(Debug, Default)]
pub struct BinaryEncoder {
    buffer: BytesMut,
}

impl BinaryEncoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Create a new encoder with initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Encode any encodable value
    pub fn encode<T: BinaryEncodable>(&mut self, value: &T) -> UaResult<()> {
        value.encode(self)
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.put_u8(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buffer.put_i8(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buffer.put_u8(value as u8);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buffer.put_u16_le(value);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buffer.put_i16_le(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.put_u32_le(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.put_i32_le(value);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buffer.put_u64_le(value);
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buffer.put_i64_le(value);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buffer.put_f32_le(value);
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buffer.put_f64_le(value);
    }

    /// Write raw bytes without a length prefix
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buffer.put_slice(bytes);
    }

    /// Write an `i32` length prefix, `-1` for null
    pub fn write_length(&mut self, length: Option<usize>) -> UaResult<()> {
        match length {
            None => self.write_i32(-1),
            Some(len) => {
                let len = i32::try_from(len)
                    .map_err(|_| UaError::encoding(format!("Length {} does not fit in Int32", len)))?;
                self.write_i32(len);
            }
        }
        Ok(())
    }

    /// Write a length-prefixed byte sequence, `None` encodes as null
    pub fn write_byte_string(&mut self, bytes: Option<&[u8]>) -> UaResult<()> {
        self.write_length(bytes.map(<[u8]>::len))?;
        if let Some(bytes) = bytes {
            self.write_raw(bytes);
        }
        Ok(())
    }

    /// Write a length-prefixed UTF-8 string, `None` encodes as null
    pub fn write_string(&mut self, value: Option<&str>) -> UaResult<()> {
        self.write_byte_string(value.map(str::as_bytes))
    }

    /// Write an array with an `i32` length prefix, `None` encodes as null
    pub fn write_array<T: BinaryEncodable>(&mut self, values: Option<&[T]>) -> UaResult<()> {
        self.write_length(values.map(<[T]>::len))?;
        if let Some(values) = values {
            for value in values {
                value.encode(self)?;
            }
        }
        Ok(())
    }

    /// Overwrite a previously written `u32` at `position`
    pub fn patch_u32(&mut self, position: usize, value: u32) -> UaResult<()> {
        let end = position + 4;
        if end > self.buffer.len() {
            return Err(UaError::encoding(format!(
                "Cannot patch u32 at {}, buffer length {}",
                position,
                self.buffer.len()
            )));
        }
        self.buffer[position..end].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Borrow the encoded bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the encoder and return the encoded bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian() {
        let mut enc = BinaryEncoder::new();
        enc.write_u32(0x0102_0304);
        enc.write_i16(-2);
        assert_eq!(enc.as_slice(), &[0x04, 0x03, 0x02, 0x01, 0xFE, 0xFF]);
    }

    #[test]
    fn test_null_and_empty_string() {
        let mut enc = BinaryEncoder::new();
        enc.write_string(None).unwrap();
        enc.write_string(Some("")).unwrap();
        assert_eq!(enc.as_slice(), &[0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0]);
    }

    #[test]
    fn test_patch_u32() {
        let mut enc = BinaryEncoder::new();
        enc.write_u32(0);
        enc.write_u8(7);
        enc.patch_u32(0, 5).unwrap();
        assert_eq!(enc.as_slice(), &[5, 0, 0, 0, 7]);
        assert!(enc.patch_u32(3, 1).is_err());
    }
}
