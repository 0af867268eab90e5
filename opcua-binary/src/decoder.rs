//! Binary decoder for OPC UA data types

use crate::encodable::BinaryEncodable;
use crate::options::DecodingOptions;
use opcua_core::{UaError, UaResult};

/// Kind of length-prefixed value, selects the applicable limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthKind {
    String,
    ByteString,
    Array,
}

/// Binary decoder over a borrowed buffer
///
/// Every read is bounds checked; lengths are validated against the
/// `DecodingOptions` before any allocation happens.
#[derive(Debug)]
pub struct BinaryDecoder<'a> {
    buffer: &'a [u8],
    position: usize,
    options: DecodingOptions,
    depth: usize,
}

impl<'a> BinaryDecoder<'a> {
    /// Create a new decoder
    pub fn new(buffer: &'a [u8], options: DecodingOptions) -> Self {
        Self {
            buffer,
            position: 0,
            options,
            depth: 0,
        }
    }

    /// Decoding options in effect
    pub fn options(&self) -> &DecodingOptions {
        &self.options
    }

    /// Current read position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    /// Decode any encodable value
    pub fn decode<T: BinaryEncodable>(&mut self) -> UaResult<T> {
        T::decode(self)
    }

    /// Enter a nested value, failing when the depth limit is reached
    pub fn enter(&mut self) -> UaResult<()> {
        if self.options.max_decoding_depth > 0 && self.depth >= self.options.max_decoding_depth {
            return Err(UaError::decoding_limit(format!(
                "Decoding depth exceeds {}",
                self.options.max_decoding_depth
            )));
        }
        self.depth += 1;
        Ok(())
    }

    /// Leave a nested value
    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Run `f` one nesting level deeper
    pub fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> UaResult<T>) -> UaResult<T> {
        self.enter()?;
        let result = f(self);
        self.leave();
        result
    }

    /// Read `len` raw bytes
    pub fn read_bytes(&mut self, len: usize) -> UaResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(UaError::decoding(format!(
                "Unexpected end of data: need {} bytes at offset {}, {} available",
                len,
                self.position,
                self.remaining()
            )));
        }
        let bytes = &self.buffer[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> UaResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> UaResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> UaResult<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_bool(&mut self) -> UaResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> UaResult<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i16(&mut self) -> UaResult<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> UaResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> UaResult<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> UaResult<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> UaResult<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> UaResult<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> UaResult<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Read an `i32` length prefix
    ///
    /// # Returns
    /// `None` for `-1` (null), otherwise the validated length
    ///
    /// # Errors
    /// - `BadDecodingError` for negative lengths other than `-1`
    /// - `BadEncodingLimitsExceeded` when the length exceeds the limit for `kind`
    ///   or the configured maximum message size
    /// - `BadDecodingError` when fewer elements/bytes remain than announced
    pub fn read_length(&mut self, kind: LengthKind) -> UaResult<Option<usize>> {
        let raw = self.read_i32()?;
        if raw == -1 {
            return Ok(None);
        }
        if raw < 0 {
            return Err(UaError::decoding(format!("Invalid negative length {}", raw)));
        }
        let len = raw as usize;
        let limit = match kind {
            LengthKind::String => self.options.max_string_length,
            LengthKind::ByteString => self.options.max_byte_string_length,
            LengthKind::Array => self.options.max_array_length,
        };
        if limit > 0 && len > limit {
            return Err(UaError::decoding_limit(format!(
                "{:?} length {} exceeds limit {}",
                kind, len, limit
            )));
        }
        if self.options.max_message_size > 0 && len > self.options.max_message_size {
            return Err(UaError::decoding_limit(format!(
                "{:?} length {} exceeds max message size {}",
                kind, len, self.options.max_message_size
            )));
        }
        // every encoded element occupies at least one byte
        if len > self.remaining() {
            return Err(UaError::decoding(format!(
                "{:?} length {} exceeds the {} remaining bytes",
                kind,
                len,
                self.remaining()
            )));
        }
        Ok(Some(len))
    }

    /// Read a length-prefixed byte sequence
    pub fn read_byte_string(&mut self) -> UaResult<Option<Vec<u8>>> {
        match self.read_length(LengthKind::ByteString)? {
            None => Ok(None),
            Some(len) => Ok(Some(self.read_bytes(len)?.to_vec())),
        }
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> UaResult<Option<String>> {
        match self.read_length(LengthKind::String)? {
            None => Ok(None),
            Some(len) => {
                let bytes = self.read_bytes(len)?;
                String::from_utf8(bytes.to_vec())
                    .map(Some)
                    .map_err(|e| UaError::decoding(format!("Invalid UTF-8 in string: {}", e)))
            }
        }
    }

    /// Read an array of encodable values
    pub fn read_array_of<T: BinaryEncodable>(&mut self) -> UaResult<Option<Vec<T>>> {
        match self.read_length(LengthKind::Array)? {
            None => Ok(None),
            Some(len) => {
                let mut values = Vec::with_capacity(len);
                for _ in 0..len {
                    values.push(T::decode(self)?);
                }
                Ok(Some(values))
            }
        }
    }

    /// Fail unless every byte has been consumed
    pub fn expect_end(&self) -> UaResult<()> {
        if self.remaining() != 0 {
            return Err(UaError::decoding(format!(
                "Declared length {} does not match consumed {} bytes",
                self.buffer.len(),
                self.position
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_length_rejected() {
        let data = (-2i32).to_le_bytes();
        let mut dec = BinaryDecoder::new(&data, DecodingOptions::default());
        let err = dec.read_string().unwrap_err();
        assert_eq!(err.status_code(), opcua_core::StatusCode::BAD_DECODING_ERROR);
    }

    #[test]
    fn test_string_limit() {
        let mut data = 10i32.to_le_bytes().to_vec();
        data.extend_from_slice(b"0123456789");
        let options = DecodingOptions {
            max_string_length: 4,
            ..Default::default()
        };
        let mut dec = BinaryDecoder::new(&data, options);
        let err = dec.read_string().unwrap_err();
        assert_eq!(err.status_code(), opcua_core::StatusCode::BAD_ENCODING_LIMITS_EXCEEDED);
    }

    #[test]
    fn test_message_size_limit_applies_to_arrays() {
        let data = 1000i32.to_le_bytes();
        let options = DecodingOptions {
            max_message_size: 100,
            ..Default::default()
        };
        let mut dec = BinaryDecoder::new(&data, options);
        assert!(dec.read_array_of::<u8>().is_err());
    }

    #[test]
    fn test_truncated_input() {
        let data = [1u8, 2];
        let mut dec = BinaryDecoder::new(&data, DecodingOptions::default());
        assert!(dec.read_u32().is_err());
    }

    #[test]
    fn test_depth_limit() {
        let options = DecodingOptions {
            max_decoding_depth: 2,
            ..Default::default()
        };
        let mut dec = BinaryDecoder::new(&[], options);
        dec.enter().unwrap();
        dec.enter().unwrap();
        assert!(dec.enter().is_err());
        dec.leave();
        assert!(dec.enter().is_ok());
    }
}
