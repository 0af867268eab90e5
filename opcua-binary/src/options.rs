//! Decoding limits

/// Limits applied while decoding untrusted input
///
/// A length above any limit fails with `BadEncodingLimitsExceeded`; a value of
/// 0 disables that particular limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodingOptions {
    /// Maximum size of a complete message in bytes
    pub max_message_size: usize,
    /// Maximum length of a String in bytes
    pub max_string_length: usize,
    /// Maximum length of a ByteString in bytes
    pub max_byte_string_length: usize,
    /// Maximum number of elements in an array
    pub max_array_length: usize,
    /// Maximum nesting of Variants, DataValues and DiagnosticInfos
    pub max_decoding_depth: usize,
}

impl Default for DecodingOptions {
    fn default() -> Self {
        Self {
            max_message_size: 16 * 1024 * 1024,
            max_string_length: 65_535,
            max_byte_string_length: 4 * 1024 * 1024,
            max_array_length: 100_000,
            max_decoding_depth: 100,
        }
    }
}

impl DecodingOptions {
    /// Options with no size limits, used for locally produced data
    pub fn unlimited() -> Self {
        Self {
            max_message_size: 0,
            max_string_length: 0,
            max_byte_string_length: 0,
            max_array_length: 0,
            max_decoding_depth: 100,
        }
    }
}
