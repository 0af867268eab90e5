//! String and ByteString built-in types
//!
//! Both types distinguish a null value (encoded with length `-1`) from an empty
//! value (length `0`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// UTF-8 string that may be null
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UaString {
    value: Option<String>,
}

impl UaString {
    /// The null string
    pub const fn null() -> Self {
        Self { value: None }
    }

    /// Whether this is the null string
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Whether this is null or empty
    pub fn is_empty(&self) -> bool {
        self.value.as_deref().map_or(true, str::is_empty)
    }

    /// Borrow the value, `None` when null
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Borrow the value, `""` when null
    pub fn as_ref_or_empty(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }

    /// Consume into the inner value
    pub fn into_inner(self) -> Option<String> {
        self.value
    }
}

impl From<&str> for UaString {
    fn from(value: &str) -> Self {
        Self {
            value: Some(value.to_string()),
        }
    }
}

impl From<String> for UaString {
    fn from(value: String) -> Self {
        Self { value: Some(value) }
    }
}

impl From<Option<String>> for UaString {
    fn from(value: Option<String>) -> Self {
        Self { value }
    }
}

impl fmt::Display for UaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(s) => write!(f, "{}", s),
            None => write!(f, "[null]"),
        }
    }
}

/// Opaque byte sequence that may be null
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ByteString {
    value: Option<Vec<u8>>,
}

impl ByteString {
    /// The null byte string
    pub const fn null() -> Self {
        Self { value: None }
    }

    /// Whether this is the null byte string
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Whether this is null or has no bytes
    pub fn is_empty(&self) -> bool {
        self.value.as_ref().map_or(true, Vec::is_empty)
    }

    /// Borrow the bytes, `None` when null
    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// Borrow the bytes, empty slice when null
    pub fn as_slice(&self) -> &[u8] {
        self.value.as_deref().unwrap_or(&[])
    }

    /// Length in bytes, 0 when null
    pub fn len(&self) -> usize {
        self.value.as_ref().map_or(0, Vec::len)
    }

    /// Consume into the inner value
    pub fn into_inner(self) -> Option<Vec<u8>> {
        self.value
    }
}

impl From<Vec<u8>> for ByteString {
    fn from(value: Vec<u8>) -> Self {
        Self { value: Some(value) }
    }
}

impl From<&[u8]> for ByteString {
    fn from(value: &[u8]) -> Self {
        Self {
            value: Some(value.to_vec()),
        }
    }
}

impl From<Option<Vec<u8>>> for ByteString {
    fn from(value: Option<Vec<u8>>) -> Self {
        Self { value }
    }
}
