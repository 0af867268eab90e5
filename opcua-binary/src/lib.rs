//! OPC UA binary encoding
//!
//! This crate implements the OPC UA binary data encoding for all built-in
//! types, arrays of them and user structures carried in ExtensionObjects.
//!
//! # Usage
//!
//! ```rust
//! use opcua_binary::{decode_from_slice, encode_to_vec, DecodingOptions};
//! use opcua_core::NodeId;
//!
//! let bytes = encode_to_vec(&NodeId::numeric(2, 1001)).unwrap();
//! let node: NodeId = decode_from_slice(&bytes, DecodingOptions::default()).unwrap();
//! assert_eq!(node, NodeId::numeric(2, 1001));
//! ```

pub mod decoder;
pub mod encodable;
pub mod encoder;
pub mod options;
pub mod registry;

pub use decoder::{BinaryDecoder, LengthKind};
pub use encodable::BinaryEncodable;
pub use encoder::BinaryEncoder;
pub use opcua_core;
pub use opcua_core::{UaError, UaResult};
pub use options::DecodingOptions;
pub use registry::{Decoded, DynStructure, ExtensionObjectExt, Structure, TypeRegistry};

/// Encode a value into a new byte vector
pub fn encode_to_vec<T: BinaryEncodable>(value: &T) -> UaResult<Vec<u8>> {
    let mut encoder = BinaryEncoder::new();
    value.encode(&mut encoder)?;
    Ok(encoder.into_bytes())
}

/// Decode a value from the start of `bytes`; trailing bytes are ignored
pub fn decode_from_slice<T: BinaryEncodable>(bytes: &[u8], options: DecodingOptions) -> UaResult<T> {
    let mut decoder = BinaryDecoder::new(bytes, options);
    T::decode(&mut decoder)
}

/// Decode a value that must occupy all of `bytes`
pub fn decode_exact<T: BinaryEncodable>(bytes: &[u8], options: DecodingOptions) -> UaResult<T> {
    let mut decoder = BinaryDecoder::new(bytes, options);
    registry::decode_body(&mut decoder)
}

/// Implement `BinaryEncodable` for a struct by encoding its fields in order
///
/// ```rust
/// use opcua_binary::impl_encodable_struct;
/// use opcua_core::UaString;
///
/// #[derive(Debug, PartialEq)]
/// struct Pair {
///     key: UaString,
///     value: i32,
/// }
///
/// impl_encodable_struct!(Pair { key, value });
/// ```
#[macro_export]
macro_rules! impl_encodable_struct {
    ($ty:ident { $($field:ident),* $(,)? }) => {
        impl $crate::BinaryEncodable for $ty {
            #[allow(unused_variables)]
            fn encode(&self, encoder: &mut $crate::BinaryEncoder) -> $crate::UaResult<()> {
                $($crate::BinaryEncodable::encode(&self.$field, encoder)?;)*
                Ok(())
            }

            #[allow(unused_variables)]
            fn decode(decoder: &mut $crate::BinaryDecoder<'_>) -> $crate::UaResult<Self> {
                Ok(Self {
                    $($field: $crate::BinaryEncodable::decode(decoder)?,)*
                })
            }
        }
    };
}

/// Implement `Structure` for a type with namespace 0 numeric ids
#[macro_export]
macro_rules! impl_structure {
    ($ty:ident, $data_type_id:expr, $encoding_id:expr) => {
        impl $crate::Structure for $ty {
            const DATA_TYPE_ID: $crate::opcua_core::NodeId =
                $crate::opcua_core::NodeId::numeric(0, $data_type_id);
            const BINARY_ENCODING_ID: $crate::opcua_core::NodeId =
                $crate::opcua_core::NodeId::numeric(0, $encoding_id);
        }
    };
}
