//! Structure registry for ExtensionObject bodies
//!
//! Structures are registered by their binary encoding id. Decoding an
//! ExtensionObject with a registered id yields the typed structure; anything
//! else is kept as the opaque wrapper so it re-encodes unchanged.

use crate::decoder::BinaryDecoder;
use crate::encodable::BinaryEncodable;
use crate::options::DecodingOptions;
use crate::{decode_exact, encode_to_vec};
use opcua_core::{ExtensionObject, ExtensionObjectBody, NodeId, UaError, UaResult};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// A structured type that can travel inside an ExtensionObject
pub trait Structure: BinaryEncodable + Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// NodeId of the DataType
    const DATA_TYPE_ID: NodeId;
    /// NodeId of the DefaultBinary encoding object
    const BINARY_ENCODING_ID: NodeId;
}

/// Object-safe view of a decoded structure
pub trait DynStructure: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn clone_box(&self) -> Box<dyn DynStructure>;
    fn eq_dyn(&self, other: &dyn DynStructure) -> bool;
    fn binary_encoding_id(&self) -> NodeId;
    fn encode_body(&self) -> UaResult<Vec<u8>>;
}

impl<T: Structure> DynStructure for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn DynStructure> {
        Box::new(self.clone())
    }

    fn eq_dyn(&self, other: &dyn DynStructure) -> bool {
        other.as_any().downcast_ref::<T>() == Some(self)
    }

    fn binary_encoding_id(&self) -> NodeId {
        T::BINARY_ENCODING_ID
    }

    fn encode_body(&self) -> UaResult<Vec<u8>> {
        encode_to_vec(self)
    }
}

impl Clone for Box<dyn DynStructure> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl PartialEq for Box<dyn DynStructure> {
    fn eq(&self, other: &Self) -> bool {
        self.eq_dyn(other.as_ref())
    }
}

/// Result of decoding an ExtensionObject through the registry
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A registered structure
    Known(Box<dyn DynStructure>),
    /// Unknown or non-binary body, kept as received
    Opaque(ExtensionObject),
}

impl Decoded {
    /// Borrow the structure as `T` if that is what was decoded
    pub fn downcast_ref<T: Structure>(&self) -> Option<&T> {
        match self {
            Decoded::Known(value) => value.as_any().downcast_ref::<T>(),
            Decoded::Opaque(_) => None,
        }
    }

    /// Convert back to an ExtensionObject
    pub fn into_extension_object(self) -> UaResult<ExtensionObject> {
        match self {
            Decoded::Known(value) => Ok(ExtensionObject::from_binary(
                value.binary_encoding_id(),
                value.encode_body()?,
            )),
            Decoded::Opaque(eo) => Ok(eo),
        }
    }
}

type DecodeFn = fn(&[u8], &DecodingOptions) -> UaResult<Box<dyn DynStructure>>;

#[derive(Clone)]
struct Registration {
    data_type_id: NodeId,
    decode: DecodeFn,
}

fn decode_boxed<T: Structure>(body: &[u8], options: &DecodingOptions) -> UaResult<Box<dyn DynStructure>> {
    Ok(Box::new(decode_exact::<T>(body, *options)?))
}

/// Registry of structures decodable from ExtensionObjects
#[derive(Clone, Default)]
pub struct TypeRegistry {
    by_encoding_id: HashMap<NodeId, Registration>,
    options: DecodingOptions,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.by_encoding_id.len())
            .field("options", &self.options)
            .finish()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry applying the given limits to structure bodies
    pub fn with_options(options: DecodingOptions) -> Self {
        Self {
            by_encoding_id: HashMap::new(),
            options,
        }
    }

    /// Register a structure type
    pub fn register<T: Structure>(&mut self) -> &mut Self {
        self.by_encoding_id.insert(
            T::BINARY_ENCODING_ID,
            Registration {
                data_type_id: T::DATA_TYPE_ID,
                decode: decode_boxed::<T>,
            },
        );
        self
    }

    /// Whether a binary encoding id is known
    pub fn contains(&self, encoding_id: &NodeId) -> bool {
        self.by_encoding_id.contains_key(encoding_id)
    }

    /// DataType id registered for a binary encoding id
    pub fn data_type_of(&self, encoding_id: &NodeId) -> Option<&NodeId> {
        self.by_encoding_id.get(encoding_id).map(|r| &r.data_type_id)
    }

    /// Decode an ExtensionObject
    ///
    /// # Errors
    /// Returns a decoding error when a registered type's body is malformed or
    /// its length does not match the bytes consumed.
    pub fn decode(&self, eo: &ExtensionObject) -> UaResult<Decoded> {
        let (Some(registration), ExtensionObjectBody::Binary(body)) =
            (self.by_encoding_id.get(&eo.node_id), &eo.body)
        else {
            log::trace!("Passing ExtensionObject {} through undecoded", eo.node_id);
            return Ok(Decoded::Opaque(eo.clone()));
        };
        (registration.decode)(body.as_slice(), &self.options).map(Decoded::Known)
    }
}

/// Typed helpers on ExtensionObject
pub trait ExtensionObjectExt {
    /// Wrap a structure with its binary encoding id
    fn from_structure<T: Structure>(value: &T) -> UaResult<ExtensionObject>;

    /// Decode the body as `T`, checking the encoding id
    fn decode_structure<T: Structure>(&self, options: DecodingOptions) -> UaResult<T>;

    /// Whether the object carries `T`
    fn is_structure<T: Structure>(&self) -> bool;
}

impl ExtensionObjectExt for ExtensionObject {
    fn from_structure<T: Structure>(value: &T) -> UaResult<ExtensionObject> {
        Ok(ExtensionObject::from_binary(T::BINARY_ENCODING_ID, encode_to_vec(value)?))
    }

    fn decode_structure<T: Structure>(&self, options: DecodingOptions) -> UaResult<T> {
        if self.node_id != T::BINARY_ENCODING_ID {
            return Err(UaError::decoding(format!(
                "ExtensionObject {} is not {}",
                self.node_id,
                T::BINARY_ENCODING_ID
            )));
        }
        let body = self
            .binary_body()
            .ok_or_else(|| UaError::decoding(format!("ExtensionObject {} has no binary body", self.node_id)))?;
        decode_exact(body, options)
    }

    fn is_structure<T: Structure>(&self) -> bool {
        self.node_id == T::BINARY_ENCODING_ID
    }
}

/// Decode a structure body that must be consumed entirely
pub(crate) fn decode_body<T: BinaryEncodable>(decoder: &mut BinaryDecoder<'_>) -> UaResult<T> {
    let value = T::decode(decoder)?;
    decoder.expect_end()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::BinaryEncoder;
    use opcua_core::{StatusCode, UaString};

    #[derive(Debug, Clone, PartialEq)]
    struct Range {
        low: f64,
        high: f64,
    }

    crate::impl_encodable_struct!(Range { low, high });

    impl Structure for Range {
        const DATA_TYPE_ID: NodeId = NodeId::numeric(0, 884);
        const BINARY_ENCODING_ID: NodeId = NodeId::numeric(0, 886);
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Named {
        name: UaString,
    }

    crate::impl_encodable_struct!(Named { name });

    impl Structure for Named {
        const DATA_TYPE_ID: NodeId = NodeId::numeric(2, 10);
        const BINARY_ENCODING_ID: NodeId = NodeId::numeric(2, 11);
    }

    #[test]
    fn test_known_structure_round_trip() {
        let mut registry = TypeRegistry::new();
        registry.register::<Range>();
        let range = Range { low: -1.0, high: 99.5 };
        let eo = ExtensionObject::from_structure(&range).unwrap();

        let decoded = registry.decode(&eo).unwrap();
        assert_eq!(decoded.downcast_ref::<Range>(), Some(&range));
        assert_eq!(decoded.into_extension_object().unwrap(), eo);
        assert_eq!(registry.data_type_of(&Range::BINARY_ENCODING_ID), Some(&Range::DATA_TYPE_ID));
    }

    #[test]
    fn test_unknown_structure_stays_opaque() {
        let registry = TypeRegistry::new();
        let eo = ExtensionObject::from_structure(&Named {
            name: UaString::from("x"),
        })
        .unwrap();
        let decoded = registry.decode(&eo).unwrap();
        assert!(matches!(&decoded, Decoded::Opaque(o) if *o == eo));
        assert_eq!(decoded.into_extension_object().unwrap(), eo);
    }

    #[test]
    fn test_body_length_mismatch() {
        let mut registry = TypeRegistry::new();
        registry.register::<Range>();
        let mut body = encode_to_vec(&Range { low: 1.0, high: 2.0 }).unwrap();
        body.push(0xAA);
        let eo = ExtensionObject::from_binary(Range::BINARY_ENCODING_ID, body);
        let err = registry.decode(&eo).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_DECODING_ERROR);
        assert!(eo.decode_structure::<Range>(DecodingOptions::default()).is_err());
    }

    #[test]
    fn test_decode_structure_checks_type() {
        let eo = ExtensionObject::from_structure(&Range { low: 0.0, high: 1.0 }).unwrap();
        assert!(eo.is_structure::<Range>());
        assert!(!eo.is_structure::<Named>());
        assert!(eo.decode_structure::<Named>(DecodingOptions::default()).is_err());
        let range: Range = eo.decode_structure(DecodingOptions::default()).unwrap();
        assert_eq!(range.high, 1.0);
    }

    #[test]
    fn test_decode_body_requires_full_consumption() {
        let mut enc = BinaryEncoder::new();
        enc.write_u32(1);
        enc.write_u8(2);
        let bytes = enc.into_bytes();
        let mut decoder = BinaryDecoder::new(&bytes, DecodingOptions::default());
        assert!(decode_body::<u32>(&mut decoder).is_err());
    }
}
