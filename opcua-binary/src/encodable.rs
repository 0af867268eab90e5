//! `BinaryEncodable` trait and implementations for the built-in types

use crate::decoder::BinaryDecoder;
use crate::encoder::BinaryEncoder;
use opcua_core::{
    ByteString, DataValue, DateTime, DiagnosticInfo, ExpandedNodeId, ExtensionObject,
    ExtensionObjectBody, Guid, Identifier, LocalizedText, NodeId, QualifiedName, StatusCode,
    UaError, UaResult, UaString, Variant, VariantArray, VariantTypeId,
};

/// Types with an OPC UA binary representation
pub trait BinaryEncodable: Sized {
    /// Append the binary form of `self` to the encoder
    fn encode(&self, encoder: &mut BinaryEncoder) -> UaResult<()>;

    /// Read a value from the decoder
    fn decode(decoder: &mut BinaryDecoder<'_>) -> UaResult<Self>;
}

macro_rules! impl_primitive {
    ($($ty:ty => $write:ident, $read:ident;)*) => {
        $(impl BinaryEncodable for $ty {
            fn encode(&self, encoder: &mut BinaryEncoder) -> UaResult<()> {
                encoder.$write(*self);
                Ok(())
            }

            fn decode(decoder: &mut BinaryDecoder<'_>) -> UaResult<Self> {
                decoder.$read()
            }
        })*
    };
}

impl_primitive! {
    bool => write_bool, read_bool;
    i8 => write_i8, read_i8;
    u8 => write_u8, read_u8;
    i16 => write_i16, read_i16;
    u16 => write_u16, read_u16;
    i32 => write_i32, read_i32;
    u32 => write_u32, read_u32;
    i64 => write_i64, read_i64;
    u64 => write_u64, read_u64;
    f32 => write_f32, read_f32;
    f64 => write_f64, read_f64;
}

/// Arrays where null and empty are not distinguished by the caller
impl<T: BinaryEncodable> BinaryEncodable for Vec<T> {
    fn encode(&self, encoder: &mut BinaryEncoder) -> UaResult<()> {
        encoder.write_array(Some(self.as_slice()))
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> UaResult<Self> {
        Ok(decoder.read_array_of()?.unwrap_or_default())
    }
}

/// Arrays that may be null
impl<T: BinaryEncodable> BinaryEncodable for Option<Vec<T>> {
    fn encode(&self, encoder: &mut BinaryEncoder) -> UaResult<()> {
        encoder.write_array(self.as_deref())
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> UaResult<Self> {
        decoder.read_array_of()
    }
}

impl BinaryEncodable for UaString {
    fn encode(&self, encoder: &mut BinaryEncoder) -> UaResult<()> {
        encoder.write_string(self.as_str())
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> UaResult<Self> {
        Ok(UaString::from(decoder.read_string()?))
    }
}

impl BinaryEncodable for ByteString {
    fn encode(&self, encoder: &mut BinaryEncoder) -> UaResult<()> {
        encoder.write_byte_string(self.as_bytes())
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> UaResult<Self> {
        Ok(ByteString::from(decoder.read_byte_string()?))
    }
}

impl BinaryEncodable for DateTime {
    fn encode(&self, encoder: &mut BinaryEncoder) -> UaResult<()> {
        encoder.write_i64(self.ticks());
        Ok(())
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> UaResult<Self> {
        Ok(DateTime::from_ticks(decoder.read_i64()?))
    }
}

impl BinaryEncodable for Guid {
    fn encode(&self, encoder: &mut BinaryEncoder) -> UaResult<()> {
        encoder.write_u32(self.data1);
        encoder.write_u16(self.data2);
        encoder.write_u16(self.data3);
        encoder.write_raw(&self.data4);
        Ok(())
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> UaResult<Self> {
        let data1 = decoder.read_u32()?;
        let data2 = decoder.read_u16()?;
        let data3 = decoder.read_u16()?;
        let mut data4 = [0u8; 8];
        data4.copy_from_slice(decoder.read_bytes(8)?);
        Ok(Guid::new(data1, data2, data3, data4))
    }
}

impl BinaryEncodable for StatusCode {
    fn encode(&self, encoder: &mut BinaryEncoder) -> UaResult<()> {
        encoder.write_u32(self.bits());
        Ok(())
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> UaResult<Self> {
        Ok(StatusCode::from_u32(decoder.read_u32()?))
    }
}

// NodeId encoding byte values
const NODE_ID_TWO_BYTE: u8 = 0x00;
const NODE_ID_FOUR_BYTE: u8 = 0x01;
const NODE_ID_NUMERIC: u8 = 0x02;
const NODE_ID_STRING: u8 = 0x03;
const NODE_ID_GUID: u8 = 0x04;
const NODE_ID_BYTE_STRING: u8 = 0x05;

const EXPANDED_NAMESPACE_URI: u8 = 0x80;
const EXPANDED_SERVER_INDEX: u8 = 0x40;

/// Write a NodeId in its most compact form, OR-ing `flags` into the encoding byte
fn encode_node_id(node_id: &NodeId, flags: u8, encoder: &mut BinaryEncoder) -> UaResult<()> {
    let ns = node_id.namespace;
    match &node_id.identifier {
        Identifier::Numeric(value) if ns == 0 && *value <= u8::MAX as u32 => {
            encoder.write_u8(NODE_ID_TWO_BYTE | flags);
            encoder.write_u8(*value as u8);
        }
        Identifier::Numeric(value) if ns <= u8::MAX as u16 && *value <= u16::MAX as u32 => {
            encoder.write_u8(NODE_ID_FOUR_BYTE | flags);
            encoder.write_u8(ns as u8);
            encoder.write_u16(*value as u16);
        }
        Identifier::Numeric(value) => {
            encoder.write_u8(NODE_ID_NUMERIC | flags);
            encoder.write_u16(ns);
            encoder.write_u32(*value);
        }
        Identifier::String(value) => {
            encoder.write_u8(NODE_ID_STRING | flags);
            encoder.write_u16(ns);
            value.encode(encoder)?;
        }
        Identifier::Guid(value) => {
            encoder.write_u8(NODE_ID_GUID | flags);
            encoder.write_u16(ns);
            value.encode(encoder)?;
        }
        Identifier::ByteString(value) => {
            encoder.write_u8(NODE_ID_BYTE_STRING | flags);
            encoder.write_u16(ns);
            value.encode(encoder)?;
        }
    }
    Ok(())
}

/// Read the NodeId that follows an already consumed encoding byte
fn decode_node_id(encoding: u8, decoder: &mut BinaryDecoder<'_>) -> UaResult<NodeId> {
    let node_id = match encoding & 0x0F {
        NODE_ID_TWO_BYTE => NodeId::numeric(0, decoder.read_u8()? as u32),
        NODE_ID_FOUR_BYTE => {
            let ns = decoder.read_u8()? as u16;
            NodeId::numeric(ns, decoder.read_u16()? as u32)
        }
        NODE_ID_NUMERIC => {
            let ns = decoder.read_u16()?;
            NodeId::numeric(ns, decoder.read_u32()?)
        }
        NODE_ID_STRING => NodeId {
            namespace: decoder.read_u16()?,
            identifier: Identifier::String(UaString::decode(decoder)?),
        },
        NODE_ID_GUID => NodeId {
            namespace: decoder.read_u16()?,
            identifier: Identifier::Guid(Guid::decode(decoder)?),
        },
        NODE_ID_BYTE_STRING => NodeId {
            namespace: decoder.read_u16()?,
            identifier: Identifier::ByteString(ByteString::decode(decoder)?),
        },
        other => {
            return Err(UaError::decoding(format!(
                "Unknown NodeId encoding 0x{:02X}",
                other
            )));
        }
    };
    Ok(node_id)
}

impl BinaryEncodable for NodeId {
    fn encode(&self, encoder: &mut BinaryEncoder) -> UaResult<()> {
        encode_node_id(self, 0, encoder)
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> UaResult<Self> {
        let encoding = decoder.read_u8()?;
        if encoding & (EXPANDED_NAMESPACE_URI | EXPANDED_SERVER_INDEX) != 0 {
            return Err(UaError::decoding(
                "ExpandedNodeId flags set on a plain NodeId",
            ));
        }
        decode_node_id(encoding, decoder)
    }
}

impl BinaryEncodable for ExpandedNodeId {
    fn encode(&self, encoder: &mut BinaryEncoder) -> UaResult<()> {
        let mut flags = 0;
        if !self.namespace_uri.is_null() {
            flags |= EXPANDED_NAMESPACE_URI;
        }
        if self.server_index != 0 {
            flags |= EXPANDED_SERVER_INDEX;
        }
        encode_node_id(&self.node_id, flags, encoder)?;
        if flags & EXPANDED_NAMESPACE_URI != 0 {
            self.namespace_uri.encode(encoder)?;
        }
        if flags & EXPANDED_SERVER_INDEX != 0 {
            encoder.write_u32(self.server_index);
        }
        Ok(())
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> UaResult<Self> {
        let encoding = decoder.read_u8()?;
        let node_id = decode_node_id(encoding, decoder)?;
        let namespace_uri = if encoding & EXPANDED_NAMESPACE_URI != 0 {
            UaString::decode(decoder)?
        } else {
            UaString::null()
        };
        let server_index = if encoding & EXPANDED_SERVER_INDEX != 0 {
            decoder.read_u32()?
        } else {
            0
        };
        Ok(ExpandedNodeId {
            node_id,
            namespace_uri,
            server_index,
        })
    }
}

impl BinaryEncodable for QualifiedName {
    fn encode(&self, encoder: &mut BinaryEncoder) -> UaResult<()> {
        encoder.write_u16(self.namespace_index);
        self.name.encode(encoder)
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> UaResult<Self> {
        Ok(QualifiedName {
            namespace_index: decoder.read_u16()?,
            name: UaString::decode(decoder)?,
        })
    }
}

const TEXT_HAS_LOCALE: u8 = 0x01;
const TEXT_HAS_TEXT: u8 = 0x02;

impl BinaryEncodable for LocalizedText {
    fn encode(&self, encoder: &mut BinaryEncoder) -> UaResult<()> {
        let mut mask = 0;
        if !self.locale.is_null() {
            mask |= TEXT_HAS_LOCALE;
        }
        if !self.text.is_null() {
            mask |= TEXT_HAS_TEXT;
        }
        encoder.write_u8(mask);
        if mask & TEXT_HAS_LOCALE != 0 {
            self.locale.encode(encoder)?;
        }
        if mask & TEXT_HAS_TEXT != 0 {
            self.text.encode(encoder)?;
        }
        Ok(())
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> UaResult<Self> {
        let mask = decoder.read_u8()?;
        let locale = if mask & TEXT_HAS_LOCALE != 0 {
            UaString::decode(decoder)?
        } else {
            UaString::null()
        };
        let text = if mask & TEXT_HAS_TEXT != 0 {
            UaString::decode(decoder)?
        } else {
            UaString::null()
        };
        Ok(LocalizedText { locale, text })
    }
}

impl BinaryEncodable for ExtensionObject {
    fn encode(&self, encoder: &mut BinaryEncoder) -> UaResult<()> {
        self.node_id.encode(encoder)?;
        match &self.body {
            ExtensionObjectBody::None => encoder.write_u8(0x00),
            ExtensionObjectBody::Binary(body) => {
                encoder.write_u8(0x01);
                body.encode(encoder)?;
            }
            ExtensionObjectBody::Xml(body) => {
                encoder.write_u8(0x02);
                body.encode(encoder)?;
            }
        }
        Ok(())
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> UaResult<Self> {
        let node_id = NodeId::decode(decoder)?;
        let body = match decoder.read_u8()? {
            0x00 => ExtensionObjectBody::None,
            0x01 => ExtensionObjectBody::Binary(ByteString::decode(decoder)?),
            0x02 => ExtensionObjectBody::Xml(UaString::decode(decoder)?),
            other => {
                return Err(UaError::decoding(format!(
                    "Unknown ExtensionObject encoding 0x{:02X}",
                    other
                )));
            }
        };
        Ok(ExtensionObject { node_id, body })
    }
}

impl BinaryEncodable for DiagnosticInfo {
    fn encode(&self, encoder: &mut BinaryEncoder) -> UaResult<()> {
        encoder.write_u8(self.encoding_mask());
        if let Some(v) = self.symbolic_id {
            encoder.write_i32(v);
        }
        if let Some(v) = self.namespace_uri {
            encoder.write_i32(v);
        }
        if let Some(v) = self.locale {
            encoder.write_i32(v);
        }
        if let Some(v) = self.localized_text {
            encoder.write_i32(v);
        }
        if let Some(v) = &self.additional_info {
            v.encode(encoder)?;
        }
        if let Some(v) = &self.inner_status_code {
            v.encode(encoder)?;
        }
        if let Some(v) = &self.inner_diagnostic_info {
            v.encode(encoder)?;
        }
        Ok(())
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> UaResult<Self> {
        decoder.nested(|decoder| {
            let mask = decoder.read_u8()?;
            let has = |bit: u8| mask & bit != 0;
            let mut info = DiagnosticInfo::default();
            if has(DiagnosticInfo::SYMBOLIC_ID) {
                info.symbolic_id = Some(decoder.read_i32()?);
            }
            if has(DiagnosticInfo::NAMESPACE_URI) {
                info.namespace_uri = Some(decoder.read_i32()?);
            }
            if has(DiagnosticInfo::LOCALE) {
                info.locale = Some(decoder.read_i32()?);
            }
            if has(DiagnosticInfo::LOCALIZED_TEXT) {
                info.localized_text = Some(decoder.read_i32()?);
            }
            if has(DiagnosticInfo::ADDITIONAL_INFO) {
                info.additional_info = Some(UaString::decode(decoder)?);
            }
            if has(DiagnosticInfo::INNER_STATUS_CODE) {
                info.inner_status_code = Some(StatusCode::decode(decoder)?);
            }
            if has(DiagnosticInfo::INNER_DIAGNOSTIC_INFO) {
                info.inner_diagnostic_info = Some(Box::new(DiagnosticInfo::decode(decoder)?));
            }
            Ok(info)
        })
    }
}

impl BinaryEncodable for DataValue {
    fn encode(&self, encoder: &mut BinaryEncoder) -> UaResult<()> {
        encoder.write_u8(self.encoding_mask());
        if let Some(v) = &self.value {
            v.encode(encoder)?;
        }
        if let Some(v) = &self.status {
            v.encode(encoder)?;
        }
        if let Some(v) = &self.source_timestamp {
            v.encode(encoder)?;
        }
        if let Some(v) = self.source_picoseconds {
            encoder.write_u16(v);
        }
        if let Some(v) = &self.server_timestamp {
            v.encode(encoder)?;
        }
        if let Some(v) = self.server_picoseconds {
            encoder.write_u16(v);
        }
        Ok(())
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> UaResult<Self> {
        decoder.nested(|decoder| {
            let mask = decoder.read_u8()?;
            let has = |bit: u8| mask & bit != 0;
            let mut value = DataValue::default();
            if has(DataValue::HAS_VALUE) {
                value.value = Some(Variant::decode(decoder)?);
            }
            if has(DataValue::HAS_STATUS) {
                value.status = Some(StatusCode::decode(decoder)?);
            }
            if has(DataValue::HAS_SOURCE_TIMESTAMP) {
                value.source_timestamp = Some(DateTime::decode(decoder)?);
            }
            if has(DataValue::HAS_SOURCE_PICOSECONDS) {
                value.source_picoseconds = Some(decoder.read_u16()?);
            }
            if has(DataValue::HAS_SERVER_TIMESTAMP) {
                value.server_timestamp = Some(DateTime::decode(decoder)?);
            }
            if has(DataValue::HAS_SERVER_PICOSECONDS) {
                value.server_picoseconds = Some(decoder.read_u16()?);
            }
            Ok(value)
        })
    }
}

const VARIANT_ARRAY: u8 = 0x80;
const VARIANT_DIMENSIONS: u8 = 0x40;
const VARIANT_TYPE_MASK: u8 = 0x3F;

/// Write the value of a scalar Variant without its encoding byte
fn encode_variant_value(value: &Variant, encoder: &mut BinaryEncoder) -> UaResult<()> {
    match value {
        Variant::Empty | Variant::Array(_) => {
            return Err(UaError::encoding("Empty or array Variant cannot be an array element"));
        }
        Variant::Boolean(v) => encoder.write_bool(*v),
        Variant::SByte(v) => encoder.write_i8(*v),
        Variant::Byte(v) => encoder.write_u8(*v),
        Variant::Int16(v) => encoder.write_i16(*v),
        Variant::UInt16(v) => encoder.write_u16(*v),
        Variant::Int32(v) => encoder.write_i32(*v),
        Variant::UInt32(v) => encoder.write_u32(*v),
        Variant::Int64(v) => encoder.write_i64(*v),
        Variant::UInt64(v) => encoder.write_u64(*v),
        Variant::Float(v) => encoder.write_f32(*v),
        Variant::Double(v) => encoder.write_f64(*v),
        Variant::String(v) | Variant::XmlElement(v) => v.encode(encoder)?,
        Variant::DateTime(v) => v.encode(encoder)?,
        Variant::Guid(v) => v.encode(encoder)?,
        Variant::ByteString(v) => v.encode(encoder)?,
        Variant::NodeId(v) => v.encode(encoder)?,
        Variant::ExpandedNodeId(v) => v.encode(encoder)?,
        Variant::StatusCode(v) => v.encode(encoder)?,
        Variant::QualifiedName(v) => v.encode(encoder)?,
        Variant::LocalizedText(v) => v.encode(encoder)?,
        Variant::ExtensionObject(v) => v.encode(encoder)?,
        Variant::DataValue(v) => v.encode(encoder)?,
        Variant::DiagnosticInfo(v) => v.encode(encoder)?,
    }
    Ok(())
}

/// Read a Variant value of the given type without an encoding byte
fn decode_variant_value(type_id: VariantTypeId, decoder: &mut BinaryDecoder<'_>) -> UaResult<Variant> {
    use VariantTypeId as T;
    Ok(match type_id {
        T::Boolean => Variant::Boolean(decoder.read_bool()?),
        T::SByte => Variant::SByte(decoder.read_i8()?),
        T::Byte => Variant::Byte(decoder.read_u8()?),
        T::Int16 => Variant::Int16(decoder.read_i16()?),
        T::UInt16 => Variant::UInt16(decoder.read_u16()?),
        T::Int32 => Variant::Int32(decoder.read_i32()?),
        T::UInt32 => Variant::UInt32(decoder.read_u32()?),
        T::Int64 => Variant::Int64(decoder.read_i64()?),
        T::UInt64 => Variant::UInt64(decoder.read_u64()?),
        T::Float => Variant::Float(decoder.read_f32()?),
        T::Double => Variant::Double(decoder.read_f64()?),
        T::String => Variant::String(UaString::decode(decoder)?),
        T::DateTime => Variant::DateTime(DateTime::decode(decoder)?),
        T::Guid => Variant::Guid(Guid::decode(decoder)?),
        T::ByteString => Variant::ByteString(ByteString::decode(decoder)?),
        T::XmlElement => Variant::XmlElement(UaString::decode(decoder)?),
        T::NodeId => Variant::NodeId(Box::new(NodeId::decode(decoder)?)),
        T::ExpandedNodeId => Variant::ExpandedNodeId(Box::new(ExpandedNodeId::decode(decoder)?)),
        T::StatusCode => Variant::StatusCode(StatusCode::decode(decoder)?),
        T::QualifiedName => Variant::QualifiedName(Box::new(QualifiedName::decode(decoder)?)),
        T::LocalizedText => Variant::LocalizedText(Box::new(LocalizedText::decode(decoder)?)),
        T::ExtensionObject => Variant::ExtensionObject(Box::new(ExtensionObject::decode(decoder)?)),
        T::DataValue => Variant::DataValue(Box::new(DataValue::decode(decoder)?)),
        T::DiagnosticInfo => Variant::DiagnosticInfo(Box::new(DiagnosticInfo::decode(decoder)?)),
        // array elements of type Variant carry their own encoding byte
        T::Variant => Variant::decode(decoder)?,
    })
}

fn encode_variant_array(array: &VariantArray, encoder: &mut BinaryEncoder) -> UaResult<()> {
    let mut encoding = array.value_type.id() | VARIANT_ARRAY;
    if array.dimensions.is_some() {
        encoding |= VARIANT_DIMENSIONS;
    }
    encoder.write_u8(encoding);
    match &array.values {
        None => encoder.write_length(None)?,
        Some(values) => {
            encoder.write_length(Some(values.len()))?;
            for value in values {
                if array.value_type == VariantTypeId::Variant {
                    value.encode(encoder)?;
                } else if value.type_id() == Some(array.value_type) {
                    encode_variant_value(value, encoder)?;
                } else {
                    return Err(UaError::encoding(format!(
                        "Array of {:?} contains {:?}",
                        array.value_type,
                        value.type_id()
                    )));
                }
            }
        }
    }
    if let Some(dimensions) = &array.dimensions {
        encoder.write_array(Some(dimensions.as_slice()))?;
    }
    Ok(())
}

impl BinaryEncodable for Variant {
    fn encode(&self, encoder: &mut BinaryEncoder) -> UaResult<()> {
        match self {
            Variant::Empty => {
                encoder.write_u8(0);
                Ok(())
            }
            Variant::Array(array) => encode_variant_array(array, encoder),
            scalar => {
                // type_id is Some for every scalar
                let type_id = scalar
                    .type_id()
                    .ok_or_else(|| UaError::encoding("Variant without type"))?;
                encoder.write_u8(type_id.id());
                encode_variant_value(scalar, encoder)
            }
        }
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> UaResult<Self> {
        decoder.nested(|decoder| {
            let encoding = decoder.read_u8()?;
            let raw_type = encoding & VARIANT_TYPE_MASK;
            if raw_type == 0 {
                return Ok(Variant::Empty);
            }
            let type_id = VariantTypeId::from_id(raw_type)?;

            if encoding & VARIANT_ARRAY == 0 {
                if type_id == VariantTypeId::Variant {
                    return Err(UaError::decoding("Scalar Variant cannot contain a Variant"));
                }
                return decode_variant_value(type_id, decoder);
            }

            let values = match decoder.read_length(crate::decoder::LengthKind::Array)? {
                None => None,
                Some(len) => {
                    let mut values = Vec::with_capacity(len);
                    for _ in 0..len {
                        values.push(decode_variant_value(type_id, decoder)?);
                    }
                    Some(values)
                }
            };
            let dimensions = if encoding & VARIANT_DIMENSIONS != 0 {
                Option::<Vec<i32>>::decode(decoder)?
            } else {
                None
            };
            if let (Some(values), Some(dims)) = (&values, &dimensions) {
                let expected = dims.iter().try_fold(1usize, |acc, d| {
                    usize::try_from(*d).ok().and_then(|d| acc.checked_mul(d))
                });
                if expected != Some(values.len()) {
                    return Err(UaError::decoding(format!(
                        "Array dimensions {:?} do not match {} elements",
                        dims,
                        values.len()
                    )));
                }
            }
            Ok(Variant::Array(Box::new(VariantArray {
                value_type: type_id,
                values,
                dimensions,
            })))
        })
    }
}
