//! Variant and DataValue
//!
//! `Variant` is the union of all built-in types. Arrays keep their element type
//! so that empty and null arrays still encode with the correct type id.

use crate::datatypes::date_time::DateTime;
use crate::datatypes::diagnostic_info::DiagnosticInfo;
use crate::datatypes::extension_object::ExtensionObject;
use crate::datatypes::guid::Guid;
use crate::datatypes::node_id::{ExpandedNodeId, NodeId};
use crate::datatypes::string::{ByteString, UaString};
use crate::datatypes::text::{LocalizedText, QualifiedName};
use crate::error::{UaError, UaResult};
use crate::status_code::StatusCode;

/// Built-in type ids as used in the Variant encoding byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VariantTypeId {
    Boolean = 1,
    SByte = 2,
    Byte = 3,
    Int16 = 4,
    UInt16 = 5,
    Int32 = 6,
    UInt32 = 7,
    Int64 = 8,
    UInt64 = 9,
    Float = 10,
    Double = 11,
    String = 12,
    DateTime = 13,
    Guid = 14,
    ByteString = 15,
    XmlElement = 16,
    NodeId = 17,
    ExpandedNodeId = 18,
    StatusCode = 19,
    QualifiedName = 20,
    LocalizedText = 21,
    ExtensionObject = 22,
    DataValue = 23,
    Variant = 24,
    DiagnosticInfo = 25,
}

impl VariantTypeId {
    /// Get the numeric id
    pub fn id(&self) -> u8 {
        *self as u8
    }

    /// Get the type from its numeric id
    pub fn from_id(id: u8) -> UaResult<Self> {
        use VariantTypeId::*;
        Ok(match id {
            1 => Boolean,
            2 => SByte,
            3 => Byte,
            4 => Int16,
            5 => UInt16,
            6 => Int32,
            7 => UInt32,
            8 => Int64,
            9 => UInt64,
            10 => Float,
            11 => Double,
            12 => String,
            13 => DateTime,
            14 => Guid,
            15 => ByteString,
            16 => XmlElement,
            17 => NodeId,
            18 => ExpandedNodeId,
            19 => StatusCode,
            20 => QualifiedName,
            21 => LocalizedText,
            22 => ExtensionObject,
            23 => DataValue,
            24 => Variant,
            25 => DiagnosticInfo,
            _ => return Err(UaError::decoding(format!("Unknown variant type id {}", id))),
        })
    }
}

/// Array payload of a Variant
#[derive(Debug, Clone, PartialEq)]
pub struct VariantArray {
    /// Element type
    pub value_type: VariantTypeId,
    /// Elements, `None` for a null array
    pub values: Option<Vec<Variant>>,
    /// Dimensions of a multi-dimensional array
    pub dimensions: Option<Vec<i32>>,
}

impl VariantArray {
    /// One-dimensional array; every element must have `value_type`
    pub fn new(value_type: VariantTypeId, values: Vec<Variant>) -> UaResult<Self> {
        Self::validate(value_type, &values)?;
        Ok(Self {
            value_type,
            values: Some(values),
            dimensions: None,
        })
    }

    /// Multi-dimensional array; the product of dimensions must match the length
    pub fn new_multi(value_type: VariantTypeId, values: Vec<Variant>, dimensions: Vec<i32>) -> UaResult<Self> {
        Self::validate(value_type, &values)?;
        let expected = dimensions.iter().try_fold(1usize, |acc, d| {
            usize::try_from(*d).ok().and_then(|d| acc.checked_mul(d))
        });
        if expected != Some(values.len()) {
            return Err(UaError::InvalidData(format!(
                "Array dimensions {:?} do not match {} elements",
                dimensions,
                values.len()
            )));
        }
        Ok(Self {
            value_type,
            values: Some(values),
            dimensions: Some(dimensions),
        })
    }

    /// Null array of the given element type
    pub fn null(value_type: VariantTypeId) -> Self {
        Self {
            value_type,
            values: None,
            dimensions: None,
        }
    }

    fn validate(value_type: VariantTypeId, values: &[Variant]) -> UaResult<()> {
        if value_type == VariantTypeId::Variant {
            return Ok(());
        }
        match values.iter().find(|v| v.type_id() != Some(value_type)) {
            Some(v) => Err(UaError::InvalidData(format!(
                "Array of {:?} contains {:?}",
                value_type,
                v.type_id()
            ))),
            None => Ok(()),
        }
    }
}

/// Union of all built-in types
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    #[default]
    Empty,
    Boolean(bool),
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(UaString),
    DateTime(DateTime),
    Guid(Guid),
    ByteString(ByteString),
    XmlElement(UaString),
    NodeId(Box<NodeId>),
    ExpandedNodeId(Box<ExpandedNodeId>),
    StatusCode(StatusCode),
    QualifiedName(Box<QualifiedName>),
    LocalizedText(Box<LocalizedText>),
    ExtensionObject(Box<ExtensionObject>),
    DataValue(Box<DataValue>),
    DiagnosticInfo(Box<DiagnosticInfo>),
    Array(Box<VariantArray>),
}

impl Variant {
    /// Built-in type of a scalar; `None` for empty and arrays
    pub fn type_id(&self) -> Option<VariantTypeId> {
        use VariantTypeId as T;
        Some(match self {
            Variant::Empty | Variant::Array(_) => return None,
            Variant::Boolean(_) => T::Boolean,
            Variant::SByte(_) => T::SByte,
            Variant::Byte(_) => T::Byte,
            Variant::Int16(_) => T::Int16,
            Variant::UInt16(_) => T::UInt16,
            Variant::Int32(_) => T::Int32,
            Variant::UInt32(_) => T::UInt32,
            Variant::Int64(_) => T::Int64,
            Variant::UInt64(_) => T::UInt64,
            Variant::Float(_) => T::Float,
            Variant::Double(_) => T::Double,
            Variant::String(_) => T::String,
            Variant::DateTime(_) => T::DateTime,
            Variant::Guid(_) => T::Guid,
            Variant::ByteString(_) => T::ByteString,
            Variant::XmlElement(_) => T::XmlElement,
            Variant::NodeId(_) => T::NodeId,
            Variant::ExpandedNodeId(_) => T::ExpandedNodeId,
            Variant::StatusCode(_) => T::StatusCode,
            Variant::QualifiedName(_) => T::QualifiedName,
            Variant::LocalizedText(_) => T::LocalizedText,
            Variant::ExtensionObject(_) => T::ExtensionObject,
            Variant::DataValue(_) => T::DataValue,
            Variant::DiagnosticInfo(_) => T::DiagnosticInfo,
        })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Variant::Empty)
    }

    /// Numeric value widened to f64, when the variant holds a number
    pub fn as_f64(&self) -> Option<f64> {
        Some(match self {
            Variant::SByte(v) => *v as f64,
            Variant::Byte(v) => *v as f64,
            Variant::Int16(v) => *v as f64,
            Variant::UInt16(v) => *v as f64,
            Variant::Int32(v) => *v as f64,
            Variant::UInt32(v) => *v as f64,
            Variant::Int64(v) => *v as f64,
            Variant::UInt64(v) => *v as f64,
            Variant::Float(v) => *v as f64,
            Variant::Double(v) => *v,
            _ => return None,
        })
    }
}

macro_rules! variant_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Variant {
            fn from(value: $ty) -> Self {
                Variant::$variant(value)
            }
        })*
    };
}

variant_from! {
    bool => Boolean,
    i8 => SByte,
    u8 => Byte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    UaString => String,
    DateTime => DateTime,
    StatusCode => StatusCode,
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(UaString::from(value))
    }
}

impl From<NodeId> for Variant {
    fn from(value: NodeId) -> Self {
        Variant::NodeId(Box::new(value))
    }
}

/// Value with status and timestamps
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValue {
    pub value: Option<Variant>,
    pub status: Option<StatusCode>,
    pub source_timestamp: Option<DateTime>,
    pub source_picoseconds: Option<u16>,
    pub server_timestamp: Option<DateTime>,
    pub server_picoseconds: Option<u16>,
}

impl DataValue {
    pub const HAS_VALUE: u8 = 0x01;
    pub const HAS_STATUS: u8 = 0x02;
    pub const HAS_SOURCE_TIMESTAMP: u8 = 0x04;
    pub const HAS_SERVER_TIMESTAMP: u8 = 0x08;
    pub const HAS_SOURCE_PICOSECONDS: u8 = 0x10;
    pub const HAS_SERVER_PICOSECONDS: u8 = 0x20;

    /// Good value without timestamps
    pub fn new(value: impl Into<Variant>) -> Self {
        Self {
            value: Some(value.into()),
            ..Default::default()
        }
    }

    /// Status of the value; absent means Good
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::GOOD)
    }

    /// Encoding mask for the fields that are present
    pub fn encoding_mask(&self) -> u8 {
        let mut mask = 0;
        if self.value.is_some() {
            mask |= Self::HAS_VALUE;
        }
        if self.status.is_some() {
            mask |= Self::HAS_STATUS;
        }
        if self.source_timestamp.is_some() {
            mask |= Self::HAS_SOURCE_TIMESTAMP;
        }
        if self.server_timestamp.is_some() {
            mask |= Self::HAS_SERVER_TIMESTAMP;
        }
        if self.source_picoseconds.is_some() {
            mask |= Self::HAS_SOURCE_PICOSECONDS;
        }
        if self.server_picoseconds.is_some() {
            mask |= Self::HAS_SERVER_PICOSECONDS;
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_type_validation() {
        let ok = VariantArray::new(VariantTypeId::Int32, vec![Variant::Int32(1), Variant::Int32(2)]);
        assert!(ok.is_ok());
        let mixed = VariantArray::new(VariantTypeId::Int32, vec![Variant::Int32(1), Variant::Boolean(true)]);
        assert!(mixed.is_err());
    }

    #[test]
    fn test_multi_dimension_validation() {
        let values = (0..6).map(Variant::Int32).collect::<Vec<_>>();
        assert!(VariantArray::new_multi(VariantTypeId::Int32, values.clone(), vec![2, 3]).is_ok());
        assert!(VariantArray::new_multi(VariantTypeId::Int32, values, vec![4, 2]).is_err());
    }

    #[test]
    fn test_data_value_mask() {
        let mut dv = DataValue::new(42i32);
        assert_eq!(dv.encoding_mask(), DataValue::HAS_VALUE);
        dv.server_timestamp = Some(DateTime::now());
        assert_eq!(dv.encoding_mask(), DataValue::HAS_VALUE | DataValue::HAS_SERVER_TIMESTAMP);
        assert_eq!(dv.status(), StatusCode::GOOD);
    }
}
