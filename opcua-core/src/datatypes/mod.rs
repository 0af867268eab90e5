//! OPC UA built-in data types

pub mod date_time;
pub mod diagnostic_info;
pub mod extension_object;
pub mod guid;
pub mod node_id;
pub mod string;
pub mod text;
pub mod variant;

pub use date_time::DateTime;
pub use diagnostic_info::DiagnosticInfo;
pub use extension_object::{ExtensionObject, ExtensionObjectBody};
pub use guid::Guid;
pub use node_id::{ExpandedNodeId, Identifier, NodeId};
pub use string::{ByteString, UaString};
pub use text::{LocalizedText, QualifiedName};
pub use variant::{DataValue, Variant, VariantArray, VariantTypeId};
