//! ExtensionObject container
//!
//! An extension object carries a structure identified by its binary encoding
//! NodeId. At this level the body is kept as raw bytes; typed access goes
//! through the codec's type registry.

use crate::datatypes::node_id::NodeId;
use crate::datatypes::string::{ByteString, UaString};

/// Body of an extension object
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExtensionObjectBody {
    /// No body (encoding byte 0x00)
    #[default]
    None,
    /// Binary encoded body (encoding byte 0x01)
    Binary(ByteString),
    /// XML encoded body (encoding byte 0x02)
    Xml(UaString),
}

/// Structure wrapped with its encoding id
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtensionObject {
    pub node_id: NodeId,
    pub body: ExtensionObjectBody,
}

impl ExtensionObject {
    /// The null extension object
    pub fn null() -> Self {
        Self::default()
    }

    /// Extension object with an already encoded binary body
    pub fn from_binary(node_id: NodeId, body: Vec<u8>) -> Self {
        Self {
            node_id,
            body: ExtensionObjectBody::Binary(ByteString::from(body)),
        }
    }

    pub fn is_null(&self) -> bool {
        self.node_id.is_null() && self.body == ExtensionObjectBody::None
    }

    /// Raw binary body, if the body is binary encoded
    pub fn binary_body(&self) -> Option<&[u8]> {
        match &self.body {
            ExtensionObjectBody::Binary(b) => b.as_bytes(),
            _ => None,
        }
    }
}
