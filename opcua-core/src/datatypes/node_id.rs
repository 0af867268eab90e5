//! NodeId and ExpandedNodeId
//!
//! Supports the standard string notation, e.g. `i=2258`, `ns=2;s=Demo.Static`,
//! `ns=1;g=72962B91-FA75-4AE6-8D28-B404DC7DAF63` and `ns=3;b=010203`. Opaque
//! identifiers are written as lowercase hex.

use crate::datatypes::guid::Guid;
use crate::datatypes::string::{ByteString, UaString};
use crate::error::{UaError, UaResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

static NODE_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:ns=(?P<ns>\d+);)?(?P<kind>[isgb])=(?P<id>.+)$").expect("valid NodeId pattern")
});

/// Identifier part of a NodeId
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Numeric(u32),
    String(UaString),
    Guid(Guid),
    ByteString(ByteString),
}

/// OPC UA NodeId
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub namespace: u16,
    pub identifier: Identifier,
}

impl NodeId {
    /// The null NodeId (`i=0`)
    pub const fn null() -> Self {
        Self {
            namespace: 0,
            identifier: Identifier::Numeric(0),
        }
    }

    /// Numeric NodeId
    pub const fn numeric(namespace: u16, value: u32) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(value),
        }
    }

    /// String NodeId
    pub fn string(namespace: u16, value: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(UaString::from(value.into())),
        }
    }

    /// Guid NodeId
    pub const fn guid(namespace: u16, value: Guid) -> Self {
        Self {
            namespace,
            identifier: Identifier::Guid(value),
        }
    }

    /// Opaque NodeId
    pub fn opaque(namespace: u16, value: Vec<u8>) -> Self {
        Self {
            namespace,
            identifier: Identifier::ByteString(ByteString::from(value)),
        }
    }

    /// Whether this is the null NodeId
    pub fn is_null(&self) -> bool {
        self.namespace == 0 && self.identifier == Identifier::Numeric(0)
    }

    /// The numeric identifier in namespace 0, if that is what this is
    pub fn as_ns0_numeric(&self) -> Option<u32> {
        match (&self.identifier, self.namespace) {
            (Identifier::Numeric(v), 0) => Some(*v),
            _ => None,
        }
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace != 0 {
            write!(f, "ns={};", self.namespace)?;
        }
        match &self.identifier {
            Identifier::Numeric(v) => write!(f, "i={}", v),
            Identifier::String(s) => write!(f, "s={}", s),
            Identifier::Guid(g) => write!(f, "g={}", g),
            Identifier::ByteString(b) => {
                write!(f, "b=")?;
                for byte in b.as_slice() {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for NodeId {
    type Err = UaError;

    fn from_str(s: &str) -> UaResult<Self> {
        let invalid = || UaError::InvalidData(format!("Invalid NodeId: {}", s));
        let caps = NODE_ID_PATTERN.captures(s).ok_or_else(invalid)?;
        let namespace = match caps.name("ns") {
            Some(ns) => ns.as_str().parse::<u16>().map_err(|_| invalid())?,
            None => 0,
        };
        let id = &caps["id"];
        let identifier = match &caps["kind"] {
            "i" => Identifier::Numeric(id.parse::<u32>().map_err(|_| invalid())?),
            "s" => Identifier::String(UaString::from(id)),
            "g" => Identifier::Guid(id.parse::<Guid>()?),
            _ => {
                if id.len() % 2 != 0 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(invalid());
                }
                let bytes = (0..id.len())
                    .step_by(2)
                    .map(|i| u8::from_str_radix(&id[i..i + 2], 16).map_err(|_| invalid()))
                    .collect::<UaResult<Vec<u8>>>()?;
                Identifier::ByteString(ByteString::from(bytes))
            }
        };
        Ok(Self {
            namespace,
            identifier,
        })
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        NodeId::numeric(0, value)
    }
}

/// NodeId that may carry a namespace URI and server index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ExpandedNodeId {
    pub node_id: NodeId,
    pub namespace_uri: UaString,
    pub server_index: u32,
}

impl ExpandedNodeId {
    /// Expanded id in the local server with no namespace URI
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            namespace_uri: UaString::null(),
            server_index: 0,
        }
    }
}

impl From<NodeId> for ExpandedNodeId {
    fn from(node_id: NodeId) -> Self {
        Self::new(node_id)
    }
}
