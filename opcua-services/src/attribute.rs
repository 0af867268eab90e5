//! Read service

use crate::enums::TimestampsToReturn;
use crate::header::{RequestHeader, ResponseHeader};
use crate::service::impl_service;
use opcua_binary::{impl_encodable_struct, impl_structure};
use opcua_core::{DataValue, DiagnosticInfo, NodeId, QualifiedName, UaString};

/// Attribute id of the Value attribute
pub const VALUE_ATTRIBUTE_ID: u32 = 13;

/// Node and attribute to read or monitor
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadValueId {
    pub node_id: NodeId,
    pub attribute_id: u32,
    pub index_range: UaString,
    pub data_encoding: QualifiedName,
}

impl_encodable_struct!(ReadValueId {
    node_id,
    attribute_id,
    index_range,
    data_encoding,
});
impl_structure!(ReadValueId, 626, 628);

impl ReadValueId {
    /// The Value attribute of `node_id`
    pub fn value_of(node_id: NodeId) -> Self {
        Self {
            node_id,
            attribute_id: VALUE_ATTRIBUTE_ID,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadRequest {
    pub request_header: RequestHeader,
    /// Maximum age of cached values in milliseconds
    pub max_age: f64,
    pub timestamps_to_return: TimestampsToReturn,
    pub nodes_to_read: Vec<ReadValueId>,
}

impl_encodable_struct!(ReadRequest {
    request_header,
    max_age,
    timestamps_to_return,
    nodes_to_read,
});
impl_structure!(ReadRequest, 629, 631);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<DataValue>,
    pub diagnostic_infos: Vec<DiagnosticInfo>,
}

impl_encodable_struct!(ReadResponse {
    response_header,
    results,
    diagnostic_infos,
});
impl_structure!(ReadResponse, 632, 634);
impl_service!(ReadRequest => ReadResponse);
