//! Notification structures carried in NotificationMessages

use crate::identity::{AnonymousIdentityToken, UserNameIdentityToken, X509IdentityToken};
use crate::subscription::NotificationMessage;
use opcua_binary::{impl_encodable_struct, impl_structure, ExtensionObjectExt, TypeRegistry};
use opcua_core::{DataValue, DiagnosticInfo, ExtensionObject, StatusCode, UaResult, Variant};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonitoredItemNotification {
    pub client_handle: u32,
    pub value: DataValue,
}

impl_encodable_struct!(MonitoredItemNotification { client_handle, value });

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataChangeNotification {
    pub monitored_items: Vec<MonitoredItemNotification>,
    pub diagnostic_infos: Vec<DiagnosticInfo>,
}

impl_encodable_struct!(DataChangeNotification {
    monitored_items,
    diagnostic_infos,
});
impl_structure!(DataChangeNotification, 809, 811);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventFieldList {
    pub client_handle: u32,
    pub event_fields: Vec<Variant>,
}

impl_encodable_struct!(EventFieldList {
    client_handle,
    event_fields,
});

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventNotificationList {
    pub events: Vec<EventFieldList>,
}

impl_encodable_struct!(EventNotificationList { events });
impl_structure!(EventNotificationList, 914, 916);

/// Change of the subscription's state reported by the server
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusChangeNotification {
    pub status: StatusCode,
    pub diagnostic_info: DiagnosticInfo,
}

impl_encodable_struct!(StatusChangeNotification {
    status,
    diagnostic_info,
});
impl_structure!(StatusChangeNotification, 818, 820);

/// Decoded entry of a NotificationMessage
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    DataChange(DataChangeNotification),
    Events(EventNotificationList),
    StatusChange(StatusChangeNotification),
    /// Notification type this client does not know
    Other(ExtensionObject),
}

impl Notification {
    /// Decode one notification through `registry`
    pub fn decode(eo: &ExtensionObject, registry: &TypeRegistry) -> UaResult<Self> {
        let decoded = registry.decode(eo)?;
        if let Some(value) = decoded.downcast_ref::<DataChangeNotification>() {
            return Ok(Notification::DataChange(value.clone()));
        }
        if let Some(value) = decoded.downcast_ref::<EventNotificationList>() {
            return Ok(Notification::Events(value.clone()));
        }
        if let Some(value) = decoded.downcast_ref::<StatusChangeNotification>() {
            return Ok(Notification::StatusChange(value.clone()));
        }
        Ok(Notification::Other(decoded.into_extension_object()?))
    }

    /// Decode every notification of `message`
    pub fn decode_all(message: &NotificationMessage, registry: &TypeRegistry) -> UaResult<Vec<Self>> {
        message
            .notification_data
            .iter()
            .map(|eo| Self::decode(eo, registry))
            .collect()
    }
}

impl NotificationMessage {
    /// Data change notification message
    pub fn data_change(sequence_number: u32, items: Vec<MonitoredItemNotification>) -> UaResult<Self> {
        let data = DataChangeNotification {
            monitored_items: items,
            diagnostic_infos: Vec::new(),
        };
        Ok(Self {
            sequence_number,
            publish_time: opcua_core::DateTime::now(),
            notification_data: vec![ExtensionObject::from_structure(&data)?],
        })
    }

    /// Status change notification message
    pub fn status_change(sequence_number: u32, status: StatusCode) -> UaResult<Self> {
        let data = StatusChangeNotification {
            status,
            diagnostic_info: DiagnosticInfo::default(),
        };
        Ok(Self {
            sequence_number,
            publish_time: opcua_core::DateTime::now(),
            notification_data: vec![ExtensionObject::from_structure(&data)?],
        })
    }
}

/// Register the notification and identity token structures
pub fn register_service_types(registry: &mut TypeRegistry) {
    registry
        .register::<DataChangeNotification>()
        .register::<EventNotificationList>()
        .register::<StatusChangeNotification>()
        .register::<AnonymousIdentityToken>()
        .register::<UserNameIdentityToken>()
        .register::<X509IdentityToken>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcua_binary::Structure;
    use opcua_core::NodeId;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        register_service_types(&mut registry);
        registry
    }

    #[test]
    fn test_decode_data_change() {
        let message = NotificationMessage::data_change(
            4,
            vec![MonitoredItemNotification {
                client_handle: 1,
                value: DataValue::new(Variant::Double(21.5)),
            }],
        )
        .unwrap();
        let notifications = Notification::decode_all(&message, &registry()).unwrap();
        match &notifications[..] {
            [Notification::DataChange(change)] => {
                assert_eq!(change.monitored_items[0].client_handle, 1);
                assert_eq!(change.monitored_items[0].value.value, Some(Variant::Double(21.5)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_status_change_and_unknown() {
        let mut message = NotificationMessage::status_change(2, StatusCode::BAD_TIMEOUT).unwrap();
        let unknown = ExtensionObject::from_binary(NodeId::numeric(3, 9000), vec![1, 2, 3]);
        message.notification_data.push(unknown.clone());
        let notifications = Notification::decode_all(&message, &registry()).unwrap();
        assert!(matches!(&notifications[0], Notification::StatusChange(s) if s.status == StatusCode::BAD_TIMEOUT));
        assert_eq!(notifications[1], Notification::Other(unknown));
        assert!(!message.is_keep_alive());
        assert_eq!(DataChangeNotification::BINARY_ENCODING_ID, NodeId::numeric(0, 811));
    }
}
