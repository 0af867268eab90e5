//! Enumerations used by service messages
//!
//! OPC UA enumerations are encoded as `Int32` on the wire.

use opcua_binary::{BinaryDecoder, BinaryEncodable, BinaryEncoder};
use opcua_core::{UaError, UaResult};

macro_rules! ua_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $name {
            pub fn from_i32(value: i32) -> UaResult<Self> {
                match value {
                    $($value => Ok($name::$variant),)+
                    _ => Err(UaError::decoding(format!(
                        "Invalid {} value {}",
                        stringify!($name),
                        value
                    ))),
                }
            }
        }

        impl BinaryEncodable for $name {
            fn encode(&self, encoder: &mut BinaryEncoder) -> UaResult<()> {
                encoder.write_i32(*self as i32);
                Ok(())
            }

            fn decode(decoder: &mut BinaryDecoder<'_>) -> UaResult<Self> {
                Self::from_i32(decoder.read_i32()?)
            }
        }
    };
}

ua_enum!(
    /// Whether OpenSecureChannel issues a new token or renews one
    SecurityTokenRequestType {
        Issue = 0,
        Renew = 1,
    }
);

ua_enum!(
    /// Message security mode as carried in service messages
    SecurityMode {
        Invalid = 0,
        None = 1,
        Sign = 2,
        SignAndEncrypt = 3,
    }
);

ua_enum!(ApplicationType {
    Server = 0,
    Client = 1,
    ClientAndServer = 2,
    DiscoveryServer = 3,
});

ua_enum!(
    /// Kind of user identity token a policy accepts
    UserTokenType {
        Anonymous = 0,
        UserName = 1,
        Certificate = 2,
        IssuedToken = 3,
    }
);

ua_enum!(TimestampsToReturn {
    Source = 0,
    Server = 1,
    Both = 2,
    Neither = 3,
    Invalid = 4,
});

ua_enum!(MonitoringMode {
    Disabled = 0,
    Sampling = 1,
    Reporting = 2,
});

impl Default for TimestampsToReturn {
    fn default() -> Self {
        TimestampsToReturn::Both
    }
}

impl Default for MonitoringMode {
    fn default() -> Self {
        MonitoringMode::Reporting
    }
}

impl SecurityMode {
    pub fn id(&self) -> u32 {
        *self as u32
    }
}
