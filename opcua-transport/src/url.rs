//! `opc.tcp://` endpoint URLs

use once_cell::sync::Lazy;
use opcua_core::{StatusCode, UaError, UaResult};
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// Default port of the UA-TCP protocol
pub const DEFAULT_PORT: u16 = 4840;

static ENDPOINT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i:opc\.tcp)://(?P<host>\[[0-9A-Fa-f:.]+\]|[^:/\[\]]+)(?::(?P<port>\d+))?(?P<path>/.*)?$")
        .expect("valid endpoint URL pattern")
});

/// Parsed `opc.tcp://host[:port][/path]` URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointUrl {
    host: String,
    port: u16,
    path: String,
}

impl EndpointUrl {
    /// Parse an endpoint URL
    ///
    /// # Errors
    /// Returns `BadTcpEndpointUrlInvalid` when the scheme is not `opc.tcp`, the
    /// host is missing or the port is not a valid `u16`.
    pub fn parse(url: &str) -> UaResult<Self> {
        let invalid = || {
            UaError::protocol(
                StatusCode::BAD_TCP_ENDPOINT_URL_INVALID,
                format!("Invalid endpoint URL: {}", url),
            )
        };
        let caps = ENDPOINT_PATTERN.captures(url.trim()).ok_or_else(invalid)?;
        let host = caps["host"].trim_start_matches('[').trim_end_matches(']').to_string();
        let port = match caps.name("port") {
            Some(port) => port.as_str().parse::<u16>().map_err(|_| invalid())?,
            None => DEFAULT_PORT,
        };
        if port == 0 {
            return Err(invalid());
        }
        let path = caps.name("path").map(|p| p.as_str().to_string()).unwrap_or_default();
        Ok(Self { host, port, path })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path component including the leading slash, empty if absent
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `host:port` string suitable for socket resolution
    pub fn socket_address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for EndpointUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "opc.tcp://{}{}", self.socket_address(), self.path)
    }
}

impl FromStr for EndpointUrl {
    type Err = UaError;

    fn from_str(s: &str) -> UaResult<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_port_and_path() {
        let url = EndpointUrl::parse("opc.tcp://plc-01.local:48010/UA/Server").unwrap();
        assert_eq!(url.host(), "plc-01.local");
        assert_eq!(url.port(), 48010);
        assert_eq!(url.path(), "/UA/Server");
        assert_eq!(url.to_string(), "opc.tcp://plc-01.local:48010/UA/Server");
    }

    #[test]
    fn test_default_port() {
        let url: EndpointUrl = "opc.tcp://10.0.0.5".parse().unwrap();
        assert_eq!(url.port(), DEFAULT_PORT);
        assert_eq!(url.socket_address(), "10.0.0.5:4840");
    }

    #[test]
    fn test_ipv6_host() {
        let url = EndpointUrl::parse("opc.tcp://[::1]:4841").unwrap();
        assert_eq!(url.host(), "::1");
        assert_eq!(url.socket_address(), "[::1]:4841");
    }

    #[test]
    fn test_invalid_urls() {
        for bad in ["http://host:4840", "opc.tcp://", "opc.tcp://host:99999", "opc.tcp://host:0"] {
            let err = EndpointUrl::parse(bad).unwrap_err();
            assert_eq!(err.status_code(), StatusCode::BAD_TCP_ENDPOINT_URL_INVALID, "{}", bad);
        }
    }
}
