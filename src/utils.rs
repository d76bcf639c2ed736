use crate::types::{Header, ProtocolError, Target};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

pub const USER_AGENT: &str = "riph3/0.1.0";
pub const HTTP_VERSION_3_0: &str = "HTTP/3.0";
pub const HOST_HEADER: &str = "host";
pub const CONTENT_LENGTH_HEADER: &str = "content-length";
pub const USER_AGENT_HEADER: &str = "user-agent";
pub const COOKIE_HEADER: &str = "cookie";
pub const TE_HEADER: &str = "te";

/// Hop-by-hop fields that have no meaning in HTTP/3 (RFC 9114 §4.2).
pub const CONNECTION_SPECIFIC_HEADERS: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
];

/// Fields sent with the QPACK never-indexed bit.
pub const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "proxy-authorization", "set-cookie"];

pub fn parse_target(target: &str) -> Result<Target, ProtocolError> {
    let url = Url::parse(target)
        .map_err(|e| ProtocolError::InvalidTarget(format!("{} ({})", target, e)))?;

    if url.host_str().is_none() {
        return Err(ProtocolError::InvalidTarget(format!(
            "Target '{}' is missing a host",
            target
        )));
    }

    if url.port_or_known_default().is_none() {
        return Err(ProtocolError::InvalidTarget(format!(
            "Target '{}' has no known port",
            target
        )));
    }

    Ok(Target::new(url))
}

pub fn header_value<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

pub fn is_connection_specific(name: &str) -> bool {
    CONNECTION_SPECIFIC_HEADERS
        .iter()
        .any(|h| name.eq_ignore_ascii_case(h))
}

pub async fn timeout_result<F, T>(duration: Option<Duration>, future: F) -> Result<T, ProtocolError>
where
    F: Future<Output = Result<T, ProtocolError>>,
{
    if let Some(dur) = duration {
        match timeout(dur, future).await {
            Ok(result) => result,
            Err(_) => Err(ProtocolError::Timeout),
        }
    } else {
        future.await
    }
}
