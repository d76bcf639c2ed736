//! HTTP semantics on top of QPACK field sections: pseudo-header layout,
//! field validation and Content-Length handling for requests, responses and
//! trailers.

use crate::h3::consts::FIELD_LINE_OVERHEAD;
use crate::h3::framing::FrameStream;
use crate::qpack;
use crate::types::{Header, Http3Error, ProtocolError, Target};
use crate::utils::{
    is_connection_specific, CONTENT_LENGTH_HEADER, COOKIE_HEADER, HOST_HEADER, SENSITIVE_HEADERS,
    TE_HEADER, USER_AGENT_HEADER,
};
use bytes::Bytes;
use tokio::io::AsyncRead;

fn message_error(message: impl Into<String>) -> ProtocolError {
    ProtocolError::stream(Http3Error::MessageError, message)
}

fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Lowercase token, as required for HTTP/3 field names.
pub fn valid_field_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| is_tchar(b) && !b.is_ascii_uppercase())
}

pub fn valid_field_value(value: &str) -> bool {
    !value.bytes().any(|b| b == 0 || b == b'\r' || b == b'\n')
}

/// A decoded field section with pseudo-headers kept apart.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FieldSection {
    pub pseudo: Vec<Header>,
    pub fields: Vec<Header>,
}

/// Decodes the HEADERS frame `st` is positioned in and leaves the frame.
///
/// The decoded size (name + value + 32 per field) must stay within
/// `max_size`. Repeated `cookie` fields are joined with `"; "`.
pub async fn read_field_section<S>(
    st: &mut FrameStream<S>,
    max_size: u64,
) -> Result<FieldSection, ProtocolError>
where
    S: AsyncRead + Unpin,
{
    // Each encoded field line is no longer than its decoded size.
    if st.remaining() as u64 > max_size {
        return Err(ProtocolError::stream(
            Http3Error::ExcessiveLoad,
            format!("HEADERS frame of {} bytes exceeds {}", st.remaining(), max_size),
        ));
    }

    let mut section = FieldSection::default();
    let mut size = 0u64;
    let mut cookie_at: Option<usize> = None;

    qpack::decode(st, |_, name, value| {
        size += name.len() as u64 + value.len() as u64 + FIELD_LINE_OVERHEAD;
        if size > max_size {
            return Err(ProtocolError::stream(
                Http3Error::ExcessiveLoad,
                format!("field section exceeds {} bytes", max_size),
            ));
        }
        if !valid_field_value(&value) {
            return Err(message_error(format!("invalid value for field {:?}", name)));
        }

        if let Some(pseudo) = name.strip_prefix(':') {
            if !section.fields.is_empty() {
                return Err(message_error("pseudo-header after regular field"));
            }
            if !valid_field_name(pseudo) {
                return Err(message_error(format!("invalid pseudo-header {:?}", name)));
            }
            section.pseudo.push(Header::new(name, value));
            return Ok(());
        }

        if !valid_field_name(&name) {
            return Err(message_error(format!("invalid field name {:?}", name)));
        }
        if name == COOKIE_HEADER {
            if let Some(i) = cookie_at {
                let cookie = &mut section.fields[i].value;
                cookie.push_str("; ");
                cookie.push_str(&value);
                return Ok(());
            }
            cookie_at = Some(section.fields.len());
        }
        section.fields.push(Header::new(name, value));
        Ok(())
    })
    .await?;

    st.end_frame()?;
    Ok(section)
}

/// Pseudo-headers of a request, validated.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestHead {
    pub method: String,
    pub scheme: Option<String>,
    pub authority: Option<String>,
    pub path: Option<String>,
    pub headers: Vec<Header>,
}

fn set_once(slot: &mut Option<String>, header: Header) -> Result<(), ProtocolError> {
    if slot.is_some() {
        return Err(message_error(format!("duplicate {}", header.name)));
    }
    *slot = Some(header.value);
    Ok(())
}

impl FieldSection {
    /// Splits a response head into its status and regular fields.
    pub fn into_response_head(self) -> Result<(u16, Vec<Header>), ProtocolError> {
        let mut status = None;
        for header in self.pseudo {
            if header.name != ":status" {
                return Err(message_error(format!("unknown pseudo-header {}", header.name)));
            }
            set_once(&mut status, header)?;
        }
        let status = status.ok_or_else(|| message_error("missing :status"))?;
        Ok((parse_status(&status)?, self.fields))
    }

    pub fn into_request_head(self) -> Result<RequestHead, ProtocolError> {
        let mut method = None;
        let mut scheme = None;
        let mut authority = None;
        let mut path = None;
        for header in self.pseudo {
            let slot = match header.name.as_str() {
                ":method" => &mut method,
                ":scheme" => &mut scheme,
                ":authority" => &mut authority,
                ":path" => &mut path,
                other => return Err(message_error(format!("unknown pseudo-header {}", other))),
            };
            set_once(slot, header)?;
        }

        let method = method.ok_or_else(|| message_error("missing :method"))?;
        if method == "CONNECT" {
            if authority.is_none() {
                return Err(message_error("CONNECT without :authority"));
            }
            if scheme.is_some() || path.is_some() {
                return Err(message_error("CONNECT with :scheme or :path"));
            }
        } else {
            if scheme.is_none() {
                return Err(message_error("missing :scheme"));
            }
            if path.as_deref().map_or(true, str::is_empty) {
                return Err(message_error("missing :path"));
            }
        }

        Ok(RequestHead {
            method,
            scheme,
            authority,
            path,
            headers: self.fields,
        })
    }

    pub fn into_trailers(self) -> Result<Vec<Header>, ProtocolError> {
        if let Some(header) = self.pseudo.first() {
            return Err(message_error(format!("pseudo-header {} in trailers", header.name)));
        }
        Ok(self.fields)
    }
}

fn parse_status(value: &str) -> Result<u16, ProtocolError> {
    if value.len() != 3 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(message_error(format!("invalid :status {:?}", value)));
    }
    value
        .parse::<u16>()
        .ok()
        .filter(|s| *s >= 100)
        .ok_or_else(|| message_error(format!("invalid :status {:?}", value)))
}

/// The Content-Length declared by `headers`. Repeated values, whether in
/// separate fields or comma-separated, must all agree.
pub fn content_length(headers: &[Header]) -> Result<Option<u64>, ProtocolError> {
    let mut length = None;
    for header in headers.iter().filter(|h| h.name == CONTENT_LENGTH_HEADER) {
        for part in header.value.split(',') {
            let part = part.trim();
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(message_error(format!("invalid content-length {:?}", header.value)));
            }
            let value: u64 = part
                .parse()
                .map_err(|_| message_error(format!("invalid content-length {:?}", header.value)))?;
            match length {
                Some(prev) if prev != value => {
                    return Err(message_error("conflicting content-length values"))
                }
                _ => length = Some(value),
            }
        }
    }
    Ok(length)
}

/// Content-Length of a response, or `None` where the status makes it
/// meaningless (1xx, 204 and successful CONNECT).
pub fn response_content_length(
    method: &str,
    status: u16,
    headers: &[Header],
) -> Result<Option<u64>, ProtocolError> {
    let ignored = (100..200).contains(&status)
        || status == 204
        || (method == "CONNECT" && (200..300).contains(&status));
    if ignored {
        return Ok(None);
    }
    content_length(headers)
}

/// Whether a response to `method` with `status` can carry content.
pub fn response_has_body(method: &str, status: u16) -> bool {
    method != "HEAD" && status != 204 && status != 304
}

fn encode_lines(lines: &[Header]) -> (Bytes, u64) {
    let size = lines
        .iter()
        .map(|h| h.name.len() as u64 + h.value.len() as u64 + FIELD_LINE_OVERHEAD)
        .sum();
    (qpack::encode_headers(lines, SENSITIVE_HEADERS), size)
}

fn checked_field<E>(header: &Header, err: E) -> Result<Header, ProtocolError>
where
    E: Fn(String) -> ProtocolError,
{
    let mut header = header.clone();
    header.normalize();
    if !valid_field_name(&header.name) {
        return Err(err(format!("invalid field name {:?}", header.name)));
    }
    if !valid_field_value(&header.value) {
        return Err(err(format!("invalid value for field {:?}", header.name)));
    }
    Ok(header)
}

/// Regular fields that may be sent, lowercased and validated. Connection
/// specific fields are dropped, as is `content-length`, which callers add
/// from the declared body length.
fn outgoing_fields<E>(headers: &[Header], err: E) -> Result<Vec<Header>, ProtocolError>
where
    E: Fn(String) -> ProtocolError,
{
    let mut out = Vec::with_capacity(headers.len());
    for header in headers.iter().filter(|h| !h.is_pseudo()) {
        let header = checked_field(header, &err)?;
        let name = header.name.as_str();
        if name == CONTENT_LENGTH_HEADER || is_connection_specific(name) {
            continue;
        }
        if name == TE_HEADER && !header.value.trim().eq_ignore_ascii_case("trailers") {
            continue;
        }
        out.push(header);
    }
    Ok(out)
}

/// Encodes a request head. Returns the field section and its decoded size.
///
/// Pseudo-headers are emitted as `:authority :method :path :scheme`; a
/// CONNECT request carries only `:authority` and `:method`. Pseudo-headers
/// supplied in `headers` replace the computed ones.
pub fn encode_request_headers(
    method: &str,
    target: &Target,
    headers: &[Header],
    content_length: Option<u64>,
    user_agent: &str,
) -> Result<(Bytes, u64), ProtocolError> {
    let request_error = |msg: String| ProtocolError::RequestFailed(msg);
    let user_pseudo: Vec<Header> = headers
        .iter()
        .filter(|h| h.is_pseudo())
        .map(|h| checked_pseudo(h, &request_error))
        .collect::<Result<_, _>>()?;
    let supplied = |name: &str| {
        user_pseudo
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.value.clone())
    };

    let method = supplied(":method").unwrap_or_else(|| method.to_string());
    let is_connect = method.eq_ignore_ascii_case("CONNECT");
    let authority = supplied(":authority")
        .or_else(|| {
            headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(HOST_HEADER))
                .map(|h| h.value.clone())
        })
        .or_else(|| target.authority());

    let mut lines = Vec::with_capacity(headers.len() + 6);
    match authority {
        Some(authority) => lines.push(Header::new(":authority", authority)),
        None if is_connect => {
            return Err(ProtocolError::InvalidTarget(
                "CONNECT requests require an authority".to_string(),
            ))
        }
        None => {}
    }
    lines.push(Header::new(":method", method.clone()));
    if !is_connect {
        let path = supplied(":path").unwrap_or_else(|| target.path());
        let scheme = supplied(":scheme").unwrap_or_else(|| target.scheme().to_string());
        lines.push(Header::new(":path", path));
        lines.push(Header::new(":scheme", scheme));
    }
    for header in &user_pseudo {
        if !matches!(
            header.name.as_str(),
            ":authority" | ":method" | ":path" | ":scheme"
        ) {
            lines.push(header.clone());
        }
    }

    let fields = outgoing_fields(headers, request_error)?;
    let has_user_agent = fields.iter().any(|h| h.name == USER_AGENT_HEADER);
    lines.extend(fields.into_iter().filter(|h| h.name != HOST_HEADER));
    if !has_user_agent && !user_agent.is_empty() {
        lines.push(Header::new(USER_AGENT_HEADER, user_agent));
    }

    let send_length = match content_length {
        Some(0) => matches!(method.to_ascii_uppercase().as_str(), "POST" | "PUT" | "PATCH"),
        Some(_) => true,
        None => false,
    };
    if let (true, Some(length)) = (send_length, content_length) {
        lines.push(Header::new(CONTENT_LENGTH_HEADER, length.to_string()));
    }

    Ok(encode_lines(&lines))
}

fn checked_pseudo<E>(header: &Header, err: E) -> Result<Header, ProtocolError>
where
    E: Fn(String) -> ProtocolError,
{
    let mut header = header.clone();
    header.normalize();
    if !valid_field_name(&header.name[1..]) || !valid_field_value(&header.value) {
        return Err(err(format!("invalid pseudo-header {:?}", header.name)));
    }
    Ok(header)
}

fn response_error(message: String) -> ProtocolError {
    ProtocolError::stream(Http3Error::InternalError, message)
}

/// Encodes a response head. Returns the field section and its decoded size.
pub fn encode_response_headers(
    status: u16,
    headers: &[Header],
    content_length: Option<u64>,
) -> Result<(Bytes, u64), ProtocolError> {
    if !(100..1000).contains(&status) {
        return Err(response_error(format!("invalid status {}", status)));
    }
    let mut lines = vec![Header::new(":status", status.to_string())];
    lines.extend(outgoing_fields(headers, response_error)?);
    if let Some(length) = content_length {
        lines.push(Header::new(CONTENT_LENGTH_HEADER, length.to_string()));
    }
    Ok(encode_lines(&lines))
}

/// Encodes a trailer section. Pseudo-headers are not allowed in trailers.
pub fn encode_trailers(headers: &[Header]) -> Result<(Bytes, u64), ProtocolError> {
    if let Some(header) = headers.iter().find(|h| h.is_pseudo()) {
        return Err(response_error(format!("pseudo-header {} in trailers", header.name)));
    }
    let lines = headers
        .iter()
        .map(|h| checked_field(h, response_error))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(encode_lines(&lines))
}
