//! Minimal HTTP/1.1 request parsing and response serialization
//!
//! Only what a static GET server needs: the request line is parsed, headers
//! are skipped, and every response closes the connection.

use bytes::Bytes;
use nom::{
    bytes::complete::{tag, take_until},
    sequence::terminated,
    IResult,
};

use crate::error::RequestError;

/// Maximum request head size (8 KB)
pub const MAX_REQUEST_BYTES: usize = 8192;

/// Document served for `/`
pub const DEFAULT_DOCUMENT: &str = "/index.html";

/// Parsed request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Request method, e.g. `GET`
    pub method: String,
    /// Request target as sent
    pub target: String,
    /// Protocol version, e.g. `HTTP/1.1`
    pub version: String,
}

fn request_line(input: &[u8]) -> IResult<&[u8], &[u8]> {
    terminated(take_until("\r\n"), tag("\r\n"))(input)
}

fn header_terminator(input: &[u8]) -> IResult<&[u8], &[u8]> {
    terminated(take_until("\r\n\r\n"), tag("\r\n\r\n"))(input)
}

/// Check whether the buffer holds a complete request head
pub fn header_complete(buf: &[u8]) -> bool {
    header_terminator(buf).is_ok()
}

/// Parse the request line out of a raw request head
pub fn parse_request(buf: &[u8]) -> Result<Request, RequestError> {
    if buf.is_empty() {
        return Err(RequestError::Empty);
    }
    if buf.len() > MAX_REQUEST_BYTES {
        return Err(RequestError::TooLarge(buf.len()));
    }

    let (_, line) = request_line(buf).map_err(|_| RequestError::MissingLineTerminator)?;
    let line = std::str::from_utf8(line).map_err(|_| RequestError::InvalidEncoding)?;

    let mut tokens = line.split_whitespace();
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(method), Some(target), Some(version)) => Ok(Request {
            method: method.to_string(),
            target: target.to_string(),
            version: version.to_string(),
        }),
        _ => Err(RequestError::MalformedRequestLine),
    }
}

/// Turn a parsed request into the document path to serve
///
/// Rejects non-GET methods, strips an absolute-URI scheme and authority,
/// drops the query and fragment, refuses paths containing `..`, and maps `/`
/// to the default document.
pub fn resolve_path(request: &Request) -> Result<String, RequestError> {
    if request.method != "GET" {
        return Err(RequestError::MethodNotAllowed);
    }

    let path = strip_authority(&request.target);
    let path = match path.find(|c: char| c == '?' || c == '#') {
        Some(end) => &path[..end],
        None => path,
    };

    if path.is_empty() || !path.starts_with('/') || path.contains("..") {
        return Err(RequestError::UnsafePath);
    }

    if path == "/" {
        Ok(DEFAULT_DOCUMENT.to_string())
    } else {
        Ok(path.to_string())
    }
}

fn strip_authority(target: &str) -> &str {
    let rest = target
        .strip_prefix("http://")
        .or_else(|| target.strip_prefix("https://"));

    match rest {
        Some(authority) => match authority.find('/') {
            Some(start) => &authority[start..],
            None => "/",
        },
        None => target,
    }
}

/// Infer a MIME type from the file extension
pub fn content_type(path: &str) -> &'static str {
    const TYPES: &[(&str, &str)] = &[
        (".html", "text/html"),
        (".css", "text/css"),
        (".js", "application/javascript"),
        (".png", "image/png"),
        (".jpg", "image/jpeg"),
        (".jpeg", "image/jpeg"),
        (".gif", "image/gif"),
        (".svg", "image/svg+xml"),
        (".ico", "image/x-icon"),
    ];

    TYPES
        .iter()
        .find(|(ext, _)| path.ends_with(*ext))
        .map(|(_, mime)| *mime)
        .unwrap_or("application/octet-stream")
}

/// Reason phrase for a status code
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Internal Server Error",
    }
}

/// HTTP response with a fully buffered body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code
    pub status: u16,
    /// `Content-Type` header value
    pub content_type: &'static str,
    /// Response body
    pub body: Bytes,
}

impl Response {
    /// 200 with the given body
    pub fn ok(content_type: &'static str, body: Bytes) -> Self {
        Self {
            status: 200,
            content_type,
            body,
        }
    }

    /// 400 explaining why the request was refused
    pub fn bad_request(err: RequestError) -> Self {
        let message = match err {
            RequestError::MethodNotAllowed => "Only GET supported",
            _ => "Bad Request",
        };
        Self::text(400, message)
    }

    /// 404
    pub fn not_found() -> Self {
        Self::text(404, "Not Found")
    }

    fn text(status: u16, message: &'static str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: Bytes::from_static(message.as_bytes()),
        }
    }

    /// Serialize status line, headers and body
    pub fn serialize(&self) -> Vec<u8> {
        let head = format!(
            "HTTP/1.1 {} {}\r\n\
             Content-Type: {}\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n",
            self.status,
            reason_phrase(self.status),
            self.content_type,
            self.body.len(),
        );

        let mut result = Vec::with_capacity(head.len() + self.body.len());
        result.extend_from_slice(head.as_bytes());
        result.extend_from_slice(&self.body);
        result
    }
}
