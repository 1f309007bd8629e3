//! Minimal HTTP/1.1 client framing
//!
//! A request builder plus a sans-IO incremental response parser, driven by
//! [`exchange`] over any async byte stream. The same engine serves the
//! plaintext pairing endpoints and, once verify completes, the encrypted
//! session (which implements the same stream traits).

use std::collections::HashMap;
use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Well-known header names
pub mod names {
    pub const HOST: &str = "Host";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const CONTENT_LENGTH: &str = "Content-Length";
}

/// Content types used by HAP endpoints
pub mod content_types {
    /// Pairing TLV8 bodies
    pub const PAIRING_TLV8: &str = "application/pairing+tlv8";
    /// Attribute JSON bodies
    pub const HAP_JSON: &str = "application/hap+json";
}

/// HTTP request method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
}

impl Method {
    /// The wire form
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
        }
    }
}

/// Case-insensitive header collection
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: HashMap<String, String>,
}

impl Headers {
    /// Create empty headers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any same-named one
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.inner.retain(|k, _| !k.eq_ignore_ascii_case(&name));
        self.inner.insert(name, value.into());
    }

    /// Get a header value
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get Content-Length, if present and numeric
    #[must_use]
    pub fn content_length(&self) -> Option<usize> {
        self.get(names::CONTENT_LENGTH)?.trim().parse().ok()
    }

    /// Iterate over all headers
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// An HTTP/1.1 request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Request method
    pub method: Method,
    /// Path plus query, already assembled; query values are emitted as-is
    /// (HAP accessories require raw commas in `id` lists)
    pub path: String,
    /// Request headers
    pub headers: Headers,
    /// Request body (may be empty)
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Create a request
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Set a header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the body and its content type
    #[must_use]
    pub fn body(mut self, content_type: &str, body: Vec<u8>) -> Self {
        self.headers.insert(names::CONTENT_TYPE, content_type);
        self.body = body;
        self
    }

    /// Encode for transmission
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(128 + self.body.len());

        output.extend_from_slice(self.method.as_str().as_bytes());
        output.push(b' ');
        output.extend_from_slice(self.path.as_bytes());
        output.extend_from_slice(b" HTTP/1.1\r\n");

        for (name, value) in self.headers.iter() {
            output.extend_from_slice(name.as_bytes());
            output.extend_from_slice(b": ");
            output.extend_from_slice(value.as_bytes());
            output.extend_from_slice(b"\r\n");
        }

        if !self.body.is_empty() {
            let len_header = format!("{}: {}\r\n", names::CONTENT_LENGTH, self.body.len());
            output.extend_from_slice(len_header.as_bytes());
        }

        output.extend_from_slice(b"\r\n");
        output.extend_from_slice(&self.body);

        output
    }
}

/// HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    pub const MULTI_STATUS: StatusCode = StatusCode(207);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const UNPROCESSABLE: StatusCode = StatusCode(422);
    pub const INTERNAL_ERROR: StatusCode = StatusCode(500);

    /// Check for a 2xx status
    #[must_use]
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.0)
    }

    /// Get as u16
    #[must_use]
    pub fn as_u16(self) -> u16 {
        self.0
    }
}

/// An HTTP/1.1 response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code
    pub status: StatusCode,
    /// Reason phrase
    pub reason: String,
    /// Response headers
    pub headers: Headers,
    /// Response body (may be empty)
    pub body: Vec<u8>,
}

/// Errors during response parsing
#[derive(Debug, Error)]
pub enum HttpCodecError {
    #[error("incomplete response: connection closed mid-message")]
    Incomplete,

    #[error("invalid status line: {0}")]
    InvalidStatusLine(String),

    #[error("invalid header line: {0}")]
    InvalidHeader(String),

    #[error("response too large: {size} bytes")]
    ResponseTooLarge { size: usize },
}

#[derive(Debug)]
enum ParseState {
    StatusLine,
    Headers {
        status: StatusCode,
        reason: String,
    },
    Body {
        status: StatusCode,
        reason: String,
        headers: Headers,
        /// None means the body runs until EOF
        content_length: Option<usize>,
    },
}

/// Sans-IO incremental HTTP response parser
///
/// Feed bytes with [`feed`](Self::feed), poll for a complete response with
/// [`decode`](Self::decode); call [`decode_eof`](Self::decode_eof) when the
/// stream ends to finalise an EOF-delimited body.
pub struct ResponseParser {
    buffer: Vec<u8>,
    max_size: usize,
    state: ParseState,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseParser {
    /// Create a parser with a 4 MiB response cap
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(1024),
            max_size: 4 * 1024 * 1024,
            state: ParseState::StatusLine,
        }
    }

    /// Feed received bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the accumulated response exceeds the cap.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), HttpCodecError> {
        if self.buffer.len() + bytes.len() > self.max_size {
            return Err(HttpCodecError::ResponseTooLarge {
                size: self.buffer.len() + bytes.len(),
            });
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Try to decode a complete response
    ///
    /// # Errors
    ///
    /// Returns an error on a malformed status line or header.
    pub fn decode(&mut self) -> Result<Option<HttpResponse>, HttpCodecError> {
        loop {
            match &self.state {
                ParseState::StatusLine => {
                    let Some(line_end) = find_crlf(&self.buffer) else {
                        return Ok(None);
                    };
                    let line = String::from_utf8_lossy(&self.buffer[..line_end]).to_string();
                    let (status, reason) = parse_status_line(&line)?;
                    self.buffer.drain(..line_end + 2);
                    self.state = ParseState::Headers { status, reason };
                }

                ParseState::Headers { status, reason } => {
                    let Some((headers, consumed)) = parse_headers(&self.buffer)? else {
                        return Ok(None);
                    };
                    let status = *status;
                    let reason = reason.clone();
                    self.buffer.drain(..consumed);

                    // 204 and 304 never carry a body
                    let content_length = if status.0 == 204 || status.0 == 304 {
                        Some(0)
                    } else {
                        headers.content_length()
                    };

                    if content_length == Some(0) {
                        self.state = ParseState::StatusLine;
                        return Ok(Some(HttpResponse {
                            status,
                            reason,
                            headers,
                            body: Vec::new(),
                        }));
                    }

                    self.state = ParseState::Body {
                        status,
                        reason,
                        headers,
                        content_length,
                    };
                }

                ParseState::Body {
                    status,
                    reason,
                    headers,
                    content_length,
                } => {
                    let Some(length) = *content_length else {
                        // EOF-delimited body: wait for decode_eof
                        return Ok(None);
                    };
                    if self.buffer.len() < length {
                        return Ok(None);
                    }

                    let body: Vec<u8> = self.buffer.drain(..length).collect();
                    let response = HttpResponse {
                        status: *status,
                        reason: reason.clone(),
                        headers: headers.clone(),
                        body,
                    };
                    self.state = ParseState::StatusLine;
                    return Ok(Some(response));
                }
            }
        }
    }

    /// Finalise at end of stream
    ///
    /// # Errors
    ///
    /// Returns [`HttpCodecError::Incomplete`] if the stream ended before a
    /// full response was received.
    pub fn decode_eof(&mut self) -> Result<HttpResponse, HttpCodecError> {
        match std::mem::replace(&mut self.state, ParseState::StatusLine) {
            ParseState::Body {
                status,
                reason,
                headers,
                content_length: None,
            } => {
                let body = std::mem::take(&mut self.buffer);
                Ok(HttpResponse {
                    status,
                    reason,
                    headers,
                    body,
                })
            }
            _ => Err(HttpCodecError::Incomplete),
        }
    }
}

fn find_crlf(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\r\n")
}

fn parse_status_line(line: &str) -> Result<(StatusCode, String), HttpCodecError> {
    let mut parts = line.splitn(3, ' ');
    let version = parts
        .next()
        .ok_or_else(|| HttpCodecError::InvalidStatusLine(line.to_string()))?;
    if !version.starts_with("HTTP/1.") {
        return Err(HttpCodecError::InvalidStatusLine(line.to_string()));
    }

    let code: u16 = parts
        .next()
        .and_then(|c| c.parse().ok())
        .ok_or_else(|| HttpCodecError::InvalidStatusLine(line.to_string()))?;
    let reason = parts.next().unwrap_or("").to_string();

    Ok((StatusCode(code), reason))
}

/// Parse header lines up to the blank line; returns headers and bytes consumed
fn parse_headers(buffer: &[u8]) -> Result<Option<(Headers, usize)>, HttpCodecError> {
    let mut headers = Headers::new();
    let mut pos = 0;

    loop {
        let Some(line_end) = find_crlf(&buffer[pos..]) else {
            return Ok(None);
        };

        if line_end == 0 {
            // Blank line terminates the header block
            return Ok(Some((headers, pos + 2)));
        }

        let line = &buffer[pos..pos + line_end];
        let line = std::str::from_utf8(line)
            .map_err(|_| HttpCodecError::InvalidHeader(String::from_utf8_lossy(line).into()))?;

        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| HttpCodecError::InvalidHeader(line.to_string()))?;
        headers.insert(name.trim(), value.trim());

        pos += line_end + 2;
    }
}

/// Which half of an exchange an I/O error interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Writing the request
    Write,
    /// Reading the response
    Read,
}

/// Errors from a request/response exchange
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("I/O error while {} the exchange: {source}", match .phase { Phase::Write => "writing", Phase::Read => "reading" })]
    Io {
        phase: Phase,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Codec(#[from] HttpCodecError),
}

impl HttpError {
    /// True when the request was fully written but the connection dropped
    /// before a complete response arrived
    ///
    /// Remove-pairing of the current controller relies on this distinction.
    #[must_use]
    pub fn is_disconnect_after_write(&self) -> bool {
        match self {
            Self::Io {
                phase: Phase::Read,
                source,
            } => matches!(
                source.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            Self::Codec(HttpCodecError::Incomplete) => true,
            _ => false,
        }
    }

    /// The underlying I/O error, if any
    #[must_use]
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Codec(_) => None,
        }
    }
}

/// Run one serialised request/response cycle over a byte stream
///
/// # Errors
///
/// Returns an error on socket failure or a malformed response. HTTP error
/// statuses are *not* errors here; callers inspect `response.status`.
pub async fn exchange<S>(stream: &mut S, request: &HttpRequest) -> Result<HttpResponse, HttpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let encoded = request.encode();
    stream.write_all(&encoded).await.map_err(|source| HttpError::Io {
        phase: Phase::Write,
        source,
    })?;
    stream.flush().await.map_err(|source| HttpError::Io {
        phase: Phase::Write,
        source,
    })?;

    let mut parser = ResponseParser::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = stream.read(&mut buf).await.map_err(|source| HttpError::Io {
            phase: Phase::Read,
            source,
        })?;

        if n == 0 {
            return Ok(parser.decode_eof()?);
        }

        parser.feed(&buf[..n])?;
        if let Some(response) = parser.decode()? {
            return Ok(response);
        }
    }
}
