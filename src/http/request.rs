use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::http::headers::Headers;

/// HTTP request methods.
///
/// The set is closed: the parser rejects any request whose method token is
/// not listed here. Besides the RFC 7231 methods it covers the WebDAV,
/// subversion, UPnP, CalDAV and icecast extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    DELETE,
    GET,
    HEAD,
    POST,
    PUT,
    // pathological
    CONNECT,
    OPTIONS,
    TRACE,
    // WebDAV
    COPY,
    LOCK,
    MKCOL,
    MOVE,
    PROPFIND,
    PROPPATCH,
    SEARCH,
    UNLOCK,
    BIND,
    REBIND,
    UNBIND,
    ACL,
    // subversion
    REPORT,
    MKACTIVITY,
    CHECKOUT,
    MERGE,
    // upnp
    MSEARCH,
    NOTIFY,
    SUBSCRIBE,
    UNSUBSCRIBE,
    // RFC 5789
    PATCH,
    PURGE,
    // CalDAV
    MKCALENDAR,
    // RFC 2068
    LINK,
    UNLINK,
    // icecast
    SOURCE,
}

impl Method {
    /// Every recognized method, in wire-table order.
    pub const ALL: [Method; 34] = [
        Method::DELETE,
        Method::GET,
        Method::HEAD,
        Method::POST,
        Method::PUT,
        Method::CONNECT,
        Method::OPTIONS,
        Method::TRACE,
        Method::COPY,
        Method::LOCK,
        Method::MKCOL,
        Method::MOVE,
        Method::PROPFIND,
        Method::PROPPATCH,
        Method::SEARCH,
        Method::UNLOCK,
        Method::BIND,
        Method::REBIND,
        Method::UNBIND,
        Method::ACL,
        Method::REPORT,
        Method::MKACTIVITY,
        Method::CHECKOUT,
        Method::MERGE,
        Method::MSEARCH,
        Method::NOTIFY,
        Method::SUBSCRIBE,
        Method::UNSUBSCRIBE,
        Method::PATCH,
        Method::PURGE,
        Method::MKCALENDAR,
        Method::LINK,
        Method::UNLINK,
        Method::SOURCE,
    ];

    /// Parses an HTTP method token.
    ///
    /// Method tokens are case-sensitive.
    ///
    /// # Example
    ///
    /// ```
    /// # use peerhttp::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("M-SEARCH"), Some(Method::MSEARCH));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    pub fn from_str(s: &str) -> Option<Self> {
        Method::ALL.iter().copied().find(|m| m.as_str() == s)
    }

    /// The method token as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::DELETE => "DELETE",
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::CONNECT => "CONNECT",
            Method::OPTIONS => "OPTIONS",
            Method::TRACE => "TRACE",
            Method::COPY => "COPY",
            Method::LOCK => "LOCK",
            Method::MKCOL => "MKCOL",
            Method::MOVE => "MOVE",
            Method::PROPFIND => "PROPFIND",
            Method::PROPPATCH => "PROPPATCH",
            Method::SEARCH => "SEARCH",
            Method::UNLOCK => "UNLOCK",
            Method::BIND => "BIND",
            Method::REBIND => "REBIND",
            Method::UNBIND => "UNBIND",
            Method::ACL => "ACL",
            Method::REPORT => "REPORT",
            Method::MKACTIVITY => "MKACTIVITY",
            Method::CHECKOUT => "CHECKOUT",
            Method::MERGE => "MERGE",
            Method::MSEARCH => "M-SEARCH",
            Method::NOTIFY => "NOTIFY",
            Method::SUBSCRIBE => "SUBSCRIBE",
            Method::UNSUBSCRIBE => "UNSUBSCRIBE",
            Method::PATCH => "PATCH",
            Method::PURGE => "PURGE",
            Method::MKCALENDAR => "MKCALENDAR",
            Method::LINK => "LINK",
            Method::UNLINK => "UNLINK",
            Method::SOURCE => "SOURCE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol version of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Version {
    Http10,
    #[default]
    Http11,
}

impl Version {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "HTTP/1.0" => Some(Version::Http10),
            "HTTP/1.1" => Some(Version::Http11),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a message with this version and headers allows connection reuse.
///
/// HTTP/1.1 is persistent unless `Connection: close` is present; HTTP/1.0
/// only when `Connection: keep-alive` is.
pub fn wants_keep_alive(version: Version, headers: &Headers) -> bool {
    let mut close = false;
    let mut keep_alive = false;

    for value in headers.get_all("Connection") {
        for token in value.split(',').map(str::trim) {
            if token.eq_ignore_ascii_case("close") {
                close = true;
            } else if token.eq_ignore_ascii_case("keep-alive") {
                keep_alive = true;
            }
        }
    }

    match version {
        Version::Http11 => !close,
        Version::Http10 => keep_alive && !close,
    }
}

/// A parsed HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The request target as sent (e.g. "/", "/search?q=rust")
    pub path: String,
    pub version: Version,
    /// Request headers in the order received
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Builder for constructing Request objects.
#[derive(Debug, Default)]
pub struct RequestBuilder {
    method: Option<Method>,
    path: Option<String>,
    version: Option<Version>,
    headers: Headers,
    body: Vec<u8>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(key, value);
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        Ok(Request {
            method: self.method.ok_or("method missing")?,
            path: self.path.ok_or("path missing")?,
            version: self.version.unwrap_or_default(),
            headers: self.headers,
            body: self.body,
        })
    }
}

impl Request {
    /// Retrieves a header value by name, ignoring case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    /// Determines whether the connection should remain open after the response.
    pub fn keep_alive(&self) -> bool {
        wants_keep_alive(self.version, &self.headers)
    }

    /// The body as UTF-8, if it is valid UTF-8.
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Decodes `Authorization: Basic` credentials into `(user, pass)`.
    ///
    /// Returns `None` when the header is missing, uses another scheme, or is
    /// not valid base64/UTF-8. A missing `:` yields an empty password.
    pub fn basic_auth(&self) -> Option<(String, String)> {
        let value = self.header("Authorization")?.trim();
        let (scheme, token) = value.split_once(' ')?;

        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }

        let decoded = STANDARD.decode(token.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;

        match decoded.split_once(':') {
            Some((user, pass)) => Some((user.to_string(), pass.to_string())),
            None => Some((decoded, String::new())),
        }
    }
}
