//! HTTP request/response types.

use crate::url::PageLocation;
use rl_core::LayoutError;
use rl_core::LayoutResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
}

impl HttpVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http10 => "HTTP/1.0",
            Self::Http11 => "HTTP/1.1",
        }
    }
}

/// Single HTTP header with validated wire-safe name/value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: &str, value: &str) -> LayoutResult<Self> {
        if name.is_empty() || !name.bytes().all(is_token_char) {
            return Err(LayoutError::new(
                "net.http.header_name_invalid",
                format!("invalid HTTP header name `{name}`"),
            ));
        }

        if value.bytes().any(|byte| matches!(byte, b'\r' | b'\n' | 0)) {
            return Err(LayoutError::new(
                "net.http.header_value_invalid",
                format!("invalid characters found in HTTP header `{name}`"),
            ));
        }

        Ok(Self {
            name: name.to_owned(),
            value: value.to_owned(),
        })
    }
}

/// Outgoing GET request. Layout fetches never carry a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: PageLocation,
    pub headers: Vec<Header>,
}

impl HttpRequest {
    /// A `GET` with `Host` and `Connection: close` already set.
    pub fn get(url: PageLocation) -> LayoutResult<Self> {
        let headers = vec![
            Header::new("Host", &url.authority())?,
            Header::new("Connection", "close")?,
        ];
        Ok(Self { url, headers })
    }

    pub fn with_header(mut self, name: &str, value: &str) -> LayoutResult<Self> {
        if self.header(name).is_some() {
            return Err(LayoutError::new(
                "net.http.duplicate_header",
                format!("header `{name}` must appear at most once"),
            ));
        }
        self.headers.push(Header::new(name, value)?);
        Ok(self)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoded = format!(
            "GET {} {}\r\n",
            self.url.request_target(),
            HttpVersion::Http11.as_str()
        );
        for header in &self.headers {
            encoded.push_str(&header.name);
            encoded.push_str(": ");
            encoded.push_str(&header.value);
            encoded.push_str("\r\n");
        }
        encoded.push_str("\r\n");
        encoded.into_bytes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HttpStatusCode(u16);

impl HttpStatusCode {
    pub fn new(code: u16) -> LayoutResult<Self> {
        if (100..=599).contains(&code) {
            return Ok(Self(code));
        }

        Err(LayoutError::new(
            "net.http.status_invalid",
            format!("status code must be 100-599, got `{code}`"),
        ))
    }

    pub fn as_u16(self) -> u16 {
        self.0
    }

    pub fn allows_body(self) -> bool {
        !((100..200).contains(&self.0) || self.0 == 204 || self.0 == 304)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub version: HttpVersion,
    pub status: HttpStatusCode,
    pub headers: Vec<Header>,
    /// Body after transfer and content decoding.
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

pub(crate) fn find_header<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case(name))
        .map(|header| header.value.as_str())
}

pub(crate) fn header_contains(headers: &[Header], name: &str, value: &str) -> bool {
    headers.iter().any(|header| {
        header.name.eq_ignore_ascii_case(name)
            && header
                .value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case(value))
    })
}

fn is_token_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}
