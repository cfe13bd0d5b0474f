//! Blocking HTTP/1.1 client used to fetch layouts.

use crate::fetch::FetchResponse;
use crate::fetch::LayoutFetcher;
use crate::http::Header;
use crate::http::HttpRequest;
use crate::http::HttpResponse;
use crate::http::HttpStatusCode;
use crate::http::HttpVersion;
use crate::http::find_header;
use crate::http::header_contains;
use crate::tls::RustlsConnector;
use crate::tls::TlsConnector;
use crate::tls::TlsPolicy;
use crate::transport::BoxedIoStream;
use crate::transport::DnsResolver;
use crate::transport::SystemDnsResolver;
use crate::transport::TcpTransport;
use crate::transport::Transport;
use crate::transport::connect_first_available;
use crate::url::PageLocation;
use brotli::Decompressor;
use encoding_rs::Encoding;
use encoding_rs::UTF_8;
use flate2::read::DeflateDecoder;
use flate2::read::GzDecoder;
use flate2::read::ZlibDecoder;
use rl_core::LayoutError;
use rl_core::LayoutResult;
use std::io::Cursor;
use std::io::Read;
use std::io::Write;
use std::time::Duration;

const MAX_RESPONSE_HEAD_BYTES: usize = 128 * 1024;
const MAX_CHUNK_LINE_BYTES: usize = 8 * 1024;
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
const MAX_REDIRECTS: usize = 20;
const ACCEPT_HEADER: &str = "text/html,*/*;q=0.8";

/// Fetches layouts over plain TCP or TLS, one connection per request.
pub struct HttpFetcher<R = SystemDnsResolver, T = TcpTransport, C = RustlsConnector>
where
    R: DnsResolver,
    T: Transport,
    C: TlsConnector,
{
    dns: R,
    transport: T,
    tls: C,
    tls_policy: TlsPolicy,
    connect_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(tls_policy: TlsPolicy) -> LayoutResult<Self> {
        Self::with_parts(SystemDnsResolver, TcpTransport, RustlsConnector, tls_policy)
    }
}

impl<R, T, C> HttpFetcher<R, T, C>
where
    R: DnsResolver,
    T: Transport,
    C: TlsConnector,
{
    pub fn with_parts(dns: R, transport: T, tls: C, tls_policy: TlsPolicy) -> LayoutResult<Self> {
        tls_policy.validate()?;
        Ok(Self {
            dns,
            transport,
            tls,
            tls_policy,
            connect_timeout: Duration::from_secs(10),
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn execute(&self, request: &HttpRequest) -> LayoutResult<HttpResponse> {
        let mut stream = self.open_stream(&request.url)?;
        stream.write_all(&request.encode()).map_err(|error| {
            LayoutError::new(
                "net.http.write_failed",
                format!("failed to write HTTP request: {error}"),
            )
        })?;
        stream.flush().map_err(|error| {
            LayoutError::new(
                "net.http.flush_failed",
                format!("failed to flush HTTP request: {error}"),
            )
        })?;

        read_response(&mut *stream)
    }

    fn open_stream(&self, url: &PageLocation) -> LayoutResult<BoxedIoStream> {
        let addresses = self.dns.resolve(url.host(), url.port())?;
        let stream = connect_first_available(&self.transport, &addresses, self.connect_timeout)?;
        if url.is_secure() {
            self.tls.connect_tls(stream, url, &self.tls_policy)
        } else {
            Ok(Box::new(stream))
        }
    }
}

impl<R, T, C> LayoutFetcher for HttpFetcher<R, T, C>
where
    R: DnsResolver,
    T: Transport,
    C: TlsConnector,
{
    /// Follows same-origin redirects and reports the final response.
    fn fetch(&mut self, url: &str) -> LayoutResult<FetchResponse> {
        let mut location = PageLocation::parse(url)?;
        let origin = location.origin();
        let mut hops = 0;

        let response = loop {
            let request = HttpRequest::get(location.clone())?.with_header("Accept", ACCEPT_HEADER)?;
            let request = request.with_header("Accept-Encoding", "gzip, deflate, br")?;
            let response = self.execute(&request)?;

            let Some(target) = redirect_target(&response).map(str::to_owned) else {
                break response;
            };
            if hops == MAX_REDIRECTS {
                return Err(LayoutError::new(
                    "net.http.too_many_redirects",
                    format!("gave up on `{url}` after {MAX_REDIRECTS} redirects"),
                ));
            }
            hops += 1;

            let next = location.join(&target)?;
            if next.origin() != origin {
                return Err(LayoutError::new(
                    "net.http.redirect_cross_origin",
                    format!("`{}` redirected to another origin: {}", location.href(), next.href()),
                ));
            }
            tracing::debug!(
                from = location.href(),
                to = next.href(),
                status = response.status.as_u16(),
                "following redirect"
            );
            location = next;
        };

        tracing::debug!(
            url = location.href(),
            status = response.status.as_u16(),
            bytes = response.body.len(),
            "layout response received"
        );

        let content_type = response.header("content-type").unwrap_or_default();
        Ok(FetchResponse {
            status: response.status.as_u16(),
            body: decode_text(&response.body, content_type),
        })
    }
}

fn redirect_target(response: &HttpResponse) -> Option<&str> {
    match response.status.as_u16() {
        301 | 302 | 303 | 307 | 308 => response.header("location"),
        _ => None,
    }
}

fn body_too_large(detail: &str) -> LayoutError {
    LayoutError::new(
        "net.http.body_too_large",
        format!("HTTP body {detail} exceeds {MAX_BODY_BYTES} bytes"),
    )
}

/// Reads one response from a connection that the server closes afterwards.
fn read_response(stream: &mut dyn Read) -> LayoutResult<HttpResponse> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 4096];
    let header_end = loop {
        if let Some(end) = find_header_end(&buffer) {
            break end;
        }

        let read = stream.read(&mut chunk).map_err(|error| {
            LayoutError::new(
                "net.http.read_head_failed",
                format!("failed while reading HTTP response head: {error}"),
            )
        })?;
        if read == 0 {
            return Err(LayoutError::new(
                "net.http.unexpected_eof",
                "unexpected EOF before response head completed",
            ));
        }

        buffer.extend_from_slice(&chunk[..read]);
        if buffer.len() > MAX_RESPONSE_HEAD_BYTES {
            return Err(LayoutError::new(
                "net.http.head_too_large",
                format!("HTTP response head exceeds {MAX_RESPONSE_HEAD_BYTES} bytes"),
            ));
        }
    };

    let body_prefix = buffer.split_off(header_end);
    let head_text = std::str::from_utf8(&buffer).map_err(|error| {
        LayoutError::new(
            "net.http.head_invalid_utf8",
            format!("HTTP response head is not valid UTF-8 text: {error}"),
        )
    })?;

    let mut lines = head_text.split("\r\n");
    let (version, status) = parse_status_line(lines.next().unwrap_or_default())?;
    let mut headers = Vec::new();
    for line in lines.filter(|line| !line.is_empty()) {
        let (name, value) = line.split_once(':').ok_or_else(|| {
            LayoutError::new(
                "net.http.header_invalid",
                format!("invalid HTTP header line `{line}`"),
            )
        })?;
        headers.push(Header::new(name.trim(), value.trim())?);
    }

    let body = if status.allows_body() {
        let raw = read_body(stream, &headers, body_prefix)?;
        decode_content_encoding(&headers, raw)?
    } else {
        Vec::new()
    };

    Ok(HttpResponse {
        version,
        status,
        headers,
        body,
    })
}

fn read_body(stream: &mut dyn Read, headers: &[Header], mut prefix: Vec<u8>) -> LayoutResult<Vec<u8>> {
    if find_header(headers, "transfer-encoding").is_some() {
        if !header_contains(headers, "transfer-encoding", "chunked") {
            return Err(LayoutError::new(
                "net.http.transfer_encoding_unsupported",
                "only chunked transfer encoding is supported",
            ));
        }
        return read_chunked_body(stream, prefix);
    }

    match parse_content_length(headers)? {
        Some(len) if prefix.len() >= len => {
            prefix.truncate(len);
            Ok(prefix)
        }
        Some(len) if len > MAX_BODY_BYTES => Err(body_too_large(&format!("of {len} bytes"))),
        Some(len) => {
            let mut rest = vec![0_u8; len - prefix.len()];
            stream.read_exact(&mut rest).map_err(|error| {
                LayoutError::new(
                    "net.http.read_body_failed",
                    format!("failed to read HTTP body bytes: {error}"),
                )
            })?;
            prefix.extend_from_slice(&rest);
            Ok(prefix)
        }
        None => {
            let limit = (MAX_BODY_BYTES + 1).saturating_sub(prefix.len()) as u64;
            stream.take(limit).read_to_end(&mut prefix).map_err(|error| {
                LayoutError::new(
                    "net.http.read_body_failed",
                    format!("failed while draining response body: {error}"),
                )
            })?;
            if prefix.len() > MAX_BODY_BYTES {
                return Err(body_too_large("read to close"));
            }
            Ok(prefix)
        }
    }
}

fn read_chunked_body(stream: &mut dyn Read, prefetched: Vec<u8>) -> LayoutResult<Vec<u8>> {
    let mut reader = Cursor::new(prefetched).chain(stream);
    let mut decoded = Vec::new();

    loop {
        let size_line = read_crlf_line(&mut reader)?;
        if size_line.is_empty() {
            continue;
        }

        let size_token = size_line.split(';').next().unwrap_or_default().trim();
        let chunk_size = usize::from_str_radix(size_token, 16).map_err(|error| {
            LayoutError::new(
                "net.http.chunk_size_invalid",
                format!("invalid chunk size `{size_token}`: {error}"),
            )
        })?;

        if chunk_size == 0 {
            // Trailers, up to the terminating empty line.
            while !read_crlf_line(&mut reader)?.is_empty() {}
            return Ok(decoded);
        }

        let start = decoded.len();
        let end = start
            .checked_add(chunk_size)
            .filter(|end| *end <= MAX_BODY_BYTES)
            .ok_or_else(|| body_too_large(&format!("with a {chunk_size:#x} byte chunk")))?;
        decoded.resize(end, 0);
        let mut terminator = [0_u8; 2];
        reader
            .read_exact(&mut decoded[start..])
            .and_then(|()| reader.read_exact(&mut terminator))
            .map_err(|error| {
                LayoutError::new(
                    "net.http.read_body_failed",
                    format!("failed while reading chunked HTTP body: {error}"),
                )
            })?;
        if terminator != *b"\r\n" {
            return Err(LayoutError::new(
                "net.http.chunk_terminator_invalid",
                "chunk data is missing trailing CRLF",
            ));
        }
    }
}

fn read_crlf_line(reader: &mut impl Read) -> LayoutResult<String> {
    let mut line = Vec::new();
    let mut byte = [0_u8; 1];
    while !line.ends_with(b"\r\n") {
        reader.read_exact(&mut byte).map_err(|error| {
            LayoutError::new(
                "net.http.read_body_failed",
                format!("failed while reading chunked transfer line: {error}"),
            )
        })?;
        line.push(byte[0]);

        if line.len() > MAX_CHUNK_LINE_BYTES {
            return Err(LayoutError::new(
                "net.http.chunk_line_too_large",
                format!("chunk metadata line exceeds {MAX_CHUNK_LINE_BYTES} bytes"),
            ));
        }
    }

    line.truncate(line.len() - 2);
    String::from_utf8(line).map_err(|error| {
        LayoutError::new(
            "net.http.chunk_line_invalid_utf8",
            format!("chunk metadata line is not valid UTF-8: {error}"),
        )
    })
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|idx| idx + 4)
}

fn parse_status_line(line: &str) -> LayoutResult<(HttpVersion, HttpStatusCode)> {
    let invalid = || {
        LayoutError::new(
            "net.http.status_line_invalid",
            format!("invalid HTTP status line `{line}`"),
        )
    };

    let mut parts = line.splitn(3, ' ');
    let version = match parts.next().ok_or_else(invalid)? {
        "HTTP/1.0" => HttpVersion::Http10,
        "HTTP/1.1" => HttpVersion::Http11,
        other => {
            return Err(LayoutError::new(
                "net.http.version_unsupported",
                format!("unsupported response version `{other}`"),
            ));
        }
    };

    let code = parts
        .next()
        .and_then(|text| text.parse::<u16>().ok())
        .ok_or_else(invalid)?;
    Ok((version, HttpStatusCode::new(code)?))
}

fn parse_content_length(headers: &[Header]) -> LayoutResult<Option<usize>> {
    let mut value: Option<usize> = None;
    for header in headers
        .iter()
        .filter(|header| header.name.eq_ignore_ascii_case("content-length"))
    {
        let parsed = header.value.trim().parse::<usize>().map_err(|error| {
            LayoutError::new(
                "net.http.content_length_invalid",
                format!("invalid Content-Length `{}`: {error}", header.value),
            )
        })?;

        if value.is_some_and(|existing| existing != parsed) {
            return Err(LayoutError::new(
                "net.http.content_length_conflict",
                "conflicting Content-Length headers in response",
            ));
        }
        value = Some(parsed);
    }

    Ok(value)
}

fn decode_content_encoding(headers: &[Header], body: Vec<u8>) -> LayoutResult<Vec<u8>> {
    let encodings: Vec<String> = headers
        .iter()
        .filter(|header| header.name.eq_ignore_ascii_case("content-encoding"))
        .flat_map(|header| header.value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    let mut decoded = body;
    for encoding in encodings.iter().rev() {
        decoded = match encoding.as_str() {
            "identity" => decoded,
            "gzip" | "x-gzip" => read_all(GzDecoder::new(Cursor::new(decoded)), "gzip")?,
            "deflate" => decode_deflate(decoded)?,
            "br" => read_all(Decompressor::new(Cursor::new(decoded), 4096), "brotli")?,
            _ => {
                return Err(LayoutError::new(
                    "net.http.content_encoding_unsupported",
                    format!("unsupported content encoding `{encoding}`"),
                ));
            }
        };
    }

    Ok(decoded)
}

/// Servers disagree on whether `deflate` means zlib-wrapped or raw.
fn decode_deflate(body: Vec<u8>) -> LayoutResult<Vec<u8>> {
    let mut zlib = Vec::new();
    if ZlibDecoder::new(Cursor::new(&body)).read_to_end(&mut zlib).is_ok() {
        return Ok(zlib);
    }
    read_all(DeflateDecoder::new(Cursor::new(body)), "deflate")
}

fn read_all(decoder: impl Read, name: &str) -> LayoutResult<Vec<u8>> {
    let mut decoded = Vec::new();
    decoder
        .take(MAX_BODY_BYTES as u64 + 1)
        .read_to_end(&mut decoded)
        .map_err(|error| {
            LayoutError::new(
                "net.http.decode_failed",
                format!("{name} decode failed: {error}"),
            )
        })?;
    if decoded.len() > MAX_BODY_BYTES {
        return Err(body_too_large(&format!("after {name} decoding")));
    }
    Ok(decoded)
}

/// Decodes `body` with the charset named in `content_type`, UTF-8 otherwise.
/// A byte-order mark wins over both.
pub(crate) fn decode_text(body: &[u8], content_type: &str) -> String {
    let encoding = charset_label(content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (decoded, used, had_errors) = encoding.decode(body);
    if had_errors {
        tracing::warn!(encoding = used.name(), "layout body contained malformed sequences");
    }
    decoded.into_owned()
}

fn charset_label(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|part| {
        let (name, value) = part.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let label = value.trim().trim_matches('"').trim_matches('\'');
        (!label.is_empty()).then_some(label)
    })
}
