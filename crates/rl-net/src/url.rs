//! Page location and same-origin path resolution.

use rl_core::LayoutError;
use rl_core::LayoutResult;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    pub fn is_secure(self) -> bool {
        matches!(self, Self::Https)
    }

    fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

/// Absolute http(s) URL without credentials. Used both for the page itself
/// and for the requests made on its behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    parsed: Url,
    scheme: Scheme,
    host: String,
    port: u16,
}

impl PageLocation {
    pub fn parse(input: &str) -> LayoutResult<Self> {
        let parsed = Url::parse(input).map_err(|error| {
            LayoutError::new(
                "net.url.invalid",
                format!("failed to parse URL `{input}`: {error}"),
            )
        })?;
        Self::from_url(parsed)
    }

    fn from_url(parsed: Url) -> LayoutResult<Self> {
        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(LayoutError::new(
                "net.url.credentials_disallowed",
                "URL userinfo (`username:password@`) is not allowed",
            ));
        }

        let scheme = match parsed.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => {
                return Err(LayoutError::new(
                    "net.url.scheme_unsupported",
                    format!("unsupported scheme `{other}`"),
                ));
            }
        };

        let host = parsed
            .host_str()
            .ok_or_else(|| LayoutError::new("net.url.host_missing", "URL must include a host"))?
            .to_ascii_lowercase();
        let port = parsed.port_or_known_default().unwrap_or(scheme.default_port());

        Ok(Self {
            parsed,
            scheme,
            host,
            port,
        })
    }

    pub fn href(&self) -> &str {
        self.parsed.as_str()
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_secure(&self) -> bool {
        self.scheme.is_secure()
    }

    /// `host` or `host:port` when the port is not the scheme default.
    pub fn authority(&self) -> String {
        if self.port == self.scheme.default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// `scheme://host[:port]`
    pub fn origin(&self) -> String {
        self.parsed.origin().ascii_serialization()
    }

    /// Path and query as sent on the request line; the fragment is dropped.
    pub fn request_target(&self) -> String {
        let path = match self.parsed.path() {
            "" => "/",
            path => path,
        };

        match self.parsed.query() {
            Some(query) => format!("{path}?{query}"),
            None => path.to_owned(),
        }
    }

    /// Resolves `raw` against this location and returns the resolved href
    /// with the origin prefix removed. Anything that does not then begin with
    /// `/` belongs to another origin.
    pub fn same_origin_path(&self, raw: &str) -> LayoutResult<String> {
        let resolved = self.parsed.join(raw).map_err(|error| {
            LayoutError::new(
                "net.url.invalid",
                format!("failed to resolve `{raw}` against `{}`: {error}", self.href()),
            )
        })?;

        let href = resolved.as_str();
        let origin = self.origin();
        let path = href.strip_prefix(origin.as_str()).unwrap_or(href);
        if !path.starts_with('/') {
            return Err(LayoutError::new(
                "host.cross_origin_path",
                format!("data-path must be a same-origin URL: {path}"),
            ));
        }

        Ok(path.to_owned())
    }

    /// Resolves `raw` against this location, as a `Location` header would be.
    pub fn join(&self, raw: &str) -> LayoutResult<Self> {
        let joined = self.parsed.join(raw).map_err(|error| {
            LayoutError::new(
                "net.url.invalid",
                format!("failed to resolve `{raw}` against `{}`: {error}", self.href()),
            )
        })?;
        Self::from_url(joined)
    }

    /// Joins a path produced by [`Self::same_origin_path`] back onto the origin.
    pub fn absolute(&self, path: &str) -> LayoutResult<Self> {
        let joined = Url::parse(&format!("{}{path}", self.origin())).map_err(|error| {
            LayoutError::new(
                "net.url.invalid",
                format!("failed to build URL for `{path}`: {error}"),
            )
        })?;
        Self::from_url(joined)
    }
}
