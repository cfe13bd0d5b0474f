//! TLS policy and the rustls connector.

use crate::transport::BoxedIoStream;
use crate::url::PageLocation;
use rl_core::LayoutError;
use rl_core::LayoutResult;
use std::net::TcpStream;

#[cfg(feature = "tls-rustls")]
use rustls::RootCertStore;
#[cfg(feature = "tls-rustls")]
use rustls::SupportedProtocolVersion;
#[cfg(feature = "tls-rustls")]
use rustls::pki_types::ServerName;
#[cfg(feature = "tls-rustls")]
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    V1_2,
    V1_3,
}

/// Controls which trust anchors are used for server certificate verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustStoreMode {
    /// Use only the embedded Mozilla/WebPKI roots.
    WebPkiOnly,
    /// Use WebPKI roots and merge operating-system roots (enterprise/local CAs).
    WebPkiAndOs,
}

impl TrustStoreMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "webpki" => Some(Self::WebPkiOnly),
            "webpki+os" | "os" => Some(Self::WebPkiAndOs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPolicy {
    pub minimum_version: TlsVersion,
    pub maximum_version: TlsVersion,
    pub trust_store_mode: TrustStoreMode,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self {
            minimum_version: TlsVersion::V1_2,
            maximum_version: TlsVersion::V1_3,
            trust_store_mode: TrustStoreMode::WebPkiOnly,
        }
    }
}

impl TlsPolicy {
    pub fn with_trust_store_mode(mut self, mode: TrustStoreMode) -> Self {
        self.trust_store_mode = mode;
        self
    }

    pub fn validate(&self) -> LayoutResult<()> {
        if self.minimum_version > self.maximum_version {
            return Err(LayoutError::new(
                "net.tls.invalid_version_range",
                "minimum TLS version cannot be greater than maximum version",
            ));
        }
        Ok(())
    }
}

/// Upgrades a connected TCP stream to TLS for `url`.
pub trait TlsConnector {
    fn connect_tls(
        &self,
        stream: TcpStream,
        url: &PageLocation,
        policy: &TlsPolicy,
    ) -> LayoutResult<BoxedIoStream>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RustlsConnector;

#[cfg(feature = "tls-rustls")]
impl TlsConnector for RustlsConnector {
    fn connect_tls(
        &self,
        mut stream: TcpStream,
        url: &PageLocation,
        policy: &TlsPolicy,
    ) -> LayoutResult<BoxedIoStream> {
        use rustls::ClientConfig;
        use rustls::ClientConnection;
        use rustls::StreamOwned;

        let versions = supported_versions(policy.minimum_version, policy.maximum_version)?;
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let mut config = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&versions)
            .map_err(|error| {
                LayoutError::new(
                    "net.tls.config_versions_invalid",
                    format!("failed to configure TLS protocol versions: {error}"),
                )
            })?
            .with_root_certificates(root_store(policy.trust_store_mode)?)
            .with_no_client_auth();
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        let server_name = ServerName::try_from(url.host().to_owned()).map_err(|error| {
            LayoutError::new(
                "net.tls.server_name_invalid",
                format!("invalid TLS server name `{}`: {error}", url.host()),
            )
        })?;

        let mut connection =
            ClientConnection::new(Arc::new(config), server_name).map_err(|error| {
                LayoutError::new(
                    "net.tls.connection_init_failed",
                    format!("failed to initialize TLS for `{}`: {error}", url.host()),
                )
            })?;

        connection.complete_io(&mut stream).map_err(|error| {
            LayoutError::new(
                "net.tls.handshake_failed",
                format!("TLS handshake failed for `{}`: {error}", url.host()),
            )
        })?;

        Ok(Box::new(StreamOwned::new(connection, stream)))
    }
}

#[cfg(feature = "tls-rustls")]
fn root_store(mode: TrustStoreMode) -> LayoutResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if mode == TrustStoreMode::WebPkiAndOs {
        let native = rustls_native_certs::load_native_certs();
        if native.certs.is_empty() && !native.errors.is_empty() {
            let details = native
                .errors
                .iter()
                .map(std::string::ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(LayoutError::new(
                "net.tls.os_roots_load_failed",
                format!("failed to load operating-system roots: {details}"),
            ));
        }

        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        tracing::debug!(added, ignored, "merged operating-system trust anchors");
    }

    if roots.is_empty() {
        return Err(LayoutError::new(
            "net.tls.root_store_empty",
            "no trust anchors available for TLS verification",
        ));
    }

    Ok(roots)
}

#[cfg(feature = "tls-rustls")]
fn supported_versions(
    minimum: TlsVersion,
    maximum: TlsVersion,
) -> LayoutResult<Vec<&'static SupportedProtocolVersion>> {
    let versions: Vec<&'static SupportedProtocolVersion> = [TlsVersion::V1_3, TlsVersion::V1_2]
        .into_iter()
        .filter(|version| (minimum..=maximum).contains(version))
        .map(|version| match version {
            TlsVersion::V1_2 => &rustls::version::TLS12,
            TlsVersion::V1_3 => &rustls::version::TLS13,
        })
        .collect();

    if versions.is_empty() {
        return Err(LayoutError::new(
            "net.tls.version_set_empty",
            "no supported TLS versions match the requested policy",
        ));
    }

    Ok(versions)
}

#[cfg(not(feature = "tls-rustls"))]
impl TlsConnector for RustlsConnector {
    fn connect_tls(
        &self,
        _stream: TcpStream,
        _url: &PageLocation,
        _policy: &TlsPolicy,
    ) -> LayoutResult<BoxedIoStream> {
        Err(LayoutError::new(
            "net.tls.backend_unavailable",
            "rustls backend is disabled for this build; enable `rl-net/tls-rustls`",
        ))
    }
}
