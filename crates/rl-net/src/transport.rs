//! Name resolution and TCP connect.

use rl_core::LayoutError;
use rl_core::LayoutResult;
use std::io::Read;
use std::io::Write;
use std::net::SocketAddr;
use std::net::TcpStream;
use std::net::ToSocketAddrs;
use std::time::Duration;

pub trait IoStream: Read + Write {}
impl<T> IoStream for T where T: Read + Write {}

pub type BoxedIoStream = Box<dyn IoStream>;

pub trait DnsResolver {
    fn resolve(&self, host: &str, port: u16) -> LayoutResult<Vec<SocketAddr>>;
}

/// Uses the operating system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDnsResolver;

impl DnsResolver for SystemDnsResolver {
    fn resolve(&self, host: &str, port: u16) -> LayoutResult<Vec<SocketAddr>> {
        let addresses: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|error| {
                LayoutError::new(
                    "net.dns.resolve_failed",
                    format!("failed to resolve `{host}:{port}`: {error}"),
                )
            })?
            .collect();

        if addresses.is_empty() {
            return Err(LayoutError::new(
                "net.dns.no_results",
                format!("resolver returned no addresses for `{host}:{port}`"),
            ));
        }

        Ok(addresses)
    }
}

pub trait Transport {
    fn connect(&self, address: SocketAddr, timeout: Duration) -> LayoutResult<TcpStream>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    fn connect(&self, address: SocketAddr, timeout: Duration) -> LayoutResult<TcpStream> {
        let stream = TcpStream::connect_timeout(&address, timeout).map_err(|error| {
            LayoutError::new(
                "net.transport.connect_failed",
                format!("failed to connect to `{address}`: {error}"),
            )
        })?;

        let configure = |result: std::io::Result<()>, what: &str| {
            result.map_err(|error| {
                LayoutError::new(
                    "net.transport.configure_failed",
                    format!("failed to set {what} for `{address}`: {error}"),
                )
            })
        };
        configure(stream.set_nodelay(true), "TCP_NODELAY")?;
        configure(stream.set_read_timeout(Some(timeout)), "read timeout")?;
        configure(stream.set_write_timeout(Some(timeout)), "write timeout")?;

        Ok(stream)
    }
}

/// Tries each address in order and returns the first connection.
pub(crate) fn connect_first_available<T: Transport>(
    transport: &T,
    addresses: &[SocketAddr],
    timeout: Duration,
) -> LayoutResult<TcpStream> {
    let mut last_error = None;
    for address in addresses {
        match transport.connect(*address, timeout) {
            Ok(stream) => return Ok(stream),
            Err(error) => {
                tracing::debug!(%address, %error, "connect attempt failed");
                last_error = Some(error);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        LayoutError::new(
            "net.transport.no_addresses",
            "no addresses available to open a connection",
        )
    }))
}
