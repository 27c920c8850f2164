//! Pluggable transport establishment.
//!
//! The controller never opens sockets itself; it asks a [`Dialer`] for a
//! byte stream given a network name and an address.

use std::future::Future;
use std::io;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// A bidirectional byte stream the controller can own.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// A type-erased transport.
pub type BoxedTransport = Box<dyn Transport>;

/// Future returned by [`Dialer::dial`].
pub type DialFuture = Pin<Box<dyn Future<Output = io::Result<BoxedTransport>> + Send>>;

/// Establishes the transport for a control session.
pub trait Dialer: Send + Sync {
    /// Open a connection to `address` over `network`.
    fn dial(&self, network: &str, address: &str) -> DialFuture;
}

impl<F, Fut> Dialer for F
where
    F: Fn(String, String) -> Fut + Send + Sync,
    Fut: Future<Output = io::Result<BoxedTransport>> + Send + 'static,
{
    fn dial(&self, network: &str, address: &str) -> DialFuture {
        Box::pin(self(network.to_string(), address.to_string()))
    }
}

/// Dials `tcp` and, on Unix platforms, `unix` networks.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

impl Dialer for TcpDialer {
    fn dial(&self, network: &str, address: &str) -> DialFuture {
        let network = network.to_string();
        let address = address.to_string();

        Box::pin(async move {
            debug!("Dialing ({}) {}", network, address);
            match network.as_str() {
                "tcp" => {
                    let stream = TcpStream::connect(&address).await?;
                    stream.set_nodelay(true)?;
                    Ok(Box::new(stream) as BoxedTransport)
                }
                #[cfg(unix)]
                "unix" => {
                    let stream = tokio::net::UnixStream::connect(&address).await?;
                    Ok(Box::new(stream) as BoxedTransport)
                }
                other => Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unsupported network '{}'", other),
                )),
            }
        })
    }
}
