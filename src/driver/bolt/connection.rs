//! Bolt transport for client-side use.
//!
//! Handles the TCP connection, the version handshake and message framing.
//! Requests are buffered by [`BoltTransport::send`] and written together by
//! [`BoltTransport::flush`], which is what makes pipelining possible.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};

use crate::bolt::handshake::{handshake_request, parse_handshake_response, HANDSHAKE_RESPONSE_SIZE};
use crate::bolt::{BoltCodec, BoltError, BoltRequest, BoltResponse, BoltResult, BoltVersion};

use super::super::driver::ServerAddress;

/// One negotiated Bolt socket.
#[async_trait]
pub trait BoltTransport: Send + fmt::Debug {
    /// Negotiated protocol version.
    fn version(&self) -> BoltVersion;

    /// Remote address.
    fn address(&self) -> &ServerAddress;

    /// Queue a request; nothing is written until [`flush`](Self::flush).
    fn send(&mut self, request: BoltRequest) -> BoltResult<()>;

    /// Write every queued request.
    async fn flush(&mut self) -> BoltResult<()>;

    /// Read the next response.
    async fn recv(&mut self) -> BoltResult<BoltResponse>;

    /// Close the socket. Errors are ignored.
    async fn shutdown(&mut self);
}

/// Opens transports. The pool owns one per target.
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    /// Connect and complete the version handshake.
    async fn connect(&self, address: &ServerAddress) -> BoltResult<Box<dyn BoltTransport>>;
}

/// Client-side Bolt connection over TCP.
pub struct BoltConnection {
    stream: TcpStream,
    codec: BoltCodec,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
    version: BoltVersion,
    address: ServerAddress,
    read_timeout: Option<Duration>,
}

impl BoltConnection {
    /// Connect to a Bolt server and negotiate a version.
    pub async fn connect(
        address: &ServerAddress,
        read_timeout: Option<Duration>,
    ) -> BoltResult<Self> {
        let mut stream = TcpStream::connect((address.host.as_str(), address.port)).await?;
        stream.set_nodelay(true)?;

        let version = Self::handshake(&mut stream).await?;
        tracing::debug!(%address, %version, "bolt handshake complete");

        Ok(Self {
            stream,
            codec: BoltCodec::new(),
            read_buffer: BytesMut::with_capacity(8192),
            write_buffer: BytesMut::with_capacity(8192),
            version,
            address: address.clone(),
            read_timeout,
        })
    }

    async fn handshake(stream: &mut TcpStream) -> BoltResult<BoltVersion> {
        stream.write_all(&handshake_request()).await?;

        let mut response = [0u8; HANDSHAKE_RESPONSE_SIZE];
        stream.read_exact(&mut response).await?;
        parse_handshake_response(response)
    }

    async fn fill(&mut self) -> BoltResult<usize> {
        let read = self.stream.read_buf(&mut self.read_buffer);
        let n = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| BoltError::Timeout(limit))??,
            None => read.await?,
        };
        Ok(n)
    }
}

#[async_trait]
impl BoltTransport for BoltConnection {
    fn version(&self) -> BoltVersion {
        self.version
    }

    fn address(&self) -> &ServerAddress {
        &self.address
    }

    fn send(&mut self, request: BoltRequest) -> BoltResult<()> {
        self.codec.encode(request, &mut self.write_buffer)
    }

    async fn flush(&mut self) -> BoltResult<()> {
        if self.write_buffer.is_empty() {
            return Ok(());
        }
        let pending = self.write_buffer.split();
        self.stream.write_all(&pending).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> BoltResult<BoltResponse> {
        loop {
            if let Some(response) = self.codec.decode(&mut self.read_buffer)? {
                return Ok(response);
            }
            if self.fill().await? == 0 {
                return Err(BoltError::ConnectionClosed);
            }
        }
    }

    async fn shutdown(&mut self) {
        let _ = self.flush().await;
        let _ = self.stream.shutdown().await;
    }
}

impl fmt::Debug for BoltConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoltConnection")
            .field("address", &self.address)
            .field("version", &self.version)
            .finish()
    }
}

/// Default connector: plain TCP with a bound on connect + handshake time.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
}

impl TcpConnector {
    /// Create a connector.
    pub fn new(connect_timeout: Duration, read_timeout: Option<Duration>) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, address: &ServerAddress) -> BoltResult<Box<dyn BoltTransport>> {
        let connection = tokio::time::timeout(
            self.connect_timeout,
            BoltConnection::connect(address, self.read_timeout),
        )
        .await
        .map_err(|_| BoltError::Timeout(self.connect_timeout))??;
        Ok(Box::new(connection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::{BoltMap, BOLT_MAGIC};
    use tokio::net::TcpListener;

    const RESET_FRAME: [u8; 6] = [0x00, 0x02, 0xB0, 0x0F, 0x00, 0x00];
    const SUCCESS_FRAME: [u8; 7] = [0x00, 0x03, 0xB1, 0x70, 0xA0, 0x00, 0x00];

    async fn listener() -> (TcpListener, ServerAddress) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, ServerAddress::new("127.0.0.1", port))
    }

    #[tokio::test]
    async fn test_handshake_and_exchange() {
        let (listener, address) = listener().await;
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut preamble = [0u8; 20];
            socket.read_exact(&mut preamble).await.unwrap();
            assert_eq!(&preamble[..4], &BOLT_MAGIC);
            socket.write_all(&[0, 0, 4, 5]).await.unwrap();

            let mut request = [0u8; 6];
            socket.read_exact(&mut request).await.unwrap();
            assert_eq!(request, RESET_FRAME);
            socket.write_all(&SUCCESS_FRAME).await.unwrap();
        });

        let connector = TcpConnector::new(Duration::from_secs(5), None);
        let mut transport = connector.connect(&address).await.unwrap();
        assert_eq!(transport.version(), BoltVersion::V5_4);
        assert_eq!(transport.address(), &address);

        transport.send(BoltRequest::Reset).unwrap();
        transport.flush().await.unwrap();
        assert_eq!(
            transport.recv().await.unwrap(),
            BoltResponse::Success(BoltMap::new())
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_rejected() {
        let (listener, address) = listener().await;
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut preamble = [0u8; 20];
            socket.read_exact(&mut preamble).await.unwrap();
            socket.write_all(&[0, 0, 0, 0]).await.unwrap();
        });

        let connector = TcpConnector::new(Duration::from_secs(5), None);
        let err = connector.connect(&address).await.unwrap_err();
        assert!(matches!(err, BoltError::Handshake(_)));
    }

    #[tokio::test]
    async fn test_server_close_and_read_timeout() {
        let (listener, address) = listener().await;
        tokio::spawn(async move {
            for _ in 0..2 {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut preamble = [0u8; 20];
                socket.read_exact(&mut preamble).await.unwrap();
                socket.write_all(&[0, 0, 4, 4]).await.unwrap();
                // first socket is closed immediately, second one goes silent
                let mut sink = Vec::new();
                let _ = socket.read_to_end(&mut sink).await;
            }
        });

        let closing = TcpConnector::new(Duration::from_secs(5), None);
        let mut transport = closing.connect(&address).await.unwrap();
        transport.shutdown().await;
        assert!(transport.recv().await.unwrap_err().is_transport());

        let silent = TcpConnector::new(Duration::from_secs(5), Some(Duration::from_millis(50)));
        let mut transport = silent.connect(&address).await.unwrap();
        assert_eq!(transport.version(), BoltVersion::V4_4);
        transport.send(BoltRequest::Reset).unwrap();
        transport.flush().await.unwrap();
        assert!(matches!(
            transport.recv().await,
            Err(BoltError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let (listener, address) = listener().await;
        drop(listener);

        let connector = TcpConnector::new(Duration::from_secs(5), None);
        let err = connector.connect(&address).await.unwrap_err();
        assert!(err.is_transport());
    }
}
