use crate::message::Frame;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

/// A message-oriented duplex byte stream; implemented by [`TcpStream`] in
/// production and swappable in tests (§4.1 "message-oriented sessions").
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send + 'static {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> Connection for T {}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Conn: Connection;

    async fn connect(&self, addr: SocketAddr) -> std::io::Result<Self::Conn>;
    async fn accept(&self) -> std::io::Result<(Self::Conn, SocketAddr)>;
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    pub async fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        Ok(TcpTransport {
            listener: TcpListener::bind(addr).await?,
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Conn = TcpStream;

    async fn connect(&self, addr: SocketAddr) -> std::io::Result<TcpStream> {
        TcpStream::connect(addr).await
    }

    async fn accept(&self) -> std::io::Result<(TcpStream, SocketAddr)> {
        self.listener.accept().await
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

pub async fn write_frame<C: Connection>(conn: &mut C, frame: &Frame) -> std::io::Result<()> {
    frame.write_to(conn).await
}

pub async fn read_frame<C: Connection>(conn: &mut C) -> std::io::Result<Frame> {
    Frame::read_from(conn).await
}
