use crate::error::{Error, ErrorKind, Result};
use crate::net::codec::FrameCodec;
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, FramedRead, FramedWrite};

/// A single bidirectional frame-oriented channel layered over any async byte stream.
///
/// Every RMI call - request or response - is exactly one `send` and, on the other side, one
/// `receive`. There is no persistent session state here; a `Transport` is built fresh for each
/// TCP connection and dropped (closing the underlying socket) once the call completes.
pub struct Transport<T>(Framed<T, FrameCodec>)
where
    T: AsyncRead + AsyncWrite + Unpin;

impl<T> Transport<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: T) -> Self {
        Self(Framed::new(stream, FrameCodec))
    }

    /// Serializes `data` and sends it as a single frame.
    pub async fn send<D: Serialize>(&mut self, data: &D) -> Result<()> {
        let bytes = serde_cbor::to_vec(data).map_err(Error::from)?;
        self.0
            .send(&bytes)
            .await
            .map_err(|e| Error::new(ErrorKind::Rmi, format!("failed to send frame: {}", e)))
    }

    /// Receives and deserializes the next frame, or `None` if the peer closed the connection.
    pub async fn receive<R: DeserializeOwned>(&mut self) -> Result<Option<R>> {
        match self.0.next().await {
            Some(Ok(bytes)) => {
                let value = serde_cbor::from_slice(&bytes).map_err(Error::from)?;
                Ok(Some(value))
            }
            Some(Err(e)) => Err(Error::new(
                ErrorKind::Rmi,
                format!("failed to read frame: {}", e),
            )),
            None => Ok(None),
        }
    }
}

/// Write-only half of a frame-oriented channel, built from one side of a split stream.
pub struct TransportWriter<T>(FramedWrite<T, FrameCodec>)
where
    T: AsyncWrite + Unpin;

impl<T> TransportWriter<T>
where
    T: AsyncWrite + Unpin,
{
    pub fn new(write_half: T) -> Self {
        Self(FramedWrite::new(write_half, FrameCodec))
    }

    pub async fn send<D: Serialize>(&mut self, data: &D) -> Result<()> {
        let bytes = serde_cbor::to_vec(data).map_err(Error::from)?;
        self.0
            .send(&bytes)
            .await
            .map_err(|e| Error::new(ErrorKind::Rmi, format!("failed to send frame: {}", e)))
    }
}

/// Read-only half of a frame-oriented channel, built from one side of a split stream.
pub struct TransportReader<T>(FramedRead<T, FrameCodec>)
where
    T: AsyncRead + Unpin;

impl<T> TransportReader<T>
where
    T: AsyncRead + Unpin,
{
    pub fn new(read_half: T) -> Self {
        Self(FramedRead::new(read_half, FrameCodec))
    }

    pub async fn receive<R: DeserializeOwned>(&mut self) -> Result<Option<R>> {
        match self.0.next().await {
            Some(Ok(bytes)) => {
                let value = serde_cbor::from_slice(&bytes).map_err(Error::from)?;
                Ok(Some(value))
            }
            Some(Err(e)) => Err(Error::new(
                ErrorKind::Rmi,
                format!("failed to read frame: {}", e),
            )),
            None => Ok(None),
        }
    }
}

/// In-memory duplex half usable anywhere a `TcpStream` half would be.
pub type InmemoryStream = tokio::io::DuplexStream;

/// A [`Transport`] layered over an in-memory duplex pipe rather than a real socket, for fast
/// unit tests of the RMI fabric that do not want to bind a port.
pub type InmemoryTransport = Transport<InmemoryStream>;

impl InmemoryTransport {
    /// Builds a connected pair of in-memory transports, each `buffer` bytes deep, standing in
    /// for the two ends of a freshly accepted TCP connection.
    pub fn pair(buffer: usize) -> (Self, Self) {
        let (a, b) = tokio::io::duplex(buffer);
        (Transport::new(a), Transport::new(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    #[tokio::test]
    async fn send_then_receive_round_trips_a_value() {
        let (client, server) = tokio::io::duplex(4096);
        let mut client = Transport::new(client);
        let mut server = Transport::new(server);

        client.send(&Ping { n: 42 }).await.unwrap();
        let received: Ping = server.receive().await.unwrap().unwrap();
        assert_eq!(received, Ping { n: 42 });
    }

    #[tokio::test]
    async fn receive_returns_none_when_peer_drops() {
        let (client, server) = tokio::io::duplex(4096);
        drop(client);
        let mut server = Transport::new(server);
        let received: Option<Ping> = server.receive().await.unwrap();
        assert_eq!(received, None);
    }

    #[tokio::test]
    async fn multiple_frames_on_one_connection_are_independent() {
        let (client, server) = tokio::io::duplex(4096);
        let mut client = Transport::new(client);
        let mut server = Transport::new(server);

        client.send(&Ping { n: 1 }).await.unwrap();
        client.send(&Ping { n: 2 }).await.unwrap();

        let a: Ping = server.receive().await.unwrap().unwrap();
        let b: Ping = server.receive().await.unwrap().unwrap();
        assert_eq!((a, b), (Ping { n: 1 }, Ping { n: 2 }));
    }

    #[tokio::test]
    async fn split_reader_and_writer_round_trip_a_value() {
        let (client, server) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);

        let mut client_writer = TransportWriter::new(client_write);
        let mut server_reader = TransportReader::new(server_read);
        let mut server_writer = TransportWriter::new(server_write);
        let mut client_reader = TransportReader::new(client_read);

        client_writer.send(&Ping { n: 7 }).await.unwrap();
        let received: Ping = server_reader.receive().await.unwrap().unwrap();
        assert_eq!(received, Ping { n: 7 });

        server_writer.send(&Ping { n: 8 }).await.unwrap();
        let reply: Ping = client_reader.receive().await.unwrap().unwrap();
        assert_eq!(reply, Ping { n: 8 });
    }
}
