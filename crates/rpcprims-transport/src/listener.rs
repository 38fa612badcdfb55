use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::stream::Connection;

/// A bound listener for any supported [`Endpoint`].
#[derive(Debug)]
pub enum Listener {
    /// TCP listener.
    Tcp(TcpListener),
    /// Unix domain socket listener.
    #[cfg(unix)]
    Unix(crate::uds::UnixDomainSocket),
}

impl Listener {
    /// Bind a listener on `endpoint`.
    pub async fn bind(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            Endpoint::Tcp(addr) => {
                let listener =
                    TcpListener::bind(addr)
                        .await
                        .map_err(|source| TransportError::Bind {
                            endpoint: endpoint.to_string(),
                            source,
                        })?;
                info!(%endpoint, "listening on tcp socket");
                Ok(Listener::Tcp(listener))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => Ok(Listener::Unix(crate::uds::UnixDomainSocket::bind(path)?)),
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(TransportError::InvalidEndpoint(endpoint.to_string())),
        }
    }

    /// Accept the next connection, returning it with a label for the peer.
    pub async fn accept(&self) -> Result<(Connection, String)> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, addr) = listener.accept().await.map_err(TransportError::Accept)?;
                debug!(peer = %addr, "accepted tcp connection");
                Ok((Connection::from_tcp(stream), addr.to_string()))
            }
            #[cfg(unix)]
            Listener::Unix(socket) => {
                let conn = socket.accept().await?;
                let label = conn.peer_label();
                Ok((conn, label))
            }
        }
    }

    /// The endpoint actually bound (resolves port 0 for TCP).
    pub fn local_endpoint(&self) -> Result<Endpoint> {
        match self {
            Listener::Tcp(listener) => Ok(Endpoint::Tcp(listener.local_addr()?.to_string())),
            #[cfg(unix)]
            Listener::Unix(socket) => Ok(Endpoint::Unix(socket.path().to_path_buf())),
        }
    }
}

/// Connect to a listening endpoint.
pub async fn connect(endpoint: &Endpoint) -> Result<Connection> {
    match endpoint {
        Endpoint::Tcp(addr) => {
            let stream = TcpStream::connect(addr)
                .await
                .map_err(|source| TransportError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                })?;
            stream.set_nodelay(true)?;
            debug!(%endpoint, "connected to tcp socket");
            Ok(Connection::from_tcp(stream))
        }
        #[cfg(unix)]
        Endpoint::Unix(path) => crate::uds::UnixDomainSocket::connect(path).await,
        #[cfg(not(unix))]
        Endpoint::Unix(_) => Err(TransportError::InvalidEndpoint(endpoint.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::stream::{IoStream, RecvStream, SendStream};

    #[tokio::test]
    async fn tcp_bind_resolves_ephemeral_port_and_accepts() {
        let endpoint: Endpoint = "127.0.0.1:0".parse().unwrap();
        let listener = Listener::bind(&endpoint).await.unwrap();
        let local = listener.local_endpoint().unwrap();
        assert_ne!(local, endpoint);

        let client = tokio::spawn(async move {
            let conn = connect(&local).await.unwrap();
            let mut stream = IoStream::new(conn);
            stream
                .send_data(Bytes::from_static(b"ping"), true)
                .await
                .unwrap();
        });

        let (conn, peer) = listener.accept().await.unwrap();
        assert!(peer.starts_with("127.0.0.1:"));
        assert_eq!(conn.transport_name(), "tcp");
        let mut stream = IoStream::new(conn);
        assert_eq!(stream.recv_data(4).await.unwrap().as_ref(), b"ping");
        client.await.unwrap();
    }

    #[tokio::test]
    async fn connect_refused_is_connect_error() {
        let endpoint: Endpoint = "127.0.0.1:0".parse().unwrap();
        let listener = Listener::bind(&endpoint).await.unwrap();
        let local = listener.local_endpoint().unwrap();
        drop(listener);

        let result = connect(&local).await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
