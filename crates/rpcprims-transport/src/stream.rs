use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf, ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;

/// The receiving half of a call's byte stream.
///
/// Reads are count-driven: `recv_data(n)` resolves with exactly `n` bytes, or
/// with fewer (possibly none) once the remote side has finished sending.
pub trait RecvStream: Send {
    /// Receive exactly `size` bytes, or fewer if the stream ended first.
    fn recv_data(&mut self, size: usize) -> impl Future<Output = io::Result<Bytes>> + Send;
}

/// The sending half of a call's byte stream. Writes are whole-buffer and may
/// carry a local half-close.
pub trait SendStream: Send {
    /// Send `data`, then half-close the sending direction if `end_stream` is set.
    fn send_data(
        &mut self,
        data: Bytes,
        end_stream: bool,
    ) -> impl Future<Output = io::Result<()>> + Send;
}

/// Both halves of a call's byte stream on one value.
pub trait DataStream: RecvStream + SendStream {}

impl<T: RecvStream + SendStream + ?Sized> DataStream for T {}

/// Adapts any tokio byte stream into a [`RecvStream`] and [`SendStream`].
#[derive(Debug)]
pub struct IoStream<T> {
    inner: T,
}

impl<T> IoStream<T> {
    /// Wrap a connected byte stream.
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the adapter and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> IoStream<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Split into independently owned receive and send halves, so both
    /// directions can make progress at the same time.
    pub fn split(self) -> (IoStream<ReadHalf<T>>, IoStream<WriteHalf<T>>) {
        let (read, write) = tokio::io::split(self.inner);
        (IoStream::new(read), IoStream::new(write))
    }
}

impl<T> RecvStream for IoStream<T>
where
    T: AsyncRead + Unpin + Send,
{
    async fn recv_data(&mut self, size: usize) -> io::Result<Bytes> {
        let mut buf = vec![0u8; size];
        let mut filled = 0usize;
        while filled < size {
            let read = match self.inner.read(&mut buf[filled..]).await {
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            if read == 0 {
                break;
            }
            filled += read;
        }
        buf.truncate(filled);
        Ok(Bytes::from(buf))
    }
}

impl<T> SendStream for IoStream<T>
where
    T: AsyncWrite + Unpin + Send,
{
    async fn send_data(&mut self, data: Bytes, end_stream: bool) -> io::Result<()> {
        if !data.is_empty() {
            self.inner.write_all(&data).await?;
        }
        self.inner.flush().await?;
        if end_stream {
            self.inner.shutdown().await?;
        }
        Ok(())
    }
}

/// A connected transport stream: TCP, Unix domain socket, or in-memory pipe.
pub struct Connection {
    inner: ConnectionInner,
}

enum ConnectionInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
    Memory(DuplexStream),
}

impl Connection {
    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: ConnectionInner::Tcp(stream),
        }
    }

    #[cfg(unix)]
    pub(crate) fn from_unix(stream: tokio::net::UnixStream) -> Self {
        Self {
            inner: ConnectionInner::Unix(stream),
        }
    }

    /// Create a connected in-memory pair; `max_buf_size` bounds each direction.
    pub fn memory_pair(max_buf_size: usize) -> (Self, Self) {
        let (left, right) = tokio::io::duplex(max_buf_size);
        (
            Self {
                inner: ConnectionInner::Memory(left),
            },
            Self {
                inner: ConnectionInner::Memory(right),
            },
        )
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            ConnectionInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            ConnectionInner::Unix(_) => "unix-domain-socket",
            ConnectionInner::Memory(_) => "memory",
        }
    }

    /// Human-readable identity of the remote side.
    pub fn peer_label(&self) -> String {
        match &self.inner {
            ConnectionInner::Tcp(stream) => stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "tcp:unknown".to_string()),
            #[cfg(unix)]
            ConnectionInner::Unix(_) => match self.peer_credentials() {
                Some((uid, _, Some(pid))) => format!("unix:pid={pid},uid={uid}"),
                Some((uid, _, None)) => format!("unix:uid={uid}"),
                None => "unix:unknown".to_string(),
            },
            ConnectionInner::Memory(_) => "memory".to_string(),
        }
    }

    /// Get the credentials of the connected peer.
    ///
    /// Returns `(uid, gid, pid)` for Unix domain sockets, `None` otherwise.
    #[cfg(unix)]
    pub fn peer_credentials(&self) -> Option<(u32, u32, Option<i32>)> {
        match &self.inner {
            ConnectionInner::Unix(stream) => stream
                .peer_cred()
                .ok()
                .map(|cred| (cred.uid(), cred.gid(), cred.pid())),
            _ => None,
        }
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            ConnectionInner::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            ConnectionInner::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
            ConnectionInner::Memory(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().inner {
            ConnectionInner::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            ConnectionInner::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
            ConnectionInner::Memory(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            ConnectionInner::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            ConnectionInner::Unix(stream) => Pin::new(stream).poll_flush(cx),
            ConnectionInner::Memory(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            ConnectionInner::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            ConnectionInner::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
            ConnectionInner::Memory(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("type", &self.transport_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recv_data_returns_exact_count_across_chunks() {
        let (left, right) = Connection::memory_pair(64);
        let mut writer = IoStream::new(left);
        let mut reader = IoStream::new(right);

        let producer = tokio::spawn(async move {
            for chunk in [&b"he"[..], b"ll", b"o!"] {
                writer
                    .send_data(Bytes::copy_from_slice(chunk), false)
                    .await
                    .unwrap();
                tokio::task::yield_now().await;
            }
            writer
        });

        let data = reader.recv_data(5).await.unwrap();
        assert_eq!(data.as_ref(), b"hello");
        let rest = reader.recv_data(1).await.unwrap();
        assert_eq!(rest.as_ref(), b"!");
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn recv_data_returns_short_read_at_end_of_stream() {
        let (left, right) = Connection::memory_pair(64);
        let mut writer = IoStream::new(left);
        let mut reader = IoStream::new(right);

        writer
            .send_data(Bytes::from_static(b"abc"), true)
            .await
            .unwrap();

        let data = reader.recv_data(10).await.unwrap();
        assert_eq!(data.as_ref(), b"abc");
        let empty = reader.recv_data(5).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn recv_zero_bytes_is_empty_without_reading() {
        let (_left, right) = Connection::memory_pair(8);
        let mut reader = IoStream::new(right);
        let data = reader.recv_data(0).await.unwrap();
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn half_close_with_empty_payload_signals_end() {
        let (left, right) = Connection::memory_pair(8);
        let mut writer = IoStream::new(left);
        let mut reader = IoStream::new(right);

        writer.send_data(Bytes::new(), true).await.unwrap();
        assert!(reader.recv_data(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn split_halves_make_progress_concurrently() {
        // Each side writes more than the pipe holds before reading anything.
        let (left, right) = Connection::memory_pair(16);
        let payload = Bytes::from(vec![7u8; 1024]);

        let exchange = |conn: Connection, payload: Bytes| async move {
            let (mut reader, mut writer) = IoStream::new(conn).split();
            let len = payload.len();
            let (_, received) = tokio::try_join!(
                writer.send_data(payload, true),
                reader.recv_data(len)
            )?;
            io::Result::Ok(received)
        };

        let (from_right, from_left) = tokio::try_join!(
            exchange(left, payload.clone()),
            exchange(right, payload.clone())
        )
        .unwrap();
        assert_eq!(from_right, payload);
        assert_eq!(from_left, payload);
    }

    #[test]
    fn memory_connection_debug_and_labels() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        runtime.block_on(async {
            let (left, _right) = Connection::memory_pair(8);
            assert_eq!(left.transport_name(), "memory");
            assert_eq!(left.peer_label(), "memory");
            assert!(format!("{left:?}").contains("memory"));
        });
    }
}
