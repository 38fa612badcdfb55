use std::fs;
use std::io;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::stream::Connection;

/// `sun_path` capacity: 108 bytes on Linux, 104 on the BSDs and macOS.
#[cfg(target_os = "linux")]
const SUN_PATH_MAX: usize = 108;
#[cfg(not(target_os = "linux"))]
const SUN_PATH_MAX: usize = 104;

/// Device and inode of the socket file a listener created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SocketIdentity {
    dev: u64,
    ino: u64,
}

impl SocketIdentity {
    fn of(metadata: &fs::Metadata) -> Self {
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    /// Whether `path` is still the socket this identity was taken from.
    fn matches(&self, path: &Path) -> bool {
        match fs::symlink_metadata(path) {
            Ok(metadata) => metadata.file_type().is_socket() && Self::of(&metadata) == *self,
            Err(_) => false,
        }
    }
}

/// Listener on a filesystem-path Unix domain socket.
///
/// The socket file is created with mode `0600` unless told otherwise, and is
/// unlinked on drop only while the path still names the socket created here.
pub struct UnixDomainSocket {
    listener: UnixListener,
    path: PathBuf,
    identity: SocketIdentity,
}

impl UnixDomainSocket {
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

    /// Bind with [`DEFAULT_SOCKET_MODE`](Self::DEFAULT_SOCKET_MODE). A stale
    /// socket left at `path` is replaced. Must be called within a tokio
    /// runtime.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        check_path_len(&path)?;

        let bind_error = |source: io::Error| TransportError::Bind {
            endpoint: path.display().to_string(),
            source,
        };
        remove_stale_socket(&path).map_err(bind_error)?;

        let listener = UnixListener::bind(&path).map_err(bind_error)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).map_err(bind_error)?;
        let identity = fs::symlink_metadata(&path)
            .map(|metadata| SocketIdentity::of(&metadata))
            .map_err(bind_error)?;

        info!(?path, mode = %format!("{mode:o}"), "listening on unix domain socket");
        Ok(Self {
            listener,
            path,
            identity,
        })
    }

    pub async fn accept(&self) -> Result<Connection> {
        let (stream, _) = self.listener.accept().await.map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "accepted unix connection");
        Ok(Connection::from_unix(stream))
    }

    /// Connect to a listening Unix domain socket.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Connection> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)
            .await
            .map_err(|source| TransportError::Connect {
                endpoint: path.display().to_string(),
                source,
            })?;
        debug!(?path, "connected to unix domain socket");
        Ok(Connection::from_unix(stream))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixDomainSocket {
    fn drop(&mut self) {
        if !self.identity.matches(&self.path) {
            debug!(path = ?self.path, "socket path was replaced, leaving it");
            return;
        }
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = ?self.path, %err, "failed to remove socket file");
        }
    }
}

impl std::fmt::Debug for UnixDomainSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixDomainSocket")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn check_path_len(path: &Path) -> Result<()> {
    let len = path.as_os_str().len();
    if len >= SUN_PATH_MAX {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max: SUN_PATH_MAX,
        });
    }
    Ok(())
}

/// Unlink a leftover socket at `path`. Anything that is not a socket is an
/// error and stays untouched.
fn remove_stale_socket(path: &Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if !metadata.file_type().is_socket() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "path exists and is not a unix socket",
        ));
    }
    debug!(?path, "removing stale socket");
    fs::remove_file(path)
}
