//! Where the daemon listens for requests.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use tokio::net::{TcpListener, UnixListener};

use crate::service_config::SOCKET_FILE_NAME;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddress {
    Unix(PathBuf),
    Tcp(SocketAddr),
}

#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("failed to remove stale socket {path}: {source}")]
    StaleSocket {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: ListenAddress,
        #[source]
        source: std::io::Error,
    },
}

pub enum Listener {
    Unix(UnixListener),
    Tcp(TcpListener),
}

impl ListenAddress {
    /// Interpret a listen address argument.
    ///
    /// Empty or absent means `<data_dir>/socket`. A bare port listens on
    /// localhost, `host:port` on that address, and anything else is taken
    /// as a socket path.
    pub fn resolve(arg: Option<&str>, data_dir: &Path) -> Self {
        let arg = arg.map(str::trim).unwrap_or_default();
        if arg.is_empty() {
            return ListenAddress::Unix(data_dir.join(SOCKET_FILE_NAME));
        }
        if let Ok(port) = arg.parse::<u16>() {
            return ListenAddress::Tcp(SocketAddr::from((Ipv4Addr::LOCALHOST, port)));
        }
        if let Ok(addr) = arg.parse::<SocketAddr>() {
            return ListenAddress::Tcp(addr);
        }
        ListenAddress::Unix(PathBuf::from(arg))
    }

    /// Remove a socket file left behind by a previous run.
    pub fn prepare(&self) -> Result<(), AddressError> {
        let ListenAddress::Unix(path) = self else {
            return Ok(());
        };
        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "removed stale socket");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(AddressError::StaleSocket {
                path: path.clone(),
                source,
            }),
        }
    }

    pub async fn bind(&self) -> Result<Listener, AddressError> {
        let bind_error = |source| AddressError::Bind {
            address: self.clone(),
            source,
        };
        match self {
            ListenAddress::Unix(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(bind_error)?;
                }
                UnixListener::bind(path)
                    .map(Listener::Unix)
                    .map_err(bind_error)
            }
            ListenAddress::Tcp(addr) => TcpListener::bind(addr)
                .await
                .map(Listener::Tcp)
                .map_err(bind_error),
        }
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAddress::Unix(path) => write!(f, "unix:{}", path.display()),
            ListenAddress::Tcp(addr) => write!(f, "{}", addr),
        }
    }
}
