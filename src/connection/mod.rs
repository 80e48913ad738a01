//! Connection layer
//!
//! This module handles network connections from X11 clients via TCP and Unix
//! sockets. A connection is split into independent read and write halves so
//! the dispatch thread can block on reads while other threads deliver events
//! through the shared write half.

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};

#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};

/// Connection type
pub enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Connection {
    /// Split into read and write halves backed by the same socket.
    pub fn split(self) -> io::Result<(Box<dyn Read + Send>, Box<dyn Write + Send>)> {
        match self {
            Connection::Tcp(stream) => {
                let writer = stream.try_clone()?;
                Ok((Box::new(stream), Box::new(writer)))
            }
            #[cfg(unix)]
            Connection::Unix(stream) => {
                let writer = stream.try_clone()?;
                Ok((Box::new(stream), Box::new(writer)))
            }
        }
    }

    /// Human-readable peer description for logging.
    pub fn peer_label(&self) -> String {
        match self {
            Connection::Tcp(stream) => stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "tcp:?".to_string()),
            #[cfg(unix)]
            Connection::Unix(_) => "unix".to_string(),
        }
    }
}

/// Connection listener
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl Listener {
    /// Create a TCP listener
    pub fn tcp(port: u16) -> io::Result<Self> {
        let addr = format!("0.0.0.0:{}", port);
        let listener = TcpListener::bind(addr)?;
        Ok(Listener::Tcp(listener))
    }

    /// Create a Unix socket listener
    #[cfg(unix)]
    pub fn unix(path: &str) -> io::Result<Self> {
        // Remove existing socket file if it exists
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path)?;
        Ok(Listener::Unix(listener))
    }

    /// Accept a new connection
    pub fn accept(&self) -> io::Result<Connection> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, _) = listener.accept()?;
                Ok(Connection::Tcp(stream))
            }
            #[cfg(unix)]
            Listener::Unix(listener) => {
                let (stream, _) = listener.accept()?;
                Ok(Connection::Unix(stream))
            }
        }
    }
}
