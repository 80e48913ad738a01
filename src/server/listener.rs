//! Server listener and connection handling
//!
//! One accepting loop per listening endpoint; each accepted connection gets
//! its own thread running the client's request loop. Connection teardown,
//! clean or not, sweeps the client's resources.

use super::client::Client;
use super::XServer;
use crate::connection::{Connection, Listener};
use crate::protocol::setup::{encode_setup_failed, encode_setup_success, SetupRequest};
use crate::protocol::wire::{ClientOutput, RequestReader};
use std::io;
use std::sync::Arc;
use std::thread;

/// Start a TCP listener for X11 connections on display `n` (port 6000+n).
/// Blocks accepting connections.
pub fn start_tcp_listener(display: u16, server: Arc<XServer>) -> io::Result<()> {
    let listener = Listener::tcp(6000 + display)?;
    log::info!("listening on tcp port {}", 6000 + display);
    serve(listener, server)
}

/// Start a Unix socket listener at the conventional display path. Blocks
/// accepting connections.
#[cfg(unix)]
pub fn start_unix_listener(path: &str, server: Arc<XServer>) -> io::Result<()> {
    let listener = Listener::unix(path)?;
    log::info!("listening on unix socket {}", path);
    serve(listener, server)
}

/// Accept connections until the listener fails, spawning a thread per
/// client.
pub fn serve(listener: Listener, server: Arc<XServer>) -> io::Result<()> {
    loop {
        match listener.accept() {
            Ok(conn) => {
                let server = Arc::clone(&server);
                thread::spawn(move || {
                    let peer = conn.peer_label();
                    if let Err(e) = handle_client(conn, server) {
                        log::error!("client {} error: {}", peer, e);
                    }
                });
            }
            Err(e) => {
                log::error!("accept failed: {}", e);
                return Err(e);
            }
        }
    }
}

fn handle_client(conn: Connection, server: Arc<XServer>) -> io::Result<()> {
    let peer = conn.peer_label();
    log::info!("new client connection from {}", peer);

    let (read_half, write_half) = conn.split()?;
    let mut reader = RequestReader::new(read_half);
    let output = Arc::new(ClientOutput::new(write_half));

    let setup = SetupRequest::parse(&mut reader)?;
    log::debug!("setup request: {:?}", setup);

    if setup.byte_order != b'B' {
        output.send(&encode_setup_failed("LSB-first byte order not supported"))?;
        log::warn!("refused client {}: LSB-first byte order", peer);
        return Ok(());
    }

    output.send(&encode_setup_success(&server))?;

    let client_id = server.register_client(Arc::clone(&output));
    log::info!("client {} connected as #{}", peer, client_id);

    let mut client = Client::new(client_id, reader, output);
    let result = client.run(&server);

    server.sweep_client(client_id, &client.resources);
    log::info!("client #{} disconnected", client_id);
    result
}
