//! Wire-protocol integration tests
//!
//! Each test drives a live server over a real socket: connection setup,
//! request/reply framing, resource lifecycle, and extension dispatch, the
//! way an unmodified third-party client would.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use x11cell::connection::Listener;
use x11cell::server::{listener, ServerConfig, XServer, ROOT_WINDOW_ID};

const ERR_PIXMAP: u8 = 4;
const ERR_FONT: u8 = 7;
const ERR_IDCHOICE: u8 = 14;
const ERR_LENGTH: u8 = 16;
const ERR_IMPLEMENTATION: u8 = 17;
const SYNC_ERROR_BASE: u8 = 154;

/// Boot a server on an ephemeral port and return the client-facing port
/// plus a handle to the shared state.
fn start_server() -> (u16, Arc<XServer>) {
    let server = Arc::new(XServer::new(ServerConfig {
        width: 640,
        height: 480,
        dpi: 96,
    }));
    let tcp = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = tcp.local_addr().unwrap().port();
    let accept_server = Arc::clone(&server);
    thread::spawn(move || {
        let _ = listener::serve(Listener::Tcp(tcp), accept_server);
    });
    (port, server)
}

/// Connect and run the setup handshake.
fn connect(port: u16) -> TcpStream {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
    stream
        .write_all(&[b'B', 0, 0, 11, 0, 0, 0, 0, 0, 0, 0, 0])
        .unwrap();

    let mut header = [0u8; 8];
    stream.read_exact(&mut header).unwrap();
    assert_eq!(header[0], 1, "setup should succeed");
    let additional = u16::from_be_bytes([header[6], header[7]]) as usize;
    let mut rest = vec![0u8; additional * 4];
    stream.read_exact(&mut rest).unwrap();
    stream
}

/// Frame a core request.
fn request(opcode: u8, arg: u8, body: &[u8]) -> Vec<u8> {
    assert_eq!(body.len() % 4, 0);
    let words = (1 + body.len() / 4) as u16;
    let mut buf = vec![opcode, arg];
    buf.extend_from_slice(&words.to_be_bytes());
    buf.extend_from_slice(body);
    buf
}

/// Read one reply, error or event packet.
fn read_packet(stream: &mut TcpStream) -> Vec<u8> {
    let mut head = vec![0u8; 32];
    stream.read_exact(&mut head).unwrap();
    if head[0] == 1 {
        let extra = u32::from_be_bytes([head[4], head[5], head[6], head[7]]) as usize * 4;
        let mut rest = vec![0u8; extra];
        stream.read_exact(&mut rest).unwrap();
        head.extend_from_slice(&rest);
    }
    head
}

fn be32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn be16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

/// Round-trip a GetInputFocus so every previously written request has
/// been processed before the caller inspects server state.
fn sync_with_server(stream: &mut TcpStream) {
    stream.write_all(&request(43, 0, &[])).unwrap();
    let reply = read_packet(stream);
    assert_eq!(reply[0], 1);
}

#[test]
fn test_pixmap_lifecycle_end_to_end() {
    let (port, _server) = start_server();
    let mut stream = connect(port);
    let pid: u32 = 0x0200_002a;

    // CreatePixmap(pid, 16x16, depth 1, drawable = root)
    let mut body = Vec::new();
    body.extend_from_slice(&pid.to_be_bytes());
    body.extend_from_slice(&ROOT_WINDOW_ID.to_be_bytes());
    body.extend_from_slice(&16u16.to_be_bytes());
    body.extend_from_slice(&16u16.to_be_bytes());
    stream.write_all(&request(53, 1, &body)).unwrap();

    // GetGeometry replies with the pixmap's shape and a zero border
    stream.write_all(&request(14, 0, &pid.to_be_bytes())).unwrap();
    let reply = read_packet(&mut stream);
    assert_eq!(reply[0], 1);
    assert_eq!(reply[1], 1, "depth echoed in the arg byte");
    assert_eq!(be32(&reply, 8), ROOT_WINDOW_ID);
    assert_eq!(be16(&reply, 16), 16); // Width
    assert_eq!(be16(&reply, 18), 16); // Height
    assert_eq!(be16(&reply, 20), 0); // Border width

    // FreePixmap, then GetGeometry fails with a Pixmap error naming the ID
    stream.write_all(&request(54, 0, &pid.to_be_bytes())).unwrap();
    stream.write_all(&request(14, 0, &pid.to_be_bytes())).unwrap();
    let error = read_packet(&mut stream);
    assert_eq!(error[0], 0);
    assert_eq!(error[1], ERR_PIXMAP);
    assert_eq!(be32(&error, 4), pid);
    assert_eq!(error[10], 14); // Major opcode
}

#[test]
fn test_duplicate_id_answers_idchoice() {
    let (port, _server) = start_server();
    let mut stream = connect(port);
    let pid: u32 = 0x0200_0100;

    let mut body = Vec::new();
    body.extend_from_slice(&pid.to_be_bytes());
    body.extend_from_slice(&ROOT_WINDOW_ID.to_be_bytes());
    body.extend_from_slice(&8u16.to_be_bytes());
    body.extend_from_slice(&8u16.to_be_bytes());

    stream.write_all(&request(53, 32, &body)).unwrap();
    stream.write_all(&request(53, 32, &body)).unwrap();

    let error = read_packet(&mut stream);
    assert_eq!(error[0], 0);
    assert_eq!(error[1], ERR_IDCHOICE);
    assert_eq!(be32(&error, 4), pid);
}

#[test]
fn test_malformed_request_resynchronizes_framing() {
    let (port, _server) = start_server();
    let mut stream = connect(port);

    // GetGeometry declaring one word too many: the handler must drain the
    // excess and answer Length, leaving the stream aligned.
    let mut body = Vec::new();
    body.extend_from_slice(&ROOT_WINDOW_ID.to_be_bytes());
    body.extend_from_slice(&0xdead_beefu32.to_be_bytes());
    stream.write_all(&request(14, 0, &body)).unwrap();

    let error = read_packet(&mut stream);
    assert_eq!(error[0], 0);
    assert_eq!(error[1], ERR_LENGTH);
    let first_seq = be16(&error, 2);

    // The next request parses from the correct byte offset
    stream
        .write_all(&request(14, 0, &ROOT_WINDOW_ID.to_be_bytes()))
        .unwrap();
    let reply = read_packet(&mut stream);
    assert_eq!(reply[0], 1);
    assert_eq!(be16(&reply, 2), first_seq.wrapping_add(1));
    assert_eq!(be16(&reply, 16), 640);
    assert_eq!(be16(&reply, 18), 480);
}

#[test]
fn test_unknown_opcode_answers_implementation() {
    let (port, _server) = start_server();
    let mut stream = connect(port);

    stream.write_all(&request(77, 0, &[0u8; 8])).unwrap();
    let error = read_packet(&mut stream);
    assert_eq!(error[0], 0);
    assert_eq!(error[1], ERR_IMPLEMENTATION);
    assert_eq!(error[10], 77);

    // The connection keeps working
    sync_with_server(&mut stream);
}

#[test]
fn test_sync_counter_round_trip() {
    let (port, _server) = start_server();
    let mut stream = connect(port);

    // SyncCreateCounter(id=7, value=100)
    let mut body = Vec::new();
    body.extend_from_slice(&7u32.to_be_bytes());
    body.extend_from_slice(&100i64.to_be_bytes());
    stream.write_all(&request(129, 2, &body)).unwrap();

    // SyncDestroyCounter replies with the final value
    stream.write_all(&request(129, 3, &7u32.to_be_bytes())).unwrap();
    let reply = read_packet(&mut stream);
    assert_eq!(reply[0], 1);
    let value = i64::from_be_bytes([
        reply[8], reply[9], reply[10], reply[11], reply[12], reply[13], reply[14], reply[15],
    ]);
    assert_eq!(value, 100);

    // Destroying a counter that never existed reports the extension's
    // error base, not a core error code.
    stream.write_all(&request(129, 3, &8u32.to_be_bytes())).unwrap();
    let error = read_packet(&mut stream);
    assert_eq!(error[0], 0);
    assert_eq!(error[1], SYNC_ERROR_BASE);
    assert_eq!(be32(&error, 4), 8);
    assert_eq!(be16(&error, 8), 3); // Minor opcode
    assert_eq!(error[10], 129); // Major opcode
}

#[test]
fn test_sync_list_system_counters() {
    let (port, _server) = start_server();
    let mut stream = connect(port);

    stream.write_all(&request(129, 1, &[])).unwrap();
    let reply = read_packet(&mut stream);
    assert_eq!(reply[0], 1);
    assert_eq!(be32(&reply, 8), 2, "two system counters");
    // The body is padded to a multiple of 8 words
    assert_eq!(be32(&reply, 4) % 8, 0);
    let body = String::from_utf8_lossy(&reply[32..]).to_string();
    assert!(body.contains("SERVERTIME"));
    assert!(body.contains("IDLETIME"));
}

#[test]
fn test_list_fonts_with_info_streams_and_terminates() {
    let (port, _server) = start_server();
    let mut stream = connect(port);

    // Pattern "*" matches the whole catalog
    let mut body = Vec::new();
    body.extend_from_slice(&100u16.to_be_bytes()); // Max names
    body.extend_from_slice(&1u16.to_be_bytes()); // Pattern length
    body.extend_from_slice(b"*\0\0\0");
    stream.write_all(&request(50, 0, &body)).unwrap();

    let mut names = Vec::new();
    let mut remaining_counts = Vec::new();
    loop {
        let reply = read_packet(&mut stream);
        assert_eq!(reply[0], 1);
        let name_len = reply[1] as usize;
        if name_len == 0 {
            // Terminator carries a fixed trailer and no metrics
            assert_eq!(be32(&reply, 4), 7);
            break;
        }
        remaining_counts.push(be32(&reply, 56));
        names.push(String::from_utf8_lossy(&reply[60..60 + name_len]).to_string());
    }

    assert_eq!(names.len(), 10);
    assert!(names.contains(&"fixed".to_string()));
    // The remaining counter ends at 1 on the last real font
    assert_eq!(remaining_counts.first(), Some(&(names.len() as u32)));
    assert_eq!(remaining_counts.last(), Some(&1));
}

#[test]
fn test_list_fonts_respects_max_names() {
    let (port, _server) = start_server();
    let mut stream = connect(port);

    let mut body = Vec::new();
    body.extend_from_slice(&3u16.to_be_bytes());
    body.extend_from_slice(&1u16.to_be_bytes());
    body.extend_from_slice(b"*\0\0\0");
    stream.write_all(&request(49, 0, &body)).unwrap();

    let reply = read_packet(&mut stream);
    assert_eq!(reply[0], 1);
    assert_eq!(be16(&reply, 8), 3);
}

#[test]
fn test_open_query_close_font() {
    let (port, _server) = start_server();
    let mut stream = connect(port);
    let fid: u32 = 0x0200_0200;

    let mut body = Vec::new();
    body.extend_from_slice(&fid.to_be_bytes());
    body.extend_from_slice(&5u16.to_be_bytes());
    body.extend_from_slice(&[0, 0]);
    body.extend_from_slice(b"fixed\0\0\0");
    stream.write_all(&request(45, 0, &body)).unwrap();

    // QueryFont reports the creation-time metrics
    stream.write_all(&request(47, 0, &fid.to_be_bytes())).unwrap();
    let reply = read_packet(&mut stream);
    assert_eq!(reply[0], 1);
    assert_eq!(be16(&reply, 42), 255, "max char for an iso8859 font");

    // CloseFont frees the resource; a second QueryFont reports Font
    stream.write_all(&request(46, 0, &fid.to_be_bytes())).unwrap();
    stream.write_all(&request(47, 0, &fid.to_be_bytes())).unwrap();
    let error = read_packet(&mut stream);
    assert_eq!(error[0], 0);
    assert_eq!(error[1], ERR_FONT);
    assert_eq!(be32(&error, 4), fid);
}

#[test]
fn test_big_requests_enable() {
    let (port, _server) = start_server();
    let mut stream = connect(port);

    stream.write_all(&request(130, 0, &[])).unwrap();
    let reply = read_packet(&mut stream);
    assert_eq!(reply[0], 1);
    assert_eq!(be32(&reply, 8), 0x7fff_ffff);
}

#[test]
fn test_generic_event_echoes_version() {
    let (port, _server) = start_server();
    let mut stream = connect(port);

    stream.write_all(&request(128, 0, &[0, 2, 0, 3])).unwrap();
    let reply = read_packet(&mut stream);
    assert_eq!(reply[0], 1);
    assert_eq!(be16(&reply, 8), 2);
    assert_eq!(be16(&reply, 10), 3);
}

#[test]
fn test_query_extension_advertises_xtest() {
    let (port, _server) = start_server();
    let mut stream = connect(port);

    let mut body = Vec::new();
    body.extend_from_slice(&5u16.to_be_bytes());
    body.extend_from_slice(&[0, 0]);
    body.extend_from_slice(b"XTEST\0\0\0");
    stream.write_all(&request(98, 0, &body)).unwrap();

    let reply = read_packet(&mut stream);
    assert_eq!(reply[0], 1);
    assert_eq!(reply[8], 1, "present");
    assert_eq!(reply[9], 132, "major opcode");
}

#[test]
fn test_fake_input_moves_and_clamps_pointer() {
    let (port, server) = start_server();
    let mut stream = connect(port);

    let fake_motion = |x: i16, y: i16, relative: u8| {
        let mut body = vec![6u8, relative, 0, 0]; // MotionNotify
        body.extend_from_slice(&0u32.to_be_bytes()); // No delay
        body.extend_from_slice(&0u32.to_be_bytes()); // Root window
        body.extend_from_slice(&[0u8; 8]);
        body.extend_from_slice(&x.to_be_bytes());
        body.extend_from_slice(&y.to_be_bytes());
        body.extend_from_slice(&[0u8; 8]);
        request(132, 2, &body)
    };

    stream.write_all(&fake_motion(10, 20, 0)).unwrap();
    sync_with_server(&mut stream);
    assert_eq!(server.screen().pointer_position(), (10, 20));

    // Relative motion off the edge clamps into the screen
    stream.write_all(&fake_motion(-50, 10_000, 1)).unwrap();
    sync_with_server(&mut stream);
    assert_eq!(server.screen().pointer_position(), (0, 479));
}

#[test]
fn test_grab_sweep_on_disconnect() {
    let (port, server) = start_server();
    let mut stream = connect(port);

    // GrabKey on the root window, any modifier
    let mut body = Vec::new();
    body.extend_from_slice(&ROOT_WINDOW_ID.to_be_bytes());
    body.extend_from_slice(&0x8000u16.to_be_bytes());
    body.push(38); // Keycode
    body.push(1); // Pointer mode: asynchronous
    body.push(1); // Keyboard mode: asynchronous
    body.extend_from_slice(&[0, 0, 0]);
    stream.write_all(&request(33, 0, &body)).unwrap();
    sync_with_server(&mut stream);
    assert_eq!(server.key_grab_count(), 1);

    // Disconnecting must invalidate the grab
    drop(stream);
    let deadline = Instant::now() + Duration::from_secs(5);
    while server.key_grab_count() != 0 {
        assert!(Instant::now() < deadline, "grab not swept after disconnect");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_resources_swept_on_disconnect() {
    let (port, server) = start_server();
    let mut stream = connect(port);
    let pid: u32 = 0x0200_0300;

    let mut body = Vec::new();
    body.extend_from_slice(&pid.to_be_bytes());
    body.extend_from_slice(&ROOT_WINDOW_ID.to_be_bytes());
    body.extend_from_slice(&8u16.to_be_bytes());
    body.extend_from_slice(&8u16.to_be_bytes());
    stream.write_all(&request(53, 32, &body)).unwrap();
    sync_with_server(&mut stream);
    assert!(server.registry.get(pid).is_some());

    drop(stream);
    let deadline = Instant::now() + Duration::from_secs(5);
    while server.registry.get(pid).is_some() {
        assert!(
            Instant::now() < deadline,
            "resource not swept after disconnect"
        );
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_lsb_clients_are_refused() {
    let (port, _server) = start_server();
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .write_all(&[b'l', 0, 11, 0, 0, 0, 0, 0, 0, 0, 0, 0])
        .unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    assert!(!response.is_empty());
    assert_eq!(response[0], 0, "setup must fail");
}

#[cfg(unix)]
#[test]
fn test_unix_socket_accepts_clients() {
    use std::os::unix::net::UnixStream;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("X7");
    let path_str = path.to_str().unwrap().to_string();

    let server = Arc::new(XServer::new(ServerConfig::default()));
    let unix = Listener::unix(&path_str).unwrap();
    thread::spawn(move || {
        let _ = listener::serve(unix, server);
    });

    let mut stream = UnixStream::connect(&path).unwrap();
    stream
        .write_all(&[b'B', 0, 0, 11, 0, 0, 0, 0, 0, 0, 0, 0])
        .unwrap();
    let mut header = [0u8; 8];
    stream.read_exact(&mut header).unwrap();
    assert_eq!(header[0], 1);
}
