//! X11 extension handlers
//!
//! Each negotiated extension owns a major opcode and dispatches on the
//! request's arg byte as its minor opcode: BIG-REQUESTS, the Generic Event
//! extension, SHAPE, XTEST input synthesis, and SYNC counters. Minors the
//! server does not implement drain their bytes and answer Implementation.

use super::client::Client;
use super::XServer;
use crate::protocol::{events, ErrorCode, ReplyBuilder};
use crate::resources::Resource;
use once_cell::sync::{Lazy, OnceCell};
use std::collections::HashMap;
use std::io;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Extension major opcodes
pub const XGE: u8 = 128;
pub const SYNC: u8 = 129;
pub const BIG_REQUESTS: u8 = 130;
pub const SHAPE: u8 = 131;
pub const XTEST: u8 = 132;

/// SYNC extension event and error bases
pub const SYNC_EVENT_BASE: u8 = 95;
pub const SYNC_ERROR_BASE: u8 = 154;

/// SYNC minor opcodes
const SYNC_INITIALIZE: u8 = 0;
const SYNC_LIST_SYSTEM_COUNTERS: u8 = 1;
const SYNC_CREATE_COUNTER: u8 = 2;
const SYNC_DESTROY_COUNTER: u8 = 3;

/// XTEST minor opcodes
const XTEST_GET_VERSION: u8 = 0;
const XTEST_COMPARE_CURSOR: u8 = 1;
const XTEST_FAKE_INPUT: u8 = 2;
const XTEST_GRAB_CONTROL: u8 = 3;

/// Extension information advertised by QueryExtension
#[derive(Debug, Clone, Copy)]
pub struct ExtensionInfo {
    pub major_opcode: u8,
    pub first_event: u8,
    pub first_error: u8,
}

/// A read-only counter in the static SYNC catalog.
#[derive(Debug, Clone)]
struct SystemCounter {
    id: u32,
    resolution: i64,
    name: &'static str,
}

/// A client-created SYNC counter.
struct Counter {
    owner: u32,
    value: i64,
}

/// Static system counter catalog, seeded once at server startup.
static SYSTEM_COUNTERS: OnceCell<Vec<SystemCounter>> = OnceCell::new();

/// Dynamic client-created counters, guarded separately from the resource
/// registry so counter traffic never contends with resource lookups.
static COUNTERS: Lazy<Mutex<HashMap<u32, Counter>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Seed the static extension catalogs. Called once at server startup.
pub fn initialize() {
    let _ = SYSTEM_COUNTERS.set(vec![
        SystemCounter {
            id: 1,
            resolution: 4,
            name: "IDLETIME",
        },
        SystemCounter {
            id: 3,
            resolution: 1,
            name: "SERVERTIME",
        },
    ]);
}

/// Names reported by ListExtensions.
pub fn names() -> &'static [&'static str] {
    &[
        "BIG-REQUESTS",
        "Generic Event Extension",
        "SHAPE",
        "SYNC",
        "XTEST",
    ]
}

/// Resolve a QueryExtension name.
pub fn lookup(name: &str) -> Option<ExtensionInfo> {
    let info = |major, first_event, first_error| ExtensionInfo {
        major_opcode: major,
        first_event,
        first_error,
    };
    match name {
        "BIG-REQUESTS" => Some(info(BIG_REQUESTS, 0, 0)),
        "Generic Event Extension" => Some(info(XGE, 0, 0)),
        "SHAPE" => Some(info(SHAPE, 0, 0)),
        "SYNC" => Some(info(SYNC, SYNC_EVENT_BASE, SYNC_ERROR_BASE)),
        "XTEST" => Some(info(XTEST, 0, 0)),
        _ => None,
    }
}

/// Drop a disconnected client's dynamic counters.
pub fn sweep_client(client_id: u32) {
    COUNTERS.lock().unwrap().retain(|_, c| c.owner != client_id);
}

/// Process an extension request, keyed by major opcode.
pub fn process_request(
    server: &XServer,
    client: &mut Client,
    opcode: u8,
    arg: u8,
    bytes_remaining: usize,
) -> io::Result<()> {
    match opcode {
        XGE => process_xge(client, opcode, arg, bytes_remaining),
        BIG_REQUESTS => process_big_requests(client, opcode, arg, bytes_remaining),
        SHAPE => process_shape(client, opcode, arg, bytes_remaining),
        XTEST => process_xtest(server, client, opcode, arg, bytes_remaining),
        SYNC => process_sync(client, opcode, arg, bytes_remaining),
        _ => {
            log::debug!("unknown extension major opcode {}", opcode);
            client.reader.skip(bytes_remaining)?;
            client.send_error(ErrorCode::Implementation, opcode, 0)
        }
    }
}

/// Generic Event extension: a version query that echoes the client's
/// numbers back, regardless of the minor opcode.
fn process_xge(client: &mut Client, opcode: u8, arg: u8, bytes_remaining: usize) -> io::Result<()> {
    if bytes_remaining != 4 {
        client.reader.skip(bytes_remaining)?;
        return client.send_error(ErrorCode::Length, opcode, 0);
    }
    let major = client.reader.read_u16()?;
    let minor = client.reader.read_u16()?;

    let mut reply = ReplyBuilder::new(arg, client.sequence());
    reply.put_u16(major).put_u16(minor);
    client.send_reply(&reply.finish())
}

/// BIG-REQUESTS: stateless maximum-request-length negotiation.
fn process_big_requests(
    client: &mut Client,
    opcode: u8,
    arg: u8,
    bytes_remaining: usize,
) -> io::Result<()> {
    if bytes_remaining != 0 {
        client.reader.skip(bytes_remaining)?;
        return client.send_error(ErrorCode::Length, opcode, 0);
    }
    let mut reply = ReplyBuilder::new(arg, client.sequence());
    reply.put_u32(0x7fff_ffff);
    client.send_reply(&reply.finish())
}

fn process_shape(client: &mut Client, opcode: u8, arg: u8, bytes_remaining: usize) -> io::Result<()> {
    match arg {
        0 => {
            // ShapeQueryVersion
            if bytes_remaining != 0 {
                client.reader.skip(bytes_remaining)?;
                return client.send_error(ErrorCode::Length, opcode, 0);
            }
            let mut reply = ReplyBuilder::new(0, client.sequence());
            reply.put_u16(1).put_u16(1);
            client.send_reply(&reply.finish())
        }
        _ => {
            client.reader.skip(bytes_remaining)?;
            client.send_error_with_minor(ErrorCode::Implementation, opcode, arg as u16, 0)
        }
    }
}

fn process_xtest(
    server: &XServer,
    client: &mut Client,
    opcode: u8,
    arg: u8,
    bytes_remaining: usize,
) -> io::Result<()> {
    match arg {
        XTEST_GET_VERSION => {
            if bytes_remaining != 4 {
                client.reader.skip(bytes_remaining)?;
                return client.send_error_with_minor(ErrorCode::Length, opcode, arg as u16, 0);
            }
            client.reader.skip(4)?; // Client major/minor version

            let mut reply = ReplyBuilder::new(2, client.sequence());
            reply.put_u16(1); // Server version 2.1
            client.send_reply(&reply.finish())
        }
        XTEST_COMPARE_CURSOR => {
            if bytes_remaining != 8 {
                client.reader.skip(bytes_remaining)?;
                return client.send_error_with_minor(ErrorCode::Length, opcode, arg as u16, 0);
            }
            let wid = client.reader.read_u32()?;
            let cid = client.reader.read_u32()?;

            let window = match server.registry.get(wid) {
                Some(r) => r,
                None => {
                    return client.send_error_with_minor(ErrorCode::Window, opcode, arg as u16, wid)
                }
            };
            let cursor = match &*window {
                Resource::Window(w) => w.cursor(),
                _ => {
                    return client.send_error_with_minor(ErrorCode::Window, opcode, arg as u16, wid)
                }
            };

            let same = match cid {
                0 => cursor.is_none(),
                1 => cursor == server.screen().current_cursor(),
                _ => cursor == Some(cid),
            };
            let reply = ReplyBuilder::new(same as u8, client.sequence());
            client.send_reply(&reply.finish())
        }
        XTEST_FAKE_INPUT => process_fake_input(server, client, opcode, arg, bytes_remaining),
        XTEST_GRAB_CONTROL => {
            if bytes_remaining != 4 {
                client.reader.skip(bytes_remaining)?;
                return client.send_error_with_minor(ErrorCode::Length, opcode, arg as u16, 0);
            }
            let impervious = client.reader.read_u8()? != 0;
            client.reader.skip(3)?;
            client.impervious = impervious;
            Ok(())
        }
        _ => {
            client.reader.skip(bytes_remaining)?;
            client.send_error(ErrorCode::Implementation, opcode, 0)
        }
    }
}

/// XTestFakeInput: synthesize one input event. The optional millisecond
/// delay sleeps only this connection's thread.
fn process_fake_input(
    server: &XServer,
    client: &mut Client,
    opcode: u8,
    arg: u8,
    bytes_remaining: usize,
) -> io::Result<()> {
    if bytes_remaining != 32 {
        client.reader.skip(bytes_remaining)?;
        return client.send_error_with_minor(ErrorCode::Length, opcode, arg as u16, 0);
    }
    let event_type = client.reader.read_u8()?;
    let detail = client.reader.read_u8()?;
    client.reader.skip(2)?;
    let delay = client.reader.read_u32()?;
    let wid = client.reader.read_u32()?;
    client.reader.skip(8)?;
    let x = client.reader.read_i16()?;
    let y = client.reader.read_i16()?;
    client.reader.skip(8)?;

    if wid != 0 {
        match server.registry.get(wid) {
            Some(r) if matches!(*r, Resource::Window(_)) => {}
            _ => return client.send_error_with_minor(ErrorCode::Window, opcode, arg as u16, wid),
        }
    }

    if delay != 0 {
        thread::sleep(Duration::from_millis(delay as u64));
    }

    match event_type {
        events::KEY_PRESS => server.synthesize_key(detail, true),
        events::KEY_RELEASE => server.synthesize_key(detail, false),
        events::BUTTON_PRESS => server.synthesize_button(detail, true),
        events::BUTTON_RELEASE => server.synthesize_button(detail, false),
        events::MOTION_NOTIFY => {
            server.synthesize_motion(x as i32, y as i32, detail != 0);
        }
        other => {
            return client.send_error_with_minor(
                ErrorCode::Value,
                opcode,
                arg as u16,
                other as u32,
            );
        }
    }
    Ok(())
}

fn process_sync(client: &mut Client, opcode: u8, arg: u8, bytes_remaining: usize) -> io::Result<()> {
    match arg {
        SYNC_INITIALIZE => {
            if bytes_remaining < 2 {
                client.reader.skip(bytes_remaining)?;
                return client.send_error(ErrorCode::Length, opcode, 0);
            }
            let major = client.reader.read_u8()?;
            let minor = client.reader.read_u8()?;
            client.reader.skip(bytes_remaining - 2)?;

            let mut reply = ReplyBuilder::new(arg, client.sequence());
            reply.put_u8(major).put_u8(minor);
            client.send_reply(&reply.finish())
        }
        SYNC_LIST_SYSTEM_COUNTERS => {
            if bytes_remaining != 0 {
                client.reader.skip(bytes_remaining)?;
                return client.send_error(ErrorCode::Length, opcode, 0);
            }
            let counters = SYSTEM_COUNTERS.get().map(Vec::as_slice).unwrap_or(&[]);
            let entries = encode_counter_entries(counters);
            let trailing = list_trailing_pad(entries.len());

            let mut reply = ReplyBuilder::new(arg, client.sequence());
            reply
                .put_u32(counters.len() as u32)
                .put_pad(20)
                .put_bytes(&entries)
                .put_pad(trailing);
            client.send_reply(&reply.finish())
        }
        SYNC_CREATE_COUNTER => {
            if bytes_remaining != 12 {
                client.reader.skip(bytes_remaining)?;
                return client.send_error(ErrorCode::Length, opcode, 0);
            }
            let id = client.reader.read_u32()?;
            let value = client.reader.read_i64()?;
            COUNTERS.lock().unwrap().insert(
                id,
                Counter {
                    owner: client.id,
                    value,
                },
            );
            Ok(())
        }
        SYNC_DESTROY_COUNTER => {
            if bytes_remaining != 4 {
                client.reader.skip(bytes_remaining)?;
                return client.send_error(ErrorCode::Length, opcode, 0);
            }
            let id = client.reader.read_u32()?;
            match COUNTERS.lock().unwrap().remove(&id) {
                Some(counter) => {
                    let mut reply = ReplyBuilder::new(arg, client.sequence());
                    reply.put_i64(counter.value).put_pad(16);
                    client.send_reply(&reply.finish())
                }
                // Unknown counters answer the extension's own error base,
                // not a core error code.
                None => client.send_raw_error(SYNC_ERROR_BASE, opcode, arg as u16, id),
            }
        }
        _ => {
            client.reader.skip(bytes_remaining)?;
            client.send_error(ErrorCode::Implementation, opcode, 0)
        }
    }
}

/// Encode the SYNC counter list entries: counter ID, 64-bit resolution as
/// hi/lo words, length-prefixed name, each entry padded to a word
/// boundary.
fn encode_counter_entries(counters: &[SystemCounter]) -> Vec<u8> {
    let mut buf = Vec::new();
    for counter in counters {
        buf.extend_from_slice(&counter.id.to_be_bytes());
        buf.extend_from_slice(&counter.resolution.to_be_bytes());
        buf.extend_from_slice(&(counter.name.len() as u16).to_be_bytes());
        buf.extend_from_slice(counter.name.as_bytes());
        let pad = crate::protocol::pad(counter.name.len() + 2);
        buf.resize(buf.len() + pad, 0);
    }
    buf
}

/// Trailing padding that rounds the list body up to a multiple of 8
/// words, as the reply format requires.
fn list_trailing_pad(body_len: usize) -> usize {
    body_len.div_ceil(32) * 32 - body_len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_advertised_extensions() {
        for name in names() {
            let info = lookup(name).expect("advertised extension resolves");
            assert!(info.major_opcode >= 128);
        }
        assert!(lookup("RANDR").is_none());

        let sync = lookup("SYNC").unwrap();
        assert_eq!(sync.first_error, SYNC_ERROR_BASE);
        assert_eq!(sync.first_event, SYNC_EVENT_BASE);
    }

    #[test]
    fn test_counter_entry_layout() {
        let counters = vec![SystemCounter {
            id: 3,
            resolution: 1,
            name: "SERVERTIME",
        }];
        let entries = encode_counter_entries(&counters);

        // 4 id + 8 resolution + 2 length + 10 name, already word-aligned
        assert_eq!(entries.len(), 24);
        assert_eq!(&entries[0..4], &[0, 0, 0, 3]);
        assert_eq!(&entries[4..12], &[0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(&entries[12..14], &[0, 10]);
        assert_eq!(&entries[14..24], b"SERVERTIME");
    }

    #[test]
    fn test_counter_entry_padding() {
        let counters = vec![SystemCounter {
            id: 1,
            resolution: 4,
            name: "IDLETIME",
        }];
        // 14 + 8 = 22, padded by pad(8 + 2) == 2
        assert_eq!(encode_counter_entries(&counters).len(), 24);
    }

    #[test]
    fn test_list_body_rounds_to_eight_words() {
        for body in [0usize, 1, 24, 32, 33, 48, 64] {
            let total = body + list_trailing_pad(body);
            assert_eq!(total % 32, 0);
            assert!(total >= body);
            assert!(total - body < 32);
        }
    }

    #[test]
    fn test_dynamic_counters_swept_per_client() {
        {
            let mut counters = COUNTERS.lock().unwrap();
            counters.insert(
                0xdead_0001,
                Counter {
                    owner: 9001,
                    value: 5,
                },
            );
            counters.insert(
                0xdead_0002,
                Counter {
                    owner: 9002,
                    value: 6,
                },
            );
        }

        sweep_client(9001);

        let counters = COUNTERS.lock().unwrap();
        assert!(!counters.contains_key(&0xdead_0001));
        assert!(counters.contains_key(&0xdead_0002));
    }
}
