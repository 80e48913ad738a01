//! Graphics context resources
//!
//! Only the GC state this server consults is retained: foreground,
//! background and the font reference that makes a GC fontable for
//! QueryTextExtents. Remaining value-list entries are accepted and
//! discarded.

use super::{Resource, ResourceBase};
use crate::protocol::{opcodes, ErrorCode};
use crate::server::client::Client;
use crate::server::XServer;
use std::io;
use std::sync::Mutex;

const GC_FOREGROUND: u32 = 1 << 2;
const GC_BACKGROUND: u32 = 1 << 3;
const GC_FONT: u32 = 1 << 14;

#[derive(Debug, Clone)]
pub struct GcValues {
    pub foreground: u32,
    pub background: u32,
    pub font: Option<u32>,
}

impl Default for GcValues {
    fn default() -> Self {
        GcValues {
            foreground: 0,
            background: 1,
            font: None,
        }
    }
}

pub struct GContext {
    pub base: ResourceBase,
    values: Mutex<GcValues>,
}

impl GContext {
    pub fn new(id: u32, owner: Option<u32>) -> Self {
        GContext {
            base: ResourceBase::new(id, owner),
            values: Mutex::new(GcValues::default()),
        }
    }

    pub fn values(&self) -> GcValues {
        self.values.lock().unwrap().clone()
    }

    /// Process a CreateGC request.
    pub fn process_create(
        server: &XServer,
        client: &mut Client,
        bytes_remaining: usize,
    ) -> io::Result<()> {
        if bytes_remaining < 12 {
            client.reader.skip(bytes_remaining)?;
            return client.send_error(ErrorCode::Length, opcodes::CREATE_GC, 0);
        }
        let cid = client.reader.read_u32()?;
        let did = client.reader.read_u32()?;
        let value_mask = client.reader.read_u32()?;

        let value_len = 4 * value_mask.count_ones() as usize;
        if bytes_remaining != 12 + value_len {
            client.reader.skip(bytes_remaining - 12)?;
            return client.send_error(ErrorCode::Length, opcodes::CREATE_GC, 0);
        }
        let updates = read_gc_values(client, value_mask)?;

        match server.registry.get(did) {
            Some(r) if r.is_drawable() => {}
            _ => return client.send_error(ErrorCode::Drawable, opcodes::CREATE_GC, did),
        }
        if let Some(fid) = updates.font {
            match server.registry.get(fid) {
                Some(r) if matches!(*r, Resource::Font(_)) => {}
                _ => return client.send_error(ErrorCode::Font, opcodes::CREATE_GC, fid),
            }
        }

        let gc = GContext::new(cid, Some(client.id));
        gc.apply(&updates);
        client.register(server, Resource::GContext(gc), opcodes::CREATE_GC)
    }

    pub(crate) fn process_request(
        &self,
        server: &XServer,
        client: &mut Client,
        opcode: u8,
        arg: u8,
        bytes_remaining: usize,
    ) -> io::Result<()> {
        match opcode {
            opcodes::FREE_GC => {
                if bytes_remaining != 0 {
                    client.reader.skip(bytes_remaining)?;
                    client.send_error(ErrorCode::Length, opcode, 0)
                } else {
                    client.free_resource(server, self.base.id);
                    Ok(())
                }
            }
            opcodes::CHANGE_GC => {
                if bytes_remaining < 4 {
                    client.reader.skip(bytes_remaining)?;
                    return client.send_error(ErrorCode::Length, opcode, 0);
                }
                let value_mask = client.reader.read_u32()?;
                let value_len = 4 * value_mask.count_ones() as usize;
                if bytes_remaining != 4 + value_len {
                    client.reader.skip(bytes_remaining - 4)?;
                    return client.send_error(ErrorCode::Length, opcode, 0);
                }
                let updates = read_gc_values(client, value_mask)?;
                if let Some(fid) = updates.font {
                    match server.registry.get(fid) {
                        Some(r) if matches!(*r, Resource::Font(_)) => {}
                        _ => return client.send_error(ErrorCode::Font, opcode, fid),
                    }
                }
                self.apply(&updates);
                Ok(())
            }
            opcodes::QUERY_TEXT_EXTENTS => {
                // Fontable: delegate to the GC's font.
                let font_id = self.values.lock().unwrap().font;
                let font = font_id.and_then(|fid| server.registry.get(fid));
                match font.as_deref() {
                    Some(Resource::Font(f)) => {
                        f.handle_query_text_extents(server, client, arg, bytes_remaining)
                    }
                    _ => {
                        client.reader.skip(bytes_remaining)?;
                        client.send_error(ErrorCode::Font, opcode, font_id.unwrap_or(0))
                    }
                }
            }
            _ => {
                client.reader.skip(bytes_remaining)?;
                client.send_error(ErrorCode::Implementation, opcode, 0)
            }
        }
    }

    fn apply(&self, updates: &GcValueUpdates) {
        let mut values = self.values.lock().unwrap();
        if let Some(fg) = updates.foreground {
            values.foreground = fg;
        }
        if let Some(bg) = updates.background {
            values.background = bg;
        }
        if let Some(font) = updates.font {
            values.font = Some(font);
        }
    }
}

#[derive(Debug, Default)]
struct GcValueUpdates {
    foreground: Option<u32>,
    background: Option<u32>,
    font: Option<u32>,
}

/// Read a GC value list, keeping the components this server retains.
fn read_gc_values(client: &mut Client, value_mask: u32) -> io::Result<GcValueUpdates> {
    let mut updates = GcValueUpdates::default();
    for bit in 0..32 {
        if value_mask & (1 << bit) == 0 {
            continue;
        }
        let value = client.reader.read_u32()?;
        match 1 << bit {
            GC_FOREGROUND => updates.foreground = Some(value),
            GC_BACKGROUND => updates.background = Some(value),
            GC_FONT => updates.font = Some(value),
            _ => {}
        }
    }
    Ok(updates)
}
