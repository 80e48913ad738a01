//! Pixmap resources
//!
//! A pixmap is an offscreen drawable bound to the screen. Creation follows
//! the two-step protocol: construct (reporting Drawable/Match/Alloc errors
//! against the request) then register in the server table and the owning
//! client's resource list.

use super::drawable::Drawable;
use super::{Resource, ResourceBase};
use crate::protocol::{opcodes, ErrorCode, ReplyBuilder};
use crate::server::client::Client;
use crate::server::XServer;
use std::io;

pub struct Pixmap {
    pub base: ResourceBase,
    pub drawable: Drawable,
}

impl Pixmap {
    /// Allocate a pixmap. Returns None when the backing raster is too
    /// large to allocate.
    pub fn new(id: u32, owner: Option<u32>, width: u16, height: u16, depth: u8) -> Option<Self> {
        let drawable = Drawable::new(width, height, depth, 0xff00_0000)?;
        Some(Pixmap {
            base: ResourceBase::new(id, owner),
            drawable,
        })
    }

    pub fn depth(&self) -> u8 {
        self.drawable.depth
    }

    /// Process a CreatePixmap request. The depth travels in the header's
    /// arg byte.
    pub fn process_create(
        server: &XServer,
        client: &mut Client,
        depth: u8,
        bytes_remaining: usize,
    ) -> io::Result<()> {
        if bytes_remaining != 12 {
            client.reader.skip(bytes_remaining)?;
            return client.send_error(ErrorCode::Length, opcodes::CREATE_PIXMAP, 0);
        }

        let pid = client.reader.read_u32()?;
        let did = client.reader.read_u32()?;
        let width = client.reader.read_u16()?;
        let height = client.reader.read_u16()?;

        let source = match server.registry.get(did) {
            Some(r) if r.is_drawable() => r,
            _ => return client.send_error(ErrorCode::Drawable, opcodes::CREATE_PIXMAP, did),
        };

        // The depth is not checked against the source drawable, only
        // against what the screen advertises.
        if depth != 1 && depth != 32 {
            return client.send_error(ErrorCode::Match, opcodes::CREATE_PIXMAP, source.id());
        }

        let pixmap = match Pixmap::new(pid, Some(client.id), width, height, depth) {
            Some(p) => p,
            None => return client.send_error(ErrorCode::Alloc, opcodes::CREATE_PIXMAP, 0),
        };

        client.register(server, Resource::Pixmap(pixmap), opcodes::CREATE_PIXMAP)
    }

    pub(crate) fn process_request(
        &self,
        server: &XServer,
        client: &mut Client,
        opcode: u8,
        _arg: u8,
        bytes_remaining: usize,
    ) -> io::Result<()> {
        match opcode {
            opcodes::FREE_PIXMAP => {
                if bytes_remaining != 0 {
                    client.reader.skip(bytes_remaining)?;
                    client.send_error(ErrorCode::Length, opcode, 0)
                } else {
                    client.free_resource(server, self.base.id);
                    Ok(())
                }
            }
            opcodes::GET_GEOMETRY => {
                if bytes_remaining != 0 {
                    client.reader.skip(bytes_remaining)?;
                    client.send_error(ErrorCode::Length, opcode, 0)
                } else {
                    self.write_geometry(server, client)
                }
            }
            _ => {
                client.reader.skip(bytes_remaining)?;
                client.send_error(ErrorCode::Implementation, opcode, 0)
            }
        }
    }

    /// Pixmaps report their screen's root window, a zero origin and no
    /// border.
    fn write_geometry(&self, server: &XServer, client: &Client) -> io::Result<()> {
        let mut reply = ReplyBuilder::new(self.drawable.depth, client.sequence());
        reply
            .put_u32(server.root_window())
            .put_i16(0)
            .put_i16(0)
            .put_u16(self.drawable.width)
            .put_u16(self.drawable.height)
            .put_u16(0)
            .put_pad(10);
        client.send_reply(&reply.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pixmap_has_requested_shape() {
        let pixmap = Pixmap::new(42, None, 16, 16, 1).unwrap();
        assert_eq!(pixmap.drawable.width, 16);
        assert_eq!(pixmap.drawable.height, 16);
        assert_eq!(pixmap.depth(), 1);
    }

    #[test]
    fn test_oversized_pixmap_fails_allocation() {
        assert!(Pixmap::new(1, None, 65535, 65535, 32).is_none());
    }
}
