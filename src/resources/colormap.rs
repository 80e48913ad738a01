//! Colormap resources
//!
//! The single TrueColor visual makes colormaps nearly stateless: AllocColor
//! composes the pixel directly from the requested channels. The default
//! colormap is registered at server startup and survives FreeColormap.

use super::{Resource, ResourceBase};
use crate::protocol::{opcodes, ErrorCode, ReplyBuilder};
use crate::server::client::Client;
use crate::server::XServer;
use std::io;

/// Convert 16-bit-per-channel RGB into packed opaque ARGB.
pub fn from_parts_16(red: u16, green: u16, blue: u16) -> u32 {
    0xff00_0000 | ((red as u32 >> 8) << 16) | ((green as u32 >> 8) << 8) | (blue as u32 >> 8)
}

pub struct Colormap {
    pub base: ResourceBase,
}

impl Colormap {
    pub fn new(id: u32, owner: Option<u32>) -> Self {
        Colormap {
            base: ResourceBase::new(id, owner),
        }
    }

    /// Process a CreateColormap request.
    pub fn process_create(
        server: &XServer,
        client: &mut Client,
        _alloc: u8,
        bytes_remaining: usize,
    ) -> io::Result<()> {
        if bytes_remaining != 12 {
            client.reader.skip(bytes_remaining)?;
            return client.send_error(ErrorCode::Length, opcodes::CREATE_COLORMAP, 0);
        }
        let mid = client.reader.read_u32()?;
        let wid = client.reader.read_u32()?;
        let visual = client.reader.read_u32()?;

        match server.registry.get(wid) {
            Some(r) if matches!(*r, Resource::Window(_)) => {}
            _ => return client.send_error(ErrorCode::Window, opcodes::CREATE_COLORMAP, wid),
        }
        if visual != server.screen().root_visual {
            return client.send_error(ErrorCode::Match, opcodes::CREATE_COLORMAP, visual);
        }

        let colormap = Colormap::new(mid, Some(client.id));
        client.register(server, Resource::Colormap(colormap), opcodes::CREATE_COLORMAP)
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
            opcodes::FREE_COLORMAP => {
                if bytes_remaining != 0 {
                    client.reader.skip(bytes_remaining)?;
                    client.send_error(ErrorCode::Length, opcode, 0)
                } else {
                    if self.base.id != server.default_colormap() {
                        client.free_resource(server, self.base.id);
                    }
                    Ok(())
                }
            }
            opcodes::ALLOC_COLOR => {
                if bytes_remaining != 8 {
                    client.reader.skip(bytes_remaining)?;
                    client.send_error(ErrorCode::Length, opcode, 0)
                } else {
                    let red = client.reader.read_u16()?;
                    let green = client.reader.read_u16()?;
                    let blue = client.reader.read_u16()?;
                    client.reader.skip(2)?;

                    let pixel = from_parts_16(red, green, blue) & 0x00ff_ffff;
                    let mut reply = ReplyBuilder::new(0, client.sequence());
                    reply
                        .put_u16(red)
                        .put_u16(green)
                        .put_u16(blue)
                        .put_pad(2)
                        .put_u32(pixel)
                        .put_pad(12);
                    client.send_reply(&reply.finish())
                }
            }
            _ => {
                client.reader.skip(bytes_remaining)?;
                client.send_error(ErrorCode::Implementation, opcode, 0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_16_takes_high_bytes() {
        assert_eq!(from_parts_16(0xffff, 0, 0), 0xffff0000);
        assert_eq!(from_parts_16(0, 0xff00, 0), 0xff00ff00);
        assert_eq!(from_parts_16(0x1234, 0x5678, 0x9abc), 0xff12569a);
    }

    #[test]
    fn test_from_parts_16_is_opaque() {
        assert_eq!(from_parts_16(0, 0, 0) >> 24, 0xff);
    }
}
