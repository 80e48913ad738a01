//! Window resources
//!
//! Windows here are registry citizens with geometry, a raster and the
//! attributes this server actually consults (background pixel, event mask,
//! cursor). Window-management requests outside that set answer
//! Implementation. Windows are also the anchor for passive key grabs.

use super::drawable::Drawable;
use super::{Resource, ResourceBase};
use crate::protocol::{opcodes, ErrorCode, ReplyBuilder};
use crate::server::client::Client;
use crate::server::{PassiveKeyGrab, XServer};
use std::io;
use std::sync::Mutex;

/// Value-mask bits of CreateWindow/ChangeWindowAttributes handled here.
const ATTR_BACKGROUND_PIXEL: u32 = 1 << 1;
const ATTR_EVENT_MASK: u32 = 1 << 11;
const ATTR_CURSOR: u32 = 1 << 14;

#[derive(Debug, Default, Clone)]
pub struct WindowAttributes {
    pub background_pixel: Option<u32>,
    pub event_mask: u32,
    pub cursor: Option<u32>,
}

pub struct Window {
    pub base: ResourceBase,
    pub x: i16,
    pub y: i16,
    pub border_width: u16,
    pub drawable: Drawable,
    attributes: Mutex<WindowAttributes>,
}

impl Window {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u32,
        owner: Option<u32>,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
        border_width: u16,
        depth: u8,
    ) -> Option<Self> {
        let drawable = Drawable::new(width, height, depth, 0xff00_0000)?;
        Some(Window {
            base: ResourceBase::new(id, owner),
            x,
            y,
            border_width,
            drawable,
            attributes: Mutex::new(WindowAttributes::default()),
        })
    }

    /// The root window covering the whole screen.
    pub fn new_root(id: u32, width: u16, height: u16) -> Self {
        Window::new(id, None, 0, 0, width, height, 0, 32).expect("root window raster")
    }

    pub fn cursor(&self) -> Option<u32> {
        self.attributes.lock().unwrap().cursor
    }

    pub fn event_mask(&self) -> u32 {
        self.attributes.lock().unwrap().event_mask
    }

    /// Process a CreateWindow request. The depth travels in the arg byte;
    /// zero means copy-from-parent, which on this screen is always 32.
    pub fn process_create(
        server: &XServer,
        client: &mut Client,
        depth: u8,
        bytes_remaining: usize,
    ) -> io::Result<()> {
        if bytes_remaining < 28 {
            client.reader.skip(bytes_remaining)?;
            return client.send_error(ErrorCode::Length, opcodes::CREATE_WINDOW, 0);
        }

        let wid = client.reader.read_u32()?;
        let parent = client.reader.read_u32()?;
        let x = client.reader.read_i16()?;
        let y = client.reader.read_i16()?;
        let width = client.reader.read_u16()?;
        let height = client.reader.read_u16()?;
        let border_width = client.reader.read_u16()?;
        let _class = client.reader.read_u16()?;
        let _visual = client.reader.read_u32()?;
        let value_mask = client.reader.read_u32()?;

        let value_len = 4 * value_mask.count_ones() as usize;
        if bytes_remaining != 28 + value_len {
            client.reader.skip(bytes_remaining - 28)?;
            return client.send_error(ErrorCode::Length, opcodes::CREATE_WINDOW, 0);
        }
        let values = read_attribute_values(client, value_mask)?;

        match server.registry.get(parent) {
            Some(r) if matches!(*r, Resource::Window(_)) => {}
            _ => return client.send_error(ErrorCode::Window, opcodes::CREATE_WINDOW, parent),
        }

        let depth = if depth == 0 { 32 } else { depth };
        if depth != 1 && depth != 32 {
            return client.send_error(ErrorCode::Match, opcodes::CREATE_WINDOW, wid);
        }

        if let Some(cursor) = values.cursor.filter(|&c| c != 0) {
            match server.registry.get(cursor) {
                Some(r) if matches!(*r, Resource::Cursor(_)) => {}
                _ => return client.send_error(ErrorCode::Cursor, opcodes::CREATE_WINDOW, cursor),
            }
        }

        let window = match Window::new(
            wid,
            Some(client.id),
            x,
            y,
            width,
            height,
            border_width,
            depth,
        ) {
            Some(w) => w,
            None => return client.send_error(ErrorCode::Alloc, opcodes::CREATE_WINDOW, 0),
        };
        window.apply_attributes(&values);

        client.register(server, Resource::Window(window), opcodes::CREATE_WINDOW)
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
            opcodes::GET_GEOMETRY => {
                if bytes_remaining != 0 {
                    client.reader.skip(bytes_remaining)?;
                    client.send_error(ErrorCode::Length, opcode, 0)
                } else {
                    self.write_geometry(server, client)
                }
            }
            opcodes::DESTROY_WINDOW => {
                if bytes_remaining != 0 {
                    client.reader.skip(bytes_remaining)?;
                    client.send_error(ErrorCode::Length, opcode, 0)
                } else {
                    if self.base.id != server.root_window() {
                        server.remove_window_grabs(self.base.id);
                        client.free_resource(server, self.base.id);
                    }
                    Ok(())
                }
            }
            opcodes::CHANGE_WINDOW_ATTRIBUTES => {
                self.handle_change_attributes(server, client, bytes_remaining)
            }
            opcodes::GRAB_KEY => self.handle_grab_key(server, client, arg, bytes_remaining),
            opcodes::UNGRAB_KEY => self.handle_ungrab_key(server, client, arg, bytes_remaining),
            _ => {
                client.reader.skip(bytes_remaining)?;
                client.send_error(ErrorCode::Implementation, opcode, 0)
            }
        }
    }

    fn write_geometry(&self, server: &XServer, client: &Client) -> io::Result<()> {
        let mut reply = ReplyBuilder::new(self.drawable.depth, client.sequence());
        reply
            .put_u32(server.root_window())
            .put_i16(self.x)
            .put_i16(self.y)
            .put_u16(self.drawable.width)
            .put_u16(self.drawable.height)
            .put_u16(self.border_width)
            .put_pad(10);
        client.send_reply(&reply.finish())
    }

    fn handle_change_attributes(
        &self,
        server: &XServer,
        client: &mut Client,
        bytes_remaining: usize,
    ) -> io::Result<()> {
        if bytes_remaining < 4 {
            client.reader.skip(bytes_remaining)?;
            return client.send_error(ErrorCode::Length, opcodes::CHANGE_WINDOW_ATTRIBUTES, 0);
        }
        let value_mask = client.reader.read_u32()?;
        let value_len = 4 * value_mask.count_ones() as usize;
        if bytes_remaining != 4 + value_len {
            client.reader.skip(bytes_remaining - 4)?;
            return client.send_error(ErrorCode::Length, opcodes::CHANGE_WINDOW_ATTRIBUTES, 0);
        }
        let values = read_attribute_values(client, value_mask)?;

        if let Some(cursor) = values.cursor.filter(|&c| c != 0) {
            match server.registry.get(cursor) {
                Some(r) if matches!(*r, Resource::Cursor(_)) => {}
                _ => {
                    return client.send_error(
                        ErrorCode::Cursor,
                        opcodes::CHANGE_WINDOW_ATTRIBUTES,
                        cursor,
                    )
                }
            }
        }

        self.apply_attributes(&values);
        Ok(())
    }

    fn apply_attributes(&self, values: &AttributeValues) {
        let mut attrs = self.attributes.lock().unwrap();
        if let Some(pixel) = values.background_pixel {
            attrs.background_pixel = Some(pixel);
        }
        if let Some(mask) = values.event_mask {
            attrs.event_mask = mask;
        }
        if let Some(cursor) = values.cursor {
            attrs.cursor = if cursor == 0 { None } else { Some(cursor) };
        }
    }

    fn handle_grab_key(
        &self,
        server: &XServer,
        client: &mut Client,
        owner_events: u8,
        bytes_remaining: usize,
    ) -> io::Result<()> {
        if bytes_remaining != 8 {
            client.reader.skip(bytes_remaining)?;
            return client.send_error(ErrorCode::Length, opcodes::GRAB_KEY, 0);
        }
        let modifiers = client.reader.read_u16()?;
        let key = client.reader.read_u8()?;
        let pointer_mode = client.reader.read_u8()?;
        let keyboard_mode = client.reader.read_u8()?;
        client.reader.skip(3)?;

        server.add_key_grab(PassiveKeyGrab {
            client_id: client.id,
            window: self.base.id,
            key,
            modifiers,
            owner_events: owner_events != 0,
            pointer_sync: pointer_mode == 0,
            keyboard_sync: keyboard_mode == 0,
        });
        Ok(())
    }

    fn handle_ungrab_key(
        &self,
        server: &XServer,
        client: &mut Client,
        key: u8,
        bytes_remaining: usize,
    ) -> io::Result<()> {
        if bytes_remaining != 4 {
            client.reader.skip(bytes_remaining)?;
            return client.send_error(ErrorCode::Length, opcodes::UNGRAB_KEY, 0);
        }
        let modifiers = client.reader.read_u16()?;
        client.reader.skip(2)?;

        server.remove_key_grabs(client.id, self.base.id, key, modifiers);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct AttributeValues {
    background_pixel: Option<u32>,
    event_mask: Option<u32>,
    cursor: Option<u32>,
}

/// Read a CreateWindow/ChangeWindowAttributes value list, keeping the bits
/// this server acts on and discarding the rest.
fn read_attribute_values(client: &mut Client, value_mask: u32) -> io::Result<AttributeValues> {
    let mut values = AttributeValues::default();
    for bit in 0..32 {
        if value_mask & (1 << bit) == 0 {
            continue;
        }
        let value = client.reader.read_u32()?;
        match 1 << bit {
            ATTR_BACKGROUND_PIXEL => values.background_pixel = Some(value),
            ATTR_EVENT_MASK => values.event_mask = Some(value),
            ATTR_CURSOR => values.cursor = Some(value),
            _ => {}
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_window_spans_screen() {
        let root = Window::new_root(0x12c, 640, 480);
        assert_eq!(root.drawable.width, 640);
        assert_eq!(root.drawable.height, 480);
        assert_eq!(root.border_width, 0);
        assert!(root.cursor().is_none());
    }

    #[test]
    fn test_apply_attributes_merges() {
        let window = Window::new(1, None, 0, 0, 8, 8, 0, 32).unwrap();
        window.apply_attributes(&AttributeValues {
            background_pixel: Some(0xffffff),
            event_mask: None,
            cursor: Some(5),
        });
        window.apply_attributes(&AttributeValues {
            background_pixel: None,
            event_mask: Some(3),
            cursor: None,
        });

        assert_eq!(window.cursor(), Some(5));
        assert_eq!(window.event_mask(), 3);
    }

    #[test]
    fn test_cursor_attribute_none_resets() {
        let window = Window::new(1, None, 0, 0, 8, 8, 0, 32).unwrap();
        window.apply_attributes(&AttributeValues {
            background_pixel: None,
            event_mask: None,
            cursor: Some(5),
        });
        window.apply_attributes(&AttributeValues {
            background_pixel: None,
            event_mask: None,
            cursor: Some(0),
        });

        assert!(window.cursor().is_none());
    }
}
