//! Client session and request dispatch
//!
//! One `Client` per connection, driven by its own thread. The dispatch
//! loop reads a request header, routes the body to a resource's handler or
//! a static handler, and keeps the stream's framing synchronized: every
//! handler consumes exactly the bytes the request declared, draining the
//! remainder before reporting an error on a malformed request. Unknown
//! opcodes drain their declared length and answer Implementation.

use super::{extensions, XServer};
use crate::protocol::wire::{ClientOutput, RequestReader};
use crate::protocol::{opcodes, padded_len, ErrorCode, ReplyBuilder, X11Error};
use crate::resources::{
    font, CloseDownMode, Colormap, Cursor, Font, GContext, Pixmap, Resource, ResourceKind, Window,
};
use std::collections::HashSet;
use std::io;
use std::sync::Arc;

/// Represents a connected X11 client
pub struct Client {
    /// Unique client ID assigned at registration
    pub id: u32,

    /// The read half of the connection
    pub reader: RequestReader,

    /// The shared write half of the connection
    pub output: Arc<ClientOutput>,

    /// IDs of resources created by this client
    pub resources: HashSet<u32>,

    /// Close-down mode inherited by resources this client creates
    pub close_down: CloseDownMode,

    /// XTEST GrabControl: impervious to server grabs
    pub impervious: bool,
}

impl Client {
    pub fn new(id: u32, reader: RequestReader, output: Arc<ClientOutput>) -> Self {
        Client {
            id,
            reader,
            output,
            resources: HashSet::new(),
            close_down: CloseDownMode::Destroy,
            impervious: false,
        }
    }

    /// Low 16 bits of the request counter, echoed in replies and errors.
    pub fn sequence(&self) -> u16 {
        self.output.sequence()
    }

    pub fn send_reply(&self, packet: &[u8]) -> io::Result<()> {
        self.output.send(packet)
    }

    pub fn send_error(&self, code: ErrorCode, major_opcode: u8, bad_value: u32) -> io::Result<()> {
        let error = X11Error::new(code, self.sequence(), bad_value, major_opcode);
        log::debug!("client {}: {}", self.id, error);
        self.output.send(&error.encode())
    }

    pub fn send_error_with_minor(
        &self,
        code: ErrorCode,
        major_opcode: u8,
        minor_opcode: u16,
        bad_value: u32,
    ) -> io::Result<()> {
        let error =
            X11Error::with_minor(code, self.sequence(), bad_value, minor_opcode, major_opcode);
        log::debug!("client {}: {}", self.id, error);
        self.output.send(&error.encode())
    }

    /// Report an error carrying an extension's own error base code.
    pub fn send_raw_error(
        &self,
        code: u8,
        major_opcode: u8,
        minor_opcode: u16,
        bad_value: u32,
    ) -> io::Result<()> {
        let error =
            X11Error::from_raw(code, self.sequence(), bad_value, minor_opcode, major_opcode);
        log::debug!("client {}: {}", self.id, error);
        self.output.send(&error.encode())
    }

    pub fn add_resource(&mut self, id: u32) {
        self.resources.insert(id);
    }

    pub fn remove_resource(&mut self, id: u32) {
        self.resources.remove(&id);
    }

    /// Complete a create request: register the constructed resource under
    /// both the server table and this client's list. An ID collision
    /// answers IDChoice.
    pub fn register(&mut self, server: &XServer, resource: Resource, major: u8) -> io::Result<()> {
        let id = resource.id();
        resource.set_close_down_mode(self.close_down);
        if server.registry.add(Arc::new(resource)) {
            self.add_resource(id);
            Ok(())
        } else {
            self.send_error(ErrorCode::IDChoice, major, id)
        }
    }

    /// Free a resource from both tables.
    pub fn free_resource(&mut self, server: &XServer, id: u32) {
        server.registry.free(id);
        self.remove_resource(id);
    }

    /// Run the request loop until the client disconnects.
    pub fn run(&mut self, server: &XServer) -> io::Result<()> {
        loop {
            let opcode = match self.reader.read_u8() {
                Ok(b) => b,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(e),
            };
            let arg = self.reader.read_u8()?;
            let length = self.reader.read_u16()?;
            self.output.bump_sequence();

            let bytes_remaining = if length != 0 {
                length as usize * 4 - 4
            } else {
                // BIG-REQUESTS framing: a 32-bit length word follows.
                let extended = self.reader.read_u32()? as usize;
                if extended < 2 {
                    self.send_error(ErrorCode::Length, opcode, 0)?;
                    continue;
                }
                extended * 4 - 8
            };

            log::debug!(
                "client {}: opcode {} arg {} ({} body bytes, seq {})",
                self.id,
                opcode,
                arg,
                bytes_remaining,
                self.sequence()
            );
            self.dispatch(server, opcode, arg, bytes_remaining)?;
        }
    }

    fn dispatch(
        &mut self,
        server: &XServer,
        opcode: u8,
        arg: u8,
        bytes_remaining: usize,
    ) -> io::Result<()> {
        match opcode {
            opcodes::CREATE_WINDOW => Window::process_create(server, self, arg, bytes_remaining),
            opcodes::CREATE_PIXMAP => Pixmap::process_create(server, self, arg, bytes_remaining),
            opcodes::OPEN_FONT => Font::process_open(server, self, bytes_remaining),
            opcodes::LIST_FONTS | opcodes::LIST_FONTS_WITH_INFO => {
                font::process_list_fonts(server, self, opcode, bytes_remaining)
            }
            opcodes::GET_FONT_PATH => font::process_get_font_path(server, self, bytes_remaining),
            opcodes::SET_FONT_PATH => font::process_set_font_path(server, self, bytes_remaining),
            opcodes::CREATE_GC => GContext::process_create(server, self, bytes_remaining),
            opcodes::CREATE_COLORMAP => {
                Colormap::process_create(server, self, arg, bytes_remaining)
            }
            opcodes::CREATE_CURSOR | opcodes::CREATE_GLYPH_CURSOR => {
                Cursor::process_create(server, self, opcode, bytes_remaining)
            }
            opcodes::INTERN_ATOM => self.handle_intern_atom(server, arg, bytes_remaining),
            opcodes::GET_ATOM_NAME => self.handle_get_atom_name(server, bytes_remaining),
            opcodes::GET_INPUT_FOCUS => self.handle_get_input_focus(server, bytes_remaining),
            opcodes::QUERY_EXTENSION => self.handle_query_extension(bytes_remaining),
            opcodes::LIST_EXTENSIONS => self.handle_list_extensions(bytes_remaining),
            opcodes::SET_CLOSE_DOWN_MODE => {
                self.handle_set_close_down_mode(server, arg, bytes_remaining)
            }
            opcodes::NO_OPERATION => self.reader.skip(bytes_remaining),
            128..=255 => extensions::process_request(server, self, opcode, arg, bytes_remaining),
            _ => match resource_target(opcode) {
                Some((kinds, missing_error)) => self.dispatch_to_resource(
                    server,
                    opcode,
                    arg,
                    bytes_remaining,
                    kinds,
                    missing_error,
                ),
                None => {
                    self.reader.skip(bytes_remaining)?;
                    self.send_error(ErrorCode::Implementation, opcode, 0)
                }
            },
        }
    }

    /// Forward a request to the resource its leading ID names. An absent
    /// or wrong-typed ID drains the remainder and reports the opcode's
    /// typed error against the offending ID.
    fn dispatch_to_resource(
        &mut self,
        server: &XServer,
        opcode: u8,
        arg: u8,
        bytes_remaining: usize,
        kinds: &[ResourceKind],
        missing_error: ErrorCode,
    ) -> io::Result<()> {
        if bytes_remaining < 4 {
            self.reader.skip(bytes_remaining)?;
            return self.send_error(ErrorCode::Length, opcode, 0);
        }
        let id = self.reader.read_u32()?;
        let bytes_remaining = bytes_remaining - 4;

        match server.registry.get(id) {
            Some(resource) if kinds.contains(&resource.kind()) => {
                resource.process_request(server, self, opcode, arg, bytes_remaining)
            }
            _ => {
                self.reader.skip(bytes_remaining)?;
                self.send_error(missing_error, opcode, id)
            }
        }
    }

    fn handle_intern_atom(
        &mut self,
        server: &XServer,
        only_if_exists: u8,
        bytes_remaining: usize,
    ) -> io::Result<()> {
        if bytes_remaining < 4 {
            self.reader.skip(bytes_remaining)?;
            return self.send_error(ErrorCode::Length, opcodes::INTERN_ATOM, 0);
        }
        let name_len = self.reader.read_u16()? as usize;
        self.reader.skip(2)?;
        let rest = bytes_remaining - 4;
        if rest != padded_len(name_len) {
            self.reader.skip(rest)?;
            return self.send_error(ErrorCode::Length, opcodes::INTERN_ATOM, 0);
        }
        let name_bytes = self.reader.read_vec(name_len)?;
        self.reader.skip(rest - name_len)?;
        let name = String::from_utf8_lossy(&name_bytes).to_string();

        let atom = if only_if_exists != 0 {
            server.atoms.lookup(&name).unwrap_or(0)
        } else {
            server.atoms.intern(&name)
        };

        let mut reply = ReplyBuilder::new(0, self.sequence());
        reply.put_u32(atom);
        self.send_reply(&reply.finish())
    }

    fn handle_get_atom_name(&mut self, server: &XServer, bytes_remaining: usize) -> io::Result<()> {
        if bytes_remaining != 4 {
            self.reader.skip(bytes_remaining)?;
            return self.send_error(ErrorCode::Length, opcodes::GET_ATOM_NAME, 0);
        }
        let atom = self.reader.read_u32()?;
        match server.atoms.name_of(atom) {
            Some(name) => {
                let mut reply = ReplyBuilder::new(0, self.sequence());
                reply
                    .put_u16(name.len() as u16)
                    .put_pad(22)
                    .put_bytes(name.as_bytes())
                    .align();
                self.send_reply(&reply.finish())
            }
            None => self.send_error(ErrorCode::Atom, opcodes::GET_ATOM_NAME, atom),
        }
    }

    fn handle_get_input_focus(
        &mut self,
        server: &XServer,
        bytes_remaining: usize,
    ) -> io::Result<()> {
        if bytes_remaining != 0 {
            self.reader.skip(bytes_remaining)?;
            return self.send_error(ErrorCode::Length, opcodes::GET_INPUT_FOCUS, 0);
        }
        let mut reply = ReplyBuilder::new(0, self.sequence());
        reply.put_u32(server.root_window());
        self.send_reply(&reply.finish())
    }

    fn handle_query_extension(&mut self, bytes_remaining: usize) -> io::Result<()> {
        if bytes_remaining < 4 {
            self.reader.skip(bytes_remaining)?;
            return self.send_error(ErrorCode::Length, opcodes::QUERY_EXTENSION, 0);
        }
        let name_len = self.reader.read_u16()? as usize;
        self.reader.skip(2)?;
        let rest = bytes_remaining - 4;
        if rest != padded_len(name_len) {
            self.reader.skip(rest)?;
            return self.send_error(ErrorCode::Length, opcodes::QUERY_EXTENSION, 0);
        }
        let name_bytes = self.reader.read_vec(name_len)?;
        self.reader.skip(rest - name_len)?;
        let name = String::from_utf8_lossy(&name_bytes).to_string();

        let info = extensions::lookup(&name);
        log::debug!(
            "QueryExtension {:?}: {}",
            name,
            if info.is_some() { "present" } else { "absent" }
        );

        let mut reply = ReplyBuilder::new(0, self.sequence());
        match info {
            Some(ext) => reply
                .put_u8(1)
                .put_u8(ext.major_opcode)
                .put_u8(ext.first_event)
                .put_u8(ext.first_error),
            None => reply.put_u8(0).put_u8(0).put_u8(0).put_u8(0),
        };
        self.send_reply(&reply.finish())
    }

    fn handle_list_extensions(&mut self, bytes_remaining: usize) -> io::Result<()> {
        if bytes_remaining != 0 {
            self.reader.skip(bytes_remaining)?;
            return self.send_error(ErrorCode::Length, opcodes::LIST_EXTENSIONS, 0);
        }
        let names = extensions::names();
        let mut reply = ReplyBuilder::new(names.len() as u8, self.sequence());
        reply.put_pad(24);
        for name in names {
            reply.put_u8(name.len() as u8);
            reply.put_bytes(name.as_bytes());
        }
        reply.align();
        self.send_reply(&reply.finish())
    }

    fn handle_set_close_down_mode(
        &mut self,
        server: &XServer,
        mode: u8,
        bytes_remaining: usize,
    ) -> io::Result<()> {
        if bytes_remaining != 0 {
            self.reader.skip(bytes_remaining)?;
            return self.send_error(ErrorCode::Length, opcodes::SET_CLOSE_DOWN_MODE, 0);
        }
        let mode = match mode {
            0 => CloseDownMode::Destroy,
            // RetainTemporary is folded into RetainPermanent; this server
            // has no reset cycle that would reclaim temporaries.
            1 | 2 => CloseDownMode::RetainPermanent,
            other => {
                return self.send_error(ErrorCode::Value, opcodes::SET_CLOSE_DOWN_MODE, other as u32)
            }
        };

        self.close_down = mode;
        for &id in &self.resources {
            if let Some(resource) = server.registry.get(id) {
                resource.set_close_down_mode(mode);
            }
        }
        Ok(())
    }
}

/// The resource kinds a resource-targeted opcode accepts, and the typed
/// error reported when the leading ID is absent or wrong.
fn resource_target(opcode: u8) -> Option<(&'static [ResourceKind], ErrorCode)> {
    use ResourceKind::*;
    match opcode {
        opcodes::CHANGE_WINDOW_ATTRIBUTES
        | opcodes::DESTROY_WINDOW
        | opcodes::GRAB_KEY
        | opcodes::UNGRAB_KEY => Some((&[Window], ErrorCode::Window)),
        // Geometry queries in this server are pixmap-centric; a stale ID
        // reports against the pixmap table.
        opcodes::GET_GEOMETRY => Some((&[Window, Pixmap], ErrorCode::Pixmap)),
        opcodes::FREE_PIXMAP => Some((&[Pixmap], ErrorCode::Pixmap)),
        opcodes::CLOSE_FONT | opcodes::QUERY_FONT => Some((&[Font], ErrorCode::Font)),
        opcodes::QUERY_TEXT_EXTENTS => Some((&[Font, GContext], ErrorCode::Font)),
        opcodes::CHANGE_GC | opcodes::FREE_GC => Some((&[GContext], ErrorCode::GContext)),
        opcodes::FREE_COLORMAP | opcodes::ALLOC_COLOR => Some((&[Colormap], ErrorCode::Colormap)),
        opcodes::FREE_CURSOR | opcodes::RECOLOR_CURSOR => Some((&[Cursor], ErrorCode::Cursor)),
        _ => None,
    }
}
