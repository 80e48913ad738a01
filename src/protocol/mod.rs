//! X11 protocol implementation
//!
//! This module implements the X11 wire protocol: request framing, replies,
//! events, errors and the connection setup handshake. All multi-byte values
//! are big-endian on the wire.

pub mod errors;
pub mod events;
pub mod setup;
pub mod wire;

pub use errors::{ErrorCode, X11Error};
pub use wire::{ClientOutput, ReplyBuilder, RequestReader};

/// X11 protocol version
pub const PROTOCOL_MAJOR_VERSION: u16 = 11;
pub const PROTOCOL_MINOR_VERSION: u16 = 0;

/// Padding helper - X11 requires data to be padded to 4-byte boundaries
pub fn pad(n: usize) -> usize {
    (4 - (n % 4)) % 4
}

/// Calculate padded length
pub fn padded_len(n: usize) -> usize {
    n + pad(n)
}

/// Core request opcodes handled by this server.
///
/// Opcodes not listed here are answered with an Implementation error after
/// draining the declared request length.
pub mod opcodes {
    pub const CREATE_WINDOW: u8 = 1;
    pub const CHANGE_WINDOW_ATTRIBUTES: u8 = 2;
    pub const DESTROY_WINDOW: u8 = 4;
    pub const GET_GEOMETRY: u8 = 14;
    pub const INTERN_ATOM: u8 = 16;
    pub const GET_ATOM_NAME: u8 = 17;
    pub const GRAB_KEY: u8 = 33;
    pub const UNGRAB_KEY: u8 = 34;
    pub const GET_INPUT_FOCUS: u8 = 43;
    pub const OPEN_FONT: u8 = 45;
    pub const CLOSE_FONT: u8 = 46;
    pub const QUERY_FONT: u8 = 47;
    pub const QUERY_TEXT_EXTENTS: u8 = 48;
    pub const LIST_FONTS: u8 = 49;
    pub const LIST_FONTS_WITH_INFO: u8 = 50;
    pub const SET_FONT_PATH: u8 = 51;
    pub const GET_FONT_PATH: u8 = 52;
    pub const CREATE_PIXMAP: u8 = 53;
    pub const FREE_PIXMAP: u8 = 54;
    pub const CREATE_GC: u8 = 55;
    pub const CHANGE_GC: u8 = 56;
    pub const FREE_GC: u8 = 60;
    pub const CREATE_COLORMAP: u8 = 78;
    pub const FREE_COLORMAP: u8 = 79;
    pub const ALLOC_COLOR: u8 = 84;
    pub const CREATE_CURSOR: u8 = 93;
    pub const CREATE_GLYPH_CURSOR: u8 = 94;
    pub const FREE_CURSOR: u8 = 95;
    pub const RECOLOR_CURSOR: u8 = 96;
    pub const QUERY_EXTENSION: u8 = 98;
    pub const LIST_EXTENSIONS: u8 = 99;
    pub const SET_CLOSE_DOWN_MODE: u8 = 112;
    pub const NO_OPERATION: u8 = 127;
}
