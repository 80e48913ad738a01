//! X11 protocol error codes and error packets

use std::fmt;

/// X11 error codes as defined in the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    None = 0,
    Request = 1,
    Value = 2,
    Window = 3,
    Pixmap = 4,
    Atom = 5,
    Cursor = 6,
    Font = 7,
    Match = 8,
    Drawable = 9,
    Access = 10,
    Alloc = 11,
    Colormap = 12,
    GContext = 13,
    IDChoice = 14,
    Name = 15,
    Length = 16,
    Implementation = 17,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::None => "None: no error",
            ErrorCode::Request => "Request: bad request code",
            ErrorCode::Value => "Value: integer parameter out of range",
            ErrorCode::Window => "Window: invalid Window parameter",
            ErrorCode::Pixmap => "Pixmap: invalid Pixmap parameter",
            ErrorCode::Atom => "Atom: invalid Atom parameter",
            ErrorCode::Cursor => "Cursor: invalid Cursor parameter",
            ErrorCode::Font => "Font: invalid Font parameter",
            ErrorCode::Match => "Match: parameter mismatch",
            ErrorCode::Drawable => "Drawable: invalid Drawable parameter",
            ErrorCode::Access => "Access: attempt to access private resource",
            ErrorCode::Alloc => "Alloc: insufficient resources",
            ErrorCode::Colormap => "Colormap: invalid Colormap parameter",
            ErrorCode::GContext => "GContext: invalid GC parameter",
            ErrorCode::IDChoice => "IDChoice: invalid resource ID for this connection",
            ErrorCode::Name => "Name: font or color name doesn't exist",
            ErrorCode::Length => "Length: request length incorrect",
            ErrorCode::Implementation => "Implementation: server implementation error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// X11 error packet (32 bytes on the wire)
///
/// The code is stored raw so extension error bases (e.g. the SYNC
/// extension's base code) can be reported through the same path.
#[derive(Debug, Clone)]
pub struct X11Error {
    pub code: u8,
    pub sequence: u16,
    pub bad_value: u32,
    pub minor_opcode: u16,
    pub major_opcode: u8,
}

impl X11Error {
    pub fn new(code: ErrorCode, sequence: u16, bad_value: u32, major_opcode: u8) -> Self {
        X11Error {
            code: code as u8,
            sequence,
            bad_value,
            minor_opcode: 0,
            major_opcode,
        }
    }

    pub fn with_minor(
        code: ErrorCode,
        sequence: u16,
        bad_value: u32,
        minor_opcode: u16,
        major_opcode: u8,
    ) -> Self {
        X11Error {
            code: code as u8,
            sequence,
            bad_value,
            minor_opcode,
            major_opcode,
        }
    }

    /// Build an error carrying a raw code, for extension error bases.
    pub fn from_raw(
        code: u8,
        sequence: u16,
        bad_value: u32,
        minor_opcode: u16,
        major_opcode: u8,
    ) -> Self {
        X11Error {
            code,
            sequence,
            bad_value,
            minor_opcode,
            major_opcode,
        }
    }

    /// Encode the error to its 32-byte big-endian wire form.
    pub fn encode(&self) -> [u8; 32] {
        let mut buf = [0u8; 32];
        buf[0] = 0; // Error packet
        buf[1] = self.code;
        buf[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        buf[4..8].copy_from_slice(&self.bad_value.to_be_bytes());
        buf[8..10].copy_from_slice(&self.minor_opcode.to_be_bytes());
        buf[10] = self.major_opcode;
        // Remaining 21 bytes are padding
        buf
    }
}

impl fmt::Display for X11Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "X11 error {} (sequence: {}, value: 0x{:08x}, major: {}, minor: {})",
            self.code, self.sequence, self.bad_value, self.major_opcode, self.minor_opcode
        )
    }
}
