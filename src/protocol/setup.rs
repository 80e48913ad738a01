//! X11 connection setup handshake
//!
//! Parses the client's setup request and encodes the setup response
//! advertising this server's single 32-bit TrueColor screen. The wire
//! protocol spoken by this server is big-endian only; clients requesting
//! LSB-first byte order are refused with a setup failure.

use super::wire::RequestReader;
use super::{padded_len, PROTOCOL_MAJOR_VERSION, PROTOCOL_MINOR_VERSION};
use crate::server::XServer;
use std::io;

/// Client resource IDs are allocated out of this base/mask pair.
pub const RESOURCE_ID_BASE: u32 = 0x0200_0000;
pub const RESOURCE_ID_MASK: u32 = 0x001f_ffff;

/// Maximum core request length, in 4-byte units.
pub const MAX_REQUEST_LENGTH: u16 = 65535;

/// Connection setup request from a client
#[derive(Debug, Clone)]
pub struct SetupRequest {
    pub byte_order: u8,
    pub protocol_major: u16,
    pub protocol_minor: u16,
    pub auth_name: String,
    pub auth_data: Vec<u8>,
}

impl SetupRequest {
    /// Parse a setup request.
    ///
    /// For an LSB-first request only the fixed 12-byte header is consumed;
    /// the authorization lengths would be byte-swapped garbage, so the
    /// caller refuses the connection without reading further.
    pub fn parse(reader: &mut RequestReader) -> io::Result<Self> {
        let byte_order = reader.read_u8()?;
        reader.skip(1)?;
        let protocol_major = reader.read_u16()?;
        let protocol_minor = reader.read_u16()?;
        let auth_name_len = reader.read_u16()? as usize;
        let auth_data_len = reader.read_u16()? as usize;
        reader.skip(2)?;

        if byte_order != b'B' {
            return Ok(SetupRequest {
                byte_order,
                protocol_major,
                protocol_minor,
                auth_name: String::new(),
                auth_data: Vec::new(),
            });
        }

        let name_buf = reader.read_vec(padded_len(auth_name_len))?;
        let auth_name = String::from_utf8_lossy(&name_buf[..auth_name_len]).to_string();

        let mut auth_data = reader.read_vec(padded_len(auth_data_len))?;
        auth_data.truncate(auth_data_len);

        Ok(SetupRequest {
            byte_order,
            protocol_major,
            protocol_minor,
            auth_name,
            auth_data,
        })
    }
}

/// Encode a setup failure packet.
pub fn encode_setup_failed(reason: &str) -> Vec<u8> {
    let reason = reason.as_bytes();
    let padded = padded_len(reason.len());

    let mut buf = Vec::with_capacity(8 + padded);
    buf.push(0); // Failed
    buf.push(reason.len() as u8);
    buf.extend_from_slice(&PROTOCOL_MAJOR_VERSION.to_be_bytes());
    buf.extend_from_slice(&PROTOCOL_MINOR_VERSION.to_be_bytes());
    buf.extend_from_slice(&((padded / 4) as u16).to_be_bytes());
    buf.extend_from_slice(reason);
    buf.resize(8 + padded, 0);
    buf
}

/// Encode the setup success block for this server's screen.
pub fn encode_setup_success(server: &XServer) -> Vec<u8> {
    let vendor = b"x11cell";
    let vendor_padded = padded_len(vendor.len());
    let screen = server.screen();

    let mut buf = Vec::with_capacity(40 + vendor_padded + 2 * 8 + 40 + 2 * 8 + 24);
    buf.push(1); // Success
    buf.push(0);
    buf.extend_from_slice(&PROTOCOL_MAJOR_VERSION.to_be_bytes());
    buf.extend_from_slice(&PROTOCOL_MINOR_VERSION.to_be_bytes());
    buf.extend_from_slice(&[0u8; 2]); // Additional length, patched below
    buf.extend_from_slice(&1u32.to_be_bytes()); // Release number
    buf.extend_from_slice(&RESOURCE_ID_BASE.to_be_bytes());
    buf.extend_from_slice(&RESOURCE_ID_MASK.to_be_bytes());
    buf.extend_from_slice(&256u32.to_be_bytes()); // Motion buffer size
    buf.extend_from_slice(&(vendor.len() as u16).to_be_bytes());
    buf.extend_from_slice(&MAX_REQUEST_LENGTH.to_be_bytes());
    buf.push(1); // One screen
    buf.push(2); // Two pixmap formats
    buf.push(1); // Image byte order: MSB first
    buf.push(1); // Bitmap bit order: MSB first
    buf.push(32); // Bitmap scanline unit
    buf.push(32); // Bitmap scanline pad
    buf.push(8); // Min keycode
    buf.push(255); // Max keycode
    buf.extend_from_slice(&[0u8; 4]);

    buf.extend_from_slice(vendor);
    buf.resize(40 + vendor_padded, 0);

    // Pixmap formats for the advertised depths
    encode_format(&mut buf, 32, 32, 32);
    encode_format(&mut buf, 1, 1, 32);

    // Screen
    buf.extend_from_slice(&server.root_window().to_be_bytes());
    buf.extend_from_slice(&server.default_colormap().to_be_bytes());
    buf.extend_from_slice(&0x00ff_ffffu32.to_be_bytes()); // White pixel
    buf.extend_from_slice(&0u32.to_be_bytes()); // Black pixel
    buf.extend_from_slice(&0u32.to_be_bytes()); // Current input masks
    buf.extend_from_slice(&screen.width.to_be_bytes());
    buf.extend_from_slice(&screen.height.to_be_bytes());
    buf.extend_from_slice(&screen.width_mm.to_be_bytes());
    buf.extend_from_slice(&screen.height_mm.to_be_bytes());
    buf.extend_from_slice(&1u16.to_be_bytes()); // Min installed maps
    buf.extend_from_slice(&1u16.to_be_bytes()); // Max installed maps
    buf.extend_from_slice(&screen.root_visual.to_be_bytes());
    buf.push(0); // Backing stores: never
    buf.push(0); // Save unders
    buf.push(32); // Root depth
    buf.push(2); // Allowed depths

    // Depth 32 carries the TrueColor visual
    buf.push(32);
    buf.push(0);
    buf.extend_from_slice(&1u16.to_be_bytes());
    buf.extend_from_slice(&[0u8; 4]);
    encode_visual(&mut buf, screen.root_visual);

    // Depth 1 is advertised for bitmaps, with no visuals
    buf.push(1);
    buf.push(0);
    buf.extend_from_slice(&0u16.to_be_bytes());
    buf.extend_from_slice(&[0u8; 4]);

    let additional = ((buf.len() - 8) / 4) as u16;
    buf[6..8].copy_from_slice(&additional.to_be_bytes());
    buf
}

fn encode_format(buf: &mut Vec<u8>, depth: u8, bits_per_pixel: u8, scanline_pad: u8) {
    buf.push(depth);
    buf.push(bits_per_pixel);
    buf.push(scanline_pad);
    buf.extend_from_slice(&[0u8; 5]);
}

fn encode_visual(buf: &mut Vec<u8>, visual_id: u32) {
    buf.extend_from_slice(&visual_id.to_be_bytes());
    buf.push(4); // TrueColor
    buf.push(8); // Bits per RGB value
    buf.extend_from_slice(&256u16.to_be_bytes()); // Colormap entries
    buf.extend_from_slice(&0x00ff_0000u32.to_be_bytes()); // Red mask
    buf.extend_from_slice(&0x0000_ff00u32.to_be_bytes()); // Green mask
    buf.extend_from_slice(&0x0000_00ffu32.to_be_bytes()); // Blue mask
    buf.extend_from_slice(&[0u8; 4]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerConfig;
    use std::io::Cursor;

    #[test]
    fn test_parse_setup_request() {
        let mut bytes = vec![b'B', 0, 0, 11, 0, 0, 0, 4, 0, 0, 0, 0];
        bytes.extend_from_slice(b"cell");
        let mut reader = RequestReader::new(Box::new(Cursor::new(bytes)));

        let req = SetupRequest::parse(&mut reader).unwrap();
        assert_eq!(req.byte_order, b'B');
        assert_eq!(req.protocol_major, 11);
        assert_eq!(req.auth_name, "cell");
        assert!(req.auth_data.is_empty());
    }

    #[test]
    fn test_lsb_request_stops_at_header() {
        let bytes = vec![b'l', 0, 11, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let mut reader = RequestReader::new(Box::new(Cursor::new(bytes)));

        let req = SetupRequest::parse(&mut reader).unwrap();
        assert_eq!(req.byte_order, b'l');
        assert!(req.auth_name.is_empty());
    }

    #[test]
    fn test_setup_failed_packet() {
        let buf = encode_setup_failed("no");
        assert_eq!(buf[0], 0);
        assert_eq!(buf[1], 2);
        assert_eq!(buf.len(), 8 + 4);
        assert_eq!(&buf[8..10], b"no");
    }

    #[test]
    fn test_setup_success_length_field() {
        let server = XServer::new(ServerConfig::default());
        let buf = encode_setup_success(&server);

        assert_eq!(buf[0], 1);
        let additional = u16::from_be_bytes([buf[6], buf[7]]) as usize;
        assert_eq!(8 + additional * 4, buf.len());
    }
}
